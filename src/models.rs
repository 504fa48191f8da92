//! Core data models used throughout the crawler.
//!
//! These types represent the files, documents and stream records that flow
//! through the ingestion pipeline. Internal field names differ from the wire
//! names consumed by the indexer; [`WireDocument`] is the only place that
//! mapping lives.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Current version of the `doc` payload layout.
pub const SCHEMA_VERSION: u32 = 3;

/// Name of the single stream field that carries the JSON document.
pub const DOC_FIELD: &str = "doc";

/// A file discovered by the walker, before it is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub absolute_path: PathBuf,
    pub relative_path: PathBuf,
    /// Suffix including the leading dot (`".py"`), or empty.
    pub extension: String,
}

/// Normalized document published to the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: String,
    pub repo: String,
    pub path: String,
    /// Decoded text, truncated to the configured maximum.
    pub content: String,
    pub lang: String,
    /// SHA-256 of the full, untruncated file bytes.
    pub content_hash: String,
}

/// JSON shape of the `doc` field as the indexer reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireDocument {
    pub id: String,
    pub path: String,
    pub repo: String,
    pub code: String,
    pub lang: String,
    pub hash: String,
    #[serde(default = "legacy_schema_version")]
    pub schema_version: u32,
}

// Records written before the version field existed.
fn legacy_schema_version() -> u32 {
    2
}

impl From<&Document> for WireDocument {
    fn from(doc: &Document) -> Self {
        WireDocument {
            id: doc.id.clone(),
            path: doc.path.clone(),
            repo: doc.repo.clone(),
            code: doc.content.clone(),
            lang: doc.lang.clone(),
            hash: doc.content_hash.clone(),
            schema_version: SCHEMA_VERSION,
        }
    }
}

impl From<WireDocument> for Document {
    fn from(wire: WireDocument) -> Self {
        Document {
            id: wire.id,
            repo: wire.repo,
            path: wire.path,
            content: wire.code,
            lang: wire.lang,
            content_hash: wire.hash,
        }
    }
}

impl Document {
    /// Serialize to the JSON value stored under [`DOC_FIELD`].
    pub fn to_wire_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&WireDocument::from(self))
    }

    /// Parse a `doc` payload back into a document.
    pub fn from_wire_json(payload: &str) -> anyhow::Result<Document> {
        let wire: WireDocument = serde_json::from_str(payload)?;
        if wire.schema_version > SCHEMA_VERSION {
            anyhow::bail!(
                "unsupported doc schema_version {} (newest known is {})",
                wire.schema_version,
                SCHEMA_VERSION
            );
        }
        Ok(wire.into())
    }
}

/// One appended stream entry: the field/value pairs handed to the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRecord {
    pub fields: Vec<(String, String)>,
}

impl StreamRecord {
    /// Build the single-field `doc` record for a document.
    pub fn from_document(doc: &Document) -> serde_json::Result<Self> {
        Ok(StreamRecord {
            fields: vec![(DOC_FIELD.to_string(), doc.to_wire_json()?)],
        })
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Recover the document carried by this record.
    pub fn document(&self) -> anyhow::Result<Document> {
        let payload = self
            .field(DOC_FIELD)
            .ok_or_else(|| anyhow::anyhow!("stream record has no '{}' field", DOC_FIELD))?;
        Document::from_wire_json(payload)
    }
}
