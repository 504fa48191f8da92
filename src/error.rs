//! Typed errors for each stage of an ingestion run.
//!
//! Only [`CloneError`] and a fail-fast publish failure end a run early.
//! [`ReadError`]s are counted and skipped by the pipeline, and decoding
//! never fails (invalid UTF-8 is replaced, see [`crate::normalize`]).

use std::path::PathBuf;
use thiserror::Error;

use crate::pipeline::RunSummary;

/// The clone collaborator could not produce a local checkout.
#[derive(Debug, Error)]
pub enum CloneError {
    /// `git` could not be started at all.
    #[error("failed to execute 'git clone' for {url}: {source}. Is git installed?")]
    Spawn {
        url: String,
        #[source]
        source: std::io::Error,
    },

    /// `git clone` ran and exited non-zero.
    #[error("git clone of {url} into {} failed: {stderr}", dest.display())]
    Failed {
        url: String,
        dest: PathBuf,
        stderr: String,
    },

    /// The destination exists but could not be prepared.
    #[error("clone destination {} is unusable: {source}", dest.display())]
    Destination {
        dest: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A single file (or directory entry) could not be read.
#[derive(Debug, Error)]
#[error("failed to read {}: {source}", path.display())]
pub struct ReadError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

impl ReadError {
    pub fn new(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self {
            path: path.into(),
            source,
        }
    }

    /// Convert a `walkdir` failure, keeping whatever path it reported.
    pub fn from_walk(root: &std::path::Path, err: walkdir::Error) -> Self {
        let path = err
            .path()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| root.to_path_buf());
        let source = match err.into_io_error() {
            Some(io) => io,
            None => std::io::Error::new(std::io::ErrorKind::Other, "filesystem loop detected"),
        };
        Self { path, source }
    }
}

/// Appending a document to the stream failed.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Worth retrying: timeouts, dropped connections, broker busy or unavailable.
    #[error("transient publish failure after {attempts} attempt(s): {message}")]
    Transient { attempts: u32, message: String },

    /// Retrying cannot help: malformed record, wrong key type, rejected command.
    #[error("permanent publish failure: {message}")]
    Permanent { message: String },
}

impl PublishError {
    pub fn transient(message: impl Into<String>) -> Self {
        PublishError::Transient {
            attempts: 1,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        PublishError::Permanent {
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, PublishError::Transient { .. })
    }

    pub(crate) fn with_attempts(self, attempts: u32) -> Self {
        match self {
            PublishError::Transient { message, .. } => PublishError::Transient { attempts, message },
            other => other,
        }
    }
}

/// Reasons an ingestion run ends in the `Failed` state.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Clone(#[from] CloneError),

    #[error("invalid file filter: {0}")]
    Filter(#[from] globset::Error),

    /// `fail_fast` is set and a document could not be published.
    #[error("aborting run (fail-fast): {}: {source}", path.display())]
    FailFast {
        path: PathBuf,
        #[source]
        source: PublishError,
        summary: Box<RunSummary>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempts_are_recorded_on_transient_only() {
        let t = PublishError::transient("reset").with_attempts(4);
        assert!(t.is_transient());
        assert!(t.to_string().contains("4 attempt(s)"));

        let p = PublishError::permanent("WRONGTYPE").with_attempts(4);
        assert!(!p.is_transient());
        assert_eq!(p.to_string(), "permanent publish failure: WRONGTYPE");
    }

    #[test]
    fn read_error_names_the_path() {
        let err = ReadError::new(
            "/tmp/x.py",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(err.to_string(), "failed to read /tmp/x.py: denied");
    }
}
