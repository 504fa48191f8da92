//! File → [`Document`] normalization.
//!
//! Decoding never fails: invalid UTF-8 is replaced with U+FFFD. The content
//! hash is always taken over the raw bytes, so truncation and lossy decoding
//! never hide a change.

use std::path::Path;

use crate::config::IdScheme;
use crate::hasher::content_hash;
use crate::models::{Document, FileEntry};

/// Build the document for one file.
pub fn normalize(
    entry: &FileEntry,
    raw: &[u8],
    repo: &str,
    max_content_length: usize,
    id_scheme: IdScheme,
) -> Document {
    let text = String::from_utf8_lossy(raw);
    let path = entry.absolute_path.to_string_lossy().to_string();
    let id = match id_scheme {
        IdScheme::Absolute => path.clone(),
        IdScheme::RepoRelative => format!("{}/{}", repo, slash_path(&entry.relative_path)),
    };

    Document {
        id,
        repo: repo.to_string(),
        path,
        content: truncate_chars(&text, max_content_length).to_string(),
        lang: entry.extension.clone(),
        content_hash: content_hash(raw),
    }
}

/// First `max` characters of `text` (never splits a code point).
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// File suffix with its leading dot (`"a/b.tar.gz"` → `".gz"`), or `""`.
///
/// Dotfiles such as `.bashrc` and names ending in a bare dot have no suffix.
pub fn language_tag(path: &Path) -> String {
    match path.extension().map(|e| e.to_string_lossy()) {
        Some(ext) if !ext.is_empty() => format!(".{}", ext),
        _ => String::new(),
    }
}

/// Repository name from a clone URL: last path segment minus a trailing `.git`.
///
/// Handles `https://host/org/repo.git`, `git@host:org/repo.git`, trailing
/// slashes and local paths.
pub fn repo_name_from_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches(['/', '\\']);
    let last = trimmed
        .rsplit(['/', '\\', ':'])
        .next()
        .unwrap_or(trimmed);
    let name = last.strip_suffix(".git").unwrap_or(last);
    if name.is_empty() {
        "repo".to_string()
    } else {
        name.to_string()
    }
}

fn slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
