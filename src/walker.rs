//! Source tree discovery.
//!
//! [`TreeWalker`] lazily walks a directory in lexicographic file-name order
//! and yields one item per candidate file. Entries that cannot be inspected
//! (unreadable directories, broken symlinks, loops) come out as
//! [`ReadError`]s so the caller can count them; they never end the walk.
//!
//! Filter policy:
//! - with no include globs, a file is a candidate when its name contains a
//!   `.` (this admits dotfiles and names with a trailing dot);
//! - with include globs, a file is a candidate when its root-relative path
//!   matches one of them;
//! - exclude globs always win.

use globset::GlobSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::{build_globset, IngestConfig};
use crate::error::ReadError;
use crate::models::FileEntry;
use crate::normalize::language_tag;

#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    pub follow_symlinks: bool,
    pub include_globs: Vec<String>,
    pub exclude_globs: Vec<String>,
}

impl From<&IngestConfig> for WalkOptions {
    fn from(cfg: &IngestConfig) -> Self {
        WalkOptions {
            follow_symlinks: cfg.follow_symlinks,
            include_globs: cfg.include_globs.clone(),
            exclude_globs: cfg.exclude_globs.clone(),
        }
    }
}

enum NameFilter {
    HasDot,
    Globs(GlobSet),
}

pub struct TreeWalker {
    root: PathBuf,
    inner: walkdir::IntoIter,
    include: NameFilter,
    exclude: GlobSet,
    follow_symlinks: bool,
}

/// Start a walk over `root`. Fails only if the glob patterns are invalid;
/// a missing root shows up as a single [`ReadError`].
pub fn walk(root: &Path, options: &WalkOptions) -> Result<TreeWalker, globset::Error> {
    let include = if options.include_globs.is_empty() {
        NameFilter::HasDot
    } else {
        NameFilter::Globs(build_globset(&options.include_globs)?)
    };
    let exclude = build_globset(&options.exclude_globs)?;

    let inner = WalkDir::new(root)
        .follow_links(options.follow_symlinks)
        .sort_by_file_name()
        .into_iter();

    Ok(TreeWalker {
        root: root.to_path_buf(),
        inner,
        include,
        exclude,
        follow_symlinks: options.follow_symlinks,
    })
}

impl TreeWalker {
    fn is_candidate(&self, path: &Path, relative: &Path) -> bool {
        let rel_str = relative.to_string_lossy();
        if self.exclude.is_match(rel_str.as_ref()) {
            return false;
        }
        match &self.include {
            NameFilter::HasDot => path
                .file_name()
                .map(|n| n.to_string_lossy().contains('.'))
                .unwrap_or(false),
            NameFilter::Globs(set) => set.is_match(rel_str.as_ref()),
        }
    }

    fn entry_for(&self, path: &Path, relative: &Path) -> Result<FileEntry, ReadError> {
        let absolute_path =
            std::fs::canonicalize(path).map_err(|e| ReadError::new(path, e))?;
        Ok(FileEntry {
            absolute_path,
            relative_path: relative.to_path_buf(),
            extension: language_tag(relative),
        })
    }
}

impl Iterator for TreeWalker {
    type Item = Result<FileEntry, ReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(e) => return Some(Err(ReadError::from_walk(&self.root, e))),
            };

            let file_type = entry.file_type();
            if file_type.is_dir() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(&self.root).unwrap_or(path);
            if !self.is_candidate(path, relative) {
                continue;
            }

            if file_type.is_symlink() && !self.follow_symlinks {
                // Resolve the link the way a plain file read would.
                match std::fs::metadata(path) {
                    Ok(meta) if meta.is_dir() => continue,
                    Ok(_) => {}
                    Err(e) => return Some(Err(ReadError::new(path, e))),
                }
            } else if !file_type.is_file() {
                continue;
            }

            return Some(self.entry_for(path, relative));
        }
    }
}
