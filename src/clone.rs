//! Clone collaborator.
//!
//! The pipeline only needs "make this URL available at this directory".
//! [`GitCli`] shells out to `git`; tests substitute their own [`RepoCloner`].
//!
//! An existing destination is reused as-is. There is no fetch or freshness
//! check, so a pinned checkout stays pinned until the directory is removed.

use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;

use crate::config::CloneConfig;
use crate::error::CloneError;

#[async_trait]
pub trait RepoCloner: Send + Sync {
    /// Populate `dest` with a checkout of `url`. `dest` does not exist yet.
    async fn clone_repo(&self, url: &str, dest: &Path) -> Result<(), CloneError>;
}

/// Clones with the `git` executable found on `PATH`.
#[derive(Debug, Clone)]
pub struct GitCli {
    pub shallow: bool,
    pub branch: Option<String>,
}

impl From<&CloneConfig> for GitCli {
    fn from(cfg: &CloneConfig) -> Self {
        GitCli {
            shallow: cfg.shallow,
            branch: (!cfg.branch.is_empty()).then(|| cfg.branch.clone()),
        }
    }
}

impl GitCli {
    fn args(&self, url: &str, dest: &Path) -> Vec<String> {
        let mut args = vec!["clone".to_string()];
        if let Some(branch) = &self.branch {
            args.extend(["--branch".to_string(), branch.clone(), "--single-branch".to_string()]);
        }
        if self.shallow {
            args.extend(["--depth".to_string(), "1".to_string()]);
        }
        args.push(url.to_string());
        args.push(dest.to_string_lossy().to_string());
        args
    }
}

#[async_trait]
impl RepoCloner for GitCli {
    async fn clone_repo(&self, url: &str, dest: &Path) -> Result<(), CloneError> {
        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| CloneError::Destination {
                    dest: dest.to_path_buf(),
                    source,
                })?;
        }

        let output = Command::new("git")
            .args(self.args(url, dest))
            .output()
            .await
            .map_err(|source| CloneError::Spawn {
                url: url.to_string(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CloneError::Failed {
                url: url.to_string(),
                dest: dest.to_path_buf(),
                stderr: stderr.trim().to_string(),
            });
        }
        Ok(())
    }
}

/// Whether `ensure_clone` had to call the cloner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloneOutcome {
    Cloned,
    Reused,
}

/// Clone `url` into `dest` unless `dest` already exists.
pub async fn ensure_clone(
    cloner: &dyn RepoCloner,
    url: &str,
    dest: &Path,
) -> Result<CloneOutcome, CloneError> {
    match tokio::fs::metadata(dest).await {
        Ok(meta) if meta.is_dir() => {
            tracing::info!(dest = %dest.display(), "repo already cloned, reusing");
            Ok(CloneOutcome::Reused)
        }
        Ok(_) => Err(CloneError::Destination {
            dest: dest.to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "destination exists and is not a directory",
            ),
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(url, dest = %dest.display(), "cloning repo");
            cloner.clone_repo(url, dest).await?;
            Ok(CloneOutcome::Cloned)
        }
        Err(source) => Err(CloneError::Destination {
            dest: dest.to_path_buf(),
            source,
        }),
    }
}
