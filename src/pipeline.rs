//! Ingestion pipeline orchestration.
//!
//! Coordinates one run: clone → walk → read → normalize → publish.
//!
//! ```text
//! Idle ─▶ Cloning ─▶ Walking ─▶ Ingesting ─▶ Completed
//!            │                      │  └────▶ Cancelled
//!            └──────▶ Failed ◀──────┘ (fail-fast only)
//! ```
//!
//! Per-file problems never stop the walk: unreadable files are counted as
//! skipped and publish failures as failed, unless `fail_fast` is set. Files
//! are processed by up to `workers` tasks at once; publish order across files
//! is not preserved when `workers > 1`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::{JoinError, JoinSet};

use crate::clone::{ensure_clone, RepoCloner};
use crate::config::{Config, IdScheme};
use crate::error::{IngestError, PublishError, ReadError};
use crate::models::FileEntry;
use crate::normalize::{normalize, repo_name_from_url};
use crate::progress::{FileOutcome, NoProgress, ProgressEvent, ProgressReporter};
use crate::publisher::{PublishOutcome, Publisher};
use crate::walker::{walk, WalkOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    Idle,
    Cloning,
    Walking,
    Ingesting,
    Completed,
    Cancelled,
    Failed,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Idle => "idle",
            PipelineState::Cloning => "cloning",
            PipelineState::Walking => "walking",
            PipelineState::Ingesting => "ingesting",
            PipelineState::Completed => "completed",
            PipelineState::Cancelled => "cancelled",
            PipelineState::Failed => "failed",
        }
    }
}

/// Counters for one run.
///
/// `files_seen == published + duplicates + skipped_read + failed_publish`.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub state: PipelineState,
    pub repo: String,
    pub root: PathBuf,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub files_seen: u64,
    pub published: u64,
    pub duplicates: u64,
    pub skipped_read: u64,
    pub failed_publish: u64,
    pub publish_retries: u64,
}

impl RunSummary {
    fn new(repo: &str, root: &Path) -> Self {
        Self {
            state: PipelineState::Idle,
            repo: repo.to_string(),
            root: root.to_path_buf(),
            started_at: Utc::now(),
            elapsed_ms: 0,
            files_seen: 0,
            published: 0,
            duplicates: 0,
            skipped_read: 0,
            failed_publish: 0,
            publish_retries: 0,
        }
    }

    /// Plain `key: value` report for stdout.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("ingest {}\n", self.repo));
        out.push_str(&format!("  root: {}\n", self.root.display()));
        out.push_str(&format!("  files seen: {}\n", self.files_seen));
        out.push_str(&format!("  published: {}\n", self.published));
        out.push_str(&format!("  duplicates: {}\n", self.duplicates));
        out.push_str(&format!("  skipped (read error): {}\n", self.skipped_read));
        out.push_str(&format!("  failed to publish: {}\n", self.failed_publish));
        out.push_str(&format!("  publish retries: {}\n", self.publish_retries));
        out.push_str(&format!("  elapsed: {} ms\n", self.elapsed_ms));
        out.push_str(self.state.as_str());
        out.push('\n');
        out
    }
}

/// Cooperative stop signal, checked between files.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

enum FileResult {
    Published { attempts: u32 },
    Duplicate,
    Unreadable(ReadError),
    NotPublished(PublishError),
}

struct FileReport {
    path: PathBuf,
    result: FileResult,
}

/// Everything a worker task needs, cloned once per run.
#[derive(Clone)]
struct FileJob {
    publisher: Arc<Publisher>,
    repo: Arc<str>,
    max_content_length: usize,
    id_scheme: IdScheme,
}

impl FileJob {
    async fn run(self, entry: FileEntry) -> FileReport {
        let path = entry.relative_path.clone();
        let raw = match tokio::fs::read(&entry.absolute_path).await {
            Ok(raw) => raw,
            Err(e) => {
                return FileReport {
                    path,
                    result: FileResult::Unreadable(ReadError::new(&entry.absolute_path, e)),
                }
            }
        };

        let doc = normalize(
            &entry,
            &raw,
            &self.repo,
            self.max_content_length,
            self.id_scheme,
        );
        drop(raw);

        let result = match self.publisher.publish(&doc).await {
            Ok(PublishOutcome::Published { record_id, attempts }) => {
                tracing::debug!(path = %path.display(), record_id = %record_id, "emitted");
                FileResult::Published { attempts }
            }
            Ok(PublishOutcome::Duplicate) => FileResult::Duplicate,
            Err(e) => FileResult::NotPublished(e),
        };
        FileReport { path, result }
    }
}

/// One ingestion run. Build it, then consume it with [`Pipeline::run`] or
/// [`Pipeline::ingest_tree`]; the publisher is closed when the run ends.
pub struct Pipeline {
    config: Config,
    cloner: Arc<dyn RepoCloner>,
    publisher: Arc<Publisher>,
    reporter: Arc<dyn ProgressReporter>,
    cancel: CancelToken,
}

/// Closes the publisher on every exit path of a run.
struct CloseOnDrop(Arc<Publisher>);

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        self.0.close();
    }
}

impl Pipeline {
    pub fn new(config: Config, cloner: Arc<dyn RepoCloner>, publisher: Arc<Publisher>) -> Self {
        Self {
            config,
            cloner,
            publisher,
            reporter: Arc::new(NoProgress),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    fn transition(&self, repo: &str, state: PipelineState) {
        tracing::info!(repo, state = state.as_str(), "pipeline state");
        self.reporter.report(ProgressEvent::State {
            repo: repo.to_string(),
            state,
        });
    }

    /// Clone `repo_url` into the configured destination (unless it already
    /// exists) and ingest it.
    pub async fn run(self, repo_url: &str) -> Result<RunSummary, IngestError> {
        let _close = CloseOnDrop(self.publisher.clone());
        let repo = repo_name_from_url(repo_url);
        let dest = self.config.ingest.clone_destination.clone();

        self.transition(&repo, PipelineState::Cloning);
        if let Err(e) = ensure_clone(self.cloner.as_ref(), repo_url, &dest).await {
            tracing::error!(error = %e, "clone failed");
            self.transition(&repo, PipelineState::Failed);
            return Err(e.into());
        }

        self.ingest(&dest, &repo).await
    }

    /// Ingest an existing directory as repository `repo`, without cloning.
    pub async fn ingest_tree(self, root: &Path, repo: &str) -> Result<RunSummary, IngestError> {
        let _close = CloseOnDrop(self.publisher.clone());
        self.ingest(root, repo).await
    }

    async fn ingest(&self, root: &Path, repo: &str) -> Result<RunSummary, IngestError> {
        let clock = Instant::now();
        let mut summary = RunSummary::new(repo, root);

        self.transition(repo, PipelineState::Walking);
        let walker = walk(root, &WalkOptions::from(&self.config.ingest))?;

        self.transition(repo, PipelineState::Ingesting);
        let job = FileJob {
            publisher: self.publisher.clone(),
            repo: Arc::from(repo),
            max_content_length: self.config.ingest.max_content_length,
            id_scheme: self.config.ingest.id_scheme,
        };
        let workers = self.config.ingest.workers.max(1);
        let mut tasks: JoinSet<FileReport> = JoinSet::new();
        let mut abort: Option<(PathBuf, PublishError)> = None;

        for item in walker {
            // A slot frees up only once a task's result has been recorded, so
            // the abort and cancel checks below always see it.
            while tasks.len() >= workers {
                match tasks.join_next().await {
                    Some(done) => self.record(&mut summary, done, &mut abort),
                    None => break,
                }
            }
            while let Some(done) = tasks.try_join_next() {
                self.record(&mut summary, done, &mut abort);
            }
            if abort.is_some() || self.cancel.is_cancelled() {
                break;
            }

            summary.files_seen += 1;
            let entry = match item {
                Ok(entry) => entry,
                Err(e) => {
                    let path = relative_to(root, &e.path);
                    self.record_unreadable(&mut summary, path, e);
                    continue;
                }
            };

            tasks.spawn(job.clone().run(entry));
        }

        while let Some(done) = tasks.join_next().await {
            self.record(&mut summary, done, &mut abort);
        }
        summary.elapsed_ms = clock.elapsed().as_millis() as u64;

        if let Some((path, source)) = abort {
            summary.state = PipelineState::Failed;
            self.transition(repo, PipelineState::Failed);
            self.reporter.report(ProgressEvent::Summary(summary.clone()));
            return Err(IngestError::FailFast {
                path,
                source,
                summary: Box::new(summary),
            });
        }

        summary.state = if self.cancel.is_cancelled() {
            PipelineState::Cancelled
        } else {
            PipelineState::Completed
        };
        self.transition(repo, summary.state);
        self.reporter.report(ProgressEvent::Summary(summary.clone()));
        Ok(summary)
    }

    /// `path` is root-relative, like every other per-file progress event.
    fn record_unreadable(&self, summary: &mut RunSummary, path: PathBuf, err: ReadError) {
        tracing::warn!(error = %err, "skipping unreadable file");
        summary.skipped_read += 1;
        self.reporter.report(ProgressEvent::File {
            path,
            outcome: FileOutcome::Skipped {
                reason: err.source.to_string(),
            },
        });
    }

    fn record(
        &self,
        summary: &mut RunSummary,
        done: Result<FileReport, JoinError>,
        abort: &mut Option<(PathBuf, PublishError)>,
    ) {
        let report = match done {
            Ok(report) => report,
            Err(e) => FileReport {
                path: PathBuf::from("<worker>"),
                result: FileResult::NotPublished(PublishError::permanent(format!(
                    "worker task failed: {}",
                    e
                ))),
            },
        };

        let FileReport { path, result } = report;
        let outcome = match result {
            FileResult::Published { attempts } => {
                summary.published += 1;
                summary.publish_retries += u64::from(attempts.saturating_sub(1));
                FileOutcome::Published { attempts }
            }
            FileResult::Duplicate => {
                summary.duplicates += 1;
                FileOutcome::Duplicate
            }
            FileResult::Unreadable(e) => {
                self.record_unreadable(summary, path, e);
                return;
            }
            FileResult::NotPublished(e) => {
                tracing::warn!(path = %path.display(), error = %e, "publish failed");
                summary.failed_publish += 1;
                let outcome = FileOutcome::Failed {
                    reason: e.to_string(),
                };
                if self.config.ingest.fail_fast && abort.is_none() {
                    *abort = Some((path.clone(), e));
                }
                outcome
            }
        };

        self.reporter.report(ProgressEvent::File { path, outcome });
    }
}

/// `path` relative to the walk root; the root itself (or anything outside it)
/// is returned unchanged.
fn relative_to(root: &Path, path: &Path) -> PathBuf {
    match path.strip_prefix(root) {
        Ok(rel) if !rel.as_os_str().is_empty() => rel.to_path_buf(),
        _ => path.to_path_buf(),
    }
}
