//! Ingestion progress reporting.
//!
//! Reports what the pipeline is doing so users can follow a run: state
//! transitions, one line per file with its outcome, and the final counters.
//! Progress is emitted on **stderr** so stdout remains parseable for scripts.

use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;

use crate::pipeline::{PipelineState, RunSummary};

/// What happened to a single file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum FileOutcome {
    Published { attempts: u32 },
    Duplicate,
    /// Could not be read; not retried.
    Skipped { reason: String },
    /// Read fine but could not be published.
    Failed { reason: String },
}

/// A single progress event.
#[derive(Clone, Debug)]
pub enum ProgressEvent {
    State { repo: String, state: PipelineState },
    File { path: PathBuf, outcome: FileOutcome },
    Summary(RunSummary),
}

/// Reports ingestion progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    /// Emit a progress event. Called from the pipeline, possibly while
    /// worker tasks are running.
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress on stderr: "ingest petclinic  published  src/app.py".
pub struct HumanProgress;

impl ProgressReporter for HumanProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::State { repo, state } => {
                format!("ingest {}  {}...\n", repo, state.as_str())
            }
            ProgressEvent::File { path, outcome } => match outcome {
                FileOutcome::Published { attempts } if *attempts > 1 => format!(
                    "  published  {}  (after {} attempts)\n",
                    path.display(),
                    attempts
                ),
                FileOutcome::Published { .. } => format!("  published  {}\n", path.display()),
                FileOutcome::Duplicate => format!("  duplicate  {}\n", path.display()),
                FileOutcome::Skipped { reason } => {
                    format!("  skipped    {}  ({})\n", path.display(), reason)
                }
                FileOutcome::Failed { reason } => {
                    format!("  FAILED     {}  ({})\n", path.display(), reason)
                }
            },
            ProgressEvent::Summary(s) => format!(
                "ingest {}  {}  {} files, {} published, {} skipped, {} failed\n",
                s.repo,
                s.state.as_str(),
                format_number(s.files_seen),
                format_number(s.published),
                format_number(s.skipped_read),
                format_number(s.failed_publish)
            ),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl JsonProgress {
    fn to_json(event: &ProgressEvent) -> serde_json::Value {
        match event {
            ProgressEvent::State { repo, state } => serde_json::json!({
                "event": "state",
                "repo": repo,
                "state": state,
            }),
            ProgressEvent::File { path, outcome } => {
                let mut obj = serde_json::json!({
                    "event": "file",
                    "path": path.to_string_lossy(),
                });
                if let (Some(map), Ok(serde_json::Value::Object(extra))) =
                    (obj.as_object_mut(), serde_json::to_value(outcome))
                {
                    map.extend(extra);
                }
                obj
            }
            ProgressEvent::Summary(s) => serde_json::json!({
                "event": "summary",
                "summary": s,
            }),
        }
    }
}

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        if let Ok(line) = serde_json::to_string(&Self::to_json(&event)) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> std::sync::Arc<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => std::sync::Arc::new(NoProgress),
            ProgressMode::Human => std::sync::Arc::new(HumanProgress),
            ProgressMode::Json => std::sync::Arc::new(JsonProgress),
        }
    }
}
