//! # dcse-crawler CLI
//!
//! Clones a repository and publishes one document per file to the
//! `dcse_stream` Redis stream consumed by the indexer.
//!
//! ## Usage
//!
//! ```bash
//! dcse-crawler [--config ./config/dcse.toml] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `dcse-crawler ingest <url>` | Clone (once) and publish every file |
//! | `dcse-crawler walk <dir>` | List the files a run would publish, with hashes |
//! | `dcse-crawler check` | Ping the configured stream broker |
//!
//! ## Exit codes
//!
//! `0` when the run completes, `1` when the clone fails or a fail-fast run
//! aborts, `130` when interrupted with Ctrl-C.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use dcse_crawler::clone::GitCli;
use dcse_crawler::config::{self, Config};
use dcse_crawler::error::IngestError;
use dcse_crawler::hasher::content_hash;
use dcse_crawler::normalize::repo_name_from_url;
use dcse_crawler::pipeline::{CancelToken, Pipeline, PipelineState};
use dcse_crawler::progress::ProgressMode;
use dcse_crawler::publisher::Publisher;
use dcse_crawler::stream::{MemoryStream, RedisStream, StreamClient};
use dcse_crawler::walker::{walk, WalkOptions};

const DEFAULT_CONFIG: &str = "./config/dcse.toml";

/// Publish a repository's files to the indexer stream.
///
/// Settings come from the optional TOML file, then `DCSE_*` environment
/// variables, then the flags below.
#[derive(Parser)]
#[command(
    name = "dcse-crawler",
    about = "Publish a repository's files to the code search ingestion stream",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Optional; defaults apply when the
    /// default path does not exist.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clone a repository (unless already cloned) and publish its files.
    ///
    /// The clone destination is reused as-is when it exists; delete it to
    /// pick up new commits.
    Ingest {
        /// Repository URL, e.g. `https://github.com/org/repo.git`.
        repo_url: String,

        /// Clone destination directory.
        #[arg(long)]
        dest: Option<PathBuf>,

        /// Stream to append to.
        #[arg(long)]
        stream: Option<String>,

        /// Maximum characters of file text per document.
        #[arg(long)]
        max_content_length: Option<usize>,

        /// Attempts per document before giving up on it.
        #[arg(long)]
        max_publish_attempts: Option<u32>,

        /// Number of files processed concurrently.
        #[arg(long)]
        workers: Option<usize>,

        /// Abort the run on the first document that cannot be published.
        #[arg(long)]
        fail_fast: bool,

        /// Publish to an in-memory stream instead of Redis.
        #[arg(long)]
        dry_run: bool,

        /// Progress output on stderr. Defaults to `human` on a TTY, else `off`.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// List the files a run would publish, with language tag and content hash.
    Walk {
        /// Directory to walk.
        dir: PathBuf,
    },

    /// Check that the configured stream broker answers PING.
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = match &cli.config {
        Some(path) => config::load_config(path, true)?,
        None => config::load_config(PathBuf::from(DEFAULT_CONFIG).as_path(), false)?,
    };

    match cli.command {
        Commands::Ingest {
            repo_url,
            dest,
            stream,
            max_content_length,
            max_publish_attempts,
            workers,
            fail_fast,
            dry_run,
            progress,
        } => {
            let mut cfg = cfg;
            if let Some(dest) = dest {
                cfg.ingest.clone_destination = dest;
            }
            if let Some(stream) = stream {
                cfg.stream.name = stream;
            }
            if let Some(n) = max_content_length {
                cfg.ingest.max_content_length = n;
            }
            if let Some(n) = max_publish_attempts {
                cfg.stream.max_publish_attempts = n;
            }
            if let Some(n) = workers {
                cfg.ingest.workers = n;
            }
            if fail_fast {
                cfg.ingest.fail_fast = true;
            }
            cfg.validate()?;

            let progress = progress.unwrap_or_else(ProgressMode::default_for_tty);
            run_ingest(cfg, &repo_url, dry_run, progress).await
        }
        Commands::Walk { dir } => run_walk(&cfg, &dir),
        Commands::Check => run_check(&cfg).await,
    }
}

async fn run_ingest(
    cfg: Config,
    repo_url: &str,
    dry_run: bool,
    progress: ProgressMode,
) -> anyhow::Result<ExitCode> {
    let client: Arc<dyn StreamClient> = if dry_run {
        Arc::new(MemoryStream::new())
    } else {
        Arc::new(RedisStream::connect(&cfg.stream.redis_url())?)
    };
    let publisher = Arc::new(Publisher::new(client, &cfg.stream));
    let cloner = Arc::new(GitCli::from(&cfg.clone));

    let cancel = CancelToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("interrupted, finishing in-flight files...");
            on_signal.cancel();
        }
    });

    let pipeline = Pipeline::new(cfg, cloner, publisher)
        .with_reporter(progress.reporter())
        .with_cancel(cancel);

    match pipeline.run(repo_url).await {
        Ok(summary) => {
            print!("{}", summary.render());
            if summary.state == PipelineState::Cancelled {
                Ok(ExitCode::from(130))
            } else {
                Ok(ExitCode::SUCCESS)
            }
        }
        Err(e) => {
            if let IngestError::FailFast { summary, .. } = &e {
                print!("{}", summary.render());
            }
            eprintln!("Error: {}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn run_walk(cfg: &Config, dir: &std::path::Path) -> anyhow::Result<ExitCode> {
    let walker = walk(dir, &WalkOptions::from(&cfg.ingest))
        .with_context(|| format!("invalid file filter for {}", dir.display()))?;
    let repo = repo_name_from_url(&dir.to_string_lossy());

    let mut listed = 0u64;
    let mut skipped = 0u64;
    println!("{:<60} {:<8} HASH", "PATH", "LANG");
    for item in walker {
        let read = item.and_then(|entry| {
            std::fs::read(&entry.absolute_path)
                .map(|raw| (entry.clone(), content_hash(&raw)))
                .map_err(|e| dcse_crawler::error::ReadError::new(&entry.absolute_path, e))
        });
        match read {
            Ok((entry, hash)) => {
                listed += 1;
                println!(
                    "{:<60} {:<8} {}",
                    entry.relative_path.display(),
                    entry.extension,
                    hash
                );
            }
            Err(e) => {
                skipped += 1;
                println!("{:<60} {:<8} skipped: {}", e.path.display(), "-", e.source);
            }
        }
    }
    println!();
    println!("walk {}", repo);
    println!("  files: {}", listed);
    println!("  skipped (read error): {}", skipped);
    Ok(ExitCode::SUCCESS)
}

async fn run_check(cfg: &Config) -> anyhow::Result<ExitCode> {
    let url = cfg.stream.redis_url();
    let client = RedisStream::connect(&url)?;
    let result = client.ping().await;
    client.close();
    match result {
        Ok(()) => {
            println!("stream broker {}  OK", url);
            println!("  stream: {}", cfg.stream.name);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("stream broker {}  UNREACHABLE: {}", url, e);
            Ok(ExitCode::FAILURE)
        }
    }
}
