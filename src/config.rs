//! Crawler configuration.
//!
//! Values are merged in order: built-in defaults, then the TOML file, then
//! `DCSE_*` environment variables, then CLI flags (applied by the binary).
//! Every field has a default, so an empty file is a valid configuration.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub stream: StreamConfig,
    pub ingest: IngestConfig,
    pub clone: CloneConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StreamConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
    /// Full `redis://` URL. Takes precedence over `host`/`port` when non-empty.
    pub url: String,
    pub max_publish_attempts: u32,
    pub publish_timeout_ms: u64,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub dedup: DedupMode,
    pub dedup_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            name: "dcse_stream".to_string(),
            host: "127.0.0.1".to_string(),
            port: 6379,
            url: String::new(),
            max_publish_attempts: 5,
            publish_timeout_ms: 5_000,
            backoff_base_ms: 200,
            backoff_max_ms: 5_000,
            dedup: DedupMode::Document,
            dedup_capacity: 4096,
        }
    }
}

impl StreamConfig {
    pub fn redis_url(&self) -> String {
        if self.url.is_empty() {
            format!("redis://{}:{}/", self.host, self.port)
        } else {
            self.url.clone()
        }
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }
}

/// What the publisher's recent-hash cache treats as "already sent".
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum DedupMode {
    Off,
    /// Same id and same content hash.
    Document,
    /// Same content hash, regardless of which file it came from.
    Content,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IngestConfig {
    pub max_content_length: usize,
    pub clone_destination: PathBuf,
    pub fail_fast: bool,
    pub workers: usize,
    pub follow_symlinks: bool,
    /// When non-empty, replaces the "name contains a dot" filter.
    pub include_globs: Vec<String>,
    pub exclude_globs: Vec<String>,
    pub id_scheme: IdScheme,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_content_length: 5000,
            clone_destination: PathBuf::from("cloned_repo"),
            fail_fast: false,
            workers: 1,
            follow_symlinks: false,
            include_globs: Vec::new(),
            exclude_globs: Vec::new(),
            id_scheme: IdScheme::Absolute,
        }
    }
}

/// How a document id is derived from its file.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum IdScheme {
    /// Canonical absolute path on the crawling host.
    Absolute,
    /// `<repo>/<relative path>`, independent of where the clone lives.
    RepoRelative,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CloneConfig {
    pub shallow: bool,
    /// Empty means the remote's default branch.
    pub branch: String,
}

impl Default for CloneConfig {
    fn default() -> Self {
        Self {
            shallow: true,
            branch: String::new(),
        }
    }
}

impl Config {
    /// Check cross-field constraints. Called by [`load_config`]; call it again
    /// after applying CLI overrides.
    pub fn validate(&self) -> Result<()> {
        if self.stream.name.trim().is_empty() {
            bail!("stream.name must not be empty");
        }
        if self.stream.max_publish_attempts == 0 {
            bail!("stream.max_publish_attempts must be >= 1");
        }
        if self.stream.publish_timeout_ms == 0 {
            bail!("stream.publish_timeout_ms must be > 0");
        }
        if self.stream.backoff_base_ms > self.stream.backoff_max_ms {
            bail!(
                "stream.backoff_base_ms ({}) must not exceed stream.backoff_max_ms ({})",
                self.stream.backoff_base_ms,
                self.stream.backoff_max_ms
            );
        }
        if self.ingest.max_content_length == 0 {
            bail!("ingest.max_content_length must be >= 1");
        }
        if self.ingest.workers == 0 {
            bail!("ingest.workers must be >= 1");
        }
        build_globset(&self.ingest.include_globs).context("invalid ingest.include_globs")?;
        build_globset(&self.ingest.exclude_globs).context("invalid ingest.exclude_globs")?;
        Ok(())
    }

    /// Apply `DCSE_*` environment overrides on top of the current values.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    fn apply_env_from(&mut self, get: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = get("DCSE_STREAM_NAME") {
            self.stream.name = v;
        }
        if let Some(v) = get("DCSE_STREAM_HOST") {
            self.stream.host = v;
        }
        if let Some(v) = get("DCSE_STREAM_PORT") {
            self.stream.port = parse_env("DCSE_STREAM_PORT", &v)?;
        }
        if let Some(v) = get("DCSE_STREAM_URL") {
            self.stream.url = v;
        }
        if let Some(v) = get("DCSE_MAX_PUBLISH_ATTEMPTS") {
            self.stream.max_publish_attempts = parse_env("DCSE_MAX_PUBLISH_ATTEMPTS", &v)?;
        }
        if let Some(v) = get("DCSE_MAX_CONTENT_LENGTH") {
            self.ingest.max_content_length = parse_env("DCSE_MAX_CONTENT_LENGTH", &v)?;
        }
        if let Some(v) = get("DCSE_CLONE_DESTINATION") {
            self.ingest.clone_destination = PathBuf::from(v);
        }
        if let Some(v) = get("DCSE_FAIL_FAST") {
            self.ingest.fail_fast = parse_bool("DCSE_FAIL_FAST", &v)?;
        }
        if let Some(v) = get("DCSE_WORKERS") {
            self.ingest.workers = parse_env("DCSE_WORKERS", &v)?;
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| anyhow::anyhow!("{}: invalid value '{}': {}", key, value, e))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => bail!("{}: expected a boolean, got '{}'", key, other),
    }
}

/// Load configuration from `path` and the environment.
///
/// A missing file is only an error when `required` is set (the user named
/// it explicitly); otherwise defaults are used.
pub fn load_config(path: &Path, required: bool) -> Result<Config> {
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str::<Config>(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?
    } else if required {
        bail!("Config file not found: {}", path.display());
    } else {
        Config::default()
    };

    config.apply_env()?;
    config.validate()?;
    Ok(config)
}

pub(crate) fn build_globset(patterns: &[String]) -> Result<GlobSet, globset::Error> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    builder.build()
}
