//! Document publisher.
//!
//! Serializes a [`Document`] into a single-field stream record and appends it
//! through a [`StreamClient`], retrying transient failures with capped
//! exponential backoff. Each attempt has its own timeout; a timeout counts as
//! a transient failure.
//!
//! Delivery is at-least-once: a retry after an ambiguous failure (timeout,
//! dropped connection) can append the same document twice, so consumers key
//! on `id`/`hash`. The recent-hash cache only avoids obvious resends within
//! one run.
//!
//! Dedup is best-effort: a key is checked before the append and recorded only
//! after it succeeds, so with `workers > 1` two identical documents whose
//! publishes overlap can both reach the stream.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::{DedupMode, StreamConfig};
use crate::error::PublishError;
use crate::models::{Document, StreamRecord};
use crate::stream::StreamClient;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub attempt_timeout: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl RetryPolicy {
    /// Delay before the next attempt, after `failed` attempts have failed.
    /// `base`, `2 * base`, `4 * base`, ... capped at `backoff_max`.
    pub fn backoff(&self, failed: u32) -> Duration {
        let factor = 1u32 << failed.saturating_sub(1).min(16);
        self.backoff_base
            .saturating_mul(factor)
            .min(self.backoff_max)
    }
}

impl From<&StreamConfig> for RetryPolicy {
    fn from(cfg: &StreamConfig) -> Self {
        RetryPolicy {
            max_attempts: cfg.max_publish_attempts.max(1),
            attempt_timeout: cfg.publish_timeout(),
            backoff_base: Duration::from_millis(cfg.backoff_base_ms),
            backoff_max: Duration::from_millis(cfg.backoff_max_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Published { record_id: String, attempts: u32 },
    /// Already published earlier in this run; nothing was sent.
    Duplicate,
}

/// Bounded FIFO set of recently published keys.
struct RecentKeys {
    capacity: usize,
    order: VecDeque<String>,
    seen: HashSet<String>,
}

impl RecentKeys {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::new(),
            seen: HashSet::new(),
        }
    }

    fn contains(&self, key: &str) -> bool {
        self.seen.contains(key)
    }

    fn insert(&mut self, key: String) {
        if self.capacity == 0 || !self.seen.insert(key.clone()) {
            return;
        }
        self.order.push_back(key);
        while self.order.len() > self.capacity {
            if let Some(old) = self.order.pop_front() {
                self.seen.remove(&old);
            }
        }
    }
}

pub struct Publisher {
    client: Arc<dyn StreamClient>,
    stream: String,
    policy: RetryPolicy,
    dedup: DedupMode,
    recent: Mutex<RecentKeys>,
}

impl Publisher {
    pub fn new(client: Arc<dyn StreamClient>, cfg: &StreamConfig) -> Self {
        Self {
            client,
            stream: cfg.name.clone(),
            policy: RetryPolicy::from(cfg),
            dedup: cfg.dedup,
            recent: Mutex::new(RecentKeys::new(cfg.dedup_capacity)),
        }
    }

    pub fn stream_name(&self) -> &str {
        &self.stream
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn dedup_key(&self, doc: &Document) -> Option<String> {
        match self.dedup {
            DedupMode::Off => None,
            DedupMode::Document => Some(format!("{}\n{}", doc.id, doc.content_hash)),
            DedupMode::Content => Some(doc.content_hash.clone()),
        }
    }

    fn recent(&self) -> std::sync::MutexGuard<'_, RecentKeys> {
        self.recent.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append `doc` to the stream, retrying transient failures.
    ///
    /// Returns the last error once `max_attempts` is exhausted, or the first
    /// permanent error immediately.
    pub async fn publish(&self, doc: &Document) -> Result<PublishOutcome, PublishError> {
        let key = self.dedup_key(doc);
        if let Some(k) = &key {
            let seen = self.recent().contains(k);
            if seen {
                tracing::debug!(id = %doc.id, "skipping duplicate document");
                return Ok(PublishOutcome::Duplicate);
            }
        }

        // Serialize once, before touching the broker: a record is appended
        // whole or not at all.
        let record = StreamRecord::from_document(doc)
            .map_err(|e| PublishError::permanent(format!("cannot serialize {}: {}", doc.id, e)))?;

        let outcome = self.append_with_retry(&doc.id, &record).await?;
        if let Some(k) = key {
            let mut recent = self.recent();
            recent.insert(k);
        }
        Ok(outcome)
    }

    async fn append_with_retry(
        &self,
        doc_id: &str,
        record: &StreamRecord,
    ) -> Result<PublishOutcome, PublishError> {
        let max = self.policy.max_attempts;
        let mut last_err = None;

        for attempt in 1..=max {
            if attempt > 1 {
                tokio::time::sleep(self.policy.backoff(attempt - 1)).await;
            }

            let result = tokio::time::timeout(
                self.policy.attempt_timeout,
                self.client.append(&self.stream, record),
            )
            .await;

            let err = match result {
                Ok(Ok(record_id)) => {
                    return Ok(PublishOutcome::Published {
                        record_id,
                        attempts: attempt,
                    })
                }
                Ok(Err(e)) if e.is_transient() => e,
                Ok(Err(e)) => return Err(e),
                Err(_) => PublishError::transient(format!(
                    "append timed out after {} ms",
                    self.policy.attempt_timeout.as_millis()
                )),
            };

            tracing::warn!(id = doc_id, attempt, max, error = %err, "publish attempt failed");
            last_err = Some(err);
        }

        Err(last_err
            .unwrap_or_else(|| PublishError::transient("publish failed after retries"))
            .with_attempts(max))
    }

    /// Release the underlying stream connection.
    pub fn close(&self) {
        self.client.close();
    }
}
