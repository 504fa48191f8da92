//! Stream collaborator.
//!
//! [`StreamClient`] is the narrow append-only API the publisher depends on.
//! [`RedisStream`] appends with `XADD <stream> * field value ...` through a
//! `deadpool-redis` pool; [`MemoryStream`] keeps records in process for dry
//! runs and tests.

use async_trait::async_trait;
use deadpool_redis::redis::{self, ErrorKind, RedisError};
use deadpool_redis::{Config as RedisConfig, Pool};
use std::sync::Mutex;

use crate::error::PublishError;
use crate::models::StreamRecord;

#[async_trait]
pub trait StreamClient: Send + Sync {
    /// Append one record and return the broker-assigned record id.
    async fn append(&self, stream: &str, record: &StreamRecord) -> Result<String, PublishError>;

    /// Health probe.
    async fn ping(&self) -> Result<(), PublishError>;

    /// Release connections. Appends after `close` fail.
    fn close(&self) {}
}

pub struct RedisStream {
    pool: Pool,
}

impl RedisStream {
    /// Build a pool for `url`. No connection is made until the first call.
    pub fn connect(url: &str) -> anyhow::Result<Self> {
        let pool = RedisConfig::from_url(url)
            .create_pool(None)
            .map_err(|e| anyhow::anyhow!("invalid redis configuration for {}: {}", url, e))?;
        Ok(Self { pool })
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection, PublishError> {
        self.pool
            .get()
            .await
            .map_err(|e| PublishError::transient(format!("redis pool: {}", e)))
    }
}

#[async_trait]
impl StreamClient for RedisStream {
    async fn append(&self, stream: &str, record: &StreamRecord) -> Result<String, PublishError> {
        if record.fields.is_empty() {
            return Err(PublishError::permanent("stream record has no fields"));
        }
        let mut conn = self.conn().await?;
        let mut cmd = redis::cmd("XADD");
        cmd.arg(stream).arg("*");
        for (field, value) in &record.fields {
            cmd.arg(field).arg(value);
        }
        let id: String = cmd
            .query_async(&mut conn)
            .await
            .map_err(classify_redis_error)?;
        Ok(id)
    }

    async fn ping(&self) -> Result<(), PublishError> {
        let mut conn = self.conn().await?;
        let _pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(classify_redis_error)?;
        Ok(())
    }

    fn close(&self) {
        self.pool.close();
    }
}

/// Split broker errors into retryable and final ones.
pub fn classify_redis_error(err: RedisError) -> PublishError {
    let transient = err.is_io_error()
        || err.is_timeout()
        || err.is_connection_dropped()
        || err.is_connection_refusal()
        || matches!(
            err.kind(),
            ErrorKind::BusyLoadingError
                | ErrorKind::TryAgain
                | ErrorKind::ClusterDown
                | ErrorKind::MasterDown
        );
    if transient {
        PublishError::transient(err.to_string())
    } else {
        PublishError::permanent(err.to_string())
    }
}

/// In-process append-only stream. Record ids count up as `<n>-0`.
#[derive(Default)]
pub struct MemoryStream {
    entries: Mutex<Vec<(String, StreamRecord)>>,
}

impl MemoryStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records appended to `stream`, in append order.
    pub fn records(&self, stream: &str) -> Vec<StreamRecord> {
        self.lock()
            .iter()
            .filter(|(name, _)| name == stream)
            .map(|(_, r)| r.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(String, StreamRecord)>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl StreamClient for MemoryStream {
    async fn append(&self, stream: &str, record: &StreamRecord) -> Result<String, PublishError> {
        let mut entries = self.lock();
        entries.push((stream.to_string(), record.clone()));
        Ok(format!("{}-0", entries.len()))
    }

    async fn ping(&self) -> Result<(), PublishError> {
        Ok(())
    }
}
