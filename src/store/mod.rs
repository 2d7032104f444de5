//! Document store access: the log source and the anomaly results index.

pub mod elastic;

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::record::LogRecord;

pub use elastic::ElasticClient;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("store returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected store response: {0}")]
    Decode(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Per-document result of one bulk request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkOutcome {
    pub succeeded: usize,
    pub failed: usize,
}

/// Read side: where application logs live.
#[async_trait::async_trait]
pub trait LogStore: Send + Sync {
    /// Cheap reachability check.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Up to `size` most recent records of `index`, newest first.
    async fn fetch_recent(&self, index: &str, size: usize) -> Result<Vec<LogRecord>, StoreError>;
}

/// Write side: where flagged records are persisted.
#[async_trait::async_trait]
pub trait AnomalyStore: Send + Sync {
    /// Create `index` if it does not exist. An existing index is not an error.
    async fn ensure_index(&self, index: &str) -> Result<(), StoreError>;

    /// Insert `docs` as independent documents in one request bounded by
    /// `timeout`. Written documents must be visible to searches once this
    /// returns. Per-document failures are reported in the outcome, not as `Err`.
    async fn bulk_insert(&self, index: &str, docs: &[Value], timeout: Duration) -> Result<BulkOutcome, StoreError>;
}
