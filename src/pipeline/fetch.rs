use tracing::{debug, warn};

use crate::record::LogRecord;
use crate::store::LogStore;

/// Result of pulling one batch from the log store.
#[derive(Debug)]
pub enum FetchOutcome {
    Records(Vec<LogRecord>),
    /// The store answered with no records.
    Empty,
    /// The store could not be reached or answered with an error. The cycle
    /// continues with an empty batch; the next tick retries.
    Unavailable { reason: String },
}

impl FetchOutcome {
    pub fn len(&self) -> usize {
        match self {
            FetchOutcome::Records(r) => r.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_records(self) -> Vec<LogRecord> {
        match self {
            FetchOutcome::Records(r) => r,
            _ => Vec::new(),
        }
    }
}

/// Pulls the newest `batch_size` records from one index.
#[derive(Debug, Clone)]
pub struct RecordFetcher {
    index: String,
    batch_size: usize,
}

impl RecordFetcher {
    pub fn new(index: impl Into<String>, batch_size: usize) -> Self {
        Self {
            index: index.into(),
            batch_size,
        }
    }

    /// Never fails: store errors become [`FetchOutcome::Unavailable`].
    pub async fn fetch(&self, store: &dyn LogStore) -> FetchOutcome {
        match store.fetch_recent(&self.index, self.batch_size).await {
            Ok(mut records) if !records.is_empty() => {
                records.truncate(self.batch_size);
                debug!(index = %self.index, count = records.len(), "fetched log records");
                FetchOutcome::Records(records)
            }
            Ok(_) => FetchOutcome::Empty,
            Err(e) => {
                warn!(index = %self.index, error = %e, "failed to fetch log records");
                FetchOutcome::Unavailable { reason: e.to_string() }
            }
        }
    }
}
