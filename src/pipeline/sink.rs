use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SinkConfig;
use crate::record::AnomalyBatch;
use crate::store::AnomalyStore;

/// Per-document write counts. `succeeded + failed == attempted` always holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkOutcome {
    /// Empty batch; nothing was sent to the store.
    Skipped,
    Written(SinkReport),
}

/// Bulk-writes flagged records to the anomaly index in bounded chunks.
#[derive(Debug, Clone)]
pub struct AnomalySink {
    index: String,
    chunk_size: usize,
    chunk_timeout: Duration,
}

impl AnomalySink {
    pub fn new(index: impl Into<String>, config: &SinkConfig) -> Self {
        Self {
            index: index.into(),
            chunk_size: config.chunk_size.max(1),
            chunk_timeout: config.chunk_timeout(),
        }
    }

    /// Best-effort persistence. Store failures are counted, never returned:
    /// a failed chunk marks its documents as failed and the next chunk is
    /// still attempted.
    pub async fn persist(
        &self,
        store: &dyn AnomalyStore,
        batch: &AnomalyBatch,
        cycle_id: Uuid,
        detected_at: DateTime<Utc>,
    ) -> SinkOutcome {
        if batch.is_empty() {
            info!("no anomalies to persist");
            return SinkOutcome::Skipped;
        }

        let docs: Vec<Value> = batch
            .records()
            .iter()
            .map(|r| r.to_document(&cycle_id, detected_at))
            .collect();
        let attempted = docs.len();

        if let Err(e) = store.ensure_index(&self.index).await {
            warn!(index = %self.index, error = %e, "could not ensure anomaly index, dropping batch");
            return SinkOutcome::Written(SinkReport {
                attempted,
                succeeded: 0,
                failed: attempted,
            });
        }

        let mut succeeded = 0;
        for (chunk_no, chunk) in docs.chunks(self.chunk_size).enumerate() {
            match store.bulk_insert(&self.index, chunk, self.chunk_timeout).await {
                Ok(outcome) => {
                    let ok = outcome.succeeded.min(chunk.len());
                    if ok < chunk.len() {
                        warn!(chunk = chunk_no, failed = chunk.len() - ok, "bulk chunk partially rejected");
                    } else {
                        debug!(chunk = chunk_no, written = ok, "bulk chunk written");
                    }
                    succeeded += ok;
                }
                Err(e) => {
                    warn!(chunk = chunk_no, size = chunk.len(), error = %e, "bulk chunk failed");
                }
            }
        }

        let report = SinkReport {
            attempted,
            succeeded,
            failed: attempted - succeeded,
        };
        info!(
            index = %self.index,
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            "anomalies persisted"
        );
        SinkOutcome::Written(report)
    }
}
