//! One detection cycle: fetch, build features, score, persist.
//!
//! Every cycle is self-contained. Vocabularies and the fitted model are
//! dropped when `run_cycle` returns.

pub mod engine;
pub mod fetch;
pub mod sink;

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::detect::{AnomalyScorer, DetectError, ScoreOutcome, ScoringMode};
use crate::features::FeatureBuilder;
use crate::record::AnomalyBatch;
use crate::store::{AnomalyStore, LogStore};

pub use fetch::{FetchOutcome, RecordFetcher};
pub use sink::{AnomalySink, SinkOutcome, SinkReport};

/// Summary of one cycle, logged at the end of each run.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub fetched: usize,
    /// Set when the store could not be read this cycle.
    pub fetch_error: Option<String>,
    pub rule_flagged: usize,
    pub ml_flagged: usize,
    pub anomalies: usize,
    pub mode: ScoringMode,
    pub sink: SinkOutcome,
    pub elapsed: Duration,
}

impl CycleReport {
    pub fn log(&self) {
        let (written, failed) = match self.sink {
            SinkOutcome::Written(r) => (r.succeeded, r.failed),
            SinkOutcome::Skipped => (0, 0),
        };
        info!(
            cycle_id = %self.cycle_id,
            fetched = self.fetched,
            fetch_error = self.fetch_error.as_deref().unwrap_or(""),
            rule_flagged = self.rule_flagged,
            ml_flagged = self.ml_flagged,
            anomalies = self.anomalies,
            mode = ?self.mode,
            written,
            failed,
            elapsed_ms = self.elapsed.as_millis() as u64,
            "cycle complete"
        );
    }
}

/// The four stages wired to borrowed store handles.
pub struct Pipeline<'a> {
    logs: &'a dyn LogStore,
    anomalies: &'a dyn AnomalyStore,
    fetcher: RecordFetcher,
    builder: FeatureBuilder,
    scorer: AnomalyScorer,
    sink: AnomalySink,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &PipelineConfig, logs: &'a dyn LogStore, anomalies: &'a dyn AnomalyStore) -> Self {
        Self {
            logs,
            anomalies,
            fetcher: RecordFetcher::new(&config.store.log_index, config.batch_size),
            builder: FeatureBuilder::new(&config.features),
            scorer: AnomalyScorer::new(&config.scoring),
            sink: AnomalySink::new(&config.store.anomaly_index, &config.sink),
        }
    }

    /// Run one cycle. Anticipated failures (store outages, malformed records,
    /// small batches) are absorbed and reported; an `Err` here means a
    /// contract violation and should stop the process.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let cycle_id = Uuid::new_v4();
        let started = Instant::now();
        let detected_at = Utc::now();

        let fetched = self.fetcher.fetch(self.logs).await;
        let fetch_error = match &fetched {
            FetchOutcome::Unavailable { reason } => Some(reason.clone()),
            FetchOutcome::Empty => {
                info!(%cycle_id, "no log records fetched");
                None
            }
            FetchOutcome::Records(_) => None,
        };
        let records = fetched.into_records();
        let fetched_count = records.len();

        let builder = self.builder.clone();
        let scorer = self.scorer.clone();
        let outcome: ScoreOutcome = tokio::task::spawn_blocking(move || -> Result<ScoreOutcome, DetectError> {
            let features = builder.fit_transform(&records)?;
            scorer.score(records, &features, &builder)
        })
        .await
        .context("scoring task failed")?
        .context("scoring contract violated")?;

        let rule_flagged = outcome.records.iter().filter(|r| r.rule_flag).count();
        let ml_flagged = outcome.records.iter().filter(|r| r.ml_flag).count();
        let mode = outcome.mode;
        let batch = AnomalyBatch::from_scored(outcome.records);

        let sink = self.sink.persist(self.anomalies, &batch, cycle_id, detected_at).await;

        Ok(CycleReport {
            cycle_id,
            fetched: fetched_count,
            fetch_error,
            rule_flagged,
            ml_flagged,
            anomalies: batch.len(),
            mode,
            sink,
            elapsed: started.elapsed(),
        })
    }
}
