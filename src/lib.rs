//! logwarden -- batch anomaly detection over application logs.
//!
//! Each cycle pulls the newest log records from an Elasticsearch-compatible
//! store, flags them with a severity rule and a freshly trained isolation
//! forest, and writes the flagged records back to an anomaly index.

pub mod config;
pub mod detect;
pub mod features;
pub mod pipeline;
pub mod record;
pub mod store;
pub mod telemetry;

use anyhow::{Context, Result};

use crate::config::PipelineConfig;
use crate::pipeline::Pipeline;
use crate::store::ElasticClient;

/// Start the worker: wait for the store, then run cycles until shutdown.
pub async fn run(config: PipelineConfig) -> Result<()> {
    // 1. One store handle for the whole process, borrowed by every stage
    let client = ElasticClient::new(&config.store).context("failed to build store client")?;

    // 2. Block until the log store answers
    tracing::info!(url = %config.store.url, "Waiting for log store");
    pipeline::engine::wait_for_store(&client, &config.readiness).await?;

    // 3. Cycle forever
    let pipeline = Pipeline::new(&config, &client, &client);
    pipeline::engine::run_loop(&pipeline, config.poll_interval()).await
}
