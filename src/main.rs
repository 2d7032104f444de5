use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use logwarden::config::PipelineConfig;

#[derive(Parser)]
#[command(
    name = "logwarden",
    about = "Batch anomaly detection over application logs",
    version,
    long_about = None
)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long, env = "LOGWARDEN_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = PipelineConfig::resolve(cli.config.as_deref())?;
    logwarden::telemetry::init(&config.logging);

    tracing::info!(
        config_file = ?cli.config,
        store = %config.store.url,
        log_index = %config.store.log_index,
        anomaly_index = %config.store.anomaly_index,
        batch_size = config.batch_size,
        poll_interval_secs = config.poll_interval_secs,
        min_training_size = config.scoring.min_training_size,
        contamination = %config.scoring.contamination,
        "Starting logwarden worker"
    );

    logwarden::run(config).await
}
