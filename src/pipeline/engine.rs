//! Start-up readiness check and the timed cycle loop.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::time::Instant;
use tracing::{info, warn};

use super::Pipeline;
use crate::config::ReadinessConfig;
use crate::store::LogStore;

/// Ping the log store until it answers or `max_wait` runs out.
pub async fn wait_for_store(store: &dyn LogStore, config: &ReadinessConfig) -> Result<()> {
    let max_wait = Duration::from_secs(config.max_wait_secs);
    let retry = Duration::from_secs(config.retry_interval_secs);
    let deadline = Instant::now() + max_wait;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match store.ping().await {
            Ok(()) => {
                info!(attempt, "log store is reachable");
                return Ok(());
            }
            Err(e) => {
                if Instant::now() + retry > deadline {
                    bail!(
                        "log store not reachable after {}s ({attempt} attempts): {e}",
                        config.max_wait_secs
                    );
                }
                warn!(attempt, error = %e, retry_in_secs = retry.as_secs(), "log store not reachable yet");
                tokio::time::sleep(retry).await;
            }
        }
    }
}

/// Run cycles back to back with `interval` of idle time between them.
///
/// Returns `Ok(())` when Ctrl-C arrives; a signal received mid-cycle takes
/// effect once that cycle has finished. Any cycle error is returned as is.
pub async fn run_loop(pipeline: &Pipeline<'_>, interval: Duration) -> Result<()> {
    info!(interval_secs = interval.as_secs(), "detection loop started");

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        let report = pipeline.run_cycle().await?;
        report.log();

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            res = &mut shutdown => {
                res.context("failed to listen for shutdown signal")?;
                info!("shutdown requested, stopping detection loop");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::LogRecord;
    use crate::store::StoreError;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` pings, then succeeds.
    struct FlakyStore {
        failures: u32,
        pings: AtomicU32,
    }

    #[async_trait::async_trait]
    impl LogStore for FlakyStore {
        async fn ping(&self) -> Result<(), StoreError> {
            let n = self.pings.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(StoreError::Unavailable("connection refused".into()))
            } else {
                Ok(())
            }
        }

        async fn fetch_recent(&self, _index: &str, _size: usize) -> Result<Vec<LogRecord>, StoreError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_waits_until_store_answers() {
        let store = FlakyStore {
            failures: 2,
            pings: AtomicU32::new(0),
        };
        let cfg = ReadinessConfig {
            max_wait_secs: 5,
            retry_interval_secs: 0,
        };
        wait_for_store(&store, &cfg).await.unwrap();
        assert_eq!(store.pings.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_budget() {
        let store = FlakyStore {
            failures: u32::MAX,
            pings: AtomicU32::new(0),
        };
        let cfg = ReadinessConfig {
            max_wait_secs: 0,
            retry_interval_secs: 1,
        };
        let err = wait_for_store(&store, &cfg).await.unwrap_err();
        assert!(err.to_string().contains("not reachable"));
        assert_eq!(store.pings.load(Ordering::SeqCst), 1);
    }
}
