//! TOML configuration for the logwarden worker.
//!
//! Values come from, in order: compiled-in defaults, a TOML file (explicit
//! path, else `/etc/logwarden/logwarden.toml` when present), then
//! `LOGWARDEN_*` environment overrides. The merged result is validated once at
//! start-up; an invalid configuration is fatal.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Upper bound on records fetched per cycle, keeping fit/score well inside the interval.
pub const MAX_BATCH_SIZE: usize = 10_000;

const SYSTEM_CONFIG_PATH: &str = "/etc/logwarden/logwarden.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub store: StoreConfig,
    /// Records fetched per cycle.
    pub batch_size: usize,
    /// Pause between the end of one cycle and the start of the next.
    pub poll_interval_secs: u64,
    pub scoring: ScoringConfig,
    pub features: FeaturesConfig,
    pub sink: SinkConfig,
    pub readiness: ReadinessConfig,
    pub logging: LoggingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            batch_size: 1000,
            poll_interval_secs: 60,
            scoring: ScoringConfig::default(),
            features: FeaturesConfig::default(),
            sink: SinkConfig::default(),
            readiness: ReadinessConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Resolve the effective configuration for the process.
    ///
    /// An explicit path wins over the system location. Whichever file is
    /// chosen must load; only a missing system file falls back to defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        Self::resolve_with(explicit, Path::new(SYSTEM_CONFIG_PATH), |key| std::env::var(key).ok())
    }

    fn resolve_with<F>(explicit: Option<&Path>, system_path: &Path, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match explicit {
            Some(path) => Self::load(path)?,
            None if system_path.exists() => Self::load(system_path)?,
            None => Self::default(),
        };

        config.apply_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `LOGWARDEN_*` overrides. `lookup` abstracts the environment so
    /// tests can feed values without touching process state.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("LOGWARDEN_STORE_URL") {
            self.store.url = v;
        }
        if let Some(v) = lookup("LOGWARDEN_LOG_INDEX") {
            self.store.log_index = v;
        }
        if let Some(v) = lookup("LOGWARDEN_ANOMALY_INDEX") {
            self.store.anomaly_index = v;
        }
        if let Some(v) = lookup("LOGWARDEN_BATCH_SIZE") {
            self.batch_size = v
                .parse()
                .with_context(|| format!("LOGWARDEN_BATCH_SIZE is not a number: {v}"))?;
        }
        if let Some(v) = lookup("LOGWARDEN_POLL_INTERVAL_SECS") {
            self.poll_interval_secs = v
                .parse()
                .with_context(|| format!("LOGWARDEN_POLL_INTERVAL_SECS is not a number: {v}"))?;
        }
        if let Some(v) = lookup("LOGWARDEN_MIN_TRAINING_SIZE") {
            self.scoring.min_training_size = v
                .parse()
                .with_context(|| format!("LOGWARDEN_MIN_TRAINING_SIZE is not a number: {v}"))?;
        }
        if let Some(v) = lookup("LOGWARDEN_CONTAMINATION") {
            self.scoring.contamination = v.parse()?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            bail!("batch_size must be between 1 and {MAX_BATCH_SIZE}, got {}", self.batch_size);
        }
        if self.poll_interval_secs == 0 {
            bail!("poll_interval_secs must be greater than zero");
        }
        if self.scoring.min_training_size == 0 {
            bail!("scoring.min_training_size must be at least 1");
        }
        if let Contamination::Fraction(f) = self.scoring.contamination {
            if !(f > 0.0 && f <= 0.5) {
                bail!("contamination must be 'auto' or in (0, 0.5], got {f}");
            }
        }
        if self.scoring.trees == 0 {
            bail!("scoring.trees must be greater than zero");
        }
        if self.scoring.max_samples < 2 {
            bail!("scoring.max_samples must be at least 2");
        }
        if self.sink.chunk_size == 0 {
            bail!("sink.chunk_size must be greater than zero");
        }
        if self.sink.chunk_timeout_secs == 0 {
            bail!("sink.chunk_timeout_secs must be greater than zero");
        }
        if self.features.min_token_len == 0 {
            bail!("features.min_token_len must be at least 1");
        }
        if self.store.request_timeout_secs == 0 {
            bail!("store.request_timeout_secs must be greater than zero");
        }
        if self.readiness.retry_interval_secs == 0 {
            bail!("readiness.retry_interval_secs must be greater than zero");
        }
        if self.store.url.trim().is_empty() {
            bail!("store.url must not be empty");
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Connection settings for the Elasticsearch-compatible store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Base URL, e.g. `http://elasticsearch:9200`.
    pub url: String,
    /// Index (or pattern) the application logs are read from.
    pub log_index: String,
    /// Index flagged records are written to.
    pub anomaly_index: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Timeout for search, ping and index-management requests.
    pub request_timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9200".to_string(),
            log_index: "filebeat-*".to_string(),
            anomaly_index: "log-anomalies".to_string(),
            username: None,
            password: None,
            request_timeout_secs: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Expected share of outliers used to place the model's decision threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawContamination", into = "RawContamination")]
pub enum Contamination {
    /// Fixed threshold at an isolation score of 0.5.
    Auto,
    /// Threshold at the `1 - f` quantile of training scores.
    Fraction(f64),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawContamination {
    Fraction(f64),
    Keyword(String),
}

impl TryFrom<RawContamination> for Contamination {
    type Error = anyhow::Error;

    fn try_from(raw: RawContamination) -> Result<Self> {
        match raw {
            RawContamination::Fraction(f) => Ok(Contamination::Fraction(f)),
            RawContamination::Keyword(s) => s.parse(),
        }
    }
}

impl From<Contamination> for RawContamination {
    fn from(c: Contamination) -> Self {
        match c {
            Contamination::Auto => RawContamination::Keyword("auto".to_string()),
            Contamination::Fraction(f) => RawContamination::Fraction(f),
        }
    }
}

impl FromStr for Contamination {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("auto") {
            return Ok(Contamination::Auto);
        }
        let f: f64 = s
            .parse()
            .with_context(|| format!("contamination must be 'auto' or a fraction, got '{s}'"))?;
        Ok(Contamination::Fraction(f))
    }
}

impl fmt::Display for Contamination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Contamination::Auto => f.write_str("auto"),
            Contamination::Fraction(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Minimum non-rule-flagged records needed to train the model.
    pub min_training_size: usize,
    pub contamination: Contamination,
    /// Seed for tree construction; identical input and seed give identical scores.
    pub seed: u64,
    pub trees: usize,
    /// Per-tree subsample size cap.
    pub max_samples: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            min_training_size: 5,
            contamination: Contamination::Auto,
            seed: 42,
            trees: 100,
            max_samples: 256,
        }
    }
}

// ---------------------------------------------------------------------------
// Features
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeaturesConfig {
    /// Size bound of the per-batch term vocabulary.
    pub max_terms: usize,
    /// Tokens shorter than this are ignored.
    pub min_token_len: usize,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            max_terms: 100,
            min_token_len: 2,
        }
    }
}

// ---------------------------------------------------------------------------
// Sink
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Documents per bulk request.
    pub chunk_size: usize,
    pub chunk_timeout_secs: u64,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_timeout_secs: 30,
        }
    }
}

impl SinkConfig {
    pub fn chunk_timeout(&self) -> Duration {
        Duration::from_secs(self.chunk_timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// Readiness
// ---------------------------------------------------------------------------

/// Start-up wait for the log store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    pub max_wait_secs: u64,
    pub retry_interval_secs: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            max_wait_secs: 120,
            retry_interval_secs: 5,
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level when `RUST_LOG` is unset.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = PipelineConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.batch_size, 1000);
        assert_eq!(cfg.scoring.min_training_size, 5);
        assert_eq!(cfg.scoring.contamination, Contamination::Auto);
        assert_eq!(cfg.store.anomaly_index, "log-anomalies");
        assert_eq!(cfg.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let cfg: PipelineConfig = toml::from_str(
            r#"
            batch_size = 200

            [store]
            url = "http://es:9200"

            [scoring]
            contamination = 0.05
            "#,
        )
        .unwrap();
        assert_eq!(cfg.batch_size, 200);
        assert_eq!(cfg.store.url, "http://es:9200");
        assert_eq!(cfg.store.log_index, "filebeat-*");
        assert_eq!(cfg.scoring.contamination, Contamination::Fraction(0.05));
        assert_eq!(cfg.scoring.seed, 42);
        assert_eq!(cfg.sink.chunk_size, 500);
    }

    #[test]
    fn test_contamination_keyword_in_toml() {
        let cfg: PipelineConfig = toml::from_str("[scoring]\ncontamination = \"auto\"\n").unwrap();
        assert_eq!(cfg.scoring.contamination, Contamination::Auto);
        assert!(toml::from_str::<PipelineConfig>("[scoring]\ncontamination = \"lots\"\n").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("LOGWARDEN_STORE_URL", "http://elasticsearch:9200"),
            ("LOGWARDEN_BATCH_SIZE", "250"),
            ("LOGWARDEN_POLL_INTERVAL_SECS", "15"),
            ("LOGWARDEN_MIN_TRAINING_SIZE", "10"),
            ("LOGWARDEN_CONTAMINATION", "0.1"),
        ]
        .into_iter()
        .collect();

        let mut cfg = PipelineConfig::default();
        cfg.apply_overrides(|k| env.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(cfg.store.url, "http://elasticsearch:9200");
        assert_eq!(cfg.batch_size, 250);
        assert_eq!(cfg.poll_interval(), Duration::from_secs(15));
        assert_eq!(cfg.scoring.min_training_size, 10);
        assert_eq!(cfg.scoring.contamination, Contamination::Fraction(0.1));
    }

    #[test]
    fn test_bad_env_override_is_an_error() {
        let mut cfg = PipelineConfig::default();
        let res = cfg.apply_overrides(|k| (k == "LOGWARDEN_BATCH_SIZE").then(|| "many".to_string()));
        assert!(res.is_err());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut cfg = PipelineConfig::default();
        cfg.batch_size = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = PipelineConfig::default();
        cfg.batch_size = MAX_BATCH_SIZE + 1;
        assert!(cfg.validate().is_err());

        let mut cfg = PipelineConfig::default();
        cfg.scoring.contamination = Contamination::Fraction(0.7);
        assert!(cfg.validate().is_err());

        let mut cfg = PipelineConfig::default();
        cfg.poll_interval_secs = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_resolve_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "poll_interval_secs = 5\n[logging]\nformat = \"json\"").unwrap();

        let cfg = PipelineConfig::resolve(Some(file.path())).unwrap();
        assert_eq!(cfg.poll_interval_secs, 5);
        assert_eq!(cfg.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_validation_rejects_zero_training_size() {
        let mut cfg = PipelineConfig::default();
        cfg.apply_overrides(|k| (k == "LOGWARDEN_MIN_TRAINING_SIZE").then(|| "0".to_string()))
            .unwrap();
        assert_eq!(cfg.scoring.min_training_size, 0);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_timeouts() {
        let mut cfg = PipelineConfig::default();
        cfg.readiness.retry_interval_secs = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = PipelineConfig::default();
        cfg.store.request_timeout_secs = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = PipelineConfig::default();
        cfg.sink.chunk_timeout_secs = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = PipelineConfig::default();
        cfg.features.min_token_len = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_broken_system_file_is_fatal() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "batch_size = \"lots\"").unwrap();

        let res = PipelineConfig::resolve_with(None, file.path(), |_| None);
        assert!(res.is_err());
    }

    #[test]
    fn test_missing_system_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = PipelineConfig::resolve_with(None, &dir.path().join("absent.toml"), |_| None).unwrap();
        assert_eq!(cfg.batch_size, 1000);
    }

    #[test]
    fn test_explicit_file_wins_over_system_file() {
        let mut system = tempfile::NamedTempFile::new().unwrap();
        writeln!(system, "batch_size = 10").unwrap();
        let mut explicit = tempfile::NamedTempFile::new().unwrap();
        writeln!(explicit, "batch_size = 20").unwrap();

        let cfg = PipelineConfig::resolve_with(Some(explicit.path()), system.path(), |_| None).unwrap();
        assert_eq!(cfg.batch_size, 20);
    }

    #[test]
    fn test_resolve_missing_explicit_file_fails() {
        let res = PipelineConfig::resolve(Some(Path::new("/nonexistent/logwarden.toml")));
        assert!(res.is_err());
    }
}
