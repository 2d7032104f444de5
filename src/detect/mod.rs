//! Hybrid anomaly detection: severity rule plus a per-batch isolation forest.

pub mod forest;
pub mod scorer;

use thiserror::Error;

use crate::features::FeatureError;

pub use forest::IsolationForest;
pub use scorer::{AnomalyScorer, ScoreOutcome, ScoringMode};

/// Contract violations inside the scoring stage. None of these are expected
/// at runtime; the orchestrator treats them as fatal.
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("feature shape mismatch: expected {expected} columns, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("feature rows ({rows}) do not align with records ({records})")]
    Misaligned { rows: usize, records: usize },

    #[error("cannot fit a model on an empty training set")]
    EmptyTrainingSet,

    #[error(transparent)]
    Feature(#[from] FeatureError),
}
