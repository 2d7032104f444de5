use tracing::{debug, warn};

use super::forest::{ForestParams, IsolationForest};
use super::DetectError;
use crate::config::ScoringConfig;
use crate::features::{severity, FeatureBuilder, FeatureSet};
use crate::record::{LogRecord, ScoredRecord};

/// How the model path behaved for one batch.
#[derive(Debug, Clone, PartialEq)]
pub enum ScoringMode {
    /// Nothing to score; no model was fitted.
    Empty,
    /// Too few non-rule-flagged records to train; rule-only verdicts.
    Degraded { training_size: usize, required: usize },
    /// The forest was trained and applied to every record.
    Model { training_size: usize, threshold: f64 },
}

#[derive(Debug, Clone)]
pub struct ScoreOutcome {
    pub mode: ScoringMode,
    /// One entry per input record, in input order.
    pub records: Vec<ScoredRecord>,
}

#[derive(Debug, Clone)]
pub struct AnomalyScorer {
    min_training_size: usize,
    params: ForestParams,
}

impl AnomalyScorer {
    pub fn new(config: &ScoringConfig) -> Self {
        Self {
            min_training_size: config.min_training_size,
            params: ForestParams::from(config),
        }
    }

    /// Score a batch. `features` must come from `builder.fit_transform(&records)`.
    ///
    /// The forest is trained on the records the rule did not flag, then
    /// applied to all of them; `anomaly_flag` is the OR of both verdicts.
    pub fn score(
        &self,
        records: Vec<LogRecord>,
        features: &FeatureSet,
        builder: &FeatureBuilder,
    ) -> Result<ScoreOutcome, DetectError> {
        if records.is_empty() {
            return Ok(ScoreOutcome {
                mode: ScoringMode::Empty,
                records: Vec::new(),
            });
        }
        if features.rows.len() != records.len() {
            return Err(DetectError::Misaligned {
                rows: features.rows.len(),
                records: records.len(),
            });
        }

        let rule_flags: Vec<bool> = records.iter().map(|r| severity::is_highest(&r.severity)).collect();
        let training: Vec<&LogRecord> = records
            .iter()
            .zip(&rule_flags)
            .filter(|(_, &flagged)| !flagged)
            .map(|(r, _)| r)
            .collect();

        let (mode, ml_scores) = if training.is_empty() || training.len() < self.min_training_size {
            warn!(
                training_size = training.len(),
                required = self.min_training_size,
                "too few non-error records to train, falling back to rule-only scoring"
            );
            let mode = ScoringMode::Degraded {
                training_size: training.len(),
                required: self.min_training_size,
            };
            (mode, vec![0.0; records.len()])
        } else {
            let training_rows = builder.transform(&training, &features.vocabulary)?;
            let forest = IsolationForest::fit(&training_rows, &self.params)?;
            debug!(
                training_size = training_rows.len(),
                width = forest.width(),
                threshold = forest.threshold(),
                "isolation forest fitted"
            );

            let scores = features
                .rows
                .iter()
                .map(|row| forest.decision(row))
                .collect::<Result<Vec<f64>, DetectError>>()?;

            let mode = ScoringMode::Model {
                training_size: training_rows.len(),
                threshold: forest.threshold(),
            };
            (mode, scores)
        };

        let scored = records
            .into_iter()
            .zip(rule_flags)
            .zip(ml_scores)
            .map(|((record, rule_flag), ml_score)| {
                let severity_score = severity::ordinal(&record.severity);
                ScoredRecord::new(record, severity_score, rule_flag, ml_score, ml_score > 0.0)
            })
            .collect();

        Ok(ScoreOutcome { mode, records: scored })
    }
}
