//! Feature extraction: turns log records into fixed-width numeric rows.
//!
//! Column layout is `[one-hot severity] ++ [ordinal severity] ++ [term weights]`.
//! Both vocabularies are fitted per batch, so widths are only comparable within
//! a single cycle.

pub mod lexical;
pub mod severity;

use thiserror::Error;

use crate::config::FeaturesConfig;
use crate::record::LogRecord;
use lexical::TermVocabulary;
use severity::CategoryVocabulary;

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("feature row width mismatch: expected {expected}, got {actual}")]
    WidthMismatch { expected: usize, actual: usize },
}

/// Vocabularies fitted on a full batch, reusable on any subset of it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Vocabulary {
    pub categories: CategoryVocabulary,
    pub terms: TermVocabulary,
}

impl Vocabulary {
    /// Width of every row encoded against this vocabulary.
    pub fn width(&self) -> usize {
        self.categories.len() + 1 + self.terms.len()
    }
}

/// Rows aligned one-to-one with the input records, plus the vocabularies used.
#[derive(Debug, Clone)]
pub struct FeatureSet {
    pub rows: Vec<Vec<f64>>,
    pub vocabulary: Vocabulary,
}

#[derive(Debug, Clone)]
pub struct FeatureBuilder {
    max_terms: usize,
    min_token_len: usize,
}

impl FeatureBuilder {
    pub fn new(config: &FeaturesConfig) -> Self {
        Self {
            max_terms: config.max_terms,
            min_token_len: config.min_token_len,
        }
    }

    /// Fit both vocabularies on `records` and encode every record.
    pub fn fit_transform(&self, records: &[LogRecord]) -> Result<FeatureSet, FeatureError> {
        let vocabulary = Vocabulary {
            categories: CategoryVocabulary::fit(records.iter().map(|r| r.severity.as_str())),
            terms: TermVocabulary::fit(
                records.iter().map(|r| r.message.as_str()),
                self.max_terms,
                self.min_token_len,
            ),
        };

        let refs: Vec<&LogRecord> = records.iter().collect();
        let rows = self.transform(&refs, &vocabulary)?;
        Ok(FeatureSet { rows, vocabulary })
    }

    /// Encode `records` against an already fitted vocabulary.
    ///
    /// The severity block is one-hot encoded over the categories present in
    /// `records` and then reindexed onto `vocabulary.categories`, so a subset
    /// that lacks some categories still yields full-width rows.
    pub fn transform(&self, records: &[&LogRecord], vocabulary: &Vocabulary) -> Result<Vec<Vec<f64>>, FeatureError> {
        let local = CategoryVocabulary::fit(records.iter().map(|r| r.severity.as_str()));
        let width = vocabulary.width();

        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            let one_hot = local.encode(&record.severity);
            let mut row = local.reindex_onto(&vocabulary.categories, &one_hot)?;
            row.push(f64::from(severity::ordinal(&record.severity)));
            row.extend(vocabulary.terms.transform(&record.message));

            if row.len() != width {
                return Err(FeatureError::WidthMismatch {
                    expected: width,
                    actual: row.len(),
                });
            }
            rows.push(row);
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> FeatureBuilder {
        FeatureBuilder::new(&FeaturesConfig::default())
    }

    fn batch() -> Vec<LogRecord> {
        vec![
            LogRecord::new("INFO", "Serving home page."),
            LogRecord::new("ERROR", "Simulated error in /api/data POST."),
            LogRecord::new("WARNING", "Slow upstream response"),
            LogRecord::from_document(None, serde_json::json!({ "message": null })),
        ]
    }

    #[test]
    fn test_rows_align_with_records() {
        let set = builder().fit_transform(&batch()).unwrap();
        assert_eq!(set.rows.len(), 4);
        let width = set.vocabulary.width();
        assert!(set.rows.iter().all(|r| r.len() == width));
    }

    #[test]
    fn test_column_order() {
        let set = builder().fit_transform(&batch()).unwrap();
        // ERROR, INFO, UNKNOWN, WARNING
        assert_eq!(set.vocabulary.categories.len(), 4);

        let error_row = &set.rows[1];
        assert_eq!(&error_row[..4], &[1.0, 0.0, 0.0, 0.0]);
        assert_eq!(error_row[4], 3.0);

        let unknown_row = &set.rows[3];
        assert_eq!(&unknown_row[..4], &[0.0, 0.0, 1.0, 0.0]);
        assert_eq!(unknown_row[4], 0.0);
        assert!(unknown_row[5..].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_subset_transform_matches_full_rows() {
        let records = batch();
        let b = builder();
        let set = b.fit_transform(&records).unwrap();

        // Subset without the ERROR category.
        let subset: Vec<&LogRecord> = records.iter().filter(|r| r.severity != "ERROR").collect();
        let rows = b.transform(&subset, &set.vocabulary).unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], set.rows[0]);
        assert_eq!(rows[1], set.rows[2]);
        assert_eq!(rows[2], set.rows[3]);
    }

    #[test]
    fn test_empty_batch() {
        let set = builder().fit_transform(&[]).unwrap();
        assert!(set.rows.is_empty());
        assert_eq!(set.vocabulary.width(), 1);
    }
}
