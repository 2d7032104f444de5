//! Severity extraction, the ordinal table, and the one-hot category vocabulary.

use serde_json::{Map, Value};

use super::FeatureError;

/// Category used when a record carries no readable severity.
pub const UNKNOWN: &str = "UNKNOWN";

/// The highest defined severity. Records in this category are rule-flagged.
pub const HIGHEST: &str = "ERROR";

/// Read the severity category from a raw document.
///
/// Looks at `log.level` first, then the flat `levelname` key written by
/// python-json-logger. Anything else yields [`UNKNOWN`].
pub fn extract(doc: &Map<String, Value>) -> String {
    let nested = doc
        .get("log")
        .and_then(Value::as_object)
        .and_then(|log| log.get("level"))
        .and_then(Value::as_str);

    let raw = nested.or_else(|| doc.get("levelname").and_then(Value::as_str));

    match raw {
        Some(level) => normalize(level),
        None => UNKNOWN.to_string(),
    }
}

/// Uppercase, trim, and fold aliases onto their canonical category.
pub fn normalize(level: &str) -> String {
    let upper = level.trim().to_ascii_uppercase();
    match upper.as_str() {
        "" => UNKNOWN.to_string(),
        "WARN" => "WARNING".to_string(),
        "ERR" | "CRITICAL" | "FATAL" => HIGHEST.to_string(),
        _ => upper,
    }
}

/// Fixed ordinal table. Unmapped categories sit at the bottom.
pub fn ordinal(category: &str) -> u8 {
    match category {
        "INFO" => 1,
        "WARNING" => 2,
        "ERROR" => 3,
        _ => 0,
    }
}

pub fn is_highest(category: &str) -> bool {
    category == HIGHEST
}

/// Sorted set of severity categories observed in a batch. Column `i` of the
/// one-hot block corresponds to `categories[i]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryVocabulary {
    categories: Vec<String>,
}

impl CategoryVocabulary {
    pub fn fit<'a, I>(categories: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut categories: Vec<String> = categories.into_iter().map(str::to_string).collect();
        categories.sort();
        categories.dedup();
        Self { categories }
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn index_of(&self, category: &str) -> Option<usize> {
        self.categories.binary_search_by(|c| c.as_str().cmp(category)).ok()
    }

    /// One-hot row for `category`. Categories outside the vocabulary encode
    /// as all zeros.
    pub fn encode(&self, category: &str) -> Vec<f64> {
        let mut row = vec![0.0; self.categories.len()];
        if let Some(i) = self.index_of(category) {
            row[i] = 1.0;
        }
        row
    }

    /// Move a row encoded against `self` onto the columns of `target`.
    ///
    /// Columns of `target` with no counterpart in `self` are zero-filled;
    /// columns of `self` missing from `target` are dropped.
    pub fn reindex_onto(&self, target: &CategoryVocabulary, row: &[f64]) -> Result<Vec<f64>, FeatureError> {
        if row.len() != self.categories.len() {
            return Err(FeatureError::WidthMismatch {
                expected: self.categories.len(),
                actual: row.len(),
            });
        }

        let mut out = vec![0.0; target.len()];
        for (category, &value) in self.categories.iter().zip(row) {
            if let Some(j) = target.index_of(category) {
                out[j] = value;
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_extract_nested_level() {
        assert_eq!(extract(&doc(json!({ "log": { "level": "warn" } }))), "WARNING");
        assert_eq!(extract(&doc(json!({ "log": { "level": " Error " } }))), "ERROR");
    }

    #[test]
    fn test_extract_falls_back_to_levelname() {
        assert_eq!(extract(&doc(json!({ "levelname": "INFO" }))), "INFO");
    }

    #[test]
    fn test_extract_malformed_is_unknown() {
        assert_eq!(extract(&doc(json!({}))), UNKNOWN);
        assert_eq!(extract(&doc(json!({ "log": "INFO" }))), UNKNOWN);
        assert_eq!(extract(&doc(json!({ "log": { "level": 3 } }))), UNKNOWN);
        assert_eq!(extract(&doc(json!({ "log": { "level": "" } }))), UNKNOWN);
    }

    #[test]
    fn test_ordinal_table() {
        assert!(ordinal("INFO") < ordinal("WARNING"));
        assert!(ordinal("WARNING") < ordinal("ERROR"));
        assert_eq!(ordinal("UNKNOWN"), 0);
        assert_eq!(ordinal("DEBUG"), 0);
        assert_eq!(ordinal("TRACE"), 0);
    }

    #[test]
    fn test_critical_is_error_equivalent() {
        assert!(is_highest(&normalize("critical")));
        assert!(is_highest(&normalize("FATAL")));
        assert!(!is_highest(&normalize("warning")));
    }

    #[test]
    fn test_encode_one_hot() {
        let vocab = CategoryVocabulary::fit(["INFO", "ERROR", "INFO", "WARNING"]);
        assert_eq!(vocab.categories(), &["ERROR", "INFO", "WARNING"]);
        assert_eq!(vocab.encode("INFO"), vec![0.0, 1.0, 0.0]);
        assert_eq!(vocab.encode("DEBUG"), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_reindex_zero_fills_missing_columns() {
        let full = CategoryVocabulary::fit(["ERROR", "INFO", "UNKNOWN", "WARNING"]);
        let subset = CategoryVocabulary::fit(["INFO", "WARNING"]);

        let row = subset.encode("WARNING");
        let reindexed = subset.reindex_onto(&full, &row).unwrap();
        assert_eq!(reindexed, vec![0.0, 0.0, 0.0, 1.0]);

        let row = subset.encode("INFO");
        assert_eq!(subset.reindex_onto(&full, &row).unwrap(), vec![0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_reindex_rejects_wrong_width() {
        let full = CategoryVocabulary::fit(["ERROR", "INFO"]);
        let subset = CategoryVocabulary::fit(["INFO"]);
        let err = subset.reindex_onto(&full, &[1.0, 0.0]).unwrap_err();
        assert!(matches!(err, FeatureError::WidthMismatch { expected: 1, actual: 2 }));
    }
}
