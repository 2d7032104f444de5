//! Log records as fetched from the store, and their scored counterparts.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::features::severity;

/// A single log document pulled from the log store.
///
/// Missing or misshapen fields are replaced with defaults on construction, so
/// building a `LogRecord` never fails.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    /// Store-assigned document id, when the store returned one.
    pub id: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub message: String,
    /// Normalized severity category (`INFO`, `ERROR`, ... or `UNKNOWN`).
    pub severity: String,
    /// The original document, untouched.
    pub source: Map<String, Value>,
}

impl LogRecord {
    /// Build a record from a raw `_source` document.
    pub fn from_document(id: Option<String>, doc: Value) -> Self {
        let source = match doc {
            Value::Object(map) => map,
            // Non-object documents are kept under a single key so nothing is lost.
            other => {
                let mut map = Map::new();
                map.insert("raw".to_string(), other);
                map
            }
        };

        let message = match source.get("message") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };

        let timestamp = source
            .get("@timestamp")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        let severity = severity::extract(&source);

        Self {
            id,
            timestamp,
            message,
            severity,
            source,
        }
    }

    /// Convenience constructor used by tests and fixtures.
    pub fn new(level: &str, message: &str) -> Self {
        Self::from_document(
            None,
            serde_json::json!({
                "log": { "level": level },
                "message": message,
            }),
        )
    }
}

/// A record together with the scorer's verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    pub record: LogRecord,
    pub severity_score: u8,
    pub rule_flag: bool,
    /// Isolation score minus the decision threshold. Positive means outlier;
    /// `0.0` is the neutral value used when the model was not trained.
    pub ml_score: f64,
    pub ml_flag: bool,
    pub anomaly_flag: bool,
}

impl ScoredRecord {
    pub fn new(record: LogRecord, severity_score: u8, rule_flag: bool, ml_score: f64, ml_flag: bool) -> Self {
        Self {
            record,
            severity_score,
            rule_flag,
            ml_score,
            ml_flag,
            anomaly_flag: rule_flag || ml_flag,
        }
    }

    /// Render the document written to the anomaly index: the original fields
    /// plus the derived scoring fields and cycle metadata.
    pub fn to_document(&self, cycle_id: &uuid::Uuid, detected_at: DateTime<Utc>) -> Value {
        let mut doc = self.record.source.clone();
        doc.insert("severity_score".into(), Value::from(self.severity_score));
        doc.insert("rule_flag".into(), Value::from(self.rule_flag));
        doc.insert("ml_score".into(), Value::from(self.ml_score));
        doc.insert("ml_flag".into(), Value::from(self.ml_flag));
        doc.insert("anomaly_flag".into(), Value::from(self.anomaly_flag));
        doc.insert("detected_at".into(), Value::from(detected_at.to_rfc3339()));
        doc.insert("cycle_id".into(), Value::from(cycle_id.to_string()));
        if let Some(id) = &self.record.id {
            doc.insert("source_id".into(), Value::from(id.clone()));
        }
        Value::Object(doc)
    }
}

/// The flagged subset of a scored batch, in fetch order.
#[derive(Debug, Clone, Default)]
pub struct AnomalyBatch {
    records: Vec<ScoredRecord>,
}

impl AnomalyBatch {
    /// Keep only records whose `anomaly_flag` is set.
    pub fn from_scored(scored: Vec<ScoredRecord>) -> Self {
        Self {
            records: scored.into_iter().filter(|r| r.anomaly_flag).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[ScoredRecord] {
        &self.records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_fields_get_defaults() {
        let rec = LogRecord::from_document(Some("abc".into()), json!({ "service": "flask-app" }));
        assert_eq!(rec.message, "");
        assert_eq!(rec.severity, "UNKNOWN");
        assert!(rec.timestamp.is_none());
        assert_eq!(rec.source.get("service"), Some(&json!("flask-app")));
    }

    #[test]
    fn test_parses_timestamp_and_level() {
        let rec = LogRecord::from_document(
            None,
            json!({
                "@timestamp": "2024-05-01T12:00:00Z",
                "log": { "level": "error" },
                "message": "Simulated error in /api/data POST."
            }),
        );
        assert_eq!(rec.severity, "ERROR");
        assert_eq!(rec.timestamp.unwrap().to_rfc3339(), "2024-05-01T12:00:00+00:00");
    }

    #[test]
    fn test_non_string_message_is_stringified() {
        let rec = LogRecord::from_document(None, json!({ "message": 42 }));
        assert_eq!(rec.message, "42");
    }

    #[test]
    fn test_non_object_document_is_preserved() {
        let rec = LogRecord::from_document(None, json!("plain line"));
        assert_eq!(rec.source.get("raw"), Some(&json!("plain line")));
        assert_eq!(rec.severity, "UNKNOWN");
    }

    #[test]
    fn test_document_carries_scoring_fields() {
        let mut rec = LogRecord::new("ERROR", "boom");
        rec.id = Some("doc-1".into());
        let scored = ScoredRecord::new(rec, 3, true, -0.1, false);
        assert!(scored.anomaly_flag);

        let cycle = uuid::Uuid::new_v4();
        let doc = scored.to_document(&cycle, Utc::now());
        assert_eq!(doc["rule_flag"], json!(true));
        assert_eq!(doc["ml_flag"], json!(false));
        assert_eq!(doc["anomaly_flag"], json!(true));
        assert_eq!(doc["severity_score"], json!(3));
        assert_eq!(doc["source_id"], json!("doc-1"));
        assert_eq!(doc["cycle_id"], json!(cycle.to_string()));
        assert_eq!(doc["message"], json!("boom"));
    }

    #[test]
    fn test_batch_keeps_only_flagged() {
        let scored = vec![
            ScoredRecord::new(LogRecord::new("INFO", "ok"), 1, false, 0.0, false),
            ScoredRecord::new(LogRecord::new("ERROR", "bad"), 3, true, 0.0, false),
            ScoredRecord::new(LogRecord::new("INFO", "odd"), 1, false, 0.2, true),
        ];
        let batch = AnomalyBatch::from_scored(scored);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.records()[0].record.message, "bad");
        assert_eq!(batch.records()[1].record.message, "odd");
    }
}
