//! Elasticsearch-compatible REST client over reqwest.

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{AnomalyStore, BulkOutcome, LogStore, StoreError};
use crate::config::StoreConfig;
use crate::record::LogRecord;

/// One handle to the store, built at start-up and shared by reference with
/// every pipeline stage.
pub struct ElasticClient {
    client: Client,
    base_url: String,
    username: Option<String>,
    password: Option<String>,
}

impl ElasticClient {
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let builder = self.client.request(method, url);
        match &self.username {
            Some(user) => builder.basic_auth(user, self.password.as_deref()),
            None => builder,
        }
    }
}

async fn error_for_status(resp: reqwest::Response) -> StoreError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    StoreError::Status { status, body }
}

#[async_trait::async_trait]
impl LogStore for ElasticClient {
    async fn ping(&self) -> Result<(), StoreError> {
        let resp = self.request(Method::GET, "/").send().await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(error_for_status(resp).await)
        }
    }

    async fn fetch_recent(&self, index: &str, size: usize) -> Result<Vec<LogRecord>, StoreError> {
        let resp = self
            .request(Method::POST, &format!("{index}/_search"))
            .json(&search_body(size))
            .send()
            .await?;

        if resp.status() == StatusCode::NOT_FOUND {
            debug!(%index, "log index does not exist yet");
            return Ok(Vec::new());
        }
        if !resp.status().is_success() {
            return Err(error_for_status(resp).await);
        }

        let parsed: SearchResponse = resp
            .json()
            .await
            .map_err(|e| StoreError::Decode(format!("search response: {e}")))?;

        Ok(parsed
            .hits
            .hits
            .into_iter()
            .map(|hit| LogRecord::from_document(hit.id, hit.source))
            .collect())
    }
}

#[async_trait::async_trait]
impl AnomalyStore for ElasticClient {
    async fn ensure_index(&self, index: &str) -> Result<(), StoreError> {
        let resp = self
            .request(Method::PUT, index)
            .json(&anomaly_index_mappings())
            .send()
            .await?;

        if resp.status().is_success() {
            debug!(%index, "created anomaly index");
            return Ok(());
        }

        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        if is_already_exists(status, &body) {
            return Ok(());
        }
        Err(StoreError::Status { status, body })
    }

    async fn bulk_insert(&self, index: &str, docs: &[Value], timeout: Duration) -> Result<BulkOutcome, StoreError> {
        let payload = bulk_payload(docs)?;
        let resp = self
            .request(Method::POST, &bulk_path(index, timeout))
            .timeout(timeout)
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(payload)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(error_for_status(resp).await);
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| StoreError::Decode(format!("bulk response: {e}")))?;
        Ok(parse_bulk_response(&body, docs.len()))
    }
}

// ---------------------------------------------------------------------------
// Wire helpers
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: SearchHits,
}

#[derive(Debug, Deserialize)]
struct SearchHits {
    #[serde(default)]
    hits: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(rename = "_id", default)]
    id: Option<String>,
    #[serde(rename = "_source", default)]
    source: Value,
}

/// Newest-first query for the last `size` records.
fn search_body(size: usize) -> Value {
    json!({
        "size": size,
        "sort": [{ "@timestamp": { "order": "desc", "unmapped_type": "date" } }],
    })
}

/// Bulk endpoint that refreshes before returning and bounds server-side work.
fn bulk_path(index: &str, timeout: Duration) -> String {
    format!("{index}/_bulk?refresh=true&timeout={}s", timeout.as_secs().max(1))
}

fn anomaly_index_mappings() -> Value {
    json!({
        "mappings": {
            "properties": {
                "@timestamp": { "type": "date" },
                "detected_at": { "type": "date" },
                "cycle_id": { "type": "keyword" },
                "source_id": { "type": "keyword" },
                "severity_score": { "type": "byte" },
                "rule_flag": { "type": "boolean" },
                "ml_score": { "type": "double" },
                "ml_flag": { "type": "boolean" },
                "anomaly_flag": { "type": "boolean" }
            }
        }
    })
}

fn is_already_exists(status: u16, body: &str) -> bool {
    status == 400 && body.contains("resource_already_exists_exception")
}

/// NDJSON body: one `index` action line followed by the document, per doc.
fn bulk_payload(docs: &[Value]) -> Result<String, StoreError> {
    let mut payload = String::new();
    for doc in docs {
        payload.push_str("{\"index\":{}}\n");
        let line = serde_json::to_string(doc).map_err(|e| StoreError::Decode(format!("encode document: {e}")))?;
        payload.push_str(&line);
        payload.push('\n');
    }
    Ok(payload)
}

/// Count per-item results of a `_bulk` response. Items the store did not
/// report on are counted as failed, so `succeeded + failed == attempted`.
fn parse_bulk_response(body: &Value, attempted: usize) -> BulkOutcome {
    let items = body.get("items").and_then(Value::as_array);

    let mut succeeded = 0;
    let mut logged = 0;
    for item in items.into_iter().flatten().take(attempted) {
        let result = item.as_object().and_then(|o| o.values().next());
        let status = result.and_then(|r| r.get("status")).and_then(Value::as_u64).unwrap_or(0);
        let error = result.and_then(|r| r.get("error"));

        if (200..300).contains(&status) && error.is_none() {
            succeeded += 1;
        } else if logged < 3 {
            logged += 1;
            warn!(status, error = ?error, "bulk item rejected");
        }
    }

    BulkOutcome {
        succeeded,
        failed: attempted - succeeded,
    }
}
