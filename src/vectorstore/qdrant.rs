//! Qdrant REST client (`/collections/{name}/points/search`).

use super::{ScoredPoint, SearchFilter, VectorIndex};
use crate::error::OrchestrationError;
use crate::Result;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, warn};

const SERVICE: &str = "qdrant";

pub struct QdrantIndex {
    client: Client,
    base_url: String,
    collection: String,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    vector: &'a [f32],
    limit: usize,
    with_payload: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<Value>,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: Vec<QdrantHit>,
}

#[derive(Deserialize)]
struct QdrantHit {
    id: Value,
    score: f32,
    #[serde(default)]
    payload: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
struct CountResponse {
    result: CountResult,
}

#[derive(Deserialize)]
struct CountResult {
    count: usize,
}

impl QdrantIndex {
    pub fn new(base_url: &str, collection: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            collection: collection.to_string(),
        })
    }

    fn collection_url(&self, suffix: &str) -> String {
        format!("{}/collections/{}{}", self.base_url, self.collection, suffix)
    }

    async fn post_json(&self, url: String, body: &impl Serialize) -> Result<Option<reqwest::Response>> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| OrchestrationError::transport(SERVICE, e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            warn!(collection = %self.collection, "Collection not found, treating index as empty");
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OrchestrationError::from_status(SERVICE, status, &body));
        }

        Ok(Some(response))
    }
}

fn filter_json(filter: &SearchFilter) -> Value {
    let must: Vec<Value> = filter
        .must_match
        .iter()
        .map(|(key, value)| json!({ "key": key, "match": { "value": value } }))
        .collect();
    json!({ "must": must })
}

fn point_id(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait::async_trait]
impl VectorIndex for QdrantIndex {
    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<ScoredPoint>> {
        let request = SearchRequest {
            vector,
            limit,
            with_payload: true,
            filter: filter.map(filter_json),
        };

        let Some(response) = self
            .post_json(self.collection_url("/points/search"), &request)
            .await?
        else {
            return Ok(Vec::new());
        };

        let parsed: SearchResponse = response.json().await.map_err(|e| {
            OrchestrationError::external(SERVICE, format!("Invalid search response: {}", e))
        })?;

        debug!(hits = parsed.result.len(), limit, "Qdrant search complete");

        Ok(parsed
            .result
            .into_iter()
            .map(|hit| ScoredPoint {
                id: point_id(&hit.id),
                score: hit.score,
                payload: hit.payload.unwrap_or_default(),
            })
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        let Some(response) = self
            .post_json(self.collection_url("/points/count"), &json!({ "exact": true }))
            .await?
        else {
            return Ok(0);
        };

        let parsed: CountResponse = response.json().await.map_err(|e| {
            OrchestrationError::external(SERVICE, format!("Invalid count response: {}", e))
        })?;
        Ok(parsed.result.count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_request_with_filter() {
        let filter = SearchFilter::field("year", "2024");
        let request = SearchRequest {
            vector: &[0.1, 0.2],
            limit: 5,
            with_payload: true,
            filter: Some(filter_json(&filter)),
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["limit"], 5);
        assert_eq!(json["filter"]["must"][0]["key"], "year");
        assert_eq!(json["filter"]["must"][0]["match"]["value"], "2024");
    }

    #[test]
    fn test_search_response_parsing() {
        let raw = r#"{
            "result": [
                {"id": "4f1c", "version": 3, "score": 0.82,
                 "payload": {"text": "Cybersecurity threats...", "year": "2024", "section": "Risk Factors"}},
                {"id": 17, "version": 3, "score": 0.61}
            ],
            "status": "ok", "time": 0.002
        }"#;

        let parsed: SearchResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.result.len(), 2);
        assert_eq!(point_id(&parsed.result[0].id), "4f1c");
        assert_eq!(point_id(&parsed.result[1].id), "17");
        assert!(parsed.result[1].payload.is_none());
    }
}
