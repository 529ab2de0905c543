//! Embedding service seam
//!
//! Query vectors must come from the same model that embedded the indexed
//! chunks; the dimension is checked on every call.

use crate::error::OrchestrationError;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const SERVICE: &str = "embedding";

/// Trait for embedding generation
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
    fn model_name(&self) -> &str;
    fn dimension(&self) -> usize;
}

/// Gemini `embedContent` client
pub struct GeminiEmbedder {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    dimension: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest<'a> {
    content: EmbedContent<'a>,
    task_type: &'static str,
}

#[derive(Serialize)]
struct EmbedContent<'a> {
    parts: [EmbedPart<'a>; 1],
}

#[derive(Serialize)]
struct EmbedPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

impl GeminiEmbedder {
    pub fn new(
        api_key: String,
        base_url: &str,
        model: &str,
        dimension: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            dimension,
        })
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.api_key.is_empty() {
            return Err(OrchestrationError::external(
                SERVICE,
                "GEMINI_API_KEY not configured",
            ));
        }

        let url = format!("{}/models/{}:embedContent", self.base_url, self.model);

        let request = EmbedRequest {
            content: EmbedContent {
                parts: [EmbedPart { text }],
            },
            task_type: "RETRIEVAL_QUERY",
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| OrchestrationError::transport(SERVICE, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OrchestrationError::from_status(SERVICE, status, &body));
        }

        let parsed: EmbedResponse = response.json().await.map_err(|e| {
            OrchestrationError::external(SERVICE, format!("Failed to parse response: {}", e))
        })?;

        let values = parsed.embedding.values;
        if values.len() != self.dimension {
            return Err(OrchestrationError::external(
                SERVICE,
                format!(
                    "expected {} dimensions from {}, got {}",
                    self.dimension,
                    self.model,
                    values.len()
                ),
            ));
        }

        Ok(values)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let request = EmbedRequest {
            content: EmbedContent {
                parts: [EmbedPart { text: "cloud strategy" }],
            },
            task_type: "RETRIEVAL_QUERY",
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["taskType"], "RETRIEVAL_QUERY");
        assert_eq!(json["content"]["parts"][0]["text"], "cloud strategy");
    }

    #[tokio::test]
    async fn test_missing_key_is_external_error() {
        let embedder = GeminiEmbedder::new(
            String::new(),
            "http://localhost:1",
            "text-embedding-004",
            768,
            Duration::from_secs(1),
        )
        .unwrap();

        let err = embedder.embed("risk").await.unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_unreachable_service_hides_api_key() {
        let embedder = GeminiEmbedder::new(
            "SECRETKEY123".to_string(),
            "http://127.0.0.1:1",
            "text-embedding-004",
            768,
            Duration::from_secs(2),
        )
        .unwrap();

        let err = embedder.embed("risk").await.unwrap_err();
        assert!(!err.to_string().contains("SECRETKEY123"));
        assert!(err.is_transient());
    }
}
