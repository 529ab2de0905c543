//! Semantic search over the indexed report chunks.

use super::{Tool, ToolContext};
use crate::config::{Config, RetryConfig};
use crate::embeddings::Embedder;
use crate::models::{Passage, ToolKind, ToolOutput};
use crate::retry::with_backoff;
use crate::vectorstore::{ScoredPoint, SearchFilter, VectorIndex};
use crate::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct RetrievalTool {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    top_k: usize,
    min_similarity: f32,
    year_filter: bool,
    retry: RetryConfig,
}

impl RetrievalTool {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>, config: &Config) -> Self {
        Self {
            embedder,
            index,
            top_k: config.top_k,
            min_similarity: config.min_similarity,
            year_filter: config.year_filter,
            retry: config.retry.clone(),
        }
    }

    async fn search(&self, vector: &[f32], filter: Option<&SearchFilter>) -> Result<Vec<Passage>> {
        let hits = with_backoff(&self.retry, "vector_search", || {
            self.index.search(vector, self.top_k, filter)
        })
        .await?;

        Ok(rank(hits, self.min_similarity, self.top_k))
    }

    fn empty(reason: impl Into<String>) -> ToolOutput {
        ToolOutput::Empty {
            tool: ToolKind::Retrieval,
            reason: reason.into(),
        }
    }
}

/// Drop hits below `min_similarity`, order best first, keep at most `k`.
fn rank(hits: Vec<ScoredPoint>, min_similarity: f32, k: usize) -> Vec<Passage> {
    let mut passages: Vec<Passage> = hits
        .into_iter()
        .filter(|hit| hit.score.is_finite() && hit.score >= min_similarity)
        .map(|hit| {
            let field = |key: &str| hit.payload_str(key).unwrap_or("unknown").to_string();
            Passage {
                text: hit.payload_str("text").unwrap_or_default().to_string(),
                company: field("company"),
                year: field("year"),
                section_label: field("section"),
                similarity_score: hit.score,
                id: hit.id,
            }
        })
        .filter(|p| !p.text.trim().is_empty())
        .collect();

    passages.sort_by(|a, b| b.similarity_score.total_cmp(&a.similarity_score));
    passages.truncate(k);
    passages
}

#[async_trait::async_trait]
impl Tool for RetrievalTool {
    fn kind(&self) -> ToolKind {
        ToolKind::Retrieval
    }

    fn description(&self) -> &'static str {
        "Semantic search over annual report narrative (risks, strategy, leadership)"
    }

    async fn execute(&self, query: &str, context: &ToolContext) -> Result<ToolOutput> {
        let vector = match with_backoff(&self.retry, "embedding", || self.embedder.embed(query)).await
        {
            Ok(v) => v,
            Err(e) => {
                warn!(request_id = %context.request_id, error = %e, "Query embedding failed");
                return Ok(Self::empty(format!("query embedding failed: {}", e)));
            }
        };

        debug!(dimension = vector.len(), "Query vector generated");

        // Narrow to the one fiscal year the question names, if any.
        let mut passages = Vec::new();
        if self.year_filter {
            if let [year] = context.fiscal_years.as_slice() {
                let filter = SearchFilter::field("year", year);
                passages = self.search(&vector, Some(&filter)).await?;
                if passages.is_empty() {
                    debug!(year = %year, "No hits for year filter, searching all years");
                }
            }
        }
        if passages.is_empty() {
            passages = self.search(&vector, None).await?;
        }

        if passages.is_empty() {
            let indexed = self.index.count().await.unwrap_or_default();
            warn!(request_id = %context.request_id, indexed, "No relevant passages found");
            let reason = if indexed == 0 {
                "the report index is empty"
            } else {
                "no passages above the similarity threshold"
            };
            return Ok(Self::empty(reason));
        }

        info!(
            request_id = %context.request_id,
            count = passages.len(),
            scores = ?passages.iter().map(|p| p.similarity_score).collect::<Vec<_>>(),
            "Passages retrieved"
        );

        Ok(ToolOutput::Passages { passages })
    }
}
