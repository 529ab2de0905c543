//! In-memory cosine index for development and tests.

use super::{ScoredPoint, SearchFilter, VectorIndex};
use crate::error::OrchestrationError;
use crate::Result;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct IndexedPoint {
    id: String,
    vector: Vec<f32>,
    payload: Map<String, Value>,
}

pub struct InMemoryVectorIndex {
    dimension: usize,
    points: Arc<RwLock<Vec<IndexedPoint>>>,
}

impl InMemoryVectorIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            points: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Insert or replace a point by id.
    pub async fn upsert(&self, id: &str, vector: Vec<f32>, payload: Map<String, Value>) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(OrchestrationError::external(
                "vector_index",
                format!(
                    "vector has {} dimensions, index expects {}",
                    vector.len(),
                    self.dimension
                ),
            ));
        }

        let mut points = self.points.write().await;
        points.retain(|p| p.id != id);
        points.push(IndexedPoint {
            id: id.to_string(),
            vector,
            payload,
        });
        Ok(())
    }
}

#[async_trait::async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<ScoredPoint>> {
        if vector.len() != self.dimension {
            return Err(OrchestrationError::external(
                "vector_index",
                format!(
                    "query has {} dimensions, index expects {}",
                    vector.len(),
                    self.dimension
                ),
            ));
        }

        let points = self.points.read().await;

        let mut hits: Vec<ScoredPoint> = points
            .iter()
            .filter(|p| filter.map_or(true, |f| f.matches(&p.payload)))
            .map(|p| ScoredPoint {
                id: p.id.clone(),
                score: cosine_similarity(vector, &p.vector),
                payload: p.payload.clone(),
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.points.read().await.len())
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
