//! Vector index seam
//!
//! Points carry the chunk text and its provenance in the payload
//! (`text`, `company`, `year`, `section`).

use crate::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};

pub mod memory;
pub mod qdrant;

pub use memory::InMemoryVectorIndex;
pub use qdrant::QdrantIndex;

/// Nearest-neighbour hit returned by an index.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f32,
    pub payload: Map<String, Value>,
}

impl ScoredPoint {
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }
}

/// Payload equality constraints, all of which must hold.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilter {
    pub must_match: Vec<(String, String)>,
}

impl SearchFilter {
    pub fn field(key: &str, value: &str) -> Self {
        Self {
            must_match: vec![(key.to_string(), value.to_string())],
        }
    }

    pub fn matches(&self, payload: &Map<String, Value>) -> bool {
        self.must_match.iter().all(|(key, expected)| match payload.get(key) {
            Some(Value::String(s)) => s == expected,
            Some(Value::Number(n)) => n.to_string() == *expected,
            _ => false,
        })
    }
}

/// Trait for nearest-neighbour search
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Up to `limit` hits, best first. A missing collection yields no hits.
    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<ScoredPoint>>;

    async fn count(&self) -> Result<usize>;
}
