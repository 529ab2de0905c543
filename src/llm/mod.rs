//! Language-model service seam
//!
//! The planner (routing fallback) and the synthesizer (answer composition)
//! both talk to the model through this trait.

use crate::config::GenerationParams;
use crate::Result;
use async_trait::async_trait;

pub mod gemini;
pub use gemini::GeminiClient;

#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub system: String,
    pub prompt: String,
    pub params: GenerationParams,
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub text: String,
    pub confidence: f32,
}

/// Trait for text generation
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_name(&self) -> &str;
    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse>;
}
