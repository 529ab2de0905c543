//! Leadership Insight Agent
//!
//! Answers questions about company annual reports:
//! - routes each query to one tool (narrative retrieval, financial trend
//!   analysis, or chart generation) by keyword, with a model fallback
//! - grounds the answer in the tool output, degrading instead of failing
//! - logs one metrics record per request with per-stage latencies
//!
//! PIPELINE:
//! QUERY → PLAN → TOOL → SYNTHESIZE → RESPONSE

pub mod agent;
pub mod api;
pub mod charts;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod fiscal;
pub mod llm;
pub mod metrics;
pub mod models;
pub mod planner;
pub mod retry;
pub mod state;
pub mod synthesizer;
pub mod tabular;
pub mod tools;
pub mod vectorstore;

#[cfg(test)]
mod testing;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use agent::Orchestrator;
pub use config::Config;
