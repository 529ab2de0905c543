//! Two-stage query router
//!
//! Keyword lexicons decide most queries for free. Only when no lexicon
//! matches does the planner spend one language-model call, and any failure
//! there falls back to retrieval instead of surfacing an error.

use crate::config::GenerationParams;
use crate::llm::{LanguageModel, LlmRequest};
use crate::models::{PlannerStage, ToolKind};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub mod keywords;

/// Outcome of routing one query.
#[derive(Debug, Clone)]
pub struct RouteDecision {
    pub tool: ToolKind,
    pub stage: PlannerStage,
    pub reasoning: String,
    /// Set when the fallback call failed or was unparsable.
    pub soft_failure: Option<String>,
    pub latency: Duration,
}

pub struct Planner {
    llm: Arc<dyn LanguageModel>,
    params: GenerationParams,
}

const ROUTER_SYSTEM: &str =
    "You are a query router for a question-answering system over company annual reports.";

#[derive(Deserialize)]
struct RouteReply {
    tool: String,
    #[serde(default)]
    reason: String,
}

impl Planner {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self {
            llm,
            params: GenerationParams::routing(),
        }
    }

    /// Select the tool for `query`. Never fails.
    pub async fn route(&self, query: &str) -> RouteDecision {
        let started = Instant::now();

        let matched = keywords::matching_categories(query);
        if let Some(tool) = keywords::resolve(&matched) {
            let names: Vec<&str> = matched.iter().map(|k| k.name()).collect();
            info!(tool = %tool, matched = ?names, "Keyword route");

            return RouteDecision {
                tool,
                stage: PlannerStage::Keyword,
                reasoning: format!("keyword match: {}", names.join(", ")),
                soft_failure: None,
                latency: started.elapsed(),
            };
        }

        let (tool, reasoning, soft_failure) = self.classify(query).await;

        RouteDecision {
            tool,
            stage: PlannerStage::LlmFallback,
            reasoning,
            soft_failure,
            latency: started.elapsed(),
        }
    }

    /// One model call; anything short of a valid label routes to retrieval.
    async fn classify(&self, query: &str) -> (ToolKind, String, Option<String>) {
        let request = LlmRequest {
            system: ROUTER_SYSTEM.to_string(),
            prompt: build_prompt(query),
            params: self.params.clone(),
        };

        let failure = match self.llm.generate(&request).await {
            Ok(response) => match parse_route(&response.text) {
                Some((tool, reason)) => {
                    info!(tool = %tool, confidence = response.confidence, "LLM route");
                    return (tool, reason, None);
                }
                None => format!("unrecognized routing reply: {:?}", truncate(&response.text, 80)),
            },
            Err(e) => format!("routing model call failed: {}", e),
        };

        warn!(reason = %failure, "Planner fallback defaulted to retrieval");
        (
            ToolKind::Retrieval,
            "default route after planner soft failure".to_string(),
            Some(failure),
        )
    }
}

fn build_prompt(query: &str) -> String {
    format!(
        r#"Classify the question into exactly one tool.

Tools:
- retriever: narrative questions about risks, strategy, leadership, outlook or anything answered from report text
- financial: numeric questions about revenue, income, growth or year-over-year changes
- chart: requests to plot, graph or visualize a financial metric

Question:
{}

Return ONLY valid JSON:
{{"tool": "retriever" | "financial" | "chart", "reason": "<short reason>"}}"#,
        query
    )
}

/// Accepts the JSON reply, optionally fenced, or a bare label.
fn parse_route(reply: &str) -> Option<(ToolKind, String)> {
    let cleaned = reply
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    if cleaned.is_empty() {
        return None;
    }

    if let Ok(parsed) = serde_json::from_str::<RouteReply>(cleaned) {
        return ToolKind::from_label(&parsed.tool).map(|tool| (tool, parsed.reason));
    }

    ToolKind::from_label(cleaned).map(|tool| (tool, "bare label".to_string()))
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedModel;

    fn planner(model: &Arc<ScriptedModel>) -> Planner {
        Planner::new(model.clone())
    }

    #[test]
    fn test_parse_route() {
        assert_eq!(
            parse_route(r#"{"tool": "financial", "reason": "numbers"}"#),
            Some((ToolKind::Financial, "numbers".to_string()))
        );
        assert_eq!(
            parse_route("```json\n{\"tool\": \"chart\"}\n```").map(|r| r.0),
            Some(ToolKind::Chart)
        );
        assert_eq!(parse_route("retriever").map(|r| r.0), Some(ToolKind::Retrieval));
        assert_eq!(parse_route(r#"{"tool": "weather"}"#), None);
        assert_eq!(parse_route("   "), None);
    }

    #[tokio::test]
    async fn test_keyword_route_makes_no_model_call() {
        let model = Arc::new(ScriptedModel::new());
        let decision = planner(&model).route("What are the key risks in 2024?").await;

        assert_eq!(decision.tool, ToolKind::Retrieval);
        assert_eq!(decision.stage, PlannerStage::Keyword);
        assert!(decision.soft_failure.is_none());
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn test_fallback_uses_model_label() {
        let model = Arc::new(
            ScriptedModel::new().reply(r#"{"tool": "financial", "reason": "asks for figures"}"#),
        );
        let decision = planner(&model).route("How did Azure do?").await;

        assert_eq!(decision.tool, ToolKind::Financial);
        assert_eq!(decision.stage, PlannerStage::LlmFallback);
        assert_eq!(decision.reasoning, "asks for figures");
        assert_eq!(model.calls(), 1);
        assert!(model.prompts()[0].contains("How did Azure do?"));
    }

    #[tokio::test]
    async fn test_unrecognized_label_defaults_to_retrieval() {
        let model = Arc::new(ScriptedModel::new().reply("banana"));
        let decision = planner(&model).route("asdkj qwoeiu random text").await;

        assert_eq!(decision.tool, ToolKind::Retrieval);
        assert_eq!(decision.stage, PlannerStage::LlmFallback);
        assert!(decision.soft_failure.unwrap().contains("banana"));
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn test_model_error_defaults_to_retrieval() {
        let model = Arc::new(ScriptedModel::new().fail("quota exceeded"));
        let decision = planner(&model).route("asdkj qwoeiu random text").await;

        assert_eq!(decision.tool, ToolKind::Retrieval);
        assert!(decision.soft_failure.unwrap().contains("quota exceeded"));
        assert_eq!(model.calls(), 1);
    }
}
