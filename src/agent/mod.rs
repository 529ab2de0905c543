//! Main orchestrator
//!
//! START → PLANNED → TOOL_EXECUTED → SYNTHESIZED → DONE
//!
//! A tool failure skips synthesis and ends in DONE with a degraded answer.
//! Only a request without query text ends in FAILED.

use crate::charts::SvgChartRenderer;
use crate::config::Config;
use crate::embeddings::GeminiEmbedder;
use crate::error::OrchestrationError;
use crate::llm::GeminiClient;
use crate::metrics::MetricsRecorder;
use crate::models::{FailureKind, FailureRecord, QueryResponse, ToolKind};
use crate::planner::Planner;
use crate::state::{PipelineState, RequestState, Stage};
use crate::synthesizer::Synthesizer;
use crate::tabular::CsvDirectorySource;
use crate::tools::{ChartTool, FinancialAnalysisTool, RetrievalTool, ToolContext, ToolRegistry};
use crate::vectorstore::QdrantIndex;
use crate::Result;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

pub struct Orchestrator {
    planner: Planner,
    registry: ToolRegistry,
    synthesizer: Synthesizer,
    metrics: MetricsRecorder,
}

impl Orchestrator {
    pub fn new(
        planner: Planner,
        registry: ToolRegistry,
        synthesizer: Synthesizer,
        metrics: MetricsRecorder,
    ) -> Self {
        Self {
            planner,
            registry,
            synthesizer,
            metrics,
        }
    }

    /// Wire the Gemini, Qdrant and CSV collaborators described by `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let llm = Arc::new(GeminiClient::new(
            config.gemini_api_key.clone(),
            &config.gemini_base_url,
            &config.llm_model,
            config.http_timeout,
        )?);

        let embedder = Arc::new(GeminiEmbedder::new(
            config.gemini_api_key.clone(),
            &config.gemini_base_url,
            &config.embedding_model,
            config.embedding_dimension,
            config.http_timeout,
        )?);

        let index = Arc::new(QdrantIndex::new(
            &config.qdrant_url,
            &config.collection_name,
            config.http_timeout,
        )?);

        let tables = Arc::new(CsvDirectorySource::new(
            config.structured_dir.clone(),
            config.company_map.clone(),
        ));

        let registry = ToolRegistry::new(
            Arc::new(RetrievalTool::new(embedder, index, config)),
            Arc::new(FinancialAnalysisTool::new(tables.clone(), config.retry.clone())),
            Arc::new(ChartTool::new(
                tables,
                Arc::new(SvgChartRenderer::new()),
                config.chart_output_path(),
                config.retry.clone(),
            )),
        );

        info!(
            model = %config.llm_model,
            collection = %config.collection_name,
            top_k = config.top_k,
            "Orchestrator configured"
        );

        Ok(Self::new(
            Planner::new(llm.clone()),
            registry,
            Synthesizer::new(llm, config.generation.clone(), config.retry.clone()),
            MetricsRecorder::new(config.metrics_file.clone()),
        ))
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Answer one query. Errors only for a request without query text;
    /// every other failure comes back as a degraded response.
    pub async fn handle(&self, query: &str) -> Result<QueryResponse> {
        let mut state = RequestState::new(query.trim());

        if state.query().is_empty() {
            let err = OrchestrationError::InvalidRequest("query must not be empty".to_string());
            self.fail(&mut state, "request", &err).await;
            return Err(err);
        }

        info!(
            request_id = %state.request_id,
            query = %state.query().chars().take(120).collect::<String>(),
            "Orchestrator: handling query"
        );

        if let Err(e) = self.run_pipeline(&mut state).await {
            error!(request_id = %state.request_id, error = %e, "Pipeline aborted");
            self.fail(&mut state, "orchestrator", &e).await;
            return Err(e);
        }

        self.write_metrics(&state).await;

        let response = state.to_response();
        info!(
            request_id = %state.request_id,
            tools = ?response.tools_used,
            sources = response.sources.len(),
            total_s = response.metrics.total_latency_s,
            "Orchestrator: done"
        );
        Ok(response)
    }

    async fn run_pipeline(&self, state: &mut RequestState) -> Result<()> {
        // === PLAN ===
        let decision = self.planner.route(state.query()).await;
        state.record_latency(Stage::Planner, decision.latency)?;
        state.set_route(decision.tool, decision.stage)?;
        if let Some(message) = decision.soft_failure {
            state.note_soft_failure(FailureRecord {
                kind: FailureKind::PlannerSoftFailure,
                stage: Stage::Planner.as_str().to_string(),
                message,
            });
        }
        state.advance(PipelineState::Planned)?;

        // === TOOL ===
        let tool = self.registry.get(decision.tool);
        let context = ToolContext::for_query(state.request_id, state.query());
        let started = Instant::now();
        let result = tool.execute(state.query(), &context).await;
        state.record_latency(Stage::Tool, started.elapsed())?;

        let output = match result {
            Ok(output) => output,
            Err(e) => {
                warn!(
                    request_id = %state.request_id,
                    tool = tool.name(),
                    error = %e,
                    "Tool failed, skipping synthesis"
                );
                state.advance(PipelineState::ToolExecuted)?;
                state.record_error(FailureRecord {
                    kind: e.failure_kind(),
                    stage: Stage::Tool.as_str().to_string(),
                    message: e.to_string(),
                });
                state.set_answer(tool_failure_answer(decision.tool, &e))?;
                return state.advance(PipelineState::Done);
            }
        };

        debug!(request_id = %state.request_id, tool = tool.name(), empty = output.is_empty(), "Tool completed");
        state.set_tool_output(output)?;
        state.advance(PipelineState::ToolExecuted)?;

        // === SYNTHESIZE ===
        let started = Instant::now();
        let synthesis = match state.tool_output() {
            Some(output) => self.synthesizer.synthesize(state.query(), output).await,
            None => {
                return Err(OrchestrationError::StateError(
                    "tool output missing after execution".to_string(),
                ))
            }
        };
        state.record_latency(Stage::Synthesizer, started.elapsed())?;

        if let Some(message) = synthesis.failure {
            state.note_soft_failure(FailureRecord {
                kind: FailureKind::ExternalServiceError,
                stage: Stage::Synthesizer.as_str().to_string(),
                message,
            });
        }
        state.set_answer(synthesis.answer)?;
        state.advance(PipelineState::Synthesized)?;
        state.advance(PipelineState::Done)
    }

    async fn fail(&self, state: &mut RequestState, stage: &str, err: &OrchestrationError) {
        state.record_error(FailureRecord {
            kind: err.failure_kind(),
            stage: stage.to_string(),
            message: err.to_string(),
        });
        if let Err(e) = state.advance(PipelineState::Failed) {
            warn!(error = %e, "Request already terminal");
        }
        self.write_metrics(state).await;
    }

    /// Losing a metrics line never fails the request.
    async fn write_metrics(&self, state: &RequestState) {
        if let Err(e) = self.metrics.record(state).await {
            warn!(
                request_id = %state.request_id,
                path = %self.metrics.path().display(),
                error = %e,
                "Failed to append metrics record"
            );
        }
    }
}

/// User-facing answer when the selected tool could not produce output.
fn tool_failure_answer(tool: ToolKind, err: &OrchestrationError) -> String {
    match err {
        OrchestrationError::DataError(message) => format!(
            "I couldn't answer this from the structured report data: {}.",
            message
        ),
        OrchestrationError::ExternalService { message, .. }
        | OrchestrationError::ServiceUnavailable { message, .. } => format!(
            "The {} tool could not complete this request ({}). Please try again later.",
            tool, message
        ),
        other => format!(
            "The {} tool failed while processing this request: {}.",
            tool, other
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricsRecord;
    use crate::models::PlannerStage;
    use crate::synthesizer::NO_INFORMATION_ANSWER;
    use crate::testing::{
        indexed_reports, orchestrator, temp_dir, FailingIndex, ScriptedModel, StubEmbedder,
    };
    use crate::vectorstore::InMemoryVectorIndex;
    use std::path::PathBuf;

    struct Harness {
        orchestrator: Orchestrator,
        model: Arc<ScriptedModel>,
        embedder: Arc<StubEmbedder>,
        dir: PathBuf,
    }

    impl Harness {
        fn chart_path(&self) -> PathBuf {
            self.dir.join("static").join("trend.svg")
        }

        fn metrics(&self) -> Vec<MetricsRecord> {
            std::fs::read_to_string(self.dir.join("logs").join("metrics.jsonl"))
                .unwrap()
                .lines()
                .map(|line| serde_json::from_str(line).unwrap())
                .collect()
        }
    }

    async fn harness(model: ScriptedModel, indexed: bool) -> Harness {
        let (embedder, index) = if indexed {
            indexed_reports().await
        } else {
            (
                Arc::new(StubEmbedder::new(128)),
                Arc::new(InMemoryVectorIndex::new(128)),
            )
        };

        let dir = temp_dir("orchestrator");
        let model = Arc::new(model);

        Harness {
            orchestrator: orchestrator(model.clone(), embedder.clone(), index, &dir),
            model,
            embedder,
            dir,
        }
    }

    #[tokio::test]
    async fn test_key_risks_question_is_grounded_in_2024_risk_factors() {
        let h = harness(ScriptedModel::new().reply("AI competition is a key risk [1]."), true).await;

        let response = h
            .orchestrator
            .handle("What are the key risks in 2024?")
            .await
            .unwrap();

        assert_eq!(response.answer, "AI competition is a key risk [1].");
        assert_eq!(response.tools_used, vec!["retriever"]);
        assert!(!response.sources.is_empty() && response.sources.len() <= 5);
        assert!(response
            .sources
            .iter()
            .all(|s| s.year == "2024" && s.section == "Risk Factors"));
        assert!(response
            .sources
            .windows(2)
            .all(|w| w[0].score >= w[1].score));
        assert!(response.image_path.is_none());
        assert!(response.error.is_none());

        // keyword route: the only model call is synthesis
        assert_eq!(h.model.calls(), 1);
        assert!(h.model.prompts()[0].contains("Risk Factors"));

        let records = h.metrics();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].tool_selected, "retriever");
        assert_eq!(records[0].planner_stage, Some(PlannerStage::Keyword));
        assert_eq!(records[0].outcome, "done");
        assert!(records[0].planner_latency_s.is_some());
        assert!(records[0].tool_latency_s.is_some());
        assert!(records[0].llm_latency_s.is_some());
    }

    #[tokio::test]
    async fn test_unrecognized_route_defaults_to_retrieval() {
        let h = harness(ScriptedModel::new().reply("banana"), true).await;

        let response = h
            .orchestrator
            .handle("asdkj qwoeiu random text")
            .await
            .unwrap();

        assert_eq!(response.tools_used, vec!["retriever"]);
        // nothing in the reports matches, so synthesis never calls the model
        assert_eq!(response.answer, NO_INFORMATION_ANSWER);
        assert_eq!(h.model.calls(), 1);

        let records = h.metrics();
        assert_eq!(records[0].planner_stage, Some(PlannerStage::LlmFallback));
        assert_eq!(records[0].soft_failures.len(), 1);
        assert_eq!(records[0].soft_failures[0].kind, FailureKind::PlannerSoftFailure);
        assert!(!records[0].error);
    }

    #[tokio::test]
    async fn test_empty_index_gives_fixed_answer() {
        let h = harness(ScriptedModel::new().reply("should not be used"), false).await;

        let response = h
            .orchestrator
            .handle("What are the key risks in 2024?")
            .await
            .unwrap();

        assert_eq!(response.answer, NO_INFORMATION_ANSWER);
        assert!(response.sources.is_empty());
        assert!(response.image_path.is_none());
        assert_eq!(h.model.calls(), 0);
        assert!(h.embedder.calls.load(std::sync::atomic::Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_revenue_graph_renders_chart() {
        let h = harness(
            ScriptedModel::new().reply("Revenue rose every year; see the chart."),
            true,
        )
        .await;

        let response = h
            .orchestrator
            .handle("Show revenue trend graph.")
            .await
            .unwrap();

        assert_eq!(response.tools_used, vec!["chart"]);
        let image = response.image_path.expect("chart path");
        assert_eq!(PathBuf::from(&image), h.chart_path());
        assert!(h.chart_path().exists());
        assert!(response.sources.is_empty());
        assert!(h.model.prompts()[0].contains(&image));

        assert!(h.metrics()[0].image);
    }

    #[tokio::test]
    async fn test_synthesis_failure_returns_raw_passages() {
        let h = harness(ScriptedModel::new().fail("model unavailable"), true).await;

        let response = h
            .orchestrator
            .handle("What are the key regulatory risks?")
            .await
            .unwrap();

        assert_eq!(response.sources.len(), 3);
        assert!(!response.answer.is_empty());
        assert!(response.answer.contains("regulatory scrutiny of cloud services"));
        assert!(response.error.is_none());
        assert!(response.metrics.llm_latency_s >= 0.0);

        let records = h.metrics();
        assert!(records[0].llm_latency_s.is_some());
        assert_eq!(records[0].outcome, "done");
        assert_eq!(records[0].soft_failures[0].stage, "synthesizer");
    }

    #[tokio::test]
    async fn test_missing_year_is_structured_failure() {
        let h = harness(ScriptedModel::new(), true).await;

        let response = h
            .orchestrator
            .handle("What was revenue growth in 2019?")
            .await
            .unwrap();

        assert_eq!(response.tools_used, vec!["financial"]);
        assert!(response.answer.contains("2019"));
        assert!(response.error.as_deref().unwrap().contains("2019"));
        assert_eq!(response.metrics.llm_latency_s, 0.0);
        assert_eq!(h.model.calls(), 0);

        let records = h.metrics();
        assert!(records[0].error);
        assert_eq!(records[0].error_kind, Some(FailureKind::DataError));
        assert!(records[0].llm_latency_s.is_none());
    }

    #[tokio::test]
    async fn test_index_failure_is_structured_failure() {
        let model = Arc::new(ScriptedModel::new().reply("unused"));
        let embedder = Arc::new(StubEmbedder::new(128));
        let dir = temp_dir("orchestrator");
        let h = Harness {
            orchestrator: orchestrator(model.clone(), embedder.clone(), Arc::new(FailingIndex), &dir),
            model,
            embedder,
            dir,
        };

        let response = h
            .orchestrator
            .handle("What are the key risks in 2024?")
            .await
            .unwrap();

        assert_eq!(response.tools_used, vec!["retriever"]);
        assert!(response.answer.contains("could not complete"));
        assert!(response.sources.is_empty());
        assert!(response.error.as_deref().unwrap().contains("wrong vector size"));
        assert_eq!(response.metrics.llm_latency_s, 0.0);
        assert_eq!(h.model.calls(), 0);

        let records = h.metrics();
        assert_eq!(records.len(), 1);
        assert!(records[0].error);
        assert_eq!(records[0].error_kind, Some(FailureKind::ExternalServiceError));
        assert_eq!(records[0].outcome, "done");
        assert!(records[0].llm_latency_s.is_none());
    }

    #[tokio::test]
    async fn test_blank_query_is_rejected_and_logged() {
        let h = harness(ScriptedModel::new(), true).await;

        let err = h.orchestrator.handle("   ").await.unwrap_err();
        assert!(matches!(err, OrchestrationError::InvalidRequest(_)));

        let records = h.metrics();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outcome, "failed");
        assert_eq!(records[0].tool_selected, "unresolved");
        assert_eq!(records[0].error_kind, Some(FailureKind::InvalidRequest));
    }

    #[tokio::test]
    async fn test_concurrent_requests_each_logged_once() {
        let h = harness(ScriptedModel::new(), true).await;
        let orchestrator = Arc::new(h.orchestrator);

        let queries = ["Show revenue trend graph.", "What was revenue growth in 2019?"];
        let mut handles = Vec::new();
        for i in 0..10 {
            let orchestrator = orchestrator.clone();
            let query = queries[i % 2];
            handles.push(tokio::spawn(async move { orchestrator.handle(query).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let contents =
            std::fs::read_to_string(h.dir.join("logs").join("metrics.jsonl")).unwrap();
        assert_eq!(contents.lines().count(), 10);
    }
}
