//! Per-request state
//!
//! One `RequestState` is created for every query and owned by the
//! orchestrator until the response is assembled. Every slot is write-once,
//! and the pipeline phase only moves forward.

use crate::error::OrchestrationError;
use crate::models::{
    FailureRecord, PlannerStage, QueryResponse, ResponseMetrics, ToolKind, ToolOutput,
};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

/// Pipeline phases, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Start,
    Planned,
    ToolExecuted,
    Synthesized,
    Done,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Start => "start",
            PipelineState::Planned => "planned",
            PipelineState::ToolExecuted => "tool_executed",
            PipelineState::Synthesized => "synthesized",
            PipelineState::Done => "done",
            PipelineState::Failed => "failed",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timed stages of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Planner,
    Tool,
    Synthesizer,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Planner, Stage::Tool, Stage::Synthesizer];

    /// Key used in response metrics and the metrics log.
    pub fn metric_key(&self) -> &'static str {
        match self {
            Stage::Planner => "planner_latency_s",
            Stage::Tool => "tool_latency_s",
            Stage::Synthesizer => "llm_latency_s",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Planner => "planner",
            Stage::Tool => "tool",
            Stage::Synthesizer => "synthesizer",
        }
    }
}

/// Seconds rounded to milliseconds.
pub fn seconds(duration: Duration) -> f64 {
    (duration.as_secs_f64() * 1000.0).round() / 1000.0
}

#[derive(Debug)]
pub struct RequestState {
    pub request_id: Uuid,
    pub created_at: DateTime<Utc>,
    query: String,
    phase: PipelineState,
    tool_selected: Option<ToolKind>,
    planner_stage: Option<PlannerStage>,
    tool_output: Option<ToolOutput>,
    error: Option<FailureRecord>,
    soft_failures: Vec<FailureRecord>,
    answer: Option<String>,
    stage_latencies: BTreeMap<Stage, Duration>,
    started: Instant,
    total: Option<Duration>,
}

fn already_set(slot: &str) -> OrchestrationError {
    OrchestrationError::StateError(format!("{} already set", slot))
}

impl RequestState {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            created_at: Utc::now(),
            query: query.into(),
            phase: PipelineState::Start,
            tool_selected: None,
            planner_stage: None,
            tool_output: None,
            error: None,
            soft_failures: Vec::new(),
            answer: None,
            stage_latencies: BTreeMap::new(),
            started: Instant::now(),
            total: None,
        }
    }

    // ---- accessors ----

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn phase(&self) -> PipelineState {
        self.phase
    }

    pub fn tool_selected(&self) -> Option<ToolKind> {
        self.tool_selected
    }

    pub fn planner_stage(&self) -> Option<PlannerStage> {
        self.planner_stage
    }

    pub fn tool_output(&self) -> Option<&ToolOutput> {
        self.tool_output.as_ref()
    }

    pub fn error(&self) -> Option<&FailureRecord> {
        self.error.as_ref()
    }

    pub fn soft_failures(&self) -> &[FailureRecord] {
        &self.soft_failures
    }

    pub fn answer(&self) -> Option<&str> {
        self.answer.as_deref()
    }

    pub fn stage_latency(&self, stage: Stage) -> Option<Duration> {
        self.stage_latencies.get(&stage).copied()
    }

    pub fn stage_latencies(&self) -> &BTreeMap<Stage, Duration> {
        &self.stage_latencies
    }

    /// Frozen once the request reaches a terminal phase.
    pub fn total_latency(&self) -> Duration {
        self.total.unwrap_or_else(|| self.started.elapsed())
    }

    // ---- write-once slots ----

    pub fn set_route(&mut self, tool: ToolKind, stage: PlannerStage) -> Result<()> {
        if self.tool_selected.is_some() {
            return Err(already_set("tool_selected"));
        }
        self.tool_selected = Some(tool);
        self.planner_stage = Some(stage);
        Ok(())
    }

    pub fn set_tool_output(&mut self, output: ToolOutput) -> Result<()> {
        if self.tool_output.is_some() {
            return Err(already_set("tool_output"));
        }
        self.tool_output = Some(output);
        Ok(())
    }

    pub fn set_answer(&mut self, answer: impl Into<String>) -> Result<()> {
        if self.answer.is_some() {
            return Err(already_set("answer"));
        }
        self.answer = Some(answer.into());
        Ok(())
    }

    /// The first error wins; later ones are dropped. Returns whether
    /// `record` was kept.
    pub fn record_error(&mut self, record: FailureRecord) -> bool {
        if let Some(existing) = &self.error {
            debug!(
                kept = %existing.message,
                dropped = %record.message,
                "Request already carries an error"
            );
            return false;
        }
        self.error = Some(record);
        true
    }

    /// Recovered failures, kept for the log only.
    pub fn note_soft_failure(&mut self, record: FailureRecord) {
        self.soft_failures.push(record);
    }

    pub fn record_latency(&mut self, stage: Stage, elapsed: Duration) -> Result<()> {
        if self.stage_latencies.contains_key(&stage) {
            return Err(already_set(stage.metric_key()));
        }
        self.stage_latencies.insert(stage, elapsed);
        Ok(())
    }

    // ---- phase machine ----

    pub fn advance(&mut self, next: PipelineState) -> Result<()> {
        use PipelineState::*;

        let allowed = match (self.phase, next) {
            (from, Failed) => !from.is_terminal(),
            (Start, Planned) | (Planned, ToolExecuted) | (ToolExecuted, Synthesized) => true,
            (Synthesized, Done) => true,
            // synthesis is skipped after a tool failure
            (ToolExecuted, Done) => self.error.is_some(),
            _ => false,
        };

        if !allowed {
            return Err(OrchestrationError::StateError(format!(
                "illegal transition {} -> {}",
                self.phase, next
            )));
        }

        debug!(request_id = %self.request_id, from = %self.phase, to = %next, "Phase change");
        self.phase = next;
        if next.is_terminal() {
            self.total = Some(self.started.elapsed());
        }
        Ok(())
    }

    // ---- envelope ----

    pub fn response_metrics(&self) -> ResponseMetrics {
        let stage = |s: Stage| self.stage_latency(s).map(seconds).unwrap_or(0.0);
        ResponseMetrics {
            planner_latency_s: stage(Stage::Planner),
            tool_latency_s: stage(Stage::Tool),
            llm_latency_s: stage(Stage::Synthesizer),
            total_latency_s: seconds(self.total_latency()),
        }
    }

    /// Tools that actually ran for this request.
    pub fn tools_used(&self) -> Vec<String> {
        match self.tool_selected {
            Some(tool) if self.stage_latencies.contains_key(&Stage::Tool) => {
                vec![tool.name().to_string()]
            }
            _ => Vec::new(),
        }
    }

    pub fn to_response(&self) -> QueryResponse {
        QueryResponse {
            answer: self.answer.clone().unwrap_or_default(),
            tools_used: self.tools_used(),
            sources: self
                .tool_output
                .as_ref()
                .map(ToolOutput::sources)
                .unwrap_or_default(),
            image_path: self.tool_output.as_ref().and_then(ToolOutput::image_path),
            metrics: self.response_metrics(),
            error: self.error.as_ref().map(|e| e.message.clone()),
        }
    }
}
