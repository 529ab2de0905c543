//! Append-only request metrics log
//!
//! One JSON object per line per request. Appends are serialized behind an
//! async mutex and each record goes out in a single `write_all`.

use crate::error::OrchestrationError;
use crate::models::{FailureKind, FailureRecord, PlannerStage};
use crate::state::{seconds, RequestState, Stage};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

const QUERY_CHARS: usize = 100;

/// Logged shape of one request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsRecord {
    pub timestamp: String,
    pub request_id: Uuid,
    pub query: String,
    /// Tool name, or `unresolved` when planning never completed.
    pub tool_selected: String,
    pub planner_stage: Option<PlannerStage>,
    pub tools: Vec<String>,
    pub image: bool,
    pub error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<FailureKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub soft_failures: Vec<FailureRecord>,
    pub outcome: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planner_latency_s: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_latency_s: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_latency_s: Option<f64>,
    pub total_latency_s: f64,
}

impl MetricsRecord {
    pub fn from_state(state: &RequestState) -> Self {
        let latency = |stage: Stage| state.stage_latency(stage).map(seconds);
        let error = state.error();

        Self {
            timestamp: state.created_at.to_rfc3339(),
            request_id: state.request_id,
            query: state.query().chars().take(QUERY_CHARS).collect(),
            tool_selected: state
                .tool_selected()
                .map_or("unresolved", |t| t.name())
                .to_string(),
            planner_stage: state.planner_stage(),
            tools: state.tools_used(),
            image: state
                .tool_output()
                .and_then(|o| o.image_path())
                .is_some(),
            error: error.is_some(),
            error_kind: error.map(|e| e.kind),
            error_message: error.map(|e| e.message.clone()),
            soft_failures: state.soft_failures().to_vec(),
            outcome: state.phase().to_string(),
            planner_latency_s: latency(Stage::Planner),
            tool_latency_s: latency(Stage::Tool),
            llm_latency_s: latency(Stage::Synthesizer),
            total_latency_s: seconds(state.total_latency()),
        }
    }
}

pub struct MetricsRecorder {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl MetricsRecorder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn record(&self, state: &RequestState) -> Result<()> {
        self.append(&MetricsRecord::from_state(state)).await
    }

    pub async fn append(&self, record: &MetricsRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let _guard = self.lock.lock().await;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                OrchestrationError::MetricsError(format!("{}: {}", parent.display(), e))
            })?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| {
                OrchestrationError::MetricsError(format!("{}: {}", self.path.display(), e))
            })?;

        file.write_all(&line).await?;
        file.flush().await?;

        debug!(request_id = %record.request_id, path = %self.path.display(), "Metrics appended");
        Ok(())
    }
}
