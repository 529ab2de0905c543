//! Core data models for the leadership insight agent

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

//
// ================= Enums =================
//

/// Closed set of capabilities the planner can route a query to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    Retrieval,
    Financial,
    Chart,
}

impl ToolKind {
    /// Tie-break order when several keyword lexicons match.
    pub const PRIORITY: [ToolKind; 3] = [ToolKind::Retrieval, ToolKind::Financial, ToolKind::Chart];

    /// Provenance name reported in `tools_used`.
    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::Retrieval => "retriever",
            ToolKind::Financial => "financial",
            ToolKind::Chart => "chart",
        }
    }

    /// Parse a category label produced by the routing model.
    pub fn from_label(label: &str) -> Option<Self> {
        let cleaned = label
            .trim()
            .trim_matches(|c: char| c == '"' || c == '\'' || c == '.' || c == '`')
            .to_lowercase();

        match cleaned.as_str() {
            "retriever" | "retrieval" | "retrieve" | "narrative" => Some(ToolKind::Retrieval),
            "financial" | "finance" | "financial_analysis" => Some(ToolKind::Financial),
            "chart" | "plot" | "graph" => Some(ToolKind::Chart),
            _ => None,
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// How the planner arrived at its selection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlannerStage {
    Keyword,
    LlmFallback,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    PlannerSoftFailure,
    ExternalServiceError,
    DataError,
    InvalidRequest,
    Internal,
}

/// Structured failure attached to a request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailureRecord {
    pub kind: FailureKind,
    pub stage: String,
    pub message: String,
}

//
// ================= Tool Output =================
//

/// A retrieved chunk of narrative text with its provenance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Passage {
    pub id: String,
    pub text: String,
    pub similarity_score: f32,
    pub company: String,
    pub year: String,
    pub section_label: String,
}

/// Numeric trend statistics for one metric across fiscal years.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrendStatistics {
    pub company: Option<String>,
    pub metric: String,
    pub values_by_year: BTreeMap<String, f64>,
    /// Percent change against the previous year; the first year is `None`.
    pub yoy_growth_pct: BTreeMap<String, Option<f64>>,
    pub total_change_pct: Option<f64>,
    pub cagr_pct: Option<f64>,
    pub latest_year: String,
    pub latest_value: f64,
    pub columns_used: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChartArtifact {
    pub path: String,
    pub statistics: TrendStatistics,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolOutput {
    /// Non-empty, sorted by similarity descending.
    Passages { passages: Vec<Passage> },
    Trend { statistics: TrendStatistics },
    Chart { artifact: ChartArtifact },
    /// The tool ran fine but found nothing usable.
    Empty { tool: ToolKind, reason: String },
}

impl ToolOutput {
    pub fn is_empty(&self) -> bool {
        matches!(self, ToolOutput::Empty { .. })
    }

    pub fn sources(&self) -> Vec<Source> {
        match self {
            ToolOutput::Passages { passages } => passages.iter().map(Source::from).collect(),
            _ => Vec::new(),
        }
    }

    pub fn image_path(&self) -> Option<String> {
        match self {
            ToolOutput::Chart { artifact } => Some(artifact.path.clone()),
            _ => None,
        }
    }
}

//
// ================= Request / Response =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Source {
    pub company: String,
    pub year: String,
    pub section: String,
    pub score: f32,
}

impl From<&Passage> for Source {
    fn from(p: &Passage) -> Self {
        Self {
            company: p.company.clone(),
            year: p.year.clone(),
            section: p.section_label.clone(),
            score: p.similarity_score,
        }
    }
}

/// Latencies in seconds, rounded to milliseconds. Stages that did not run report 0.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResponseMetrics {
    pub planner_latency_s: f64,
    pub tool_latency_s: f64,
    pub llm_latency_s: f64,
    pub total_latency_s: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    pub tools_used: Vec<String>,
    pub sources: Vec<Source>,
    pub image_path: Option<String>,
    pub metrics: ResponseMetrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
