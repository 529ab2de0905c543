//! Shared fakes for unit tests.

use crate::agent::Orchestrator;
use crate::charts::SvgChartRenderer;
use crate::config::{Config, RetryConfig};
use crate::embeddings::Embedder;
use crate::error::OrchestrationError;
use crate::llm::{LanguageModel, LlmRequest, LlmResponse};
use crate::metrics::MetricsRecorder;
use crate::planner::Planner;
use crate::synthesizer::Synthesizer;
use crate::tabular::{Metric, StaticTabularSource};
use crate::tools::{ChartTool, FinancialAnalysisTool, RetrievalTool, ToolRegistry};
use crate::vectorstore::{InMemoryVectorIndex, ScoredPoint, SearchFilter, VectorIndex};
use crate::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Fresh empty directory under the system temp dir.
pub fn temp_dir(prefix: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("{}-{}", prefix, Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

const STOPWORDS: &[&str] = &[
    "the", "and", "what", "are", "for", "how", "with", "was", "were", "did", "has", "have", "its",
];

/// Bag-of-words vectors over a growing vocabulary: texts sharing words
/// score above zero, unrelated texts score zero.
pub struct StubEmbedder {
    dimension: usize,
    failing: bool,
    vocabulary: Mutex<HashMap<String, usize>>,
    pub calls: AtomicUsize,
}

impl StubEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            failing: false,
            vocabulary: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(dimension: usize) -> Self {
        Self {
            failing: true,
            ..Self::new(dimension)
        }
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dimension];
        let mut vocabulary = self.vocabulary.lock().unwrap();
        let lowered = text.to_lowercase();

        for token in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() >= 3 && !STOPWORDS.contains(t))
        {
            let token = match token.strip_suffix('s') {
                Some(stem) if stem.len() >= 4 => stem,
                _ => token,
            };
            let next = vocabulary.len();
            let slot = *vocabulary.entry(token.to_string()).or_insert(next);
            vector[slot % self.dimension] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl Embedder for StubEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(OrchestrationError::external("embedding", "model not found"));
        }
        Ok(self.vector(text))
    }

    fn model_name(&self) -> &str {
        "stub-embedding"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Two fiscal years of report chunks for one company.
pub async fn indexed_reports() -> (Arc<StubEmbedder>, Arc<InMemoryVectorIndex>) {
    let embedder = Arc::new(StubEmbedder::new(128));
    let index = Arc::new(InMemoryVectorIndex::new(128));

    let chunks = [
        ("m23-risk", "2023", "Risk Factors",
         "Key risks in 2023 include cybersecurity threats and regulatory scrutiny of cloud services."),
        ("m23-leadership", "2023", "Leadership",
         "The leadership team in 2023 prioritised cloud growth and responsible AI."),
        ("m24-risk-1", "2024", "Risk Factors",
         "Key risks in 2024 include AI competition, cybersecurity threats and datacenter supply constraints."),
        ("m24-risk-2", "2024", "Risk Factors",
         "Regulatory risks in 2024 increased as governments examined AI and cloud market practices."),
        ("m24-strategy", "2024", "Strategy",
         "Leadership in 2024 focused on AI platform investments across Azure and Copilot."),
    ];

    for (id, year, section, text) in chunks {
        let Value::Object(payload) = json!({
            "text": text,
            "company": "Microsoft",
            "year": year,
            "section": section,
            "document_type": "annual_report",
        }) else {
            unreachable!()
        };
        index
            .upsert(id, embedder.vector(text), payload)
            .await
            .unwrap();
    }

    (embedder, index)
}

/// Language model returning queued replies in order, then failing.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String>>>,
    requests: Mutex<Vec<LlmRequest>>,
    calls: AtomicUsize,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn reply(self, text: &str) -> Self {
        self.replies.lock().unwrap().push_back(Ok(text.to_string()));
        self
    }

    pub fn fail(self, message: &str) -> Self {
        self.replies
            .lock()
            .unwrap()
            .push_back(Err(OrchestrationError::LlmError(message.to_string())));
        self
    }

    /// Queue a transient failure (retried by callers with backoff).
    pub fn unavailable(self, message: &str) -> Self {
        self.replies
            .lock()
            .unwrap()
            .push_back(Err(OrchestrationError::unavailable("gemini", message)));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.prompt.clone())
            .collect()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(Ok(text)) => Ok(LlmResponse {
                text,
                confidence: 0.9,
            }),
            Some(Err(e)) => Err(e),
            None => Err(OrchestrationError::LlmError("no scripted reply left".into())),
        }
    }
}

/// Vector index whose every call fails with a permanent service error.
pub struct FailingIndex;

#[async_trait]
impl VectorIndex for FailingIndex {
    async fn search(
        &self,
        _vector: &[f32],
        _limit: usize,
        _filter: Option<&SearchFilter>,
    ) -> Result<Vec<ScoredPoint>> {
        Err(OrchestrationError::external("qdrant", "HTTP 400 Bad Request: wrong vector size"))
    }

    async fn count(&self) -> Result<usize> {
        Err(OrchestrationError::external("qdrant", "HTTP 400 Bad Request"))
    }
}

/// Orchestrator over in-process fakes. Charts land in `dir/static/trend.svg`
/// and metrics in `dir/logs/metrics.jsonl`; the tabular source holds three
/// years of Microsoft revenue.
pub fn orchestrator(
    model: Arc<ScriptedModel>,
    embedder: Arc<StubEmbedder>,
    index: Arc<dyn VectorIndex>,
    dir: &Path,
) -> Orchestrator {
    let config = Config {
        top_k: 5,
        min_similarity: 0.3,
        ..Config::default()
    };

    let tables = Arc::new(StaticTabularSource::new().with_series(
        Metric::Revenue,
        "Microsoft",
        &[("2023", 211915.0), ("2024", 245122.0), ("2025", 281724.0)],
    ));

    let registry = ToolRegistry::new(
        Arc::new(RetrievalTool::new(embedder, index, &config)),
        Arc::new(FinancialAnalysisTool::new(tables.clone(), RetryConfig::default())),
        Arc::new(ChartTool::new(
            tables,
            Arc::new(SvgChartRenderer::new()),
            dir.join("static").join("trend.svg"),
            RetryConfig::default(),
        )),
    );

    Orchestrator::new(
        Planner::new(model.clone()),
        registry,
        Synthesizer::new(model, config.generation.clone(), RetryConfig::default()),
        MetricsRecorder::new(dir.join("logs").join("metrics.jsonl")),
    )
}
