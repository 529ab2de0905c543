//! Tool trait and registry
//!
//! Tools hold only shared handles to their collaborators, never per-request
//! state, so one instance serves every concurrent request.

use crate::fiscal::years_in_query;
use crate::models::{ToolKind, ToolOutput};
use crate::Result;
use std::sync::Arc;
use uuid::Uuid;

pub mod chart;
pub mod financial;
pub mod retrieval;

pub use chart::ChartTool;
pub use financial::FinancialAnalysisTool;
pub use retrieval::RetrievalTool;

/// Per-request facts a tool may use besides the raw query.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub request_id: Uuid,
    /// Fiscal years named in the query, sorted.
    pub fiscal_years: Vec<String>,
}

impl ToolContext {
    pub fn for_query(request_id: Uuid, query: &str) -> Self {
        Self {
            request_id,
            fiscal_years: years_in_query(query),
        }
    }
}

/// Trait for a single capability
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn kind(&self) -> ToolKind;

    fn name(&self) -> &'static str {
        self.kind().name()
    }

    fn description(&self) -> &'static str;

    async fn execute(&self, query: &str, context: &ToolContext) -> Result<ToolOutput>;
}

/// One tool per `ToolKind`; lookup is an exhaustive match.
pub struct ToolRegistry {
    retrieval: Arc<dyn Tool>,
    financial: Arc<dyn Tool>,
    chart: Arc<dyn Tool>,
}

impl ToolRegistry {
    pub fn new(retrieval: Arc<dyn Tool>, financial: Arc<dyn Tool>, chart: Arc<dyn Tool>) -> Self {
        debug_assert_eq!(retrieval.kind(), ToolKind::Retrieval);
        debug_assert_eq!(financial.kind(), ToolKind::Financial);
        debug_assert_eq!(chart.kind(), ToolKind::Chart);

        Self {
            retrieval,
            financial,
            chart,
        }
    }

    pub fn get(&self, kind: ToolKind) -> Arc<dyn Tool> {
        match kind {
            ToolKind::Retrieval => self.retrieval.clone(),
            ToolKind::Financial => self.financial.clone(),
            ToolKind::Chart => self.chart.clone(),
        }
    }

    pub fn list(&self) -> Vec<(&'static str, &'static str)> {
        ToolKind::PRIORITY
            .iter()
            .map(|kind| {
                let tool = self.get(*kind);
                (tool.name(), tool.description())
            })
            .collect()
    }
}
