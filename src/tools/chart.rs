//! Renders the requested metric's trend to an image artifact.

use super::financial::derive_statistics;
use super::{Tool, ToolContext};
use crate::charts::{ChartRenderer, ChartSpec};
use crate::config::RetryConfig;
use crate::error::OrchestrationError;
use crate::models::{ChartArtifact, ToolKind, ToolOutput};
use crate::tabular::TabularSource;
use crate::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

pub struct ChartTool {
    source: Arc<dyn TabularSource>,
    renderer: Arc<dyn ChartRenderer>,
    output_path: PathBuf,
    retry: RetryConfig,
}

impl ChartTool {
    pub fn new(
        source: Arc<dyn TabularSource>,
        renderer: Arc<dyn ChartRenderer>,
        output_path: impl Into<PathBuf>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            source,
            renderer,
            output_path: output_path.into(),
            retry,
        }
    }
}

#[async_trait::async_trait]
impl Tool for ChartTool {
    fn kind(&self) -> ToolKind {
        ToolKind::Chart
    }

    fn description(&self) -> &'static str {
        "Plots a financial metric across fiscal years and returns the image path"
    }

    async fn execute(&self, query: &str, context: &ToolContext) -> Result<ToolOutput> {
        let statistics = derive_statistics(self.source.as_ref(), &self.retry, query, context)
            .await
            .map_err(|e| match e {
                OrchestrationError::DataError(msg) => {
                    OrchestrationError::external("chart", format!("no data to plot: {}", msg))
                }
                other => other,
            })?;

        let title = match &statistics.company {
            Some(company) => format!("{} {} Trend", company, statistics.metric),
            None => format!("{} Trend", statistics.metric),
        };

        let spec = ChartSpec {
            title,
            x_label: "Fiscal Year".to_string(),
            y_label: format!("{} (USD millions)", statistics.metric),
            points: statistics
                .values_by_year
                .iter()
                .map(|(year, value)| (year.clone(), *value))
                .collect(),
        };

        let written = self.renderer.render(&spec, &self.output_path).await?;
        let path = written.to_string_lossy().into_owned();

        info!(request_id = %context.request_id, path = %path, "Chart artifact ready");

        Ok(ToolOutput::Chart {
            artifact: ChartArtifact { path, statistics },
        })
    }
}
