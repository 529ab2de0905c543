//! Year-over-year trend analysis on the structured report tables.

use super::{Tool, ToolContext};
use crate::config::RetryConfig;
use crate::error::OrchestrationError;
use crate::models::{ToolKind, ToolOutput, TrendStatistics};
use crate::retry::with_backoff;
use crate::tabular::{Metric, MetricSeries, TabularSource};
use crate::Result;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

pub struct FinancialAnalysisTool {
    source: Arc<dyn TabularSource>,
    retry: RetryConfig,
}

impl FinancialAnalysisTool {
    pub fn new(source: Arc<dyn TabularSource>, retry: RetryConfig) -> Self {
        Self { source, retry }
    }
}

#[async_trait::async_trait]
impl Tool for FinancialAnalysisTool {
    fn kind(&self) -> ToolKind {
        ToolKind::Financial
    }

    fn description(&self) -> &'static str {
        "Year-over-year growth and trend statistics for revenue and income"
    }

    async fn execute(&self, query: &str, context: &ToolContext) -> Result<ToolOutput> {
        let statistics = derive_statistics(self.source.as_ref(), &self.retry, query, context).await?;

        info!(
            request_id = %context.request_id,
            metric = %statistics.metric,
            years = statistics.values_by_year.len(),
            "Financial analysis complete"
        );

        Ok(ToolOutput::Trend { statistics })
    }
}

/// Load the metric the query asks about and compute its trend over the
/// years the query names (all available years when it names none).
pub(crate) async fn derive_statistics(
    source: &dyn TabularSource,
    retry: &RetryConfig,
    query: &str,
    context: &ToolContext,
) -> Result<TrendStatistics> {
    let metric = Metric::from_query(query);
    let series = with_backoff(retry, "tabular_source", || source.load_series(metric)).await?;

    if series.values_by_year.is_empty() {
        return Err(OrchestrationError::DataError(format!(
            "no {} figures found in the structured report data",
            metric.label()
        )));
    }

    let series = restrict_to_years(series, &context.fiscal_years)?;
    Ok(compute_trend(&series))
}

/// Keep the span between the earliest and latest named year; every named
/// year must be present.
fn restrict_to_years(mut series: MetricSeries, years: &[String]) -> Result<MetricSeries> {
    let (Some(first), Some(last)) = (years.first(), years.last()) else {
        return Ok(series);
    };

    let missing: Vec<&str> = years
        .iter()
        .filter(|y| !series.values_by_year.contains_key(*y))
        .map(String::as_str)
        .collect();

    if !missing.is_empty() {
        let available: Vec<&str> = series.values_by_year.keys().map(String::as_str).collect();
        return Err(OrchestrationError::DataError(format!(
            "no {} figures found for fiscal year {} (available: {})",
            series.metric.label(),
            missing.join(", "),
            available.join(", ")
        )));
    }

    series
        .values_by_year
        .retain(|year, _| year.as_str() >= first.as_str() && year.as_str() <= last.as_str());
    Ok(series)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn pct_change(prev: f64, curr: f64) -> Option<f64> {
    (prev != 0.0).then(|| round2((curr - prev) / prev.abs() * 100.0))
}

/// `series` must hold at least one year.
pub(crate) fn compute_trend(series: &MetricSeries) -> TrendStatistics {
    let values_by_year: BTreeMap<String, f64> = series
        .values_by_year
        .iter()
        .map(|(y, v)| (y.clone(), round2(*v)))
        .collect();

    let mut yoy_growth_pct = BTreeMap::new();
    let mut prev: Option<f64> = None;
    for (year, value) in &series.values_by_year {
        yoy_growth_pct.insert(year.clone(), prev.and_then(|p| pct_change(p, *value)));
        prev = Some(*value);
    }

    let first = series.values_by_year.iter().next();
    let last = series.values_by_year.iter().next_back();

    let (total_change_pct, cagr_pct) = match (first, last) {
        (Some((first_year, first_value)), Some((last_year, last_value))) if first_year != last_year => {
            let periods = match (first_year.parse::<i32>(), last_year.parse::<i32>()) {
                (Ok(a), Ok(b)) if b > a => (b - a) as f64,
                _ => (series.values_by_year.len() - 1) as f64,
            };
            let cagr = (*first_value > 0.0 && *last_value > 0.0)
                .then(|| round2(((last_value / first_value).powf(1.0 / periods) - 1.0) * 100.0));
            (pct_change(*first_value, *last_value), cagr)
        }
        _ => (None, None),
    };

    let (latest_year, latest_value) = last
        .map(|(y, v)| (y.clone(), round2(*v)))
        .unwrap_or_default();

    TrendStatistics {
        company: series.company.clone(),
        metric: series.metric.label().to_string(),
        values_by_year,
        yoy_growth_pct,
        total_change_pct,
        cagr_pct,
        latest_year,
        latest_value,
        columns_used: series.columns_used.clone(),
    }
}
