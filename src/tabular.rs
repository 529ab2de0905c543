//! Structured financial data seam
//!
//! Tables extracted from the annual reports are stored as CSV files, one
//! table per file, with the company and fiscal year encoded in the file name
//! (`MSFT_FY23Q4_10K.csv`, `Microsoft_2024_table_3.csv`).

use crate::error::OrchestrationError;
use crate::fiscal::{parse_amount, year_from_file_name};
use crate::Result;
use async_trait::async_trait;
use csv::ReaderBuilder;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Metrics the financial tools know how to locate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Revenue,
    OperatingIncome,
    NetIncome,
}

/// Column headers mentioning these are never the metric itself.
const EXCLUDED_LABELS: &[&str] = &["cost of", "deferred", "unearned", "per share"];

impl Metric {
    pub fn label(&self) -> &'static str {
        match self {
            Metric::Revenue => "Revenue",
            Metric::OperatingIncome => "Operating Income",
            Metric::NetIncome => "Net Income",
        }
    }

    fn keywords(&self) -> &'static [&'static str] {
        match self {
            Metric::Revenue => &["revenue", "net sales", "total sales", "sales"],
            Metric::OperatingIncome => &[
                "operating income",
                "income from operations",
                "operating profit",
            ],
            Metric::NetIncome => &["net income", "net earnings"],
        }
    }

    /// The metric a question is about; revenue unless income is mentioned.
    pub fn from_query(query: &str) -> Self {
        let lowered = query.to_lowercase();
        if lowered.contains("net income") || lowered.contains("net earnings") {
            Metric::NetIncome
        } else if ["income", "profit", "operating", "earnings"]
            .iter()
            .any(|kw| lowered.contains(kw))
        {
            Metric::OperatingIncome
        } else {
            Metric::Revenue
        }
    }

    fn matches_label(&self, label: &str) -> bool {
        let lowered = label.to_lowercase();
        if EXCLUDED_LABELS.iter().any(|ex| lowered.contains(ex)) {
            return false;
        }
        self.keywords().iter().any(|kw| lowered.contains(kw))
    }
}

/// Raw values of one metric keyed by fiscal year.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSeries {
    pub metric: Metric,
    pub company: Option<String>,
    pub values_by_year: BTreeMap<String, f64>,
    pub columns_used: Vec<String>,
}

impl MetricSeries {
    pub fn empty(metric: Metric) -> Self {
        Self {
            metric,
            company: None,
            values_by_year: BTreeMap::new(),
            columns_used: Vec::new(),
        }
    }

    /// Keep the largest positive figure per year (tables repeat sub-totals).
    fn observe(&mut self, year: &str, value: f64) {
        if value <= 0.0 {
            return;
        }
        let entry = self.values_by_year.entry(year.to_string()).or_insert(value);
        if value > *entry {
            *entry = value;
        }
    }

    fn note_column(&mut self, column: &str) {
        if !self.columns_used.iter().any(|c| c == column) {
            self.columns_used.push(column.to_string());
        }
    }
}

/// Trait for loading metric series
#[async_trait]
pub trait TabularSource: Send + Sync {
    async fn load_series(&self, metric: Metric) -> Result<MetricSeries>;
}

/// Reads every `*.csv` in a directory on each call.
pub struct CsvDirectorySource {
    dir: PathBuf,
    company_map: HashMap<String, String>,
}

impl CsvDirectorySource {
    pub fn new(dir: impl Into<PathBuf>, company_map: HashMap<String, String>) -> Self {
        Self {
            dir: dir.into(),
            company_map,
        }
    }
}

#[async_trait]
impl TabularSource for CsvDirectorySource {
    async fn load_series(&self, metric: Metric) -> Result<MetricSeries> {
        let dir = self.dir.clone();
        let company_map = self.company_map.clone();

        tokio::task::spawn_blocking(move || scan_directory(&dir, metric, &company_map))
            .await
            .map_err(|e| OrchestrationError::external("tabular_source", e.to_string()))?
    }
}

fn company_from_file_name(name: &str, company_map: &HashMap<String, String>) -> Option<String> {
    let prefix = name.split(['_', '-', '.']).next()?.trim();
    if prefix.is_empty() || prefix.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(
        company_map
            .get(&prefix.to_uppercase())
            .cloned()
            .unwrap_or_else(|| prefix.to_string()),
    )
}

fn scan_directory(
    dir: &Path,
    metric: Metric,
    company_map: &HashMap<String, String>,
) -> Result<MetricSeries> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        OrchestrationError::DataError(format!(
            "structured data directory {} is not readable: {}",
            dir.display(),
            e
        ))
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .map_or(false, |ext| ext.eq_ignore_ascii_case("csv"))
        })
        .collect();
    files.sort();

    if files.is_empty() {
        return Err(OrchestrationError::DataError(format!(
            "no CSV tables found in {}; run ingestion first",
            dir.display()
        )));
    }

    let mut series = MetricSeries::empty(metric);

    for path in &files {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let Some(year) = year_from_file_name(&name) else {
            debug!(file = %name, "No fiscal year in file name, skipping");
            continue;
        };

        let before = series.values_by_year.get(&year).copied();
        if let Err(e) = scan_file(path, &year, &mut series) {
            warn!(file = %name, error = %e, "Could not read table");
            continue;
        }

        if series.company.is_none() && series.values_by_year.get(&year).copied() != before {
            series.company = company_from_file_name(&name, company_map);
        }
    }

    info!(
        metric = metric.label(),
        files = files.len(),
        years = ?series.values_by_year.keys().collect::<Vec<_>>(),
        "Metric series loaded"
    );

    Ok(series)
}

/// Values come from cells under a matching header or rows whose first
/// cell is a matching label.
fn scan_file(path: &Path, year: &str, series: &mut MetricSeries) -> Result<()> {
    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .has_headers(true)
        .from_path(path)?;

    let headers = reader.headers()?.clone();
    let matching_columns: Vec<usize> = headers
        .iter()
        .enumerate()
        .filter(|(_, h)| series.metric.matches_label(h))
        .map(|(i, _)| i)
        .collect();

    for i in &matching_columns {
        series.note_column(&headers[*i]);
    }

    for record in reader.records() {
        let record = record?;

        for i in &matching_columns {
            if let Some(value) = record.get(*i).and_then(parse_amount) {
                series.observe(year, value);
            }
        }

        let Some(label) = record.get(0) else { continue };
        if series.metric.matches_label(label) {
            series.note_column(label.trim());
            for value in record.iter().skip(1).filter_map(parse_amount) {
                series.observe(year, value);
            }
        }
    }

    Ok(())
}

/// Fixed series, for development without extracted tables.
pub struct StaticTabularSource {
    series: HashMap<Metric, MetricSeries>,
}

impl StaticTabularSource {
    pub fn new() -> Self {
        Self {
            series: HashMap::new(),
        }
    }

    pub fn with_series(
        mut self,
        metric: Metric,
        company: &str,
        values: &[(&str, f64)],
    ) -> Self {
        let mut series = MetricSeries::empty(metric);
        series.company = Some(company.to_string());
        series.columns_used.push(metric.label().to_string());
        for (year, value) in values {
            series.observe(year, *value);
        }
        self.series.insert(metric, series);
        self
    }
}

impl Default for StaticTabularSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TabularSource for StaticTabularSource {
    async fn load_series(&self, metric: Metric) -> Result<MetricSeries> {
        Ok(self
            .series
            .get(&metric)
            .cloned()
            .unwrap_or_else(|| MetricSeries::empty(metric)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::temp_dir;

    #[test]
    fn test_metric_from_query() {
        assert_eq!(Metric::from_query("Show revenue trend graph."), Metric::Revenue);
        assert_eq!(
            Metric::from_query("Compare operating income over 3 years"),
            Metric::OperatingIncome
        );
        assert_eq!(Metric::from_query("net income in 2024"), Metric::NetIncome);
    }

    #[test]
    fn test_excluded_labels() {
        assert!(Metric::Revenue.matches_label("Total revenue"));
        assert!(!Metric::Revenue.matches_label("Cost of revenue"));
        assert!(!Metric::Revenue.matches_label("Unearned revenue"));
    }

    #[test]
    fn test_company_from_file_name() {
        let map = HashMap::from([("MSFT".to_string(), "Microsoft".to_string())]);
        assert_eq!(
            company_from_file_name("MSFT_FY23Q4_10K.csv", &map).as_deref(),
            Some("Microsoft")
        );
        assert_eq!(
            company_from_file_name("Microsoft_2024_table_1.csv", &map).as_deref(),
            Some("Microsoft")
        );
        assert_eq!(company_from_file_name("2024_table.csv", &map), None);
    }

    #[tokio::test]
    async fn test_csv_directory_source() {
        let dir = temp_dir("tabular");
        std::fs::write(
            dir.join("MSFT_FY23Q4_10K.csv"),
            "Segment,Revenue,Operating income\nCloud,\"$87,907\",\"$42,959\"\nTotal,\"211,915\",\"88,523\"\n",
        )
        .unwrap();
        std::fs::write(
            dir.join("Microsoft_2024_table_2.csv"),
            "Item,FY2024,FY2023\nTotal revenue,\"245,122\",\"211,915\"\nCost of revenue,\"74,114\",\"65,863\"\n",
        )
        .unwrap();
        std::fs::write(dir.join("readme.txt"), "ignored").unwrap();

        let map = HashMap::from([("MSFT".to_string(), "Microsoft".to_string())]);
        let source = CsvDirectorySource::new(&dir, map);

        let series = source.load_series(Metric::Revenue).await.unwrap();
        assert_eq!(series.company.as_deref(), Some("Microsoft"));
        assert_eq!(series.values_by_year.get("2023"), Some(&211915.0));
        assert_eq!(series.values_by_year.get("2024"), Some(&245122.0));
        assert!(series.columns_used.contains(&"Revenue".to_string()));
        assert!(series.columns_used.contains(&"Total revenue".to_string()));

        let income = source.load_series(Metric::OperatingIncome).await.unwrap();
        assert_eq!(income.values_by_year.get("2023"), Some(&88523.0));
        assert!(income.values_by_year.get("2024").is_none());
    }

    #[tokio::test]
    async fn test_empty_directory_is_data_error() {
        let dir = temp_dir("tabular-empty");
        let source = CsvDirectorySource::new(&dir, HashMap::new());
        let err = source.load_series(Metric::Revenue).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::DataError(_)));
    }
}
