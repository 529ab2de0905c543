//! Process configuration
//!
//! Built once at startup (optionally from a `.env` file) and passed by
//! reference into every component constructor.

use crate::error::OrchestrationError;
use crate::Result;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Sampling parameters for one model call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub top_p: f32,
    pub max_output_tokens: u32,
}

impl GenerationParams {
    /// Deterministic, short output for routing.
    pub fn routing() -> Self {
        Self {
            temperature: 0.0,
            top_p: 1.0,
            max_output_tokens: 80,
        }
    }
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            top_p: 0.9,
            max_output_tokens: 1024,
        }
    }
}

/// Exponential backoff bounds for transient collaborator failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub max_elapsed: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(200),
            max_interval: Duration::from_secs(2),
            max_elapsed: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    // LLM
    pub gemini_api_key: String,
    pub gemini_base_url: String,
    pub llm_model: String,
    pub generation: GenerationParams,

    // Embeddings
    pub embedding_model: String,
    pub embedding_dimension: usize,

    // Vector index
    pub qdrant_url: String,
    pub collection_name: String,
    pub top_k: usize,
    pub min_similarity: f32,
    pub year_filter: bool,

    // Paths
    pub structured_dir: PathBuf,
    pub static_dir: PathBuf,
    pub chart_file_name: String,
    pub metrics_file: PathBuf,

    // Companies: ticker prefix in structured file names → display name
    pub company_map: HashMap<String, String>,

    pub retry: RetryConfig,
    pub http_timeout: Duration,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gemini_api_key: String::new(),
            gemini_base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            llm_model: "gemini-2.0-flash".to_string(),
            generation: GenerationParams::default(),
            embedding_model: "text-embedding-004".to_string(),
            embedding_dimension: 768,
            qdrant_url: "http://localhost:6333".to_string(),
            collection_name: "leadership_reports".to_string(),
            top_k: 5,
            min_similarity: 0.25,
            year_filter: true,
            structured_dir: PathBuf::from("data/structured"),
            static_dir: PathBuf::from("static"),
            chart_file_name: "trend.svg".to_string(),
            metrics_file: PathBuf::from("logs/metrics.jsonl"),
            company_map: default_company_map(),
            retry: RetryConfig::default(),
            http_timeout: Duration::from_secs(30),
            port: 8000,
        }
    }
}

impl Config {
    /// Load from the environment, falling back to defaults for unset keys.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let defaults = Self::default();

        let mut company_map = defaults.company_map;
        if let Ok(raw) = env::var("COMPANY_MAP") {
            company_map.extend(parse_company_map(&raw)?);
        }

        let config = Self {
            gemini_api_key: env::var("GEMINI_API_KEY").unwrap_or_default(),
            gemini_base_url: env_string("GEMINI_BASE_URL", defaults.gemini_base_url),
            llm_model: env_string("LLM_MODEL", defaults.llm_model),
            generation: GenerationParams {
                temperature: env_parse("LLM_TEMPERATURE", defaults.generation.temperature)?,
                top_p: env_parse("LLM_TOP_P", defaults.generation.top_p)?,
                max_output_tokens: env_parse(
                    "LLM_MAX_TOKENS",
                    defaults.generation.max_output_tokens,
                )?,
            },
            embedding_model: env_string("EMBEDDING_MODEL", defaults.embedding_model),
            embedding_dimension: env_parse("EMBEDDING_DIMENSION", defaults.embedding_dimension)?,
            qdrant_url: env_string("QDRANT_URL", defaults.qdrant_url),
            collection_name: env_string("COLLECTION_NAME", defaults.collection_name),
            top_k: env_parse("RETRIEVAL_TOP_K", defaults.top_k)?,
            min_similarity: env_parse("RETRIEVAL_MIN_SIMILARITY", defaults.min_similarity)?,
            year_filter: env_parse("RETRIEVAL_YEAR_FILTER", defaults.year_filter)?,
            structured_dir: env_path("DATA_STRUCTURED_DIR", defaults.structured_dir),
            static_dir: env_path("STATIC_DIR", defaults.static_dir),
            chart_file_name: env_string("CHART_FILE_NAME", defaults.chart_file_name),
            metrics_file: env_path("METRICS_FILE", defaults.metrics_file),
            company_map,
            retry: RetryConfig {
                initial_interval: Duration::from_millis(env_parse(
                    "RETRY_INITIAL_MS",
                    defaults.retry.initial_interval.as_millis() as u64,
                )?),
                max_interval: Duration::from_millis(env_parse(
                    "RETRY_MAX_INTERVAL_MS",
                    defaults.retry.max_interval.as_millis() as u64,
                )?),
                max_elapsed: Duration::from_millis(env_parse(
                    "RETRY_MAX_ELAPSED_MS",
                    defaults.retry.max_elapsed.as_millis() as u64,
                )?),
            },
            http_timeout: Duration::from_secs(env_parse(
                "HTTP_TIMEOUT_SECS",
                defaults.http_timeout.as_secs(),
            )?),
            port: match env::var("PORT") {
                Ok(_) => env_parse("PORT", defaults.port)?,
                Err(_) => env_parse("API_PORT", defaults.port)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(OrchestrationError::ConfigError(
                "RETRIEVAL_TOP_K must be at least 1".to_string(),
            ));
        }
        if !(-1.0..=1.0).contains(&self.min_similarity) {
            return Err(OrchestrationError::ConfigError(format!(
                "RETRIEVAL_MIN_SIMILARITY must be within [-1, 1], got {}",
                self.min_similarity
            )));
        }
        if self.chart_file_name.trim().is_empty() {
            return Err(OrchestrationError::ConfigError(
                "CHART_FILE_NAME must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Fixed location the chart tool renders to.
    pub fn chart_output_path(&self) -> PathBuf {
        self.static_dir.join(&self.chart_file_name)
    }
}

fn default_company_map() -> HashMap<String, String> {
    [("MSFT", "Microsoft"), ("AAPL", "Apple"), ("GOOGL", "Google")]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// `MSFT=Microsoft,NVDA=Nvidia`
fn parse_company_map(raw: &str) -> Result<HashMap<String, String>> {
    raw.split(',')
        .filter(|pair| !pair.trim().is_empty())
        .map(|pair| {
            let (ticker, name) = pair.split_once('=').ok_or_else(|| {
                OrchestrationError::ConfigError(format!(
                    "COMPANY_MAP entry '{}' is not TICKER=Name",
                    pair
                ))
            })?;
            Ok((ticker.trim().to_uppercase(), name.trim().to_string()))
        })
        .collect()
}

fn env_string(key: &str, default: String) -> String {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(default)
}

fn env_path(key: &str, default: PathBuf) -> PathBuf {
    env::var(key).map(PathBuf::from).unwrap_or(default)
}

fn env_parse<T: FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw.trim().parse().map_err(|_| {
            OrchestrationError::ConfigError(format!("{} has an invalid value: '{}'", key, raw))
        }),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chart_output_path(), PathBuf::from("static/trend.svg"));
        assert_eq!(config.company_map.get("MSFT").map(String::as_str), Some("Microsoft"));
    }

    #[test]
    fn test_company_map_parsing() {
        let map = parse_company_map("nvda=Nvidia, AMZN = Amazon").unwrap();
        assert_eq!(map.get("NVDA").map(String::as_str), Some("Nvidia"));
        assert_eq!(map.get("AMZN").map(String::as_str), Some("Amazon"));
        assert!(parse_company_map("broken").is_err());
    }

    #[test]
    fn test_validation_rejects_zero_top_k() {
        let config = Config {
            top_k: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
