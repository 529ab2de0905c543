//! Error types for the leadership insight agent

use crate::models::FailureKind;
use thiserror::Error;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

#[derive(Error, Debug)]
pub enum OrchestrationError {

    // =============================
    // Request / Pipeline Errors
    // =============================

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Request state error: {0}")]
    StateError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    // =============================
    // Collaborator Errors
    // =============================

    /// Collaborator answered, but with something we cannot use.
    #[error("{service} error: {message}")]
    ExternalService {
        service: &'static str,
        message: String,
    },

    /// Collaborator is temporarily unavailable (timeouts, 429, 5xx).
    #[error("{service} unavailable: {message}")]
    ServiceUnavailable {
        service: &'static str,
        message: String,
    },

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Metrics log error: {0}")]
    MetricsError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl OrchestrationError {
    pub fn external(service: &'static str, message: impl Into<String>) -> Self {
        Self::ExternalService {
            service,
            message: message.into(),
        }
    }

    pub fn unavailable(service: &'static str, message: impl Into<String>) -> Self {
        Self::ServiceUnavailable {
            service,
            message: message.into(),
        }
    }

    /// A failed send. The request URL is dropped from the message since it
    /// may carry credentials.
    pub fn transport(service: &'static str, err: reqwest::Error) -> Self {
        let transient = err.is_timeout() || err.is_connect();
        let message = err.without_url().to_string();
        if transient {
            Self::unavailable(service, message)
        } else {
            Self::external(service, message)
        }
    }

    /// Map an HTTP status returned by a collaborator onto the error taxonomy.
    pub fn from_status(
        service: &'static str,
        status: reqwest::StatusCode,
        body: &str,
    ) -> Self {
        let message = format!("HTTP {}: {}", status, body);
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            Self::unavailable(service, message)
        } else {
            Self::external(service, message)
        }
    }

    /// Whether a retry with backoff has a chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ServiceUnavailable { .. } => true,
            Self::HttpError(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().map_or(false, |s| {
                        s.is_server_error() || s == reqwest::StatusCode::TOO_MANY_REQUESTS
                    })
            }
            _ => false,
        }
    }

    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::InvalidRequest(_) => FailureKind::InvalidRequest,
            Self::DataError(_) | Self::CsvError(_) => FailureKind::DataError,
            Self::ExternalService { .. }
            | Self::ServiceUnavailable { .. }
            | Self::LlmError(_)
            | Self::HttpError(_) => FailureKind::ExternalServiceError,
            _ => FailureKind::Internal,
        }
    }
}
