//! Error types for PaperLens services
//!
//! Provides:
//! - `LlmError`: hosted model failures, split into transient and permanent
//! - `StoreError`: project store backend failures
//! - `AppError`: API-facing errors with codes and HTTP status mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::error::Category;
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Markers a provider uses in error messages when a quota is exhausted
const QUOTA_MARKERS: &[&str] = &["RESOURCE_EXHAUSTED", "quota"];

/// Failures reported by the hosted model or while reading its response
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("Provider error {status}: {message}")]
    Provider { status: u16, message: String },

    #[error("Provider request failed: {0}")]
    Transport(String),

    #[error("Provider returned no text")]
    EmptyResponse,

    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),

    #[error("Provider response violates schema: {0}")]
    SchemaViolation(String),

    #[error("No AI answers in the chat history to build a report from")]
    EmptyHistory,

    #[error("Provider configuration error: {0}")]
    Configuration(String),
}

impl LlmError {
    /// Rate-limit and overload failures worth retrying
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::Provider { status, message } => {
                *status == 429 || *status == 503 || is_quota_message(message)
            }
            _ => false,
        }
    }

    /// Classify a JSON decoding failure of a provider response.
    ///
    /// Well-formed JSON of the wrong shape is a schema violation; anything
    /// that is not JSON at all is a malformed response.
    pub fn from_json(err: serde_json::Error) -> Self {
        match err.classify() {
            Category::Data => LlmError::SchemaViolation(err.to_string()),
            Category::Syntax | Category::Eof | Category::Io => {
                LlmError::MalformedResponse(err.to_string())
            }
        }
    }
}

fn is_quota_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    QUOTA_MARKERS
        .iter()
        .any(|marker| lower.contains(&marker.to_lowercase()))
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => LlmError::Provider {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None => LlmError::Transport(err.to_string()),
        }
    }
}

/// Project store failures
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Stored value could not be encoded: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown storage backend: {0}")]
    UnknownBackend(String),
}

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    PayloadTooLarge,
    EmptyHistory,

    // Resource errors (4xxx)
    ProjectNotFound,

    // Conflict errors (5xxx)
    ProjectNotActive,

    // Rate limiting (6xxx)
    RateLimited,

    // Storage errors (7xxx)
    StoreError,

    // External service errors (8xxx)
    ProviderError,
    ProviderUnavailable,
    SchemaViolation,
    QueueError,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
    ExportError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::ValidationError => 1001,
            ErrorCode::PayloadTooLarge => 1002,
            ErrorCode::EmptyHistory => 1003,

            ErrorCode::ProjectNotFound => 4001,

            ErrorCode::ProjectNotActive => 5001,

            ErrorCode::RateLimited => 6001,

            ErrorCode::StoreError => 7001,

            ErrorCode::ProviderError => 8001,
            ErrorCode::ProviderUnavailable => 8002,
            ErrorCode::SchemaViolation => 8003,
            ErrorCode::QueueError => 8004,

            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
            ErrorCode::ExportError => 9004,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Payload too large: {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Project not found: {id}")]
    ProjectNotFound { id: String },

    #[error("Project {id} is not the active project")]
    ProjectNotActive { id: String },

    #[error("Rate limit exceeded: {limit} requests per second")]
    RateLimited { limit: u32 },

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Analysis queue unavailable: {message}")]
    QueueUnavailable { message: String },

    #[error("Report export failed: {message}")]
    Export { message: String },

    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::PayloadTooLarge { .. } => ErrorCode::PayloadTooLarge,
            AppError::ProjectNotFound { .. } => ErrorCode::ProjectNotFound,
            AppError::ProjectNotActive { .. } => ErrorCode::ProjectNotActive,
            AppError::RateLimited { .. } => ErrorCode::RateLimited,
            AppError::Llm(err) => match err {
                LlmError::EmptyHistory => ErrorCode::EmptyHistory,
                LlmError::SchemaViolation(_) => ErrorCode::SchemaViolation,
                LlmError::Configuration(_) => ErrorCode::ConfigurationError,
                e if e.is_transient() => ErrorCode::ProviderUnavailable,
                _ => ErrorCode::ProviderError,
            },
            AppError::Store(_) => ErrorCode::StoreError,
            AppError::QueueUnavailable { .. } => ErrorCode::QueueError,
            AppError::Export { .. } => ErrorCode::ExportError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self.code() {
            ErrorCode::ValidationError => StatusCode::BAD_REQUEST,
            ErrorCode::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorCode::EmptyHistory => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCode::ProjectNotFound => StatusCode::NOT_FOUND,
            ErrorCode::ProjectNotActive => StatusCode::CONFLICT,
            ErrorCode::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::ProviderError | ErrorCode::SchemaViolation => StatusCode::BAD_GATEWAY,
            ErrorCode::ProviderUnavailable | ErrorCode::QueueError => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ErrorCode::StoreError
            | ErrorCode::InternalError
            | ErrorCode::ConfigurationError
            | ErrorCode::SerializationError
            | ErrorCode::ExportError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub numeric_code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        if self.is_server_error() {
            tracing::error!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }

        let field = match &self {
            AppError::Validation { field, .. } => field.clone(),
            _ => None,
        };

        let body = ErrorResponse {
            error: ErrorDetails {
                code,
                numeric_code: code.as_code(),
                message,
                field,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}
