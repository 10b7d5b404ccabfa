//! Error types for ChatForge services
//!
//! Provides a comprehensive error handling system with:
//! - Distinct error types for different failure modes
//! - HTTP status code mapping
//! - Structured error responses
//! - Error codes for client handling

use crate::config::ConfigurationError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    InvalidFormat,

    // Tenant errors (3xxx)
    UnknownTenant,
    IncompleteConfiguration,

    // Rate limiting (6xxx)
    RateLimited,

    // Storage errors (7xxx)
    StorageError,
    ConnectionError,

    // External service and indexing errors (8xxx)
    UpstreamError,
    EmbeddingError,
    NoSourceDocuments,
    UnsupportedFileType,
    IndexBuildError,

    // Internal errors (9xxx)
    ConfigurationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            // Validation (1xxx)
            ErrorCode::ValidationError => 1001,
            ErrorCode::InvalidFormat => 1003,

            // Tenants (3xxx)
            ErrorCode::UnknownTenant => 3001,
            ErrorCode::IncompleteConfiguration => 3002,

            // Rate limits (6xxx)
            ErrorCode::RateLimited => 6001,

            // Storage (7xxx)
            ErrorCode::StorageError => 7001,
            ErrorCode::ConnectionError => 7002,

            // External (8xxx)
            ErrorCode::UpstreamError => 8001,
            ErrorCode::EmbeddingError => 8002,
            ErrorCode::NoSourceDocuments => 8101,
            ErrorCode::UnsupportedFileType => 8102,
            ErrorCode::IndexBuildError => 8103,

            // Internal (9xxx)
            ErrorCode::ConfigurationError => 9002,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },

    // Tenant errors
    #[error("Unknown tenant: {tenant_id}")]
    UnknownTenant { tenant_id: String },

    #[error("Tenant {tenant_id} is missing configuration: {}", .missing.join(", "))]
    IncompleteConfiguration {
        tenant_id: String,
        missing: Vec<String>,
    },

    // Rate limiting
    #[error("Rate limit exceeded: {limit} requests per second")]
    RateLimited { limit: u32 },

    // Storage errors. `reply` carries a reply that was computed but not saved.
    #[error("Storage error: {message}")]
    Storage {
        message: String,
        reply: Option<String>,
    },

    #[error("Storage connection error: {message}")]
    StorageConnection { message: String },

    // External service errors
    #[error("Embedding service error: {message}")]
    EmbeddingError { message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Index build errors
    #[error("No source documents for tenant {tenant_id} at {path}")]
    NoSourceDocuments { tenant_id: String, path: String },

    #[error("Unsupported file type: {path}")]
    UnsupportedFileType { path: String },

    #[error("Index build failed: {message}")]
    IndexBuild { message: String },

    // Internal errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::InvalidFormat { .. } => ErrorCode::InvalidFormat,
            AppError::UnknownTenant { .. } => ErrorCode::UnknownTenant,
            AppError::IncompleteConfiguration { .. } => ErrorCode::IncompleteConfiguration,
            AppError::RateLimited { .. } => ErrorCode::RateLimited,
            AppError::Storage { .. } => ErrorCode::StorageError,
            AppError::StorageConnection { .. } => ErrorCode::ConnectionError,
            AppError::EmbeddingError { .. } => ErrorCode::EmbeddingError,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::NoSourceDocuments { .. } => ErrorCode::NoSourceDocuments,
            AppError::UnsupportedFileType { .. } => ErrorCode::UnsupportedFileType,
            AppError::IndexBuild { .. } => ErrorCode::IndexBuildError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. } |
            AppError::InvalidFormat { .. } |
            AppError::IncompleteConfiguration { .. } => StatusCode::BAD_REQUEST,

            // 404 Not Found
            AppError::UnknownTenant { .. } => StatusCode::NOT_FOUND,

            // 429 Too Many Requests
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,

            // 500 Internal Server Error
            AppError::Storage { .. } |
            AppError::StorageConnection { .. } |
            AppError::NoSourceDocuments { .. } |
            AppError::UnsupportedFileType { .. } |
            AppError::IndexBuild { .. } |
            AppError::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,

            // 502 Bad Gateway
            AppError::EmbeddingError { .. } |
            AppError::HttpClient(_) => StatusCode::BAD_GATEWAY,
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

    /// Attach a computed reply to a storage failure so the caller can still show it
    pub fn with_reply(self, reply: impl Into<String>) -> Self {
        match self {
            AppError::Storage { message, .. } => AppError::Storage {
                message,
                reply: Some(reply.into()),
            },
            AppError::StorageConnection { message } => AppError::Storage {
                message,
                reply: Some(reply.into()),
            },
            other => other,
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            AppError::Validation { field: Some(field), .. } => {
                Some(serde_json::json!({ "field": field }))
            }
            AppError::IncompleteConfiguration { missing, .. } => {
                Some(serde_json::json!({ "missing": missing }))
            }
            AppError::Storage { reply: Some(reply), .. } => {
                Some(serde_json::json!({ "reply": reply }))
            }
            _ => None,
        }
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
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        // Log based on severity
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

        let body = ErrorResponse {
            error: ErrorDetails {
                code,
                message,
                details: self.details(),
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<ConfigurationError> for AppError {
    fn from(err: ConfigurationError) -> Self {
        match err {
            ConfigurationError::UnknownTenant { tenant_id } => AppError::UnknownTenant { tenant_id },
            ConfigurationError::IncompleteConfiguration { tenant_id, missing } => {
                AppError::IncompleteConfiguration { tenant_id, missing }
            }
        }
    }
}

impl From<sea_orm::DbErr> for AppError {
    fn from(err: sea_orm::DbErr) -> Self {
        AppError::Storage {
            message: err.to_string(),
            reply: None,
        }
    }
}
