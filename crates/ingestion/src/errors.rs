//! Index build error types

use chatforge_common::errors::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexBuildError {
    #[error("No documents folder at {path}")]
    NoSourceDocuments { path: String },

    #[error("Unsupported file type: {path}")]
    UnsupportedFileType { path: String },

    #[error("Failed to read {path}: {message}")]
    Document { path: String, message: String },

    #[error("Chunking error: {0}")]
    Chunking(String),

    #[error("Embedding failed: {message}")]
    Embedding { message: String },

    #[error("Failed to write index: {message}")]
    Persist { message: String },
}

impl IndexBuildError {
    /// Short outcome label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            IndexBuildError::NoSourceDocuments { .. } => "no_source_documents",
            IndexBuildError::UnsupportedFileType { .. } => "unsupported_file_type",
            IndexBuildError::Document { .. } => "document",
            IndexBuildError::Chunking(_) => "chunking",
            IndexBuildError::Embedding { .. } => "embedding",
            IndexBuildError::Persist { .. } => "persist",
        }
    }

    /// Convert for an HTTP response, attributing the failure to `tenant_id`
    pub fn into_app_error(self, tenant_id: &str) -> AppError {
        match self {
            IndexBuildError::NoSourceDocuments { path } => AppError::NoSourceDocuments {
                tenant_id: tenant_id.to_string(),
                path,
            },
            IndexBuildError::UnsupportedFileType { path } => AppError::UnsupportedFileType { path },
            other => AppError::IndexBuild { message: other.to_string() },
        }
    }
}
