//! ChatForge Common Library
//!
//! Shared code for the ChatForge services:
//! - Configuration and tenant resolution
//! - Conversation store over per-tenant SQLite databases
//! - Embedding and language model clients
//! - Document index artifact and response generation
//! - Notification relay
//! - Error types, metrics and observability

pub mod config;
pub mod db;
pub mod embeddings;
pub mod errors;
pub mod generation;
pub mod index;
pub mod llm;
pub mod metrics;
pub mod notify;

// Re-export commonly used types
pub use config::{AppConfig, TenantConfig, TenantRegistry};
pub use db::ConversationStore;
pub use embeddings::Embedder;
pub use errors::{AppError, Result};
pub use generation::{Reply, ResponseGenerator};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
