//! ChatForge document indexer
//!
//! Builds the per-tenant document index used for retrieval:
//! 1. Walks the tenant's documents folder
//! 2. Extracts text from txt, markdown and PDF files
//! 3. Splits it into overlapping chunks
//! 4. Embeds the chunks and writes the index artifact

pub mod builder;
pub mod chunker;
pub mod errors;
pub mod loader;
pub mod pdf;

pub use builder::{BuildOutcome, BuildSummary, IndexBuilder};
pub use chunker::ChunkingConfig;
pub use errors::IndexBuildError;
