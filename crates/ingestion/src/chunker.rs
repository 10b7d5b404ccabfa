//! Text chunking module
//!
//! Splits document text into overlapping chunks for embedding.

use crate::errors::IndexBuildError;
use chatforge_common::config::IndexingConfig;
use text_splitter::{ChunkConfig, TextSplitter};
use tracing::debug;

/// Configuration for text chunking
#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    /// Target chunk size in characters
    pub chunk_size: usize,
    /// Overlap between chunks in characters
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
        }
    }
}

impl From<&IndexingConfig> for ChunkingConfig {
    fn from(config: &IndexingConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
        }
    }
}

/// Sentence-aware splitter honouring the configured size and overlap
pub struct Chunker {
    splitter: TextSplitter<text_splitter::Characters>,
}

impl Chunker {
    pub fn new(config: &ChunkingConfig) -> Result<Self, IndexBuildError> {
        let chunk_config = ChunkConfig::new(config.chunk_size.max(1))
            .with_overlap(config.chunk_overlap)
            .map_err(|e| IndexBuildError::Chunking(e.to_string()))?;

        Ok(Self {
            splitter: TextSplitter::new(chunk_config),
        })
    }

    /// Non-blank chunks of `text`, in document order
    pub fn split(&self, text: &str) -> Vec<String> {
        let chunks: Vec<String> = self
            .splitter
            .chunks(text)
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(String::from)
            .collect();

        debug!(input_len = text.len(), chunk_count = chunks.len(), "Text chunked");
        chunks
    }
}
