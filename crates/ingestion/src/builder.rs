//! Document index builder
//!
//! Loads a tenant's documents, chunks and embeds them, and replaces the
//! tenant's index artifact in one step.

use crate::chunker::{Chunker, ChunkingConfig};
use crate::errors::IndexBuildError;
use crate::loader;
use chatforge_common::config::TenantConfig;
use chatforge_common::embeddings::Embedder;
use chatforge_common::index::{DocumentChunk, TenantIndex};
use chatforge_common::metrics::record_index_build;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

/// What a successful build produced
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildSummary {
    pub files: usize,
    pub chunks: usize,
    pub embedding_model: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BuildOutcome {
    Built(BuildSummary),
    /// Nothing to index; any previous index was removed
    Empty,
}

pub struct IndexBuilder {
    embedder: Arc<dyn Embedder>,
    chunking: ChunkingConfig,
}

impl IndexBuilder {
    pub fn new(embedder: Arc<dyn Embedder>, chunking: ChunkingConfig) -> Self {
        Self { embedder, chunking }
    }

    /// Rebuild the tenant's index from its documents folder
    #[instrument(skip(self, tenant), fields(tenant_id = %tenant.tenant_id))]
    pub async fn build(&self, tenant: &TenantConfig) -> Result<BuildOutcome, IndexBuildError> {
        let started = Instant::now();
        let result = self.run(tenant).await;
        let elapsed = started.elapsed().as_secs_f64();

        match &result {
            Ok(BuildOutcome::Built(summary)) => {
                info!(files = summary.files, chunks = summary.chunks, elapsed, "Index built");
                record_index_build(&tenant.tenant_id, "built", summary.chunks, elapsed);
            }
            Ok(BuildOutcome::Empty) => {
                info!(elapsed, "No document text found, index cleared");
                record_index_build(&tenant.tenant_id, "empty", 0, elapsed);
            }
            Err(e) => {
                warn!(kind = e.kind(), error = %e, "Index build failed");
                record_index_build(&tenant.tenant_id, "failed", 0, elapsed);
            }
        }

        result
    }

    async fn run(&self, tenant: &TenantConfig) -> Result<BuildOutcome, IndexBuildError> {
        let root = tenant.documents_dir();
        let chunker = Chunker::new(&self.chunking)?;

        // File reads and PDF parsing block
        let (files, pieces) = tokio::task::spawn_blocking(move || {
            let documents = loader::load_all(&root)?;
            let pieces: Vec<(String, String)> = documents
                .iter()
                .flat_map(|doc| {
                    chunker
                        .split(&doc.text)
                        .into_iter()
                        .map(|text| (doc.source_file.clone(), text))
                })
                .collect();
            Ok::<_, IndexBuildError>((documents.len(), pieces))
        })
        .await
        .map_err(|e| IndexBuildError::Document {
            path: tenant.documents_dir().display().to_string(),
            message: format!("Loader task failed: {}", e),
        })??;

        let index_dir = tenant.index_dir();

        if pieces.is_empty() {
            TenantIndex::remove(&index_dir)
                .await
                .map_err(|e| IndexBuildError::Persist { message: e.to_string() })?;
            return Ok(BuildOutcome::Empty);
        }

        let texts: Vec<String> = pieces.iter().map(|(_, text)| text.clone()).collect();
        let embeddings = self
            .embedder
            .embed_batch(&texts)
            .await
            .map_err(|e| IndexBuildError::Embedding { message: e.to_string() })?;

        if embeddings.len() != pieces.len() {
            return Err(IndexBuildError::Embedding {
                message: format!("Expected {} embeddings, got {}", pieces.len(), embeddings.len()),
            });
        }

        let chunks: Vec<DocumentChunk> = pieces
            .into_iter()
            .zip(embeddings)
            .map(|((source_file, text), embedding)| DocumentChunk { source_file, text, embedding })
            .collect();

        let index = TenantIndex {
            tenant_id: tenant.tenant_id.clone(),
            embedding_model: self.embedder.model_name().to_string(),
            dimension: self.embedder.dimension(),
            built_at: chrono::Utc::now(),
            chunks,
        };

        index
            .persist(&index_dir)
            .await
            .map_err(|e| IndexBuildError::Persist { message: e.to_string() })?;

        Ok(BuildOutcome::Built(BuildSummary {
            files,
            chunks: index.chunks.len(),
            embedding_model: index.embedding_model,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatforge_common::config::Capabilities;
    use chatforge_common::embeddings::HashEmbedder;
    use std::fs;
    use std::path::PathBuf;

    fn tenant(storage_location: PathBuf) -> TenantConfig {
        TenantConfig {
            tenant_id: "acme".into(),
            model_name: "m1".into(),
            model_api_key: "sk".into(),
            notification_bot_token: None,
            notification_channel_id: None,
            telegram_bot_username: None,
            storage_location,
            capabilities: Capabilities { uses_retrieval: true, ..Default::default() },
        }
    }

    fn builder() -> IndexBuilder {
        IndexBuilder::new(Arc::new(HashEmbedder::new(64)), ChunkingConfig::default())
    }

    #[tokio::test]
    async fn test_missing_folder_is_no_source_documents() {
        let dir = tempfile::tempdir().unwrap();
        let err = builder().build(&tenant(dir.path().to_path_buf())).await.unwrap_err();
        assert!(matches!(err, IndexBuildError::NoSourceDocuments { .. }));
    }

    #[tokio::test]
    async fn test_empty_folder_clears_previous_index() {
        let dir = tempfile::tempdir().unwrap();
        let tenant = tenant(dir.path().to_path_buf());
        fs::create_dir_all(tenant.documents_dir()).unwrap();
        fs::write(tenant.documents_dir().join("faq.txt"), "Refunds within 30 days.").unwrap();

        let builder = builder();
        assert!(matches!(builder.build(&tenant).await.unwrap(), BuildOutcome::Built(_)));
        assert!(TenantIndex::load(&tenant.index_dir()).await.unwrap().is_some());

        fs::remove_file(tenant.documents_dir().join("faq.txt")).unwrap();
        assert_eq!(builder.build(&tenant).await.unwrap(), BuildOutcome::Empty);
        assert!(TenantIndex::load(&tenant.index_dir()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unsupported_file_fails_before_indexing() {
        let dir = tempfile::tempdir().unwrap();
        let tenant = tenant(dir.path().to_path_buf());
        fs::create_dir_all(tenant.documents_dir()).unwrap();
        fs::write(tenant.documents_dir().join("a.txt"), "fine").unwrap();
        fs::write(tenant.documents_dir().join("b.docx"), "nope").unwrap();

        match builder().build(&tenant).await {
            Err(IndexBuildError::UnsupportedFileType { path }) => assert_eq!(path, "b.docx"),
            other => panic!("expected unsupported file error, got {:?}", other),
        }
        assert!(TenantIndex::load(&tenant.index_dir()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rebuild_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let tenant = tenant(dir.path().to_path_buf());
        let docs = tenant.documents_dir();
        fs::create_dir_all(docs.join("policies")).unwrap();
        fs::write(docs.join("hours.md"), "# Hours\nThe store opens at nine and closes at six.").unwrap();
        fs::write(
            docs.join("policies/refunds.txt"),
            "Refunds are accepted within 30 days of purchase. ".repeat(30),
        )
        .unwrap();

        let builder = builder();
        let embedder = HashEmbedder::new(64);
        let query = embedder.embed("refund purchase").await.unwrap();

        let mut runs = Vec::new();
        for _ in 0..2 {
            let outcome = builder.build(&tenant).await.unwrap();
            let BuildOutcome::Built(summary) = outcome else {
                panic!("expected a built index");
            };
            assert_eq!(summary.files, 2);
            assert_eq!(summary.embedding_model, "hash-64");

            let index = TenantIndex::load(&tenant.index_dir()).await.unwrap().unwrap();
            assert_eq!(index.chunks.len(), summary.chunks);
            let top: Vec<(String, String)> = index
                .search(&query, 3)
                .into_iter()
                .map(|hit| (hit.chunk.source_file.clone(), hit.chunk.text.clone()))
                .collect();
            runs.push(top);
        }

        assert_eq!(runs[0], runs[1]);
        assert_eq!(runs[0][0].0, "policies/refunds.txt");
    }
}
