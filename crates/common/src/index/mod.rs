//! Per-tenant document index artifact
//!
//! A flat JSON file holding every chunk with its embedding. Readers scan
//! it exhaustively; the builder replaces it wholesale.

use crate::embeddings::cosine_similarity;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use thiserror::Error;

/// File name of the artifact inside the tenant's index directory
pub const INDEX_FILE: &str = "index.json";

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Index I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Index at {path} is corrupt: {message}")]
    Corrupt { path: PathBuf, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// Path relative to the tenant's documents folder
    pub source_file: String,
    pub text: String,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantIndex {
    pub tenant_id: String,
    pub embedding_model: String,
    pub dimension: usize,
    pub built_at: DateTime<Utc>,
    pub chunks: Vec<DocumentChunk>,
}

/// A chunk ranked against a query
#[derive(Debug, Clone)]
pub struct ScoredChunk<'a> {
    pub chunk: &'a DocumentChunk,
    pub score: f32,
}

impl TenantIndex {
    pub fn path(dir: &Path) -> PathBuf {
        dir.join(INDEX_FILE)
    }

    /// Load the index in `dir`. `Ok(None)` means no index has been built.
    pub async fn load(dir: &Path) -> Result<Option<Self>, IndexError> {
        let path = Self::path(dir);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(IndexError::Io { path, source }),
        };

        let index: TenantIndex =
            serde_json::from_slice(&bytes).map_err(|e| IndexError::Corrupt {
                path: path.clone(),
                message: e.to_string(),
            })?;

        if let Some(bad) = index.chunks.iter().find(|c| c.embedding.len() != index.dimension) {
            return Err(IndexError::Corrupt {
                path,
                message: format!(
                    "chunk from {} has dimension {}, expected {}",
                    bad.source_file,
                    bad.embedding.len(),
                    index.dimension
                ),
            });
        }

        Ok(Some(index))
    }

    /// Write the index to `dir`, replacing any previous one atomically
    pub async fn persist(&self, dir: &Path) -> Result<PathBuf, IndexError> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| IndexError::Io { path: dir.to_path_buf(), source })?;

        let target = Self::path(dir);
        let tmp = dir.join(format!("{}.{}.tmp", INDEX_FILE, uuid::Uuid::new_v4()));

        let bytes = serde_json::to_vec(self).map_err(|e| IndexError::Corrupt {
            path: target.clone(),
            message: e.to_string(),
        })?;

        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|source| IndexError::Io { path: tmp.clone(), source })?;

        if let Err(source) = tokio::fs::rename(&tmp, &target).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(IndexError::Io { path: target, source });
        }

        Ok(target)
    }

    /// Remove the index in `dir`. Returns whether one existed.
    pub async fn remove(dir: &Path) -> Result<bool, IndexError> {
        let path = Self::path(dir);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(IndexError::Io { path, source }),
        }
    }

    /// Top `k` chunks by cosine similarity, ties kept in index order
    pub fn search(&self, query: &[f32], k: usize) -> Vec<ScoredChunk<'_>> {
        let mut scored: Vec<ScoredChunk<'_>> = self
            .chunks
            .iter()
            .map(|chunk| ScoredChunk {
                chunk,
                score: cosine_similarity(query, &chunk.embedding),
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        scored
    }
}

/// Loaded indexes keyed by directory, reused until the artifact changes on disk
#[derive(Default)]
pub struct IndexCache {
    entries: DashMap<PathBuf, CachedIndex>,
}

struct CachedIndex {
    modified: SystemTime,
    len: u64,
    index: Arc<TenantIndex>,
}

impl IndexCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Same contract as [`TenantIndex::load`], reading the file only when its
    /// modification time or size differs from the cached copy
    pub async fn get(&self, dir: &Path) -> Result<Option<Arc<TenantIndex>>, IndexError> {
        let path = TenantIndex::path(dir);
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.entries.remove(dir);
                return Ok(None);
            }
            Err(source) => return Err(IndexError::Io { path, source }),
        };
        let modified = metadata
            .modified()
            .map_err(|source| IndexError::Io { path: path.clone(), source })?;
        let len = metadata.len();

        if let Some(cached) = self.entries.get(dir) {
            if cached.modified == modified && cached.len == len {
                return Ok(Some(cached.index.clone()));
            }
        }

        match TenantIndex::load(dir).await {
            Ok(Some(index)) => {
                let index = Arc::new(index);
                self.entries.insert(
                    dir.to_path_buf(),
                    CachedIndex { modified, len, index: index.clone() },
                );
                Ok(Some(index))
            }
            Ok(None) => {
                self.entries.remove(dir);
                Ok(None)
            }
            Err(e) => {
                self.entries.remove(dir);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(source: &str, embedding: Vec<f32>) -> DocumentChunk {
        DocumentChunk {
            source_file: source.into(),
            text: format!("text of {}", source),
            embedding,
        }
    }

    fn index(chunks: Vec<DocumentChunk>) -> TenantIndex {
        TenantIndex {
            tenant_id: "acme".into(),
            embedding_model: "hash-2".into(),
            dimension: 2,
            built_at: Utc::now(),
            chunks,
        }
    }

    #[tokio::test]
    async fn test_missing_index_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(TenantIndex::load(dir.path()).await.unwrap().is_none());
        assert!(!TenantIndex::remove(dir.path()).await.unwrap());
    }

    #[tokio::test]
    async fn test_persist_replaces_previous() {
        let dir = tempfile::tempdir().unwrap();
        let index_dir = dir.path().join("index");

        index(vec![chunk("a.txt", vec![1.0, 0.0])]).persist(&index_dir).await.unwrap();
        index(vec![chunk("b.txt", vec![0.0, 1.0]), chunk("c.txt", vec![1.0, 1.0])])
            .persist(&index_dir)
            .await
            .unwrap();

        let loaded = TenantIndex::load(&index_dir).await.unwrap().unwrap();
        assert_eq!(loaded.chunks.len(), 2);
        assert_eq!(loaded.chunks[0].source_file, "b.txt");

        // No temporary files left behind
        let entries = std::fs::read_dir(&index_dir).unwrap().count();
        assert_eq!(entries, 1);

        assert!(TenantIndex::remove(&index_dir).await.unwrap());
        assert!(TenantIndex::load(&index_dir).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_index_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(INDEX_FILE), b"{not json").unwrap();
        assert!(matches!(
            TenantIndex::load(dir.path()).await,
            Err(IndexError::Corrupt { .. })
        ));

        let mut bad = index(vec![chunk("a.txt", vec![1.0, 0.0, 0.0])]);
        bad.dimension = 2;
        std::fs::write(dir.path().join(INDEX_FILE), serde_json::to_vec(&bad).unwrap()).unwrap();
        assert!(matches!(
            TenantIndex::load(dir.path()).await,
            Err(IndexError::Corrupt { .. })
        ));
    }

    #[tokio::test]
    async fn test_cache_reuses_until_rebuilt() {
        let dir = tempfile::tempdir().unwrap();
        let cache = IndexCache::new();
        assert!(cache.get(dir.path()).await.unwrap().is_none());

        index(vec![chunk("a.txt", vec![1.0, 0.0])]).persist(dir.path()).await.unwrap();
        let first = cache.get(dir.path()).await.unwrap().unwrap();
        let again = cache.get(dir.path()).await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        index(vec![chunk("b.txt", vec![0.0, 1.0]), chunk("c.txt", vec![1.0, 1.0])])
            .persist(dir.path())
            .await
            .unwrap();
        let rebuilt = cache.get(dir.path()).await.unwrap().unwrap();
        assert_eq!(rebuilt.chunks.len(), 2);

        TenantIndex::remove(dir.path()).await.unwrap();
        assert!(cache.get(dir.path()).await.unwrap().is_none());
    }

    #[test]
    fn test_search_ranks_and_truncates() {
        let index = index(vec![
            chunk("far.txt", vec![0.0, 1.0]),
            chunk("near.txt", vec![1.0, 0.1]),
            chunk("exact.txt", vec![1.0, 0.0]),
            chunk("twin.txt", vec![2.0, 0.0]),
        ]);

        let hits = index.search(&[1.0, 0.0], 3);
        let sources: Vec<_> = hits.iter().map(|h| h.chunk.source_file.as_str()).collect();
        assert_eq!(sources, vec!["exact.txt", "twin.txt", "near.txt"]);

        assert!(index.search(&[1.0, 0.0], 0).is_empty());
        assert_eq!(index.search(&[1.0, 0.0], 10).len(), 4);
    }
}
