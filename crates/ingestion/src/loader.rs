//! Document loading
//!
//! Reads every supported file under a tenant's documents folder.

use crate::errors::IndexBuildError;
use crate::pdf::extract_text_from_pdf;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Extensions the loader understands, lowercase
pub const SUPPORTED_EXTENSIONS: &[&str] = &["txt", "md", "markdown", "pdf"];

/// Text of one source file
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedDocument {
    /// Path relative to the documents folder, `/`-separated
    pub source_file: String,
    pub text: String,
}

/// Supported files under `root` in sorted order, skipping hidden entries.
///
/// Fails on the first unsupported file so that nothing is embedded for a
/// folder that cannot be indexed completely.
pub fn discover(root: &Path) -> Result<Vec<PathBuf>, IndexBuildError> {
    if !root.is_dir() {
        return Err(IndexBuildError::NoSourceDocuments {
            path: root.display().to_string(),
        });
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name()));

    for entry in walker {
        let entry = entry.map_err(|e| IndexBuildError::Document {
            path: root.display().to_string(),
            message: e.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.into_path();
        if extension(&path).is_none() {
            return Err(IndexBuildError::UnsupportedFileType {
                path: relative(root, &path),
            });
        }
        files.push(path);
    }

    Ok(files)
}

/// Load the text of one file found by [`discover`]
pub fn load(root: &Path, path: &Path) -> Result<LoadedDocument, IndexBuildError> {
    let source_file = relative(root, path);

    let text = match extension(path) {
        Some("pdf") => extract_text_from_pdf(path)?,
        Some(_) => std::fs::read_to_string(path).map_err(|e| IndexBuildError::Document {
            path: source_file.clone(),
            message: e.to_string(),
        })?,
        None => return Err(IndexBuildError::UnsupportedFileType { path: source_file }),
    };

    debug!(source_file = %source_file, len = text.len(), "Document loaded");
    Ok(LoadedDocument { source_file, text })
}

/// Discover and load every document under `root`
pub fn load_all(root: &Path) -> Result<Vec<LoadedDocument>, IndexBuildError> {
    discover(root)?
        .iter()
        .map(|path| load(root, path))
        .collect()
}

fn extension(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    SUPPORTED_EXTENSIONS.iter().copied().find(|s| *s == ext)
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().map(|n| n.starts_with('.')).unwrap_or(false)
}

fn relative(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
