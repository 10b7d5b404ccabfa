//! PDF text extraction module
//!
//! Extracts text content from PDF files using lopdf.

use crate::errors::IndexBuildError;
use std::path::Path;
use tracing::{debug, warn};

/// Extract the text of every page. A PDF without a text layer yields an
/// empty string rather than an error.
pub fn extract_text_from_pdf(path: &Path) -> Result<String, IndexBuildError> {
    let doc = lopdf::Document::load(path).map_err(|e| IndexBuildError::Document {
        path: path.display().to_string(),
        message: format!("Failed to load PDF: {}", e),
    })?;

    let pages: Vec<u32> = doc.get_pages().keys().copied().collect();
    debug!(page_count = pages.len(), path = %path.display(), "Extracting text from PDF");

    let mut text = String::new();
    for page in pages {
        match doc.extract_text(&[page]) {
            Ok(page_text) => {
                text.push_str(&page_text);
                text.push('\n');
            }
            Err(e) => {
                warn!(page, error = %e, path = %path.display(), "Failed to extract text from page, skipping");
            }
        }
    }

    if text.trim().is_empty() {
        warn!(path = %path.display(), "No text content extracted from PDF");
    }

    Ok(clean_text(&text))
}

/// Collapse whitespace runs and strip byte-order marks
fn clean_text(text: &str) -> String {
    text.replace('\u{FEFF}', "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
