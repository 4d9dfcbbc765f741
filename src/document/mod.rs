mod loader;
mod splitter;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

pub use loader::{load_single_document, pages_from_text, save_upload};
pub use splitter::TextSplitter;

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Unsupported file type: {0} (only pdf is accepted)")]
    UnsupportedFileType(String),
    #[error("Invalid file name: {0:?}")]
    InvalidFileName(String),
    #[error("Uploaded file is empty")]
    EmptyUpload,
    #[error("Failed to read PDF: {0}")]
    Pdf(String),
    #[error("No text could be extracted from {0}")]
    NoText(String),
    #[error("Chunk overlap {overlap} is larger than chunk size {chunk_size}")]
    Overlap { chunk_size: usize, overlap: usize },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A piece of text with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub page_content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Document {
    pub fn new(page_content: impl Into<String>) -> Self {
        Self {
            page_content: page_content.into(),
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").and_then(|v| v.as_str())
    }

    pub fn page(&self) -> Option<u64> {
        self.metadata.get("page").and_then(|v| v.as_u64())
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.source(), self.page()) {
            (Some(source), Some(page)) => write!(f, "{} (page {})", source, page + 1),
            (Some(source), None) => write!(f, "{}", source),
            _ => write!(f, "<unknown source>"),
        }
    }
}
