use std::path::{Path, PathBuf};
use tokio::fs;

use super::{Document, DocumentError};

/// Extracts one document per PDF page.
pub fn load_single_document(path: &Path) -> Result<Vec<Document>, DocumentError> {
    let is_pdf = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);
    if !is_pdf {
        return Err(DocumentError::UnsupportedFileType(path.display().to_string()));
    }

    let bytes = std::fs::read(path)?;
    let text = pdf_extract::extract_text_from_mem(&bytes)
        .map_err(|e| DocumentError::Pdf(e.to_string()))?;

    let source = path.display().to_string();
    let pages = pages_from_text(&text, &source);
    if pages.is_empty() {
        return Err(DocumentError::NoText(source));
    }

    log::info!("Loaded {} pages from {}", pages.len(), source);
    Ok(pages)
}

/// Splits extracted text on form feeds, dropping blank pages.
pub fn pages_from_text(text: &str, source: &str) -> Vec<Document> {
    text.split('\x0c')
        .enumerate()
        .filter(|(_, page)| !page.trim().is_empty())
        .map(|(i, page)| {
            Document::new(page)
                .with_metadata("source", source)
                .with_metadata("page", i as u64)
        })
        .collect()
}

/// Writes an uploaded file under `dir` and returns its path.
pub async fn save_upload(dir: &Path, name: &str, bytes: &[u8]) -> Result<PathBuf, DocumentError> {
    let name = name.trim();
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(DocumentError::InvalidFileName(name.to_string()));
    }
    if bytes.is_empty() {
        return Err(DocumentError::EmptyUpload);
    }

    fs::create_dir_all(dir).await?;
    let path = dir.join(name);
    fs::write(&path, bytes).await?;
    Ok(path)
}
