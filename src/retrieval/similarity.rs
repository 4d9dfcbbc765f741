use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{cosine_similarity, embed_chunks, top_k, RetrievalError, Retriever};
use crate::config::RetrieverKind;
use crate::document::Document;
use crate::providers::Embeddings;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    document: Document,
    vector: Vec<f32>,
}

#[derive(Serialize, Deserialize)]
struct IndexFile {
    fingerprint: String,
    embedding_model: String,
    entries: Vec<IndexEntry>,
}

/// Flat vector index scored by cosine similarity, persisted as JSON.
pub struct SimilaritySearch {
    entries: Vec<IndexEntry>,
    embeddings: Arc<dyn Embeddings>,
    k: usize,
    fingerprint: String,
}

impl SimilaritySearch {
    pub async fn from_documents(
        documents: &[Document],
        embeddings: Arc<dyn Embeddings>,
        k: usize,
        fingerprint: String,
    ) -> Result<Self, RetrievalError> {
        let entries = embed_chunks(documents, embeddings.as_ref())
            .await?
            .into_iter()
            .map(|(document, vector)| IndexEntry { document, vector })
            .collect();

        Ok(Self { entries, embeddings, k, fingerprint })
    }

    pub fn index_path(dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("{}.index", name))
    }

    pub fn save_local(&self, dir: &Path, name: &str) -> Result<PathBuf, RetrievalError> {
        fs::create_dir_all(dir)?;
        let path = Self::index_path(dir, name);
        let file = IndexFile {
            fingerprint: self.fingerprint.clone(),
            embedding_model: self.embeddings.model_name().to_string(),
            entries: self.entries.clone(),
        };
        let json = serde_json::to_vec(&file).map_err(|e| RetrievalError::Index(e.to_string()))?;
        fs::write(&path, json)?;
        log::info!("Saved {} vectors to {}", self.entries.len(), path.display());
        Ok(path)
    }

    /// Loads a saved index; `None` when it is missing, unreadable or built with other settings.
    pub fn load_local(
        dir: &Path,
        name: &str,
        embeddings: Arc<dyn Embeddings>,
        k: usize,
        fingerprint: &str,
    ) -> Result<Option<Self>, RetrievalError> {
        let path = Self::index_path(dir, name);
        if !path.is_file() {
            return Ok(None);
        }

        let raw = fs::read(&path)?;
        let file: IndexFile = match serde_json::from_slice(&raw) {
            Ok(file) => file,
            Err(e) => {
                log::warn!("Ignoring unreadable index {}: {}", path.display(), e);
                return Ok(None);
            }
        };

        if file.fingerprint != fingerprint {
            log::info!("Index {} was built with other settings, rebuilding", path.display());
            return Ok(None);
        }

        Ok(Some(Self {
            entries: file.entries,
            embeddings,
            k,
            fingerprint: file.fingerprint,
        }))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub async fn similarity_search_with_score(&self, query: &str, k: usize) -> Result<Vec<(Document, f32)>> {
        let query_vector = self.embeddings.embed_query(query).await?;
        let scores: Vec<f32> = self.entries
            .iter()
            .map(|entry| cosine_similarity(&query_vector, &entry.vector))
            .collect();

        Ok(top_k(&scores, k)
            .into_iter()
            .map(|i| (self.entries[i].document.clone(), scores[i]))
            .collect())
    }
}

#[async_trait]
impl Retriever for SimilaritySearch {
    async fn get_relevant_documents(&self, query: &str) -> Result<Vec<Document>> {
        let results = self.similarity_search_with_score(query, self.k).await?;
        Ok(results.into_iter().map(|(doc, _)| doc).collect())
    }

    fn kind(&self) -> RetrieverKind {
        RetrieverKind::SimilaritySearch
    }
}
