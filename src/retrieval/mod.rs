mod azure;
mod qdrant;
mod similarity;
mod svm;
mod tfidf;

use anyhow::Result;
use async_trait::async_trait;
use std::cmp::Ordering;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{AzureSearchConfig, RetrieverKind};
use crate::database::VectorDBError;
use crate::document::Document;
use crate::providers::Embeddings;

pub use azure::AzureSearchRetriever;
pub use qdrant::QdrantRetriever;
pub use similarity::SimilaritySearch;
pub use svm::SvmRetriever;
pub use tfidf::TfidfRetriever;

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("{0} retriever requires client-side embeddings; choose the OpenAI embedding method")]
    EmbeddingsRequired(RetrieverKind),
    #[error("Azure Cognitive Search is not configured: {0}")]
    SearchNotConfigured(String),
    #[error("No chunks to index")]
    EmptyCorpus,
    #[error("Index file error: {0}")]
    Index(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Vector database error: {0}")]
    VectorDB(#[from] VectorDBError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Returns the documents most relevant to a query.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn get_relevant_documents(&self, query: &str) -> Result<Vec<Document>>;

    fn kind(&self) -> RetrieverKind;
}

/// Inputs shared by every retriever constructor.
pub struct RetrieverContext<'a> {
    pub chunks: &'a [Document],
    pub embeddings: Option<Arc<dyn Embeddings>>,
    pub k: usize,
    pub index_dir: &'a Path,
    pub index_name: &'a str,
    pub fingerprint: String,
    pub search: Option<&'a AzureSearchConfig>,
    pub qdrant_url: &'a str,
}

pub struct BuiltRetriever {
    pub retriever: Arc<dyn Retriever>,
    pub index_reused: bool,
}

impl<'a> RetrieverContext<'a> {
    fn require_embeddings(&self, kind: RetrieverKind) -> Result<Arc<dyn Embeddings>, RetrievalError> {
        self.embeddings.clone().ok_or(RetrievalError::EmbeddingsRequired(kind))
    }

    fn require_chunks(&self) -> Result<(), RetrievalError> {
        if self.chunks.is_empty() {
            Err(RetrievalError::EmptyCorpus)
        } else {
            Ok(())
        }
    }
}

/// Builds (or reloads) the retriever selected in the settings.
pub async fn build_retriever(kind: RetrieverKind, ctx: RetrieverContext<'_>) -> Result<BuiltRetriever, RetrievalError> {
    let (retriever, index_reused): (Arc<dyn Retriever>, bool) = match kind {
        RetrieverKind::SimilaritySearch => {
            let embeddings = ctx.require_embeddings(kind)?;
            match SimilaritySearch::load_local(ctx.index_dir, ctx.index_name, embeddings.clone(), ctx.k, &ctx.fingerprint)? {
                Some(index) => (Arc::new(index), true),
                None => {
                    ctx.require_chunks()?;
                    let index = SimilaritySearch::from_documents(ctx.chunks, embeddings, ctx.k, ctx.fingerprint.clone()).await?;
                    index.save_local(ctx.index_dir, ctx.index_name)?;
                    (Arc::new(index), false)
                }
            }
        }
        RetrieverKind::Svm => {
            let embeddings = ctx.require_embeddings(kind)?;
            ctx.require_chunks()?;
            (Arc::new(SvmRetriever::from_documents(ctx.chunks, embeddings, ctx.k).await?), false)
        }
        RetrieverKind::Tfidf => {
            ctx.require_chunks()?;
            (Arc::new(TfidfRetriever::from_documents(ctx.chunks, ctx.k)), false)
        }
        RetrieverKind::AzureCognitiveSearch => {
            let config = ctx.search.ok_or_else(|| {
                RetrievalError::SearchNotConfigured("set AZURE_COGNITIVE_SEARCH_* variables".to_string())
            })?;
            (Arc::new(AzureSearchRetriever::new(config, ctx.k)?), false)
        }
        RetrieverKind::Qdrant => {
            let embeddings = ctx.require_embeddings(kind)?;
            ctx.require_chunks()?;
            let retriever = QdrantRetriever::from_documents(
                ctx.qdrant_url,
                ctx.index_name,
                ctx.chunks,
                embeddings,
                ctx.k,
            ).await?;
            (Arc::new(retriever), false)
        }
    };

    log::info!("Built {} retriever (reused index: {})", kind, index_reused);
    Ok(BuiltRetriever { retriever, index_reused })
}

/// Embeds every chunk and pairs it with its vector. A provider that returns
/// a different number of vectors is an error rather than a silent truncation.
pub(crate) async fn embed_chunks(
    documents: &[Document],
    embeddings: &dyn Embeddings,
) -> Result<Vec<(Document, Vec<f32>)>, RetrievalError> {
    let texts: Vec<String> = documents.iter().map(|d| d.page_content.clone()).collect();
    let vectors = embeddings.embed_documents(&texts).await?;
    if vectors.len() != documents.len() {
        return Err(RetrievalError::Index(format!(
            "expected {} embeddings, got {}",
            documents.len(),
            vectors.len()
        )));
    }
    Ok(documents.iter().cloned().zip(vectors).collect())
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

pub(crate) fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
}

/// Indices of the `k` highest scores, best first; ties keep input order.
pub(crate) fn top_k(scores: &[f32], k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].partial_cmp(&scores[a]).unwrap_or(Ordering::Equal));
    order.truncate(k);
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::testing::KeywordEmbeddings;

    fn chunks() -> Vec<Document> {
        vec![
            Document::new("rust borrow checker ownership"),
            Document::new("python garbage collector"),
        ]
    }

    /// Drops the last vector of every batch.
    pub(crate) struct ShortEmbeddings;

    #[async_trait]
    impl Embeddings for ShortEmbeddings {
        async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let inner = KeywordEmbeddings::default();
            Ok(texts.iter().skip(1).map(|t| inner.embed(t)).collect())
        }

        async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
            Ok(KeywordEmbeddings::default().embed(text))
        }

        fn model_name(&self) -> &str {
            "short"
        }
    }

    #[tokio::test]
    async fn test_embed_chunks_rejects_count_mismatch() {
        let pairs = embed_chunks(&chunks(), &KeywordEmbeddings::default()).await.unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[1].0.page_content, "python garbage collector");

        let err = embed_chunks(&chunks(), &ShortEmbeddings).await.unwrap_err();
        assert!(matches!(err, RetrievalError::Index(ref m) if m == "expected 2 embeddings, got 1"));
    }

    #[test]
    fn test_top_k_orders_by_score() {
        assert_eq!(top_k(&[0.1, 0.9, 0.5, 0.9], 3), vec![1, 3, 2]);
        assert_eq!(top_k(&[0.1], 5), vec![0]);
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn test_embedding_retrievers_need_embeddings() {
        let dir = tempfile::tempdir().unwrap();
        let chunks = chunks();
        for kind in [RetrieverKind::SimilaritySearch, RetrieverKind::Svm, RetrieverKind::Qdrant] {
            let ctx = RetrieverContext {
                chunks: &chunks,
                embeddings: None,
                k: 3,
                index_dir: dir.path(),
                index_name: "doc",
                fingerprint: "fp".to_string(),
                search: None,
                qdrant_url: "http://localhost:6333",
            };
            let err = build_retriever(kind, ctx).await.err().unwrap();
            assert!(matches!(err, RetrievalError::EmbeddingsRequired(k) if k == kind));
        }
    }

    #[tokio::test]
    async fn test_azure_search_needs_configuration() {
        let dir = tempfile::tempdir().unwrap();
        let chunks = chunks();
        let ctx = RetrieverContext {
            chunks: &chunks,
            embeddings: None,
            k: 3,
            index_dir: dir.path(),
            index_name: "doc",
            fingerprint: "fp".to_string(),
            search: None,
            qdrant_url: "http://localhost:6333",
        };
        let err = build_retriever(RetrieverKind::AzureCognitiveSearch, ctx).await.err().unwrap();
        assert!(matches!(err, RetrievalError::SearchNotConfigured(_)));
    }

    #[tokio::test]
    async fn test_similarity_index_is_reused_when_fingerprint_matches() {
        let dir = tempfile::tempdir().unwrap();
        let chunks = chunks();
        let embeddings: Arc<dyn Embeddings> = Arc::new(KeywordEmbeddings::default());
        let ctx = |fingerprint: &str| RetrieverContext {
            chunks: &chunks,
            embeddings: Some(embeddings.clone()),
            k: 1,
            index_dir: dir.path(),
            index_name: "doc",
            fingerprint: fingerprint.to_string(),
            search: None,
            qdrant_url: "http://localhost:6333",
        };

        let first = build_retriever(RetrieverKind::SimilaritySearch, ctx("fp-1")).await.unwrap();
        assert!(!first.index_reused);
        assert!(dir.path().join("doc.index").is_file());

        let second = build_retriever(RetrieverKind::SimilaritySearch, ctx("fp-1")).await.unwrap();
        assert!(second.index_reused);
        let docs = second.retriever.get_relevant_documents("borrow checker").await.unwrap();
        assert_eq!(docs[0].page_content, "rust borrow checker ownership");

        let third = build_retriever(RetrieverKind::SimilaritySearch, ctx("fp-2")).await.unwrap();
        assert!(!third.index_reused);
    }

    #[tokio::test]
    async fn test_empty_corpus_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = RetrieverContext {
            chunks: &[],
            embeddings: None,
            k: 3,
            index_dir: dir.path(),
            index_name: "doc",
            fingerprint: "fp".to_string(),
            search: None,
            qdrant_url: "http://localhost:6333",
        };
        let err = build_retriever(RetrieverKind::Tfidf, ctx).await.err().unwrap();
        assert!(matches!(err, RetrievalError::EmptyCorpus));
    }
}
