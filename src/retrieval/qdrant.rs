use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use super::{embed_chunks, RetrievalError, Retriever};
use crate::config::RetrieverKind;
use crate::database::VectorDB;
use crate::document::Document;
use crate::providers::Embeddings;

/// Stores chunk embeddings in a per-document Qdrant collection.
pub struct QdrantRetriever {
    vector_db: VectorDB,
    collection: String,
    embeddings: Arc<dyn Embeddings>,
    k: usize,
}

pub fn collection_name(document_name: &str) -> String {
    let cleaned: String = document_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    format!("doc_{}", cleaned)
}

impl QdrantRetriever {
    pub async fn from_documents(
        url: &str,
        document_name: &str,
        documents: &[Document],
        embeddings: Arc<dyn Embeddings>,
        k: usize,
    ) -> Result<Self, RetrievalError> {
        let pairs = embed_chunks(documents, embeddings.as_ref()).await?;
        let dimension = pairs.first().map(|(_, v)| v.len()).ok_or(RetrievalError::EmptyCorpus)?;

        let vector_db = VectorDB::new(url).await?;
        let collection = collection_name(document_name);
        vector_db.recreate_collection(&collection, dimension as u64).await?;

        let points = pairs
            .into_iter()
            .map(|(doc, vector)| {
                let mut payload = HashMap::new();
                payload.insert("text".to_string(), Value::String(doc.page_content));
                payload.insert("metadata".to_string(), Value::Object(doc.metadata));
                (vector, payload)
            })
            .collect();
        vector_db.store_vectors(&collection, points).await?;

        Ok(Self { vector_db, collection, embeddings, k })
    }
}

#[async_trait]
impl Retriever for QdrantRetriever {
    async fn get_relevant_documents(&self, query: &str) -> Result<Vec<Document>> {
        let query_vector = self.embeddings.embed_query(query).await?;
        let results = self.vector_db
            .search_vectors(&self.collection, query_vector, self.k as u64)
            .await?;

        Ok(results
            .into_iter()
            .filter_map(|(_, score, mut payload)| {
                let text = payload.remove("text")?.as_str()?.to_string();
                let mut doc = Document::new(text);
                if let Some(Value::Object(metadata)) = payload.remove("metadata") {
                    doc.metadata = metadata;
                }
                Some(doc.with_metadata("score", score as f64))
            })
            .collect())
    }

    fn kind(&self) -> RetrieverKind {
        RetrieverKind::Qdrant
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_embedding_count_mismatch_is_an_error() {
        let documents = vec![Document::new("first chunk"), Document::new("second chunk")];
        let err = QdrantRetriever::from_documents(
            "http://localhost:6333",
            "report",
            &documents,
            Arc::new(crate::retrieval::tests::ShortEmbeddings),
            2,
        )
        .await
        .err()
        .unwrap();
        assert!(matches!(err, RetrievalError::Index(_)));
    }

    #[test]
    fn test_collection_name_is_sanitized() {
        assert_eq!(collection_name("Annual Report 2023"), "doc_Annual_Report_2023");
        assert_eq!(collection_name("a.b"), "doc_a_b");
    }
}
