use anyhow::Result;
use async_trait::async_trait;

use super::{RetrievalError, Retriever};
use crate::config::{AzureSearchConfig, RetrieverKind};
use crate::document::Document;
use crate::providers::azure_search::AzureSearchClient;

const CONTENT_KEY: &str = "content";

/// Delegates retrieval to an existing Azure Cognitive Search index.
pub struct AzureSearchRetriever {
    client: AzureSearchClient,
    content_key: String,
    top_k: usize,
}

impl AzureSearchRetriever {
    pub fn new(config: &AzureSearchConfig, top_k: usize) -> Result<Self, RetrievalError> {
        Ok(Self {
            client: AzureSearchClient::new(config)?,
            content_key: CONTENT_KEY.to_string(),
            top_k,
        })
    }
}

#[async_trait]
impl Retriever for AzureSearchRetriever {
    async fn get_relevant_documents(&self, query: &str) -> Result<Vec<Document>> {
        let hits = self.client.search(query, self.top_k, &self.content_key).await?;
        Ok(hits
            .into_iter()
            .map(|hit| {
                let mut doc = Document::new(hit.content);
                doc.metadata = hit.metadata;
                doc.with_metadata("score", hit.score as f64)
            })
            .collect())
    }

    fn kind(&self) -> RetrieverKind {
        RetrieverKind::AzureCognitiveSearch
    }
}
