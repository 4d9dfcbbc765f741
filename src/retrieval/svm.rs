use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use super::{normalize, top_k, RetrievalError, Retriever};
use crate::config::RetrieverKind;
use crate::document::Document;
use crate::providers::Embeddings;

const C: f32 = 0.1;
const EPOCHS: usize = 200;
const LEARNING_RATE: f32 = 0.5;

/// Ranks documents with a linear SVM trained per query: the query embedding is
/// the only positive example and every document is a negative one.
pub struct SvmRetriever {
    documents: Vec<Document>,
    index: Vec<Vec<f32>>,
    embeddings: Arc<dyn Embeddings>,
    k: usize,
}

impl SvmRetriever {
    pub async fn from_documents(
        documents: &[Document],
        embeddings: Arc<dyn Embeddings>,
        k: usize,
    ) -> Result<Self, RetrievalError> {
        let texts: Vec<String> = documents.iter().map(|d| d.page_content.clone()).collect();
        let mut index = embeddings.embed_documents(&texts).await?;
        index.iter_mut().for_each(|v| normalize(v));

        Ok(Self {
            documents: documents.to_vec(),
            index,
            embeddings,
            k,
        })
    }

    /// Decision values for every document, in document order.
    pub fn decision_values(&self, query: &[f32]) -> Vec<f32> {
        let mut positive = query.to_vec();
        normalize(&mut positive);

        let (w, b) = train(&positive, &self.index);
        self.index.iter().map(|x| dot(&w, x) + b).collect()
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Subgradient descent on the hinge loss with balanced class weights.
fn train(positive: &[f32], negatives: &[Vec<f32>]) -> (Vec<f32>, f32) {
    let dim = positive.len();
    let n = (negatives.len() + 1) as f32;
    let positive_weight = n / 2.0;
    let negative_weight = n / (2.0 * negatives.len().max(1) as f32);

    let samples = std::iter::once((positive, 1.0f32, positive_weight))
        .chain(negatives.iter().map(|x| (x.as_slice(), -1.0f32, negative_weight)))
        .filter(|(x, _, _)| x.len() == dim)
        .collect::<Vec<_>>();

    let mut w = vec![0.0f32; dim];
    let mut b = 0.0f32;
    for epoch in 0..EPOCHS {
        let rate = LEARNING_RATE / (1.0 + epoch as f32);
        let mut grad_w = w.clone();
        let mut grad_b = 0.0f32;

        for (x, y, weight) in &samples {
            if y * (dot(&w, x) + b) < 1.0 {
                for (g, xi) in grad_w.iter_mut().zip(x.iter()) {
                    *g -= C * weight * y * xi;
                }
                grad_b -= C * weight * y;
            }
        }

        for (wi, g) in w.iter_mut().zip(&grad_w) {
            *wi -= rate * g;
        }
        b -= rate * grad_b;
    }
    (w, b)
}

#[async_trait]
impl Retriever for SvmRetriever {
    async fn get_relevant_documents(&self, query: &str) -> Result<Vec<Document>> {
        let query_vector = self.embeddings.embed_query(query).await?;
        let scores = self.decision_values(&query_vector);
        Ok(top_k(&scores, self.k)
            .into_iter()
            .map(|i| self.documents[i].clone())
            .collect())
    }

    fn kind(&self) -> RetrieverKind {
        RetrieverKind::Svm
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::testing::KeywordEmbeddings;

    #[tokio::test]
    async fn test_closest_document_ranks_first() {
        let embeddings: Arc<dyn Embeddings> = Arc::new(KeywordEmbeddings::default());
        let docs = vec![
            Document::new("solar panels convert sunlight"),
            Document::new("wind turbines spin in storms"),
            Document::new("batteries store energy overnight"),
        ];
        let retriever = SvmRetriever::from_documents(&docs, embeddings, 2).await.unwrap();

        let results = retriever.get_relevant_documents("wind turbines storms").await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].page_content, "wind turbines spin in storms");
    }

    #[test]
    fn test_training_separates_positive_from_negatives() {
        let positive = vec![1.0, 0.0];
        let negatives = vec![vec![0.0, 1.0], vec![-1.0, 0.0]];
        let (w, b) = train(&positive, &negatives);
        assert!(dot(&w, &positive) + b > dot(&w, &negatives[0]) + b);
        assert!(dot(&w, &negatives[0]) + b > dot(&w, &negatives[1]) + b);
    }
}
