use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;

use super::{top_k, Retriever};
use crate::config::RetrieverKind;
use crate::document::Document;

type SparseVector = HashMap<usize, f32>;

/// Lowercased word tokens of at least two characters.
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|token| token.chars().count() >= 2)
        .map(|token| token.to_lowercase())
}

/// Keyword retriever over smoothed tf-idf vectors.
pub struct TfidfRetriever {
    documents: Vec<Document>,
    vocabulary: HashMap<String, usize>,
    idf: Vec<f32>,
    vectors: Vec<SparseVector>,
    k: usize,
}

impl TfidfRetriever {
    pub fn from_documents(documents: &[Document], k: usize) -> Self {
        let mut vocabulary: HashMap<String, usize> = HashMap::new();
        let mut document_frequency: Vec<usize> = Vec::new();
        let mut counts: Vec<HashMap<usize, usize>> = Vec::with_capacity(documents.len());

        for doc in documents {
            let mut tf: HashMap<usize, usize> = HashMap::new();
            for token in tokenize(&doc.page_content) {
                let next_id = vocabulary.len();
                let id = *vocabulary.entry(token).or_insert(next_id);
                if id == document_frequency.len() {
                    document_frequency.push(0);
                }
                *tf.entry(id).or_insert(0) += 1;
            }
            for id in tf.keys() {
                document_frequency[*id] += 1;
            }
            counts.push(tf);
        }

        let n = documents.len() as f32;
        let idf: Vec<f32> = document_frequency
            .iter()
            .map(|&df| ((1.0 + n) / (1.0 + df as f32)).ln() + 1.0)
            .collect();

        let vectors = counts
            .into_iter()
            .map(|tf| weigh(tf.into_iter(), &idf))
            .collect();

        Self {
            documents: documents.to_vec(),
            vocabulary,
            idf,
            vectors,
            k,
        }
    }

    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }

    /// Cosine similarity of the query against every document.
    pub fn scores(&self, query: &str) -> Vec<f32> {
        let mut tf: HashMap<usize, usize> = HashMap::new();
        for token in tokenize(query) {
            if let Some(&id) = self.vocabulary.get(&token) {
                *tf.entry(id).or_insert(0) += 1;
            }
        }
        let query_vector = weigh(tf.into_iter(), &self.idf);

        self.vectors
            .iter()
            .map(|doc| {
                query_vector
                    .iter()
                    .filter_map(|(id, q)| doc.get(id).map(|d| q * d))
                    .sum()
            })
            .collect()
    }
}

fn weigh(tf: impl Iterator<Item = (usize, usize)>, idf: &[f32]) -> SparseVector {
    let mut vector: SparseVector = tf.map(|(id, count)| (id, count as f32 * idf[id])).collect();
    let norm = vector.values().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.values_mut().for_each(|v| *v /= norm);
    }
    vector
}

#[async_trait]
impl Retriever for TfidfRetriever {
    async fn get_relevant_documents(&self, query: &str) -> Result<Vec<Document>> {
        let scores = self.scores(query);
        Ok(top_k(&scores, self.k)
            .into_iter()
            .map(|i| self.documents[i].clone())
            .collect())
    }

    fn kind(&self) -> RetrieverKind {
        RetrieverKind::Tfidf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn retriever(k: usize) -> TfidfRetriever {
        TfidfRetriever::from_documents(
            &[
                Document::new("The cat sat on the mat."),
                Document::new("Dogs chase the cat around the yard."),
                Document::new("Quarterly market report: the stock rallied."),
            ],
            k,
        )
    }

    #[test]
    fn test_single_letter_tokens_are_dropped() {
        let tokens: Vec<String> = tokenize("A cat, a Mat_2 & I").collect();
        assert_eq!(tokens, vec!["cat".to_string(), "mat_2".to_string()]);
    }

    #[tokio::test]
    async fn test_rare_terms_win() {
        let docs = retriever(1).get_relevant_documents("market report").await.unwrap();
        assert_eq!(docs[0].page_content, "Quarterly market report: the stock rallied.");

        let docs = retriever(2).get_relevant_documents("cat mat").await.unwrap();
        assert_eq!(docs[0].page_content, "The cat sat on the mat.");
        assert_eq!(docs[1].page_content, "Dogs chase the cat around the yard.");
    }

    #[test]
    fn test_unknown_query_scores_zero() {
        let scores = retriever(3).scores("zebra");
        assert!(scores.iter().all(|&s| s == 0.0));
    }
}
