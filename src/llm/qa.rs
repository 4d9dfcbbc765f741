use anyhow::{bail, Result};
use serde::Serialize;
use std::sync::Arc;

use crate::document::Document;
use crate::providers::ChatModel;
use crate::retrieval::Retriever;

pub const STUFF_PROMPT: &str = "Use the following pieces of context to answer the question at the end. \
If you don't know the answer, just say that you don't know, don't try to make up an answer.\n\n\
{context}\n\nQuestion: {question}\nHelpful Answer:";

#[derive(Debug, Clone, Serialize)]
pub struct QaAnswer {
    pub answer: String,
    pub sources: Vec<Document>,
}

/// Answers questions by stuffing retrieved chunks into a single prompt.
#[derive(Clone)]
pub struct RetrievalQA {
    llm: Arc<dyn ChatModel>,
    retriever: Arc<dyn Retriever>,
}

impl RetrievalQA {
    pub fn from_chain_type(llm: Arc<dyn ChatModel>, retriever: Arc<dyn Retriever>) -> Self {
        Self { llm, retriever }
    }

    pub fn retriever(&self) -> &Arc<dyn Retriever> {
        &self.retriever
    }

    pub fn build_prompt(question: &str, documents: &[Document]) -> String {
        let context = documents
            .iter()
            .map(|d| d.page_content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        STUFF_PROMPT
            .replace("{context}", &context)
            .replace("{question}", question)
    }

    pub async fn run(&self, question: &str) -> Result<QaAnswer> {
        let question = question.trim();
        if question.is_empty() {
            bail!("Question must not be empty");
        }

        let sources = self.retriever.get_relevant_documents(question).await?;
        log::debug!("Retrieved {} chunks for question", sources.len());

        let prompt = Self::build_prompt(question, &sources);
        let answer = self.llm.complete(&prompt).await?;

        Ok(QaAnswer {
            answer: answer.trim().to_string(),
            sources,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::testing::ScriptedChat;
    use crate::retrieval::TfidfRetriever;

    fn chain(llm: Arc<ScriptedChat>) -> RetrievalQA {
        let retriever = TfidfRetriever::from_documents(
            &[
                Document::new("The warranty covers parts for two years."),
                Document::new("Invoices are payable within thirty days."),
            ],
            1,
        );
        RetrievalQA::from_chain_type(llm, Arc::new(retriever))
    }

    #[tokio::test]
    async fn test_prompt_contains_retrieved_context() {
        let llm = Arc::new(ScriptedChat::new(&["  Two years.  "], ""));
        let answer = chain(llm.clone()).run("How long is the warranty?").await.unwrap();

        assert_eq!(answer.answer, "Two years.");
        assert_eq!(answer.sources.len(), 1);

        let prompts = llm.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("The warranty covers parts for two years."));
        assert!(!prompts[0].contains("Invoices"));
        assert!(prompts[0].ends_with("Question: How long is the warranty?\nHelpful Answer:"));
    }

    #[tokio::test]
    async fn test_empty_question_is_rejected() {
        let llm = Arc::new(ScriptedChat::new(&[], "unused"));
        assert!(chain(llm.clone()).run("   ").await.is_err());
        assert!(llm.prompts().is_empty());
    }
}
