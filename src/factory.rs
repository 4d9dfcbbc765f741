use std::sync::Arc;
use thiserror::Error;

use crate::config::{
    AzureOpenAIConfig, ConfigError, EmbeddingMethod, RetrieverKind, SplitMethod,
    DEFAULT_EMBEDDING_DEPLOYMENT,
};
use crate::document::{DocumentError, TextSplitter};
use crate::providers::openai::{OpenAIChatProvider, OpenAIEmbeddingProvider};
use crate::providers::{ChatModel, Embeddings};

const MAX_TOKENS: u16 = 1024;
const TEMPERATURE: f32 = 0.2;

#[derive(Error, Debug)]
pub enum FactoryError {
    #[error("Unsupported LLM model: {0}")]
    UnsupportedModel(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Document(#[from] DocumentError),
}

/// Azure chat deployment named after the selected model.
pub fn define_llm(model: &str, config: &AzureOpenAIConfig) -> Result<Arc<dyn ChatModel>, FactoryError> {
    if model.contains("gpt-35-turbo") {
        Ok(Arc::new(OpenAIChatProvider::azure(config, model, MAX_TOKENS, TEMPERATURE)))
    } else {
        Err(FactoryError::UnsupportedModel(model.to_string()))
    }
}

pub fn define_retriever(name: &str) -> Result<RetrieverKind, FactoryError> {
    Ok(name.parse()?)
}

pub fn define_splitter(method: SplitMethod, chunk_size: usize, chunk_overlap: usize) -> Result<TextSplitter, FactoryError> {
    Ok(TextSplitter::new(method, chunk_size, chunk_overlap)?)
}

/// `None` when the search service embeds on its side.
pub fn define_embedding(method: EmbeddingMethod, config: &AzureOpenAIConfig) -> Option<Arc<dyn Embeddings>> {
    match method {
        EmbeddingMethod::OpenAI => {
            let deployment = if config.embedding_model.trim().is_empty() {
                DEFAULT_EMBEDDING_DEPLOYMENT
            } else {
                config.embedding_model.as_str()
            };
            Some(Arc::new(OpenAIEmbeddingProvider::azure(config, deployment)))
        }
        EmbeddingMethod::AzureCognitiveSearch => None,
    }
}

/// Builds the model clients for a session.
pub trait ModelFactory: Send + Sync {
    fn llm(&self, model: &str, config: &AzureOpenAIConfig) -> Result<Arc<dyn ChatModel>, FactoryError>;

    fn embeddings(&self, method: EmbeddingMethod, config: &AzureOpenAIConfig) -> Option<Arc<dyn Embeddings>>;
}

/// Azure OpenAI deployments.
pub struct AzureModels;

impl ModelFactory for AzureModels {
    fn llm(&self, model: &str, config: &AzureOpenAIConfig) -> Result<Arc<dyn ChatModel>, FactoryError> {
        define_llm(model, config)
    }

    fn embeddings(&self, method: EmbeddingMethod, config: &AzureOpenAIConfig) -> Option<Arc<dyn Embeddings>> {
        define_embedding(method, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AzureOpenAIConfig {
        AzureOpenAIConfig {
            api_base: "https://example.openai.azure.com".to_string(),
            api_version: "2023-05-15".to_string(),
            api_key: "test-key".to_string(),
            embedding_model: String::new(),
            chat_model: None,
        }
    }

    #[test]
    fn test_define_llm() {
        let llm = define_llm("gpt-35-turbo-16k", &config()).unwrap();
        assert_eq!(llm.model_name(), "gpt-35-turbo-16k");
        assert!(matches!(
            define_llm("llama-2", &config()),
            Err(FactoryError::UnsupportedModel(_))
        ));
    }

    #[test]
    fn test_define_embedding() {
        assert!(define_embedding(EmbeddingMethod::AzureCognitiveSearch, &config()).is_none());
        let embeddings = define_embedding(EmbeddingMethod::OpenAI, &config()).unwrap();
        assert_eq!(embeddings.model_name(), DEFAULT_EMBEDDING_DEPLOYMENT);
    }

    #[test]
    fn test_define_retriever_and_splitter() {
        assert_eq!(define_retriever("TFIDF").unwrap(), RetrieverKind::Tfidf);
        assert!(define_retriever("FAISS").is_err());

        let splitter = define_splitter(SplitMethod::Character, 1000, 200).unwrap();
        assert_eq!(splitter.method(), SplitMethod::Character);
        assert!(define_splitter(SplitMethod::Recursive, 100, 200).is_err());
    }
}
