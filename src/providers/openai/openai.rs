use async_trait::async_trait;
use anyhow::{Result, anyhow};
use crate::config::AzureOpenAIConfig;
use crate::providers::traits::{ChatModel, Embeddings};
use async_openai::{
    types::{
        CreateEmbeddingRequestArgs,
        EmbeddingInput,
        CreateChatCompletionRequestArgs,
        ChatCompletionRequestMessage,
        ChatCompletionRequestUserMessageArgs,
    },
    Client,
    config::{AzureConfig, Config, OpenAIConfig},
};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

const QUERY_CACHE_SIZE: usize = 256;
const EMBEDDING_BATCH: usize = 8;

fn azure_client(cfg: &AzureOpenAIConfig, deployment: &str) -> Client<AzureConfig> {
    let config = AzureConfig::new()
        .with_api_base(cfg.api_base.as_str())
        .with_api_version(cfg.api_version.as_str())
        .with_deployment_id(deployment)
        .with_api_key(cfg.api_key.as_str());
    Client::with_config(config)
}

#[derive(Clone)]
pub struct OpenAIChatProvider<C: Config> {
    client: Client<C>,
    chat_model: String,
    max_tokens: u16,
    temperature: f32,
}

impl OpenAIChatProvider<AzureConfig> {
    /// Chat client bound to an Azure deployment named after the model.
    pub fn azure(cfg: &AzureOpenAIConfig, deployment: &str, max_tokens: u16, temperature: f32) -> Self {
        Self {
            client: azure_client(cfg, deployment),
            chat_model: deployment.to_string(),
            max_tokens,
            temperature,
        }
    }
}

impl OpenAIChatProvider<OpenAIConfig> {
    pub fn openai(api_key: &str, model: &str, max_tokens: u16, temperature: f32) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key);
        Self {
            client: Client::with_config(config),
            chat_model: model.to_string(),
            max_tokens,
            temperature,
        }
    }
}

impl<C: Config> OpenAIChatProvider<C> {
    pub fn max_tokens(&self) -> u16 {
        self.max_tokens
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }
}

#[async_trait]
impl<C: Config + Send + Sync + 'static> ChatModel for OpenAIChatProvider<C> {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt)
                .build()?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.chat_model)
            .messages(messages)
            .max_tokens(self.max_tokens)
            .temperature(self.temperature)
            .build()?;

        let response = self.client.chat().create(request).await?;

        response.choices.first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| anyhow!("No response content"))
    }

    fn model_name(&self) -> &str {
        &self.chat_model
    }
}

#[derive(Clone)]
pub struct OpenAIEmbeddingProvider<C: Config> {
    client: Client<C>,
    embedding_model: String,
    query_cache: Arc<Mutex<LruCache<String, Vec<f32>>>>,
}

impl OpenAIEmbeddingProvider<AzureConfig> {
    pub fn azure(cfg: &AzureOpenAIConfig, deployment: &str) -> Self {
        Self::with_client(azure_client(cfg, deployment), deployment)
    }
}

impl OpenAIEmbeddingProvider<OpenAIConfig> {
    pub fn openai(api_key: &str, model: &str) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key);
        Self::with_client(Client::with_config(config), model)
    }
}

impl<C: Config + Send + Sync + 'static> OpenAIEmbeddingProvider<C> {
    fn with_client(client: Client<C>, model: &str) -> Self {
        let capacity = NonZeroUsize::new(QUERY_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN);
        Self {
            client,
            embedding_model: model.to_string(),
            query_cache: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    // One text per request
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.embedding_model)
            .input(EmbeddingInput::String(text.to_string()))
            .build()?;

        let response = self.client.embeddings().create(request).await?;

        if let Some(embedding) = response.data.first() {
            Ok(embedding.embedding.clone())
        } else {
            Err(anyhow!("No embedding returned from {}", self.embedding_model))
        }
    }
}

#[async_trait]
impl<C: Config + Send + Sync + 'static> Embeddings for OpenAIEmbeddingProvider<C> {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(EMBEDDING_BATCH) {
            let results = futures::future::join_all(
                batch.iter().map(|text| self.embed_one(text))
            ).await;
            for result in results {
                embeddings.push(result?);
            }
        }
        Ok(embeddings)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(hit) = self.query_cache.lock().ok().and_then(|mut c| c.get(text).cloned()) {
            return Ok(hit);
        }

        let embedding = self.embed_one(text).await?;
        if let Ok(mut cache) = self.query_cache.lock() {
            cache.put(text.to_string(), embedding.clone());
        }
        Ok(embedding)
    }

    fn model_name(&self) -> &str {
        &self.embedding_model
    }
}
