use anyhow::Result;
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

use super::traits::{ChatModel, Embeddings};

/// Chat model that answers from a script and records every prompt.
pub struct ScriptedChat {
    replies: Mutex<VecDeque<String>>,
    fallback: String,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedChat {
    pub fn new(replies: &[&str], fallback: &str) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            fallback: fallback.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedChat {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let next = self.replies.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| self.fallback.clone()))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Bag-of-words embeddings hashed into a small fixed dimension.
pub struct KeywordEmbeddings {
    pub dim: usize,
}

impl KeywordEmbeddings {
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dim];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            vector[(hasher.finish() as usize) % self.dim] += 1.0;
        }
        vector
    }
}

impl Default for KeywordEmbeddings {
    fn default() -> Self {
        Self { dim: 64 }
    }
}

#[async_trait]
impl Embeddings for KeywordEmbeddings {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed(t)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed(text))
    }

    fn model_name(&self) -> &str {
        "keyword"
    }
}
