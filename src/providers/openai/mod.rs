pub mod openai;

pub use openai::{OpenAIChatProvider, OpenAIEmbeddingProvider};
