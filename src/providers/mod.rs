pub mod azure_search;
pub mod openai;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use traits::{ChatModel, Embeddings};
