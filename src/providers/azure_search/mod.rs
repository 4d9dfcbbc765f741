pub mod azure_search;

pub use azure_search::{AzureSearchClient, SearchHit};
