pub mod vector_db;
pub mod database;
pub mod qdrant_config;

pub use database::{Database, DatabaseError, RunSummary};
pub use vector_db::{VectorDB, VectorDBError};
