pub mod api;
pub mod commands;
pub mod config;
pub mod database;
pub mod document;
pub mod factory;
pub mod llm;
pub mod providers;
pub mod retrieval;
pub mod session;

// Re-export commonly used items
pub use config::{AppConfig, EvalSettings};
pub use session::{EvalSession, SessionError};
