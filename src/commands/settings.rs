use colored::Colorize;

use crate::config::{EmbeddingMethod, EvalSettings, RetrieverKind, SplitMethod, CHUNK_CHOICES, LLM_MODELS};
use crate::session::EvalSession;

fn labels<T: std::fmt::Display>(items: &[T]) -> String {
    items.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(", ")
}

pub fn show(settings: &EvalSettings) {
    println!("\n⚙️ Evaluator Settings:");
    println!("  {:<20} {}", "llm", settings.llm_model.cyan());
    println!("  {:<20} {}", "questions", settings.eval_questions.to_string().cyan());
    println!("  {:<20} {}", "chunk_size", settings.chunk_size.to_string().cyan());
    println!("  {:<20} {}", "chunk_overlap", settings.chunk_overlap.to_string().cyan());
    println!("  {:<20} {}", "split_method", settings.split_method.to_string().cyan());
    println!("  {:<20} {}", "retriever", settings.retriever.to_string().cyan());
    println!("  {:<20} {}", "k", settings.chunks_to_retrieve.to_string().cyan());
    println!("  {:<20} {}", "embedding", settings.embedding_method.to_string().cyan());

    println!("\n  Choices:");
    println!("  llm: {}", LLM_MODELS.join(", "));
    println!("  questions: 1-10, chunk_size: 500-2000, chunk_overlap: 0-200");
    println!("  split_method: {}", labels(&SplitMethod::ALL));
    println!("  retriever: {}", labels(&RetrieverKind::ALL));
    println!("  k: {}", labels(&CHUNK_CHOICES));
    println!("  embedding: {}", labels(&EmbeddingMethod::ALL));
    println!();
}

pub fn set(session: &mut EvalSession, key: &str, value: &str) -> Result<(), String> {
    if key.is_empty() || value.is_empty() {
        return Err("Usage: set <key> <value>".to_string());
    }

    session.set(key, value).map_err(|e| e.to_string())?;
    println!("✅ {} = {}", key.bright_yellow(), value.bright_green());
    if session.document_path().is_some() {
        println!("{}", "The document will be re-indexed on the next question.".dimmed());
    }
    Ok(())
}
