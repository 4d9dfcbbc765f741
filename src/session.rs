use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::config::{AppConfig, ConfigError, EvalSettings, RetrieverKind};
use crate::database::{Database, DatabaseError, RunSummary};
use crate::document::{self, Document, DocumentError, TextSplitter};
use crate::factory::{define_splitter, AzureModels, FactoryError, ModelFactory};
use crate::llm::{EvalReport, EvalResult, Evaluator, QaAnswer, RetrievalQA};
use crate::providers::{ChatModel, Embeddings};
use crate::retrieval::{build_retriever, RetrievalError, RetrieverContext};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("No document uploaded yet. Upload a PDF first")]
    NoDocument,
    #[error("Evaluation history is not available without a database")]
    NoDatabase,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Factory(#[from] FactoryError),
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SessionError {
    /// Errors caused by the request rather than the environment.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            SessionError::NoDocument
                | SessionError::Config(_)
                | SessionError::Factory(FactoryError::UnsupportedModel(_))
                | SessionError::Factory(FactoryError::Config(_))
                | SessionError::Document(
                    DocumentError::UnsupportedFileType(_)
                        | DocumentError::InvalidFileName(_)
                        | DocumentError::EmptyUpload
                        | DocumentError::Overlap { .. }
                        | DocumentError::Pdf(_)
                        | DocumentError::NoText(_)
                )
                | SessionError::Retrieval(
                    RetrievalError::EmbeddingsRequired(_) | RetrievalError::SearchNotConfigured(_)
                )
        )
    }
}

#[derive(Clone)]
struct Components {
    llm: Arc<dyn ChatModel>,
    embeddings: Option<Arc<dyn Embeddings>>,
    splitter: TextSplitter,
}

struct LoadedDocument {
    path: PathBuf,
    pages: Vec<Document>,
    chunks: Vec<Document>,
    chain: RetrievalQA,
}

/// Outcome of indexing an uploaded document.
#[derive(Debug, Clone, Serialize)]
pub struct UploadReport {
    pub path: PathBuf,
    pub pages: usize,
    pub chunks: usize,
    pub retriever: RetrieverKind,
    pub index_reused: bool,
}

/// Settings, models and the indexed document shared by both front ends.
pub struct EvalSession {
    config: AppConfig,
    settings: EvalSettings,
    reload: bool,
    models: Box<dyn ModelFactory>,
    components: Option<Components>,
    document: Option<LoadedDocument>,
    db: Option<Database>,
}

impl EvalSession {
    pub fn new(config: AppConfig) -> Self {
        Self::with_models(config, Box::new(AzureModels))
    }

    pub fn with_models(config: AppConfig, models: Box<dyn ModelFactory>) -> Self {
        Self {
            config,
            settings: EvalSettings::default(),
            reload: true,
            models,
            components: None,
            document: None,
            db: None,
        }
    }

    pub fn with_database(mut self, db: Database) -> Self {
        self.db = Some(db);
        self
    }

    pub fn settings(&self) -> &EvalSettings {
        &self.settings
    }

    pub fn reload_pending(&self) -> bool {
        self.reload
    }

    pub fn document_path(&self) -> Option<&Path> {
        self.document.as_ref().map(|d| d.path.as_path())
    }

    pub fn update_settings(&mut self, settings: EvalSettings) -> Result<(), SessionError> {
        settings.check()?;
        self.settings = settings;
        self.reload = true;
        Ok(())
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<(), SessionError> {
        self.settings.set(key, value)?;
        self.reload = true;
        Ok(())
    }

    /// Rebuilds the LLM, embeddings and splitter after a settings change.
    fn ensure_components(&mut self) -> Result<Components, SessionError> {
        if let (false, Some(components)) = (self.reload, &self.components) {
            return Ok(components.clone());
        }

        let llm = self.models.llm(&self.settings.llm_model, &self.config.openai)?;
        let embeddings = self.models.embeddings(self.settings.embedding_method, &self.config.openai);
        let splitter = define_splitter(
            self.settings.split_method,
            self.settings.chunk_size,
            self.settings.chunk_overlap,
        )?;
        log::info!(
            "Components ready: llm={} embeddings={} splitter={}",
            llm.model_name(),
            embeddings.as_ref().map(|e| e.model_name()).unwrap_or("none"),
            self.settings.split_method
        );

        let components = Components { llm, embeddings, splitter };
        self.components = Some(components.clone());
        self.reload = false;
        Ok(components)
    }

    /// Saves the file, extracts its pages and indexes them.
    pub async fn upload(&mut self, name: &str, bytes: &[u8]) -> Result<UploadReport, SessionError> {
        let path = document::save_upload(&self.config.upload_dir(), name, bytes).await?;
        let load_path = path.clone();
        let pages = tokio::task::spawn_blocking(move || document::load_single_document(&load_path))
            .await
            .map_err(anyhow::Error::from)??;
        self.index_pages(path, pages).await
    }

    async fn index_pages(&mut self, path: PathBuf, pages: Vec<Document>) -> Result<UploadReport, SessionError> {
        let components = self.ensure_components()?;
        let chunks = components.splitter.split_documents(&pages);
        log::info!("Split {} pages into {} chunks", pages.len(), chunks.len());

        let index_name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        let index_dir = self.config.index_dir();
        let embedding_model = components
            .embeddings
            .as_ref()
            .map(|e| e.model_name().to_string())
            .unwrap_or_else(|| "none".to_string());
        let kind = self.settings.retriever;
        let digest = content_digest(&chunks);

        let built = match build_retriever(
            kind,
            RetrieverContext {
                chunks: &chunks,
                embeddings: components.embeddings.clone(),
                k: self.settings.chunks_to_retrieve,
                index_dir: &index_dir,
                index_name: &index_name,
                fingerprint: self.settings.index_fingerprint(&embedding_model, &digest),
                search: self.config.search.as_ref(),
                qdrant_url: &self.config.qdrant_url,
            },
        )
        .await
        {
            Ok(built) => built,
            Err(e) => {
                // The loaded chain no longer matches the settings
                self.reload = true;
                return Err(e.into());
            }
        };

        let report = UploadReport {
            path: path.clone(),
            pages: pages.len(),
            chunks: chunks.len(),
            retriever: kind,
            index_reused: built.index_reused,
        };
        self.document = Some(LoadedDocument {
            path,
            pages,
            chunks,
            chain: RetrievalQA::from_chain_type(components.llm, built.retriever),
        });
        Ok(report)
    }

    /// Re-indexes the loaded document when settings changed since upload.
    async fn refresh(&mut self) -> Result<(), SessionError> {
        if !self.reload {
            return Ok(());
        }
        if let Some((path, pages)) = self.document.as_ref().map(|d| (d.path.clone(), d.pages.clone())) {
            log::info!("Settings changed, re-indexing {}", path.display());
            self.index_pages(path, pages).await?;
        }
        Ok(())
    }

    pub async fn ask(&mut self, question: &str) -> Result<QaAnswer, SessionError> {
        if self.document.is_none() {
            return Err(SessionError::NoDocument);
        }
        self.refresh().await?;
        let loaded = self.document.as_ref().ok_or(SessionError::NoDocument)?;
        Ok(loaded.chain.run(question).await?)
    }

    /// Generates questions from the loaded chunks, answers and grades them.
    /// The run is stored when a database is attached; its id is returned.
    pub async fn evaluate(
        &mut self,
        on_progress: impl FnMut(usize, usize) + Send,
    ) -> Result<(EvalReport, Option<i64>), SessionError> {
        if self.document.is_none() {
            return Err(SessionError::NoDocument);
        }
        self.refresh().await?;
        let components = self.ensure_components()?;
        let loaded = self.document.as_ref().ok_or(SessionError::NoDocument)?;

        let evaluator = Evaluator::new(components.llm);
        let mut rng = StdRng::from_entropy();
        let pairs = evaluator
            .generate(&loaded.chunks, self.settings.eval_questions, &mut rng)
            .await?;
        let results = evaluator.evaluate(&loaded.chain, &pairs, on_progress).await?;

        let report = EvalReport {
            document: loaded.path.display().to_string(),
            settings: self.settings.clone(),
            created_at: chrono::Utc::now(),
            results,
        };
        log::info!("Evaluation scored {}/{}", report.correct(), report.results.len());

        let run_id = match &self.db {
            Some(db) => Some(db.save_report(&report).await?),
            None => None,
        };
        Ok((report, run_id))
    }

    pub async fn recent_runs(&self, limit: i64) -> Result<Vec<RunSummary>, SessionError> {
        let db = self.db.as_ref().ok_or(SessionError::NoDatabase)?;
        Ok(db.recent_runs(limit).await?)
    }

    pub async fn run_results(&self, run_id: i64) -> Result<Vec<EvalResult>, SessionError> {
        let db = self.db.as_ref().ok_or(SessionError::NoDatabase)?;
        Ok(db.run_results(run_id).await?)
    }
}

/// SHA-256 over the chunk texts, so a re-upload with new content never
/// matches an index saved for the old one.
fn content_digest(chunks: &[Document]) -> String {
    let mut hasher = Sha256::new();
    for chunk in chunks {
        hasher.update(chunk.page_content.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AzureOpenAIConfig, EmbeddingMethod};
    use crate::llm::Grade;
    use crate::providers::testing::{KeywordEmbeddings, ScriptedChat};

    struct FakeModels {
        chat: Arc<ScriptedChat>,
    }

    impl ModelFactory for FakeModels {
        fn llm(&self, model: &str, _config: &AzureOpenAIConfig) -> Result<Arc<dyn ChatModel>, FactoryError> {
            if model.contains("gpt-35-turbo") {
                Ok(self.chat.clone())
            } else {
                Err(FactoryError::UnsupportedModel(model.to_string()))
            }
        }

        fn embeddings(&self, method: EmbeddingMethod, _config: &AzureOpenAIConfig) -> Option<Arc<dyn Embeddings>> {
            match method {
                EmbeddingMethod::OpenAI => Some(Arc::new(KeywordEmbeddings::default())),
                EmbeddingMethod::AzureCognitiveSearch => None,
            }
        }
    }

    fn session(dir: &Path, replies: &[&str]) -> (EvalSession, Arc<ScriptedChat>) {
        let chat = Arc::new(ScriptedChat::new(replies, "I don't know."));
        let config = AppConfig {
            openai: AzureOpenAIConfig {
                api_base: "https://example.openai.azure.com".to_string(),
                api_version: "2023-05-15".to_string(),
                api_key: "test-key".to_string(),
                embedding_model: String::new(),
                chat_model: None,
            },
            search: None,
            qdrant_url: "http://localhost:6333".to_string(),
            work_dir: dir.to_path_buf(),
        };
        let session = EvalSession::with_models(config, Box::new(FakeModels { chat: chat.clone() }));
        (session, chat)
    }

    fn pages() -> Vec<Document> {
        document::pages_from_text(
            "The warranty covers parts for two years.\x0cInvoices are payable within thirty days.",
            "contract.pdf",
        )
    }

    #[tokio::test]
    async fn test_reload_flag_toggles() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, _) = session(dir.path(), &[]);
        assert!(session.reload_pending());

        session.ensure_components().unwrap();
        assert!(!session.reload_pending());

        session.set("chunk_size", "1500").unwrap();
        assert!(session.reload_pending());
        assert_eq!(session.settings().chunk_size, 1500);

        session.ensure_components().unwrap();
        assert!(!session.reload_pending());

        // Rejected values leave the flag alone
        assert!(session.set("chunk_size", "10").is_err());
        assert!(!session.reload_pending());
    }

    #[tokio::test]
    async fn test_ask_without_document() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, _) = session(dir.path(), &[]);
        assert!(matches!(
            session.ask("What is covered?").await,
            Err(SessionError::NoDocument)
        ));
        assert!(matches!(
            session.evaluate(|_, _| {}).await,
            Err(SessionError::NoDocument)
        ));
    }

    #[tokio::test]
    async fn test_upload_rejects_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, _) = session(dir.path(), &[]);

        let err = session.upload("notes.pdf", b"").await.unwrap_err();
        assert!(matches!(err, SessionError::Document(DocumentError::EmptyUpload)));
        assert!(err.is_user_error());

        let err = session.upload("notes.txt", b"plain text").await.unwrap_err();
        assert!(matches!(err, SessionError::Document(DocumentError::UnsupportedFileType(_))));
    }

    #[tokio::test]
    async fn test_index_and_ask() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, chat) = session(dir.path(), &["Two years."]);
        session.set("retriever", "TF-IDF").unwrap();

        let report = session
            .index_pages(dir.path().join("contract.pdf"), pages())
            .await
            .unwrap();
        assert_eq!(report.pages, 2);
        assert_eq!(report.chunks, 2);
        assert_eq!(report.retriever, RetrieverKind::Tfidf);

        let answer = session.ask("How long does the warranty cover parts?").await.unwrap();
        assert_eq!(answer.answer, "Two years.");
        assert!(chat.prompts()[0].contains("The warranty covers parts for two years."));
    }

    #[tokio::test]
    async fn test_embedding_retriever_requires_openai_embeddings() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, _) = session(dir.path(), &[]);
        session.set("retriever", "SVM").unwrap();

        let err = session
            .index_pages(dir.path().join("contract.pdf"), pages())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::Retrieval(RetrievalError::EmbeddingsRequired(RetrieverKind::Svm))
        ));

        session.set("embedding", "OpenAI").unwrap();
        let report = session
            .index_pages(dir.path().join("contract.pdf"), pages())
            .await
            .unwrap();
        assert_eq!(report.retriever, RetrieverKind::Svm);
    }

    #[tokio::test]
    async fn test_settings_change_reindexes_on_ask() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, _) = session(dir.path(), &["first", "second"]);
        session.set("retriever", "TF-IDF").unwrap();
        session
            .index_pages(dir.path().join("contract.pdf"), pages())
            .await
            .unwrap();

        session.set("k", "4").unwrap();
        assert!(session.reload_pending());
        session.ask("What about invoices?").await.unwrap();
        assert!(!session.reload_pending());
        assert_eq!(session.document_path(), Some(dir.path().join("contract.pdf").as_path()));
    }

    #[tokio::test]
    async fn test_failed_rebuild_keeps_reload_pending() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, _) = session(dir.path(), &["first", "second"]);
        session.set("retriever", "TF-IDF").unwrap();
        session
            .index_pages(dir.path().join("contract.pdf"), pages())
            .await
            .unwrap();

        // SVM needs client-side embeddings, which the default method lacks
        session.set("retriever", "SVM").unwrap();
        for _ in 0..2 {
            let err = session.ask("What about invoices?").await.unwrap_err();
            assert!(matches!(
                err,
                SessionError::Retrieval(RetrievalError::EmbeddingsRequired(RetrieverKind::Svm))
            ));
            assert!(session.reload_pending());
        }

        session.set("embedding", "OpenAI").unwrap();
        session.ask("What about invoices?").await.unwrap();
        assert!(!session.reload_pending());
        let loaded = session.document.as_ref().unwrap();
        assert_eq!(loaded.chain.retriever().kind(), RetrieverKind::Svm);
    }

    #[tokio::test]
    async fn test_changed_content_rebuilds_saved_index() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, chat) = session(dir.path(), &["first", "second"]);
        session.set("retriever", "Similarity Search").unwrap();
        session.set("embedding", "OpenAI").unwrap();
        session.set("k", "1").unwrap();
        let path = dir.path().join("contract.pdf");

        let first = session
            .index_pages(
                path.clone(),
                document::pages_from_text("The warranty covers parts for two years.", "contract.pdf"),
            )
            .await
            .unwrap();
        assert!(!first.index_reused);

        let same = session
            .index_pages(
                path.clone(),
                document::pages_from_text("The warranty covers parts for two years.", "contract.pdf"),
            )
            .await
            .unwrap();
        assert!(same.index_reused);

        let changed = session
            .index_pages(
                path,
                document::pages_from_text("Shipping takes five business days.", "contract.pdf"),
            )
            .await
            .unwrap();
        assert!(!changed.index_reused);

        session.ask("How long does shipping take?").await.unwrap();
        let prompt = &chat.prompts()[0];
        assert!(prompt.contains("Shipping takes five business days."));
        assert!(!prompt.contains("warranty"));
    }

    #[test]
    fn test_content_digest() {
        let a = document::pages_from_text("one\x0ctwo", "a.pdf");
        let b = document::pages_from_text("one\x0ctwo", "b.pdf");
        let c = document::pages_from_text("onetwo", "a.pdf");
        assert_eq!(content_digest(&a), content_digest(&b));
        assert_ne!(content_digest(&a), content_digest(&c));
        assert_eq!(content_digest(&a).len(), 64);
    }

    #[tokio::test]
    async fn test_evaluate_stores_run() {
        let dir = tempfile::tempdir().unwrap();
        let (session, _) = session(
            dir.path(),
            &[
                "QUESTION: How long are parts covered?\nANSWER: Two years",
                "Parts are covered for two years.",
                "CORRECT",
            ],
        );
        let db = Database::in_memory().await.unwrap();
        let mut session = session.with_database(db);
        session.set("retriever", "TF-IDF").unwrap();
        session.set("questions", "1").unwrap();
        session
            .index_pages(
                dir.path().join("contract.pdf"),
                document::pages_from_text("The warranty covers parts for two years.", "contract.pdf"),
            )
            .await
            .unwrap();

        let mut progress = Vec::new();
        let (report, run_id) = session.evaluate(|done, total| progress.push((done, total))).await.unwrap();
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].grade, Grade::Correct);
        assert_eq!(report.score(), 1.0);
        assert_eq!(progress, vec![(1, 1)]);

        let runs = session.recent_runs(10).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(Some(runs[0].id), run_id);
        assert_eq!(runs[0].correct, 1);

        let stored = session.run_results(runs[0].id).await.unwrap();
        assert_eq!(stored, report.results);
    }
}
