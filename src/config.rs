use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use validator::{Validate, ValidationError};

pub const LLM_MODELS: [&str; 2] = ["gpt-35-turbo", "gpt-35-turbo-16k"];
pub const CHUNK_CHOICES: [usize; 6] = [3, 4, 5, 6, 7, 8];
pub const DEFAULT_SEARCH_API_VERSION: &str = "2020-06-30";
pub const DEFAULT_EMBEDDING_DEPLOYMENT: &str = "text-embedding-ada-002";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0}")]
    Missing(String),
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unknown {field} option: {value}")]
    InvalidOption { field: &'static str, value: String },
    #[error("Invalid settings: {0}")]
    Invalid(String),
}

/// Copies `key.txt` to `.env` when present and loads the dotenv file.
pub fn setup_env(work_dir: &Path) -> Result<(), ConfigError> {
    let key_file = work_dir.join("key.txt");
    let env_file = work_dir.join(".env");

    if key_file.exists() {
        fs::copy(&key_file, &env_file)?;
    } else {
        log::warn!("key.txt with OpenAI API is required");
    }

    if env_file.exists() {
        if let Err(e) = dotenv::from_path(&env_file) {
            log::warn!("Failed to load {}: {}", env_file.display(), e);
        }
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(rename = "EMBEDDING_MODEL")]
    embedding_model: String,
    #[serde(rename = "OPENAI_API_BASE")]
    api_base: String,
    #[serde(rename = "OPENAI_API_VERSION")]
    api_version: String,
    #[serde(rename = "CHATGPT_MODEL", default)]
    chat_model: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AzureOpenAIConfig {
    pub api_base: String,
    pub api_version: String,
    pub api_key: String,
    pub embedding_model: String,
    pub chat_model: Option<String>,
}

impl AzureOpenAIConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::Missing(
                "config.json with Azure OpenAI config is required".to_string(),
            ));
        }
        let raw = fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = serde_json::from_str(raw)?;

        // Env takes precedence over the file
        let api_base = env::var("OPENAI_API_BASE").unwrap_or(file.api_base);
        let api_version = env::var("OPENAI_API_VERSION").unwrap_or(file.api_version);
        let embedding_model = env::var("EMBEDDING_MODEL").unwrap_or(file.embedding_model);

        let api_key = env::var("OPENAI_API_KEY").unwrap_or_default();
        if api_key.is_empty() {
            log::warn!("OPENAI_API_KEY is not set; requests to Azure OpenAI will be rejected");
        }

        Ok(Self {
            api_base,
            api_version,
            api_key,
            embedding_model,
            chat_model: file.chat_model,
        })
    }

    pub fn api_type(&self) -> &'static str {
        "azure"
    }
}

#[derive(Debug, Clone)]
pub struct AzureSearchConfig {
    pub service_name: String,
    pub index_name: String,
    pub api_key: String,
    pub api_version: String,
}

impl AzureSearchConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let var = |name: &str| {
            env::var(name).map_err(|_| ConfigError::Missing(format!("{} is not set", name)))
        };

        Ok(Self {
            service_name: var("AZURE_COGNITIVE_SEARCH_SERVICE_NAME")?,
            index_name: var("AZURE_COGNITIVE_SEARCH_INDEX_NAME")?,
            api_key: var("AZURE_COGNITIVE_SEARCH_API_KEY")?,
            api_version: env::var("AZURE_COGNITIVE_SEARCH_API_VERSION")
                .unwrap_or_else(|_| DEFAULT_SEARCH_API_VERSION.to_string()),
        })
    }
}

/// Everything the session needs from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub openai: AzureOpenAIConfig,
    pub search: Option<AzureSearchConfig>,
    pub qdrant_url: String,
    pub work_dir: PathBuf,
}

impl AppConfig {
    pub fn new(openai: AzureOpenAIConfig, work_dir: PathBuf) -> Self {
        let search = match AzureSearchConfig::from_env() {
            Ok(search) => Some(search),
            Err(e) => {
                log::info!("Azure Cognitive Search disabled: {}", e);
                None
            }
        };

        Self {
            openai,
            search,
            qdrant_url: env::var("QDRANT_URL").unwrap_or_else(|_| "http://localhost:6333".to_string()),
            work_dir,
        }
    }

    pub fn upload_dir(&self) -> PathBuf {
        self.work_dir.join("tempDir").join("output")
    }

    pub fn index_dir(&self) -> PathBuf {
        self.work_dir.join("index")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitMethod {
    #[serde(rename = "RecursiveTextSplitter", alias = "RecursiveCharacterTextSplitter")]
    Recursive,
    #[serde(rename = "CharacterTextSplitter")]
    Character,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetrieverKind {
    #[serde(rename = "Azure Cognitive Search")]
    AzureCognitiveSearch,
    #[serde(rename = "Similarity Search")]
    SimilaritySearch,
    #[serde(rename = "SVM")]
    Svm,
    #[serde(rename = "TFIDF")]
    Tfidf,
    #[serde(rename = "Qdrant")]
    Qdrant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmbeddingMethod {
    #[serde(rename = "Azure Cognitive Search")]
    AzureCognitiveSearch,
    #[serde(rename = "OpenAI")]
    OpenAI,
}

impl SplitMethod {
    pub const ALL: [SplitMethod; 2] = [SplitMethod::Recursive, SplitMethod::Character];

    pub fn label(&self) -> &'static str {
        match self {
            SplitMethod::Recursive => "RecursiveTextSplitter",
            SplitMethod::Character => "CharacterTextSplitter",
        }
    }
}

impl RetrieverKind {
    pub const ALL: [RetrieverKind; 5] = [
        RetrieverKind::AzureCognitiveSearch,
        RetrieverKind::SimilaritySearch,
        RetrieverKind::Svm,
        RetrieverKind::Tfidf,
        RetrieverKind::Qdrant,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            RetrieverKind::AzureCognitiveSearch => "Azure Cognitive Search",
            RetrieverKind::SimilaritySearch => "Similarity Search",
            RetrieverKind::Svm => "SVM",
            RetrieverKind::Tfidf => "TFIDF",
            RetrieverKind::Qdrant => "Qdrant",
        }
    }

    /// Whether the retriever embeds chunks on the client side.
    pub fn needs_embeddings(&self) -> bool {
        matches!(
            self,
            RetrieverKind::SimilaritySearch | RetrieverKind::Svm | RetrieverKind::Qdrant
        )
    }
}

impl EmbeddingMethod {
    pub const ALL: [EmbeddingMethod; 2] = [EmbeddingMethod::AzureCognitiveSearch, EmbeddingMethod::OpenAI];

    pub fn label(&self) -> &'static str {
        match self {
            EmbeddingMethod::AzureCognitiveSearch => "Azure Cognitive Search",
            EmbeddingMethod::OpenAI => "OpenAI",
        }
    }
}

fn parse_label<T: Copy>(
    field: &'static str,
    value: &str,
    options: &[T],
    label: impl Fn(&T) -> &'static str,
) -> Result<T, ConfigError> {
    let wanted = value.trim();
    options
        .iter()
        .find(|o| label(o).eq_ignore_ascii_case(wanted))
        .copied()
        .ok_or_else(|| ConfigError::InvalidOption { field, value: value.to_string() })
}

impl FromStr for SplitMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("RecursiveCharacterTextSplitter") {
            return Ok(SplitMethod::Recursive);
        }
        parse_label("split method", s, &SplitMethod::ALL, SplitMethod::label)
    }
}

impl FromStr for RetrieverKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("TF-IDF") {
            return Ok(RetrieverKind::Tfidf);
        }
        parse_label("retriever", s, &RetrieverKind::ALL, RetrieverKind::label)
    }
}

impl FromStr for EmbeddingMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_label("embedding", s, &EmbeddingMethod::ALL, EmbeddingMethod::label)
    }
}

impl fmt::Display for SplitMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl fmt::Display for RetrieverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl fmt::Display for EmbeddingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

fn validate_llm_model(model: &str) -> Result<(), ValidationError> {
    if LLM_MODELS.contains(&model) {
        Ok(())
    } else {
        Err(ValidationError::new("unknown_llm_model"))
    }
}

fn validate_overlap(settings: &EvalSettings) -> Result<(), ValidationError> {
    if settings.chunk_overlap < settings.chunk_size {
        Ok(())
    } else {
        Err(ValidationError::new("overlap_not_smaller_than_chunk"))
    }
}

/// The evaluator settings panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_overlap", skip_on_field_errors = false))]
pub struct EvalSettings {
    #[validate(custom = "validate_llm_model")]
    pub llm_model: String,
    #[validate(range(min = 1, max = 10))]
    pub eval_questions: usize,
    #[validate(range(min = 500, max = 2000))]
    pub chunk_size: usize,
    #[validate(range(min = 0, max = 200))]
    pub chunk_overlap: usize,
    pub split_method: SplitMethod,
    pub retriever: RetrieverKind,
    #[validate(range(min = 3, max = 8))]
    pub chunks_to_retrieve: usize,
    pub embedding_method: EmbeddingMethod,
}

impl Default for EvalSettings {
    fn default() -> Self {
        Self {
            llm_model: LLM_MODELS[0].to_string(),
            eval_questions: 5,
            chunk_size: 1000,
            chunk_overlap: 200,
            split_method: SplitMethod::Recursive,
            retriever: RetrieverKind::AzureCognitiveSearch,
            chunks_to_retrieve: CHUNK_CHOICES[0],
            embedding_method: EmbeddingMethod::AzureCognitiveSearch,
        }
    }
}

impl EvalSettings {
    pub fn check(&self) -> Result<(), ConfigError> {
        self.validate().map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Applies one widget change by key and re-validates.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut next = self.clone();
        let number = |field: &'static str| {
            value
                .trim()
                .parse::<usize>()
                .map_err(|_| ConfigError::InvalidOption { field, value: value.to_string() })
        };

        match key.trim().to_lowercase().as_str() {
            "model" | "llm" | "llm_model" => next.llm_model = value.trim().to_string(),
            "questions" | "eval_questions" => next.eval_questions = number("eval questions")?,
            "chunk" | "chunk_size" => next.chunk_size = number("chunk size")?,
            "overlap" | "chunk_overlap" => next.chunk_overlap = number("chunk overlap")?,
            "split" | "splitter" | "split_method" => next.split_method = value.parse()?,
            "retriever" => next.retriever = value.parse()?,
            "k" | "chunks" | "chunks_to_retrieve" => next.chunks_to_retrieve = number("chunks to retrieve")?,
            "embedding" | "embeddings" | "embedding_method" => next.embedding_method = value.parse()?,
            other => return Err(ConfigError::InvalidOption { field: "setting", value: other.to_string() }),
        }

        next.check()?;
        *self = next;
        Ok(())
    }

    /// Identifies the settings and content an on-disk index was built with.
    pub fn index_fingerprint(&self, embedding_model: &str, content_digest: &str) -> String {
        format!(
            "{}|{}|{}|{}|{}",
            embedding_model,
            self.split_method.label(),
            self.chunk_size,
            self.chunk_overlap,
            content_digest
        )
    }
}
