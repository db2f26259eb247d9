//! Configuration for ingestion, retrieval, and provider selection.
//!
//! A [`RagConfig`] is built once, either from the environment with
//! [`RagConfig::from_env`] or programmatically with [`RagConfig::builder`],
//! and then passed by reference to the constructors that need it.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::factory::{CompletionKind, EmbeddingKind, VectorStoreKind};
use crate::prompt::PromptVariant;

/// Default directory of the local index.
pub const DEFAULT_INDEX_DIR: &str = ".ragdoc_index";

/// Connection settings for the MongoDB Atlas backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtlasConfig {
    /// MongoDB connection string.
    #[serde(default, skip_serializing)]
    pub uri: String,
    /// Database name.
    pub database: String,
    /// Collection name.
    pub collection: String,
    /// Name of the pre-declared vector search index.
    pub index_name: String,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            uri: String::new(),
            database: "rag_demo".into(),
            collection: "documents".into(),
            index_name: "vector_index".into(),
        }
    }
}

/// Settings for the OpenAI providers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenAISettings {
    /// API key. Required when an OpenAI provider is selected.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// Override for OpenAI-compatible servers.
    pub base_url: Option<String>,
    /// Chat model used for answers.
    pub chat_model: String,
    /// Embedding model.
    pub embedding_model: String,
}

impl Default for OpenAISettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            chat_model: "gpt-4o-mini".into(),
            embedding_model: "text-embedding-3-small".into(),
        }
    }
}

/// Settings for the Ollama providers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OllamaSettings {
    /// Server address.
    pub url: String,
    /// Generation model used for answers.
    pub chat_model: String,
    /// Embedding model.
    pub embedding_model: String,
}

impl Default for OllamaSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:11434".into(),
            chat_model: "llama3.1".into(),
            embedding_model: "nomic-embed-text".into(),
        }
    }
}

/// Configuration parameters for ingestion and question answering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagConfig {
    /// Which backend stores the chunks.
    pub vector_store: VectorStoreKind,
    /// Directory of the local index.
    pub local_index_dir: PathBuf,
    /// Remote backend settings.
    pub atlas: AtlasConfig,
    /// Which service produces embeddings.
    pub embeddings: EmbeddingKind,
    /// Which service generates answers.
    pub llm_provider: CompletionKind,
    /// OpenAI provider settings.
    pub openai: OpenAISettings,
    /// Ollama provider settings.
    pub ollama: OllamaSettings,
    /// Embedding dimensionality. When unset, the provider's default is used.
    pub embedding_dimensions: Option<usize>,
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Number of overlapping characters between consecutive chunks.
    pub chunk_overlap: usize,
    /// Number of chunks retrieved per question.
    pub top_k: usize,
    /// Prompt used when a question does not name one.
    pub prompt: PromptVariant,
    /// Number of chunk texts sent per embedding request.
    pub embedding_batch_size: usize,
    /// Upper bound on every external call, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            vector_store: VectorStoreKind::Local,
            local_index_dir: PathBuf::from(DEFAULT_INDEX_DIR),
            atlas: AtlasConfig::default(),
            embeddings: EmbeddingKind::OpenAI,
            llm_provider: CompletionKind::OpenAI,
            openai: OpenAISettings::default(),
            ollama: OllamaSettings::default(),
            embedding_dimensions: None,
            chunk_size: 900,
            chunk_overlap: 150,
            top_k: 4,
            prompt: PromptVariant::Default,
            embedding_batch_size: 64,
            request_timeout_secs: 60,
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Read the configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if a variable holds an invalid value or
    /// the resulting configuration fails validation.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup`, which maps a variable name to
    /// its value. Empty values count as unset.
    ///
    /// Recognised variables: `VECTORSTORE` (`LOCAL`/`REMOTE`, also `FAISS`/`ATLAS`),
    /// `LOCAL_INDEX_DIR` (or `FAISS_INDEX_DIR`), `MONGODB_URI`, `MONGODB_DB`,
    /// `MONGODB_COLLECTION`, `MONGODB_ATLAS_INDEX_NAME`, `EMBEDDINGS`,
    /// `LLM_PROVIDER`, `OPENAI_API_KEY`, `OPENAI_BASE_URL`, `OPENAI_MODEL`,
    /// `OPENAI_EMBEDDINGS_MODEL`, `OLLAMA_URL`, `OLLAMA_MODEL`,
    /// `OLLAMA_EMBEDDINGS_MODEL`, `EMBEDDING_DIMENSIONS`, `CHUNK_SIZE`,
    /// `CHUNK_OVERLAP`, `TOP_K`, `PROMPT`, `EMBEDDING_BATCH_SIZE` and
    /// `REQUEST_TIMEOUT_SECS`.
    ///
    /// # Errors
    ///
    /// Same as [`from_env`](RagConfig::from_env).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();

        if let Some(value) = get("VECTORSTORE") {
            config.vector_store = value.parse()?;
        }
        if let Some(dir) = get("LOCAL_INDEX_DIR").or_else(|| get("FAISS_INDEX_DIR")) {
            config.local_index_dir = PathBuf::from(dir);
        }
        if let Some(uri) = get("MONGODB_URI") {
            config.atlas.uri = uri;
        }
        if let Some(database) = get("MONGODB_DB") {
            config.atlas.database = database;
        }
        if let Some(collection) = get("MONGODB_COLLECTION") {
            config.atlas.collection = collection;
        }
        if let Some(index_name) = get("MONGODB_ATLAS_INDEX_NAME") {
            config.atlas.index_name = index_name;
        }

        if let Some(value) = get("EMBEDDINGS") {
            config.embeddings = value.parse()?;
        }
        if let Some(value) = get("LLM_PROVIDER") {
            config.llm_provider = value.parse()?;
        }
        config.openai.api_key = get("OPENAI_API_KEY");
        config.openai.base_url = get("OPENAI_BASE_URL");
        if let Some(model) = get("OPENAI_MODEL") {
            config.openai.chat_model = model;
        }
        if let Some(model) = get("OPENAI_EMBEDDINGS_MODEL") {
            config.openai.embedding_model = model;
        }
        if let Some(url) = get("OLLAMA_URL") {
            config.ollama.url = url;
        }
        if let Some(model) = get("OLLAMA_MODEL") {
            config.ollama.chat_model = model;
        }
        if let Some(model) = get("OLLAMA_EMBEDDINGS_MODEL") {
            config.ollama.embedding_model = model;
        }

        if let Some(value) = get("EMBEDDING_DIMENSIONS") {
            config.embedding_dimensions = Some(parse_number("EMBEDDING_DIMENSIONS", &value)?);
        }
        if let Some(value) = get("CHUNK_SIZE") {
            config.chunk_size = parse_number("CHUNK_SIZE", &value)?;
        }
        if let Some(value) = get("CHUNK_OVERLAP") {
            config.chunk_overlap = parse_number("CHUNK_OVERLAP", &value)?;
        }
        if let Some(value) = get("TOP_K") {
            config.top_k = parse_number("TOP_K", &value)?;
        }
        if let Some(value) = get("PROMPT") {
            config.prompt = value.parse()?;
        }
        if let Some(value) = get("EMBEDDING_BATCH_SIZE") {
            config.embedding_batch_size = parse_number("EMBEDDING_BATCH_SIZE", &value)?;
        }
        if let Some(value) = get("REQUEST_TIMEOUT_SECS") {
            config.request_timeout_secs = parse_number("REQUEST_TIMEOUT_SECS", &value)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// The bound on every external call, in whole seconds.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// The embedding dimensionality in effect for the selected provider.
    pub fn dimensions(&self) -> usize {
        self.embedding_dimensions.unwrap_or(match self.embeddings {
            EmbeddingKind::OpenAI => 1536,
            EmbeddingKind::Ollama => 768,
        })
    }

    /// Check that the parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if:
    /// - `chunk_overlap >= chunk_size`
    /// - `top_k == 0`
    /// - `embedding_dimensions == Some(0)`
    /// - `embedding_batch_size == 0`
    /// - `request_timeout_secs == 0`
    pub fn validate(&self) -> Result<()> {
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::Config(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::Config("top_k must be greater than zero".to_string()));
        }
        if self.embedding_dimensions == Some(0) {
            return Err(RagError::Config(
                "embedding_dimensions must be greater than zero".to_string(),
            ));
        }
        if self.embedding_batch_size == 0 {
            return Err(RagError::Config(
                "embedding_batch_size must be greater than zero".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(RagError::Config(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        RagError::Config(format!("{key} must be a non-negative integer, got '{value}'"))
    })
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Select the vector store backend.
    pub fn vector_store(mut self, kind: VectorStoreKind) -> Self {
        self.config.vector_store = kind;
        self
    }

    /// Set the directory of the local index.
    pub fn local_index_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.local_index_dir = dir.into();
        self
    }

    /// Set the remote backend settings.
    pub fn atlas(mut self, atlas: AtlasConfig) -> Self {
        self.config.atlas = atlas;
        self
    }

    /// Select the embedding provider.
    pub fn embeddings(mut self, kind: EmbeddingKind) -> Self {
        self.config.embeddings = kind;
        self
    }

    /// Select the completion provider.
    pub fn llm_provider(mut self, kind: CompletionKind) -> Self {
        self.config.llm_provider = kind;
        self
    }

    /// Set the OpenAI API key.
    pub fn openai_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.config.openai.api_key = Some(api_key.into());
        self
    }

    /// Set the Ollama server address.
    pub fn ollama_url(mut self, url: impl Into<String>) -> Self {
        self.config.ollama.url = url.into();
        self
    }

    /// Override the embedding dimensionality.
    pub fn embedding_dimensions(mut self, dimensions: usize) -> Self {
        self.config.embedding_dimensions = Some(dimensions);
        self
    }

    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the number of chunks retrieved per question.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the default prompt.
    pub fn prompt(mut self, prompt: PromptVariant) -> Self {
        self.config.prompt = prompt;
        self
    }

    /// Set the number of texts per embedding request.
    pub fn embedding_batch_size(mut self, size: usize) -> Self {
        self.config.embedding_batch_size = size;
        self
    }

    /// Set the bound on every external call.
    ///
    /// The bound is kept in whole seconds: a fractional `timeout` is rounded
    /// up, so `1.5s` becomes `2s` and anything under a second becomes `1s`.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        let secs = timeout.as_secs() + u64::from(timeout.subsec_nanos() > 0);
        self.config.request_timeout_secs = secs.max(1);
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// See [`RagConfig::validate`].
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<RagConfig> {
        let vars: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        RagConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = from_pairs(&[]).unwrap();
        assert_eq!(config, RagConfig::default());
        assert_eq!(config.local_index_dir, PathBuf::from(".ragdoc_index"));
        assert_eq!(config.atlas.database, "rag_demo");
        assert_eq!(config.atlas.index_name, "vector_index");
        assert_eq!((config.chunk_size, config.chunk_overlap, config.top_k), (900, 150, 4));
        assert_eq!(config.dimensions(), 1536);
        assert_eq!(config.request_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn legacy_variable_names_are_honoured() {
        let config = from_pairs(&[
            ("VECTORSTORE", "ATLAS"),
            ("FAISS_INDEX_DIR", "/tmp/faiss"),
            ("MONGODB_URI", "mongodb+srv://cluster.example"),
            ("EMBEDDINGS", "OLLAMA"),
            ("LLM_PROVIDER", "OLLAMA"),
            ("PROMPT", "strict"),
        ])
        .unwrap();
        assert_eq!(config.vector_store, VectorStoreKind::Remote);
        assert_eq!(config.local_index_dir, PathBuf::from("/tmp/faiss"));
        assert_eq!(config.atlas.uri, "mongodb+srv://cluster.example");
        assert_eq!(config.embeddings, EmbeddingKind::Ollama);
        assert_eq!(config.llm_provider, CompletionKind::Ollama);
        assert_eq!(config.prompt, PromptVariant::Strict);
        assert_eq!(config.dimensions(), 768);
    }

    #[test]
    fn empty_values_count_as_unset() {
        let config = from_pairs(&[("OPENAI_API_KEY", ""), ("TOP_K", "  ")]).unwrap();
        assert_eq!(config.openai.api_key, None);
        assert_eq!(config.top_k, 4);
    }

    #[test]
    fn invalid_values_are_config_errors() {
        assert!(matches!(from_pairs(&[("TOP_K", "four")]), Err(RagError::Config(_))));
        assert!(matches!(from_pairs(&[("TOP_K", "0")]), Err(RagError::Config(_))));
        assert!(matches!(from_pairs(&[("VECTORSTORE", "chroma")]), Err(RagError::Config(_))));
        assert!(matches!(
            from_pairs(&[("CHUNK_SIZE", "100"), ("CHUNK_OVERLAP", "100")]),
            Err(RagError::Config(_))
        ));
    }

    #[test]
    fn builder_validates() {
        assert!(RagConfig::builder().chunk_size(100).chunk_overlap(20).build().is_ok());
        assert!(RagConfig::builder().chunk_overlap(900).build().is_err());
        assert!(RagConfig::builder().top_k(0).build().is_err());
        assert!(RagConfig::builder().embedding_dimensions(0).build().is_err());
        assert!(RagConfig::builder().embedding_batch_size(0).build().is_err());
    }

    #[test]
    fn request_timeout_rounds_up_to_whole_seconds() {
        let timeout = |d: Duration| {
            RagConfig::builder().request_timeout(d).build().unwrap().request_timeout()
        };
        assert_eq!(timeout(Duration::from_secs(3)), Duration::from_secs(3));
        assert_eq!(timeout(Duration::from_millis(1500)), Duration::from_secs(2));
        assert_eq!(timeout(Duration::from_millis(200)), Duration::from_secs(1));
        assert_eq!(timeout(Duration::ZERO), Duration::from_secs(1));
    }

    #[test]
    fn secrets_are_not_serialised() {
        let config = RagConfig::builder().openai_api_key("sk-secret").build().unwrap();
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("sk-secret"));
    }
}
