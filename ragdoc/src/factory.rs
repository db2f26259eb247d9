//! Provider and backend selection.
//!
//! The configured kinds are resolved once, at startup, into trait objects.
//! Nothing downstream inspects which concrete implementation it was given.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::RagConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::CompletionProvider;
use crate::local::LocalVectorStore;
use crate::vectorstore::VectorStore;

/// Which vector store backend holds the chunks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorStoreKind {
    /// A file-backed index in a local directory.
    #[default]
    Local,
    /// A MongoDB Atlas collection with a vector search index.
    Remote,
}

/// Which service produces embeddings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingKind {
    /// The OpenAI API, or any server compatible with it.
    #[default]
    OpenAI,
    /// A local Ollama server.
    Ollama,
}

/// Which service generates answers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionKind {
    /// The OpenAI API, or any server compatible with it.
    #[default]
    OpenAI,
    /// A local Ollama server.
    Ollama,
}

fn unknown(what: &str, value: &str, expected: &str) -> RagError {
    RagError::Config(format!("unknown {what} '{value}', expected one of: {expected}"))
}

impl FromStr for VectorStoreKind {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "faiss" => Ok(Self::Local),
            "remote" | "atlas" => Ok(Self::Remote),
            other => Err(unknown("vector store", other, "LOCAL, REMOTE")),
        }
    }
}

impl FromStr for EmbeddingKind {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            other => Err(unknown("embeddings provider", other, "OPENAI, OLLAMA")),
        }
    }
}

impl FromStr for CompletionKind {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            other => Err(unknown("LLM provider", other, "OPENAI, OLLAMA")),
        }
    }
}

impl fmt::Display for VectorStoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Local => "local",
            Self::Remote => "remote",
        })
    }
}

impl fmt::Display for EmbeddingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::OpenAI => "openai",
            Self::Ollama => "ollama",
        })
    }
}

impl fmt::Display for CompletionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::OpenAI => "openai",
            Self::Ollama => "ollama",
        })
    }
}

fn feature_disabled(feature: &str) -> RagError {
    RagError::Config(format!("ragdoc was built without the `{feature}` feature"))
}

/// Build the configured embedding provider.
///
/// # Errors
///
/// Returns [`RagError::Config`] if the provider's credentials are missing or
/// its feature was not compiled in.
pub fn build_embedding_provider(config: &RagConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let provider = match config.embeddings {
        #[cfg(feature = "openai")]
        EmbeddingKind::OpenAI => openai_embedder(config),
        #[cfg(feature = "ollama")]
        EmbeddingKind::Ollama => ollama_embedder(config),
        #[allow(unreachable_patterns)]
        other => Err(feature_disabled(&other.to_string())),
    };
    provider.inspect(|provider| {
        info!(
            model = provider.model_id(),
            dimensions = provider.dimensions(),
            "embedding provider ready"
        );
    })
}

/// Build the configured completion provider.
///
/// # Errors
///
/// Returns [`RagError::Config`] if the provider's credentials are missing or
/// its feature was not compiled in.
pub fn build_completion_provider(config: &RagConfig) -> Result<Arc<dyn CompletionProvider>> {
    let provider = match config.llm_provider {
        #[cfg(feature = "openai")]
        CompletionKind::OpenAI => openai_completer(config),
        #[cfg(feature = "ollama")]
        CompletionKind::Ollama => ollama_completer(config),
        #[allow(unreachable_patterns)]
        other => Err(feature_disabled(&other.to_string())),
    };
    provider.inspect(|provider| info!(model = provider.model_id(), "completion provider ready"))
}

#[cfg(feature = "openai")]
fn openai_embedder(config: &RagConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let api_key = config.openai.api_key.clone().unwrap_or_default();
    let mut provider =
        crate::openai::OpenAIEmbeddingProvider::new(api_key, config.request_timeout())?
            .with_model(&config.openai.embedding_model);
    if let Some(base_url) = &config.openai.base_url {
        provider = provider.with_base_url(base_url);
    }
    if let Some(dimensions) = config.embedding_dimensions {
        provider = provider.with_dimensions(dimensions);
    }
    Ok(Arc::new(provider))
}

#[cfg(feature = "ollama")]
fn ollama_embedder(config: &RagConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let url = &config.ollama.url;
    let provider = crate::ollama::OllamaEmbeddingProvider::new(url, config.request_timeout())?
        .with_model(&config.ollama.embedding_model, config.dimensions());
    Ok(Arc::new(provider))
}

#[cfg(feature = "openai")]
fn openai_completer(config: &RagConfig) -> Result<Arc<dyn CompletionProvider>> {
    let api_key = config.openai.api_key.clone().unwrap_or_default();
    let mut provider =
        crate::openai::OpenAICompletionProvider::new(api_key, config.request_timeout())?
            .with_model(&config.openai.chat_model);
    if let Some(base_url) = &config.openai.base_url {
        provider = provider.with_base_url(base_url);
    }
    Ok(Arc::new(provider))
}

#[cfg(feature = "ollama")]
fn ollama_completer(config: &RagConfig) -> Result<Arc<dyn CompletionProvider>> {
    let url = &config.ollama.url;
    let provider = crate::ollama::OllamaCompletionProvider::new(url, config.request_timeout())?
        .with_model(&config.ollama.chat_model);
    Ok(Arc::new(provider))
}

/// Build the configured vector store for vectors produced by `embedder`.
///
/// The store records the embedder's model id, so a store written with one
/// model rejects queries from another.
///
/// # Errors
///
/// Returns [`RagError::Config`] if the remote backend is selected without a
/// connection string or without the `atlas` feature.
pub async fn build_vector_store(
    config: &RagConfig,
    embedder: &dyn EmbeddingProvider,
) -> Result<Arc<dyn VectorStore>> {
    let store: Arc<dyn VectorStore> = match config.vector_store {
        VectorStoreKind::Local => Arc::new(LocalVectorStore::new(
            &config.local_index_dir,
            embedder.model_id(),
            embedder.dimensions(),
        )),
        #[cfg(feature = "atlas")]
        VectorStoreKind::Remote => Arc::new(
            crate::atlas::AtlasVectorStore::connect(
                &config.atlas,
                embedder.model_id(),
                embedder.dimensions(),
                config.request_timeout(),
            )
            .await?,
        ),
        #[cfg(not(feature = "atlas"))]
        VectorStoreKind::Remote => return Err(feature_disabled("atlas")),
    };
    info!(backend = store.backend(), "vector store ready");
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_accept_legacy_aliases() {
        assert_eq!("FAISS".parse::<VectorStoreKind>().unwrap(), VectorStoreKind::Local);
        assert_eq!("atlas".parse::<VectorStoreKind>().unwrap(), VectorStoreKind::Remote);
        assert_eq!("Remote".parse::<VectorStoreKind>().unwrap(), VectorStoreKind::Remote);
        assert_eq!("OLLAMA".parse::<EmbeddingKind>().unwrap(), EmbeddingKind::Ollama);
        assert_eq!("openai".parse::<CompletionKind>().unwrap(), CompletionKind::OpenAI);
        assert!(matches!("chroma".parse::<VectorStoreKind>(), Err(RagError::Config(_))));
        assert!(matches!("HF".parse::<EmbeddingKind>(), Err(RagError::Config(_))));
    }

    #[cfg(feature = "openai")]
    #[test]
    fn openai_without_key_is_a_config_error() {
        let config = RagConfig::builder().embeddings(EmbeddingKind::OpenAI).build().unwrap();
        assert!(matches!(build_embedding_provider(&config), Err(RagError::Config(_))));
    }

    #[cfg(not(feature = "ollama"))]
    #[test]
    fn providers_without_their_feature_are_config_errors() {
        let config = RagConfig::builder()
            .embeddings(EmbeddingKind::Ollama)
            .llm_provider(CompletionKind::Ollama)
            .build()
            .unwrap();
        let embedder = build_embedding_provider(&config).map(|_| ());
        assert!(matches!(embedder, Err(RagError::Config(m)) if m.contains("`ollama`")));
        let completer = build_completion_provider(&config).map(|_| ());
        assert!(matches!(completer, Err(RagError::Config(m)) if m.contains("`ollama`")));
    }

    #[cfg(feature = "ollama")]
    #[tokio::test]
    async fn local_store_records_the_embedding_model() {
        let dir = tempfile::tempdir().unwrap();
        let config = RagConfig::builder()
            .embeddings(EmbeddingKind::Ollama)
            .local_index_dir(dir.path())
            .build()
            .unwrap();
        let embedder = build_embedding_provider(&config).unwrap();
        assert_eq!(embedder.model_id(), "ollama/nomic-embed-text");
        assert_eq!(embedder.dimensions(), 768);

        let store = build_vector_store(&config, embedder.as_ref()).await.unwrap();
        assert_eq!(store.backend(), "local");
        assert!(!store.is_available().await);
    }
}
