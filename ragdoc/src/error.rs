//! Error types for the `ragdoc` crate.

use thiserror::Error;

/// Errors that can occur while ingesting documents or answering questions.
///
/// Every variant is propagated to the caller as-is. Nothing in this crate
/// retries; retry and backoff policy belongs to whoever calls the pipeline.
#[derive(Debug, Error)]
pub enum RagError {
    /// The uploaded file could not be read or its format is not supported.
    #[error("Load error: {0}")]
    Load(String),

    /// The embedding capability failed (timeout, quota, malformed response).
    #[error("Embedding error ({provider}): {message}")]
    Embedding {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The vector store is unreachable or has not been provisioned yet.
    ///
    /// This is distinct from a query that matches nothing, which is an
    /// empty result rather than an error.
    #[error("Vector store unavailable ({backend}): {message}")]
    StoreUnavailable {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// The vector store is reachable but an operation on it failed.
    #[error("Vector store error ({backend}): {message}")]
    Store {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// The generation capability failed.
    #[error("Generation error ({provider}): {message}")]
    Generation {
        /// The completion provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// Two components disagree about something that must match, such as the
    /// embedding dimensionality or the embedding model of a store.
    #[error("Configuration mismatch: {0}")]
    ConfigurationMismatch(String),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RagError {
    pub(crate) fn embedding(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Embedding { provider: provider.into(), message: message.into() }
    }

    pub(crate) fn generation(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Generation { provider: provider.into(), message: message.into() }
    }

    pub(crate) fn unavailable(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StoreUnavailable { backend: backend.into(), message: message.into() }
    }

    pub(crate) fn store(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Store { backend: backend.into(), message: message.into() }
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
