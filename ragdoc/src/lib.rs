//! Grounded question answering over uploaded documents.
//!
//! This crate provides:
//! - Loading of plain text and PDF uploads into raw units (one per page)
//! - Overlapping, boundary-aware text splitting with content-addressed chunk ids
//! - A [`VectorStore`] trait with a local file-backed index and a MongoDB Atlas backend
//! - OpenAI and Ollama embedding and completion providers
//! - An [`IngestionPipeline`] and an [`Answerer`] that cites every retrieved chunk
//!
//! # Feature flags
//!
//! | Feature  | Enables |
//! |----------|---------|
//! | `openai` | [`openai`] providers |
//! | `ollama` | [`ollama`] providers |
//! | `atlas`  | [`atlas`] vector store |
//! | `pdf`    | PDF loading |
//!
//! All are enabled by default.

pub mod answer;
pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod factory;
pub mod generation;
pub mod identity;
pub mod loader;
pub mod local;
pub mod pipeline;
pub mod prompt;
pub mod vectorstore;

#[cfg(feature = "atlas")]
pub mod atlas;
#[cfg(feature = "ollama")]
pub mod ollama;
#[cfg(feature = "openai")]
pub mod openai;

pub use answer::{Answerer, AnswererBuilder, format_context};
pub use chunking::TextSplitter;
pub use config::{AtlasConfig, RagConfig, RagConfigBuilder};
pub use document::{Answer, Chunk, Document, MediaType, Metadata, RawUnit, SearchResult, SourceRef};
pub use embedding::EmbeddingProvider;
pub use error::{RagError, Result};
pub use factory::{
    CompletionKind, EmbeddingKind, VectorStoreKind, build_completion_provider,
    build_embedding_provider, build_vector_store,
};
pub use generation::CompletionProvider;
pub use identity::compute_id;
pub use local::LocalVectorStore;
pub use pipeline::{IngestReport, IngestStage, IngestionPipeline, IngestionPipelineBuilder};
pub use prompt::PromptVariant;
pub use vectorstore::VectorStore;

#[cfg(feature = "atlas")]
pub use atlas::AtlasVectorStore;
