//! Ingestion pipeline.
//!
//! The [`IngestionPipeline`] turns one uploaded [`Document`] into persisted
//! chunks: load → split (ids assigned as chunks are produced) → embed →
//! persist. It composes an [`EmbeddingProvider`] and a [`VectorStore`]; the
//! same pair must later serve questions through the
//! [`Answerer`](crate::answer::Answerer).
//!
//! Ingestion is linear and never retries. A failure at any stage aborts
//! before anything is persisted, and because chunk ids are content-addressed
//! a repeated ingestion of the same file overwrites rather than duplicates.
//!
//! # Example
//!
//! ```rust,ignore
//! use ragdoc::{Document, IngestionPipeline, RagConfig};
//!
//! let pipeline = IngestionPipeline::builder()
//!     .config(&config)
//!     .embedding_provider(embedder.clone())
//!     .vector_store(store.clone())
//!     .build()?;
//!
//! let report = pipeline.ingest(&Document::from_upload("notes.txt", bytes)?).await?;
//! println!("ingested {} chunks into {}", report.chunk_count, report.backend);
//! ```

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::chunking::TextSplitter;
use crate::config::RagConfig;
use crate::document::{Chunk, Document, RawUnit};
use crate::embedding::{EmbeddingProvider, check_embedding};
use crate::error::{RagError, Result};
use crate::loader;
use crate::vectorstore::VectorStore;

/// The stages an ingestion passes through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IngestStage {
    /// The file was decoded into raw units.
    Loaded,
    /// The units were split into chunks.
    Split,
    /// Every chunk carries its content-addressed id.
    Identified,
    /// Every chunk has a vector.
    Embedded,
    /// Chunks and vectors were written to the store.
    Persisted,
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Loaded => "loaded",
            Self::Split => "split",
            Self::Identified => "identified",
            Self::Embedded => "embedded",
            Self::Persisted => "persisted",
        })
    }
}

/// Outcome of a successful ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    /// Number of chunks written (zero for a document with no extractable text).
    pub chunk_count: usize,
    /// Label of the backend the chunks were written to.
    pub backend: String,
}

/// Await `future`, failing with `on_timeout()` if it takes longer than `timeout`.
pub(crate) async fn bounded<T, F, E>(timeout: Duration, future: F, on_timeout: E) -> Result<T>
where
    F: Future<Output = Result<T>>,
    E: FnOnce() -> RagError,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout()),
    }
}

/// Chunks, embeds, and persists uploaded documents.
///
/// Construct one via [`IngestionPipeline::builder()`].
pub struct IngestionPipeline {
    splitter: TextSplitter,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    batch_size: usize,
    timeout: Duration,
}

impl IngestionPipeline {
    /// Create a new [`IngestionPipelineBuilder`].
    pub fn builder() -> IngestionPipelineBuilder {
        IngestionPipelineBuilder::default()
    }

    /// Return a reference to the splitter.
    pub fn splitter(&self) -> &TextSplitter {
        &self.splitter
    }

    /// Return a reference to the vector store.
    pub fn vector_store(&self) -> &Arc<dyn VectorStore> {
        &self.vector_store
    }

    /// Ingest a single document: load → split → embed → persist.
    ///
    /// # Errors
    ///
    /// - [`RagError::Load`] if the file cannot be decoded.
    /// - [`RagError::Embedding`] if an embedding request fails (including on
    ///   timeout) or returns NaN or infinite values. Nothing is persisted in
    ///   that case.
    /// - [`RagError::StoreUnavailable`] or [`RagError::Store`] if persistence fails.
    /// - [`RagError::ConfigurationMismatch`] if the embedder and the store
    ///   disagree on dimensionality or model.
    pub async fn ingest(&self, document: &Document) -> Result<IngestReport> {
        let source = document.source.as_str();
        let units = loader::load(document).map_err(|e| {
            error!(source, error = %e, "failed to load document");
            e
        })?;
        debug!(source, stage = %IngestStage::Loaded, unit_count = units.len(), "document loaded");

        self.ingest_units(source, &units).await
    }

    /// Ingest units that were already loaded, for example pages produced by
    /// an external extractor with [`loader::from_pages`].
    ///
    /// `source` only labels log lines; chunk metadata comes from the units.
    ///
    /// # Errors
    ///
    /// Same as [`ingest`](IngestionPipeline::ingest), except that nothing is loaded.
    pub async fn ingest_units(&self, source: &str, units: &[RawUnit]) -> Result<IngestReport> {
        let backend = self.vector_store.backend().to_string();

        let chunks: Vec<Chunk> = self.splitter.split_all(units).collect();
        debug!(source, stage = %IngestStage::Split, chunk_count = chunks.len(), "document split");
        let distinct = chunks.iter().map(|c| c.id.as_str()).collect::<HashSet<_>>().len();
        debug!(
            source,
            stage = %IngestStage::Identified,
            distinct_ids = distinct,
            "chunk ids assigned"
        );

        if chunks.is_empty() {
            info!(source, chunk_count = 0, backend = %backend, "ingested document (no text)");
            return Ok(IngestReport { chunk_count: 0, backend });
        }

        let vectors = self.embed_chunks(&chunks).await.map_err(|e| {
            error!(source, error = %e, "embedding failed during ingestion");
            e
        })?;
        debug!(
            source,
            stage = %IngestStage::Embedded,
            vector_count = vectors.len(),
            "chunks embedded"
        );

        bounded(self.timeout, self.vector_store.put_many(&chunks, &vectors), || {
            RagError::unavailable(&backend, format!("write timed out after {:?}", self.timeout))
        })
        .await
        .map_err(|e| {
            error!(source, backend = %backend, error = %e, "persisting chunks failed");
            e
        })?;

        let chunk_count = chunks.len();
        info!(
            source,
            chunk_count,
            backend = %backend,
            stage = %IngestStage::Persisted,
            "ingested document"
        );

        Ok(IngestReport { chunk_count, backend })
    }

    /// Ingest several documents in order, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Same as [`ingest`](IngestionPipeline::ingest).
    pub async fn ingest_batch(&self, documents: &[Document]) -> Result<Vec<IngestReport>> {
        let mut reports = Vec::with_capacity(documents.len());
        for document in documents {
            reports.push(self.ingest(document).await?);
        }
        Ok(reports)
    }

    /// Embed every chunk text, one request per batch, validating each response.
    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        let provider = self.embedding_provider.model_id().to_string();
        let dimensions = self.embedding_provider.dimensions();
        let mut vectors = Vec::with_capacity(chunks.len());

        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
            let request = self.embedding_provider.embed_batch(&texts);
            let embedded = bounded(self.timeout, request, || {
                let message = format!("request timed out after {:?}", self.timeout);
                RagError::embedding(&provider, message)
            })
            .await?;

            if embedded.len() != texts.len() {
                return Err(RagError::embedding(
                    &provider,
                    format!("requested {} embeddings but received {}", texts.len(), embedded.len()),
                ));
            }
            for vector in &embedded {
                check_embedding(&provider, vector, dimensions)?;
            }
            vectors.extend(embedded);
        }

        Ok(vectors)
    }
}

/// Builder for constructing an [`IngestionPipeline`].
///
/// The embedding provider and the vector store are required. Splitting,
/// batching, and timeouts come from the [`RagConfig`] (defaults if none is given).
#[derive(Default)]
pub struct IngestionPipelineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    vector_store: Option<Arc<dyn VectorStore>>,
}

impl IngestionPipelineBuilder {
    /// Take splitting, batching, and timeout settings from `config`.
    pub fn config(mut self, config: &RagConfig) -> Self {
        self.config = Some(config.clone());
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the vector store backend.
    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    /// Build the [`IngestionPipeline`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if a required component is missing or the
    /// configuration is invalid.
    pub fn build(self) -> Result<IngestionPipeline> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::Config("embedding_provider is required".to_string()))?;
        let vector_store = self
            .vector_store
            .ok_or_else(|| RagError::Config("vector_store is required".to_string()))?;

        Ok(IngestionPipeline {
            splitter: TextSplitter::new(config.chunk_size, config.chunk_overlap)?,
            embedding_provider,
            vector_store,
            batch_size: config.embedding_batch_size,
            timeout: config.request_timeout(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_are_ordered() {
        assert!(IngestStage::Loaded < IngestStage::Split);
        assert!(IngestStage::Identified < IngestStage::Embedded);
        assert!(IngestStage::Embedded < IngestStage::Persisted);
        assert_eq!(IngestStage::Persisted.to_string(), "persisted");
    }

    #[tokio::test]
    async fn bounded_reports_timeouts() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        };
        let result =
            bounded(Duration::from_millis(10), slow, || RagError::embedding("slow", "timed out"))
                .await;
        assert!(matches!(result, Err(RagError::Embedding { .. })));

        let fast =
            bounded(Duration::from_secs(1), async { Ok(7) }, || RagError::Config("x".into()));
        assert_eq!(fast.await.unwrap(), 7);
    }

    #[test]
    fn builder_requires_components() {
        assert!(matches!(IngestionPipeline::builder().build(), Err(RagError::Config(_))));
    }
}
