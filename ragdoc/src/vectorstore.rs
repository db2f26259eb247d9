//! Vector store trait for persisting chunks and searching them by similarity.

use async_trait::async_trait;

use crate::document::{Chunk, SearchResult};
use crate::error::{RagError, Result};

/// A storage backend for chunk embeddings with nearest-neighbour search.
///
/// Both backends in this crate ([`LocalVectorStore`](crate::local::LocalVectorStore)
/// and `AtlasVectorStore`) satisfy the same contract, so the ingestion
/// pipeline and the answerer are written against this trait only.
///
/// Writes are upserts keyed by chunk id: writing the same chunks twice leaves
/// the store exactly as writing them once.
///
/// # Example
///
/// ```rust,ignore
/// use ragdoc::{LocalVectorStore, VectorStore};
///
/// let store = LocalVectorStore::new(".ragdoc_index", "mock/hash", 64);
/// store.put_many(&chunks, &vectors).await?;
/// let results = store.query(&query_vector, 4).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Short backend label used in logs and ingestion reports.
    fn backend(&self) -> &str;

    /// Upsert chunks together with their vectors (`vectors[i]` belongs to `chunks[i]`).
    ///
    /// # Errors
    ///
    /// - [`RagError::ConfigurationMismatch`] if the lengths differ or a
    ///   vector's dimensionality differs from the store's.
    /// - [`RagError::StoreUnavailable`] if the backend cannot be reached.
    async fn put_many(&self, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()>;

    /// Return up to `k` chunks most similar to `vector`, by descending score.
    ///
    /// An empty result means nothing matched; it is not an error.
    ///
    /// # Errors
    ///
    /// - [`RagError::StoreUnavailable`] if the store has not been bootstrapped
    ///   or provisioned, or cannot be reached.
    /// - [`RagError::ConfigurationMismatch`] if `vector` does not fit the store.
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<SearchResult>>;

    /// Whether [`query`](VectorStore::query) can currently be served.
    async fn is_available(&self) -> bool;

    /// Number of chunks currently persisted.
    async fn count(&self) -> Result<usize>;
}

/// Check the shared preconditions of [`VectorStore::put_many`].
///
/// Non-finite components are rejected before anything is written: JSON has
/// no encoding for them, and a single one would make the local index
/// unreadable.
pub(crate) fn check_batch(
    backend: &str,
    chunks: &[Chunk],
    vectors: &[Vec<f32>],
    dimensions: usize,
) -> Result<()> {
    if chunks.len() != vectors.len() {
        return Err(RagError::ConfigurationMismatch(format!(
            "got {} chunks but {} vectors",
            chunks.len(),
            vectors.len()
        )));
    }
    for (chunk, vector) in chunks.iter().zip(vectors) {
        check_dimensions(vector, dimensions)?;
        if !is_finite(vector) {
            return Err(RagError::store(
                backend,
                format!("vector for chunk '{}' contains NaN or infinite values", chunk.id),
            ));
        }
    }
    Ok(())
}

/// Check that a vector has the dimensionality a store was declared with.
pub(crate) fn check_dimensions(vector: &[f32], dimensions: usize) -> Result<()> {
    if vector.len() != dimensions {
        return Err(RagError::ConfigurationMismatch(format!(
            "embedding has {} dimensions but the vector index declares {dimensions}",
            vector.len()
        )));
    }
    Ok(())
}

/// Whether every component of `vector` is a finite number.
pub fn is_finite(vector: &[f32]) -> bool {
    vector.iter().all(|x| x.is_finite())
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
