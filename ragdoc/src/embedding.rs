//! Embedding provider trait for generating vector embeddings from text.

use async_trait::async_trait;

use crate::error::{RagError, Result};
use crate::vectorstore::{check_dimensions, is_finite};

/// A provider that generates vector embeddings from text input.
///
/// Implementations wrap specific embedding backends (OpenAI, Ollama, etc.)
/// behind a unified async interface. The default [`embed_batch`](EmbeddingProvider::embed_batch)
/// implementation calls [`embed`](EmbeddingProvider::embed) sequentially;
/// backends that support native batching should override it.
///
/// The same provider (and model) must be used for ingestion and for
/// questions. Vectors from different models live in different spaces, and
/// the vector stores reject queries from a model other than the one their
/// data was written with.
///
/// # Example
///
/// ```rust,ignore
/// use ragdoc::EmbeddingProvider;
///
/// let provider = MyEmbeddingProvider::new();
/// let embedding = provider.embed("hello world").await?;
/// assert_eq!(embedding.len(), provider.dimensions());
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of text inputs.
    ///
    /// Returns one vector per input, in input order.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;

    /// A stable identifier of the embedding space, e.g. `openai/text-embedding-3-small`.
    fn model_id(&self) -> &str;
}

/// Validate one vector returned by `provider`.
///
/// A vector of the wrong size is a [`RagError::ConfigurationMismatch`]; one
/// holding NaN or infinite components is a malformed response and therefore
/// a [`RagError::Embedding`].
pub(crate) fn check_embedding(provider: &str, vector: &[f32], dimensions: usize) -> Result<()> {
    check_dimensions(vector, dimensions)?;
    if !is_finite(vector) {
        return Err(RagError::embedding(provider, "embedding contains NaN or infinite values"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_vectors_are_embedding_errors() {
        assert!(check_embedding("mock", &[0.6, 0.8], 2).is_ok());
        assert!(matches!(
            check_embedding("mock", &[0.6, f32::NAN], 2),
            Err(RagError::Embedding { .. })
        ));
        assert!(matches!(
            check_embedding("mock", &[f32::INFINITY], 2),
            Err(RagError::ConfigurationMismatch(_))
        ));
    }
}
