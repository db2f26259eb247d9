//! Retrieval and grounded answer assembly.
//!
//! The [`Answerer`] embeds a question with the same provider used at
//! ingestion, retrieves the nearest chunks, renders them into a prompt, and
//! returns the generated text together with citations for every retrieved
//! chunk.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::config::RagConfig;
use crate::document::{Answer, PAGE_KEY, SOURCE_KEY, SearchResult, SourceRef};
use crate::embedding::{EmbeddingProvider, check_embedding};
use crate::error::{RagError, Result};
use crate::generation::CompletionProvider;
use crate::pipeline::bounded;
use crate::prompt::{NO_CONTEXT, PromptVariant, REFUSAL};
use crate::vectorstore::VectorStore;

/// Separator placed between consecutive chunks in the rendered context.
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Render retrieved chunks into the context block of a prompt, in retrieval order.
///
/// Each chunk becomes a header line followed by its text:
///
/// ```text
/// [chunk_id=<id> | source=<source> | page=<page>]
/// <text>
/// ```
///
/// The page segment is omitted for chunks without a page.
pub fn format_context(results: &[SearchResult]) -> String {
    results
        .iter()
        .map(|result| {
            let chunk = &result.chunk;
            let source = chunk.metadata.get(SOURCE_KEY).map(String::as_str).unwrap_or_default();
            match chunk.metadata.get(PAGE_KEY) {
                Some(page) => format!(
                    "[chunk_id={} | source={source} | page={page}]\n{}",
                    chunk.id, chunk.text
                ),
                None => format!("[chunk_id={} | source={source}]\n{}", chunk.id, chunk.text),
            }
        })
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

/// Answers questions from the chunks in a vector store.
///
/// Construct one via [`Answerer::builder()`].
///
/// # Example
///
/// ```rust,ignore
/// let answerer = Answerer::builder()
///     .config(&config)
///     .embedding_provider(embedder)
///     .vector_store(store)
///     .completion_provider(llm)
///     .build()?;
///
/// let answer = answerer
///     .answer_question("What colour is the sky?", 4, PromptVariant::Strict)
///     .await?;
/// for source in &answer.sources {
///     println!("{} ({:?})", source.source, source.page);
/// }
/// ```
pub struct Answerer {
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    completion_provider: Arc<dyn CompletionProvider>,
    top_k: usize,
    prompt: PromptVariant,
    timeout: Duration,
}

impl Answerer {
    /// Create a new [`AnswererBuilder`].
    pub fn builder() -> AnswererBuilder {
        AnswererBuilder::default()
    }

    /// Answer `question` with the configured `k` and prompt.
    ///
    /// # Errors
    ///
    /// Same as [`answer_question`](Answerer::answer_question).
    pub async fn answer(&self, question: &str) -> Result<Answer> {
        self.answer_question(question, self.top_k, self.prompt).await
    }

    /// Retrieve up to `k` chunks for `question` and generate a grounded answer.
    ///
    /// When nothing is retrieved, [`PromptVariant::Strict`] returns the
    /// refusal text without calling the model, while
    /// [`PromptVariant::Default`] asks the model with an explicit marker
    /// that no context was found. Either way `sources` is empty.
    ///
    /// # Errors
    ///
    /// - [`RagError::Config`] if `k` is zero.
    /// - [`RagError::Embedding`] if the question cannot be embedded.
    /// - [`RagError::StoreUnavailable`] if the store cannot serve queries.
    /// - [`RagError::ConfigurationMismatch`] if the store was built with a
    ///   different embedding model or dimensionality.
    /// - [`RagError::Generation`] if generation fails or returns empty text.
    pub async fn answer_question(
        &self,
        question: &str,
        k: usize,
        prompt: PromptVariant,
    ) -> Result<Answer> {
        if k == 0 {
            return Err(RagError::Config("k must be greater than zero".to_string()));
        }

        let embedder = self.embedding_provider.model_id();
        let vector = bounded(self.timeout, self.embedding_provider.embed(question), || {
            RagError::embedding(embedder, format!("request timed out after {:?}", self.timeout))
        })
        .await
        .and_then(|vector| {
            check_embedding(embedder, &vector, self.embedding_provider.dimensions())?;
            Ok(vector)
        })
        .map_err(|e| {
            error!(error = %e, "embedding failed during query");
            e
        })?;

        let backend = self.vector_store.backend();
        let results = bounded(self.timeout, self.vector_store.query(&vector, k), || {
            RagError::unavailable(backend, format!("query timed out after {:?}", self.timeout))
        })
        .await
        .map_err(|e| {
            error!(backend, error = %e, "vector store query failed");
            e
        })?;
        debug!(backend, k, result_count = results.len(), "retrieved chunks");

        let context = if results.is_empty() {
            if prompt == PromptVariant::Strict {
                info!(
                    k,
                    result_count = 0,
                    prompt = %prompt,
                    "answered question (refused, no context)"
                );
                return Ok(Answer { text: REFUSAL.to_string(), sources: Vec::new() });
            }
            NO_CONTEXT.to_string()
        } else {
            format_context(&results)
        };

        let rendered = prompt.render(question, &context);
        let model = self.completion_provider.model_id();
        let generated = bounded(self.timeout, self.completion_provider.complete(&rendered), || {
            RagError::generation(model, format!("request timed out after {:?}", self.timeout))
        })
        .await
        .map_err(|e| {
            error!(model, error = %e, "generation failed");
            e
        })?;

        let text = generated.trim();
        if text.is_empty() {
            return Err(RagError::generation(model, "model returned an empty answer"));
        }

        let sources: Vec<SourceRef> =
            results.iter().map(|r| SourceRef::from_chunk(&r.chunk)).collect();
        info!(k, result_count = sources.len(), prompt = %prompt, "answered question");

        Ok(Answer { text: text.to_string(), sources })
    }
}

/// Builder for constructing an [`Answerer`].
///
/// The embedding provider, vector store, and completion provider are
/// required. `k`, the default prompt, and the timeout come from the
/// [`RagConfig`] (defaults if none is given).
#[derive(Default)]
pub struct AnswererBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    completion_provider: Option<Arc<dyn CompletionProvider>>,
}

impl AnswererBuilder {
    /// Take `top_k`, the default prompt, and the timeout from `config`.
    pub fn config(mut self, config: &RagConfig) -> Self {
        self.config = Some(config.clone());
        self
    }

    /// Set the embedding provider. Must be the one the store was filled with.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the vector store backend.
    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    /// Set the completion provider.
    pub fn completion_provider(mut self, provider: Arc<dyn CompletionProvider>) -> Self {
        self.completion_provider = Some(provider);
        self
    }

    /// Build the [`Answerer`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if a required component is missing or the
    /// configuration is invalid.
    pub fn build(self) -> Result<Answerer> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        Ok(Answerer {
            embedding_provider: self
                .embedding_provider
                .ok_or_else(|| RagError::Config("embedding_provider is required".to_string()))?,
            vector_store: self
                .vector_store
                .ok_or_else(|| RagError::Config("vector_store is required".to_string()))?,
            completion_provider: self
                .completion_provider
                .ok_or_else(|| RagError::Config("completion_provider is required".to_string()))?,
            top_k: config.top_k,
            prompt: config.prompt,
            timeout: config.request_timeout(),
        })
    }
}
