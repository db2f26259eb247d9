//! Ollama embedding and completion providers for locally hosted models.
//!
//! Talks to the Ollama HTTP API (`/api/embed`, `/api/generate`) with
//! `reqwest`. Streaming is disabled: each call returns one full response.
//!
//! This module is only available when the `ollama` feature is enabled.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::CompletionProvider;

/// The default Ollama server address.
pub const DEFAULT_URL: &str = "http://localhost:11434";

/// The default embedding model.
pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";

/// The dimensionality of `nomic-embed-text`.
pub const DEFAULT_DIMENSIONS: usize = 768;

/// The default generation model.
pub const DEFAULT_CHAT_MODEL: &str = "llama3.1";

const PROVIDER: &str = "Ollama";

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: serde_json::Value,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Shared HTTP plumbing for both Ollama providers.
struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
}

impl OllamaClient {
    fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RagError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string() })
    }

    /// POST `body` to `path`, returning the decoded JSON or a message describing the failure.
    async fn post<B, R>(&self, path: &str, body: &B) -> std::result::Result<R, String>
    where
        B: Serialize + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| format!("request to {url} failed: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("API returned {status}: {body}"));
        }
        response.json().await.map_err(|e| format!("failed to parse response: {e}"))
    }
}

/// An [`EmbeddingProvider`] backed by a local Ollama server.
pub struct OllamaEmbeddingProvider {
    http: OllamaClient,
    model: String,
    model_id: String,
    dimensions: usize,
}

impl OllamaEmbeddingProvider {
    /// Create a provider for `nomic-embed-text` on the given server.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: OllamaClient::new(base_url, timeout)?,
            model: DEFAULT_EMBEDDING_MODEL.into(),
            model_id: format!("ollama/{DEFAULT_EMBEDDING_MODEL}"),
            dimensions: DEFAULT_DIMENSIONS,
        })
    }

    /// Use a different embedding model, which produces `dimensions`-sized vectors.
    pub fn with_model(mut self, model: impl Into<String>, dimensions: usize) -> Self {
        self.model = model.into();
        self.model_id = format!("ollama/{}", self.model);
        self.dimensions = dimensions;
        self
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_batch(&[text]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| RagError::embedding(PROVIDER, "API returned no embeddings"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(
            provider = PROVIDER,
            batch_size = texts.len(),
            model = %self.model,
            "embedding batch"
        );

        let response: EmbedResponse = self
            .http
            .post("/api/embed", &EmbedRequest { model: &self.model, input: texts })
            .await
            .map_err(|message| {
                error!(provider = PROVIDER, %message, "embedding request failed");
                RagError::embedding(PROVIDER, message)
            })?;

        if response.embeddings.len() != texts.len() {
            return Err(RagError::embedding(
                PROVIDER,
                format!(
                    "requested {} embeddings but received {}",
                    texts.len(),
                    response.embeddings.len()
                ),
            ));
        }
        Ok(response.embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// A [`CompletionProvider`] backed by a local Ollama server.
pub struct OllamaCompletionProvider {
    http: OllamaClient,
    model: String,
}

impl OllamaCompletionProvider {
    /// Create a provider for `llama3.1` on the given server.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self { http: OllamaClient::new(base_url, timeout)?, model: DEFAULT_CHAT_MODEL.into() })
    }

    /// Set the generation model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[async_trait]
impl CompletionProvider for OllamaCompletionProvider {
    async fn complete(&self, prompt: &str) -> Result<String> {
        debug!(
            provider = PROVIDER,
            model = %self.model,
            prompt_len = prompt.len(),
            "requesting completion"
        );

        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: json!({ "temperature": 0 }),
        };
        let response: GenerateResponse =
            self.http.post("/api/generate", &request).await.map_err(|message| {
                error!(provider = PROVIDER, %message, "generation request failed");
                RagError::generation(PROVIDER, message)
            })?;
        Ok(response.response)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}
