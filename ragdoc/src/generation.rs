//! Completion provider trait for the generation step.

use async_trait::async_trait;

use crate::error::Result;

/// A provider that turns a fully rendered prompt into a single text response.
///
/// No streaming: the call resolves once the whole response is available.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Generate a response for `prompt`.
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Identifier of the model behind this provider, used in logs and errors.
    fn model_id(&self) -> &str;
}
