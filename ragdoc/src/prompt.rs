//! Prompt templates for grounded answers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RagError;

/// The exact reply the strict prompt demands when the context is insufficient.
pub const REFUSAL: &str = "I don't know based on the provided documents.";

/// Placed in the context slot when retrieval returned nothing.
pub const NO_CONTEXT: &str = "(no relevant context was found)";

const DEFAULT_SYSTEM: &str = "You are a careful assistant. Answer the user using only the provided \
     context. If the answer cannot be found, say you do not know. Cite sources by chunk id and \
     page when useful.";

const STRICT_SYSTEM: &str = "You must only answer from the provided context. If the context is \
     insufficient, reply exactly: 'I don't know based on the provided documents.' Include \
     citations for any claims.";

/// Which instructions wrap the question and the retrieved context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptVariant {
    /// Grounded and concise; says "I don't know." when the context falls short.
    #[default]
    Default,
    /// Never speculates; replies with [`REFUSAL`] when the context falls short.
    Strict,
}

impl PromptVariant {
    /// The configuration name of this variant.
    pub fn name(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Strict => "strict",
        }
    }

    /// Render the full prompt sent to the completion provider.
    pub fn render(self, question: &str, context: &str) -> String {
        match self {
            Self::Default => format!(
                "{DEFAULT_SYSTEM}\n\nQuestion: {question}\n\nContext:\n{context}\n\n\
                 Rules:\n- Use only the context.\n- Be concise.\n\
                 - If insufficient context, say 'I don't know.'"
            ),
            Self::Strict => format!(
                "{STRICT_SYSTEM}\n\nAnswer the question strictly from the context.\n\
                 Question: {question}\n\nContext:\n{context}"
            ),
        }
    }
}

impl fmt::Display for PromptVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PromptVariant {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "strict" => Ok(Self::Strict),
            other => Err(RagError::Config(format!(
                "unknown prompt '{other}', expected one of: default, strict"
            ))),
        }
    }
}
