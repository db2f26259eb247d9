//! Data types for documents, chunks, search results, and answers.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Metadata key holding the originating document name.
pub const SOURCE_KEY: &str = "source";

/// Metadata key holding the 1-based page number of paginated documents.
pub const PAGE_KEY: &str = "page";

/// Chunk metadata, ordered by key so serialisation is canonical.
pub type Metadata = BTreeMap<String, String>;

/// The declared media type of an uploaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    /// Flat text: loaded as a single unit without page numbers.
    Text,
    /// Paginated PDF: loaded as one unit per page.
    Pdf,
}

impl MediaType {
    /// Infer the media type from a file name's extension.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Load`] for anything other than `.txt`, `.md` or `.pdf`.
    pub fn from_file_name(name: &str) -> Result<Self> {
        let extension = Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());
        match extension.as_deref() {
            Some("txt") | Some("md") => Ok(Self::Text),
            Some("pdf") => Ok(Self::Pdf),
            _ => Err(RagError::Load(format!(
                "unsupported file type for '{name}'; upload a PDF or TXT file"
            ))),
        }
    }

    /// Whether documents of this type are split into pages.
    pub fn is_paginated(self) -> bool {
        matches!(self, Self::Pdf)
    }
}

/// One uploaded file. Consumed entirely during ingestion and never retained.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Name of the uploaded file, recorded as the `source` of every chunk.
    pub source: String,
    /// The declared media type.
    pub media_type: MediaType,
    /// Raw file bytes.
    pub content: Vec<u8>,
}

impl Document {
    /// Create a document from raw bytes.
    pub fn new(
        source: impl Into<String>,
        media_type: MediaType,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        Self { source: source.into(), media_type, content: content.into() }
    }

    /// Create a flat text document.
    pub fn text(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(source, MediaType::Text, text.into().into_bytes())
    }

    /// Create a document whose media type is inferred from the file name.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Load`] if the extension is not supported.
    pub fn from_upload(file_name: impl Into<String>, content: impl Into<Vec<u8>>) -> Result<Self> {
        let source = file_name.into();
        let media_type = MediaType::from_file_name(&source)?;
        Ok(Self::new(source, media_type, content))
    }
}

/// A loaded unit of text (a whole text file or a single PDF page) before splitting.
#[derive(Debug, Clone, PartialEq)]
pub struct RawUnit {
    /// The unit's text.
    pub text: String,
    /// Metadata every chunk of this unit inherits.
    pub metadata: Metadata,
}

/// The atomic retrievable unit of text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Content-addressed identifier; see [`compute_id`](crate::identity::compute_id).
    pub id: String,
    /// A bounded-length substring of the originating unit.
    pub text: String,
    /// Metadata inherited from the unit (`source`, and `page` when paginated).
    pub metadata: Metadata,
}

impl Chunk {
    /// The originating document name.
    pub fn source(&self) -> Option<&str> {
        self.metadata.get(SOURCE_KEY).map(String::as_str)
    }

    /// The 1-based page number, for paginated documents.
    pub fn page(&self) -> Option<u32> {
        self.metadata.get(PAGE_KEY).and_then(|p| p.parse().ok())
    }
}

/// A retrieved [`Chunk`] paired with a relevance score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// The similarity score (higher is more relevant).
    pub score: f32,
}

/// Maximum number of characters of chunk text shown in a [`SourceRef`] preview.
pub const PREVIEW_CHARS: usize = 250;

/// A citation back to one retrieved chunk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceRef {
    /// The cited chunk's identifier.
    pub chunk_id: String,
    /// The originating document name.
    pub source: String,
    /// The page number, absent for flat text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    /// A bounded excerpt of the chunk text for human verification.
    pub preview: String,
}

impl SourceRef {
    /// Build a citation from a retrieved chunk.
    pub fn from_chunk(chunk: &Chunk) -> Self {
        Self {
            chunk_id: chunk.id.clone(),
            source: chunk.source().unwrap_or_default().to_string(),
            page: chunk.page(),
            preview: preview(&chunk.text),
        }
    }
}

fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// A generated answer with the sources it was grounded on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Answer {
    /// The generated answer text.
    pub text: String,
    /// The retrieved chunks, in retrieval order.
    pub sources: Vec<SourceRef>,
}
