//! Turns uploaded file bytes into ordered, metadata-tagged [`RawUnit`]s.
//!
//! Flat text becomes a single unit tagged with `source`. PDFs become one unit
//! per page tagged with `source` and the 1-based `page`. Units with no
//! visible text are dropped, so an empty upload produces no units at all.

use tracing::debug;

use crate::document::{Document, MediaType, Metadata, PAGE_KEY, RawUnit, SOURCE_KEY};
use crate::error::{RagError, Result};

/// Load a document into raw units, in document order.
///
/// # Errors
///
/// Returns [`RagError::Load`] if the content cannot be parsed for its
/// declared media type.
pub fn load(document: &Document) -> Result<Vec<RawUnit>> {
    let units = match document.media_type {
        MediaType::Text => load_text(document),
        MediaType::Pdf => load_pdf(document)?,
    };
    debug!(source = %document.source, unit_count = units.len(), "loaded document");
    Ok(units)
}

fn load_text(document: &Document) -> Vec<RawUnit> {
    let text = String::from_utf8_lossy(&document.content);
    if text.trim().is_empty() {
        return Vec::new();
    }
    vec![RawUnit { text: text.into_owned(), metadata: base_metadata(&document.source) }]
}

fn base_metadata(source: &str) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert(SOURCE_KEY.to_string(), source.to_string());
    metadata
}

fn page_unit(source: &str, page: u32, text: String) -> Option<RawUnit> {
    if text.trim().is_empty() {
        return None;
    }
    let mut metadata = base_metadata(source);
    metadata.insert(PAGE_KEY.to_string(), page.to_string());
    Some(RawUnit { text, metadata })
}

#[cfg(feature = "pdf")]
fn load_pdf(document: &Document) -> Result<Vec<RawUnit>> {
    if document.content.is_empty() {
        return Ok(Vec::new());
    }

    let pdf = lopdf::Document::load_mem(&document.content).map_err(|e| {
        RagError::Load(format!("failed to parse PDF '{}': {e}", document.source))
    })?;

    let mut units = Vec::new();
    for page in pdf.get_pages().into_keys() {
        let text = pdf.extract_text(&[page]).map_err(|e| {
            RagError::Load(format!(
                "failed to extract text from page {page} of '{}': {e}",
                document.source
            ))
        })?;
        units.extend(page_unit(&document.source, page, text));
    }
    Ok(units)
}

#[cfg(not(feature = "pdf"))]
fn load_pdf(document: &Document) -> Result<Vec<RawUnit>> {
    Err(RagError::Load(format!(
        "cannot load '{}': PDF support requires the `pdf` feature",
        document.source
    )))
}

/// Build raw units from pre-extracted page texts (1-based, in order).
///
/// Useful when pages come from an extractor outside this crate.
pub fn from_pages<I, S>(source: &str, pages: I) -> Vec<RawUnit>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    pages
        .into_iter()
        .zip(1u32..)
        .filter_map(|(text, page)| page_unit(source, page, text.into()))
        .collect()
}
