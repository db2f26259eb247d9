//! Splitting raw units into overlapping, bounded-length chunks.
//!
//! [`TextSplitter`] walks a unit with a window of at most `chunk_size`
//! characters. Each window is cut at the best boundary it contains, in order
//! of preference:
//!
//! 1. a paragraph break (`\n\n`)
//! 2. a sentence end (`. `, `! `, `? `, or a newline)
//! 3. a word break (a space)
//! 4. a hard cut at `chunk_size`
//!
//! Boundaries are only looked for in the back half of the window so chunks
//! stay reasonably full. The next window starts `chunk_overlap` characters
//! before the cut, snapped back to the start of a word when one is close.
//!
//! All lengths are counted in characters (Unicode scalar values), never bytes.

use crate::document::{Chunk, Metadata, RawUnit};
use crate::error::{RagError, Result};
use crate::identity::compute_id;

/// Metadata key recording the character offset of a chunk within its unit.
pub const START_INDEX_KEY: &str = "start_index";

/// Boundary classes, most preferred first.
const BOUNDARIES: &[&[&str]] = &[&["\n\n"], &[". ", "! ", "? ", "\n"], &[" "]];

/// Splits [`RawUnit`]s into overlapping [`Chunk`]s.
///
/// # Example
///
/// ```rust
/// use ragdoc::chunking::TextSplitter;
/// use ragdoc::loader;
/// use ragdoc::document::Document;
///
/// let splitter = TextSplitter::new(900, 150)?;
/// let units = loader::load(&Document::text("notes.txt", "The sky is blue."))?;
/// let chunks: Vec<_> = splitter.split(&units[0]).collect();
/// assert_eq!(chunks.len(), 1);
/// # Ok::<(), ragdoc::RagError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextSplitter {
    /// Create a splitter.
    ///
    /// # Arguments
    ///
    /// * `chunk_size`: maximum number of characters per chunk
    /// * `chunk_overlap`: minimum number of characters shared by consecutive chunks
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] unless `chunk_overlap < chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_overlap >= chunk_size {
            return Err(RagError::Config(format!(
                "chunk_overlap ({chunk_overlap}) must be less than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self { chunk_size, chunk_overlap })
    }

    /// Maximum number of characters per chunk.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Minimum overlap between consecutive chunks.
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Lazily split one unit. Calling this again starts over from the beginning.
    pub fn split<'a>(&self, unit: &'a RawUnit) -> Splits<'a> {
        Splits::new(unit, *self)
    }

    /// Lazily split a sequence of units, preserving unit order.
    pub fn split_all<'a>(&self, units: &'a [RawUnit]) -> impl Iterator<Item = Chunk> + 'a {
        let splitter = *self;
        units.iter().flat_map(move |unit| splitter.split(unit))
    }
}

/// The chunks of one [`RawUnit`], produced on demand.
#[derive(Debug, Clone)]
pub struct Splits<'a> {
    text: &'a str,
    metadata: &'a Metadata,
    /// Byte offset of every character boundary, including the end of the text.
    bounds: Vec<usize>,
    splitter: TextSplitter,
    start: usize,
    prev_end: usize,
    done: bool,
}

impl<'a> Splits<'a> {
    fn new(unit: &'a RawUnit, splitter: TextSplitter) -> Self {
        let text = unit.text.as_str();
        let bounds: Vec<usize> = text
            .char_indices()
            .map(|(offset, _)| offset)
            .chain(std::iter::once(text.len()))
            .collect();
        Self {
            text,
            metadata: &unit.metadata,
            bounds,
            splitter,
            start: 0,
            prev_end: 0,
            done: text.is_empty(),
        }
    }

    fn char_len(&self) -> usize {
        self.bounds.len() - 1
    }

    fn slice(&self, from: usize, to: usize) -> &'a str {
        &self.text[self.bounds[from]..self.bounds[to]]
    }

    fn char_at(&self, index: usize) -> Option<char> {
        self.text[self.bounds[index]..].chars().next()
    }

    fn ends_with_at(&self, position: usize, separator: &str) -> bool {
        let width = separator.chars().count();
        position >= width && self.slice(position - width, position) == separator
    }

    /// Pick the cut position in `lo..=hi`, preferring larger boundaries.
    fn find_cut(&self, lo: usize, hi: usize) -> usize {
        for separators in BOUNDARIES {
            let found = (lo..=hi)
                .rev()
                .find(|&position| separators.iter().any(|sep| self.ends_with_at(position, sep)));
            if let Some(position) = found {
                return position;
            }
        }
        hi
    }

    fn is_word_start(&self, position: usize) -> bool {
        let before = position.checked_sub(1).and_then(|p| self.char_at(p));
        let at = self.char_at(position);
        matches!((before, at), (Some(b), Some(a)) if b.is_whitespace() && !a.is_whitespace())
    }

    /// Where the chunk after `start..end` begins.
    ///
    /// Always at most `end - chunk_overlap` and strictly after `start`.
    fn next_start(&self, start: usize, end: usize) -> usize {
        let TextSplitter { chunk_size, chunk_overlap } = self.splitter;
        let target = end - chunk_overlap;
        let floor = (start + 1)
            .max((end + 1).saturating_sub(chunk_size))
            .max(target.saturating_sub(chunk_overlap / 2));
        (floor..=target).rev().find(|&p| self.is_word_start(p)).unwrap_or(target)
    }

    fn make_chunk(&self, start: usize, end: usize) -> Chunk {
        let text = self.slice(start, end).to_string();
        let mut metadata = self.metadata.clone();
        metadata.insert(START_INDEX_KEY.to_string(), start.to_string());
        let id = compute_id(&text, &metadata);
        Chunk { id, text, metadata }
    }
}

impl Iterator for Splits<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.done {
            return None;
        }

        let TextSplitter { chunk_size, chunk_overlap } = self.splitter;
        let len = self.char_len();
        let start = self.start;

        let end = if len - start <= chunk_size {
            self.done = true;
            len
        } else {
            let hi = start + chunk_size;
            let lo = (start + chunk_overlap + 1).max(start + chunk_size / 2).max(self.prev_end + 1);
            self.find_cut(lo, hi)
        };

        let chunk = self.make_chunk(start, end);
        if !self.done {
            self.prev_end = end;
            self.start = self.next_start(start, end);
        }
        Some(chunk)
    }
}

impl std::iter::FusedIterator for Splits<'_> {}
