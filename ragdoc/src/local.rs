//! Local flat-index vector store persisted to a directory.
//!
//! The directory holds two JSON files:
//!
//! - `index.json`: a header recording the format version, the embedding
//!   model and the dimensionality the index was built with
//! - `chunks.json`: every chunk payload and its vector, keyed by chunk id
//!
//! Both are whole-file structures, so every write rewrites them (to a
//! `.tmp` sibling, then renamed over the original). Writers are serialised
//! by an async `RwLock` held across load, modify and save; readers share the
//! lock and never observe a half-finished write.
//!
//! The lock is per [`LocalVectorStore`] value. Share one instance (for
//! example behind an `Arc`) between all callers of the same directory.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::document::{Chunk, Metadata, SearchResult};
use crate::error::{RagError, Result};
use crate::vectorstore::{VectorStore, check_batch, check_dimensions, cosine_similarity};

const BACKEND: &str = "local";
const FORMAT_VERSION: u32 = 1;
const HEADER_FILE: &str = "index.json";
const CHUNKS_FILE: &str = "chunks.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct IndexHeader {
    format_version: u32,
    embedding_model: String,
    dimensions: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredChunk {
    text: String,
    metadata: Metadata,
    vector: Vec<f32>,
}

/// In-memory image of the persisted index.
#[derive(Debug, Default)]
struct FlatIndex {
    chunks: BTreeMap<String, StoredChunk>,
}

impl FlatIndex {
    fn upsert(&mut self, chunks: &[Chunk], vectors: &[Vec<f32>]) {
        for (chunk, vector) in chunks.iter().zip(vectors) {
            self.chunks.insert(
                chunk.id.clone(),
                StoredChunk {
                    text: chunk.text.clone(),
                    metadata: chunk.metadata.clone(),
                    vector: vector.clone(),
                },
            );
        }
    }

    fn search(&self, vector: &[f32], k: usize) -> Vec<SearchResult> {
        let mut scored: Vec<SearchResult> = self
            .chunks
            .iter()
            .map(|(id, stored)| SearchResult {
                chunk: Chunk {
                    id: id.clone(),
                    text: stored.text.clone(),
                    metadata: stored.metadata.clone(),
                },
                score: cosine_similarity(&stored.vector, vector),
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
    }
}

/// A [`VectorStore`] backed by a flat cosine-similarity index on local disk.
///
/// The directory does not need to exist up front: the first
/// [`put_many`](VectorStore::put_many) (or an explicit
/// [`bootstrap`](LocalVectorStore::bootstrap)) creates it. Querying before
/// that fails with [`RagError::StoreUnavailable`].
///
/// # Example
///
/// ```rust,ignore
/// use ragdoc::{LocalVectorStore, VectorStore};
///
/// let store = LocalVectorStore::new(".ragdoc_index", "openai/text-embedding-3-small", 1536);
/// store.put_many(&chunks, &vectors).await?;
/// let results = store.query(&query_vector, 4).await?;
/// ```
#[derive(Debug)]
pub struct LocalVectorStore {
    dir: PathBuf,
    header: IndexHeader,
    lock: RwLock<()>,
}

impl LocalVectorStore {
    /// Create a store rooted at `dir` for vectors of the given model and dimensionality.
    pub fn new(
        dir: impl Into<PathBuf>,
        embedding_model: impl Into<String>,
        dimensions: usize,
    ) -> Self {
        Self {
            dir: dir.into(),
            header: IndexHeader {
                format_version: FORMAT_VERSION,
                embedding_model: embedding_model.into(),
                dimensions,
            },
            lock: RwLock::new(()),
        }
    }

    /// The index directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create an empty index if none exists yet, so that queries succeed
    /// (with no results) before anything has been ingested.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigurationMismatch`] if an existing index was
    /// built with a different model or dimensionality.
    pub async fn bootstrap(&self) -> Result<()> {
        let _guard = self.lock.write().await;
        let index = self.load_or_bootstrap().await?;
        self.save(&index).await
    }

    fn header_path(&self) -> PathBuf {
        self.dir.join(HEADER_FILE)
    }

    fn chunks_path(&self) -> PathBuf {
        self.dir.join(CHUNKS_FILE)
    }

    fn check_header(&self, found: &IndexHeader) -> Result<()> {
        if found.format_version != FORMAT_VERSION {
            return Err(RagError::store(
                BACKEND,
                format!(
                    "index at {} has format version {}, expected {FORMAT_VERSION}",
                    self.dir.display(),
                    found.format_version
                ),
            ));
        }
        if found.dimensions != self.header.dimensions {
            return Err(RagError::ConfigurationMismatch(format!(
                "index at {} holds {}-dimensional vectors but the embedding provider produces {}",
                self.dir.display(),
                found.dimensions,
                self.header.dimensions
            )));
        }
        if found.embedding_model != self.header.embedding_model {
            return Err(RagError::ConfigurationMismatch(format!(
                "index at {} was built with embedding model '{}' but '{}' is configured",
                self.dir.display(),
                found.embedding_model,
                self.header.embedding_model
            )));
        }
        Ok(())
    }

    /// Load the persisted index, or `None` if it has never been written.
    async fn load(&self) -> Result<Option<FlatIndex>> {
        let Some(header) = read_json::<IndexHeader>(&self.header_path()).await? else {
            return Ok(None);
        };
        self.check_header(&header)?;
        let chunks = read_json(&self.chunks_path()).await?.unwrap_or_default();
        Ok(Some(FlatIndex { chunks }))
    }

    async fn load_or_bootstrap(&self) -> Result<FlatIndex> {
        match self.load().await? {
            Some(index) => Ok(index),
            None => {
                info!(dir = %self.dir.display(), "bootstrapping local vector index");
                Ok(FlatIndex::default())
            }
        }
    }

    async fn save(&self, index: &FlatIndex) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            RagError::store(BACKEND, format!("failed to create {}: {e}", self.dir.display()))
        })?;
        // Chunks first: a header on disk means the chunk file is complete.
        write_json(&self.chunks_path(), &index.chunks).await?;
        write_json(&self.header_path(), &self.header).await
    }

    fn not_bootstrapped(&self) -> RagError {
        RagError::unavailable(
            BACKEND,
            format!("no index found at {}; ingest a document first", self.dir.display()),
        )
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(RagError::store(BACKEND, format!("failed to read {}: {e}", path.display())));
        }
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| RagError::store(BACKEND, format!("failed to decode {}: {e}", path.display())))
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec(value).map_err(|e| {
        RagError::store(BACKEND, format!("failed to encode {}: {e}", path.display()))
    })?;
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, &json)
        .await
        .map_err(|e| RagError::store(BACKEND, format!("failed to write {}: {e}", tmp.display())))?;
    tokio::fs::rename(&tmp, path).await.map_err(|e| {
        RagError::store(
            BACKEND,
            format!("failed to move {} to {}: {e}", tmp.display(), path.display()),
        )
    })
}

#[async_trait]
impl VectorStore for LocalVectorStore {
    fn backend(&self) -> &str {
        BACKEND
    }

    async fn put_many(&self, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()> {
        check_batch(BACKEND, chunks, vectors, self.header.dimensions)?;

        let _guard = self.lock.write().await;
        let mut index = self.load_or_bootstrap().await?;
        index.upsert(chunks, vectors);
        self.save(&index).await?;

        debug!(
            dir = %self.dir.display(),
            count = chunks.len(),
            total = index.chunks.len(),
            "upserted chunks"
        );
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        check_dimensions(vector, self.header.dimensions)?;

        let _guard = self.lock.read().await;
        let index = self.load().await?.ok_or_else(|| self.not_bootstrapped())?;
        Ok(index.search(vector, k))
    }

    async fn is_available(&self) -> bool {
        let _guard = self.lock.read().await;
        matches!(self.load().await, Ok(Some(_)))
    }

    async fn count(&self) -> Result<usize> {
        let _guard = self.lock.read().await;
        let index = self.load().await?.ok_or_else(|| self.not_bootstrapped())?;
        Ok(index.chunks.len())
    }
}
