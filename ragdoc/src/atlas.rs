//! MongoDB Atlas Vector Search backend.
//!
//! Provides [`AtlasVectorStore`] which implements [`VectorStore`] using the
//! [mongodb](https://docs.rs/mongodb) driver. Chunks are stored as documents
//! keyed by chunk id:
//!
//! ```json
//! {
//!   "_id": "<chunk id>",
//!   "text": "...",
//!   "embedding": [..],
//!   "metadata": {..},
//!   "embedding_model": "..."
//! }
//! ```
//!
//! The vector search index over `embedding` is provisioned out-of-band
//! (dimensions and similarity are declared there). This module only reads
//! and writes documents; it never creates or modifies the index.
//!
//! This module is only available when the `atlas` feature is enabled.

use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{self, Bson, Document as BsonDocument, doc};
use mongodb::error::{Error as MongoError, ErrorKind};
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, error};

use crate::config::AtlasConfig;
use crate::document::{Chunk, Metadata, SearchResult};
use crate::error::{RagError, Result};
use crate::vectorstore::{VectorStore, check_batch, check_dimensions};

const BACKEND: &str = "atlas";
const EMBEDDING_PATH: &str = "embedding";

/// A chunk as stored in the collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct AtlasRecord {
    #[serde(rename = "_id")]
    id: String,
    text: String,
    embedding: Vec<f32>,
    metadata: Metadata,
    embedding_model: String,
}

/// A `$vectorSearch` hit after projection.
#[derive(Debug, Clone, Deserialize)]
struct AtlasHit {
    #[serde(rename = "_id")]
    id: String,
    text: String,
    #[serde(default)]
    metadata: Metadata,
    #[serde(default)]
    embedding_model: Option<String>,
    score: f64,
}

/// What the server reports about the configured search index.
#[derive(Debug, Clone, PartialEq)]
struct IndexStatus {
    queryable: bool,
    dimensions: Option<usize>,
}

/// A [`VectorStore`] backed by [MongoDB Atlas Vector Search][atlas].
///
/// The dimensionality declared on the server index is checked on the first
/// write or query that finds the index, and remembered after that.
///
/// [atlas]: https://www.mongodb.com/docs/atlas/atlas-vector-search/
///
/// # Example
///
/// ```rust,ignore
/// use ragdoc::AtlasConfig;
/// use ragdoc::atlas::AtlasVectorStore;
///
/// let store =
///     AtlasVectorStore::connect(&config, "openai/text-embedding-3-small", 1536, timeout).await?;
/// store.put_many(&chunks, &vectors).await?;
/// let results = store.query(&query_vector, 4).await?;
/// ```
pub struct AtlasVectorStore {
    collection: Collection<AtlasRecord>,
    index_name: String,
    embedding_model: String,
    dimensions: usize,
    dimensions_verified: OnceCell<()>,
}

impl AtlasVectorStore {
    /// Connect to the configured collection.
    ///
    /// `timeout` bounds server selection and connection establishment, so an
    /// unreachable cluster fails instead of hanging.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if the connection string cannot be parsed.
    pub async fn connect(
        config: &AtlasConfig,
        embedding_model: impl Into<String>,
        dimensions: usize,
        timeout: Duration,
    ) -> Result<Self> {
        if config.uri.is_empty() {
            return Err(RagError::Config("MONGODB_URI is not set".to_string()));
        }
        let mut options = ClientOptions::parse(&config.uri)
            .await
            .map_err(|e| RagError::Config(format!("invalid MongoDB connection string: {e}")))?;
        options.server_selection_timeout = Some(timeout);
        options.connect_timeout = Some(timeout);
        options.app_name.get_or_insert_with(|| "ragdoc".to_string());

        let client = Client::with_options(options).map_err(map_err)?;
        let collection = client.database(&config.database).collection(&config.collection);
        debug!(database = %config.database, collection = %config.collection, "connected to atlas");

        Ok(Self {
            collection,
            index_name: config.index_name.clone(),
            embedding_model: embedding_model.into(),
            dimensions,
            dimensions_verified: OnceCell::new(),
        })
    }

    /// Look up the configured search index on the server.
    async fn index_status(&self) -> Result<Option<IndexStatus>> {
        let mut cursor =
            self.collection.list_search_indexes().name(&self.index_name).await.map_err(map_err)?;
        match cursor.try_next().await.map_err(map_err)? {
            Some(index) => Ok(Some(parse_index_status(&index))),
            None => Ok(None),
        }
    }

    /// Fail unless the index exists, is queryable and matches our dimensionality.
    async fn ensure_index(&self) -> Result<()> {
        let status = self.index_status().await?.ok_or_else(|| {
            RagError::unavailable(
                BACKEND,
                format!("vector search index '{}' does not exist", self.index_name),
            )
        })?;
        if !status.queryable {
            return Err(RagError::unavailable(
                BACKEND,
                format!("vector search index '{}' is not queryable yet", self.index_name),
            ));
        }
        self.remember_dimensions(&status)
    }

    /// Check the index's declared dimensionality before the first write.
    ///
    /// A missing index is not an error here: documents may be written before
    /// the index is provisioned.
    async fn verify_dimensions(&self) -> Result<()> {
        if self.dimensions_verified.initialized() {
            return Ok(());
        }
        match self.index_status().await? {
            Some(status) => self.remember_dimensions(&status),
            None => Ok(()),
        }
    }

    fn remember_dimensions(&self, status: &IndexStatus) -> Result<()> {
        if check_declared_dimensions(&self.index_name, status, self.dimensions)? {
            let _ = self.dimensions_verified.set(());
        }
        Ok(())
    }

    fn record(&self, chunk: &Chunk, vector: &[f32]) -> AtlasRecord {
        AtlasRecord {
            id: chunk.id.clone(),
            text: chunk.text.clone(),
            embedding: vector.to_vec(),
            metadata: chunk.metadata.clone(),
            embedding_model: self.embedding_model.clone(),
        }
    }

    fn hit_to_result(&self, hit: AtlasHit) -> Result<SearchResult> {
        if let Some(model) = hit.embedding_model.as_deref() {
            if model != self.embedding_model {
                return Err(RagError::ConfigurationMismatch(format!(
                    "chunk '{}' was embedded with '{model}' but '{}' is configured",
                    hit.id, self.embedding_model
                )));
            }
        }
        Ok(SearchResult {
            chunk: Chunk { id: hit.id, text: hit.text, metadata: hit.metadata },
            score: hit.score as f32,
        })
    }
}

/// Classify a driver error: connectivity problems mean the store is unavailable.
fn map_err(e: MongoError) -> RagError {
    match e.kind.as_ref() {
        ErrorKind::ServerSelection { .. }
        | ErrorKind::Io(_)
        | ErrorKind::ConnectionPoolCleared { .. }
        | ErrorKind::DnsResolve { .. } => RagError::unavailable(BACKEND, e.to_string()),
        ErrorKind::Command(command) if command.code == 26 => {
            // NamespaceNotFound: the collection itself does not exist yet.
            RagError::unavailable(BACKEND, e.to_string())
        }
        _ => RagError::store(BACKEND, e.to_string()),
    }
}

/// Compare the index's declared dimensionality with `dimensions`.
///
/// Returns whether the index declared one at all.
fn check_declared_dimensions(
    index_name: &str,
    status: &IndexStatus,
    dimensions: usize,
) -> Result<bool> {
    match status.dimensions {
        Some(declared) if declared != dimensions => Err(RagError::ConfigurationMismatch(format!(
            "vector search index '{index_name}' declares {declared} dimensions \
             but the embedding provider produces {dimensions}"
        ))),
        Some(_) => Ok(true),
        None => Ok(false),
    }
}

fn search_pipeline(index_name: &str, vector: &[f32], k: usize) -> Vec<BsonDocument> {
    let query_vector: Vec<f64> = vector.iter().map(|v| f64::from(*v)).collect();
    let limit = k as i64;
    vec![
        doc! {
            "$vectorSearch": {
                "index": index_name,
                "path": EMBEDDING_PATH,
                "queryVector": query_vector,
                "numCandidates": (limit * 10).max(100),
                "limit": limit,
            }
        },
        doc! {
            "$project": {
                "_id": 1,
                "text": 1,
                "metadata": 1,
                "embedding_model": 1,
                "score": { "$meta": "vectorSearchScore" },
            }
        },
    ]
}

fn parse_index_status(index: &BsonDocument) -> IndexStatus {
    let queryable = index.get_bool("queryable").unwrap_or(false);
    let dimensions = index
        .get_document("latestDefinition")
        .ok()
        .and_then(|definition| definition.get_array("fields").ok())
        .and_then(|fields| {
            fields.iter().filter_map(Bson::as_document).find(|field| {
                field.get_str("type").ok() == Some("vector")
                    && field.get_str("path").ok() == Some(EMBEDDING_PATH)
            })
        })
        .and_then(|field| match field.get("numDimensions") {
            Some(Bson::Int32(n)) => usize::try_from(*n).ok(),
            Some(Bson::Int64(n)) => usize::try_from(*n).ok(),
            Some(Bson::Double(n)) => Some(*n as usize),
            _ => None,
        });
    IndexStatus { queryable, dimensions }
}

#[async_trait]
impl VectorStore for AtlasVectorStore {
    fn backend(&self) -> &str {
        BACKEND
    }

    async fn put_many(&self, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()> {
        check_batch(BACKEND, chunks, vectors, self.dimensions)?;
        self.verify_dimensions().await?;

        for (chunk, vector) in chunks.iter().zip(vectors) {
            let record = self.record(chunk, vector);
            self.collection
                .replace_one(doc! { "_id": record.id.as_str() }, &record)
                .upsert(true)
                .await
                .map_err(|e| {
                    error!(chunk.id = %chunk.id, error = %e, "atlas upsert failed");
                    map_err(e)
                })?;
        }

        debug!(count = chunks.len(), "upserted chunks to atlas");
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        check_dimensions(vector, self.dimensions)?;
        self.ensure_index().await?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut cursor = self
            .collection
            .aggregate(search_pipeline(&self.index_name, vector, k))
            .await
            .map_err(map_err)?;

        let mut results = Vec::new();
        while let Some(document) = cursor.try_next().await.map_err(map_err)? {
            let hit: AtlasHit = bson::from_document(document).map_err(|e| {
                RagError::store(BACKEND, format!("failed to decode search hit: {e}"))
            })?;
            results.push(self.hit_to_result(hit)?);
        }

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(k);
        Ok(results)
    }

    async fn is_available(&self) -> bool {
        matches!(self.index_status().await, Ok(Some(IndexStatus { queryable: true, .. })))
    }

    async fn count(&self) -> Result<usize> {
        let count = self.collection.count_documents(doc! {}).await.map_err(map_err)?;
        Ok(count as usize)
    }
}
