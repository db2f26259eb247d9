//! Ingestion behaviour: idempotency, failure atomicity, timeouts, and round trips.

mod common;

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use common::{DIM, FailingEmbedder, HashEmbedder, embed_words};
use ragdoc::chunking::TextSplitter;
use ragdoc::{
    Document, EmbeddingProvider, IngestionPipeline, LocalVectorStore, RagConfig, RagError, Result,
    VectorStore, loader,
};

const ESSAY: &str = "Rust programs are built from crates. A crate is a compilation unit.\n\n\
    Packages bundle one or more crates and describe how to build them with a manifest. \
    Cargo reads the manifest, resolves dependencies, and invokes the compiler.\n\n\
    Ownership rules are checked at compile time. Every value has a single owner, and the \
    value is dropped when the owner goes out of scope. Borrowing lets code use a value \
    without taking ownership of it. Lifetimes describe how long references stay valid.";

fn pipeline(
    config: &RagConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
) -> IngestionPipeline {
    IngestionPipeline::builder()
        .config(config)
        .embedding_provider(embedder)
        .vector_store(store)
        .build()
        .unwrap()
}

fn small_chunks(dir: &std::path::Path) -> RagConfig {
    RagConfig::builder()
        .local_index_dir(dir)
        .chunk_size(120)
        .chunk_overlap(30)
        .embedding_batch_size(2)
        .build()
        .unwrap()
}

#[tokio::test]
async fn ingesting_twice_leaves_the_store_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let config = small_chunks(dir.path());
    let store = Arc::new(LocalVectorStore::new(dir.path(), "mock/hash-bow", DIM));
    let pipeline = pipeline(&config, Arc::new(HashEmbedder::new()), store.clone());
    let document = Document::text("essay.txt", ESSAY);

    let first = pipeline.ingest(&document).await.unwrap();
    assert!(first.chunk_count > 2);
    let count_after_first = store.count().await.unwrap();
    assert_eq!(count_after_first, first.chunk_count);

    let second = pipeline.ingest(&document).await.unwrap();
    assert_eq!(second, first);
    assert_eq!(store.count().await.unwrap(), count_after_first);
}

#[tokio::test]
async fn every_chunk_is_retrievable_by_its_own_text() {
    let dir = tempfile::tempdir().unwrap();
    let config = small_chunks(dir.path());
    let store = Arc::new(LocalVectorStore::new(dir.path(), "mock/hash-bow", DIM));
    let pipeline = pipeline(&config, Arc::new(HashEmbedder::new()), store.clone());
    let document = Document::text("essay.txt", ESSAY);
    pipeline.ingest(&document).await.unwrap();

    let splitter = TextSplitter::new(config.chunk_size, config.chunk_overlap).unwrap();
    let units = loader::load(&document).unwrap();
    for chunk in splitter.split_all(&units) {
        let results = store.query(&embed_words(&chunk.text), 2).await.unwrap();
        let hit = results.iter().find(|r| r.chunk.id == chunk.id);
        let hit = hit.unwrap_or_else(|| panic!("chunk {} not retrieved", chunk.id));
        assert_eq!(hit.chunk, chunk);
        assert!(hit.score > 0.999);
    }
}

#[tokio::test]
async fn embedding_failure_persists_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let config = small_chunks(dir.path());
    let store = Arc::new(LocalVectorStore::new(dir.path(), "mock/hash-bow", DIM));
    let pipeline = pipeline(&config, Arc::new(FailingEmbedder), store.clone());

    let err = pipeline.ingest(&Document::text("essay.txt", ESSAY)).await.unwrap_err();
    assert!(matches!(err, RagError::Embedding { .. }), "got {err:?}");
    assert!(!store.is_available().await);
}

/// Records the texts of every `embed_batch` request it receives.
struct BatchRecorder {
    batches: Mutex<Vec<Vec<String>>>,
}

#[async_trait]
impl EmbeddingProvider for BatchRecorder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(embed_words(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.batches.lock().unwrap().push(texts.iter().map(|t| t.to_string()).collect());
        Ok(texts.iter().map(|t| embed_words(t)).collect())
    }

    fn dimensions(&self) -> usize {
        DIM
    }

    fn model_id(&self) -> &str {
        "mock/hash-bow"
    }
}

#[tokio::test]
async fn embedding_requests_are_batched_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let config = small_chunks(dir.path());
    let embedder = Arc::new(BatchRecorder { batches: Mutex::new(Vec::new()) });
    let store = Arc::new(LocalVectorStore::new(dir.path(), "mock/hash-bow", DIM));
    let pipeline = pipeline(&config, embedder.clone(), store);

    let document = Document::text("essay.txt", ESSAY);
    let report = pipeline.ingest(&document).await.unwrap();

    let batches = embedder.batches.lock().unwrap().clone();
    let batch_size = config.embedding_batch_size;
    assert!(batches.len() > 1);
    assert_eq!(batches.len(), report.chunk_count.div_ceil(batch_size));
    assert!(batches.iter().all(|batch| !batch.is_empty() && batch.len() <= batch_size));

    let splitter = TextSplitter::new(config.chunk_size, config.chunk_overlap).unwrap();
    let units = loader::load(&document).unwrap();
    let expected: Vec<String> = splitter.split_all(&units).map(|c| c.text).collect();
    assert_eq!(batches.concat(), expected);
}

/// Returns vectors of the right size filled with NaN.
struct NanEmbedder;

#[async_trait]
impl EmbeddingProvider for NanEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![f32::NAN; DIM])
    }

    fn dimensions(&self) -> usize {
        DIM
    }

    fn model_id(&self) -> &str {
        "mock/hash-bow"
    }
}

#[tokio::test]
async fn non_finite_embeddings_are_rejected_and_the_index_stays_usable() {
    let dir = tempfile::tempdir().unwrap();
    let config = small_chunks(dir.path());
    let store = Arc::new(LocalVectorStore::new(dir.path(), "mock/hash-bow", DIM));
    let good = pipeline(&config, Arc::new(HashEmbedder::new()), store.clone());
    let bad = pipeline(&config, Arc::new(NanEmbedder), store.clone());

    good.ingest(&Document::text("notes.txt", "The sky is blue.")).await.unwrap();

    let err = bad.ingest(&Document::text("other.txt", "Grass is green.")).await.unwrap_err();
    assert!(matches!(err, RagError::Embedding { .. }), "got {err:?}");
    assert_eq!(store.count().await.unwrap(), 1);

    let results = store.query(&embed_words("What color is the sky?"), 4).await.unwrap();
    assert_eq!(results.len(), 1);
    good.ingest(&Document::text("grass.txt", "Grass is green.")).await.unwrap();
    assert_eq!(store.count().await.unwrap(), 2);
}

#[tokio::test]
async fn empty_documents_short_circuit() {
    let dir = tempfile::tempdir().unwrap();
    let config = small_chunks(dir.path());
    let embedder = Arc::new(HashEmbedder::new());
    let store = Arc::new(LocalVectorStore::new(dir.path(), "mock/hash-bow", DIM));
    let pipeline = pipeline(&config, embedder.clone(), store.clone());

    let report = pipeline.ingest(&Document::text("empty.txt", "  \n ")).await.unwrap();
    assert_eq!(report.chunk_count, 0);
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    assert!(!store.is_available().await);
}

#[tokio::test]
async fn unsupported_uploads_are_load_errors() {
    assert!(matches!(Document::from_upload("slides.pptx", vec![1, 2, 3]), Err(RagError::Load(_))));
}

struct SlowEmbedder;

#[async_trait]
impl EmbeddingProvider for SlowEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(embed_words(text))
    }

    fn dimensions(&self) -> usize {
        DIM
    }

    fn model_id(&self) -> &str {
        "mock/slow"
    }
}

#[tokio::test(start_paused = true)]
async fn slow_embedding_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let config = RagConfig::builder()
        .local_index_dir(dir.path())
        .request_timeout(Duration::from_secs(2))
        .build()
        .unwrap();
    let store = Arc::new(LocalVectorStore::new(dir.path(), "mock/slow", DIM));
    let pipeline = pipeline(&config, Arc::new(SlowEmbedder), store.clone());

    let err = pipeline.ingest(&Document::text("notes.txt", "The sky is blue.")).await.unwrap_err();
    assert!(matches!(err, RagError::Embedding { .. }), "got {err:?}");
    assert!(!store.is_available().await);
}

#[tokio::test]
async fn a_store_with_other_dimensions_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = small_chunks(dir.path());
    let store = Arc::new(LocalVectorStore::new(dir.path(), "mock/hash-bow", DIM * 2));
    let pipeline = pipeline(&config, Arc::new(HashEmbedder::new()), store);

    let err = pipeline.ingest(&Document::text("notes.txt", "The sky is blue.")).await.unwrap_err();
    assert!(matches!(err, RagError::ConfigurationMismatch(_)), "got {err:?}");
}
