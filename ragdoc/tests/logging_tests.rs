//! Ingestion and answering report their progress through `tracing`.

mod common;

use std::sync::Arc;

use common::{DIM, EchoLlm, HashEmbedder};
use ragdoc::{Answerer, Document, IngestionPipeline, LocalVectorStore, PromptVariant, RagConfig};
use ragdoc_telemetry::memory::{EventStorage, InMemoryEventLayer};
use tracing_subscriber::layer::SubscriberExt as _;

#[tokio::test]
async fn ingestion_and_answers_are_logged_with_structured_fields() {
    let storage = EventStorage::new();
    let subscriber = tracing_subscriber::registry().with(InMemoryEventLayer::new(storage.clone()));
    let _guard = tracing::subscriber::set_default(subscriber);

    let dir = tempfile::tempdir().unwrap();
    let config = RagConfig::builder().local_index_dir(dir.path()).build().unwrap();
    let embedder = Arc::new(HashEmbedder::new());
    let store = Arc::new(LocalVectorStore::new(dir.path(), "mock/hash-bow", DIM));

    let pipeline = IngestionPipeline::builder()
        .config(&config)
        .embedding_provider(embedder.clone())
        .vector_store(store.clone())
        .build()
        .unwrap();
    pipeline.ingest(&Document::text("notes.txt", "The sky is blue.")).await.unwrap();

    let answerer = Answerer::builder()
        .config(&config)
        .embedding_provider(embedder)
        .vector_store(store)
        .completion_provider(Arc::new(EchoLlm::new()))
        .build()
        .unwrap();
    answerer.answer_question("What color is the sky?", 1, PromptVariant::Strict).await.unwrap();

    let ingested = storage.with_message("ingested document");
    assert_eq!(ingested.len(), 1);
    assert_eq!(ingested[0].level, "INFO");
    assert_eq!(ingested[0].field_str("source"), Some("notes.txt"));
    assert_eq!(ingested[0].field_str("backend"), Some("local"));
    assert_eq!(ingested[0].field_str("stage"), Some("persisted"));
    assert_eq!(ingested[0].fields["chunk_count"], serde_json::json!(1));

    let answered = storage.with_message("answered question");
    assert_eq!(answered.len(), 1);
    assert_eq!(answered[0].field_str("prompt"), Some("strict"));
}
