use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::Serialize;
use tracing::{Event, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

/// One recorded event.
#[derive(Debug, Clone, Serialize)]
pub struct CapturedEvent {
    pub level: String,
    pub target: String,
    /// The event's message, if it had one.
    pub message: Option<String>,
    pub fields: HashMap<String, serde_json::Value>,
}

impl CapturedEvent {
    /// A string field, whether it was recorded with `%`, `?` or as a `&str`.
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(|v| v.as_str())
    }
}

/// Shared storage for captured events
#[derive(Debug, Clone, Default)]
pub struct EventStorage {
    events: Arc<RwLock<Vec<CapturedEvent>>>,
}

impl EventStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every event recorded so far, oldest first.
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.read().map(|events| events.clone()).unwrap_or_default()
    }

    /// Events whose message equals `message`.
    pub fn with_message(&self, message: &str) -> Vec<CapturedEvent> {
        self.events().into_iter().filter(|e| e.message.as_deref() == Some(message)).collect()
    }

    fn push(&self, event: CapturedEvent) {
        if let Ok(mut events) = self.events.write() {
            events.push(event);
        }
    }
}

/// A tracing layer that records events in memory
pub struct InMemoryEventLayer {
    storage: EventStorage,
}

impl InMemoryEventLayer {
    pub fn new(storage: EventStorage) -> Self {
        Self { storage }
    }
}

impl<S: Subscriber> Layer<S> for InMemoryEventLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = JsonVisitor::default();
        event.record(&mut visitor);
        let mut fields = visitor.0;
        let message = fields.remove("message").map(|value| match value {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        });

        let metadata = event.metadata();
        self.storage.push(CapturedEvent {
            level: metadata.level().to_string(),
            target: metadata.target().to_string(),
            message,
            fields,
        });
    }
}

#[derive(Default)]
struct JsonVisitor(HashMap<String, serde_json::Value>);

impl tracing::field::Visit for JsonVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.0.insert(field.name().to_string(), serde_json::Value::String(format!("{value:?}")));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.0.insert(field.name().to_string(), serde_json::Value::String(value.to_string()));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.0.insert(field.name().to_string(), serde_json::Value::Bool(value));
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }
}

#[cfg(test)]
mod tests {
    use tracing_subscriber::layer::SubscriberExt as _;

    use super::*;

    #[test]
    fn records_messages_and_fields() {
        let storage = EventStorage::new();
        let subscriber =
            tracing_subscriber::registry().with(InMemoryEventLayer::new(storage.clone()));

        tracing::subscriber::with_default(subscriber, || {
            let backend = "local";
            tracing::info!(
                source = "notes.txt",
                chunk_count = 3usize,
                backend = %backend,
                "ingested document"
            );
        });

        let events = storage.with_message("ingested document");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].level, "INFO");
        assert_eq!(events[0].field_str("source"), Some("notes.txt"));
        assert_eq!(events[0].field_str("backend"), Some("local"));
        assert_eq!(events[0].fields["chunk_count"], serde_json::json!(3));
    }
}
