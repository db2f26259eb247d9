//! Deterministic stand-ins for the embedding and completion services.

#![allow(dead_code)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use ragdoc::{CompletionProvider, EmbeddingProvider, RagError, Result};

pub const DIM: usize = 64;

/// Embeds text as a normalised bag of lower-cased words hashed into [`DIM`] buckets.
///
/// Texts sharing words land close together, which is enough for retrieval tests.
pub struct HashEmbedder {
    model_id: String,
    pub calls: AtomicUsize,
}

impl HashEmbedder {
    pub fn new() -> Self {
        Self::with_model("mock/hash-bow")
    }

    pub fn with_model(model_id: &str) -> Self {
        Self { model_id: model_id.to_string(), calls: AtomicUsize::new(0) }
    }
}

fn bucket(word: &str) -> usize {
    // FNV-1a
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in word.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    (hash % DIM as u64) as usize
}

pub fn embed_words(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; DIM];
    for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
        vector[bucket(&word.to_lowercase())] += 1.0;
    }
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|x| *x /= norm);
    } else {
        vector[0] = 1.0;
    }
    vector
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(embed_words(text))
    }

    fn dimensions(&self) -> usize {
        DIM
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// Fails every request, as an unreachable embedding service would.
pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(RagError::Embedding { provider: "mock".into(), message: "quota exceeded".into() })
    }

    fn dimensions(&self) -> usize {
        DIM
    }

    fn model_id(&self) -> &str {
        "mock/hash-bow"
    }
}

/// Answers with the text of the first chunk in the prompt's context, and
/// with "I don't know." when the context is empty.
pub struct EchoLlm {
    pub prompts: Mutex<Vec<String>>,
}

impl EchoLlm {
    pub fn new() -> Self {
        Self { prompts: Mutex::new(Vec::new()) }
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl CompletionProvider for EchoLlm {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let first_chunk = prompt
            .split_once("[chunk_id=")
            .and_then(|(_, rest)| rest.split_once('\n'))
            .map(|(_, body)| body.split("\n\n---\n\n").next().unwrap_or(body))
            .map(|body| body.split("\n\nRules:").next().unwrap_or(body).trim().to_string());
        Ok(first_chunk.unwrap_or_else(|| "I don't know.".to_string()))
    }

    fn model_id(&self) -> &str {
        "mock/echo"
    }
}

/// Always returns whitespace.
pub struct SilentLlm;

#[async_trait]
impl CompletionProvider for SilentLlm {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        Ok("  \n".to_string())
    }

    fn model_id(&self) -> &str {
        "mock/silent"
    }
}

/// Build a minimal PDF with one line of Courier text per page.
#[cfg(feature = "pdf")]
pub fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
    use lopdf::content::{Content, Operation};
    use lopdf::{Object, Stream, dictionary};

    let mut doc = lopdf::Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let kids: Vec<Object> = pages
        .iter()
        .map(|text| {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![50.into(), 700.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            })
            .into()
        })
        .collect();

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}
