//! Content-addressed chunk identifiers.
//!
//! A chunk id is the first 128 bits of a SHA-256 digest over the chunk text
//! and its metadata. Metadata is fed in key order, so two maps with the same
//! entries always hash the same regardless of how they were built. Every
//! field is length-prefixed, which keeps `("ab", "c")` and `("a", "bc")`
//! apart.

use sha2::{Digest, Sha256};

use crate::document::Metadata;

/// Number of digest bytes kept in an id.
const ID_BYTES: usize = 16;

/// Compute the stable identifier for a chunk.
///
/// The same `(text, metadata)` pair yields the same id on every call and in
/// every process. Changing the text or any single metadata field yields a
/// different id.
///
/// # Example
///
/// ```rust
/// use ragdoc::document::Metadata;
/// use ragdoc::identity::compute_id;
///
/// let mut metadata = Metadata::new();
/// metadata.insert("source".into(), "notes.txt".into());
/// let id = compute_id("The sky is blue.", &metadata);
/// assert_eq!(id.len(), 32);
/// assert_eq!(id, compute_id("The sky is blue.", &metadata));
/// ```
pub fn compute_id(text: &str, metadata: &Metadata) -> String {
    let mut hasher = Sha256::new();
    update_field(&mut hasher, text);
    hasher.update((metadata.len() as u64).to_le_bytes());
    for (key, value) in metadata {
        update_field(&mut hasher, key);
        update_field(&mut hasher, value);
    }
    let digest = hasher.finalize();
    digest[..ID_BYTES].iter().map(|byte| format!("{byte:02x}")).collect()
}

fn update_field(hasher: &mut Sha256, field: &str) {
    hasher.update((field.len() as u64).to_le_bytes());
    hasher.update(field.as_bytes());
}
