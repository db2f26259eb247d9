//! Property tests for local vector store search ordering and persistence.

use std::collections::HashMap;

use proptest::prelude::*;
use ragdoc::document::{Chunk, Metadata, SOURCE_KEY};
use ragdoc::local::LocalVectorStore;
use ragdoc::vectorstore::{VectorStore, cosine_similarity};

const MODEL: &str = "mock/random";

/// Generate a non-zero L2-normalized embedding of the given dimension.
fn arb_normalized_embedding(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, dim).prop_filter_map("non-zero embedding", |mut v| {
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm < 1e-8 {
            return None;
        }
        for val in &mut v {
            *val /= norm;
        }
        Some(v)
    })
}

/// Generate a chunk together with its normalized embedding.
fn arb_entry(dim: usize) -> impl Strategy<Value = (Chunk, Vec<f32>)> {
    ("[a-z]{3,8}", "[a-z ]{5,30}", arb_normalized_embedding(dim)).prop_map(|(id, text, vector)| {
        let mut metadata = Metadata::new();
        metadata.insert(SOURCE_KEY.to_string(), "doc_1.txt".to_string());
        (Chunk { id, text, metadata }, vector)
    })
}

/// **Property: local store search ordering**
/// *For any* set of chunks stored in a LocalVectorStore, querying SHALL return
/// results ordered by descending cosine similarity, at most `k` of them, and
/// exactly `min(k, stored)` when enough chunks exist.
mod prop_local_search_ordering {
    use super::*;

    const DIM: usize = 16;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn results_ordered_descending_and_bounded_by_k(
            entries in proptest::collection::vec(arb_entry(DIM), 1..20),
            query in arb_normalized_embedding(DIM),
            k in 1usize..25,
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let (results, unique_count, expected) = rt.block_on(async {
                let dir = tempfile::tempdir().unwrap();
                let store = LocalVectorStore::new(dir.path(), MODEL, DIM);

                // Deduplicate by id so upserts don't overwrite each other
                let mut deduped: HashMap<String, (Chunk, Vec<f32>)> = HashMap::new();
                for (chunk, vector) in &entries {
                    deduped
                        .entry(chunk.id.clone())
                        .or_insert_with(|| (chunk.clone(), vector.clone()));
                }
                let (chunks, vectors): (Vec<Chunk>, Vec<Vec<f32>>) = deduped.into_values().unzip();
                let expected: HashMap<String, f32> = chunks
                    .iter()
                    .zip(&vectors)
                    .map(|(c, v)| (c.id.clone(), cosine_similarity(&query, v)))
                    .collect();

                store.put_many(&chunks, &vectors).await.unwrap();
                let results = store.query(&query, k).await.unwrap();
                (results, chunks.len(), expected)
            });

            prop_assert_eq!(results.len(), k.min(unique_count));

            for window in results.windows(2) {
                prop_assert!(
                    window[0].score >= window[1].score,
                    "results not in descending order: {} < {}",
                    window[0].score,
                    window[1].score,
                );
            }

            for result in &results {
                let score = expected[&result.chunk.id];
                prop_assert!((result.score - score).abs() < 1e-5);
            }
        }
    }
}

/// **Property: writes survive a reopen and upserts never duplicate**
/// *For any* batch written twice, a fresh store over the same directory SHALL
/// count exactly the number of distinct ids.
mod prop_local_persistence {
    use super::*;

    const DIM: usize = 8;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(30))]

        #[test]
        fn reopened_store_counts_distinct_ids(
            entries in proptest::collection::vec(arb_entry(DIM), 1..12),
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let (count, distinct) = rt.block_on(async {
                let dir = tempfile::tempdir().unwrap();
                let (chunks, vectors): (Vec<Chunk>, Vec<Vec<f32>>) =
                    entries.iter().cloned().unzip();

                let store = LocalVectorStore::new(dir.path(), MODEL, DIM);
                store.put_many(&chunks, &vectors).await.unwrap();
                store.put_many(&chunks, &vectors).await.unwrap();

                let reopened = LocalVectorStore::new(dir.path(), MODEL, DIM);
                let count = reopened.count().await.unwrap();
                let distinct =
                    chunks.iter().map(|c| &c.id).collect::<std::collections::HashSet<_>>().len();
                (count, distinct)
            });
            prop_assert_eq!(count, distinct);
        }
    }
}
