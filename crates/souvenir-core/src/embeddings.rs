//! The embedding provider seam (spec §6 "Embedding provider contract").
//!
//! The engine never picks an embedding backend itself — callers inject one.
//! This module defines the trait, the pure cosine-similarity primitive
//! recall and compaction both depend on (grounded on
//! `embeddings::cosine_similarity` in the teacher crate), and — behind the
//! `embeddings` feature — a local ONNX-based reference implementation for
//! callers and tests that don't want to bring their own.

use async_trait::async_trait;

/// `embed(text) -> fixed-dim vector`; `dimensions()` must be constant across
/// a provider's lifetime (spec §3 "Invariants": mixing providers within a
/// store is a configuration error).
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;
    fn dimensions(&self) -> usize;
}

/// Cosine similarity between two equal-length vectors. Returns `0.0` for
/// mismatched lengths or a zero-magnitude vector rather than panicking —
/// recall treats a malformed/absent embedding as "no signal", not an error.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = (norm_a * norm_b).sqrt();
    if denom > 0.0 {
        dot / denom
    } else {
        0.0
    }
}

#[cfg(feature = "embeddings")]
pub mod local {
    //! Reference [`EmbeddingProvider`] backed by local ONNX inference
    //! (fastembed), grounded on `embeddings/local.rs`'s `EmbeddingService` in
    //! the teacher crate. Not required by the engine — purely a convenience
    //! for callers who don't already have an embedding backend.

    use std::sync::Mutex;

    use async_trait::async_trait;
    use fastembed::{InitOptions, TextEmbedding};

    use super::EmbeddingProvider;

    pub struct LocalEmbeddingProvider {
        model: Mutex<TextEmbedding>,
        dimensions: usize,
    }

    impl LocalEmbeddingProvider {
        pub fn try_new() -> anyhow::Result<Self> {
            let model = TextEmbedding::try_new(InitOptions::default())?;
            Ok(Self {
                model: Mutex::new(model),
                dimensions: 384,
            })
        }
    }

    #[async_trait]
    impl EmbeddingProvider for LocalEmbeddingProvider {
        async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
            let mut model = self.model.lock().expect("embedding model mutex poisoned");
            let mut embeddings = model.embed(vec![text.to_string()], None)?;
            Ok(embeddings.pop().unwrap_or_default())
        }

        fn dimensions(&self) -> usize {
            self.dimensions
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orthogonal_vectors_have_zero_similarity() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn identical_vectors_have_similarity_one() {
        let v = [0.3, 0.4, 0.5];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn mismatched_lengths_yield_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
    }

    #[test]
    fn zero_vector_yields_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }
}
