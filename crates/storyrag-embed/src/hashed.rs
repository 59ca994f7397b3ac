//! Deterministic token-hash embedder for tests and development.

use std::hash::Hasher;
use twox_hash::XxHash64;

use storyrag_core::traits::EmbeddingProvider;
use storyrag_core::Result;

/// Bag-of-words vectors: each lowercase token is hashed into a bucket with a
/// hash-derived weight, then the vector is L2-normalized. Texts that share
/// words have positive cosine similarity.
pub struct HashedEmbedder {
    dim: usize,
    id: String,
}

impl HashedEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim, id: format!("hashed:d{dim}") }
    }
}

impl EmbeddingProvider for HashedEmbedder {
    fn embedder_id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { self.dim }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = vec![0f32; self.dim];
        let lower = text.to_lowercase();
        for token in lower.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
            let mut hasher = XxHash64::with_seed(0);
            hasher.write(token.as_bytes());
            let h = hasher.finish();
            let idx = (h % self.dim as u64) as usize;
            let val = 0.5 + ((h >> 32) as u32 as f32) / (u32::MAX as f32);
            v[idx] += val;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
        for x in &mut v { *x /= norm; }
        Ok(v)
    }
}
