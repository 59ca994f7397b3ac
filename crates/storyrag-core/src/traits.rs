//! Seams between the retrieval core and its collaborators.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ChunkId, Meta, SearchHit};

/// Maps text to a fixed-length vector. Failures surface as
/// `Error::EmbeddingUnavailable`.
pub trait EmbeddingProvider: Send + Sync {
    /// Stable identifier for the provider/model (e.g. `hashed:d384`).
    fn embedder_id(&self) -> &str;
    /// Embedding dimensionality.
    fn dim(&self) -> usize;
    fn embed(&self, text: &str) -> Result<Vec<f32>>;
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

/// k-nearest-neighbor store over fixed-dimension vectors.
///
/// Implementations rank by descending cosine similarity and break ties by
/// insertion order. An approximate implementation may sit behind this trait
/// as long as its recall loss is documented.
pub trait VectorIndex: Send + Sync {
    fn dim(&self) -> usize;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn contains(&self, id: &ChunkId) -> bool;
    /// Append, or replace in place when `id` already exists.
    fn insert(&self, id: &ChunkId, vector: &[f32], metadata: &Meta) -> Result<()>;
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>>;
    /// Like `search`, restricted to entries whose metadata contains every
    /// key/value pair of `filter`.
    fn search_filtered(&self, query: &[f32], k: usize, filter: &Meta) -> Result<Vec<SearchHit>>;
}

/// Text completion backend.
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Whether `complete` returns the prompt followed by the continuation.
    fn echoes_prompt(&self) -> bool;
    /// Provider-specific sentinel tokens to strip from raw output.
    fn control_tokens(&self) -> Vec<String> {
        Vec::new()
    }
    /// May return truncated text when `max_tokens` is reached; that is not an error.
    async fn complete(&self, prompt: &str, max_tokens: usize) -> Result<String>;
}
