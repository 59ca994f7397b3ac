//! Embedding providers: a local candle model and a deterministic hashed
//! embedder. `get_default_embedder` picks one from configuration.

pub mod device;
pub mod hashed;
pub mod model;
pub mod pool;
pub mod tokenize;

use std::path::Path;
use std::sync::Arc;
use tracing::info;

use storyrag_core::config::{EmbeddingBackend, EmbeddingConfig};
use storyrag_core::traits::EmbeddingProvider;
use storyrag_core::{Error, Result};

pub use hashed::HashedEmbedder;
pub use model::LocalEmbedder;
pub use pool::masked_mean_l2;

/// Build the configured provider and check it produces `dim`-sized vectors.
pub fn get_default_embedder(cfg: &EmbeddingConfig, dim: usize) -> Result<Arc<dyn EmbeddingProvider>> {
    let provider: Arc<dyn EmbeddingProvider> = match cfg.provider {
        EmbeddingBackend::Hashed => {
            info!(dim, "using hashed embedder");
            Arc::new(HashedEmbedder::new(dim))
        }
        EmbeddingBackend::Local => Arc::new(LocalEmbedder::load(Path::new(&cfg.model_dir), cfg.max_len)?),
    };
    if provider.dim() != dim {
        return Err(Error::InvalidConfig(format!(
            "embedder {} produces {} dims but rag.dimensionality is {}",
            provider.embedder_id(),
            provider.dim(),
            dim
        )));
    }
    Ok(provider)
}
