//! Sentence-embedding model (BERT family, e.g. `all-MiniLM-L6-v2`) on candle.

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use storyrag_core::traits::EmbeddingProvider;
use storyrag_core::{Error, Result};

use crate::device::select_device;
use crate::pool::masked_mean_l2;
use crate::tokenize::tokenize_on_device;

fn unavailable<E: std::fmt::Display>(e: E) -> Error {
    Error::EmbeddingUnavailable(e.to_string())
}

pub struct LocalEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    dim: usize,
    max_len: usize,
    id: String,
}

impl LocalEmbedder {
    /// Load `config.json`, `tokenizer.json` and `model.safetensors`
    /// (or `pytorch_model.bin`) from `model_dir`.
    pub fn load(model_dir: &Path, max_len: usize) -> Result<Self> {
        let device = select_device();
        info!(model_dir = %model_dir.display(), "loading embedding model");

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| Error::EmbeddingUnavailable(format!("failed to load tokenizer from {}: {}", tokenizer_path.display(), e)))?;

        let config_path = model_dir.join("config.json");
        let raw = std::fs::read_to_string(&config_path)
            .map_err(|e| Error::EmbeddingUnavailable(format!("failed to read {}: {}", config_path.display(), e)))?;
        let config: BertConfig = serde_json::from_str(&raw).map_err(unavailable)?;
        let dim = serde_json::from_str::<serde_json::Value>(&raw)
            .map_err(unavailable)?
            .get("hidden_size")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| Error::EmbeddingUnavailable(format!("{} has no hidden_size", config_path.display())))? as usize;

        let vb = load_weights(model_dir, &device)?;
        let model = BertModel::load(vb, &config).map_err(unavailable)?;
        let name = model_dir.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_else(|| "model".into());
        info!(dim, "embedding model loaded");
        Ok(Self { model, tokenizer, device, dim, max_len, id: format!("local:{name}:d{dim}") })
    }

    fn forward(&self, text: &str) -> Result<Vec<f32>> {
        let start = Instant::now();
        let (input_ids, attention_mask) = tokenize_on_device(&self.tokenizer, text, self.max_len, &self.device)?;
        let token_type_ids = input_ids.zeros_like().map_err(unavailable)?;
        let hidden = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))
            .map_err(unavailable)?;
        let pooled = masked_mean_l2(&hidden, &attention_mask).map_err(unavailable)?;
        let emb: Vec<f32> = pooled
            .to_device(&Device::Cpu)
            .and_then(|t| t.to_dtype(DType::F32))
            .and_then(|t| t.squeeze(0))
            .and_then(|t| t.to_vec1())
            .map_err(unavailable)?;
        if emb.len() != self.dim {
            return Err(Error::EmbeddingUnavailable(format!("model produced {} dims, expected {}", emb.len(), self.dim)));
        }
        let elapsed_ms = start.elapsed().as_millis();
        if elapsed_ms > 100 { warn!(elapsed_ms, "slow embedding"); } else { debug!(elapsed_ms, "embedded text"); }
        Ok(emb)
    }
}

fn load_weights(model_dir: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    let safetensors = model_dir.join("model.safetensors");
    if safetensors.exists() {
        // SAFETY: the weights file is not modified while the model is alive.
        return unsafe { VarBuilder::from_mmaped_safetensors(&[safetensors], DType::F32, device) }.map_err(unavailable);
    }
    let bin: PathBuf = model_dir.join("pytorch_model.bin");
    if bin.exists() {
        let weights = candle_core::pickle::read_all(&bin).map_err(unavailable)?;
        let weights_map: HashMap<String, Tensor> = weights.into_iter().collect();
        return Ok(VarBuilder::from_tensors(weights_map, DType::F32, device));
    }
    Err(Error::EmbeddingUnavailable(format!("no model weights found in {}", model_dir.display())))
}

impl EmbeddingProvider for LocalEmbedder {
    fn embedder_id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { self.dim }
    fn embed(&self, text: &str) -> Result<Vec<f32>> { self.forward(text) }
}
