use candle_core::{Device, Tensor};
use storyrag_core::{Error, Result};
use tokenizers::Tokenizer;

/// Encode one text into `(input_ids, attention_mask)` of shape `[1, T]`, `T <= max_len`.
pub fn tokenize_on_device(tokenizer: &Tokenizer, text: &str, max_len: usize, device: &Device) -> Result<(Tensor, Tensor)> {
    let enc = tokenizer
        .encode(text, true)
        .map_err(|e| Error::EmbeddingUnavailable(format!("tokenization failed: {e}")))?;
    let mut ids = enc.get_ids().to_vec();
    let mut mask = enc.get_attention_mask().to_vec();
    if ids.len() > max_len { ids.truncate(max_len); mask.truncate(max_len); }
    let len = ids.len();
    let to_tensor = |v: Vec<u32>| Tensor::from_vec(v, (1, len), device).map_err(|e| Error::EmbeddingUnavailable(e.to_string()));
    Ok((to_tensor(ids)?, to_tensor(mask)?))
}
