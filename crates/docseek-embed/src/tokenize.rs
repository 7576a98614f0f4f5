use anyhow::{anyhow, Result};
use candle_core::{DType, Device, Tensor};
use tokenizers::{Encoding, Tokenizer, TruncationParams};

/// XLM-RoBERTa `<pad>` id.
const PAD_ID: u32 = 1;

pub struct Batch {
    pub input_ids: Tensor,
    pub attention_mask: Tensor,
    pub token_type_ids: Tensor,
}

pub fn load_tokenizer(path: &std::path::Path, max_len: usize) -> Result<Tokenizer> {
    let mut tokenizer = Tokenizer::from_file(path)
        .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", path.display(), e))?;
    tokenizer
        .with_truncation(Some(TruncationParams { max_length: max_len, ..Default::default() }))
        .map_err(|e| anyhow!("Failed to configure truncation: {}", e))?;
    Ok(tokenizer)
}

pub fn encode_texts(tokenizer: &Tokenizer, texts: &[String], max_len: usize, device: &Device) -> Result<Batch> {
    let encodings = texts
        .iter()
        .map(|t| tokenizer.encode(t.as_str(), true).map_err(|e| anyhow!("Tokenization failed: {}", e)))
        .collect::<Result<Vec<_>>>()?;
    pad_batch(&encodings, max_len, device)
}

/// Encode `(query, document)` pairs for a cross-encoder.
pub fn encode_pairs(tokenizer: &Tokenizer, query: &str, documents: &[String], max_len: usize, device: &Device) -> Result<Batch> {
    let encodings = documents
        .iter()
        .map(|d| tokenizer.encode((query, d.as_str()), true).map_err(|e| anyhow!("Tokenization failed: {}", e)))
        .collect::<Result<Vec<_>>>()?;
    pad_batch(&encodings, max_len, device)
}

/// Right-pad to the longest sequence in the batch (capped at `max_len`).
fn pad_batch(encodings: &[Encoding], max_len: usize, device: &Device) -> Result<Batch> {
    let len = encodings.iter().map(|e| e.get_ids().len().min(max_len)).max().unwrap_or(1).max(1);
    let rows = encodings.len();
    let mut ids = Vec::with_capacity(rows * len);
    let mut mask = Vec::with_capacity(rows * len);
    for enc in encodings {
        let n = enc.get_ids().len().min(len);
        ids.extend_from_slice(&enc.get_ids()[..n]);
        mask.extend_from_slice(&enc.get_attention_mask()[..n]);
        let pad = len - n;
        ids.extend(std::iter::repeat(PAD_ID).take(pad));
        mask.extend(std::iter::repeat(0u32).take(pad));
    }
    Ok(Batch {
        input_ids: Tensor::from_vec(ids, (rows, len), device)?,
        attention_mask: Tensor::from_vec(mask, (rows, len), device)?,
        // XLM-RoBERTa has a single token type
        token_type_ids: Tensor::zeros((rows, len), DType::U32, device)?,
    })
}
