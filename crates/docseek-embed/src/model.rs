use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{
    Config as XLMRobertaConfig, XLMRobertaForSequenceClassification, XLMRobertaModel,
};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use docseek_core::traits::{CrossEncoder, Embedder};

use crate::device::select_device;
use crate::pool::masked_mean_l2;
use crate::tokenize::{encode_pairs, encode_texts, load_tokenizer};

const EMBED_MAX_LEN: usize = 256;
const RERANK_MAX_LEN: usize = 512;

struct Loaded {
    config: XLMRobertaConfig,
    tokenizer: Tokenizer,
    device: Device,
}

fn load_parts(model_dir: &Path, max_len: usize) -> Result<(Loaded, VarBuilder<'static>)> {
    let device = select_device();
    let tokenizer = load_tokenizer(&model_dir.join("tokenizer.json"), max_len)?;
    let config_path = model_dir.join("config.json");
    let raw = std::fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read {}", config_path.display()))?;
    let config: XLMRobertaConfig = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse {}", config_path.display()))?;

    let safetensors = model_dir.join("model.safetensors");
    let vb = if safetensors.exists() {
        // SAFETY: the weights file is not modified while mapped.
        unsafe { VarBuilder::from_mmaped_safetensors(&[safetensors], DType::F32, &device)? }
    } else {
        let weights_path = model_dir.join("pytorch_model.bin");
        let weights = candle_core::pickle::read_all(&weights_path)
            .with_context(|| format!("Failed to read weights {}", weights_path.display()))?;
        let weights_map: HashMap<String, Tensor> = weights.into_iter().collect();
        VarBuilder::from_tensors(weights_map, DType::F32, &device)
    };
    Ok((Loaded { config, tokenizer, device }, vb))
}

/// Dense embedder: XLM-RoBERTa encoder (BGE-M3 weights) with masked mean
/// pooling and L2 normalization.
pub struct EmbeddingModel {
    model: XLMRobertaModel,
    tokenizer: Tokenizer,
    device: Device,
    dim: usize,
}

impl EmbeddingModel {
    pub fn load(model_dir: &Path) -> Result<Self> {
        let started = Instant::now();
        let (Loaded { config, tokenizer, device }, vb) = load_parts(model_dir, EMBED_MAX_LEN)?;
        let model = XLMRobertaModel::new(&config, vb).map_err(|e| anyhow!("Failed to build embedding model: {}", e))?;
        info!(dir = %model_dir.display(), dim = config.hidden_size, elapsed_ms = started.elapsed().as_millis() as u64, "embedding model loaded");
        Ok(Self { model, tokenizer, device, dim: config.hidden_size })
    }
}

impl Embedder for EmbeddingModel {
    fn dim(&self) -> usize { self.dim }

    fn max_len(&self) -> usize { EMBED_MAX_LEN }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let start = Instant::now();
        let batch = encode_texts(&self.tokenizer, texts, EMBED_MAX_LEN, &self.device)?;
        let hidden = self.model.forward(&batch.input_ids, &batch.attention_mask, &batch.token_type_ids, None, None, None)?;
        let pooled = masked_mean_l2(&hidden, &batch.attention_mask)?;
        let out: Vec<Vec<f32>> = pooled.to_device(&Device::Cpu)?.to_dtype(DType::F32)?.to_vec2()?;
        let elapsed = start.elapsed().as_millis() as u64;
        if elapsed > 100 * texts.len() as u64 {
            warn!(elapsed_ms = elapsed, batch = texts.len(), "slow embedding");
        } else {
            debug!(elapsed_ms = elapsed, batch = texts.len(), "embedded batch");
        }
        Ok(out)
    }
}

/// Cross-encoder reranker: XLM-RoBERTa with a single-logit classification
/// head (bge-reranker weights); relevance is the sigmoid of the logit.
pub struct CrossEncoderModel {
    id: String,
    model: XLMRobertaForSequenceClassification,
    tokenizer: Tokenizer,
    device: Device,
}

impl CrossEncoderModel {
    pub fn load(model_dir: &Path) -> Result<Self> {
        let started = Instant::now();
        let (Loaded { config, tokenizer, device }, vb) = load_parts(model_dir, RERANK_MAX_LEN)?;
        let model = XLMRobertaForSequenceClassification::new(1, &config, vb)
            .map_err(|e| anyhow!("Failed to build cross-encoder: {}", e))?;
        let id = model_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| model_dir.display().to_string());
        info!(model = %id, elapsed_ms = started.elapsed().as_millis() as u64, "cross-encoder loaded");
        Ok(Self { id, model, tokenizer, device })
    }
}

impl CrossEncoder for CrossEncoderModel {
    fn model_id(&self) -> &str { &self.id }

    fn score_batch(&mut self, query: &str, documents: &[String]) -> Result<Vec<f32>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        let batch = encode_pairs(&self.tokenizer, query, documents, RERANK_MAX_LEN, &self.device)?;
        let logits = self.model.forward(&batch.input_ids, &batch.attention_mask, &batch.token_type_ids)?;
        let scores = candle_nn::ops::sigmoid(&logits.to_dtype(DType::F32)?)?
            .flatten_all()?
            .to_device(&Device::Cpu)?
            .to_vec1::<f32>()?;
        Ok(scores)
    }
}
