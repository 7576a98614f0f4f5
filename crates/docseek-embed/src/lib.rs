//! docseek-embed
//!
//! Model-backed implementations of the embedding and cross-encoder traits
//! (candle, XLM-RoBERTa family), plus deterministic fakes selected with
//! `APP_USE_FAKE_EMBEDDINGS=1` / `APP_USE_FAKE_RERANKER=1`.
use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use tracing::info;

use docseek_core::traits::{CrossEncoder, Embedder};

mod device;
mod fake;
mod model;
mod pool;
mod tokenize;

pub use fake::{FakeCrossEncoder, FakeEmbedder};
pub use model::{CrossEncoderModel, EmbeddingModel};
pub use pool::masked_mean_l2;

pub const FAKE_EMBEDDING_DIM: usize = 1024;

fn env_flag(name: &str) -> bool {
    std::env::var(name).ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false)
}

pub fn get_default_embedder(model_dir: Option<&Path>) -> Result<Box<dyn Embedder>> {
    if env_flag("APP_USE_FAKE_EMBEDDINGS") {
        info!(dim = FAKE_EMBEDDING_DIM, "using fake embedder");
        return Ok(Box::new(FakeEmbedder::new(FAKE_EMBEDDING_DIM)));
    }
    let dir = resolve_model_dir(model_dir, "APP_MODEL_DIR", "bge-m3")?;
    Ok(Box::new(EmbeddingModel::load(&dir)?))
}

pub fn get_default_cross_encoder(model_dir: Option<&Path>) -> Result<Box<dyn CrossEncoder>> {
    if env_flag("APP_USE_FAKE_RERANKER") {
        info!("using fake cross-encoder");
        return Ok(Box::new(FakeCrossEncoder));
    }
    let dir = resolve_model_dir(model_dir, "APP_RERANK_MODEL_DIR", "bge-reranker-v2-m3")?;
    Ok(Box::new(CrossEncoderModel::load(&dir)?))
}

/// Locate a model directory: configured path, then `env_var`, then
/// `../models/<name>` and `models/<name>`.
pub fn resolve_model_dir(configured: Option<&Path>, env_var: &str, name: &str) -> Result<PathBuf> {
    if let Some(p) = configured {
        if p.exists() { return Ok(p.to_path_buf()); }
        return Err(anyhow!("Configured model directory {} does not exist", p.display()));
    }
    if let Ok(dir) = std::env::var(env_var) {
        let p = PathBuf::from(&dir);
        if p.exists() {
            info!(source = env_var, dir = %p.display(), "using model dir");
            return Ok(p);
        }
    }
    for candidate in [Path::new("../models").join(name), Path::new("models").join(name)] {
        if candidate.exists() {
            info!(dir = %candidate.display(), "using model dir");
            return Ok(candidate);
        }
    }
    Err(anyhow!("Could not locate model directory for {}", name))
}
