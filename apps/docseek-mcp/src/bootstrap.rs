//! Wires configuration, corpus, models and stores into a `SearchEngine`.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use docseek_core::config::{Config, Settings};
use docseek_core::corpus::MemoryCorpus;
use docseek_core::traits::{CorpusProvider, Embedder, VectorStore};
use docseek_embed::{get_default_cross_encoder, get_default_embedder};
use docseek_hybrid::SearchEngine;
use docseek_vector::{LanceVectorStore, MemoryVectorStore};

/// Engine plus the handles the binary keeps for reloads.
pub struct App {
    pub engine: Arc<SearchEngine>,
    pub corpus: Arc<MemoryCorpus>,
    pub corpus_path: PathBuf,
}

pub fn corpus_path(config: &Config, settings: &Settings) -> PathBuf {
    config.resolve_path(&settings.data.corpus_path)
}

pub fn load_embedder(config: &Config, settings: &Settings) -> Result<Arc<dyn Embedder>> {
    let dir = settings.data.embed_model_dir.as_ref().map(|d| config.resolve_path(d));
    let embedder = get_default_embedder(dir.as_deref()).context("Failed to load embedding model")?;
    Ok(Arc::from(embedder))
}

/// LanceDB when the configured directory exists, otherwise an in-memory
/// store seeded from the corpus.
pub async fn open_store(
    config: &Config,
    settings: &Settings,
    corpus: &MemoryCorpus,
    embedder: Arc<dyn Embedder>,
) -> Result<Arc<dyn VectorStore>> {
    let lance_dir = config.resolve_path(&settings.data.lancedb_dir);
    if lance_dir.exists() {
        let store = LanceVectorStore::open(&lance_dir, &settings.data.table, embedder.dim())
            .await
            .with_context(|| format!("Failed to open LanceDB at {}", lance_dir.display()))?;
        let rows = store.count().await?;
        info!(dir = %lance_dir.display(), table = %settings.data.table, rows, "using lancedb vector store");
        return Ok(Arc::new(store));
    }
    warn!(dir = %lance_dir.display(), "lancedb directory missing, embedding corpus into memory");
    let entries = corpus.entries();
    let store = tokio::task::spawn_blocking(move || MemoryVectorStore::from_entries(&entries, embedder.as_ref())).await??;
    Ok(Arc::new(store))
}

/// Build a warmed engine with its refresh listener running. A reranker that
/// fails to load is logged; queries then report the rerank stage degraded.
pub async fn build(config: &Config, embedder: Arc<dyn Embedder>) -> Result<App> {
    let settings = config.settings()?;
    let corpus_path = corpus_path(config, &settings);
    let corpus = Arc::new(MemoryCorpus::load_jsonl(&corpus_path)?);
    let store = open_store(config, &settings, &corpus, Arc::clone(&embedder)).await?;

    let provider: Arc<dyn CorpusProvider> = corpus.clone();
    let engine = Arc::new(SearchEngine::new(settings.clone(), provider, embedder, store));
    if settings.rerank.enabled {
        let dir = settings.rerank.model_dir.as_ref().map(|d| config.resolve_path(d));
        if let Err(e) = engine.reranker().reload_with(move || get_default_cross_encoder(dir.as_deref())).await {
            warn!(error = %format!("{e:#}"), "reranker unavailable");
        }
    }
    engine.warm().await.context("Failed to build lexical index")?;
    engine.spawn_refresh_listener();
    Ok(App { engine, corpus, corpus_path })
}

/// Re-read the corpus file and publish it; the refresh listener rebuilds.
pub fn reload_corpus(corpus: &MemoryCorpus, path: &Path) -> Result<usize> {
    let fresh = MemoryCorpus::load_jsonl(path)?;
    let entries = fresh.entries().as_ref().clone();
    let n = entries.len();
    corpus.replace(entries);
    Ok(n)
}

/// Reload the corpus file on SIGHUP.
#[cfg(unix)]
pub fn spawn_reload_on_hangup(corpus: Arc<MemoryCorpus>, path: PathBuf) -> Result<tokio::task::JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut hangups = signal(SignalKind::hangup()).context("Failed to install SIGHUP handler")?;
    Ok(tokio::spawn(async move {
        while hangups.recv().await.is_some() {
            match reload_corpus(&corpus, &path) {
                Ok(n) => info!(entries = n, "corpus reloaded"),
                Err(e) => warn!(error = %format!("{e:#}"), "corpus reload failed"),
            }
        }
    }))
}
