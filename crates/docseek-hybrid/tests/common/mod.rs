#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use docseek_core::config::Settings;
use docseek_core::corpus::MemoryCorpus;
use docseek_core::traits::{CorpusProvider, CrossEncoder, VectorStore};
use docseek_core::types::{CorpusEntry, EntryId, SourceTypeFilter};
use docseek_embed::FakeEmbedder;
use docseek_hybrid::SearchEngine;

pub fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.search.vector_backoff_ms = 1;
    settings
}

pub fn engine_with(entries: Vec<CorpusEntry>, store: Arc<dyn VectorStore>, settings: Settings) -> SearchEngine {
    let provider: Arc<dyn CorpusProvider> = Arc::new(MemoryCorpus::new(entries));
    SearchEngine::new(settings, provider, Arc::new(FakeEmbedder::new(32)), store)
}

/// Returns the same hits for every query, counting calls.
pub struct FixedStore {
    pub hits: Vec<(EntryId, f32)>,
    pub calls: AtomicUsize,
}

impl FixedStore {
    pub fn new(hits: &[(&str, f32)]) -> Arc<Self> {
        Arc::new(Self { hits: hits.iter().map(|(id, s)| (id.to_string(), *s)).collect(), calls: AtomicUsize::new(0) })
    }

    pub fn calls(&self) -> usize { self.calls.load(Ordering::SeqCst) }
}

#[async_trait]
impl VectorStore for FixedStore {
    async fn nearest_neighbors(&self, _query: &[f32], k: usize, _filter: Option<&SourceTypeFilter>) -> anyhow::Result<Vec<(EntryId, f32)>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.hits.iter().take(k).cloned().collect())
    }
}

/// Fails the first `failures` calls, then behaves like `FixedStore`.
pub struct FlakyStore {
    pub failures: usize,
    pub inner: Arc<FixedStore>,
}

#[async_trait]
impl VectorStore for FlakyStore {
    async fn nearest_neighbors(&self, query: &[f32], k: usize, filter: Option<&SourceTypeFilter>) -> anyhow::Result<Vec<(EntryId, f32)>> {
        let n = self.inner.calls.load(Ordering::SeqCst);
        if n < self.failures {
            self.inner.calls.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("connection refused");
        }
        self.inner.nearest_neighbors(query, k, filter).await
    }
}

pub struct SlowStore(pub Duration);

#[async_trait]
impl VectorStore for SlowStore {
    async fn nearest_neighbors(&self, _query: &[f32], _k: usize, _filter: Option<&SourceTypeFilter>) -> anyhow::Result<Vec<(EntryId, f32)>> {
        tokio::time::sleep(self.0).await;
        Ok(Vec::new())
    }
}

/// Cross-encoder driven by a scoring function over the document text.
pub struct ScriptedEncoder {
    pub score: Box<dyn Fn(&str) -> f32 + Send>,
    pub delay: Duration,
    pub calls: Arc<AtomicUsize>,
    pub active: Arc<AtomicUsize>,
    pub max_active: Arc<AtomicUsize>,
}

impl ScriptedEncoder {
    pub fn new(score: impl Fn(&str) -> f32 + Send + 'static) -> Self {
        Self {
            score: Box::new(score),
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl CrossEncoder for ScriptedEncoder {
    fn model_id(&self) -> &str { "scripted" }

    fn score_batch(&mut self, _query: &str, documents: &[String]) -> anyhow::Result<Vec<f32>> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let scores = documents.iter().map(|d| (self.score)(d)).collect();
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(scores)
    }
}

pub struct BrokenEncoder {
    pub short: bool,
}

impl CrossEncoder for BrokenEncoder {
    fn model_id(&self) -> &str { "broken" }

    fn score_batch(&mut self, _query: &str, documents: &[String]) -> anyhow::Result<Vec<f32>> {
        if self.short {
            return Ok(vec![0.5; documents.len().saturating_sub(1)]);
        }
        anyhow::bail!("device lost")
    }
}

pub fn ids(results: &[docseek_core::types::RankedResult]) -> Vec<String> {
    results.iter().map(|r| r.id.clone()).collect()
}
