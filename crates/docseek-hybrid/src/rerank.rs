//! Cross-encoder rerank stage and the process-wide model handle.
use std::sync::{Arc, RwLock};

use tokio::sync::{oneshot, Mutex};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use docseek_core::traits::CrossEncoder;
use docseek_core::types::{FusedCandidate, Outcome, Stage};

pub type SharedModel = Arc<Mutex<Box<dyn CrossEncoder>>>;

/// Swappable slot for the cross-encoder. A query clones the `Arc` it starts
/// with, so swaps never affect in-flight work. The inner mutex queues
/// callers: inference runs one batch stream at a time.
#[derive(Default)]
pub struct RerankerHandle {
    slot: RwLock<Option<SharedModel>>,
}

impl RerankerHandle {
    pub fn new() -> Self { Self::default() }

    pub fn with_model(model: Box<dyn CrossEncoder>) -> Self {
        let handle = Self::new();
        handle.install(model);
        handle
    }

    pub fn install(&self, model: Box<dyn CrossEncoder>) {
        let id = model.model_id().to_string();
        *self.slot.write().unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(Mutex::new(model)));
        info!(model = %id, "reranker installed");
    }

    /// Drop the model; returns whether one was loaded.
    pub fn unload(&self) -> bool {
        let was = self.slot.write().unwrap_or_else(|e| e.into_inner()).take().is_some();
        if was { info!("reranker unloaded"); }
        was
    }

    /// Load a replacement on the blocking pool and install it. The current
    /// model keeps serving until the swap; a failed load leaves it in place.
    pub async fn reload_with<F>(&self, loader: F) -> anyhow::Result<()>
    where
        F: FnOnce() -> anyhow::Result<Box<dyn CrossEncoder>> + Send + 'static,
    {
        let model = tokio::task::spawn_blocking(loader).await??;
        self.install(model);
        Ok(())
    }

    pub fn current(&self) -> Option<SharedModel> {
        self.slot.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_loaded(&self) -> bool { self.current().is_some() }
}

/// A candidate after the rerank stage.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub candidate: FusedCandidate,
    pub rerank_score: Option<f32>,
    pub score: f32,
}

impl ScoredCandidate {
    fn passthrough(candidate: FusedCandidate) -> Self {
        let score = candidate.fused_score;
        Self { candidate, rerank_score: None, score }
    }
}

pub struct RerankRequest<'a> {
    pub query: &'a str,
    pub weight: f32,
    pub batch_size: usize,
    pub deadline: Instant,
}

/// Pass-through used when reranking is off: order and scores unchanged.
pub fn skip(candidates: Vec<FusedCandidate>) -> Vec<ScoredCandidate> {
    candidates.into_iter().map(ScoredCandidate::passthrough).collect()
}

/// Score `candidates` (paired with their `documents`) with the installed
/// cross-encoder and reorder by `weight * rerank + (1 - weight) * fused`.
///
/// Only the given candidates are returned. Any failure (no model, error,
/// wrong score count, deadline) returns them in fused order, degraded.
pub async fn rerank(
    handle: &RerankerHandle,
    req: RerankRequest<'_>,
    candidates: Vec<FusedCandidate>,
    documents: Vec<String>,
) -> Outcome<Vec<ScoredCandidate>> {
    if candidates.is_empty() {
        return Outcome::Ok(Vec::new());
    }
    let Some(model) = handle.current() else {
        return Outcome::degraded(Stage::Rerank, "reranker model not loaded", skip(candidates));
    };

    let (tx, rx) = oneshot::channel();
    let query = req.query.to_string();
    let batch_size = req.batch_size.max(1);
    let queued = Instant::now();
    let scoring = async move {
        let mut guard = model.lock_owned().await;
        debug!(waited_ms = queued.elapsed().as_millis() as u64, "reranker acquired");
        let join = tokio::task::spawn_blocking(move || {
            let mut scores = Vec::with_capacity(documents.len());
            for batch in documents.chunks(batch_size) {
                // caller gave up; release the model
                if tx.is_closed() { return; }
                match guard.score_batch(&query, batch) {
                    Ok(s) => scores.extend(s),
                    Err(e) => {
                        let _ = tx.send(Err(e));
                        return;
                    }
                }
            }
            let _ = tx.send(Ok(scores));
        });
        drop(join);
        rx.await
    };

    let scores = match tokio::time::timeout_at(req.deadline, scoring).await {
        Ok(Ok(Ok(scores))) => scores,
        Ok(Ok(Err(e))) => {
            warn!(error = %format!("{e:#}"), "reranker failed");
            return Outcome::degraded(Stage::Rerank, format!("reranker failed: {e:#}"), skip(candidates));
        }
        Ok(Err(_)) => return Outcome::degraded(Stage::Rerank, "reranker task ended without scores", skip(candidates)),
        Err(_) => {
            warn!("reranker timed out");
            return Outcome::degraded(Stage::Rerank, "reranker timed out", skip(candidates));
        }
    };
    if scores.len() != candidates.len() || scores.iter().any(|s| !s.is_finite()) {
        return Outcome::degraded(
            Stage::Rerank,
            format!("reranker returned {} usable scores for {} candidates", scores.len(), candidates.len()),
            skip(candidates),
        );
    }

    let w = req.weight;
    let mut out: Vec<ScoredCandidate> = candidates
        .into_iter()
        .zip(scores)
        .map(|(c, r)| {
            let score = w * r + (1.0 - w) * c.fused_score;
            ScoredCandidate { candidate: c, rerank_score: Some(r), score }
        })
        .collect();
    out.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| crate::fusion::compare_fused(&a.candidate, &b.candidate))
    });
    Outcome::Ok(out)
}
