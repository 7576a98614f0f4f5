use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;

use crate::types::{CorpusEntry, EntryId, SourceTypeFilter};

pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;

    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("embedder returned no vector"))
    }
}

/// k-nearest-neighbour lookup in an external vector store. Scores are
/// cosine similarities, higher is better.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn nearest_neighbors(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&SourceTypeFilter>,
    ) -> anyhow::Result<Vec<(EntryId, f32)>>;
}

/// Read access to the current corpus plus a change signal. The receiver's
/// value is a generation counter bumped on every corpus change.
pub trait CorpusProvider: Send + Sync {
    fn entries(&self) -> Arc<Vec<CorpusEntry>>;
    fn subscribe(&self) -> watch::Receiver<u64>;
}

/// Pairwise query/document relevance model. Inference is not reentrant,
/// hence `&mut self`; callers serialize access.
pub trait CrossEncoder: Send {
    fn model_id(&self) -> &str;
    fn score_batch(&mut self, query: &str, documents: &[String]) -> anyhow::Result<Vec<f32>>;
}
