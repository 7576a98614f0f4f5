use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use docseek_core::traits::{Embedder, VectorStore};
use docseek_core::types::{EntryId, Outcome, SourceTypeFilter, Stage};

/// Dense retrieval: embeds the query and asks the vector store for the
/// nearest neighbours, retrying transient store failures with exponential
/// backoff. Exhausted retries yield an empty, degraded result.
pub struct VectorRetriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    attempts: u32,
    backoff: Duration,
}

impl VectorRetriever {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>, attempts: u32, backoff: Duration) -> Self {
        Self { embedder, store, attempts: attempts.max(1), backoff }
    }

    /// Embed `query` off the async runtime, then `retrieve`.
    pub async fn search(&self, query: &str, k: usize, filter: Option<&SourceTypeFilter>) -> Outcome<Vec<(EntryId, f32)>> {
        let embedder = Arc::clone(&self.embedder);
        let text = query.to_string();
        let embedding = match tokio::task::spawn_blocking(move || embedder.embed(&text)).await {
            Ok(Ok(v)) => v,
            Ok(Err(e)) => {
                warn!(error = %format!("{e:#}"), "query embedding failed");
                return Outcome::degraded(Stage::Vector, format!("query embedding failed: {e:#}"), Vec::new());
            }
            Err(e) => return Outcome::degraded(Stage::Vector, format!("query embedding task failed: {e}"), Vec::new()),
        };
        self.retrieve(&embedding, k, filter).await
    }

    pub async fn retrieve(&self, query_embedding: &[f32], k: usize, filter: Option<&SourceTypeFilter>) -> Outcome<Vec<(EntryId, f32)>> {
        let mut delay = self.backoff;
        let mut last_error = String::new();
        for attempt in 1..=self.attempts {
            match self.store.nearest_neighbors(query_embedding, k, filter).await {
                Ok(hits) => {
                    debug!(attempt, hits = hits.len(), "vector retrieval");
                    return Outcome::Ok(hits);
                }
                Err(e) => {
                    last_error = format!("{e:#}");
                    warn!(attempt, max = self.attempts, error = %last_error, "vector store call failed");
                    if attempt < self.attempts {
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                }
            }
        }
        Outcome::degraded(
            Stage::Vector,
            format!("vector store failed after {} attempts: {}", self.attempts, last_error),
            Vec::new(),
        )
    }
}
