use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use docseek_core::traits::CorpusProvider;
use docseek_core::types::{CorpusEntry, Outcome, Stage};

use crate::bm25::{Bm25Params, LexicalIndex};

/// Shared slot holding the current lexical snapshot.
///
/// Readers clone the `Arc` and keep using it while a rebuild runs; a new
/// snapshot is published with a single write, and never replaces a newer
/// generation.
pub struct LexicalIndexHandle {
	params: Bm25Params,
	stop_words: bool,
	current: RwLock<Option<Arc<LexicalIndex>>>,
	build_lock: Mutex<()>,
}

impl LexicalIndexHandle {
	pub fn new(params: Bm25Params, stop_words: bool) -> Self {
		Self { params, stop_words, current: RwLock::new(None), build_lock: Mutex::new(()) }
	}

	pub async fn current(&self) -> Option<Arc<LexicalIndex>> { self.current.read().await.clone() }

	/// Build a snapshot for `generation` on the blocking pool and publish it.
	/// Builds are serialized; a request for a generation that is already
	/// installed returns the installed snapshot.
	pub async fn rebuild(&self, generation: u64, entries: Arc<Vec<CorpusEntry>>) -> anyhow::Result<Arc<LexicalIndex>> {
		let _guard = self.build_lock.lock().await;
		if let Some(cur) = self.current().await {
			if cur.generation() >= generation {
				return Ok(cur);
			}
		}
		let (params, stop_words) = (self.params, self.stop_words);
		let started = Instant::now();
		let index = tokio::task::spawn_blocking(move || LexicalIndex::build(generation, &entries, params, stop_words))
			.await
			.context("lexical index build task failed")?;
		let index = Arc::new(index);
		if self.install(Arc::clone(&index)).await {
			info!(generation, entries = index.len(), elapsed_ms = started.elapsed().as_millis() as u64, "lexical index published");
		}
		Ok(index)
	}

	/// Build from the provider's current state.
	pub async fn warm(&self, provider: &dyn CorpusProvider) -> anyhow::Result<Arc<LexicalIndex>> {
		let generation = *provider.subscribe().borrow();
		self.rebuild(generation, provider.entries()).await
	}

	/// The current snapshot, or a cold-start build bounded by `timeout`.
	///
	/// On timeout the build keeps running in the background and publishes
	/// itself when done; the caller gets a degraded `None`.
	pub async fn get_or_build(self: &Arc<Self>, provider: Arc<dyn CorpusProvider>, timeout: Duration) -> Outcome<Option<Arc<LexicalIndex>>> {
		if let Some(index) = self.current().await {
			return Outcome::Ok(Some(index));
		}
		let handle = Arc::clone(self);
		let build = tokio::spawn(async move { handle.warm(provider.as_ref()).await });
		match tokio::time::timeout(timeout, build).await {
			Ok(Ok(Ok(index))) => Outcome::Ok(Some(index)),
			Ok(Ok(Err(e))) => {
				warn!(error = %format!("{e:#}"), "lexical index build failed");
				Outcome::degraded(Stage::Lexical, format!("lexical index build failed: {e:#}"), None)
			}
			Ok(Err(e)) => {
				warn!(error = %e, "lexical index build task aborted");
				Outcome::degraded(Stage::Lexical, format!("lexical index build aborted: {e}"), None)
			}
			Err(_) => {
				debug!(timeout_ms = timeout.as_millis() as u64, "lexical index not ready, continuing in background");
				Outcome::degraded(Stage::Lexical, format!("lexical index not ready after {} ms", timeout.as_millis()), None)
			}
		}
	}

	async fn install(&self, index: Arc<LexicalIndex>) -> bool {
		let mut slot = self.current.write().await;
		if let Some(cur) = slot.as_ref() {
			if cur.generation() > index.generation() {
				debug!(current = cur.generation(), stale = index.generation(), "dropping stale lexical snapshot");
				return false;
			}
		}
		*slot = Some(index);
		true
	}
}
