//! Query dispatcher: validation, parallel retrieval, fusion, optional
//! reranking, then mode-specific enrichment and filtering.
use std::collections::{BTreeSet, HashSet};
use std::str::FromStr;
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use docseek_core::config::{LimitPolicy, Settings};
use docseek_core::corpus::IndexedCorpus;
use docseek_core::traits::{CorpusProvider, Embedder, VectorStore};
use docseek_core::types::{
    CorpusEntry, Degradation, EntryId, Outcome, RankedResult, SourceType, SourceTypeFilter, Stage,
};
use docseek_core::{Error, Result};
use docseek_text::{Bm25Params, LexicalIndex, LexicalIndexHandle};

use crate::attachment::{self, AttachmentFilter};
use crate::fusion::fuse;
use crate::hierarchy::{self, HierarchyFilter, HierarchyGroup};
use crate::rerank::{self, RerankRequest, RerankerHandle, ScoredCandidate};
use crate::retriever::VectorRetriever;

/// Parameters shared by every search mode.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub source_types: Vec<String>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self { query: query.into(), ..Self::default() }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn source_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.source_types = types.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchMode {
    Hybrid,
    Hierarchy { filter: HierarchyFilter, organize: bool },
    Attachment(AttachmentFilter),
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchResponse {
    pub results: Vec<RankedResult>,
    pub degraded: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub degraded_stages: Vec<Degradation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<HierarchyGroup>>,
}

impl SearchResponse {
    fn degrade(&mut self, d: Degradation) {
        self.degraded = true;
        self.degraded_stages.push(d);
    }
}

enum Retrieved {
    Vector(Outcome<Vec<(EntryId, f32)>>),
    Lexical(Outcome<Vec<(EntryId, f32)>>, Option<Arc<LexicalIndex>>),
}

pub struct SearchEngine {
    settings: Settings,
    provider: Arc<dyn CorpusProvider>,
    corpus: RwLock<Arc<IndexedCorpus>>,
    lexical: Arc<LexicalIndexHandle>,
    retriever: Arc<VectorRetriever>,
    reranker: Arc<RerankerHandle>,
}

impl SearchEngine {
    pub fn new(
        settings: Settings,
        provider: Arc<dyn CorpusProvider>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        let generation = *provider.subscribe().borrow();
        let corpus = IndexedCorpus::build(generation, &provider.entries());
        let s = &settings.search;
        let lexical = LexicalIndexHandle::new(Bm25Params { k1: s.bm25_k1, b: s.bm25_b }, s.stop_words);
        let retriever = VectorRetriever::new(embedder, store, s.vector_attempts, Duration::from_millis(s.vector_backoff_ms));
        Self {
            settings,
            provider,
            corpus: RwLock::new(Arc::new(corpus)),
            lexical: Arc::new(lexical),
            retriever: Arc::new(retriever),
            reranker: Arc::new(RerankerHandle::new()),
        }
    }

    pub fn settings(&self) -> &Settings { &self.settings }

    pub fn reranker(&self) -> &Arc<RerankerHandle> { &self.reranker }

    pub fn lexical(&self) -> &Arc<LexicalIndexHandle> { &self.lexical }

    pub async fn corpus(&self) -> Arc<IndexedCorpus> { self.corpus.read().await.clone() }

    /// Build the lexical snapshot now instead of on the first query.
    pub async fn warm(&self) -> anyhow::Result<()> {
        self.lexical.warm(self.provider.as_ref()).await.map(|_| ())
    }

    /// Rebuild the corpus view and lexical snapshot from the provider's
    /// current state; older generations never replace newer ones.
    pub async fn refresh(&self) -> anyhow::Result<()> {
        let generation = *self.provider.subscribe().borrow();
        let entries = self.provider.entries();
        let for_view = Arc::clone(&entries);
        let view = tokio::task::spawn_blocking(move || IndexedCorpus::build(generation, &for_view)).await?;
        {
            let mut slot = self.corpus.write().await;
            if view.generation() >= slot.generation() {
                *slot = Arc::new(view);
            }
        }
        self.lexical.rebuild(generation, entries).await?;
        info!(generation, "corpus refreshed");
        Ok(())
    }

    /// Rebuild on every corpus change notification. The task ends when the
    /// provider drops its sender or the engine is dropped.
    pub fn spawn_refresh_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        let mut rx = self.provider.subscribe();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let generation = *rx.borrow_and_update();
                let Some(engine) = weak.upgrade() else { break };
                debug!(generation, "corpus change notification");
                if let Err(e) = engine.refresh().await {
                    warn!(generation, error = %format!("{e:#}"), "corpus refresh failed");
                }
            }
            debug!("refresh listener stopped");
        })
    }

    pub async fn search(&self, req: SearchRequest) -> Result<SearchResponse> {
        self.run(req, SearchMode::Hybrid).await
    }

    pub async fn hierarchy_search(&self, req: SearchRequest, filter: HierarchyFilter, organize: bool) -> Result<SearchResponse> {
        self.run(req, SearchMode::Hierarchy { filter, organize }).await
    }

    pub async fn attachment_search(&self, req: SearchRequest, filter: AttachmentFilter) -> Result<SearchResponse> {
        self.run(req, SearchMode::Attachment(filter)).await
    }

    fn validate_limit(&self, limit: Option<usize>) -> Result<usize> {
        let s = &self.settings.search;
        let limit = limit.unwrap_or(s.default_limit);
        if (1..=s.max_limit).contains(&limit) {
            return Ok(limit);
        }
        match s.limit_policy {
            LimitPolicy::Clamp => Ok(limit.clamp(1, s.max_limit)),
            LimitPolicy::Reject => Err(Error::LimitOutOfRange { limit, max: s.max_limit }),
        }
    }

    #[instrument(skip_all, fields(query_len = req.query.len()))]
    pub async fn run(&self, req: SearchRequest, mode: SearchMode) -> Result<SearchResponse> {
        let query = req.query.trim().to_string();
        if query.is_empty() {
            return Err(Error::InvalidQuery("query must not be empty".into()));
        }
        let limit = self.validate_limit(req.limit)?;
        let filter = parse_source_types(&req.source_types);

        let started = Instant::now();
        let deadline = started
            .checked_add(Duration::from_millis(self.settings.search.query_timeout_ms))
            .ok_or_else(|| Error::InvalidConfig("search.query_timeout_ms is out of range".into()))?;
        let corpus = self.corpus().await;

        if let Some(f) = &filter {
            if f.is_disjoint(corpus.source_types()) {
                debug!("source filter excludes every indexed source");
                return Ok(SearchResponse::default());
            }
        }

        let mut response = SearchResponse::default();
        let (vector, lexical, index) = self.retrieve(&query, filter, deadline, &mut response).await;
        let (vector, lexical) = backfill(&query, vector, lexical, index.as_deref(), &corpus);

        let reranking = self.settings.rerank.enabled;
        let mut input_size = self.settings.rerank.input_size(limit, reranking);
        if !reranking && !matches!(mode, SearchMode::Hybrid) {
            // mode filters drop candidates after ranking
            input_size = input_size.max(self.settings.search.candidate_pool);
        }
        let alpha = signal_weight(self.settings.search.alpha, &response.degraded_stages);
        let fused = fuse(&vector, &lexical, alpha, input_size);
        debug!(vector = vector.len(), lexical = lexical.len(), fused = fused.len(), "fusion");

        let ranked = if reranking && !fused.is_empty() {
            let documents = fused
                .iter()
                .map(|c| corpus.get(&c.id).map(CorpusEntry::indexable_text).unwrap_or_default())
                .collect();
            let rerank_deadline = Instant::now()
                .checked_add(Duration::from_millis(self.settings.rerank.timeout_ms))
                .map_or(deadline, |d| deadline.min(d));
            let req = RerankRequest {
                query: &query,
                weight: self.settings.rerank.weight,
                batch_size: self.settings.rerank.batch_size,
                deadline: rerank_deadline,
            };
            let (ranked, degradation) = rerank::rerank(&self.reranker, req, fused, documents).await.into_parts();
            if let Some(d) = degradation { response.degrade(d); }
            ranked
        } else {
            rerank::skip(fused)
        };

        response.results = self.finish(&corpus, ranked, &mode, limit);
        if let SearchMode::Hierarchy { organize: true, .. } = &mode {
            response.groups = Some(hierarchy::group_by_root(&corpus, &response.results));
        }
        info!(
            results = response.results.len(),
            degraded = response.degraded,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "search complete"
        );
        Ok(response)
    }

    /// Vector and lexical retrieval as two tasks joined before fusion.
    /// Dropping the returned future aborts both.
    async fn retrieve(
        &self,
        query: &str,
        filter: Option<SourceTypeFilter>,
        deadline: Instant,
        response: &mut SearchResponse,
    ) -> (Vec<(EntryId, f32)>, Vec<(EntryId, f32)>, Option<Arc<LexicalIndex>>) {
        let pool = self.settings.search.candidate_pool;
        let build_timeout = Duration::from_millis(self.settings.search.lexical_build_timeout_ms)
            .min(deadline.saturating_duration_since(Instant::now()));
        let filter = filter.map(Arc::new);
        let mut tasks = JoinSet::new();

        let retriever = Arc::clone(&self.retriever);
        let (q, f) = (query.to_string(), filter.clone());
        tasks.spawn(async move {
            let outcome = match tokio::time::timeout_at(deadline, retriever.search(&q, pool, f.as_deref())).await {
                Ok(outcome) => outcome,
                Err(_) => Outcome::degraded(Stage::Vector, "vector retrieval timed out", Vec::new()),
            };
            Retrieved::Vector(outcome)
        });

        let lexical = Arc::clone(&self.lexical);
        let provider = Arc::clone(&self.provider);
        let (q, f) = (query.to_string(), filter);
        tasks.spawn(async move {
            let (index, degradation) = lexical.get_or_build(provider, build_timeout).await.into_parts();
            let Some(index) = index else {
                let d = degradation.unwrap_or(Degradation { stage: Stage::Lexical, reason: "lexical index unavailable".into() });
                return Retrieved::Lexical(Outcome::Degraded(Vec::new(), d), None);
            };
            let searcher = Arc::clone(&index);
            let hits = tokio::task::spawn_blocking(move || searcher.search(&q, pool, f.as_deref())).await;
            match hits {
                Ok(hits) => Retrieved::Lexical(Outcome::Ok(hits), Some(index)),
                Err(e) => Retrieved::Lexical(Outcome::degraded(Stage::Lexical, format!("lexical search failed: {e}"), Vec::new()), None),
            }
        });

        let mut vector = None;
        let mut lexical = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Retrieved::Vector(outcome)) => vector = Some(outcome),
                Ok(Retrieved::Lexical(outcome, index)) => lexical = Some((outcome, index)),
                Err(e) => warn!(error = %e, "retrieval task failed"),
            }
        }

        let (vector, vd) = vector
            .unwrap_or_else(|| Outcome::degraded(Stage::Vector, "vector task failed", Vec::new()))
            .into_parts();
        let (lexical_outcome, index) = lexical
            .unwrap_or_else(|| (Outcome::degraded(Stage::Lexical, "lexical task failed", Vec::new()), None));
        let (lexical, ld) = lexical_outcome.into_parts();
        for d in [vd, ld].into_iter().flatten() {
            warn!(stage = ?d.stage, reason = %d.reason, "stage degraded");
            response.degrade(d);
        }
        (vector, lexical, index)
    }

    fn finish(&self, corpus: &IndexedCorpus, ranked: Vec<ScoredCandidate>, mode: &SearchMode, limit: usize) -> Vec<RankedResult> {
        let snippet_chars = self.settings.search.snippet_chars;
        let mut out = Vec::with_capacity(limit);
        for c in ranked {
            if out.len() >= limit { break; }
            let Some(entry) = corpus.get(&c.candidate.id) else { continue };
            let mut result = RankedResult {
                id: entry.id.clone(),
                score: c.score,
                source_type: entry.source_type,
                title: entry.title.clone(),
                source: entry.source.clone(),
                content_snippet: snippet(&entry.text, snippet_chars),
                vector_score: c.candidate.vector_score,
                lexical_score: c.candidate.lexical_score,
                rerank_score: c.rerank_score,
                hierarchy: None,
                attachment: None,
            };
            match mode {
                SearchMode::Hybrid => {}
                SearchMode::Hierarchy { filter, .. } => {
                    if self.settings.search.supports_hierarchy(entry.source_type) {
                        let info = hierarchy::resolve(corpus, entry);
                        if !filter.matches(&info) { continue; }
                        result.hierarchy = Some(info);
                    } else if !filter.is_empty() {
                        continue;
                    }
                }
                SearchMode::Attachment(filter) => {
                    let Some(info) = attachment::resolve(corpus, entry) else { continue };
                    if !filter.matches(&info) { continue; }
                    result.attachment = Some(info);
                }
            }
            out.push(result);
        }
        out
    }
}

/// Known source types from the request; unknown names are logged and
/// ignored. `None` means no restriction.
fn parse_source_types(raw: &[String]) -> Option<SourceTypeFilter> {
    if raw.is_empty() {
        return None;
    }
    let parsed: BTreeSet<SourceType> = raw
        .iter()
        .filter_map(|name| match SourceType::from_str(name) {
            Ok(t) => Some(t),
            Err(_) => {
                warn!(source_type = %name, "ignoring unknown source type");
                None
            }
        })
        .collect();
    Some(parsed)
}

/// Drop hits the corpus view does not know, then give vector-only hits
/// their BM25 score when the lexical top list merely truncated them.
fn backfill(
    query: &str,
    vector: Vec<(EntryId, f32)>,
    lexical: Vec<(EntryId, f32)>,
    index: Option<&LexicalIndex>,
    corpus: &IndexedCorpus,
) -> (Vec<(EntryId, f32)>, Vec<(EntryId, f32)>) {
    let before = vector.len() + lexical.len();
    let vector: Vec<_> = vector.into_iter().filter(|(id, _)| corpus.get(id).is_some()).collect();
    let mut lexical: Vec<_> = lexical.into_iter().filter(|(id, _)| corpus.get(id).is_some()).collect();
    let dropped = before - vector.len() - lexical.len();
    if dropped > 0 {
        debug!(dropped, "hits without a corpus entry");
    }
    if let Some(index) = index {
        let seen: HashSet<&EntryId> = lexical.iter().map(|(id, _)| id).collect();
        let missing: Vec<EntryId> = vector.iter().map(|(id, _)| id).filter(|id| !seen.contains(id)).cloned().collect();
        if !missing.is_empty() {
            let extra: Vec<_> = index.score(query, &missing).into_iter().filter(|(_, s)| *s > 0.0).collect();
            lexical.extend(extra);
        }
    }
    (vector, lexical)
}

/// First `max_chars` characters of `text` with whitespace collapsed.
pub fn snippet(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match collapsed.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", collapsed[..cut].trim_end()),
        None => collapsed,
    }
}

/// Vector weight for fusion. A stage that came back degraded has no
/// signal, so its share goes to the surviving one.
fn signal_weight(alpha: f32, degraded: &[Degradation]) -> f32 {
    let lost = |stage: Stage| degraded.iter().any(|d| d.stage == stage);
    match (lost(Stage::Vector), lost(Stage::Lexical)) {
        (true, false) => 0.0,
        (false, true) => 1.0,
        _ => alpha,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snippet_cuts_on_char_boundary() {
        assert_eq!(snippet("  a\n b  ", 10), "a b");
        assert_eq!(snippet("héllo wörld", 5), "héllo...");
        assert_eq!(snippet("", 5), "");
    }

    #[test]
    fn degraded_stage_gives_up_its_weight() {
        let d = |stage| Degradation { stage, reason: "down".into() };
        assert_eq!(signal_weight(0.7, &[]), 0.7);
        assert_eq!(signal_weight(1.0, &[d(Stage::Vector)]), 0.0);
        assert_eq!(signal_weight(0.0, &[d(Stage::Lexical)]), 1.0);
        assert_eq!(signal_weight(0.7, &[d(Stage::Vector), d(Stage::Lexical)]), 0.7);
        assert_eq!(signal_weight(0.4, &[d(Stage::Rerank)]), 0.4);
    }

    #[test]
    fn unknown_source_types_are_ignored() {
        assert_eq!(parse_source_types(&[]), None);
        let f = parse_source_types(&["jira".to_string(), "svn".to_string()]).unwrap();
        assert_eq!(f.into_iter().collect::<Vec<_>>(), vec![SourceType::Jira]);
        assert_eq!(parse_source_types(&["svn".to_string()]), Some(BTreeSet::new()));
    }
}
