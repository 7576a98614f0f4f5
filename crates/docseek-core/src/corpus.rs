//! Corpus snapshots: an in-process provider and an id-indexed view used by
//! the resolvers.
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::{Arc, RwLock};

use anyhow::Context;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::traits::CorpusProvider;
use crate::types::{CorpusEntry, EntryId, SourceType};

/// Immutable, id-indexed view of one corpus generation.
#[derive(Debug, Default)]
pub struct IndexedCorpus {
    generation: u64,
    entries: HashMap<EntryId, CorpusEntry>,
    children: HashMap<EntryId, usize>,
    source_types: BTreeSet<SourceType>,
}

impl IndexedCorpus {
    pub fn build(generation: u64, entries: &[CorpusEntry]) -> Self {
        let mut by_id = HashMap::with_capacity(entries.len());
        let mut source_types = BTreeSet::new();
        for e in entries {
            source_types.insert(e.source_type);
            if by_id.insert(e.id.clone(), e.clone()).is_some() {
                warn!(id = %e.id, "duplicate corpus id, keeping the last entry");
            }
        }
        let mut children: HashMap<EntryId, usize> = HashMap::new();
        for e in by_id.values() {
            if let Some(parent) = &e.parent_id {
                *children.entry(parent.clone()).or_insert(0) += 1;
            }
            if e.is_attachment && e.parent_id.as_ref().map_or(true, |p| !by_id.contains_key(p)) {
                warn!(id = %e.id, "attachment without a resolvable parent");
            }
        }
        Self { generation, entries: by_id, children, source_types }
    }

    pub fn generation(&self) -> u64 { self.generation }

    pub fn get(&self, id: &str) -> Option<&CorpusEntry> { self.entries.get(id) }

    pub fn children_count(&self, id: &str) -> usize { self.children.get(id).copied().unwrap_or(0) }

    /// Source types present in this generation.
    pub fn source_types(&self) -> &BTreeSet<SourceType> { &self.source_types }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

/// In-process corpus provider. `replace` swaps the entry list and notifies
/// subscribers by bumping the generation counter.
pub struct MemoryCorpus {
    entries: RwLock<Arc<Vec<CorpusEntry>>>,
    generation: watch::Sender<u64>,
}

impl MemoryCorpus {
    pub fn new(entries: Vec<CorpusEntry>) -> Self {
        let (generation, _) = watch::channel(0u64);
        Self { entries: RwLock::new(Arc::new(entries)), generation }
    }

    /// Load one JSON-encoded `CorpusEntry` per line; blank lines are skipped.
    pub fn load_jsonl(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path).with_context(|| format!("Failed to read corpus file {}", path.display()))?;
        let entries = parse_jsonl(&raw).with_context(|| format!("Failed to parse corpus file {}", path.display()))?;
        info!(path = %path.display(), entries = entries.len(), "loaded corpus");
        Ok(Self::new(entries))
    }

    pub fn replace(&self, entries: Vec<CorpusEntry>) {
        {
            let mut guard = self.entries.write().unwrap_or_else(|e| e.into_inner());
            *guard = Arc::new(entries);
        }
        self.generation.send_modify(|g| *g += 1);
    }

    pub fn generation(&self) -> u64 { *self.generation.borrow() }
}

impl CorpusProvider for MemoryCorpus {
    fn entries(&self) -> Arc<Vec<CorpusEntry>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn subscribe(&self) -> watch::Receiver<u64> { self.generation.subscribe() }
}

pub fn parse_jsonl(raw: &str) -> anyhow::Result<Vec<CorpusEntry>> {
    let mut out = Vec::new();
    for (n, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() { continue; }
        let entry: CorpusEntry = serde_json::from_str(line).with_context(|| format!("line {}", n + 1))?;
        out.push(entry);
    }
    Ok(out)
}
