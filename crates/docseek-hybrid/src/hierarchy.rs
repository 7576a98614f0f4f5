use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use docseek_core::corpus::IndexedCorpus;
use docseek_core::types::{CorpusEntry, EntryId, HierarchyInfo, RankedResult};

pub const BREADCRUMB_SEPARATOR: &str = " > ";

/// Post-ranking filters for hierarchy search. All set conditions must hold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HierarchyFilter {
    pub max_depth: Option<usize>,
    /// Keep only direct children of this entry.
    pub parent_id: Option<EntryId>,
    pub root_only: bool,
    pub has_children: Option<bool>,
}

impl HierarchyFilter {
    pub fn is_empty(&self) -> bool { *self == Self::default() }

    pub fn matches(&self, info: &HierarchyInfo) -> bool {
        if self.root_only && info.depth != 0 { return false; }
        if self.max_depth.is_some_and(|max| info.depth > max) { return false; }
        if let Some(parent) = &self.parent_id {
            if info.parent_id.as_ref() != Some(parent) { return false; }
        }
        if let Some(want) = self.has_children {
            if (info.children_count > 0) != want { return false; }
        }
        true
    }
}

struct Walk<'a> {
    depth: usize,
    /// Nearest ancestor first.
    ancestors: Vec<&'a CorpusEntry>,
}

// Follows parent links until a missing parent, a dangling id or a repeat.
fn walk<'a>(corpus: &'a IndexedCorpus, entry: &'a CorpusEntry) -> Walk<'a> {
    let mut seen: HashSet<&str> = HashSet::from([entry.id.as_str()]);
    let mut ancestors = Vec::new();
    let mut depth = 0;
    let mut next = entry.parent_id.as_deref();
    while let Some(pid) = next {
        depth += 1;
        if !seen.insert(pid) { break; }
        match corpus.get(pid) {
            Some(parent) => {
                ancestors.push(parent);
                next = parent.parent_id.as_deref();
            }
            None => break,
        }
    }
    Walk { depth, ancestors }
}

pub fn resolve(corpus: &IndexedCorpus, entry: &CorpusEntry) -> HierarchyInfo {
    let Walk { depth, ancestors } = walk(corpus, entry);
    let breadcrumb_text = ancestors
        .iter()
        .rev()
        .map(|e| e.title.as_str())
        .chain(std::iter::once(entry.title.as_str()))
        .collect::<Vec<_>>()
        .join(BREADCRUMB_SEPARATOR);
    HierarchyInfo {
        parent_id: entry.parent_id.clone(),
        breadcrumb_text,
        depth,
        children_count: corpus.children_count(&entry.id),
    }
}

/// Id of the top-most resolvable ancestor (the entry itself for roots).
pub fn root_of<'a>(corpus: &'a IndexedCorpus, entry: &'a CorpusEntry) -> &'a CorpusEntry {
    walk(corpus, entry).ancestors.last().copied().unwrap_or(entry)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HierarchyGroup {
    pub root_id: EntryId,
    pub root_title: String,
    pub results: Vec<RankedResult>,
}

/// Bucket results by root ancestor. Groups follow the rank of their best
/// member; inside a group results are ordered by depth, then rank.
pub fn group_by_root(corpus: &IndexedCorpus, results: &[RankedResult]) -> Vec<HierarchyGroup> {
    let mut order: Vec<EntryId> = Vec::new();
    let mut groups: HashMap<EntryId, (String, Vec<(usize, usize, RankedResult)>)> = HashMap::new();
    for (rank, r) in results.iter().enumerate() {
        let (root_id, root_title) = match corpus.get(&r.id) {
            Some(entry) => {
                let root = root_of(corpus, entry);
                (root.id.clone(), root.title.clone())
            }
            None => (r.id.clone(), r.title.clone()),
        };
        let depth = r.hierarchy.as_ref().map_or(0, |h| h.depth);
        let slot = groups.entry(root_id.clone()).or_insert_with(|| {
            order.push(root_id.clone());
            (root_title, Vec::new())
        });
        slot.1.push((depth, rank, r.clone()));
    }
    order
        .into_iter()
        .filter_map(|root_id| {
            let (root_title, mut members) = groups.remove(&root_id)?;
            members.sort_by_key(|(depth, rank, _)| (*depth, *rank));
            Some(HierarchyGroup { root_id, root_title, results: members.into_iter().map(|(_, _, r)| r).collect() })
        })
        .collect()
}
