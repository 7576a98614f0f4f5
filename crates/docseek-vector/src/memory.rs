use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use docseek_core::traits::{Embedder, VectorStore};
use docseek_core::types::{CorpusEntry, EntryId, SourceType, SourceTypeFilter};

struct Row {
    source_type: SourceType,
    vector: Vec<f32>,
}

/// Brute-force cosine store for tests and small corpora.
#[derive(Default)]
pub struct MemoryVectorStore {
    rows: RwLock<HashMap<EntryId, Row>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self { Self::default() }

    pub fn from_entries(entries: &[CorpusEntry], embedder: &dyn Embedder) -> Result<Self> {
        let store = Self::new();
        let texts: Vec<String> = entries.iter().map(|e| e.indexable_text()).collect();
        let vectors = embedder.embed_batch(&texts)?;
        if vectors.len() != entries.len() {
            return Err(anyhow!("embedder returned {} vectors for {} entries", vectors.len(), entries.len()));
        }
        for (entry, vector) in entries.iter().zip(vectors) {
            store.insert(entry.id.clone(), entry.source_type, vector);
        }
        Ok(store)
    }

    pub fn insert(&self, id: impl Into<EntryId>, source_type: SourceType, vector: Vec<f32>) {
        let mut rows = self.rows.write().unwrap_or_else(|e| e.into_inner());
        rows.insert(id.into(), Row { source_type, vector });
    }

    pub fn len(&self) -> usize { self.rows.read().unwrap_or_else(|e| e.into_inner()).len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 { 0.0 } else { dot / (na * nb) }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn nearest_neighbors(&self, query: &[f32], k: usize, filter: Option<&SourceTypeFilter>) -> Result<Vec<(EntryId, f32)>> {
        let rows = self.rows.read().unwrap_or_else(|e| e.into_inner());
        let mut hits: Vec<(EntryId, f32)> = rows
            .iter()
            .filter(|(_, row)| filter.map_or(true, |f| f.is_empty() || f.contains(&row.source_type)))
            .filter(|(_, row)| row.vector.len() == query.len())
            .map(|(id, row)| (id.clone(), cosine(query, &row.vector)))
            .collect();
        hits.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        hits.truncate(k);
        Ok(hits)
    }
}
