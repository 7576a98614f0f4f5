use anyhow::{anyhow, Result};
use arrow_array::{Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray};
use async_trait::async_trait;
use futures::TryStreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use docseek_core::traits::{Embedder, VectorStore};
use docseek_core::types::{CorpusEntry, EntryId, SourceTypeFilter};

use crate::schema::build_entries_schema;
use crate::table::{ensure_table, open_db};

/// LanceDB table of entry embeddings searched by cosine distance.
pub struct LanceVectorStore {
	db: Connection,
	table: String,
	dim: usize,
}

impl LanceVectorStore {
	pub async fn open(db_path: &Path, table: &str, dim: usize) -> Result<Self> {
		let db = open_db(db_path.to_string_lossy().as_ref()).await?;
		ensure_table(&db, table, build_entries_schema(dim)).await?;
		Ok(Self { db, table: table.to_string(), dim })
	}

	pub async fn count(&self) -> Result<usize> {
		Ok(self.db.open_table(&self.table).execute().await?.count_rows(None).await?)
	}

	/// Embed and write `entries`, replacing rows with the same id.
	pub async fn upsert(&self, entries: &[CorpusEntry], embedder: &dyn Embedder, batch_size: usize) -> Result<usize> {
		if entries.is_empty() { return Ok(0); }
		if embedder.dim() != self.dim {
			return Err(anyhow!("embedder dim {} does not match table dim {}", embedder.dim(), self.dim));
		}
		let pb = ProgressBar::new(entries.len() as u64);
		pb.set_style(
			ProgressStyle::default_bar()
				.template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} entries ({percent}%) {msg}")
				.unwrap_or_else(|_| ProgressStyle::default_bar())
				.progress_chars("#>-"),
		);
		let table = self.db.open_table(&self.table).execute().await?;
		let mut written = 0usize;
		for chunk in entries.chunks(batch_size.max(1)) {
			let texts: Vec<String> = chunk.iter().map(|e| e.indexable_text()).collect();
			let vectors = embedder.embed_batch(&texts)?;
			if vectors.len() != chunk.len() {
				return Err(anyhow!("embedder returned {} vectors for {} texts", vectors.len(), chunk.len()));
			}
			let batch = self.to_record_batch(chunk, vectors)?;
			let schema = batch.schema();
			let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
			let mut mi = table.merge_insert(&["id"]);
			mi.when_matched_update_all(None).when_not_matched_insert_all();
			mi.execute(reader).await?;
			written += chunk.len();
			pb.set_position(written as u64);
		}
		pb.finish_and_clear();
		info!(table = %self.table, written, "upserted entry embeddings");
		Ok(written)
	}

	fn to_record_batch(&self, entries: &[CorpusEntry], vectors: Vec<Vec<f32>>) -> Result<RecordBatch> {
		let ids: Vec<String> = entries.iter().map(|e| e.id.clone()).collect();
		let kinds: Vec<&str> = entries.iter().map(|e| e.source_type.as_str()).collect();
		let rows = vectors.into_iter().map(|v| Some(v.into_iter().map(Some).collect::<Vec<_>>()));
		let batch = RecordBatch::try_new(build_entries_schema(self.dim), vec![
			Arc::new(StringArray::from(ids)),
			Arc::new(StringArray::from(kinds)),
			Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(rows, self.dim as i32)),
		])?;
		Ok(batch)
	}
}

fn filter_clause(filter: &SourceTypeFilter) -> String {
	let kinds: Vec<String> = filter.iter().map(|t| format!("'{}'", t.as_str())).collect();
	format!("source_type IN ({})", kinds.join(", "))
}

#[async_trait]
impl VectorStore for LanceVectorStore {
	async fn nearest_neighbors(&self, query: &[f32], k: usize, filter: Option<&SourceTypeFilter>) -> Result<Vec<(EntryId, f32)>> {
		let table = self.db.open_table(&self.table).execute().await?;
		let mut q = table.vector_search(query.to_vec())?.distance_type(DistanceType::Cosine).limit(k);
		if let Some(f) = filter.filter(|f| !f.is_empty()) {
			q = q.only_if(filter_clause(f));
		}
		let mut stream = q.execute().await?;
		let mut hits = Vec::new();
		while let Some(batch) = stream.try_next().await? {
			let ids = batch
				.column_by_name("id")
				.and_then(|c| c.as_any().downcast_ref::<StringArray>())
				.ok_or_else(|| anyhow!("id column missing"))?;
			let distances = batch
				.column_by_name("_distance")
				.and_then(|c| c.as_any().downcast_ref::<Float32Array>())
				.ok_or_else(|| anyhow!("_distance column missing"))?;
			for i in 0..batch.num_rows() {
				if distances.is_null(i) { continue; }
				hits.push((ids.value(i).to_string(), 1.0 - distances.value(i)));
			}
		}
		debug!(k, hits = hits.len(), "lancedb nearest neighbours");
		Ok(hits)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use docseek_core::types::SourceType;

	#[test]
	fn filter_clause_lists_source_types() {
		let f: SourceTypeFilter = [SourceType::Jira, SourceType::Git].into_iter().collect();
		assert_eq!(filter_clause(&f), "source_type IN ('git', 'jira')");
	}
}
