use std::collections::HashMap;

use tantivy::tokenizer::TextAnalyzer;

use docseek_core::types::{CorpusEntry, EntryId, SourceType, SourceTypeFilter};

use crate::analyzer::{build_analyzer, tokenize};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Params {
	pub k1: f32,
	pub b: f32,
}

impl Default for Bm25Params {
	fn default() -> Self { Self { k1: 1.5, b: 0.75 } }
}

struct Doc {
	id: EntryId,
	source_type: SourceType,
	len: u32,
}

/// Immutable BM25 snapshot of one corpus generation.
///
/// Postings are `(doc ordinal, term frequency)` pairs sorted by ordinal, so
/// scoring a known candidate is a binary search per query term.
pub struct LexicalIndex {
	generation: u64,
	params: Bm25Params,
	analyzer: TextAnalyzer,
	docs: Vec<Doc>,
	ords: HashMap<EntryId, u32>,
	avg_doc_len: f32,
	postings: HashMap<String, Vec<(u32, u32)>>,
}

impl LexicalIndex {
	pub fn build(generation: u64, entries: &[CorpusEntry], params: Bm25Params, stop_words: bool) -> Self {
		let mut analyzer = build_analyzer(stop_words);
		let mut docs: Vec<Doc> = Vec::with_capacity(entries.len());
		let mut ords: HashMap<EntryId, u32> = HashMap::with_capacity(entries.len());
		let mut postings: HashMap<String, Vec<(u32, u32)>> = HashMap::new();
		let mut total_len: u64 = 0;

		for entry in entries {
			// later duplicates shadow earlier ones, matching the corpus view
			if let Some(&ord) = ords.get(&entry.id) {
				for list in postings.values_mut() { list.retain(|(o, _)| *o != ord); }
				total_len -= docs[ord as usize].len as u64;
				docs[ord as usize].len = 0;
			}
			let ord = docs.len() as u32;
			let terms = tokenize(&mut analyzer, &entry.indexable_text());
			let mut tf: HashMap<String, u32> = HashMap::new();
			for t in &terms { *tf.entry(t.clone()).or_insert(0) += 1; }
			for (term, freq) in tf { postings.entry(term).or_default().push((ord, freq)); }
			total_len += terms.len() as u64;
			docs.push(Doc { id: entry.id.clone(), source_type: entry.source_type, len: terms.len() as u32 });
			ords.insert(entry.id.clone(), ord);
		}

		let live = ords.len();
		let avg_doc_len = if live == 0 { 0.0 } else { total_len as f32 / live as f32 };
		Self { generation, params, analyzer, docs, ords, avg_doc_len, postings }
	}

	pub fn generation(&self) -> u64 { self.generation }

	pub fn params(&self) -> Bm25Params { self.params }

	pub fn len(&self) -> usize { self.ords.len() }

	pub fn is_empty(&self) -> bool { self.ords.is_empty() }

	/// Analyzed, de-duplicated query terms.
	pub fn query_terms(&self, query: &str) -> Vec<String> {
		let mut analyzer = self.analyzer.clone();
		let mut terms = tokenize(&mut analyzer, query);
		terms.sort();
		terms.dedup();
		terms
	}

	/// Top `k` entries by BM25, ties broken by id. Entries sharing no term
	/// with the query are not returned.
	pub fn search(&self, query: &str, k: usize, filter: Option<&SourceTypeFilter>) -> Vec<(EntryId, f32)> {
		let mut acc: HashMap<u32, f32> = HashMap::new();
		for term in self.query_terms(query) {
			let Some(list) = self.postings.get(&term) else { continue };
			let idf = self.idf(list.len());
			for &(ord, tf) in list {
				let doc = &self.docs[ord as usize];
				if let Some(f) = filter {
					if !f.is_empty() && !f.contains(&doc.source_type) { continue; }
				}
				*acc.entry(ord).or_insert(0.0) += idf * self.tf_norm(tf, doc.len);
			}
		}
		let mut hits: Vec<(EntryId, f32)> = acc.into_iter().map(|(ord, s)| (self.docs[ord as usize].id.clone(), s)).collect();
		hits.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
		hits.truncate(k);
		hits
	}

	/// BM25 of `query` against each known candidate; unknown ids are skipped,
	/// candidates without a matching term score 0.
	pub fn score(&self, query: &str, candidate_ids: &[EntryId]) -> Vec<(EntryId, f32)> {
		let terms: Vec<(&Vec<(u32, u32)>, f32)> = self
			.query_terms(query)
			.iter()
			.filter_map(|t| self.postings.get(t))
			.map(|list| (list, self.idf(list.len())))
			.collect();
		candidate_ids
			.iter()
			.filter_map(|id| self.ords.get(id).map(|&ord| (id, ord)))
			.map(|(id, ord)| {
				let doc = &self.docs[ord as usize];
				let score: f32 = terms
					.iter()
					.filter_map(|(list, idf)| {
						list.binary_search_by_key(&ord, |(o, _)| *o).ok().map(|i| idf * self.tf_norm(list[i].1, doc.len))
					})
					.sum();
				(id.clone(), score)
			})
			.collect()
	}

	fn idf(&self, df: usize) -> f32 {
		let n = self.ords.len() as f32;
		let df = df as f32;
		((n - df + 0.5) / (df + 0.5) + 1.0).ln()
	}

	fn tf_norm(&self, tf: u32, doc_len: u32) -> f32 {
		let Bm25Params { k1, b } = self.params;
		let tf = tf as f32;
		let len_ratio = if self.avg_doc_len > 0.0 { doc_len as f32 / self.avg_doc_len } else { 1.0 };
		tf * (k1 + 1.0) / (tf + k1 * (1.0 - b + b * len_ratio))
	}
}
