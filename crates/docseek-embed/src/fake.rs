use anyhow::Result;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use twox_hash::XxHash64;

use docseek_core::traits::{CrossEncoder, Embedder};

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()).map(|w| w.to_lowercase())
}

/// Deterministic hashed bag-of-words embedder for tests and offline dev.
pub struct FakeEmbedder {
    dim: usize,
}

impl FakeEmbedder {
    pub fn new(dim: usize) -> Self { Self { dim: dim.max(1) } }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for (i, token) in words(text).enumerate() {
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += val + (i as f32 % 3.0) * 0.01;
        }
        let norm = (v.iter().map(|x| x * x).sum::<f32>()).sqrt().max(1e-6);
        for x in &mut v { *x /= norm; }
        v
    }
}

impl Embedder for FakeEmbedder {
    fn dim(&self) -> usize { self.dim }

    fn max_len(&self) -> usize { usize::MAX }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// Scores a pair by the share of query words found in the document.
#[derive(Default)]
pub struct FakeCrossEncoder;

impl CrossEncoder for FakeCrossEncoder {
    fn model_id(&self) -> &str { "fake-overlap" }

    fn score_batch(&mut self, query: &str, documents: &[String]) -> Result<Vec<f32>> {
        let q: HashSet<String> = words(query).collect();
        Ok(documents
            .iter()
            .map(|d| {
                if q.is_empty() {
                    return 0.0;
                }
                let doc: HashSet<String> = words(d).collect();
                q.intersection(&doc).count() as f32 / q.len() as f32
            })
            .collect())
    }
}
