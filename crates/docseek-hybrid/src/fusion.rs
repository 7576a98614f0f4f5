//! Score fusion: per-signal min-max normalization and a weighted sum.
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use docseek_core::types::{EntryId, FusedCandidate};

/// Min-max normalize raw scores into [0, 1]. When every score is equal the
/// signal carries no ordering information and all candidates get 1.0.
/// Non-finite scores are dropped; duplicate ids keep their best score.
pub fn normalize(scores: &[(EntryId, f32)]) -> HashMap<EntryId, f32> {
    let best = raw_best(scores);
    let (min, max) = best.values().fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &s| (lo.min(s), hi.max(s)));
    let span = max - min;
    best.into_iter()
        .map(|(id, s)| {
            let n = if span > f32::EPSILON { (s - min) / span } else { 1.0 };
            (id, n)
        })
        .collect()
}

/// Fuse the two signals over the union of their ids:
/// `alpha * vector + (1 - alpha) * lexical`, a missing signal counting as 0.
/// Sorted by fused score, then raw vector score, then id; truncated to `top_n`.
pub fn fuse(vector: &[(EntryId, f32)], lexical: &[(EntryId, f32)], alpha: f32, top_n: usize) -> Vec<FusedCandidate> {
    let norm_v = normalize(vector);
    let norm_l = normalize(lexical);
    let raw_v = raw_best(vector);
    let raw_l = raw_best(lexical);

    let ids: BTreeSet<&EntryId> = norm_v.keys().chain(norm_l.keys()).collect();
    let mut fused: Vec<FusedCandidate> = ids
        .into_iter()
        .map(|id| {
            let v = norm_v.get(id).copied().unwrap_or(0.0);
            let l = norm_l.get(id).copied().unwrap_or(0.0);
            FusedCandidate {
                id: id.clone(),
                fused_score: alpha * v + (1.0 - alpha) * l,
                vector_score: raw_v.get(id).copied(),
                lexical_score: raw_l.get(id).copied(),
            }
        })
        .collect();
    fused.sort_by(compare_fused);
    fused.truncate(top_n);
    fused
}

fn raw_best(scores: &[(EntryId, f32)]) -> HashMap<EntryId, f32> {
    let mut best: HashMap<EntryId, f32> = HashMap::new();
    for (id, s) in scores.iter().filter(|(_, s)| s.is_finite()) {
        best.entry(id.clone()).and_modify(|b| *b = b.max(*s)).or_insert(*s);
    }
    best
}

/// Total order used for fused output.
pub fn compare_fused(a: &FusedCandidate, b: &FusedCandidate) -> Ordering {
    b.fused_score
        .total_cmp(&a.fused_score)
        .then_with(|| cmp_desc_opt(a.vector_score, b.vector_score))
        .then_with(|| a.id.cmp(&b.id))
}

// None sorts after any score
fn cmp_desc_opt(a: Option<f32>, b: Option<f32>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(pairs: &[(&str, f32)]) -> Vec<(EntryId, f32)> { pairs.iter().map(|(i, v)| (i.to_string(), *v)).collect() }

    #[test]
    fn normalize_spans_unit_interval() {
        let n = normalize(&s(&[("a", 2.0), ("b", 4.0), ("c", 3.0)]));
        assert_eq!(n["a"], 0.0);
        assert_eq!(n["b"], 1.0);
        assert!((n["c"] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn normalize_equal_scores_to_one() {
        let n = normalize(&s(&[("a", 0.3), ("b", 0.3)]));
        assert_eq!(n["a"], 1.0);
        assert_eq!(n["b"], 1.0);
        assert!(normalize(&[]).is_empty());
    }

    #[test]
    fn normalize_drops_nan_and_keeps_best_duplicate() {
        let n = normalize(&s(&[("a", f32::NAN), ("b", 1.0), ("b", 3.0), ("c", 2.0)]));
        assert!(!n.contains_key("a"));
        assert_eq!(n["b"], 1.0);
    }

    #[test]
    fn missing_signal_counts_as_zero() {
        let fused = fuse(&s(&[("v", 0.9), ("both", 0.1)]), &s(&[("both", 5.0), ("l", 1.0)]), 0.7, 10);
        let by_id: HashMap<_, _> = fused.iter().map(|c| (c.id.as_str(), c)).collect();
        assert!((by_id["v"].fused_score - 0.7).abs() < 1e-6);
        assert!((by_id["both"].fused_score - 0.3).abs() < 1e-6);
        assert!(by_id["l"].fused_score.abs() < 1e-6);
        assert_eq!(by_id["l"].vector_score, None);
        assert_eq!(by_id["both"].lexical_score, Some(5.0));
    }

    #[test]
    fn ties_break_on_raw_vector_then_id() {
        // a, b, c all fuse to 1.0 when alpha = 0 and lexical scores are equal
        let fused = fuse(&s(&[("b", 0.5), ("c", 0.9)]), &s(&[("a", 1.0), ("b", 1.0), ("c", 1.0)]), 0.0, 10);
        let ids: Vec<&str> = fused.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
    }

    #[test]
    fn truncates_to_top_n() {
        let v: Vec<(EntryId, f32)> = (0..20).map(|i| (format!("d{i:02}"), i as f32)).collect();
        let fused = fuse(&v, &[], 0.7, 5);
        assert_eq!(fused.len(), 5);
        assert_eq!(fused[0].id, "d19");
    }
}
