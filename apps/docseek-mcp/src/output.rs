//! Terminal and JSON rendering for the `query` subcommand.
use std::fmt::Write;

use docseek_hybrid::SearchResponse;

const SNIPPET_MAX_LEN: usize = 160;

pub fn format_json(response: &SearchResponse) -> serde_json::Result<String> {
    serde_json::to_string_pretty(response)
}

fn fmt_score(score: Option<f32>) -> String {
    score.map_or_else(|| "-".to_string(), |s| format!("{s:.3}"))
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

pub fn format_human(query: &str, response: &SearchResponse) -> String {
    let mut out = String::new();
    if response.results.is_empty() {
        let _ = writeln!(out, "No results for \"{query}\"");
    } else {
        let _ = writeln!(out, "{} results for \"{query}\"", response.results.len());
    }
    for (i, r) in response.results.iter().enumerate() {
        let _ = writeln!(
            out,
            "\n{:>2}. {}  [{}]  score={:.4} (vector={} lexical={} rerank={})",
            i + 1,
            r.title,
            r.source_type,
            r.score,
            fmt_score(r.vector_score),
            fmt_score(r.lexical_score),
            fmt_score(r.rerank_score),
        );
        let _ = writeln!(out, "    id={}  {}", r.id, r.source);
        if let Some(h) = &r.hierarchy {
            let _ = writeln!(out, "    {} (depth {}, {} children)", h.breadcrumb_text, h.depth, h.children_count);
        }
        if let Some(a) = &r.attachment {
            let _ = writeln!(
                out,
                "    {} ({} bytes, {}) on \"{}\"",
                a.original_filename, a.file_size_bytes, a.mime_type, a.parent_document_title
            );
        }
        if !r.content_snippet.is_empty() {
            let _ = writeln!(out, "    {}", truncate(&r.content_snippet, SNIPPET_MAX_LEN));
        }
    }
    for d in &response.degraded_stages {
        let _ = writeln!(out, "\nwarning: {:?} stage degraded: {}", d.stage, d.reason);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use docseek_core::types::{Degradation, RankedResult, SourceType, Stage};

    fn result() -> RankedResult {
        RankedResult {
            id: "docA".into(),
            score: 0.91,
            source_type: SourceType::Jira,
            title: "Rotate keys".into(),
            source: "https://tracker/KEY-1".into(),
            content_snippet: "x".repeat(400),
            vector_score: Some(0.5),
            lexical_score: None,
            rerank_score: None,
            hierarchy: None,
            attachment: None,
        }
    }

    #[test]
    fn human_output_lists_scores_and_warnings() {
        let response = SearchResponse {
            results: vec![result()],
            degraded: true,
            degraded_stages: vec![Degradation { stage: Stage::Rerank, reason: "timed out".into() }],
            groups: None,
        };
        let text = format_human("keys", &response);
        assert!(text.contains("1 results for \"keys\""));
        assert!(text.contains("[jira]"));
        assert!(text.contains("vector=0.500 lexical=- rerank=-"));
        assert!(text.contains("Rerank stage degraded: timed out"));
        assert!(text.lines().all(|l| l.chars().count() < 200));
    }

    #[test]
    fn json_output_omits_missing_signals() {
        let response = SearchResponse { results: vec![result()], ..Default::default() };
        let v: serde_json::Value = serde_json::from_str(&format_json(&response).unwrap()).unwrap();
        let first = &v["results"][0];
        assert_eq!(first["id"], "docA");
        assert!(first.get("lexical_score").is_none());
        assert_eq!(v["degraded"], false);
        assert!(v.get("degraded_stages").is_none());
    }
}
