mod common;

use std::sync::Arc;

use docseek_core::types::{AttachmentMeta, CorpusEntry, SourceType, Stage};
use docseek_hybrid::{AttachmentFilter, HierarchyFilter, RerankerHandle, SearchRequest};

use common::*;

fn token_corpus() -> Vec<CorpusEntry> {
    vec![
        CorpusEntry::new("docA", "Key management", "the signing token rotated nightly by the scheduler", SourceType::Confluence),
        CorpusEntry::new("docB", "Lunch menu", "soup salad and sandwiches on friday", SourceType::Confluence),
    ]
}

#[tokio::test]
async fn lexical_signal_breaks_a_vector_tie() {
    let store = FixedStore::new(&[("docA", 0.5), ("docB", 0.5)]);
    let engine = engine_with(token_corpus(), store, test_settings());

    let resp = engine.search(SearchRequest::new("token rotation")).await.unwrap();
    assert!(!resp.degraded, "{:?}", resp.degraded_stages);
    assert_eq!(ids(&resp.results), ["docA", "docB"]);

    let a = &resp.results[0];
    assert!(a.lexical_score.unwrap() > 0.0);
    assert_eq!(a.vector_score, Some(0.5));
    assert!((a.score - 1.0).abs() < 1e-6);
    let b = &resp.results[1];
    assert_eq!(b.lexical_score, None);
    assert!((b.score - 0.7).abs() < 1e-6);
}

fn tree() -> Vec<CorpusEntry> {
    vec![
        CorpusEntry::new("root", "Handbook", "engineering handbook overview", SourceType::Confluence),
        CorpusEntry::new("child1", "Onboarding", "handbook chapter on onboarding", SourceType::Confluence).with_parent("root"),
        CorpusEntry::new("grandchild", "Laptop setup", "handbook appendix for laptop setup", SourceType::Confluence)
            .with_parent("child1"),
    ]
}

fn tree_store() -> Arc<FixedStore> {
    FixedStore::new(&[("grandchild", 0.9), ("child1", 0.8), ("root", 0.7)])
}

#[tokio::test]
async fn root_only_returns_top_level_pages() {
    let engine = engine_with(tree(), tree_store(), test_settings());
    let filter = HierarchyFilter { root_only: true, ..Default::default() };

    let resp = engine.hierarchy_search(SearchRequest::new("handbook"), filter, false).await.unwrap();
    assert_eq!(ids(&resp.results), ["root"]);
    let h = resp.results[0].hierarchy.as_ref().unwrap();
    assert_eq!(h.depth, 0);
    assert_eq!(h.parent_id, None);
    assert_eq!(h.children_count, 1);
    assert_eq!(h.breadcrumb_text, "Handbook");
    assert!(resp.groups.is_none());
}

#[tokio::test]
async fn hierarchy_results_carry_breadcrumbs_and_groups() {
    let engine = engine_with(tree(), tree_store(), test_settings());

    let resp = engine.hierarchy_search(SearchRequest::new("handbook"), HierarchyFilter::default(), true).await.unwrap();
    assert_eq!(resp.results.len(), 3);
    let leaf = resp.results.iter().find(|r| r.id == "grandchild").unwrap();
    let h = leaf.hierarchy.as_ref().unwrap();
    assert_eq!(h.depth, 2);
    assert_eq!(h.breadcrumb_text, "Handbook > Onboarding > Laptop setup");

    let groups = resp.groups.unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].root_id, "root");
    assert_eq!(groups[0].root_title, "Handbook");
    // shallowest first inside a group
    assert_eq!(ids(&groups[0].results), ["root", "child1", "grandchild"]);

    let shallow = HierarchyFilter { max_depth: Some(1), ..Default::default() };
    let resp = engine.hierarchy_search(SearchRequest::new("handbook"), shallow, false).await.unwrap();
    assert!(resp.results.iter().all(|r| r.hierarchy.as_ref().unwrap().depth <= 1));
    assert_eq!(resp.results.len(), 2);

    let under_child = HierarchyFilter { parent_id: Some("child1".into()), ..Default::default() };
    let resp = engine.hierarchy_search(SearchRequest::new("handbook"), under_child, false).await.unwrap();
    assert_eq!(ids(&resp.results), ["grandchild"]);
}

#[tokio::test]
async fn hierarchy_filter_drops_sources_without_a_tree() {
    let mut entries = tree();
    entries.push(CorpusEntry::new("ticket", "Handbook typo", "handbook has a typo", SourceType::Jira));
    let store = FixedStore::new(&[("ticket", 0.95), ("grandchild", 0.9), ("child1", 0.8), ("root", 0.7)]);
    let engine = engine_with(entries, store, test_settings());

    let resp = engine.hierarchy_search(SearchRequest::new("handbook"), HierarchyFilter::default(), false).await.unwrap();
    let ticket = resp.results.iter().find(|r| r.id == "ticket").unwrap();
    assert!(ticket.hierarchy.is_none());

    let filter = HierarchyFilter { has_children: Some(false), ..Default::default() };
    let resp = engine.hierarchy_search(SearchRequest::new("handbook"), filter, false).await.unwrap();
    assert_eq!(ids(&resp.results), ["grandchild"]);
}

fn attachments() -> Vec<CorpusEntry> {
    let pdf = AttachmentMeta {
        filename: "capacity.pdf".into(),
        size_bytes: 150_000,
        mime_type: "application/pdf".into(),
        author: Some("Grace Hopper".into()),
    };
    let docx = AttachmentMeta {
        filename: "capacity.docx".into(),
        size_bytes: 40_000,
        mime_type: "application/vnd.openxmlformats-officedocument.wordprocessingml.document".into(),
        author: None,
    };
    vec![
        CorpusEntry::new("docX", "DocX Design", "storage design overview", SourceType::Confluence),
        CorpusEntry::new("att1", "capacity.pdf", "capacity planning numbers for storage", SourceType::Confluence)
            .as_attachment("docX", pdf),
        CorpusEntry::new("att2", "capacity.docx", "capacity planning draft", SourceType::Confluence).as_attachment("docX", docx),
        CorpusEntry::new("page", "Capacity", "capacity planning page", SourceType::Confluence),
    ]
}

#[tokio::test]
async fn attachment_search_filters_by_file_type() {
    let store = FixedStore::new(&[("att1", 0.6), ("att2", 0.6), ("page", 0.6), ("docX", 0.2)]);
    let engine = engine_with(attachments(), store, test_settings());
    let filter = AttachmentFilter { file_type: Some("pdf".into()), ..Default::default() };

    let resp = engine.attachment_search(SearchRequest::new("capacity planning"), filter).await.unwrap();
    assert_eq!(ids(&resp.results), ["att1"]);
    let info = resp.results[0].attachment.as_ref().unwrap();
    assert_eq!(info.parent_document_id, "docX");
    assert_eq!(info.parent_document_title, "DocX Design");
    assert_eq!(info.original_filename, "capacity.pdf");
    assert_eq!(info.file_size_bytes, 150_000);
    assert_eq!(info.attachment_author.as_deref(), Some("Grace Hopper"));
}

#[tokio::test]
async fn attachment_search_skips_plain_documents() {
    let store = FixedStore::new(&[("att1", 0.6), ("att2", 0.6), ("page", 0.6)]);
    let engine = engine_with(attachments(), store, test_settings());

    let resp = engine.attachment_search(SearchRequest::new("capacity planning"), AttachmentFilter::default()).await.unwrap();
    let mut got = ids(&resp.results);
    got.sort();
    assert_eq!(got, ["att1", "att2"]);

    let small = AttachmentFilter { max_size: Some(100_000), ..Default::default() };
    let resp = engine.attachment_search(SearchRequest::new("capacity planning"), small).await.unwrap();
    assert_eq!(ids(&resp.results), ["att2"]);
}

fn numbered(n: usize) -> Vec<CorpusEntry> {
    (0..n)
        .map(|i| CorpusEntry::new(format!("e{i:02}"), "", format!("entry number {i:02} about replication"), SourceType::Git))
        .collect()
}

fn number_in(doc: &str) -> f32 {
    let digits: String = doc.chars().filter(char::is_ascii_digit).collect();
    digits.parse::<f32>().unwrap_or(0.0)
}

#[tokio::test]
async fn reranker_only_reorders_its_input() {
    let hits: Vec<(String, f32)> = (0..50).map(|i| (format!("e{i:02}"), 1.0 - i as f32 * 0.01)).collect();
    let hits: Vec<(&str, f32)> = hits.iter().map(|(id, s)| (id.as_str(), *s)).collect();
    let mut settings = test_settings();
    settings.rerank.enabled = true;
    settings.rerank.input_size = Some(10);
    settings.rerank.weight = 1.0;
    let engine = engine_with(numbered(50), FixedStore::new(&hits), settings);
    // prefers high numbers, which only exist past the top 10
    engine.reranker().install(Box::new(ScriptedEncoder::new(|doc| number_in(doc) / 100.0)));

    let resp = engine.search(SearchRequest::new("replication").limit(5)).await.unwrap();
    assert!(!resp.degraded, "{:?}", resp.degraded_stages);
    assert_eq!(ids(&resp.results), ["e09", "e08", "e07", "e06", "e05"]);
    for r in &resp.results {
        let rerank = r.rerank_score.unwrap();
        assert!((r.score - rerank).abs() < 1e-6);
    }
}

#[tokio::test]
async fn vector_outage_still_answers_from_lexical() {
    let inner = FixedStore::new(&[]);
    let store = Arc::new(FlakyStore { failures: usize::MAX, inner: Arc::clone(&inner) });
    let engine = engine_with(token_corpus(), store, test_settings());

    let resp = engine.search(SearchRequest::new("token rotation")).await.unwrap();
    assert!(resp.degraded);
    assert!(resp.degraded_stages.iter().any(|d| d.stage == Stage::Vector));
    assert_eq!(ids(&resp.results), ["docA"]);
    assert_eq!(resp.results[0].vector_score, None);
    assert_eq!(inner.calls(), 3);
}

#[tokio::test]
async fn vector_outage_ranks_lexically_at_full_vector_weight() {
    let mut settings = test_settings();
    settings.search.alpha = 1.0;
    let store = Arc::new(FlakyStore { failures: usize::MAX, inner: FixedStore::new(&[]) });
    let entries = vec![
        CorpusEntry::new("a", "Alpha", "replication", SourceType::Confluence),
        CorpusEntry::new("b", "Bravo", "replication replication replication lag", SourceType::Confluence),
        CorpusEntry::new("c", "Charlie", "replication replication replication replication", SourceType::Confluence),
    ];
    let engine = engine_with(entries, store, settings);

    let resp = engine.search(SearchRequest::new("replication")).await.unwrap();
    assert!(resp.degraded);
    assert_eq!(ids(&resp.results), ["c", "b", "a"]);
    assert!((resp.results[0].score - 1.0).abs() < 1e-6);
    assert!(resp.results[2].score.abs() < 1e-6);
}

#[tokio::test]
async fn unloaded_reranker_falls_back_to_fused_order() {
    let mut settings = test_settings();
    settings.rerank.enabled = true;
    let store = FixedStore::new(&[("docA", 0.5), ("docB", 0.5)]);
    let engine = engine_with(token_corpus(), store, settings);
    assert!(!engine.reranker().is_loaded());

    let resp = engine.search(SearchRequest::new("token rotation")).await.unwrap();
    assert!(resp.degraded);
    assert_eq!(resp.degraded_stages.len(), 1);
    assert_eq!(resp.degraded_stages[0].stage, Stage::Rerank);
    assert_eq!(ids(&resp.results), ["docA", "docB"]);
    assert!(resp.results.iter().all(|r| r.rerank_score.is_none()));
}

#[test]
fn reranker_handle_swaps_models() {
    let handle = RerankerHandle::new();
    assert!(!handle.unload());
    handle.install(Box::new(BrokenEncoder { short: false }));
    assert!(handle.is_loaded());
    assert!(handle.unload());
    assert!(!handle.is_loaded());
}
