use std::fs;

use figment::providers::{Format, Toml};
use figment::Figment;
use tempfile::TempDir;

use docseek_core::config::{Config, LimitPolicy, RerankSettings, Settings};
use docseek_core::corpus::{parse_jsonl, MemoryCorpus};
use docseek_core::traits::CorpusProvider;
use docseek_core::types::{Outcome, SourceType, Stage};
use docseek_core::Error;

#[test]
fn empty_figment_yields_defaults() {
    let tmp = TempDir::new().unwrap();
    let config = Config::from_figment(Figment::new(), tmp.path());
    let settings = config.settings().expect("defaults are valid");
    assert!((settings.search.alpha - 0.7).abs() < f32::EPSILON);
    assert!((settings.search.bm25_k1 - 1.5).abs() < f32::EPSILON);
    assert!((settings.search.bm25_b - 0.75).abs() < f32::EPSILON);
    assert_eq!(settings.search.max_limit, 100);
    assert_eq!(settings.search.limit_policy, LimitPolicy::Clamp);
    assert_eq!(settings.rerank.batch_size, 32);
    assert!((settings.rerank.weight - 1.0).abs() < f32::EPSILON);
}

#[test]
fn config_file_overrides_defaults() {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join("config.toml"),
        "[search]\nalpha = 0.5\nlimit_policy = \"reject\"\n\n[rerank]\nenabled = true\ninput_size = 10\n",
    )
    .unwrap();
    let config = Config::load_from(tmp.path(), "none").expect("load");
    let settings = config.settings().unwrap();
    assert!((settings.search.alpha - 0.5).abs() < f32::EPSILON);
    assert_eq!(settings.search.limit_policy, LimitPolicy::Reject);
    assert!(settings.rerank.enabled);
    assert_eq!(settings.rerank.input_size, Some(10));
    // untouched keys keep defaults
    assert_eq!(settings.search.default_limit, 10);
}

#[test]
fn out_of_range_alpha_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let figment = Figment::new().merge(Toml::string("[search]\nalpha = 1.5\n"));
    let err = Config::from_figment(figment, tmp.path()).settings().unwrap_err();
    assert!(matches!(err, Error::InvalidConfig(_)));
}

#[test]
fn unbounded_timeouts_are_rejected() {
    let tmp = TempDir::new().unwrap();
    for toml in ["[search]\nquery_timeout_ms = 9223372036854775807\n", "[rerank]\ntimeout_ms = 3600001\n"] {
        let figment = Figment::new().merge(Toml::string(toml));
        let err = Config::from_figment(figment, tmp.path()).settings().unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(ref m) if m.contains("timeout_ms")), "{err:?}");
    }
    let figment = Figment::new().merge(Toml::string("[search]\nquery_timeout_ms = 3600000\n"));
    assert!(Config::from_figment(figment, tmp.path()).settings().is_ok());
}

#[test]
fn rerank_input_size_rule() {
    let rerank = RerankSettings::default();
    assert_eq!(rerank.input_size(5, false), 5);
    assert_eq!(rerank.input_size(5, true), 50);
    assert_eq!(rerank.input_size(80, true), 80);
    let fixed = RerankSettings { input_size: Some(10), ..RerankSettings::default() };
    assert_eq!(fixed.input_size(5, true), 10);
}

#[test]
fn resolve_path_joins_relative_paths() {
    let tmp = TempDir::new().unwrap();
    let config = Config::from_figment(Figment::new(), tmp.path());
    assert_eq!(config.resolve_path("data/corpus.jsonl"), tmp.path().join("data/corpus.jsonl"));
    assert_eq!(config.resolve_path("/abs/x"), std::path::PathBuf::from("/abs/x"));
}

#[test]
fn settings_default_validates() {
    Settings::default().validate().expect("default settings are valid");
}

#[test]
fn source_type_parsing_is_lenient() {
    assert_eq!("Confluence".parse::<SourceType>().unwrap(), SourceType::Confluence);
    assert_eq!("local_file".parse::<SourceType>().unwrap(), SourceType::LocalFile);
    assert_eq!("public-docs".parse::<SourceType>().unwrap(), SourceType::PublicDocs);
    assert!("svn".parse::<SourceType>().is_err());
}

#[test]
fn jsonl_corpus_roundtrip_through_provider() {
    let raw = r#"
{"id":"docA","title":"Security Guide","text":"tokens rotated every 24 hours","source_type":"confluence"}

{"id":"att1","title":"policy.pdf","text":"pdf body","source_type":"confluence","parent_id":"docA","is_attachment":true,"attachment_meta":{"filename":"policy.pdf","size_bytes":150000,"mime_type":"application/pdf"}}
"#;
    let entries = parse_jsonl(raw).expect("parse");
    assert_eq!(entries.len(), 2);
    assert!(entries[1].is_attachment);
    assert_eq!(entries[1].attachment_meta.as_ref().unwrap().author, None);

    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("corpus.jsonl");
    fs::write(&path, raw).unwrap();
    let corpus = MemoryCorpus::load_jsonl(&path).expect("load");
    assert_eq!(corpus.entries().len(), 2);
}

#[test]
fn jsonl_error_names_the_line() {
    let err = parse_jsonl("{\"id\":\"a\"}\n").unwrap_err();
    assert!(format!("{err:#}").contains("line 1"));
}

#[test]
fn outcome_parts() {
    let ok: Outcome<u8> = Outcome::Ok(1);
    assert!(!ok.is_degraded());
    let degraded = Outcome::degraded(Stage::Vector, "timeout", 2u8);
    assert!(degraded.is_degraded());
    assert_eq!(*degraded.value(), 2);
    let (v, d) = degraded.into_parts();
    assert_eq!(v, 2);
    assert_eq!(d.unwrap().stage, Stage::Vector);
}
