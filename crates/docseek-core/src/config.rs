//! Configuration loader, typed settings and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (`__` separates nesting: `APP_SEARCH__ALPHA=0.5`). Every setting has a
//! default, so an empty figment yields a valid configuration.
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::SourceType;

pub struct Config {
    figment: Figment,
    base_dir: PathBuf,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        Self::load_from(Path::new("."), &env_name)
    }

    /// Load `config.toml` and the env overlay from `dir`.
    pub fn load_from(dir: &Path, env_name: &str) -> anyhow::Result<Self> {
        let mut figment = Figment::new().merge(Toml::file(dir.join("config.toml")));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment, base_dir: dir.to_path_buf() };
        config.settings()?;
        Ok(config)
    }

    pub fn from_figment(figment: Figment, base_dir: &Path) -> Self {
        Self { figment, base_dir: base_dir.to_path_buf() }
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// Typed, validated settings with defaults for anything not configured.
    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Resolve a configured path against the directory the config came from.
    pub fn resolve_path<S: AsRef<str>>(&self, p: S) -> PathBuf {
        resolve_with_base(&self.base_dir, p)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub search: SearchSettings,
    pub rerank: RerankSettings,
    pub data: DataSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        self.search.validate()?;
        self.rerank.validate()
    }
}

/// What to do with a `limit` outside `[1, max_limit]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitPolicy {
    Clamp,
    Reject,
}

/// Upper bound for every `*_timeout_ms` setting (one hour).
pub const MAX_TIMEOUT_MS: u64 = 3_600_000;

fn check_timeout(key: &str, ms: u64) -> Result<()> {
    if ms > MAX_TIMEOUT_MS {
        return Err(Error::InvalidConfig(format!("{key} must be <= {MAX_TIMEOUT_MS}, got {ms}")));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Vector weight in fusion; `1 - alpha` goes to the lexical signal.
    pub alpha: f32,
    pub bm25_k1: f32,
    pub bm25_b: f32,
    pub stop_words: bool,
    pub default_limit: usize,
    pub max_limit: usize,
    pub limit_policy: LimitPolicy,
    /// Candidates requested from each retriever before fusion.
    pub candidate_pool: usize,
    pub query_timeout_ms: u64,
    pub lexical_build_timeout_ms: u64,
    pub vector_attempts: u32,
    pub vector_backoff_ms: u64,
    pub snippet_chars: usize,
    pub hierarchy_source_types: Vec<SourceType>,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            alpha: 0.7,
            bm25_k1: 1.5,
            bm25_b: 0.75,
            stop_words: true,
            default_limit: 10,
            max_limit: 100,
            limit_policy: LimitPolicy::Clamp,
            candidate_pool: 100,
            query_timeout_ms: 5_000,
            lexical_build_timeout_ms: 2_000,
            vector_attempts: 3,
            vector_backoff_ms: 50,
            snippet_chars: 300,
            hierarchy_source_types: vec![SourceType::Confluence, SourceType::LocalFile],
        }
    }
}

impl SearchSettings {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(Error::InvalidConfig(format!("search.alpha must be in [0, 1], got {}", self.alpha)));
        }
        if self.bm25_k1 < 0.0 || !(0.0..=1.0).contains(&self.bm25_b) {
            return Err(Error::InvalidConfig(format!(
                "search.bm25_k1 must be >= 0 and search.bm25_b in [0, 1], got k1={} b={}",
                self.bm25_k1, self.bm25_b
            )));
        }
        if self.max_limit == 0 {
            return Err(Error::InvalidConfig("search.max_limit must be >= 1".into()));
        }
        if self.default_limit == 0 || self.default_limit > self.max_limit {
            return Err(Error::InvalidConfig(format!(
                "search.default_limit must be in [1, {}], got {}",
                self.max_limit, self.default_limit
            )));
        }
        if self.candidate_pool == 0 || self.vector_attempts == 0 {
            return Err(Error::InvalidConfig("search.candidate_pool and search.vector_attempts must be >= 1".into()));
        }
        check_timeout("search.query_timeout_ms", self.query_timeout_ms)?;
        check_timeout("search.lexical_build_timeout_ms", self.lexical_build_timeout_ms)
    }

    pub fn supports_hierarchy(&self, source_type: SourceType) -> bool {
        self.hierarchy_source_types.contains(&source_type)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankSettings {
    pub enabled: bool,
    /// Weight of the cross-encoder score; the rest goes to the fused score.
    pub weight: f32,
    pub batch_size: usize,
    /// Fused candidates handed to the reranker. Unset: `max(limit, 50)`.
    pub input_size: Option<usize>,
    pub timeout_ms: u64,
    pub model_dir: Option<String>,
}

impl Default for RerankSettings {
    fn default() -> Self {
        Self { enabled: false, weight: 1.0, batch_size: 32, input_size: None, timeout_ms: 2_000, model_dir: None }
    }
}

impl RerankSettings {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.weight) {
            return Err(Error::InvalidConfig(format!("rerank.weight must be in [0, 1], got {}", self.weight)));
        }
        if self.batch_size == 0 || self.input_size == Some(0) {
            return Err(Error::InvalidConfig("rerank.batch_size and rerank.input_size must be >= 1".into()));
        }
        check_timeout("rerank.timeout_ms", self.timeout_ms)
    }

    /// Number of fused candidates kept for the rerank stage (or the output
    /// when reranking is off).
    pub fn input_size(&self, limit: usize, reranking: bool) -> usize {
        if !reranking {
            return limit;
        }
        self.input_size.unwrap_or_else(|| limit.max(50))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    /// JSON-lines file of corpus entries.
    pub corpus_path: String,
    pub lancedb_dir: String,
    pub table: String,
    pub embed_model_dir: Option<String>,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            corpus_path: "data/corpus.jsonl".to_string(),
            lancedb_dir: "data/lancedb".to_string(),
            table: "entries".to_string(),
            embed_model_dir: None,
        }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
