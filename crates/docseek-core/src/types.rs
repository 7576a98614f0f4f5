//! Domain types used by the retrieval pipeline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

pub type EntryId = String;

/// Source-type restriction for a query. Empty means "no restriction".
pub type SourceTypeFilter = BTreeSet<SourceType>;

/// Kind of system an entry was ingested from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Git,
    Confluence,
    Jira,
    LocalFile,
    PublicDocs,
}

impl SourceType {
    pub const ALL: [SourceType; 5] = [
        SourceType::Git,
        SourceType::Confluence,
        SourceType::Jira,
        SourceType::LocalFile,
        SourceType::PublicDocs,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Git => "git",
            SourceType::Confluence => "confluence",
            SourceType::Jira => "jira",
            SourceType::LocalFile => "localfile",
            SourceType::PublicDocs => "publicdocs",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        SourceType::ALL
            .into_iter()
            .find(|t| t.as_str() == norm)
            .ok_or_else(|| Error::NotFound(format!("source type '{s}'")))
    }
}

/// File metadata carried by attachment entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentMeta {
    pub filename: String,
    pub size_bytes: u64,
    pub mime_type: String,
    #[serde(default)]
    pub author: Option<String>,
}

/// One retrievable unit of the corpus, owned by the corpus provider.
///
/// - `parent_id`: structural parent (page tree, folder) or, for attachments,
///   the document the file is attached to
/// - `is_attachment`: when true, `parent_id` must resolve to another entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusEntry {
    pub id: EntryId,
    pub title: String,
    pub text: String,
    pub source_type: SourceType,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub parent_id: Option<EntryId>,
    #[serde(default)]
    pub is_attachment: bool,
    #[serde(default)]
    pub attachment_meta: Option<AttachmentMeta>,
}

impl CorpusEntry {
    pub fn new(id: impl Into<String>, title: impl Into<String>, text: impl Into<String>, source_type: SourceType) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            text: text.into(),
            source_type,
            source: String::new(),
            parent_id: None,
            is_attachment: false,
            attachment_meta: None,
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn as_attachment(mut self, parent_id: impl Into<String>, meta: AttachmentMeta) -> Self {
        self.parent_id = Some(parent_id.into());
        self.is_attachment = true;
        self.attachment_meta = Some(meta);
        self
    }

    /// Text fed to the lexical index and the reranker.
    pub fn indexable_text(&self) -> String {
        if self.title.is_empty() {
            self.text.clone()
        } else {
            format!("{}\n{}", self.title, self.text)
        }
    }
}

/// Raw output of one retriever. At least one score is present.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalCandidate {
    pub id: EntryId,
    pub vector_score: Option<f32>,
    pub lexical_score: Option<f32>,
}

/// Candidate after score fusion; `fused_score` is in [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct FusedCandidate {
    pub id: EntryId,
    pub fused_score: f32,
    pub vector_score: Option<f32>,
    pub lexical_score: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchyInfo {
    pub parent_id: Option<EntryId>,
    pub breadcrumb_text: String,
    pub depth: usize,
    pub children_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentInfo {
    pub parent_document_id: EntryId,
    pub parent_document_title: String,
    pub original_filename: String,
    pub file_size_bytes: u64,
    pub mime_type: String,
    pub attachment_author: Option<String>,
}

/// Final, query-scoped result. Enrichment is flattened into the JSON shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    pub id: EntryId,
    pub score: f32,
    pub source_type: SourceType,
    pub title: String,
    pub source: String,
    pub content_snippet: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lexical_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f32>,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub hierarchy: Option<HierarchyInfo>,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<AttachmentInfo>,
}

/// Pipeline stage that may fall back instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Vector,
    Lexical,
    Rerank,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Degradation {
    pub stage: Stage,
    pub reason: String,
}

/// Result of a stage with a defined fallback: either full data, or partial
/// data plus the reason the stage fell back.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Ok(T),
    Degraded(T, Degradation),
}

impl<T> Outcome<T> {
    pub fn degraded(stage: Stage, reason: impl Into<String>, value: T) -> Self {
        Outcome::Degraded(value, Degradation { stage, reason: reason.into() })
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Outcome::Degraded(..))
    }

    pub fn value(&self) -> &T {
        match self {
            Outcome::Ok(v) | Outcome::Degraded(v, _) => v,
        }
    }

    pub fn into_parts(self) -> (T, Option<Degradation>) {
        match self {
            Outcome::Ok(v) => (v, None),
            Outcome::Degraded(v, d) => (v, Some(d)),
        }
    }
}
