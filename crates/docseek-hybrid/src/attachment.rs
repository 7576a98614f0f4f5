use serde::{Deserialize, Serialize};

use docseek_core::corpus::IndexedCorpus;
use docseek_core::types::{AttachmentInfo, CorpusEntry, EntryId};

/// Post-ranking filters for attachment search. All set conditions must hold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachmentFilter {
    /// Extension (`pdf`, `.PDF`) or MIME type (`application/pdf`).
    pub file_type: Option<String>,
    pub min_size: Option<u64>,
    pub max_size: Option<u64>,
    pub author: Option<String>,
    pub parent_document_id: Option<EntryId>,
}

impl AttachmentFilter {
    pub fn matches(&self, info: &AttachmentInfo) -> bool {
        if let Some(ft) = &self.file_type {
            if !file_type_matches(ft, &info.original_filename, &info.mime_type) { return false; }
        }
        if self.min_size.is_some_and(|min| info.file_size_bytes < min) { return false; }
        if self.max_size.is_some_and(|max| info.file_size_bytes > max) { return false; }
        if let Some(author) = &self.author {
            let same = info.attachment_author.as_deref().is_some_and(|a| a.trim().eq_ignore_ascii_case(author.trim()));
            if !same { return false; }
        }
        if let Some(parent) = &self.parent_document_id {
            if &info.parent_document_id != parent { return false; }
        }
        true
    }
}

fn file_type_matches(wanted: &str, filename: &str, mime: &str) -> bool {
    let wanted = wanted.trim().trim_start_matches('.').to_ascii_lowercase();
    if wanted.is_empty() { return true; }
    let mime = mime.trim().to_ascii_lowercase();
    if wanted.contains('/') {
        return mime == wanted;
    }
    let extension = filename.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    let subtype = mime.split_once('/').map(|(_, sub)| sub.to_string());
    extension.as_deref() == Some(wanted.as_str()) || subtype.as_deref() == Some(wanted.as_str())
}

/// Attachment details for `entry`, or `None` when it is not an attachment,
/// carries no metadata, or its parent cannot be resolved.
pub fn resolve(corpus: &IndexedCorpus, entry: &CorpusEntry) -> Option<AttachmentInfo> {
    if !entry.is_attachment { return None; }
    let meta = entry.attachment_meta.as_ref()?;
    let parent = corpus.get(entry.parent_id.as_deref()?)?;
    Some(AttachmentInfo {
        parent_document_id: parent.id.clone(),
        parent_document_title: parent.title.clone(),
        original_filename: meta.filename.clone(),
        file_size_bytes: meta.size_bytes,
        mime_type: meta.mime_type.clone(),
        attachment_author: meta.author.clone(),
    })
}
