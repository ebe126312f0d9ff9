//! Seams between the engine and whatever stores annotations and progress.

use std::cell::RefCell;
use std::collections::HashMap;

use async_trait::async_trait;

use pagemark_shared::{
    NoteUpdate, PageKey, ProgressPatch, ReadingEntry, ReadingProgress, StickyNote, Stroke,
};

use crate::error::ApiError;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// One signed-in reader of one document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reader {
    pub document_id: String,
    pub user_id: String,
}

impl Reader {
    pub fn new(document_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            user_id: user_id.into(),
        }
    }
}

#[async_trait(?Send)]
pub trait AnnotationApi {
    async fn list_strokes(&self, key: &PageKey) -> ApiResult<Vec<Stroke>>;
    async fn insert_stroke(&self, key: &PageKey, stroke: &Stroke) -> ApiResult<()>;
    /// Removes every stroke stored under `key`.
    async fn delete_strokes(&self, key: &PageKey) -> ApiResult<()>;

    async fn list_notes(&self, reader: &Reader) -> ApiResult<Vec<StickyNote>>;
    async fn insert_note(&self, reader: &Reader, note: &StickyNote) -> ApiResult<()>;
    async fn update_note(&self, reader: &Reader, id: &str, update: &NoteUpdate) -> ApiResult<()>;
    async fn delete_note(&self, reader: &Reader, id: &str) -> ApiResult<()>;

    /// `None` when the document is not in the reader's reading set.
    async fn read_progress(&self, reader: &Reader) -> ApiResult<Option<ReadingEntry>>;
    async fn patch_progress(&self, reader: &Reader, patch: &ProgressPatch) -> ApiResult<()>;
}

/// Durable per-device copy of the reading position. Writes are synchronous.
pub trait ProgressCache {
    fn read(&self, document_id: &str) -> Option<ReadingProgress>;
    fn write(&self, document_id: &str, progress: &ReadingProgress);
}

pub fn progress_key(document_id: &str) -> String {
    format!("pagemark:progress:{document_id}")
}

pub fn encode_progress(progress: &ReadingProgress) -> Option<String> {
    serde_json::to_string(progress).ok()
}

/// Malformed entries read as absent.
pub fn decode_progress(raw: &str) -> Option<ReadingProgress> {
    serde_json::from_str(raw).ok()
}

/// Used when the browser has no usable `localStorage` (private mode, sandboxed iframes).
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RefCell<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressCache for MemoryCache {
    fn read(&self, document_id: &str) -> Option<ReadingProgress> {
        let entries = self.entries.borrow();
        decode_progress(entries.get(&progress_key(document_id))?)
    }

    fn write(&self, document_id: &str, progress: &ReadingProgress) {
        if let Some(raw) = encode_progress(progress) {
            self.entries
                .borrow_mut()
                .insert(progress_key(document_id), raw);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_is_namespaced_by_document() {
        assert_eq!(progress_key("doc-1"), "pagemark:progress:doc-1");
    }

    #[test]
    fn memory_cache_round_trips_progress() {
        let cache = MemoryCache::new();
        assert_eq!(cache.read("doc"), None);
        let progress = ReadingProgress {
            page: 3,
            percentage: 30.0,
            updated_at: 1_700_000_000_000,
        };
        cache.write("doc", &progress);
        assert_eq!(cache.read("doc"), Some(progress));
        assert_eq!(cache.read("other"), None);
    }

    #[test]
    fn stored_progress_uses_camel_case() {
        let raw = r#"{"page":2,"percentage":20.0,"updatedAt":5}"#;
        assert_eq!(decode_progress(raw).map(|p| p.updated_at), Some(5));
        assert_eq!(decode_progress("not json"), None);
    }
}
