use std::collections::HashMap;
use std::sync::Arc;

use pagemark_shared::{DocumentSnapshot, MAX_ID_LEN};
use tokio::sync::RwLock;

use crate::error::{AppError, Result};
use crate::storage::Storage;

#[derive(Clone)]
pub struct AppState {
    pub documents: Arc<RwLock<HashMap<String, Arc<RwLock<Document>>>>>,
    pub storage: Arc<dyn Storage>,
}

/// Working copy of one document's annotations. `dirty` is set by every write and
/// cleared once the copy has reached storage.
pub struct Document {
    pub snapshot: DocumentSnapshot,
    pub dirty: bool,
}

impl Document {
    pub fn new(snapshot: DocumentSnapshot) -> Self {
        Self {
            snapshot,
            dirty: false,
        }
    }
}

/// Document ids become file names and object keys, so only a conservative
/// character set is accepted.
pub fn normalize_document_id(raw: &str) -> Option<String> {
    let id = raw.trim();
    if id.is_empty() || id.len() > MAX_ID_LEN || id.starts_with('.') {
        return None;
    }
    id.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .then(|| id.to_string())
}

impl AppState {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            documents: Arc::new(RwLock::new(HashMap::new())),
            storage,
        }
    }

    pub async fn document(&self, raw_id: &str) -> Result<Arc<RwLock<Document>>> {
        let document_id = normalize_document_id(raw_id)
            .ok_or_else(|| AppError::BadRequest(format!("invalid document id {raw_id:?}")))?;
        if let Some(document) = self.documents.read().await.get(&document_id) {
            return Ok(document.clone());
        }

        let loaded = self.storage.load(&document_id).await?;
        let snapshot = loaded.unwrap_or_else(|| DocumentSnapshot {
            document_id: document_id.clone(),
            users: Vec::new(),
        });
        let mut documents = self.documents.write().await;
        let document = documents
            .entry(document_id)
            .or_insert_with(|| Arc::new(RwLock::new(Document::new(snapshot))));
        Ok(document.clone())
    }

    /// Writes every dirty document to storage. A document whose save fails stays
    /// dirty for the next pass. Clean documents no request is holding are then
    /// dropped from memory and reloaded on next use. Returns how many documents
    /// were saved.
    pub async fn flush(&self) -> usize {
        let documents = {
            let documents = self.documents.read().await;
            documents
                .iter()
                .map(|(document_id, document)| (document_id.clone(), document.clone()))
                .collect::<Vec<_>>()
        };
        let mut saved = 0;
        for (document_id, document) in documents {
            let snapshot = {
                let mut document = document.write().await;
                if !document.dirty {
                    continue;
                }
                document.dirty = false;
                document.snapshot.clone()
            };
            match self.storage.save(&document_id, &snapshot).await {
                Ok(()) => saved += 1,
                Err(error) => {
                    tracing::error!("failed to save {document_id}: {error}");
                    document.write().await.dirty = true;
                }
            }
        }
        if saved > 0 {
            tracing::debug!("flushed {saved} document(s)");
        }

        let mut documents = self.documents.write().await;
        let before = documents.len();
        documents.retain(|_, document| {
            Arc::strong_count(document) > 1
                || document
                    .try_read()
                    .map(|document| document.dirty)
                    .unwrap_or(true)
        });
        let evicted = before - documents.len();
        if evicted > 0 {
            tracing::debug!("evicted {evicted} clean document(s)");
        }
        saved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FileStorage;

    #[test]
    fn document_ids_are_restricted() {
        assert_eq!(normalize_document_id(" doc-1.v2 "), Some("doc-1.v2".into()));
        assert_eq!(normalize_document_id("../etc/passwd"), None);
        assert_eq!(normalize_document_id("a/b"), None);
        assert_eq!(normalize_document_id(""), None);
        assert_eq!(normalize_document_id(&"x".repeat(MAX_ID_LEN + 1)), None);
    }

    #[tokio::test]
    async fn flush_saves_only_dirty_documents() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(FileStorage::new(dir.path().to_path_buf()));
        let state = AppState::new(storage.clone());

        let clean = state.document("clean").await.unwrap();
        let dirty = state.document("dirty").await.unwrap();
        dirty.write().await.dirty = true;
        assert_eq!(state.flush().await, 1);
        assert!(!dirty.read().await.dirty);
        assert!(!clean.read().await.dirty);
        assert!(storage.load("dirty").await.unwrap().is_some());
        assert!(storage.load("clean").await.unwrap().is_none());
        assert_eq!(state.flush().await, 0);
    }

    #[tokio::test]
    async fn clean_documents_leave_memory_after_flush() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::new(Arc::new(FileStorage::new(dir.path().to_path_buf())));

        let saved = state.document("saved").await.unwrap();
        {
            let mut document = saved.write().await;
            document.snapshot.users.push(Default::default());
            document.dirty = true;
        }
        drop(saved);
        let held = state.document("held").await.unwrap();
        drop(state.document("idle").await.unwrap());

        assert_eq!(state.flush().await, 1);
        let documents = state.documents.read().await;
        assert_eq!(documents.len(), 1);
        assert!(documents.contains_key("held"));
        drop(documents);
        drop(held);

        let reloaded = state.document("saved").await.unwrap();
        assert_eq!(reloaded.read().await.snapshot.users.len(), 1);
        assert!(!reloaded.read().await.dirty);
    }

    #[tokio::test]
    async fn documents_are_loaded_once() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::new(Arc::new(FileStorage::new(dir.path().to_path_buf())));
        let first = state.document("doc-1").await.unwrap();
        let second = state.document("doc-1").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(matches!(
            state.document("bad/id").await,
            Err(AppError::BadRequest(_))
        ));
    }
}
