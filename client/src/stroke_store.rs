use std::collections::{HashMap, HashSet};

use pagemark_shared::{sanitize_strokes, PageKey, Stroke};

/// Strokes of one reader on one document, page by page. Pages are filled lazily
/// from the persistence API; strokes drawn before a page finished loading are kept.
#[derive(Debug)]
pub struct StrokeStore {
    document_id: String,
    user_id: Option<String>,
    pages: HashMap<u32, Vec<Stroke>>,
    loaded: HashSet<u32>,
}

impl StrokeStore {
    /// `user_id` is `None` when strokes must stay in session memory.
    pub fn new(document_id: impl Into<String>, user_id: Option<String>) -> Self {
        Self {
            document_id: document_id.into(),
            user_id,
            pages: HashMap::new(),
            loaded: HashSet::new(),
        }
    }

    pub fn key(&self, page: u32) -> Option<PageKey> {
        let user_id = self.user_id.as_ref()?;
        Some(PageKey::new(self.document_id.clone(), page, user_id.clone()))
    }

    pub fn is_persistent(&self) -> bool {
        self.user_id.is_some()
    }

    pub fn strokes(&self, page: u32) -> &[Stroke] {
        self.pages.get(&page).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_loaded(&self, page: u32) -> bool {
        self.loaded.contains(&page)
    }

    /// Marks a page as loaded with the given remote strokes. Local strokes not in
    /// the remote set are appended after them.
    pub fn adopt(&mut self, page: u32, remote: Vec<Stroke>) {
        let mut merged = sanitize_strokes(remote);
        let known: HashSet<String> = merged.iter().map(|stroke| stroke.id.clone()).collect();
        if let Some(local) = self.pages.remove(&page) {
            merged.extend(local.into_iter().filter(|stroke| !known.contains(&stroke.id)));
        }
        self.pages.insert(page, merged);
        self.loaded.insert(page);
    }

    pub fn append(&mut self, page: u32, stroke: Stroke) {
        self.pages.entry(page).or_default().push(stroke);
    }

    /// Keeps strokes for which `keep` is true and returns how many were dropped.
    pub fn retain(&mut self, page: u32, mut keep: impl FnMut(&Stroke) -> bool) -> usize {
        let Some(strokes) = self.pages.get_mut(&page) else {
            return 0;
        };
        let before = strokes.len();
        strokes.retain(|stroke| keep(stroke));
        before - strokes.len()
    }
}
