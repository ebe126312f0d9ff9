//! Executes the persistence work a session asks for.
//!
//! Every operation resolves to a [`Completion`] that is fed back into the
//! session. Failures are logged here and never reach rendering or input.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use pagemark_shared::{
    NoteUpdate, PageKey, ProgressPatch, ReadingProgress, StickyNote, Stroke,
};

use crate::error::{Resource, ViewerError};
use crate::loader::{ByteOrigin, LoadedDocument};
use crate::persistence::{AnnotationApi, Reader};

#[derive(Clone, Debug, PartialEq)]
pub enum PersistOp {
    LoadStrokes { key: PageKey },
    InsertStroke { key: PageKey, stroke: Stroke },
    /// Delete everything stored for the page, then insert `strokes` one by one.
    ReplaceStrokes { key: PageKey, strokes: Vec<Stroke> },
    LoadNotes { reader: Reader },
    InsertNote { reader: Reader, note: StickyNote },
    UpdateNote { reader: Reader, id: String, update: NoteUpdate },
    DeleteNote { reader: Reader, id: String },
    WriteProgress { reader: Reader, patch: ProgressPatch },
}

impl PersistOp {
    pub fn resource(&self) -> Resource {
        match self {
            PersistOp::LoadStrokes { .. }
            | PersistOp::InsertStroke { .. }
            | PersistOp::ReplaceStrokes { .. } => Resource::Stroke,
            PersistOp::LoadNotes { .. }
            | PersistOp::InsertNote { .. }
            | PersistOp::UpdateNote { .. }
            | PersistOp::DeleteNote { .. } => Resource::Note,
            PersistOp::WriteProgress { .. } => Resource::Progress,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Completion {
    Done,
    StrokesLoaded { page: u32, strokes: Vec<Stroke> },
    NotesLoaded(Vec<StickyNote>),
    ProgressWritten(ProgressPatch),
    ProgressFailed(ProgressPatch),
    Failed(ViewerError),
}

pub async fn execute(api: &dyn AnnotationApi, op: PersistOp) -> Completion {
    let resource = op.resource();
    let outcome = match op {
        PersistOp::LoadStrokes { key } => api
            .list_strokes(&key)
            .await
            .map(|strokes| Completion::StrokesLoaded {
                page: key.page,
                strokes,
            }),
        PersistOp::InsertStroke { key, stroke } => {
            api.insert_stroke(&key, &stroke).await.map(|_| Completion::Done)
        }
        PersistOp::ReplaceStrokes { key, strokes } => replace_strokes(api, &key, &strokes).await,
        PersistOp::LoadNotes { reader } => {
            api.list_notes(&reader).await.map(Completion::NotesLoaded)
        }
        PersistOp::InsertNote { reader, note } => {
            api.insert_note(&reader, &note).await.map(|_| Completion::Done)
        }
        PersistOp::UpdateNote { reader, id, update } => api
            .update_note(&reader, &id, &update)
            .await
            .map(|_| Completion::Done),
        PersistOp::DeleteNote { reader, id } => {
            api.delete_note(&reader, &id).await.map(|_| Completion::Done)
        }
        PersistOp::WriteProgress { reader, patch } => {
            return match api.patch_progress(&reader, &patch).await {
                Ok(()) => Completion::ProgressWritten(patch),
                Err(error) => {
                    log::warn!("progress write for {} failed: {error}", reader.document_id);
                    Completion::ProgressFailed(patch)
                }
            };
        }
    };
    outcome.unwrap_or_else(|error| {
        let error = ViewerError::persistence(resource, error);
        log::warn!("{error}");
        Completion::Failed(error)
    })
}

async fn replace_strokes(
    api: &dyn AnnotationApi,
    key: &PageKey,
    strokes: &[Stroke],
) -> std::result::Result<Completion, crate::error::ApiError> {
    api.delete_strokes(key).await?;
    for stroke in strokes {
        api.insert_stroke(key, stroke).await?;
    }
    Ok(Completion::Done)
}

/// Runs operations one at a time, in the order they were queued, so a later
/// write never lands before an earlier one for the same page or note.
#[derive(Debug, Default)]
pub struct PersistQueue {
    pending: RefCell<VecDeque<PersistOp>>,
    draining: Cell<bool>,
}

impl PersistQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when nothing is draining yet and the caller must start [`Self::drain`].
    pub fn push(&self, op: PersistOp) -> bool {
        self.pending.borrow_mut().push_back(op);
        !self.draining.replace(true)
    }

    pub fn len(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.borrow().is_empty()
    }

    /// Executes queued operations until none are left. `on_complete` may queue more.
    pub async fn drain(&self, api: &dyn AnnotationApi, mut on_complete: impl FnMut(Completion)) {
        loop {
            let next = self.pending.borrow_mut().pop_front();
            let Some(op) = next else {
                self.draining.set(false);
                return;
            };
            on_complete(execute(api, op).await);
        }
    }
}

/// What the server knows about this reader before the first page is shown.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RemoteState {
    /// Annotations and progress may be written remotely.
    pub online: bool,
    pub in_reading_set: bool,
    pub progress: Option<ReadingProgress>,
}

/// A document opened from the offline copy, or an anonymous reader, never
/// touches the persistence API.
pub async fn prepare(
    api: &dyn AnnotationApi,
    document: &LoadedDocument,
    user_id: Option<&str>,
) -> RemoteState {
    let Some(user_id) = user_id else {
        return RemoteState::default();
    };
    if document.origin == ByteOrigin::Offline {
        log::info!("{} opened offline; remote sync disabled", document.document_id);
        return RemoteState::default();
    }
    let reader = Reader::new(document.document_id.clone(), user_id);
    match api.read_progress(&reader).await {
        Ok(Some(entry)) => RemoteState {
            online: true,
            in_reading_set: true,
            progress: entry.progress,
        },
        Ok(None) => RemoteState {
            online: true,
            ..RemoteState::default()
        },
        Err(error) => {
            log::warn!("reading progress for {} unavailable: {error}", reader.document_id);
            RemoteState {
                online: true,
                ..RemoteState::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use futures::channel::oneshot;
    use futures::executor::{block_on, LocalPool};
    use futures::task::LocalSpawnExt;
    use pagemark_shared::{Point, ReadingEntry, StrokeTool};

    use super::*;
    use crate::persistence::testing::MemoryApi;

    fn stroke(id: &str) -> Stroke {
        Stroke {
            id: id.into(),
            color: "#000".into(),
            width: 2.0,
            tool: StrokeTool::Pen,
            points: vec![Point::new(0.1, 0.1), Point::new(0.2, 0.2)],
        }
    }

    fn document(origin: ByteOrigin) -> LoadedDocument {
        LoadedDocument {
            document_id: "doc".into(),
            page_count: 10,
            origin,
        }
    }

    #[test]
    fn replace_deletes_then_reinserts() {
        let api = MemoryApi::new();
        let key = PageKey::new("doc", 2, "u");
        api.strokes
            .borrow_mut()
            .insert(2, vec![stroke("a"), stroke("b"), stroke("c")]);
        let op = PersistOp::ReplaceStrokes {
            key,
            strokes: vec![stroke("b")],
        };
        assert_eq!(block_on(execute(&api, op)), Completion::Done);
        assert_eq!(
            *api.calls.borrow(),
            vec!["delete_strokes", "insert_stroke"]
        );
        assert_eq!(api.strokes.borrow()[&2], vec![stroke("b")]);
    }

    #[test]
    fn queue_finishes_writes_in_issue_order() {
        let api = Rc::new(MemoryApi::new());
        let (release, gate) = oneshot::channel();
        *api.insert_gate.borrow_mut() = Some(gate);
        let queue = Rc::new(PersistQueue::new());
        let completions = Rc::new(RefCell::new(Vec::new()));
        let key = PageKey::new("doc", 1, "u");
        let mut pool = LocalPool::new();

        let ops = [
            PersistOp::InsertStroke {
                key: key.clone(),
                stroke: stroke("a"),
            },
            PersistOp::InsertStroke {
                key: key.clone(),
                stroke: stroke("b"),
            },
            PersistOp::ReplaceStrokes {
                key,
                strokes: vec![stroke("b")],
            },
        ];
        let mut drains = 0;
        for op in ops {
            if !queue.push(op) {
                continue;
            }
            drains += 1;
            let (queue, api, completions) = (queue.clone(), api.clone(), completions.clone());
            pool.spawner()
                .spawn_local(async move {
                    queue
                        .drain(api.as_ref(), |completion| {
                            completions.borrow_mut().push(completion)
                        })
                        .await;
                })
                .unwrap();
        }
        assert_eq!(drains, 1);

        pool.run_until_stalled();
        assert_eq!(queue.len(), 2);
        assert!(api.strokes.borrow().get(&1).is_none());

        release.send(()).unwrap();
        pool.run();
        assert_eq!(api.strokes.borrow()[&1], vec![stroke("b")]);
        assert_eq!(
            *api.calls.borrow(),
            vec!["insert_stroke", "insert_stroke", "delete_strokes", "insert_stroke"]
        );
        assert_eq!(completions.borrow().len(), 3);
        assert!(queue.is_empty());
        assert!(queue.push(PersistOp::LoadNotes {
            reader: Reader::new("doc", "u"),
        }));
    }

    #[test]
    fn failures_carry_their_resource() {
        let api = MemoryApi::new();
        api.fail.set(true);
        let op = PersistOp::InsertStroke {
            key: PageKey::new("doc", 1, "u"),
            stroke: stroke("a"),
        };
        let Completion::Failed(error) = block_on(execute(&api, op)) else {
            panic!("expected failure");
        };
        assert!(matches!(
            error,
            ViewerError::PersistenceFailed {
                resource: Resource::Stroke,
                ..
            }
        ));
    }

    #[test]
    fn failed_progress_write_reports_the_patch() {
        let api = MemoryApi::new();
        api.fail.set(true);
        let patch = ProgressPatch {
            page: 4,
            percentage: 40.0,
        };
        let op = PersistOp::WriteProgress {
            reader: Reader::new("doc", "u"),
            patch,
        };
        assert_eq!(block_on(execute(&api, op)), Completion::ProgressFailed(patch));
    }

    #[test]
    fn offline_documents_skip_the_api() {
        let api = MemoryApi::new();
        let state = block_on(prepare(&api, &document(ByteOrigin::Offline), Some("u")));
        assert!(!state.online);
        assert_eq!(api.call_count(), 0);
        let state = block_on(prepare(&api, &document(ByteOrigin::Network), None));
        assert!(!state.online);
        assert_eq!(api.call_count(), 0);
    }

    #[test]
    fn reading_set_membership_comes_from_the_entry() {
        let api = MemoryApi::new();
        let state = block_on(prepare(&api, &document(ByteOrigin::Network), Some("u")));
        assert!(state.online);
        assert!(!state.in_reading_set);

        let progress = ReadingProgress {
            page: 6,
            percentage: 60.0,
            updated_at: 9,
        };
        *api.entry.borrow_mut() = Some(ReadingEntry {
            document_id: "doc".into(),
            progress: Some(progress),
        });
        let state = block_on(prepare(&api, &document(ByteOrigin::Network), Some("u")));
        assert!(state.in_reading_set);
        assert_eq!(state.progress, Some(progress));
    }
}
