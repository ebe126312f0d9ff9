//! One viewing session: the current page and everything drawn, noted and read on it.
//!
//! The session is synchronous. Each input returns the [`Effect`]s the host must
//! carry out (render, repaint, persist, arm a timer, notify the embedding page)
//! and async results come back through [`ViewerSession::completed`].

use std::rc::Rc;

use serde::Serialize;

use pagemark_shared::{progress_percentage, Point, StickyNote};

use crate::config::ViewerConfig;
use crate::error::ViewerError;
use crate::loader::LoadedDocument;
use crate::notes::{NoteAction, NoteOverlay};
use crate::persistence::{ProgressCache, Reader};
use crate::progress::{resolve_initial_page, ProgressAction, ProgressTracker};
use crate::runtime::{Completion, PersistOp, RemoteState};
use crate::state::Tool;
use crate::stroke_store::StrokeStore;
use crate::surface::{AnnotationSurface, SurfaceAction};

const ANONYMOUS_INK_NOTICE: &str =
    "You are not signed in. Annotations will disappear when you close this document.";

/// Events delivered to the embedding page.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HostEvent {
    NavigateBack,
    #[serde(rename_all = "camelCase")]
    PageChanged {
        page: u32,
        page_count: u32,
        percentage: f32,
    },
    Error {
        kind: String,
        message: String,
    },
    Notice {
        message: String,
    },
}

impl From<&ViewerError> for HostEvent {
    fn from(error: &ViewerError) -> Self {
        HostEvent::Error {
            kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    Render { page: u32 },
    /// Repaint the annotation layer.
    Redraw,
    /// Blank the annotation layer until the page under it is shown.
    ClearInk,
    /// Rebuild the note elements for the current page.
    RefreshNotes,
    ClearError,
    Emit(HostEvent),
    ScheduleProgress { generation: u64, delay_ms: u32 },
    CancelProgressTimer,
    Persist(PersistOp),
}

pub struct ViewerSession {
    document_id: String,
    page_count: u32,
    page: u32,
    /// Last page the renderer put on screen.
    displayed: Option<u32>,
    authenticated: bool,
    reader: Option<Reader>,
    swipe_threshold: f64,
    store: StrokeStore,
    surface: AnnotationSurface,
    notes: NoteOverlay,
    tracker: ProgressTracker,
    cache: Rc<dyn ProgressCache>,
    closed: bool,
}

impl ViewerSession {
    /// `remote` decides whether anything leaves the device; see [`crate::runtime::prepare`].
    pub fn new(
        document: &LoadedDocument,
        user_id: Option<String>,
        remote: &RemoteState,
        config: &ViewerConfig,
        cache: Rc<dyn ProgressCache>,
    ) -> Self {
        let authenticated = user_id.is_some();
        let synced_user = user_id.filter(|_| remote.online);
        let reader = synced_user
            .as_ref()
            .map(|user| Reader::new(document.document_id.clone(), user.clone()));
        let mut tracker = ProgressTracker::new(document.page_count, config.quiet_period_ms);
        tracker.enable_remote(reader.is_some() && remote.in_reading_set);
        if let Some(progress) = &remote.progress {
            tracker.seed_persisted(progress);
        }
        Self {
            document_id: document.document_id.clone(),
            page_count: document.page_count,
            page: 1,
            displayed: None,
            authenticated,
            reader,
            swipe_threshold: config.swipe_threshold_px,
            store: StrokeStore::new(document.document_id.clone(), synced_user),
            surface: AnnotationSurface::new(config),
            notes: NoteOverlay::new(config),
            tracker,
            cache,
            closed: false,
        }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    /// Ink, notes and input belong to the current page only once it is on screen.
    pub fn page_shown(&self) -> bool {
        self.displayed == Some(self.page)
    }

    pub fn store(&self) -> &StrokeStore {
        &self.store
    }

    pub fn surface(&self) -> &AnnotationSurface {
        &self.surface
    }

    pub fn notes(&self) -> &NoteOverlay {
        &self.notes
    }

    /// Live drag, resize and typing go straight to the overlay; only their
    /// completion goes through the session.
    pub fn notes_mut(&mut self) -> &mut NoteOverlay {
        &mut self.notes
    }

    pub fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    /// Notes to show; empty while the current page is still rendering.
    pub fn current_notes(&self) -> Vec<StickyNote> {
        if !self.page_shown() {
            return Vec::new();
        }
        self.notes.notes_on(self.page).cloned().collect()
    }

    /// Shows the initial page: remote record, then this device's record, then page 1.
    /// Opening does not count as a page change.
    pub fn open(&mut self, remote: &RemoteState) -> Vec<Effect> {
        let local = self.cache.read(&self.document_id);
        self.page = resolve_initial_page(remote.progress.as_ref(), local.as_ref(), self.page_count);
        self.tracker.display(self.page);
        let mut effects = vec![Effect::Render { page: self.page }];
        if let Some(reader) = &self.reader {
            effects.push(Effect::Persist(PersistOp::LoadNotes {
                reader: reader.clone(),
            }));
        }
        self.load_page_strokes(&mut effects);
        effects.push(Effect::RefreshNotes);
        effects.push(self.page_event());
        effects
    }

    pub fn go_to_page(&mut self, page: u32, now_ms: u64) -> Vec<Effect> {
        if self.closed {
            return Vec::new();
        }
        if page == 0 || page > self.page_count {
            let error = ViewerError::PageOutOfRange {
                page,
                page_count: self.page_count,
            };
            log::debug!("{error}");
            return Vec::new();
        }
        if page == self.page {
            return Vec::new();
        }
        let mut effects = Vec::new();
        let leaving = self.page;
        let actions = self.surface.abort(&mut self.store, leaving);
        self.surface_effects(leaving, actions, &mut effects);
        effects.retain(|effect| !matches!(effect, Effect::Redraw));
        self.notes.cancel_interaction();

        self.page = page;
        effects.push(Effect::Render { page });
        self.load_page_strokes(&mut effects);
        effects.push(Effect::ClearInk);
        effects.push(Effect::RefreshNotes);
        for action in self.tracker.page_changed(page, now_ms) {
            match action {
                ProgressAction::WriteLocal(progress) => {
                    self.cache.write(&self.document_id, &progress)
                }
                ProgressAction::ScheduleRemote {
                    generation,
                    delay_ms,
                } => effects.push(Effect::ScheduleProgress {
                    generation,
                    delay_ms,
                }),
                ProgressAction::CancelTimer => effects.push(Effect::CancelProgressTimer),
            }
        }
        effects.push(self.page_event());
        effects
    }

    pub fn next_page(&mut self, now_ms: u64) -> Vec<Effect> {
        if self.page >= self.page_count {
            return Vec::new();
        }
        self.go_to_page(self.page + 1, now_ms)
    }

    pub fn previous_page(&mut self, now_ms: u64) -> Vec<Effect> {
        if self.page <= 1 {
            return Vec::new();
        }
        self.go_to_page(self.page - 1, now_ms)
    }

    /// A finished horizontal touch gesture. Ignored in drawing mode.
    pub fn swipe(&mut self, dx: f64, dy: f64, now_ms: u64) -> Vec<Effect> {
        if self.surface.suppresses_navigation()
            || dx.abs() < self.swipe_threshold
            || dx.abs() <= dy.abs()
        {
            return Vec::new();
        }
        if dx < 0.0 {
            self.next_page(now_ms)
        } else {
            self.previous_page(now_ms)
        }
    }

    /// After a failed render the previous bitmap stays up, so the current page
    /// takes no ink or notes until a later render succeeds.
    pub fn render_finished(&mut self, page: u32, result: Result<u32, ViewerError>) -> Vec<Effect> {
        match result {
            Ok(_) => {
                self.displayed = Some(page);
                if page == self.page {
                    vec![Effect::ClearError, Effect::Redraw, Effect::RefreshNotes]
                } else {
                    Vec::new()
                }
            }
            Err(error) if error.is_cancellation() => Vec::new(),
            Err(error) => {
                log::error!("page {page}: {error}");
                vec![Effect::Emit(HostEvent::from(&error))]
            }
        }
    }

    pub fn set_drawing_mode(&mut self, enabled: bool) -> Vec<Effect> {
        let mut effects = Vec::new();
        if !enabled {
            let actions = self.surface.abort(&mut self.store, self.page);
            self.surface_effects(self.page, actions, &mut effects);
        }
        if self.surface.set_drawing_mode(enabled, self.authenticated) {
            effects.push(Effect::Emit(HostEvent::Notice {
                message: ANONYMOUS_INK_NOTICE.to_string(),
            }));
        }
        effects
    }

    pub fn set_tool(&mut self, tool: Tool) -> Vec<Effect> {
        self.surface.set_tool(tool);
        self.redraw()
    }

    pub fn set_color(&mut self, color: String) {
        self.surface.set_color(color);
    }

    pub fn set_width(&mut self, width: f32) {
        self.surface.set_width(width);
    }

    pub fn pointer_down(&mut self, pointer_id: i32, point: Point) -> Vec<Effect> {
        if !self.page_shown() {
            return Vec::new();
        }
        let actions = self
            .surface
            .pointer_down(pointer_id, point, &mut self.store, self.page);
        let mut effects = Vec::new();
        self.surface_effects(self.page, actions, &mut effects);
        effects
    }

    pub fn pointer_move(&mut self, pointer_id: i32, point: Point) -> Vec<Effect> {
        let actions = self
            .surface
            .pointer_move(pointer_id, point, &mut self.store, self.page);
        let mut effects = Vec::new();
        self.surface_effects(self.page, actions, &mut effects);
        effects
    }

    /// Also used for `pointercancel`.
    pub fn pointer_up(&mut self, pointer_id: i32) -> Vec<Effect> {
        let actions = self
            .surface
            .pointer_up(pointer_id, &mut self.store, self.page);
        let mut effects = Vec::new();
        self.surface_effects(self.page, actions, &mut effects);
        effects
    }

    pub fn add_note(&mut self) -> Vec<Effect> {
        if !self.page_shown() {
            return Vec::new();
        }
        let action = self.notes.create(self.page);
        self.note_effects(Some(action))
    }

    pub fn finish_note_drag(&mut self) -> Vec<Effect> {
        let action = self.notes.end_drag();
        self.note_effects(action)
    }

    pub fn finish_note_resize(&mut self) -> Vec<Effect> {
        let action = self.notes.end_resize();
        self.note_effects(action)
    }

    /// The editor already shows the text, so only the write goes out.
    pub fn commit_note_text(&mut self, id: &str) -> Vec<Effect> {
        let action = self.notes.commit_text(id);
        let mut effects = self.note_effects(action);
        effects.retain(|effect| !matches!(effect, Effect::RefreshNotes));
        effects
    }

    pub fn delete_note(&mut self, id: &str, confirm: impl FnOnce(&StickyNote) -> bool) -> Vec<Effect> {
        let action = self.notes.delete(id, confirm);
        self.note_effects(action)
    }

    /// The debounce timer armed by `ScheduleProgress` elapsed.
    pub fn progress_timer_fired(&mut self, generation: u64) -> Vec<Effect> {
        let (Some(reader), Some(patch)) = (&self.reader, self.tracker.fire(generation)) else {
            return Vec::new();
        };
        vec![Effect::Persist(PersistOp::WriteProgress {
            reader: reader.clone(),
            patch,
        })]
    }

    pub fn completed(&mut self, completion: Completion) -> Vec<Effect> {
        if self.closed {
            return Vec::new();
        }
        match completion {
            Completion::Done | Completion::Failed(_) => Vec::new(),
            Completion::StrokesLoaded { page, strokes } => {
                self.store.adopt(page, strokes);
                if page == self.page {
                    self.redraw()
                } else {
                    Vec::new()
                }
            }
            Completion::NotesLoaded(notes) => {
                self.notes.adopt(notes);
                vec![Effect::RefreshNotes]
            }
            Completion::ProgressWritten(patch) => {
                self.tracker.remote_succeeded(patch);
                Vec::new()
            }
            Completion::ProgressFailed(patch) => match self.tracker.remote_failed(patch) {
                Some(message) => vec![Effect::Emit(HostEvent::Notice {
                    message: message.to_string(),
                })],
                None => Vec::new(),
            },
        }
    }

    /// Drops unfinished input and disarms the progress timer. Later calls are no-ops.
    pub fn teardown(&mut self) -> Vec<Effect> {
        if self.closed {
            return Vec::new();
        }
        self.closed = true;
        self.notes.cancel_interaction();
        let mut effects = Vec::new();
        let actions = self.surface.abort(&mut self.store, self.page);
        self.surface_effects(self.page, actions, &mut effects);
        effects.retain(|effect| matches!(effect, Effect::Persist(_)));
        if self.tracker.teardown() {
            effects.push(Effect::CancelProgressTimer);
        }
        effects
    }

    fn redraw(&self) -> Vec<Effect> {
        if self.page_shown() {
            vec![Effect::Redraw]
        } else {
            Vec::new()
        }
    }

    fn page_event(&self) -> Effect {
        Effect::Emit(HostEvent::PageChanged {
            page: self.page,
            page_count: self.page_count,
            percentage: progress_percentage(self.page, self.page_count),
        })
    }

    fn load_page_strokes(&self, effects: &mut Vec<Effect>) {
        if self.store.is_loaded(self.page) {
            return;
        }
        if let Some(key) = self.store.key(self.page) {
            effects.push(Effect::Persist(PersistOp::LoadStrokes { key }));
        }
    }

    fn surface_effects(&self, page: u32, actions: Vec<SurfaceAction>, effects: &mut Vec<Effect>) {
        for action in actions {
            match action {
                SurfaceAction::Redraw => effects.push(Effect::Redraw),
                SurfaceAction::PersistStroke(stroke) => {
                    if let Some(key) = self.store.key(page) {
                        effects.push(Effect::Persist(PersistOp::InsertStroke { key, stroke }));
                    }
                }
                SurfaceAction::ReplacePage(strokes) => {
                    if let Some(key) = self.store.key(page) {
                        effects.push(Effect::Persist(PersistOp::ReplaceStrokes { key, strokes }));
                    }
                }
            }
        }
    }

    fn note_effects(&self, action: Option<NoteAction>) -> Vec<Effect> {
        let Some(action) = action else {
            return Vec::new();
        };
        let mut effects = vec![Effect::RefreshNotes];
        let Some(reader) = self.reader.clone() else {
            return effects;
        };
        let op = match action {
            NoteAction::Insert(note) => PersistOp::InsertNote { reader, note },
            NoteAction::Update { id, update } => PersistOp::UpdateNote { reader, id, update },
            NoteAction::Delete { id } => PersistOp::DeleteNote { reader, id },
        };
        effects.push(Effect::Persist(op));
        effects
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use futures::channel::oneshot;
    use futures::executor::{block_on, LocalPool, LocalSpawner};
    use futures::task::LocalSpawnExt;
    use pagemark_shared::{ReadingProgress, Stroke, StrokeTool};

    use super::*;
    use crate::loader::ByteOrigin;
    use crate::persistence::testing::MemoryApi;
    use crate::persistence::MemoryCache;
    use crate::runtime::{execute, prepare, PersistQueue};

    fn document(page_count: u32, origin: ByteOrigin) -> LoadedDocument {
        LoadedDocument {
            document_id: "doc".into(),
            page_count,
            origin,
        }
    }

    fn online() -> RemoteState {
        RemoteState {
            online: true,
            in_reading_set: true,
            progress: None,
        }
    }

    fn session(remote: &RemoteState, user: Option<&str>) -> (ViewerSession, Rc<MemoryCache>) {
        let cache = Rc::new(MemoryCache::new());
        let session = ViewerSession::new(
            &document(10, ByteOrigin::Network),
            user.map(str::to_string),
            remote,
            &ViewerConfig::default(),
            cache.clone(),
        );
        (session, cache)
    }

    /// The renderer finished the current page.
    fn show(session: &mut ViewerSession) -> Vec<Effect> {
        let page = session.page();
        session.render_finished(page, Ok(page))
    }

    fn draw(session: &mut ViewerSession, pointer_id: i32, y: f32) -> Vec<Effect> {
        let mut effects = session.pointer_down(pointer_id, Point::new(0.1, y));
        effects.extend(session.pointer_move(pointer_id, Point::new(0.5, y)));
        effects.extend(session.pointer_move(pointer_id, Point::new(0.9, y)));
        effects.extend(session.pointer_up(pointer_id));
        effects
    }

    fn persisted(effects: &[Effect]) -> Vec<&PersistOp> {
        effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::Persist(op) => Some(op),
                _ => None,
            })
            .collect()
    }

    fn scheduled(effects: &[Effect]) -> Option<u64> {
        effects.iter().rev().find_map(|effect| match effect {
            Effect::ScheduleProgress { generation, .. } => Some(*generation),
            _ => None,
        })
    }

    /// Runs every persistence effect against `api`, feeding completions back.
    fn drain(session: &mut ViewerSession, api: &MemoryApi, effects: Vec<Effect>) -> Vec<Effect> {
        let mut emitted = Vec::new();
        let mut queue = effects;
        while !queue.is_empty() {
            let mut next = Vec::new();
            for effect in queue {
                match effect {
                    Effect::Persist(op) => {
                        let completion = block_on(execute(api, op));
                        next.extend(session.completed(completion));
                    }
                    other => emitted.push(other),
                }
            }
            queue = next;
        }
        emitted
    }

    /// Queues persistence effects the way the browser shell does: one ordered
    /// queue, drained by a single task, completions fed back into the session.
    fn enqueue(
        effects: Vec<Effect>,
        queue: &Rc<PersistQueue>,
        api: &Rc<MemoryApi>,
        session: &Rc<RefCell<ViewerSession>>,
        spawner: &LocalSpawner,
    ) {
        for effect in effects {
            let Effect::Persist(op) = effect else {
                continue;
            };
            if !queue.push(op) {
                continue;
            }
            let (queue, api, session) = (queue.clone(), api.clone(), session.clone());
            let inner = spawner.clone();
            spawner
                .spawn_local(async move {
                    let draining = queue.clone();
                    draining
                        .drain(api.as_ref(), |completion| {
                            let effects = session.borrow_mut().completed(completion);
                            enqueue(effects, &queue, &api, &session, &inner);
                        })
                        .await;
                })
                .unwrap();
        }
    }

    #[test]
    fn reading_to_the_last_page_records_full_progress() {
        let remote = online();
        let (mut session, cache) = session(&remote, Some("reader"));
        session.open(&remote);
        let effects = session.go_to_page(10, 1_000);
        assert!(effects.contains(&Effect::Render { page: 10 }));
        let stored = cache.read("doc").expect("written locally");
        assert_eq!(stored.page, 10);
        assert_eq!(stored.percentage, 100.0);
        assert!(effects.contains(&Effect::Emit(HostEvent::PageChanged {
            page: 10,
            page_count: 10,
            percentage: 100.0
        })));
    }

    #[test]
    fn offline_open_never_calls_the_api() {
        let api = MemoryApi::new();
        let cache = Rc::new(MemoryCache::new());
        let document = document(8, ByteOrigin::Offline);
        let remote = block_on(prepare(&api, &document, Some("reader")));
        let mut session = ViewerSession::new(
            &document,
            Some("reader".into()),
            &remote,
            &ViewerConfig::default(),
            cache.clone(),
        );
        let mut effects = session.open(&remote);
        effects.extend(session.next_page(1));
        effects.extend(session.next_page(2));
        effects.extend(show(&mut session));
        effects.extend(session.set_drawing_mode(true));
        effects.extend(session.pointer_down(1, Point::new(0.1, 0.1)));
        effects.extend(session.pointer_move(1, Point::new(0.3, 0.3)));
        effects.extend(session.pointer_up(1));
        effects.extend(session.add_note());

        assert!(persisted(&effects).is_empty());
        assert!(scheduled(&effects).is_none());
        drain(&mut session, &api, effects);
        assert_eq!(api.call_count(), 0);
        assert_eq!(cache.read("doc").map(|p| p.page), Some(3));
        assert_eq!(session.store().strokes(3).len(), 1);
    }

    #[test]
    fn quick_page_flips_write_progress_once() {
        let api = MemoryApi::new();
        let remote = online();
        let (mut session, _) = session(&remote, Some("reader"));
        session.open(&remote);
        session.go_to_page(3, 0);
        let mut generations = Vec::new();
        for (page, at) in [(4, 300), (5, 700)] {
            generations.extend(scheduled(&session.go_to_page(page, at)));
        }
        let mut writes = Vec::new();
        for generation in generations {
            writes.extend(session.progress_timer_fired(generation));
        }
        assert_eq!(writes.len(), 1);
        drain(&mut session, &api, writes);
        assert_eq!(api.patches.borrow().len(), 1);
        assert_eq!(api.patches.borrow()[0].page, 5);
        assert_eq!(api.patches.borrow()[0].percentage, 50.0);
    }

    #[test]
    fn remote_progress_needs_the_reading_set() {
        let remote = RemoteState {
            online: true,
            in_reading_set: false,
            progress: None,
        };
        let (mut session, cache) = session(&remote, Some("reader"));
        session.open(&remote);
        let effects = session.go_to_page(2, 0);
        assert!(scheduled(&effects).is_none());
        assert_eq!(cache.read("doc").map(|p| p.page), Some(2));
    }

    #[test]
    fn initial_page_prefers_the_remote_record() {
        let remote = RemoteState {
            progress: Some(ReadingProgress {
                page: 7,
                percentage: 70.0,
                updated_at: 1,
            }),
            ..online()
        };
        let (mut session, cache) = session(&remote, Some("reader"));
        cache.write(
            "doc",
            &ReadingProgress {
                page: 2,
                percentage: 20.0,
                updated_at: 2,
            },
        );
        let effects = session.open(&remote);
        assert_eq!(session.page(), 7);
        assert_eq!(effects[0], Effect::Render { page: 7 });
        // Coming back to the page the server already holds sends nothing.
        session.go_to_page(8, 0);
        let back = session.go_to_page(7, 0);
        assert!(scheduled(&back).is_none());
    }

    #[test]
    fn erased_stroke_set_matches_the_server() {
        let api = MemoryApi::new();
        let remote = online();
        let (mut session, _) = session(&remote, Some("reader"));
        let effects = session.open(&remote);
        drain(&mut session, &api, effects);
        show(&mut session);
        session.set_drawing_mode(true);

        let mut effects = Vec::new();
        for (id, y) in [(1, 0.2), (2, 0.5), (3, 0.8)] {
            effects.extend(draw(&mut session, id, y));
        }
        drain(&mut session, &api, effects);

        session.set_tool(Tool::Eraser);
        let mut effects = session.pointer_down(9, Point::new(0.5, 0.5));
        effects.extend(session.pointer_up(9));
        drain(&mut session, &api, effects);

        let page = session.page();
        let local = session.store().strokes(page).to_vec();
        assert_eq!(local.len(), 2);
        assert_eq!(api.strokes.borrow()[&page], local);
    }

    #[test]
    fn erase_during_a_slow_insert_still_matches_the_server() {
        let api = Rc::new(MemoryApi::new());
        let remote = online();
        let (mut session, _) = session(&remote, Some("reader"));
        let effects = session.open(&remote);
        drain(&mut session, &api, effects);
        show(&mut session);
        session.set_drawing_mode(true);

        let session = Rc::new(RefCell::new(session));
        let queue = Rc::new(PersistQueue::new());
        let mut pool = LocalPool::new();
        let spawner = pool.spawner();
        let (release, gate) = oneshot::channel();
        *api.insert_gate.borrow_mut() = Some(gate);

        let first = draw(&mut session.borrow_mut(), 1, 0.2);
        enqueue(first, &queue, &api, &session, &spawner);
        pool.run_until_stalled();
        let second = draw(&mut session.borrow_mut(), 2, 0.8);
        enqueue(second, &queue, &api, &session, &spawner);

        session.borrow_mut().set_tool(Tool::Eraser);
        let mut erase = session.borrow_mut().pointer_down(9, Point::new(0.5, 0.2));
        erase.extend(session.borrow_mut().pointer_up(9));
        assert!(matches!(
            persisted(&erase).as_slice(),
            [PersistOp::ReplaceStrokes { .. }]
        ));
        enqueue(erase, &queue, &api, &session, &spawner);
        pool.run_until_stalled();
        assert!(api.strokes.borrow().get(&1).is_none());

        release.send(()).unwrap();
        pool.run();
        let session = session.borrow();
        let local = session.store().strokes(1).to_vec();
        assert_eq!(local.len(), 1);
        assert_eq!(api.strokes.borrow()[&1], local);
        assert!(queue.is_empty());
    }

    #[test]
    fn new_page_takes_no_ink_until_it_is_shown() {
        let api = MemoryApi::new();
        api.strokes.borrow_mut().insert(
            2,
            vec![Stroke {
                id: "old".into(),
                color: "#000".into(),
                width: 2.0,
                tool: StrokeTool::Pen,
                points: vec![Point::new(0.1, 0.1), Point::new(0.2, 0.2)],
            }],
        );
        let remote = online();
        let (mut session, _) = session(&remote, Some("reader"));
        let effects = session.open(&remote);
        drain(&mut session, &api, effects);
        show(&mut session);
        session.set_drawing_mode(true);

        let effects = session.go_to_page(2, 0);
        assert!(effects.contains(&Effect::ClearInk));
        let effects = drain(&mut session, &api, effects);
        assert!(!effects.contains(&Effect::Redraw));
        assert_eq!(session.store().strokes(2).len(), 1);
        assert!(!session.page_shown());
        assert!(session.pointer_down(1, Point::new(0.3, 0.3)).is_empty());
        assert!(!session.surface().gesture_active());
        assert!(session.add_note().is_empty());

        let failed = session.render_finished(2, Err(ViewerError::RenderFailed("bad".into())));
        assert!(!failed.contains(&Effect::Redraw));
        assert!(session.pointer_down(1, Point::new(0.3, 0.3)).is_empty());

        let shown = session.render_finished(2, Ok(2));
        assert!(shown.contains(&Effect::Redraw));
        assert!(shown.contains(&Effect::RefreshNotes));
        assert!(session.page_shown());
        session.pointer_down(1, Point::new(0.3, 0.3));
        assert!(session.surface().gesture_active());
    }

    #[test]
    fn stroke_erased_mid_gesture_persists_nothing() {
        let remote = online();
        let (mut session, _) = session(&remote, Some("reader"));
        session.open(&remote);
        show(&mut session);
        session.set_drawing_mode(true);
        let mut effects = session.pointer_down(1, Point::new(0.2, 0.2));
        effects.extend(session.pointer_move(1, Point::new(0.3, 0.3)));
        effects.extend(session.pointer_move(1, Point::new(0.4, 0.4)));
        effects.extend(session.set_tool(Tool::Eraser));
        effects.extend(session.pointer_move(1, Point::new(0.3, 0.3)));
        effects.extend(session.pointer_up(1));
        assert!(persisted(&effects).is_empty());
    }

    #[test]
    fn anonymous_drawing_warns_once_and_stays_local() {
        let remote = RemoteState::default();
        let (mut session, _) = session(&remote, None);
        session.open(&remote);
        show(&mut session);
        let first = session.set_drawing_mode(true);
        assert!(matches!(first.as_slice(), [Effect::Emit(HostEvent::Notice { .. })]));
        session.set_drawing_mode(false);
        assert!(session.set_drawing_mode(true).is_empty());
        let mut effects = session.pointer_down(1, Point::new(0.1, 0.1));
        effects.extend(session.pointer_move(1, Point::new(0.2, 0.2)));
        effects.extend(session.pointer_up(1));
        assert!(persisted(&effects).is_empty());
        assert_eq!(session.store().strokes(1).len(), 1);
    }

    #[test]
    fn swipes_turn_pages_only_outside_drawing_mode() {
        let remote = RemoteState::default();
        let (mut session, _) = session(&remote, None);
        session.open(&remote);
        session.swipe(-120.0, 10.0, 0);
        assert_eq!(session.page(), 2);
        session.swipe(120.0, 10.0, 0);
        assert_eq!(session.page(), 1);
        session.swipe(-30.0, 0.0, 0);
        session.swipe(-100.0, 150.0, 0);
        assert_eq!(session.page(), 1);
        session.set_drawing_mode(true);
        session.swipe(-120.0, 0.0, 0);
        assert_eq!(session.page(), 1);
    }

    #[test]
    fn progress_failure_notifies_once() {
        let api = MemoryApi::new();
        api.fail.set(true);
        let remote = online();
        let (mut session, _) = session(&remote, Some("reader"));
        session.open(&remote);
        let mut notices = 0;
        for page in [2, 3, 4] {
            let generation = scheduled(&session.go_to_page(page, 0)).unwrap();
            let writes = session.progress_timer_fired(generation);
            notices += drain(&mut session, &api, writes)
                .iter()
                .filter(|effect| matches!(effect, Effect::Emit(HostEvent::Notice { .. })))
                .count();
        }
        assert_eq!(notices, 1);
        assert_eq!(api.call_count(), 3);
    }

    #[test]
    fn teardown_disarms_the_progress_timer() {
        let remote = online();
        let (mut session, _) = session(&remote, Some("reader"));
        session.open(&remote);
        let generation = scheduled(&session.go_to_page(2, 0)).unwrap();
        assert_eq!(session.teardown(), vec![Effect::CancelProgressTimer]);
        assert!(session.progress_timer_fired(generation).is_empty());
        assert!(session.go_to_page(3, 0).is_empty());
    }

    #[test]
    fn failed_render_is_reported_but_cancellation_is_not() {
        let remote = RemoteState::default();
        let (mut session, _) = session(&remote, None);
        session.open(&remote);
        assert!(session
            .render_finished(1, Err(ViewerError::RenderCancelled))
            .is_empty());
        let effects = session.render_finished(1, Err(ViewerError::RenderFailed("bad".into())));
        assert!(matches!(
            &effects[..],
            [Effect::Emit(HostEvent::Error { kind, .. })] if kind == "render_failed"
        ));
    }

    #[test]
    fn note_lifecycle_persists_each_commit() {
        let api = MemoryApi::new();
        let remote = online();
        let (mut session, _) = session(&remote, Some("reader"));
        let effects = session.open(&remote);
        drain(&mut session, &api, effects);
        show(&mut session);

        let effects = session.add_note();
        drain(&mut session, &api, effects);
        let id = session.current_notes()[0].id.clone();
        session.notes_mut().edit_text(&id, "remember this".into());
        let effects = session.commit_note_text(&id);
        drain(&mut session, &api, effects);
        assert_eq!(api.notes.borrow()[0].text, "remember this");

        assert!(persisted(&session.delete_note(&id, |_| false)).is_empty());
        let effects = session.delete_note(&id, |_| true);
        drain(&mut session, &api, effects);
        assert!(api.notes.borrow().is_empty());
        assert!(session.current_notes().is_empty());
    }
}
