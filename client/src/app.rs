use std::cell::{Cell, RefCell};
use std::rc::Rc;

use js_sys::{Function, Reflect};
use serde::Serialize;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::spawn_local;
use web_sys::{
    CanvasRenderingContext2d, Document, Event, HtmlButtonElement, HtmlCanvasElement, HtmlElement,
    HtmlTextAreaElement, KeyboardEvent, PointerEvent, Window,
};

use pagemark_shared::{Point, StickyNote};

use crate::bridge::{CanvasPresenter, JsRasterizer};
use crate::config::MountOptions;
use crate::dom::{
    client_point, client_size, closest_with, context_2d, create, get_element, local_point,
    offset_size, place, set_styles,
};
use crate::error::ViewerError;
use crate::geometry::{fit_bitmap, normalize_point, Rect, Size};
use crate::loader::DocumentLoader;
use crate::local::{JsOfflineBlobs, LocalStorageCache};
use crate::logging;
use crate::net::{HttpApi, NetworkFetcher};
use crate::page_renderer::PageRenderer;
use crate::persistence::{MemoryCache, ProgressCache};
use crate::render::paint_layer;
use crate::runtime::{prepare, PersistOp, PersistQueue};
use crate::session::{Effect, HostEvent, ViewerSession};
use crate::state::Tool;
use crate::util::now_ms;

type Renderer = PageRenderer<JsRasterizer, CanvasPresenter>;

const NOTE_ID: &str = "data-note-id";
const NOTE_ROLE: &str = "data-role";

#[derive(Clone, Copy)]
struct Swipe {
    pointer_id: i32,
    start: (f64, f64),
}

struct Viewer {
    window: Window,
    document: Document,
    options: MountOptions,
    container: HtmlElement,
    stage: HtmlElement,
    page_canvas: HtmlCanvasElement,
    ink_canvas: HtmlCanvasElement,
    ink: CanvasRenderingContext2d,
    notes_layer: HtmlElement,
    page_label: HtmlElement,
    error_box: HtmlElement,
    error_text: HtmlElement,
    notice: HtmlElement,
    on_event: Function,
    rasterizer: Rc<JsRasterizer>,
    loader: DocumentLoader,
    api: Rc<HttpApi>,
    writes: Rc<PersistQueue>,
    cache: Rc<dyn ProgressCache>,
    session: RefCell<Option<ViewerSession>>,
    renderer: RefCell<Option<Rc<Renderer>>>,
    progress_timer: Cell<Option<i32>>,
    swipe: Cell<Option<Swipe>>,
    active_note: RefCell<Option<HtmlElement>>,
    destroyed: Cell<bool>,
}

impl Viewer {
    fn build(
        window: Window,
        document: Document,
        container: HtmlElement,
        options: MountOptions,
        rasterizer: JsValue,
        offline_store: JsValue,
        on_event: Function,
    ) -> Result<Self, JsValue> {
        container.set_inner_html("");
        let root: HtmlElement = create(&document, "div", "pagemark-viewer")?;
        set_styles(
            &root,
            &[
                ("position", "relative"),
                ("display", "flex"),
                ("flex-direction", "column"),
                ("width", "100%"),
                ("height", "100%"),
                ("overflow", "hidden"),
            ],
        );

        let header: HtmlElement = create(&document, "div", "pagemark-header")?;
        let back: HtmlButtonElement = create(&document, "button", "pagemark-back")?;
        back.set_text_content(Some("Back"));
        back.set_attribute("data-action", "back")?;
        let title: HtmlElement = create(&document, "span", "pagemark-title")?;
        title.set_text_content(Some(&options.title));
        let page_label: HtmlElement = create(&document, "span", "pagemark-page")?;
        header.append_child(&back)?;
        header.append_child(&title)?;
        header.append_child(&page_label)?;

        let stage: HtmlElement = create(&document, "div", "pagemark-stage")?;
        set_styles(
            &stage,
            &[
                ("position", "relative"),
                ("flex", "1 1 auto"),
                ("touch-action", "none"),
                ("user-select", "none"),
            ],
        );
        let page_canvas: HtmlCanvasElement = create(&document, "canvas", "pagemark-page-canvas")?;
        set_styles(&page_canvas, &[("position", "absolute")]);
        let ink_canvas: HtmlCanvasElement = create(&document, "canvas", "pagemark-ink")?;
        set_styles(
            &ink_canvas,
            &[("position", "absolute"), ("pointer-events", "none")],
        );
        let notes_layer: HtmlElement = create(&document, "div", "pagemark-notes")?;
        set_styles(
            &notes_layer,
            &[("position", "absolute"), ("pointer-events", "none")],
        );
        stage.append_child(&page_canvas)?;
        stage.append_child(&ink_canvas)?;
        stage.append_child(&notes_layer)?;

        let error_box: HtmlElement = create(&document, "div", "pagemark-error")?;
        error_box.set_attribute("role", "alert")?;
        let error_text: HtmlElement = create(&document, "p", "pagemark-error-text")?;
        let external_link: HtmlElement = create(&document, "a", "pagemark-open-external")?;
        external_link.set_text_content(Some("Open or download the original"));
        external_link.set_attribute("target", "_blank")?;
        external_link.set_attribute("rel", "noopener")?;
        match &options.source_url {
            Some(url) => external_link.set_attribute("href", url)?,
            None => external_link.set_hidden(true),
        }
        let retry: HtmlButtonElement = create(&document, "button", "pagemark-retry")?;
        retry.set_text_content(Some("Retry"));
        retry.set_attribute("data-action", "retry")?;
        error_box.append_child(&error_text)?;
        error_box.append_child(&external_link)?;
        error_box.append_child(&retry)?;
        error_box.set_hidden(true);

        let notice: HtmlElement = create(&document, "div", "pagemark-notice")?;
        notice.set_attribute("role", "status")?;
        notice.set_hidden(true);

        root.append_child(&header)?;
        root.append_child(&stage)?;
        root.append_child(&error_box)?;
        root.append_child(&notice)?;
        container.append_child(&root)?;

        let ink = context_2d(&ink_canvas)?;
        let rasterizer = Rc::new(JsRasterizer::new(rasterizer, document.clone()));
        let loader = DocumentLoader::new(
            Rc::new(NetworkFetcher),
            Rc::new(JsOfflineBlobs::new(offline_store)),
            rasterizer.clone(),
        );
        let cache: Rc<dyn ProgressCache> = match LocalStorageCache::open(&window) {
            Some(cache) => Rc::new(cache),
            None => {
                log::warn!("localStorage unavailable; progress is kept for this session only");
                Rc::new(MemoryCache::new())
            }
        };
        let api = Rc::new(HttpApi::new(options.api_base.clone()));

        Ok(Self {
            window,
            document,
            options,
            container,
            stage,
            page_canvas,
            ink_canvas,
            ink,
            notes_layer,
            page_label,
            error_box,
            error_text,
            notice,
            on_event,
            rasterizer,
            loader,
            api,
            writes: Rc::new(PersistQueue::new()),
            cache,
            session: RefCell::new(None),
            renderer: RefCell::new(None),
            progress_timer: Cell::new(None),
            swipe: Cell::new(None),
            active_note: RefCell::new(None),
            destroyed: Cell::new(false),
        })
    }

    fn with_session<R>(&self, f: impl FnOnce(&ViewerSession) -> R) -> Option<R> {
        self.session.borrow().as_ref().map(f)
    }

    fn with_session_mut<R>(&self, f: impl FnOnce(&mut ViewerSession) -> R) -> Option<R> {
        self.session.borrow_mut().as_mut().map(f)
    }

    /// The session borrow ends before any effect runs.
    fn update(self: &Rc<Self>, f: impl FnOnce(&mut ViewerSession) -> Vec<Effect>) {
        if let Some(effects) = self.with_session_mut(f) {
            self.dispatch(effects);
        }
    }

    fn dispatch(self: &Rc<Self>, effects: Vec<Effect>) {
        for effect in effects {
            if self.destroyed.get()
                && !matches!(effect, Effect::Persist(_) | Effect::CancelProgressTimer)
            {
                continue;
            }
            match effect {
                Effect::Render { page } => self.render(page),
                Effect::Redraw => self.redraw(),
                Effect::ClearInk => self.clear_ink(),
                Effect::RefreshNotes => {
                    if let Err(error) = self.refresh_notes() {
                        log::error!("could not rebuild notes: {error:?}");
                    }
                }
                Effect::ClearError => self.error_box.set_hidden(true),
                Effect::Emit(event) => self.emit(&event),
                Effect::ScheduleProgress {
                    generation,
                    delay_ms,
                } => self.schedule_progress(generation, delay_ms),
                Effect::CancelProgressTimer => self.cancel_progress_timer(),
                Effect::Persist(op) => self.persist(op),
            }
        }
    }

    fn render(self: &Rc<Self>, page: u32) {
        let Some(renderer) = self.renderer.borrow().clone() else {
            return;
        };
        let viewer = self.clone();
        spawn_local(async move {
            let result = renderer.render_page(page).await;
            viewer.update(|session| session.render_finished(page, result));
        });
    }

    /// Writes leave one at a time; a single task drains the queue.
    fn persist(self: &Rc<Self>, op: PersistOp) {
        if !self.writes.push(op) {
            return;
        }
        let viewer = self.clone();
        spawn_local(async move {
            let writes = viewer.writes.clone();
            let api = viewer.api.clone();
            writes
                .drain(api.as_ref(), |completion| {
                    viewer.update(|session| session.completed(completion))
                })
                .await;
        });
    }

    fn schedule_progress(self: &Rc<Self>, generation: u64, delay_ms: u32) {
        self.cancel_progress_timer();
        let viewer = self.clone();
        let callback = Closure::once_into_js(move || {
            viewer.progress_timer.set(None);
            viewer.update(|session| session.progress_timer_fired(generation));
        });
        let delay = i32::try_from(delay_ms).unwrap_or(i32::MAX);
        match self
            .window
            .set_timeout_with_callback_and_timeout_and_arguments_0(callback.unchecked_ref(), delay)
        {
            Ok(handle) => self.progress_timer.set(Some(handle)),
            Err(error) => log::warn!("could not arm the progress timer: {error:?}"),
        }
    }

    fn cancel_progress_timer(&self) {
        if let Some(handle) = self.progress_timer.take() {
            self.window.clear_timeout_with_handle(handle);
        }
    }

    fn emit(&self, event: &HostEvent) {
        match event {
            HostEvent::PageChanged {
                page, page_count, ..
            } => {
                self.page_label
                    .set_text_content(Some(&format!("{page} / {page_count}")));
            }
            HostEvent::Error { message, .. } => {
                self.error_text.set_text_content(Some(message));
                self.error_box.set_hidden(false);
            }
            HostEvent::Notice { message } => {
                self.notice.set_text_content(Some(message));
                self.notice.set_hidden(false);
            }
            HostEvent::NavigateBack => {}
        }
        let serializer = serde_wasm_bindgen::Serializer::json_compatible();
        match event.serialize(&serializer) {
            Ok(value) => {
                if let Err(error) = self.on_event.call1(&JsValue::NULL, &value) {
                    log::warn!("host event handler threw: {error:?}");
                }
            }
            Err(error) => log::warn!("could not serialize host event: {error}"),
        }
    }

    /// Where the page bitmap is shown inside the stage.
    fn page_rect(&self) -> Option<Rect> {
        fit_bitmap(client_size(&self.stage), self.bitmap_size())
    }

    fn bitmap_size(&self) -> Size {
        Size::new(
            self.page_canvas.width() as f64,
            self.page_canvas.height() as f64,
        )
    }

    fn normalize(&self, event: &PointerEvent) -> Option<Point> {
        let (x, y) = local_point(&self.stage, event);
        normalize_point(x, y, client_size(&self.stage), self.bitmap_size())
    }

    /// Lays the ink canvas and notes over the displayed page and repaints the ink.
    fn redraw(&self) {
        let Some(rect) = self.page_rect() else {
            return;
        };
        place(&self.page_canvas, rect);
        place(&self.ink_canvas, rect);
        place(&self.notes_layer, rect);
        let dpr = self.window.device_pixel_ratio();
        let width = (rect.width * dpr).round() as u32;
        let height = (rect.height * dpr).round() as u32;
        if self.ink_canvas.width() != width || self.ink_canvas.height() != height {
            self.ink_canvas.set_width(width);
            self.ink_canvas.set_height(height);
        }
        let _ = self.ink.set_transform(dpr, 0.0, 0.0, dpr, 0.0, 0.0);
        let size = Size::new(rect.width, rect.height);
        let session = self.session.borrow();
        match session.as_ref() {
            Some(session) if session.page_shown() => paint_layer(
                &self.ink,
                size,
                session.store().strokes(session.page()),
                session.surface().active_stroke(),
            ),
            _ => paint_layer(&self.ink, size, &[], None),
        }
    }

    fn clear_ink(&self) {
        let _ = self.ink.set_transform(1.0, 0.0, 0.0, 1.0, 0.0, 0.0);
        self.ink.clear_rect(
            0.0,
            0.0,
            self.ink_canvas.width() as f64,
            self.ink_canvas.height() as f64,
        );
    }

    fn refresh_notes(&self) -> Result<(), JsValue> {
        self.notes_layer.set_inner_html("");
        self.active_note.replace(None);
        let session = self.session.borrow();
        let Some(session) = session.as_ref() else {
            return Ok(());
        };
        for note in session.current_notes() {
            let text = session
                .notes()
                .displayed_text(&note.id)
                .unwrap_or(note.text.as_str())
                .to_string();
            let element = self.note_element(&note, &text)?;
            self.notes_layer.append_child(&element)?;
        }
        Ok(())
    }

    fn note_element(&self, note: &StickyNote, text: &str) -> Result<HtmlElement, JsValue> {
        let document = &self.document;
        let element: HtmlElement = create(document, "div", "pagemark-note")?;
        element.set_attribute(NOTE_ID, &note.id)?;
        let left = format!("{}%", note.x);
        let top = format!("{}%", note.y);
        let width = format!("{}px", note.width);
        let height = format!("{}px", note.height);
        set_styles(
            &element,
            &[
                ("position", "absolute"),
                ("pointer-events", "auto"),
                ("display", "flex"),
                ("flex-direction", "column"),
                ("left", left.as_str()),
                ("top", top.as_str()),
                ("width", width.as_str()),
                ("height", height.as_str()),
                ("background", note.color.as_str()),
            ],
        );

        let handle: HtmlElement = create(document, "div", "pagemark-note-handle")?;
        handle.set_attribute(NOTE_ROLE, "drag")?;
        set_styles(&handle, &[("cursor", "move"), ("touch-action", "none")]);
        let delete: HtmlButtonElement = create(document, "button", "pagemark-note-delete")?;
        delete.set_attribute(NOTE_ROLE, "delete")?;
        delete.set_attribute("aria-label", "Delete note")?;
        delete.set_text_content(Some("\u{00d7}"));
        handle.append_child(&delete)?;

        let editor: HtmlTextAreaElement = create(document, "textarea", "pagemark-note-text")?;
        editor.set_attribute(NOTE_ROLE, "text")?;
        editor.set_value(text);
        set_styles(&editor, &[("flex", "1 1 auto"), ("resize", "none")]);

        let resize: HtmlElement = create(document, "div", "pagemark-note-resize")?;
        resize.set_attribute(NOTE_ROLE, "resize")?;
        set_styles(
            &resize,
            &[
                ("cursor", "nwse-resize"),
                ("touch-action", "none"),
                ("align-self", "flex-end"),
            ],
        );

        element.append_child(&handle)?;
        element.append_child(&editor)?;
        element.append_child(&resize)?;
        Ok(element)
    }

    fn retry(self: &Rc<Self>) {
        self.error_box.set_hidden(true);
        match self.with_session(|session| session.page()) {
            Some(page) => self.dispatch(vec![Effect::Render { page }]),
            None => spawn_local(open(self.clone())),
        }
    }

    fn destroy(self: &Rc<Self>) {
        if self.destroyed.replace(true) {
            return;
        }
        self.loader.destroy();
        if let Some(renderer) = self.renderer.borrow().as_ref() {
            renderer.cancel();
        }
        let effects = self
            .with_session_mut(|session| session.teardown())
            .unwrap_or_default();
        self.dispatch(effects);
        self.cancel_progress_timer();
        self.container.set_inner_html("");
        log::info!("viewer for {} destroyed", self.options.document_id);
    }
}

async fn open(viewer: Rc<Viewer>) {
    let options = &viewer.options;
    let loaded = viewer
        .loader
        .load(&options.document_id, options.source_url.as_deref())
        .await;
    let document = match loaded {
        Ok(document) => document,
        Err(error) if error.is_cancellation() => return,
        Err(error) => {
            log::error!("{error}");
            viewer.emit(&HostEvent::from(&error));
            return;
        }
    };
    let remote = prepare(viewer.api.as_ref(), &document, options.user_id.as_deref()).await;
    if viewer.destroyed.get() {
        return;
    }
    let presenter = match CanvasPresenter::new(viewer.page_canvas.clone()) {
        Ok(presenter) => presenter,
        Err(error) => {
            let error = ViewerError::RenderFailed(format!("{error:?}"));
            viewer.emit(&HostEvent::from(&error));
            return;
        }
    };
    let renderer = PageRenderer::new(
        viewer.rasterizer.clone(),
        presenter,
        options.config.render_scale,
        document.page_count,
    );
    viewer.renderer.replace(Some(Rc::new(renderer)));
    let mut session = ViewerSession::new(
        &document,
        options.user_id.clone(),
        &remote,
        &options.config,
        viewer.cache.clone(),
    );
    let effects = session.open(&remote);
    viewer.session.replace(Some(session));
    viewer.dispatch(effects);
}

fn attach(viewer: &Rc<Viewer>) -> Result<(), JsValue> {
    attach_stage(viewer)?;
    attach_notes(viewer)?;
    attach_chrome(viewer)?;
    Ok(())
}

fn attach_stage(viewer: &Rc<Viewer>) -> Result<(), JsValue> {
    {
        let v = viewer.clone();
        let ondown = Closure::<dyn FnMut(PointerEvent)>::new(move |event: PointerEvent| {
            if v.destroyed.get() || event.button() != 0 {
                return;
            }
            let drawing = v
                .with_session(|session| session.surface().drawing_mode())
                .unwrap_or(false);
            if !drawing {
                if event.is_primary() {
                    v.swipe.set(Some(Swipe {
                        pointer_id: event.pointer_id(),
                        start: client_point(&event),
                    }));
                }
                return;
            }
            event.prevent_default();
            let Some(point) = v.normalize(&event) else {
                return;
            };
            let _ = v.stage.set_pointer_capture(event.pointer_id());
            v.update(|session| session.pointer_down(event.pointer_id(), point));
        });
        viewer
            .stage
            .add_event_listener_with_callback("pointerdown", ondown.as_ref().unchecked_ref())?;
        ondown.forget();
    }

    {
        let v = viewer.clone();
        let onmove = Closure::<dyn FnMut(PointerEvent)>::new(move |event: PointerEvent| {
            let active = v
                .with_session(|session| session.surface().gesture_active())
                .unwrap_or(false);
            if !active {
                return;
            }
            event.prevent_default();
            let Some(point) = v.normalize(&event) else {
                return;
            };
            v.update(|session| session.pointer_move(event.pointer_id(), point));
        });
        viewer
            .stage
            .add_event_listener_with_callback("pointermove", onmove.as_ref().unchecked_ref())?;
        onmove.forget();
    }

    for (name, navigates) in [("pointerup", true), ("pointercancel", false)] {
        let v = viewer.clone();
        let onstop = Closure::<dyn FnMut(PointerEvent)>::new(move |event: PointerEvent| {
            let pointer_id = event.pointer_id();
            if v.stage.has_pointer_capture(pointer_id) {
                let _ = v.stage.release_pointer_capture(pointer_id);
            }
            v.update(|session| session.pointer_up(pointer_id));
            let Some(swipe) = v.swipe.get() else {
                return;
            };
            if swipe.pointer_id != pointer_id {
                return;
            }
            v.swipe.set(None);
            if navigates {
                let (x, y) = client_point(&event);
                let (dx, dy) = (x - swipe.start.0, y - swipe.start.1);
                v.update(|session| session.swipe(dx, dy, now_ms()));
            }
        });
        viewer
            .stage
            .add_event_listener_with_callback(name, onstop.as_ref().unchecked_ref())?;
        onstop.forget();
    }

    {
        let v = viewer.clone();
        let onresize = Closure::<dyn FnMut()>::new(move || {
            if !v.destroyed.get() {
                v.redraw();
            }
        });
        viewer
            .window
            .add_event_listener_with_callback("resize", onresize.as_ref().unchecked_ref())?;
        onresize.forget();
    }
    Ok(())
}

fn note_target(event: &Event) -> Option<(String, String, HtmlElement)> {
    let role = closest_with(event, NOTE_ROLE)?.get_attribute(NOTE_ROLE)?;
    let note = closest_with(event, NOTE_ID)?;
    let id = note.get_attribute(NOTE_ID)?;
    Some((id, role, note))
}

fn attach_notes(viewer: &Rc<Viewer>) -> Result<(), JsValue> {
    let layer = viewer.notes_layer.clone();
    {
        let v = viewer.clone();
        let ondown = Closure::<dyn FnMut(PointerEvent)>::new(move |event: PointerEvent| {
            let Some((id, role, note)) = note_target(&event) else {
                return;
            };
            event.stop_propagation();
            let pointer = client_point(&event);
            let started = match role.as_str() {
                "drag" => {
                    let offset = (note.offset_left() as f64, note.offset_top() as f64);
                    let parent = client_size(&v.notes_layer);
                    let element = offset_size(&note);
                    v.with_session_mut(|session| {
                        session
                            .notes_mut()
                            .begin_drag(&id, pointer, offset, parent, element)
                    })
                }
                "resize" => {
                    let size = offset_size(&note);
                    v.with_session_mut(|session| session.notes_mut().begin_resize(&id, pointer, size))
                }
                _ => None,
            };
            if started == Some(true) {
                event.prevent_default();
                let _ = v.notes_layer.set_pointer_capture(event.pointer_id());
                v.active_note.replace(Some(note));
            }
        });
        layer.add_event_listener_with_callback("pointerdown", ondown.as_ref().unchecked_ref())?;
        ondown.forget();
    }

    {
        let v = viewer.clone();
        let onmove = Closure::<dyn FnMut(PointerEvent)>::new(move |event: PointerEvent| {
            let Some(note) = v.active_note.borrow().clone() else {
                return;
            };
            let pointer = client_point(&event);
            let moved = v.with_session_mut(|session| {
                let notes = session.notes_mut();
                (notes.drag_move(pointer), notes.resize_move(pointer))
            });
            match moved {
                Some((Some((x, y)), _)) => {
                    let left = format!("{x}px");
                    let top = format!("{y}px");
                    set_styles(&note, &[("left", left.as_str()), ("top", top.as_str())]);
                }
                Some((None, Some(size))) => {
                    let width = format!("{}px", size.width);
                    let height = format!("{}px", size.height);
                    set_styles(
                        &note,
                        &[("width", width.as_str()), ("height", height.as_str())],
                    );
                }
                _ => {}
            }
        });
        layer.add_event_listener_with_callback("pointermove", onmove.as_ref().unchecked_ref())?;
        onmove.forget();
    }

    for name in ["pointerup", "pointercancel"] {
        let v = viewer.clone();
        let onstop = Closure::<dyn FnMut(PointerEvent)>::new(move |event: PointerEvent| {
            if v.active_note.take().is_none() {
                return;
            }
            let _ = v.notes_layer.release_pointer_capture(event.pointer_id());
            v.update(|session| {
                let mut effects = session.finish_note_drag();
                effects.extend(session.finish_note_resize());
                effects
            });
        });
        layer.add_event_listener_with_callback(name, onstop.as_ref().unchecked_ref())?;
        onstop.forget();
    }

    {
        let v = viewer.clone();
        let onclick = Closure::<dyn FnMut(Event)>::new(move |event: Event| {
            let Some((id, role, _)) = note_target(&event) else {
                return;
            };
            if role != "delete" {
                return;
            }
            event.stop_propagation();
            let window = v.window.clone();
            v.update(|session| {
                session.delete_note(&id, |note| {
                    let message = if note.text.trim().is_empty() {
                        "Delete this empty note?"
                    } else {
                        "Delete this note? Its text will be lost."
                    };
                    window.confirm_with_message(message).unwrap_or(false)
                })
            });
        });
        layer.add_event_listener_with_callback("click", onclick.as_ref().unchecked_ref())?;
        onclick.forget();
    }

    {
        let v = viewer.clone();
        let oninput = Closure::<dyn FnMut(Event)>::new(move |event: Event| {
            let Some((id, _, _)) = note_target(&event) else {
                return;
            };
            let Some(editor) = event
                .target()
                .and_then(|target| target.dyn_into::<HtmlTextAreaElement>().ok())
            else {
                return;
            };
            v.with_session_mut(|session| session.notes_mut().edit_text(&id, editor.value()));
        });
        layer.add_event_listener_with_callback("input", oninput.as_ref().unchecked_ref())?;
        oninput.forget();
    }

    {
        let v = viewer.clone();
        let onblur = Closure::<dyn FnMut(Event)>::new(move |event: Event| {
            let Some((id, role, _)) = note_target(&event) else {
                return;
            };
            if role == "text" {
                v.update(|session| session.commit_note_text(&id));
            }
        });
        layer.add_event_listener_with_callback("focusout", onblur.as_ref().unchecked_ref())?;
        onblur.forget();
    }
    Ok(())
}

fn attach_chrome(viewer: &Rc<Viewer>) -> Result<(), JsValue> {
    {
        let v = viewer.clone();
        let onclick = Closure::<dyn FnMut(Event)>::new(move |event: Event| {
            let Some(button) = closest_with(&event, "data-action") else {
                return;
            };
            match button.get_attribute("data-action").as_deref() {
                Some("back") => v.emit(&HostEvent::NavigateBack),
                Some("retry") => v.retry(),
                _ => {}
            }
        });
        viewer
            .container
            .add_event_listener_with_callback("click", onclick.as_ref().unchecked_ref())?;
        onclick.forget();
    }

    {
        let notice = viewer.notice.clone();
        let onclick = Closure::<dyn FnMut(Event)>::new(move |_| notice.set_hidden(true));
        viewer
            .notice
            .add_event_listener_with_callback("click", onclick.as_ref().unchecked_ref())?;
        onclick.forget();
    }

    {
        let v = viewer.clone();
        let onkeydown = Closure::<dyn FnMut(KeyboardEvent)>::new(move |event: KeyboardEvent| {
            if v.destroyed.get() {
                return;
            }
            let typing = event
                .target()
                .and_then(|target| target.dyn_into::<HtmlTextAreaElement>().ok())
                .is_some();
            if typing {
                return;
            }
            match event.key().as_str() {
                "ArrowRight" | "PageDown" => v.update(|session| session.next_page(now_ms())),
                "ArrowLeft" | "PageUp" => v.update(|session| session.previous_page(now_ms())),
                _ => {}
            }
        });
        viewer
            .window
            .add_event_listener_with_callback("keydown", onkeydown.as_ref().unchecked_ref())?;
        onkeydown.forget();
    }
    Ok(())
}

/// Mounts a viewer into the element with id `container_id`.
///
/// `options` follows [`MountOptions`]; an optional `offlineStore` field holds the
/// host object used to look up downloaded documents. `on_event` receives every
/// host event as a plain object with a `type` field.
#[wasm_bindgen]
pub fn mount(
    container_id: &str,
    options: JsValue,
    rasterizer: JsValue,
    on_event: Function,
) -> Result<ViewerHandle, JsValue> {
    console_error_panic_hook::set_once();
    let window = web_sys::window().ok_or_else(|| JsValue::from_str("Missing window"))?;
    logging::init(&window);
    let document = window
        .document()
        .ok_or_else(|| JsValue::from_str("Missing document"))?;

    let offline_store =
        Reflect::get(&options, &JsValue::from_str("offlineStore")).unwrap_or(JsValue::UNDEFINED);
    let options: MountOptions = serde_wasm_bindgen::from_value(options)
        .map_err(|error| ViewerError::InvalidOptions(error.to_string()))?;
    let options = options.validate()?;
    let container: HtmlElement = get_element(&document, container_id)?;
    log::debug!("mounting {} into #{container_id}", options.document_id);

    let viewer = Rc::new(Viewer::build(
        window,
        document,
        container,
        options,
        rasterizer,
        offline_store,
        on_event,
    )?);
    attach(&viewer)?;
    spawn_local(open(viewer.clone()));
    Ok(ViewerHandle { viewer })
}

#[wasm_bindgen]
pub struct ViewerHandle {
    viewer: Rc<Viewer>,
}

#[wasm_bindgen]
impl ViewerHandle {
    pub fn next_page(&self) {
        self.viewer.update(|session| session.next_page(now_ms()));
    }

    pub fn previous_page(&self) {
        self.viewer.update(|session| session.previous_page(now_ms()));
    }

    pub fn go_to_page(&self, page: u32) {
        self.viewer.update(|session| session.go_to_page(page, now_ms()));
    }

    /// 0 until the document has loaded.
    pub fn current_page(&self) -> u32 {
        self.viewer.with_session(|session| session.page()).unwrap_or(0)
    }

    pub fn page_count(&self) -> u32 {
        self.viewer
            .with_session(|session| session.page_count())
            .unwrap_or(0)
    }

    pub fn set_drawing_mode(&self, enabled: bool) {
        self.viewer
            .update(|session| session.set_drawing_mode(enabled));
    }

    /// `"pen"`, `"highlighter"` or `"eraser"`.
    pub fn set_tool(&self, tool: &str) -> Result<(), JsValue> {
        let tool: Tool = tool.parse().map_err(|error: String| JsValue::from_str(&error))?;
        self.viewer.update(|session| session.set_tool(tool));
        Ok(())
    }

    pub fn set_color(&self, color: String) {
        self.viewer.with_session_mut(|session| session.set_color(color));
    }

    pub fn set_width(&self, width: f32) {
        self.viewer.with_session_mut(|session| session.set_width(width));
    }

    pub fn add_note(&self) {
        self.viewer.update(|session| session.add_note());
    }

    pub fn navigate_back(&self) {
        self.viewer.emit(&HostEvent::NavigateBack);
    }

    /// Cancels every render, load and timer and empties the container.
    pub fn destroy(&self) {
        self.viewer.destroy();
    }
}
