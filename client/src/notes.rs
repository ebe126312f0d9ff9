//! Sticky notes layered above the page.
//!
//! Drag and resize are applied live to the note's pixel box and written once,
//! on release. Text is written when the editor loses focus.

use std::collections::HashMap;

use pagemark_shared::{clamp_percent, NoteUpdate, StickyNote};

use crate::config::ViewerConfig;
use crate::geometry::Size;
use crate::util::make_id;

#[derive(Clone, Debug, PartialEq)]
pub enum NoteAction {
    Insert(StickyNote),
    Update { id: String, update: NoteUpdate },
    Delete { id: String },
}

#[derive(Debug)]
enum Interaction {
    Idle,
    Dragging {
        id: String,
        start_pointer: (f64, f64),
        start_offset: (f64, f64),
        parent: Size,
        element: Size,
        offset: (f64, f64),
    },
    Resizing {
        id: String,
        start_pointer: (f64, f64),
        start_size: Size,
        size: Size,
    },
}

#[derive(Debug)]
pub struct NoteOverlay {
    notes: Vec<StickyNote>,
    drafts: HashMap<String, String>,
    interaction: Interaction,
    min_size: Size,
    default_size: Size,
    palette: Vec<String>,
}

impl NoteOverlay {
    pub fn new(config: &ViewerConfig) -> Self {
        Self {
            notes: Vec::new(),
            drafts: HashMap::new(),
            interaction: Interaction::Idle,
            min_size: Size::new(config.min_note_width, config.min_note_height),
            default_size: Size::new(config.note_width, config.note_height),
            palette: config.note_palette.clone(),
        }
    }

    pub fn adopt(&mut self, notes: Vec<StickyNote>) {
        let mut adopted: Vec<StickyNote> = notes
            .into_iter()
            .filter_map(pagemark_shared::sanitize_note)
            .collect();
        for note in self.notes.drain(..) {
            if !adopted.iter().any(|existing| existing.id == note.id) {
                adopted.push(note);
            }
        }
        self.notes = adopted;
    }

    pub fn note(&self, id: &str) -> Option<&StickyNote> {
        self.notes.iter().find(|note| note.id == id)
    }

    pub fn notes_on(&self, page: u32) -> impl Iterator<Item = &StickyNote> {
        self.notes.iter().filter(move |note| note.page == page)
    }

    /// Text currently shown in the editor, including unsaved edits.
    pub fn displayed_text(&self, id: &str) -> Option<&str> {
        if let Some(draft) = self.drafts.get(id) {
            return Some(draft);
        }
        self.note(id).map(|note| note.text.as_str())
    }

    pub fn create(&mut self, page: u32) -> NoteAction {
        let color = self
            .palette
            .get(self.notes.len() % self.palette.len().max(1))
            .cloned()
            .unwrap_or_else(|| pagemark_shared::DEFAULT_STROKE_COLOR.to_string());
        let note = StickyNote {
            id: make_id(),
            page,
            text: String::new(),
            x: 10.0,
            y: 10.0,
            width: self.default_size.width,
            height: self.default_size.height,
            color,
        };
        self.notes.push(note.clone());
        NoteAction::Insert(note)
    }

    /// `offset` is the element's pixel position inside its positioned parent.
    pub fn begin_drag(
        &mut self,
        id: &str,
        pointer: (f64, f64),
        offset: (f64, f64),
        parent: Size,
        element: Size,
    ) -> bool {
        if self.note(id).is_none() || parent.is_empty() {
            return false;
        }
        self.interaction = Interaction::Dragging {
            id: id.to_string(),
            start_pointer: pointer,
            start_offset: offset,
            parent,
            element,
            offset,
        };
        true
    }

    /// New pixel offset to apply to the element, clamped inside the parent.
    pub fn drag_move(&mut self, pointer: (f64, f64)) -> Option<(f64, f64)> {
        let Interaction::Dragging {
            start_pointer,
            start_offset,
            parent,
            element,
            offset,
            ..
        } = &mut self.interaction
        else {
            return None;
        };
        let max_x = (parent.width - element.width).max(0.0);
        let max_y = (parent.height - element.height).max(0.0);
        let x = start_offset.0 + (pointer.0 - start_pointer.0);
        let y = start_offset.1 + (pointer.1 - start_pointer.1);
        *offset = (x.max(0.0).min(max_x), y.max(0.0).min(max_y));
        Some(*offset)
    }

    /// Converts the final offset to percentages and yields the single write.
    pub fn end_drag(&mut self) -> Option<NoteAction> {
        let Interaction::Dragging {
            id, parent, offset, ..
        } = std::mem::replace(&mut self.interaction, Interaction::Idle)
        else {
            return None;
        };
        let x = clamp_percent(offset.0 * 100.0 / parent.width);
        let y = clamp_percent(offset.1 * 100.0 / parent.height);
        let note = self.notes.iter_mut().find(|note| note.id == id)?;
        note.x = x;
        note.y = y;
        Some(NoteAction::Update {
            id,
            update: NoteUpdate {
                x: Some(x),
                y: Some(y),
                ..NoteUpdate::default()
            },
        })
    }

    pub fn begin_resize(&mut self, id: &str, pointer: (f64, f64), start_size: Size) -> bool {
        if self.note(id).is_none() {
            return false;
        }
        self.interaction = Interaction::Resizing {
            id: id.to_string(),
            start_pointer: pointer,
            start_size,
            size: start_size,
        };
        true
    }

    pub fn resize_move(&mut self, pointer: (f64, f64)) -> Option<Size> {
        let min = self.min_size;
        let Interaction::Resizing {
            start_pointer,
            start_size,
            size,
            ..
        } = &mut self.interaction
        else {
            return None;
        };
        let width = start_size.width + (pointer.0 - start_pointer.0);
        let height = start_size.height + (pointer.1 - start_pointer.1);
        *size = Size::new(width.max(min.width), height.max(min.height));
        Some(*size)
    }

    pub fn end_resize(&mut self) -> Option<NoteAction> {
        let Interaction::Resizing { id, size, .. } =
            std::mem::replace(&mut self.interaction, Interaction::Idle)
        else {
            return None;
        };
        let note = self.notes.iter_mut().find(|note| note.id == id)?;
        note.width = size.width;
        note.height = size.height;
        Some(NoteAction::Update {
            id,
            update: NoteUpdate {
                width: Some(size.width),
                height: Some(size.height),
                ..NoteUpdate::default()
            },
        })
    }

    pub fn is_interacting(&self) -> bool {
        !matches!(self.interaction, Interaction::Idle)
    }

    pub fn cancel_interaction(&mut self) {
        self.interaction = Interaction::Idle;
    }

    /// Keystrokes only update the draft; nothing is written until `commit_text`.
    pub fn edit_text(&mut self, id: &str, text: String) {
        if self.note(id).is_some() {
            self.drafts.insert(id.to_string(), text);
        }
    }

    /// Called on focus loss. Unchanged text produces no write.
    pub fn commit_text(&mut self, id: &str) -> Option<NoteAction> {
        let draft = self.drafts.remove(id)?;
        let note = self.notes.iter_mut().find(|note| note.id == id)?;
        if note.text == draft {
            return None;
        }
        note.text = draft.clone();
        Some(NoteAction::Update {
            id: id.to_string(),
            update: NoteUpdate {
                text: Some(draft),
                ..NoteUpdate::default()
            },
        })
    }

    /// Removes the note only if `confirm` agrees, whether or not it has text.
    pub fn delete(
        &mut self,
        id: &str,
        confirm: impl FnOnce(&StickyNote) -> bool,
    ) -> Option<NoteAction> {
        let index = self.notes.iter().position(|note| note.id == id)?;
        if !confirm(&self.notes[index]) {
            return None;
        }
        self.notes.remove(index);
        self.drafts.remove(id);
        if matches!(&self.interaction,
            Interaction::Dragging { id: active, .. } | Interaction::Resizing { id: active, .. }
            if active == id)
        {
            self.interaction = Interaction::Idle;
        }
        Some(NoteAction::Delete { id: id.to_string() })
    }
}
