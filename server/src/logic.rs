use pagemark_shared::{
    clamp_percent, sanitize_note, sanitize_stroke, DocumentSnapshot, NoteUpdate,
    PageStrokes, ProgressPatch, ReadingEntry, ReadingProgress, StickyNote, Stroke, UserSnapshot,
};

use crate::error::{AppError, Result};

pub const MAX_STROKES_PER_PAGE: usize = 2000;
pub const MAX_POINTS_PER_STROKE: usize = 5000;
pub const MAX_NOTES_PER_DOCUMENT: usize = 500;

fn user<'a>(snapshot: &'a DocumentSnapshot, user_id: &str) -> Option<&'a UserSnapshot> {
    snapshot.users.iter().find(|user| user.user_id == user_id)
}

fn user_mut<'a>(snapshot: &'a mut DocumentSnapshot, user_id: &str) -> &'a mut UserSnapshot {
    let index = match snapshot.users.iter().position(|user| user.user_id == user_id) {
        Some(index) => index,
        None => {
            snapshot.users.push(UserSnapshot {
                user_id: user_id.to_string(),
                ..UserSnapshot::default()
            });
            snapshot.users.len() - 1
        }
    };
    &mut snapshot.users[index]
}

fn page_mut(user: &mut UserSnapshot, page: u32) -> &mut Vec<Stroke> {
    let index = match user.pages.iter().position(|entry| entry.page == page) {
        Some(index) => index,
        None => {
            user.pages.push(PageStrokes {
                page,
                strokes: Vec::new(),
            });
            user.pages.len() - 1
        }
    };
    &mut user.pages[index].strokes
}

pub fn list_strokes(snapshot: &DocumentSnapshot, user_id: &str, page: u32) -> Vec<Stroke> {
    user(snapshot, user_id)
        .and_then(|user| user.pages.iter().find(|entry| entry.page == page))
        .map(|entry| entry.strokes.clone())
        .unwrap_or_default()
}

/// Appends a stroke, or replaces the stroke with the same id.
pub fn insert_stroke(
    snapshot: &mut DocumentSnapshot,
    user_id: &str,
    page: u32,
    stroke: Stroke,
) -> Result<Stroke> {
    if stroke.points.len() > MAX_POINTS_PER_STROKE {
        return Err(AppError::BadRequest(format!(
            "strokes are limited to {MAX_POINTS_PER_STROKE} points"
        )));
    }
    let stroke = sanitize_stroke(stroke)
        .ok_or_else(|| AppError::BadRequest("stroke needs an id and at least two points".into()))?;
    let strokes = page_mut(user_mut(snapshot, user_id), page);
    if let Some(existing) = strokes.iter_mut().find(|existing| existing.id == stroke.id) {
        *existing = stroke.clone();
        return Ok(stroke);
    }
    if strokes.len() >= MAX_STROKES_PER_PAGE {
        return Err(AppError::BadRequest(format!(
            "pages are limited to {MAX_STROKES_PER_PAGE} strokes"
        )));
    }
    strokes.push(stroke.clone());
    Ok(stroke)
}

/// Returns how many strokes were removed.
pub fn clear_strokes(snapshot: &mut DocumentSnapshot, user_id: &str, page: u32) -> usize {
    let Some(index) = snapshot.users.iter().position(|user| user.user_id == user_id) else {
        return 0;
    };
    let user = &mut snapshot.users[index];
    let mut removed = 0;
    user.pages.retain(|entry| {
        if entry.page == page {
            removed = entry.strokes.len();
            false
        } else {
            true
        }
    });
    removed
}

pub fn list_notes(snapshot: &DocumentSnapshot, user_id: &str) -> Vec<StickyNote> {
    user(snapshot, user_id)
        .map(|user| user.notes.clone())
        .unwrap_or_default()
}

pub fn insert_note(
    snapshot: &mut DocumentSnapshot,
    user_id: &str,
    note: StickyNote,
) -> Result<StickyNote> {
    let note = sanitize_note(note)
        .ok_or_else(|| AppError::BadRequest("note has an invalid id, page or size".into()))?;
    let user = user_mut(snapshot, user_id);
    if let Some(existing) = user.notes.iter_mut().find(|existing| existing.id == note.id) {
        *existing = note.clone();
        return Ok(note);
    }
    if user.notes.len() >= MAX_NOTES_PER_DOCUMENT {
        return Err(AppError::BadRequest(format!(
            "documents are limited to {MAX_NOTES_PER_DOCUMENT} notes"
        )));
    }
    user.notes.push(note.clone());
    Ok(note)
}

pub fn update_note(
    snapshot: &mut DocumentSnapshot,
    user_id: &str,
    note_id: &str,
    update: &NoteUpdate,
) -> Result<StickyNote> {
    let not_found = || AppError::NotFound(format!("note {note_id}"));
    let user = snapshot
        .users
        .iter_mut()
        .find(|user| user.user_id == user_id)
        .ok_or_else(not_found)?;
    let note = user
        .notes
        .iter_mut()
        .find(|note| note.id == note_id)
        .ok_or_else(not_found)?;
    let mut updated = note.clone();
    update.apply_to(&mut updated);
    let updated = sanitize_note(updated)
        .ok_or_else(|| AppError::BadRequest("update leaves the note invalid".into()))?;
    *note = updated.clone();
    Ok(updated)
}

pub fn delete_note(snapshot: &mut DocumentSnapshot, user_id: &str, note_id: &str) -> Result<()> {
    let user = snapshot
        .users
        .iter_mut()
        .find(|user| user.user_id == user_id);
    let Some(user) = user else {
        return Err(AppError::NotFound(format!("note {note_id}")));
    };
    let before = user.notes.len();
    user.notes.retain(|note| note.id != note_id);
    if user.notes.len() == before {
        return Err(AppError::NotFound(format!("note {note_id}")));
    }
    Ok(())
}

/// `None` when the document is not in the reader's reading set.
pub fn reading_entry(snapshot: &DocumentSnapshot, user_id: &str) -> Option<ReadingEntry> {
    let user = user(snapshot, user_id).filter(|user| user.in_reading_set)?;
    Some(ReadingEntry {
        document_id: snapshot.document_id.clone(),
        progress: user.progress,
    })
}

/// Returns whether membership changed.
pub fn set_reading(snapshot: &mut DocumentSnapshot, user_id: &str, reading: bool) -> bool {
    if !reading && user(snapshot, user_id).is_none() {
        return false;
    }
    let user = user_mut(snapshot, user_id);
    let changed = user.in_reading_set != reading;
    user.in_reading_set = reading;
    if !reading {
        user.progress = None;
    }
    changed
}

/// Records progress for a document in the reading set. The stored percentage is
/// clamped to [0, 100] and rounded to one decimal.
pub fn record_progress(
    snapshot: &mut DocumentSnapshot,
    user_id: &str,
    patch: ProgressPatch,
    now_ms: u64,
) -> Result<ReadingProgress> {
    if patch.page == 0 {
        return Err(AppError::BadRequest("pages start at 1".into()));
    }
    if !patch.percentage.is_finite() {
        return Err(AppError::BadRequest("percentage must be a number".into()));
    }
    let document_id = snapshot.document_id.clone();
    let user = snapshot
        .users
        .iter_mut()
        .find(|user| user.user_id == user_id && user.in_reading_set)
        .ok_or_else(|| AppError::NotFound(format!("{document_id} is not in the reading list")))?;
    let percentage = (clamp_percent(patch.percentage as f64) * 10.0).round() / 10.0;
    let progress = ReadingProgress {
        page: patch.page,
        percentage: percentage as f32,
        updated_at: now_ms,
    };
    user.progress = Some(progress);
    Ok(progress)
}
