use serde::{Deserialize, Serialize};

mod snapshot_format;

pub use snapshot_format::{
    decode_snapshot, encode_snapshot, DocumentSnapshot, PageStrokes, SnapshotDecodeError,
    UserSnapshot, SNAPSHOT_MAGIC, SNAPSHOT_VERSION,
};

pub const DEFAULT_STROKE_COLOR: &str = "#1f1f1f";
pub const DEFAULT_STROKE_WIDTH: f32 = 6.0;
pub const MIN_STROKE_WIDTH: f32 = 1.0;
pub const MAX_STROKE_WIDTH: f32 = 60.0;
pub const MAX_COLOR_LEN: usize = 32;
pub const MAX_ID_LEN: usize = 64;
pub const MAX_NOTE_TEXT_LEN: usize = 10_000;

/// A position on a page as a fraction of the rendered bitmap's width and height.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn clamp(self) -> Self {
        Self {
            x: clamp_unit(self.x),
            y: clamp_unit(self.y),
        }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    pub fn distance(&self, other: Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

fn clamp_unit(value: f32) -> f32 {
    value.max(0.0).min(1.0)
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StrokeTool {
    #[default]
    Pen,
    Highlighter,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Stroke {
    pub id: String,
    pub color: String,
    pub width: f32,
    #[serde(default)]
    pub tool: StrokeTool,
    pub points: Vec<Point>,
}

impl Stroke {
    /// Strokes shorter than two points are never drawn or stored.
    pub fn is_committable(&self) -> bool {
        self.points.len() >= 2
    }
}

/// Identifies one page's annotation set for one reader.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct PageKey {
    pub document_id: String,
    pub page: u32,
    pub user_id: String,
}

impl PageKey {
    pub fn new(document_id: impl Into<String>, page: u32, user_id: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            page,
            user_id: user_id.into(),
        }
    }
}

/// Note position is stored as a percentage (0-100) of the page container.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StickyNote {
    pub id: String,
    pub page: u32,
    pub text: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub color: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct NoteUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl NoteUpdate {
    pub fn is_empty(&self) -> bool {
        self.text.is_none()
            && self.x.is_none()
            && self.y.is_none()
            && self.width.is_none()
            && self.height.is_none()
            && self.color.is_none()
    }

    pub fn apply_to(&self, note: &mut StickyNote) {
        if let Some(text) = &self.text {
            note.text = text.clone();
        }
        if let Some(x) = self.x {
            note.x = clamp_percent(x);
        }
        if let Some(y) = self.y {
            note.y = clamp_percent(y);
        }
        if let Some(width) = self.width {
            note.width = width;
        }
        if let Some(height) = self.height {
            note.height = height;
        }
        if let Some(color) = &self.color {
            note.color = sanitize_color(color.clone());
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReadingProgress {
    pub page: u32,
    pub percentage: f32,
    pub updated_at: u64,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct ProgressPatch {
    pub page: u32,
    pub percentage: f32,
}

/// A document in the reader's reading set, with its last remote progress if any.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReadingEntry {
    pub document_id: String,
    pub progress: Option<ReadingProgress>,
}

/// `page / page_count` as a percentage, clamped to [0, 100] and rounded to one decimal.
pub fn progress_percentage(page: u32, page_count: u32) -> f32 {
    if page_count == 0 {
        return 0.0;
    }
    let raw = page as f64 / page_count as f64 * 100.0;
    let clamped = raw.max(0.0).min(100.0);
    ((clamped * 10.0).round() / 10.0) as f32
}

pub fn clamp_percent(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    value.max(0.0).min(100.0)
}

pub fn sanitize_color(mut color: String) -> String {
    if color.is_empty() {
        return DEFAULT_STROKE_COLOR.to_string();
    }
    if color.len() > MAX_COLOR_LEN {
        let mut end = MAX_COLOR_LEN;
        while !color.is_char_boundary(end) {
            end -= 1;
        }
        color.truncate(end);
    }
    color
}

pub fn sanitize_width(width: f32) -> f32 {
    let width = if width.is_finite() {
        width
    } else {
        DEFAULT_STROKE_WIDTH
    };
    width.max(MIN_STROKE_WIDTH).min(MAX_STROKE_WIDTH)
}

pub fn valid_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= MAX_ID_LEN
}

/// Cleans a stroke received from input or storage. Returns `None` for strokes that
/// must not be kept (bad id, fewer than two usable points).
pub fn sanitize_stroke(mut stroke: Stroke) -> Option<Stroke> {
    if !valid_id(&stroke.id) {
        return None;
    }
    stroke.color = sanitize_color(stroke.color);
    stroke.width = sanitize_width(stroke.width);
    stroke.points = stroke
        .points
        .into_iter()
        .filter(Point::is_finite)
        .map(Point::clamp)
        .collect();
    if !stroke.is_committable() {
        return None;
    }
    Some(stroke)
}

pub fn sanitize_strokes(strokes: Vec<Stroke>) -> Vec<Stroke> {
    strokes.into_iter().filter_map(sanitize_stroke).collect()
}

pub fn sanitize_note(mut note: StickyNote) -> Option<StickyNote> {
    if !valid_id(&note.id) || note.page == 0 {
        return None;
    }
    if note.text.len() > MAX_NOTE_TEXT_LEN {
        return None;
    }
    note.x = clamp_percent(note.x);
    note.y = clamp_percent(note.y);
    if !note.width.is_finite() || note.width <= 0.0 {
        return None;
    }
    if !note.height.is_finite() || note.height <= 0.0 {
        return None;
    }
    note.color = sanitize_color(note.color);
    Some(note)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stroke(points: &[(f32, f32)]) -> Stroke {
        Stroke {
            id: "s1".into(),
            color: "#ff0000".into(),
            width: 4.0,
            tool: StrokeTool::Pen,
            points: points.iter().map(|&(x, y)| Point::new(x, y)).collect(),
        }
    }

    #[test]
    fn ten_page_document_last_page_is_full() {
        assert_eq!(progress_percentage(10, 10), 100.0);
        assert_eq!(progress_percentage(1, 10), 10.0);
    }

    #[test]
    fn percentage_rounds_to_one_decimal_and_clamps() {
        assert_eq!(progress_percentage(1, 3), 33.3);
        assert_eq!(progress_percentage(2, 3), 66.7);
        assert_eq!(progress_percentage(12, 10), 100.0);
        assert_eq!(progress_percentage(3, 0), 0.0);
    }

    #[test]
    fn single_point_stroke_is_rejected() {
        assert!(sanitize_stroke(stroke(&[(0.1, 0.1)])).is_none());
        assert!(sanitize_stroke(stroke(&[(0.1, 0.1), (f32::NAN, 0.2)])).is_none());
    }

    #[test]
    fn stroke_points_are_clamped_into_the_unit_square() {
        let cleaned = sanitize_stroke(stroke(&[(-0.5, 0.2), (1.5, 2.0)])).unwrap();
        assert_eq!(cleaned.points, vec![Point::new(0.0, 0.2), Point::new(1.0, 1.0)]);
    }

    #[test]
    fn color_and_width_are_sanitized() {
        let mut raw = stroke(&[(0.1, 0.1), (0.2, 0.2)]);
        raw.color = String::new();
        raw.width = f32::INFINITY;
        let cleaned = sanitize_stroke(raw).unwrap();
        assert_eq!(cleaned.color, DEFAULT_STROKE_COLOR);
        assert_eq!(cleaned.width, DEFAULT_STROKE_WIDTH);
        assert_eq!(sanitize_width(500.0), MAX_STROKE_WIDTH);
        assert_eq!(sanitize_color("x".repeat(40)).len(), MAX_COLOR_LEN);
    }

    #[test]
    fn note_update_applies_only_present_fields() {
        let mut note = StickyNote {
            id: "n1".into(),
            page: 2,
            text: String::new(),
            x: 10.0,
            y: 10.0,
            width: 200.0,
            height: 160.0,
            color: "#fff59d".into(),
        };
        let update = NoteUpdate {
            x: Some(140.0),
            text: Some("remember".into()),
            ..NoteUpdate::default()
        };
        update.apply_to(&mut note);
        assert_eq!(note.x, 100.0);
        assert_eq!(note.y, 10.0);
        assert_eq!(note.text, "remember");
    }

    #[test]
    fn progress_uses_camel_case_on_the_wire() {
        let progress = ReadingProgress {
            page: 4,
            percentage: 40.0,
            updated_at: 7,
        };
        let json = serde_json::to_string(&progress).unwrap();
        assert_eq!(json, r#"{"page":4,"percentage":40.0,"updatedAt":7}"#);
    }
}
