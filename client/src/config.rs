use serde::{Deserialize, Serialize};

use pagemark_shared::{sanitize_color, sanitize_width, DEFAULT_STROKE_COLOR, DEFAULT_STROKE_WIDTH};

use crate::error::{Result, ViewerError};

pub const DEFAULT_API_BASE: &str = "/api";

/// Tunables for one viewing session. Every field has a default so the host can
/// override only what it cares about.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ViewerConfig {
    /// Fixed for the whole session; annotation coordinates depend on it.
    pub render_scale: f64,
    pub quiet_period_ms: u32,
    /// Measured in normalized page units.
    pub eraser_radius: f32,
    pub swipe_threshold_px: f64,
    pub min_note_width: f64,
    pub min_note_height: f64,
    pub note_width: f64,
    pub note_height: f64,
    pub stroke_color: String,
    pub stroke_width: f32,
    pub note_palette: Vec<String>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            render_scale: 1.5,
            quiet_period_ms: 5_000,
            eraser_radius: 0.02,
            swipe_threshold_px: 60.0,
            min_note_width: 120.0,
            min_note_height: 80.0,
            note_width: 200.0,
            note_height: 160.0,
            stroke_color: DEFAULT_STROKE_COLOR.to_string(),
            stroke_width: DEFAULT_STROKE_WIDTH,
            note_palette: vec![
                "#fff59d".to_string(),
                "#ffcc80".to_string(),
                "#a5d6a7".to_string(),
                "#90caf9".to_string(),
            ],
        }
    }
}

impl ViewerConfig {
    /// Replaces values the engine cannot work with by their defaults.
    pub fn sanitized(mut self) -> Self {
        let defaults = ViewerConfig::default();
        if !(self.render_scale.is_finite() && self.render_scale > 0.0) {
            self.render_scale = defaults.render_scale;
        }
        if !(self.eraser_radius.is_finite() && self.eraser_radius > 0.0) {
            self.eraser_radius = defaults.eraser_radius;
        }
        if !(self.swipe_threshold_px.is_finite() && self.swipe_threshold_px > 0.0) {
            self.swipe_threshold_px = defaults.swipe_threshold_px;
        }
        if !(self.min_note_width.is_finite() && self.min_note_width > 0.0) {
            self.min_note_width = defaults.min_note_width;
        }
        if !(self.min_note_height.is_finite() && self.min_note_height > 0.0) {
            self.min_note_height = defaults.min_note_height;
        }
        self.note_width = self.note_width.max(self.min_note_width);
        self.note_height = self.note_height.max(self.min_note_height);
        self.stroke_color = sanitize_color(self.stroke_color);
        self.stroke_width = sanitize_width(self.stroke_width);
        self.note_palette.retain(|color| !color.is_empty());
        if self.note_palette.is_empty() {
            self.note_palette = defaults.note_palette;
        }
        self
    }
}

/// What the hosting page passes to `mount`.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MountOptions {
    pub document_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub config: ViewerConfig,
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

impl MountOptions {
    pub fn validate(mut self) -> Result<Self> {
        if self.document_id.trim().is_empty() {
            return Err(ViewerError::InvalidOptions("documentId is required".into()));
        }
        self.source_url = self.source_url.filter(|url| !url.trim().is_empty());
        self.user_id = self.user_id.filter(|id| !id.trim().is_empty());
        self.api_base = self.api_base.trim_end_matches('/').to_string();
        self.config = self.config.sanitized();
        Ok(self)
    }
}
