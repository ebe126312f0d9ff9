use pagemark_shared::{sanitize_color, sanitize_stroke, sanitize_width, Point, Stroke};

use crate::config::ViewerConfig;
use crate::geometry::stroke_near;
use crate::state::{Gesture, Tool};
use crate::stroke_store::StrokeStore;
use crate::util::make_id;

#[derive(Clone, Debug, PartialEq)]
pub enum SurfaceAction {
    Redraw,
    /// A finished pen stroke, written on its own.
    PersistStroke(Stroke),
    /// The page's complete retained stroke set after an erase gesture.
    ReplacePage(Vec<Stroke>),
}

/// Pointer input over the rendered page while drawing mode is on.
#[derive(Debug)]
pub struct AnnotationSurface {
    drawing_mode: bool,
    tool: Tool,
    color: String,
    width: f32,
    eraser_radius: f32,
    gesture: Gesture,
    warned_anonymous: bool,
}

impl AnnotationSurface {
    pub fn new(config: &ViewerConfig) -> Self {
        Self {
            drawing_mode: false,
            tool: Tool::Pen,
            color: sanitize_color(config.stroke_color.clone()),
            width: sanitize_width(config.stroke_width),
            eraser_radius: config.eraser_radius,
            gesture: Gesture::Idle,
            warned_anonymous: false,
        }
    }

    pub fn drawing_mode(&self) -> bool {
        self.drawing_mode
    }

    /// Swipe navigation is suppressed while drawing mode is on.
    pub fn suppresses_navigation(&self) -> bool {
        self.drawing_mode
    }

    /// Returns `true` when the caller should show the one-time warning that
    /// strokes will not outlive the session.
    pub fn set_drawing_mode(&mut self, enabled: bool, authenticated: bool) -> bool {
        self.drawing_mode = enabled;
        if enabled && !authenticated && !self.warned_anonymous {
            self.warned_anonymous = true;
            return true;
        }
        false
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    /// Switching to the eraser in the middle of a stroke turns the gesture into an
    /// erase; the unfinished stroke can then be erased before it is ever stored.
    pub fn set_tool(&mut self, tool: Tool) {
        self.tool = tool;
        if tool != Tool::Eraser {
            return;
        }
        let gesture = std::mem::replace(&mut self.gesture, Gesture::Idle);
        self.gesture = match gesture {
            Gesture::Drawing { pointer_id, stroke } => Gesture::Erasing {
                pointer_id,
                removed: 0,
                pending: Some(stroke),
            },
            other => other,
        };
    }

    pub fn color(&self) -> &str {
        &self.color
    }

    pub fn set_color(&mut self, color: String) {
        self.color = sanitize_color(color);
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn set_width(&mut self, width: f32) {
        self.width = sanitize_width(width);
    }

    pub fn eraser_radius(&self) -> f32 {
        self.eraser_radius
    }

    pub fn gesture_active(&self) -> bool {
        self.gesture.is_active()
    }

    /// The stroke being drawn, painted after the committed ones.
    pub fn active_stroke(&self) -> Option<&Stroke> {
        match &self.gesture {
            Gesture::Drawing { stroke, .. } => Some(stroke),
            Gesture::Erasing { pending, .. } => pending.as_ref(),
            Gesture::Idle => None,
        }
    }

    pub fn pointer_down(
        &mut self,
        pointer_id: i32,
        point: Point,
        store: &mut StrokeStore,
        page: u32,
    ) -> Vec<SurfaceAction> {
        if !self.drawing_mode || self.gesture.is_active() || !point.is_finite() {
            return Vec::new();
        }
        let point = point.clamp();
        match self.tool.stroke_tool() {
            Some(tool) => {
                self.gesture = Gesture::Drawing {
                    pointer_id,
                    stroke: Stroke {
                        id: make_id(),
                        color: self.color.clone(),
                        width: self.width,
                        tool,
                        points: vec![point],
                    },
                };
                Vec::new()
            }
            None => {
                self.gesture = Gesture::Erasing {
                    pointer_id,
                    removed: 0,
                    pending: None,
                };
                if self.erase_at(point, store, page) {
                    vec![SurfaceAction::Redraw]
                } else {
                    Vec::new()
                }
            }
        }
    }

    pub fn pointer_move(
        &mut self,
        pointer_id: i32,
        point: Point,
        store: &mut StrokeStore,
        page: u32,
    ) -> Vec<SurfaceAction> {
        if self.gesture.pointer_id() != Some(pointer_id) || !point.is_finite() {
            return Vec::new();
        }
        let point = point.clamp();
        if matches!(self.gesture, Gesture::Erasing { .. }) {
            return if self.erase_at(point, store, page) {
                vec![SurfaceAction::Redraw]
            } else {
                Vec::new()
            };
        }
        let Gesture::Drawing { stroke, .. } = &mut self.gesture else {
            return Vec::new();
        };
        if stroke.points.last() == Some(&point) {
            return Vec::new();
        }
        stroke.points.push(point);
        vec![SurfaceAction::Redraw]
    }

    pub fn pointer_up(
        &mut self,
        pointer_id: i32,
        store: &mut StrokeStore,
        page: u32,
    ) -> Vec<SurfaceAction> {
        if self.gesture.pointer_id() != Some(pointer_id) {
            return Vec::new();
        }
        self.finish(store, page, true)
    }

    /// Ends any gesture without a pointer release (page change, drawing mode off).
    /// An unfinished stroke is dropped; erasures already shown are still persisted.
    pub fn abort(&mut self, store: &mut StrokeStore, page: u32) -> Vec<SurfaceAction> {
        if !self.gesture.is_active() {
            return Vec::new();
        }
        self.finish(store, page, false)
    }

    fn finish(&mut self, store: &mut StrokeStore, page: u32, commit: bool) -> Vec<SurfaceAction> {
        match std::mem::replace(&mut self.gesture, Gesture::Idle) {
            Gesture::Idle => Vec::new(),
            Gesture::Drawing { stroke, .. } => {
                let finished = if commit { sanitize_stroke(stroke) } else { None };
                match finished {
                    Some(stroke) => {
                        store.append(page, stroke.clone());
                        vec![SurfaceAction::PersistStroke(stroke), SurfaceAction::Redraw]
                    }
                    None => vec![SurfaceAction::Redraw],
                }
            }
            Gesture::Erasing {
                removed, pending, ..
            } => {
                let pending = if commit {
                    pending.and_then(sanitize_stroke)
                } else {
                    None
                };
                match (removed > 0, pending) {
                    (false, None) => vec![SurfaceAction::Redraw],
                    (false, Some(stroke)) => {
                        store.append(page, stroke.clone());
                        vec![SurfaceAction::PersistStroke(stroke), SurfaceAction::Redraw]
                    }
                    (true, pending) => {
                        if let Some(stroke) = pending {
                            store.append(page, stroke);
                        }
                        vec![
                            SurfaceAction::ReplacePage(store.strokes(page).to_vec()),
                            SurfaceAction::Redraw,
                        ]
                    }
                }
            }
        }
    }

    /// Drops every stroke with a point inside the eraser radius. Returns whether
    /// anything visible changed.
    fn erase_at(&mut self, point: Point, store: &mut StrokeStore, page: u32) -> bool {
        let radius = self.eraser_radius;
        let Gesture::Erasing {
            removed, pending, ..
        } = &mut self.gesture
        else {
            return false;
        };
        let dropped = store.retain(page, |stroke| !stroke_near(stroke, point, radius));
        *removed += dropped;
        let mut changed = dropped > 0;
        if pending
            .as_ref()
            .is_some_and(|stroke| stroke_near(stroke, point, radius))
        {
            *pending = None;
            changed = true;
        }
        changed
    }
}
