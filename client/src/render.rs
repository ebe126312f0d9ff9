use web_sys::CanvasRenderingContext2d;

use pagemark_shared::{Stroke, StrokeTool};

use crate::geometry::{smooth_path, PathCommand, Size};

const HIGHLIGHTER_ALPHA: f64 = 0.35;

#[derive(Clone, Debug, PartialEq)]
pub struct InkStyle {
    pub color: String,
    pub width: f64,
    pub alpha: f64,
}

impl InkStyle {
    pub fn for_stroke(stroke: &Stroke) -> Self {
        let alpha = match stroke.tool {
            StrokeTool::Pen => 1.0,
            StrokeTool::Highlighter => HIGHLIGHTER_ALPHA,
        };
        Self {
            color: stroke.color.clone(),
            width: stroke.width as f64,
            alpha,
        }
    }
}

/// The drawing calls the annotation layer needs from a 2D canvas.
pub trait InkCanvas {
    fn clear(&self, size: Size);
    fn stroke_path(&self, commands: &[PathCommand], style: &InkStyle);
}

/// Repaints the whole annotation layer: committed strokes first, then the stroke
/// in progress, so overlapping translucent ink always blends the same way.
pub fn paint_layer<C: InkCanvas + ?Sized>(
    canvas: &C,
    size: Size,
    committed: &[Stroke],
    active: Option<&Stroke>,
) {
    canvas.clear(size);
    for stroke in committed.iter().chain(active) {
        let commands = smooth_path(&stroke.points, size);
        if commands.is_empty() {
            continue;
        }
        canvas.stroke_path(&commands, &InkStyle::for_stroke(stroke));
    }
}

impl InkCanvas for CanvasRenderingContext2d {
    fn clear(&self, size: Size) {
        self.clear_rect(0.0, 0.0, size.width, size.height);
    }

    fn stroke_path(&self, commands: &[PathCommand], style: &InkStyle) {
        self.save();
        self.set_global_alpha(style.alpha);
        self.set_stroke_style_str(&style.color);
        self.set_line_width(style.width);
        self.set_line_cap("round");
        self.set_line_join("round");
        self.begin_path();
        for command in commands {
            match *command {
                PathCommand::MoveTo(x, y) => self.move_to(x, y),
                PathCommand::QuadTo { cx, cy, x, y } => self.quadratic_curve_to(cx, cy, x, y),
                PathCommand::LineTo(x, y) => self.line_to(x, y),
            }
        }
        self.stroke();
        self.restore();
    }
}
