use pagemark_shared::{Point, Stroke};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        !(self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Where a bitmap lands inside its container under aspect-preserving fit
/// (letterboxed on the axis with spare room, centered).
pub fn fit_bitmap(container: Size, bitmap: Size) -> Option<Rect> {
    if container.is_empty() || bitmap.is_empty() {
        return None;
    }
    let scale = (container.width / bitmap.width).min(container.height / bitmap.height);
    let width = bitmap.width * scale;
    let height = bitmap.height * scale;
    Some(Rect {
        x: (container.width - width) / 2.0,
        y: (container.height - height) / 2.0,
        width,
        height,
    })
}

/// Converts a point relative to the container's top-left corner into page
/// coordinates in [0, 1].
pub fn normalize_point(x: f64, y: f64, container: Size, bitmap: Size) -> Option<Point> {
    if !x.is_finite() || !y.is_finite() {
        return None;
    }
    let displayed = fit_bitmap(container, bitmap)?;
    let nx = (x - displayed.x) / displayed.width;
    let ny = (y - displayed.y) / displayed.height;
    Some(Point::new(nx as f32, ny as f32).clamp())
}

pub fn denormalize_point(point: Point, container: Size, bitmap: Size) -> Option<(f64, f64)> {
    let displayed = fit_bitmap(container, bitmap)?;
    Some((
        displayed.x + point.x as f64 * displayed.width,
        displayed.y + point.y as f64 * displayed.height,
    ))
}

/// Page point in the pixel space of a canvas sized like the bitmap.
pub fn to_canvas(point: Point, canvas: Size) -> (f64, f64) {
    (point.x as f64 * canvas.width, point.y as f64 * canvas.height)
}

pub fn stroke_near(stroke: &Stroke, center: Point, radius: f32) -> bool {
    stroke
        .points
        .iter()
        .any(|point| point.distance(center) <= radius)
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PathCommand {
    MoveTo(f64, f64),
    QuadTo { cx: f64, cy: f64, x: f64, y: f64 },
    LineTo(f64, f64),
}

/// Smooths a polyline by curving through segment midpoints, using each sampled
/// point as the control point. Fewer than two points yield no path.
pub fn smooth_path(points: &[Point], canvas: Size) -> Vec<PathCommand> {
    if points.len() < 2 {
        return Vec::new();
    }
    let mut commands = Vec::with_capacity(points.len() + 1);
    let (x, y) = to_canvas(points[0], canvas);
    commands.push(PathCommand::MoveTo(x, y));
    for window in points[1..].windows(2) {
        let (cx, cy) = to_canvas(window[0], canvas);
        let (nx, ny) = to_canvas(window[1], canvas);
        commands.push(PathCommand::QuadTo {
            cx,
            cy,
            x: (cx + nx) / 2.0,
            y: (cy + ny) / 2.0,
        });
    }
    let last = points[points.len() - 1];
    let (x, y) = to_canvas(last, canvas);
    commands.push(PathCommand::LineTo(x, y));
    commands
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-4;

    #[test]
    fn wide_container_letterboxes_horizontally() {
        let rect = fit_bitmap(Size::new(1000.0, 500.0), Size::new(600.0, 800.0)).unwrap();
        assert!((rect.height - 500.0).abs() < EPS);
        assert!((rect.width - 375.0).abs() < EPS);
        assert!((rect.x - 312.5).abs() < EPS);
        assert_eq!(rect.y, 0.0);
    }

    #[test]
    fn normalize_then_denormalize_returns_the_device_point() {
        let container = Size::new(1024.0, 700.0);
        let bitmap = Size::new(918.0, 1188.0);
        let displayed = fit_bitmap(container, bitmap).unwrap();
        for &(fx, fy) in &[(0.0, 0.0), (0.25, 0.75), (0.5, 0.5), (1.0, 1.0), (0.9, 0.1)] {
            let x = displayed.x + fx * displayed.width;
            let y = displayed.y + fy * displayed.height;
            let point = normalize_point(x, y, container, bitmap).unwrap();
            let (rx, ry) = denormalize_point(point, container, bitmap).unwrap();
            assert!((rx - x).abs() < 1e-3, "x {rx} vs {x}");
            assert!((ry - y).abs() < 1e-3, "y {ry} vs {y}");
        }
    }

    #[test]
    fn points_in_the_letterbox_clamp_to_the_page_edge() {
        let container = Size::new(1000.0, 500.0);
        let bitmap = Size::new(600.0, 800.0);
        let point = normalize_point(5.0, 250.0, container, bitmap).unwrap();
        assert_eq!(point.x, 0.0);
        let point = normalize_point(995.0, 600.0, container, bitmap).unwrap();
        assert_eq!(point, Point::new(1.0, 1.0));
    }

    #[test]
    fn normalization_survives_a_resize() {
        let bitmap = Size::new(600.0, 800.0);
        let small = Size::new(300.0, 400.0);
        let large = Size::new(900.0, 1200.0);
        let point = normalize_point(150.0, 100.0, small, bitmap).unwrap();
        let (x, y) = denormalize_point(point, large, bitmap).unwrap();
        assert!((x - 450.0).abs() < 1e-3);
        assert!((y - 300.0).abs() < 1e-3);
    }

    #[test]
    fn empty_container_cannot_normalize() {
        assert!(normalize_point(1.0, 1.0, Size::new(0.0, 10.0), Size::new(5.0, 5.0)).is_none());
    }

    #[test]
    fn smooth_path_curves_through_midpoints() {
        let points = [Point::new(0.0, 0.0), Point::new(0.5, 0.0), Point::new(1.0, 1.0)];
        let commands = smooth_path(&points, Size::new(100.0, 100.0));
        assert_eq!(
            commands,
            vec![
                PathCommand::MoveTo(0.0, 0.0),
                PathCommand::QuadTo {
                    cx: 50.0,
                    cy: 0.0,
                    x: 75.0,
                    y: 50.0
                },
                PathCommand::LineTo(100.0, 100.0),
            ]
        );
    }

    #[test]
    fn single_point_has_no_path() {
        assert!(smooth_path(&[Point::new(0.2, 0.2)], Size::new(10.0, 10.0)).is_empty());
    }
}
