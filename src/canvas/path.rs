use std::f64::consts::{PI, TAU};

use kurbo::{Arc, BezPath, PathEl, Shape};

use crate::canvas::style::{LineCap, LineJoin};
use crate::foundation::core::{Affine, Point, Rect, Vec2};

const ARC_TOLERANCE: f64 = 0.05;
const STROKE_TOLERANCE: f64 = 0.05;

/// The context's current path.
///
/// Points are mapped through the transform in effect when they are added, so the stored path is
/// in device space and later transform changes do not move it.
#[derive(Clone, Debug, Default)]
pub(crate) struct CanvasPath {
    path: BezPath,
    subpath_start: Option<Point>,
    current: Option<Point>,
}

impl CanvasPath {
    pub(crate) fn as_bez(&self) -> &BezPath {
        &self.path
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.path.elements().is_empty()
    }

    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }

    pub(crate) fn move_to(&mut self, ctm: Affine, p: Point) {
        let d = ctm * p;
        self.path.move_to(d);
        self.subpath_start = Some(d);
        self.current = Some(d);
    }

    pub(crate) fn line_to(&mut self, ctm: Affine, p: Point) {
        if self.current.is_none() {
            self.move_to(ctm, p);
            return;
        }
        let d = ctm * p;
        self.path.line_to(d);
        self.current = Some(d);
    }

    pub(crate) fn bezier_curve_to(&mut self, ctm: Affine, c1: Point, c2: Point, p: Point) {
        if self.current.is_none() {
            self.move_to(ctm, c1);
        }
        let d = ctm * p;
        self.path.curve_to(ctm * c1, ctm * c2, d);
        self.current = Some(d);
    }

    pub(crate) fn close_path(&mut self) {
        if self.current.is_none() {
            return;
        }
        self.path.close_path();
        self.current = self.subpath_start;
    }

    pub(crate) fn rect(&mut self, ctm: Affine, x: f64, y: f64, w: f64, h: f64) {
        self.move_to(ctm, Point::new(x, y));
        self.line_to(ctm, Point::new(x + w, y));
        self.line_to(ctm, Point::new(x + w, y + h));
        self.line_to(ctm, Point::new(x, y + h));
        self.close_path();
        self.move_to(ctm, Point::new(x, y));
    }

    /// Rounded rectangle with one radius for every corner. Negative radii are ignored.
    pub(crate) fn round_rect(&mut self, ctm: Affine, x: f64, y: f64, w: f64, h: f64, radius: f64) {
        if radius < 0.0 {
            return;
        }
        let rect = Rect::new(x, y, x + w, y + h).abs();
        let radius = radius.min(rect.width() / 2.0).min(rect.height() / 2.0);
        let shape = rect.to_rounded_rect(radius);
        for el in shape.path_elements(ARC_TOLERANCE) {
            self.push_transformed(ctm, el);
        }
        self.move_to(ctm, Point::new(x, y));
    }

    /// Circular arc around `(cx, cy)`. Negative radii are ignored.
    pub(crate) fn arc(
        &mut self,
        ctm: Affine,
        center: Point,
        radius: f64,
        start: f64,
        end: f64,
        anticlockwise: bool,
    ) {
        self.ellipse(ctm, center, radius, radius, 0.0, start, end, anticlockwise);
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn ellipse(
        &mut self,
        ctm: Affine,
        center: Point,
        rx: f64,
        ry: f64,
        rotation: f64,
        start: f64,
        end: f64,
        anticlockwise: bool,
    ) {
        if rx < 0.0 || ry < 0.0 {
            return;
        }
        let sweep = arc_sweep(start, end, anticlockwise);
        let arc = Arc {
            center,
            radii: Vec2::new(rx, ry),
            start_angle: start,
            sweep_angle: sweep,
            x_rotation: rotation,
        };

        let (ex, ey) = (rx * start.cos(), ry * start.sin());
        let (sin, cos) = rotation.sin_cos();
        let first = center + Vec2::new(ex * cos - ey * sin, ex * sin + ey * cos);
        self.line_to(ctm, first);
        for el in arc.append_iter(ARC_TOLERANCE) {
            self.push_transformed(ctm, el);
        }
    }

    /// `arcTo`: a line to the first tangent point followed by an arc of `radius` tangent to both
    /// lines `current → p1` and `p1 → p2`.
    pub(crate) fn arc_to(&mut self, ctm: Affine, p1: Point, p2: Point, radius: f64) {
        if radius < 0.0 {
            return;
        }
        let Some(current) = self.current else {
            self.move_to(ctm, p1);
            return;
        };
        if ctm.determinant().abs() < f64::EPSILON {
            return;
        }
        let p0 = ctm.inverse() * current;

        let v1 = p0 - p1;
        let v2 = p2 - p1;
        let cross = v1.x * v2.y - v1.y * v2.x;
        if p0 == p1 || p1 == p2 || radius == 0.0 || cross.abs() < 1e-9 {
            self.line_to(ctm, p1);
            return;
        }

        let u1 = v1.normalize();
        let u2 = v2.normalize();
        let theta = u1.dot(u2).clamp(-1.0, 1.0).acos();
        let tangent_len = radius / (theta / 2.0).tan();
        let t1 = p1 + u1 * tangent_len;
        let t2 = p1 + u2 * tangent_len;
        let bisector = (u1 + u2).normalize();
        let center = p1 + bisector * (radius / (theta / 2.0).sin());

        let a0 = (t1 - center).atan2();
        let a1 = (t2 - center).atan2();
        let mut sweep = a1 - a0;
        while sweep > PI {
            sweep -= TAU;
        }
        while sweep <= -PI {
            sweep += TAU;
        }

        self.line_to(ctm, t1);
        let arc = Arc {
            center,
            radii: Vec2::new(radius, radius),
            start_angle: a0,
            sweep_angle: sweep,
            x_rotation: 0.0,
        };
        for el in arc.append_iter(ARC_TOLERANCE) {
            self.push_transformed(ctm, el);
        }
    }

    fn push_transformed(&mut self, ctm: Affine, el: PathEl) {
        match el {
            PathEl::MoveTo(p) => self.move_to(ctm, p),
            PathEl::LineTo(p) => self.line_to(ctm, p),
            PathEl::QuadTo(c, p) => {
                if self.current.is_none() {
                    self.move_to(ctm, c);
                }
                let d = ctm * p;
                self.path.quad_to(ctm * c, d);
                self.current = Some(d);
            }
            PathEl::CurveTo(c1, c2, p) => self.bezier_curve_to(ctm, c1, c2, p),
            PathEl::ClosePath => self.close_path(),
        }
    }
}

/// Canvas arc sweep: full turns are kept, otherwise the angle is reduced into one turn in the
/// drawing direction.
fn arc_sweep(start: f64, end: f64, anticlockwise: bool) -> f64 {
    if !anticlockwise {
        if end - start >= TAU {
            return TAU;
        }
        (end - start).rem_euclid(TAU)
    } else {
        if start - end >= TAU {
            return -TAU;
        }
        -(start - end).rem_euclid(TAU)
    }
}

/// Line settings used to outline a path.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct StrokeStyle {
    pub(crate) width: f64,
    pub(crate) cap: LineCap,
    pub(crate) join: LineJoin,
    pub(crate) miter_limit: f64,
    pub(crate) dash: Vec<f64>,
    pub(crate) dash_offset: f64,
}

/// Outline a user-space path and map the outline into device space.
///
/// The stroke width and dashes are interpreted in user space, as the 2D context does.
pub(crate) fn stroke_outline(user_path: &BezPath, ctm: Affine, style: &StrokeStyle) -> BezPath {
    let mut stroke = kurbo::Stroke::new(style.width)
        .with_caps(style.cap.to_kurbo())
        .with_join(style.join.to_kurbo())
        .with_miter_limit(style.miter_limit);
    if style.dash.iter().sum::<f64>() > 0.0 {
        stroke = stroke.with_dashes(style.dash_offset, style.dash.iter().copied());
    }
    let mut outline = kurbo::stroke(
        user_path.iter(),
        &stroke,
        &kurbo::StrokeOpts::default(),
        STROKE_TOLERANCE,
    );
    outline.apply_affine(ctm);
    outline
}

/// Map a device-space path back into user space. Returns `None` for a singular transform.
pub(crate) fn to_user_space(device_path: &BezPath, ctm: Affine) -> Option<BezPath> {
    if ctm.determinant().abs() < f64::EPSILON {
        return None;
    }
    let mut p = device_path.clone();
    p.apply_affine(ctm.inverse());
    Some(p)
}

/// A user-space rectangle as a closed path, normalized for negative sizes.
pub(crate) fn rect_path(x: f64, y: f64, w: f64, h: f64) -> BezPath {
    Rect::new(x, y, x + w, y + h).abs().to_path(ARC_TOLERANCE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(p: &BezPath) -> Rect {
        p.bounding_box()
    }

    #[test]
    fn points_are_stored_in_device_space() {
        let mut p = CanvasPath::default();
        p.move_to(Affine::translate((10.0, 0.0)), Point::new(0.0, 0.0));
        p.line_to(Affine::IDENTITY, Point::new(0.0, 5.0));
        let b = bbox(p.as_bez());
        assert_eq!(b, Rect::new(0.0, 0.0, 10.0, 5.0));
    }

    #[test]
    fn line_to_without_current_point_starts_subpath() {
        let mut p = CanvasPath::default();
        p.line_to(Affine::IDENTITY, Point::new(3.0, 4.0));
        assert!(matches!(p.as_bez().elements()[0], PathEl::MoveTo(_)));
    }

    #[test]
    fn arc_sweep_follows_canvas_rules() {
        assert!((arc_sweep(0.0, 7.0, false) - TAU).abs() < 1e-12);
        assert!((arc_sweep(0.0, PI, false) - PI).abs() < 1e-12);
        assert!((arc_sweep(0.0, PI, true) + PI).abs() < 1e-12);
        assert!((arc_sweep(0.0, -PI / 2.0, false) - 1.5 * PI).abs() < 1e-12);
        assert!((arc_sweep(7.0, 0.0, true) + TAU).abs() < 1e-12);
    }

    #[test]
    fn full_circle_bounds() {
        let mut p = CanvasPath::default();
        p.arc(Affine::IDENTITY, Point::new(50.0, 50.0), 10.0, 0.0, TAU, false);
        let b = bbox(p.as_bez());
        assert!((b.x0 - 40.0).abs() < 0.1 && (b.x1 - 60.0).abs() < 0.1);
        assert!((b.y0 - 40.0).abs() < 0.1 && (b.y1 - 60.0).abs() < 0.1);
    }

    #[test]
    fn arc_to_right_angle_corner_stays_inside_corner() {
        let mut p = CanvasPath::default();
        p.move_to(Affine::IDENTITY, Point::new(0.0, 0.0));
        p.arc_to(
            Affine::IDENTITY,
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            5.0,
        );
        let b = bbox(p.as_bez());
        assert!((b.x1 - 10.0).abs() < 0.01, "{b:?}");
        assert!((b.y1 - 5.0).abs() < 0.01, "{b:?}");
    }

    #[test]
    fn negative_radius_is_ignored() {
        let mut p = CanvasPath::default();
        p.arc(Affine::IDENTITY, Point::new(0.0, 0.0), -1.0, 0.0, PI, false);
        p.round_rect(Affine::IDENTITY, 0.0, 0.0, 5.0, 5.0, -2.0);
        assert!(p.is_empty());
    }

    #[test]
    fn stroke_width_scales_with_transform() {
        let user = rect_path(0.0, 0.0, 10.0, 10.0);
        let style = StrokeStyle {
            width: 2.0,
            cap: LineCap::Butt,
            join: LineJoin::Miter,
            miter_limit: 10.0,
            dash: vec![],
            dash_offset: 0.0,
        };
        let plain = stroke_outline(&user, Affine::IDENTITY, &style).bounding_box();
        let scaled = stroke_outline(&user, Affine::scale(2.0), &style).bounding_box();
        assert!((plain.x0 + 1.0).abs() < 0.01);
        assert!((scaled.x0 + 2.0).abs() < 0.01);
        assert!((scaled.x1 - 22.0).abs() < 0.01);
    }

    #[test]
    fn singular_transform_has_no_user_space() {
        let p = rect_path(0.0, 0.0, 1.0, 1.0);
        assert!(to_user_space(&p, Affine::scale(0.0)).is_none());
        assert!(to_user_space(&p, Affine::IDENTITY).is_some());
    }
}
