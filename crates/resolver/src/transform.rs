//! Transform resolution.
//!
//! Every animatable property is either evaluated from its active keyframe
//! track or read from the element's static field. The resolved values are
//! then expanded into a fixed sequence of drawing steps:
//!
//! ```text
//! translate(x, y)
//!   -> translate(centre) -> rotate -> translate(-centre)
//!   -> translate(centre) -> scale  -> translate(-centre)
//!   -> alpha *= opacity / 100
//! ```
//!
//! The centre is always the middle of the element's own box.

use clipforge_project_model::{
    interpolate, AnimatedProperty, Axis, Element, Timeline, SCALE_CURVE_UNIT,
};
use serde::Serialize;

use crate::visibility::effective_start;

/// Resolved placement of an element at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResolvedTransform {
    pub x: f64,
    pub y: f64,
    /// Degrees, clockwise.
    pub rotation: f64,
    /// Uniform scale factor (1.0 = authored size).
    pub scale: f64,
    /// 0 to 100.
    pub opacity: f64,
}

impl ResolvedTransform {
    pub fn alpha(&self) -> f64 {
        (self.opacity / 100.0).clamp(0.0, 1.0)
    }
}

/// Resolve using the element's own `startTime` as the keyframe origin.
pub fn resolve_transform(element: &Element, time_ms: f64) -> ResolvedTransform {
    resolve_transform_at(element, element.start_time, time_ms)
}

/// Resolve with keyframes anchored at the element's effective start,
/// which includes the start of a text element's parent.
pub fn resolve_transform_in(
    timeline: &Timeline,
    element: &Element,
    time_ms: f64,
) -> ResolvedTransform {
    resolve_transform_at(element, effective_start(timeline, element), time_ms)
}

/// Resolve with an explicit keyframe origin.
pub fn resolve_transform_at(element: &Element, origin_ms: f64, time_ms: f64) -> ResolvedTransform {
    let value = |property: AnimatedProperty, axis: Axis| {
        let base = element.static_value(property, axis);
        match element.animation.active_list(property, axis) {
            Some(list) => interpolate(base, list, origin_ms, time_ms),
            None => base,
        }
    };

    ResolvedTransform {
        x: value(AnimatedProperty::Position, Axis::X),
        y: value(AnimatedProperty::Position, Axis::Y),
        rotation: value(AnimatedProperty::Rotation, Axis::X),
        scale: value(AnimatedProperty::Scale, Axis::X) / SCALE_CURVE_UNIT,
        opacity: value(AnimatedProperty::Opacity, Axis::X).clamp(0.0, 100.0),
    }
}

/// One primitive drawing-state change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum TransformStep {
    Translate { x: f64, y: f64 },
    /// Radians, clockwise in screen space.
    Rotate { radians: f64 },
    Scale { x: f64, y: f64 },
    MultiplyAlpha(f64),
}

/// Expand a resolved transform into the ordered drawing steps.
pub fn transform_steps(resolved: &ResolvedTransform, width: f64, height: f64) -> [TransformStep; 8] {
    let (cx, cy) = (width / 2.0, height / 2.0);
    [
        TransformStep::Translate {
            x: resolved.x,
            y: resolved.y,
        },
        TransformStep::Translate { x: cx, y: cy },
        TransformStep::Rotate {
            radians: resolved.rotation.to_radians(),
        },
        TransformStep::Translate { x: -cx, y: -cy },
        TransformStep::Translate { x: cx, y: cy },
        TransformStep::Scale {
            x: resolved.scale,
            y: resolved.scale,
        },
        TransformStep::Translate { x: -cx, y: -cy },
        TransformStep::MultiplyAlpha(resolved.alpha()),
    ]
}

/// Axis-aligned rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

/// 2D affine matrix in canvas order: `x' = a*x + c*y + e`, `y' = b*x + d*y + f`.
///
/// Operations post-multiply, matching how a drawing context accumulates
/// `translate`/`rotate`/`scale` calls.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Affine {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Default for Affine {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Affine {
    pub const IDENTITY: Affine = Affine {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    pub fn translate(self, tx: f64, ty: f64) -> Self {
        Self {
            e: self.e + self.a * tx + self.c * ty,
            f: self.f + self.b * tx + self.d * ty,
            ..self
        }
    }

    pub fn rotate(self, radians: f64) -> Self {
        let (sin, cos) = radians.sin_cos();
        Self {
            a: self.a * cos + self.c * sin,
            b: self.b * cos + self.d * sin,
            c: self.c * cos - self.a * sin,
            d: self.d * cos - self.b * sin,
            ..self
        }
    }

    pub fn scale(self, sx: f64, sy: f64) -> Self {
        Self {
            a: self.a * sx,
            b: self.b * sx,
            c: self.c * sy,
            d: self.d * sy,
            ..self
        }
    }

    /// Apply a drawing step; alpha steps leave the matrix unchanged.
    pub fn then(self, step: &TransformStep) -> Self {
        match *step {
            TransformStep::Translate { x, y } => self.translate(x, y),
            TransformStep::Rotate { radians } => self.rotate(radians),
            TransformStep::Scale { x, y } => self.scale(x, y),
            TransformStep::MultiplyAlpha(_) => self,
        }
    }

    /// Fold a step sequence into a matrix and the accumulated alpha.
    pub fn from_steps(steps: &[TransformStep]) -> (Self, f64) {
        steps.iter().fold((Self::IDENTITY, 1.0), |(m, alpha), step| match step {
            TransformStep::MultiplyAlpha(k) => (m, alpha * k),
            other => (m.then(other), alpha),
        })
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }

    pub fn determinant(&self) -> f64 {
        self.a * self.d - self.b * self.c
    }

    /// Inverse matrix, or `None` when degenerate (e.g. zero scale).
    pub fn inverse(&self) -> Option<Self> {
        let det = self.determinant();
        if det.abs() < 1e-12 {
            return None;
        }
        Some(Self {
            a: self.d / det,
            b: -self.b / det,
            c: -self.c / det,
            d: self.a / det,
            e: (self.c * self.f - self.d * self.e) / det,
            f: (self.b * self.e - self.a * self.f) / det,
        })
    }

    /// Bounding box of the rectangle `(0, 0, w, h)` after transformation.
    pub fn bounding_box(&self, w: f64, h: f64) -> Rect {
        let corners = [
            self.apply(0.0, 0.0),
            self.apply(w, 0.0),
            self.apply(0.0, h),
            self.apply(w, h),
        ];
        let (min_x, min_y, max_x, max_y) = corners.iter().fold(
            (f64::MAX, f64::MAX, f64::MIN, f64::MIN),
            |(lx, ly, hx, hy), &(x, y)| (lx.min(x), ly.min(y), hx.max(x), hy.max(y)),
        );
        Rect {
            x: min_x,
            y: min_y,
            w: max_x - min_x,
            h: max_y - min_y,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipforge_project_model::{ElementKind, ImageElement};

    fn image() -> Element {
        Element::new(
            ElementKind::Image(ImageElement {
                localpath: "a.png".to_string(),
            }),
            1000.0,
            4000.0,
        )
        .with_size(200.0, 100.0)
        .with_location(10.0, 20.0)
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_static_fields_without_animation() {
        let mut element = image();
        element.rotation = 30.0;
        element.opacity = 40.0;
        let resolved = resolve_transform(&element, 2000.0);
        assert_eq!(
            resolved,
            ResolvedTransform {
                x: 10.0,
                y: 20.0,
                rotation: 30.0,
                scale: 1.0,
                opacity: 40.0
            }
        );
        assert!(close(resolved.alpha(), 0.4));
    }

    #[test]
    fn test_active_track_is_evaluated_relative_to_start() {
        let mut element = image();
        let track = element.animation.track_mut(AnimatedProperty::Position);
        track.is_active = true;
        track.x = track
            .x
            .with_anchor(0.0, 0.0)
            .unwrap()
            .with_anchor(1000.0, 500.0)
            .unwrap();

        let at_start = resolve_transform(&element, 1000.0);
        assert_eq!(at_start.x, 0.0);
        assert_eq!(at_start.y, 20.0);
        let held = resolve_transform(&element, 4000.0);
        assert_eq!(held.x, 500.0);
        let before = resolve_transform(&element, 500.0);
        assert_eq!(before.x, 10.0);
    }

    #[test]
    fn test_inactive_track_falls_back_to_static() {
        let mut element = image();
        let track = element.animation.track_mut(AnimatedProperty::Rotation);
        track.x = track.x.with_anchor(0.0, 90.0).unwrap();
        assert_eq!(resolve_transform(&element, 1500.0).rotation, 0.0);
    }

    #[test]
    fn test_scale_curve_in_tenths() {
        let mut element = image();
        let track = element.animation.track_mut(AnimatedProperty::Scale);
        track.is_active = true;
        track.x = track.x.with_anchor(0.0, 20.0).unwrap();
        assert!(close(resolve_transform(&element, 1000.0).scale, 2.0));
    }

    #[test]
    fn test_steps_keep_canonical_order() {
        let resolved = ResolvedTransform {
            x: 10.0,
            y: 20.0,
            rotation: 90.0,
            scale: 2.0,
            opacity: 50.0,
        };
        let steps = transform_steps(&resolved, 200.0, 100.0);
        assert_eq!(steps[0], TransformStep::Translate { x: 10.0, y: 20.0 });
        assert_eq!(steps[1], TransformStep::Translate { x: 100.0, y: 50.0 });
        assert!(matches!(steps[2], TransformStep::Rotate { .. }));
        assert_eq!(steps[3], TransformStep::Translate { x: -100.0, y: -50.0 });
        assert_eq!(steps[5], TransformStep::Scale { x: 2.0, y: 2.0 });
        assert_eq!(steps[7], TransformStep::MultiplyAlpha(0.5));
    }

    #[test]
    fn test_box_centre_is_fixed_point_of_rotation_and_scale() {
        let resolved = ResolvedTransform {
            x: 10.0,
            y: 20.0,
            rotation: 37.0,
            scale: 1.7,
            opacity: 100.0,
        };
        let (matrix, alpha) = Affine::from_steps(&transform_steps(&resolved, 200.0, 100.0));
        let (cx, cy) = matrix.apply(100.0, 50.0);
        assert!(close(cx, 110.0) && close(cy, 70.0));
        assert!(close(alpha, 1.0));
    }

    #[test]
    fn test_quarter_turn_bounding_box() {
        let resolved = ResolvedTransform {
            x: 0.0,
            y: 0.0,
            rotation: 90.0,
            scale: 1.0,
            opacity: 100.0,
        };
        let (matrix, _) = Affine::from_steps(&transform_steps(&resolved, 200.0, 100.0));
        let bbox = matrix.bounding_box(200.0, 100.0);
        assert!(close(bbox.x, 50.0) && close(bbox.y, -50.0));
        assert!(close(bbox.w, 100.0) && close(bbox.h, 200.0));
    }

    #[test]
    fn test_inverse_round_trip() {
        let m = Affine::IDENTITY.translate(5.0, -3.0).rotate(0.4).scale(2.0, 0.5);
        let inv = m.inverse().unwrap();
        let (x, y) = m.apply(7.0, 11.0);
        let (bx, by) = inv.apply(x, y);
        assert!((bx - 7.0).abs() < 1e-9 && (by - 11.0).abs() < 1e-9);
        assert!(Affine::IDENTITY.scale(0.0, 1.0).inverse().is_none());
    }
}
