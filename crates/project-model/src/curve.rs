//! Keyframe curves for animated scalar properties.
//!
//! A curve is a list of anchors, each carrying an incoming (`cs`) and an
//! outgoing (`ce`) control point. Consecutive anchors form one cubic Bezier
//! segment in the `(time, value)` plane: `p_i`, `p_i.ce`, `p_{i+1}.cs`,
//! `p_{i+1}`. Times are milliseconds relative to the owning element's start.
//!
//! Lists are immutable values. Editing returns a new list with a higher
//! revision, so an interpolation pass never observes a half-edited curve.

use serde::{Deserialize, Serialize};

/// Offset of auto-generated control points from a freshly inserted anchor.
pub const HANDLE_OFFSET_MS: f64 = 100.0;

/// Accuracy of the time -> curve parameter inversion, in milliseconds.
/// Two anchors closer than this are considered to share a time.
pub const TIME_TOLERANCE_MS: f64 = 0.5;

const MAX_NEWTON_ITERATIONS: usize = 8;
const MAX_BISECTION_ITERATIONS: usize = 64;

/// Segment shape leaving an anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyframeKind {
    #[default]
    Cubic,
    Linear,
}

/// One anchor with its two Bezier control points, each `[time_ms, value]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    #[serde(rename = "type", default)]
    pub kind: KeyframeKind,
    pub p: [f64; 2],
    pub cs: [f64; 2],
    pub ce: [f64; 2],
}

impl Keyframe {
    /// Anchor with symmetric handles at the same value, giving a flat tangent.
    pub fn anchor(time: f64, value: f64) -> Self {
        Self {
            kind: KeyframeKind::Cubic,
            p: [time, value],
            cs: [time - HANDLE_OFFSET_MS, value],
            ce: [time + HANDLE_OFFSET_MS, value],
        }
    }

    pub fn time(&self) -> f64 {
        self.p[0]
    }

    pub fn value(&self) -> f64 {
        self.p[1]
    }

    fn is_finite(&self) -> bool {
        self.p
            .iter()
            .chain(self.cs.iter())
            .chain(self.ce.iter())
            .all(|v| v.is_finite())
    }
}

/// Which point of a keyframe an edit addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Handle {
    /// The anchor itself (`p`).
    Anchor,
    /// Incoming control point (`cs`).
    In,
    /// Outgoing control point (`ce`).
    Out,
}

/// Errors raised by curve edits. The source list is never modified.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CurveError {
    #[error("a keyframe already exists at {time}ms")]
    DuplicateTime { time: f64 },

    #[error("keyframe index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("keyframe values must be finite")]
    NonFinite,

    #[error("keyframes must be strictly increasing in time (at index {index})")]
    Unordered { index: usize },
}

/// An ordered, versioned sequence of keyframes.
///
/// Serialized as a plain array of keyframes; the revision is runtime-only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<Keyframe>", into = "Vec<Keyframe>")]
pub struct KeyframeList {
    points: Vec<Keyframe>,
    revision: u64,
}

impl PartialEq for KeyframeList {
    fn eq(&self, other: &Self) -> bool {
        self.points == other.points
    }
}

impl TryFrom<Vec<Keyframe>> for KeyframeList {
    type Error = CurveError;

    fn try_from(points: Vec<Keyframe>) -> Result<Self, Self::Error> {
        Self::from_points(points)
    }
}

impl From<KeyframeList> for Vec<Keyframe> {
    fn from(list: KeyframeList) -> Self {
        list.points
    }
}

impl KeyframeList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a list from keyframes already sorted by anchor time.
    pub fn from_points(points: Vec<Keyframe>) -> Result<Self, CurveError> {
        if points.iter().any(|k| !k.is_finite()) {
            return Err(CurveError::NonFinite);
        }
        for (index, pair) in points.windows(2).enumerate() {
            if pair[1].time() - pair[0].time() < TIME_TOLERANCE_MS {
                return Err(CurveError::Unordered { index: index + 1 });
            }
        }
        Ok(Self {
            points,
            revision: 0,
        })
    }

    pub fn points(&self) -> &[Keyframe] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Number of edits that produced this list.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn first(&self) -> Option<&Keyframe> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&Keyframe> {
        self.points.last()
    }

    /// Index of the anchor sharing `time`, within [`TIME_TOLERANCE_MS`].
    pub fn position_of(&self, time: f64) -> Option<usize> {
        self.points
            .iter()
            .position(|k| (k.time() - time).abs() < TIME_TOLERANCE_MS)
    }

    fn derive(&self, points: Vec<Keyframe>) -> Self {
        Self {
            points,
            revision: self.revision + 1,
        }
    }

    /// Insert an anchor with auto-generated handles at ±[`HANDLE_OFFSET_MS`].
    pub fn with_anchor(&self, time: f64, value: f64) -> Result<Self, CurveError> {
        self.with_point(Keyframe::anchor(time, value))
    }

    /// Insert a fully specified keyframe in time order.
    pub fn with_point(&self, keyframe: Keyframe) -> Result<Self, CurveError> {
        if !keyframe.is_finite() {
            return Err(CurveError::NonFinite);
        }
        if self.position_of(keyframe.time()).is_some() {
            return Err(CurveError::DuplicateTime {
                time: keyframe.time(),
            });
        }
        let at = self.points.partition_point(|k| k.time() < keyframe.time());
        let mut points = self.points.clone();
        points.insert(at, keyframe);
        Ok(self.derive(points))
    }

    /// Remove the keyframe at `index`.
    pub fn without_point(&self, index: usize) -> Result<Self, CurveError> {
        self.check_index(index)?;
        let mut points = self.points.clone();
        points.remove(index);
        Ok(self.derive(points))
    }

    /// Move one point of the keyframe at `index`.
    ///
    /// Moving the anchor re-centres both handles at ±[`HANDLE_OFFSET_MS`]
    /// around the new position and keeps the list sorted. A move onto the
    /// time of another anchor is rejected.
    pub fn with_moved_point(
        &self,
        index: usize,
        handle: Handle,
        time: f64,
        value: f64,
    ) -> Result<Self, CurveError> {
        self.check_index(index)?;
        if !time.is_finite() || !value.is_finite() {
            return Err(CurveError::NonFinite);
        }

        let mut points = self.points.clone();
        match handle {
            Handle::Anchor => {
                if let Some(other) = self.position_of(time) {
                    if other != index {
                        return Err(CurveError::DuplicateTime { time });
                    }
                }
                let kind = points[index].kind;
                points[index] = Keyframe {
                    kind,
                    ..Keyframe::anchor(time, value)
                };
                points.sort_by(|a, b| a.time().total_cmp(&b.time()));
            }
            Handle::In => points[index].cs = [time, value],
            Handle::Out => points[index].ce = [time, value],
        }
        Ok(self.derive(points))
    }

    /// Switch the segment shape leaving the keyframe at `index`.
    pub fn with_kind(&self, index: usize, kind: KeyframeKind) -> Result<Self, CurveError> {
        self.check_index(index)?;
        let mut points = self.points.clone();
        points[index].kind = kind;
        Ok(self.derive(points))
    }

    fn check_index(&self, index: usize) -> Result<(), CurveError> {
        if index >= self.points.len() {
            return Err(CurveError::IndexOutOfRange {
                index,
                len: self.points.len(),
            });
        }
        Ok(())
    }

    /// Curve value at a time relative to the element start.
    ///
    /// Returns `None` for an empty list or a time before the first anchor.
    /// After the last anchor its value is held.
    pub fn value_at(&self, time: f64) -> Option<f64> {
        let first = self.points.first()?;
        if time < first.time() {
            return None;
        }
        if time == first.time() {
            return Some(first.value());
        }

        // Index of the first anchor strictly after `time`.
        let next = self.points.partition_point(|k| k.time() <= time);
        if next == self.points.len() {
            return self.points.last().map(Keyframe::value);
        }
        let start = &self.points[next - 1];
        if start.time() == time {
            return Some(start.value());
        }
        Some(evaluate_segment(start, &self.points[next], time))
    }
}

/// Evaluate a keyframe list at an absolute timeline time.
///
/// `cursor_ms` is made relative to `element_start_ms` first. An empty list
/// or a time before the first keyframe yields `base`.
pub fn interpolate(base: f64, list: &KeyframeList, element_start_ms: f64, cursor_ms: f64) -> f64 {
    list.value_at(cursor_ms - element_start_ms).unwrap_or(base)
}

fn evaluate_segment(start: &Keyframe, end: &Keyframe, time: f64) -> f64 {
    let (t0, v0) = (start.p[0], start.p[1]);
    let (t3, v3) = (end.p[0], end.p[1]);
    let span = t3 - t0;
    if span <= 0.0 {
        return v3;
    }

    if start.kind == KeyframeKind::Linear {
        return v0 + (v3 - v0) * ((time - t0) / span);
    }

    // Control times are clamped into the segment so time(u) is monotonic.
    let t1 = start.ce[0].clamp(t0, t3);
    let t2 = end.cs[0].clamp(t0, t3);
    let u = solve_parameter([t0, t1, t2, t3], time);
    bezier([v0, start.ce[1], end.cs[1], v3], u)
}

fn bezier(c: [f64; 4], u: f64) -> f64 {
    let m = 1.0 - u;
    m * m * m * c[0] + 3.0 * m * m * u * c[1] + 3.0 * m * u * u * c[2] + u * u * u * c[3]
}

fn bezier_derivative(c: [f64; 4], u: f64) -> f64 {
    let m = 1.0 - u;
    3.0 * m * m * (c[1] - c[0]) + 6.0 * m * u * (c[2] - c[1]) + 3.0 * u * u * (c[3] - c[2])
}

/// Find `u` in `[0, 1]` with `bezier(times, u) ≈ time`.
///
/// Newton's method from a linear guess, falling back to bisection when a
/// step leaves the unit interval or stalls on a flat derivative.
fn solve_parameter(times: [f64; 4], time: f64) -> f64 {
    let mut u = ((time - times[0]) / (times[3] - times[0])).clamp(0.0, 1.0);
    for _ in 0..MAX_NEWTON_ITERATIONS {
        let error = bezier(times, u) - time;
        if error.abs() < TIME_TOLERANCE_MS * 1e-3 {
            return u;
        }
        let slope = bezier_derivative(times, u);
        if slope.abs() < 1e-9 {
            break;
        }
        let next = u - error / slope;
        if !(0.0..=1.0).contains(&next) {
            break;
        }
        u = next;
    }

    let (mut lo, mut hi) = (0.0_f64, 1.0_f64);
    for _ in 0..MAX_BISECTION_ITERATIONS {
        u = 0.5 * (lo + hi);
        let error = bezier(times, u) - time;
        if error.abs() < TIME_TOLERANCE_MS * 1e-3 {
            break;
        }
        if error < 0.0 {
            lo = u;
        } else {
            hi = u;
        }
    }
    u
}
