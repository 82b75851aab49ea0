//! Visibility windows.
//!
//! An element is visible on the half-open interval `[start, end)`:
//! - untrimmed types (image, gif, text, shape): `[startTime, startTime + duration)`
//! - trimmed types (video, audio): `[startTime + trim.startTime, startTime + trim.endTime)`
//!
//! Text attached to a parent element is placed relative to the parent's
//! start time.

use clipforge_project_model::{Element, Timeline};
use serde::Serialize;

/// Half-open time interval in timeline milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VisibleWindow {
    pub start_ms: f64,
    pub end_ms: f64,
}

impl VisibleWindow {
    pub fn contains(&self, time_ms: f64) -> bool {
        self.start_ms <= time_ms && time_ms < self.end_ms
    }

    pub fn len_ms(&self) -> f64 {
        (self.end_ms - self.start_ms).max(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.end_ms <= self.start_ms
    }
}

/// Absolute start of an element, including a text parent's start.
pub fn effective_start(timeline: &Timeline, element: &Element) -> f64 {
    let parent_start = element
        .parent_key()
        .and_then(|key| timeline.get(key))
        .map(|parent| parent.start_time)
        .unwrap_or(0.0);
    element.start_time + parent_start
}

/// The interval during which the element is on screen (or audible).
pub fn visible_window(timeline: &Timeline, element: &Element) -> VisibleWindow {
    let start = effective_start(timeline, element);
    match element.trim() {
        Some(trim) => VisibleWindow {
            start_ms: start + trim.start_ms,
            end_ms: start + trim.end_ms,
        },
        None => VisibleWindow {
            start_ms: start,
            end_ms: start + element.duration,
        },
    }
}

pub fn is_visible_at_time(timeline: &Timeline, element: &Element, time_ms: f64) -> bool {
    visible_window(timeline, element).contains(time_ms)
}

/// Position in the element's source media for a timeline time (ms).
///
/// The element's start maps to source time zero; speed scales the offset.
pub fn source_time_ms(timeline: &Timeline, element: &Element, time_ms: f64) -> f64 {
    (time_ms - effective_start(timeline, element)) * element.speed()
}

/// Latest visible end over all elements, or 0 for an empty timeline.
pub fn timeline_end_ms(timeline: &Timeline) -> f64 {
    timeline
        .iter()
        .map(|(_, element)| visible_window(timeline, element).end_ms)
        .fold(0.0, f64::max)
}
