//! ClipForge Project Model
//!
//! Defines the core data contracts for ClipForge projects:
//! - **Curves:** Cubic-Bezier keyframe lists and their evaluation
//! - **Animation:** Per-property tracks (position, rotation, scale, opacity)
//! - **Elements:** Timed video/image/gif/audio/text/shape items
//! - **Timeline:** The element map and its validated mutations
//! - **Project:** Bundle directory with render options and manifest
//!
//! All times are milliseconds. Keyframe times are relative to the start of
//! the element that owns them; element start times are absolute.

pub mod animation;
pub mod curve;
pub mod element;
pub mod project;
pub mod timeline;

pub use animation::*;
pub use curve::*;
pub use element::*;
pub use project::*;
pub use timeline::*;

use clipforge_common::error::ClipforgeError;

impl From<TimelineError> for ClipforgeError {
    fn from(err: TimelineError) -> Self {
        ClipforgeError::timeline(err.to_string())
    }
}

impl From<CurveError> for ClipforgeError {
    fn from(err: CurveError) -> Self {
        ClipforgeError::timeline(err.to_string())
    }
}

impl From<ProjectError> for ClipforgeError {
    fn from(err: ProjectError) -> Self {
        ClipforgeError::project(err.to_string())
    }
}
