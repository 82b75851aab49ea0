//! ClipForge Resolver
//!
//! Answers two questions for any element at any timeline time:
//! - **Visibility:** is the element inside its half-open visible window?
//! - **Transform:** where is it, how is it rotated/scaled, how opaque?
//!
//! Both the preview compositor and the export pipeline consume these
//! results, so they stay numerically identical.
//!
//! This crate is pure computation: no I/O, no platform dependencies.

pub mod transform;
pub mod visibility;

pub use transform::{
    resolve_transform, resolve_transform_at, resolve_transform_in, transform_steps, Affine, Rect,
    ResolvedTransform, TransformStep,
};
pub use visibility::{
    effective_start, is_visible_at_time, source_time_ms, timeline_end_ms, visible_window,
    VisibleWindow,
};
