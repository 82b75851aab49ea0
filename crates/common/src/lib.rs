//! ClipForge Common Utilities
//!
//! Shared infrastructure for all ClipForge crates:
//! - Error types and result aliases
//! - Frame clock and playback tick gating
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
