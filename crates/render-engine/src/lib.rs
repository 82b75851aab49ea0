//! ClipForge Render Engine
//!
//! Turns a timeline into pixels: interactively, one preview frame at a time,
//! or offline, as an encoded video file.
//!
//! # Pipeline Architecture
//!
//! ```text
//! timeline ──┐
//!            ├── resolver (visibility, transforms)
//! assets ────┘         │
//!                      ├── compositor ──▶ DrawContext (RasterCanvas, recorder)
//!                      │        │
//!                      │        └── PNG frames ──┐
//!                      │                         ├── encoder ──▶ output.mp4
//!                      └── filter graph ─────────┘
//!                                  ▲
//! audio placement ─────────────────┘
//! ```

pub mod assets;
pub mod compositor;
pub mod draw;
pub mod export;
pub mod paint;
pub mod raster;

pub use assets::{AssetLookup, AssetSource, DiskAssets, LoadMode, MemoryAssets};
pub use compositor::{render_frame, render_to_canvas, FrameSettings, FrameStats, OutlineOptions};
pub use draw::{DrawContext, Rgba};
pub use export::{
    ExportCoordinator, ExportEvent, ExportHandle, ExportRequest, ExportSettings, ExportStrategy,
};
pub use raster::RasterCanvas;
