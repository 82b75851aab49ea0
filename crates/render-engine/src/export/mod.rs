//! Export pipeline: turns a timeline into an encoded video file.
//!
//! Two backends share audio placement and visibility windows:
//! - [`FrameStreamBackend`] renders every frame with the compositor and
//!   pipes PNGs to the encoder. It reproduces animation exactly.
//! - [`FilterGraphBackend`] describes the whole edit as one encoder filter
//!   graph and lets the encoder do the compositing. Placement is literal,
//!   resolved at each element's first visible instant.
//!
//! Runs are driven by an [`ExportCoordinator`], which allows one run per
//! destination and reports through an [`EventSink`].

pub mod audio;
pub mod declarative;
pub mod encoder;
pub mod filter_graph;
pub mod frame_stream;
pub mod progress;
pub mod session;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use clipforge_common::config::ExportDefaults;
use clipforge_common::error::ClipforgeResult;
use clipforge_project_model::{RenderOptions, Timeline};
use serde::Serialize;

use crate::draw::Rgba;

pub use audio::{place_audio, plan_audio, AudioPlacement};
pub use declarative::FilterGraphBackend;
pub use filter_graph::{Filter, FilterChain, FilterGraph};
pub use frame_stream::FrameStreamBackend;
pub use progress::{ExportProgress, ExportStage, ProgressEstimator};
pub use session::{CancelHandle, ExportCoordinator, ExportHandle, ExportRequest};

/// How the encoder receives the picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportStrategy {
    /// Composite frames in-process and stream them as PNG.
    #[default]
    Frames,
    /// Describe the composition as an encoder filter graph.
    Graph,
}

impl ExportStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            ExportStrategy::Frames => "frames",
            ExportStrategy::Graph => "graph",
        }
    }

    pub fn backend(self) -> Box<dyn ExportBackend> {
        match self {
            ExportStrategy::Frames => Box::new(FrameStreamBackend),
            ExportStrategy::Graph => Box::new(FilterGraphBackend),
        }
    }
}

impl fmt::Display for ExportStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "frames" | "frame-stream" | "a" => Ok(ExportStrategy::Frames),
            "graph" | "filter-graph" | "b" => Ok(ExportStrategy::Graph),
            other => Err(format!("unknown export strategy: {other}")),
        }
    }
}

/// Output and encoder settings for one run.
#[derive(Debug, Clone)]
pub struct ExportSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Output length in milliseconds.
    pub duration_ms: f64,
    pub video_bitrate_kbps: u32,
    pub background: Rgba,
    pub encoder_binary: String,
    /// Kill the encoder after this long without output or frame writes.
    pub watchdog: Duration,
    pub frame_queue_depth: usize,
    /// Font used for text elements with the `default` font path.
    pub default_font: Option<PathBuf>,
}

impl ExportSettings {
    /// Combine a project's render options with the user's export defaults.
    pub fn from_project(options: &RenderOptions, defaults: &ExportDefaults) -> Self {
        let fps = if options.fps > 0 { options.fps } else { defaults.fps };
        let bitrate = if options.video_bitrate > 0 {
            options.video_bitrate
        } else {
            defaults.video_bitrate_kbps
        };
        Self {
            width: options.preview_size.w.max(2),
            height: options.preview_size.h.max(2),
            fps: fps.max(1),
            duration_ms: options.duration_ms(),
            video_bitrate_kbps: bitrate,
            background: Rgba::parse_or(&options.background_color, Rgba::BLACK),
            encoder_binary: defaults.encoder_binary.clone(),
            watchdog: Duration::from_secs(defaults.watchdog_secs.max(1)),
            frame_queue_depth: defaults.frame_queue_depth.max(1),
            default_font: defaults.default_font.clone(),
        }
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration_ms / 1000.0
    }
}

/// Everything a backend needs to plan one encoder invocation.
#[derive(Debug, Clone, Copy)]
pub struct ExportJob<'a> {
    pub timeline: &'a Timeline,
    pub settings: &'a ExportSettings,
    /// Base directory for relative media paths.
    pub project_root: &'a Path,
    /// File the encoder writes (the partial path during a run).
    pub output: &'a Path,
}

impl ExportJob<'_> {
    pub fn media_path(&self, localpath: &str) -> PathBuf {
        resolve_media(self.project_root, localpath)
    }
}

/// What feeds the encoder's stdin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderInput {
    /// PNG frames written by the compositor.
    Frames { total_frames: u64 },
    /// Nothing; stdin is closed.
    None,
}

/// A file the encoder reads that has to exist before it starts.
#[derive(Debug, Clone)]
pub struct TempAsset {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
}

/// A fully planned encoder invocation.
#[derive(Debug, Clone)]
pub struct EncoderPlan {
    pub args: Vec<String>,
    pub graph: FilterGraph,
    pub input: EncoderInput,
    pub audio: Vec<AudioPlacement>,
    pub temp_files: Vec<TempAsset>,
    pub debug_report: String,
}

/// One way of producing the encoder invocation.
pub trait ExportBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn build_plan(&self, job: &ExportJob<'_>) -> ClipforgeResult<EncoderPlan>;
}

/// Lifecycle notifications of one export run.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportEvent {
    Progress(ExportProgress),
    Finish(PathBuf),
    Error(String),
}

/// Receiver of export events. Called from the export task.
pub type EventSink = Arc<dyn Fn(ExportEvent) + Send + Sync>;

/// Video and audio codec arguments shared by both backends.
pub fn codec_args(settings: &ExportSettings) -> Vec<String> {
    vec![
        "-c:a".to_string(),
        "aac".to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-t".to_string(),
        filter_graph::fmt_num(settings.duration_secs()),
        "-b:v".to_string(),
        format!("{}k", settings.video_bitrate_kbps.max(1)),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
    ]
}

/// `<stem>.partial.<ext>` next to the destination.
pub fn partial_path(destination: &Path) -> PathBuf {
    let stem = destination
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "export".to_string());
    let name = match destination.extension() {
        Some(ext) => format!("{stem}.partial.{}", ext.to_string_lossy()),
        None => format!("{stem}.partial"),
    };
    destination.with_file_name(name)
}

pub fn resolve_media(root: &Path, localpath: &str) -> PathBuf {
    let path = Path::new(localpath);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Locate an executable. A value with a directory part names the file
/// itself; a bare name is searched for on `PATH`.
pub fn find_executable(binary: &str) -> Option<PathBuf> {
    if binary.is_empty() {
        return None;
    }
    let candidate = Path::new(binary);
    if candidate.is_absolute() || candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }
    let search = std::env::var_os("PATH")?;
    std::env::split_paths(&search)
        .flat_map(|dir| executable_names(binary).map(move |name| dir.join(name)))
        .find(|path| is_executable(path))
}

pub fn command_exists(binary: &str) -> bool {
    find_executable(binary).is_some()
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(windows)]
fn executable_names(binary: &str) -> impl Iterator<Item = String> {
    [binary.to_string(), format!("{binary}.exe")].into_iter()
}

#[cfg(not(windows))]
fn executable_names(binary: &str) -> impl Iterator<Item = String> {
    std::iter::once(binary.to_string())
}
