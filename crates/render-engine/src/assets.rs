//! Asset sources: decoded bitmaps, GIF frame sequences, video frames, fonts.
//!
//! The compositor never reads files. It asks an [`AssetSource`] and draws
//! whatever is ready; a miss starts a load and the element is skipped (or
//! drawn from the last cached frame) until the asset arrives.

use std::collections::HashMap;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::{Arc, Mutex};

use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, ImageFormat, RgbaImage};

use crate::draw::{Bitmap, FontData};

/// Frame delay assumed for GIFs that declare none.
const DEFAULT_GIF_DELAY_MS: f64 = 100.0;

/// Streamed video readers restart instead of decoding this far ahead.
const MAX_FORWARD_DECODE_MS: f64 = 2000.0;

/// Result of an asset lookup.
#[derive(Debug, Clone)]
pub enum AssetLookup<T> {
    Ready(T),
    /// A load is in flight; try again on a later frame.
    Pending,
    /// Nothing is known about this asset.
    Missing,
    /// Loading failed; the element stays invisible.
    Failed,
}

impl<T> AssetLookup<T> {
    pub fn ready(self) -> Option<T> {
        match self {
            AssetLookup::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, AssetLookup::Pending)
    }
}

/// Pre-decoded GIF animation.
#[derive(Debug, Clone)]
pub struct GifFrames {
    pub frames: Vec<Bitmap>,
    /// Delay of the first frame, applied to every frame.
    pub delay_ms: f64,
}

impl GifFrames {
    pub fn new(frames: Vec<Bitmap>, delay_ms: f64) -> Self {
        let delay_ms = if delay_ms > 0.0 {
            delay_ms
        } else {
            DEFAULT_GIF_DELAY_MS
        };
        Self { frames, delay_ms }
    }

    /// Index of the frame shown `elapsed_ms` after the element starts.
    pub fn index_at(&self, elapsed_ms: f64) -> Option<usize> {
        if self.frames.is_empty() {
            return None;
        }
        let step = (elapsed_ms / self.delay_ms).floor() as i64;
        Some(step.rem_euclid(self.frames.len() as i64) as usize)
    }

    pub fn frame_at(&self, elapsed_ms: f64) -> Option<&Bitmap> {
        self.index_at(elapsed_ms).map(|i| &self.frames[i])
    }
}

/// Provider of decoded media for the compositor.
///
/// Lookups never block a preview pass: implementations return
/// [`AssetLookup::Pending`] and load in the background. Headless exporters
/// may choose to resolve synchronously.
pub trait AssetSource: Send + Sync {
    fn image(&self, path: &str) -> AssetLookup<Bitmap>;

    fn gif(&self, path: &str) -> AssetLookup<Arc<GifFrames>>;

    /// Frame of the video at `path` shown at `source_time_ms` into the media.
    fn video_frame(&self, path: &str, source_time_ms: f64) -> AssetLookup<Bitmap>;

    /// Most recently decoded frame, used while the decoder catches up.
    fn last_video_frame(&self, path: &str) -> Option<Bitmap>;

    /// Whether the media backing `path` is paused.
    fn video_paused(&self, path: &str) -> bool;

    /// Resume playback of `path` from `source_time_ms`.
    fn resume_video(&self, path: &str, source_time_ms: f64);

    /// Font for a text element's `fontpath` (`"default"` allowed).
    fn font(&self, fontpath: &str) -> Option<Arc<FontData>>;
}

/// In-memory asset table, filled by the embedder.
#[derive(Debug, Default)]
pub struct MemoryAssets {
    images: HashMap<String, Bitmap>,
    gifs: HashMap<String, Arc<GifFrames>>,
    videos: HashMap<String, Bitmap>,
    pending: Vec<String>,
    fonts: HashMap<String, Arc<FontData>>,
    playing: Mutex<HashMap<String, f64>>,
}

impl MemoryAssets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_image(&mut self, path: impl Into<String>, bitmap: RgbaImage) {
        self.images.insert(path.into(), Arc::new(bitmap));
    }

    pub fn insert_gif(&mut self, path: impl Into<String>, frames: GifFrames) {
        self.gifs.insert(path.into(), Arc::new(frames));
    }

    /// Register a still used for every time of the video.
    pub fn insert_video_frame(&mut self, path: impl Into<String>, bitmap: RgbaImage) {
        self.videos.insert(path.into(), Arc::new(bitmap));
    }

    /// Report `path` as still loading.
    pub fn mark_pending(&mut self, path: impl Into<String>) {
        self.pending.push(path.into());
    }

    pub fn insert_font(&mut self, fontpath: impl Into<String>, font: FontData) {
        self.fonts.insert(fontpath.into(), Arc::new(font));
    }

    /// Source time passed to the last `resume_video` for `path`.
    pub fn resumed_at(&self, path: &str) -> Option<f64> {
        self.playing
            .lock()
            .ok()
            .and_then(|playing| playing.get(path).copied())
    }

    fn lookup<T: Clone>(&self, table: &HashMap<String, T>, path: &str) -> AssetLookup<T> {
        if let Some(value) = table.get(path) {
            AssetLookup::Ready(value.clone())
        } else if self.pending.iter().any(|p| p == path) {
            AssetLookup::Pending
        } else {
            AssetLookup::Missing
        }
    }
}

impl AssetSource for MemoryAssets {
    fn image(&self, path: &str) -> AssetLookup<Bitmap> {
        self.lookup(&self.images, path)
    }

    fn gif(&self, path: &str) -> AssetLookup<Arc<GifFrames>> {
        self.lookup(&self.gifs, path)
    }

    fn video_frame(&self, path: &str, _source_time_ms: f64) -> AssetLookup<Bitmap> {
        self.lookup(&self.videos, path)
    }

    fn last_video_frame(&self, path: &str) -> Option<Bitmap> {
        self.videos.get(path).cloned()
    }

    fn video_paused(&self, path: &str) -> bool {
        self.playing
            .lock()
            .map(|playing| !playing.contains_key(path))
            .unwrap_or(true)
    }

    fn resume_video(&self, path: &str, source_time_ms: f64) {
        if let Ok(mut playing) = self.playing.lock() {
            playing.insert(path.to_string(), source_time_ms);
        }
    }

    fn font(&self, fontpath: &str) -> Option<Arc<FontData>> {
        self.fonts.get(fontpath).cloned()
    }
}

/// How [`DiskAssets`] resolves a cache miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Decode on a worker thread and report `Pending` meanwhile (preview).
    Background,
    /// Decode inline before returning (headless export).
    Blocking,
}

#[derive(Debug, Clone)]
enum Slot<T> {
    Loading,
    Ready(T),
    Failed,
}

impl<T: Clone> Slot<T> {
    fn lookup(&self) -> AssetLookup<T> {
        match self {
            Slot::Loading => AssetLookup::Pending,
            Slot::Ready(value) => AssetLookup::Ready(value.clone()),
            Slot::Failed => AssetLookup::Failed,
        }
    }
}

type SlotMap<T> = Arc<Mutex<HashMap<String, Slot<T>>>>;

#[derive(Default)]
struct VideoState {
    paused: bool,
    /// Source time and bitmap of the latest decoded frame.
    current: Option<(f64, Bitmap)>,
    decoding: bool,
    reader: Option<VideoFrameReader>,
    failed: bool,
}

/// Assets decoded from the filesystem and cached by path.
pub struct DiskAssets {
    root: PathBuf,
    mode: LoadMode,
    encoder_binary: String,
    probe_binary: String,
    fps: u32,
    default_font: Option<PathBuf>,
    /// First video decode failure in blocking mode.
    video_error: Mutex<Option<String>>,
    images: SlotMap<Bitmap>,
    gifs: SlotMap<Arc<GifFrames>>,
    fonts: Mutex<HashMap<String, Option<Arc<FontData>>>>,
    videos: Arc<Mutex<HashMap<String, VideoState>>>,
}

impl DiskAssets {
    /// `root` resolves relative media paths (usually the project bundle).
    pub fn new(root: impl Into<PathBuf>, mode: LoadMode) -> Self {
        Self {
            root: root.into(),
            mode,
            encoder_binary: "ffmpeg".to_string(),
            probe_binary: "ffprobe".to_string(),
            fps: 60,
            default_font: None,
            video_error: Mutex::default(),
            images: Arc::default(),
            gifs: Arc::default(),
            fonts: Mutex::default(),
            videos: Arc::default(),
        }
    }

    /// Binary used to decode video frames. The dimension probe is looked up
    /// next to it.
    pub fn with_encoder_binary(mut self, binary: impl Into<String>) -> Self {
        self.encoder_binary = binary.into();
        self.probe_binary = probe_binary_for(&self.encoder_binary);
        self
    }

    pub fn with_probe_binary(mut self, binary: impl Into<String>) -> Self {
        self.probe_binary = binary.into();
        self
    }

    /// The first video that could not be decoded synchronously, if any.
    pub fn video_error(&self) -> Option<String> {
        self.video_error.lock().ok().and_then(|err| err.clone())
    }

    fn record_video_error(&self, message: String) {
        if let Ok(mut slot) = self.video_error.lock() {
            slot.get_or_insert(message);
        }
    }

    /// Rate at which blocking video readers decode frames.
    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps.max(1);
        self
    }

    pub fn with_default_font(mut self, path: Option<PathBuf>) -> Self {
        self.default_font = path;
        self
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let candidate = Path::new(path);
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.root.join(candidate)
        }
    }

    /// Pause every video, e.g. when playback stops.
    pub fn pause_all(&self) {
        if let Ok(mut videos) = self.videos.lock() {
            for state in videos.values_mut() {
                state.paused = true;
            }
        }
    }

    fn cached<T, F>(&self, map: &SlotMap<T>, path: &str, decode: F) -> AssetLookup<T>
    where
        T: Clone + Send + 'static,
        F: FnOnce(&Path) -> Result<T, String> + Send + 'static,
    {
        let Ok(mut slots) = map.lock() else {
            return AssetLookup::Failed;
        };
        if let Some(slot) = slots.get(path) {
            return slot.lookup();
        }

        let full_path = self.resolve(path);
        match self.mode {
            LoadMode::Blocking => {
                let slot = match decode(&full_path) {
                    Ok(value) => Slot::Ready(value),
                    Err(e) => {
                        tracing::warn!(path = %full_path.display(), error = %e, "Asset decode failed");
                        Slot::Failed
                    }
                };
                let lookup = slot.lookup();
                slots.insert(path.to_string(), slot);
                lookup
            }
            LoadMode::Background => {
                slots.insert(path.to_string(), Slot::Loading);
                let map = Arc::clone(map);
                let key = path.to_string();
                std::thread::spawn(move || {
                    let slot = match decode(&full_path) {
                        Ok(value) => Slot::Ready(value),
                        Err(e) => {
                            tracing::warn!(path = %full_path.display(), error = %e, "Asset decode failed");
                            Slot::Failed
                        }
                    };
                    if let Ok(mut slots) = map.lock() {
                        slots.insert(key, slot);
                    }
                });
                AssetLookup::Pending
            }
        }
    }

    fn blocking_video_frame(&self, state: &mut VideoState, path: &Path, time_ms: f64) -> AssetLookup<Bitmap> {
        let reader = state.reader.get_or_insert_with(|| {
            VideoFrameReader::new(
                path.to_path_buf(),
                self.encoder_binary.clone(),
                self.probe_binary.clone(),
                self.fps,
            )
        });
        match reader.frame_at(time_ms) {
            Ok(frame) => {
                state.current = Some((time_ms, Arc::clone(&frame)));
                AssetLookup::Ready(frame)
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Video frame decode failed");
                state.failed = true;
                self.record_video_error(format!("{}: {e}", path.display()));
                AssetLookup::Failed
            }
        }
    }

    fn background_video_frame(&self, key: &str, state: &mut VideoState, path: PathBuf, time_ms: f64) -> AssetLookup<Bitmap> {
        let frame_ms = 1000.0 / self.fps as f64;
        if let Some((at, frame)) = &state.current {
            if (at - time_ms).abs() < frame_ms {
                return AssetLookup::Ready(Arc::clone(frame));
            }
        }
        if !state.decoding {
            state.decoding = true;
            let videos = Arc::clone(&self.videos);
            let binary = self.encoder_binary.clone();
            let key = key.to_string();
            std::thread::spawn(move || {
                let result = grab_video_frame(&binary, &path, time_ms);
                let Ok(mut videos) = videos.lock() else {
                    return;
                };
                let state = videos.entry(key).or_default();
                state.decoding = false;
                match result {
                    Ok(frame) => state.current = Some((time_ms, frame)),
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "Video frame grab failed");
                        state.failed = true;
                    }
                }
            });
        }
        AssetLookup::Pending
    }
}

impl AssetSource for DiskAssets {
    fn image(&self, path: &str) -> AssetLookup<Bitmap> {
        self.cached(&self.images, path, decode_image)
    }

    fn gif(&self, path: &str) -> AssetLookup<Arc<GifFrames>> {
        self.cached(&self.gifs, path, |p| decode_gif(p).map(Arc::new))
    }

    fn video_frame(&self, path: &str, source_time_ms: f64) -> AssetLookup<Bitmap> {
        let full_path = self.resolve(path);
        let Ok(mut videos) = self.videos.lock() else {
            return AssetLookup::Failed;
        };
        let state = videos.entry(path.to_string()).or_insert_with(|| VideoState {
            paused: true,
            ..VideoState::default()
        });
        if state.failed {
            return AssetLookup::Failed;
        }
        match self.mode {
            LoadMode::Blocking => self.blocking_video_frame(state, &full_path, source_time_ms),
            LoadMode::Background => {
                self.background_video_frame(path, state, full_path, source_time_ms)
            }
        }
    }

    fn last_video_frame(&self, path: &str) -> Option<Bitmap> {
        let videos = self.videos.lock().ok()?;
        videos
            .get(path)
            .and_then(|state| state.current.as_ref())
            .map(|(_, frame)| Arc::clone(frame))
    }

    fn video_paused(&self, path: &str) -> bool {
        self.videos
            .lock()
            .map(|videos| videos.get(path).map(|s| s.paused).unwrap_or(true))
            .unwrap_or(true)
    }

    fn resume_video(&self, path: &str, source_time_ms: f64) {
        if let Ok(mut videos) = self.videos.lock() {
            let state = videos.entry(path.to_string()).or_default();
            state.paused = false;
            tracing::debug!(path, source_time_ms, "Resumed video playback");
        }
    }

    fn font(&self, fontpath: &str) -> Option<Arc<FontData>> {
        let mut fonts = self.fonts.lock().ok()?;
        if let Some(cached) = fonts.get(fontpath) {
            return cached.clone();
        }
        let file = if fontpath.is_empty() || fontpath == clipforge_project_model::DEFAULT_FONT {
            self.default_font.clone()
        } else {
            Some(self.resolve(fontpath))
        };
        let loaded = file.and_then(|file| match std::fs::read(&file) {
            Ok(bytes) => FontData::from_bytes(bytes).map(Arc::new).or_else(|| {
                tracing::warn!(path = %file.display(), "Font file is not a valid face");
                None
            }),
            Err(e) => {
                tracing::warn!(path = %file.display(), error = %e, "Failed to read font");
                None
            }
        });
        fonts.insert(fontpath.to_string(), loaded.clone());
        loaded
    }
}

fn decode_image(path: &Path) -> Result<Bitmap, String> {
    image::open(path)
        .map(|img| Arc::new(img.into_rgba8()))
        .map_err(|e| e.to_string())
}

fn decode_gif(path: &Path) -> Result<GifFrames, String> {
    let file = std::fs::File::open(path).map_err(|e| e.to_string())?;
    let decoder = GifDecoder::new(BufReader::new(file)).map_err(|e| e.to_string())?;
    let frames = decoder
        .into_frames()
        .collect_frames()
        .map_err(|e| e.to_string())?;
    let delay_ms = frames
        .first()
        .map(|frame| {
            let (num, den) = frame.delay().numer_denom_ms();
            if den == 0 {
                0.0
            } else {
                num as f64 / den as f64
            }
        })
        .unwrap_or(0.0);
    let bitmaps = frames
        .into_iter()
        .map(|frame| Arc::new(frame.into_buffer()))
        .collect();
    Ok(GifFrames::new(bitmaps, delay_ms))
}

/// Decode a single frame with one encoder invocation.
fn grab_video_frame(binary: &str, path: &Path, time_ms: f64) -> Result<Bitmap, String> {
    let output = Command::new(binary)
        .args(["-v", "error", "-ss", &format!("{:.3}", time_ms.max(0.0) / 1000.0), "-i"])
        .arg(path)
        .args(["-frames:v", "1", "-f", "image2pipe", "-vcodec", "png", "pipe:1"])
        .stdin(Stdio::null())
        .output()
        .map_err(|e| format!("failed to start {binary}: {e}"))?;
    if !output.status.success() || output.stdout.is_empty() {
        return Err(format!(
            "{binary} could not extract a frame (status {}): {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }
    image::load_from_memory_with_format(&output.stdout, ImageFormat::Png)
        .map(|img| Arc::new(img.into_rgba8()))
        .map_err(|e| e.to_string())
}

/// Sequential raw-frame decoder for headless rendering.
///
/// Keeps one decoder process streaming RGBA frames at a fixed rate and
/// reads forward to the requested time; seeks backwards or far ahead
/// restart the process at the new position.
struct VideoFrameReader {
    path: PathBuf,
    binary: String,
    probe: String,
    fps: u32,
    size: Option<(u32, u32)>,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    stream_start_ms: f64,
    next_index: u64,
    current: Option<(u64, Bitmap)>,
}

impl VideoFrameReader {
    fn new(path: PathBuf, binary: String, probe: String, fps: u32) -> Self {
        Self {
            path,
            binary,
            probe,
            fps,
            size: None,
            child: None,
            stdout: None,
            stream_start_ms: 0.0,
            next_index: 0,
            current: None,
        }
    }

    fn frame_at(&mut self, time_ms: f64) -> Result<Bitmap, String> {
        let time_ms = time_ms.max(0.0);
        let ahead_ms = time_ms - self.stream_start_ms;
        let behind_current = self
            .current
            .as_ref()
            .map(|(index, _)| self.index_for(time_ms) < *index)
            .unwrap_or(false);
        if self.stdout.is_none() || ahead_ms < 0.0 || behind_current || self.frames_ahead(time_ms) as f64 * 1000.0 / self.fps as f64 > MAX_FORWARD_DECODE_MS {
            self.restart(time_ms)?;
        }

        let target = self.index_for(time_ms);
        while self.next_index <= target {
            match self.read_frame()? {
                Some(frame) => {
                    self.current = Some((self.next_index, frame));
                    self.next_index += 1;
                }
                // End of stream: keep showing the final frame.
                None => break,
            }
        }
        self.current
            .as_ref()
            .map(|(_, frame)| Arc::clone(frame))
            .ok_or_else(|| format!("no frames decoded from {}", self.path.display()))
    }

    fn index_for(&self, time_ms: f64) -> u64 {
        ((time_ms - self.stream_start_ms).max(0.0) * self.fps as f64 / 1000.0).floor() as u64
    }

    fn frames_ahead(&self, time_ms: f64) -> u64 {
        self.index_for(time_ms).saturating_sub(self.next_index)
    }

    fn restart(&mut self, time_ms: f64) -> Result<(), String> {
        self.stop();
        let (width, height) = match self.size {
            Some(size) => size,
            None => {
                let size = probe_video_dimensions(&self.probe, &self.path)?;
                self.size = Some(size);
                size
            }
        };
        let mut child = Command::new(&self.binary)
            .args(["-v", "error", "-ss", &format!("{:.3}", time_ms / 1000.0), "-i"])
            .arg(&self.path)
            .args([
                "-an",
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgba",
                "-s",
                &format!("{width}x{height}"),
                "-r",
                &self.fps.to_string(),
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| format!("failed to start {}: {e}", self.binary))?;
        self.stdout = child.stdout.take();
        self.child = Some(child);
        self.stream_start_ms = time_ms;
        self.next_index = 0;
        self.current = None;
        tracing::debug!(path = %self.path.display(), time_ms, "Started video frame stream");
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Option<Bitmap>, String> {
        let (width, height) = self.size.ok_or("video size unknown")?;
        let stdout = self.stdout.as_mut().ok_or("video stream not running")?;
        let mut buf = vec![0u8; width as usize * height as usize * 4];
        match stdout.read_exact(&mut buf) {
            Ok(()) => RgbaImage::from_raw(width, height, buf)
                .map(|img| Some(Arc::new(img)))
                .ok_or_else(|| "short video frame".to_string()),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e.to_string()),
        }
    }

    fn stop(&mut self) {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl Drop for VideoFrameReader {
    fn drop(&mut self) {
        self.stop();
    }
}

/// `ffprobe` from the directory holding `encoder_binary`; a bare encoder
/// name leaves the probe to `PATH` lookup.
pub fn probe_binary_for(encoder_binary: &str) -> String {
    let encoder = Path::new(encoder_binary);
    match encoder.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => {
            let name = match encoder.extension() {
                Some(ext) => format!("ffprobe.{}", ext.to_string_lossy()),
                None => "ffprobe".to_string(),
            };
            dir.join(name).display().to_string()
        }
        _ => "ffprobe".to_string(),
    }
}

/// Width and height of the first video stream.
pub fn probe_video_dimensions(probe: &str, path: &Path) -> Result<(u32, u32), String> {
    let output = Command::new(probe)
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height",
            "-of",
            "csv=p=0:s=x",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| format!("failed to start {probe}: {e}"))?;
    if !output.status.success() {
        return Err(format!(
            "{probe} could not read {} (status {}): {}",
            path.display(),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }

    let raw = String::from_utf8_lossy(&output.stdout);
    raw.lines()
        .next()
        .and_then(|line| line.trim().split_once('x'))
        .and_then(|(w, h)| Some((w.parse::<u32>().ok()?, h.parse::<u32>().ok()?)))
        .filter(|&(w, h)| w > 0 && h > 0)
        .ok_or_else(|| format!("{probe} reported no video stream in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(w: u32, h: u32, rgba: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(w, h, image::Rgba(rgba))
    }

    #[test]
    fn test_gif_index_wraps() {
        let frames: Vec<Bitmap> = (0..4).map(|_| Arc::new(solid(1, 1, [0; 4]))).collect();
        let gif = GifFrames::new(frames, 50.0);
        assert_eq!(gif.index_at(0.0), Some(0));
        assert_eq!(gif.index_at(49.9), Some(0));
        assert_eq!(gif.index_at(50.0), Some(1));
        assert_eq!(gif.index_at(199.0), Some(3));
        assert_eq!(gif.index_at(200.0), Some(0));
        assert_eq!(gif.index_at(1030.0), Some(0));
    }

    #[test]
    fn test_gif_without_delay_uses_default() {
        let gif = GifFrames::new(vec![Arc::new(solid(1, 1, [0; 4]))], 0.0);
        assert_eq!(gif.delay_ms, DEFAULT_GIF_DELAY_MS);
        assert!(GifFrames::new(vec![], 10.0).index_at(5.0).is_none());
    }

    #[test]
    fn test_memory_assets_lookup_states() {
        let mut assets = MemoryAssets::new();
        assets.insert_image("a.png", solid(2, 2, [255, 0, 0, 255]));
        assets.mark_pending("b.png");
        assert!(matches!(assets.image("a.png"), AssetLookup::Ready(_)));
        assert!(assets.image("b.png").is_pending());
        assert!(matches!(assets.image("c.png"), AssetLookup::Missing));
    }

    #[test]
    fn test_memory_assets_playback_state() {
        let assets = MemoryAssets::new();
        assert!(assets.video_paused("v.mp4"));
        assets.resume_video("v.mp4", 1500.0);
        assert!(!assets.video_paused("v.mp4"));
        assert_eq!(assets.resumed_at("v.mp4"), Some(1500.0));
    }

    #[test]
    fn test_disk_assets_blocking_image_decode() {
        let dir = std::env::temp_dir().join(format!("clipforge_assets_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        solid(3, 2, [0, 255, 0, 255])
            .save(dir.join("green.png"))
            .unwrap();

        let assets = DiskAssets::new(&dir, LoadMode::Blocking);
        let bitmap = assets.image("green.png").ready().unwrap();
        assert_eq!(bitmap.dimensions(), (3, 2));
        assert!(matches!(assets.image("absent.png"), AssetLookup::Failed));
        assert!(assets.font("default").is_none());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_probe_binary_sits_next_to_encoder() {
        assert_eq!(probe_binary_for("ffmpeg"), "ffprobe");
        assert_eq!(
            probe_binary_for("/opt/media tools/bin/ffmpeg"),
            "/opt/media tools/bin/ffprobe"
        );
        assert_eq!(probe_binary_for("tools/ffmpeg.exe"), "tools/ffprobe.exe");
    }

    #[test]
    fn test_unprobeable_video_is_recorded() {
        let dir = std::env::temp_dir().join(format!("clipforge_assets_probe_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let assets = DiskAssets::new(&dir, LoadMode::Blocking)
            .with_encoder_binary(dir.join("no-such-dir/ffmpeg").display().to_string());
        assert!(assets.video_error().is_none());
        assert!(matches!(assets.video_frame("clip.mp4", 0.0), AssetLookup::Failed));
        let err = assets.video_error().unwrap();
        assert!(err.contains("clip.mp4"), "{err}");
        assert!(err.contains("ffprobe"), "{err}");
        // Later lookups stay failed without replacing the first error.
        assert!(matches!(assets.video_frame("other.mp4", 0.0), AssetLookup::Failed));
        assert!(assets.video_error().unwrap().contains("clip.mp4"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_disk_assets_background_reports_pending_first() {
        let dir = std::env::temp_dir().join(format!("clipforge_assets_bg_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        solid(1, 1, [0, 0, 255, 255]).save(dir.join("blue.png")).unwrap();

        let assets = DiskAssets::new(&dir, LoadMode::Background);
        assert!(assets.image("blue.png").is_pending());
        let mut ready = false;
        for _ in 0..200 {
            if assets.image("blue.png").ready().is_some() {
                ready = true;
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        assert!(ready);

        std::fs::remove_dir_all(&dir).ok();
    }
}
