//! Export runs and their single-flight coordination.
//!
//! Every run owns an [`ExportSession`]: its request, the partial output path,
//! the cancel signal and the event sink. Nothing is shared between runs
//! except the coordinator's set of busy destinations.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use clipforge_common::clock::FrameClock;
use clipforge_common::error::{ClipforgeError, ClipforgeResult};
use clipforge_project_model::Timeline;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::encoder::{EncoderRun, FrameRenderer, ProgressFn};
use super::progress::{ExportProgress, ExportStage};
use super::{
    command_exists, partial_path, EncoderInput, EncoderPlan, EventSink, ExportEvent, ExportJob,
    ExportSettings, ExportStrategy,
};
use crate::assets::{DiskAssets, LoadMode};
use crate::compositor::{render_to_canvas, FrameSettings};

/// Everything needed to start one export.
#[derive(Debug, Clone)]
pub struct ExportRequest {
    /// Snapshot of the timeline; later edits do not affect the run.
    pub timeline: Timeline,
    pub settings: ExportSettings,
    pub strategy: ExportStrategy,
    pub destination: PathBuf,
    /// Base directory for relative media paths.
    pub project_root: PathBuf,
}

/// Allows at most one run per destination.
#[derive(Debug, Clone, Default)]
pub struct ExportCoordinator {
    active: Arc<Mutex<HashSet<PathBuf>>>,
}

/// Releases a destination when the run ends, however it ends.
#[derive(Debug)]
struct SlotGuard {
    active: Arc<Mutex<HashSet<PathBuf>>>,
    destination: PathBuf,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if let Ok(mut active) = self.active.lock() {
            active.remove(&self.destination);
        }
    }
}

/// Registry key for a destination: the canonical parent directory joined
/// with the file name, so `out.mp4` and `./out.mp4` collide.
fn destination_key(destination: &Path) -> PathBuf {
    let parent = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let parent = std::fs::canonicalize(&parent).unwrap_or_else(|_| {
        std::env::current_dir()
            .map(|cwd| cwd.join(&parent))
            .unwrap_or(parent)
    });
    match destination.file_name() {
        Some(name) => parent.join(name),
        None => parent,
    }
}

impl ExportCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self, destination: &Path) -> bool {
        let key = destination_key(destination);
        self.active
            .lock()
            .map(|active| active.contains(&key))
            .unwrap_or(false)
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().map(|active| active.len()).unwrap_or(0)
    }

    fn claim(&self, destination: &Path) -> ClipforgeResult<SlotGuard> {
        let mut active = self
            .active
            .lock()
            .map_err(|_| ClipforgeError::export("Export registry poisoned"))?;
        let key = destination_key(destination);
        if !active.insert(key.clone()) {
            return Err(ClipforgeError::ExportBusy {
                destination: destination.to_path_buf(),
            });
        }
        Ok(SlotGuard {
            active: Arc::clone(&self.active),
            destination: key,
        })
    }

    /// Start a run on the current tokio runtime.
    ///
    /// A destination that already has a run is rejected with
    /// [`ClipforgeError::ExportBusy`]; the running export is untouched.
    pub fn start(&self, request: ExportRequest, sink: EventSink) -> ClipforgeResult<ExportHandle> {
        let slot = self.claim(&request.destination)?;
        let id = Uuid::new_v4();
        let destination = request.destination.clone();
        let (cancel, cancel_rx) = watch::channel(false);

        let partial = partial_path(&request.destination);
        let session = ExportSession {
            id,
            partial: partial.clone(),
            request,
            sink: Arc::clone(&sink),
            cancel: cancel_rx,
        };
        let task = tokio::spawn(async move {
            let run = tokio::spawn(session.run());
            let result = supervise(id, run, &partial, &sink).await;
            drop(slot);
            result
        });

        Ok(ExportHandle {
            id,
            destination,
            cancel: CancelHandle(Arc::new(cancel)),
            task,
        })
    }
}

/// Await a run; a run that panicked still ends with one `Error` event.
async fn supervise(
    id: Uuid,
    run: JoinHandle<ClipforgeResult<PathBuf>>,
    partial: &Path,
    sink: &EventSink,
) -> ClipforgeResult<PathBuf> {
    match run.await {
        Ok(result) => result,
        Err(e) => {
            let err = ClipforgeError::export(format!("Export task failed: {e}"));
            tracing::error!(id = %id, error = %err, "Export task aborted");
            remove_partial(partial).await;
            sink(ExportEvent::Error(err.to_string()));
            Err(err)
        }
    }
}

async fn remove_partial(partial: &Path) {
    match tokio::fs::remove_file(partial).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(path = %partial.display(), error = %e, "Failed to remove partial output");
        }
    }
}

/// Cancels one run; usable after the handle was consumed by `wait`.
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<watch::Sender<bool>>);

impl CancelHandle {
    /// Kill the encoder and discard the partial output.
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

/// A running export.
#[derive(Debug)]
pub struct ExportHandle {
    pub id: Uuid,
    pub destination: PathBuf,
    cancel: CancelHandle,
    task: JoinHandle<ClipforgeResult<PathBuf>>,
}

impl ExportHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Wait for the run to end; returns the finished file.
    pub async fn wait(self) -> ClipforgeResult<PathBuf> {
        self.task
            .await
            .map_err(|e| ClipforgeError::export(format!("Export task failed: {e}")))?
    }
}

/// State of one export run.
pub struct ExportSession {
    id: Uuid,
    request: ExportRequest,
    partial: PathBuf,
    sink: EventSink,
    cancel: watch::Receiver<bool>,
}

impl ExportSession {
    fn emit(&self, event: ExportEvent) {
        (self.sink)(event);
    }

    async fn run(self) -> ClipforgeResult<PathBuf> {
        let started = Instant::now();
        tracing::info!(
            id = %self.id,
            destination = %self.request.destination.display(),
            strategy = %self.request.strategy,
            "Starting export"
        );

        let mut temp_files = Vec::new();
        let result = self.encode(&mut temp_files).await;

        for path in &temp_files {
            if let Err(e) = tokio::fs::remove_file(path).await {
                tracing::debug!(path = %path.display(), error = %e, "Temp file already gone");
            }
        }

        match result {
            Ok(()) => {
                self.emit(ExportEvent::Progress(ExportProgress::stage(
                    ExportStage::Finalizing,
                    0,
                )));
                if let Err(e) = tokio::fs::rename(&self.partial, &self.request.destination).await {
                    let err = ClipforgeError::export(format!(
                        "Failed to move {} into place: {e}",
                        self.partial.display()
                    ));
                    self.fail(&err).await;
                    return Err(err);
                }
                tracing::info!(
                    id = %self.id,
                    elapsed_secs = started.elapsed().as_secs_f64(),
                    "Export complete"
                );
                self.emit(ExportEvent::Progress(ExportProgress::stage(
                    ExportStage::Complete,
                    0,
                )));
                self.emit(ExportEvent::Finish(self.request.destination.clone()));
                Ok(self.request.destination.clone())
            }
            Err(err) => {
                self.fail(&err).await;
                Err(err)
            }
        }
    }

    async fn fail(&self, err: &ClipforgeError) {
        remove_partial(&self.partial).await;
        match err {
            ClipforgeError::Cancelled => tracing::info!(id = %self.id, "Export cancelled"),
            other => tracing::error!(id = %self.id, error = %other, "Export failed"),
        }
        self.emit(ExportEvent::Error(err.to_string()));
    }

    async fn encode(&self, temp_files: &mut Vec<PathBuf>) -> ClipforgeResult<()> {
        let request = &self.request;
        if let Some(parent) = request.destination.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        self.emit(ExportEvent::Progress(ExportProgress::stage(
            ExportStage::Preparing,
            0,
        )));

        let binary = request.settings.encoder_binary.clone();
        let found = tokio::task::spawn_blocking(move || command_exists(&binary))
            .await
            .map_err(|e| ClipforgeError::export(format!("Encoder lookup failed: {e}")))?;
        if !found {
            return Err(ClipforgeError::unsupported(format!(
                "encoder '{}' not found",
                request.settings.encoder_binary
            )));
        }

        let plan = self.plan()?;
        tracing::debug!(report = %plan.debug_report, "Export plan");
        for asset in &plan.temp_files {
            tokio::fs::write(&asset.path, &asset.bytes).await?;
            temp_files.push(asset.path.clone());
        }

        let renderer = match plan.input {
            EncoderInput::Frames { .. } => Some(self.frame_renderer()),
            EncoderInput::None => None,
        };
        let sink = Arc::clone(&self.sink);
        let progress: ProgressFn = Arc::new(move |report| sink(ExportEvent::Progress(report)));

        EncoderRun {
            binary: request.settings.encoder_binary.clone(),
            args: plan.args,
            input: plan.input,
            watchdog: request.settings.watchdog,
            queue_depth: request.settings.frame_queue_depth,
            duration_ms: request.settings.duration_ms,
        }
        .run(renderer, self.cancel.clone(), progress)
        .await
    }

    fn plan(&self) -> ClipforgeResult<EncoderPlan> {
        let request = &self.request;
        let job = ExportJob {
            timeline: &request.timeline,
            settings: &request.settings,
            project_root: &request.project_root,
            output: &self.partial,
        };
        request.strategy.backend().build_plan(&job)
    }

    /// Headless compositor pass: one PNG per output frame.
    fn frame_renderer(&self) -> FrameRenderer {
        let settings = &self.request.settings;
        let timeline = self.request.timeline.clone();
        let clock = FrameClock::new(settings.fps);
        let assets = DiskAssets::new(&self.request.project_root, LoadMode::Blocking)
            .with_encoder_binary(settings.encoder_binary.clone())
            .with_fps(settings.fps)
            .with_default_font(settings.default_font.clone());
        let frame = FrameSettings {
            background: settings.background,
            width: settings.width,
            height: settings.height,
            playing: true,
        };
        Box::new(move |index| {
            let canvas = render_to_canvas(&timeline, clock.frame_to_ms(index), &assets, &frame);
            if let Some(err) = assets.video_error() {
                return Err(ClipforgeError::render(format!(
                    "Video unavailable at frame {index}: {err}"
                )));
            }
            canvas
                .encode_png()
                .map_err(|e| ClipforgeError::render(format!("Failed to encode frame {index}: {e}")))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draw::Rgba;
    use std::time::Duration;

    fn request(destination: PathBuf, encoder: &str) -> ExportRequest {
        ExportRequest {
            timeline: Timeline::new(),
            settings: ExportSettings {
                width: 64,
                height: 36,
                fps: 10,
                duration_ms: 500.0,
                video_bitrate_kbps: 1000,
                background: Rgba::BLACK,
                encoder_binary: encoder.to_string(),
                watchdog: Duration::from_secs(10),
                frame_queue_depth: 2,
                default_font: None,
            },
            strategy: ExportStrategy::Frames,
            destination,
            project_root: std::env::temp_dir(),
        }
    }

    fn recorder() -> (EventSink, Arc<Mutex<Vec<ExportEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        (Arc::new(move |e: ExportEvent| sink.lock().unwrap().push(e)), events)
    }

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("clipforge-session-{}", Uuid::new_v4()));
        dir.join(name)
    }

    #[test]
    fn test_slot_is_single_flight_and_released_on_drop() {
        let coordinator = ExportCoordinator::new();
        let dest = PathBuf::from("/out/a.mp4");
        let slot = coordinator.claim(&dest).unwrap();
        assert!(coordinator.is_busy(&dest));
        assert!(matches!(
            coordinator.claim(&dest),
            Err(ClipforgeError::ExportBusy { .. })
        ));
        assert!(coordinator.claim(Path::new("/out/b.mp4")).is_ok());
        drop(slot);
        assert!(!coordinator.is_busy(&dest));
        assert_eq!(coordinator.active_count(), 0);
    }

    #[tokio::test]
    async fn test_second_start_for_same_destination_is_rejected() {
        let coordinator = ExportCoordinator::new();
        let dest = scratch("busy.mp4");
        let (sink, _) = recorder();
        let _slot = coordinator.claim(&dest).unwrap();
        let err = coordinator
            .start(request(dest.clone(), "definitely-not-an-encoder"), sink)
            .unwrap_err();
        assert!(matches!(err, ClipforgeError::ExportBusy { .. }));
        assert_eq!(coordinator.active_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_encoder_reports_one_error_and_frees_slot() {
        let coordinator = ExportCoordinator::new();
        let dest = scratch("missing.mp4");
        let (sink, events) = recorder();
        let handle = coordinator
            .start(request(dest.clone(), "definitely-not-an-encoder"), sink)
            .unwrap();
        let err = handle.wait().await.unwrap_err();
        assert!(matches!(err, ClipforgeError::Unsupported { .. }));

        let events = events.lock().unwrap();
        let errors = events
            .iter()
            .filter(|e| matches!(e, ExportEvent::Error(_)))
            .count();
        assert_eq!(errors, 1);
        assert!(!events.iter().any(|e| matches!(e, ExportEvent::Finish(_))));
        assert!(!coordinator.is_busy(&dest));
        assert!(!partial_path(&dest).exists());
        std::fs::remove_dir_all(dest.parent().unwrap()).ok();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_encoder_leaves_no_partial_file() {
        let dir = std::env::temp_dir().join(format!("clipforge-session-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        // Stands in for an encoder that writes some output, then fails.
        let fake = dir.join("fake-encoder.sh");
        std::fs::write(
            &fake,
            "#!/bin/sh\nfor last; do :; done\ncat > \"$last\"\necho 'Conversion failed' >&2\nexit 1\n",
        )
        .unwrap();
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let coordinator = ExportCoordinator::new();
        let dest = dir.join("out.mp4");
        let (sink, events) = recorder();
        let handle = coordinator
            .start(request(dest.clone(), &fake.display().to_string()), sink)
            .unwrap();
        let err = handle.wait().await.unwrap_err();
        assert!(err.to_string().contains("Conversion failed"));
        assert!(!partial_path(&dest).exists());
        assert!(!dest.exists());
        let events = events.lock().unwrap();
        assert!(matches!(events.last(), Some(ExportEvent::Error(_))));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_run_renames_partial_and_finishes() {
        let dir = std::env::temp_dir().join(format!("clipforge-session-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let fake = dir.join("fake-encoder.sh");
        std::fs::write(&fake, "#!/bin/sh\nfor last; do :; done\ncat > \"$last\"\n").unwrap();
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let coordinator = ExportCoordinator::new();
        let dest = dir.join("out.mp4");
        let (sink, events) = recorder();
        let handle = coordinator
            .start(request(dest.clone(), &fake.display().to_string()), sink)
            .unwrap();
        assert_eq!(handle.wait().await.unwrap(), dest);

        // Five black frames at 10 fps, each a complete PNG.
        let bytes = std::fs::read(&dest).unwrap();
        assert_eq!(bytes.windows(4).filter(|w| w == b"IEND").count(), 5);
        assert!(!partial_path(&dest).exists());
        let events = events.lock().unwrap();
        assert!(matches!(events.last(), Some(ExportEvent::Finish(path)) if *path == dest));
        assert!(!events.iter().any(|e| matches!(e, ExportEvent::Error(_))));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[cfg(unix)]
    fn copy_encoder(dir: &Path) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        std::fs::create_dir_all(dir).unwrap();
        let fake = dir.join("ffmpeg");
        std::fs::write(&fake, "#!/bin/sh\nfor last; do :; done\ncat > \"$last\"\n").unwrap();
        std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();
        fake
    }

    #[test]
    fn test_destination_aliases_share_a_slot() {
        let coordinator = ExportCoordinator::new();
        let dir = std::env::temp_dir().join(format!("clipforge-session-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();

        let _slot = coordinator.claim(&dir.join("out.mp4")).unwrap();
        assert!(coordinator.is_busy(&dir.join(".").join("out.mp4")));

        let name = format!("clipforge-relative-{}.mp4", Uuid::new_v4());
        let _relative = coordinator.claim(Path::new(&name)).unwrap();
        assert!(matches!(
            coordinator.claim(&Path::new(".").join(&name)),
            Err(ClipforgeError::ExportBusy { .. })
        ));
        assert_eq!(coordinator.active_count(), 2);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_encoder_in_directory_with_spaces() {
        let dir = std::env::temp_dir().join(format!("clipforge session {}", Uuid::new_v4()));
        let fake = copy_encoder(&dir.join("encoder bin"));

        let coordinator = ExportCoordinator::new();
        let dest = dir.join("out.mp4");
        let (sink, _) = recorder();
        let handle = coordinator
            .start(request(dest.clone(), &fake.display().to_string()), sink)
            .unwrap();
        assert_eq!(handle.wait().await.unwrap(), dest);
        assert!(dest.exists());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_panicked_run_reports_one_error() {
        let dir = std::env::temp_dir().join(format!("clipforge-session-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let partial = dir.join("out.partial.mp4");
        std::fs::write(&partial, b"half").unwrap();

        let (sink, events) = recorder();
        let run: JoinHandle<ClipforgeResult<PathBuf>> =
            tokio::spawn(async { panic!("compositor bug") });
        let err = supervise(Uuid::new_v4(), run, &partial, &sink)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Export task failed"));
        assert!(!partial.exists());

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], ExportEvent::Error(msg) if msg.contains("Export task failed")));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unreadable_video_fails_the_export() {
        use clipforge_project_model::{Element, ElementKind, TrimWindow, VideoElement};

        let dir = std::env::temp_dir().join(format!("clipforge-session-{}", Uuid::new_v4()));
        // No ffprobe is installed beside this encoder.
        let fake = copy_encoder(&dir.join("bin"));
        let mut req = request(dir.join("out.mp4"), &fake.display().to_string());
        req.project_root = dir.clone();
        req.timeline
            .insert_with_id(
                "clip",
                Element::new(
                    ElementKind::Video(VideoElement {
                        localpath: "clip.mp4".to_string(),
                        trim: TrimWindow::new(0.0, 500.0),
                        speed: 1.0,
                        is_exist_audio: false,
                        codec: Default::default(),
                    }),
                    0.0,
                    500.0,
                )
                .with_size(32.0, 18.0),
            )
            .unwrap();

        let coordinator = ExportCoordinator::new();
        let (sink, events) = recorder();
        let dest = req.destination.clone();
        let err = coordinator.start(req, sink).unwrap().wait().await.unwrap_err();
        assert!(err.to_string().contains("clip.mp4"), "{err}");
        assert!(!dest.exists());
        assert!(!partial_path(&dest).exists());

        let events = events.lock().unwrap();
        let errors: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                ExportEvent::Error(msg) => Some(msg.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("Video unavailable"), "{}", errors[0]);
        std::fs::remove_dir_all(&dir).ok();
    }
}
