//! Encoder process supervision.
//!
//! The encoder runs as a child process. Its stderr is drained continuously
//! and every chunk counts as activity; so does every frame written to its
//! stdin. A watchdog kills the child once nothing happened for the
//! configured period, and a cancel signal kills it immediately.

use std::collections::VecDeque;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clipforge_common::error::{ClipforgeError, ClipforgeResult};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, ChildStdin, Command};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::progress::{frame_progress, ExportProgress, ProgressEstimator, ESTIMATE_TICK};
use super::EncoderInput;

/// Encoder output lines kept for error messages.
pub const STDERR_TAIL_LINES: usize = 20;

/// How long to wait for stderr to close after the encoder exits.
const STDERR_GRACE: Duration = Duration::from_secs(2);

/// Produces the PNG bytes of frame `index`. Runs on a blocking thread.
pub type FrameRenderer = Box<dyn FnMut(u64) -> ClipforgeResult<Vec<u8>> + Send>;

/// Receiver of progress reports while the encoder runs.
pub type ProgressFn = Arc<dyn Fn(ExportProgress) + Send + Sync>;

/// Time of the last observed encoder activity.
#[derive(Debug)]
pub struct ActivityClock {
    base: Instant,
    last_ms: AtomicU64,
}

impl ActivityClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            last_ms: AtomicU64::new(0),
        }
    }

    pub fn touch(&self) {
        let now = self.base.elapsed().as_millis() as u64;
        self.last_ms.fetch_max(now, Ordering::Relaxed);
    }

    /// Time since the last touch (or creation).
    pub fn idle(&self) -> Duration {
        let now = self.base.elapsed().as_millis() as u64;
        Duration::from_millis(now.saturating_sub(self.last_ms.load(Ordering::Relaxed)))
    }
}

impl Default for ActivityClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Bounded tail of the encoder's diagnostic output.
#[derive(Debug, Default)]
pub struct OutputTail {
    lines: VecDeque<String>,
    pending: String,
}

impl OutputTail {
    /// Feed raw output. Progress lines end in `\r`, log lines in `\n`.
    pub fn push_chunk(&mut self, chunk: &str) {
        self.pending.push_str(chunk);
        while let Some(pos) = self.pending.find(['\r', '\n']) {
            let line: String = self.pending.drain(..=pos).collect();
            self.push_line(line.trim_end_matches(['\r', '\n']));
        }
    }

    fn push_line(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        tracing::debug!(target: "clipforge::encoder", "{line}");
        if self.lines.len() == STDERR_TAIL_LINES {
            self.lines.pop_front();
        }
        self.lines.push_back(line.to_string());
    }

    pub fn finish(mut self) -> Vec<String> {
        let rest = std::mem::take(&mut self.pending);
        self.push_line(&rest);
        self.lines.into_iter().collect()
    }
}

/// One encoder invocation.
#[derive(Debug, Clone)]
pub struct EncoderRun {
    pub binary: String,
    pub args: Vec<String>,
    pub input: EncoderInput,
    pub watchdog: Duration,
    pub queue_depth: usize,
    /// Output length, used for time-based progress estimates.
    pub duration_ms: f64,
}

enum Outcome {
    Exited(ExitStatus),
    Cancelled,
    Stalled,
}

impl EncoderRun {
    /// Run the encoder to completion.
    ///
    /// `renderer` is required when the input is [`EncoderInput::Frames`].
    pub async fn run(
        self,
        renderer: Option<FrameRenderer>,
        mut cancel: watch::Receiver<bool>,
        progress: ProgressFn,
    ) -> ClipforgeResult<()> {
        let frames = match (self.input, renderer) {
            (EncoderInput::Frames { total_frames }, Some(renderer)) => {
                Some((total_frames, renderer))
            }
            (EncoderInput::Frames { .. }, None) => {
                return Err(ClipforgeError::export(
                    "Frame input planned without a frame renderer",
                ))
            }
            (EncoderInput::None, _) => None,
        };

        tracing::debug!(binary = %self.binary, args = ?self.args, "Running encoder");
        let mut command = Command::new(&self.binary);
        command
            .args(&self.args)
            .stdin(if frames.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let mut child = command.spawn().map_err(|e| {
            ClipforgeError::encoder(format!("Failed to start {}: {e}", self.binary))
        })?;
        tracing::info!(pid = child.id(), args_len = self.args.len(), "Encoder started");

        let activity = Arc::new(ActivityClock::new());
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ClipforgeError::encoder("Failed to capture encoder stderr"))?;
        let stderr_task = tokio::spawn(drain_stderr(stderr, Arc::clone(&activity)));

        let stop = Arc::new(AtomicBool::new(false));
        let mut feed = None;
        let mut estimator_task = None;
        match frames {
            Some((total_frames, renderer)) => {
                let stdin = child
                    .stdin
                    .take()
                    .ok_or_else(|| ClipforgeError::encoder("Failed to capture encoder stdin"))?;
                feed = Some(spawn_frame_feed(
                    stdin,
                    renderer,
                    total_frames,
                    self.queue_depth.max(1),
                    Arc::clone(&stop),
                    Arc::clone(&activity),
                    Arc::clone(&progress),
                ));
            }
            None => {
                let estimator = ProgressEstimator::for_duration_ms(self.duration_ms);
                let progress = Arc::clone(&progress);
                estimator_task = Some(tokio::spawn(async move {
                    let started = Instant::now();
                    let mut ticker = tokio::time::interval(ESTIMATE_TICK);
                    loop {
                        ticker.tick().await;
                        progress(estimator.report_at(started.elapsed()));
                    }
                }));
            }
        }

        let outcome = supervise(&mut child, &mut cancel, &activity, self.watchdog).await;
        stop.store(true, Ordering::Relaxed);
        if let Some(task) = estimator_task {
            task.abort();
        }

        let render_result = match feed {
            Some(feed) => feed.finish().await,
            None => Ok(()),
        };
        let tail = tokio::time::timeout(STDERR_GRACE, stderr_task)
            .await
            .ok()
            .and_then(Result::ok)
            .unwrap_or_default();

        match outcome? {
            Outcome::Cancelled => {
                tracing::info!("Encoder cancelled");
                Err(ClipforgeError::Cancelled)
            }
            Outcome::Stalled => {
                tracing::warn!(watchdog_secs = self.watchdog.as_secs_f64(), "Encoder stalled");
                Err(ClipforgeError::encoder(format!(
                    "encoder stalled: no activity for {:.1}s",
                    self.watchdog.as_secs_f64()
                )))
            }
            Outcome::Exited(status) => {
                render_result?;
                if status.success() {
                    tracing::info!("Encoder finished");
                    Ok(())
                } else {
                    Err(ClipforgeError::encoder(format!(
                        "{} exited with {status}: {}",
                        self.binary,
                        tail.join("\n")
                    )))
                }
            }
        }
    }
}

async fn supervise(
    child: &mut Child,
    cancel: &mut watch::Receiver<bool>,
    activity: &ActivityClock,
    watchdog: Duration,
) -> ClipforgeResult<Outcome> {
    let poll = (watchdog / 4).clamp(Duration::from_millis(10), Duration::from_secs(1));
    let mut cancel_closed = false;
    if *cancel.borrow() {
        kill(child).await;
        return Ok(Outcome::Cancelled);
    }
    loop {
        tokio::select! {
            status = child.wait() => {
                let status = status.map_err(|e| {
                    ClipforgeError::encoder(format!("Failed to wait on encoder: {e}"))
                })?;
                return Ok(Outcome::Exited(status));
            }
            changed = cancel.changed(), if !cancel_closed => {
                match changed {
                    Ok(()) if *cancel.borrow() => {
                        kill(child).await;
                        return Ok(Outcome::Cancelled);
                    }
                    Ok(()) => {}
                    Err(_) => cancel_closed = true,
                }
            }
            _ = tokio::time::sleep(poll) => {
                if activity.idle() >= watchdog {
                    kill(child).await;
                    return Ok(Outcome::Stalled);
                }
            }
        }
    }
}

async fn kill(child: &mut Child) {
    if let Err(e) = child.kill().await {
        tracing::warn!(error = %e, "Failed to kill encoder");
    }
}

async fn drain_stderr(mut stderr: ChildStderr, activity: Arc<ActivityClock>) -> Vec<String> {
    let mut tail = OutputTail::default();
    let mut buf = vec![0u8; 4096];
    loop {
        match stderr.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                activity.touch();
                tail.push_chunk(&String::from_utf8_lossy(&buf[..n]));
            }
            Err(e) => {
                tracing::debug!(error = %e, "Encoder stderr closed");
                break;
            }
        }
    }
    tail.finish()
}

struct FrameFeed {
    render: JoinHandle<ClipforgeResult<()>>,
    writer: JoinHandle<()>,
}

impl FrameFeed {
    async fn finish(self) -> ClipforgeResult<()> {
        if let Err(e) = self.writer.await {
            tracing::warn!(error = %e, "Frame writer task failed");
        }
        self.render
            .await
            .map_err(|e| ClipforgeError::render(format!("Frame renderer failed: {e}")))?
    }
}

fn spawn_frame_feed(
    mut stdin: ChildStdin,
    mut renderer: FrameRenderer,
    total_frames: u64,
    queue_depth: usize,
    stop: Arc<AtomicBool>,
    activity: Arc<ActivityClock>,
    progress: ProgressFn,
) -> FrameFeed {
    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(queue_depth);

    let render = tokio::task::spawn_blocking(move || -> ClipforgeResult<()> {
        for index in 0..total_frames {
            if stop.load(Ordering::Relaxed) {
                break;
            }
            let png = renderer(index)?;
            if tx.blocking_send(png).is_err() {
                break;
            }
        }
        Ok(())
    });

    let writer = tokio::spawn(async move {
        let started = Instant::now();
        let mut written = 0u64;
        let mut last_percent = None;
        while let Some(png) = rx.recv().await {
            if let Err(e) = stdin.write_all(&png).await {
                tracing::warn!(error = %e, frame = written, "Encoder stdin closed; dropping remaining frames");
                break;
            }
            activity.touch();
            written += 1;
            let report = frame_progress(written, total_frames, started.elapsed());
            if last_percent != Some(report.percent()) {
                last_percent = Some(report.percent());
                progress(report);
            }
        }
        drop(rx);
        if let Err(e) = stdin.shutdown().await {
            tracing::debug!(error = %e, "Encoder stdin shutdown failed");
        }
        tracing::debug!(frames = written, "Frame writer finished");
    });

    FrameFeed { render, writer }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn shell(script: &str, input: EncoderInput, watchdog: Duration) -> EncoderRun {
        EncoderRun {
            binary: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            input,
            watchdog,
            queue_depth: 2,
            duration_ms: 1000.0,
        }
    }

    fn collect() -> (ProgressFn, Arc<Mutex<Vec<ExportProgress>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (Arc::new(move |p: ExportProgress| sink.lock().unwrap().push(p)), seen)
    }

    #[test]
    fn test_output_tail_splits_progress_lines() {
        let mut tail = OutputTail::default();
        tail.push_chunk("frame=1\rframe=2\r");
        tail.push_chunk("Error opening ");
        tail.push_chunk("output\n");
        tail.push_chunk("trailing");
        assert_eq!(
            tail.finish(),
            vec!["frame=1", "frame=2", "Error opening output", "trailing"]
        );
    }

    #[test]
    fn test_output_tail_is_bounded() {
        let mut tail = OutputTail::default();
        for i in 0..50 {
            tail.push_chunk(&format!("line {i}\n"));
        }
        let lines = tail.finish();
        assert_eq!(lines.len(), STDERR_TAIL_LINES);
        assert_eq!(lines[0], "line 30");
    }

    #[test]
    fn test_activity_clock_idle_resets_on_touch() {
        let clock = ActivityClock::new();
        std::thread::sleep(Duration::from_millis(30));
        assert!(clock.idle() >= Duration::from_millis(25));
        clock.touch();
        assert!(clock.idle() < Duration::from_millis(25));
    }

    #[tokio::test]
    async fn test_frames_are_written_to_stdin() {
        let dir = std::env::temp_dir().join(format!("clipforge-enc-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let out = dir.join("frames.bin");
        let run = shell(
            &format!("cat > '{}'", out.display()),
            EncoderInput::Frames { total_frames: 5 },
            Duration::from_secs(10),
        );
        let renderer: FrameRenderer = Box::new(|i| Ok(vec![b'a' + i as u8; 3]));
        let (_tx, rx) = watch::channel(false);
        let (progress, seen) = collect();
        run.run(Some(renderer), rx, progress).await.unwrap();

        assert_eq!(std::fs::read(&out).unwrap(), b"aaabbbcccdddeee");
        let seen = seen.lock().unwrap();
        assert_eq!(seen.last().map(|p| p.frames_rendered), Some(5));
        assert!(seen.iter().all(|p| p.percent() < 100));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_failure_carries_stderr_tail() {
        let run = shell(
            "echo 'Invalid argument' >&2; exit 3",
            EncoderInput::None,
            Duration::from_secs(10),
        );
        let (_tx, rx) = watch::channel(false);
        let (progress, _) = collect();
        let err = run.run(None, rx, progress).await.unwrap_err();
        assert!(matches!(err, ClipforgeError::Encoder { .. }));
        assert!(err.to_string().contains("Invalid argument"));
    }

    #[tokio::test]
    async fn test_render_error_wins_over_clean_exit() {
        let run = shell(
            "cat > /dev/null",
            EncoderInput::Frames { total_frames: 10 },
            Duration::from_secs(10),
        );
        let renderer: FrameRenderer = Box::new(|i| {
            if i == 3 {
                Err(ClipforgeError::render("font vanished"))
            } else {
                Ok(vec![0u8; 8])
            }
        });
        let (_tx, rx) = watch::channel(false);
        let (progress, _) = collect();
        let err = run.run(Some(renderer), rx, progress).await.unwrap_err();
        assert!(err.to_string().contains("font vanished"));
    }

    #[tokio::test]
    async fn test_silent_encoder_is_killed_by_watchdog() {
        let run = shell("exec sleep 10", EncoderInput::None, Duration::from_millis(200));
        let (_tx, rx) = watch::channel(false);
        let (progress, _) = collect();
        let started = Instant::now();
        let err = run.run(None, rx, progress).await.unwrap_err();
        assert!(err.to_string().contains("stalled"));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_cancel_kills_encoder() {
        let run = shell("exec sleep 10", EncoderInput::None, Duration::from_secs(30));
        let (tx, rx) = watch::channel(false);
        let (progress, _) = collect();
        let task = tokio::spawn(run.run(None, rx, progress));
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();
        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, ClipforgeError::Cancelled));
    }

    #[tokio::test]
    async fn test_missing_renderer_is_rejected() {
        let run = shell("true", EncoderInput::Frames { total_frames: 1 }, Duration::from_secs(1));
        let (_tx, rx) = watch::channel(false);
        let (progress, _) = collect();
        assert!(run.run(None, rx, progress).await.is_err());
    }
}
