//! Export progress reporting.

use std::time::Duration;

use serde::Serialize;

/// Interval of estimated progress ticks while a graph export runs.
pub const ESTIMATE_TICK: Duration = Duration::from_millis(500);

/// Estimated progress never reaches completion on its own.
pub const MAX_ESTIMATED_PROGRESS: f64 = 0.99;

/// Graph exports are assumed to run at three times real time.
const ESTIMATE_SPEEDUP: f64 = 3.0;

/// Export progress report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportProgress {
    /// Current progress [0.0, 1.0].
    pub progress: f64,

    /// Frames handed to the encoder so far (frame streaming only).
    pub frames_rendered: u64,

    /// Total frames to render.
    pub total_frames: u64,

    /// Estimated time remaining in seconds.
    pub eta_secs: f64,

    /// Current stage.
    pub stage: ExportStage,
}

impl ExportProgress {
    pub fn stage(stage: ExportStage, total_frames: u64) -> Self {
        let done = stage == ExportStage::Complete;
        Self {
            progress: if done { 1.0 } else { 0.0 },
            frames_rendered: if done { total_frames } else { 0 },
            total_frames,
            eta_secs: 0.0,
            stage,
        }
    }

    /// Progress as a whole percentage.
    pub fn percent(&self) -> u8 {
        (self.progress * 100.0).floor().clamp(0.0, 100.0) as u8
    }
}

/// Stages of the export process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportStage {
    Preparing,
    Rendering,
    Encoding,
    Finalizing,
    Complete,
}

/// Progress from frames written, with a linear remaining-time estimate.
pub fn frame_progress(frames_rendered: u64, total_frames: u64, elapsed: Duration) -> ExportProgress {
    let progress = if total_frames == 0 {
        0.0
    } else {
        (frames_rendered as f64 / total_frames as f64).clamp(0.0, 1.0)
    };
    ExportProgress {
        // Completion is only reported once the encoder has exited.
        progress: progress.min(MAX_ESTIMATED_PROGRESS),
        frames_rendered,
        total_frames,
        eta_secs: remaining_secs(progress, elapsed.as_secs_f64()),
        stage: ExportStage::Rendering,
    }
}

fn remaining_secs(progress: f64, elapsed_secs: f64) -> f64 {
    if progress > 0.0 {
        ((elapsed_secs / progress) - elapsed_secs).max(0.0)
    } else {
        0.0
    }
}

/// Time-based estimate for exports whose encoder reports nothing usable.
#[derive(Debug, Clone, Copy)]
pub struct ProgressEstimator {
    estimate: Duration,
}

impl ProgressEstimator {
    /// Estimate a third of the output duration.
    pub fn for_duration_ms(duration_ms: f64) -> Self {
        let estimate_ms = (duration_ms / ESTIMATE_SPEEDUP).max(1.0);
        Self {
            estimate: Duration::from_secs_f64(estimate_ms / 1000.0),
        }
    }

    pub fn estimate(&self) -> Duration {
        self.estimate
    }

    pub fn fraction_at(&self, elapsed: Duration) -> f64 {
        (elapsed.as_secs_f64() / self.estimate.as_secs_f64()).clamp(0.0, MAX_ESTIMATED_PROGRESS)
    }

    pub fn report_at(&self, elapsed: Duration) -> ExportProgress {
        let progress = self.fraction_at(elapsed);
        ExportProgress {
            progress,
            frames_rendered: 0,
            total_frames: 0,
            eta_secs: self
                .estimate
                .saturating_sub(elapsed)
                .as_secs_f64(),
            stage: ExportStage::Encoding,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_progress_is_capped_until_exit() {
        let report = frame_progress(50, 100, Duration::from_secs(10));
        assert_eq!(report.percent(), 50);
        assert!((report.eta_secs - 10.0).abs() < 1e-9);

        let last = frame_progress(100, 100, Duration::from_secs(20));
        assert_eq!(last.percent(), 99);
        assert_eq!(frame_progress(0, 0, Duration::ZERO).progress, 0.0);
    }

    #[test]
    fn test_estimator_uses_third_of_duration() {
        let estimator = ProgressEstimator::for_duration_ms(9000.0);
        assert_eq!(estimator.estimate(), Duration::from_secs(3));
        assert_eq!(estimator.report_at(Duration::from_millis(1500)).percent(), 50);
        assert_eq!(estimator.report_at(Duration::from_secs(60)).percent(), 99);
    }

    #[test]
    fn test_complete_stage_is_full() {
        let done = ExportProgress::stage(ExportStage::Complete, 120);
        assert_eq!(done.percent(), 100);
        assert_eq!(done.frames_rendered, 120);
    }
}
