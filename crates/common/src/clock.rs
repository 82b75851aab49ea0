//! Frame clock and playback timing utilities.
//!
//! Timeline positions are milliseconds. Export and playback both step
//! through the timeline at a fixed frame rate; this module provides:
//! - Frame index <-> millisecond conversions
//! - Total frame counts for a duration
//! - Fixed-interval tick gating for playback redraws

use std::time::Duration;

/// Converts between frame indices and timeline milliseconds at a fixed rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameClock {
    fps: u32,
}

impl FrameClock {
    /// Create a clock for the given frame rate. Zero is treated as 1 fps.
    pub fn new(fps: u32) -> Self {
        Self { fps: fps.max(1) }
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// Duration of one frame in milliseconds.
    pub fn frame_ms(&self) -> f64 {
        1000.0 / self.fps as f64
    }

    /// Timeline time (ms) at which the given frame is sampled.
    pub fn frame_to_ms(&self, frame: u64) -> f64 {
        frame as f64 * 1000.0 / self.fps as f64
    }

    /// Index of the frame that covers the given time.
    pub fn ms_to_frame(&self, ms: f64) -> u64 {
        if ms <= 0.0 {
            return 0;
        }
        (ms * self.fps as f64 / 1000.0).floor() as u64
    }

    /// Number of frames needed to cover `[0, duration_ms)`.
    pub fn total_frames(&self, duration_ms: f64) -> u64 {
        if duration_ms <= 0.0 {
            return 0;
        }
        (duration_ms * self.fps as f64 / 1000.0).ceil() as u64
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new(60)
    }
}

/// Fixed-interval gate for playback ticks.
#[derive(Debug)]
pub struct PlaybackTicker {
    interval: Duration,
    last_tick: Option<Duration>,
}

impl PlaybackTicker {
    /// Create a ticker targeting the given Hz rate.
    pub fn new(target_hz: u32) -> Self {
        Self {
            interval: Duration::from_nanos(1_000_000_000 / target_hz.max(1) as u64),
            last_tick: None,
        }
    }

    /// Check if enough time has passed for the next tick.
    /// Returns true and updates internal state if ready.
    /// The first call always returns true.
    pub fn should_tick(&mut self, now: Duration) -> bool {
        match self.last_tick {
            None => {
                self.last_tick = Some(now);
                true
            }
            Some(last) if now >= last + self.interval => {
                self.last_tick = Some(now);
                true
            }
            _ => false,
        }
    }

    /// Forget the last tick, e.g. after a seek.
    pub fn reset(&mut self) {
        self.last_tick = None;
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}
