//! Wall-clock frame timing with a ceiling on a single frame's duration.

use std::time::Instant;

use tracing::warn;

/// Step used when no wall clock drives the frames (headless runs).
pub const FIXED_DT: f32 = 1.0 / 60.0;

/// Longest frame fed to the simulation. A stall (debugger, window drag)
/// advances the scene by at most this much.
pub const MAX_FRAME_TIME: f32 = 0.25;

/// Measures the time between successive [`tick`](Self::tick) calls.
pub struct FrameClock {
    previous: Instant,
    frame_count: u64,
}

impl FrameClock {
    pub fn new() -> Self {
        Self {
            previous: Instant::now(),
            frame_count: 0,
        }
    }

    /// Seconds since the previous tick, clamped to [`MAX_FRAME_TIME`].
    pub fn tick(&mut self) -> f32 {
        let now = Instant::now();
        let frame_time = now.duration_since(self.previous).as_secs_f32();
        self.previous = now;
        self.frame_count += 1;
        clamp_frame_time(frame_time)
    }

    /// Restart measurement from now, e.g. after the window was created.
    pub fn reset(&mut self) {
        self.previous = Instant::now();
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

pub fn clamp_frame_time(frame_time: f32) -> f32 {
    if frame_time > MAX_FRAME_TIME {
        warn!(
            "Frame time {:.1}ms exceeds maximum, clamping to {:.1}ms",
            frame_time * 1000.0,
            MAX_FRAME_TIME * 1000.0
        );
        MAX_FRAME_TIME
    } else {
        frame_time.max(0.0)
    }
}
