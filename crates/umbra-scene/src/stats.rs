//! Frame timing.

/// Frame rate averaged over roughly one-second windows.
#[derive(Clone, Debug, Default)]
pub struct FrameStats {
    window_frames: u32,
    window_seconds: f32,
    last_fps: f32,
    total_frames: u64,
    elapsed: f32,
}

impl FrameStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for one frame that took `delta_seconds`.
    pub fn tick(&mut self, delta_seconds: f32) {
        let delta = delta_seconds.max(0.0);
        self.total_frames += 1;
        self.elapsed += delta;
        self.window_frames += 1;
        self.window_seconds += delta;
        if self.window_seconds >= 1.0 {
            self.last_fps = self.window_frames as f32 / self.window_seconds;
            self.window_frames = 0;
            self.window_seconds = 0.0;
        }
    }

    /// Frame rate of the last completed window, 0 before the first one.
    pub fn last_fps(&self) -> f32 {
        self.last_fps
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    /// Seconds accumulated over every tick.
    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }
}
