//! Windowless runs on the recording backend.

use tracing::{info, instrument};
use umbra_config::Config;
use umbra_render::HeadlessBackend;

use crate::clock::FIXED_DT;
use crate::engine::Engine;
use crate::error::AppError;

/// Frames rendered when the config sets no limit.
pub const DEFAULT_HEADLESS_FRAMES: u64 = 120;

/// Outcome of a headless run.
#[derive(Clone, Debug, PartialEq)]
pub struct HeadlessReport {
    pub frames: u64,
    pub presented: u64,
    pub draw_calls: usize,
    pub last_fps: f32,
}

/// Render `debug.max_frames` frames (or [`DEFAULT_HEADLESS_FRAMES`]) at a
/// fixed step, without a window.
#[instrument(skip_all)]
pub fn run_headless(config: &Config) -> Result<HeadlessReport, AppError> {
    let backend = HeadlessBackend::new(config.window.width, config.window.height);
    let probe = backend.probe();

    let mut config = config.clone();
    if config.debug.max_frames == 0 {
        config.debug.max_frames = DEFAULT_HEADLESS_FRAMES;
    }
    let mut engine = Engine::new(Box::new(backend), &config)?;
    probe.take_calls();

    while !engine.finished() {
        engine.frame(FIXED_DT)?;
    }

    let report = HeadlessReport {
        frames: engine.frames(),
        presented: probe.presented_frames(),
        draw_calls: probe.draws().len(),
        last_fps: engine.manager().stats().last_fps(),
    };
    engine.shutdown();
    info!(
        frames = report.frames,
        draw_calls = report.draw_calls,
        "Headless run finished at {:.1} fps",
        report.last_fps
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(frames: u64) -> Config {
        let mut config = Config::default();
        config.window.width = 320;
        config.window.height = 240;
        config.scene.terrain = false;
        config.render.headless = true;
        config.debug.max_frames = frames;
        config
    }

    #[test]
    fn test_runs_requested_frames() {
        let report = run_headless(&config(5)).unwrap();
        assert_eq!(report.frames, 5);
        assert_eq!(report.presented, 5);
        assert!(report.draw_calls > 0);
    }

    #[test]
    fn test_unlimited_config_uses_default_count() {
        let report = run_headless(&config(0)).unwrap();
        assert_eq!(report.frames, DEFAULT_HEADLESS_FRAMES);
        assert!((report.last_fps - 60.0).abs() < 1.0);
    }

    #[test]
    fn test_invalid_debug_view_fails_before_rendering() {
        let mut config = config(1);
        config.debug.debug_view = "wireframe".to_string();
        assert!(matches!(run_headless(&config), Err(AppError::DebugView(_))));
    }
}
