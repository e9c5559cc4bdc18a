//! The render device and scene manager driven together, one frame at a time.

use glam::Vec3;
use tracing::{info, instrument};
use umbra_config::Config;
use umbra_render::{Camera, Color, DeviceError, GraphicsBackend, PhaseMask, RenderDevice};
use umbra_scene::{DebugView, SceneManager, SceneSettings, TerrainDesc};

use crate::demo;
use crate::error::AppError;

/// Phases selected by `config`.
///
/// Without the frame-rate text or a debug view there is nothing for the UI
/// phase to draw, so it is dropped.
pub fn render_flag(config: &Config) -> Result<PhaseMask, AppError> {
    let mut mask = PhaseMask::from_names(&config.render.phases)?;
    let view: DebugView = config.debug.debug_view.parse()?;
    if !config.debug.show_fps && view == DebugView::None {
        mask.remove(PhaseMask::UI);
    }
    Ok(mask)
}

/// Sun direction from `config`, straight down when it is zero.
fn sun_direction(config: &Config) -> Vec3 {
    Vec3::from_array(config.scene.sun_direction)
        .try_normalize()
        .unwrap_or(Vec3::NEG_Y)
}

/// What the scene manager sets up for `config`.
pub fn scene_settings(config: &Config) -> Result<SceneSettings, AppError> {
    Ok(SceneSettings {
        render_flag: render_flag(config)?,
        shadow_map_size: config
            .render
            .shadow_map
            .then_some(config.render.shadow_map_size.max(1)),
        ssao_ratio: config.render.ssao.then_some(config.render.ssao_ratio),
        sun_direction: sun_direction(config),
        sun_color: Vec3::from_array(config.scene.sun_color),
        ambient_color: Vec3::from_array(config.scene.ambient_color),
    })
}

fn background(config: &Config) -> Color {
    let [r, g, b, a] = config.render.clear_color;
    Color::rgba(r, g, b, a)
}

pub struct Engine {
    device: RenderDevice,
    manager: SceneManager,
    frames: u64,
    max_frames: u64,
}

impl Engine {
    /// Build the device on `backend`, the environment the config asks for and
    /// the demo scenes, and enter the first scene.
    #[instrument(skip_all)]
    pub fn new(backend: Box<dyn GraphicsBackend>, config: &Config) -> Result<Self, AppError> {
        let mut device = RenderDevice::new(backend, Camera::default())?;
        device.set_background_color(background(config));

        let mut manager = SceneManager::new(&mut device, scene_settings(config)?)?;
        if config.scene.sky {
            manager.create_sky(&mut device)?;
        }
        let terrain = config.scene.terrain.then(TerrainDesc::default);
        if let Some(desc) = terrain {
            manager.create_terrain(&mut device, desc)?;
        }
        if let Some(height) = config.scene.water_height {
            manager.create_water(&mut device, height)?;
        }

        let scenes = demo::populate(&mut manager, &mut device, terrain.as_ref())?;
        manager.set_active_scene(&mut device, 0);
        manager.enable_debug_view(config.debug.debug_view.parse()?);

        info!(scenes, phases = ?manager.render_flag(), "Engine ready");
        Ok(Self {
            device,
            manager,
            frames: 0,
            max_frames: config.debug.max_frames,
        })
    }

    /// Update the scene by `delta_seconds`, draw it and present.
    pub fn frame(&mut self, delta_seconds: f32) -> Result<(), DeviceError> {
        self.manager.update(delta_seconds);
        self.device.begin_frame();
        self.device.update_frame(self.manager.stats().elapsed());
        self.manager.render(&mut self.device);
        self.device.end_frame()?;
        self.frames += 1;
        Ok(())
    }

    /// Follow a window resize. Zero sizes (minimized windows) are ignored.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), AppError> {
        if width == 0 || height == 0 {
            return Ok(());
        }
        self.device.resize_primary(width, height);
        self.manager.on_display_resized(&mut self.device)?;
        info!("Window resized to {width}x{height}");
        Ok(())
    }

    /// Apply the settings that can change while running: phases, debug
    /// view, background and sun.
    pub fn apply_config(&mut self, config: &Config) -> Result<(), AppError> {
        let mask = render_flag(config)?;
        let view: DebugView = config.debug.debug_view.parse()?;
        self.manager.set_render_flag(mask);
        self.manager.enable_debug_view(view);
        self.device.set_background_color(background(config));
        self.manager.set_sun_light(
            &mut self.device,
            sun_direction(config),
            Vec3::from_array(config.scene.sun_color),
        );
        self.max_frames = config.debug.max_frames;
        info!(phases = ?mask, %view, "Config applied");
        Ok(())
    }

    pub fn toggle_scene(&mut self) {
        self.manager.toggle_scene(&mut self.device);
    }

    /// Step the debug overlay through none, shadow map and SSAO.
    pub fn cycle_debug_view(&mut self) {
        let next = match self.manager.debug_view() {
            DebugView::None => DebugView::ShadowMap,
            DebugView::ShadowMap => DebugView::Ssao,
            DebugView::Ssao => DebugView::None,
        };
        self.manager.enable_debug_view(next);
    }

    /// Whether the configured frame limit has been reached.
    pub fn finished(&self) -> bool {
        self.max_frames != 0 && self.frames >= self.max_frames
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn device(&self) -> &RenderDevice {
        &self.device
    }

    pub fn manager(&self) -> &SceneManager {
        &self.manager
    }

    /// Release every GPU resource.
    pub fn shutdown(self) {
        let Self {
            mut device,
            manager,
            frames,
            ..
        } = self;
        manager.destroy(&mut device);
        info!(frames, "Engine shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use umbra_render::{HeadlessBackend, HeadlessProbe};

    fn small_config() -> Config {
        let mut config = Config::default();
        config.window.width = 320;
        config.window.height = 200;
        config.scene.terrain = false;
        config
    }

    fn engine(config: &Config) -> (Engine, HeadlessProbe) {
        let backend = HeadlessBackend::new(config.window.width, config.window.height);
        let probe = backend.probe();
        (Engine::new(Box::new(backend), config).unwrap(), probe)
    }

    #[test]
    fn test_settings_follow_config() {
        let mut config = Config::default();
        config.render.shadow_map = false;
        config.render.ssao_ratio = 0.25;
        config.render.phases = vec!["sky".to_string(), "solid".to_string()];
        let settings = scene_settings(&config).unwrap();
        assert_eq!(settings.shadow_map_size, None);
        assert_eq!(settings.ssao_ratio, Some(0.25));
        assert_eq!(settings.render_flag, PhaseMask::SKY | PhaseMask::SOLID);
        assert!((settings.sun_direction.length() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_sun_points_down() {
        let mut config = Config::default();
        config.scene.sun_direction = [0.0, 0.0, 0.0];
        assert_eq!(scene_settings(&config).unwrap().sun_direction, Vec3::NEG_Y);
    }

    #[test]
    fn test_unknown_phase_is_config_error() {
        let mut config = Config::default();
        config.render.phases = vec!["fog".to_string()];
        assert!(matches!(scene_settings(&config), Err(AppError::Phase(_))));
    }

    #[test]
    fn test_ui_dropped_without_fps_or_debug_view() {
        let mut config = Config::default();
        config.debug.show_fps = false;
        assert!(!render_flag(&config).unwrap().contains(PhaseMask::UI));
        config.debug.debug_view = "ssao".to_string();
        assert!(render_flag(&config).unwrap().contains(PhaseMask::UI));
    }

    #[test]
    fn test_frames_present_and_stop_at_limit() {
        let mut config = small_config();
        config.debug.max_frames = 3;
        let (mut engine, probe) = engine(&config);
        while !engine.finished() {
            engine.frame(1.0 / 60.0).unwrap();
        }
        assert_eq!(engine.frames(), 3);
        assert_eq!(probe.presented_frames(), 3);
        assert_eq!(engine.manager().active_scene().unwrap().name(), "ring");
    }

    #[test]
    fn test_rejected_present_is_reported() {
        let (mut engine, probe) = engine(&small_config());
        probe.reject_next_present("surface lost");
        assert!(matches!(
            engine.frame(0.016),
            Err(DeviceError::PresentRejected(_))
        ));
        assert_eq!(engine.frames(), 0);
    }

    #[test]
    fn test_resize_reaches_offscreen_passes() {
        let (mut engine, probe) = engine(&small_config());
        engine.resize(800, 600).unwrap();
        let pass = engine.manager().ambient_occlusion().unwrap();
        assert_eq!(pass.occlusion_size(), (400, 300));
        assert_eq!(probe.color_target_size(pass.occlusion_target()), Some((400, 300)));
        assert_eq!(engine.device().primary_size(), (800, 600));
    }

    #[test]
    fn test_minimized_window_is_ignored() {
        let (mut engine, _probe) = engine(&small_config());
        engine.resize(0, 0).unwrap();
        assert_eq!(engine.device().primary_size(), (320, 200));
    }

    #[test]
    fn test_apply_config_switches_phases_and_view() {
        let (mut engine, _probe) = engine(&small_config());
        let mut config = small_config();
        config.render.phases = vec!["ui".to_string()];
        config.debug.debug_view = "shadow_map".to_string();
        engine.apply_config(&config).unwrap();
        assert_eq!(engine.manager().render_flag(), PhaseMask::UI);
        assert_eq!(engine.manager().debug_view(), DebugView::ShadowMap);
    }

    #[test]
    fn test_debug_view_cycles() {
        let (mut engine, _probe) = engine(&small_config());
        engine.cycle_debug_view();
        assert_eq!(engine.manager().debug_view(), DebugView::ShadowMap);
        engine.cycle_debug_view();
        assert_eq!(engine.manager().debug_view(), DebugView::Ssao);
        engine.cycle_debug_view();
        assert_eq!(engine.manager().debug_view(), DebugView::None);
    }

    #[test]
    fn test_toggle_moves_to_second_scene() {
        let (mut engine, _probe) = engine(&small_config());
        engine.toggle_scene();
        assert_eq!(engine.manager().active_scene().unwrap().name(), "towers");
    }

    #[test]
    fn test_shutdown_releases_meshes() {
        let backend = HeadlessBackend::new(320, 200);
        let probe = backend.probe();
        let meshes_before = probe.live_meshes();
        let engine = Engine::new(Box::new(backend), &small_config()).unwrap();
        assert!(probe.live_meshes() > meshes_before);
        engine.shutdown();
        assert_eq!(probe.live_meshes(), meshes_before);
    }
}
