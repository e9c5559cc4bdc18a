//! Whole-frame behaviour of the scene manager on the recording backend.

use glam::Vec3;
use umbra_render::{
    Camera, Color, CompareFunction, DepthStencilConfig, DeviceCall, HeadlessBackend, HeadlessProbe,
    PhaseMask, RenderDevice,
};
use umbra_scene::{
    DebugView, FPS_TEXT_POSITION, Phase, Scene, SceneManager, SceneSettings, TerrainDesc,
};

fn headless(width: u32, height: u32) -> (RenderDevice, HeadlessProbe) {
    let backend = HeadlessBackend::new(width, height);
    let probe = backend.probe();
    let device = RenderDevice::new(Box::new(backend), Camera::default()).unwrap();
    (device, probe)
}

fn small_terrain() -> TerrainDesc {
    TerrainDesc {
        size: 20.0,
        resolution: 4,
        amplitude: 1.0,
    }
}

fn depth_states(probe: &HeadlessProbe) -> Vec<DepthStencilConfig> {
    probe
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            DeviceCall::CreateDepthStencilState(config, _) => Some(config),
            _ => None,
        })
        .collect()
}

/// Manager with every collaborator and one scene holding a cube and a pyramid.
fn populated(device: &mut RenderDevice, settings: SceneSettings) -> SceneManager {
    let mut manager = SceneManager::new(device, settings).unwrap();
    manager.create_sky(device).unwrap();
    manager.create_terrain(device, small_terrain()).unwrap();
    manager.create_water(device, 0.0).unwrap();

    let mut scene = Scene::new("demo");
    let mut cube = manager.create_entity(device, "cube").unwrap();
    cube.node_mut().set_position(Vec3::new(0.0, 2.0, 0.0));
    scene.add_entity(cube);
    let pyramid = manager.create_entity(device, "pyramid").unwrap();
    scene.add_entity(pyramid);
    manager.add_scene(scene);
    manager.set_active_scene(device, 0);
    manager
}

#[test]
fn test_full_frame_runs_every_phase_and_presents() {
    let (mut device, probe) = headless(1280, 720);
    let mut manager = populated(&mut device, SceneSettings::default());

    device.begin_frame();
    device.update_frame(0.016);
    manager.update(0.016);
    manager.render(&mut device);
    device.end_frame().unwrap();

    assert_eq!(
        manager.pipeline().executed(),
        &[
            Phase::Sky,
            Phase::Terrain,
            Phase::AmbientOcclusion,
            Phase::Entities,
            Phase::Water,
            Phase::Ui,
        ]
    );
    // Shadow pass, water reflection, then the main pass.
    assert_eq!(manager.pipeline().frames(), 3);
    assert_eq!(probe.presented_frames(), 1);
    assert_eq!(device.current_target(), device.primary_target());
}

#[test]
fn test_shadow_pass_draws_only_casters() {
    let (mut device, probe) = headless(800, 600);
    let settings = SceneSettings {
        ssao_ratio: None,
        ..SceneSettings::default()
    };
    let mut manager = SceneManager::new(&mut device, settings).unwrap();
    let mut scene = Scene::new("casters");
    scene.add_entity(manager.create_entity(&mut device, "cube").unwrap());
    let mut receiver_only = manager.create_entity(&mut device, "pyramid").unwrap();
    receiver_only.set_cast_shadow(false);
    scene.add_entity(receiver_only);
    manager.add_scene(scene);
    manager.set_active_scene(&mut device, 0);
    manager.set_render_flag(PhaseMask::empty());
    manager.update(0.016);
    probe.take_calls();

    manager.render(&mut device);

    let shadow = manager.shadow_map().unwrap().color_target();
    assert!(probe.calls().iter().any(
        |c| matches!(c, DeviceCall::ClearColor { target, color } if *target == shadow && *color == Color::WHITE)
    ));
    assert_eq!(probe.draws().len(), 1);
    assert!(probe.texts().is_empty());
    assert_eq!(device.current_target(), device.primary_target());
}

#[test]
fn test_shadow_pass_restores_camera_matrices() {
    let (mut device, _probe) = headless(800, 600);
    let mut manager = populated(&mut device, SceneSettings::default());
    device.update_frame(0.0);
    let view = device.frame_constants().view;
    let projection = device.frame_constants().projection;

    manager.update(0.016);
    manager.set_render_flag(PhaseMask::empty());
    manager.render(&mut device);

    assert_eq!(device.frame_constants().view, view);
    assert_eq!(device.frame_constants().projection, projection);
}

#[test]
fn test_ssao_tightens_depth_then_restores_less() {
    let (mut device, probe) = headless(800, 600);
    let settings = SceneSettings {
        shadow_map_size: None,
        ..SceneSettings::default()
    };
    let mut manager = populated(&mut device, settings);
    manager.set_render_flag(PhaseMask::SSAO | PhaseMask::SOLID);
    manager.update(0.016);
    probe.take_calls();

    manager.render(&mut device);

    let states = depth_states(&probe);
    let equal = states
        .iter()
        .position(|s| s.compare == CompareFunction::Equal && !s.depth_write)
        .expect("equal depth test applied");
    let restored = states
        .iter()
        .rposition(|s| s.compare == CompareFunction::Less && s.depth_write)
        .expect("less depth test restored");
    assert!(equal < restored);
    let bound = device.depth_stencil_state();
    assert_eq!(bound.compare, CompareFunction::Less);
    assert!(bound.depth_write);
}

#[test]
fn test_ui_reports_frame_rate() {
    let (mut device, probe) = headless(800, 600);
    let settings = SceneSettings {
        shadow_map_size: None,
        ssao_ratio: None,
        render_flag: PhaseMask::UI,
        ..SceneSettings::default()
    };
    let mut manager = SceneManager::new(&mut device, settings).unwrap();
    for _ in 0..4 {
        manager.update(0.25);
    }
    probe.take_calls();

    manager.render(&mut device);

    let drawn = probe.calls().into_iter().find_map(|c| match c {
        DeviceCall::DrawText {
            text,
            position,
            color,
        } => Some((text, position, color)),
        _ => None,
    });
    assert_eq!(
        drawn,
        Some(("lastFPS : 4.000000".to_string(), FPS_TEXT_POSITION, Color::YELLOW))
    );
}

#[test]
fn test_frame_without_active_scene() {
    let (mut device, probe) = headless(800, 600);
    let mut manager = SceneManager::new(&mut device, SceneSettings::default()).unwrap();
    manager.create_sky(&mut device).unwrap();

    device.begin_frame();
    manager.update(0.016);
    manager.render(&mut device);
    device.end_frame().unwrap();

    assert!(manager.active_scene().is_none());
    assert_eq!(
        manager.pipeline().executed(),
        &[Phase::Sky, Phase::AmbientOcclusion, Phase::Entities, Phase::Ui]
    );
    assert_eq!(probe.presented_frames(), 1);
}

#[test]
fn test_debug_overlay_draws_in_ui_phase() {
    let (mut device, probe) = headless(800, 600);
    let settings = SceneSettings {
        ssao_ratio: None,
        render_flag: PhaseMask::UI,
        ..SceneSettings::default()
    };
    let mut manager = SceneManager::new(&mut device, settings).unwrap();
    manager.enable_debug_view(DebugView::ShadowMap);
    let shadow = manager.shadow_map().unwrap().color_target();
    probe.take_calls();

    manager.render(&mut device);

    assert!(probe
        .calls()
        .iter()
        .any(|c| matches!(c, DeviceCall::BindTexture { slot: 0, target: Some(t) } if *t == shadow)));
    assert_eq!(probe.draws().len(), 1);
}

#[test]
fn test_occlusion_target_follows_display_resize() {
    let (mut device, probe) = headless(1920, 1080);
    let mut manager = SceneManager::new(&mut device, SceneSettings::default()).unwrap();
    let pass = manager.ambient_occlusion().unwrap();
    let occlusion = pass.occlusion_target();
    let normal_depth = pass.normal_depth_target();
    assert_eq!(pass.occlusion_size(), (960, 540));

    device.resize_primary(1280, 720);
    manager.on_display_resized(&mut device).unwrap();

    let pass = manager.ambient_occlusion().unwrap();
    assert_eq!(pass.occlusion_target(), occlusion);
    assert_eq!(pass.occlusion_size(), (640, 360));
    assert_eq!(probe.color_target_size(occlusion), Some((640, 360)));
    assert_eq!(probe.color_target_size(normal_depth), Some((1280, 720)));

    let shadow = manager.shadow_map().unwrap();
    assert_eq!(probe.color_target_size(shadow.color_target()), Some((1024, 1024)));
}

#[test]
fn test_scene_switch_moves_camera() {
    let (mut device, _probe) = headless(800, 600);
    let mut manager = SceneManager::new(&mut device, SceneSettings::default()).unwrap();
    manager.add_scene(Scene::new("near").with_camera(Vec3::new(0.0, 2.0, 5.0), Vec3::ZERO));
    manager.add_scene(Scene::new("far").with_camera(Vec3::new(0.0, 40.0, 80.0), Vec3::ZERO));

    manager.toggle_scene(&mut device);
    assert_eq!(device.camera().position, Vec3::new(0.0, 2.0, 5.0));
    manager.toggle_scene(&mut device);
    assert_eq!(device.camera().position, Vec3::new(0.0, 40.0, 80.0));
    assert!(!manager.set_active_scene(&mut device, 7));
    assert_eq!(manager.active_scene_index(), Some(1));
}
