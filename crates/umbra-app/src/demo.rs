//! The scenes shown by the application.

use std::f32::consts::TAU;

use glam::{Quat, Vec3};
use umbra_render::RenderDevice;
use umbra_scene::{Scene, SceneError, SceneManager, TerrainDesc};

/// Objects in the ring of the first scene.
pub const RING_COUNT: usize = 8;
const RING_RADIUS: f32 = 12.0;
const TOWER_GRID: i32 = 3;
const TOWER_SPACING: f32 = 6.0;

/// Add the demo scenes to `manager` and return how many were added.
///
/// Objects rest on `terrain` when given, otherwise on the `y = 0` plane.
pub fn populate(
    manager: &mut SceneManager,
    device: &mut RenderDevice,
    terrain: Option<&TerrainDesc>,
) -> Result<usize, SceneError> {
    let ground = |x: f32, z: f32| terrain.map_or(0.0, |t| t.height_at(x, z));

    manager.add_scene(ring(manager, device, &ground)?);
    manager.add_scene(towers(manager, device, &ground)?);
    Ok(2)
}

fn ring(
    manager: &mut SceneManager,
    device: &mut RenderDevice,
    ground: &dyn Fn(f32, f32) -> f32,
) -> Result<Scene, SceneError> {
    let center = Vec3::new(0.0, ground(0.0, 0.0), 0.0);
    let mut scene =
        Scene::new("ring").with_camera(center + Vec3::new(0.0, 12.0, 30.0), center + Vec3::Y * 2.0);

    for i in 0..RING_COUNT {
        let angle = i as f32 / RING_COUNT as f32 * TAU;
        let (x, z) = (angle.cos() * RING_RADIUS, angle.sin() * RING_RADIUS);
        let mesh = if i % 2 == 0 { "cube" } else { "pyramid" };
        let mut entity = manager.create_entity(device, mesh)?;
        let node = entity.node_mut();
        node.set_uniform_scale(2.0);
        node.set_rotation(Quat::from_rotation_y(-angle));
        let lift = if mesh == "cube" { 1.0 } else { 0.0 };
        node.set_position(Vec3::new(x, ground(x, z) + lift, z));
        scene.add_entity(entity);
    }
    Ok(scene)
}

fn towers(
    manager: &mut SceneManager,
    device: &mut RenderDevice,
    ground: &dyn Fn(f32, f32) -> f32,
) -> Result<Scene, SceneError> {
    let base = ground(0.0, 0.0);
    let mut scene = Scene::new("towers").with_camera(
        Vec3::new(25.0, base + 20.0, 25.0),
        Vec3::new(0.0, base + 4.0, 0.0),
    );

    let mut floor = manager.create_entity(device, "plane")?;
    floor.set_cast_shadow(false);
    let node = floor.node_mut();
    node.set_scale(Vec3::new(30.0, 1.0, 30.0));
    node.set_position(Vec3::new(0.0, base + 0.05, 0.0));
    scene.add_entity(floor);

    for gx in -1..TOWER_GRID - 1 {
        for gz in -1..TOWER_GRID - 1 {
            let height = 2.0 + ((gx + 1) * TOWER_GRID + gz + 1) as f32;
            let mut tower = manager.create_entity(device, "cube")?;
            let node = tower.node_mut();
            node.set_scale(Vec3::new(2.0, height, 2.0));
            node.set_position(Vec3::new(
                gx as f32 * TOWER_SPACING,
                base + height * 0.5,
                gz as f32 * TOWER_SPACING,
            ));
            scene.add_entity(tower);
        }
    }
    Ok(scene)
}
