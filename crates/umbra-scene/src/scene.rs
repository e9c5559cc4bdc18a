//! Named collections of entities with a starting viewpoint.

use glam::Vec3;
use umbra_math::Aabb;
use umbra_render::RenderDevice;

use crate::entity::Entity;

/// One selectable scene.
pub struct Scene {
    name: String,
    entities: Vec<Entity>,
    camera_position: Vec3,
    camera_target: Vec3,
}

impl Scene {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entities: Vec::new(),
            camera_position: Vec3::new(0.0, 5.0, 15.0),
            camera_target: Vec3::ZERO,
        }
    }

    /// Viewpoint applied by [`enter`](Self::enter).
    pub fn with_camera(mut self, position: Vec3, target: Vec3) -> Self {
        self.camera_position = position;
        self.camera_target = target;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add an entity and return its index.
    pub fn add_entity(&mut self, entity: Entity) -> usize {
        self.entities.push(entity);
        self.entities.len() - 1
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn entity_mut(&mut self, index: usize) -> Option<&mut Entity> {
        self.entities.get_mut(index)
    }

    /// Move the device camera to this scene's viewpoint.
    pub fn enter(&self, device: &mut RenderDevice) {
        let camera = device.camera_mut();
        camera.position = self.camera_position;
        camera.look_at(self.camera_target);
        log::info!("entered scene '{}' ({} entities)", self.name, self.entities.len());
    }

    pub fn update(&mut self) {
        for entity in &mut self.entities {
            entity.update();
        }
    }

    /// Union of every entity's world bounds, or `None` for an empty scene.
    pub fn bounds(&self) -> Option<Aabb> {
        self.entities
            .iter()
            .map(|e| e.node().world_bounds())
            .reduce(|a, b| a.union(&b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{cube, headless};

    #[test]
    fn test_enter_moves_camera() {
        let (mut device, _probe) = headless(800, 600);
        let scene = Scene::new("demo").with_camera(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO);
        scene.enter(&mut device);
        assert_eq!(device.camera().position, Vec3::new(0.0, 0.0, 10.0));
        assert!(device.camera().forward().abs_diff_eq(Vec3::NEG_Z, 1e-5));
    }

    #[test]
    fn test_bounds_union_after_update() {
        let (mut device, _probe) = headless(800, 600);
        let mesh = cube(&mut device, None);
        let mut scene = Scene::new("pair");
        let a = scene.add_entity(Entity::new(mesh.clone()));
        let b = scene.add_entity(Entity::new(mesh));
        scene.entity_mut(a).unwrap().node_mut().set_position(Vec3::new(-5.0, 0.0, 0.0));
        scene.entity_mut(b).unwrap().node_mut().set_position(Vec3::new(5.0, 0.0, 0.0));
        scene.update();

        let bounds = scene.bounds().unwrap();
        assert!((bounds.min.x + 6.0).abs() < 1e-5);
        assert!((bounds.max.x - 6.0).abs() < 1e-5);
    }

    #[test]
    fn test_empty_scene_has_no_bounds() {
        assert!(Scene::new("empty").bounds().is_none());
    }
}
