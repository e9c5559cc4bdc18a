//! Drawable scene entities.

use std::rc::Rc;

use umbra_render::{Geometry, Material, RenderDevice, TransformKind};

use crate::transform::TransformNode;

/// A transform node plus the flags and material that decide how it is drawn.
pub struct Entity {
    node: TransformNode,
    cast_shadow: bool,
    receive_shadow: bool,
    material: Option<Rc<dyn Material>>,
}

impl Entity {
    pub fn new(geometry: Rc<dyn Geometry>) -> Self {
        Self::from_node(TransformNode::new(geometry))
    }

    pub fn from_node(node: TransformNode) -> Self {
        Self {
            node,
            cast_shadow: true,
            receive_shadow: true,
            material: None,
        }
    }

    pub fn node(&self) -> &TransformNode {
        &self.node
    }

    pub fn node_mut(&mut self) -> &mut TransformNode {
        &mut self.node
    }

    pub fn cast_shadow(&self) -> bool {
        self.cast_shadow
    }

    pub fn set_cast_shadow(&mut self, enabled: bool) {
        self.cast_shadow = enabled;
    }

    /// Whether materials that sample the shadow map darken this entity.
    pub fn receive_shadow(&self) -> bool {
        self.receive_shadow
    }

    pub fn set_receive_shadow(&mut self, enabled: bool) {
        self.receive_shadow = enabled;
    }

    /// Material used instead of the geometry's own when no override is passed.
    pub fn set_material(&mut self, material: Option<Rc<dyn Material>>) {
        self.material = material;
    }

    pub fn material(&self) -> Option<&Rc<dyn Material>> {
        self.material.as_ref()
    }

    /// Refresh world bounds from the current transform.
    pub fn update(&mut self) {
        self.node.update_world_bounds();
    }

    /// Push the shadow-receiver flag and world transforms, then draw.
    ///
    /// `material` wins over the entity's material, which wins over the
    /// geometry's batch materials.
    pub fn render(&self, device: &mut RenderDevice, material: Option<&dyn Material>) {
        device.set_shadow_receiver(self.receive_shadow);
        device.set_transform(TransformKind::World, self.node.world_matrix(), false);
        device.set_transform(
            TransformKind::WorldInverseTranspose,
            self.node.world_inverse_transpose(),
            true,
        );
        let material = material.or(self.material.as_deref());
        self.node.geometry().submit_draw(device, material);
    }
}
