//! Scene-node transforms with lazily recomputed world matrices and bounds.

use std::cell::Cell;
use std::rc::Rc;

use glam::{Mat4, Quat, Vec3};
use umbra_math::Aabb;
use umbra_render::Geometry;

/// Half-thickness added on each side of an axis along which the local
/// bounds have no extent (e.g. a ground plane).
pub const DEGENERATE_BOUNDS_MARGIN: f32 = 0.5;

/// Position, rotation and non-uniform scale of one piece of geometry.
///
/// Setters only mark the node dirty. The world matrix and its
/// inverse-transpose are rebuilt on the next read, so any number of setter
/// calls between two draws costs one recomputation. The caches use `Cell`
/// so reads work through `&self` while a scene is being drawn.
pub struct TransformNode {
    geometry: Rc<dyn Geometry>,
    position: Vec3,
    rotation: Quat,
    scale: Vec3,
    dirty: Cell<bool>,
    world: Cell<Mat4>,
    world_inverse_transpose: Cell<Mat4>,
    recomputes: Cell<u64>,
    local_bounds: Aabb,
    world_bounds: Aabb,
    updates_bounds: bool,
}

impl TransformNode {
    /// Node at the origin with local bounds taken from `geometry`'s vertices.
    pub fn new(geometry: Rc<dyn Geometry>) -> Self {
        let mut node = Self::without_bounds(geometry);
        node.updates_bounds = true;
        node.local_bounds = node.compute_local_bounds();
        node.world_bounds = node.local_bounds;
        node
    }

    /// Node that never computes or updates bounds.
    pub fn without_bounds(geometry: Rc<dyn Geometry>) -> Self {
        Self {
            geometry,
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            dirty: Cell::new(true),
            world: Cell::new(Mat4::IDENTITY),
            world_inverse_transpose: Cell::new(Mat4::IDENTITY),
            recomputes: Cell::new(0),
            local_bounds: Aabb::default(),
            world_bounds: Aabb::default(),
            updates_bounds: false,
        }
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.dirty.set(true);
    }

    pub fn set_rotation(&mut self, rotation: Quat) {
        self.rotation = rotation;
        self.dirty.set(true);
    }

    pub fn set_scale(&mut self, scale: Vec3) {
        self.scale = scale;
        self.dirty.set(true);
    }

    pub fn set_uniform_scale(&mut self, scale: f32) {
        self.set_scale(Vec3::splat(scale));
    }

    /// `T * R * S`, recomputed first if any setter ran since the last read.
    pub fn world_matrix(&self) -> Mat4 {
        self.resolve();
        self.world.get()
    }

    /// Inverse-transpose of the world matrix, for transforming normals.
    pub fn world_inverse_transpose(&self) -> Mat4 {
        self.resolve();
        self.world_inverse_transpose.get()
    }

    fn resolve(&self) {
        if !self.dirty.get() {
            return;
        }
        let world = Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position);
        self.world.set(world);
        self.world_inverse_transpose.set(world.inverse().transpose());
        self.recomputes.set(self.recomputes.get() + 1);
        self.dirty.set(false);
    }

    /// Bounds of every vertex of every batch, thickened on flat axes.
    ///
    /// Empty geometry yields a zero box at the origin (thickened likewise).
    pub fn compute_local_bounds(&self) -> Aabb {
        Aabb::from_points(self.geometry.positions())
            .unwrap_or_default()
            .thicken_planar_axes(DEGENERATE_BOUNDS_MARGIN)
    }

    /// Transform the local bounds into world space, if this node tracks bounds.
    pub fn update_world_bounds(&mut self) {
        if !self.updates_bounds {
            return;
        }
        let world = self.world_matrix();
        self.world_bounds = self.local_bounds.transformed(&world);
    }

    /// Override the local bounds, e.g. for a node created without them.
    pub fn set_local_bounds(&mut self, bounds: Aabb) {
        self.local_bounds = bounds;
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    pub fn geometry(&self) -> &Rc<dyn Geometry> {
        &self.geometry
    }

    pub fn local_bounds(&self) -> Aabb {
        self.local_bounds
    }

    /// World bounds as of the last [`update_world_bounds`](Self::update_world_bounds).
    pub fn world_bounds(&self) -> Aabb {
        self.world_bounds
    }

    pub fn updates_bounds(&self) -> bool {
        self.updates_bounds
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    /// How many times the world matrix has been rebuilt.
    pub fn recompute_count(&self) -> u64 {
        self.recomputes.get()
    }
}
