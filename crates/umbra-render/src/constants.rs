//! Per-frame shader constants.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use umbra_math::Plane;

use crate::state::TransformKind;

/// CPU-side constant block shared by every draw in a frame.
///
/// `world_view_projection` is derived and only valid after
/// [`recompute_combined`](Self::recompute_combined).
#[derive(Clone, Debug, PartialEq)]
pub struct FrameConstants {
    pub world: Mat4,
    pub world_inverse_transpose: Mat4,
    pub view: Mat4,
    pub projection: Mat4,
    pub world_view_projection: Mat4,
    /// Light view-projection of the shadow map, for receivers to sample it.
    pub light_view_projection: Mat4,
    pub camera_position: Vec3,
    pub light_direction: Vec3,
    pub light_color: Vec3,
    pub ambient_color: Vec3,
    pub clip_plane: Option<Plane>,
    /// Seconds since start.
    pub time: f32,
    /// Whether the next draw darkens where the shadow map says it is occluded.
    pub receive_shadow: bool,
    /// Set while drawing into the shadow map; lit programs then output depth.
    pub shadow_pass: bool,
}

impl Default for FrameConstants {
    fn default() -> Self {
        Self {
            world: Mat4::IDENTITY,
            world_inverse_transpose: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            world_view_projection: Mat4::IDENTITY,
            light_view_projection: Mat4::IDENTITY,
            camera_position: Vec3::ZERO,
            light_direction: Vec3::new(1.0, -1.0, 2.0).normalize(),
            light_color: Vec3::splat(0.8),
            ambient_color: Vec3::splat(0.2),
            clip_plane: None,
            time: 0.0,
            receive_shadow: true,
            shadow_pass: false,
        }
    }
}

impl FrameConstants {
    pub fn set_transform(&mut self, kind: TransformKind, matrix: Mat4) {
        match kind {
            TransformKind::World => self.world = matrix,
            TransformKind::WorldInverseTranspose => self.world_inverse_transpose = matrix,
            TransformKind::View => self.view = matrix,
            TransformKind::Projection => self.projection = matrix,
        }
    }

    /// `WVP = projection * view * world`.
    pub fn recompute_combined(&mut self) {
        self.world_view_projection = self.projection * self.view * self.world;
    }

    /// Pack into the layout the shaders read.
    ///
    /// glam matrices are column-major like WGSL, so no transpose happens here.
    pub fn to_gpu(&self) -> FrameConstantsGpu {
        let (clip_plane, clip_enabled) = match self.clip_plane {
            Some(plane) => (plane.to_vec4().to_array(), 1.0),
            None => ([0.0; 4], 0.0),
        };
        FrameConstantsGpu {
            world: self.world.to_cols_array_2d(),
            world_inverse_transpose: self.world_inverse_transpose.to_cols_array_2d(),
            view: self.view.to_cols_array_2d(),
            projection: self.projection.to_cols_array_2d(),
            world_view_projection: self.world_view_projection.to_cols_array_2d(),
            light_view_projection: self.light_view_projection.to_cols_array_2d(),
            camera_position: self.camera_position.extend(1.0).to_array(),
            light_direction: self.light_direction.extend(0.0).to_array(),
            light_color: self.light_color.extend(1.0).to_array(),
            ambient_color: self.ambient_color.extend(1.0).to_array(),
            clip_plane,
            params: [
                self.time,
                clip_enabled,
                flag(self.receive_shadow),
                flag(self.shadow_pass),
            ],
        }
    }
}

fn flag(value: bool) -> f32 {
    if value { 1.0 } else { 0.0 }
}

/// GPU layout of [`FrameConstants`], 480 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct FrameConstantsGpu {
    pub world: [[f32; 4]; 4],
    pub world_inverse_transpose: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    pub world_view_projection: [[f32; 4]; 4],
    pub light_view_projection: [[f32; 4]; 4],
    pub camera_position: [f32; 4],
    pub light_direction: [f32; 4],
    pub light_color: [f32; 4],
    pub ambient_color: [f32; 4],
    pub clip_plane: [f32; 4],
    /// x = time, y = clip plane enabled, z = receives shadow, w = shadow pass.
    /// Flags are 0 or 1.
    pub params: [f32; 4],
}

impl FrameConstantsGpu {
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;

    pub fn world_view_projection(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.world_view_projection)
    }

    pub fn light_view_projection(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.light_view_projection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    #[test]
    fn test_gpu_layout_size() {
        assert_eq!(FrameConstantsGpu::SIZE, 480);
        assert_eq!(FrameConstantsGpu::SIZE % 16, 0);
    }

    #[test]
    fn test_recompute_combined_order() {
        let mut constants = FrameConstants::default();
        let world = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let view = Mat4::from_quat(Quat::from_rotation_y(0.3));
        let projection = Mat4::perspective_rh(1.0, 1.5, 0.1, 100.0);
        constants.set_transform(TransformKind::World, world);
        constants.set_transform(TransformKind::View, view);
        constants.set_transform(TransformKind::Projection, projection);
        constants.recompute_combined();
        assert_eq!(constants.world_view_projection, projection * view * world);
    }

    #[test]
    fn test_set_transform_does_not_touch_combined() {
        let mut constants = FrameConstants::default();
        constants.set_transform(TransformKind::World, Mat4::from_scale(Vec3::splat(2.0)));
        assert_eq!(constants.world_view_projection, Mat4::IDENTITY);
    }

    #[test]
    fn test_clip_plane_packs_enabled_flag() {
        let mut constants = FrameConstants::default();
        assert_eq!(constants.to_gpu().params[1], 0.0);

        constants.clip_plane = Some(Plane::horizontal(2.0));
        let gpu = constants.to_gpu();
        assert_eq!(gpu.params[1], 1.0);
        assert_eq!(gpu.clip_plane, [0.0, 1.0, 0.0, -2.0]);
    }

    #[test]
    fn test_shadow_flags_pack_into_params() {
        let mut constants = FrameConstants::default();
        let gpu = constants.to_gpu();
        assert_eq!((gpu.params[2], gpu.params[3]), (1.0, 0.0));

        constants.receive_shadow = false;
        constants.shadow_pass = true;
        constants.light_view_projection = Mat4::from_scale(Vec3::splat(0.5));
        let gpu = constants.to_gpu();
        assert_eq!((gpu.params[2], gpu.params[3]), (0.0, 1.0));
        assert_eq!(gpu.light_view_projection(), Mat4::from_scale(Vec3::splat(0.5)));
    }

    #[test]
    fn test_default_light_is_normalized_sun() {
        let constants = FrameConstants::default();
        assert!((constants.light_direction.length() - 1.0).abs() < 1e-6);
        assert_eq!(constants.ambient_color, Vec3::splat(0.2));
    }
}
