//! Directional-light shadow map.

use glam::{Mat4, Vec3};
use umbra_math::Aabb;
use umbra_render::{
    Color, ColorTargetId, DeviceError, PhaseMask, PixelFormat, RenderDevice, RenderSurface,
    SurfaceDesc, TransformKind,
};

use crate::pipeline::{RenderWorld, ScenePipeline};

pub const DEFAULT_SHADOW_MAP_SIZE: u32 = 1024;

/// Padding around the caster bounds so a flat or empty scene still gets
/// a non-degenerate projection.
const FIT_MARGIN: f32 = 1.0;

/// A square depth-in-red target rendered from the light with the
/// `SHADOW_MAP` phases.
pub struct ShadowMap {
    surface: RenderSurface,
    light_direction: Vec3,
    light_view: Mat4,
    light_projection: Mat4,
}

impl ShadowMap {
    pub fn new(device: &mut RenderDevice, size: u32, light_direction: Vec3) -> Result<Self, DeviceError> {
        let size = size.max(1);
        let mut surface = RenderSurface::new(
            device,
            SurfaceDesc::new(size, size)
                .with_format(PixelFormat::R32Float)
                .with_aspect_update(false)
                .detached_from_display(),
        )?;
        surface.set_clear_color(Color::WHITE);
        surface.set_phase_mask(PhaseMask::SHADOW_MAP);

        let mut shadow = Self {
            surface,
            light_direction: Vec3::NEG_Y,
            light_view: Mat4::IDENTITY,
            light_projection: Mat4::IDENTITY,
        };
        shadow.set_light_direction(light_direction);
        shadow.update(Aabb::default());
        log::info!("shadow map ready: {size}x{size}");
        Ok(shadow)
    }

    /// Direction the light travels. A zero vector points straight down.
    pub fn set_light_direction(&mut self, direction: Vec3) {
        let direction = direction.normalize_or_zero();
        self.light_direction = if direction == Vec3::ZERO {
            Vec3::NEG_Y
        } else {
            direction
        };
    }

    /// Refit the light matrices around `bounds`.
    pub fn update(&mut self, bounds: Aabb) {
        let (view, projection) = light_matrices(self.light_direction, &bounds);
        self.light_view = view;
        self.light_projection = projection;
    }

    /// Draw the shadow casters from the light into the map.
    ///
    /// The device's view and projection are swapped for the light's while
    /// the pipeline runs and put back afterwards. The light view-projection
    /// stays on the device so receivers drawn later can sample the map.
    pub fn render(
        &self,
        device: &mut RenderDevice,
        pipeline: &mut ScenePipeline,
        world: &RenderWorld<'_>,
    ) {
        device.set_light_view_projection(self.light_view_projection());
        let mut target = self.surface.bind(device);
        let constants = target.frame_constants();
        let (view, projection) = (constants.view, constants.projection);

        target.set_shadow_pass(true);
        target.set_transform(TransformKind::View, self.light_view, false);
        target.set_transform(TransformKind::Projection, self.light_projection, true);
        pipeline.run_frame(&mut target, world, self.surface.phase_mask(), None);
        target.set_shadow_pass(false);
        target.set_transform(TransformKind::View, view, false);
        target.set_transform(TransformKind::Projection, projection, true);
    }

    pub fn color_target(&self) -> ColorTargetId {
        self.surface.color_target()
    }

    pub fn size(&self) -> u32 {
        self.surface.size().0
    }

    pub fn light_direction(&self) -> Vec3 {
        self.light_direction
    }

    pub fn light_view(&self) -> Mat4 {
        self.light_view
    }

    pub fn light_projection(&self) -> Mat4 {
        self.light_projection
    }

    pub fn light_view_projection(&self) -> Mat4 {
        self.light_projection * self.light_view
    }

    pub fn destroy(self, device: &mut RenderDevice) {
        self.surface.destroy(device);
    }
}

/// View looking along `direction` through the center of `bounds`, and an
/// orthographic projection fitted to the light-space box of its corners.
///
/// Depth maps the nearest corner to 0 and the farthest to 1.
pub fn light_matrices(direction: Vec3, bounds: &Aabb) -> (Mat4, Mat4) {
    let bounds = bounds.expand_by(FIT_MARGIN);
    let up = if direction.y.abs() > 0.99 { Vec3::Z } else { Vec3::Y };
    let view = Mat4::look_to_rh(bounds.center(), direction, up);

    let mut min = Vec3::splat(f32::MAX);
    let mut max = Vec3::splat(f32::MIN);
    for corner in bounds.corners() {
        let light_space = view.transform_point3(corner);
        min = min.min(light_space);
        max = max.max(light_space);
    }
    // Right-handed view space looks down -Z.
    let projection = Mat4::orthographic_rh(min.x, max.x, min.y, max.y, -max.z, -min.z);
    (view, projection)
}
