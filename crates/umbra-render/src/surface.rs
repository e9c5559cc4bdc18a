//! Offscreen render surfaces and scoped binding.
//!
//! A [`RenderSurface`] owns a color target and optionally its own depth
//! target. [`RenderSurface::bind`] returns a [`SurfaceBinding`] guard; while
//! it lives, draws land in the surface, and when it drops the previous
//! target, viewport and camera aspect come back. Guards nest: each one
//! restores exactly what it captured.

use std::ops::{Deref, DerefMut};

use glam::Vec2;

use crate::backend::{ColorTargetId, DepthTargetId};
use crate::device::{RenderDevice, TargetPair};
use crate::error::DeviceError;
use crate::material::Material;
use crate::phase::PhaseMask;
use crate::quad::ScreenQuad;
use crate::state::{Color, PixelFormat, TransformKind, Viewport};

/// Creation parameters for a [`RenderSurface`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfaceDesc {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Allocate a depth target instead of sharing the primary one.
    pub own_depth: bool,
    /// Switch the camera aspect to the surface's while bound.
    pub updates_aspect_ratio: bool,
    /// Fixed-size surface that ignores display resizes.
    pub skips_main_display: bool,
}

impl SurfaceDesc {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            format: PixelFormat::Rgba8Unorm,
            own_depth: true,
            updates_aspect_ratio: true,
            skips_main_display: false,
        }
    }

    pub fn with_format(mut self, format: PixelFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_own_depth(mut self, own_depth: bool) -> Self {
        self.own_depth = own_depth;
        self
    }

    pub fn with_aspect_update(mut self, enabled: bool) -> Self {
        self.updates_aspect_ratio = enabled;
        self
    }

    pub fn detached_from_display(mut self) -> Self {
        self.skips_main_display = true;
        self
    }
}

/// An offscreen color target (plus optional depth) that can be drawn into
/// and later sampled.
pub struct RenderSurface {
    width: u32,
    height: u32,
    format: PixelFormat,
    color: ColorTargetId,
    depth: Option<DepthTargetId>,
    size_ratio: Vec2,
    viewport: Viewport,
    clear_color: Color,
    clear_color_every_frame: bool,
    clear_depth_every_frame: bool,
    updates_aspect_ratio: bool,
    skips_main_display: bool,
    phase_mask: PhaseMask,
}

impl RenderSurface {
    /// Allocate the targets and record the size ratio to the primary surface.
    pub fn new(device: &mut RenderDevice, desc: SurfaceDesc) -> Result<Self, DeviceError> {
        let color = device.create_color_target(desc.width, desc.height, desc.format)?;
        let depth = if desc.own_depth {
            match device.create_depth_target(desc.width, desc.height) {
                Ok(depth) => Some(depth),
                Err(err) => {
                    device.destroy_color_target(color);
                    return Err(err);
                }
            }
        } else {
            None
        };

        let (primary_w, primary_h) = device.primary_size();
        let size_ratio = Vec2::new(
            desc.width as f32 / primary_w as f32,
            desc.height as f32 / primary_h as f32,
        );
        log::debug!(
            "render surface {}x{} {:?} (ratio {size_ratio})",
            desc.width,
            desc.height,
            desc.format
        );

        Ok(Self {
            width: desc.width,
            height: desc.height,
            format: desc.format,
            color,
            depth,
            size_ratio,
            viewport: Viewport::full(desc.width, desc.height),
            clear_color: Color::BLACK,
            clear_color_every_frame: true,
            clear_depth_every_frame: true,
            updates_aspect_ratio: desc.updates_aspect_ratio,
            skips_main_display: desc.skips_main_display,
            phase_mask: PhaseMask::GEOMETRY,
        })
    }

    /// Make this surface the render target until the returned guard drops.
    ///
    /// Updates the camera aspect (if enabled), sets the surface viewport,
    /// binds the targets and applies the clear policy.
    pub fn bind<'d>(&self, device: &'d mut RenderDevice) -> SurfaceBinding<'d> {
        let previous_target = device.current_target();
        let previous_aspect = if self.updates_aspect_ratio {
            let previous = device.camera().aspect_ratio();
            apply_aspect(device, self.width as f32 / self.height as f32);
            Some(previous)
        } else {
            None
        };
        let previous_viewport = device.set_viewport(self.viewport);
        device.set_render_target(Some(self), true, None);

        SurfaceBinding {
            device,
            previous_target,
            previous_viewport,
            previous_aspect,
        }
    }

    /// Draw `quad` over the whole surface with depth test and writes off.
    ///
    /// The depth state comes back before the target does, on every exit path.
    pub fn render_full_screen_pass(
        &self,
        device: &mut RenderDevice,
        quad: &ScreenQuad,
        material: &dyn Material,
    ) {
        let mut target = self.bind(device);
        let mut pass = target.scoped_states();
        let depth = pass.saved().depth_stencil;
        pass.set_depth_stencil_state(depth.with_depth_test(false).with_depth_write(false));
        quad.draw(&mut pass, material);
    }

    /// Follow a display resize: new size = primary size x ratio, truncated.
    ///
    /// Target ids stay the same. Surfaces detached from the display keep their size.
    pub fn on_display_resized(&mut self, device: &mut RenderDevice) -> Result<(), DeviceError> {
        if self.skips_main_display {
            return Ok(());
        }
        let (primary_w, primary_h) = device.primary_size();
        let width = ((primary_w as f32 * self.size_ratio.x) as u32).max(1);
        let height = ((primary_h as f32 * self.size_ratio.y) as u32).max(1);

        device.resize_color_target(self.color, width, height)?;
        if let Some(depth) = self.depth {
            device.resize_depth_target(depth, width, height)?;
        }
        self.width = width;
        self.height = height;
        self.viewport = Viewport::full(width, height);
        log::debug!("render surface {:?} resized to {width}x{height}", self.color);
        Ok(())
    }

    /// Release both targets.
    pub fn destroy(self, device: &mut RenderDevice) {
        if let Some(depth) = self.depth {
            device.destroy_depth_target(depth);
        }
        device.destroy_color_target(self.color);
    }

    pub fn set_clear_color(&mut self, color: Color) {
        self.clear_color = color;
    }

    /// Choose which buffers are cleared each time the surface is bound.
    pub fn set_clear_every_frame(&mut self, color: bool, depth: bool) {
        self.clear_color_every_frame = color;
        self.clear_depth_every_frame = depth;
    }

    pub fn set_phase_mask(&mut self, mask: PhaseMask) {
        self.phase_mask = mask;
    }

    /// The color target, for sampling in later passes.
    pub fn color_target(&self) -> ColorTargetId {
        self.color
    }

    /// Own depth target, or `None` when drawing against the primary depth.
    pub fn depth_target(&self) -> Option<DepthTargetId> {
        self.depth
    }

    pub fn clear_color(&self) -> Color {
        self.clear_color
    }

    pub fn clears_color(&self) -> bool {
        self.clear_color_every_frame
    }

    pub fn clears_depth(&self) -> bool {
        self.clear_depth_every_frame
    }

    pub fn phase_mask(&self) -> PhaseMask {
        self.phase_mask
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn size_ratio(&self) -> Vec2 {
        self.size_ratio
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn updates_aspect_ratio(&self) -> bool {
        self.updates_aspect_ratio
    }

    pub fn skips_main_display(&self) -> bool {
        self.skips_main_display
    }
}

fn apply_aspect(device: &mut RenderDevice, aspect: f32) {
    device.camera_mut().set_aspect_ratio(aspect);
    let projection = device.camera().projection_matrix();
    device.set_transform(TransformKind::Projection, projection, true);
}

/// Guard returned by [`RenderSurface::bind`].
///
/// Derefs to the device. Dropping it restores the camera aspect, the
/// viewport and the render target that were active before the bind.
pub struct SurfaceBinding<'d> {
    device: &'d mut RenderDevice,
    previous_target: TargetPair,
    previous_viewport: Viewport,
    previous_aspect: Option<f32>,
}

impl SurfaceBinding<'_> {
    /// The target pair that will be rebound on drop.
    pub fn previous_target(&self) -> TargetPair {
        self.previous_target
    }
}

impl Deref for SurfaceBinding<'_> {
    type Target = RenderDevice;

    fn deref(&self) -> &RenderDevice {
        self.device
    }
}

impl DerefMut for SurfaceBinding<'_> {
    fn deref_mut(&mut self) -> &mut RenderDevice {
        self.device
    }
}

impl Drop for SurfaceBinding<'_> {
    fn drop(&mut self) {
        if let Some(aspect) = self.previous_aspect
            && self.device.camera().aspect_ratio() != aspect
        {
            apply_aspect(self.device, aspect);
        }
        self.device.set_viewport(self.previous_viewport);
        self.device.bind_target_pair(self.previous_target);
    }
}
