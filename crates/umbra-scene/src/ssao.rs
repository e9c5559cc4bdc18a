//! Screen-space ambient occlusion.
//!
//! Two offscreen surfaces: a full-size normal-depth target that shares the
//! primary depth buffer, and an occlusion target at a fraction of the display
//! size produced by a full-screen pass over the first.

use umbra_render::shaders::with_prelude;
use umbra_render::{
    Color, ColorTargetId, DepthStencilConfig, DeviceError, PixelFormat, RenderDevice,
    RenderSurface, ShaderMaterial, SurfaceDesc,
};

use crate::pipeline::RenderWorld;
use crate::shaders;

/// Normal-depth clear: no normal, view depth far beyond any occluder.
const NORMAL_DEPTH_CLEAR: Color = Color::rgba(0.0, 0.0, 0.0, 10_000.0);

/// Smallest accepted occlusion-to-display size ratio.
const MIN_RATIO: f32 = 0.1;

pub struct AmbientOcclusionPass {
    normal_depth: RenderSurface,
    occlusion: RenderSurface,
    normal_depth_material: ShaderMaterial,
    occlusion_material: ShaderMaterial,
}

impl AmbientOcclusionPass {
    /// `ratio` scales the occlusion target against the display, clamped to `0.1..=1`.
    pub fn new(device: &mut RenderDevice, ratio: f32) -> Result<Self, DeviceError> {
        let (width, height) = device.primary_size();
        let mut normal_depth = RenderSurface::new(
            device,
            SurfaceDesc::new(width, height)
                .with_format(PixelFormat::Rgba16Float)
                .with_own_depth(false),
        )?;
        normal_depth.set_clear_color(NORMAL_DEPTH_CLEAR);
        normal_depth.set_clear_every_frame(true, true);

        let ratio = ratio.clamp(MIN_RATIO, 1.0);
        let scaled = |size: u32| ((size as f32 * ratio) as u32).max(1);
        let mut occlusion = match RenderSurface::new(
            device,
            SurfaceDesc::new(scaled(width), scaled(height))
                .with_format(PixelFormat::R32Float)
                .with_own_depth(false)
                .with_aspect_update(false),
        ) {
            Ok(surface) => surface,
            Err(err) => {
                normal_depth.destroy(device);
                return Err(err);
            }
        };
        occlusion.set_clear_color(Color::WHITE);
        occlusion.set_clear_every_frame(true, false);

        let normal_depth_material = ShaderMaterial::from_wgsl(
            device,
            "normal_depth",
            &with_prelude(shaders::NORMAL_DEPTH),
        )?
        .with_depth_stencil(DepthStencilConfig::default());
        let occlusion_material = ShaderMaterial::from_wgsl(
            device,
            "ambient_occlusion",
            &with_prelude(shaders::AMBIENT_OCCLUSION),
        )?
        .with_texture(0, normal_depth.color_target());

        log::info!(
            "ambient occlusion ready: {:?} at ratio {ratio}",
            occlusion.size()
        );
        Ok(Self {
            normal_depth,
            occlusion,
            normal_depth_material,
            occlusion_material,
        })
    }

    /// Render terrain and entities into the normal-depth target, then
    /// resolve occlusion from it.
    ///
    /// Leaves the primary depth buffer holding the depth of everything drawn,
    /// so later draws can test for equality against it.
    pub fn update(&self, device: &mut RenderDevice, world: &RenderWorld<'_>) {
        {
            let mut target = self.normal_depth.bind(device);
            if let Some(terrain) = world.terrain {
                terrain.render(&mut target, Some(&self.normal_depth_material));
            }
            if let Some(scene) = world.scene {
                for entity in scene.entities() {
                    entity.render(&mut target, Some(&self.normal_depth_material));
                }
            }
        }
        self.occlusion
            .render_full_screen_pass(device, world.quad, &self.occlusion_material);
    }

    /// Occlusion target, one channel, white where unoccluded.
    pub fn occlusion_target(&self) -> ColorTargetId {
        self.occlusion.color_target()
    }

    pub fn normal_depth_target(&self) -> ColorTargetId {
        self.normal_depth.color_target()
    }

    pub fn occlusion_size(&self) -> (u32, u32) {
        self.occlusion.size()
    }

    /// Follow a display resize. Target ids are kept, so materials sampling
    /// them stay valid.
    pub fn on_display_resized(&mut self, device: &mut RenderDevice) -> Result<(), DeviceError> {
        self.normal_depth.on_display_resized(device)?;
        self.occlusion.on_display_resized(device)
    }

    pub fn destroy(self, device: &mut RenderDevice) {
        self.normal_depth.destroy(device);
        self.occlusion.destroy(device);
    }
}
