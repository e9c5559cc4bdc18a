//! The seam between [`RenderDevice`](crate::RenderDevice) and a graphics API.
//!
//! A backend owns every GPU object and hands out small copyable ids. It does
//! no redundancy filtering of its own: the device decides what reaches it.

mod gpu;
mod headless;

pub use gpu::{OverlayText, WgpuBackend};
pub use headless::{DeviceCall, HeadlessBackend, HeadlessProbe};

use crate::constants::FrameConstantsGpu;
use crate::error::DeviceError;
use crate::mesh::Vertex;
use crate::state::{BlendConfig, Color, DepthStencilConfig, PixelFormat, RasterConfig, Viewport};

/// Stable handle of a color target. Survives resizes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ColorTargetId(pub u32);

/// Stable handle of a depth target. Survives resizes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DepthTargetId(pub u32);

/// A realized depth, raster or blend state object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StateHandle(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProgramId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MeshId(pub u32);

/// Shader program source. WGSL with `vs_main` and `fs_main` entry points.
#[derive(Clone, Debug)]
pub struct ProgramDesc {
    pub name: String,
    pub source: String,
}

impl ProgramDesc {
    pub fn wgsl(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
        }
    }
}

/// Operations a graphics API must provide to drive a frame.
pub trait GraphicsBackend {
    /// Size of the presentable surface in pixels.
    fn primary_size(&self) -> (u32, u32);
    fn primary_color_target(&self) -> ColorTargetId;
    fn primary_depth_target(&self) -> DepthTargetId;
    /// Reconfigure the presentable surface and its depth buffer.
    fn resize_primary(&mut self, width: u32, height: u32);

    fn create_color_target(
        &mut self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<ColorTargetId, DeviceError>;
    fn create_depth_target(&mut self, width: u32, height: u32)
    -> Result<DepthTargetId, DeviceError>;
    /// Recreate the storage behind `id` at a new size. The id stays valid.
    fn resize_color_target(
        &mut self,
        id: ColorTargetId,
        width: u32,
        height: u32,
    ) -> Result<(), DeviceError>;
    fn resize_depth_target(
        &mut self,
        id: DepthTargetId,
        width: u32,
        height: u32,
    ) -> Result<(), DeviceError>;
    fn destroy_color_target(&mut self, id: ColorTargetId);
    fn destroy_depth_target(&mut self, id: DepthTargetId);

    fn bind_targets(&mut self, color: ColorTargetId, depth: DepthTargetId);
    fn clear_color(&mut self, target: ColorTargetId, color: Color);
    fn clear_depth(&mut self, target: DepthTargetId, depth: f32);
    fn set_viewport(&mut self, viewport: &Viewport);

    fn create_depth_stencil_state(
        &mut self,
        config: &DepthStencilConfig,
    ) -> Result<StateHandle, DeviceError>;
    fn create_raster_state(&mut self, config: &RasterConfig) -> Result<StateHandle, DeviceError>;
    fn create_blend_state(&mut self, config: &BlendConfig) -> Result<StateHandle, DeviceError>;
    fn bind_depth_stencil_state(&mut self, state: StateHandle);
    fn bind_raster_state(&mut self, state: StateHandle);
    fn bind_blend_state(&mut self, state: StateHandle);
    fn release_state(&mut self, state: StateHandle);

    /// Replace the constant block seen by subsequent draws.
    fn upload_frame_constants(&mut self, constants: &FrameConstantsGpu);

    fn create_program(&mut self, desc: &ProgramDesc) -> Result<ProgramId, DeviceError>;
    fn bind_program(&mut self, program: ProgramId);
    fn create_mesh(&mut self, vertices: &[Vertex], indices: &[u32])
    -> Result<MeshId, DeviceError>;
    fn destroy_mesh(&mut self, mesh: MeshId);
    /// Bind a color target for sampling, or unbind the slot.
    fn bind_texture(&mut self, slot: usize, target: Option<ColorTargetId>);
    fn draw_indexed(&mut self, mesh: MeshId, index_count: u32);
    /// Screen-space text at pixel `position` from the top-left corner.
    fn draw_text(&mut self, text: &str, position: (i32, i32), color: Color);

    /// Copy the primary color target into an offscreen target of the same size.
    fn copy_primary_to(&mut self, target: ColorTargetId) -> Result<(), DeviceError>;
    fn present(&mut self) -> Result<(), DeviceError>;
}
