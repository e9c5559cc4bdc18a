//! Render device state machine, offscreen surfaces and the drawable types
//! the scene layer builds on.

pub mod backend;
mod camera;
mod constants;
mod device;
mod error;
mod material;
mod mesh;
mod phase;
mod quad;
mod registry;
pub mod shaders;
mod state;
mod surface;

pub use backend::{
    ColorTargetId, DepthTargetId, DeviceCall, GraphicsBackend, HeadlessBackend, HeadlessProbe,
    MeshId, OverlayText, ProgramDesc, ProgramId, StateHandle, WgpuBackend,
};
pub use camera::{Camera, Projection};
pub use constants::{FrameConstants, FrameConstantsGpu};
pub use device::{DEPTH_CLEAR, MAX_TEXTURE_SLOTS, RenderDevice, StateScope, TargetPair};
pub use error::{DeviceError, RegistryError};
pub use material::{Material, ShaderMaterial};
pub use mesh::{Geometry, Mesh, MeshData, SubMesh, Vertex};
pub use phase::{PhaseMask, UnknownPhase};
pub use quad::{QUAD_INDICES, ScreenQuad};
pub use registry::AssetRegistry;
pub use state::{
    BlendConfig, Color, CompareFunction, CullMode, DepthStencilConfig, FillMode, PixelFormat,
    RasterConfig, RenderStates, TransformKind, Viewport,
};
pub use surface::{RenderSurface, SurfaceBinding, SurfaceDesc};
