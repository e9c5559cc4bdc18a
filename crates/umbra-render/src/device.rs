//! The render device: the single owner of GPU pipeline state.
//!
//! [`RenderDevice`] tracks the bound render target pair, the viewport, the
//! depth/raster/blend configuration and the frame constant block, and only
//! forwards a change to its [`GraphicsBackend`] when the value actually
//! differs from what is bound.

use std::ops::{Deref, DerefMut};

use glam::{Mat4, Vec3};
use umbra_math::Plane;

use crate::backend::{
    ColorTargetId, DepthTargetId, GraphicsBackend, MeshId, ProgramDesc, ProgramId, StateHandle,
};
use crate::camera::Camera;
use crate::constants::FrameConstants;
use crate::error::DeviceError;
use crate::mesh::Vertex;
use crate::state::{
    BlendConfig, Color, DepthStencilConfig, PixelFormat, RasterConfig, RenderStates,
    TransformKind, Viewport,
};
use crate::surface::RenderSurface;

/// Number of texture slots a material can bind.
pub const MAX_TEXTURE_SLOTS: usize = 4;

/// Depth value the depth buffer is cleared to.
pub const DEPTH_CLEAR: f32 = 1.0;

/// A color target together with the depth target drawn alongside it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TargetPair {
    pub color: ColorTargetId,
    pub depth: DepthTargetId,
}

/// A state configuration and the backend object realizing it.
#[derive(Clone, Copy, Debug)]
struct Cached<T> {
    config: T,
    handle: StateHandle,
}

/// Owner of the backend and of all state bound on it.
pub struct RenderDevice {
    backend: Box<dyn GraphicsBackend>,
    camera: Camera,
    primary: TargetPair,
    current: TargetPair,
    viewport: Viewport,
    depth_stencil: Cached<DepthStencilConfig>,
    raster: Cached<RasterConfig>,
    blend: Cached<BlendConfig>,
    constants: FrameConstants,
    background: Color,
    textures: [Option<ColorTargetId>; MAX_TEXTURE_SLOTS],
    program: Option<ProgramId>,
}

impl RenderDevice {
    /// Realize the default states, bind the primary target with a full
    /// viewport and upload the initial constants.
    ///
    /// # Errors
    ///
    /// Any backend failure. The device is unusable in that case.
    pub fn new(mut backend: Box<dyn GraphicsBackend>, camera: Camera) -> Result<Self, DeviceError> {
        let (width, height) = backend.primary_size();
        let primary = TargetPair {
            color: backend.primary_color_target(),
            depth: backend.primary_depth_target(),
        };

        let raster_config = RasterConfig::default();
        let raster = Cached {
            config: raster_config,
            handle: backend.create_raster_state(&raster_config)?,
        };
        let depth_config = DepthStencilConfig::default();
        let depth_stencil = Cached {
            config: depth_config,
            handle: backend.create_depth_stencil_state(&depth_config)?,
        };
        let blend_config = BlendConfig::default();
        let blend = Cached {
            config: blend_config,
            handle: backend.create_blend_state(&blend_config)?,
        };
        backend.bind_raster_state(raster.handle);
        backend.bind_depth_stencil_state(depth_stencil.handle);
        backend.bind_blend_state(blend.handle);

        let viewport = Viewport::full(width, height);
        backend.set_viewport(&viewport);
        backend.bind_targets(primary.color, primary.depth);

        let mut device = Self {
            backend,
            camera,
            primary,
            current: primary,
            viewport,
            depth_stencil,
            raster,
            blend,
            constants: FrameConstants::default(),
            background: Color::DEEP_BLUE,
            textures: [None; MAX_TEXTURE_SLOTS],
            program: None,
        };
        device.camera.set_aspect_ratio(width as f32 / height as f32);
        device.constants.view = device.camera.view_matrix();
        device.constants.projection = device.camera.projection_matrix();
        device.constants.camera_position = device.camera.position;
        device.constants.recompute_combined();
        device.upload_constants();

        log::info!("Render device ready: {width}x{height}");
        Ok(device)
    }

    // -----------------------------------------------------------------------
    // Render targets and viewport
    // -----------------------------------------------------------------------

    /// Bind `surface` (or the primary target for `None`) and optionally clear it.
    ///
    /// A surface without its own depth buffer draws against the primary depth
    /// target. When `clear` is set, a surface applies its own clear flags and
    /// color; `clear_color` overrides the color. The primary target always
    /// clears both color (background unless overridden) and depth.
    pub fn set_render_target(
        &mut self,
        surface: Option<&RenderSurface>,
        clear: bool,
        clear_color: Option<Color>,
    ) {
        match surface {
            Some(surface) => {
                let pair = TargetPair {
                    color: surface.color_target(),
                    depth: surface.depth_target().unwrap_or(self.primary.depth),
                };
                self.bind_target_pair(pair);
                if clear {
                    if surface.clears_color() {
                        let color = clear_color.unwrap_or(surface.clear_color());
                        self.backend.clear_color(pair.color, color);
                    }
                    if surface.clears_depth() {
                        self.backend.clear_depth(pair.depth, DEPTH_CLEAR);
                    }
                }
            }
            None => {
                let pair = self.primary;
                self.bind_target_pair(pair);
                if clear {
                    let color = clear_color.unwrap_or(self.background);
                    self.backend.clear_color(pair.color, color);
                    self.backend.clear_depth(pair.depth, DEPTH_CLEAR);
                }
            }
        }
    }

    /// Rebind a previously captured target pair without clearing.
    pub fn bind_target_pair(&mut self, pair: TargetPair) {
        self.backend.bind_targets(pair.color, pair.depth);
        self.current = pair;
    }

    /// Apply `viewport` and return the one it replaced.
    pub fn set_viewport(&mut self, viewport: Viewport) -> Viewport {
        self.backend.set_viewport(&viewport);
        std::mem::replace(&mut self.viewport, viewport)
    }

    // -----------------------------------------------------------------------
    // Pipeline state
    // -----------------------------------------------------------------------

    /// Bind a depth configuration unless it is already bound.
    ///
    /// # Panics
    ///
    /// If the backend cannot realize the state object.
    pub fn set_depth_stencil_state(&mut self, config: DepthStencilConfig) {
        if self.depth_stencil.config == config {
            return;
        }
        let handle = match self.backend.create_depth_stencil_state(&config) {
            Ok(handle) => handle,
            Err(err) => panic!("failed to realize depth-stencil state {config:?}: {err}"),
        };
        self.backend.bind_depth_stencil_state(handle);
        self.backend.release_state(self.depth_stencil.handle);
        log::debug!("depth-stencil state -> {config:?}");
        self.depth_stencil = Cached { config, handle };
    }

    /// Bind a rasterizer configuration unless it is already bound.
    ///
    /// # Panics
    ///
    /// If the backend cannot realize the state object.
    pub fn set_raster_state(&mut self, config: RasterConfig) {
        if self.raster.config == config {
            return;
        }
        let handle = match self.backend.create_raster_state(&config) {
            Ok(handle) => handle,
            Err(err) => panic!("failed to realize raster state {config:?}: {err}"),
        };
        self.backend.bind_raster_state(handle);
        self.backend.release_state(self.raster.handle);
        log::debug!("raster state -> {config:?}");
        self.raster = Cached { config, handle };
    }

    /// Bind a blend configuration unless it is already bound.
    ///
    /// # Panics
    ///
    /// If the backend cannot realize the state object.
    pub fn set_blend_state(&mut self, config: BlendConfig) {
        if self.blend.config == config {
            return;
        }
        let handle = match self.backend.create_blend_state(&config) {
            Ok(handle) => handle,
            Err(err) => panic!("failed to realize blend state {config:?}: {err}"),
        };
        self.backend.bind_blend_state(handle);
        self.backend.release_state(self.blend.handle);
        log::debug!("blend state -> {config:?}");
        self.blend = Cached { config, handle };
    }

    /// Snapshot of the bound depth, raster and blend configurations.
    pub fn render_states(&self) -> RenderStates {
        RenderStates {
            depth_stencil: self.depth_stencil.config,
            raster: self.raster.config,
            blend: self.blend.config,
        }
    }

    /// Re-apply a snapshot from [`render_states`](Self::render_states).
    pub fn restore_render_states(&mut self, states: RenderStates) {
        self.set_depth_stencil_state(states.depth_stencil);
        self.set_raster_state(states.raster);
        self.set_blend_state(states.blend);
    }

    /// Snapshot the bound states and hand back a guard that re-applies them
    /// when it drops, unwinding included.
    pub fn scoped_states(&mut self) -> StateScope<'_> {
        let saved = self.render_states();
        StateScope {
            device: self,
            saved,
        }
    }

    // -----------------------------------------------------------------------
    // Frame constants
    // -----------------------------------------------------------------------

    /// Store a transform. With `recompute_combined` the world-view-projection
    /// is rebuilt and the whole block uploaded.
    pub fn set_transform(&mut self, kind: TransformKind, matrix: Mat4, recompute_combined: bool) {
        self.constants.set_transform(kind, matrix);
        if recompute_combined {
            self.constants.recompute_combined();
            self.upload_constants();
        }
    }

    /// Per-frame constants: time, camera position and matrices, identity
    /// world. One upload.
    pub fn update_frame(&mut self, elapsed_seconds: f32) {
        let constants = &mut self.constants;
        constants.time = elapsed_seconds;
        constants.camera_position = self.camera.position;
        constants.world = Mat4::IDENTITY;
        constants.world_inverse_transpose = Mat4::IDENTITY;
        constants.view = self.camera.view_matrix();
        constants.projection = self.camera.projection_matrix();
        constants.recompute_combined();
        self.upload_constants();
    }

    /// Light parameters, uploaded with the next constant push.
    pub fn set_lighting(&mut self, direction: Vec3, color: Vec3, ambient: Vec3) {
        self.constants.light_direction = direction.normalize_or_zero();
        self.constants.light_color = color;
        self.constants.ambient_color = ambient;
    }

    /// Enable or disable the user clip plane.
    ///
    /// Enabling uploads the block right away. Disabling reaches the GPU with
    /// the next constant push.
    pub fn enable_clip_plane(&mut self, plane: Option<Plane>) {
        self.constants.clip_plane = plane;
        if plane.is_some() {
            self.upload_constants();
        }
    }

    /// Light view-projection the shadow map was rendered with, uploaded with
    /// the next constant push.
    pub fn set_light_view_projection(&mut self, matrix: Mat4) {
        self.constants.light_view_projection = matrix;
    }

    /// Whether following draws sample the shadow map. Uploaded with the next
    /// constant push, so set it before the draw's world transforms.
    pub fn set_shadow_receiver(&mut self, enabled: bool) {
        self.constants.receive_shadow = enabled;
    }

    /// Mark draws as going into the shadow map. Uploaded with the next
    /// constant push.
    pub fn set_shadow_pass(&mut self, enabled: bool) {
        self.constants.shadow_pass = enabled;
    }

    fn upload_constants(&mut self) {
        self.backend.upload_frame_constants(&self.constants.to_gpu());
    }

    // -----------------------------------------------------------------------
    // Frame boundaries
    // -----------------------------------------------------------------------

    /// Bind the primary target and clear it to the background color and depth 1.0.
    pub fn begin_frame(&mut self) {
        self.set_render_target(None, true, None);
    }

    /// Present the frame.
    ///
    /// # Errors
    ///
    /// [`DeviceError::PresentRejected`] when the backend refuses the frame.
    pub fn end_frame(&mut self) -> Result<(), DeviceError> {
        self.backend.present().map_err(|err| match err {
            DeviceError::PresentRejected(reason) => DeviceError::PresentRejected(reason),
            other => DeviceError::PresentRejected(other.to_string()),
        })
    }

    /// Resize the primary surface: full viewport, new camera aspect, fresh projection.
    pub fn resize_primary(&mut self, width: u32, height: u32) {
        let (width, height) = (width.max(1), height.max(1));
        self.backend.resize_primary(width, height);
        self.set_viewport(Viewport::full(width, height));
        self.camera.set_aspect_ratio(width as f32 / height as f32);
        let projection = self.camera.projection_matrix();
        self.set_transform(TransformKind::Projection, projection, true);
        log::debug!("primary surface resized to {width}x{height}");
    }

    // -----------------------------------------------------------------------
    // Draw helpers
    // -----------------------------------------------------------------------

    /// Make `program` current for the next draws. Rebinding the bound
    /// program is skipped.
    pub fn bind_program(&mut self, program: ProgramId) {
        if self.program != Some(program) {
            self.backend.bind_program(program);
            self.program = Some(program);
        }
    }

    /// Bind a color target for sampling in `slot`. Redundant binds are skipped.
    ///
    /// # Panics
    ///
    /// If `slot >= MAX_TEXTURE_SLOTS`.
    pub fn bind_texture(&mut self, slot: usize, target: Option<ColorTargetId>) {
        assert!(slot < MAX_TEXTURE_SLOTS, "texture slot {slot} out of range");
        if self.textures[slot] != target {
            self.backend.bind_texture(slot, target);
            self.textures[slot] = target;
        }
    }

    /// Draw `index_count` indices of `mesh` with everything currently bound.
    pub fn draw_indexed(&mut self, mesh: MeshId, index_count: u32) {
        self.backend.draw_indexed(mesh, index_count);
    }

    /// Queue overlay text at a pixel position measured from the top-left corner.
    pub fn draw_text(&mut self, text: &str, position: (i32, i32), color: Color) {
        self.backend.draw_text(text, position, color);
    }

    /// Copy what has been drawn into the primary color target so far into
    /// `target`, e.g. for refraction.
    ///
    /// # Errors
    ///
    /// An unknown target, or one whose size or format differs from the primary.
    pub fn copy_primary_to(&mut self, target: ColorTargetId) -> Result<(), DeviceError> {
        self.backend.copy_primary_to(target)
    }

    // -----------------------------------------------------------------------
    // Resources
    // -----------------------------------------------------------------------

    /// Compile a shader program.
    ///
    /// # Errors
    ///
    /// [`DeviceError::ResourceCreation`] when the backend rejects the source.
    pub fn create_program(&mut self, desc: &ProgramDesc) -> Result<ProgramId, DeviceError> {
        self.backend.create_program(desc)
    }

    /// Upload vertex and index buffers.
    pub fn create_mesh(&mut self, vertices: &[Vertex], indices: &[u32]) -> Result<MeshId, DeviceError> {
        self.backend.create_mesh(vertices, indices)
    }

    /// Release a mesh's buffers. The id must not be drawn afterwards.
    pub fn destroy_mesh(&mut self, mesh: MeshId) {
        self.backend.destroy_mesh(mesh);
    }

    /// Allocate an offscreen color target that can be rendered to and sampled.
    pub fn create_color_target(
        &mut self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<ColorTargetId, DeviceError> {
        self.backend.create_color_target(width, height, format)
    }

    /// Allocate a depth target for an offscreen surface.
    pub fn create_depth_target(&mut self, width: u32, height: u32) -> Result<DepthTargetId, DeviceError> {
        self.backend.create_depth_target(width, height)
    }

    /// Reallocate a color target at a new size. The id stays valid.
    pub fn resize_color_target(
        &mut self,
        id: ColorTargetId,
        width: u32,
        height: u32,
    ) -> Result<(), DeviceError> {
        self.backend.resize_color_target(id, width, height)
    }

    /// Reallocate a depth target at a new size. The id stays valid.
    pub fn resize_depth_target(
        &mut self,
        id: DepthTargetId,
        width: u32,
        height: u32,
    ) -> Result<(), DeviceError> {
        self.backend.resize_depth_target(id, width, height)
    }

    /// Destroy a color target and unbind it from any texture slot.
    pub fn destroy_color_target(&mut self, id: ColorTargetId) {
        for slot in 0..MAX_TEXTURE_SLOTS {
            if self.textures[slot] == Some(id) {
                self.bind_texture(slot, None);
            }
        }
        self.backend.destroy_color_target(id);
    }

    /// Release a depth target.
    pub fn destroy_depth_target(&mut self, id: DepthTargetId) {
        self.backend.destroy_depth_target(id);
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// The camera whose matrices [`update_frame`](Self::update_frame) pushes.
    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    /// Mutable camera. Matrices reach the GPU on the next
    /// [`update_frame`](Self::update_frame) or `set_transform`.
    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    /// Current size of the primary (window) surface in pixels.
    pub fn primary_size(&self) -> (u32, u32) {
        self.backend.primary_size()
    }

    /// The swapchain-backed target pair bound by [`begin_frame`](Self::begin_frame).
    pub fn primary_target(&self) -> TargetPair {
        self.primary
    }

    /// The target pair draws currently land in.
    pub fn current_target(&self) -> TargetPair {
        self.current
    }

    /// The viewport last passed to [`set_viewport`](Self::set_viewport).
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// The bound depth configuration.
    ///
    /// Phases derive their overrides from it with the `with_*` builders.
    pub fn depth_stencil_state(&self) -> DepthStencilConfig {
        self.depth_stencil.config
    }

    /// The bound rasterizer configuration.
    pub fn raster_state(&self) -> RasterConfig {
        self.raster.config
    }

    /// The bound blend configuration.
    pub fn blend_state(&self) -> BlendConfig {
        self.blend.config
    }

    /// CPU copy of the constant block. The GPU copy may be older: only
    /// pushes with `recompute_combined`, `update_frame` and an enabled clip
    /// plane upload it.
    pub fn frame_constants(&self) -> &FrameConstants {
        &self.constants
    }

    /// Color target sampled in `slot`, or `None` for empty or out-of-range slots.
    pub fn bound_texture(&self, slot: usize) -> Option<ColorTargetId> {
        self.textures.get(slot).copied().flatten()
    }

    /// Color the primary target is cleared to at the start of a frame.
    pub fn background_color(&self) -> Color {
        self.background
    }

    /// Change the primary clear color. Takes effect at the next
    /// [`begin_frame`](Self::begin_frame).
    pub fn set_background_color(&mut self, color: Color) {
        self.background = color;
    }
}

/// Guard returned by [`RenderDevice::scoped_states`].
///
/// Derefs to the device. Dropping it re-applies the depth, raster and blend
/// states bound when it was created.
pub struct StateScope<'d> {
    device: &'d mut RenderDevice,
    saved: RenderStates,
}

impl StateScope<'_> {
    /// The states that come back on drop.
    pub fn saved(&self) -> RenderStates {
        self.saved
    }
}

impl Deref for StateScope<'_> {
    type Target = RenderDevice;

    fn deref(&self) -> &RenderDevice {
        self.device
    }
}

impl DerefMut for StateScope<'_> {
    fn deref_mut(&mut self) -> &mut RenderDevice {
        self.device
    }
}

impl Drop for StateScope<'_> {
    fn drop(&mut self) {
        self.device.restore_render_states(self.saved);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DeviceCall, HeadlessBackend, HeadlessProbe};
    use crate::state::{CompareFunction, CullMode, FillMode};
    use glam::Quat;

    fn headless(width: u32, height: u32) -> (RenderDevice, HeadlessProbe) {
        let backend = HeadlessBackend::new(width, height);
        let probe = backend.probe();
        let device = RenderDevice::new(Box::new(backend), Camera::default()).unwrap();
        (device, probe)
    }

    fn approx_eq(a: Mat4, b: Mat4) -> bool {
        a.abs_diff_eq(b, 1e-5)
    }

    #[test]
    fn test_init_realizes_default_states() {
        let (device, probe) = headless(1920, 1080);
        assert_eq!(device.depth_stencil_state(), DepthStencilConfig::default());
        assert_eq!(device.raster_state(), RasterConfig::default());
        assert_eq!(device.blend_state(), BlendConfig::Opaque);
        assert_eq!(device.viewport(), Viewport::full(1920, 1080));
        assert_eq!(device.current_target(), device.primary_target());
        assert_eq!(probe.live_states(), 3);
        assert!(probe.last_constants().is_some());
        assert!((device.camera().aspect_ratio() - 1920.0 / 1080.0).abs() < 1e-6);
    }

    #[test]
    fn test_redundant_depth_state_never_reaches_backend() {
        let (mut device, probe) = headless(800, 600);
        probe.take_calls();
        let equal = DepthStencilConfig::default()
            .with_compare(CompareFunction::Equal)
            .with_depth_write(false);

        device.set_depth_stencil_state(equal);
        device.set_depth_stencil_state(equal);
        device.set_depth_stencil_state(equal);

        let created = probe.count(|c| matches!(c, DeviceCall::CreateDepthStencilState(..)));
        assert_eq!(created, 1);
        assert_eq!(probe.count(|c| matches!(c, DeviceCall::ReleaseState(_))), 1);
        assert_eq!(probe.live_states(), 3);
    }

    #[test]
    fn test_redundant_raster_state_never_reaches_backend() {
        let (mut device, probe) = headless(800, 600);
        probe.take_calls();
        let wireframe = RasterConfig::default()
            .with_fill(FillMode::Wireframe)
            .with_cull(CullMode::None);

        device.set_raster_state(wireframe);
        device.set_raster_state(wireframe);

        assert_eq!(probe.count(|c| matches!(c, DeviceCall::CreateRasterState(..))), 1);
        assert_eq!(probe.count(|c| matches!(c, DeviceCall::BindRasterState(_))), 1);
        assert_eq!(device.raster_state(), wireframe);
        assert_eq!(probe.live_states(), 3);
    }

    #[test]
    fn test_redundant_blend_state_never_reaches_backend() {
        let (mut device, probe) = headless(800, 600);
        probe.take_calls();

        device.set_blend_state(BlendConfig::Additive);
        device.set_blend_state(BlendConfig::Additive);

        assert_eq!(probe.count(|c| matches!(c, DeviceCall::CreateBlendState(..))), 1);
        assert_eq!(probe.count(|c| matches!(c, DeviceCall::BindBlendState(_))), 1);
        assert_eq!(device.blend_state(), BlendConfig::Additive);
        assert_eq!(probe.live_states(), 3);
    }

    #[test]
    fn test_setting_current_default_is_noop() {
        let (mut device, probe) = headless(800, 600);
        probe.take_calls();
        device.set_depth_stencil_state(DepthStencilConfig::default());
        device.set_raster_state(RasterConfig::default());
        device.set_blend_state(BlendConfig::Opaque);
        assert!(probe.calls().is_empty());
    }

    #[test]
    fn test_restore_render_states() {
        let (mut device, _probe) = headless(800, 600);
        let saved = device.render_states();
        device.set_blend_state(BlendConfig::AlphaBlend);
        device.set_depth_stencil_state(DepthStencilConfig::default().with_depth_test(false));
        device.restore_render_states(saved);
        assert_eq!(device.render_states(), saved);
    }

    #[test]
    fn test_wvp_after_three_transforms() {
        let (mut device, probe) = headless(800, 600);
        let world = Mat4::from_scale_rotation_translation(
            Vec3::splat(2.0),
            Quat::from_rotation_x(0.4),
            Vec3::new(1.0, 0.0, -3.0),
        );
        let view = Mat4::look_at_rh(Vec3::new(0.0, 2.0, 5.0), Vec3::ZERO, Vec3::Y);
        let projection = Mat4::perspective_rh(1.0, 4.0 / 3.0, 0.1, 100.0);

        device.set_transform(TransformKind::World, world, false);
        device.set_transform(TransformKind::View, view, false);
        device.set_transform(TransformKind::Projection, projection, true);

        let expected = projection * view * world;
        assert!(approx_eq(device.frame_constants().world_view_projection, expected));
        let uploaded = probe.last_constants().unwrap();
        assert!(approx_eq(uploaded.world_view_projection(), expected));
    }

    #[test]
    fn test_set_transform_without_update_does_not_upload() {
        let (mut device, probe) = headless(800, 600);
        probe.take_calls();
        device.set_transform(TransformKind::World, Mat4::IDENTITY, false);
        assert_eq!(probe.count(|c| matches!(c, DeviceCall::UploadConstants(_))), 0);
    }

    #[test]
    fn test_set_viewport_returns_previous() {
        let (mut device, probe) = headless(800, 600);
        let small = Viewport::full(400, 300);
        let previous = device.set_viewport(small);
        assert_eq!(previous, Viewport::full(800, 600));
        assert_eq!(device.viewport(), small);
        assert_eq!(probe.calls().last(), Some(&DeviceCall::SetViewport(small)));
    }

    #[test]
    fn test_begin_frame_clears_primary() {
        let (mut device, probe) = headless(800, 600);
        probe.take_calls();
        device.begin_frame();
        let primary = device.primary_target();
        assert_eq!(
            probe.calls(),
            vec![
                DeviceCall::BindTargets {
                    color: primary.color,
                    depth: primary.depth
                },
                DeviceCall::ClearColor {
                    target: primary.color,
                    color: Color::DEEP_BLUE
                },
                DeviceCall::ClearDepth {
                    target: primary.depth,
                    depth: 1.0
                },
            ]
        );
    }

    #[test]
    fn test_end_frame_reports_rejected_present() {
        let (mut device, probe) = headless(800, 600);
        device.begin_frame();
        assert!(device.end_frame().is_ok());
        probe.reject_next_present("swap chain gone");
        let err = device.end_frame().unwrap_err();
        assert!(matches!(err, DeviceError::PresentRejected(_)));
    }

    #[test]
    fn test_update_frame_pushes_camera() {
        let (mut device, probe) = headless(800, 600);
        device.camera_mut().position = Vec3::new(0.0, 10.0, 20.0);
        device.set_transform(TransformKind::World, Mat4::from_scale(Vec3::splat(3.0)), false);
        probe.take_calls();

        device.update_frame(2.5);

        assert_eq!(probe.count(|c| matches!(c, DeviceCall::UploadConstants(_))), 1);
        let gpu = probe.last_constants().unwrap();
        assert_eq!(gpu.params[0], 2.5);
        assert_eq!(gpu.camera_position, [0.0, 10.0, 20.0, 1.0]);
        assert_eq!(device.frame_constants().world, Mat4::IDENTITY);
        let camera = device.camera();
        let expected = camera.projection_matrix() * camera.view_matrix();
        assert!(approx_eq(gpu.world_view_projection(), expected));
    }

    #[test]
    fn test_clip_plane_uploads_only_when_enabled() {
        let (mut device, probe) = headless(800, 600);
        probe.take_calls();
        device.enable_clip_plane(Some(Plane::horizontal(1.0)));
        assert_eq!(probe.count(|c| matches!(c, DeviceCall::UploadConstants(_))), 1);
        assert_eq!(probe.last_constants().unwrap().params[1], 1.0);

        probe.take_calls();
        device.enable_clip_plane(None);
        assert_eq!(probe.count(|c| matches!(c, DeviceCall::UploadConstants(_))), 0);
        assert!(device.frame_constants().clip_plane.is_none());

        device.set_transform(TransformKind::World, Mat4::IDENTITY, true);
        assert_eq!(probe.last_constants().unwrap().params[1], 0.0);
    }

    #[test]
    fn test_shadow_parameters_ride_the_next_upload() {
        let (mut device, probe) = headless(800, 600);
        let light = Mat4::orthographic_rh(-5.0, 5.0, -5.0, 5.0, 0.0, 10.0);
        probe.take_calls();

        device.set_light_view_projection(light);
        device.set_shadow_receiver(false);
        device.set_shadow_pass(true);
        assert!(probe.calls().is_empty());

        device.set_transform(TransformKind::World, Mat4::IDENTITY, true);
        let gpu = probe.last_constants().unwrap();
        assert!(approx_eq(gpu.light_view_projection(), light));
        assert_eq!((gpu.params[2], gpu.params[3]), (0.0, 1.0));
    }

    #[test]
    fn test_copy_primary_to_offscreen_target() {
        let (mut device, probe) = headless(800, 600);
        let target = device
            .create_color_target(800, 600, PixelFormat::Rgba8Unorm)
            .unwrap();
        probe.take_calls();

        device.copy_primary_to(target).unwrap();

        assert_eq!(probe.calls(), vec![DeviceCall::CopyPrimaryTo(target)]);
        device.destroy_color_target(target);
        assert!(matches!(
            device.copy_primary_to(target),
            Err(DeviceError::UnknownResource { .. })
        ));
    }

    #[test]
    fn test_state_scope_restores_on_drop() {
        let (mut device, _probe) = headless(800, 600);
        let before = device.render_states();
        {
            let mut scope = device.scoped_states();
            scope.set_blend_state(BlendConfig::AlphaBlend);
            scope.set_depth_stencil_state(DepthStencilConfig::default().with_depth_test(false));
            assert_eq!(scope.saved(), before);
            assert_eq!(scope.blend_state(), BlendConfig::AlphaBlend);
        }
        assert_eq!(device.render_states(), before);
    }

    #[test]
    fn test_state_scope_restores_while_unwinding() {
        let (mut device, _probe) = headless(800, 600);
        let before = device.render_states();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut scope = device.scoped_states();
            scope.set_raster_state(RasterConfig::default().with_cull(CullMode::None));
            panic!("draw failed");
        }));
        assert!(result.is_err());
        assert_eq!(device.render_states(), before);
    }

    #[test]
    fn test_texture_bind_is_cached_per_slot() {
        let (mut device, probe) = headless(800, 600);
        probe.take_calls();
        device.bind_texture(0, Some(ColorTargetId(42)));
        device.bind_texture(0, Some(ColorTargetId(42)));
        device.bind_texture(1, Some(ColorTargetId(42)));
        assert_eq!(probe.count(|c| matches!(c, DeviceCall::BindTexture { .. })), 2);
        assert_eq!(device.bound_texture(0), Some(ColorTargetId(42)));
    }

    #[test]
    #[should_panic(expected = "texture slot")]
    fn test_texture_slot_out_of_range_panics() {
        let (mut device, _probe) = headless(800, 600);
        device.bind_texture(MAX_TEXTURE_SLOTS, None);
    }

    #[test]
    fn test_destroyed_target_is_unbound_from_slots() {
        let (mut device, _probe) = headless(800, 600);
        let target = device
            .create_color_target(64, 64, PixelFormat::Rgba8Unorm)
            .unwrap();
        device.bind_texture(2, Some(target));
        device.destroy_color_target(target);
        assert_eq!(device.bound_texture(2), None);
    }

    #[test]
    fn test_resize_primary_updates_viewport_and_aspect() {
        let (mut device, probe) = headless(1920, 1080);
        device.resize_primary(1000, 1000);
        assert_eq!(device.primary_size(), (1000, 1000));
        assert_eq!(device.viewport(), Viewport::full(1000, 1000));
        assert!((device.camera().aspect_ratio() - 1.0).abs() < 1e-6);
        let projection = device.camera().projection_matrix();
        assert!(approx_eq(device.frame_constants().projection, projection));
        assert!(probe.last_constants().is_some());
    }

    #[test]
    fn test_lighting_is_normalized() {
        let (mut device, _probe) = headless(800, 600);
        device.set_lighting(Vec3::new(0.0, -4.0, 0.0), Vec3::ONE, Vec3::splat(0.1));
        assert_eq!(device.frame_constants().light_direction, Vec3::NEG_Y);
    }
}
