//! Recording backend with no GPU behind it.
//!
//! Every call that reaches the backend is appended to a shared log. A
//! [`HeadlessProbe`] cloned from the backend before it is boxed into the
//! device reads that log back, which is how tests observe device behaviour.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use super::{
    ColorTargetId, DepthTargetId, GraphicsBackend, MeshId, ProgramDesc, ProgramId, StateHandle,
};
use crate::constants::FrameConstantsGpu;
use crate::error::DeviceError;
use crate::mesh::Vertex;
use crate::state::{BlendConfig, Color, DepthStencilConfig, PixelFormat, RasterConfig, Viewport};

/// One recorded backend call.
#[derive(Clone, Debug, PartialEq)]
pub enum DeviceCall {
    CreateColorTarget {
        id: ColorTargetId,
        width: u32,
        height: u32,
        format: PixelFormat,
    },
    CreateDepthTarget {
        id: DepthTargetId,
        width: u32,
        height: u32,
    },
    ResizeColorTarget {
        id: ColorTargetId,
        width: u32,
        height: u32,
    },
    ResizeDepthTarget {
        id: DepthTargetId,
        width: u32,
        height: u32,
    },
    DestroyColorTarget(ColorTargetId),
    DestroyDepthTarget(DepthTargetId),
    BindTargets {
        color: ColorTargetId,
        depth: DepthTargetId,
    },
    ClearColor {
        target: ColorTargetId,
        color: Color,
    },
    ClearDepth {
        target: DepthTargetId,
        depth: f32,
    },
    SetViewport(Viewport),
    CreateDepthStencilState(DepthStencilConfig, StateHandle),
    CreateRasterState(RasterConfig, StateHandle),
    CreateBlendState(BlendConfig, StateHandle),
    BindDepthStencilState(StateHandle),
    BindRasterState(StateHandle),
    BindBlendState(StateHandle),
    ReleaseState(StateHandle),
    UploadConstants(Box<FrameConstantsGpu>),
    CreateProgram {
        id: ProgramId,
        name: String,
    },
    BindProgram(ProgramId),
    CreateMesh {
        id: MeshId,
        vertex_count: usize,
        index_count: usize,
    },
    DestroyMesh(MeshId),
    BindTexture {
        slot: usize,
        target: Option<ColorTargetId>,
    },
    DrawIndexed {
        mesh: MeshId,
        index_count: u32,
    },
    DrawText {
        text: String,
        position: (i32, i32),
        color: Color,
    },
    CopyPrimaryTo(ColorTargetId),
    ResizePrimary {
        width: u32,
        height: u32,
    },
    Present,
}

#[derive(Default)]
struct HeadlessLog {
    calls: Vec<DeviceCall>,
    next_id: u32,
    primary_size: (u32, u32),
    color_targets: FxHashMap<ColorTargetId, (u32, u32)>,
    depth_targets: FxHashMap<DepthTargetId, (u32, u32)>,
    live_states: FxHashMap<StateHandle, &'static str>,
    meshes: FxHashMap<MeshId, usize>,
    presented_frames: u64,
    reject_present: Option<String>,
}

impl HeadlessLog {
    fn allocate(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn record(&mut self, call: DeviceCall) {
        self.calls.push(call);
    }

    fn new_state(&mut self, kind: &'static str) -> StateHandle {
        let handle = StateHandle(self.allocate());
        self.live_states.insert(handle, kind);
        handle
    }
}

fn check_size(kind: &'static str, width: u32, height: u32) -> Result<(), DeviceError> {
    if width == 0 || height == 0 {
        return Err(DeviceError::ResourceCreation {
            kind,
            reason: format!("zero-sized {width}x{height}"),
        });
    }
    Ok(())
}

/// Backend that records calls instead of rendering.
pub struct HeadlessBackend {
    log: Rc<RefCell<HeadlessLog>>,
    primary_color: ColorTargetId,
    primary_depth: DepthTargetId,
}

impl HeadlessBackend {
    /// Create a backend whose primary surface is `width` x `height`.
    pub fn new(width: u32, height: u32) -> Self {
        let mut log = HeadlessLog {
            primary_size: (width.max(1), height.max(1)),
            ..Default::default()
        };
        let primary_color = ColorTargetId(log.allocate());
        let primary_depth = DepthTargetId(log.allocate());
        log.color_targets.insert(primary_color, log.primary_size);
        log.depth_targets.insert(primary_depth, log.primary_size);
        Self {
            log: Rc::new(RefCell::new(log)),
            primary_color,
            primary_depth,
        }
    }

    /// A read handle onto this backend's call log.
    pub fn probe(&self) -> HeadlessProbe {
        HeadlessProbe {
            log: Rc::clone(&self.log),
        }
    }
}

impl GraphicsBackend for HeadlessBackend {
    fn primary_size(&self) -> (u32, u32) {
        self.log.borrow().primary_size
    }

    fn primary_color_target(&self) -> ColorTargetId {
        self.primary_color
    }

    fn primary_depth_target(&self) -> DepthTargetId {
        self.primary_depth
    }

    fn resize_primary(&mut self, width: u32, height: u32) {
        let size = (width.max(1), height.max(1));
        let mut log = self.log.borrow_mut();
        log.primary_size = size;
        log.color_targets.insert(self.primary_color, size);
        log.depth_targets.insert(self.primary_depth, size);
        log.record(DeviceCall::ResizePrimary { width, height });
    }

    fn create_color_target(
        &mut self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<ColorTargetId, DeviceError> {
        check_size("color target", width, height)?;
        let mut log = self.log.borrow_mut();
        let id = ColorTargetId(log.allocate());
        log.color_targets.insert(id, (width, height));
        log.record(DeviceCall::CreateColorTarget {
            id,
            width,
            height,
            format,
        });
        Ok(id)
    }

    fn create_depth_target(
        &mut self,
        width: u32,
        height: u32,
    ) -> Result<DepthTargetId, DeviceError> {
        check_size("depth target", width, height)?;
        let mut log = self.log.borrow_mut();
        let id = DepthTargetId(log.allocate());
        log.depth_targets.insert(id, (width, height));
        log.record(DeviceCall::CreateDepthTarget { id, width, height });
        Ok(id)
    }

    fn resize_color_target(
        &mut self,
        id: ColorTargetId,
        width: u32,
        height: u32,
    ) -> Result<(), DeviceError> {
        check_size("color target", width, height)?;
        let mut log = self.log.borrow_mut();
        match log.color_targets.get_mut(&id) {
            Some(size) => *size = (width, height),
            None => {
                return Err(DeviceError::UnknownResource {
                    kind: "color target",
                    id: id.0,
                });
            }
        }
        log.record(DeviceCall::ResizeColorTarget { id, width, height });
        Ok(())
    }

    fn resize_depth_target(
        &mut self,
        id: DepthTargetId,
        width: u32,
        height: u32,
    ) -> Result<(), DeviceError> {
        check_size("depth target", width, height)?;
        let mut log = self.log.borrow_mut();
        match log.depth_targets.get_mut(&id) {
            Some(size) => *size = (width, height),
            None => {
                return Err(DeviceError::UnknownResource {
                    kind: "depth target",
                    id: id.0,
                });
            }
        }
        log.record(DeviceCall::ResizeDepthTarget { id, width, height });
        Ok(())
    }

    fn destroy_color_target(&mut self, id: ColorTargetId) {
        let mut log = self.log.borrow_mut();
        log.color_targets.remove(&id);
        log.record(DeviceCall::DestroyColorTarget(id));
    }

    fn destroy_depth_target(&mut self, id: DepthTargetId) {
        let mut log = self.log.borrow_mut();
        log.depth_targets.remove(&id);
        log.record(DeviceCall::DestroyDepthTarget(id));
    }

    fn bind_targets(&mut self, color: ColorTargetId, depth: DepthTargetId) {
        self.log
            .borrow_mut()
            .record(DeviceCall::BindTargets { color, depth });
    }

    fn clear_color(&mut self, target: ColorTargetId, color: Color) {
        self.log
            .borrow_mut()
            .record(DeviceCall::ClearColor { target, color });
    }

    fn clear_depth(&mut self, target: DepthTargetId, depth: f32) {
        self.log
            .borrow_mut()
            .record(DeviceCall::ClearDepth { target, depth });
    }

    fn set_viewport(&mut self, viewport: &Viewport) {
        self.log
            .borrow_mut()
            .record(DeviceCall::SetViewport(*viewport));
    }

    fn create_depth_stencil_state(
        &mut self,
        config: &DepthStencilConfig,
    ) -> Result<StateHandle, DeviceError> {
        let mut log = self.log.borrow_mut();
        let handle = log.new_state("depth-stencil");
        log.record(DeviceCall::CreateDepthStencilState(*config, handle));
        Ok(handle)
    }

    fn create_raster_state(&mut self, config: &RasterConfig) -> Result<StateHandle, DeviceError> {
        let mut log = self.log.borrow_mut();
        let handle = log.new_state("raster");
        log.record(DeviceCall::CreateRasterState(*config, handle));
        Ok(handle)
    }

    fn create_blend_state(&mut self, config: &BlendConfig) -> Result<StateHandle, DeviceError> {
        let mut log = self.log.borrow_mut();
        let handle = log.new_state("blend");
        log.record(DeviceCall::CreateBlendState(*config, handle));
        Ok(handle)
    }

    fn bind_depth_stencil_state(&mut self, state: StateHandle) {
        self.log
            .borrow_mut()
            .record(DeviceCall::BindDepthStencilState(state));
    }

    fn bind_raster_state(&mut self, state: StateHandle) {
        self.log
            .borrow_mut()
            .record(DeviceCall::BindRasterState(state));
    }

    fn bind_blend_state(&mut self, state: StateHandle) {
        self.log.borrow_mut().record(DeviceCall::BindBlendState(state));
    }

    fn release_state(&mut self, state: StateHandle) {
        let mut log = self.log.borrow_mut();
        log.live_states.remove(&state);
        log.record(DeviceCall::ReleaseState(state));
    }

    fn upload_frame_constants(&mut self, constants: &FrameConstantsGpu) {
        self.log
            .borrow_mut()
            .record(DeviceCall::UploadConstants(Box::new(*constants)));
    }

    fn create_program(&mut self, desc: &ProgramDesc) -> Result<ProgramId, DeviceError> {
        let mut log = self.log.borrow_mut();
        let id = ProgramId(log.allocate());
        log.record(DeviceCall::CreateProgram {
            id,
            name: desc.name.clone(),
        });
        Ok(id)
    }

    fn bind_program(&mut self, program: ProgramId) {
        self.log.borrow_mut().record(DeviceCall::BindProgram(program));
    }

    fn create_mesh(&mut self, vertices: &[Vertex], indices: &[u32]) -> Result<MeshId, DeviceError> {
        if vertices.is_empty() || indices.is_empty() {
            return Err(DeviceError::ResourceCreation {
                kind: "mesh",
                reason: "empty vertex or index data".to_string(),
            });
        }
        let mut log = self.log.borrow_mut();
        let id = MeshId(log.allocate());
        log.meshes.insert(id, indices.len());
        log.record(DeviceCall::CreateMesh {
            id,
            vertex_count: vertices.len(),
            index_count: indices.len(),
        });
        Ok(id)
    }

    fn destroy_mesh(&mut self, mesh: MeshId) {
        let mut log = self.log.borrow_mut();
        log.meshes.remove(&mesh);
        log.record(DeviceCall::DestroyMesh(mesh));
    }

    fn bind_texture(&mut self, slot: usize, target: Option<ColorTargetId>) {
        self.log
            .borrow_mut()
            .record(DeviceCall::BindTexture { slot, target });
    }

    fn draw_indexed(&mut self, mesh: MeshId, index_count: u32) {
        self.log
            .borrow_mut()
            .record(DeviceCall::DrawIndexed { mesh, index_count });
    }

    fn draw_text(&mut self, text: &str, position: (i32, i32), color: Color) {
        self.log.borrow_mut().record(DeviceCall::DrawText {
            text: text.to_string(),
            position,
            color,
        });
    }

    fn copy_primary_to(&mut self, target: ColorTargetId) -> Result<(), DeviceError> {
        let mut log = self.log.borrow_mut();
        if !log.color_targets.contains_key(&target) {
            return Err(DeviceError::UnknownResource {
                kind: "color target",
                id: target.0,
            });
        }
        log.record(DeviceCall::CopyPrimaryTo(target));
        Ok(())
    }

    fn present(&mut self) -> Result<(), DeviceError> {
        let mut log = self.log.borrow_mut();
        log.record(DeviceCall::Present);
        if let Some(reason) = log.reject_present.take() {
            return Err(DeviceError::PresentRejected(reason));
        }
        log.presented_frames += 1;
        Ok(())
    }
}

/// Shared read access to a [`HeadlessBackend`]'s log.
#[derive(Clone)]
pub struct HeadlessProbe {
    log: Rc<RefCell<HeadlessLog>>,
}

impl HeadlessProbe {
    /// Copy of every call recorded so far.
    pub fn calls(&self) -> Vec<DeviceCall> {
        self.log.borrow().calls.clone()
    }

    /// Drain the recorded calls, leaving resource bookkeeping intact.
    pub fn take_calls(&self) -> Vec<DeviceCall> {
        std::mem::take(&mut self.log.borrow_mut().calls)
    }

    pub fn count(&self, predicate: impl Fn(&DeviceCall) -> bool) -> usize {
        self.log.borrow().calls.iter().filter(|c| predicate(c)).count()
    }

    /// Meshes drawn, in order.
    pub fn draws(&self) -> Vec<MeshId> {
        self.log
            .borrow()
            .calls
            .iter()
            .filter_map(|c| match c {
                DeviceCall::DrawIndexed { mesh, .. } => Some(*mesh),
                _ => None,
            })
            .collect()
    }

    pub fn texts(&self) -> Vec<String> {
        self.log
            .borrow()
            .calls
            .iter()
            .filter_map(|c| match c {
                DeviceCall::DrawText { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// The most recent constant block upload.
    pub fn last_constants(&self) -> Option<FrameConstantsGpu> {
        self.log.borrow().calls.iter().rev().find_map(|c| match c {
            DeviceCall::UploadConstants(block) => Some(**block),
            _ => None,
        })
    }

    pub fn color_target_size(&self, id: ColorTargetId) -> Option<(u32, u32)> {
        self.log.borrow().color_targets.get(&id).copied()
    }

    pub fn depth_target_size(&self, id: DepthTargetId) -> Option<(u32, u32)> {
        self.log.borrow().depth_targets.get(&id).copied()
    }

    /// Color targets alive, including the primary one.
    pub fn live_color_targets(&self) -> usize {
        self.log.borrow().color_targets.len()
    }

    /// State objects created and not yet released.
    pub fn live_states(&self) -> usize {
        self.log.borrow().live_states.len()
    }

    pub fn live_meshes(&self) -> usize {
        self.log.borrow().meshes.len()
    }

    pub fn presented_frames(&self) -> u64 {
        self.log.borrow().presented_frames
    }

    /// Make the next `present` fail with `reason`.
    pub fn reject_next_present(&self, reason: impl Into<String>) {
        self.log.borrow_mut().reject_present = Some(reason.into());
    }
}
