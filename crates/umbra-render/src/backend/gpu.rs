//! GPU backend on top of wgpu.
//!
//! Device calls are recorded as plain commands during the frame and encoded
//! into render passes at [`present`](GraphicsBackend::present). The primary
//! target is an offscreen `Rgba8Unorm` texture that is blitted onto the
//! swapchain image last, so it can be copied and sampled like any other
//! color target.

use std::cell::RefCell;
use std::num::NonZeroU64;
use std::rc::Rc;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use wgpu::util::DeviceExt;
use winit::window::Window;

use super::{
    ColorTargetId, DepthTargetId, GraphicsBackend, MeshId, ProgramDesc, ProgramId, StateHandle,
};
use crate::constants::FrameConstantsGpu;
use crate::device::MAX_TEXTURE_SLOTS;
use crate::error::DeviceError;
use crate::mesh::Vertex;
use crate::shaders::BLIT_SHADER;
use crate::state::{
    BlendConfig, Color, CompareFunction, CullMode, DepthStencilConfig, FillMode, PixelFormat,
    RasterConfig, Viewport,
};

const PRIMARY_COLOR: ColorTargetId = ColorTargetId(1);
const PRIMARY_DEPTH: DepthTargetId = DepthTargetId(2);
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Distance between constant blocks in the uniform buffer. Dynamic offsets
/// must be multiples of 256.
const CONSTANTS_STRIDE: u64 = 512;
const INITIAL_CONSTANT_BLOCKS: u64 = 64;

// ---------------------------------------------------------------------------
// Overlay text
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct OverlayLines {
    pending: Vec<String>,
    presented: Vec<String>,
}

/// Shared view of the text drawn during the last presented frame.
///
/// Glyph rasterization is out of scope for this backend; the application
/// shows these lines elsewhere (e.g. the window title).
#[derive(Clone, Debug, Default)]
pub struct OverlayText {
    lines: Rc<RefCell<OverlayLines>>,
}

impl OverlayText {
    pub fn lines(&self) -> Vec<String> {
        self.lines.borrow().presented.clone()
    }

    /// All lines of the last frame joined with `" | "`.
    pub fn summary(&self) -> String {
        self.lines.borrow().presented.join(" | ")
    }

    fn push(&self, text: &str) {
        self.lines.borrow_mut().pending.push(text.to_string());
    }

    fn flip(&self) {
        let mut lines = self.lines.borrow_mut();
        lines.presented = std::mem::take(&mut lines.pending);
    }
}

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

struct ColorTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    format: PixelFormat,
    width: u32,
    height: u32,
}

struct DepthTarget {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
}

struct Program {
    name: String,
    module: wgpu::ShaderModule,
}

struct GpuMesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
}

#[derive(Clone, Copy, Debug)]
enum StateObject {
    DepthStencil(DepthStencilConfig),
    Raster(RasterConfig),
    Blend(BlendConfig),
}

/// Everything a render pipeline object depends on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: ProgramId,
    format: PixelFormat,
    depth: Option<DepthStencilConfig>,
    raster: RasterConfig,
    blend: BlendConfig,
}

#[derive(Clone, Copy, Debug)]
struct DrawCommand {
    color: ColorTargetId,
    depth: Option<DepthTargetId>,
    viewport: Viewport,
    pipeline: PipelineKey,
    mesh: MeshId,
    index_count: u32,
    constants: u32,
    textures: [Option<ColorTargetId>; MAX_TEXTURE_SLOTS],
}

#[derive(Clone, Copy, Debug)]
enum Command {
    ClearColor { target: ColorTargetId, color: Color },
    ClearDepth { target: DepthTargetId, depth: f32 },
    Draw(DrawCommand),
    CopyPrimary(ColorTargetId),
}

/// What is bound right now, as seen by the next recorded draw.
struct BoundState {
    color: ColorTargetId,
    depth: DepthTargetId,
    viewport: Viewport,
    depth_stencil: DepthStencilConfig,
    raster: RasterConfig,
    blend: BlendConfig,
    program: Option<ProgramId>,
    textures: [Option<ColorTargetId>; MAX_TEXTURE_SLOTS],
}

struct Layouts {
    constants: wgpu::BindGroupLayout,
    textures: wgpu::BindGroupLayout,
    pipeline: wgpu::PipelineLayout,
    sampler: wgpu::Sampler,
}

impl Layouts {
    fn new(device: &wgpu::Device) -> Self {
        let constants = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("umbra-constants-layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: NonZeroU64::new(FrameConstantsGpu::SIZE),
                },
                count: None,
            }],
        });

        let mut texture_entries: Vec<wgpu::BindGroupLayoutEntry> = (0..MAX_TEXTURE_SLOTS as u32)
            .map(|binding| wgpu::BindGroupLayoutEntry {
                binding,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: false },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            })
            .collect();
        texture_entries.push(wgpu::BindGroupLayoutEntry {
            binding: MAX_TEXTURE_SLOTS as u32,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering),
            count: None,
        });
        let textures = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("umbra-textures-layout"),
            entries: &texture_entries,
        });

        let pipeline = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("umbra-pipeline-layout"),
            bind_group_layouts: &[&constants, &textures],
            immediate_size: 0,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("umbra-point-sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Self {
            constants,
            textures,
            pipeline,
            sampler,
        }
    }
}

/// Every constant block uploaded this frame, one dynamic-offset slot each.
struct ConstantRing {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    capacity: u64,
    blocks: Vec<FrameConstantsGpu>,
}

impl ConstantRing {
    fn new(device: &wgpu::Device, layout: &wgpu::BindGroupLayout) -> Self {
        let (buffer, bind_group) = Self::allocate(device, layout, INITIAL_CONSTANT_BLOCKS);
        Self {
            buffer,
            bind_group,
            capacity: INITIAL_CONSTANT_BLOCKS,
            blocks: Vec::new(),
        }
    }

    fn allocate(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        capacity: u64,
    ) -> (wgpu::Buffer, wgpu::BindGroup) {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("umbra-frame-constants"),
            size: capacity * CONSTANTS_STRIDE,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("umbra-frame-constants-group"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: NonZeroU64::new(FrameConstantsGpu::SIZE),
                }),
            }],
        });
        (buffer, bind_group)
    }

    fn push(&mut self, constants: FrameConstantsGpu) {
        self.blocks.push(constants);
    }

    /// Slot of the most recent block.
    fn current(&self) -> Option<u32> {
        (self.blocks.len() as u32).checked_sub(1)
    }

    /// Write every block of the frame, growing the buffer when needed.
    fn flush(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, layout: &wgpu::BindGroupLayout) {
        if self.blocks.is_empty() {
            return;
        }
        let needed = self.blocks.len() as u64;
        if needed > self.capacity {
            let capacity = needed.next_power_of_two();
            let (buffer, bind_group) = Self::allocate(device, layout, capacity);
            log::debug!("frame constant buffer grown to {capacity} blocks");
            self.buffer = buffer;
            self.bind_group = bind_group;
            self.capacity = capacity;
        }

        let stride = CONSTANTS_STRIDE as usize;
        let mut bytes = vec![0u8; self.blocks.len() * stride];
        for (slot, block) in self.blocks.iter().enumerate() {
            let start = slot * stride;
            bytes[start..start + FrameConstantsGpu::SIZE as usize]
                .copy_from_slice(bytemuck::bytes_of(block));
        }
        queue.write_buffer(&self.buffer, 0, &bytes);
    }

    /// Keep only the latest block; it becomes slot 0 of the next frame.
    fn retire(&mut self) {
        if let Some(last) = self.blocks.pop() {
            self.blocks.clear();
            self.blocks.push(last);
        }
    }
}

/// Full-screen copy of the primary target onto the swapchain image.
struct Blit {
    pipeline: wgpu::RenderPipeline,
    layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    bind_group: wgpu::BindGroup,
}

impl Blit {
    fn new(device: &wgpu::Device, surface_format: wgpu::TextureFormat, source: &wgpu::TextureView) -> Self {
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("umbra-blit-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("umbra-blit-pipeline-layout"),
            bind_group_layouts: &[&layout],
            immediate_size: 0,
        });
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("umbra-blit"),
            source: wgpu::ShaderSource::Wgsl(BLIT_SHADER.into()),
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("umbra-blit-pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview_mask: None,
            cache: None,
        });
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("umbra-blit-sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let bind_group = Self::bind(device, &layout, &sampler, source);
        Self {
            pipeline,
            layout,
            sampler,
            bind_group,
        }
    }

    fn bind(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        sampler: &wgpu::Sampler,
        source: &wgpu::TextureView,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("umbra-blit-group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(source),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        })
    }

    fn rebind(&mut self, device: &wgpu::Device, source: &wgpu::TextureView) {
        self.bind_group = Self::bind(device, &self.layout, &self.sampler, source);
    }

    fn encode(&self, encoder: &mut wgpu::CommandEncoder, target: &wgpu::TextureView) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("umbra-blit-pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.bind_group, &[]);
        pass.draw(0..3, 0..1);
    }
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// [`GraphicsBackend`] rendering into a winit window through wgpu.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface: wgpu::Surface<'static>,
    surface_config: wgpu::SurfaceConfiguration,
    features: wgpu::Features,
    next_id: u32,
    color_targets: FxHashMap<ColorTargetId, ColorTarget>,
    depth_targets: FxHashMap<DepthTargetId, DepthTarget>,
    states: FxHashMap<StateHandle, StateObject>,
    programs: FxHashMap<ProgramId, Program>,
    meshes: FxHashMap<MeshId, GpuMesh>,
    pipelines: FxHashMap<PipelineKey, wgpu::RenderPipeline>,
    layouts: Layouts,
    constants: ConstantRing,
    blit: Blit,
    fallback_view: wgpu::TextureView,
    bound: BoundState,
    commands: Vec<Command>,
    overlay: OverlayText,
}

impl WgpuBackend {
    /// Initialize the GPU for `window`, blocking on adapter and device requests.
    pub fn new(window: Arc<Window>, vsync: bool) -> Result<Self, DeviceError> {
        pollster::block_on(Self::new_async(window, vsync))
    }

    async fn new_async(window: Arc<Window>, vsync: bool) -> Result<Self, DeviceError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let size = window.inner_size();
        let surface = instance.create_surface(window)?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|_| DeviceError::AdapterUnavailable)?;

        let info = adapter.get_info();
        log::info!(
            "Selected GPU: {} ({:?}, {:?})",
            info.name,
            info.backend,
            info.device_type
        );

        // Wireframe fill and disabled depth clipping are used when available.
        let features = adapter.features()
            & (wgpu::Features::POLYGON_MODE_LINE | wgpu::Features::DEPTH_CLIP_CONTROL);
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("umbra-device"),
                required_features: features,
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
                experimental_features: wgpu::ExperimentalFeatures::default(),
                trace: wgpu::Trace::Off,
            })
            .await?;

        let caps = surface.get_capabilities(&adapter);
        let surface_format = select_preferred_srgb_format(&caps.formats);
        let present_mode = select_present_mode(&caps.present_modes, vsync);
        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode,
            alpha_mode: caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        let (width, height) = (surface_config.width, surface_config.height);
        let primary = create_color_texture(&device, width, height, PixelFormat::Rgba8Unorm);
        let primary_depth = create_depth_texture(&device, width, height);
        let layouts = Layouts::new(&device);
        let constants = ConstantRing::new(&device, &layouts.constants);
        let blit = Blit::new(&device, surface_format, &primary.view);
        let fallback_view = create_fallback_texture(&device, &queue);

        let mut color_targets = FxHashMap::default();
        color_targets.insert(PRIMARY_COLOR, primary);
        let mut depth_targets = FxHashMap::default();
        depth_targets.insert(PRIMARY_DEPTH, primary_depth);

        log::info!("wgpu backend ready: {width}x{height} {surface_format:?} {present_mode:?}");

        Ok(Self {
            device,
            queue,
            surface,
            surface_config,
            features,
            next_id: PRIMARY_DEPTH.0,
            color_targets,
            depth_targets,
            states: FxHashMap::default(),
            programs: FxHashMap::default(),
            meshes: FxHashMap::default(),
            pipelines: FxHashMap::default(),
            layouts,
            constants,
            blit,
            fallback_view,
            bound: BoundState {
                color: PRIMARY_COLOR,
                depth: PRIMARY_DEPTH,
                viewport: Viewport::full(width, height),
                depth_stencil: DepthStencilConfig::default(),
                raster: RasterConfig::default(),
                blend: BlendConfig::default(),
                program: None,
                textures: [None; MAX_TEXTURE_SLOTS],
            },
            commands: Vec::new(),
            overlay: OverlayText::default(),
        })
    }

    /// Handle onto the text drawn each frame.
    pub fn overlay(&self) -> OverlayText {
        self.overlay.clone()
    }

    fn allocate(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn new_state(&mut self, state: StateObject) -> StateHandle {
        let handle = StateHandle(self.allocate());
        self.states.insert(handle, state);
        handle
    }

    /// Acquire the swapchain image, reconfiguring once on loss.
    fn acquire(&self) -> Result<Option<wgpu::SurfaceTexture>, DeviceError> {
        match self.surface.get_current_texture() {
            Ok(texture) => Ok(Some(texture)),
            Err(wgpu::SurfaceError::Lost) | Err(wgpu::SurfaceError::Outdated) => {
                log::warn!("Surface lost, attempting to recover...");
                self.surface.configure(&self.device, &self.surface_config);
                match self.surface.get_current_texture() {
                    Ok(texture) => Ok(Some(texture)),
                    Err(_) => Err(DeviceError::SurfaceLost),
                }
            }
            Err(wgpu::SurfaceError::Timeout) => {
                log::warn!("Surface acquire timed out, skipping frame");
                Ok(None)
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                Err(DeviceError::PresentRejected("out of memory".to_string()))
            }
            Err(wgpu::SurfaceError::Other) => {
                log::error!("Unknown surface error occurred");
                Err(DeviceError::SurfaceLost)
            }
        }
    }

    fn ensure_pipeline(&mut self, key: &PipelineKey) {
        if self.pipelines.contains_key(key) {
            return;
        }
        let Some(program) = self.programs.get(&key.program) else {
            return;
        };
        let pipeline = self.build_pipeline(key, program);
        log::debug!("pipeline for '{}' {key:?}", program.name);
        self.pipelines.insert(*key, pipeline);
    }

    fn build_pipeline(&self, key: &PipelineKey, program: &Program) -> wgpu::RenderPipeline {
        let polygon_mode = match key.raster.fill {
            FillMode::Wireframe if self.features.contains(wgpu::Features::POLYGON_MODE_LINE) => {
                wgpu::PolygonMode::Line
            }
            _ => wgpu::PolygonMode::Fill,
        };
        let unclipped_depth =
            !key.raster.depth_clip && self.features.contains(wgpu::Features::DEPTH_CLIP_CONTROL);

        self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(program.name.as_str()),
            layout: Some(&self.layouts.pipeline),
            vertex: wgpu::VertexState {
                module: &program.module,
                entry_point: Some("vs_main"),
                buffers: &[Vertex::layout()],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: if key.raster.front_ccw {
                    wgpu::FrontFace::Ccw
                } else {
                    wgpu::FrontFace::Cw
                },
                cull_mode: cull_face(key.raster.cull),
                unclipped_depth,
                polygon_mode,
                conservative: false,
            },
            depth_stencil: key.depth.map(depth_stencil_state),
            multisample: wgpu::MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            fragment: Some(wgpu::FragmentState {
                module: &program.module,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: texture_format(key.format),
                    blend: blend_state(key.blend),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview_mask: None,
            cache: None,
        })
    }

    /// Texture group for one draw. A slot pointing at the draw's own color
    /// target, or at nothing, samples a 1x1 white texture instead.
    fn texture_bind_group(&self, draw: &DrawCommand) -> wgpu::BindGroup {
        let views: Vec<&wgpu::TextureView> = draw
            .textures
            .iter()
            .map(|slot| {
                slot.filter(|id| *id != draw.color)
                    .and_then(|id| self.color_targets.get(&id))
                    .map_or(&self.fallback_view, |target| &target.view)
            })
            .collect();
        let mut entries: Vec<wgpu::BindGroupEntry> = views
            .iter()
            .enumerate()
            .map(|(binding, view)| wgpu::BindGroupEntry {
                binding: binding as u32,
                resource: wgpu::BindingResource::TextureView(view),
            })
            .collect();
        entries.push(wgpu::BindGroupEntry {
            binding: MAX_TEXTURE_SLOTS as u32,
            resource: wgpu::BindingResource::Sampler(&self.layouts.sampler),
        });
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("umbra-textures-group"),
            layout: &self.layouts.textures,
            entries: &entries,
        })
    }

    fn encode_commands(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        commands: &[Command],
        texture_groups: &[Option<wgpu::BindGroup>],
    ) {
        let mut index = 0;
        while index < commands.len() {
            match commands[index] {
                Command::ClearColor { target, color } => {
                    if let Some(target) = self.color_targets.get(&target) {
                        clear_color_pass(encoder, &target.view, color);
                    }
                    index += 1;
                }
                Command::ClearDepth { target, depth } => {
                    if let Some(target) = self.depth_targets.get(&target) {
                        clear_depth_pass(encoder, &target.view, depth);
                    }
                    index += 1;
                }
                Command::CopyPrimary(target) => {
                    self.encode_copy(encoder, target);
                    index += 1;
                }
                Command::Draw(first) => {
                    let run = commands[index..]
                        .iter()
                        .take_while(|command| {
                            matches!(command, Command::Draw(draw)
                                if draw.color == first.color && draw.depth == first.depth)
                        })
                        .count();
                    self.encode_draws(
                        encoder,
                        &commands[index..index + run],
                        &texture_groups[index..index + run],
                    );
                    index += run;
                }
            }
        }
    }

    /// One render pass for a run of draws into the same targets.
    fn encode_draws(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        draws: &[Command],
        texture_groups: &[Option<wgpu::BindGroup>],
    ) {
        let Some(Command::Draw(first)) = draws.first() else {
            return;
        };
        let Some(color) = self.color_targets.get(&first.color) else {
            return;
        };
        let depth_view = first
            .depth
            .and_then(|id| self.depth_targets.get(&id))
            .map(|target| &target.view);

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("umbra-draw-pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &color.view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: depth_view.map(|view| {
                wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        for (command, group) in draws.iter().zip(texture_groups) {
            let (Command::Draw(draw), Some(group)) = (command, group) else {
                continue;
            };
            let (Some(pipeline), Some(mesh)) =
                (self.pipelines.get(&draw.pipeline), self.meshes.get(&draw.mesh))
            else {
                continue;
            };
            let vp = clamp_viewport(draw.viewport, color.width, color.height);
            if vp.width <= 0.0 || vp.height <= 0.0 {
                continue;
            }
            pass.set_viewport(vp.x, vp.y, vp.width, vp.height, vp.min_depth, vp.max_depth);
            pass.set_pipeline(pipeline);
            let offset = (u64::from(draw.constants) * CONSTANTS_STRIDE) as u32;
            pass.set_bind_group(0, &self.constants.bind_group, &[offset]);
            pass.set_bind_group(1, group, &[]);
            pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
            pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..draw.index_count.min(mesh.index_count), 0, 0..1);
        }
    }

    fn encode_copy(&self, encoder: &mut wgpu::CommandEncoder, target: ColorTargetId) {
        let (Some(source), Some(destination)) = (
            self.color_targets.get(&PRIMARY_COLOR),
            self.color_targets.get(&target),
        ) else {
            return;
        };
        if (source.width, source.height) != (destination.width, destination.height) {
            log::warn!("skipping primary copy into {target:?}: size changed");
            return;
        }
        encoder.copy_texture_to_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &source.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyTextureInfo {
                texture: &destination.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::Extent3d {
                width: source.width,
                height: source.height,
                depth_or_array_layers: 1,
            },
        );
    }
}

impl GraphicsBackend for WgpuBackend {
    fn primary_size(&self) -> (u32, u32) {
        (self.surface_config.width, self.surface_config.height)
    }

    fn primary_color_target(&self) -> ColorTargetId {
        PRIMARY_COLOR
    }

    fn primary_depth_target(&self) -> DepthTargetId {
        PRIMARY_DEPTH
    }

    fn resize_primary(&mut self, width: u32, height: u32) {
        self.surface_config.width = width.max(1);
        self.surface_config.height = height.max(1);
        self.surface.configure(&self.device, &self.surface_config);

        let (width, height) = (self.surface_config.width, self.surface_config.height);
        let primary = create_color_texture(&self.device, width, height, PixelFormat::Rgba8Unorm);
        self.blit.rebind(&self.device, &primary.view);
        self.color_targets.insert(PRIMARY_COLOR, primary);
        self.depth_targets
            .insert(PRIMARY_DEPTH, create_depth_texture(&self.device, width, height));
    }

    fn create_color_target(
        &mut self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<ColorTargetId, DeviceError> {
        check_size("color target", width, height)?;
        let id = ColorTargetId(self.allocate());
        let target = create_color_texture(&self.device, width, height, format);
        self.color_targets.insert(id, target);
        Ok(id)
    }

    fn create_depth_target(&mut self, width: u32, height: u32) -> Result<DepthTargetId, DeviceError> {
        check_size("depth target", width, height)?;
        let id = DepthTargetId(self.allocate());
        self.depth_targets
            .insert(id, create_depth_texture(&self.device, width, height));
        Ok(id)
    }

    fn resize_color_target(
        &mut self,
        id: ColorTargetId,
        width: u32,
        height: u32,
    ) -> Result<(), DeviceError> {
        check_size("color target", width, height)?;
        let format = self
            .color_targets
            .get(&id)
            .map(|target| target.format)
            .ok_or(DeviceError::UnknownResource {
                kind: "color target",
                id: id.0,
            })?;
        self.color_targets
            .insert(id, create_color_texture(&self.device, width, height, format));
        Ok(())
    }

    fn resize_depth_target(
        &mut self,
        id: DepthTargetId,
        width: u32,
        height: u32,
    ) -> Result<(), DeviceError> {
        check_size("depth target", width, height)?;
        if !self.depth_targets.contains_key(&id) {
            return Err(DeviceError::UnknownResource {
                kind: "depth target",
                id: id.0,
            });
        }
        self.depth_targets
            .insert(id, create_depth_texture(&self.device, width, height));
        Ok(())
    }

    fn destroy_color_target(&mut self, id: ColorTargetId) {
        if id != PRIMARY_COLOR {
            self.color_targets.remove(&id);
        }
    }

    fn destroy_depth_target(&mut self, id: DepthTargetId) {
        if id != PRIMARY_DEPTH {
            self.depth_targets.remove(&id);
        }
    }

    fn bind_targets(&mut self, color: ColorTargetId, depth: DepthTargetId) {
        self.bound.color = color;
        self.bound.depth = depth;
    }

    fn clear_color(&mut self, target: ColorTargetId, color: Color) {
        self.commands.push(Command::ClearColor { target, color });
    }

    fn clear_depth(&mut self, target: DepthTargetId, depth: f32) {
        self.commands.push(Command::ClearDepth { target, depth });
    }

    fn set_viewport(&mut self, viewport: &Viewport) {
        self.bound.viewport = *viewport;
    }

    fn create_depth_stencil_state(
        &mut self,
        config: &DepthStencilConfig,
    ) -> Result<StateHandle, DeviceError> {
        Ok(self.new_state(StateObject::DepthStencil(*config)))
    }

    fn create_raster_state(&mut self, config: &RasterConfig) -> Result<StateHandle, DeviceError> {
        if config.fill == FillMode::Wireframe
            && !self.features.contains(wgpu::Features::POLYGON_MODE_LINE)
        {
            log::warn!("wireframe fill unsupported by adapter, drawing solid");
        }
        Ok(self.new_state(StateObject::Raster(*config)))
    }

    fn create_blend_state(&mut self, config: &BlendConfig) -> Result<StateHandle, DeviceError> {
        Ok(self.new_state(StateObject::Blend(*config)))
    }

    fn bind_depth_stencil_state(&mut self, state: StateHandle) {
        match self.states.get(&state) {
            Some(StateObject::DepthStencil(config)) => self.bound.depth_stencil = *config,
            _ => log::warn!("bind of unknown depth-stencil state {state:?}"),
        }
    }

    fn bind_raster_state(&mut self, state: StateHandle) {
        match self.states.get(&state) {
            Some(StateObject::Raster(config)) => self.bound.raster = *config,
            _ => log::warn!("bind of unknown raster state {state:?}"),
        }
    }

    fn bind_blend_state(&mut self, state: StateHandle) {
        match self.states.get(&state) {
            Some(StateObject::Blend(config)) => self.bound.blend = *config,
            _ => log::warn!("bind of unknown blend state {state:?}"),
        }
    }

    fn release_state(&mut self, state: StateHandle) {
        self.states.remove(&state);
    }

    fn upload_frame_constants(&mut self, constants: &FrameConstantsGpu) {
        self.constants.push(*constants);
    }

    fn create_program(&mut self, desc: &ProgramDesc) -> Result<ProgramId, DeviceError> {
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(desc.name.as_str()),
                source: wgpu::ShaderSource::Wgsl(desc.source.as_str().into()),
            });
        let id = ProgramId(self.allocate());
        log::info!("Loaded shader '{}'", desc.name);
        self.programs.insert(
            id,
            Program {
                name: desc.name.clone(),
                module,
            },
        );
        Ok(id)
    }

    fn bind_program(&mut self, program: ProgramId) {
        self.bound.program = Some(program);
    }

    fn create_mesh(&mut self, vertices: &[Vertex], indices: &[u32]) -> Result<MeshId, DeviceError> {
        if vertices.is_empty() || indices.is_empty() {
            return Err(DeviceError::ResourceCreation {
                kind: "mesh",
                reason: "empty vertex or index data".to_string(),
            });
        }
        let vertex_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("umbra-vertex-buffer"),
                contents: bytemuck::cast_slice(vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let index_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("umbra-index-buffer"),
                contents: bytemuck::cast_slice(indices),
                usage: wgpu::BufferUsages::INDEX,
            });
        let id = MeshId(self.allocate());
        self.meshes.insert(
            id,
            GpuMesh {
                vertex_buffer,
                index_buffer,
                index_count: indices.len() as u32,
            },
        );
        Ok(id)
    }

    fn destroy_mesh(&mut self, mesh: MeshId) {
        self.meshes.remove(&mesh);
    }

    fn bind_texture(&mut self, slot: usize, target: Option<ColorTargetId>) {
        if let Some(bound) = self.bound.textures.get_mut(slot) {
            *bound = target;
        }
    }

    fn draw_indexed(&mut self, mesh: MeshId, index_count: u32) {
        let Some(program) = self.bound.program else {
            log::warn!("draw of {mesh:?} without a bound program");
            return;
        };
        let Some(constants) = self.constants.current() else {
            log::warn!("draw of {mesh:?} before any constants were uploaded");
            return;
        };
        let Some(color) = self.color_targets.get(&self.bound.color) else {
            log::warn!("draw into unknown color target {:?}", self.bound.color);
            return;
        };
        // Attachments must match in size; a shared depth target of another size is left out.
        let depth = self
            .depth_targets
            .get(&self.bound.depth)
            .filter(|depth| (depth.width, depth.height) == (color.width, color.height))
            .map(|_| self.bound.depth);

        self.commands.push(Command::Draw(DrawCommand {
            color: self.bound.color,
            depth,
            viewport: self.bound.viewport,
            pipeline: PipelineKey {
                program,
                format: color.format,
                depth: depth.map(|_| self.bound.depth_stencil),
                raster: self.bound.raster,
                blend: self.bound.blend,
            },
            mesh,
            index_count,
            constants,
            textures: self.bound.textures,
        }));
    }

    fn draw_text(&mut self, text: &str, _position: (i32, i32), _color: Color) {
        self.overlay.push(text);
    }

    fn copy_primary_to(&mut self, target: ColorTargetId) -> Result<(), DeviceError> {
        let (Some(source), Some(destination)) = (
            self.color_targets.get(&PRIMARY_COLOR),
            self.color_targets.get(&target),
        ) else {
            return Err(DeviceError::UnknownResource {
                kind: "color target",
                id: target.0,
            });
        };
        if destination.format != source.format
            || (destination.width, destination.height) != (source.width, source.height)
        {
            return Err(DeviceError::ResourceCreation {
                kind: "primary copy",
                reason: format!(
                    "target is {:?} {}x{}, primary is {:?} {}x{}",
                    destination.format,
                    destination.width,
                    destination.height,
                    source.format,
                    source.width,
                    source.height
                ),
            });
        }
        self.commands.push(Command::CopyPrimary(target));
        Ok(())
    }

    fn present(&mut self) -> Result<(), DeviceError> {
        let commands = std::mem::take(&mut self.commands);
        let Some(frame) = self.acquire()? else {
            self.constants.retire();
            return Ok(());
        };

        self.constants
            .flush(&self.device, &self.queue, &self.layouts.constants);
        for command in &commands {
            if let Command::Draw(draw) = command {
                self.ensure_pipeline(&draw.pipeline);
            }
        }
        let texture_groups: Vec<Option<wgpu::BindGroup>> = commands
            .iter()
            .map(|command| match command {
                Command::Draw(draw) => Some(self.texture_bind_group(draw)),
                _ => None,
            })
            .collect();

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("umbra-frame-encoder"),
            });
        self.encode_commands(&mut encoder, &commands, &texture_groups);
        let surface_view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        self.blit.encode(&mut encoder, &surface_view);

        self.queue.submit([encoder.finish()]);
        frame.present();

        self.constants.retire();
        self.overlay.flip();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn check_size(kind: &'static str, width: u32, height: u32) -> Result<(), DeviceError> {
    if width == 0 || height == 0 {
        return Err(DeviceError::ResourceCreation {
            kind,
            reason: format!("zero-sized {width}x{height}"),
        });
    }
    Ok(())
}

fn create_color_texture(
    device: &wgpu::Device,
    width: u32,
    height: u32,
    format: PixelFormat,
) -> ColorTarget {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("umbra-color-target"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: texture_format(format),
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC
            | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    ColorTarget {
        texture,
        view,
        format,
        width,
        height,
    }
}

fn create_depth_texture(device: &wgpu::Device, width: u32, height: u32) -> DepthTarget {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("umbra-depth-target"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    DepthTarget {
        _texture: texture,
        view,
        width,
        height,
    }
}

/// 1x1 white texture bound to empty slots.
fn create_fallback_texture(device: &wgpu::Device, queue: &wgpu::Queue) -> wgpu::TextureView {
    let texture = device.create_texture_with_data(
        queue,
        &wgpu::TextureDescriptor {
            label: Some("umbra-fallback-texture"),
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        wgpu::util::TextureDataOrder::LayerMajor,
        &[255, 255, 255, 255],
    );
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

fn clear_color_pass(encoder: &mut wgpu::CommandEncoder, view: &wgpu::TextureView, color: Color) {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("umbra-clear-color"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view,
            depth_slice: None,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(wgpu_color(color)),
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
        multiview_mask: None,
    });
}

fn clear_depth_pass(encoder: &mut wgpu::CommandEncoder, view: &wgpu::TextureView, depth: f32) {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("umbra-clear-depth"),
        color_attachments: &[],
        depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
            view,
            depth_ops: Some(wgpu::Operations {
                load: wgpu::LoadOp::Clear(depth),
                store: wgpu::StoreOp::Store,
            }),
            stencil_ops: None,
        }),
        timestamp_writes: None,
        occlusion_query_set: None,
        multiview_mask: None,
    });
}

fn texture_format(format: PixelFormat) -> wgpu::TextureFormat {
    match format {
        PixelFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        PixelFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        PixelFormat::R32Float => wgpu::TextureFormat::R32Float,
    }
}

fn wgpu_color(color: Color) -> wgpu::Color {
    wgpu::Color {
        r: f64::from(color.r),
        g: f64::from(color.g),
        b: f64::from(color.b),
        a: f64::from(color.a),
    }
}

fn compare_function(compare: CompareFunction) -> wgpu::CompareFunction {
    match compare {
        CompareFunction::Never => wgpu::CompareFunction::Never,
        CompareFunction::Less => wgpu::CompareFunction::Less,
        CompareFunction::Equal => wgpu::CompareFunction::Equal,
        CompareFunction::LessEqual => wgpu::CompareFunction::LessEqual,
        CompareFunction::Greater => wgpu::CompareFunction::Greater,
        CompareFunction::NotEqual => wgpu::CompareFunction::NotEqual,
        CompareFunction::GreaterEqual => wgpu::CompareFunction::GreaterEqual,
        CompareFunction::Always => wgpu::CompareFunction::Always,
    }
}

/// A disabled depth test also disables depth writes.
fn depth_stencil_state(config: DepthStencilConfig) -> wgpu::DepthStencilState {
    wgpu::DepthStencilState {
        format: DEPTH_FORMAT,
        depth_write_enabled: config.depth_test && config.depth_write,
        depth_compare: if config.depth_test {
            compare_function(config.compare)
        } else {
            wgpu::CompareFunction::Always
        },
        stencil: wgpu::StencilState::default(),
        bias: wgpu::DepthBiasState::default(),
    }
}

fn cull_face(cull: CullMode) -> Option<wgpu::Face> {
    match cull {
        CullMode::None => None,
        CullMode::Front => Some(wgpu::Face::Front),
        CullMode::Back => Some(wgpu::Face::Back),
    }
}

fn blend_state(blend: BlendConfig) -> Option<wgpu::BlendState> {
    match blend {
        BlendConfig::Opaque => None,
        BlendConfig::AlphaBlend => Some(wgpu::BlendState::ALPHA_BLENDING),
        BlendConfig::Additive => {
            let additive = wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            };
            Some(wgpu::BlendState {
                color: additive,
                alpha: additive,
            })
        }
    }
}

/// Keep a viewport inside a `width` x `height` attachment.
fn clamp_viewport(viewport: Viewport, width: u32, height: u32) -> Viewport {
    let (w, h) = (width as f32, height as f32);
    let x = viewport.x.clamp(0.0, w);
    let y = viewport.y.clamp(0.0, h);
    Viewport {
        x,
        y,
        width: viewport.width.min(w - x),
        height: viewport.height.min(h - y),
        min_depth: viewport.min_depth.clamp(0.0, 1.0),
        max_depth: viewport.max_depth.clamp(0.0, 1.0),
    }
}

/// Select the preferred surface format, preferring sRGB.
fn select_preferred_srgb_format(formats: &[wgpu::TextureFormat]) -> wgpu::TextureFormat {
    if formats.contains(&wgpu::TextureFormat::Bgra8UnormSrgb) {
        wgpu::TextureFormat::Bgra8UnormSrgb
    } else if formats.contains(&wgpu::TextureFormat::Rgba8UnormSrgb) {
        wgpu::TextureFormat::Rgba8UnormSrgb
    } else {
        formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| formats.first().copied())
            .unwrap_or(wgpu::TextureFormat::Bgra8UnormSrgb)
    }
}

/// Fifo with vsync; otherwise the lowest-latency mode the surface offers.
fn select_present_mode(modes: &[wgpu::PresentMode], vsync: bool) -> wgpu::PresentMode {
    if vsync {
        return wgpu::PresentMode::Fifo;
    }
    [wgpu::PresentMode::Mailbox, wgpu::PresentMode::Immediate]
        .into_iter()
        .find(|mode| modes.contains(mode))
        .unwrap_or(wgpu::PresentMode::Fifo)
}
