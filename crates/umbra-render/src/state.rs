//! Backend-neutral pipeline state descriptions.
//!
//! These are plain values. The device compares them by value against what
//! is already bound and only talks to the backend when something changed.

/// Depth comparison function.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum CompareFunction {
    Never,
    Less,
    Equal,
    #[default]
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

/// Depth test and depth write configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DepthStencilConfig {
    pub depth_test: bool,
    pub depth_write: bool,
    pub compare: CompareFunction,
}

impl Default for DepthStencilConfig {
    /// Test on, write on, `LessEqual`.
    fn default() -> Self {
        Self {
            depth_test: true,
            depth_write: true,
            compare: CompareFunction::LessEqual,
        }
    }
}

impl DepthStencilConfig {
    pub fn with_compare(mut self, compare: CompareFunction) -> Self {
        self.compare = compare;
        self
    }

    pub fn with_depth_write(mut self, enabled: bool) -> Self {
        self.depth_write = enabled;
        self
    }

    pub fn with_depth_test(mut self, enabled: bool) -> Self {
        self.depth_test = enabled;
        self
    }
}

/// Which triangle faces are discarded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    None,
    Front,
    #[default]
    Back,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum FillMode {
    #[default]
    Solid,
    Wireframe,
}

/// Rasterizer configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RasterConfig {
    pub fill: FillMode,
    pub cull: CullMode,
    /// Counter-clockwise triangles face the viewer.
    pub front_ccw: bool,
    pub depth_clip: bool,
}

impl Default for RasterConfig {
    /// Solid fill, back-face culling, depth clipping.
    fn default() -> Self {
        Self {
            fill: FillMode::Solid,
            cull: CullMode::Back,
            front_ccw: true,
            depth_clip: true,
        }
    }
}

impl RasterConfig {
    pub fn with_cull(mut self, cull: CullMode) -> Self {
        self.cull = cull;
        self
    }

    pub fn with_fill(mut self, fill: FillMode) -> Self {
        self.fill = fill;
        self
    }

    pub fn with_front_ccw(mut self, front_ccw: bool) -> Self {
        self.front_ccw = front_ccw;
        self
    }
}

/// Color blending for the bound render target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum BlendConfig {
    #[default]
    Opaque,
    /// `src * a + dst * (1 - a)`.
    AlphaBlend,
    Additive,
}

/// Snapshot of the three cached state configurations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct RenderStates {
    pub depth_stencil: DepthStencilConfig,
    pub raster: RasterConfig,
    pub blend: BlendConfig,
}

/// Pixel rectangle with a depth range.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    /// Viewport covering a whole `width` x `height` target with depth 0..1.
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

/// Color target formats a surface may request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum PixelFormat {
    #[default]
    Rgba8Unorm,
    Rgba16Float,
    /// Single channel, used for shadow depth and occlusion terms.
    R32Float,
}

/// Linear RGBA color.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const BLACK: Color = Color::rgba(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: Color = Color::rgba(1.0, 1.0, 1.0, 1.0);
    pub const YELLOW: Color = Color::rgba(1.0, 1.0, 0.0, 1.0);
    /// Dark blue background used when nothing else is configured.
    pub const DEEP_BLUE: Color = Color::rgba(0.0, 0.125, 0.3, 1.0);

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl From<[f32; 4]> for Color {
    fn from(c: [f32; 4]) -> Self {
        Self::rgba(c[0], c[1], c[2], c[3])
    }
}

/// Slot in the frame constant block targeted by
/// [`RenderDevice::set_transform`](crate::RenderDevice::set_transform).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransformKind {
    World,
    WorldInverseTranspose,
    View,
    Projection,
}
