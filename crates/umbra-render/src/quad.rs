//! Screen-space quads for full-screen passes and debug overlays.

use glam::{Mat4, Vec2, Vec3};

use crate::backend::MeshId;
use crate::device::RenderDevice;
use crate::error::DeviceError;
use crate::material::Material;
use crate::mesh::{Geometry, Vertex};
use crate::state::{CullMode, TransformKind};

/// Two triangles over the four corners: top-left, top-right, bottom-left, bottom-right.
pub const QUAD_INDICES: [u32; 6] = [0, 1, 2, 1, 3, 2];

/// A quad in normalized device coordinates, drawn with identity world transform.
///
/// `normal.x` of each vertex carries its corner index (0..=3) so shaders can
/// look up the matching far-frustum corner.
pub struct ScreenQuad {
    mesh: MeshId,
    vertices: [Vertex; 4],
}

impl ScreenQuad {
    /// Quad covering the whole target.
    pub fn new(device: &mut RenderDevice) -> Result<Self, DeviceError> {
        Self::with_rect(device, Vec2::new(-1.0, -1.0), Vec2::new(1.0, 1.0))
    }

    /// Quad covering the NDC rectangle `min..max`.
    pub fn with_rect(device: &mut RenderDevice, min: Vec2, max: Vec2) -> Result<Self, DeviceError> {
        let vertices = quad_vertices(min, max);
        let mesh = device.create_mesh(&vertices, &QUAD_INDICES)?;
        Ok(Self { mesh, vertices })
    }

    pub fn mesh_id(&self) -> MeshId {
        self.mesh
    }

    /// Draw with `material` using an identity world transform.
    ///
    /// The corner order winds clockwise on screen, so culling is off for the draw.
    pub fn draw(&self, device: &mut RenderDevice, material: &dyn Material) {
        device.set_transform(TransformKind::World, Mat4::IDENTITY, false);
        device.set_transform(TransformKind::WorldInverseTranspose, Mat4::IDENTITY, true);
        let saved = device.render_states();
        device.set_raster_state(saved.raster.with_cull(CullMode::None));
        material.bind(device);
        device.draw_indexed(self.mesh, QUAD_INDICES.len() as u32);
        device.restore_render_states(saved);
    }

    pub fn destroy(self, device: &mut RenderDevice) {
        device.destroy_mesh(self.mesh);
    }
}

impl Geometry for ScreenQuad {
    fn positions(&self) -> Box<dyn Iterator<Item = Vec3> + '_> {
        Box::new(self.vertices.iter().map(|v| Vec3::from(v.position)))
    }

    /// Quads have no material of their own; without one nothing is drawn.
    fn submit_draw(&self, device: &mut RenderDevice, material: Option<&dyn Material>) {
        if let Some(material) = material {
            self.draw(device, material);
        }
    }
}

fn quad_vertices(min: Vec2, max: Vec2) -> [Vertex; 4] {
    let corners = [
        (Vec2::new(min.x, max.y), Vec2::new(0.0, 0.0)),
        (Vec2::new(max.x, max.y), Vec2::new(1.0, 0.0)),
        (Vec2::new(min.x, min.y), Vec2::new(0.0, 1.0)),
        (Vec2::new(max.x, min.y), Vec2::new(1.0, 1.0)),
    ];
    let mut vertices = [Vertex::new(Vec3::ZERO, Vec3::ZERO, Vec2::ZERO); 4];
    for (index, (pos, uv)) in corners.into_iter().enumerate() {
        vertices[index] = Vertex::new(pos.extend(0.0), Vec3::new(index as f32, 0.0, 0.0), uv);
    }
    vertices
}
