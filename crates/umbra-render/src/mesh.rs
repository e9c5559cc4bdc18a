//! Vertex format, procedural mesh data and drawable geometry.

use std::rc::Rc;

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

use crate::backend::MeshId;
use crate::device::RenderDevice;
use crate::error::DeviceError;
use crate::material::Material;

/// The single vertex layout every mesh uses.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    pub const ATTRIBUTES: [wgpu::VertexAttribute; 3] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2];

    pub fn new(position: Vec3, normal: Vec3, uv: Vec2) -> Self {
        Self {
            position: position.to_array(),
            normal: normal.to_array(),
            uv: uv.to_array(),
        }
    }

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

/// Something that can contribute vertex extents and draw itself.
///
/// `submit_draw` issues draws only. It must leave the bound target,
/// viewport and transforms as it found them.
pub trait Geometry {
    /// Every vertex position, batch by batch.
    fn positions(&self) -> Box<dyn Iterator<Item = Vec3> + '_>;

    /// Draw with `material`, or with each batch's own material when `None`.
    fn submit_draw(&self, device: &mut RenderDevice, material: Option<&dyn Material>);
}

// ---------------------------------------------------------------------------
// CPU mesh data
// ---------------------------------------------------------------------------

/// Vertex and index data before upload.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Axis-aligned box from `min` to `max`, 24 vertices with per-face normals.
    pub fn cube(min: Vec3, max: Vec3) -> Self {
        Self::frustum(min, max, Vec3::new(min.x, max.y, min.z), Vec3::new(max.x, max.y, max.z))
    }

    /// Six-sided solid with an axis-aligned bottom rectangle and top rectangle.
    ///
    /// The bottom face lies at `min_bottom.y`, the top face at `min_top.y`.
    /// The `y` of both `max_*` corners is ignored.
    pub fn frustum(min_bottom: Vec3, max_bottom: Vec3, min_top: Vec3, max_top: Vec3) -> Self {
        let (y0, y1) = (min_bottom.y, min_top.y);
        let b = |x: f32, z: f32| Vec3::new(x, y0, z);
        let t = |x: f32, z: f32| Vec3::new(x, y1, z);
        let (bx0, bx1, bz0, bz1) = (min_bottom.x, max_bottom.x, min_bottom.z, max_bottom.z);
        let (tx0, tx1, tz0, tz1) = (min_top.x, max_top.x, min_top.z, max_top.z);

        // Each face: bottom-left, bottom-right, top-right, top-left seen from outside.
        let faces = [
            [b(bx0, bz1), b(bx1, bz1), t(tx1, tz1), t(tx0, tz1)], // front (+z)
            [b(bx1, bz0), b(bx0, bz0), t(tx0, tz0), t(tx1, tz0)], // back (-z)
            [b(bx0, bz0), b(bx0, bz1), t(tx0, tz1), t(tx0, tz0)], // left (-x)
            [b(bx1, bz1), b(bx1, bz0), t(tx1, tz0), t(tx1, tz1)], // right (+x)
            [t(tx0, tz1), t(tx1, tz1), t(tx1, tz0), t(tx0, tz0)], // up
            [b(bx0, bz0), b(bx1, bz0), b(bx1, bz1), b(bx0, bz1)], // down
        ];
        let uvs = [
            Vec2::new(0.0, 1.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(0.0, 0.0),
        ];

        let mut data = MeshData::default();
        for corners in faces {
            let base = data.vertices.len() as u32;
            let normal = (corners[1] - corners[0])
                .cross(corners[3] - corners[0])
                .normalize_or_zero();
            for (corner, uv) in corners.iter().zip(uvs) {
                data.vertices.push(Vertex::new(*corner, normal, uv));
            }
            data.indices
                .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        data
    }

    /// Horizontal quad of `width` x `depth` centered on the origin, facing +Y.
    pub fn plane(width: f32, depth: f32) -> Self {
        let (hw, hd) = (width * 0.5, depth * 0.5);
        let vertices = vec![
            Vertex::new(Vec3::new(-hw, 0.0, hd), Vec3::Y, Vec2::new(0.0, 0.0)),
            Vertex::new(Vec3::new(hw, 0.0, hd), Vec3::Y, Vec2::new(1.0, 0.0)),
            Vertex::new(Vec3::new(hw, 0.0, -hd), Vec3::Y, Vec2::new(1.0, 1.0)),
            Vertex::new(Vec3::new(-hw, 0.0, -hd), Vec3::Y, Vec2::new(0.0, 1.0)),
        ];
        Self {
            vertices,
            indices: vec![0, 1, 3, 1, 2, 3],
        }
    }
}

// ---------------------------------------------------------------------------
// Uploaded meshes
// ---------------------------------------------------------------------------

/// One uploaded draw batch with an optional default material.
pub struct SubMesh {
    mesh: MeshId,
    index_count: u32,
    positions: Vec<Vec3>,
    material: Option<Rc<dyn Material>>,
}

impl SubMesh {
    /// Upload `data` and keep a CPU copy of its positions for bounds.
    pub fn upload(
        device: &mut RenderDevice,
        data: &MeshData,
        material: Option<Rc<dyn Material>>,
    ) -> Result<Self, DeviceError> {
        let mesh = device.create_mesh(&data.vertices, &data.indices)?;
        Ok(Self {
            mesh,
            index_count: data.indices.len() as u32,
            positions: data.vertices.iter().map(|v| Vec3::from(v.position)).collect(),
            material,
        })
    }

    pub fn mesh_id(&self) -> MeshId {
        self.mesh
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    pub fn material(&self) -> Option<&Rc<dyn Material>> {
        self.material.as_ref()
    }

    pub fn set_material(&mut self, material: Option<Rc<dyn Material>>) {
        self.material = material;
    }

    fn draw(&self, device: &mut RenderDevice, material: Option<&dyn Material>) {
        let Some(material) = material.or(self.material.as_deref()) else {
            log::debug!("skipping draw of {:?}: no material", self.mesh);
            return;
        };
        let saved = device.render_states();
        material.bind(device);
        device.draw_indexed(self.mesh, self.index_count);
        device.restore_render_states(saved);
    }
}

/// A named list of draw batches.
pub struct Mesh {
    name: String,
    submeshes: Vec<SubMesh>,
}

impl Mesh {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            submeshes: Vec::new(),
        }
    }

    /// Upload `data` as a single-batch mesh.
    pub fn from_data(
        device: &mut RenderDevice,
        name: impl Into<String>,
        data: &MeshData,
        material: Option<Rc<dyn Material>>,
    ) -> Result<Self, DeviceError> {
        let mut mesh = Self::new(name);
        mesh.add_submesh(SubMesh::upload(device, data, material)?);
        Ok(mesh)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_submesh(&mut self, submesh: SubMesh) {
        self.submeshes.push(submesh);
    }

    pub fn submeshes(&self) -> &[SubMesh] {
        &self.submeshes
    }

    pub fn submesh_mut(&mut self, index: usize) -> Option<&mut SubMesh> {
        self.submeshes.get_mut(index)
    }

    /// Release every batch's GPU buffers.
    pub fn destroy(self, device: &mut RenderDevice) {
        for sub in self.submeshes {
            device.destroy_mesh(sub.mesh);
        }
    }
}

impl Geometry for Mesh {
    fn positions(&self) -> Box<dyn Iterator<Item = Vec3> + '_> {
        Box::new(self.submeshes.iter().flat_map(|s| s.positions.iter().copied()))
    }

    fn submit_draw(&self, device: &mut RenderDevice, material: Option<&dyn Material>) {
        for sub in &self.submeshes {
            sub.draw(device, material);
        }
    }
}
