//! Shared fixtures for unit tests.

use std::rc::Rc;

use glam::Vec3;
use umbra_render::{
    Camera, HeadlessBackend, HeadlessProbe, Material, Mesh, MeshData, ProgramId, RenderDevice,
    ShaderMaterial,
};

pub(crate) fn headless(width: u32, height: u32) -> (RenderDevice, HeadlessProbe) {
    let backend = HeadlessBackend::new(width, height);
    let probe = backend.probe();
    let device = RenderDevice::new(Box::new(backend), Camera::default()).unwrap();
    (device, probe)
}

pub(crate) fn material(name: &str, program: u32) -> Rc<ShaderMaterial> {
    Rc::new(ShaderMaterial::new(name, ProgramId(program)))
}

pub(crate) fn cube(device: &mut RenderDevice, material: Option<Rc<dyn Material>>) -> Rc<Mesh> {
    let data = MeshData::cube(Vec3::splat(-1.0), Vec3::splat(1.0));
    Rc::new(Mesh::from_data(device, "cube", &data, material).unwrap())
}
