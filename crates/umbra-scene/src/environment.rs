//! Sky, terrain and water collaborators drawn by the scene pipeline.
//!
//! The traits are what the pipeline depends on. The procedural types below
//! are the stock implementations used by the demo.

use std::rc::Rc;

use glam::{Mat4, Vec2, Vec3};
use umbra_math::{Aabb, Plane};
use umbra_render::shaders::with_prelude;
use umbra_render::{
    BlendConfig, Color, ColorTargetId, CullMode, DepthStencilConfig, DeviceError, Geometry,
    Material, Mesh, MeshData, PhaseMask, RasterConfig, RenderDevice, RenderSurface,
    ShaderMaterial, SurfaceDesc, TransformKind, Vertex,
};

use crate::pipeline::{RenderWorld, ScenePipeline};
use crate::shaders;

pub trait Sky {
    fn update(&mut self, _elapsed_seconds: f32) {}
    fn render(&self, device: &mut RenderDevice);
    fn destroy(self: Box<Self>, _device: &mut RenderDevice) {}
}

pub trait Terrain {
    fn update(&mut self, _elapsed_seconds: f32) {}

    /// Draw with `material`, or with the terrain's own material for `None`.
    fn render(&self, device: &mut RenderDevice, material: Option<&dyn Material>);

    /// Material used when the terrain is drawn into the shadow map.
    fn shadow_material(&self) -> &dyn Material;

    /// World-space extent, used to fit the shadow projection.
    fn bounds(&self) -> Aabb;

    fn destroy(self: Box<Self>, _device: &mut RenderDevice) {}
}

pub trait Water {
    fn update(&mut self, elapsed_seconds: f32);

    /// Passes the water samples later in the frame, drawn before the main
    /// pipeline run. `world` holds everything but the water's own phase.
    fn render_offscreen(
        &self,
        _device: &mut RenderDevice,
        _pipeline: &mut ScenePipeline,
        _world: &RenderWorld<'_>,
    ) {
    }

    fn render(&self, device: &mut RenderDevice);

    /// Height of the water plane.
    fn height(&self) -> f32;

    fn on_display_resized(&mut self, _device: &mut RenderDevice) -> Result<(), DeviceError> {
        Ok(())
    }

    fn destroy(self: Box<Self>, _device: &mut RenderDevice) {}
}

fn push_world(device: &mut RenderDevice, world: Mat4) {
    device.set_shadow_receiver(true);
    device.set_transform(TransformKind::World, world, false);
    device.set_transform(TransformKind::WorldInverseTranspose, world.inverse().transpose(), true);
}

// ---------------------------------------------------------------------------
// Sky
// ---------------------------------------------------------------------------

/// Unit cube drawn on the far plane with a vertical color gradient.
pub struct GradientSky {
    mesh: Mesh,
    material: ShaderMaterial,
}

impl GradientSky {
    pub fn new(device: &mut RenderDevice) -> Result<Self, DeviceError> {
        let material = ShaderMaterial::from_wgsl(device, "sky", &with_prelude(shaders::SKY))?
            .with_depth_stencil(DepthStencilConfig::default().with_depth_write(false))
            .with_raster(RasterConfig::default().with_cull(CullMode::None));
        let data = MeshData::cube(Vec3::splat(-1.0), Vec3::splat(1.0));
        let mesh = Mesh::from_data(device, "sky", &data, None)?;
        Ok(Self { mesh, material })
    }

    pub fn material(&self) -> &ShaderMaterial {
        &self.material
    }
}

impl Sky for GradientSky {
    fn render(&self, device: &mut RenderDevice) {
        push_world(device, Mat4::IDENTITY);
        self.mesh.submit_draw(device, Some(&self.material));
    }

    fn destroy(self: Box<Self>, device: &mut RenderDevice) {
        self.mesh.destroy(device);
    }
}

// ---------------------------------------------------------------------------
// Terrain
// ---------------------------------------------------------------------------

/// Grid layout of a [`HeightfieldTerrain`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TerrainDesc {
    /// Edge length of the square terrain, centered on the origin.
    pub size: f32,
    /// Quads per edge.
    pub resolution: u32,
    /// Peak height of the rolling hills.
    pub amplitude: f32,
}

impl Default for TerrainDesc {
    fn default() -> Self {
        Self {
            size: 200.0,
            resolution: 128,
            amplitude: 6.0,
        }
    }
}

impl TerrainDesc {
    pub fn height_at(&self, x: f32, z: f32) -> f32 {
        self.amplitude * ((x * 0.05).sin() * (z * 0.04).cos() + 0.5 * ((x + z) * 0.021).sin())
    }

    fn normal_at(&self, x: f32, z: f32) -> Vec3 {
        let e = 0.1;
        let dx = self.height_at(x + e, z) - self.height_at(x - e, z);
        let dz = self.height_at(x, z + e) - self.height_at(x, z - e);
        Vec3::new(-dx, 2.0 * e, -dz).normalize()
    }

    /// Vertex grid with analytic normals, wound counter-clockwise seen from above.
    pub fn build(&self) -> MeshData {
        let n = self.resolution.max(1);
        let step = self.size / n as f32;
        let half = self.size * 0.5;
        let mut data = MeshData::default();
        for j in 0..=n {
            for i in 0..=n {
                let (x, z) = (-half + i as f32 * step, -half + j as f32 * step);
                let uv = Vec2::new(i as f32 / n as f32, j as f32 / n as f32);
                data.vertices.push(Vertex::new(
                    Vec3::new(x, self.height_at(x, z), z),
                    self.normal_at(x, z),
                    uv,
                ));
            }
        }
        let row = n + 1;
        for j in 0..n {
            for i in 0..n {
                let a = j * row + i;
                let b = a + row;
                data.indices.extend_from_slice(&[a, b, a + 1, a + 1, b, b + 1]);
            }
        }
        data
    }
}

/// Procedural rolling-hill terrain.
pub struct HeightfieldTerrain {
    desc: TerrainDesc,
    mesh: Mesh,
    material: Rc<dyn Material>,
    shadow_material: ShaderMaterial,
    bounds: Aabb,
}

impl HeightfieldTerrain {
    /// Terrain drawn with a fresh [`stock_material`](Self::stock_material).
    pub fn new(device: &mut RenderDevice, desc: TerrainDesc) -> Result<Self, DeviceError> {
        let material = Rc::new(Self::stock_material(device)?);
        Self::with_material(device, desc, material)
    }

    /// The slope-tinted terrain program, named `"terrain"`.
    pub fn stock_material(device: &mut RenderDevice) -> Result<ShaderMaterial, DeviceError> {
        ShaderMaterial::from_wgsl(device, "terrain", &with_prelude(shaders::TERRAIN))
    }

    pub fn with_material(
        device: &mut RenderDevice,
        desc: TerrainDesc,
        material: Rc<dyn Material>,
    ) -> Result<Self, DeviceError> {
        let shadow_material =
            ShaderMaterial::from_wgsl(device, "terrain_shadow", &with_prelude(shaders::SHADOW_DEPTH))?;
        let data = desc.build();
        let mesh = Mesh::from_data(device, "terrain", &data, None)?;
        let bounds = Aabb::from_points(mesh.positions()).unwrap_or_default();
        log::info!(
            "terrain ready: {}x{} quads over {}m",
            desc.resolution,
            desc.resolution,
            desc.size
        );
        Ok(Self {
            desc,
            mesh,
            material,
            shadow_material,
            bounds,
        })
    }

    pub fn desc(&self) -> &TerrainDesc {
        &self.desc
    }

    pub fn set_material(&mut self, material: Rc<dyn Material>) {
        self.material = material;
    }

    pub fn material(&self) -> &Rc<dyn Material> {
        &self.material
    }
}

impl Terrain for HeightfieldTerrain {
    fn render(&self, device: &mut RenderDevice, material: Option<&dyn Material>) {
        push_world(device, Mat4::IDENTITY);
        let material = material.unwrap_or(self.material.as_ref());
        self.mesh.submit_draw(device, Some(material));
    }

    fn shadow_material(&self) -> &dyn Material {
        &self.shadow_material
    }

    fn bounds(&self) -> Aabb {
        self.bounds
    }

    fn destroy(self: Box<Self>, device: &mut RenderDevice) {
        self.mesh.destroy(device);
    }
}

// ---------------------------------------------------------------------------
// Water
// ---------------------------------------------------------------------------

/// Vertical amplitude of the water surface bob.
const BOB_AMPLITUDE: f32 = 0.05;

/// Reflection target size relative to the display.
pub const REFLECTION_RATIO: f32 = 0.5;

/// Texture slot the water material samples its reflection from.
pub const REFLECTION_SLOT: usize = 0;

/// Texture slot the water material samples its refraction copy from.
pub const REFRACTION_SLOT: usize = 1;

/// Mirror across the horizontal plane at `height`.
pub fn reflection_matrix(height: f32) -> Mat4 {
    Mat4::from_translation(Vec3::new(0.0, height, 0.0))
        * Mat4::from_scale(Vec3::new(1.0, -1.0, 1.0))
        * Mat4::from_translation(Vec3::new(0.0, -height, 0.0))
}

/// Alpha-blended horizontal plane that bobs gently over time.
///
/// Each frame it renders the world above the plane mirrored into a
/// reflection surface, and copies the primary target into a refraction
/// surface right before its own draw.
pub struct FlatWater {
    mesh: Mesh,
    material: Rc<ShaderMaterial>,
    reflection: RenderSurface,
    refraction: RenderSurface,
    height: f32,
    phase: f32,
}

impl FlatWater {
    /// Water drawn with a fresh [`stock_material`](Self::stock_material).
    pub fn new(device: &mut RenderDevice, height: f32, size: f32) -> Result<Self, DeviceError> {
        let material = Rc::new(Self::stock_material(device)?);
        Self::with_material(device, height, size, material)
    }

    /// The translucent water program, named `"water"`.
    pub fn stock_material(device: &mut RenderDevice) -> Result<ShaderMaterial, DeviceError> {
        Ok(
            ShaderMaterial::from_wgsl(device, "water", &with_prelude(shaders::WATER))?
                .with_blend(BlendConfig::AlphaBlend)
                .with_depth_stencil(DepthStencilConfig::default().with_depth_write(false)),
        )
    }

    /// Water drawn with `material`, whose reflection and refraction slots are
    /// pointed at this water's surfaces.
    pub fn with_material(
        device: &mut RenderDevice,
        height: f32,
        size: f32,
        material: Rc<ShaderMaterial>,
    ) -> Result<Self, DeviceError> {
        let (width, display_height) = device.primary_size();
        let mut reflection = RenderSurface::new(
            device,
            SurfaceDesc::new(
                ((width as f32 * REFLECTION_RATIO) as u32).max(1),
                ((display_height as f32 * REFLECTION_RATIO) as u32).max(1),
            ),
        )?;
        reflection.set_clear_color(Color::DEEP_BLUE);
        reflection.set_phase_mask(PhaseMask::SKY | PhaseMask::TERRAIN | PhaseMask::SOLID);

        let refraction = match RenderSurface::new(
            device,
            SurfaceDesc::new(width, display_height)
                .with_own_depth(false)
                .with_aspect_update(false),
        ) {
            Ok(surface) => surface,
            Err(err) => {
                reflection.destroy(device);
                return Err(err);
            }
        };

        material.set_texture(REFLECTION_SLOT, Some(reflection.color_target()));
        material.set_texture(REFRACTION_SLOT, Some(refraction.color_target()));

        let mesh = match Mesh::from_data(device, "water", &MeshData::plane(size, size), None) {
            Ok(mesh) => mesh,
            Err(err) => {
                reflection.destroy(device);
                refraction.destroy(device);
                return Err(err);
            }
        };
        Ok(Self {
            mesh,
            material,
            reflection,
            refraction,
            height,
            phase: 0.0,
        })
    }

    /// World transform for the current phase.
    pub fn world_matrix(&self) -> Mat4 {
        let y = self.height + BOB_AMPLITUDE * (self.phase * 0.8).sin();
        Mat4::from_translation(Vec3::new(0.0, y, 0.0))
    }

    pub fn material(&self) -> &Rc<ShaderMaterial> {
        &self.material
    }

    pub fn reflection_target(&self) -> ColorTargetId {
        self.reflection.color_target()
    }

    pub fn refraction_target(&self) -> ColorTargetId {
        self.refraction.color_target()
    }

    pub fn reflection_size(&self) -> (u32, u32) {
        self.reflection.size()
    }

    pub fn refraction_size(&self) -> (u32, u32) {
        self.refraction.size()
    }
}

impl Water for FlatWater {
    fn update(&mut self, elapsed_seconds: f32) {
        self.phase = elapsed_seconds;
    }

    /// Mirror the camera across the water plane and draw what lies above it.
    fn render_offscreen(
        &self,
        device: &mut RenderDevice,
        pipeline: &mut ScenePipeline,
        world: &RenderWorld<'_>,
    ) {
        let mut target = self.reflection.bind(device);
        let view = target.frame_constants().view;
        let mut pass = target.scoped_states();

        // Mirroring flips the winding.
        let raster = pass.raster_state();
        pass.set_raster_state(raster.with_front_ccw(!raster.front_ccw));
        pass.enable_clip_plane(Some(Plane::horizontal(self.height)));
        pass.set_transform(TransformKind::View, view * reflection_matrix(self.height), true);

        pipeline.run_frame(&mut pass, world, self.reflection.phase_mask(), None);

        pass.enable_clip_plane(None);
        pass.set_transform(TransformKind::View, view, true);
    }

    fn render(&self, device: &mut RenderDevice) {
        if device.current_target() == device.primary_target()
            && let Err(err) = device.copy_primary_to(self.refraction.color_target())
        {
            log::warn!("water refraction copy skipped: {err}");
        }
        push_world(device, self.world_matrix());
        self.mesh.submit_draw(device, Some(self.material.as_ref()));
    }

    fn height(&self) -> f32 {
        self.height
    }

    fn on_display_resized(&mut self, device: &mut RenderDevice) -> Result<(), DeviceError> {
        self.reflection.on_display_resized(device)?;
        self.refraction.on_display_resized(device)
    }

    fn destroy(self: Box<Self>, device: &mut RenderDevice) {
        self.mesh.destroy(device);
        self.reflection.destroy(device);
        self.refraction.destroy(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::headless;
    use umbra_render::{CompareFunction, DeviceCall, ProgramId};

    #[test]
    fn test_sky_draw_restores_depth_state() {
        let (mut device, probe) = headless(800, 600);
        let sky = GradientSky::new(&mut device).unwrap();
        let before = device.render_states();
        probe.take_calls();

        sky.render(&mut device);

        assert_eq!(probe.draws().len(), 1);
        let written = probe.calls().into_iter().any(|c| {
            matches!(c, DeviceCall::CreateDepthStencilState(config, _)
                if !config.depth_write && config.compare == CompareFunction::LessEqual)
        });
        assert!(written);
        assert_eq!(device.render_states(), before);
    }

    #[test]
    fn test_terrain_grid_is_closed_and_upward() {
        let desc = TerrainDesc {
            size: 10.0,
            resolution: 4,
            amplitude: 0.0,
        };
        let data = desc.build();
        assert_eq!(data.vertices.len(), 25);
        assert_eq!(data.indices.len(), 4 * 4 * 6);
        for tri in data.indices.chunks(3) {
            let p = |i: u32| Vec3::from(data.vertices[i as usize].position);
            let normal = (p(tri[1]) - p(tri[0])).cross(p(tri[2]) - p(tri[0]));
            assert!(normal.y > 0.0);
        }
    }

    #[test]
    fn test_terrain_bounds_cover_heights() {
        let (mut device, _probe) = headless(800, 600);
        let desc = TerrainDesc {
            size: 50.0,
            resolution: 16,
            amplitude: 3.0,
        };
        let terrain = HeightfieldTerrain::new(&mut device, desc).unwrap();
        let bounds = terrain.bounds();
        assert_eq!(bounds.min.x, -25.0);
        assert_eq!(bounds.max.z, 25.0);
        assert!(bounds.max.y <= 4.5 && bounds.min.y >= -4.5);
    }

    #[test]
    fn test_terrain_override_material() {
        let (mut device, probe) = headless(800, 600);
        let terrain = HeightfieldTerrain::new(&mut device, TerrainDesc::default()).unwrap();
        let override_material = ShaderMaterial::new("override", ProgramId(99));
        probe.take_calls();

        terrain.render(&mut device, Some(&override_material));

        assert!(probe.calls().contains(&DeviceCall::BindProgram(ProgramId(99))));
    }

    #[test]
    fn test_terrain_shares_given_material() {
        let (mut device, _probe) = headless(800, 600);
        let material: Rc<dyn Material> = Rc::new(ShaderMaterial::new("shared", ProgramId(5)));
        let desc = TerrainDesc {
            size: 10.0,
            resolution: 2,
            amplitude: 0.0,
        };
        let terrain = HeightfieldTerrain::with_material(&mut device, desc, Rc::clone(&material)).unwrap();
        assert!(Rc::ptr_eq(terrain.material(), &material));
    }

    #[test]
    fn test_water_material_samples_its_surfaces() {
        let (mut device, _probe) = headless(800, 600);
        let water = FlatWater::new(&mut device, 0.0, 100.0).unwrap();
        let material = water.material();
        assert_eq!(material.texture(REFLECTION_SLOT), Some(water.reflection_target()));
        assert_eq!(material.texture(REFRACTION_SLOT), Some(water.refraction_target()));
        assert_eq!(water.reflection_size(), (400, 300));
        assert_eq!(water.refraction_size(), (800, 600));
    }

    #[test]
    fn test_water_copies_primary_before_drawing() {
        let (mut device, probe) = headless(800, 600);
        let water = FlatWater::new(&mut device, 0.0, 100.0).unwrap();
        probe.take_calls();

        water.render(&mut device);

        let calls = probe.calls();
        let copy_at = calls
            .iter()
            .position(|c| *c == DeviceCall::CopyPrimaryTo(water.refraction_target()))
            .unwrap();
        let draw_at = calls
            .iter()
            .position(|c| matches!(c, DeviceCall::DrawIndexed { .. }))
            .unwrap();
        assert!(copy_at < draw_at);
    }

    #[test]
    fn test_water_skips_copy_inside_offscreen_surface() {
        let (mut device, probe) = headless(800, 600);
        let water = FlatWater::new(&mut device, 0.0, 100.0).unwrap();
        let surface = RenderSurface::new(&mut device, SurfaceDesc::new(64, 64)).unwrap();
        probe.take_calls();

        water.render(&mut surface.bind(&mut device));

        assert_eq!(probe.count(|c| matches!(c, DeviceCall::CopyPrimaryTo(_))), 0);
        assert_eq!(probe.draws().len(), 1);
    }

    #[test]
    fn test_reflection_pass_clips_below_water_and_restores() {
        let (mut device, probe) = headless(800, 600);
        let quad = umbra_render::ScreenQuad::new(&mut device).unwrap();
        let water = FlatWater::new(&mut device, 2.0, 100.0).unwrap();
        let mut scene = crate::scene::Scene::new("s");
        let lit = crate::testing::material("lit", 10);
        scene.add_entity(crate::entity::Entity::new(crate::testing::cube(&mut device, Some(lit))));
        let mut world = RenderWorld::new(&quad);
        world.scene = Some(&scene);
        let mut pipeline = ScenePipeline::new();
        device.update_frame(0.0);
        let view = device.frame_constants().view;
        let states = device.render_states();
        probe.take_calls();

        water.render_offscreen(&mut device, &mut pipeline, &world);

        let entity_upload = probe
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                DeviceCall::UploadConstants(block) if block.params[1] == 1.0 => Some(block),
                _ => None,
            })
            .last();
        let block = entity_upload.expect("clip plane uploaded");
        assert_eq!(block.clip_plane, [0.0, 1.0, 0.0, -2.0]);
        let mirrored = Mat4::from_cols_array_2d(&block.view);
        assert!(mirrored.abs_diff_eq(view * reflection_matrix(2.0), 1e-5));
        let reflection = water.reflection_target();
        assert!(probe.calls().iter().any(
            |c| matches!(c, DeviceCall::BindTargets { color, .. } if *color == reflection)
        ));
        assert_eq!(probe.draws().len(), 1);

        assert_eq!(probe.last_constants().unwrap().params[1], 0.0);
        assert!(device.frame_constants().clip_plane.is_none());
        assert!(device.frame_constants().view.abs_diff_eq(view, 1e-6));
        assert_eq!(device.render_states(), states);
        assert_eq!(device.current_target(), device.primary_target());
    }

    #[test]
    fn test_reflection_matrix_mirrors_across_plane() {
        let mirror = reflection_matrix(2.0);
        let p = mirror.transform_point3(Vec3::new(1.0, 5.0, -3.0));
        assert!(p.abs_diff_eq(Vec3::new(1.0, -1.0, -3.0), 1e-6));
    }

    #[test]
    fn test_water_surfaces_follow_display_resize() {
        let (mut device, probe) = headless(800, 600);
        let mut water = FlatWater::new(&mut device, 0.0, 100.0).unwrap();
        device.resize_primary(1280, 720);
        water.on_display_resized(&mut device).unwrap();
        assert_eq!(water.reflection_size(), (640, 360));
        assert_eq!(probe.color_target_size(water.refraction_target()), Some((1280, 720)));
    }

    #[test]
    fn test_water_destroy_releases_surfaces() {
        let (mut device, probe) = headless(800, 600);
        let before = probe.live_color_targets();
        let water = FlatWater::new(&mut device, 0.0, 100.0).unwrap();
        assert_eq!(probe.live_color_targets(), before + 2);
        Box::new(water).destroy(&mut device);
        assert_eq!(probe.live_color_targets(), before);
    }

    #[test]
    fn test_water_bobs_around_height() {
        let (mut device, _probe) = headless(800, 600);
        let mut water = FlatWater::new(&mut device, 2.0, 100.0).unwrap();
        assert_eq!(water.world_matrix().w_axis.y, 2.0);
        water.update(std::f32::consts::PI / 1.6);
        assert!((water.world_matrix().w_axis.y - (2.0 + BOB_AMPLITUDE)).abs() < 1e-5);
        assert_eq!(water.height(), 2.0);
    }
}
