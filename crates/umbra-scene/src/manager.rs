//! Top-level owner of scenes, environment and the offscreen passes.

use std::rc::Rc;

use glam::Vec3;
use umbra_math::Aabb;
use umbra_render::shaders::with_prelude;
use umbra_render::{
    AssetRegistry, Material, Mesh, MeshData, PhaseMask, RenderDevice, ScreenQuad, ShaderMaterial,
};

use crate::debug_view::{DebugOverlay, DebugView};
use crate::entity::Entity;
use crate::environment::{
    FlatWater, GradientSky, HeightfieldTerrain, Sky, Terrain, TerrainDesc, Water,
};
use crate::error::SceneError;
use crate::pipeline::{RenderWorld, ScenePipeline};
use crate::scene::Scene;
use crate::shaders;
use crate::shadow::{DEFAULT_SHADOW_MAP_SIZE, ShadowMap};
use crate::ssao::AmbientOcclusionPass;
use crate::stats::FrameStats;

/// Edge length of the water plane created by [`SceneManager::create_water`].
pub const WATER_SIZE: f32 = 400.0;

/// Texture slot the stock lit and terrain materials read occlusion from.
pub const OCCLUSION_SLOT: usize = 1;

/// Texture slot the stock lit and terrain materials read the shadow map from.
pub const SHADOW_MAP_SLOT: usize = 2;

/// What a [`SceneManager`] sets up at creation.
#[derive(Clone, Debug, PartialEq)]
pub struct SceneSettings {
    /// Phases drawn into the primary target each frame.
    pub render_flag: PhaseMask,
    /// Square shadow map edge, or `None` for no shadow pass.
    pub shadow_map_size: Option<u32>,
    /// Occlusion target size relative to the display, or `None` for no SSAO.
    pub ssao_ratio: Option<f32>,
    pub sun_direction: Vec3,
    pub sun_color: Vec3,
    pub ambient_color: Vec3,
}

impl Default for SceneSettings {
    fn default() -> Self {
        Self {
            render_flag: PhaseMask::ALL,
            shadow_map_size: Some(DEFAULT_SHADOW_MAP_SIZE),
            ssao_ratio: Some(0.5),
            sun_direction: Vec3::new(1.0, -1.0, 2.0).normalize(),
            sun_color: Vec3::splat(0.8),
            ambient_color: Vec3::splat(0.2),
        }
    }
}

/// Procedural meshes available to [`SceneManager::create_entity`] by name.
pub fn builtin_mesh(name: &str) -> Option<MeshData> {
    let data = match name {
        "cube" => MeshData::cube(Vec3::splat(-0.5), Vec3::splat(0.5)),
        "plane" => MeshData::plane(1.0, 1.0),
        "pyramid" => MeshData::frustum(
            Vec3::new(-0.5, 0.0, -0.5),
            Vec3::new(0.5, 0.0, 0.5),
            Vec3::new(-0.05, 1.0, -0.05),
            Vec3::new(0.05, 1.0, 0.05),
        ),
        _ => return None,
    };
    Some(data)
}

/// Owns everything drawn in a frame and drives update and render.
pub struct SceneManager {
    render_flag: PhaseMask,
    pipeline: ScenePipeline,
    quad: ScreenQuad,
    sky: Option<Box<dyn Sky>>,
    terrain: Option<Box<dyn Terrain>>,
    water: Option<Box<dyn Water>>,
    shadow_map: Option<ShadowMap>,
    ambient_occlusion: Option<AmbientOcclusionPass>,
    debug_overlay: DebugOverlay,
    scenes: Vec<Scene>,
    active: Option<usize>,
    meshes: AssetRegistry<Rc<Mesh>>,
    materials: AssetRegistry<Rc<dyn Material>>,
    lit_material: Rc<ShaderMaterial>,
    terrain_material: Rc<ShaderMaterial>,
    water_material: Rc<ShaderMaterial>,
    stats: FrameStats,
    sun_direction: Vec3,
    sun_color: Vec3,
    ambient_color: Vec3,
}

impl SceneManager {
    /// Set up lighting, the shared screen quad, the offscreen passes and the
    /// stock materials.
    ///
    /// The lit, terrain and water materials are registered in the material
    /// library as `"lit"`, `"terrain"` and `"water"`. Lit and terrain sample
    /// the occlusion target and the shadow map when those passes exist.
    pub fn new(device: &mut RenderDevice, settings: SceneSettings) -> Result<Self, SceneError> {
        device.set_lighting(settings.sun_direction, settings.sun_color, settings.ambient_color);

        let quad = ScreenQuad::new(device)?;
        let shadow_map = settings
            .shadow_map_size
            .map(|size| ShadowMap::new(device, size, settings.sun_direction))
            .transpose()?;
        let ambient_occlusion = settings
            .ssao_ratio
            .map(|ratio| AmbientOcclusionPass::new(device, ratio))
            .transpose()?;
        let debug_overlay = DebugOverlay::new(device)?;

        let lit_material = Rc::new(ShaderMaterial::from_wgsl(
            device,
            "lit",
            &with_prelude(shaders::LIT),
        )?);
        let terrain_material = Rc::new(HeightfieldTerrain::stock_material(device)?);
        let water_material = Rc::new(FlatWater::stock_material(device)?);
        for receiver in [&lit_material, &terrain_material] {
            if let Some(pass) = &ambient_occlusion {
                receiver.set_texture(OCCLUSION_SLOT, Some(pass.occlusion_target()));
            }
            if let Some(shadow) = &shadow_map {
                receiver.set_texture(SHADOW_MAP_SLOT, Some(shadow.color_target()));
            }
        }

        let mut materials: AssetRegistry<Rc<dyn Material>> = AssetRegistry::new();
        materials.insert("lit", lit_material.clone())?;
        materials.insert("terrain", terrain_material.clone())?;
        materials.insert("water", water_material.clone())?;

        log::info!(
            "scene manager ready: phases {:?}, shadow map {}, ssao {}",
            settings.render_flag,
            shadow_map.is_some(),
            ambient_occlusion.is_some()
        );
        Ok(Self {
            render_flag: settings.render_flag,
            pipeline: ScenePipeline::new(),
            quad,
            sky: None,
            terrain: None,
            water: None,
            shadow_map,
            ambient_occlusion,
            debug_overlay,
            scenes: Vec::new(),
            active: None,
            meshes: AssetRegistry::new(),
            materials,
            lit_material,
            terrain_material,
            water_material,
            stats: FrameStats::new(),
            sun_direction: settings.sun_direction,
            sun_color: settings.sun_color,
            ambient_color: settings.ambient_color,
        })
    }

    // -----------------------------------------------------------------------
    // Environment
    // -----------------------------------------------------------------------

    /// Install the stock gradient sky.
    pub fn create_sky(&mut self, device: &mut RenderDevice) -> Result<(), SceneError> {
        let sky = GradientSky::new(device)?;
        self.set_sky(device, Box::new(sky));
        Ok(())
    }

    /// Install a heightfield terrain drawn with the `"terrain"` material.
    pub fn create_terrain(
        &mut self,
        device: &mut RenderDevice,
        desc: TerrainDesc,
    ) -> Result<(), SceneError> {
        let material: Rc<dyn Material> = self.terrain_material.clone();
        let terrain = HeightfieldTerrain::with_material(device, desc, material)?;
        self.set_terrain(device, Box::new(terrain));
        Ok(())
    }

    /// Water plane at `height` drawn with the `"water"` material, reflecting
    /// and refracting the rest of the frame.
    pub fn create_water(&mut self, device: &mut RenderDevice, height: f32) -> Result<(), SceneError> {
        let material = Rc::clone(&self.water_material);
        let water = FlatWater::with_material(device, height, WATER_SIZE, material)?;
        self.set_water(device, Box::new(water));
        Ok(())
    }

    /// Install a sky, releasing the one it replaces.
    pub fn set_sky(&mut self, device: &mut RenderDevice, sky: Box<dyn Sky>) {
        if let Some(old) = self.sky.replace(sky) {
            old.destroy(device);
        }
    }

    /// Install a terrain, releasing the one it replaces.
    pub fn set_terrain(&mut self, device: &mut RenderDevice, terrain: Box<dyn Terrain>) {
        if let Some(old) = self.terrain.replace(terrain) {
            old.destroy(device);
        }
    }

    /// Install a water body, releasing the one it replaces.
    pub fn set_water(&mut self, device: &mut RenderDevice, water: Box<dyn Water>) {
        if let Some(old) = self.water.replace(water) {
            old.destroy(device);
        }
    }

    /// Change the sun for lighting and the shadow map.
    ///
    /// The lighting constants are re-pushed at once; the shadow projection
    /// follows on the next [`update`](Self::update).
    pub fn set_sun_light(&mut self, device: &mut RenderDevice, direction: Vec3, color: Vec3) {
        self.sun_direction = direction;
        self.sun_color = color;
        device.set_lighting(direction, color, self.ambient_color);
        if let Some(shadow) = &mut self.shadow_map {
            shadow.set_light_direction(direction);
        }
    }

    // -----------------------------------------------------------------------
    // Materials
    // -----------------------------------------------------------------------

    /// Add a material to the library under `name`.
    ///
    /// # Errors
    ///
    /// [`SceneError::Registry`] if the name is taken; the existing material stays.
    pub fn add_material(
        &mut self,
        name: &str,
        material: Rc<dyn Material>,
    ) -> Result<(), SceneError> {
        self.materials.insert(name, material)?;
        Ok(())
    }

    /// The library material called `name`.
    pub fn material(&self, name: &str) -> Option<Rc<dyn Material>> {
        self.materials.get(name).cloned()
    }

    // -----------------------------------------------------------------------
    // Entities and scenes
    // -----------------------------------------------------------------------

    /// Add a mesh to the cache under its own name.
    ///
    /// # Errors
    ///
    /// [`SceneError::Registry`] if a mesh with that name is already cached.
    pub fn register_mesh(&mut self, mesh: Mesh) -> Result<Rc<Mesh>, SceneError> {
        let mesh = Rc::new(mesh);
        self.meshes.insert(mesh.name(), Rc::clone(&mesh))?;
        Ok(mesh)
    }

    /// Entity drawing the mesh called `mesh_name`.
    ///
    /// Meshes are cached by name. A name not yet cached is built from
    /// [`builtin_mesh`] with the stock lit material.
    pub fn create_entity(
        &mut self,
        device: &mut RenderDevice,
        mesh_name: &str,
    ) -> Result<Entity, SceneError> {
        if let Some(mesh) = self.meshes.get(mesh_name).cloned() {
            return Ok(Entity::new(mesh));
        }
        let data =
            builtin_mesh(mesh_name).ok_or_else(|| SceneError::MeshNotFound(mesh_name.to_string()))?;
        let material: Rc<dyn Material> = self.lit_material.clone();
        let mesh = Mesh::from_data(device, mesh_name, &data, Some(material))?;
        let mesh = self.register_mesh(mesh)?;
        Ok(Entity::new(mesh))
    }

    /// Add a scene and return its index.
    ///
    /// The active scene is unchanged; call
    /// [`set_active_scene`](Self::set_active_scene) to enter it.
    pub fn add_scene(&mut self, scene: Scene) -> usize {
        self.scenes.push(scene);
        self.scenes.len() - 1
    }

    /// Make scene `index` active and move the camera to its start view.
    ///
    /// Returns `false` and changes nothing for an out-of-range index.
    pub fn set_active_scene(&mut self, device: &mut RenderDevice, index: usize) -> bool {
        let Some(scene) = self.scenes.get(index) else {
            return false;
        };
        scene.enter(device);
        self.active = Some(index);
        true
    }

    /// Hide the debug overlay and move to the next scene, wrapping around.
    ///
    /// With no active scene the first one is entered; with no scenes this
    /// only hides the overlay.
    pub fn toggle_scene(&mut self, device: &mut RenderDevice) {
        self.enable_debug_view(DebugView::None);
        if self.scenes.is_empty() {
            return;
        }
        let next = self.active.map_or(0, |index| (index + 1) % self.scenes.len());
        self.set_active_scene(device, next);
    }

    /// The scene drawn by [`render`](Self::render), if any.
    pub fn active_scene(&self) -> Option<&Scene> {
        self.active.and_then(|index| self.scenes.get(index))
    }

    /// Mutable active scene, for moving its entities between frames.
    pub fn active_scene_mut(&mut self) -> Option<&mut Scene> {
        self.active.and_then(|index| self.scenes.get_mut(index))
    }

    /// Index of the active scene as returned by [`add_scene`](Self::add_scene).
    pub fn active_scene_index(&self) -> Option<usize> {
        self.active
    }

    /// Number of scenes added so far.
    pub fn scene_count(&self) -> usize {
        self.scenes.len()
    }

    // -----------------------------------------------------------------------
    // Debug view
    // -----------------------------------------------------------------------

    /// Show an offscreen target in the screen corner. A view whose pass is
    /// disabled falls back to none.
    pub fn enable_debug_view(&mut self, view: DebugView) {
        let target = match view {
            DebugView::None => None,
            DebugView::ShadowMap => self.shadow_map.as_ref().map(ShadowMap::color_target),
            DebugView::Ssao => self
                .ambient_occlusion
                .as_ref()
                .map(AmbientOcclusionPass::occlusion_target),
        };
        if view != DebugView::None && target.is_none() {
            log::warn!("debug view {view} unavailable: its pass is disabled");
        }
        self.debug_overlay.set_view(view, target);
    }

    /// The view the overlay shows; `None` when hidden or unavailable.
    pub fn debug_view(&self) -> DebugView {
        self.debug_overlay.view()
    }

    // -----------------------------------------------------------------------
    // Frame
    // -----------------------------------------------------------------------

    /// Advance one frame of `delta_seconds`: refit the shadow map, then
    /// update water, sky, terrain and the active scene.
    pub fn update(&mut self, delta_seconds: f32) {
        self.stats.tick(delta_seconds);
        let elapsed = self.stats.elapsed();

        let bounds = self.shadow_bounds();
        if let Some(shadow) = &mut self.shadow_map {
            shadow.update(bounds);
        }
        if let Some(water) = &mut self.water {
            water.update(elapsed);
        }
        if let Some(sky) = &mut self.sky {
            sky.update(elapsed);
        }
        if let Some(terrain) = &mut self.terrain {
            terrain.update(elapsed);
        }
        if let Some(scene) = self.active_scene_mut() {
            scene.update();
        }
    }

    /// Render the shadow map, the water's offscreen passes when water is
    /// requested, then the configured phases into the bound target.
    pub fn render(&mut self, device: &mut RenderDevice) {
        let scene = match self.active {
            Some(index) => self.scenes.get(index),
            None => None,
        };
        let world = RenderWorld {
            sky: self.sky.as_deref(),
            terrain: self.terrain.as_deref(),
            water: self.water.as_deref(),
            scene,
            ambient_occlusion: self.ambient_occlusion.as_ref(),
            debug_overlay: Some(&self.debug_overlay),
            quad: &self.quad,
            last_fps: self.stats.last_fps(),
        };
        if let Some(shadow) = &self.shadow_map {
            shadow.render(device, &mut self.pipeline, &world);
        }
        if self.render_flag.contains(PhaseMask::WATER)
            && let Some(water) = world.water
        {
            water.render_offscreen(device, &mut self.pipeline, &world);
        }
        self.pipeline.run_frame(device, &world, self.render_flag, None);
    }

    /// Follow a primary surface resize: the occlusion targets and the
    /// water's surfaces take the new display size.
    pub fn on_display_resized(&mut self, device: &mut RenderDevice) -> Result<(), SceneError> {
        if let Some(pass) = &mut self.ambient_occlusion {
            pass.on_display_resized(device)?;
        }
        if let Some(water) = &mut self.water {
            water.on_display_resized(device)?;
        }
        Ok(())
    }

    /// Box the shadow map is fitted to: the active scene and the terrain.
    fn shadow_bounds(&self) -> Aabb {
        let scene = self.active_scene().and_then(Scene::bounds);
        let terrain = self.terrain.as_ref().map(|t| t.bounds());
        match (scene, terrain) {
            (Some(a), Some(b)) => a.union(&b),
            (Some(bounds), None) | (None, Some(bounds)) => bounds,
            (None, None) => Aabb::default(),
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Phases drawn into the primary target each frame.
    pub fn render_flag(&self) -> PhaseMask {
        self.render_flag
    }

    /// Change the phases drawn from the next [`render`](Self::render) on.
    pub fn set_render_flag(&mut self, mask: PhaseMask) {
        self.render_flag = mask;
    }

    /// The pipeline, which remembers the phases of its most recent run.
    pub fn pipeline(&self) -> &ScenePipeline {
        &self.pipeline
    }

    /// Frame timing fed by [`update`](Self::update).
    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    /// The screen quad shared by every full-screen pass.
    pub fn quad(&self) -> &ScreenQuad {
        &self.quad
    }

    /// Material given to entities built from builtin meshes.
    pub fn lit_material(&self) -> &Rc<ShaderMaterial> {
        &self.lit_material
    }

    /// Material the stock terrain is drawn with.
    pub fn terrain_material(&self) -> &Rc<ShaderMaterial> {
        &self.terrain_material
    }

    /// `None` when created without a shadow pass.
    pub fn shadow_map(&self) -> Option<&ShadowMap> {
        self.shadow_map.as_ref()
    }

    /// `None` when created without SSAO.
    pub fn ambient_occlusion(&self) -> Option<&AmbientOcclusionPass> {
        self.ambient_occlusion.as_ref()
    }

    /// Current sun direction and color.
    pub fn sun(&self) -> (Vec3, Vec3) {
        (self.sun_direction, self.sun_color)
    }

    /// Release every GPU resource the manager owns.
    ///
    /// Cached meshes still shared by live entities are left to those owners.
    pub fn destroy(self, device: &mut RenderDevice) {
        drop(self.scenes);
        let mut meshes = self.meshes;
        for (name, mesh) in meshes.drain() {
            match Rc::try_unwrap(mesh) {
                Ok(mesh) => mesh.destroy(device),
                Err(_) => log::warn!("mesh '{name}' still shared at shutdown"),
            }
        }
        if let Some(sky) = self.sky {
            sky.destroy(device);
        }
        if let Some(terrain) = self.terrain {
            terrain.destroy(device);
        }
        if let Some(water) = self.water {
            water.destroy(device);
        }
        if let Some(shadow) = self.shadow_map {
            shadow.destroy(device);
        }
        if let Some(pass) = self.ambient_occlusion {
            pass.destroy(device);
        }
        self.debug_overlay.destroy(device);
        self.quad.destroy(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{headless, material};

    fn bare() -> SceneSettings {
        SceneSettings {
            shadow_map_size: None,
            ssao_ratio: None,
            ..SceneSettings::default()
        }
    }

    #[test]
    fn test_sun_defaults() {
        let settings = SceneSettings::default();
        assert!(settings.sun_direction.abs_diff_eq(Vec3::new(1.0, -1.0, 2.0).normalize(), 1e-6));
        assert_eq!(settings.sun_color, Vec3::splat(0.8));
    }

    #[test]
    fn test_entities_share_cached_mesh() {
        let (mut device, probe) = headless(800, 600);
        let mut manager = SceneManager::new(&mut device, bare()).unwrap();
        let meshes_before = probe.live_meshes();

        let a = manager.create_entity(&mut device, "cube").unwrap();
        let b = manager.create_entity(&mut device, "cube").unwrap();

        assert_eq!(probe.live_meshes(), meshes_before + 1);
        assert!(Rc::ptr_eq(a.node().geometry(), b.node().geometry()));
    }

    #[test]
    fn test_unknown_mesh_is_error() {
        let (mut device, _probe) = headless(800, 600);
        let mut manager = SceneManager::new(&mut device, bare()).unwrap();
        let err = manager.create_entity(&mut device, "teapot").err().unwrap();
        assert!(matches!(err, SceneError::MeshNotFound(ref name) if name == "teapot"));
    }

    #[test]
    fn test_duplicate_mesh_registration_fails() {
        let (mut device, _probe) = headless(800, 600);
        let mut manager = SceneManager::new(&mut device, bare()).unwrap();
        let data = builtin_mesh("plane").unwrap();
        let first = Mesh::from_data(&mut device, "ground", &data, None).unwrap();
        let second = Mesh::from_data(&mut device, "ground", &data, None).unwrap();
        manager.register_mesh(first).unwrap();
        assert!(matches!(
            manager.register_mesh(second),
            Err(SceneError::Registry(_))
        ));
    }

    #[test]
    fn test_toggle_scene_wraps_and_hides_debug_view() {
        let (mut device, _probe) = headless(800, 600);
        let mut manager = SceneManager::new(&mut device, SceneSettings::default()).unwrap();
        manager.add_scene(Scene::new("first"));
        manager.add_scene(Scene::new("second"));

        manager.toggle_scene(&mut device);
        assert_eq!(manager.active_scene().unwrap().name(), "first");
        manager.enable_debug_view(DebugView::ShadowMap);
        assert_eq!(manager.debug_view(), DebugView::ShadowMap);

        manager.toggle_scene(&mut device);
        assert_eq!(manager.active_scene().unwrap().name(), "second");
        assert_eq!(manager.debug_view(), DebugView::None);

        manager.toggle_scene(&mut device);
        assert_eq!(manager.active_scene_index(), Some(0));
    }

    #[test]
    fn test_toggle_without_scenes_is_noop() {
        let (mut device, _probe) = headless(800, 600);
        let mut manager = SceneManager::new(&mut device, bare()).unwrap();
        manager.toggle_scene(&mut device);
        assert!(manager.active_scene().is_none());
    }

    #[test]
    fn test_debug_view_without_pass_falls_back() {
        let (mut device, _probe) = headless(800, 600);
        let mut manager = SceneManager::new(&mut device, bare()).unwrap();
        manager.enable_debug_view(DebugView::Ssao);
        assert_eq!(manager.debug_view(), DebugView::None);
    }

    #[test]
    fn test_lit_material_samples_occlusion() {
        let (mut device, _probe) = headless(800, 600);
        let manager = SceneManager::new(&mut device, SceneSettings::default()).unwrap();
        let occlusion = manager.ambient_occlusion().unwrap().occlusion_target();
        assert_eq!(manager.lit_material().texture(OCCLUSION_SLOT), Some(occlusion));
    }

    #[test]
    fn test_receivers_sample_shadow_map() {
        let (mut device, _probe) = headless(800, 600);
        let manager = SceneManager::new(&mut device, SceneSettings::default()).unwrap();
        let shadow = manager.shadow_map().unwrap().color_target();
        assert_eq!(manager.lit_material().texture(SHADOW_MAP_SLOT), Some(shadow));
        assert_eq!(manager.terrain_material().texture(SHADOW_MAP_SLOT), Some(shadow));
    }

    #[test]
    fn test_receivers_without_shadow_pass_sample_nothing() {
        let (mut device, _probe) = headless(800, 600);
        let manager = SceneManager::new(&mut device, bare()).unwrap();
        assert_eq!(manager.lit_material().texture(SHADOW_MAP_SLOT), None);
        assert_eq!(manager.terrain_material().texture(OCCLUSION_SLOT), None);
    }

    #[test]
    fn test_stock_materials_in_library() {
        let (mut device, _probe) = headless(800, 600);
        let manager = SceneManager::new(&mut device, bare()).unwrap();
        for name in ["lit", "terrain", "water"] {
            assert_eq!(manager.material(name).unwrap().name(), name);
        }
        assert!(manager.material("marble").is_none());
    }

    #[test]
    fn test_duplicate_material_keeps_first() {
        let (mut device, _probe) = headless(800, 600);
        let mut manager = SceneManager::new(&mut device, bare()).unwrap();
        manager
            .add_material("glass", material("clear", 50))
            .unwrap();

        let err = manager.add_material("glass", material("frosted", 51)).err().unwrap();

        assert!(matches!(
            err,
            SceneError::Registry(umbra_render::RegistryError::DuplicateName(ref name)) if name == "glass"
        ));
        assert_eq!(manager.material("glass").unwrap().name(), "clear");
        assert!(manager.add_material("lit", material("other", 52)).is_err());
        assert_eq!(manager.material("lit").unwrap().name(), "lit");
    }

    #[test]
    fn test_water_reflection_runs_only_when_water_requested() {
        let (mut device, _probe) = headless(800, 600);
        let mut manager = SceneManager::new(&mut device, bare()).unwrap();
        manager.create_water(&mut device, 0.0).unwrap();

        manager.set_render_flag(PhaseMask::WATER);
        manager.render(&mut device);
        assert_eq!(manager.pipeline().frames(), 2);

        manager.set_render_flag(PhaseMask::SOLID);
        manager.render(&mut device);
        assert_eq!(manager.pipeline().frames(), 3);
    }

    #[test]
    fn test_water_surfaces_follow_display_resize() {
        let (mut device, probe) = headless(800, 600);
        let mut manager = SceneManager::new(&mut device, bare()).unwrap();
        let water = FlatWater::new(&mut device, 0.0, 10.0).unwrap();
        let refraction = water.refraction_target();
        manager.set_water(&mut device, Box::new(water));

        device.resize_primary(1024, 768);
        manager.on_display_resized(&mut device).unwrap();

        assert_eq!(probe.color_target_size(refraction), Some((1024, 768)));
    }

    #[test]
    fn test_set_sun_light_updates_device_and_shadow() {
        let (mut device, _probe) = headless(800, 600);
        let mut manager = SceneManager::new(&mut device, SceneSettings::default()).unwrap();
        manager.set_sun_light(&mut device, Vec3::new(0.0, -2.0, 0.0), Vec3::ONE);
        assert_eq!(device.frame_constants().light_direction, Vec3::NEG_Y);
        assert_eq!(manager.shadow_map().unwrap().light_direction(), Vec3::NEG_Y);
    }

    #[test]
    fn test_destroy_releases_targets_and_meshes() {
        let (mut device, probe) = headless(800, 600);
        let targets_before = probe.live_color_targets();
        let meshes_before = probe.live_meshes();
        let mut manager = SceneManager::new(&mut device, SceneSettings::default()).unwrap();
        manager.create_sky(&mut device).unwrap();
        manager.create_water(&mut device, 1.0).unwrap();
        let entity = manager.create_entity(&mut device, "pyramid").unwrap();
        let mut scene = Scene::new("s");
        scene.add_entity(entity);
        manager.add_scene(scene);

        manager.destroy(&mut device);

        assert_eq!(probe.live_color_targets(), targets_before);
        assert_eq!(probe.live_meshes(), meshes_before);
    }
}
