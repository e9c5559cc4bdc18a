//! The phase sequencer that draws one frame of the scene.
//!
//! A frame is a fixed sequence of [`Phase`]s. The [`PhaseMask`] passed to
//! [`ScenePipeline::run_frame`] selects which run, and each phase applies
//! and rolls back its own state overrides. A phase whose override must hold
//! for later phases names the phase it lasts through in
//! [`Phase::restore_after`] and rolls back in [`Phase::restore`].

use umbra_render::{
    Color, CompareFunction, Material, PhaseMask, RenderDevice, RenderSurface, ScreenQuad,
};

use crate::debug_view::DebugOverlay;
use crate::environment::{Sky, Terrain, Water};
use crate::scene::Scene;
use crate::ssao::AmbientOcclusionPass;

/// Pixel position of the frame-rate readout, from the top-left corner.
pub const FPS_TEXT_POSITION: (i32, i32) = (10, 10);

/// One step of a frame, in the order they run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    Sky,
    Terrain,
    AmbientOcclusion,
    Entities,
    Water,
    Ui,
}

impl Phase {
    pub const ORDER: [Phase; 6] = [
        Phase::Sky,
        Phase::Terrain,
        Phase::AmbientOcclusion,
        Phase::Entities,
        Phase::Water,
        Phase::Ui,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Phase::Sky => "sky",
            Phase::Terrain => "terrain",
            Phase::AmbientOcclusion => "ssao",
            Phase::Entities => "entities",
            Phase::Water => "water",
            Phase::Ui => "ui",
        }
    }

    /// Whether `mask` selects this phase and `world` has something for it to draw.
    ///
    /// Entities run on `SOLID` or `SHADOW_MAP` even without an active scene,
    /// in which case they draw nothing.
    pub fn is_requested(self, mask: PhaseMask, world: &RenderWorld<'_>) -> bool {
        match self {
            Phase::Sky => mask.contains(PhaseMask::SKY) && world.sky.is_some(),
            Phase::Terrain => {
                mask.intersects(PhaseMask::TERRAIN | PhaseMask::SHADOW_MAP) && world.terrain.is_some()
            }
            Phase::AmbientOcclusion => {
                mask.contains(PhaseMask::SSAO) && world.ambient_occlusion.is_some()
            }
            Phase::Entities => mask.intersects(PhaseMask::SOLID | PhaseMask::SHADOW_MAP),
            Phase::Water => mask.contains(PhaseMask::WATER) && world.water.is_some(),
            Phase::Ui => mask.contains(PhaseMask::UI),
        }
    }

    /// The phase whose end rolls back the state this phase leaves behind,
    /// or `None` when the phase cleans up after itself.
    ///
    /// The occlusion pass keeps depth-equal testing through the entities.
    pub fn restore_after(self) -> Option<Phase> {
        match self {
            Phase::AmbientOcclusion => Some(Phase::Entities),
            _ => None,
        }
    }

    /// Roll back the state overrides left in place by this phase.
    pub fn restore(self, device: &mut RenderDevice) {
        if self == Phase::AmbientOcclusion {
            let depth = device
                .depth_stencil_state()
                .with_compare(CompareFunction::Less)
                .with_depth_write(true);
            device.set_depth_stencil_state(depth);
        }
    }

    fn draw(
        self,
        device: &mut RenderDevice,
        world: &RenderWorld<'_>,
        mask: PhaseMask,
        material: Option<&dyn Material>,
    ) {
        match self {
            Phase::Sky => draw_sky(device, world),
            Phase::Terrain => draw_terrain(device, world, mask, material),
            Phase::AmbientOcclusion => draw_ambient_occlusion(device, world),
            Phase::Entities => draw_entities(device, world, mask, material),
            Phase::Water => draw_water(device, world),
            Phase::Ui => draw_ui(device, world),
        }
    }
}

/// Borrowed view of everything a frame can draw.
///
/// Absent collaborators simply skip their phase.
pub struct RenderWorld<'a> {
    pub sky: Option<&'a dyn Sky>,
    pub terrain: Option<&'a dyn Terrain>,
    pub water: Option<&'a dyn Water>,
    pub scene: Option<&'a Scene>,
    pub ambient_occlusion: Option<&'a AmbientOcclusionPass>,
    pub debug_overlay: Option<&'a DebugOverlay>,
    pub quad: &'a ScreenQuad,
    pub last_fps: f32,
}

impl<'a> RenderWorld<'a> {
    /// A world with nothing in it but the shared screen quad.
    pub fn new(quad: &'a ScreenQuad) -> Self {
        Self {
            sky: None,
            terrain: None,
            water: None,
            scene: None,
            ambient_occlusion: None,
            debug_overlay: None,
            quad,
            last_fps: 0.0,
        }
    }
}

/// Runs the phases of a frame and remembers which ones ran last.
#[derive(Debug, Default)]
pub struct ScenePipeline {
    executed: Vec<Phase>,
    frames: u64,
}

impl ScenePipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Draw every phase `mask` selects into the bound target.
    ///
    /// `material`, when given, replaces the terrain's material on the
    /// `TERRAIN` path and every entity's material on the `SOLID` path.
    pub fn run_frame(
        &mut self,
        device: &mut RenderDevice,
        world: &RenderWorld<'_>,
        mask: PhaseMask,
        material: Option<&dyn Material>,
    ) {
        self.executed.clear();
        let mut held: Vec<Phase> = Vec::new();

        for phase in Phase::ORDER {
            if phase.is_requested(mask, world) {
                phase.draw(device, world, mask, material);
                self.executed.push(phase);
                if phase.restore_after().is_some() {
                    held.push(phase);
                }
            }
            held.retain(|owner| {
                if owner.restore_after() == Some(phase) {
                    owner.restore(device);
                    false
                } else {
                    true
                }
            });
        }
        for owner in held {
            owner.restore(device);
        }
        self.frames += 1;
    }

    /// Bind `surface` and run the phases in its mask.
    pub fn render_to_surface(
        &mut self,
        device: &mut RenderDevice,
        surface: &RenderSurface,
        world: &RenderWorld<'_>,
        material: Option<&dyn Material>,
    ) {
        let mut target = surface.bind(device);
        self.run_frame(&mut target, world, surface.phase_mask(), material);
    }

    /// Phases executed by the most recent run, in order.
    pub fn executed(&self) -> &[Phase] {
        &self.executed
    }

    /// Number of completed runs.
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

fn draw_sky(device: &mut RenderDevice, world: &RenderWorld<'_>) {
    if let Some(sky) = world.sky {
        sky.render(device);
    }
}

fn draw_terrain(
    device: &mut RenderDevice,
    world: &RenderWorld<'_>,
    mask: PhaseMask,
    material: Option<&dyn Material>,
) {
    let Some(terrain) = world.terrain else {
        return;
    };
    if mask.contains(PhaseMask::TERRAIN) {
        terrain.render(device, material);
    } else {
        terrain.render(device, Some(terrain.shadow_material()));
    }
}

/// Refresh the occlusion target, then only let fragments at the depth it
/// saw through.
fn draw_ambient_occlusion(device: &mut RenderDevice, world: &RenderWorld<'_>) {
    if let Some(pass) = world.ambient_occlusion {
        pass.update(device, world);
    }
    let depth = device
        .depth_stencil_state()
        .with_compare(CompareFunction::Equal)
        .with_depth_write(false);
    device.set_depth_stencil_state(depth);
}

fn draw_entities(
    device: &mut RenderDevice,
    world: &RenderWorld<'_>,
    mask: PhaseMask,
    material: Option<&dyn Material>,
) {
    let Some(scene) = world.scene else {
        return;
    };
    if mask.contains(PhaseMask::SOLID) {
        for entity in scene.entities() {
            entity.render(device, material);
        }
    } else {
        for entity in scene.entities().iter().filter(|e| e.cast_shadow()) {
            entity.render(device, None);
        }
    }
}

fn draw_water(device: &mut RenderDevice, world: &RenderWorld<'_>) {
    if let Some(water) = world.water {
        water.render(device);
    }
}

fn draw_ui(device: &mut RenderDevice, world: &RenderWorld<'_>) {
    let depth = device.depth_stencil_state();
    device.set_depth_stencil_state(depth.with_depth_test(false).with_depth_write(false));

    let text = format!("lastFPS : {:.6}", world.last_fps);
    device.draw_text(&text, FPS_TEXT_POSITION, Color::YELLOW);
    if let Some(overlay) = world.debug_overlay {
        overlay.draw(device);
    }

    device.set_depth_stencil_state(depth.with_depth_test(true).with_depth_write(true));
}
