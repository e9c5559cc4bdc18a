//! Scene layer: transform nodes, entities, environment collaborators and
//! the phase-ordered pipeline that draws a frame.

mod debug_view;
mod entity;
mod environment;
mod error;
mod manager;
mod pipeline;
mod scene;
pub mod shaders;
mod shadow;
mod ssao;
mod stats;
#[cfg(test)]
mod testing;
mod transform;

pub use debug_view::{DebugOverlay, DebugView, OVERLAY_MAX, OVERLAY_MIN, UnknownDebugView};
pub use entity::Entity;
pub use environment::{
    FlatWater, GradientSky, HeightfieldTerrain, REFLECTION_RATIO, REFLECTION_SLOT, REFRACTION_SLOT,
    Sky, Terrain, TerrainDesc, Water, reflection_matrix,
};
pub use error::SceneError;
pub use manager::{
    OCCLUSION_SLOT, SHADOW_MAP_SLOT, SceneManager, SceneSettings, WATER_SIZE, builtin_mesh,
};
pub use pipeline::{FPS_TEXT_POSITION, Phase, RenderWorld, ScenePipeline};
pub use scene::Scene;
pub use shadow::{DEFAULT_SHADOW_MAP_SIZE, ShadowMap, light_matrices};
pub use ssao::AmbientOcclusionPass;
pub use stats::FrameStats;
pub use transform::{DEGENERATE_BOUNDS_MARGIN, TransformNode};
