//! On-screen inspection of offscreen targets.

use std::fmt;
use std::str::FromStr;

use glam::Vec2;
use umbra_render::shaders::with_prelude;
use umbra_render::{ColorTargetId, DeviceError, RenderDevice, ScreenQuad, ShaderMaterial};

use crate::shaders;

/// Which offscreen target the debug overlay shows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DebugView {
    #[default]
    None,
    ShadowMap,
    Ssao,
}

impl fmt::Display for DebugView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DebugView::None => "none",
            DebugView::ShadowMap => "shadow_map",
            DebugView::Ssao => "ssao",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown debug view '{0}'")]
pub struct UnknownDebugView(pub String);

impl FromStr for DebugView {
    type Err = UnknownDebugView;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" | "off" => Ok(DebugView::None),
            "shadow_map" | "shadowmap" | "shadow" => Ok(DebugView::ShadowMap),
            "ssao" => Ok(DebugView::Ssao),
            _ => Err(UnknownDebugView(s.to_string())),
        }
    }
}

/// NDC rectangle of the overlay: the right half, upper part of the screen.
pub const OVERLAY_MIN: Vec2 = Vec2::new(0.5, 0.4);
pub const OVERLAY_MAX: Vec2 = Vec2::new(1.0, 1.0);

/// A screen-corner quad whose material samples the selected target.
pub struct DebugOverlay {
    quad: ScreenQuad,
    material: ShaderMaterial,
    view: DebugView,
}

impl DebugOverlay {
    pub fn new(device: &mut RenderDevice) -> Result<Self, DeviceError> {
        let quad = ScreenQuad::with_rect(device, OVERLAY_MIN, OVERLAY_MAX)?;
        let material =
            ShaderMaterial::from_wgsl(device, "debug_quad", &with_prelude(shaders::DEBUG_QUAD))?;
        Ok(Self {
            quad,
            material,
            view: DebugView::None,
        })
    }

    /// Show `target` under the name `view`. A missing target hides the overlay.
    pub fn set_view(&mut self, view: DebugView, target: Option<ColorTargetId>) {
        let (view, target) = match (view, target) {
            (DebugView::None, _) | (_, None) => (DebugView::None, None),
            (view, Some(target)) => (view, Some(target)),
        };
        self.material.set_texture(0, target);
        self.view = view;
    }

    pub fn view(&self) -> DebugView {
        self.view
    }

    pub fn is_active(&self) -> bool {
        self.view != DebugView::None
    }

    pub fn material(&self) -> &ShaderMaterial {
        &self.material
    }

    /// Draw the quad if a view is selected.
    pub fn draw(&self, device: &mut RenderDevice) {
        if self.is_active() {
            self.quad.draw(device, &self.material);
        }
    }

    pub fn destroy(self, device: &mut RenderDevice) {
        self.quad.destroy(device);
    }
}
