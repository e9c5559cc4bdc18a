//! Materials: a shader program plus the textures and state it draws with.

use std::cell::Cell;

use crate::backend::{ColorTargetId, ProgramId, ProgramDesc};
use crate::device::{MAX_TEXTURE_SLOTS, RenderDevice};
use crate::error::DeviceError;
use crate::state::{BlendConfig, DepthStencilConfig, RasterConfig};

/// Binds everything a draw needs besides geometry and transforms.
///
/// `bind` must be idempotent. State changed here is rolled back by the
/// geometry after its draw.
pub trait Material {
    fn name(&self) -> &str;
    fn bind(&self, device: &mut RenderDevice);
}

/// The stock [`Material`]: a program, texture slots and optional state overrides.
///
/// Texture slots use interior mutability so a material shared through `Rc`
/// can be repointed at a different render target, e.g. a debug overlay.
pub struct ShaderMaterial {
    name: String,
    program: ProgramId,
    textures: [Cell<Option<ColorTargetId>>; MAX_TEXTURE_SLOTS],
    depth_stencil: Option<DepthStencilConfig>,
    raster: Option<RasterConfig>,
    blend: Option<BlendConfig>,
}

impl ShaderMaterial {
    pub fn new(name: impl Into<String>, program: ProgramId) -> Self {
        Self {
            name: name.into(),
            program,
            textures: Default::default(),
            depth_stencil: None,
            raster: None,
            blend: None,
        }
    }

    /// Compile `source` and wrap it in a material of the same name.
    pub fn from_wgsl(
        device: &mut RenderDevice,
        name: &str,
        source: &str,
    ) -> Result<Self, DeviceError> {
        let program = device.create_program(&ProgramDesc::wgsl(name, source))?;
        Ok(Self::new(name, program))
    }

    pub fn with_depth_stencil(mut self, config: DepthStencilConfig) -> Self {
        self.depth_stencil = Some(config);
        self
    }

    pub fn with_raster(mut self, config: RasterConfig) -> Self {
        self.raster = Some(config);
        self
    }

    pub fn with_blend(mut self, config: BlendConfig) -> Self {
        self.blend = Some(config);
        self
    }

    pub fn with_texture(self, slot: usize, target: ColorTargetId) -> Self {
        self.set_texture(slot, Some(target));
        self
    }

    pub fn program(&self) -> ProgramId {
        self.program
    }

    /// Point `slot` at a color target, or clear it.
    ///
    /// # Panics
    ///
    /// If `slot >= MAX_TEXTURE_SLOTS`.
    pub fn set_texture(&self, slot: usize, target: Option<ColorTargetId>) {
        self.textures[slot].set(target);
    }

    pub fn texture(&self, slot: usize) -> Option<ColorTargetId> {
        self.textures.get(slot).and_then(Cell::get)
    }
}

impl Material for ShaderMaterial {
    fn name(&self) -> &str {
        &self.name
    }

    fn bind(&self, device: &mut RenderDevice) {
        device.bind_program(self.program);
        for (slot, texture) in self.textures.iter().enumerate() {
            device.bind_texture(slot, texture.get());
        }
        if let Some(depth) = self.depth_stencil {
            device.set_depth_stencil_state(depth);
        }
        if let Some(raster) = self.raster {
            device.set_raster_state(raster);
        }
        if let Some(blend) = self.blend {
            device.set_blend_state(blend);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_texture_slots_start_empty() {
        let material = ShaderMaterial::new("plain", ProgramId(1));
        assert!((0..MAX_TEXTURE_SLOTS).all(|slot| material.texture(slot).is_none()));
        assert_eq!(material.texture(MAX_TEXTURE_SLOTS), None);
    }

    #[test]
    fn test_set_texture_through_shared_reference() {
        let material = std::rc::Rc::new(ShaderMaterial::new("debug", ProgramId(1)));
        let shared = std::rc::Rc::clone(&material);
        shared.set_texture(0, Some(ColorTargetId(7)));
        assert_eq!(material.texture(0), Some(ColorTargetId(7)));
        shared.set_texture(0, None);
        assert_eq!(material.texture(0), None);
    }

    #[test]
    fn test_name() {
        let material = ShaderMaterial::new("water", ProgramId(3)).with_blend(BlendConfig::AlphaBlend);
        assert_eq!(material.name(), "water");
        assert_eq!(material.program(), ProgramId(3));
    }
}
