//! Phase selection bits for the scene pipeline.

use bitflags::bitflags;

bitflags! {
    /// Which pipeline phases a pass runs.
    ///
    /// `SHADOW_MAP` and `SOLID` are alternative intents for terrain and
    /// entities. When both are set, `SOLID` wins.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct PhaseMask: u32 {
        const SKY        = 1 << 0;
        const TERRAIN    = 1 << 1;
        const SHADOW_MAP = 1 << 2;
        const SSAO       = 1 << 3;
        const SOLID      = 1 << 4;
        const WATER      = 1 << 5;
        const UI         = 1 << 6;

        const GEOMETRY = Self::SKY.bits() | Self::TERRAIN.bits() | Self::SOLID.bits() | Self::WATER.bits();
        const ALL = Self::SKY.bits()
            | Self::TERRAIN.bits()
            | Self::SHADOW_MAP.bits()
            | Self::SSAO.bits()
            | Self::SOLID.bits()
            | Self::WATER.bits()
            | Self::UI.bits();
    }
}

impl Default for PhaseMask {
    /// Offscreen surfaces render geometry only.
    fn default() -> Self {
        Self::GEOMETRY
    }
}

/// A phase name that does not match any [`PhaseMask`] flag.
#[derive(Debug, thiserror::Error)]
#[error("unknown render phase '{0}'")]
pub struct UnknownPhase(pub String);

impl PhaseMask {
    /// Parse one lowercase phase name. `all` and `geometry` name the composites.
    pub fn from_name(name: &str) -> Result<Self, UnknownPhase> {
        let phase = match name.trim().to_ascii_lowercase().as_str() {
            "sky" => Self::SKY,
            "terrain" => Self::TERRAIN,
            "shadow_map" | "shadowmap" => Self::SHADOW_MAP,
            "ssao" => Self::SSAO,
            "solid" => Self::SOLID,
            "water" => Self::WATER,
            "ui" => Self::UI,
            "geometry" => Self::GEOMETRY,
            "all" => Self::ALL,
            _ => return Err(UnknownPhase(name.to_string())),
        };
        Ok(phase)
    }

    /// Union of every named phase. An empty list selects nothing.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, UnknownPhase> {
        names
            .iter()
            .try_fold(Self::empty(), |mask, name| Ok(mask | Self::from_name(name.as_ref())?))
    }
}
