//! Configuration structs with defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const CONFIG_FILE: &str = "config.ron";

/// Top-level renderer configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub render: RenderConfig,
    pub scene: SceneConfig,
    pub debug: DebugConfig,
}

/// Window configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WindowConfig {
    /// Window width in physical pixels.
    pub width: u32,
    /// Window height in physical pixels.
    pub height: u32,
    pub title: String,
    /// Present with `PresentMode::Fifo` when set.
    pub vsync: bool,
}

/// Rendering configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    /// Phases run every frame, by name: `sky`, `terrain`, `shadow_map`,
    /// `ssao`, `solid`, `water`, `ui`, or `all`.
    pub phases: Vec<String>,
    /// Render the shadow map before the main pipeline.
    pub shadow_map: bool,
    /// Shadow map edge length in texels.
    pub shadow_map_size: u32,
    /// Enable the screen-space ambient occlusion pass.
    pub ssao: bool,
    /// SSAO surface size relative to the window (0.0 - 1.0].
    pub ssao_ratio: f32,
    /// Background color as linear RGBA.
    pub clear_color: [f32; 4],
    /// Run without a window using the recording backend.
    pub headless: bool,
}

/// Lighting and environment for the default scenes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SceneConfig {
    /// Direction the sun shines towards. Normalized on use.
    pub sun_direction: [f32; 3],
    pub sun_color: [f32; 3],
    pub ambient_color: [f32; 3],
    pub sky: bool,
    pub terrain: bool,
    /// Water plane height, or `None` for no water.
    pub water_height: Option<f32>,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Draw the frame rate text in the UI phase.
    pub show_fps: bool,
    /// Debug overlay: `none`, `shadow_map` or `ssao`.
    pub debug_view: String,
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Stop after this many frames. 0 runs until the window closes.
    pub max_frames: u64,
}

// --- Default implementations ---

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            title: "Umbra".to_string(),
            vsync: true,
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            phases: vec!["all".to_string()],
            shadow_map: true,
            shadow_map_size: 1024,
            ssao: true,
            ssao_ratio: 0.5,
            clear_color: [0.0, 0.125, 0.3, 1.0],
            headless: false,
        }
    }
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            sun_direction: [1.0, -1.0, 2.0],
            sun_color: [0.8, 0.8, 0.8],
            ambient_color: [0.2, 0.2, 0.2],
            sky: true,
            terrain: true,
            water_height: Some(0.0),
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            show_fps: true,
            debug_view: "none".to_string(),
            log_level: "info".to_string(),
            max_frames: 0,
        }
    }
}

/// Per-user config directory, e.g. `~/.config/umbra` on Linux.
///
/// Falls back to the working directory when the platform has none.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("umbra"))
        .unwrap_or_else(|| PathBuf::from("."))
}

// --- Load / Save / Reload ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);

        if config_path.exists() {
            let config = Self::read(&config_path)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);
        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(config_dir.join(CONFIG_FILE), serialized).map_err(ConfigError::WriteError)
    }

    /// Re-read the file. Returns `Some(new_config)` only if it differs from `self`.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let new_config = Self::read(&config_dir.join(CONFIG_FILE))?;
        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        ron::from_str(&contents).map_err(ConfigError::ParseError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_background_matches_engine_clear_color() {
        let config = Config::default();
        assert_eq!(config.render.clear_color, [0.0, 0.125, 0.3, 1.0]);
        assert_eq!(config.render.phases, vec!["all".to_string()]);
    }

    #[test]
    fn test_default_config_serializes() {
        let ron_str =
            ron::ser::to_string_pretty(&Config::default(), ron::ser::PrettyConfig::new())
                .unwrap();
        assert!(ron_str.contains("width: 1280"));
        assert!(ron_str.contains("shadow_map_size: 1024"));
    }

    #[test]
    fn test_missing_section_uses_default() {
        let config: Config = ron::from_str("(window: (width: 800))").unwrap();
        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, 720);
        assert_eq!(config.scene, SceneConfig::default());
    }

    #[test]
    fn test_unknown_field_ignored() {
        let result: Result<Config, _> = ron::from_str("(render: (msaa: 8))");
        assert!(result.is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.render.phases = vec!["sky".to_string(), "solid".to_string()];
        config.scene.water_height = None;

        config.save(dir.path()).unwrap();
        let loaded = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_or_create_writes_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert!(dir.path().join("config.ron").exists());
    }

    #[test]
    fn test_reload_detects_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let mut modified = config.clone();
        modified.debug.debug_view = "ssao".to_string();
        modified.save(dir.path()).unwrap();

        let reloaded = config.reload(dir.path()).unwrap();
        assert_eq!(reloaded.unwrap().debug.debug_view, "ssao");
    }

    #[test]
    fn test_reload_no_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();
        assert!(config.reload(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_reload_missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::default().reload(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError(_)));
    }

    #[test]
    fn test_invalid_ron_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.ron"), "{{not valid}}").unwrap();
        let err = Config::load_or_create(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }
}
