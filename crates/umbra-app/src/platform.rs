//! Per-user directories for configuration and logs.

use std::io;
use std::path::{Path, PathBuf};

/// A directory could not be created.
#[derive(Debug, thiserror::Error)]
#[error("failed to create {}: {source}", path.display())]
pub struct PlatformError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Where `config.ron` and the debug log live.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlatformDirs {
    /// Holds `config.ron`.
    pub config_dir: PathBuf,
    /// Holds `umbra.log` in debug builds.
    pub log_dir: PathBuf,
}

impl PlatformDirs {
    /// The platform config directory, or `config_override` when given.
    /// Logs go to a `logs` directory beside the config.
    pub fn resolve(config_override: Option<&Path>) -> Self {
        let config_dir = config_override
            .map(Path::to_path_buf)
            .unwrap_or_else(umbra_config::default_config_dir);
        Self::resolve_with_root(&config_dir)
    }

    /// Directories rooted at `root`, without touching the OS locations.
    pub fn resolve_with_root(root: &Path) -> Self {
        Self {
            config_dir: root.to_path_buf(),
            log_dir: root.join("logs"),
        }
    }

    /// Create both directories.
    pub fn create_dirs(&self) -> Result<(), PlatformError> {
        for dir in [&self.config_dir, &self.log_dir] {
            std::fs::create_dir_all(dir).map_err(|source| PlatformError {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }
}
