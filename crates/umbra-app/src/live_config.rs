//! Periodic re-reading of `config.ron` while the window is open.

use std::path::{Path, PathBuf};

use tracing::warn;
use umbra_config::{CliArgs, Config};

/// Seconds between two reads of the config file.
pub const RELOAD_INTERVAL: f32 = 1.0;

/// Tracks the file contents separately from the effective config so that
/// command-line overrides survive a reload.
pub struct LiveConfig {
    dir: PathBuf,
    file: Config,
    args: CliArgs,
    since_check: f32,
}

impl LiveConfig {
    /// `file` is the config as read from `dir`, before `args` were applied.
    pub fn new(dir: &Path, file: Config, args: CliArgs) -> Self {
        Self {
            dir: dir.to_path_buf(),
            file,
            args,
            since_check: 0.0,
        }
    }

    /// The file contents with the command-line overrides applied.
    pub fn effective(&self) -> Config {
        let mut config = self.file.clone();
        config.apply_cli_overrides(&self.args);
        config
    }

    /// Advance by `delta_seconds`. Once per [`RELOAD_INTERVAL`] the file is
    /// re-read; a changed file yields the new effective config.
    ///
    /// A file that fails to read or parse keeps the current config.
    pub fn poll(&mut self, delta_seconds: f32) -> Option<Config> {
        self.since_check += delta_seconds;
        if self.since_check < RELOAD_INTERVAL {
            return None;
        }
        self.since_check = 0.0;
        match self.file.reload(&self.dir) {
            Ok(Some(file)) => {
                self.file = file;
                Some(self.effective())
            }
            Ok(None) => None,
            Err(err) => {
                warn!("Keeping current config: {err}");
                None
            }
        }
    }
}
