//! Configuration for the Umbra renderer.
//!
//! Settings persist to disk as `config.ron`, missing fields fall back to
//! defaults, and CLI flags parsed with clap take precedence over the file.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{Config, DebugConfig, RenderConfig, SceneConfig, WindowConfig, default_config_dir};
pub use error::ConfigError;
