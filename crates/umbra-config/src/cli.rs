//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Umbra command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "umbra", about = "Umbra renderer")]
pub struct CliArgs {
    /// Window width.
    #[arg(long)]
    pub width: Option<u32>,

    /// Window height.
    #[arg(long)]
    pub height: Option<u32>,

    /// Comma-separated phases to run (sky,terrain,shadow_map,ssao,solid,water,ui,all).
    #[arg(long, value_delimiter = ',')]
    pub phases: Option<Vec<String>>,

    /// Debug overlay: none, shadow_map or ssao.
    #[arg(long)]
    pub debug_view: Option<String>,

    /// Run without a window on the recording backend.
    #[arg(long)]
    pub headless: bool,

    /// Stop after this many frames.
    #[arg(long)]
    pub frames: Option<u64>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(w) = args.width {
            self.window.width = w;
        }
        if let Some(h) = args.height {
            self.window.height = h;
        }
        if let Some(ref phases) = args.phases {
            self.render.phases = phases.clone();
        }
        if let Some(ref view) = args.debug_view {
            self.debug.debug_view = view.clone();
        }
        if args.headless {
            self.render.headless = true;
        }
        if let Some(frames) = args.frames {
            self.debug.max_frames = frames;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
