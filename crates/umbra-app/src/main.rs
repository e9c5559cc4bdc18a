//! The binary entry point for the Umbra renderer.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use umbra_app::AppError;
use umbra_app::headless::run_headless;
use umbra_app::live_config::LiveConfig;
use umbra_app::platform::PlatformDirs;
use umbra_config::{CliArgs, Config};

fn run(args: CliArgs) -> Result<(), AppError> {
    let dirs = PlatformDirs::resolve(args.config.as_deref());
    dirs.create_dirs()?;

    let file = Config::load_or_create(&dirs.config_dir)?;
    let config = LiveConfig::new(&dirs.config_dir, file, args);
    let effective = config.effective();

    umbra_log::init_logging(
        Some(&dirs.log_dir),
        cfg!(debug_assertions),
        Some(&effective),
    );
    info!("Umbra starting, config: {}", dirs.config_dir.display());

    if effective.render.headless {
        let report = run_headless(&effective)?;
        info!(frames = report.frames, presented = report.presented, "Done");
        Ok(())
    } else {
        umbra_app::window::run(config)
    }
}

fn main() -> ExitCode {
    match run(CliArgs::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            eprintln!("umbra: {err}");
            ExitCode::FAILURE
        }
    }
}
