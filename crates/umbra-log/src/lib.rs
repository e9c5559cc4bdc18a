//! Logging setup for Umbra binaries.
//!
//! Library crates log through the `log` facade. `init_logging` installs a
//! `tracing-subscriber` registry that also captures those records, prints
//! them to the console and, in debug builds, mirrors them as JSON lines into
//! `umbra.log`.

use std::fs::File;
use std::path::Path;

use tracing::Subscriber;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use umbra_config::Config;

/// Directives applied when neither `RUST_LOG` nor the config set a level.
pub const DEFAULT_FILTER: &str = "info,wgpu=warn,naga=warn";

/// File name of the JSON log written in debug builds.
pub const LOG_FILE_NAME: &str = "umbra.log";

/// Build the filter directive string for a config.
///
/// The config's `debug.log_level` replaces the global level while the GPU
/// stack stays at `warn`. An empty level yields [`DEFAULT_FILTER`].
pub fn filter_directives(config: Option<&Config>) -> String {
    match config.map(|c| c.debug.log_level.trim()) {
        Some(level) if !level.is_empty() => format!("{level},wgpu=warn,naga=warn"),
        _ => DEFAULT_FILTER.to_string(),
    }
}

/// Create `log_dir` if needed and truncate the log file inside it.
pub fn open_log_file(log_dir: &Path) -> std::io::Result<File> {
    std::fs::create_dir_all(log_dir)?;
    File::create(log_dir.join(LOG_FILE_NAME))
}

/// JSON-lines layer writing every event to `file`.
pub fn json_file_layer<S>(file: File) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(file)
        .with_ansi(false)
        .with_target(true)
        .with_timer(fmt::time::uptime())
        .json()
}

/// Install the global subscriber. `RUST_LOG` wins over the config.
///
/// Must be called once, before the render device is created.
pub fn init_logging(log_dir: Option<&Path>, debug_build: bool, config: Option<&Config>) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(config)));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_timer(fmt::time::uptime());

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    if debug_build
        && let Some(log_dir) = log_dir
        && let Ok(log_file) = open_log_file(log_dir)
    {
        subscriber.with(json_file_layer(log_file)).init();
        return;
    }

    subscriber.init();
    tracing::debug!("logging initialised without file output");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_without_config() {
        assert_eq!(filter_directives(None), DEFAULT_FILTER);
    }

    #[test]
    fn test_config_level_keeps_gpu_stack_quiet() {
        let mut config = Config::default();
        config.debug.log_level = "debug".to_string();
        let directives = filter_directives(Some(&config));
        assert_eq!(directives, "debug,wgpu=warn,naga=warn");

        let filter = EnvFilter::try_new(&directives).unwrap();
        let rendered = filter.to_string();
        assert!(rendered.contains("wgpu=warn"));
        assert!(rendered.contains("debug"));
    }

    #[test]
    fn test_empty_level_falls_back() {
        let mut config = Config::default();
        config.debug.log_level = "  ".to_string();
        assert_eq!(filter_directives(Some(&config)), DEFAULT_FILTER);
    }

    #[test]
    fn test_crate_directives_parse() {
        for directives in [
            "info",
            "warn,umbra_render=debug",
            "info,umbra_scene=trace,umbra_render=debug",
        ] {
            assert!(EnvFilter::try_new(directives).is_ok(), "{directives}");
        }
    }

    #[test]
    fn test_open_log_file_creates_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("logs").join("today");

        open_log_file(&log_dir).unwrap();

        assert!(log_dir.join(LOG_FILE_NAME).is_file());
    }

    #[test]
    fn test_open_log_file_truncates_previous_run() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(LOG_FILE_NAME), "stale line\n").unwrap();

        open_log_file(dir.path()).unwrap();

        let contents = std::fs::read_to_string(dir.path().join(LOG_FILE_NAME)).unwrap();
        assert!(contents.is_empty());
    }

    #[test]
    fn test_file_layer_writes_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let file = open_log_file(dir.path()).unwrap();
        let subscriber = tracing_subscriber::registry().with(json_file_layer(file));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "umbra_scene", frames = 3, "scene ready");
            tracing::debug!("second line");
        });

        let contents = std::fs::read_to_string(dir.path().join(LOG_FILE_NAME)).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('{') && lines[0].ends_with('}'));
        assert!(lines[0].contains(r#""message":"scene ready""#));
        assert!(lines[0].contains(r#""frames":3"#));
        assert!(lines[0].contains(r#""target":"umbra_scene""#));
        assert!(lines[1].contains(r#""level":"DEBUG""#));
    }
}
