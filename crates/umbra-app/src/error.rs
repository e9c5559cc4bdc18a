use umbra_config::ConfigError;
use umbra_render::{DeviceError, UnknownPhase};
use umbra_scene::{SceneError, UnknownDebugView};

use crate::platform::PlatformError;

/// Anything that stops the application.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid config: {0}")]
    Phase(#[from] UnknownPhase),

    #[error("invalid config: {0}")]
    DebugView(#[from] UnknownDebugView),

    #[error("render device: {0}")]
    Device(#[from] DeviceError),

    #[error("scene: {0}")]
    Scene(#[from] SceneError),

    #[error("window creation failed: {0}")]
    Window(#[from] winit::error::OsError),

    #[error("event loop: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),
}
