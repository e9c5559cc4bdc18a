//! Scene-layer errors.

use umbra_render::{DeviceError, RegistryError};

/// Errors raised while building or populating scenes.
#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    /// No mesh has been registered under this name.
    #[error("mesh '{0}' not found")]
    MeshNotFound(String),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}
