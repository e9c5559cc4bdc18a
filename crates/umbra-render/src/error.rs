//! Error types for device setup, resource creation and presentation.

/// Errors raised by a [`RenderDevice`](crate::RenderDevice) or its backend.
///
/// Anything returned during initialization is fatal to the caller.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// No compatible GPU adapter found.
    #[error("no compatible GPU adapter found")]
    AdapterUnavailable,

    #[error("failed to request GPU device: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),

    #[error("failed to create surface: {0}")]
    SurfaceCreation(#[from] wgpu::CreateSurfaceError),

    /// A texture, buffer, program or state object could not be created.
    #[error("failed to create {kind}: {reason}")]
    ResourceCreation { kind: &'static str, reason: String },

    /// A handle that the backend does not know about.
    #[error("unknown {kind} handle {id}")]
    UnknownResource { kind: &'static str, id: u32 },

    /// The backend refused to present the finished frame.
    #[error("present rejected: {0}")]
    PresentRejected(String),

    /// Surface lost and could not be recovered.
    #[error("surface lost and could not be recovered")]
    SurfaceLost,
}

/// Errors from name-keyed asset registries.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// An entry with this name already exists. The existing entry is kept.
    #[error("duplicate asset name: {0}")]
    DuplicateName(String),
}
