//! Errors surfaced by mediators and the plugin host.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SandboxError {
    /// Mediator denied the call; the audit entry for the attempt has
    /// already been recorded by the time this is returned.
    #[error("permission missing for {resource_type} resource '{resource}'")]
    PermissionMissing {
        resource_type: &'static str,
        resource: String,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("network transport failed: {0}")]
    Transport(String),
}

#[derive(Error, Debug)]
pub enum HostError {
    #[error("plugin '{0}' is already loaded")]
    AlreadyLoaded(kernel_core::PluginId),

    #[error("plugin '{0}' is not loaded")]
    NotFound(kernel_core::PluginId),

    #[error("plugin '{0}' is not enabled")]
    NotEnabled(kernel_core::PluginId),

    #[error("manifest invalid: {0:?}")]
    Validation(Vec<String>),

    #[error("invalid plugin id: {0}")]
    InvalidId(#[from] kernel_core::Error),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),
}
