//! Shared ids, errors, manifest and package types for the trust kernel.
//!
//! This crate has no ambient authority of its own: it defines data and
//! validation only. Resource mediation lives in `kernel-sandbox`, policy
//! evaluation in `kernel-policy`, and the audit trail in `kernel-audit`.

pub mod error;
pub mod id;
pub mod manifest;
pub mod package;
pub mod registry;
pub mod traits;

pub use error::{Error, ManifestError, PackageError, Result};
pub use id::{ExecutionId, PluginId};
pub use manifest::{
    AccessLevel, CapabilityParameter, NetworkIntent, PermissionType, PluginCapability,
    PluginManifest, PluginPermission, RiskLevel, ValidationReport,
};
pub use package::{PackageBuilder, PluginPackage, MAX_PACKAGE_BYTES};
pub use registry::{InstallationRegistry, RegistryEntry};
