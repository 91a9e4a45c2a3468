//! Error types shared by every trust-kernel crate.

use thiserror::Error;

/// Convenience alias used throughout `kernel-core`.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error for manifest, id and package handling.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid id: {0}")]
    InvalidId(String),

    #[error("manifest validation failed: {0}")]
    Validation(#[from] ManifestError),

    #[error("package error: {0}")]
    Package(#[from] PackageError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One documented manifest invariant violation. A manifest can fail
/// several at once; validation collects all of them rather than
/// stopping at the first.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManifestError {
    #[error("field '{0}' must not be empty")]
    EmptyField(&'static str),

    #[error("invalid plugin id: {0}")]
    InvalidId(String),

    #[error("invalid semantic version '{0}'")]
    InvalidVersion(String),

    #[error("risk level {declared:?} is below the minimum {minimum:?} implied by permissions")]
    RiskLevelTooLow {
        declared: String,
        minimum: String,
    },

    #[error("risk level 'system_adjacent' is reserved and must not validate")]
    SystemAdjacentReserved,

    #[error("permission of type {0:?} requires a non-empty scope")]
    MissingScope(String),

    #[error("wildcard write scope '*' is forbidden for file permissions")]
    WildcardFileWrite,

    #[error("capability '{0}' modifies state but has no write/execute permission")]
    ModifiesStateWithoutPermission(String),

    #[error("capability '{0}' requires network but manifest has no network permission")]
    RequiresNetworkWithoutPermission(String),

    #[error("network intent endpoint '{0}' is not covered by any network permission scope")]
    UncoveredNetworkIntent(String),

    #[error("network intent endpoint '{0}' is not an absolute URI")]
    NonAbsoluteEndpoint(String),

    #[error("duplicate capability tool_id '{0}'")]
    DuplicateCapabilityId(String),
}

/// Failures opening or building a `.icplugin` package.
#[derive(Error, Debug)]
pub enum PackageError {
    #[error("archive exceeds the 50 MiB size bound ({0} bytes)")]
    TooLarge(u64),

    #[error("archive is missing required entry '{0}'")]
    MissingEntry(&'static str),

    #[error("archive contains forbidden file '{0}'")]
    ForbiddenFile(String),

    #[error("archive is corrupted: {0}")]
    Corrupted(String),

    #[error("manifest in archive is invalid: {0}")]
    InvalidManifest(#[from] ManifestError),
}
