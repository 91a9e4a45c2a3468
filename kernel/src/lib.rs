//! Trust kernel: plugin manifests and packages, policy evaluation, the
//! audit log, the sandboxed plugin host and the policy-governed
//! facades, re-exported from one crate for a host application to
//! depend on.
//!
//! Each concern lives in its own crate (`kernel-core`, `kernel-audit`,
//! `kernel-policy`, `kernel-sandbox`, `kernel-governed`); this crate
//! adds no behavior of its own.

pub use kernel_audit::{
    AuditEntry, AuditEntryBuilder, AuditEventType, AuditLog, AuditStatistics,
};
pub use kernel_core::{
    AccessLevel, CapabilityParameter, Error as CoreError, ExecutionId, InstallationRegistry,
    ManifestError, NetworkIntent, PackageBuilder, PackageError, PermissionType, PluginCapability,
    PluginId, PluginManifest, PluginPackage, PluginPermission, RegistryEntry,
    Result as CoreResult, RiskLevel, ValidationReport, MAX_PACKAGE_BYTES,
};
pub use kernel_governed::{
    ConnectivityMode, ConnectivityRequest, DeferralCheck, EventBus, GovernedConnectivity,
    GovernedError, GovernedMemory, GovernedPluginHost, GovernedToolRegistry, GovernedUpdates,
    KernelEvent, MemoryItem, MemoryPolicyCheck, MemorySource, PendingMemoryRequest, PolicyCheck,
    ToolHandler, ToolPolicyCheck, ToolResult, UpdateInfo, UpdateMode,
};
pub use kernel_policy::{
    domain_matches, glob_match, glob_match_ci, load_document, parse_document, ConnectivityPolicy,
    Decision, DocumentError, MemoryPolicy, MergedConnectivityRules, MergedMemoryRules,
    MergedUpdateRules, PluginRule, PluginsPolicy, PolicyDocument, PolicyEngine,
    PolicyEvaluatedEvent, PolicyEvaluationResult, PolicySource, ToolRule, ToolsPolicy,
    UpdatesPolicy,
};
pub use kernel_sandbox::{
    check_permission, AlwaysOnline, ConnectivityGate, ExecutionResult, FileMediator, HostError,
    HostEvent, LoadResult, MemoryMediator, NetworkMediator, NetworkResponse, PluginContext,
    PluginHost, PluginInstance, PluginState, Sandbox, SandboxError, StorageMediator, Transport,
};
