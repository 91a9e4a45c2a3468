//! Resource mediators: the only path through which a loaded plugin
//! reaches files, the network, memory, or its private storage.
//!
//! Grounded on `lion_capability::model::{file,network,memory}`'s
//! permission-checked accessor types, generalized onto spec.md's single
//! `PluginPermission{type, access, scope}` shape and routed through one
//! shared [`kernel_audit::AuditLog`] so every attempt — permitted or not
//! — leaves a `ResourceAccess` entry.

mod file;
mod memory;
mod network;
mod storage;

pub use file::FileMediator;
pub use memory::MemoryMediator;
pub use network::{AlwaysOnline, ConnectivityGate, NetworkMediator, NetworkResponse, Transport};
pub use storage::StorageMediator;

use kernel_core::{AccessLevel, PermissionType, PluginManifest};

/// `has_permission(type, access, scope?)` per spec.md §4.3: the manifest
/// must carry a permission of the same `type` whose `access` is at least
/// the requested level, and — when both sides name a scope — the
/// requested scope must start with the permission's scope, compared
/// case-insensitively.
pub fn check_permission(
    manifest: &PluginManifest,
    kind: PermissionType,
    access: AccessLevel,
    scope: Option<&str>,
) -> bool {
    manifest.permissions.iter().any(|permission| {
        permission.kind == kind
            && permission.access >= access
            && match (permission.scope.as_deref(), scope) {
                (Some(granted), Some(requested)) => {
                    requested.to_lowercase().starts_with(&granted.to_lowercase())
                }
                _ => true,
            }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_core::{PluginPermission, RiskLevel};

    fn manifest_with(permission: PluginPermission) -> PluginManifest {
        PluginManifest::new("com.x.y", "1.0.0", "N", "A", "D")
            .with_risk_level(RiskLevel::LocalMutation)
            .with_permission(permission)
    }

    #[test]
    fn scope_prefix_match_is_case_insensitive() {
        let manifest = manifest_with(PluginPermission {
            kind: PermissionType::File,
            access: AccessLevel::Read,
            scope: Some("/Data".into()),
            reason: None,
            optional: false,
        });
        assert!(check_permission(
            &manifest,
            PermissionType::File,
            AccessLevel::Read,
            Some("/data/notes.txt")
        ));
    }

    #[test]
    fn insufficient_access_is_rejected() {
        let manifest = manifest_with(PluginPermission {
            kind: PermissionType::File,
            access: AccessLevel::Read,
            scope: Some("/data".into()),
            reason: None,
            optional: false,
        });
        assert!(!check_permission(
            &manifest,
            PermissionType::File,
            AccessLevel::Write,
            Some("/data/notes.txt")
        ));
    }

    #[test]
    fn scopeless_permission_checks_type_and_access_only() {
        let manifest = manifest_with(PluginPermission {
            kind: PermissionType::Memory,
            access: AccessLevel::Write,
            scope: None,
            reason: None,
            optional: false,
        });
        assert!(check_permission(
            &manifest,
            PermissionType::Memory,
            AccessLevel::Write,
            None
        ));
    }
}
