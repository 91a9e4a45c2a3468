use std::sync::Arc;

use dashmap::DashMap;
use kernel_audit::{AuditEntryBuilder, AuditEventType, AuditLog};
use kernel_core::{AccessLevel, PermissionType, PluginId, PluginManifest};

use crate::error::SandboxError;
use crate::mediator::check_permission;

/// A plugin's key-value scratch space, namespaced `<plugin_id>:<key>`
/// inside one store shared across every loaded plugin. Read and write
/// each require their own `Memory` permission.
#[derive(Clone)]
pub struct MemoryMediator {
    plugin_id: PluginId,
    manifest: Arc<PluginManifest>,
    audit: Arc<AuditLog>,
    store: Arc<DashMap<String, String>>,
}

impl MemoryMediator {
    pub(crate) fn new(
        plugin_id: PluginId,
        manifest: Arc<PluginManifest>,
        audit: Arc<AuditLog>,
        store: Arc<DashMap<String, String>>,
    ) -> Self {
        Self {
            plugin_id,
            manifest,
            audit,
            store,
        }
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}:{key}", self.plugin_id)
    }

    fn record(&self, action: &str, key: &str, permitted: bool) {
        self.audit.append(
            AuditEntryBuilder::new(self.plugin_id.clone(), AuditEventType::ResourceAccess)
                .resource("memory", key)
                .details(action)
                .permitted(permitted)
                .build(),
        );
    }

    fn denied(&self, key: &str) -> SandboxError {
        SandboxError::PermissionMissing {
            resource_type: "memory",
            resource: key.to_string(),
        }
    }

    pub fn read(&self, key: &str) -> Result<Option<String>, SandboxError> {
        let permitted = check_permission(&self.manifest, PermissionType::Memory, AccessLevel::Read, None);
        self.record("read", key, permitted);
        if !permitted {
            return Err(self.denied(key));
        }
        Ok(self.store.get(&self.namespaced(key)).map(|entry| entry.clone()))
    }

    pub fn write(&self, key: &str, value: impl Into<String>) -> Result<(), SandboxError> {
        let permitted = check_permission(&self.manifest, PermissionType::Memory, AccessLevel::Write, None);
        self.record("write", key, permitted);
        if !permitted {
            return Err(self.denied(key));
        }
        self.store.insert(self.namespaced(key), value.into());
        Ok(())
    }

    /// Substring match on values, scoped to this plugin's own keys.
    pub fn search(&self, query: &str) -> Result<Vec<(String, String)>, SandboxError> {
        let permitted = check_permission(&self.manifest, PermissionType::Memory, AccessLevel::Read, None);
        self.record("search", query, permitted);
        if !permitted {
            return Err(self.denied(query));
        }
        let prefix = format!("{}:", self.plugin_id);
        let needle = query.to_lowercase();
        Ok(self
            .store
            .iter()
            .filter(|entry| entry.key().starts_with(&prefix) && entry.value().to_lowercase().contains(&needle))
            .map(|entry| (entry.key()[prefix.len()..].to_string(), entry.value().clone()))
            .collect())
    }
}
