use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use kernel_audit::AuditLog;
use kernel_core::{AccessLevel, PermissionType, PluginId, PluginManifest};

use crate::mediator::{
    check_permission, ConnectivityGate, FileMediator, MemoryMediator, NetworkMediator,
    StorageMediator, Transport,
};

/// Everything a loaded plugin can reach: the four mediators and a
/// permission query, nothing else. Owned by exactly one `LoadedPlugin`;
/// it is cheap to clone (every field is `Arc`- or `PathBuf`-backed) so
/// the host can hand a copy to plugin code across an `.await` without
/// holding the registry lock.
#[derive(Clone)]
pub struct PluginContext {
    plugin_id: PluginId,
    manifest: Arc<PluginManifest>,
    pub files: FileMediator,
    pub network: NetworkMediator,
    pub memory: MemoryMediator,
    pub storage: StorageMediator,
}

impl PluginContext {
    pub fn plugin_id(&self) -> &PluginId {
        &self.plugin_id
    }

    pub fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    pub fn has_permission(&self, kind: PermissionType, access: AccessLevel, scope: Option<&str>) -> bool {
        check_permission(&self.manifest, kind, access, scope)
    }
}

/// Produces a [`PluginContext`] for a manifest, wiring every mediator to
/// the same audit log and to whatever connectivity gate / transport the
/// host application supplies.
pub struct Sandbox {
    storage_root: PathBuf,
    audit: Arc<AuditLog>,
    memory_store: Arc<DashMap<String, String>>,
    connectivity_gate: Option<Arc<dyn ConnectivityGate>>,
    transport: Option<Arc<dyn Transport>>,
}

impl Sandbox {
    pub fn new(storage_root: impl Into<PathBuf>, audit: Arc<AuditLog>) -> Self {
        Self {
            storage_root: storage_root.into(),
            audit,
            memory_store: Arc::new(DashMap::new()),
            connectivity_gate: None,
            transport: None,
        }
    }

    pub fn with_connectivity_gate(mut self, gate: Arc<dyn ConnectivityGate>) -> Self {
        self.connectivity_gate = Some(gate);
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn create_context(&self, plugin_id: PluginId, manifest: Arc<PluginManifest>) -> PluginContext {
        PluginContext {
            plugin_id: plugin_id.clone(),
            manifest: manifest.clone(),
            files: FileMediator::new(plugin_id.clone(), manifest.clone(), self.audit.clone()),
            network: NetworkMediator::new(
                plugin_id.clone(),
                manifest.clone(),
                self.audit.clone(),
                self.connectivity_gate.clone(),
                self.transport.clone(),
            ),
            memory: MemoryMediator::new(
                plugin_id.clone(),
                manifest.clone(),
                self.audit.clone(),
                self.memory_store.clone(),
            ),
            storage: StorageMediator::new(&self.storage_root, plugin_id, self.audit.clone()),
        }
    }
}
