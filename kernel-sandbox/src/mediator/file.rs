use std::path::Path;
use std::sync::Arc;

use kernel_audit::{AuditEntryBuilder, AuditEventType, AuditLog};
use kernel_core::{AccessLevel, PermissionType, PluginId, PluginManifest};

use crate::error::SandboxError;
use crate::mediator::check_permission;

/// File access mediated by the manifest's `File` permissions. Every
/// call records a `ResourceAccess` entry before touching disk; a denied
/// call never reaches the filesystem.
#[derive(Clone)]
pub struct FileMediator {
    plugin_id: PluginId,
    manifest: Arc<PluginManifest>,
    audit: Arc<AuditLog>,
}

impl FileMediator {
    pub(crate) fn new(plugin_id: PluginId, manifest: Arc<PluginManifest>, audit: Arc<AuditLog>) -> Self {
        Self {
            plugin_id,
            manifest,
            audit,
        }
    }

    fn authorize(&self, access: AccessLevel, path: &Path) -> bool {
        check_permission(
            &self.manifest,
            PermissionType::File,
            access,
            Some(&path.to_string_lossy()),
        )
    }

    fn record(&self, action: &str, path: &Path, permitted: bool) {
        self.audit.append(
            AuditEntryBuilder::new(self.plugin_id.clone(), AuditEventType::ResourceAccess)
                .resource("file", path.to_string_lossy())
                .details(action)
                .permitted(permitted)
                .build(),
        );
    }

    fn denied(&self, path: &Path) -> SandboxError {
        SandboxError::PermissionMissing {
            resource_type: "file",
            resource: path.display().to_string(),
        }
    }

    pub async fn read(&self, path: &Path) -> Result<Vec<u8>, SandboxError> {
        let permitted = self.authorize(AccessLevel::Read, path);
        self.record("read", path, permitted);
        if !permitted {
            return Err(self.denied(path));
        }
        Ok(tokio::fs::read(path).await?)
    }

    pub async fn write(&self, path: &Path, content: &[u8]) -> Result<(), SandboxError> {
        let permitted = self.authorize(AccessLevel::Write, path);
        self.record("write", path, permitted);
        if !permitted {
            return Err(self.denied(path));
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    pub async fn list(&self, path: &Path) -> Result<Vec<String>, SandboxError> {
        let permitted = self.authorize(AccessLevel::Read, path);
        self.record("list", path, permitted);
        if !permitted {
            return Err(self.denied(path));
        }
        let mut read_dir = tokio::fs::read_dir(path).await?;
        let mut names = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_core::{PluginPermission, RiskLevel};

    fn context(scope: &str, access: AccessLevel) -> (FileMediator, Arc<AuditLog>) {
        let audit = Arc::new(AuditLog::new(100));
        let manifest = Arc::new(
            PluginManifest::new("com.x.y", "1.0.0", "N", "A", "D")
                .with_risk_level(RiskLevel::LocalMutation)
                .with_permission(PluginPermission {
                    kind: PermissionType::File,
                    access,
                    scope: Some(scope.into()),
                    reason: None,
                    optional: false,
                }),
        );
        let plugin_id = PluginId::parse("com.x.y").unwrap();
        (
            FileMediator::new(plugin_id, manifest, audit.clone()),
            audit,
        )
    }

    #[tokio::test]
    async fn write_then_read_round_trips_within_scope() {
        let dir = tempfile::tempdir().unwrap();
        let scope = dir.path().to_string_lossy().into_owned();
        let (mediator, audit) = context(&scope, AccessLevel::Write);
        let file_path = dir.path().join("note.txt");
        mediator.write(&file_path, b"hello").await.unwrap();
        let content = mediator.read(&file_path).await.unwrap();
        assert_eq!(content, b"hello");
        assert_eq!(audit.len(), 2);
    }

    #[tokio::test]
    async fn out_of_scope_write_is_denied_without_touching_disk() {
        let dir = tempfile::tempdir().unwrap();
        let (mediator, audit) = context("/somewhere/else", AccessLevel::Write);
        let file_path = dir.path().join("note.txt");
        let result = mediator.write(&file_path, b"hello").await;
        assert!(matches!(result, Err(SandboxError::PermissionMissing { .. })));
        assert!(!file_path.exists());
        assert_eq!(audit.statistics().denied_access_count, 1);
    }

    #[tokio::test]
    async fn read_only_scope_rejects_write() {
        let dir = tempfile::tempdir().unwrap();
        let scope = dir.path().to_string_lossy().into_owned();
        let (mediator, _audit) = context(&scope, AccessLevel::Read);
        let file_path = dir.path().join("note.txt");
        let result = mediator.write(&file_path, b"hello").await;
        assert!(matches!(result, Err(SandboxError::PermissionMissing { .. })));
    }
}
