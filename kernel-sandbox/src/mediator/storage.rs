use std::path::{Path, PathBuf};
use std::sync::Arc;

use kernel_audit::{AuditEntryBuilder, AuditEventType, AuditLog};
use kernel_core::PluginId;

use crate::error::SandboxError;

/// A plugin's own persistent key-value directory `<base>/<plugin_id>`,
/// one `<key>.json` file per key. Untouched by permission checks —
/// storage is private to the plugin that owns it — and persists across
/// `unload`; only `clear()` empties it.
#[derive(Clone)]
pub struct StorageMediator {
    plugin_id: PluginId,
    dir: PathBuf,
    audit: Arc<AuditLog>,
}

impl StorageMediator {
    pub(crate) fn new(base: &Path, plugin_id: PluginId, audit: Arc<AuditLog>) -> Self {
        let dir = base.join(plugin_id.as_str());
        Self {
            plugin_id,
            dir,
            audit,
        }
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    fn record(&self, action: &str, key: &str) {
        self.audit.append(
            AuditEntryBuilder::new(self.plugin_id.clone(), AuditEventType::ResourceAccess)
                .resource("storage", key)
                .details(action)
                .permitted(true)
                .build(),
        );
    }

    pub async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, SandboxError> {
        let path = self.key_path(key);
        self.record("get", key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn set(&self, key: &str, value: &serde_json::Value) -> Result<(), SandboxError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let bytes = serde_json::to_vec_pretty(value)?;
        tokio::fs::write(self.key_path(key), bytes).await?;
        self.record("set", key);
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<(), SandboxError> {
        let path = self.key_path(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.record("delete", key);
        Ok(())
    }

    /// Removes every key but leaves the plugin's directory in place.
    pub async fn clear(&self) -> Result<(), SandboxError> {
        if self.dir.exists() {
            let mut entries = tokio::fs::read_dir(&self.dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                tokio::fs::remove_file(entry.path()).await?;
            }
        }
        self.record("clear", "*");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mediator(base: &Path) -> StorageMediator {
        StorageMediator::new(base, PluginId::parse("com.x.y").unwrap(), Arc::new(AuditLog::new(100)))
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mediator = mediator(dir.path());
        mediator.set("prefs", &serde_json::json!({"theme": "dark"})).await.unwrap();
        let value = mediator.get("prefs").await.unwrap().unwrap();
        assert_eq!(value["theme"], "dark");
    }

    #[tokio::test]
    async fn missing_key_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let mediator = mediator(dir.path());
        assert!(mediator.get("absent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn clear_removes_keys_but_keeps_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mediator = mediator(dir.path());
        mediator.set("a", &serde_json::json!(1)).await.unwrap();
        mediator.set("b", &serde_json::json!(2)).await.unwrap();
        mediator.clear().await.unwrap();
        assert!(mediator.get("a").await.unwrap().is_none());
        assert!(mediator.dir.exists());
    }
}
