//! Plugin lifecycle control — the only path through which a plugin's
//! capabilities are executed.
//!
//! Grounded on `lion_core::plugin_manager::manager::PluginManager`'s
//! load/unload/execute shape, restructured around spec.md §4.4's fixed
//! `Enabled → Disabled → Enabled` / `Enabled → Faulted` state machine and
//! the "snapshot under the lock, invoke outside it" concurrency rule of
//! §5: `execute` clones the `Arc<dyn PluginInstance>` and the (cheaply
//! cloneable) `PluginContext` while holding the registry lock only long
//! enough to read them, then calls the plugin with the lock released.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kernel_audit::{AuditEntryBuilder, AuditEventType, AuditLog};
use kernel_core::{ExecutionId, PluginId, PluginManifest};
use serde_json::Value;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use crate::context::{PluginContext, Sandbox};
use crate::error::HostError;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A plugin implementation. `initialize` runs once at load time,
/// `execute` once per action invocation, `dispose` once at unload —
/// all three are given only the `PluginContext`, never raw ambient
/// authority.
#[async_trait]
pub trait PluginInstance: Send + Sync {
    async fn initialize(&self, context: &PluginContext) -> Result<(), String>;
    async fn execute(&self, action_id: &str, parameters: Value, context: &PluginContext) -> Result<Value, String>;
    async fn dispose(&self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginState {
    Enabled,
    Disabled,
    Faulted,
}

struct LoadedPlugin {
    manifest: Arc<PluginManifest>,
    instance: Arc<dyn PluginInstance>,
    context: PluginContext,
    state: PluginState,
    #[allow(dead_code)]
    loaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct LoadResult {
    pub plugin_id: PluginId,
    pub success: bool,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub plugin_id: PluginId,
    pub action_id: String,
    pub execution_id: ExecutionId,
    pub success: bool,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone)]
pub enum HostEvent {
    PluginLoaded(PluginId),
    PluginUnloaded(PluginId),
    PluginError {
        plugin_id: PluginId,
        action_id: Option<String>,
        message: String,
    },
}

pub struct PluginHost {
    sandbox: Sandbox,
    audit: Arc<AuditLog>,
    loaded: RwLock<HashMap<PluginId, LoadedPlugin>>,
    events: broadcast::Sender<HostEvent>,
}

impl PluginHost {
    pub fn new(sandbox: Sandbox, audit: Arc<AuditLog>) -> Self {
        let (events, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            sandbox,
            audit,
            loaded: RwLock::new(HashMap::new()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.events.subscribe()
    }

    pub async fn is_loaded(&self, plugin_id: &PluginId) -> bool {
        self.loaded.read().await.contains_key(plugin_id)
    }

    pub async fn state_of(&self, plugin_id: &PluginId) -> Option<PluginState> {
        self.loaded.read().await.get(plugin_id).map(|p| p.state)
    }

    pub async fn load(
        &self,
        manifest: PluginManifest,
        instance: Arc<dyn PluginInstance>,
    ) -> Result<LoadResult, HostError> {
        debug!("Loading plugin {}", manifest.id);
        let report = manifest.validate();
        if !report.is_valid() {
            let errors = report.errors.iter().map(ToString::to_string).collect();
            let fallback_id = PluginId::parse(format!("invalid.{}", manifest.id)).unwrap_or_else(|_| {
                PluginId::parse("invalid.manifest").expect("static id is valid")
            });
            warn!("Manifest for {} failed validation", manifest.id);
            return Ok(LoadResult {
                plugin_id: fallback_id,
                success: false,
                errors,
            });
        }

        let plugin_id = PluginId::parse(manifest.id.clone())?;

        if self.loaded.read().await.contains_key(&plugin_id) {
            return Err(HostError::AlreadyLoaded(plugin_id));
        }

        let manifest = Arc::new(manifest);
        let context = self.sandbox.create_context(plugin_id.clone(), manifest.clone());

        match instance.initialize(&context).await {
            Ok(()) => {
                self.audit
                    .append(AuditEntryBuilder::new(plugin_id.clone(), AuditEventType::Loaded).build());
                self.loaded.write().await.insert(
                    plugin_id.clone(),
                    LoadedPlugin {
                        manifest,
                        instance,
                        context,
                        state: PluginState::Enabled,
                        loaded_at: Utc::now(),
                    },
                );
                let _ = self.events.send(HostEvent::PluginLoaded(plugin_id.clone()));
                info!("Plugin {} loaded", plugin_id);
                Ok(LoadResult {
                    plugin_id,
                    success: true,
                    errors: vec![],
                })
            }
            Err(message) => {
                self.audit.append(
                    AuditEntryBuilder::new(plugin_id.clone(), AuditEventType::Error)
                        .details(message.clone())
                        .success(false)
                        .build(),
                );
                let _ = self.events.send(HostEvent::PluginError {
                    plugin_id: plugin_id.clone(),
                    action_id: None,
                    message: message.clone(),
                });
                warn!("Plugin {} failed to initialize: {}", plugin_id, message);
                Ok(LoadResult {
                    plugin_id,
                    success: false,
                    errors: vec![message],
                })
            }
        }
    }

    /// Atomically removes the plugin from the registry, then disposes
    /// its instance and context. Returns `false` if it wasn't loaded.
    pub async fn unload(&self, plugin_id: &PluginId) -> bool {
        let removed = self.loaded.write().await.remove(plugin_id);
        let Some(plugin) = removed else {
            return false;
        };
        plugin.instance.dispose().await;
        drop(plugin.context);
        self.audit
            .append(AuditEntryBuilder::new(plugin_id.clone(), AuditEventType::Unloaded).build());
        let _ = self.events.send(HostEvent::PluginUnloaded(plugin_id.clone()));
        info!("Plugin {} unloaded", plugin_id);
        true
    }

    pub async fn enable(&self, plugin_id: &PluginId) -> bool {
        let mut loaded = self.loaded.write().await;
        match loaded.get_mut(plugin_id) {
            Some(plugin) if plugin.state != PluginState::Faulted => {
                plugin.state = PluginState::Enabled;
                debug!("Plugin {} enabled", plugin_id);
                true
            }
            _ => false,
        }
    }

    pub async fn disable(&self, plugin_id: &PluginId) -> bool {
        let mut loaded = self.loaded.write().await;
        match loaded.get_mut(plugin_id) {
            Some(plugin) if plugin.state != PluginState::Faulted => {
                plugin.state = PluginState::Disabled;
                debug!("Plugin {} disabled", plugin_id);
                true
            }
            _ => false,
        }
    }

    pub async fn execute(
        &self,
        plugin_id: &PluginId,
        action_id: &str,
        parameters: Value,
    ) -> Result<ExecutionResult, HostError> {
        let (instance, context) = {
            let loaded = self.loaded.read().await;
            let plugin = loaded.get(plugin_id).ok_or_else(|| HostError::NotFound(plugin_id.clone()))?;
            if plugin.state != PluginState::Enabled {
                return Err(HostError::NotEnabled(plugin_id.clone()));
            }
            (plugin.instance.clone(), plugin.context.clone())
        };

        let execution_id = ExecutionId::new();
        self.audit.append(
            AuditEntryBuilder::new(plugin_id.clone(), AuditEventType::ActionStarted)
                .action_id(action_id)
                .execution_id(execution_id)
                .build(),
        );

        let start = Instant::now();
        let outcome = instance.execute(action_id, parameters, &context).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(output) => {
                self.audit.append(
                    AuditEntryBuilder::new(plugin_id.clone(), AuditEventType::ActionCompleted)
                        .action_id(action_id)
                        .execution_id(execution_id)
                        .success(true)
                        .duration_ms(duration_ms)
                        .build(),
                );
                Ok(ExecutionResult {
                    plugin_id: plugin_id.clone(),
                    action_id: action_id.to_string(),
                    execution_id,
                    success: true,
                    output: Some(output),
                    error: None,
                    duration_ms,
                })
            }
            Err(message) => {
                self.audit.append(
                    AuditEntryBuilder::new(plugin_id.clone(), AuditEventType::ActionFailed)
                        .action_id(action_id)
                        .execution_id(execution_id)
                        .success(false)
                        .duration_ms(duration_ms)
                        .details(message.clone())
                        .build(),
                );
                if let Some(plugin) = self.loaded.write().await.get_mut(plugin_id) {
                    plugin.state = PluginState::Faulted;
                }
                let _ = self.events.send(HostEvent::PluginError {
                    plugin_id: plugin_id.clone(),
                    action_id: Some(action_id.to_string()),
                    message: message.clone(),
                });
                warn!("Plugin {} faulted on action {}: {}", plugin_id, action_id, message);
                Ok(ExecutionResult {
                    plugin_id: plugin_id.clone(),
                    action_id: action_id.to_string(),
                    execution_id,
                    success: false,
                    output: None,
                    error: Some(message),
                    duration_ms,
                })
            }
        }
    }

    /// Operator kill-switch: every non-faulted plugin becomes `Disabled`.
    pub async fn disable_all(&self) {
        let mut loaded = self.loaded.write().await;
        for plugin in loaded.values_mut() {
            if plugin.state != PluginState::Faulted {
                plugin.state = PluginState::Disabled;
            }
        }
    }

    /// Unloads every loaded plugin, swallowing individual disposal
    /// failures (`unload` itself cannot fail — it only reports whether
    /// the plugin was loaded).
    pub async fn dispose(&self) {
        let ids: Vec<PluginId> = self.loaded.read().await.keys().cloned().collect();
        for id in ids {
            self.unload(&id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_core::RiskLevel;

    struct Echo;

    #[async_trait]
    impl PluginInstance for Echo {
        async fn initialize(&self, _context: &PluginContext) -> Result<(), String> {
            Ok(())
        }

        async fn execute(&self, _action_id: &str, parameters: Value, _context: &PluginContext) -> Result<Value, String> {
            Ok(parameters)
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl PluginInstance for AlwaysFails {
        async fn initialize(&self, _context: &PluginContext) -> Result<(), String> {
            Ok(())
        }

        async fn execute(&self, _action_id: &str, _parameters: Value, _context: &PluginContext) -> Result<Value, String> {
            Err("boom".to_string())
        }
    }

    fn manifest(id: &str) -> PluginManifest {
        PluginManifest::new(id, "1.0.0", "Test", "A", "D").with_risk_level(RiskLevel::ReadOnly)
    }

    fn host() -> PluginHost {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = Sandbox::new(dir.path(), Arc::new(AuditLog::new(1000)));
        PluginHost::new(sandbox, Arc::new(AuditLog::new(1000)))
    }

    #[tokio::test]
    async fn load_then_execute_round_trips() {
        let host = host();
        let id = PluginId::parse("com.x.echo").unwrap();
        let result = host.load(manifest("com.x.echo"), Arc::new(Echo)).await.unwrap();
        assert!(result.success);

        let execution = host
            .execute(&id, "say", serde_json::json!({"text": "hi"}))
            .await
            .unwrap();
        assert!(execution.success);
        assert_eq!(execution.output.unwrap()["text"], "hi");
    }

    #[tokio::test]
    async fn loading_the_same_id_twice_fails() {
        let host = host();
        host.load(manifest("com.x.echo"), Arc::new(Echo)).await.unwrap();
        let second = host.load(manifest("com.x.echo"), Arc::new(Echo)).await;
        assert!(matches!(second, Err(HostError::AlreadyLoaded(_))));
    }

    #[tokio::test]
    async fn disabled_plugin_cannot_execute() {
        let host = host();
        let id = PluginId::parse("com.x.echo").unwrap();
        host.load(manifest("com.x.echo"), Arc::new(Echo)).await.unwrap();
        assert!(host.disable(&id).await);
        let result = host.execute(&id, "say", Value::Null).await;
        assert!(matches!(result, Err(HostError::NotEnabled(_))));
    }

    #[tokio::test]
    async fn a_failing_execution_faults_the_plugin() {
        let host = host();
        let id = PluginId::parse("com.x.faulty").unwrap();
        host.load(manifest("com.x.faulty"), Arc::new(AlwaysFails)).await.unwrap();
        let execution = host.execute(&id, "go", Value::Null).await.unwrap();
        assert!(!execution.success);
        assert_eq!(host.state_of(&id).await, Some(PluginState::Faulted));

        // A faulted plugin cannot be re-enabled directly; it must be
        // unloaded and reloaded.
        assert!(!host.enable(&id).await);
        assert!(host.unload(&id).await);
        assert!(!host.is_loaded(&id).await);
    }

    #[tokio::test]
    async fn disable_all_leaves_faulted_plugins_faulted() {
        let host = host();
        let ok_id = PluginId::parse("com.x.echo").unwrap();
        let faulty_id = PluginId::parse("com.x.faulty").unwrap();
        host.load(manifest("com.x.echo"), Arc::new(Echo)).await.unwrap();
        host.load(manifest("com.x.faulty"), Arc::new(AlwaysFails)).await.unwrap();
        host.execute(&faulty_id, "go", Value::Null).await.unwrap();

        host.disable_all().await;
        assert_eq!(host.state_of(&ok_id).await, Some(PluginState::Disabled));
        assert_eq!(host.state_of(&faulty_id).await, Some(PluginState::Faulted));
    }
}
