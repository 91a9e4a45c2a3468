//! Consults the policy engine on both load and execute, and keeps the
//! in-memory session-approval ledger that lets `AllowWithApproval`
//! become `Allow` once an operator has signed off.
//!
//! Grounded on `lion_plugin_manager`'s pattern of wrapping a lower-level
//! manager and checking a policy object before delegating to it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use kernel_core::{PluginId, PluginManifest, RiskLevel};
use kernel_policy::{Decision, PolicyEngine};
use kernel_sandbox::{ExecutionResult, LoadResult, PluginHost, PluginInstance};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::GovernedError;
use crate::events::{EventBus, KernelEvent};

#[derive(Debug, Clone)]
pub struct PolicyCheck {
    pub can_load: bool,
    pub decision: Decision,
    pub source: kernel_policy::PolicySource,
    pub requires_approval: bool,
    pub reason: String,
}

#[derive(Debug, Clone)]
struct SessionApproval {
    #[allow(dead_code)]
    actor: Option<String>,
    #[allow(dead_code)]
    granted_at: DateTime<Utc>,
}

pub struct GovernedPluginHost {
    host: PluginHost,
    policy: Arc<PolicyEngine>,
    events: EventBus,
    approvals: DashMap<PluginId, SessionApproval>,
}

impl GovernedPluginHost {
    pub fn new(host: PluginHost, policy: Arc<PolicyEngine>, events: EventBus) -> Self {
        Self {
            host,
            policy,
            events,
            approvals: DashMap::new(),
        }
    }

    pub fn check_policy(
        &self,
        plugin_id: &str,
        author: Option<&str>,
        risk_level: Option<RiskLevel>,
    ) -> PolicyCheck {
        let result = self.policy.evaluate_plugin(plugin_id, author, risk_level);
        let approved = PluginId::parse(plugin_id)
            .map(|id| self.approvals.contains_key(&id))
            .unwrap_or(false);
        let can_load = result.is_allowed()
            || (result.decision == Decision::AllowWithApproval && approved);
        PolicyCheck {
            can_load,
            decision: result.decision,
            source: result.source,
            requires_approval: result.decision == Decision::AllowWithApproval && !approved,
            reason: result.reason,
        }
    }

    /// Session approvals raise but never lower the effective decision:
    /// they convert `AllowWithApproval` into `Allow`, never override
    /// `Deny`.
    pub fn approve(&self, plugin_id: PluginId, actor: Option<String>) {
        info!("Plugin {} approved by {:?}", plugin_id, actor);
        self.approvals.insert(
            plugin_id,
            SessionApproval {
                actor,
                granted_at: Utc::now(),
            },
        );
    }

    pub fn revoke_approval(&self, plugin_id: &PluginId) {
        self.approvals.remove(plugin_id);
        info!("Approval for plugin {} revoked", plugin_id);
    }

    fn effective_decision(&self, plugin_id: &PluginId, check: &PolicyCheck) -> Decision {
        if check.decision == Decision::AllowWithApproval && self.approvals.contains_key(plugin_id) {
            Decision::Allow
        } else {
            check.decision
        }
    }

    pub async fn load(
        &self,
        manifest: PluginManifest,
        author: Option<&str>,
        instance: Arc<dyn PluginInstance>,
    ) -> Result<LoadResult, GovernedError> {
        let plugin_id_str = manifest.id.clone();
        let check = self.check_policy(&plugin_id_str, author, Some(manifest.risk_level));
        let plugin_id = PluginId::parse(plugin_id_str.clone())
            .unwrap_or_else(|_| PluginId::parse("invalid.manifest").expect("static id is valid"));

        let decision = if self.approvals.contains_key(&plugin_id) && check.decision == Decision::AllowWithApproval {
            Decision::Allow
        } else {
            check.decision
        };

        match decision {
            Decision::Deny => {
                self.events.publish(KernelEvent::PluginBlocked {
                    plugin_id: plugin_id.clone(),
                    source: check.source,
                    reason: check.reason.clone(),
                });
                warn!("Plugin {} load denied by {:?} policy: {}", plugin_id, check.source, check.reason);
                Err(GovernedError::WasBlocked {
                    source: check.source,
                    reason: check.reason,
                    rule_id: None,
                })
            }
            Decision::AllowWithApproval => {
                self.events.publish(KernelEvent::ApprovalRequired {
                    plugin_id: plugin_id.clone(),
                    name: manifest.name.clone(),
                    author: author.map(ToString::to_string),
                });
                info!("Plugin {} load requires approval: {}", plugin_id, check.reason);
                Err(GovernedError::RequiredApproval { reason: check.reason })
            }
            Decision::Allow | Decision::AllowWithConstraints => {
                let result = self
                    .host
                    .load(manifest, instance)
                    .await
                    .map_err(|e| GovernedError::WasBlocked {
                        source: check.source,
                        reason: e.to_string(),
                        rule_id: None,
                    })?;
                if result.success {
                    self.events.publish(KernelEvent::PluginLoaded(result.plugin_id.clone()));
                }
                Ok(result)
            }
        }
    }

    /// Policy may change between load and execute; re-evaluate before
    /// delegating.
    pub async fn execute(
        &self,
        plugin_id: &PluginId,
        action_id: &str,
        parameters: Value,
        author: Option<&str>,
        risk_level: Option<RiskLevel>,
    ) -> Result<ExecutionResult, GovernedError> {
        let check = self.check_policy(plugin_id.as_str(), author, risk_level);
        let decision = self.effective_decision(plugin_id, &check);

        match decision {
            Decision::Deny => {
                self.events.publish(KernelEvent::PluginBlocked {
                    plugin_id: plugin_id.clone(),
                    source: check.source,
                    reason: check.reason.clone(),
                });
                warn!("Plugin {} execute denied by {:?} policy: {}", plugin_id, check.source, check.reason);
                Err(GovernedError::WasBlocked {
                    source: check.source,
                    reason: check.reason,
                    rule_id: None,
                })
            }
            Decision::AllowWithApproval => {
                self.events.publish(KernelEvent::ApprovalRequired {
                    plugin_id: plugin_id.clone(),
                    name: plugin_id.to_string(),
                    author: author.map(ToString::to_string),
                });
                info!("Plugin {} execute requires approval: {}", plugin_id, check.reason);
                Err(GovernedError::RequiredApproval { reason: check.reason })
            }
            Decision::Allow | Decision::AllowWithConstraints => self
                .host
                .execute(plugin_id, action_id, parameters)
                .await
                .map_err(|e| GovernedError::WasBlocked {
                    source: check.source,
                    reason: e.to_string(),
                    rule_id: None,
                }),
        }
    }

    pub async fn unload(&self, plugin_id: &PluginId) -> bool {
        let removed = self.host.unload(plugin_id).await;
        if removed {
            self.approvals.remove(plugin_id);
            self.events.publish(KernelEvent::PluginUnloaded(plugin_id.clone()));
        }
        removed
    }

    pub async fn disable_all(&self) {
        self.host.disable_all().await;
    }
}
