//! Deterministic hierarchical policy evaluation.
//!
//! Grounded on `lion_policy::engine` / `lion_policy::integration::resolver`'s
//! priority-sorted rule-list evaluation loop, restructured into the
//! fixed five-source, six-step algorithm spec.md §4.1 requires: an
//! operator reading a denial must be able to identify the exact
//! source, section, and rule id from the result alone.

use std::collections::{HashMap, HashSet};

use kernel_audit::{AuditEntryBuilder, AuditEventType, AuditLog};
use kernel_core::{PluginId, RiskLevel};
use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::matching::{domain_matches, glob_match};
use crate::merge::{merge_bool_false_wins, merge_highest_authority, merge_min_positive, merge_union};
use crate::merged::{MergedConnectivityRules, MergedMemoryRules, MergedUpdateRules};
use crate::model::{Decision, PolicyDocument, PolicyEvaluationResult, PolicySource, PolicyValidationError};

const ENGINE_AUDIT_CAPACITY: usize = 2_000;
const EVENT_CHANNEL_CAPACITY: usize = 256;

fn engine_plugin_id() -> PluginId {
    PluginId::parse("kernel.policy.engine").expect("static id is valid")
}

/// Emitted on every public `evaluate_*` call.
#[derive(Debug, Clone)]
pub struct PolicyEvaluatedEvent {
    pub category: &'static str,
    pub subject: String,
    pub decision: Decision,
    pub source: PolicySource,
}

/// Given a subject (tool id, plugin id, domain, ...), decides whether
/// an operation may proceed.
pub struct PolicyEngine {
    policies: RwLock<HashMap<PolicySource, PolicyDocument>>,
    audit: AuditLog,
    events: broadcast::Sender<PolicyEvaluatedEvent>,
}

impl PolicyEngine {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            policies: RwLock::new(HashMap::new()),
            audit: AuditLog::new(ENGINE_AUDIT_CAPACITY),
            events: tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PolicyEvaluatedEvent> {
        self.events.subscribe()
    }

    /// Rejects a document that fails `PolicyDocument::validate` (spec.md
    /// §4.2's rule-id uniqueness/pattern and non-empty-constraints
    /// invariants) rather than installing it.
    pub fn set_policy(
        &self,
        source: PolicySource,
        document: PolicyDocument,
    ) -> Result<(), Vec<PolicyValidationError>> {
        let report = document.validate();
        if !report.is_valid() {
            return Err(report.errors);
        }
        self.policies.write().insert(source, document);
        Ok(())
    }

    pub fn clear_policies(&self) {
        self.policies.write().clear();
    }

    pub fn get_audit_log(&self) -> Vec<kernel_audit::AuditEntry> {
        self.audit.entries()
    }

    pub fn clear_audit_log(&self) {
        self.audit.clear();
    }

    fn record(&self, category: &'static str, subject: &str, result: &PolicyEvaluationResult) {
        self.audit.append(
            AuditEntryBuilder::new(engine_plugin_id(), AuditEventType::PermissionCheck)
                .details(format!("{category}:{subject} -> {:?} ({})", result.decision, result.reason))
                .permitted(result.is_allowed())
                .build(),
        );
        // A lagging/closed receiver is not an error for the engine: the
        // event is a notification, not a delivery guarantee.
        let _ = self.events.send(PolicyEvaluatedEvent {
            category,
            subject: subject.to_string(),
            decision: result.decision,
            source: result.source,
        });
    }

    /// Evaluate a first-party tool invocation.
    pub fn evaluate_tool(&self, tool_id: &str) -> PolicyEvaluationResult {
        let policies = self.policies.read();
        for source in PolicySource::EVALUATION_ORDER {
            let Some(doc) = policies.get(&source) else {
                continue;
            };
            if let Some(tools) = &doc.tools {
                if tools.deny.iter().any(|p| glob_match(p, tool_id)) {
                    let result =
                        PolicyEvaluationResult::new(Decision::Deny, "tool matched deny list", source);
                    drop(policies);
                    self.record("tool", tool_id, &result);
                    return result;
                }
                if tools.allow.iter().any(|p| glob_match(p, tool_id)) {
                    let result =
                        PolicyEvaluationResult::new(Decision::Allow, "tool matched allow list", source);
                    drop(policies);
                    self.record("tool", tool_id, &result);
                    return result;
                }
                if tools.require_approval.iter().any(|p| glob_match(p, tool_id)) {
                    let result = PolicyEvaluationResult::new(
                        Decision::AllowWithApproval,
                        "tool matched require_approval list",
                        source,
                    );
                    drop(policies);
                    self.record("tool", tool_id, &result);
                    return result;
                }
                if let Some(rule) = tools.rules.iter().find(|r| glob_match(&r.tool, tool_id)) {
                    let mut result = PolicyEvaluationResult::new(
                        rule.decision,
                        rule.reason
                            .clone()
                            .unwrap_or_else(|| format!("matched rule {}", rule.id)),
                        source,
                    )
                    .with_rule_id(rule.id.clone());
                    if let Some(constraints) = &rule.constraints {
                        result = result.with_constraints(constraints.clone());
                    }
                    drop(policies);
                    self.record("tool", tool_id, &result);
                    return result;
                }
            }
            if source == PolicySource::Organization && doc.locked {
                let decision = doc.default.unwrap_or(Decision::Allow);
                let result = PolicyEvaluationResult::new(
                    decision,
                    "organization policy is locked; no explicit rule matched",
                    PolicySource::Organization,
                );
                drop(policies);
                self.record("tool", tool_id, &result);
                return result;
            }
        }

        let default_decision = policies
            .get(&PolicySource::Default)
            .and_then(|d| d.tools.as_ref())
            .and_then(|t| t.default)
            .unwrap_or(Decision::Allow);
        let result = PolicyEvaluationResult::new(
            default_decision,
            "no policy matched; using default",
            PolicySource::Default,
        );
        drop(policies);
        self.record("tool", tool_id, &result);
        result
    }

    /// Evaluate whether a plugin may load/run.
    pub fn evaluate_plugin(
        &self,
        plugin_id: &str,
        author: Option<&str>,
        risk_level: Option<RiskLevel>,
    ) -> PolicyEvaluationResult {
        let policies = self.policies.read();
        for source in PolicySource::EVALUATION_ORDER {
            let Some(doc) = policies.get(&source) else {
                continue;
            };
            if let Some(plugins) = &doc.plugins {
                if plugins.deny.iter().any(|p| glob_match(p, plugin_id)) {
                    let result = PolicyEvaluationResult::new(
                        Decision::Deny,
                        "plugin matched deny list",
                        source,
                    );
                    drop(policies);
                    self.record("plugin", plugin_id, &result);
                    return result;
                }
                if plugins.allow.iter().any(|p| glob_match(p, plugin_id)) {
                    let result = PolicyEvaluationResult::new(
                        Decision::Allow,
                        "plugin matched allow list",
                        source,
                    );
                    drop(policies);
                    self.record("plugin", plugin_id, &result);
                    return result;
                }
                if let Some(rule) = plugins.rules.iter().find(|r| glob_match(&r.plugin, plugin_id)) {
                    let mut result = PolicyEvaluationResult::new(
                        rule.decision,
                        rule.reason
                            .clone()
                            .unwrap_or_else(|| format!("matched rule {}", rule.id)),
                        source,
                    )
                    .with_rule_id(rule.id.clone());
                    if let Some(constraints) = &rule.constraints {
                        result = result.with_constraints(constraints.clone());
                    }
                    drop(policies);
                    self.record("plugin", plugin_id, &result);
                    return result;
                }
                if let Some(author) = author {
                    if plugins.trusted_authors.iter().any(|a| a == author) {
                        let result = PolicyEvaluationResult::new(
                            Decision::Allow,
                            format!("author '{author}' is trusted"),
                            source,
                        );
                        drop(policies);
                        self.record("plugin", plugin_id, &result);
                        return result;
                    }
                }
                if plugins.enabled == Some(false) {
                    let result = PolicyEvaluationResult::new(
                        Decision::Deny,
                        "plugins are disabled by policy",
                        source,
                    );
                    drop(policies);
                    self.record("plugin", plugin_id, &result);
                    return result;
                }
                if let (Some(max), Some(declared)) = (plugins.max_risk_level, risk_level) {
                    if declared > max {
                        let result = PolicyEvaluationResult::new(
                            Decision::Deny,
                            format!(
                                "declared risk {declared:?} exceeds max_risk_level {max:?}"
                            ),
                            source,
                        );
                        drop(policies);
                        self.record("plugin", plugin_id, &result);
                        return result;
                    }
                }
            }
            if source == PolicySource::Organization && doc.locked {
                let decision = doc.default.unwrap_or(Decision::AllowWithApproval);
                let result = PolicyEvaluationResult::new(
                    decision,
                    "organization policy is locked; no explicit rule matched",
                    PolicySource::Organization,
                );
                drop(policies);
                self.record("plugin", plugin_id, &result);
                return result;
            }
        }

        let default_decision = policies
            .get(&PolicySource::Default)
            .and_then(|d| d.plugins.as_ref())
            .and_then(|p| p.default)
            .unwrap_or(Decision::AllowWithApproval);
        let result = PolicyEvaluationResult::new(
            default_decision,
            "no policy matched; using default",
            PolicySource::Default,
        );
        drop(policies);
        self.record("plugin", plugin_id, &result);
        result
    }

    /// Evaluate whether a plugin may reach a network host.
    pub fn evaluate_domain(&self, host: &str) -> PolicyEvaluationResult {
        let policies = self.policies.read();

        for source in PolicySource::EVALUATION_ORDER {
            let Some(doc) = policies.get(&source) else {
                continue;
            };
            if let Some(connectivity) = doc.connectivity.as_ref() {
                if connectivity
                    .blocked_domains
                    .iter()
                    .any(|p| domain_matches(p, host))
                {
                    let result =
                        PolicyEvaluationResult::new(Decision::Deny, "domain matched blocked_domains", source);
                    drop(policies);
                    self.record("domain", host, &result);
                    return result;
                }
            }
            if source == PolicySource::Organization && doc.locked {
                let decision = doc.default.unwrap_or(Decision::Allow);
                let result = PolicyEvaluationResult::new(
                    decision,
                    "organization policy is locked; no explicit rule matched",
                    PolicySource::Organization,
                );
                drop(policies);
                self.record("domain", host, &result);
                return result;
            }
        }

        let mut merged_allowed = Vec::new();
        let mut allow_list_source = PolicySource::Default;
        for source in [
            PolicySource::Organization,
            PolicySource::Team,
            PolicySource::User,
            PolicySource::Session,
            PolicySource::Default,
        ] {
            if let Some(connectivity) = policies.get(&source).and_then(|d| d.connectivity.as_ref()) {
                if !connectivity.allowed_domains.is_empty() && merged_allowed.is_empty() {
                    allow_list_source = source;
                }
                merged_allowed.extend(connectivity.allowed_domains.iter().cloned());
            }
        }

        let result = if merged_allowed.is_empty() {
            PolicyEvaluationResult::new(Decision::Allow, "no domain policy configured", PolicySource::Default)
        } else if merged_allowed.iter().any(|p| domain_matches(p, host)) {
            PolicyEvaluationResult::new(Decision::Allow, "domain matched allowed_domains", allow_list_source)
        } else {
            PolicyEvaluationResult::new(
                Decision::Deny,
                "allowed_domains is non-empty and host matched none of it",
                allow_list_source,
            )
        };
        drop(policies);
        self.record("domain", host, &result);
        result
    }

    pub fn evaluate_memory_policy(&self) -> MergedMemoryRules {
        let policies = self.policies.read();
        let sections: Vec<_> = PolicySource::EVALUATION_ORDER
            .iter()
            .chain(std::iter::once(&PolicySource::Default))
            .filter_map(|s| policies.get(s).and_then(|d| d.memory.as_ref()))
            .collect();

        MergedMemoryRules {
            enabled: merge_bool_false_wins(sections.iter().map(|m| m.enabled)),
            max_retention_days: merge_min_positive(sections.iter().map(|m| m.max_retention_days)),
            max_memories: merge_min_positive(sections.iter().map(|m| m.max_memories)),
            encrypt_at_rest: merge_bool_false_wins(sections.iter().map(|m| m.encrypt_at_rest)),
            auto_formation: merge_bool_false_wins(sections.iter().map(|m| m.auto_formation)),
            exclude_categories: merge_union(sections.iter().map(|m| m.exclude_categories.as_slice()))
                .into_iter()
                .collect::<HashSet<_>>(),
            allow_export: merge_bool_false_wins(sections.iter().map(|m| m.allow_export)),
            allow_import: merge_bool_false_wins(sections.iter().map(|m| m.allow_import)),
        }
    }

    pub fn evaluate_connectivity_policy(&self) -> MergedConnectivityRules {
        let policies = self.policies.read();
        let sections: Vec<_> = PolicySource::EVALUATION_ORDER
            .iter()
            .chain(std::iter::once(&PolicySource::Default))
            .filter_map(|s| policies.get(s).and_then(|d| d.connectivity.as_ref()))
            .collect();

        MergedConnectivityRules {
            allowed_modes: merge_union(sections.iter().map(|c| c.allowed_modes.as_slice())),
            default_mode: merge_highest_authority(sections.iter().map(|c| c.default_mode.clone())),
            allow_mode_change: merge_bool_false_wins(sections.iter().map(|c| c.allow_mode_change)),
            allowed_domains: merge_union(sections.iter().map(|c| c.allowed_domains.as_slice())),
            blocked_domains: merge_union(sections.iter().map(|c| c.blocked_domains.as_slice())),
            allow_telemetry: merge_bool_false_wins(sections.iter().map(|c| c.allow_telemetry)),
        }
    }

    pub fn evaluate_update_policy(&self) -> MergedUpdateRules {
        let policies = self.policies.read();
        let sections: Vec<_> = PolicySource::EVALUATION_ORDER
            .iter()
            .chain(std::iter::once(&PolicySource::Default))
            .filter_map(|s| policies.get(s).and_then(|d| d.updates.as_ref()))
            .collect();

        MergedUpdateRules {
            auto_update: merge_bool_false_wins(sections.iter().map(|u| u.auto_update)),
            allowed_channels: merge_union(sections.iter().map(|u| u.allowed_channels.as_slice())),
            required_channel: merge_highest_authority(sections.iter().map(|u| u.required_channel.clone())),
            defer_days: merge_min_positive(sections.iter().map(|u| u.defer_days)),
            check_on_startup: merge_bool_false_wins(sections.iter().map(|u| u.check_on_startup)),
            minimum_version: merge_highest_authority(sections.iter().map(|u| u.minimum_version.clone())),
        }
    }
}

impl Default for PolicyEngine {
    fn default() -> Self {
        Self::new()
    }
}
