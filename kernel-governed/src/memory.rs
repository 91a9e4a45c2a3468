//! Policy-governed memory store: every write is checked against
//! capacity, category exclusion and auto-formation rules before it is
//! accepted; retention and count limits are enforced on demand.

use chrono::{DateTime, Utc};
use kernel_audit::{AuditEntryBuilder, AuditEventType, AuditLog};
use kernel_core::PluginId;
use kernel_policy::PolicyEngine;
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::GovernedError;
use crate::events::{EventBus, KernelEvent};

/// Stand-in subject for audit entries generated by the session-wide
/// memory store, which is not scoped to any one loaded plugin.
fn system_subject() -> PluginId {
    PluginId::parse("kernel.memory").expect("static id is valid")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemorySource {
    Inferred,
    Explicit,
}

#[derive(Debug, Clone)]
pub struct MemoryItem {
    pub id: Uuid,
    pub kind: String,
    pub key: String,
    pub value: Value,
    pub justification: String,
    pub category: Option<String>,
    pub source: MemorySource,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PendingMemoryRequest {
    pub kind: String,
    pub key: String,
    pub value: Value,
    pub justification: String,
    pub category: Option<String>,
    pub requested_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct MemoryPolicyCheck {
    pub can_remember: bool,
    pub can_export: bool,
    pub can_import: bool,
    pub auto_formation_allowed: bool,
    pub memory_count: usize,
    pub max_memories: u32,
    pub reason: Option<String>,
}

pub struct GovernedMemory {
    policy: Arc<PolicyEngine>,
    events: EventBus,
    audit: Arc<AuditLog>,
    items: RwLock<Vec<MemoryItem>>,
}

impl GovernedMemory {
    pub fn new(policy: Arc<PolicyEngine>, events: EventBus, audit: Arc<AuditLog>) -> Self {
        Self {
            policy,
            events,
            audit,
            items: RwLock::new(Vec::new()),
        }
    }

    fn audit_permission_check(&self, permitted: bool, details: impl Into<String>) {
        self.audit.append(
            AuditEntryBuilder::new(system_subject(), AuditEventType::PermissionCheck)
                .permitted(permitted)
                .details(details)
                .build(),
        );
    }

    pub fn check_policy(&self) -> MemoryPolicyCheck {
        let rules = self.policy.evaluate_memory_policy();
        let count = self.items.read().len();
        let enabled = rules.enabled;
        let at_capacity = rules.max_memories > 0 && count as u32 >= rules.max_memories;
        MemoryPolicyCheck {
            can_remember: enabled && !at_capacity,
            can_export: rules.allow_export,
            can_import: rules.allow_import,
            auto_formation_allowed: rules.auto_formation,
            memory_count: count,
            max_memories: rules.max_memories,
            reason: if !enabled {
                Some("memory is disabled by policy".to_string())
            } else if at_capacity {
                Some(format!("at capacity ({count}/{})", rules.max_memories))
            } else {
                None
            },
        }
    }

    pub fn is_category_allowed(&self, category: &str) -> bool {
        let rules = self.policy.evaluate_memory_policy();
        let needle = category.to_lowercase();
        !rules.exclude_categories.iter().any(|c| c.to_lowercase() == needle)
    }

    fn reject(&self, reason: String) -> GovernedError {
        self.events.publish(KernelEvent::MemoryBlocked { reason: reason.clone() });
        warn!("Memory write blocked: {}", reason);
        GovernedError::MemoryDisabled.tap_reason(reason)
    }

    pub fn request_remember(
        &self,
        kind: impl Into<String>,
        key: impl Into<String>,
        value: Value,
        justification: impl Into<String>,
        category: Option<String>,
        source: MemorySource,
    ) -> Result<PendingMemoryRequest, GovernedError> {
        let key = key.into();
        let check = self.check_policy();
        let category_allowed = category
            .as_deref()
            .map(|c| self.is_category_allowed(c))
            .unwrap_or(true);
        let auto_formation_ok = source != MemorySource::Inferred || check.auto_formation_allowed;
        let permitted = check.can_remember && category_allowed && auto_formation_ok;
        self.audit_permission_check(permitted, format!("request_remember key={key}"));

        if !check.can_remember {
            return Err(self.reject(check.reason.unwrap_or_else(|| "memory blocked".to_string())));
        }
        if let Some(category) = &category {
            if !category_allowed {
                return Err(self.reject(format!("category '{category}' is excluded")));
            }
        }
        if !auto_formation_ok {
            return Err(self.reject("auto-formation is disabled by policy".to_string()));
        }

        Ok(PendingMemoryRequest {
            kind: kind.into(),
            key,
            value,
            justification: justification.into(),
            category,
            requested_at: Utc::now(),
        })
    }

    /// Bypasses the auto-formation check but still honors capacity and
    /// category exclusion.
    pub fn remember_explicit(
        &self,
        kind: impl Into<String>,
        key: impl Into<String>,
        value: Value,
        justification: impl Into<String>,
        category: Option<String>,
    ) -> Result<MemoryItem, GovernedError> {
        let key = key.into();
        let check = self.check_policy();
        let category_allowed = category
            .as_deref()
            .map(|c| self.is_category_allowed(c))
            .unwrap_or(true);
        let permitted = check.can_remember && category_allowed;
        self.audit_permission_check(permitted, format!("remember_explicit key={key}"));

        if !check.can_remember {
            return Err(self.reject(check.reason.unwrap_or_else(|| "memory blocked".to_string())));
        }
        if let Some(category) = &category {
            if !category_allowed {
                return Err(self.reject(format!("category '{category}' is excluded")));
            }
        }

        let item = MemoryItem {
            id: Uuid::new_v4(),
            kind: kind.into(),
            key,
            value,
            justification: justification.into(),
            category,
            source: MemorySource::Explicit,
            created_at: Utc::now(),
        };
        self.items.write().push(item.clone());
        Ok(item)
    }

    /// Removes items older than `max_retention_days` (0 = unlimited).
    pub fn apply_retention_policy(&self) -> usize {
        let rules = self.policy.evaluate_memory_policy();
        if rules.max_retention_days == 0 {
            return 0;
        }
        let cutoff = Utc::now() - chrono::Duration::days(rules.max_retention_days as i64);
        let mut items = self.items.write();
        let before = items.len();
        items.retain(|item| item.created_at >= cutoff);
        let removed = before - items.len();
        drop(items);
        if removed > 0 {
            self.events.publish(KernelEvent::MemoriesPurged {
                count: removed,
                retention_days: Some(rules.max_retention_days),
            });
            debug!("Retention policy purged {} memories", removed);
        }
        removed
    }

    /// Removes the oldest items until the count is at or below
    /// `max_memories` (0 = unlimited).
    pub fn enforce_count_limit(&self) -> usize {
        let rules = self.policy.evaluate_memory_policy();
        if rules.max_memories == 0 {
            return 0;
        }
        let mut items = self.items.write();
        items.sort_by_key(|item| item.created_at);
        let before = items.len();
        let max = rules.max_memories as usize;
        if before > max {
            items.drain(0..before - max);
        }
        let removed = before - items.len();
        drop(items);
        if removed > 0 {
            self.events.publish(KernelEvent::MemoriesPurged {
                count: removed,
                retention_days: None,
            });
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl GovernedError {
    /// Re-tags a generic `MemoryDisabled` with the specific reason the
    /// caller computed, without growing a dedicated variant per reason.
    fn tap_reason(self, reason: String) -> Self {
        match self {
            GovernedError::MemoryDisabled => GovernedError::WasBlocked {
                source: kernel_policy::PolicySource::Default,
                reason,
                rule_id: None,
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_policy::{MemoryPolicy, PolicyDocument, PolicySource};

    fn memory_with(rules: MemoryPolicy) -> GovernedMemory {
        let policy = Arc::new(PolicyEngine::new());
        policy.set_policy(PolicySource::Organization, PolicyDocument::new("1.0.0").with_memory(rules)).unwrap();
        GovernedMemory::new(policy, EventBus::new(), Arc::new(AuditLog::new(100)))
    }

    #[test]
    fn disabled_memory_blocks_remember() {
        let memory = memory_with(MemoryPolicy {
            enabled: Some(false),
            ..Default::default()
        });
        let result = memory.remember_explicit("note", "k", Value::Null, "because", None);
        assert!(result.is_err());
    }

    #[test]
    fn inferred_memory_blocked_when_auto_formation_is_off() {
        let memory = memory_with(MemoryPolicy {
            auto_formation: Some(false),
            ..Default::default()
        });
        let result = memory.request_remember("note", "k", Value::Null, "because", None, MemorySource::Inferred);
        assert!(result.is_err());
    }

    #[test]
    fn explicit_memory_bypasses_auto_formation_but_not_capacity() {
        let memory = memory_with(MemoryPolicy {
            auto_formation: Some(false),
            max_memories: Some(1),
            ..Default::default()
        });
        memory
            .remember_explicit("note", "a", Value::Null, "because", None)
            .unwrap();
        let second = memory.remember_explicit("note", "b", Value::Null, "because", None);
        assert!(second.is_err());
    }

    #[test]
    fn excluded_category_is_blocked() {
        let memory = memory_with(MemoryPolicy {
            exclude_categories: vec!["health".into()],
            ..Default::default()
        });
        let result = memory.remember_explicit("note", "k", Value::Null, "because", Some("Health".into()));
        assert!(result.is_err());
    }

    #[test]
    fn enforce_count_limit_drops_the_oldest_first_after_policy_tightens() {
        // Starts unrestricted so five items can accumulate, then the
        // operator tightens the cap — enforce_count_limit is how a
        // retroactive policy change gets applied to existing memories.
        let memory = memory_with(MemoryPolicy::default());
        for i in 0..5 {
            memory
                .remember_explicit("note", format!("k{i}"), Value::Null, "because", None)
                .unwrap();
        }
        memory.policy.set_policy(
            PolicySource::Organization,
            PolicyDocument::new("1.0.0").with_memory(MemoryPolicy {
                max_memories: Some(2),
                ..Default::default()
            }),
        ).unwrap();
        let removed = memory.enforce_count_limit();
        assert_eq!(removed, 3);
        assert_eq!(memory.len(), 2);
    }

    #[test]
    fn retention_purge_keeps_only_items_within_the_window() {
        let memory = memory_with(MemoryPolicy::default());
        let old = MemoryItem {
            id: Uuid::new_v4(),
            kind: "note".into(),
            key: "old".into(),
            value: Value::Null,
            justification: "because".into(),
            category: None,
            source: MemorySource::Explicit,
            created_at: Utc::now() - chrono::Duration::days(60),
        };
        let recent = MemoryItem {
            id: Uuid::new_v4(),
            kind: "note".into(),
            key: "recent".into(),
            value: Value::Null,
            justification: "because".into(),
            category: None,
            source: MemorySource::Explicit,
            created_at: Utc::now() - chrono::Duration::days(1),
        };
        memory.items.write().push(old);
        memory.items.write().push(recent);
        memory.policy.set_policy(
            PolicySource::Organization,
            PolicyDocument::new("1.0.0").with_memory(MemoryPolicy {
                max_retention_days: Some(30),
                ..Default::default()
            }),
        ).unwrap();

        let removed = memory.apply_retention_policy();
        assert_eq!(removed, 1);
        assert_eq!(memory.len(), 1);
        assert_eq!(memory.items.read()[0].key, "recent");
    }

    #[test]
    fn explicit_memory_records_exactly_one_permission_check_per_call() {
        let memory = memory_with(MemoryPolicy {
            auto_formation: Some(false),
            ..Default::default()
        });

        let inferred = memory.request_remember(
            "note",
            "k",
            Value::Null,
            "because",
            None,
            MemorySource::Inferred,
        );
        assert!(inferred.is_err());

        memory
            .remember_explicit("note", "k", Value::Null, "because", None)
            .unwrap();

        let checks = memory.audit.entries_of_type(AuditEventType::PermissionCheck);
        assert_eq!(checks.len(), 2);
        assert_eq!(checks.iter().filter(|e| e.permitted == Some(false)).count(), 1);
        assert_eq!(checks.iter().filter(|e| e.permitted == Some(true)).count(), 1);
    }
}
