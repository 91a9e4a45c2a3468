//! Append-only, bounded, queryable audit log.
//!
//! Grounded directly on `lion_capability::check::audit::AuditLog`: the
//! same "log every attempt, trim the oldest once a bound is exceeded"
//! shape, generalized from a per-plugin `DashMap<PluginId, Vec<_>>` of
//! file-access entries to one global, insertion-ordered store covering
//! every `AuditEventType` in the spec, with derived statistics.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use kernel_core::{ExecutionId, PluginId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    Loaded,
    Unloaded,
    Enabled,
    Disabled,
    Error,
    ActionStarted,
    ActionCompleted,
    ActionFailed,
    ResourceAccess,
    PermissionCheck,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub plugin_id: PluginId,
    pub event_type: AuditEventType,
    pub action_id: Option<String>,
    pub execution_id: Option<ExecutionId>,
    pub success: Option<bool>,
    pub duration_ms: Option<u64>,
    pub details: Option<String>,
    pub resource_type: Option<String>,
    pub resource: Option<String>,
    pub permitted: Option<bool>,
}

/// Builder for an [`AuditEntry`]; keeps call sites in `kernel-sandbox`
/// and `kernel-governed` from repeating the full field list.
#[derive(Debug, Clone)]
pub struct AuditEntryBuilder {
    entry: AuditEntry,
}

impl AuditEntryBuilder {
    pub fn new(plugin_id: PluginId, event_type: AuditEventType) -> Self {
        Self {
            entry: AuditEntry {
                timestamp: Utc::now(),
                plugin_id,
                event_type,
                action_id: None,
                execution_id: None,
                success: None,
                duration_ms: None,
                details: None,
                resource_type: None,
                resource: None,
                permitted: None,
            },
        }
    }

    pub fn action_id(mut self, action_id: impl Into<String>) -> Self {
        self.entry.action_id = Some(action_id.into());
        self
    }

    pub fn execution_id(mut self, execution_id: ExecutionId) -> Self {
        self.entry.execution_id = Some(execution_id);
        self
    }

    pub fn success(mut self, success: bool) -> Self {
        self.entry.success = Some(success);
        self
    }

    pub fn duration_ms(mut self, duration_ms: u64) -> Self {
        self.entry.duration_ms = Some(duration_ms);
        self
    }

    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.entry.details = Some(details.into());
        self
    }

    pub fn resource(mut self, resource_type: impl Into<String>, resource: impl Into<String>) -> Self {
        self.entry.resource_type = Some(resource_type.into());
        self.entry.resource = Some(resource.into());
        self
    }

    pub fn permitted(mut self, permitted: bool) -> Self {
        self.entry.permitted = Some(permitted);
        self
    }

    pub fn build(self) -> AuditEntry {
        self.entry
    }
}

/// Counts and aggregates derived from the current entry list; always
/// consistent with it, since it is computed fresh on every call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AuditStatistics {
    pub total: usize,
    pub by_event_type: std::collections::HashMap<String, usize>,
    pub by_plugin: std::collections::HashMap<String, usize>,
    pub denied_access_count: usize,
    pub average_duration_ms: Option<f64>,
    pub success_rate: Option<f64>,
    pub first_timestamp: Option<DateTime<Utc>>,
    pub last_timestamp: Option<DateTime<Utc>>,
}

/// A bounded, insertion-ordered, append-only audit store.
///
/// Protected by a single lock per the concurrency model (spec.md §5):
/// `append`/`entries`/`clear` are all short, non-suspending operations.
pub struct AuditLog {
    entries: Mutex<VecDeque<AuditEntry>>,
    max_entries: usize,
}

impl AuditLog {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(max_entries.min(1024))),
            max_entries,
        }
    }

    /// Append an entry, dropping the oldest (by insertion order) if the
    /// store is at capacity.
    pub fn append(&self, entry: AuditEntry) {
        let mut entries = self.entries.lock();
        if entries.len() >= self.max_entries {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// All entries, ordered by timestamp descending, ties broken by
    /// insertion order (spec.md §5 query-ordering guarantee).
    pub fn entries(&self) -> Vec<AuditEntry> {
        let entries = self.entries.lock();
        let mut indexed: Vec<(usize, AuditEntry)> =
            entries.iter().cloned().enumerate().collect();
        indexed.sort_by(|(ia, a), (ib, b)| b.timestamp.cmp(&a.timestamp).then(ib.cmp(ia)));
        indexed.into_iter().map(|(_, e)| e).collect()
    }

    pub fn entries_for_plugin(&self, plugin_id: &PluginId) -> Vec<AuditEntry> {
        self.entries()
            .into_iter()
            .filter(|e| &e.plugin_id == plugin_id)
            .collect()
    }

    pub fn entries_of_type(&self, event_type: AuditEventType) -> Vec<AuditEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.event_type == event_type)
            .collect()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn statistics(&self) -> AuditStatistics {
        let entries = self.entries();
        let mut stats = AuditStatistics {
            total: entries.len(),
            ..Default::default()
        };

        let mut durations = Vec::new();
        let mut successes = 0usize;
        let mut outcomes = 0usize;

        for entry in &entries {
            *stats
                .by_event_type
                .entry(format!("{:?}", entry.event_type))
                .or_insert(0) += 1;
            *stats
                .by_plugin
                .entry(entry.plugin_id.as_str().to_string())
                .or_insert(0) += 1;

            if entry.event_type == AuditEventType::ResourceAccess
                || entry.event_type == AuditEventType::PermissionCheck
            {
                if entry.permitted == Some(false) {
                    stats.denied_access_count += 1;
                }
            }

            if let Some(ms) = entry.duration_ms {
                durations.push(ms);
            }

            if let Some(success) = entry.success {
                outcomes += 1;
                if success {
                    successes += 1;
                }
            }
        }

        if !durations.is_empty() {
            stats.average_duration_ms =
                Some(durations.iter().sum::<u64>() as f64 / durations.len() as f64);
        }
        if outcomes > 0 {
            stats.success_rate = Some(successes as f64 / outcomes as f64);
        }
        stats.first_timestamp = entries.iter().map(|e| e.timestamp).min();
        stats.last_timestamp = entries.iter().map(|e| e.timestamp).max();

        stats
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plugin(name: &str) -> PluginId {
        PluginId::parse(name).unwrap()
    }

    #[test]
    fn append_and_read_back() {
        let log = AuditLog::new(10);
        log.append(
            AuditEntryBuilder::new(plugin("com.x.a"), AuditEventType::Loaded).build(),
        );
        let entries = log.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].plugin_id, plugin("com.x.a"));
    }

    #[test]
    fn overflow_drops_oldest_in_insertion_order() {
        let log = AuditLog::new(2);
        for i in 0..3 {
            log.append(
                AuditEntryBuilder::new(plugin("com.x.a"), AuditEventType::ResourceAccess)
                    .resource("file", format!("/tmp/{i}"))
                    .permitted(true)
                    .build(),
            );
        }
        assert_eq!(log.len(), 2);
        let resources: Vec<_> = log
            .entries()
            .into_iter()
            .map(|e| e.resource.unwrap())
            .collect();
        assert!(!resources.contains(&"/tmp/0".to_string()));
    }

    #[test]
    fn statistics_reflect_denied_and_success_rate() {
        let log = AuditLog::new(10);
        log.append(
            AuditEntryBuilder::new(plugin("com.x.a"), AuditEventType::ResourceAccess)
                .resource("file", "/tmp/a")
                .permitted(false)
                .build(),
        );
        log.append(
            AuditEntryBuilder::new(plugin("com.x.a"), AuditEventType::ActionCompleted)
                .success(true)
                .duration_ms(5)
                .build(),
        );
        log.append(
            AuditEntryBuilder::new(plugin("com.x.a"), AuditEventType::ActionFailed)
                .success(false)
                .duration_ms(15)
                .build(),
        );

        let stats = log.statistics();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.denied_access_count, 1);
        assert_eq!(stats.success_rate, Some(0.5));
        assert_eq!(stats.average_duration_ms, Some(10.0));
    }

    #[test]
    fn clear_empties_the_log() {
        let log = AuditLog::new(10);
        log.append(AuditEntryBuilder::new(plugin("com.x.a"), AuditEventType::Loaded).build());
        log.clear();
        assert!(log.is_empty());
    }
}
