//! Policy documents and rule sections.
//!
//! Grounded on `lion_policy::model::rule` (`PolicyRule`/`PolicyAction`/
//! `PolicySubject`/`PolicyObject`), generalized from a single flat rule
//! list over one kind of subject into the five named sections
//! (tools/plugins/memory/connectivity/updates) of spec.md §4.2.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use kernel_core::RiskLevel;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One of the five policy sources, totally ordered by precedence —
/// `Organization` (0) is the highest authority, `Default` (4) the
/// lowest (built-in fallback).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicySource {
    Organization = 0,
    Team = 1,
    User = 2,
    Session = 3,
    Default = 4,
}

impl PolicySource {
    /// The fixed iteration order the evaluation algorithm walks.
    pub const EVALUATION_ORDER: [PolicySource; 4] = [
        PolicySource::Organization,
        PolicySource::Team,
        PolicySource::User,
        PolicySource::Session,
    ];

    pub fn writable_by_end_user(self) -> bool {
        matches!(self, PolicySource::User | PolicySource::Session)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Deny,
    AllowWithApproval,
    AllowWithConstraints,
}

/// The outcome of a single `evaluate_*` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyEvaluationResult {
    pub decision: Decision,
    pub reason: String,
    pub source: PolicySource,
    pub source_path: Option<String>,
    pub rule_id: Option<String>,
    pub constraints: Option<HashMap<String, String>>,
    pub evaluated_at: DateTime<Utc>,
}

impl PolicyEvaluationResult {
    pub fn new(decision: Decision, reason: impl Into<String>, source: PolicySource) -> Self {
        Self {
            decision,
            reason: reason.into(),
            source,
            source_path: None,
            rule_id: None,
            constraints: None,
            evaluated_at: Utc::now(),
        }
    }

    pub fn with_rule_id(mut self, rule_id: impl Into<String>) -> Self {
        self.rule_id = Some(rule_id.into());
        self
    }

    pub fn with_constraints(mut self, constraints: HashMap<String, String>) -> Self {
        self.constraints = Some(constraints);
        self
    }

    pub fn with_source_path(mut self, path: impl Into<String>) -> Self {
        self.source_path = Some(path.into());
        self
    }

    pub fn is_allowed(&self) -> bool {
        matches!(
            self.decision,
            Decision::Allow | Decision::AllowWithConstraints
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRule {
    pub id: String,
    pub tool: String,
    pub decision: Decision,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub constraints: Option<HashMap<String, String>>,
    #[serde(default)]
    pub conditions: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsPolicy {
    #[serde(default)]
    pub default: Option<Decision>,
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
    #[serde(default)]
    pub require_approval: Vec<String>,
    #[serde(default)]
    pub rules: Vec<ToolRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginRule {
    pub id: String,
    pub plugin: String,
    pub decision: Decision,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub constraints: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginsPolicy {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub default: Option<Decision>,
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
    #[serde(default)]
    pub trusted_authors: Vec<String>,
    #[serde(default)]
    pub max_risk_level: Option<RiskLevel>,
    #[serde(default)]
    pub rules: Vec<PluginRule>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryPolicy {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub max_retention_days: Option<u32>,
    #[serde(default)]
    pub max_memories: Option<u32>,
    #[serde(default)]
    pub encrypt_at_rest: Option<bool>,
    #[serde(default)]
    pub auto_formation: Option<bool>,
    #[serde(default)]
    pub exclude_categories: Vec<String>,
    #[serde(default)]
    pub allow_export: Option<bool>,
    #[serde(default)]
    pub allow_import: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectivityPolicy {
    #[serde(default)]
    pub allowed_modes: Vec<String>,
    #[serde(default)]
    pub default_mode: Option<String>,
    #[serde(default)]
    pub allow_mode_change: Option<bool>,
    #[serde(default)]
    pub allowed_domains: Vec<String>,
    #[serde(default)]
    pub blocked_domains: Vec<String>,
    #[serde(default)]
    pub allow_telemetry: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdatesPolicy {
    #[serde(default)]
    pub auto_update: Option<bool>,
    #[serde(default)]
    pub allowed_channels: Vec<String>,
    #[serde(default)]
    pub required_channel: Option<String>,
    #[serde(default)]
    pub defer_days: Option<u32>,
    #[serde(default)]
    pub check_on_startup: Option<bool>,
    #[serde(default)]
    pub minimum_version: Option<String>,
}

/// One documented `PolicyDocument` invariant violation (spec.md §4.2).
/// A document can fail several at once; `validate` collects all of
/// them rather than stopping at the first.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyValidationError {
    #[error("duplicate rule id '{0}' in {1} rules")]
    DuplicateRuleId(String, &'static str),

    #[error("rule id '{0}' in {1} rules does not match [a-zA-Z0-9._-]+")]
    InvalidRuleId(String, &'static str),

    #[error("rule '{0}' in {1} rules has decision allow_with_constraints but no constraints")]
    EmptyConstraints(String, &'static str),
}

/// Result of validating a `PolicyDocument`.
#[derive(Debug, Default, Clone)]
pub struct PolicyDocumentValidation {
    pub errors: Vec<PolicyValidationError>,
}

impl PolicyDocumentValidation {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

fn rule_id_regex() -> Regex {
    Regex::new(r"^[a-zA-Z0-9._-]+$").expect("static regex")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyDocument {
    pub version: String,
    #[serde(default)]
    pub identity: Option<String>,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub default: Option<Decision>,
    #[serde(default)]
    pub tools: Option<ToolsPolicy>,
    #[serde(default)]
    pub plugins: Option<PluginsPolicy>,
    #[serde(default)]
    pub memory: Option<MemoryPolicy>,
    #[serde(default)]
    pub connectivity: Option<ConnectivityPolicy>,
    #[serde(default)]
    pub updates: Option<UpdatesPolicy>,
}

impl PolicyDocument {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            identity: None,
            locked: false,
            default: None,
            tools: None,
            plugins: None,
            memory: None,
            connectivity: None,
            updates: None,
        }
    }

    pub fn locked(mut self) -> Self {
        self.locked = true;
        self
    }

    pub fn with_default(mut self, decision: Decision) -> Self {
        self.default = Some(decision);
        self
    }

    pub fn with_tools(mut self, tools: ToolsPolicy) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_plugins(mut self, plugins: PluginsPolicy) -> Self {
        self.plugins = Some(plugins);
        self
    }

    pub fn with_memory(mut self, memory: MemoryPolicy) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_connectivity(mut self, connectivity: ConnectivityPolicy) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    pub fn with_updates(mut self, updates: UpdatesPolicy) -> Self {
        self.updates = Some(updates);
        self
    }

    /// Validate every documented rule invariant in one pass (spec.md
    /// §4.2): rule ids must be unique within their section and match
    /// `[a-zA-Z0-9._-]+`, and an `allow_with_constraints` rule must
    /// carry a non-empty `constraints` map.
    pub fn validate(&self) -> PolicyDocumentValidation {
        let mut report = PolicyDocumentValidation::default();

        if let Some(tools) = &self.tools {
            validate_rules(&tools.rules, "tools", |r| &r.id, |r| &r.constraints, &mut report);
        }
        if let Some(plugins) = &self.plugins {
            validate_rules(&plugins.rules, "plugins", |r| &r.id, |r| &r.constraints, &mut report);
        }

        report
    }
}

fn validate_rules<R>(
    rules: &[R],
    section: &'static str,
    id_of: impl Fn(&R) -> &String,
    constraints_of: impl Fn(&R) -> &Option<HashMap<String, String>>,
    report: &mut PolicyDocumentValidation,
) where
    R: HasDecision,
{
    let pattern = rule_id_regex();
    let mut seen_ids = HashSet::new();
    for rule in rules {
        let id = id_of(rule);
        if !pattern.is_match(id) {
            report
                .errors
                .push(PolicyValidationError::InvalidRuleId(id.clone(), section));
        }
        if !seen_ids.insert(id.clone()) {
            report
                .errors
                .push(PolicyValidationError::DuplicateRuleId(id.clone(), section));
        }
        if rule.decision() == Decision::AllowWithConstraints {
            let empty = constraints_of(rule).as_ref().map(HashMap::is_empty).unwrap_or(true);
            if empty {
                report
                    .errors
                    .push(PolicyValidationError::EmptyConstraints(id.clone(), section));
            }
        }
    }
}

trait HasDecision {
    fn decision(&self) -> Decision;
}

impl HasDecision for ToolRule {
    fn decision(&self) -> Decision {
        self.decision
    }
}

impl HasDecision for PluginRule {
    fn decision(&self) -> Decision {
        self.decision
    }
}
