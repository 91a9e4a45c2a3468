//! Plugin manifest model and validation.
//!
//! Grounded on `lion_core::plugin_manager::manifest::PluginManifest`:
//! the same builder-style `with_*` constructors and a `Validatable`-style
//! impl, generalized from the teacher's language/security-settings shape
//! to the permission/capability/risk-level shape this kernel requires.

use std::collections::HashSet;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ManifestError;
use crate::id::validate_plugin_id;

/// An ordinal claim about how much authority a plugin requests.
///
/// `SystemAdjacent` is reserved: the type accepts it (policy documents
/// need to be able to name it in `max_risk_level`), but no manifest may
/// declare it — `validate()` rejects it unconditionally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    ReadOnly,
    LocalMutation,
    Network,
    SystemAdjacent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionType {
    File,
    Memory,
    Network,
    Ui,
    Conversation,
    Settings,
}

/// Linearly ordered: `Read < Write < Execute`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    Read,
    Write,
    Execute,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginPermission {
    #[serde(rename = "type")]
    pub kind: PermissionType,
    pub access: AccessLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default)]
    pub optional: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginCapability {
    pub tool_id: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub requires_network: bool,
    #[serde(default)]
    pub modifies_state: bool,
    #[serde(default)]
    pub parameters: Vec<CapabilityParameter>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkIntent {
    pub endpoints: Vec<String>,
    pub data_sent: String,
    pub data_received: String,
    pub retention: String,
    pub purpose: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginManifest {
    pub id: String,
    pub version: String,
    pub name: String,
    pub author: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_app_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_point: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<PluginPermission>,
    #[serde(default)]
    pub capabilities: Vec<PluginCapability>,
    pub risk_level: RiskLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_intent: Option<NetworkIntent>,
}

/// Result of validating a manifest: a list of invariant violations (if
/// any) plus non-fatal warnings (e.g. a non-HTTPS intent endpoint).
#[derive(Debug, Default, Clone)]
pub struct ValidationReport {
    pub errors: Vec<ManifestError>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

fn version_regex() -> Regex {
    Regex::new(r"^\d+(\.\d+){1,3}(-[0-9A-Za-z][0-9A-Za-z.-]*)?$").expect("static regex")
}

impl PluginManifest {
    pub fn new(
        id: impl Into<String>,
        version: impl Into<String>,
        name: impl Into<String>,
        author: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
            name: name.into(),
            author: author.into(),
            description: description.into(),
            min_app_version: None,
            homepage: None,
            license: None,
            icon_path: None,
            entry_point: None,
            tags: Vec::new(),
            permissions: Vec::new(),
            capabilities: Vec::new(),
            risk_level: RiskLevel::ReadOnly,
            network_intent: None,
        }
    }

    pub fn with_permission(mut self, permission: PluginPermission) -> Self {
        self.permissions.push(permission);
        self
    }

    pub fn with_capability(mut self, capability: PluginCapability) -> Self {
        self.capabilities.push(capability);
        self
    }

    pub fn with_risk_level(mut self, risk_level: RiskLevel) -> Self {
        self.risk_level = risk_level;
        self
    }

    pub fn with_network_intent(mut self, intent: NetworkIntent) -> Self {
        self.network_intent = Some(intent);
        self
    }

    /// The minimum risk level implied by this manifest's permissions,
    /// independent of what it declares.
    pub fn calculated_min_risk(&self) -> RiskLevel {
        let mut min = RiskLevel::ReadOnly;
        for permission in &self.permissions {
            if permission.kind == PermissionType::Network {
                min = min.max(RiskLevel::Network);
            }
            if permission.access >= AccessLevel::Write {
                min = min.max(RiskLevel::LocalMutation);
            }
        }
        min
    }

    /// Validate every documented invariant in one pass, collecting all
    /// violations rather than stopping at the first.
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();

        if let Err(e) = validate_plugin_id(&self.id) {
            report.errors.push(ManifestError::InvalidId(e.to_string()));
        }

        if self.name.trim().is_empty() {
            report.errors.push(ManifestError::EmptyField("name"));
        }
        if self.author.trim().is_empty() {
            report.errors.push(ManifestError::EmptyField("author"));
        }
        if self.description.trim().is_empty() {
            report.errors.push(ManifestError::EmptyField("description"));
        }

        if !version_regex().is_match(&self.version) {
            report
                .errors
                .push(ManifestError::InvalidVersion(self.version.clone()));
        }

        if self.risk_level == RiskLevel::SystemAdjacent {
            report.errors.push(ManifestError::SystemAdjacentReserved);
        }

        let min_risk = self.calculated_min_risk();
        if self.risk_level < min_risk {
            report.errors.push(ManifestError::RiskLevelTooLow {
                declared: format!("{:?}", self.risk_level),
                minimum: format!("{:?}", min_risk),
            });
        }

        for permission in &self.permissions {
            let needs_scope = matches!(permission.kind, PermissionType::File | PermissionType::Network);
            let scope_is_empty = permission
                .scope
                .as_deref()
                .map(str::is_empty)
                .unwrap_or(true);
            if needs_scope && scope_is_empty {
                report
                    .errors
                    .push(ManifestError::MissingScope(format!("{:?}", permission.kind)));
            }
            if permission.kind == PermissionType::File
                && permission.access >= AccessLevel::Write
                && permission.scope.as_deref() == Some("*")
            {
                report.errors.push(ManifestError::WildcardFileWrite);
            }
        }

        let mut seen_ids = HashSet::new();
        for capability in &self.capabilities {
            if !seen_ids.insert(capability.tool_id.clone()) {
                report
                    .errors
                    .push(ManifestError::DuplicateCapabilityId(capability.tool_id.clone()));
            }
            if capability.modifies_state
                && !self
                    .permissions
                    .iter()
                    .any(|p| p.access >= AccessLevel::Write)
            {
                report.errors.push(ManifestError::ModifiesStateWithoutPermission(
                    capability.tool_id.clone(),
                ));
            }
            if capability.requires_network
                && !self
                    .permissions
                    .iter()
                    .any(|p| p.kind == PermissionType::Network)
            {
                report
                    .errors
                    .push(ManifestError::RequiresNetworkWithoutPermission(
                        capability.tool_id.clone(),
                    ));
            }
        }

        if let Some(intent) = &self.network_intent {
            let network_scopes: Vec<&str> = self
                .permissions
                .iter()
                .filter(|p| p.kind == PermissionType::Network)
                .filter_map(|p| p.scope.as_deref())
                .collect();
            for endpoint in &intent.endpoints {
                if !endpoint.contains("://") {
                    report
                        .errors
                        .push(ManifestError::NonAbsoluteEndpoint(endpoint.clone()));
                    continue;
                }
                if !endpoint.starts_with("https://") {
                    report
                        .warnings
                        .push(format!("network intent endpoint '{endpoint}' is not HTTPS"));
                }
                let covered = network_scopes.iter().any(|scope| endpoint.starts_with(scope));
                if !covered {
                    report
                        .errors
                        .push(ManifestError::UncoveredNetworkIntent(endpoint.clone()));
                }
            }
        }

        report
    }

    pub fn is_loadable(&self) -> bool {
        self.validate().is_valid()
    }
}
