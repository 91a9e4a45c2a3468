//! Merged, source-independent policy results for the non-boolean
//! sections (spec.md §4.1/§4.2).

use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq)]
pub struct MergedMemoryRules {
    pub enabled: bool,
    pub max_retention_days: u32,
    pub max_memories: u32,
    pub encrypt_at_rest: bool,
    pub auto_formation: bool,
    pub exclude_categories: HashSet<String>,
    pub allow_export: bool,
    pub allow_import: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergedConnectivityRules {
    pub allowed_modes: Vec<String>,
    pub default_mode: Option<String>,
    pub allow_mode_change: bool,
    pub allowed_domains: Vec<String>,
    pub blocked_domains: Vec<String>,
    pub allow_telemetry: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergedUpdateRules {
    pub auto_update: bool,
    pub allowed_channels: Vec<String>,
    pub required_channel: Option<String>,
    pub defer_days: u32,
    pub check_on_startup: bool,
    pub minimum_version: Option<String>,
}
