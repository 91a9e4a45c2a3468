use thiserror::Error;
use kernel_policy::PolicySource;

#[derive(Error, Debug, Clone)]
pub enum GovernedError {
    #[error("blocked by {source:?} policy: {reason}")]
    WasBlocked {
        source: PolicySource,
        reason: String,
        rule_id: Option<String>,
    },

    #[error("requires operator approval: {reason}")]
    RequiredApproval { reason: String },

    #[error("plugin '{0}' is already loaded")]
    AlreadyLoaded(String),

    #[error("update channel '{0}' is not allowed")]
    WasChannelBlocked(String),

    #[error("mode change blocked: {0}")]
    ModeChangeBlocked(String),

    #[error("memory capacity reached ({0} items)")]
    CapacityReached(u32),

    #[error("memory category '{0}' is excluded by policy")]
    CategoryExcluded(String),

    #[error("memory is disabled by policy")]
    MemoryDisabled,

    #[error("tool '{0}' is not registered")]
    UnknownTool(String),
}
