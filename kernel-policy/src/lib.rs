//! Hierarchical policy engine: deterministic evaluation of
//! organization/team/user/session rules over tools, plugins, memory,
//! connectivity and updates.

pub mod document;
pub mod engine;
pub mod matching;
pub mod merge;
pub mod merged;
pub mod model;

pub use document::{load_document, parse_document, DocumentError};
pub use engine::{PolicyEngine, PolicyEvaluatedEvent};
pub use matching::{domain_matches, glob_match, glob_match_ci};
pub use merged::{MergedConnectivityRules, MergedMemoryRules, MergedUpdateRules};
pub use model::{
    ConnectivityPolicy, Decision, MemoryPolicy, PluginRule, PluginsPolicy, PolicyDocument,
    PolicyEvaluationResult, PolicySource, PolicyValidationError, ToolRule, ToolsPolicy,
    UpdatesPolicy, PolicyDocumentValidation,
};
