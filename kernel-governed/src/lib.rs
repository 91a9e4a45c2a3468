//! Policy-governed facades over the plugin host, a first-party tool
//! registry, memory, connectivity and the update channel.
//!
//! Each facade wraps a lower-level component (from `kernel-sandbox` or
//! its own in-process state) and consults the shared [`PolicyEngine`]
//! before doing anything observable. Facades publish to a single
//! one-way [`EventBus`]; none of them subscribe back into another, per
//! the "no cyclic event wiring" discipline this crate follows
//! throughout.

pub mod connectivity;
pub mod error;
pub mod events;
pub mod memory;
pub mod plugin_host;
pub mod tool_registry;
pub mod updates;

pub use connectivity::{ConnectivityMode, ConnectivityRequest, GovernedConnectivity};
pub use error::GovernedError;
pub use events::{EventBus, KernelEvent};
pub use memory::{GovernedMemory, MemoryItem, MemoryPolicyCheck, MemorySource, PendingMemoryRequest};
pub use plugin_host::{GovernedPluginHost, PolicyCheck};
pub use tool_registry::{GovernedToolRegistry, ToolHandler, ToolPolicyCheck, ToolResult};
pub use updates::{DeferralCheck, GovernedUpdates, UpdateInfo, UpdateMode};

pub use kernel_policy::PolicyEngine;
