//! Plugin sandbox: mediated resource access and the plugin lifecycle
//! host. Plugins reach files, the network, memory and storage only
//! through a [`PluginContext`]; every access is audited.

pub mod context;
pub mod error;
pub mod host;
pub mod mediator;

pub use context::{PluginContext, Sandbox};
pub use error::{HostError, SandboxError};
pub use host::{ExecutionResult, HostEvent, LoadResult, PluginHost, PluginInstance, PluginState};
pub use mediator::{
    check_permission, AlwaysOnline, ConnectivityGate, FileMediator, MemoryMediator,
    NetworkMediator, NetworkResponse, StorageMediator, Transport,
};
