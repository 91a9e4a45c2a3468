//! One-way event broker: the governed facades publish, any observer
//! subscribes. Nothing here ever holds a reference back into a facade
//! — per spec.md §9's "cyclic event wiring" design note, `PluginHost`
//! and its wrappers must never mutually subscribe to each other.

use kernel_core::PluginId;
use kernel_policy::PolicySource;
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 512;

#[derive(Debug, Clone)]
pub enum KernelEvent {
    PluginLoaded(PluginId),
    PluginUnloaded(PluginId),
    PluginError {
        plugin_id: PluginId,
        action_id: Option<String>,
        message: String,
    },
    PluginBlocked {
        plugin_id: PluginId,
        source: PolicySource,
        reason: String,
    },
    ApprovalRequired {
        plugin_id: PluginId,
        name: String,
        author: Option<String>,
    },
    ToolBlocked {
        tool_id: String,
        source: PolicySource,
        reason: String,
    },
    MemoryBlocked {
        reason: String,
    },
    MemoriesPurged {
        count: usize,
        retention_days: Option<u32>,
    },
    ModeChangeBlocked {
        requested_mode: String,
        reason: String,
    },
    DomainBlocked {
        host: String,
    },
    AutoUpdateBlocked {
        reason: String,
    },
    ChannelBlocked {
        channel: String,
    },
    PolicyEvaluated {
        category: &'static str,
        subject: String,
    },
    PolicyUpdated,
}

/// Thin wrapper over a broadcast sender shared by every governed
/// facade in one kernel instance.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<KernelEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<KernelEvent> {
        self.sender.subscribe()
    }

    /// A lagging/closed receiver is not an error: events are
    /// notifications, not a delivery guarantee.
    pub fn publish(&self, event: KernelEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
