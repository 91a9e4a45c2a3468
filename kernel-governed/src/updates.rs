//! Policy-governed update channel, deferral and minimum-version checks.

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use kernel_policy::PolicyEngine;
use tracing::warn;

use crate::error::GovernedError;
use crate::events::{EventBus, KernelEvent};

#[derive(Debug, Clone)]
pub struct UpdateInfo {
    pub channel: String,
    pub version: String,
    pub released_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    Manual,
    Notify,
    AutoInstall,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferralCheck {
    pub should_defer: bool,
    pub days_remaining: i64,
}

/// Dotted-numeric version comparison (ignores any pre-release suffix):
/// enough to order `minimum_version` checks without a full semver crate.
fn compare_versions(a: &str, b: &str) -> Ordering {
    let numeric = |s: &str| -> Vec<u64> {
        s.split('-')
            .next()
            .unwrap_or(s)
            .split('.')
            .map(|part| part.parse::<u64>().unwrap_or(0))
            .collect()
    };
    let (va, vb) = (numeric(a), numeric(b));
    for i in 0..va.len().max(vb.len()) {
        let x = va.get(i).copied().unwrap_or(0);
        let y = vb.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

pub struct GovernedUpdates {
    policy: Arc<PolicyEngine>,
    events: EventBus,
}

impl GovernedUpdates {
    pub fn new(policy: Arc<PolicyEngine>, events: EventBus) -> Self {
        Self { policy, events }
    }

    /// `required_channel`, if set, is exclusive; otherwise
    /// `allowed_channels` (if non-empty) gates.
    pub fn is_channel_allowed(&self, channel: &str) -> bool {
        let rules = self.policy.evaluate_update_policy();
        if let Some(required) = &rules.required_channel {
            return required == channel;
        }
        rules.allowed_channels.is_empty() || rules.allowed_channels.iter().any(|c| c == channel)
    }

    pub fn check_deferral(&self, update: &UpdateInfo) -> DeferralCheck {
        let rules = self.policy.evaluate_update_policy();
        if rules.defer_days == 0 {
            return DeferralCheck {
                should_defer: false,
                days_remaining: 0,
            };
        }
        let elapsed = (Utc::now() - update.released_at).num_days();
        let remaining = rules.defer_days as i64 - elapsed;
        DeferralCheck {
            should_defer: remaining > 0,
            days_remaining: remaining.max(0),
        }
    }

    pub fn meets_minimum_version(&self, current: &str) -> bool {
        let rules = self.policy.evaluate_update_policy();
        match &rules.minimum_version {
            Some(minimum) => compare_versions(current, minimum) != Ordering::Less,
            None => true,
        }
    }

    pub fn set_mode(&self, mode: UpdateMode) -> Result<(), GovernedError> {
        let rules = self.policy.evaluate_update_policy();
        if mode == UpdateMode::AutoInstall && !rules.auto_update {
            let reason = "auto-update is disabled by policy".to_string();
            self.events.publish(KernelEvent::AutoUpdateBlocked { reason: reason.clone() });
            warn!("Auto-update mode change blocked: {}", reason);
            return Err(GovernedError::ModeChangeBlocked(reason));
        }
        Ok(())
    }

    pub fn check_for_update(&self, running_channel: &str) -> Result<(), GovernedError> {
        if !self.is_channel_allowed(running_channel) {
            self.events.publish(KernelEvent::ChannelBlocked {
                channel: running_channel.to_string(),
            });
            warn!("Update channel '{}' is blocked by policy", running_channel);
            return Err(GovernedError::WasChannelBlocked(running_channel.to_string()));
        }
        Ok(())
    }
}
