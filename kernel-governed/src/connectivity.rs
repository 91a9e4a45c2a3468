//! Wraps a small connectivity mode manager and applies the policy
//! engine's merged connectivity rules before any mode change or
//! outbound request.

use std::sync::Arc;

use kernel_policy::PolicyEngine;
use parking_lot::Mutex;
use tracing::warn;

use crate::error::GovernedError;
use crate::events::{EventBus, KernelEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityMode {
    OfflineOnly,
    Assisted,
    Connected,
}

impl ConnectivityMode {
    fn as_str(self) -> &'static str {
        match self {
            ConnectivityMode::OfflineOnly => "offline_only",
            ConnectivityMode::Assisted => "assisted",
            ConnectivityMode::Connected => "connected",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectivityRequest {
    pub endpoint: String,
    pub intent: String,
}

pub struct GovernedConnectivity {
    policy: Arc<PolicyEngine>,
    events: EventBus,
    mode: Mutex<ConnectivityMode>,
}

impl GovernedConnectivity {
    pub fn new(policy: Arc<PolicyEngine>, events: EventBus) -> Self {
        Self {
            policy,
            events,
            mode: Mutex::new(ConnectivityMode::OfflineOnly),
        }
    }

    pub fn mode(&self) -> ConnectivityMode {
        *self.mode.lock()
    }

    pub fn set_mode(&self, requested: ConnectivityMode) -> Result<(), GovernedError> {
        let rules = self.policy.evaluate_connectivity_policy();
        if !rules.allow_mode_change {
            let reason = "mode changes are disabled by policy".to_string();
            self.events.publish(KernelEvent::ModeChangeBlocked {
                requested_mode: requested.as_str().to_string(),
                reason: reason.clone(),
            });
            warn!("Connectivity mode change to {} blocked: {}", requested.as_str(), reason);
            return Err(GovernedError::ModeChangeBlocked(reason));
        }
        if !rules.allowed_modes.is_empty() && !rules.allowed_modes.iter().any(|m| m == requested.as_str()) {
            let reason = format!("mode '{}' is not in the allowed set", requested.as_str());
            self.events.publish(KernelEvent::ModeChangeBlocked {
                requested_mode: requested.as_str().to_string(),
                reason: reason.clone(),
            });
            warn!("Connectivity mode change to {} blocked: {}", requested.as_str(), reason);
            return Err(GovernedError::ModeChangeBlocked(reason));
        }
        *self.mode.lock() = requested;
        Ok(())
    }

    /// Always permitted, regardless of policy: the offline direction is
    /// a safety valve.
    pub fn go_offline_now(&self) {
        *self.mode.lock() = ConnectivityMode::OfflineOnly;
    }

    pub fn check_domain(&self, host: &str) -> bool {
        self.policy.evaluate_domain(host).is_allowed()
    }

    pub fn request(&self, req: &ConnectivityRequest) -> Result<(), GovernedError> {
        if !self.check_domain(&req.endpoint) {
            self.events.publish(KernelEvent::DomainBlocked {
                host: req.endpoint.clone(),
            });
            warn!("Outbound request to {} blocked by domain policy", req.endpoint);
            return Err(GovernedError::WasBlocked {
                source: kernel_policy::PolicySource::Default,
                reason: format!("domain policy denies '{}'", req.endpoint),
                rule_id: None,
            });
        }
        let rules = self.policy.evaluate_connectivity_policy();
        if !rules.allow_telemetry && req.intent.to_lowercase().contains("telemetry") {
            return Err(GovernedError::WasBlocked {
                source: kernel_policy::PolicySource::Default,
                reason: "telemetry is disabled by policy".to_string(),
                rule_id: None,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_policy::{ConnectivityPolicy, PolicyDocument, PolicySource};

    fn connectivity_with(rules: ConnectivityPolicy) -> GovernedConnectivity {
        let policy = Arc::new(PolicyEngine::new());
        policy.set_policy(PolicySource::Organization, PolicyDocument::new("1.0.0").with_connectivity(rules)).unwrap();
        GovernedConnectivity::new(policy, EventBus::new())
    }

    #[test]
    fn mode_change_blocked_when_policy_disallows_it() {
        let connectivity = connectivity_with(ConnectivityPolicy {
            allow_mode_change: Some(false),
            ..Default::default()
        });
        assert!(connectivity.set_mode(ConnectivityMode::Connected).is_err());
    }

    #[test]
    fn go_offline_now_is_never_blocked() {
        let connectivity = connectivity_with(ConnectivityPolicy {
            allow_mode_change: Some(false),
            ..Default::default()
        });
        connectivity.go_offline_now();
        assert_eq!(connectivity.mode(), ConnectivityMode::OfflineOnly);
    }

    #[test]
    fn telemetry_request_blocked_when_disabled() {
        let connectivity = connectivity_with(ConnectivityPolicy {
            allow_telemetry: Some(false),
            ..Default::default()
        });
        let request = ConnectivityRequest {
            endpoint: "anything.example.com".into(),
            intent: "send Telemetry ping".into(),
        };
        assert!(connectivity.request(&request).is_err());
    }

    #[test]
    fn blocked_domain_is_rejected() {
        let connectivity = connectivity_with(ConnectivityPolicy {
            blocked_domains: vec!["blocked.example.com".into()],
            ..Default::default()
        });
        let request = ConnectivityRequest {
            endpoint: "blocked.example.com".into(),
            intent: "fetch data".into(),
        };
        assert!(connectivity.request(&request).is_err());
    }
}
