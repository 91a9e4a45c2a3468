//! Mirrors `GovernedPluginHost` for first-party tools: policy-gated
//! execution with a session-approval ledger, but over an in-process
//! tool table rather than loaded plugin instances.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;
use kernel_policy::{Decision, PolicyEngine, PolicySource};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::GovernedError;
use crate::events::{EventBus, KernelEvent};

#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn execute(
        &self,
        tool_id: &str,
        parameters: Value,
        constraints: Option<HashMap<String, String>>,
    ) -> Result<Value, String>;
}

#[derive(Debug, Clone)]
pub struct ToolResult {
    pub tool_id: String,
    pub success: bool,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone)]
pub struct ToolPolicyCheck {
    pub decision: Decision,
    pub source: PolicySource,
    pub requires_approval: bool,
    pub reason: String,
}

pub struct GovernedToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn ToolHandler>>>,
    policy: Arc<PolicyEngine>,
    events: EventBus,
    approvals: DashMap<String, ()>,
}

impl GovernedToolRegistry {
    pub fn new(policy: Arc<PolicyEngine>, events: EventBus) -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
            policy,
            events,
            approvals: DashMap::new(),
        }
    }

    pub async fn register(&self, tool_id: impl Into<String>, handler: Arc<dyn ToolHandler>) {
        self.tools.write().await.insert(tool_id.into(), handler);
    }

    pub fn check_tool_policy(&self, tool_id: &str) -> ToolPolicyCheck {
        let result = self.policy.evaluate_tool(tool_id);
        ToolPolicyCheck {
            decision: result.decision,
            source: result.source,
            requires_approval: result.decision == Decision::AllowWithApproval,
            reason: result.reason,
        }
    }

    pub fn grant_session_approval(&self, tool_id: impl Into<String>) {
        self.approvals.insert(tool_id.into(), ());
    }

    pub fn revoke_session_approval(&self, tool_id: &str) {
        self.approvals.remove(tool_id);
    }

    pub fn clear_session_approvals(&self) {
        self.approvals.clear();
    }

    pub async fn execute(
        &self,
        tool_id: &str,
        parameters: Value,
    ) -> Result<ToolResult, GovernedError> {
        let result = self.policy.evaluate_tool(tool_id);
        let effective = if result.decision == Decision::AllowWithApproval && self.approvals.contains_key(tool_id) {
            Decision::Allow
        } else {
            result.decision
        };

        let constraints = match effective {
            Decision::Deny => {
                self.events.publish(KernelEvent::ToolBlocked {
                    tool_id: tool_id.to_string(),
                    source: result.source,
                    reason: result.reason.clone(),
                });
                warn!("Tool {} execute denied by {:?} policy: {}", tool_id, result.source, result.reason);
                return Err(GovernedError::WasBlocked {
                    source: result.source,
                    reason: result.reason,
                    rule_id: result.rule_id,
                });
            }
            Decision::AllowWithApproval => {
                info!("Tool {} execute requires approval: {}", tool_id, result.reason);
                return Err(GovernedError::RequiredApproval { reason: result.reason });
            }
            Decision::Allow => None,
            Decision::AllowWithConstraints => result.constraints.clone(),
        };

        let handler = {
            let tools = self.tools.read().await;
            tools
                .get(tool_id)
                .cloned()
                .ok_or_else(|| GovernedError::UnknownTool(tool_id.to_string()))?
        };

        let start = Instant::now();
        let outcome = handler.execute(tool_id, parameters, constraints).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(output) => Ok(ToolResult {
                tool_id: tool_id.to_string(),
                success: true,
                output: Some(output),
                error: None,
                duration_ms,
            }),
            Err(message) => Ok(ToolResult {
                tool_id: tool_id.to_string(),
                success: false,
                output: None,
                error: Some(message),
                duration_ms,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_policy::{PolicyDocument, ToolsPolicy};

    struct Echo;

    #[async_trait]
    impl ToolHandler for Echo {
        async fn execute(&self, _tool_id: &str, parameters: Value, _constraints: Option<HashMap<String, String>>) -> Result<Value, String> {
            Ok(parameters)
        }
    }

    #[tokio::test]
    async fn denied_tool_never_runs() {
        let policy = Arc::new(PolicyEngine::new());
        policy.set_policy(
            PolicySource::Organization,
            PolicyDocument::new("1.0.0").with_tools(ToolsPolicy {
                deny: vec!["shell-exec".into()],
                ..Default::default()
            }),
        ).unwrap();
        let registry = GovernedToolRegistry::new(policy, EventBus::new());
        registry.register("shell-exec", Arc::new(Echo)).await;
        let result = registry.execute("shell-exec", Value::Null).await;
        assert!(matches!(result, Err(GovernedError::WasBlocked { .. })));
    }

    #[tokio::test]
    async fn allowed_tool_executes_and_reports_duration() {
        let policy = Arc::new(PolicyEngine::new());
        let registry = GovernedToolRegistry::new(policy, EventBus::new());
        registry.register("greet", Arc::new(Echo)).await;
        let result = registry.execute("greet", serde_json::json!({"text": "hi"})).await.unwrap();
        assert!(result.success);
    }

    #[tokio::test]
    async fn session_approval_unblocks_a_require_approval_tool() {
        let policy = Arc::new(PolicyEngine::new());
        policy.set_policy(
            PolicySource::Organization,
            PolicyDocument::new("1.0.0").with_tools(ToolsPolicy {
                require_approval: vec!["risky".into()],
                ..Default::default()
            }),
        ).unwrap();
        let registry = GovernedToolRegistry::new(policy, EventBus::new());
        registry.register("risky", Arc::new(Echo)).await;
        assert!(matches!(
            registry.execute("risky", Value::Null).await,
            Err(GovernedError::RequiredApproval { .. })
        ));
        registry.grant_session_approval("risky");
        assert!(registry.execute("risky", Value::Null).await.unwrap().success);
        registry.revoke_session_approval("risky");
        assert!(matches!(
            registry.execute("risky", Value::Null).await,
            Err(GovernedError::RequiredApproval { .. })
        ));
    }
}
