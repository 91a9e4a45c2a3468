use std::sync::Arc;

use async_trait::async_trait;
use kernel_audit::{AuditEntryBuilder, AuditEventType, AuditLog};
use kernel_core::{AccessLevel, PermissionType, PluginId, PluginManifest};

use crate::error::SandboxError;
use crate::mediator::check_permission;

/// Reflects live connectivity state and re-checks domain policy for
/// every outbound request. Implemented by the governed connectivity
/// facade; a sandbox used standalone (no connectivity manager wired)
/// gets an always-available, always-allowed default.
pub trait ConnectivityGate: Send + Sync {
    fn is_available(&self) -> bool;
    fn check_domain(&self, host: &str) -> bool;
}

pub struct AlwaysOnline;

impl ConnectivityGate for AlwaysOnline {
    fn is_available(&self) -> bool {
        true
    }

    fn check_domain(&self, _host: &str) -> bool {
        true
    }
}

/// The actual wire transport. No concrete HTTP client is bundled — a
/// host application supplies one. Without a transport, a permitted
/// request still audits and returns an empty body: permission was
/// granted, delivery is simply not wired up.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, endpoint: &str, method: &str, body: Option<&[u8]>) -> Result<Vec<u8>, String>;
}

#[derive(Debug, Clone)]
pub struct NetworkResponse {
    pub status: Option<u16>,
    pub body: Vec<u8>,
}

#[derive(Clone)]
pub struct NetworkMediator {
    plugin_id: PluginId,
    manifest: Arc<PluginManifest>,
    audit: Arc<AuditLog>,
    gate: Option<Arc<dyn ConnectivityGate>>,
    transport: Option<Arc<dyn Transport>>,
}

fn required_access(method: &str) -> AccessLevel {
    match method.to_ascii_uppercase().as_str() {
        "GET" | "HEAD" | "OPTIONS" => AccessLevel::Read,
        _ => AccessLevel::Write,
    }
}

/// Extract the host component of an absolute URL without pulling in a
/// full URL-parsing crate: `scheme://host[:port][/path]`.
fn extract_host(endpoint: &str) -> Option<&str> {
    let after_scheme = endpoint.split_once("://").map(|(_, rest)| rest)?;
    let host_and_port = after_scheme.split('/').next().unwrap_or(after_scheme);
    host_and_port.split(':').next()
}

impl NetworkMediator {
    pub(crate) fn new(
        plugin_id: PluginId,
        manifest: Arc<PluginManifest>,
        audit: Arc<AuditLog>,
        gate: Option<Arc<dyn ConnectivityGate>>,
        transport: Option<Arc<dyn Transport>>,
    ) -> Self {
        Self {
            plugin_id,
            manifest,
            audit,
            gate,
            transport,
        }
    }

    pub fn is_available(&self) -> bool {
        self.gate.as_ref().map(|g| g.is_available()).unwrap_or(true)
    }

    pub async fn request(
        &self,
        endpoint: &str,
        method: &str,
        body: Option<&[u8]>,
        intent: &str,
    ) -> Result<NetworkResponse, SandboxError> {
        let scope_ok = check_permission(
            &self.manifest,
            PermissionType::Network,
            required_access(method),
            Some(endpoint),
        );
        let domain_ok = match extract_host(endpoint) {
            Some(host) => self.gate.as_ref().map(|g| g.check_domain(host)).unwrap_or(true),
            None => false,
        };
        let permitted = scope_ok && domain_ok;

        let forwarded_intent = format!("[Plugin:{}] {intent}", self.plugin_id);
        self.audit.append(
            AuditEntryBuilder::new(self.plugin_id.clone(), AuditEventType::ResourceAccess)
                .resource("network", endpoint)
                .details(format!("{method} {forwarded_intent}"))
                .permitted(permitted)
                .build(),
        );

        if !permitted {
            return Err(SandboxError::PermissionMissing {
                resource_type: "network",
                resource: endpoint.to_string(),
            });
        }

        match &self.transport {
            Some(transport) => {
                let body_bytes = transport
                    .send(endpoint, method, body)
                    .await
                    .map_err(SandboxError::Transport)?;
                Ok(NetworkResponse {
                    status: Some(200),
                    body: body_bytes,
                })
            }
            None => Ok(NetworkResponse {
                status: None,
                body: Vec::new(),
            }),
        }
    }
}
