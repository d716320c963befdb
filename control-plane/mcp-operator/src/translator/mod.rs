//! Translation of an `MCPServer` into the Kubernetes objects that run it.
//!
//! Everything here is pure. Applying the objects and reading live state is
//! the controller's job.

pub mod assembler;
pub mod error;
pub mod overrides;
pub mod transport;
pub mod volumes;


use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Service, ServiceAccount};
use kube::ResourceExt;
use tracing::debug;

pub use assembler::PRIMARY_CONTAINER;
pub use error::TranslateError;
pub use transport::{Transport, TransportFragment};

use crate::crd::{DEFAULT_MCP_PORT, McpServer, TransportType};

pub const DEFAULT_ADAPTER_IMAGE: &str =
    "ghcr.io/agentgateway/agentgateway:0.9.0-musl";

/// Operator-level defaults the translator falls back to.
#[derive(Clone, Debug, PartialEq)]
pub struct TranslatorDefaults {
    /// Image used by the stdio adapter init container
    pub adapter_image: String,
    /// Port used when neither the transport nor the deployment set one
    pub port: u16,
    /// Transport used when `transportType` is omitted
    pub transport: TransportType,
    /// Server image used when `deployment.image` is empty
    pub image: Option<String>,
}

impl Default for TranslatorDefaults {
    fn default() -> Self {
        Self {
            adapter_image: DEFAULT_ADAPTER_IMAGE.to_string(),
            port: DEFAULT_MCP_PORT,
            transport: TransportType::Stdio,
            image: None,
        }
    }
}

/// Objects generated for one server in one reconciliation pass.
#[derive(Clone, Debug, PartialEq)]
pub struct GeneratedWorkload {
    pub transport: TransportType,
    pub deployment: Deployment,
    pub service: Option<Service>,
    pub config_map: Option<ConfigMap>,
    pub service_account: Option<ServiceAccount>,
}

impl GeneratedWorkload {
    /// `(kind, name)` of every generated object, in apply order.
    pub fn object_refs(&self) -> Vec<(&'static str, String)> {
        let mut out = Vec::new();
        if let Some(cm) = &self.config_map {
            out.push(("ConfigMap", cm.name_any()));
        }
        if let Some(sa) = &self.service_account {
            out.push(("ServiceAccount", sa.name_any()));
        }
        out.push(("Deployment", self.deployment.name_any()));
        if let Some(svc) = &self.service {
            out.push(("Service", svc.name_any()));
        }
        out
    }
}

/// Stateless translator; safe to share across concurrent reconciles.
#[derive(Clone, Debug, Default)]
pub struct Translator {
    defaults: TranslatorDefaults,
}

impl Translator {
    pub fn new(defaults: TranslatorDefaults) -> Self {
        Self { defaults }
    }

    pub fn defaults(&self) -> &TranslatorDefaults {
        &self.defaults
    }

    pub fn assemble(
        &self,
        server: &McpServer,
    ) -> Result<GeneratedWorkload, TranslateError> {
        let out = assembler::assemble(server, &self.defaults);
        match &out {
            Ok(w) => debug!(
                name = %server.name_any(),
                transport = %w.transport,
                objects = w.object_refs().len(),
                "translated MCPServer"
            ),
            Err(e) => debug!(
                name = %server.name_any(),
                error = %e,
                "MCPServer translation failed"
            ),
        }
        out
    }
}
