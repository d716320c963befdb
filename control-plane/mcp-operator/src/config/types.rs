use envconfig::Envconfig;

use crate::crd::TransportType;
use crate::translator::{DEFAULT_ADAPTER_IMAGE, TranslatorDefaults};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("MCP_OPERATOR_DEFAULT_PORT must be non-zero")]
    ZeroPort,
    #[error("MCP_OPERATOR_DEFAULT_TRANSPORT must be 'stdio' or 'http', got '{0}'")]
    Transport(String),
    #[error("MCP_OPERATOR_ADAPTER_IMAGE must not be empty")]
    EmptyAdapterImage,
}

#[derive(Envconfig, Clone, Debug)]
pub struct OperatorConfig {
    /// Image the stdio adapter binary is copied from.
    /// Env: MCP_OPERATOR_ADAPTER_IMAGE
    #[envconfig(
        from = "MCP_OPERATOR_ADAPTER_IMAGE",
        default = "ghcr.io/agentgateway/agentgateway:0.9.0-musl"
    )]
    pub adapter_image: String,

    #[envconfig(from = "MCP_OPERATOR_DEFAULT_PORT", default = "3000")]
    pub default_port: u16,

    /// Transport used when an MCPServer omits `transportType` (stdio | http)
    #[envconfig(from = "MCP_OPERATOR_DEFAULT_TRANSPORT", default = "stdio")]
    pub default_transport: String,

    /// Fallback server image for specs that leave `deployment.image` empty
    #[envconfig(from = "MCP_OPERATOR_DEFAULT_IMAGE")]
    pub default_image: Option<String>,

    /// Watch a single namespace instead of the whole cluster
    #[envconfig(from = "MCP_OPERATOR_WATCH_NAMESPACE")]
    pub watch_namespace: Option<String>,

    #[envconfig(from = "MCP_OPERATOR_REQUEUE_SECS", default = "60")]
    pub requeue_secs: u64,

    /// Report Available/NotAvailable on the Ready condition
    #[envconfig(from = "MCP_OPERATOR_CHECK_AVAILABILITY", default = "false")]
    pub check_availability: bool,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            adapter_image: DEFAULT_ADAPTER_IMAGE.to_string(),
            default_port: crate::crd::DEFAULT_MCP_PORT,
            default_transport: "stdio".to_string(),
            default_image: None,
            watch_namespace: None,
            requeue_secs: 60,
            check_availability: false,
        }
    }
}

impl OperatorConfig {
    /// Validate and convert into the translator's defaults.
    pub fn translator_defaults(&self) -> Result<TranslatorDefaults, ConfigError> {
        if self.default_port == 0 {
            return Err(ConfigError::ZeroPort);
        }
        let adapter_image = self.adapter_image.trim();
        if adapter_image.is_empty() {
            return Err(ConfigError::EmptyAdapterImage);
        }
        let transport = match self.default_transport.trim().to_ascii_lowercase().as_str() {
            "stdio" => TransportType::Stdio,
            "http" => TransportType::Http,
            other => return Err(ConfigError::Transport(other.to_string())),
        };
        Ok(TranslatorDefaults {
            adapter_image: adapter_image.to_string(),
            port: self.default_port,
            transport,
            image: self
                .default_image
                .as_deref()
                .map(str::trim)
                .filter(|i| !i.is_empty())
                .map(str::to_string),
        })
    }

    /// Empty namespace values mean cluster-wide.
    pub fn namespace(&self) -> Option<&str> {
        self.watch_namespace
            .as_deref()
            .map(str::trim)
            .filter(|ns| !ns.is_empty())
    }
}
