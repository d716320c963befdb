use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, ContainerPort, EmptyDirVolumeSource,
    Volume, VolumeMount,
};
use serde::Serialize;
use tracing::debug;

use super::TranslatorDefaults;
use super::error::TranslateError;
use crate::crd::{McpServerDeployment, McpServerSpec, TransportType};

pub const INIT_CONTAINER_NAME: &str = "adapter-init";
pub const ADAPTER_VOLUME: &str = "adapter-bin";
pub const ADAPTER_MOUNT_PATH: &str = "/adapter";
/// Location of the adapter binary inside the adapter image.
pub const ADAPTER_SOURCE: &str = "/usr/bin/agentgateway";
pub const ADAPTER_BINARY: &str = "/adapter/agentgateway";
pub const ADAPTER_CONFIG_VOLUME: &str = "adapter-config";
pub const ADAPTER_CONFIG_MOUNT_PATH: &str = "/etc/mcp/adapter";
pub const ADAPTER_CONFIG_KEY: &str = "config.json";
pub const DEFAULT_TARGET_PATH: &str = "/mcp";
pub const PORT_NAME: &str = "mcp";

/// Resolved transport. Only the payload of the selected variant exists.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transport {
    Stdio,
    Http { port: i32, path: String },
}

impl Transport {
    /// Collapse `transportType` and its payloads into one variant.
    pub fn resolve(
        spec: &McpServerSpec,
        defaults: &TranslatorDefaults,
    ) -> Result<Self, TranslateError> {
        match spec.transport_type_or(defaults.transport) {
            TransportType::Stdio => {
                if spec.http_transport.is_some() {
                    debug!("ignoring httpTransport payload for stdio transport");
                }
                Ok(Transport::Stdio)
            }
            TransportType::Http => {
                if spec.stdio_transport.is_some() {
                    debug!("ignoring stdioTransport payload for http transport");
                }
                let http = spec.http_transport.clone().unwrap_or_default();
                let port = http
                    .target_port
                    .filter(|p| *p != 0)
                    .or_else(|| {
                        spec.deployment
                            .port
                            .filter(|p| *p != 0)
                            .map(u32::from)
                    })
                    .or_else(|| {
                        Some(u32::from(defaults.port)).filter(|p| *p != 0)
                    })
                    .ok_or_else(|| {
                        TranslateError::InvalidConfig(
                            "http transport requires a target port".into(),
                        )
                    })?;
                let port = i32::try_from(port)
                    .ok()
                    .filter(|p| *p <= i32::from(u16::MAX))
                    .ok_or_else(|| {
                        TranslateError::InvalidConfig(format!(
                            "http target port {port} is out of range"
                        ))
                    })?;
                let path = http
                    .target_path
                    .filter(|p| !p.is_empty())
                    .unwrap_or_else(|| DEFAULT_TARGET_PATH.to_string());
                if !path.starts_with('/') {
                    return Err(TranslateError::InvalidConfig(format!(
                        "http target path '{path}' must start with '/'"
                    )));
                }
                Ok(Transport::Http { port, path })
            }
            TransportType::Unsupported => {
                Err(TranslateError::UnsupportedTransport(
                    "transportType must be one of: stdio, http".into(),
                ))
            }
        }
    }

    pub fn transport_type(&self) -> TransportType {
        match self {
            Transport::Stdio => TransportType::Stdio,
            Transport::Http { .. } => TransportType::Http,
        }
    }
}

/// Configuration consumed by the stdio adapter running in the main container.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct AdapterConfig {
    pub listen: AdapterListener,
    pub target: StdioTarget,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct AdapterListener {
    pub port: u16,
    pub path: String,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct StdioTarget {
    pub name: String,
    pub cmd: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

impl AdapterConfig {
    pub fn render(&self) -> Result<String, TranslateError> {
        serde_json::to_string_pretty(self).map_err(|e| {
            TranslateError::InvalidConfig(format!("adapter config: {e}"))
        })
    }
}

/// Transport-specific pieces folded into the base workload.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransportFragment {
    pub ports: Vec<ContainerPort>,
    pub init_container: Option<Container>,
    pub volumes: Vec<Volume>,
    pub mounts: Vec<VolumeMount>,
    /// Replaces the primary container's command when set
    pub command: Option<Vec<String>>,
    pub args: Option<Vec<String>>,
    pub adapter_config: Option<AdapterConfig>,
    /// Port a Service should expose; `None` means no Service
    pub service_port: Option<i32>,
    pub target_path: Option<String>,
}

pub fn adapter_config_map_name(server: &str) -> String {
    format!("{server}-adapter")
}

/// Build the fragment for `transport`.
pub fn build_fragment(
    transport: &Transport,
    server_name: &str,
    deployment: &McpServerDeployment,
    defaults: &TranslatorDefaults,
) -> Result<TransportFragment, TranslateError> {
    match transport {
        Transport::Http { port, path } => Ok(http_fragment(*port, path, deployment)),
        Transport::Stdio => stdio_fragment(server_name, deployment, defaults),
    }
}

fn http_fragment(
    port: i32,
    path: &str,
    deployment: &McpServerDeployment,
) -> TransportFragment {
    let command = deployment
        .cmd
        .as_ref()
        .filter(|c| !c.is_empty())
        .map(|c| vec![c.clone()]);
    let args = Some(deployment.args.clone()).filter(|a| !a.is_empty());
    TransportFragment {
        ports: vec![ContainerPort {
            name: Some(PORT_NAME.to_string()),
            container_port: port,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }],
        command,
        args,
        service_port: Some(port),
        target_path: Some(path.to_string()),
        ..Default::default()
    }
}

fn stdio_fragment(
    server_name: &str,
    deployment: &McpServerDeployment,
    defaults: &TranslatorDefaults,
) -> Result<TransportFragment, TranslateError> {
    let cmd = deployment
        .cmd
        .as_deref()
        .filter(|c| !c.is_empty())
        .ok_or_else(|| {
            TranslateError::InvalidConfig(
                "stdio transport requires deployment.cmd".into(),
            )
        })?;
    if cmd == ADAPTER_MOUNT_PATH
        || cmd.starts_with(&format!("{ADAPTER_MOUNT_PATH}/"))
    {
        return Err(TranslateError::UnsupportedTransport(format!(
            "stdio command '{cmd}' points into the adapter volume and cannot be wrapped"
        )));
    }
    check_reserved(deployment)?;

    let adapter_image = deployment
        .init_container
        .as_ref()
        .and_then(|i| i.image.clone())
        .filter(|i| !i.is_empty())
        .unwrap_or_else(|| defaults.adapter_image.clone());
    let pull_policy = deployment
        .init_container
        .as_ref()
        .and_then(|i| i.image_pull_policy.clone())
        .filter(|p| !p.is_empty());

    let adapter_mount = VolumeMount {
        name: ADAPTER_VOLUME.to_string(),
        mount_path: ADAPTER_MOUNT_PATH.to_string(),
        ..Default::default()
    };
    let init_container = Container {
        name: INIT_CONTAINER_NAME.to_string(),
        image: Some(adapter_image),
        image_pull_policy: pull_policy,
        command: Some(vec![
            "cp".to_string(),
            ADAPTER_SOURCE.to_string(),
            ADAPTER_BINARY.to_string(),
        ]),
        volume_mounts: Some(vec![adapter_mount.clone()]),
        ..Default::default()
    };

    let listen_port = deployment
        .port
        .filter(|p| *p != 0)
        .unwrap_or(defaults.port);
    let adapter_config = AdapterConfig {
        listen: AdapterListener {
            port: listen_port,
            path: DEFAULT_TARGET_PATH.to_string(),
        },
        target: StdioTarget {
            name: server_name.to_string(),
            cmd: cmd.to_string(),
            args: deployment.args.clone(),
        },
    };

    Ok(TransportFragment {
        init_container: Some(init_container),
        volumes: vec![
            Volume {
                name: ADAPTER_VOLUME.to_string(),
                empty_dir: Some(EmptyDirVolumeSource {
                    medium: Some("Memory".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            },
            Volume {
                name: ADAPTER_CONFIG_VOLUME.to_string(),
                config_map: Some(ConfigMapVolumeSource {
                    name: adapter_config_map_name(server_name),
                    ..Default::default()
                }),
                ..Default::default()
            },
        ],
        mounts: vec![
            adapter_mount,
            VolumeMount {
                name: ADAPTER_CONFIG_VOLUME.to_string(),
                mount_path: ADAPTER_CONFIG_MOUNT_PATH.to_string(),
                read_only: Some(true),
                ..Default::default()
            },
        ],
        command: Some(vec![ADAPTER_BINARY.to_string()]),
        args: Some(vec![
            "-f".to_string(),
            format!("{ADAPTER_CONFIG_MOUNT_PATH}/{ADAPTER_CONFIG_KEY}"),
        ]),
        adapter_config: Some(adapter_config),
        ..Default::default()
    })
}

/// User volumes must not shadow the adapter's volumes or mount paths.
fn check_reserved(
    deployment: &McpServerDeployment,
) -> Result<(), TranslateError> {
    const NAMES: [&str; 2] = [ADAPTER_VOLUME, ADAPTER_CONFIG_VOLUME];
    const PATHS: [&str; 2] = [ADAPTER_MOUNT_PATH, ADAPTER_CONFIG_MOUNT_PATH];
    if let Some(v) = deployment
        .volumes
        .iter()
        .find(|v| NAMES.contains(&v.name.as_str()))
    {
        return Err(TranslateError::InvalidConfig(format!(
            "volume name '{}' is reserved for the stdio adapter",
            v.name
        )));
    }
    if let Some(m) = deployment.volume_mounts.iter().find(|m| {
        NAMES.contains(&m.name.as_str())
            || PATHS.contains(&m.mount_path.trim_end_matches('/'))
    }) {
        return Err(TranslateError::InvalidConfig(format!(
            "volume mount '{}' at '{}' collides with the stdio adapter",
            m.name, m.mount_path
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{HttpTransport, InitContainerConfig, StdioTransport};

    fn spec(transport: Option<TransportType>) -> McpServerSpec {
        McpServerSpec {
            deployment: McpServerDeployment {
                image: Some("mcp/everything:1.0".into()),
                cmd: Some("npx".into()),
                args: vec!["server-everything".into()],
                ..Default::default()
            },
            transport_type: transport,
            ..Default::default()
        }
    }

    #[test]
    fn missing_transport_type_uses_configured_default() {
        let d = TranslatorDefaults::default();
        let t = Transport::resolve(&spec(None), &d).unwrap();
        assert_eq!(t, Transport::Stdio);

        let http_default = TranslatorDefaults {
            transport: TransportType::Http,
            ..Default::default()
        };
        let t = Transport::resolve(&spec(None), &http_default).unwrap();
        assert_eq!(t.transport_type(), TransportType::Http);
    }

    #[test]
    fn http_port_falls_back_to_deployment_port_then_default() {
        let d = TranslatorDefaults::default();
        let mut s = spec(Some(TransportType::Http));
        assert_eq!(
            Transport::resolve(&s, &d).unwrap(),
            Transport::Http {
                port: 3000,
                path: "/mcp".into()
            }
        );

        s.deployment.port = Some(8000);
        assert!(matches!(
            Transport::resolve(&s, &d).unwrap(),
            Transport::Http { port: 8000, .. }
        ));

        s.http_transport = Some(HttpTransport {
            target_port: Some(9090),
            target_path: Some("/sse".into()),
        });
        assert_eq!(
            Transport::resolve(&s, &d).unwrap(),
            Transport::Http {
                port: 9090,
                path: "/sse".into()
            }
        );
    }

    #[test]
    fn http_without_any_port_is_invalid() {
        let d = TranslatorDefaults {
            port: 0,
            ..Default::default()
        };
        let err =
            Transport::resolve(&spec(Some(TransportType::Http)), &d).unwrap_err();
        assert!(matches!(err, TranslateError::InvalidConfig(_)));
    }

    #[test]
    fn http_port_out_of_range_or_relative_path_is_invalid() {
        let d = TranslatorDefaults::default();
        let mut s = spec(Some(TransportType::Http));
        s.http_transport = Some(HttpTransport {
            target_port: Some(70_000),
            target_path: None,
        });
        assert!(Transport::resolve(&s, &d).is_err());
        s.http_transport = Some(HttpTransport {
            target_port: Some(8080),
            target_path: Some("mcp".into()),
        });
        assert!(matches!(
            Transport::resolve(&s, &d),
            Err(TranslateError::InvalidConfig(_))
        ));
    }

    #[test]
    fn unsupported_transport_is_rejected() {
        let err = Transport::resolve(
            &spec(Some(TransportType::Unsupported)),
            &TranslatorDefaults::default(),
        )
        .unwrap_err();
        assert!(matches!(err, TranslateError::UnsupportedTransport(_)));
    }

    #[test]
    fn mismatched_payload_is_ignored() {
        let mut s = spec(Some(TransportType::Stdio));
        s.http_transport = Some(HttpTransport {
            target_port: Some(8080),
            target_path: None,
        });
        assert_eq!(
            Transport::resolve(&s, &TranslatorDefaults::default()).unwrap(),
            Transport::Stdio
        );
        let mut s = spec(Some(TransportType::Http));
        s.stdio_transport = Some(StdioTransport {});
        assert!(matches!(
            Transport::resolve(&s, &TranslatorDefaults::default()).unwrap(),
            Transport::Http { .. }
        ));
    }

    #[test]
    fn stdio_fragment_injects_adapter() {
        let mut s = spec(Some(TransportType::Stdio));
        s.deployment.init_container = Some(InitContainerConfig {
            image: Some("registry.local/agentgateway:0.9.0-musl".into()),
            image_pull_policy: Some("Always".into()),
        });
        let frag = build_fragment(
            &Transport::Stdio,
            "everything",
            &s.deployment,
            &TranslatorDefaults::default(),
        )
        .unwrap();
        assert!(frag.ports.is_empty());
        assert_eq!(frag.service_port, None);
        let init = frag.init_container.as_ref().unwrap();
        assert_eq!(
            init.image.as_deref(),
            Some("registry.local/agentgateway:0.9.0-musl")
        );
        assert_eq!(init.image_pull_policy.as_deref(), Some("Always"));
        assert_eq!(
            frag.command.as_deref(),
            Some(&[ADAPTER_BINARY.to_string()][..])
        );
        let adapter_vol = frag
            .volumes
            .iter()
            .find(|v| v.name == ADAPTER_VOLUME)
            .unwrap();
        assert_eq!(
            adapter_vol.empty_dir.as_ref().unwrap().medium.as_deref(),
            Some("Memory")
        );
        let cfg = frag.adapter_config.as_ref().unwrap();
        assert_eq!(cfg.target.cmd, "npx");
        assert_eq!(cfg.listen.port, 3000);
    }

    #[test]
    fn stdio_uses_default_adapter_image() {
        let s = spec(Some(TransportType::Stdio));
        let defaults = TranslatorDefaults::default();
        let frag =
            build_fragment(&Transport::Stdio, "x", &s.deployment, &defaults)
                .unwrap();
        assert_eq!(
            frag.init_container.unwrap().image,
            Some(defaults.adapter_image)
        );
    }

    #[test]
    fn stdio_rejects_commands_it_cannot_wrap() {
        let d = TranslatorDefaults::default();
        let mut s = spec(Some(TransportType::Stdio));
        s.deployment.cmd = Some("/adapter/agentgateway".into());
        assert!(matches!(
            build_fragment(&Transport::Stdio, "x", &s.deployment, &d),
            Err(TranslateError::UnsupportedTransport(_))
        ));
        s.deployment.cmd = None;
        assert!(matches!(
            build_fragment(&Transport::Stdio, "x", &s.deployment, &d),
            Err(TranslateError::InvalidConfig(_))
        ));
    }

    #[test]
    fn stdio_rejects_reserved_mounts() {
        let mut s = spec(Some(TransportType::Stdio));
        s.deployment.volume_mounts = vec![VolumeMount {
            name: "data".into(),
            mount_path: "/adapter/".into(),
            ..Default::default()
        }];
        assert!(matches!(
            build_fragment(
                &Transport::Stdio,
                "x",
                &s.deployment,
                &TranslatorDefaults::default()
            ),
            Err(TranslateError::InvalidConfig(_))
        ));
    }

    #[test]
    fn adapter_config_renders_stable_json() {
        let cfg = AdapterConfig {
            listen: AdapterListener {
                port: 3000,
                path: "/mcp".into(),
            },
            target: StdioTarget {
                name: "everything".into(),
                cmd: "npx".into(),
                args: vec![],
            },
        };
        let rendered = cfg.render().unwrap();
        let v: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(v["listen"]["port"], 3000);
        assert_eq!(v["target"]["cmd"], "npx");
        assert!(v["target"].get("args").is_none());
        assert_eq!(rendered, cfg.render().unwrap());
    }
}
