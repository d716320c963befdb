use k8s_openapi::api::apps::v1::DeploymentStrategy;
use k8s_openapi::api::core::v1::{
    Affinity, Lifecycle, PodSecurityContext, Probe, ResourceRequirements,
    SecurityContext, Toleration, Volume, VolumeMount,
};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default port an MCP server listens on when the spec leaves it unset.
pub const DEFAULT_MCP_PORT: u16 = 3000;

#[derive(
    CustomResource,
    Deserialize,
    Serialize,
    Clone,
    Debug,
    Default,
    JsonSchema,
    PartialEq,
)]
#[kube(
    group = "kagent.dev",
    version = "v1alpha1",
    kind = "MCPServer",
    root = "McpServer",
    plural = "mcpservers",
    shortname = "mcps",
    shortname = "mcp",
    category = "kagent",
    namespaced,
    status = "McpServerStatus",
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type=='Ready')].status"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct McpServerSpec {
    /// Container deployment of the MCP server
    pub deployment: McpServerDeployment,
    /// Transport used to reach the server; the operator default applies when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "transport_type_schema")]
    pub transport_type: Option<TransportType>,
    /// Marker payload for the stdio transport
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdio_transport: Option<StdioTransport>,
    /// Payload for the streamable HTTP transport
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_transport: Option<HttpTransport>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransportType {
    Stdio,
    Http,
    /// Any value this operator does not understand; rejected at translation.
    #[serde(other)]
    Unsupported,
}

/// Only the transports users may choose; the catch-all stays out of the CRD.
fn transport_type_schema(
    _: &mut schemars::r#gen::SchemaGenerator,
) -> schemars::schema::Schema {
    schemars::schema::Schema::Object(schemars::schema::SchemaObject {
        instance_type: Some(schemars::schema::InstanceType::String.into()),
        enum_values: Some(vec!["stdio".into(), "http".into()]),
        ..Default::default()
    })
}

impl std::fmt::Display for TransportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportType::Stdio => write!(f, "stdio"),
            TransportType::Http => write!(f, "http"),
            TransportType::Unsupported => write!(f, "unsupported"),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
pub struct StdioTransport {}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpTransport {
    /// HTTP port that serves the MCP endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_port: Option<u32>,
    /// Path where MCP is served (e.g., "/mcp")
    #[serde(
        rename = "path",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub target_path: Option<String>,
}

/// Reference to a Secret or ConfigMap in the server's namespace.
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
pub struct ObjectRef {
    pub name: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct McpServerDeployment {
    /// Container image running the MCP server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Port the MCP server listens on (default 3000)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Command that starts the MCP server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmd: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    /// Secrets mounted read-only into the server container
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secret_refs: Vec<ObjectRef>,
    /// ConfigMaps mounted read-only into the server container
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub config_map_refs: Vec<ObjectRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<VolumeMount>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,
    /// Init container that copies the transport adapter binary (stdio only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_container: Option<InitContainerConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account: Option<ServiceAccountConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_template: Option<PodTemplateOverrides>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_template: Option<ContainerOverrides>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_template: Option<DeploymentOverrides>,
}

/// Pod-level overrides. Maps merge key-by-key, everything else replaces.
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodTemplateOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerations: Option<Vec<Toleration>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Affinity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_context: Option<PodSecurityContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_network: Option<bool>,
    /// ClusterFirstWithHostNet | ClusterFirst | Default | None
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_policy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_class_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_class_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,
}

/// Overrides applied to the primary MCP server container.
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_context: Option<SecurityContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifecycle: Option<Lifecycle>,
    /// Always | Never | IfNotPresent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liveness_probe: Option<Probe>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness_probe: Option<Probe>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startup_probe: Option<Probe>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination_message_path: Option<String>,
    /// File | FallbackToLogsOnError
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination_message_policy: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<DeploymentStrategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_ready_seconds: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_history_limit: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_deadline_seconds: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused: Option<bool>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InitContainerConfig {
    /// Full adapter image reference; overrides the operator default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
pub struct ServiceAccountConfig {
    /// Annotations for the generated ServiceAccount (e.g., IRSA role ARNs)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct McpServerStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: ConditionType,
    pub status: ConditionStatus,
    pub reason: ConditionReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

#[derive(
    Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq,
    PartialOrd, Ord, Hash,
)]
pub enum ConditionType {
    Accepted,
    ResolvedRefs,
    Programmed,
    Ready,
}

impl ConditionType {
    /// Every condition type, in the order they appear in status.
    pub const ALL: [ConditionType; 4] = [
        ConditionType::Accepted,
        ConditionType::ResolvedRefs,
        ConditionType::Programmed,
        ConditionType::Ready,
    ];
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq)]
pub enum ConditionReason {
    // Accepted
    Accepted,
    InvalidConfig,
    UnsupportedTransport,
    // ResolvedRefs
    ResolvedRefs,
    ImageNotFound,
    // Programmed
    Programmed,
    DeploymentFailed,
    ServiceFailed,
    ConfigMapFailed,
    // Ready
    Ready,
    PodsNotReady,
    Available,
    NotAvailable,
}

impl McpServerSpec {
    /// Transport type requested by the spec, falling back to `default`.
    pub fn transport_type_or(&self, default: TransportType) -> TransportType {
        self.transport_type.unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_camel_case_wire_shape() {
        let spec: McpServerSpec = serde_json::from_value(json!({
            "deployment": {
                "image": "ghcr.io/example/everything:latest",
                "port": 3000,
                "cmd": "npx",
                "args": ["-y", "@modelcontextprotocol/server-everything"],
                "env": {"B": "2", "A": "1"},
                "secretRefs": [{"name": "api-keys"}],
                "deploymentTemplate": {"replicas": 2}
            },
            "transportType": "http",
            "httpTransport": {"targetPort": 8080, "path": "/mcp"}
        }))
        .unwrap();
        assert_eq!(spec.transport_type, Some(TransportType::Http));
        let http = spec.http_transport.as_ref().unwrap();
        assert_eq!(http.target_port, Some(8080));
        assert_eq!(http.target_path.as_deref(), Some("/mcp"));
        assert_eq!(spec.deployment.secret_refs[0].name, "api-keys");
        assert_eq!(
            spec.deployment.env.keys().collect::<Vec<_>>(),
            vec!["A", "B"]
        );
        assert_eq!(
            spec.deployment
                .deployment_template
                .as_ref()
                .and_then(|d| d.replicas),
            Some(2)
        );
    }

    #[test]
    fn unknown_transport_type_deserializes_as_unsupported() {
        let spec: McpServerSpec = serde_json::from_value(json!({
            "deployment": {},
            "transportType": "websocket"
        }))
        .unwrap();
        assert_eq!(spec.transport_type, Some(TransportType::Unsupported));
    }

    #[test]
    fn crd_schema_lists_only_selectable_transports() {
        use kube::CustomResourceExt;

        let crd = serde_json::to_value(McpServer::crd()).unwrap();
        let transport = &crd["spec"]["versions"][0]["schema"]["openAPIV3Schema"]
            ["properties"]["spec"]["properties"]["transportType"];
        assert_eq!(transport["type"], "string");
        assert_eq!(transport["enum"], json!(["stdio", "http"]));
    }

    #[test]
    fn condition_serializes_with_kubernetes_field_names() {
        let c = Condition {
            type_: ConditionType::Ready,
            status: ConditionStatus::False,
            reason: ConditionReason::PodsNotReady,
            message: None,
            observed_generation: Some(3),
            last_transition_time: None,
        };
        let v = serde_json::to_value(&c).unwrap();
        assert_eq!(v["type"], "Ready");
        assert_eq!(v["status"], "False");
        assert_eq!(v["reason"], "PodsNotReady");
        assert_eq!(v["observedGeneration"], 3);
    }
}
