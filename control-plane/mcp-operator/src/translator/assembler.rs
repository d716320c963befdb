use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, Container, EnvVar, PodSpec, PodTemplateSpec, Service,
    ServiceAccount, ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{
    LabelSelector, ObjectMeta, OwnerReference,
};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::{Resource, ResourceExt};

use super::error::TranslateError;
use super::overrides::{
    apply_container_overrides, apply_deployment_overrides,
    apply_pod_template_overrides,
};
use super::transport::{
    ADAPTER_CONFIG_KEY, PORT_NAME, Transport, TransportFragment,
    adapter_config_map_name, build_fragment,
};
use super::volumes::build_volumes;
use super::{GeneratedWorkload, TranslatorDefaults};
use crate::crd::{McpServer, McpServerDeployment, ServiceAccountConfig};

/// Name of the container running the MCP server (or its stdio adapter).
pub const PRIMARY_CONTAINER: &str = "mcp-server";
pub const MANAGED_BY: &str = "mcp-operator";
pub const SERVER_LABEL: &str = "kagent.dev/mcp-server";
pub const TRANSPORT_ANNOTATION: &str = "kagent.dev/mcp-transport";
pub const TARGET_PATH_ANNOTATION: &str = "kagent.dev/mcp-target-path";

pub fn selector_labels(name: &str) -> BTreeMap<String, String> {
    let mut lbls = BTreeMap::new();
    lbls.insert("app.kubernetes.io/name".to_string(), name.to_string());
    lbls.insert("app.kubernetes.io/instance".to_string(), name.to_string());
    lbls
}

pub fn common_labels(name: &str) -> BTreeMap<String, String> {
    let mut lbls = selector_labels(name);
    lbls.insert(
        "app.kubernetes.io/managed-by".to_string(),
        MANAGED_BY.to_string(),
    );
    lbls.insert(SERVER_LABEL.to_string(), name.to_string());
    lbls
}

struct Identity {
    name: String,
    namespace: Option<String>,
    owner_refs: Option<Vec<OwnerReference>>,
}

impl Identity {
    fn of(server: &McpServer) -> Result<Self, TranslateError> {
        let name = server
            .meta()
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| {
                TranslateError::InvalidConfig("MCPServer has no name".into())
            })?;
        Ok(Self {
            name,
            namespace: server.namespace(),
            owner_refs: server.controller_owner_ref(&()).map(|o| vec![o]),
        })
    }

    fn meta(
        &self,
        name: String,
        annotations: Option<BTreeMap<String, String>>,
    ) -> ObjectMeta {
        ObjectMeta {
            name: Some(name),
            namespace: self.namespace.clone(),
            labels: Some(common_labels(&self.name)),
            annotations,
            owner_references: self.owner_refs.clone(),
            ..Default::default()
        }
    }
}

/// Build the full workload for `server`. Pure: no I/O, no clock.
pub fn assemble(
    server: &McpServer,
    defaults: &TranslatorDefaults,
) -> Result<GeneratedWorkload, TranslateError> {
    let id = Identity::of(server)?;
    let spec = &server.spec;
    let deployment_spec = &spec.deployment;

    let transport = Transport::resolve(spec, defaults)?;
    let fragment = build_fragment(&transport, &id.name, deployment_spec, defaults)?;
    let image = resolve_image(deployment_spec, defaults)?;

    let annotations = transport_annotations(&transport, &fragment);
    let mut deployment =
        base_deployment(&id, deployment_spec, image, &fragment, &annotations);

    // Fixed order so deployment-level values are never shadowed.
    apply_pod_template_overrides(
        &mut deployment,
        deployment_spec.pod_template.as_ref(),
    )?;
    check_selector_labels(&deployment, &id.name)?;
    apply_container_overrides(
        &mut deployment,
        deployment_spec.container_template.as_ref(),
        PRIMARY_CONTAINER,
    )?;
    apply_deployment_overrides(
        &mut deployment,
        deployment_spec.deployment_template.as_ref(),
    )?;

    let service = fragment
        .service_port
        .map(|port| build_service(&id, port, &annotations));
    let config_map = match fragment.adapter_config.as_ref() {
        Some(cfg) => Some(build_adapter_config_map(&id, cfg.render()?)),
        None => None,
    };
    let service_account = deployment_spec
        .service_account
        .as_ref()
        .map(|sa| build_service_account(&id, sa));

    Ok(GeneratedWorkload {
        transport: transport.transport_type(),
        deployment,
        service,
        config_map,
        service_account,
    })
}

/// Pod label overrides must not break the Deployment selector.
fn check_selector_labels(
    deployment: &Deployment,
    name: &str,
) -> Result<(), TranslateError> {
    let labels = deployment
        .spec
        .as_ref()
        .and_then(|s| s.template.metadata.as_ref())
        .and_then(|m| m.labels.as_ref());
    for (k, v) in selector_labels(name) {
        if labels.and_then(|l| l.get(&k)) != Some(&v) {
            return Err(TranslateError::InvalidConfig(format!(
                "pod label '{k}' is reserved for the deployment selector"
            )));
        }
    }
    Ok(())
}

fn resolve_image(
    deployment: &McpServerDeployment,
    defaults: &TranslatorDefaults,
) -> Result<String, TranslateError> {
    deployment
        .image
        .clone()
        .filter(|i| !i.is_empty())
        .or_else(|| defaults.image.clone().filter(|i| !i.is_empty()))
        .ok_or_else(|| {
            TranslateError::ImageNotFound(
                "deployment.image is empty and no default image is configured"
                    .into(),
            )
        })
}

fn transport_annotations(
    transport: &Transport,
    fragment: &TransportFragment,
) -> BTreeMap<String, String> {
    let mut ann = BTreeMap::new();
    ann.insert(
        TRANSPORT_ANNOTATION.to_string(),
        transport.transport_type().to_string(),
    );
    if let Some(path) = fragment.target_path.as_ref() {
        ann.insert(TARGET_PATH_ANNOTATION.to_string(), path.clone());
    }
    ann
}

fn base_deployment(
    id: &Identity,
    spec: &McpServerDeployment,
    image: String,
    fragment: &TransportFragment,
    annotations: &BTreeMap<String, String>,
) -> Deployment {
    let mut volumes = build_volumes(spec);
    volumes.extend(fragment.volumes.clone(), fragment.mounts.clone());

    let env: Vec<EnvVar> = spec
        .env
        .iter()
        .map(|(k, v)| EnvVar {
            name: k.clone(),
            value: Some(v.clone()),
            ..Default::default()
        })
        .collect();

    let container = Container {
        name: PRIMARY_CONTAINER.to_string(),
        image: Some(image),
        command: fragment.command.clone(),
        args: fragment.args.clone(),
        env: Some(env).filter(|e| !e.is_empty()),
        ports: Some(fragment.ports.clone()).filter(|p| !p.is_empty()),
        volume_mounts: Some(volumes.mounts).filter(|m| !m.is_empty()),
        ..Default::default()
    };

    let pod_labels = common_labels(&id.name);
    Deployment {
        metadata: id.meta(id.name.clone(), Some(annotations.clone())),
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(selector_labels(&id.name)),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(pod_labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    init_containers: fragment
                        .init_container
                        .clone()
                        .map(|c| vec![c]),
                    containers: vec![container],
                    volumes: Some(volumes.volumes).filter(|v| !v.is_empty()),
                    service_account_name: spec
                        .service_account
                        .as_ref()
                        .map(|_| id.name.clone()),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn build_service(
    id: &Identity,
    port: i32,
    annotations: &BTreeMap<String, String>,
) -> Service {
    Service {
        metadata: id.meta(id.name.clone(), Some(annotations.clone())),
        spec: Some(ServiceSpec {
            selector: Some(selector_labels(&id.name)),
            ports: Some(vec![ServicePort {
                name: Some(PORT_NAME.to_string()),
                port,
                target_port: Some(IntOrString::Int(port)),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn build_adapter_config_map(id: &Identity, rendered: String) -> ConfigMap {
    let mut data = BTreeMap::new();
    data.insert(ADAPTER_CONFIG_KEY.to_string(), rendered);
    ConfigMap {
        metadata: id.meta(adapter_config_map_name(&id.name), None),
        data: Some(data),
        ..Default::default()
    }
}

fn build_service_account(
    id: &Identity,
    cfg: &ServiceAccountConfig,
) -> ServiceAccount {
    let mut meta = id.meta(
        id.name.clone(),
        Some(cfg.annotations.clone()).filter(|a| !a.is_empty()),
    );
    if let Some(labels) = meta.labels.as_mut() {
        for (k, v) in &cfg.labels {
            labels.entry(k.clone()).or_insert_with(|| v.clone());
        }
    }
    ServiceAccount {
        metadata: meta,
        ..Default::default()
    }
}
