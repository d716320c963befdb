//! Server-side apply of generated objects and cleanup of ones no longer
//! generated.

use std::fmt::Debug;

use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::core::v1::{ConfigMap, Service, ServiceAccount};
use kube::api::{Api, DeleteParams, Patch, PatchParams};
use kube::{Client, Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument};

use super::FIELD_MANAGER;
use crate::status::{ApplyReport, ObjectKind};
use crate::translator::GeneratedWorkload;
use crate::translator::assembler::{MANAGED_BY, SERVER_LABEL};
use crate::translator::transport::adapter_config_map_name;

async fn apply_one<K>(client: &Client, ns: &str, obj: &K) -> Result<(), kube::Error>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Serialize
        + DeserializeOwned
        + Clone
        + Debug,
{
    let api: Api<K> = Api::namespaced(client.clone(), ns);
    let pp = PatchParams::apply(FIELD_MANAGER).force();
    api.patch(&obj.name_any(), &pp, &Patch::Apply(obj)).await?;
    Ok(())
}

/// Apply every object in `workload`, continuing past failures so the report
/// covers all of them.
#[instrument(skip_all, fields(ns = %ns, name = %workload.deployment.name_any()))]
pub async fn apply_workload(
    client: &Client,
    ns: &str,
    workload: &GeneratedWorkload,
) -> ApplyReport {
    let mut report = ApplyReport::default();

    if let Some(cm) = &workload.config_map {
        let res = apply_one(client, ns, cm).await;
        report.record(ObjectKind::ConfigMap, &cm.name_any(), res);
    }
    if let Some(sa) = &workload.service_account {
        let res = apply_one(client, ns, sa).await;
        report.record(ObjectKind::ServiceAccount, &sa.name_any(), res);
    }
    let res = apply_one(client, ns, &workload.deployment).await;
    report.record(
        ObjectKind::Deployment,
        &workload.deployment.name_any(),
        res,
    );
    if let Some(svc) = &workload.service {
        let res = apply_one(client, ns, svc).await;
        report.record(ObjectKind::Service, &svc.name_any(), res);
    }

    debug!(
        applied = report.applied.len(),
        failed = report.failures.len(),
        "apply finished"
    );
    report
}

fn managed_by_server(meta_labels: &std::collections::BTreeMap<String, String>, server: &str) -> bool {
    meta_labels.get("app.kubernetes.io/managed-by").map(String::as_str) == Some(MANAGED_BY)
        && meta_labels.get(SERVER_LABEL).map(String::as_str) == Some(server)
}

async fn delete_if_managed<K>(
    client: &Client,
    ns: &str,
    name: &str,
    server: &str,
) -> Result<bool, kube::Error>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + DeserializeOwned
        + Clone
        + Debug,
{
    let api: Api<K> = Api::namespaced(client.clone(), ns);
    match api.get_opt(name).await? {
        Some(obj) if managed_by_server(obj.labels(), server) => {
            api.delete(name, &DeleteParams::background()).await?;
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// Delete optional objects a previous generation created but the current
/// one no longer generates, e.g. the Service after switching to stdio.
/// Objects without this server's labels are left alone.
pub async fn prune_stale(
    client: &Client,
    ns: &str,
    server: &str,
    workload: &GeneratedWorkload,
) -> Result<Vec<(ObjectKind, String)>, kube::Error> {
    let mut pruned = Vec::new();
    if workload.service.is_none()
        && delete_if_managed::<Service>(client, ns, server, server).await?
    {
        pruned.push((ObjectKind::Service, server.to_string()));
    }
    let adapter = adapter_config_map_name(server);
    if workload.config_map.is_none()
        && delete_if_managed::<ConfigMap>(client, ns, &adapter, server).await?
    {
        pruned.push((ObjectKind::ConfigMap, adapter));
    }
    if workload.service_account.is_none()
        && delete_if_managed::<ServiceAccount>(client, ns, server, server).await?
    {
        pruned.push((ObjectKind::ServiceAccount, server.to_string()));
    }
    for (kind, name) in &pruned {
        info!(%ns, %server, %kind, %name, "pruned object no longer generated");
    }
    Ok(pruned)
}
