//! Reads of live cluster state feeding the status projection.

use std::collections::BTreeSet;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::api::Api;
use kube::Client;

use crate::crd::McpServerDeployment;
use crate::status::{MissingRef, RefKind, ReplicaCounts};

/// Secret and ConfigMap refs of `deployment` that do not exist in `ns`.
pub async fn missing_refs(
    client: &Client,
    ns: &str,
    deployment: &McpServerDeployment,
) -> Result<Vec<MissingRef>, kube::Error> {
    let secrets: Api<Secret> = Api::namespaced(client.clone(), ns);
    let config_maps: Api<ConfigMap> = Api::namespaced(client.clone(), ns);
    let mut missing = Vec::new();

    for name in ref_names(deployment.secret_refs.iter().map(|r| r.name.as_str())) {
        // metadata-only read avoids pulling secret payloads
        if secrets.get_metadata_opt(name).await?.is_none() {
            missing.push(MissingRef {
                kind: RefKind::Secret,
                name: name.to_string(),
            });
        }
    }
    for name in ref_names(deployment.config_map_refs.iter().map(|r| r.name.as_str())) {
        if config_maps.get_metadata_opt(name).await?.is_none() {
            missing.push(MissingRef {
                kind: RefKind::ConfigMap,
                name: name.to_string(),
            });
        }
    }
    Ok(missing)
}

fn ref_names<'a>(names: impl Iterator<Item = &'a str>) -> BTreeSet<&'a str> {
    names.filter(|n| !n.is_empty()).collect()
}

pub async fn replica_counts(
    client: &Client,
    ns: &str,
    name: &str,
) -> Result<Option<ReplicaCounts>, kube::Error> {
    let api: Api<Deployment> = Api::namespaced(client.clone(), ns);
    Ok(api.get_opt(name).await?.as_ref().and_then(replica_counts_of))
}

/// Counts from a Deployment whose controller has caught up with its spec.
pub fn replica_counts_of(deployment: &Deployment) -> Option<ReplicaCounts> {
    let status = deployment.status.as_ref()?;
    let generation = deployment.metadata.generation.unwrap_or(0);
    if status.observed_generation.unwrap_or(0) < generation {
        return None;
    }
    let desired = deployment
        .spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(1);
    Some(ReplicaCounts {
        desired,
        ready: status.ready_replicas.unwrap_or(0),
        available: status.available_replicas.unwrap_or(0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::{DeploymentSpec, DeploymentStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn deployment(generation: i64, observed: i64, replicas: i32, ready: i32) -> Deployment {
        Deployment {
            metadata: ObjectMeta {
                generation: Some(generation),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                replicas: Some(replicas),
                ..Default::default()
            }),
            status: Some(DeploymentStatus {
                observed_generation: Some(observed),
                ready_replicas: Some(ready),
                available_replicas: Some(ready),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn counts_read_from_caught_up_deployment() {
        let counts = replica_counts_of(&deployment(2, 2, 3, 1)).unwrap();
        assert_eq!(
            counts,
            ReplicaCounts {
                desired: 3,
                ready: 1,
                available: 1
            }
        );
    }

    #[test]
    fn lagging_rollout_is_not_observed() {
        assert_eq!(replica_counts_of(&deployment(3, 2, 1, 1)), None);
        assert_eq!(replica_counts_of(&Deployment::default()), None);
    }

    #[test]
    fn duplicate_and_empty_refs_are_skipped() {
        let names = ref_names(["a", "", "b", "a"].into_iter());
        assert_eq!(names.into_iter().collect::<Vec<_>>(), vec!["a", "b"]);
    }
}
