//! Field-level merge of user overrides onto a generated Deployment.
//!
//! Map fields are union-merged with the override winning on key collisions.
//! Object fields and lists replace the base wholesale when present. Scalars
//! replace only when the override carries a non-empty value, so a partially
//! filled override never blanks out generated defaults.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{Container, PodSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use super::error::TranslateError;
use crate::crd::{ContainerOverrides, DeploymentOverrides, PodTemplateOverrides};

fn deployment_spec(deployment: &mut Deployment) -> &mut DeploymentSpec {
    deployment.spec.get_or_insert_with(DeploymentSpec::default)
}

fn merge_map(
    base: &mut Option<BTreeMap<String, String>>,
    overlay: Option<&BTreeMap<String, String>>,
) {
    if let Some(overlay) = overlay.filter(|m| !m.is_empty()) {
        let target = base.get_or_insert_with(BTreeMap::new);
        for (k, v) in overlay {
            target.insert(k.clone(), v.clone());
        }
    }
}

fn replace_some<T: Clone>(base: &mut Option<T>, overlay: Option<&T>) {
    if let Some(v) = overlay {
        *base = Some(v.clone());
    }
}

fn replace_non_empty(base: &mut Option<String>, overlay: Option<&String>) {
    if let Some(v) = overlay.filter(|s| !s.is_empty()) {
        *base = Some(v.clone());
    }
}

fn has_entries(m: &Option<BTreeMap<String, String>>) -> bool {
    m.as_ref().is_some_and(|m| !m.is_empty())
}

fn has_text(s: &Option<String>) -> bool {
    s.as_ref().is_some_and(|s| !s.is_empty())
}

fn touches_pod_metadata(o: &PodTemplateOverrides) -> bool {
    has_entries(&o.annotations) || has_entries(&o.labels)
}

fn touches_pod_spec(o: &PodTemplateOverrides) -> bool {
    has_entries(&o.node_selector)
        || o.tolerations.as_ref().is_some_and(|t| !t.is_empty())
        || o.affinity.is_some()
        || o.security_context.is_some()
        || o.host_network == Some(true)
        || has_text(&o.dns_policy)
        || has_text(&o.priority_class_name)
        || o.runtime_class_name.is_some()
        || has_text(&o.service_account_name)
}

fn touches_container(o: &ContainerOverrides) -> bool {
    o.resources.is_some()
        || o.security_context.is_some()
        || o.lifecycle.is_some()
        || has_text(&o.image_pull_policy)
        || o.liveness_probe.is_some()
        || o.readiness_probe.is_some()
        || o.startup_probe.is_some()
        || has_text(&o.termination_message_path)
        || has_text(&o.termination_message_policy)
}

fn touches_deployment(o: &DeploymentOverrides) -> bool {
    o.replicas.is_some()
        || o.strategy.is_some()
        || o.min_ready_seconds.is_some_and(|s| s != 0)
        || o.revision_history_limit.is_some()
        || o.progress_deadline_seconds.is_some()
        || o.paused == Some(true)
}

/// Apply pod-level overrides onto the Deployment's pod template.
///
/// Nothing is created on the base when every override field is unset.
pub fn apply_pod_template_overrides(
    deployment: &mut Deployment,
    overrides: Option<&PodTemplateOverrides>,
) -> Result<(), TranslateError> {
    let Some(o) = overrides else {
        return Ok(());
    };
    let (meta_touched, spec_touched) = (touches_pod_metadata(o), touches_pod_spec(o));
    if !meta_touched && !spec_touched {
        return Ok(());
    }
    let template = &mut deployment_spec(deployment).template;

    if meta_touched {
        let meta = template.metadata.get_or_insert_with(ObjectMeta::default);
        merge_map(&mut meta.annotations, o.annotations.as_ref());
        merge_map(&mut meta.labels, o.labels.as_ref());
    }
    if !spec_touched {
        return Ok(());
    }

    let pod = template.spec.get_or_insert_with(PodSpec::default);
    merge_map(&mut pod.node_selector, o.node_selector.as_ref());
    if let Some(tolerations) = o.tolerations.as_ref().filter(|t| !t.is_empty())
    {
        pod.tolerations = Some(tolerations.clone());
    }
    replace_some(&mut pod.affinity, o.affinity.as_ref());
    replace_some(&mut pod.security_context, o.security_context.as_ref());
    if o.host_network == Some(true) {
        pod.host_network = Some(true);
    }
    replace_non_empty(&mut pod.dns_policy, o.dns_policy.as_ref());
    replace_non_empty(
        &mut pod.priority_class_name,
        o.priority_class_name.as_ref(),
    );
    replace_some(&mut pod.runtime_class_name, o.runtime_class_name.as_ref());
    replace_non_empty(
        &mut pod.service_account_name,
        o.service_account_name.as_ref(),
    );
    Ok(())
}

/// Apply container-level overrides onto the container named `container_name`.
///
/// Fails with `InvalidConfig` when some override field is set but the pod has
/// no container with that name.
pub fn apply_container_overrides(
    deployment: &mut Deployment,
    overrides: Option<&ContainerOverrides>,
    container_name: &str,
) -> Result<(), TranslateError> {
    let Some(o) = overrides.filter(|o| touches_container(o)) else {
        return Ok(());
    };
    let container = find_container(deployment, container_name).ok_or_else(|| {
        TranslateError::InvalidConfig(format!(
            "container overrides set but pod has no container named '{container_name}'"
        ))
    })?;

    replace_some(&mut container.resources, o.resources.as_ref());
    replace_some(&mut container.security_context, o.security_context.as_ref());
    replace_some(&mut container.lifecycle, o.lifecycle.as_ref());
    replace_non_empty(
        &mut container.image_pull_policy,
        o.image_pull_policy.as_ref(),
    );
    replace_some(&mut container.liveness_probe, o.liveness_probe.as_ref());
    replace_some(&mut container.readiness_probe, o.readiness_probe.as_ref());
    replace_some(&mut container.startup_probe, o.startup_probe.as_ref());
    replace_non_empty(
        &mut container.termination_message_path,
        o.termination_message_path.as_ref(),
    );
    replace_non_empty(
        &mut container.termination_message_policy,
        o.termination_message_policy.as_ref(),
    );
    Ok(())
}

fn find_container<'a>(
    deployment: &'a mut Deployment,
    name: &str,
) -> Option<&'a mut Container> {
    deployment
        .spec
        .as_mut()?
        .template
        .spec
        .as_mut()?
        .containers
        .iter_mut()
        .find(|c| c.name == name)
}

/// Apply deployment-level overrides (replicas, rollout strategy, ...).
pub fn apply_deployment_overrides(
    deployment: &mut Deployment,
    overrides: Option<&DeploymentOverrides>,
) -> Result<(), TranslateError> {
    let Some(o) = overrides.filter(|o| touches_deployment(o)) else {
        return Ok(());
    };
    let spec = deployment_spec(deployment);
    replace_some(&mut spec.replicas, o.replicas.as_ref());
    replace_some(&mut spec.strategy, o.strategy.as_ref());
    if let Some(secs) = o.min_ready_seconds.filter(|s| *s != 0) {
        spec.min_ready_seconds = Some(secs);
    }
    replace_some(
        &mut spec.revision_history_limit,
        o.revision_history_limit.as_ref(),
    );
    replace_some(
        &mut spec.progress_deadline_seconds,
        o.progress_deadline_seconds.as_ref(),
    );
    if o.paused == Some(true) {
        spec.paused = Some(true);
    }
    Ok(())
}
