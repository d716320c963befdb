use std::sync::Arc;

use chrono::Utc;
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::{Resource, ResourceExt};
use serde_json::json;
use tracing::{debug, info, instrument, trace, warn};

use super::events::{
    REASON_APPLIED, REASON_APPLY_FAILED, REASON_REJECTED, emit_event,
};
use super::{ControllerContext, ReconcileErr, apply, observe};
use crate::crd::{Condition, ConditionStatus, ConditionType, McpServer};
use crate::status::{
    Observation, Stage, is_stale_write, project, reduce, should_patch,
};

#[instrument(skip_all, fields(ns = %obj.namespace().unwrap_or_default(), name = %obj.name_any()))]
pub async fn reconcile(
    obj: Arc<McpServer>,
    ctx: Arc<ControllerContext>,
) -> Result<Action, ReconcileErr> {
    let ns = obj.namespace().ok_or_else(|| {
        ReconcileErr::Internal("MCPServer must be namespaced".into())
    })?;
    let name = obj.name_any();

    // Owned objects are garbage collected through their owner references.
    if obj.meta().deletion_timestamp.is_some() {
        return Ok(Action::await_change());
    }

    let generation = obj.meta().generation;
    let stage = match ctx.translator.assemble(&obj) {
        Err(e) => {
            info!(%ns, %name, error = %e, "translation rejected");
            Stage::Rejected(e)
        }
        Ok(workload) => {
            let missing =
                observe::missing_refs(&ctx.client, &ns, &obj.spec.deployment)
                    .await?;
            if !missing.is_empty() {
                info!(%ns, %name, missing = missing.len(), "withholding objects: unresolved references");
                Stage::Unresolved(missing)
            } else {
                let report =
                    apply::apply_workload(&ctx.client, &ns, &workload).await;
                if report.is_success() {
                    if let Err(e) =
                        apply::prune_stale(&ctx.client, &ns, &name, &workload)
                            .await
                    {
                        warn!(%ns, %name, error = %e, "pruning stale objects failed");
                    }
                }
                Stage::Applied(report)
            }
        }
    };

    let replicas = match &stage {
        Stage::Applied(report) if report.is_success() => {
            observe::replica_counts(&ctx.client, &ns, &name).await?
        }
        _ => None,
    };
    let rejected = matches!(&stage, Stage::Rejected(e) if e.is_validation());
    let observation = Observation {
        generation,
        stage,
        replicas,
        check_availability: ctx.cfg.check_availability,
    };
    let conditions = project(&observation);

    let patched = write_status(&ctx, &obj, &ns, &name, conditions, generation)
        .await?;
    if patched {
        announce(&ctx, &obj, &observation).await;
    }

    // A rejected spec only changes through an edit, which triggers a watch event.
    if rejected {
        Ok(Action::await_change())
    } else {
        Ok(Action::requeue(ctx.requeue()))
    }
}

/// Patch the status subresource; returns whether a patch was sent.
async fn write_status(
    ctx: &ControllerContext,
    obj: &McpServer,
    ns: &str,
    name: &str,
    conditions: Vec<Condition>,
    generation: Option<i64>,
) -> Result<bool, ReconcileErr> {
    let api: Api<McpServer> = Api::namespaced(ctx.client.clone(), ns);
    // The watch cache can lag; compare against the stored status.
    let latest = match api.get_status(name).await {
        Ok(latest) => latest,
        Err(e) => {
            debug!(%ns, %name, error = %e, "status read failed; using cached object");
            obj.clone()
        }
    };
    let current = latest.status.as_ref();
    if is_stale_write(current, generation) {
        debug!(%ns, %name, ?generation, "status already recorded for a newer generation; skipping");
        return Ok(false);
    }

    let next = reduce(current, conditions, generation, &Utc::now().to_rfc3339());
    if !should_patch(current, &next) {
        trace!(%ns, %name, "status unchanged; skipping patch");
        return Ok(false);
    }
    let status = json!({ "status": next });
    api.patch_status(name, &PatchParams::default(), &Patch::Merge(&status))
        .await?;
    trace!(%ns, %name, "status patched");
    Ok(true)
}

fn condition_is_true(conds: &[Condition], t: ConditionType) -> bool {
    conds
        .iter()
        .any(|c| c.type_ == t && c.status == ConditionStatus::True)
}

/// Publish an event describing the outcome that changed the status.
async fn announce(ctx: &ControllerContext, obj: &McpServer, obs: &Observation) {
    let obj_ref = obj.object_ref(&());
    let (type_, reason, note) = match &obs.stage {
        Stage::Rejected(e) => (EventType::Warning, REASON_REJECTED, e.to_string()),
        Stage::Unresolved(missing) => (
            EventType::Warning,
            REASON_REJECTED,
            format!(
                "unresolved references: {}",
                missing
                    .iter()
                    .map(|m| m.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        ),
        Stage::Applied(report) if !report.is_success() => (
            EventType::Warning,
            REASON_APPLY_FAILED,
            format!("{} object(s) failed to apply", report.failures.len()),
        ),
        Stage::Applied(report) => {
            let conds = project(obs);
            let ready = condition_is_true(&conds, ConditionType::Ready);
            (
                EventType::Normal,
                REASON_APPLIED,
                format!(
                    "applied {} object(s); ready={}",
                    report.applied.len(),
                    ready
                ),
            )
        }
    };
    emit_event(
        &ctx.event_recorder,
        &obj_ref,
        type_,
        reason,
        "Reconcile",
        Some(note),
    )
    .await;
}
