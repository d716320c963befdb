use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder};
use tracing::warn;

pub const REASON_APPLIED: &str = "Applied";
pub const REASON_APPLY_FAILED: &str = "ApplyFailed";
pub const REASON_REJECTED: &str = "Rejected";

/// Fire-and-forget: a failed event never fails the reconcile.
pub async fn emit_event(
    recorder: &Recorder,
    obj_ref: &ObjectReference,
    type_: EventType,
    reason: &str,
    action: &str,
    note: Option<String>,
) {
    let event = Event {
        type_,
        reason: reason.into(),
        note,
        action: action.into(),
        secondary: None,
    };
    if let Err(e) = recorder.publish(&event, obj_ref).await {
        warn!(reason, action, error = %e, "failed to publish event");
    }
}
