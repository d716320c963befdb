use crate::crd::{Condition, ConditionReason, ConditionStatus, ConditionType};
use crate::translator::TranslateError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectKind {
    ConfigMap,
    ServiceAccount,
    Deployment,
    Service,
}

impl ObjectKind {
    fn failure_reason(self) -> ConditionReason {
        match self {
            ObjectKind::ConfigMap => ConditionReason::ConfigMapFailed,
            ObjectKind::ServiceAccount | ObjectKind::Deployment => {
                ConditionReason::DeploymentFailed
            }
            ObjectKind::Service => ConditionReason::ServiceFailed,
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectKind::ConfigMap => write!(f, "ConfigMap"),
            ObjectKind::ServiceAccount => write!(f, "ServiceAccount"),
            ObjectKind::Deployment => write!(f, "Deployment"),
            ObjectKind::Service => write!(f, "Service"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApplyFailure {
    pub kind: ObjectKind,
    pub name: String,
    pub message: String,
}

/// Per-object results of the apply step, in the order objects were applied.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub applied: Vec<(ObjectKind, String)>,
    pub failures: Vec<ApplyFailure>,
}

impl ApplyReport {
    pub fn record<E: std::fmt::Display>(
        &mut self,
        kind: ObjectKind,
        name: &str,
        result: Result<(), E>,
    ) {
        match result {
            Ok(()) => self.applied.push((kind, name.to_string())),
            Err(e) => self.failures.push(ApplyFailure {
                kind,
                name: name.to_string(),
                message: e.to_string(),
            }),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefKind {
    Secret,
    ConfigMap,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MissingRef {
    pub kind: RefKind,
    pub name: String,
}

impl std::fmt::Display for MissingRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            RefKind::Secret => write!(f, "Secret/{}", self.name),
            RefKind::ConfigMap => write!(f, "ConfigMap/{}", self.name),
        }
    }
}

/// How far the reconciliation pass got.
#[derive(Clone, Debug, PartialEq)]
pub enum Stage {
    /// The translator returned an error; no objects exist.
    Rejected(TranslateError),
    /// Objects were generated but withheld because references are missing.
    Unresolved(Vec<MissingRef>),
    /// Objects were handed to the apply step.
    Applied(ApplyReport),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplicaCounts {
    pub desired: i32,
    pub ready: i32,
    pub available: i32,
}

/// Facts gathered by the driver for one pass.
#[derive(Clone, Debug, PartialEq)]
pub struct Observation {
    pub generation: Option<i64>,
    pub stage: Stage,
    /// Live Deployment counts; `None` when not observed
    pub replicas: Option<ReplicaCounts>,
    /// Report Available/NotAvailable once pods are ready
    pub check_availability: bool,
}

fn condition(
    type_: ConditionType,
    status: ConditionStatus,
    reason: ConditionReason,
    message: impl Into<String>,
    generation: Option<i64>,
) -> Condition {
    Condition {
        type_,
        status,
        reason,
        message: Some(message.into()),
        observed_generation: generation,
        last_transition_time: None,
    }
}

/// Derive the full condition set for `obs`.
///
/// Always returns exactly one condition per type, in `ConditionType::ALL`
/// order. Transition times are left for the reducer to stamp.
pub fn project(obs: &Observation) -> Vec<Condition> {
    use ConditionReason as R;
    use ConditionStatus::{False, True, Unknown};
    use ConditionType as T;
    let g = obs.generation;

    match &obs.stage {
        Stage::Rejected(err) if err.is_validation() => {
            let reason = err.reason();
            vec![
                condition(T::Accepted, False, reason, err.to_string(), g),
                condition(
                    T::ResolvedRefs,
                    Unknown,
                    reason,
                    "references not evaluated: spec not accepted",
                    g,
                ),
                condition(
                    T::Programmed,
                    False,
                    reason,
                    "nothing programmed: spec not accepted",
                    g,
                ),
                condition(T::Ready, False, reason, "spec not accepted", g),
            ]
        }
        Stage::Rejected(err) => withheld(err.reason(), err.to_string(), g),
        Stage::Unresolved(missing) => {
            let names: Vec<String> =
                missing.iter().map(|m| m.to_string()).collect();
            withheld(
                R::ImageNotFound,
                format!("unresolved references: {}", names.join(", ")),
                g,
            )
        }
        Stage::Applied(report) => {
            let accepted =
                condition(T::Accepted, True, R::Accepted, "spec accepted", g);
            let resolved = condition(
                T::ResolvedRefs,
                True,
                R::ResolvedRefs,
                "all references resolved",
                g,
            );
            let (programmed, ready) = match report.failures.first() {
                Some(first) => {
                    let msg = report
                        .failures
                        .iter()
                        .map(|f| format!("{} {}: {}", f.kind, f.name, f.message))
                        .collect::<Vec<_>>()
                        .join("; ");
                    (
                        condition(
                            T::Programmed,
                            False,
                            first.kind.failure_reason(),
                            msg,
                            g,
                        ),
                        condition(
                            T::Ready,
                            False,
                            R::PodsNotReady,
                            "workload not programmed",
                            g,
                        ),
                    )
                }
                None => (
                    condition(
                        T::Programmed,
                        True,
                        R::Programmed,
                        "all objects applied",
                        g,
                    ),
                    ready_condition(
                        obs.replicas.as_ref(),
                        obs.check_availability,
                        g,
                    ),
                ),
            };
            vec![accepted, resolved, programmed, ready]
        }
    }
}

/// Accepted spec whose objects were not applied because refs are missing.
fn withheld(
    reason: ConditionReason,
    message: String,
    g: Option<i64>,
) -> Vec<Condition> {
    use ConditionStatus::{False, True};
    use ConditionType as T;
    vec![
        condition(T::Accepted, True, ConditionReason::Accepted, "spec accepted", g),
        condition(T::ResolvedRefs, False, reason, message, g),
        condition(
            T::Programmed,
            False,
            ConditionReason::DeploymentFailed,
            "objects withheld until references resolve",
            g,
        ),
        condition(
            T::Ready,
            False,
            ConditionReason::PodsNotReady,
            "workload not programmed",
            g,
        ),
    ]
}

fn ready_condition(
    replicas: Option<&ReplicaCounts>,
    check_availability: bool,
    g: Option<i64>,
) -> Condition {
    use ConditionReason as R;
    use ConditionStatus::{False, True};
    let t = ConditionType::Ready;
    match replicas {
        None => condition(
            t,
            False,
            R::PodsNotReady,
            "deployment status not observed yet",
            g,
        ),
        Some(r) if r.ready < r.desired => condition(
            t,
            False,
            R::PodsNotReady,
            format!("{}/{} replicas ready", r.ready, r.desired),
            g,
        ),
        Some(r) if check_availability && r.available < r.desired => condition(
            t,
            False,
            R::NotAvailable,
            format!("{}/{} replicas available", r.available, r.desired),
            g,
        ),
        Some(r) if check_availability => condition(
            t,
            True,
            R::Available,
            format!("{}/{} replicas available", r.available, r.desired),
            g,
        ),
        Some(r) => condition(
            t,
            True,
            R::Ready,
            format!("{}/{} replicas ready", r.ready, r.desired),
            g,
        ),
    }
}
