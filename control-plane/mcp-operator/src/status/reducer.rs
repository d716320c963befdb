use crate::crd::{Condition, ConditionType, McpServerStatus};

/// Build the next status from a freshly projected condition set.
///
/// The previous conditions are replaced wholesale. A condition keeps its
/// previous `lastTransitionTime` only when its type and status are unchanged;
/// otherwise it is stamped with `now`.
pub fn reduce(
    current: Option<&McpServerStatus>,
    projected: Vec<Condition>,
    generation: Option<i64>,
    now: &str,
) -> McpServerStatus {
    let previous = current.map(|s| s.conditions.as_slice()).unwrap_or(&[]);
    let mut conditions = canonicalize(projected);
    for cond in &mut conditions {
        let carried = previous
            .iter()
            .find(|p| p.type_ == cond.type_ && p.status == cond.status)
            .and_then(|p| p.last_transition_time.clone());
        cond.last_transition_time = Some(carried.unwrap_or_else(|| now.to_string()));
    }
    McpServerStatus {
        conditions,
        observed_generation: generation,
    }
}

/// One condition per type, in `ConditionType::ALL` order. The last
/// occurrence of a type wins.
fn canonicalize(projected: Vec<Condition>) -> Vec<Condition> {
    let mut out: Vec<Condition> = Vec::with_capacity(ConditionType::ALL.len());
    for inc in projected {
        match out.iter().position(|c| c.type_ == inc.type_) {
            Some(idx) => out[idx] = inc,
            None => out.push(inc),
        }
    }
    out.sort_by_key(|c| c.type_);
    out
}

/// A status computed for `generation` must not overwrite one recorded for a
/// newer generation.
pub fn is_stale_write(
    current: Option<&McpServerStatus>,
    generation: Option<i64>,
) -> bool {
    match (current.and_then(|s| s.observed_generation), generation) {
        (Some(recorded), Some(generation)) => recorded > generation,
        (Some(_), None) => true,
        _ => false,
    }
}

/// Whether writing `next` would change anything.
pub fn should_patch(current: Option<&McpServerStatus>, next: &McpServerStatus) -> bool {
    current != Some(next)
}
