//! Status condition helpers following Kubernetes API conventions
//!
//! Condition lists on every status surface are fixed-capacity buffers: a
//! condition of an already-present type replaces that entry in place, and
//! once the list is full the oldest entry is evicted to admit a new type.

use crate::crd::{
    AddressType, Condition, GatewayAddress, ListenerStatus, ParentReference, RouteParentStatus,
    MAX_CONDITIONS,
};

use super::errors::NonCriticalError;

/// Condition types surfaced by the operator
pub const CONDITION_TYPE_ACCEPTED: &str = "Accepted";
pub const CONDITION_TYPE_PROGRAMMED: &str = "Programmed";
pub const CONDITION_TYPE_RESOLVED_REFS: &str = "ResolvedRefs";

/// Machine-readable reasons
pub const REASON_ACCEPTED: &str = "Accepted";
pub const REASON_PROGRAMMED: &str = "Programmed";
pub const REASON_PENDING: &str = "Pending";
pub const REASON_INVALID: &str = "Invalid";
pub const REASON_RESOLVED_REFS: &str = "ResolvedRefs";
pub const REASON_NOT_ALLOWED: &str = "NotAllowedByListeners";

/// Update or add a condition in the list
///
/// A condition of the same type is replaced in place; the transition time is
/// refreshed only when the status actually changed. A new type is appended,
/// evicting the oldest entry when the list is at capacity.
pub fn set_condition(conditions: &mut Vec<Condition>, new: Condition) {
    if let Some(existing) = conditions.iter_mut().find(|c| c.type_ == new.type_) {
        let transition = existing.status != new.status;
        let keep_time = existing.last_transition_time.clone();

        *existing = new;
        if !transition {
            existing.last_transition_time = keep_time;
        }
        return;
    }

    if conditions.len() >= MAX_CONDITIONS {
        conditions.remove(0);
    }
    conditions.push(new);
}

/// Find a condition by type
pub fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

/// Check if a condition is present and true
pub fn is_condition_true(conditions: &[Condition], type_: &str) -> bool {
    find_condition(conditions, type_)
        .map(Condition::is_true)
        .unwrap_or(false)
}

/// Accepted condition for a GatewayClass
pub fn class_accepted(accepted: bool, message: &str) -> Condition {
    let reason = if accepted { REASON_ACCEPTED } else { REASON_INVALID };
    Condition::new(CONDITION_TYPE_ACCEPTED, accepted, reason, message)
}

/// Accepted condition for a Gateway
pub fn gateway_accepted(accepted: bool, generation: Option<i64>, message: &str) -> Condition {
    let reason = if accepted { REASON_ACCEPTED } else { REASON_INVALID };
    let mut cond = Condition::new(CONDITION_TYPE_ACCEPTED, accepted, reason, message);
    cond.observed_generation = generation;
    cond
}

/// Programmed condition for a Gateway
///
/// True only when every listener rendered and a public address resolved.
pub fn gateway_programmed(programmed: bool, generation: Option<i64>, message: &str) -> Condition {
    let reason = if programmed { REASON_PROGRAMMED } else { REASON_PENDING };
    let mut cond = Condition::new(CONDITION_TYPE_PROGRAMMED, programmed, reason, message);
    cond.observed_generation = generation;
    cond
}

/// Status block for one Gateway listener
///
/// `resolved_reason` names why references did or did not resolve; callers
/// pass the non-critical reason when the listener's public address is
/// missing.
pub fn listener_status(
    name: &str,
    attached_routes: i32,
    accepted: bool,
    accepted_message: &str,
    resolved: bool,
    resolved_reason: &str,
    resolved_message: &str,
) -> ListenerStatus {
    let mut conditions = Vec::new();
    set_condition(
        &mut conditions,
        Condition::new(
            CONDITION_TYPE_ACCEPTED,
            accepted,
            if accepted { REASON_ACCEPTED } else { REASON_INVALID },
            accepted_message,
        ),
    );
    set_condition(
        &mut conditions,
        Condition::new(CONDITION_TYPE_RESOLVED_REFS, resolved, resolved_reason, resolved_message),
    );
    ListenerStatus {
        name: name.to_string(),
        attached_routes,
        conditions,
    }
}

/// Status address entry from a resolved public address
pub fn gateway_address(type_: AddressType, value: &str) -> GatewayAddress {
    GatewayAddress {
        type_,
        value: value.to_string(),
    }
}

/// Per-parent status block for a route
///
/// The Accepted condition reflects attachment; the ResolvedRefs condition
/// carries the route's last non-critical resolution error when one exists.
pub fn route_parent_status(
    parent_ref: &ParentReference,
    accepted: bool,
    error: Option<&NonCriticalError>,
) -> RouteParentStatus {
    let mut conditions = Vec::new();
    set_condition(
        &mut conditions,
        Condition::new(
            CONDITION_TYPE_ACCEPTED,
            accepted,
            if accepted { REASON_ACCEPTED } else { REASON_NOT_ALLOWED },
            if accepted {
                "route accepted by parent"
            } else {
                "no listener admits this route"
            },
        ),
    );
    match error {
        Some(err) => set_condition(
            &mut conditions,
            Condition::new(
                CONDITION_TYPE_RESOLVED_REFS,
                false,
                err.reason.as_str(),
                &err.to_string(),
            ),
        ),
        None => set_condition(
            &mut conditions,
            Condition::new(
                CONDITION_TYPE_RESOLVED_REFS,
                true,
                REASON_RESOLVED_REFS,
                "all backend references resolved",
            ),
        ),
    }
    RouteParentStatus {
        parent_ref: parent_ref.clone(),
        conditions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::errors::NonCriticalReason;

    #[test]
    fn set_condition_replaces_same_type_in_place() {
        let mut conditions = Vec::new();
        set_condition(
            &mut conditions,
            Condition::new(CONDITION_TYPE_ACCEPTED, false, REASON_INVALID, "bad"),
        );
        let old_time = conditions[0].last_transition_time.clone();

        set_condition(
            &mut conditions,
            Condition::new(CONDITION_TYPE_ACCEPTED, false, REASON_INVALID, "still bad"),
        );
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].message, "still bad");
        // same status, transition time preserved
        assert_eq!(conditions[0].last_transition_time, old_time);

        set_condition(
            &mut conditions,
            Condition::new(CONDITION_TYPE_ACCEPTED, true, REASON_ACCEPTED, "ok"),
        );
        assert_eq!(conditions.len(), 1);
        assert!(conditions[0].is_true());
    }

    #[test]
    fn set_condition_evicts_oldest_at_capacity() {
        let mut conditions = Vec::new();
        for i in 0..MAX_CONDITIONS {
            set_condition(
                &mut conditions,
                Condition::new(&format!("Type{i}"), true, "Reason", ""),
            );
        }
        assert_eq!(conditions.len(), MAX_CONDITIONS);

        set_condition(
            &mut conditions,
            Condition::new("Overflow", true, "Reason", ""),
        );
        assert_eq!(conditions.len(), MAX_CONDITIONS);
        assert!(find_condition(&conditions, "Type0").is_none());
        assert!(find_condition(&conditions, "Overflow").is_some());
    }

    #[test]
    fn route_parent_status_carries_resolution_error() {
        let parent = ParentReference {
            name: "gw".to_string(),
            ..Default::default()
        };
        let err = NonCriticalError::new(
            NonCriticalReason::BackendNotFound,
            "default/media-server".to_string(),
        );

        let status = route_parent_status(&parent, true, Some(&err));
        assert!(is_condition_true(&status.conditions, CONDITION_TYPE_ACCEPTED));
        let resolved = find_condition(&status.conditions, CONDITION_TYPE_RESOLVED_REFS)
            .expect("resolved refs condition");
        assert!(!resolved.is_true());
        assert_eq!(resolved.reason, "BackendNotFound");
    }

    #[test]
    fn route_parent_status_clean_when_no_error() {
        let parent = ParentReference {
            name: "gw".to_string(),
            ..Default::default()
        };
        let status = route_parent_status(&parent, true, None);
        assert!(is_condition_true(
            &status.conditions,
            CONDITION_TYPE_RESOLVED_REFS
        ));
    }

    #[test]
    fn listener_status_carries_both_conditions() {
        let status = listener_status(
            "udp",
            3,
            true,
            "listener rendered",
            true,
            REASON_RESOLVED_REFS,
            "all refs ok",
        );
        assert_eq!(status.attached_routes, 3);
        assert!(is_condition_true(&status.conditions, CONDITION_TYPE_ACCEPTED));
        assert!(is_condition_true(
            &status.conditions,
            CONDITION_TYPE_RESOLVED_REFS
        ));
    }

    #[test]
    fn listener_status_surfaces_the_unresolved_reason() {
        let status = listener_status(
            "udp",
            0,
            true,
            "listener rendered",
            false,
            NonCriticalReason::PublicListenerAddressNotFound.as_str(),
            "default/gw/udp",
        );
        let resolved = find_condition(&status.conditions, CONDITION_TYPE_RESOLVED_REFS)
            .expect("resolved refs condition");
        assert!(!resolved.is_true());
        assert_eq!(resolved.reason, "PublicListenerAddressNotFound");
    }
}
