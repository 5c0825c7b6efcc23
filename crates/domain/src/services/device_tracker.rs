//! Device State Tracker (C6): per-device geofence membership diffing.

use crate::models::geofence::EventType;
use crate::spatial::Point;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// A device's membership snapshot, mirrored to the cache under
/// `device_state:{device}` (§4.6) by the caller after each transition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceMembership {
    pub current_members: HashSet<Uuid>,
    pub last_point: Option<Point>,
    pub last_seen: Option<DateTime<Utc>>,
}

/// One enter/exit diff entry, carried by the ingestion pipeline into the
/// Event Bus (C9) without the full `TransitionEvent` wrapper — the caller
/// adds `device_id`/`user_id`/`metadata`.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub event_type: EventType,
    pub geofence_id: Uuid,
}

/// Computes the enter/exit diff for a new observation and returns the
/// transitions alongside the updated membership (§4.6 steps 1-5).
///
/// Duplicate location updates with identical `(point, ts)` naturally
/// produce an empty diff, since `new_members` is recomputed from the same
/// point and is therefore unchanged from `membership.current_members`.
pub fn transition(membership: &DeviceMembership, new_members: HashSet<Uuid>, point: Point, ts: DateTime<Utc>) -> (Vec<Transition>, DeviceMembership) {
    let entered = new_members.difference(&membership.current_members);
    let exited = membership.current_members.difference(&new_members);

    let mut transitions: Vec<Transition> = entered
        .map(|id| Transition {
            event_type: EventType::Enter,
            geofence_id: *id,
        })
        .collect();
    transitions.extend(exited.map(|id| Transition {
        event_type: EventType::Exit,
        geofence_id: *id,
    }));

    let updated = DeviceMembership {
        current_members: new_members,
        last_point: Some(point),
        last_seen: Some(ts),
    };
    (transitions, updated)
}
