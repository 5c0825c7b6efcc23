//! Transition events (C9) and webhook delivery-attempt records (C10).

use crate::models::geofence::EventType;
use crate::spatial::Point;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Channel names the Event Bus fans a transition onto (§4.9).
pub const CHANNEL_GLOBAL: &str = "geofence_events";

/// Channel a geofence create/update/delete is published on (§4.5): every
/// replica's Geofence Index subscribes and invalidates the named user's
/// entry so the next lookup rebuilds from the store.
pub const GEOFENCE_MUTATION_CHANNEL: &str = "geofence_mutations";

pub fn device_channel(device_id: Uuid) -> String {
    format!("device:{device_id}:events")
}

pub fn geofence_channel(geofence_id: Uuid) -> String {
    format!("geofence:{geofence_id}:events")
}

/// A single enter/exit transition emitted by the Device State Tracker (C6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionEvent {
    pub event_type: EventType,
    pub device_id: Uuid,
    pub geofence_id: Uuid,
    pub user_id: Uuid,
    pub point: Point,
    pub ts: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Outcome of one webhook delivery attempt, recorded in a day-keyed,
/// 7-day-trimmed list per URL (§3 DeliveryAttempt, §6 cache key space).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryAttempt {
    pub success: bool,
    pub status_code: Option<u16>,
    pub latency_ms: u64,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_names() {
        let device_id = Uuid::new_v4();
        let geofence_id = Uuid::new_v4();
        assert_eq!(device_channel(device_id), format!("device:{device_id}:events"));
        assert_eq!(geofence_channel(geofence_id), format!("geofence:{geofence_id}:events"));
        assert_eq!(CHANNEL_GLOBAL, "geofence_events");
        assert_eq!(GEOFENCE_MUTATION_CHANNEL, "geofence_mutations");
    }

    #[test]
    fn test_transition_event_serializes_event_type_lowercase() {
        let event = TransitionEvent {
            event_type: EventType::Enter,
            device_id: Uuid::new_v4(),
            geofence_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            point: Point::new(1.0, 1.0).unwrap(),
            ts: Utc::now(),
            metadata: None,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"eventType\":\"enter\""));
    }
}
