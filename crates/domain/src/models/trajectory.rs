//! Trajectory domain model (C7): a contiguous sequence of device locations
//! bounded by a configurable time gap, with derived motion statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A segmented trajectory. Closure is implicit: a trajectory stays open for
/// extension while `end_time >= incoming_ts - GAP_THRESHOLD`; there is no
/// explicit state machine or active close-sweep (§4.7).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Trajectory {
    pub id: i64,
    pub trajectory_id: Uuid,
    pub device_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub point_count: i64,
    pub total_distance_m: f64,
    pub avg_speed_ms: f64,
    pub max_speed_ms: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Trajectory {
    /// Starts a fresh, unpersisted trajectory for `device_id` at `start`
    /// (§4.7 "If none, open a new one with `start_time = end_time = ts`").
    /// `id` is assigned by the store on insert; `0` here is a sentinel for
    /// "not yet persisted".
    pub fn new(device_id: Uuid, start: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            trajectory_id: Uuid::new_v4(),
            device_id,
            start_time: start,
            end_time: start,
            point_count: 0,
            total_distance_m: 0.0,
            avg_speed_ms: 0.0,
            max_speed_ms: 0.0,
            created_at: start,
            updated_at: start,
        }
    }

    pub fn is_open_for(&self, ts: DateTime<Utc>, gap_threshold: chrono::Duration) -> bool {
        self.end_time >= ts - gap_threshold
    }

    /// Updates aggregate statistics for one appended point (§4.7 "Aggregate
    /// update"). `distance_m` is the haversine distance from the previous
    /// point in this trajectory, or `None` if this is the trajectory's
    /// first point.
    pub fn apply_point(&mut self, ts: DateTime<Utc>, distance_m: Option<f64>, speed_ms: Option<f64>) {
        self.point_count += 1;
        self.end_time = ts;
        if let Some(d) = distance_m {
            self.total_distance_m += d;
        }
        let duration_s = (self.end_time - self.start_time).num_milliseconds() as f64 / 1000.0;
        self.avg_speed_ms = if duration_s > 0.0 { self.total_distance_m / duration_s } else { 0.0 };
        if let Some(speed) = speed_ms {
            self.max_speed_ms = self.max_speed_ms.max(speed);
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrajectoryResponse {
    pub trajectory_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub point_count: i64,
    pub total_distance_m: f64,
    pub avg_speed_ms: f64,
    pub max_speed_ms: f64,
}

impl From<Trajectory> for TrajectoryResponse {
    fn from(t: Trajectory) -> Self {
        Self {
            trajectory_id: t.trajectory_id,
            start_time: t.start_time,
            end_time: t.end_time,
            point_count: t.point_count,
            total_distance_m: t.total_distance_m,
            avg_speed_ms: t.avg_speed_ms,
            max_speed_ms: t.max_speed_ms,
        }
    }
}

/// `GET /devices/{id}/trajectory` query parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrajectoryQuery {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default = "default_trajectory_limit")]
    pub limit: i64,
}

fn default_trajectory_limit() -> i64 {
    50
}

/// `GET /devices/{id}/stats` query parameters and response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsQuery {
    #[serde(default = "default_stats_days")]
    pub days: i64,
}

fn default_stats_days() -> i64 {
    7
}

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStats {
    pub trajectory_count: i64,
    pub total_distance_m: f64,
    pub total_point_count: i64,
    pub avg_speed_ms: f64,
    pub max_speed_ms: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trajectory(start: DateTime<Utc>) -> Trajectory {
        Trajectory {
            id: 1,
            trajectory_id: Uuid::new_v4(),
            device_id: Uuid::new_v4(),
            start_time: start,
            end_time: start,
            point_count: 1,
            total_distance_m: 0.0,
            avg_speed_ms: 0.0,
            max_speed_ms: 0.0,
            created_at: start,
            updated_at: start,
        }
    }

    #[test]
    fn test_is_open_for_within_gap() {
        let start = Utc::now();
        let t = trajectory(start);
        assert!(t.is_open_for(start + chrono::Duration::minutes(30), chrono::Duration::hours(1)));
    }

    #[test]
    fn test_is_open_for_exceeds_gap() {
        let start = Utc::now();
        let t = trajectory(start);
        assert!(!t.is_open_for(start + chrono::Duration::hours(2), chrono::Duration::hours(1)));
    }

    #[test]
    fn test_apply_point_updates_aggregates() {
        let start = Utc::now();
        let mut t = trajectory(start);
        let next = start + chrono::Duration::seconds(100);
        t.apply_point(next, Some(1000.0), Some(15.0));
        assert_eq!(t.point_count, 2);
        assert_eq!(t.end_time, next);
        assert_eq!(t.total_distance_m, 1000.0);
        assert!((t.avg_speed_ms - 10.0).abs() < 1e-6);
        assert_eq!(t.max_speed_ms, 15.0);
    }

    #[test]
    fn test_apply_point_zero_duration_guards_division() {
        let start = Utc::now();
        let mut t = trajectory(start);
        t.apply_point(start, Some(0.0), None);
        assert_eq!(t.avg_speed_ms, 0.0);
    }
}
