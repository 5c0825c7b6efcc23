//! Trajectory Segmenter (C7): open-segment lookup and aggregate update.

use crate::models::Trajectory;
use crate::spatial::{haversine, Point};
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

/// Default gap threshold (§4.7): a trajectory is open for extension if its
/// `end_time >= ts - GAP_THRESHOLD`.
pub const GAP_THRESHOLD: Duration = Duration::hours(1);

/// Picks the open segment with the greatest `end_time` among candidates
/// already loaded by the caller (typically "trajectories for this device
/// with `end_time >= ts - GAP_THRESHOLD`", queried via the Store), or
/// starts a fresh one if none qualify.
pub fn open_or_new(device_id: Uuid, candidates: &[Trajectory], ts: DateTime<Utc>, gap_threshold: Duration) -> Trajectory {
    candidates
        .iter()
        .filter(|t| t.is_open_for(ts, gap_threshold))
        .max_by_key(|t| t.end_time)
        .cloned()
        .unwrap_or_else(|| Trajectory::new(device_id, ts))
}

/// Appends a point to `trajectory`'s running aggregates (§4.7 "Aggregate
/// update"). `prev_point` is the trajectory's last recorded location, if
/// any, used to accumulate distance.
pub fn append(trajectory: &mut Trajectory, prev_point: Option<Point>, point: Point, ts: DateTime<Utc>, speed_ms: Option<f64>) {
    let distance_m = prev_point.map(|prev| haversine(prev, point));
    trajectory.apply_point(ts, distance_m, speed_ms);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn traj(device_id: Uuid, start: DateTime<Utc>, end: DateTime<Utc>) -> Trajectory {
        let mut t = Trajectory::new(device_id, start);
        t.end_time = end;
        t
    }

    #[test]
    fn test_open_or_new_picks_most_recent_within_gap() {
        let device_id = Uuid::new_v4();
        let now = Utc::now();
        let old = traj(device_id, now - Duration::minutes(50), now - Duration::minutes(40));
        let recent = traj(device_id, now - Duration::minutes(10), now - Duration::minutes(2));
        let picked = open_or_new(device_id, &[old.clone(), recent.clone()], now, GAP_THRESHOLD);
        assert_eq!(picked.trajectory_id, recent.trajectory_id);
    }

    #[test]
    fn test_open_or_new_starts_fresh_when_gap_exceeded() {
        let device_id = Uuid::new_v4();
        let now = Utc::now();
        let stale = traj(device_id, now - Duration::hours(3), now - Duration::hours(2));
        let picked = open_or_new(device_id, &[stale], now, GAP_THRESHOLD);
        assert_eq!(picked.point_count, 0);
        assert_eq!(picked.start_time, now);
    }

    #[test]
    fn test_append_accumulates_distance_and_speed() {
        let device_id = Uuid::new_v4();
        let now = Utc::now();
        let mut t = Trajectory::new(device_id, now);
        let p1 = Point::new(0.0, 0.0).unwrap();
        let p2 = Point::new(0.0, 0.01).unwrap();
        append(&mut t, None, p1, now, Some(1.0));
        append(&mut t, Some(p1), p2, now + Duration::seconds(10), Some(2.0));
        assert_eq!(t.point_count, 2);
        assert!(t.total_distance_m > 0.0);
        assert_eq!(t.max_speed_ms, 2.0);
    }
}
