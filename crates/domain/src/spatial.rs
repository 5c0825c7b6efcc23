//! Spatial primitives (C1): point/polygon containment, haversine distance,
//! circle-to-polygon approximation, polyline buffering and geodesic offset.
//!
//! All inputs are WGS84 decimal degrees, `lat ∈ [-90, 90]`, `lon ∈ [-180,
//! 180]`. Violations return [`SpatialError::InvalidCoordinate`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Mean Earth radius in meters, matching the value the spec pins for
/// haversine distance.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[derive(Debug, Error, PartialEq)]
pub enum SpatialError {
    #[error("invalid coordinate: lat={lat}, lon={lon}")]
    InvalidCoordinate { lat: f64, lon: f64 },
    #[error("degenerate shape: fewer than 3 distinct vertices or zero area")]
    DegenerateShape,
}

/// A WGS84 point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub lat: f64,
    pub lon: f64,
}

impl Point {
    pub fn new(lat: f64, lon: f64) -> Result<Self, SpatialError> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(SpatialError::InvalidCoordinate { lat, lon });
        }
        Ok(Self { lat, lon })
    }
}

/// A simple (non-self-intersecting) polygon in WGS84, closed: `vertices[0]
/// == vertices[last]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub vertices: Vec<Point>,
}

impl Polygon {
    /// Builds and validates a polygon from an open or closed ring. Closes
    /// the ring if the caller omitted the repeated first vertex.
    pub fn new(mut vertices: Vec<Point>) -> Result<Self, SpatialError> {
        if vertices.len() >= 2 {
            let first = vertices[0];
            let last = *vertices.last().unwrap();
            if (first.lat - last.lat).abs() > f64::EPSILON || (first.lon - last.lon).abs() > f64::EPSILON {
                vertices.push(first);
            }
        }
        // A closed simple polygon needs at least 3 distinct vertices plus the closing one.
        if vertices.len() < 4 {
            return Err(SpatialError::DegenerateShape);
        }
        let polygon = Self { vertices };
        if polygon.signed_area().abs() <= f64::EPSILON {
            return Err(SpatialError::DegenerateShape);
        }
        Ok(polygon)
    }

    /// Shoelace-formula signed area in degree² (sign only used for
    /// degeneracy detection, not an actual area in meters).
    fn signed_area(&self) -> f64 {
        let mut area = 0.0;
        for w in self.vertices.windows(2) {
            area += w[0].lon * w[1].lat - w[1].lon * w[0].lat;
        }
        area / 2.0
    }

    pub fn bbox(&self) -> BoundingBox {
        let mut min_lat = f64::MAX;
        let mut max_lat = f64::MIN;
        let mut min_lon = f64::MAX;
        let mut max_lon = f64::MIN;
        for p in &self.vertices {
            min_lat = min_lat.min(p.lat);
            max_lat = max_lat.max(p.lat);
            min_lon = min_lon.min(p.lon);
            max_lon = max_lon.max(p.lon);
        }
        BoundingBox { min_lat, max_lat, min_lon, max_lon }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn contains(&self, p: Point) -> bool {
        p.lat >= self.min_lat && p.lat <= self.max_lat && p.lon >= self.min_lon && p.lon <= self.max_lon
    }
}

/// Ray-casting point-in-polygon test. Boundary points are treated as
/// *inside*: this is the documented tie-break (§4.1, §9) that makes
/// enter/exit transitions deterministic for points exactly on an edge.
pub fn contains(polygon: &Polygon, point: Point) -> bool {
    if on_boundary(polygon, point) {
        return true;
    }
    let verts = &polygon.vertices;
    let mut inside = false;
    let mut j = verts.len() - 1;
    for i in 0..verts.len() {
        let vi = verts[i];
        let vj = verts[j];
        let intersects = (vi.lat > point.lat) != (vj.lat > point.lat)
            && point.lon
                < (vj.lon - vi.lon) * (point.lat - vi.lat) / (vj.lat - vi.lat) + vi.lon;
        if intersects {
            inside = !inside;
        }
        j = i;
    }
    inside
}

fn on_boundary(polygon: &Polygon, point: Point) -> bool {
    let verts = &polygon.vertices;
    for w in verts.windows(2) {
        if point_on_segment(w[0], w[1], point) {
            return true;
        }
    }
    false
}

fn point_on_segment(a: Point, b: Point, p: Point) -> bool {
    let cross = (b.lon - a.lon) * (p.lat - a.lat) - (b.lat - a.lat) * (p.lon - a.lon);
    if cross.abs() > 1e-9 {
        return false;
    }
    let within_lat = p.lat >= a.lat.min(b.lat) - 1e-9 && p.lat <= a.lat.max(b.lat) + 1e-9;
    let within_lon = p.lon >= a.lon.min(b.lon) - 1e-9 && p.lon <= a.lon.max(b.lon) + 1e-9;
    within_lat && within_lon
}

/// Great-circle distance in meters.
pub fn haversine(a: Point, b: Point) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

/// Approximates a circle as an `n`-vertex polygon, equal-angle sampled.
/// `radius_m` is converted to degrees at the center latitude, scaling the
/// longitude component by `cos(lat)` to correct for meridian convergence.
pub fn circle_to_polygon(center: Point, radius_m: f64, n: usize) -> Result<Polygon, SpatialError> {
    if radius_m <= 0.0 || n < 3 {
        return Err(SpatialError::DegenerateShape);
    }
    let lat_rad = center.lat.to_radians();
    let meters_per_deg_lat = (EARTH_RADIUS_M * std::f64::consts::PI) / 180.0;
    let meters_per_deg_lon = meters_per_deg_lat * lat_rad.cos();

    let mut vertices = Vec::with_capacity(n + 1);
    for i in 0..n {
        let theta = 2.0 * std::f64::consts::PI * (i as f64) / (n as f64);
        let dlat = (radius_m * theta.cos()) / meters_per_deg_lat;
        let dlon = (radius_m * theta.sin()) / meters_per_deg_lon;
        vertices.push(Point::new(center.lat + dlat, center.lon + dlon)?);
    }
    Polygon::new(vertices)
}

/// Offsets a point by `distance_m` along `bearing_deg` (0 = north, clockwise)
/// using the spherical direct formula.
pub fn offset(point: Point, bearing_deg: f64, distance_m: f64) -> Result<Point, SpatialError> {
    let bearing = bearing_deg.to_radians();
    let angular_distance = distance_m / EARTH_RADIUS_M;
    let lat1 = point.lat.to_radians();
    let lon1 = point.lon.to_radians();

    let lat2 = (lat1.sin() * angular_distance.cos()
        + lat1.cos() * angular_distance.sin() * bearing.cos())
    .asin();
    let lon2 = lon1
        + (bearing.sin() * angular_distance.sin() * lat1.cos())
            .atan2(angular_distance.cos() - lat1.sin() * lat2.sin());

    Point::new(lat2.to_degrees(), lon2.to_degrees())
}

/// Buffers a polyline by `width_m`, producing the polygon that bounds every
/// point within `width_m` of the line — used by the route-recommendation
/// collaborator (out of core scope) when it needs a corridor polygon.
pub fn buffer(polyline: &[Point], width_m: f64) -> Result<Polygon, SpatialError> {
    if polyline.len() < 2 || width_m <= 0.0 {
        return Err(SpatialError::DegenerateShape);
    }
    let mut left = Vec::with_capacity(polyline.len());
    let mut right = Vec::with_capacity(polyline.len());
    for w in polyline.windows(2) {
        let bearing = initial_bearing(w[0], w[1]);
        left.push(offset(w[0], bearing - 90.0, width_m)?);
        right.push(offset(w[0], bearing + 90.0, width_m)?);
    }
    let last = *polyline.last().unwrap();
    let prev = polyline[polyline.len() - 2];
    let bearing = initial_bearing(prev, last);
    left.push(offset(last, bearing - 90.0, width_m)?);
    right.push(offset(last, bearing + 90.0, width_m)?);

    right.reverse();
    left.extend(right);
    Polygon::new(left)
}

fn initial_bearing(a: Point, b: Point) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlon = (b.lon - a.lon).to_radians();
    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
    (y.atan2(x).to_degrees() + 360.0) % 360.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(lat: f64, lon: f64) -> Point {
        Point::new(lat, lon).unwrap()
    }

    fn square() -> Polygon {
        Polygon::new(vec![
            p(52.5, 13.3),
            p(52.55, 13.3),
            p(52.55, 13.45),
            p(52.5, 13.45),
        ])
        .unwrap()
    }

    #[test]
    fn test_invalid_coordinate_rejected() {
        assert!(Point::new(91.0, 0.0).is_err());
        assert!(Point::new(0.0, 181.0).is_err());
    }

    #[test]
    fn test_contains_interior_point() {
        assert!(contains(&square(), p(52.525, 13.375)));
    }

    #[test]
    fn test_contains_exterior_point() {
        assert!(!contains(&square(), p(52.6, 13.5)));
    }

    #[test]
    fn test_contains_boundary_point_is_inside() {
        // exactly on the western edge
        assert!(contains(&square(), p(52.52, 13.3)));
    }

    #[test]
    fn test_haversine_known_distance() {
        // Berlin enter/exit scenario from the spec: ~12340m between the two points.
        let a = p(52.525, 13.375);
        let b = p(52.600, 13.500);
        let d = haversine(a, b);
        assert!((d - 12_340.0).abs() / 12_340.0 < 0.02, "got {d}");
    }

    #[test]
    fn test_haversine_zero_for_same_point() {
        assert_eq!(haversine(p(1.0, 1.0), p(1.0, 1.0)), 0.0);
    }

    #[test]
    fn test_circle_to_polygon_contains_center() {
        let poly = circle_to_polygon(p(52.5, 13.4), 500.0, 32).unwrap();
        assert!(contains(&poly, p(52.5, 13.4)));
    }

    #[test]
    fn test_circle_to_polygon_vertex_at_expected_radius() {
        let center = p(0.0, 0.0);
        let poly = circle_to_polygon(center, 1000.0, 4).unwrap();
        // first vertex is due east at theta=0
        let d = haversine(center, poly.vertices[0]);
        assert!((d - 1000.0).abs() < 5.0, "got {d}");
    }

    #[test]
    fn test_circle_to_polygon_rejects_non_positive_radius() {
        assert!(circle_to_polygon(p(0.0, 0.0), 0.0, 32).is_err());
    }

    #[test]
    fn test_degenerate_polygon_rejected() {
        assert!(Polygon::new(vec![p(0.0, 0.0), p(1.0, 1.0)]).is_err());
    }

    #[test]
    fn test_offset_north_increases_latitude() {
        let start = p(0.0, 0.0);
        let moved = offset(start, 0.0, 1000.0).unwrap();
        assert!(moved.lat > start.lat);
        assert!((moved.lon - start.lon).abs() < 1e-6);
    }

    #[test]
    fn test_buffer_requires_at_least_two_points() {
        assert!(buffer(&[p(0.0, 0.0)], 10.0).is_err());
    }

    #[test]
    fn test_buffer_produces_polygon_around_points() {
        let line = vec![p(0.0, 0.0), p(0.0, 0.01)];
        let poly = buffer(&line, 500.0).unwrap();
        assert!(poly.vertices.len() >= 4);
    }
}
