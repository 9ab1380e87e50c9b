use std::f32::consts::PI;

use nalgebra::{Point2, Vector2};

/// Wraps `degrees` into `[0, 360)`.
#[inline]
pub fn wrap_degrees(degrees: f32) -> f32 {
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}

/// Wraps `radians` into `[-PI, PI)`.
#[inline]
pub fn wrap_pi(radians: f32) -> f32 {
    (radians + PI).rem_euclid(2.0 * PI) - PI
}

/// Shortest signed difference `to - from` in degrees, in `(-180, 180]`.
#[inline]
pub fn shortest_delta_degrees(from: f32, to: f32) -> f32 {
    let delta = (to - from).rem_euclid(360.0);
    if delta > 180.0 { delta - 360.0 } else { delta }
}

#[inline]
pub fn distance(a: &Point2<f32>, b: &Point2<f32>) -> f32 {
    (a - b).norm()
}

/// Unit vector pointing along `degrees`, measured from +x towards +y.
#[inline]
pub fn direction(degrees: f32) -> Vector2<f32> {
    let radians = degrees.to_radians();
    Vector2::new(radians.cos(), radians.sin())
}

/// Whether `point` lies inside or on the edge of the convex `polygon`.
///
/// The polygon can be wound either way but must be convex. Fewer than three
/// vertices never contain anything.
pub fn convex_contains(polygon: &[Point2<f32>], point: &Point2<f32>) -> bool {
    if polygon.len() < 3 {
        return false;
    }

    let mut sign = 0.0f32;
    for (a, b) in polygon.iter().zip(polygon.iter().cycle().skip(1)) {
        let edge = b - a;
        let to_point = point - a;
        let cross = edge.x * to_point.y - edge.y * to_point.x;
        if cross == 0.0 {
            continue;
        }
        if sign == 0.0 {
            sign = cross.signum();
        } else if cross.signum() != sign {
            return false;
        }
    }

    true
}

/// Centroid of `points`, or the origin when empty.
pub fn centroid(points: &[Point2<f32>]) -> Point2<f32> {
    if points.is_empty() {
        return Point2::origin();
    }
    let sum = points
        .iter()
        .fold(Vector2::zeros(), |acc, point| acc + point.coords);
    Point2::from(sum / points.len() as f32)
}
