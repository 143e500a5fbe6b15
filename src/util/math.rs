//! Small vector helpers shared by steering code.

use glam::Vec3;

/// World up axis
pub const WORLD_UP: Vec3 = Vec3::Y;

/// Right vector for a heading, derived from world-up.
/// Falls back to +X when the heading is vertical or degenerate.
#[inline]
pub fn right_of(forward: Vec3) -> Vec3 {
    let right = forward.cross(WORLD_UP);
    if right.length_squared() < 1e-8 {
        Vec3::X
    } else {
        right.normalize()
    }
}

/// Unit heading, defaulting to +Z for a zero vector
#[inline]
pub fn heading_or_default(forward: Vec3) -> Vec3 {
    forward.try_normalize().unwrap_or(Vec3::Z)
}

/// Reynolds seek: desired velocity towards `target` minus current velocity
#[inline]
pub fn seek(position: Vec3, velocity: Vec3, target: Vec3, max_speed: f32) -> Vec3 {
    let desired = (target - position).normalize_or_zero() * max_speed;
    desired - velocity
}

/// Reynolds flee: desired velocity away from `threat` minus current velocity
#[inline]
pub fn flee(position: Vec3, velocity: Vec3, threat: Vec3, max_speed: f32) -> Vec3 {
    let desired = (position - threat).normalize_or_zero() * max_speed;
    desired - velocity
}

/// Steering that brings the ship to rest
#[inline]
pub fn brake(velocity: Vec3) -> Vec3 {
    -velocity
}

/// True when every component is finite
#[inline]
pub fn is_finite(v: Vec3) -> bool {
    v.x.is_finite() && v.y.is_finite() && v.z.is_finite()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_right_of_forward_z() {
        let right = right_of(Vec3::Z);
        assert!(right.abs_diff_eq(Vec3::new(-1.0, 0.0, 0.0), 1e-6));
    }

    #[test]
    fn test_right_of_vertical_falls_back() {
        assert_eq!(right_of(Vec3::Y), Vec3::X);
        assert_eq!(right_of(Vec3::ZERO), Vec3::X);
    }

    #[test]
    fn test_seek_from_rest_points_at_target() {
        let force = seek(Vec3::ZERO, Vec3::ZERO, Vec3::new(10.0, 0.0, 0.0), 2.0);
        assert!(force.abs_diff_eq(Vec3::new(2.0, 0.0, 0.0), 1e-6));
    }

    #[test]
    fn test_flee_points_away() {
        let force = flee(Vec3::ZERO, Vec3::ZERO, Vec3::new(0.0, 0.0, 5.0), 1.0);
        assert!(force.z < -0.99);
    }

    #[test]
    fn test_is_finite_rejects_nan() {
        assert!(is_finite(Vec3::ONE));
        assert!(!is_finite(Vec3::new(f32::NAN, 0.0, 0.0)));
    }
}
