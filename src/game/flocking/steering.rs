//! Boid steering for flock members.
//!
//! Separation, alignment and cohesion over nearby flockmates, plus a pull
//! towards the member's formation slot and a push away from obstacles. The
//! result is a single force clamped to the member's max force.

use glam::Vec3;
use smallvec::SmallVec;

use super::FlockingConfig;
use crate::game::types::ShipId;
use crate::util::math::{is_finite, seek};

/// Steering inputs of the member being steered
#[derive(Debug, Clone, Copy)]
pub struct Kinematics {
    pub id: ShipId,
    pub position: Vec3,
    pub velocity: Vec3,
    pub max_speed: f32,
    pub max_force: f32,
}

/// A flockmate as seen by the steering member
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub id: ShipId,
    pub position: Vec3,
    pub velocity: Vec3,
}

/// Spherical keep-out region
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Obstacle {
    pub center: Vec3,
    pub radius: f32,
}

/// Slot pull slows down inside this distance
const ARRIVE_RADIUS: f32 = 1.0;

/// Combined flocking force for one member.
///
/// Neighbors are processed in id order, so the result does not depend on the
/// order the caller collected them in.
pub fn steer(
    me: &Kinematics,
    slot_target: Option<Vec3>,
    neighbors: &[Neighbor],
    obstacles: &[Obstacle],
    config: &FlockingConfig,
) -> Vec3 {
    let mut sorted: SmallVec<[Neighbor; 16]> = neighbors
        .iter()
        .filter(|n| n.id != me.id)
        .copied()
        .collect();
    sorted.sort_by_key(|n| n.id);

    let mut separation = Vec3::ZERO;
    let mut velocity_sum = Vec3::ZERO;
    let mut alignment_count = 0usize;
    let mut center_sum = Vec3::ZERO;
    let mut cohesion_count = 0usize;

    for n in &sorted {
        let offset = me.position - n.position;
        let dist = offset.length();
        if dist > config.neighbor_radius {
            continue;
        }
        // Summed, so every extra crowding neighbor adds to the push
        if dist < config.separation_radius && dist > 1e-4 {
            separation += offset / (dist * dist);
        }
        if dist < config.alignment_radius {
            velocity_sum += n.velocity;
            alignment_count += 1;
        }
        if dist < config.cohesion_radius {
            center_sum += n.position;
            cohesion_count += 1;
        }
    }

    let mut force = Vec3::ZERO;

    // A lone neighbor on the separation boundary pushes at max speed
    force += separation * config.separation_radius * me.max_speed * config.separation_weight;
    if alignment_count > 0 {
        let average = velocity_sum / alignment_count as f32;
        force += (average - me.velocity) * config.alignment_weight;
    }
    // Members holding a slot let the formation pull do the gathering
    if cohesion_count > 0 && slot_target.is_none() {
        let center = center_sum / cohesion_count as f32;
        force += seek(me.position, me.velocity, center, me.max_speed) * config.cohesion_weight;
    }
    if let Some(slot) = slot_target {
        force += arrive(me, slot) * config.formation_weight;
    }
    force += avoidance(me, obstacles, config.avoidance_margin) * config.avoidance_weight;

    if !is_finite(force) {
        return Vec3::ZERO;
    }
    force.clamp_length_max(me.max_force)
}

/// Seek that slows to a stop on the target
fn arrive(me: &Kinematics, target: Vec3) -> Vec3 {
    let offset = target - me.position;
    let dist = offset.length();
    if dist < 1e-4 {
        return -me.velocity;
    }
    let speed = me.max_speed * (dist / ARRIVE_RADIUS).min(1.0);
    offset / dist * speed - me.velocity
}

fn avoidance(me: &Kinematics, obstacles: &[Obstacle], margin: f32) -> Vec3 {
    let mut push = Vec3::ZERO;
    for obstacle in obstacles {
        let away = me.position - obstacle.center;
        let clearance = away.length() - obstacle.radius;
        if clearance >= margin {
            continue;
        }
        let strength = if margin > 0.0 {
            (1.0 - clearance / margin).max(0.0)
        } else {
            1.0
        };
        push += away.normalize_or_zero() * me.max_speed * strength;
    }
    push
}
