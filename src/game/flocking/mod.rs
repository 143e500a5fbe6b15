//! Flocks, formations and boid steering.

pub mod coordinator;
pub mod formation;
pub mod steering;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::game::constants::flocking as defaults;

pub use coordinator::{Flock, FlockingCoordinator};
pub use formation::{update_for_leader, CarrierGroupConfig, FormationDescriptor, FormationShape};
pub use steering::{steer, Kinematics, Neighbor, Obstacle};

/// Identity of a flock, unique for the lifetime of a coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FlockId(pub u64);

impl fmt::Display for FlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "flock#{}", self.0)
    }
}

/// Steering weights, radii and refresh policy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlockingConfig {
    pub separation_weight: f32,
    pub alignment_weight: f32,
    pub cohesion_weight: f32,
    pub formation_weight: f32,
    pub avoidance_weight: f32,

    pub separation_radius: f32,
    pub alignment_radius: f32,
    pub cohesion_radius: f32,
    /// Flockmates farther than this are ignored entirely
    pub neighbor_radius: f32,
    pub avoidance_margin: f32,

    /// Minimum time between coordinator updates
    pub refresh_interval_ms: f64,
    pub leader_move_threshold: f32,
    pub refresh_age_ms: f64,
}

impl Default for FlockingConfig {
    fn default() -> Self {
        Self {
            separation_weight: defaults::SEPARATION_WEIGHT,
            alignment_weight: defaults::ALIGNMENT_WEIGHT,
            cohesion_weight: defaults::COHESION_WEIGHT,
            formation_weight: defaults::FORMATION_WEIGHT,
            avoidance_weight: defaults::AVOIDANCE_WEIGHT,
            separation_radius: defaults::SEPARATION_RADIUS,
            alignment_radius: defaults::ALIGNMENT_RADIUS,
            cohesion_radius: defaults::COHESION_RADIUS,
            neighbor_radius: defaults::NEIGHBOR_RADIUS,
            avoidance_margin: defaults::AVOIDANCE_MARGIN,
            refresh_interval_ms: defaults::REFRESH_INTERVAL_MS,
            leader_move_threshold: defaults::LEADER_MOVE_THRESHOLD,
            refresh_age_ms: defaults::REFRESH_AGE_MS,
        }
    }
}
