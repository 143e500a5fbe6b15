//! Per-agent threat estimate.

use smallvec::SmallVec;

use crate::game::agent::SensedContact;
use crate::game::types::ShipId;

/// Hostile count at which the count term saturates
const COUNT_SATURATION: f32 = 4.0;

const PROXIMITY_WEIGHT: f32 = 0.5;
const COUNT_WEIGHT: f32 = 0.3;
const HULL_WEIGHT: f32 = 0.2;

/// Scalar threat level in [0, 1] plus the ids that produced it
#[derive(Debug, Clone, Default)]
pub struct ThreatAssessment {
    level: f32,
    threats: SmallVec<[ShipId; 8]>,
}

impl ThreatAssessment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recompute from the sensed hostile contacts (sorted nearest first)
    pub fn assess(&mut self, hostiles: &[SensedContact], own_hull: f32, sensor_range: f32) {
        self.threats = hostiles.iter().map(|c| c.id).collect();

        let Some(nearest) = hostiles.first() else {
            self.level = 0.0;
            return;
        };

        let proximity = if sensor_range > 0.0 {
            1.0 - (nearest.distance / sensor_range).clamp(0.0, 1.0)
        } else {
            1.0
        };
        let count = (hostiles.len() as f32 / COUNT_SATURATION).min(1.0);
        let enemy_hull = hostiles.iter().map(|c| c.hull_fraction).sum::<f32>() / hostiles.len() as f32;
        let relative_hull = (enemy_hull / own_hull.max(0.05)).min(2.0) / 2.0;

        self.level = (PROXIMITY_WEIGHT * proximity + COUNT_WEIGHT * count + HULL_WEIGHT * relative_hull)
            .clamp(0.0, 1.0);
    }

    pub fn current_level(&self) -> f32 {
        self.level
    }

    pub fn threats(&self) -> &[ShipId] {
        &self.threats
    }

    pub fn clear(&mut self) {
        self.level = 0.0;
        self.threats.clear();
    }
}
