//! Formation slot patterns.
//!
//! Every pattern is a pure function of the leader pose. Slot 0 is always the
//! leader; the remaining slots keep a stable order so members can be bound to
//! a slot index once and keep it across refreshes.

use glam::Vec3;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::game::constants::flocking::STACK_JITTER;
use crate::game::types::Pose;
use crate::util::math::right_of;
use crate::util::rng::{horizontal_unit, seeded};

/// Largest wing count accepted by [`vee`]
pub const MAX_WINGS: usize = 8;
/// Largest member count for ring and file formations
pub const MAX_FILE_MEMBERS: usize = 16;

/// Parameters of a carrier battle group
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CarrierGroupConfig {
    /// Radius of the close escort ring
    pub screen_radius: f32,
    pub screen_count: usize,
    /// Distance ahead of the carrier for pickets
    pub picket_distance: f32,
    pub picket_count: usize,
    /// Lateral spacing between pickets
    pub picket_spacing: f32,
}

impl Default for CarrierGroupConfig {
    fn default() -> Self {
        Self {
            screen_radius: 2.0,
            screen_count: 4,
            picket_distance: 5.0,
            picket_count: 2,
            picket_spacing: 3.0,
        }
    }
}

/// Named arrangement and its spacing parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FormationShape {
    Vee { spacing: f32, wing_count: usize },
    Escort { radius: f32 },
    CarrierBattleGroup(CarrierGroupConfig),
    Line { spacing: f32 },
    Column { spacing: f32 },
    Scattered { radius: f32, seed: u64 },
}

impl FormationShape {
    pub fn name(&self) -> &'static str {
        match self {
            FormationShape::Vee { .. } => "vee",
            FormationShape::Escort { .. } => "escort",
            FormationShape::CarrierBattleGroup(_) => "carrier_battle_group",
            FormationShape::Line { .. } => "line",
            FormationShape::Column { .. } => "column",
            FormationShape::Scattered { .. } => "scattered",
        }
    }

    /// Smallest and largest member counts the shape lays out
    pub fn member_bounds(&self) -> (usize, usize) {
        match self {
            FormationShape::Vee { wing_count, .. } => (3, 1 + 2 * (*wing_count).clamp(1, MAX_WINGS)),
            FormationShape::Escort { .. } => (2, 9),
            FormationShape::CarrierBattleGroup(config) => {
                (3, 1 + config.screen_count + config.picket_count)
            }
            FormationShape::Line { .. } | FormationShape::Column { .. } => (2, MAX_FILE_MEMBERS),
            FormationShape::Scattered { .. } => (1, MAX_FILE_MEMBERS),
        }
    }

    /// Slot positions for `members` ships around `leader`.
    ///
    /// Below the minimum every member stacks on the leader slot with a tiny
    /// offset; above the maximum the slot list is truncated, so the extra
    /// members get no slot.
    pub fn slots(&self, leader: &Pose, members: usize) -> Vec<Vec3> {
        let (min, max) = self.member_bounds();
        if members < min {
            return stacked(leader, members);
        }
        let count = members.min(max);

        let mut slots = match *self {
            FormationShape::Vee { spacing, wing_count } => vee(leader, spacing, wing_count),
            FormationShape::Escort { radius } => escort(leader, radius, count),
            FormationShape::CarrierBattleGroup(config) => carrier_battle_group(leader, &config),
            FormationShape::Line { spacing } => line(leader, spacing, count),
            FormationShape::Column { spacing } => column(leader, spacing, count),
            FormationShape::Scattered { radius, seed } => scattered(leader, radius, count, seed),
        };
        slots.truncate(count);
        slots
    }
}

/// Everything on the leader slot, each member nudged along the right vector
fn stacked(leader: &Pose, members: usize) -> Vec<Vec3> {
    let right = right_of(leader.forward);
    (0..members)
        .map(|i| leader.position + right * (i as f32 * STACK_JITTER))
        .collect()
}

/// V behind the leader: slot 1 is first on the right, slot 2 first on the
/// left, and so on outwards.
pub fn vee(leader: &Pose, spacing: f32, wing_count: usize) -> Vec<Vec3> {
    let wings = wing_count.clamp(1, MAX_WINGS);
    let right = right_of(leader.forward);
    let mut slots = Vec::with_capacity(1 + 2 * wings);
    slots.push(leader.position);
    for i in 1..=wings {
        let back = leader.position - leader.forward * (i as f32 * spacing);
        let side = right * (i as f32 * spacing);
        slots.push(back + side);
        slots.push(back - side);
    }
    slots
}

/// Ring of escorts around the leader, the first one straight ahead
pub fn escort(leader: &Pose, radius: f32, count: usize) -> Vec<Vec3> {
    let right = right_of(leader.forward);
    let escorts = count.saturating_sub(1);
    let mut slots = Vec::with_capacity(count.max(1));
    slots.push(leader.position);
    for k in 0..escorts {
        let angle = std::f32::consts::TAU * k as f32 / escorts as f32;
        let offset = leader.forward * angle.cos() + right * angle.sin();
        slots.push(leader.position + offset * radius);
    }
    slots
}

/// Close screen ring around the carrier plus pickets spread ahead of it
pub fn carrier_battle_group(leader: &Pose, config: &CarrierGroupConfig) -> Vec<Vec3> {
    let mut slots = escort(leader, config.screen_radius, config.screen_count + 1);
    let right = right_of(leader.forward);
    let ahead = leader.position + leader.forward * config.picket_distance;
    let half = (config.picket_count as f32 - 1.0) / 2.0;
    for p in 0..config.picket_count {
        let lateral = (p as f32 - half) * config.picket_spacing;
        slots.push(ahead + right * lateral);
    }
    slots
}

/// Line abreast, alternating right and left of the leader
pub fn line(leader: &Pose, spacing: f32, count: usize) -> Vec<Vec3> {
    let right = right_of(leader.forward);
    let mut slots = Vec::with_capacity(count.max(1));
    slots.push(leader.position);
    for i in 1..count {
        let rank = ((i + 1) / 2) as f32;
        let side = if i % 2 == 1 { 1.0 } else { -1.0 };
        slots.push(leader.position + right * (side * rank * spacing));
    }
    slots
}

/// Single file behind the leader
pub fn column(leader: &Pose, spacing: f32, count: usize) -> Vec<Vec3> {
    (0..count.max(1))
        .map(|i| leader.position - leader.forward * (i as f32 * spacing))
        .collect()
}

/// Loose cloud around the leader. The seed fixes the layout.
pub fn scattered(leader: &Pose, radius: f32, count: usize, seed: u64) -> Vec<Vec3> {
    let mut rng = seeded(seed);
    let mut slots = Vec::with_capacity(count.max(1));
    slots.push(leader.position);
    for _ in 1..count {
        let dir = horizontal_unit(&mut rng);
        let distance = radius * rng.gen_range(0.3f32..1.0);
        let lift = rng.gen_range(-0.2f32..0.2) * radius;
        slots.push(leader.position + dir * distance + Vec3::Y * lift);
    }
    slots
}

/// Formation state attached to a flock
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormationDescriptor {
    pub shape: FormationShape,
    /// World positions, slot 0 is the leader
    pub slots: Vec<Vec3>,
    /// Leader pose the slots were computed from
    pub leader: Pose,
    pub member_count: usize,
    pub refreshed_ms: f64,
}

impl FormationDescriptor {
    pub fn new(shape: FormationShape, leader: Pose, member_count: usize, now_ms: f64) -> Self {
        Self {
            slots: shape.slots(&leader, member_count),
            shape,
            leader,
            member_count,
            refreshed_ms: now_ms,
        }
    }

    pub fn slot(&self, index: usize) -> Option<Vec3> {
        self.slots.get(index).copied()
    }
}

/// Recompute a descriptor for a moved leader, keeping shape and slot order
pub fn update_for_leader(descriptor: &FormationDescriptor, new_leader: Pose, now_ms: f64) -> FormationDescriptor {
    FormationDescriptor::new(descriptor.shape, new_leader, descriptor.member_count, now_ms)
}
