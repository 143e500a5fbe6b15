//! Distress calls between agents of one faction.

use glam::Vec3;

use crate::game::faction::Faction;
use crate::game::types::ShipId;

/// Broadcast by an agent that has just entered combat
#[derive(Debug, Clone, PartialEq)]
pub struct DistressCall {
    pub sender: ShipId,
    pub faction: Faction,
    pub position: Vec3,
    /// Who the sender is fighting
    pub target: ShipId,
    /// Sender's communication range
    pub range: f32,
    pub sent_ms: f64,
}

impl DistressCall {
    /// Whether a ship of `faction` at `position` can hear this call
    pub fn reaches(&self, id: ShipId, faction: Faction, position: Vec3) -> bool {
        id != self.sender && faction == self.faction && position.distance(self.position) <= self.range
    }
}
