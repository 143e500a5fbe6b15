//! Per-frame read-only view of the world.
//!
//! Rebuilt once at the start of every frame, before any agent runs. Agents
//! read it through shared references and never mutate it.

use glam::Vec3;

use crate::game::faction::{Diplomacy, Faction, FactionTable};
use crate::game::types::{Pose, ShipClass, ShipId};
use crate::host::HostWorld;

/// One ship as seen by the AI this frame
#[derive(Debug, Clone, PartialEq)]
pub struct Contact {
    pub id: ShipId,
    pub class: ShipClass,
    pub position: Vec3,
    pub velocity: Vec3,
    pub faction: Faction,
    /// Player-facing diplomacy of the contact's faction
    pub diplomacy: Diplomacy,
    pub is_player: bool,
    pub hull_fraction: f32,
    pub destroyed: bool,
}

/// Immutable frame view
#[derive(Debug, Clone)]
pub struct WorldSnapshot {
    pub time_ms: f64,
    pub player: Pose,
    pub player_id: Option<ShipId>,
    /// Sorted by id
    contacts: Vec<Contact>,
    /// Ships the host knows about but has not placed yet, sorted
    unplaced: Vec<ShipId>,
    diplomacy: [Diplomacy; Faction::COUNT],
}

impl WorldSnapshot {
    /// Snapshot with no contacts, used when no host is attached
    pub fn empty(time_ms: f64, factions: &FactionTable) -> Self {
        Self {
            time_ms,
            player: Pose::default(),
            player_id: None,
            contacts: Vec::new(),
            unplaced: Vec::new(),
            diplomacy: factions.diplomacy_array(),
        }
    }

    /// Snapshot from an explicit contact list, for replays and tests
    pub fn from_contacts(
        time_ms: f64,
        player: Pose,
        mut contacts: Vec<Contact>,
        factions: &FactionTable,
    ) -> Self {
        contacts.sort_by_key(|c| c.id);
        let player_id = contacts.iter().find(|c| c.is_player).map(|c| c.id);
        Self {
            time_ms,
            player,
            player_id,
            contacts,
            unplaced: Vec::new(),
            diplomacy: factions.diplomacy_array(),
        }
    }

    /// Read the host world. Ships without a position are left out.
    pub fn capture(host: &dyn HostWorld, factions: &FactionTable, time_ms: f64) -> Self {
        let diplomacy = factions.diplomacy_array();
        let mut player_id = None;
        let mut unplaced = Vec::new();

        let mut contacts: Vec<Contact> = host
            .ships()
            .into_iter()
            .filter_map(|ship| {
                let Some(position) = ship.position else {
                    unplaced.push(ship.id);
                    return None;
                };
                if ship.is_player {
                    player_id = Some(ship.id);
                }
                Some(Contact {
                    id: ship.id,
                    class: ship.class,
                    position,
                    velocity: ship.velocity,
                    faction: ship.faction,
                    diplomacy: diplomacy[ship.faction.index()],
                    is_player: ship.is_player,
                    hull_fraction: ship.hull_fraction(),
                    destroyed: ship.is_destroyed(),
                })
            })
            .collect();
        contacts.sort_by_key(|c| c.id);
        unplaced.sort();

        Self {
            time_ms,
            player: host.player_pose(),
            player_id,
            contacts,
            unplaced,
            diplomacy,
        }
    }

    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    pub fn contact(&self, id: ShipId) -> Option<&Contact> {
        self.contacts
            .binary_search_by_key(&id, |c| c.id)
            .ok()
            .map(|i| &self.contacts[i])
    }

    /// The host reports this ship without a position
    pub fn is_unplaced(&self, id: ShipId) -> bool {
        self.unplaced.binary_search(&id).is_ok()
    }

    #[cfg(test)]
    pub(crate) fn mark_unplaced(&mut self, id: ShipId) {
        self.unplaced.push(id);
        self.unplaced.sort();
    }

    pub fn diplomacy(&self, faction: Faction) -> Diplomacy {
        self.diplomacy[faction.index()]
    }

    /// Whether an agent of `observer` treats `contact` as hostile.
    ///
    /// The player is hostile to Enemy-tagged factions. Two NPC factions are
    /// hostile when exactly one of them is Enemy-tagged. Destroyed contacts,
    /// the Neutral faction and same-faction ships are never hostile.
    pub fn is_hostile(&self, observer: Faction, contact: &Contact) -> bool {
        if contact.destroyed || observer == Faction::Neutral {
            return false;
        }
        let observer_enemy = self.diplomacy(observer).is_enemy();
        if contact.is_player {
            return observer_enemy;
        }
        if contact.faction == observer || contact.faction == Faction::Neutral {
            return false;
        }
        observer_enemy != self.diplomacy(contact.faction).is_enemy()
    }

    /// Distance from the player, used for LOD classification
    pub fn distance_to_player(&self, position: Vec3) -> f32 {
        position.distance(self.player.position)
    }
}
