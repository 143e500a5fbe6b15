//! In-process host world.
//!
//! `SimWorld` is a minimal [`HostWorld`] backed by a ship table. It is what
//! the headless simulator, the benches and the scenario tests drive the AI
//! tier with. Handles are cheap clones sharing one table, so a test can keep
//! a handle to poke at ships while the manager owns another.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use glam::Vec3;
use rand::Rng;

use crate::game::faction::Faction;
use crate::game::types::{GroupId, Pose, ShipClass, ShipId};
use crate::host::{AudioSink, HostWorld, MessagePriority, ShipSpawn, ShipState};
use crate::util::rng::{horizontal_unit, seeded};

/// Hull of spawned ships
const DEFAULT_HULL: f32 = 100.0;

#[derive(Debug, Default)]
struct SimState {
    ships: BTreeMap<ShipId, ShipState>,
    next_id: u64,
    player: Option<ShipId>,
    player_pose: Pose,
    kinematics_writes: u64,
    despawned: Vec<ShipId>,
}

impl SimState {
    fn allocate(&mut self) -> ShipId {
        self.next_id += 1;
        ShipId(self.next_id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SimWorld {
    state: Rc<RefCell<SimState>>,
}

impl SimWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the player ship; the player pose follows it
    pub fn add_player(&self, position: Vec3) -> ShipId {
        let mut state = self.state.borrow_mut();
        let id = state.allocate();
        state.ships.insert(
            id,
            ShipState {
                id,
                class: ShipClass::HeavyFighter,
                faction: Faction::Federation,
                hull: DEFAULT_HULL,
                max_hull: DEFAULT_HULL,
                position: Some(position),
                velocity: Vec3::ZERO,
                forward: Vec3::Z,
                is_player: true,
            },
        );
        state.player = Some(id);
        state.player_pose = Pose::new(position, Vec3::Z);
        id
    }

    pub fn add_ship(&self, class: ShipClass, faction: Faction, position: Vec3) -> ShipId {
        let spawn = ShipSpawn {
            class,
            faction,
            position,
            velocity: Vec3::ZERO,
            forward: Vec3::Z,
        };
        let mut state = self.state.borrow_mut();
        insert_spawn(&mut state, &spawn)
    }

    /// Scatter `count` ships of mixed classes and factions within `radius`
    /// of the origin
    pub fn populate(&self, count: usize, radius: f32, seed: u64) -> Vec<ShipId> {
        let mut rng = seeded(seed);
        (0..count)
            .map(|_| {
                let class = ShipClass::ALL[rng.gen_range(0..ShipClass::ALL.len())];
                let faction = Faction::ALL[rng.gen_range(0..Faction::ALL.len())];
                let position = horizontal_unit(&mut rng) * rng.gen_range(0.0..radius)
                    + Vec3::Y * rng.gen_range(-1.0f32..1.0);
                self.add_ship(class, faction, position)
            })
            .collect()
    }

    /// Move the player ship and pose
    pub fn move_player(&self, position: Vec3) {
        let mut state = self.state.borrow_mut();
        state.player_pose.position = position;
        if let Some(id) = state.player {
            if let Some(ship) = state.ships.get_mut(&id) {
                ship.position = Some(position);
            }
        }
    }

    pub fn set_hull(&self, id: ShipId, hull: f32) {
        if let Some(ship) = self.state.borrow_mut().ships.get_mut(&id) {
            ship.hull = hull;
        }
    }

    pub fn set_position(&self, id: ShipId, position: Option<Vec3>) {
        if let Some(ship) = self.state.borrow_mut().ships.get_mut(&id) {
            ship.position = position;
        }
    }

    pub fn set_faction(&self, id: ShipId, faction: Faction) {
        if let Some(ship) = self.state.borrow_mut().ships.get_mut(&id) {
            ship.faction = faction;
        }
    }

    pub fn ship_state(&self, id: ShipId) -> Option<ShipState> {
        self.state.borrow().ships.get(&id).cloned()
    }

    pub fn contains(&self, id: ShipId) -> bool {
        self.state.borrow().ships.contains_key(&id)
    }

    pub fn ship_count(&self) -> usize {
        self.state.borrow().ships.len()
    }

    pub fn player_id(&self) -> Option<ShipId> {
        self.state.borrow().player
    }

    pub fn kinematics_writes(&self) -> u64 {
        self.state.borrow().kinematics_writes
    }

    /// Ships removed through [`HostWorld::despawn_ship`], in order
    pub fn despawned(&self) -> Vec<ShipId> {
        self.state.borrow().despawned.clone()
    }
}

fn insert_spawn(state: &mut SimState, spawn: &ShipSpawn) -> ShipId {
    let id = state.allocate();
    state.ships.insert(
        id,
        ShipState {
            id,
            class: spawn.class,
            faction: spawn.faction,
            hull: DEFAULT_HULL,
            max_hull: DEFAULT_HULL,
            position: Some(spawn.position),
            velocity: spawn.velocity,
            forward: spawn.forward,
            is_player: false,
        },
    );
    id
}

impl HostWorld for SimWorld {
    fn player_pose(&self) -> Pose {
        self.state.borrow().player_pose
    }

    fn ships(&self) -> Vec<ShipState> {
        self.state.borrow().ships.values().cloned().collect()
    }

    fn ship(&self, id: ShipId) -> Option<ShipState> {
        self.ship_state(id)
    }

    fn write_kinematics(&mut self, id: ShipId, position: Vec3, velocity: Vec3, forward: Vec3) {
        let mut state = self.state.borrow_mut();
        state.kinematics_writes += 1;
        if let Some(ship) = state.ships.get_mut(&id) {
            ship.position = Some(position);
            ship.velocity = velocity;
            ship.forward = forward;
        }
    }

    fn spawn_ship(&mut self, spawn: &ShipSpawn) -> Option<ShipId> {
        let mut state = self.state.borrow_mut();
        Some(insert_spawn(&mut state, spawn))
    }

    fn despawn_ship(&mut self, id: ShipId) {
        let mut state = self.state.borrow_mut();
        if state.ships.remove(&id).is_some() {
            state.despawned.push(id);
        }
    }
}

/// Audio sink that keeps every played line
#[derive(Debug, Clone, Default)]
pub struct RecordingAudio {
    lines: Rc<RefCell<Vec<(GroupId, String, MessagePriority)>>>,
}

impl RecordingAudio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<(GroupId, String, MessagePriority)> {
        self.lines.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.lines.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.borrow().is_empty()
    }
}

impl AudioSink for RecordingAudio {
    fn play_message(&mut self, group: GroupId, text: &str, priority: MessagePriority) {
        self.lines.borrow_mut().push((group, text.to_string(), priority));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_share_state() {
        let world = SimWorld::new();
        let mut host = world.clone();
        let id = world.add_ship(ShipClass::Scout, Faction::Pirates, Vec3::ZERO);
        host.write_kinematics(id, Vec3::ONE, Vec3::X, Vec3::X);
        assert_eq!(world.ship_state(id).unwrap().position, Some(Vec3::ONE));
        assert_eq!(world.kinematics_writes(), 1);

        host.despawn_ship(id);
        assert!(!world.contains(id));
        assert_eq!(world.despawned(), vec![id]);
    }

    #[test]
    fn test_player_pose_follows_moves() {
        let world = SimWorld::new();
        let player = world.add_player(Vec3::ZERO);
        world.move_player(Vec3::new(30.0, 0.0, 0.0));
        assert_eq!(world.player_pose().position.x, 30.0);
        assert!(world.ship_state(player).unwrap().is_player);
    }

    #[test]
    fn test_populate_is_seeded() {
        let a = SimWorld::new();
        let b = SimWorld::new();
        a.populate(10, 50.0, 3);
        b.populate(10, 50.0, 3);
        assert_eq!(a.ships(), b.ships());
    }
}
