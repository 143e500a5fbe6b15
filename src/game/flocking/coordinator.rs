//! Flock bookkeeping and per-frame formation upkeep.
//!
//! A flock is an ordered member list; the first live member leads. The
//! coordinator owns the lists, the agents only carry a back-reference
//! (`Agent::flock`) and their current slot target. Every mutation keeps the
//! two in agreement: an agent is in at most one flock, and its `flock` field
//! names exactly the flock that lists it.

use glam::Vec3;
use hashbrown::HashMap;
use serde::Serialize;
use smallvec::SmallVec;
use tracing::{debug, trace};

use super::formation::{update_for_leader, FormationDescriptor, FormationShape};
use super::steering::{steer, Kinematics, Neighbor, Obstacle};
use super::{FlockId, FlockingConfig};
use crate::game::agent::{Agent, AgentMap};
use crate::game::types::{Pose, ShipId};

/// An ordered group of agents flying together
#[derive(Debug, Clone, Serialize)]
pub struct Flock {
    pub id: FlockId,
    members: Vec<ShipId>,
    pub formation: Option<FormationDescriptor>,
    pub created_ms: f64,
}

impl Flock {
    pub fn members(&self) -> &[ShipId] {
        &self.members
    }

    pub fn leader(&self) -> Option<ShipId> {
        self.members.first().copied()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, id: ShipId) -> bool {
        self.members.contains(&id)
    }
}

pub struct FlockingCoordinator {
    flocks: HashMap<FlockId, Flock>,
    next_id: u64,
    config: FlockingConfig,
    obstacles: Vec<Obstacle>,
    last_update_ms: Option<f64>,
}

impl FlockingCoordinator {
    pub fn new(config: FlockingConfig) -> Self {
        Self {
            flocks: HashMap::new(),
            next_id: 1,
            config,
            obstacles: Vec::new(),
            last_update_ms: None,
        }
    }

    pub fn config(&self) -> &FlockingConfig {
        &self.config
    }

    /// Replace the static obstacles considered by steering
    pub fn set_obstacles(&mut self, obstacles: Vec<Obstacle>) {
        self.obstacles = obstacles;
    }

    pub fn len(&self) -> usize {
        self.flocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flocks.is_empty()
    }

    pub fn flock(&self, id: FlockId) -> Option<&Flock> {
        self.flocks.get(&id)
    }

    /// Flock ids in ascending order
    pub fn flock_ids(&self) -> Vec<FlockId> {
        let mut ids: Vec<FlockId> = self.flocks.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn flock_of(&self, member: ShipId) -> Option<FlockId> {
        self.flocks
            .values()
            .find(|f| f.contains(member))
            .map(|f| f.id)
    }

    /// Create a flock from the given agents, leader first. Unknown ids are
    /// skipped and agents already in another flock are moved. Returns `None`
    /// when no member is usable.
    pub fn create_flock(&mut self, agents: &mut AgentMap, members: &[ShipId], now_ms: f64) -> Option<FlockId> {
        let usable = self.claim(agents, members, None);
        if usable.is_empty() {
            return None;
        }

        let id = FlockId(self.next_id);
        self.next_id += 1;
        for member in &usable {
            if let Some(agent) = agents.get_mut(member) {
                agent.flock = Some(id);
                agent.slot_target = None;
            }
        }
        debug!(flock = %id, members = usable.len(), "Flock created");
        self.flocks.insert(
            id,
            Flock {
                id,
                members: usable,
                formation: None,
                created_ms: now_ms,
            },
        );
        Some(id)
    }

    /// Lay the flock out in `shape` around its current leader and hand out
    /// slot targets
    pub fn assign_formation(
        &mut self,
        agents: &mut AgentMap,
        id: FlockId,
        shape: FormationShape,
        now_ms: f64,
    ) -> bool {
        let Some(flock) = self.flocks.get_mut(&id) else {
            return false;
        };
        let Some(pose) = flock.leader().and_then(|l| agents.get(&l)).map(leader_pose) else {
            return false;
        };
        flock.formation = Some(FormationDescriptor::new(shape, pose, flock.members.len(), now_ms));
        write_slot_targets(flock, agents);
        debug!(flock = %id, shape = shape.name(), members = flock.members.len(), "Formation assigned");
        true
    }

    /// Drop the formation, members fall back to plain flocking
    pub fn clear_formation(&mut self, agents: &mut AgentMap, id: FlockId) -> bool {
        let Some(flock) = self.flocks.get_mut(&id) else {
            return false;
        };
        flock.formation = None;
        for member in &flock.members {
            if let Some(agent) = agents.get_mut(member) {
                agent.slot_target = None;
            }
        }
        true
    }

    /// Append agents to a flock. Returns how many were added.
    pub fn add_members(&mut self, agents: &mut AgentMap, id: FlockId, members: &[ShipId], now_ms: f64) -> usize {
        if !self.flocks.contains_key(&id) {
            return 0;
        }
        let added = self.claim(agents, members, Some(id));
        let Some(flock) = self.flocks.get_mut(&id) else {
            return 0;
        };
        for member in &added {
            if let Some(agent) = agents.get_mut(member) {
                agent.flock = Some(id);
            }
            flock.members.push(*member);
        }
        if !added.is_empty() {
            relayout(flock, agents, now_ms);
            trace!(flock = %id, added = added.len(), "Members joined");
        }
        added.len()
    }

    /// Remove agents from a flock. An emptied flock is destroyed. Returns
    /// how many were removed.
    pub fn remove_members(&mut self, agents: &mut AgentMap, id: FlockId, members: &[ShipId], now_ms: f64) -> usize {
        let Some(flock) = self.flocks.get_mut(&id) else {
            return 0;
        };
        let before = flock.members.len();
        flock.members.retain(|m| !members.contains(m));
        let removed = before - flock.members.len();

        for member in members {
            if let Some(agent) = agents.get_mut(member) {
                if agent.flock == Some(id) {
                    agent.flock = None;
                    agent.slot_target = None;
                }
            }
        }

        if flock.members.is_empty() {
            self.flocks.remove(&id);
            debug!(flock = %id, "Flock emptied");
        } else if removed > 0 {
            relayout(flock, agents, now_ms);
        }
        removed
    }

    /// Drop an agent from whatever flock lists it
    pub fn forget(&mut self, agents: &mut AgentMap, member: ShipId, now_ms: f64) {
        if let Some(id) = self.flock_of(member) {
            self.remove_members(agents, id, &[member], now_ms);
        }
    }

    pub fn disband(&mut self, agents: &mut AgentMap, id: FlockId) -> bool {
        let Some(flock) = self.flocks.remove(&id) else {
            return false;
        };
        for member in &flock.members {
            if let Some(agent) = agents.get_mut(member) {
                agent.flock = None;
                agent.slot_target = None;
            }
        }
        debug!(flock = %id, "Flock disbanded");
        true
    }

    pub fn clear(&mut self, agents: &mut AgentMap) {
        for id in self.flock_ids() {
            self.disband(agents, id);
        }
    }

    /// Per-frame upkeep: prune dead members, promote a new leader when the
    /// old one is gone, refresh formations and add steering forces to member
    /// accelerations. Throttled to `refresh_interval_ms`; returns false when
    /// the call was skipped.
    pub fn update(&mut self, agents: &mut AgentMap, now_ms: f64) -> bool {
        if self
            .last_update_ms
            .is_some_and(|t| now_ms - t < self.config.refresh_interval_ms)
        {
            return false;
        }
        self.last_update_ms = Some(now_ms);

        for id in self.flock_ids() {
            let Some(flock) = self.flocks.get_mut(&id) else {
                continue;
            };

            let old_leader = flock.leader();
            let before = flock.members.len();
            let (live, gone): (Vec<ShipId>, Vec<ShipId>) = flock
                .members
                .iter()
                .copied()
                .partition(|m| agents.get(m).is_some_and(is_active));
            flock.members = live;
            for member in gone {
                if let Some(agent) = agents.get_mut(&member) {
                    agent.flock = None;
                    agent.slot_target = None;
                }
            }
            if flock.members.is_empty() {
                self.flocks.remove(&id);
                debug!(flock = %id, "Flock dissolved, no live members");
                continue;
            }

            let succession = flock.leader() != old_leader;
            if succession {
                debug!(flock = %id, leader = ?flock.leader(), "Leader succession");
            }
            let shrunk = flock.members.len() != before;

            if let Some(pose) = flock.leader().and_then(|l| agents.get(&l)).map(leader_pose) {
                let stale = match &flock.formation {
                    Some(desc) => {
                        succession
                            || shrunk
                            || desc.leader.position.distance(pose.position) > self.config.leader_move_threshold
                            || desc.leader.forward.dot(pose.forward) < 0.999
                            || now_ms - desc.refreshed_ms > self.config.refresh_age_ms
                    }
                    None => false,
                };
                if stale {
                    if let Some(desc) = flock.formation.as_mut() {
                        *desc = if shrunk {
                            FormationDescriptor::new(desc.shape, pose, flock.members.len(), now_ms)
                        } else {
                            update_for_leader(desc, pose, now_ms)
                        };
                    }
                }
                if flock.formation.is_some() && (stale || succession) {
                    write_slot_targets(flock, agents);
                }
            }

            apply_steering(flock, agents, &self.obstacles, &self.config);
        }
        true
    }

    /// Keep only ids with a live agent, no duplicates, and pull each out of
    /// any other flock it belongs to.
    fn claim(&mut self, agents: &mut AgentMap, members: &[ShipId], target: Option<FlockId>) -> Vec<ShipId> {
        let mut usable: Vec<ShipId> = Vec::with_capacity(members.len());
        for &member in members {
            if usable.contains(&member) || !agents.get(&member).is_some_and(is_active) {
                continue;
            }
            if let Some(existing) = self.flock_of(member) {
                if Some(existing) == target {
                    continue;
                }
                self.remove_members(agents, existing, &[member], 0.0);
            }
            usable.push(member);
        }
        usable
    }
}

fn is_active(agent: &Agent) -> bool {
    !agent.is_destroyed() && !agent.departed
}

fn leader_pose(agent: &Agent) -> Pose {
    Pose::new(agent.position, agent.forward)
}

/// Recompute the layout after a membership change
fn relayout(flock: &mut Flock, agents: &mut AgentMap, now_ms: f64) {
    let Some(shape) = flock.formation.as_ref().map(|d| d.shape) else {
        return;
    };
    let Some(pose) = flock.leader().and_then(|l| agents.get(&l)).map(leader_pose) else {
        return;
    };
    flock.formation = Some(FormationDescriptor::new(shape, pose, flock.members.len(), now_ms));
    write_slot_targets(flock, agents);
}

/// Member `i` follows slot `i`; the leader and members past the last slot
/// have no target.
fn write_slot_targets(flock: &Flock, agents: &mut AgentMap) {
    let Some(desc) = &flock.formation else {
        return;
    };
    for (index, member) in flock.members.iter().enumerate() {
        if let Some(agent) = agents.get_mut(member) {
            agent.slot_target = if index == 0 { None } else { desc.slot(index) };
        }
    }
}

fn apply_steering(flock: &Flock, agents: &mut AgentMap, obstacles: &[Obstacle], config: &FlockingConfig) {
    let crowd: SmallVec<[Neighbor; 16]> = flock
        .members
        .iter()
        .filter_map(|m| agents.get(m))
        .map(|a| Neighbor {
            id: a.id,
            position: a.position,
            velocity: a.velocity,
        })
        .collect();

    for member in &flock.members {
        let Some(agent) = agents.get_mut(member) else {
            continue;
        };
        let me = Kinematics {
            id: agent.id,
            position: agent.position,
            velocity: agent.velocity,
            max_speed: agent.profile.max_speed,
            max_force: agent.profile.max_force,
        };
        let near: SmallVec<[Neighbor; 16]> = crowd
            .iter()
            .filter(|n| n.id != me.id && n.position.distance(me.position) <= config.neighbor_radius)
            .copied()
            .collect();
        let force = steer(&me, agent.slot_target, &near, obstacles, config);
        if force != Vec3::ZERO {
            agent.acceleration += force;
        }
    }
}
