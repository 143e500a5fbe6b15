//! Ambient traffic around the player.
//!
//! Spawns mission-flavored ship groups in a ring around the player, steers
//! their leaders with a [`Mission`], and removes whole groups once their
//! leader drifts beyond the despawn radius. Each group flies as one flock.

pub mod comms;
pub mod missions;
pub mod routes;

use std::fmt;

use glam::Vec3;
use rand::Rng;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::AmbientConfig;
use crate::game::agent::{Agent, AgentMap, AgentOptions};
use crate::game::constants::ambient::*;
use crate::game::faction::Faction;
use crate::game::flocking::{FlockId, FlockingCoordinator, FormationShape};
use crate::game::snapshot::WorldSnapshot;
use crate::game::types::{GroupId, ShipClass, ShipId};
use crate::host::{HostWorld, ShipSpawn};
use crate::util::rng::{fork, horizontal_unit, AiRng};

pub use comms::{CommsQueue, QueuedMessage};
pub use missions::Mission;

// ============================================================================
// Group behaviors
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupBehavior {
    TradeConvoy,
    Patrol,
    Raider,
    Exploration,
    DiplomaticEscort,
    MiningOperation,
}

impl GroupBehavior {
    /// Same order as [`crate::config::BehaviorWeights::as_array`]
    pub const ALL: [GroupBehavior; 6] = [
        GroupBehavior::TradeConvoy,
        GroupBehavior::Patrol,
        GroupBehavior::Raider,
        GroupBehavior::Exploration,
        GroupBehavior::DiplomaticEscort,
        GroupBehavior::MiningOperation,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            GroupBehavior::TradeConvoy => "trade_convoy",
            GroupBehavior::Patrol => "patrol",
            GroupBehavior::Raider => "raider",
            GroupBehavior::Exploration => "exploration",
            GroupBehavior::DiplomaticEscort => "diplomatic_escort",
            GroupBehavior::MiningOperation => "mining_operation",
        }
    }

    /// Inclusive group size range
    pub fn size_range(&self) -> (usize, usize) {
        match self {
            GroupBehavior::TradeConvoy => (2, 4),
            GroupBehavior::Patrol => (2, 4),
            GroupBehavior::Raider => (1, 4),
            GroupBehavior::Exploration => (1, 2),
            GroupBehavior::DiplomaticEscort => (3, 5),
            GroupBehavior::MiningOperation => (2, 3),
        }
    }

    fn pick_faction(&self, rng: &mut AiRng) -> Faction {
        match self {
            GroupBehavior::TradeConvoy => Faction::FreeTraders,
            GroupBehavior::Patrol | GroupBehavior::DiplomaticEscort => {
                if rng.gen_bool(0.5) {
                    Faction::Federation
                } else {
                    Faction::Empire
                }
            }
            GroupBehavior::Raider => Faction::Pirates,
            GroupBehavior::Exploration => {
                if rng.gen_bool(0.5) {
                    Faction::Federation
                } else {
                    Faction::Neutral
                }
            }
            GroupBehavior::MiningOperation => Faction::MiningGuild,
        }
    }

    /// Hull class of the member at `index` (0 leads)
    fn class_for(&self, index: usize, rng: &mut AiRng) -> ShipClass {
        match (self, index) {
            (GroupBehavior::TradeConvoy, 0) => {
                if rng.gen_bool(0.4) {
                    ShipClass::HeavyFreighter
                } else {
                    ShipClass::Freighter
                }
            }
            (GroupBehavior::TradeConvoy, _) => ShipClass::LightFighter,
            (GroupBehavior::Patrol, 0) => ShipClass::HeavyFighter,
            (GroupBehavior::Patrol, _) => ShipClass::LightFighter,
            (GroupBehavior::Raider, _) => {
                if rng.gen_bool(0.3) {
                    ShipClass::Scout
                } else {
                    ShipClass::LightFighter
                }
            }
            (GroupBehavior::Exploration, _) => ShipClass::Scout,
            (GroupBehavior::DiplomaticEscort, 0) => ShipClass::Freighter,
            (GroupBehavior::DiplomaticEscort, _) => ShipClass::HeavyFighter,
            (GroupBehavior::MiningOperation, 0) => ShipClass::HeavyFreighter,
            (GroupBehavior::MiningOperation, _) => ShipClass::Freighter,
        }
    }

    fn formation(&self, rng: &mut AiRng) -> FormationShape {
        match self {
            GroupBehavior::TradeConvoy | GroupBehavior::DiplomaticEscort => FormationShape::Escort { radius: 1.5 },
            GroupBehavior::Patrol => FormationShape::Column { spacing: 1.2 },
            GroupBehavior::Raider | GroupBehavior::MiningOperation => FormationShape::Scattered {
                radius: 2.0,
                seed: rng.gen(),
            },
            GroupBehavior::Exploration => FormationShape::Line { spacing: 1.5 },
        }
    }
}

impl fmt::Display for GroupBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Groups
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct AmbientGroup {
    pub id: GroupId,
    pub behavior: GroupBehavior,
    pub faction: Faction,
    /// Leader first
    pub members: Vec<ShipId>,
    pub mission: Mission,
    pub flock: Option<FlockId>,
    pub spawned_ms: f64,
    pub spawn_point: Vec3,
}

impl AmbientGroup {
    pub fn leader(&self) -> Option<ShipId> {
        self.members.first().copied()
    }
}

/// Everything the ambient manager touches during a frame
pub struct AmbientContext<'a> {
    pub host: &'a mut dyn HostWorld,
    pub agents: &'a mut AgentMap,
    pub flocking: &'a mut FlockingCoordinator,
    pub snapshot: &'a WorldSnapshot,
    /// Registry capacity
    pub max_agents: usize,
    pub difficulty: u8,
    pub now_ms: f64,
}

/// Registry changes made during one ambient update
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AmbientReport {
    pub spawned: Vec<ShipId>,
    pub despawned: Vec<ShipId>,
    pub groups_spawned: usize,
    pub groups_removed: usize,
}

// ============================================================================
// Ambient ship manager
// ============================================================================

pub struct AmbientShipManager {
    config: AmbientConfig,
    groups: Vec<AmbientGroup>,
    comms: CommsQueue,
    rng: AiRng,
    last_spawn_ms: Option<f64>,
    total_spawned: u64,
}

impl AmbientShipManager {
    pub fn new(config: AmbientConfig, rng: AiRng) -> Self {
        let comms = CommsQueue::new(COMMS_QUEUE_LEN, config.communication_interval_ms);
        Self {
            config,
            groups: Vec::new(),
            comms,
            rng,
            last_spawn_ms: None,
            total_spawned: 0,
        }
    }

    pub fn config(&self) -> &AmbientConfig {
        &self.config
    }

    pub fn groups(&self) -> &[AmbientGroup] {
        &self.groups
    }

    pub fn group(&self, id: GroupId) -> Option<&AmbientGroup> {
        self.groups.iter().find(|g| g.id == id)
    }

    /// Live ambient ships across all groups
    pub fn active_ships(&self) -> usize {
        self.groups.iter().map(|g| g.members.len()).sum()
    }

    pub fn total_spawned(&self) -> u64 {
        self.total_spawned
    }

    pub fn comms(&self) -> &CommsQueue {
        &self.comms
    }

    /// Next voice line due for playback
    pub fn next_message(&mut self, now_ms: f64) -> Option<QueuedMessage> {
        self.comms.pop_due(now_ms)
    }

    /// One frame of ambient upkeep: prune, despawn, steer leaders, spawn
    pub fn update(&mut self, ctx: &mut AmbientContext<'_>) -> AmbientReport {
        let mut report = AmbientReport::default();
        let player = ctx.snapshot.player.position;

        self.prune(ctx);
        self.despawn_distant(ctx, player, &mut report);

        for group in &mut self.groups {
            let Some(leader_id) = group.leader() else {
                continue;
            };
            let Some(leader) = ctx.agents.get_mut(&leader_id) else {
                continue;
            };
            leader.waypoint = group.mission.waypoint(leader.position, player, &mut self.rng, ctx.now_ms);
        }

        let due = self
            .last_spawn_ms
            .map_or(true, |t| ctx.now_ms - t >= self.config.spawn_interval_ms);
        if due {
            self.last_spawn_ms = Some(ctx.now_ms);
            if self.spawn_group(ctx, player, &mut report) {
                report.groups_spawned += 1;
            }
        }
        report
    }

    /// Drop members whose agent is gone or destroyed and forget empty groups
    fn prune(&mut self, ctx: &mut AmbientContext<'_>) {
        for group in &mut self.groups {
            group.members.retain(|id| {
                ctx.agents
                    .get(id)
                    .is_some_and(|a| !a.is_destroyed() && !a.departed)
            });
        }
        let comms = &mut self.comms;
        self.groups.retain(|g| {
            if g.members.is_empty() {
                debug!(group = %g.id, behavior = %g.behavior, "Ambient group lost all members");
                comms.drop_group(g.id);
                false
            } else {
                true
            }
        });
    }

    fn despawn_distant(&mut self, ctx: &mut AmbientContext<'_>, player: Vec3, report: &mut AmbientReport) {
        let radius = self.config.despawn_radius;
        let mut kept = Vec::with_capacity(self.groups.len());
        for group in self.groups.drain(..) {
            let far = group
                .leader()
                .and_then(|id| ctx.agents.get(&id))
                .map_or(true, |leader| leader.position.distance(player) > radius);
            if !far {
                kept.push(group);
                continue;
            }

            if let Some(flock) = group.flock {
                ctx.flocking.disband(ctx.agents, flock);
            }
            for member in &group.members {
                ctx.agents.remove(member);
                ctx.host.despawn_ship(*member);
                report.despawned.push(*member);
            }
            self.comms.drop_group(group.id);
            report.groups_removed += 1;
            debug!(group = %group.id, behavior = %group.behavior, members = group.members.len(), "Ambient group despawned");
        }
        self.groups = kept;
    }

    fn pick_behavior(&mut self) -> Option<GroupBehavior> {
        let weights = self.config.weights.as_array();
        let total: f32 = weights.iter().sum();
        if total <= 0.0 {
            return None;
        }
        let mut roll = self.rng.gen_range(0.0..total);
        for (behavior, weight) in GroupBehavior::ALL.iter().zip(weights) {
            if weight <= 0.0 {
                continue;
            }
            if roll < weight {
                return Some(*behavior);
            }
            roll -= weight;
        }
        GroupBehavior::ALL
            .iter()
            .zip(weights)
            .rev()
            .find(|(_, w)| *w > 0.0)
            .map(|(b, _)| *b)
    }

    fn spawn_group(&mut self, ctx: &mut AmbientContext<'_>, player: Vec3, report: &mut AmbientReport) -> bool {
        let room = self
            .config
            .max_ships
            .saturating_sub(self.active_ships())
            .min(ctx.max_agents.saturating_sub(ctx.agents.len()));
        if room == 0 {
            return false;
        }
        let Some(behavior) = self.pick_behavior() else {
            return false;
        };
        let (min_size, max_size) = behavior.size_range();
        let size = self.rng.gen_range(min_size..=max_size).min(room);
        let faction = behavior.pick_faction(&mut self.rng);

        let distance = self.config.spawn_radius + self.rng.gen_range(RING_MIN_OFFSET..RING_MAX_OFFSET);
        let anchor = player
            + horizontal_unit(&mut self.rng) * distance
            + Vec3::Y * self.rng.gen_range(-VERTICAL_SPREAD..VERTICAL_SPREAD);

        let group_id = uuid::Builder::from_random_bytes(self.rng.gen()).into_uuid();
        let mission = Mission::plan(behavior, faction, anchor, ctx.snapshot, &mut self.rng, ctx.now_ms);
        let heading = (player - anchor).normalize_or_zero();

        let mut members = Vec::with_capacity(size);
        for index in 0..size {
            let offset = if index == 0 {
                Vec3::ZERO
            } else {
                horizontal_unit(&mut self.rng) * self.rng.gen_range(0.0..MEMBER_SPREAD)
            };
            let spawn = ShipSpawn {
                class: behavior.class_for(index, &mut self.rng),
                faction,
                position: anchor + offset,
                velocity: Vec3::ZERO,
                forward: heading,
            };
            let Some(id) = ctx.host.spawn_ship(&spawn) else {
                warn!(behavior = %behavior, "Host refused an ambient spawn");
                break;
            };
            let Some(ship) = ctx.host.ship(id) else {
                warn!(ship = %id, "Spawned ship not visible to the host query");
                ctx.host.despawn_ship(id);
                continue;
            };

            let options = AgentOptions::default().with_faction(faction);
            match Agent::new(&ship, options, ctx.difficulty, fork(&mut self.rng), ctx.now_ms) {
                Ok(mut agent) => {
                    agent.group = Some(group_id);
                    ctx.agents.insert(id, agent);
                    members.push(id);
                    report.spawned.push(id);
                }
                Err(e) => {
                    warn!(ship = %id, "Ambient agent rejected: {}", e);
                    ctx.host.despawn_ship(id);
                }
            }
        }
        if members.is_empty() {
            return false;
        }

        let flock = ctx.flocking.create_flock(ctx.agents, &members, ctx.now_ms);
        if let Some(flock) = flock {
            let shape = behavior.formation(&mut self.rng);
            ctx.flocking.assign_formation(ctx.agents, flock, shape, ctx.now_ms);
        }

        let line = comms::arrival_line(faction, behavior, &mut self.rng);
        self.comms.push(group_id, line, comms::arrival_priority(behavior));

        info!(
            group = %group_id,
            behavior = %behavior,
            faction = %faction,
            members = members.len(),
            "Ambient group spawned {:.1} km from the player",
            anchor.distance(player)
        );
        self.total_spawned += members.len() as u64;
        self.groups.push(AmbientGroup {
            id: group_id,
            behavior,
            faction,
            members,
            mission,
            flock,
            spawned_ms: ctx.now_ms,
            spawn_point: anchor,
        });
        true
    }

    /// Remove every group, its agents and its host ships
    pub fn clear(&mut self, ctx: &mut AmbientContext<'_>) -> Vec<ShipId> {
        let mut removed = Vec::new();
        for group in self.groups.drain(..) {
            if let Some(flock) = group.flock {
                ctx.flocking.disband(ctx.agents, flock);
            }
            for member in group.members {
                ctx.agents.remove(&member);
                ctx.host.despawn_ship(member);
                removed.push(member);
            }
        }
        self.comms.clear();
        removed
    }

    /// Forget an agent removed by the registry
    pub fn forget(&mut self, id: ShipId) {
        for group in &mut self.groups {
            group.members.retain(|m| *m != id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BehaviorWeights;
    use crate::game::faction::FactionTable;
    use crate::game::flocking::FlockingConfig;
    use crate::sim::SimWorld;
    use crate::util::rng::seeded;

    struct Rig {
        world: SimWorld,
        agents: AgentMap,
        flocking: FlockingCoordinator,
        ambient: AmbientShipManager,
    }

    impl Rig {
        fn new(config: AmbientConfig) -> Self {
            let world = SimWorld::new();
            world.add_player(Vec3::ZERO);
            Self {
                world,
                agents: AgentMap::default(),
                flocking: FlockingCoordinator::new(FlockingConfig::default()),
                ambient: AmbientShipManager::new(config, seeded(77)),
            }
        }

        fn tick(&mut self, now_ms: f64) -> AmbientReport {
            let snapshot = WorldSnapshot::capture(&self.world, &FactionTable::new(), now_ms);
            let mut host = self.world.clone();
            let mut ctx = AmbientContext {
                host: &mut host,
                agents: &mut self.agents,
                flocking: &mut self.flocking,
                snapshot: &snapshot,
                max_agents: 256,
                difficulty: 50,
                now_ms,
            };
            self.ambient.update(&mut ctx)
        }
    }

    fn raider_config() -> AmbientConfig {
        AmbientConfig {
            weights: BehaviorWeights::raiders_only(),
            ..AmbientConfig::default()
        }
    }

    #[test]
    fn test_spawns_raiders_in_ring() {
        let mut rig = Rig::new(raider_config());
        let report = rig.tick(0.0);
        assert_eq!(report.groups_spawned, 1);

        let group = &rig.ambient.groups()[0];
        assert_eq!(group.behavior, GroupBehavior::Raider);
        assert_eq!(group.faction, Faction::Pirates);
        assert!((1..=4).contains(&group.members.len()));
        for id in &group.members {
            let agent = &rig.agents[id];
            let d = agent.position.length();
            assert!(d >= SPAWN_RADIUS && d <= SPAWN_RADIUS + 5.0, "spawned at {d}");
            assert_eq!(agent.group, Some(group.id));
            assert_eq!(agent.flock, group.flock);
            assert!(rig.world.contains(*id));
        }
        assert_eq!(rig.ambient.comms().len(), 1);
    }

    #[test]
    fn test_spawn_interval_and_cap() {
        let mut config = raider_config();
        config.max_ships = 3;
        let mut rig = Rig::new(config);

        rig.tick(0.0);
        let after_first = rig.ambient.groups().len();
        rig.tick(1000.0);
        assert_eq!(rig.ambient.groups().len(), after_first, "spawned inside the interval");

        for step in 1..20 {
            rig.tick(step as f64 * 2000.0);
            assert!(rig.ambient.active_ships() <= 3);
        }
        assert_eq!(rig.ambient.active_ships(), 3);
    }

    #[test]
    fn test_group_despawns_beyond_radius() {
        let mut rig = Rig::new(raider_config());
        rig.tick(0.0);
        let group = rig.ambient.groups()[0].clone();
        let leader = rig.agents[&group.members[0]].position;

        rig.world.move_player(-leader.normalize() * 30.0);
        let report = rig.tick(100.0);

        assert_eq!(report.groups_removed, 1);
        assert!(rig.ambient.group(group.id).is_none());
        for id in &group.members {
            assert!(!rig.agents.contains_key(id));
            assert!(!rig.world.contains(*id));
        }
        assert!(group.flock.is_some_and(|f| rig.flocking.flock(f).is_none()));
    }

    #[test]
    fn test_destroyed_members_are_pruned() {
        let mut rig = Rig::new(raider_config());
        rig.tick(0.0);
        let group = rig.ambient.groups()[0].clone();
        for id in &group.members {
            rig.agents.get_mut(id).unwrap().hull = 0.0;
        }
        rig.tick(100.0);
        assert!(rig.ambient.group(group.id).is_none());
    }

    #[test]
    fn test_leader_gets_mission_waypoint() {
        let mut rig = Rig::new(raider_config());
        rig.tick(0.0);
        rig.tick(100.0);
        let group = &rig.ambient.groups()[0];
        assert_eq!(rig.agents[&group.members[0]].waypoint, Some(Vec3::ZERO));
        for follower in &group.members[1..] {
            assert_eq!(rig.agents[follower].waypoint, None);
        }
    }

    #[test]
    fn test_weighted_pick_respects_zero_weights() {
        let config = AmbientConfig {
            weights: BehaviorWeights {
                trade_convoy: 0.0,
                patrol: 1.0,
                raider: 0.0,
                exploration: 0.0,
                diplomatic_escort: 0.0,
                mining_operation: 0.0,
            },
            ..AmbientConfig::default()
        };
        let mut ambient = AmbientShipManager::new(config, seeded(1));
        for _ in 0..50 {
            assert_eq!(ambient.pick_behavior(), Some(GroupBehavior::Patrol));
        }
    }
}
