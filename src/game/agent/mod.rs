//! Per-ship agent.
//!
//! An agent owns the decision state of one host ship: kinematics, sensors,
//! threat estimate, state machine and distress cooldown. One update runs the
//! stages selected by its [`UpdateDepth`]:
//!
//! 1. sensor sweep over the frame snapshot
//! 2. threat assessment (Reduced depth and above)
//! 3. state machine transitions and behavior steering
//! 4. integration
//! 5. distress call on entering combat

pub mod comms;
pub mod fsm;
pub mod profiles;
pub mod threat;

use glam::Vec3;
use rustc_hash::FxHashMap;
use serde::Serialize;
use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use crate::game::constants::comms::DISTRESS_COOLDOWN_MS;
use crate::game::constants::fsm::FACING_EPSILON;
use crate::game::constants::lod::MAX_AGENT_DT;
use crate::game::faction::Faction;
use crate::game::flocking::FlockId;
use crate::game::performance::{FsmCadence, LodTier, UpdateDepth};
use crate::game::snapshot::WorldSnapshot;
use crate::game::types::{GroupId, ShipClass, ShipId};
use crate::host::ShipState;
use crate::util::math::{heading_or_default, is_finite};
use crate::util::rng::AiRng;

pub use comms::DistressCall;
pub use fsm::{AiState, StateMachine, Transition};
pub use profiles::{AgentOptions, AgentProfile};
pub use threat::ThreatAssessment;

/// Agent registry keyed by ship id
pub type AgentMap = FxHashMap<ShipId, Agent>;

/// Per-agent failures. None of these unregister the agent.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AgentError {
    #[error("{0} has non-finite kinematics")]
    InvalidKinematics(ShipId),
    #[error("{0} has no position")]
    MissingPosition(ShipId),
    #[error("{agent}: sensor contact {contact} has a non-finite position")]
    SensorInput { agent: ShipId, contact: ShipId },
    #[error("{0} panicked during update")]
    Panicked(ShipId),
}

/// A contact inside sensor range
#[derive(Debug, Clone, PartialEq)]
pub struct SensedContact {
    pub id: ShipId,
    pub position: Vec3,
    pub velocity: Vec3,
    pub distance: f32,
    pub faction: Faction,
    pub hull_fraction: f32,
    pub is_player: bool,
}

/// Result of the last sensor sweep, each list sorted by distance then id
#[derive(Debug, Clone, Default)]
pub struct Sensors {
    pub threats: SmallVec<[SensedContact; 8]>,
    pub neutrals: SmallVec<[SensedContact; 8]>,
}

/// What one update produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentTick {
    pub transition: Option<Transition>,
    pub distress: Option<DistressCall>,
    pub left_world: bool,
}

/// Serializable view used by the debug overlay
#[derive(Debug, Clone, Serialize)]
pub struct AgentDebugInfo {
    pub id: ShipId,
    pub class: ShipClass,
    pub faction: Faction,
    pub state: AiState,
    pub target: Option<ShipId>,
    pub threat_level: f32,
    pub hull_fraction: f32,
    pub lod: LodTier,
    pub position: Vec3,
    pub velocity: Vec3,
    pub cost_ms: f64,
}

/// Decision state of one AI-controlled ship
#[derive(Debug, Clone)]
pub struct Agent {
    pub id: ShipId,
    pub class: ShipClass,
    pub faction: Faction,

    pub position: Vec3,
    pub velocity: Vec3,
    /// Steering accumulated since the last integration
    pub acceleration: Vec3,
    pub forward: Vec3,

    pub hull: f32,
    pub max_hull: f32,

    pub profile: AgentProfile,
    options: AgentOptions,
    difficulty: u8,

    pub fsm: StateMachine,
    pub threat: ThreatAssessment,
    pub sensors: Sensors,
    pub target: Option<ShipId>,
    pub last_known_target: Option<Vec3>,

    pub flock: Option<FlockId>,
    pub slot_target: Option<Vec3>,
    pub waypoint: Option<Vec3>,
    pub group: Option<GroupId>,

    /// Scheduling state owned by the performance manager
    pub lod: LodTier,
    pub last_update_ms: Option<f64>,
    /// Smoothed measured cost of one update
    pub cost_ms: f64,
    pub update_count: u64,
    last_fsm_ms: Option<f64>,

    pub created_ms: f64,
    last_distress_ms: Option<f64>,
    /// Set once the agent has warped out
    pub departed: bool,
    pub debug: bool,

    pub(crate) rng: AiRng,
}

impl Agent {
    /// Build an agent for a host ship
    pub fn new(
        ship: &ShipState,
        options: AgentOptions,
        default_difficulty: u8,
        rng: AiRng,
        now_ms: f64,
    ) -> Result<Self, AgentError> {
        let position = ship.position.ok_or(AgentError::MissingPosition(ship.id))?;
        if !is_finite(position) {
            return Err(AgentError::InvalidKinematics(ship.id));
        }

        let faction = options.faction.unwrap_or(ship.faction);
        let difficulty = profiles::clamp_difficulty(options.difficulty.unwrap_or(default_difficulty));
        let profile = profiles::build_profile(ship.class, faction, difficulty, &options);

        Ok(Self {
            id: ship.id,
            class: ship.class,
            faction,
            position,
            velocity: if is_finite(ship.velocity) { ship.velocity } else { Vec3::ZERO },
            acceleration: Vec3::ZERO,
            forward: heading_or_default(ship.forward),
            hull: ship.hull.max(0.0),
            max_hull: ship.max_hull.max(f32::EPSILON),
            profile,
            options,
            difficulty,
            fsm: StateMachine::new(now_ms),
            threat: ThreatAssessment::new(),
            sensors: Sensors::default(),
            target: None,
            last_known_target: None,
            flock: None,
            slot_target: None,
            waypoint: None,
            group: None,
            lod: LodTier::High,
            last_update_ms: None,
            cost_ms: 0.0,
            update_count: 0,
            last_fsm_ms: None,
            created_ms: now_ms,
            last_distress_ms: None,
            departed: false,
            debug: false,
            rng,
        })
    }

    pub fn state(&self) -> AiState {
        self.fsm.state()
    }

    pub fn difficulty(&self) -> u8 {
        self.difficulty
    }

    pub fn hull_fraction(&self) -> f32 {
        (self.hull / self.max_hull).clamp(0.0, 1.0)
    }

    pub fn is_destroyed(&self) -> bool {
        self.hull <= 0.0
    }

    /// Rebuild the profile for a new difficulty, keeping explicit overrides
    pub fn set_difficulty(&mut self, difficulty: u8) {
        self.difficulty = profiles::clamp_difficulty(difficulty);
        self.profile = profiles::build_profile(self.class, self.faction, self.difficulty, &self.options);
    }

    pub fn force_state(&mut self, state: AiState, now_ms: f64) -> Option<Transition> {
        let transition = fsm::force_state(self, state, now_ms);
        if let Some(t) = transition {
            self.log_transition(t, "forced");
        }
        transition
    }

    /// Run one update at `depth`. `dt` is the time since this agent's last
    /// update in seconds.
    pub fn update(
        &mut self,
        snapshot: &WorldSnapshot,
        depth: UpdateDepth,
        dt: f32,
        now_ms: f64,
    ) -> Result<AgentTick, AgentError> {
        if !is_finite(self.position) || !is_finite(self.velocity) {
            return Err(AgentError::InvalidKinematics(self.id));
        }
        let dt = if dt.is_finite() { dt.clamp(0.0, MAX_AGENT_DT) } else { 0.0 };

        self.sync_from(snapshot)?;
        self.update_count += 1;

        let stages = depth.stages();
        let run_fsm = match stages.fsm {
            FsmCadence::Every => true,
            FsmCadence::AtMost(interval) => self.last_fsm_ms.map_or(true, |t| now_ms - t >= interval),
            FsmCadence::Never => false,
        };

        let mut tick = AgentTick::default();
        // Without the state machine the only queued force is the flock's
        if !run_fsm {
            self.integrate(dt * stages.advance_rate)?;
            return Ok(tick);
        }

        self.sense(snapshot)?;
        if stages.assess_threat {
            let hull = self.hull_fraction();
            self.threat
                .assess(&self.sensors.threats, hull, self.profile.sensor_range);
        }

        let steer = self.update_count % u64::from(stages.steer_every.max(1)) == 0;
        let outcome = fsm::update(self, snapshot, now_ms, steer);
        self.last_fsm_ms = Some(now_ms);

        if outcome.left_world {
            self.departed = true;
            tick.left_world = true;
            debug!(agent = %self.id, "Warping out at {:.0}% hull", self.hull_fraction() * 100.0);
            return Ok(tick);
        }

        self.integrate(dt)?;

        if let Some(transition) = outcome.transition {
            self.log_transition(transition, "update");
            tick.distress = self.distress_for(transition, now_ms);
        }
        tick.transition = outcome.transition;
        Ok(tick)
    }

    /// Answer a distress call. Idle and buzzing agents in range join the
    /// sender's fight. Returns true when the agent switched to engage.
    pub fn receive_distress(&mut self, call: &DistressCall, target_position: Option<Vec3>, now_ms: f64) -> bool {
        if !matches!(self.state(), AiState::Idle | AiState::Buzz) || self.is_destroyed() {
            return false;
        }
        if !call.reaches(self.id, self.faction, self.position) {
            return false;
        }

        self.target = Some(call.target);
        self.last_known_target = target_position;
        if let Some(t) = fsm::force_state(self, AiState::Engage, now_ms) {
            self.log_transition(t, "distress");
        }
        true
    }

    pub fn debug_info(&self) -> AgentDebugInfo {
        AgentDebugInfo {
            id: self.id,
            class: self.class,
            faction: self.faction,
            state: self.state(),
            target: self.target,
            threat_level: self.threat.current_level(),
            hull_fraction: self.hull_fraction(),
            lod: self.lod,
            position: self.position,
            velocity: self.velocity,
            cost_ms: self.cost_ms,
        }
    }

    fn log_transition(&self, transition: Transition, cause: &str) {
        if self.debug {
            debug!(
                agent = %self.id,
                from = transition.from.name(),
                to = transition.to.name(),
                cause,
                "State transition"
            );
        } else {
            trace!(agent = %self.id, from = transition.from.name(), to = transition.to.name(), cause);
        }
    }

    fn distress_for(&mut self, transition: Transition, now_ms: f64) -> Option<DistressCall> {
        if !transition.to.is_combat() {
            return None;
        }
        if self
            .last_distress_ms
            .is_some_and(|t| now_ms - t < DISTRESS_COOLDOWN_MS)
        {
            return None;
        }
        let target = self.target?;
        self.last_distress_ms = Some(now_ms);
        Some(DistressCall {
            sender: self.id,
            faction: self.faction,
            position: self.position,
            target,
            range: self.profile.communication_range,
            sent_ms: now_ms,
        })
    }

    /// Pull hull from the snapshot; the host owns damage
    fn sync_from(&mut self, snapshot: &WorldSnapshot) -> Result<(), AgentError> {
        if snapshot.is_unplaced(self.id) {
            return Err(AgentError::MissingPosition(self.id));
        }
        if let Some(own) = snapshot.contact(self.id) {
            self.hull = own.hull_fraction * self.max_hull;
            if own.destroyed {
                self.hull = 0.0;
            }
        }
        Ok(())
    }

    fn sense(&mut self, snapshot: &WorldSnapshot) -> Result<(), AgentError> {
        let mut sensors = Sensors::default();
        let range = self.profile.sensor_range;

        for contact in snapshot.contacts() {
            if contact.id == self.id || contact.destroyed {
                continue;
            }
            if !is_finite(contact.position) {
                return Err(AgentError::SensorInput {
                    agent: self.id,
                    contact: contact.id,
                });
            }
            let distance = contact.position.distance(self.position);
            if distance > range {
                continue;
            }

            let sensed = SensedContact {
                id: contact.id,
                position: contact.position,
                velocity: contact.velocity,
                distance,
                faction: contact.faction,
                hull_fraction: contact.hull_fraction,
                is_player: contact.is_player,
            };
            if snapshot.is_hostile(self.faction, contact) {
                sensors.threats.push(sensed);
            } else if contact.faction != self.faction || contact.is_player {
                sensors.neutrals.push(sensed);
            }
        }

        let by_distance =
            |a: &SensedContact, b: &SensedContact| a.distance.total_cmp(&b.distance).then(a.id.cmp(&b.id));
        sensors.threats.sort_by(by_distance);
        sensors.neutrals.sort_by(by_distance);
        self.sensors = sensors;
        Ok(())
    }

    /// Semi-implicit Euler step with force and speed limits
    fn integrate(&mut self, dt: f32) -> Result<(), AgentError> {
        let previous = self.position;
        let accel = self.acceleration.clamp_length_max(self.profile.max_force);
        self.velocity = (self.velocity + accel * dt).clamp_length_max(self.profile.max_speed);
        self.position += self.velocity * dt;
        if self.velocity.length() > FACING_EPSILON {
            self.forward = self.velocity.normalize();
        }
        self.acceleration = Vec3::ZERO;
        self.check_kinematics(previous)
    }

    fn check_kinematics(&mut self, previous: Vec3) -> Result<(), AgentError> {
        if is_finite(self.position) && is_finite(self.velocity) && is_finite(self.forward) {
            return Ok(());
        }
        warn!(agent = %self.id, "Non-finite kinematics, restoring last position");
        self.position = previous;
        self.velocity = Vec3::ZERO;
        self.acceleration = Vec3::ZERO;
        self.forward = heading_or_default(self.forward);
        Err(AgentError::InvalidKinematics(self.id))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::game::faction::FactionTable;
    use crate::game::snapshot::Contact;
    use crate::game::types::Pose;
    use crate::util::rng::seeded;

    pub fn ship(id: u64, class: ShipClass, faction: Faction, position: Vec3) -> ShipState {
        ShipState {
            id: ShipId(id),
            class,
            faction,
            hull: 100.0,
            max_hull: 100.0,
            position: Some(position),
            velocity: Vec3::ZERO,
            forward: Vec3::Z,
            is_player: false,
        }
    }

    pub fn agent(id: u64, class: ShipClass, faction: Faction, position: Vec3) -> Agent {
        Agent::new(&ship(id, class, faction, position), AgentOptions::default(), 50, seeded(id), 0.0)
            .unwrap()
    }

    pub fn contact(id: u64, faction: Faction, position: Vec3, is_player: bool) -> Contact {
        let table = FactionTable::new();
        Contact {
            id: ShipId(id),
            class: ShipClass::LightFighter,
            position,
            velocity: Vec3::ZERO,
            faction,
            diplomacy: table.diplomacy(faction),
            is_player,
            hull_fraction: 1.0,
            destroyed: false,
        }
    }

    pub fn snapshot(contacts: Vec<Contact>) -> WorldSnapshot {
        WorldSnapshot::from_contacts(0.0, Pose::default(), contacts, &FactionTable::new())
    }
}
