//! Five-state combat state machine.
//!
//! Transitions are evaluated before behaviors so the behavior of a newly
//! entered state runs in the same update. At most one transition fires per
//! update; the checks below run in table order and the first match wins.

use glam::Vec3;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::game::agent::Agent;
use crate::game::constants::fsm::*;
use crate::game::snapshot::WorldSnapshot;
use crate::game::types::{ShipClass, ShipId};
use crate::util::math::{brake, flee, heading_or_default, right_of, seek};
use crate::util::rng::patrol_direction;

/// Behavior state of an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiState {
    Idle,
    Engage,
    Evade,
    Flee,
    Buzz,
}

impl AiState {
    pub const ALL: [AiState; 5] = [
        AiState::Idle,
        AiState::Engage,
        AiState::Evade,
        AiState::Flee,
        AiState::Buzz,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            AiState::Idle => "idle",
            AiState::Engage => "engage",
            AiState::Evade => "evade",
            AiState::Flee => "flee",
            AiState::Buzz => "buzz",
        }
    }

    /// States that warrant a distress call when entered
    pub fn is_combat(&self) -> bool {
        matches!(self, AiState::Engage | AiState::Evade)
    }
}

/// A scout's inspection of a neutral contact
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BuzzPlan {
    pub contact: ShipId,
    pub radius: f32,
    pub until_ms: f64,
    pub hull_at_start: f32,
}

/// Per-state working data
#[derive(Debug, Clone)]
pub struct StateScratch {
    pub patrol_dir: Vec3,
    pub next_patrol_ms: f64,
    pub flee_dir: Vec3,
    pub buzz: Option<BuzzPlan>,
    /// +1 or -1, side of the target a fighter strafes around
    pub strafe_sign: f32,
}

impl Default for StateScratch {
    fn default() -> Self {
        Self {
            patrol_dir: Vec3::ZERO,
            next_patrol_ms: 0.0,
            flee_dir: Vec3::ZERO,
            buzz: None,
            strafe_sign: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StateMachine {
    state: AiState,
    previous: Option<AiState>,
    entered_ms: f64,
    pub scratch: StateScratch,
}

impl StateMachine {
    pub fn new(now_ms: f64) -> Self {
        Self {
            state: AiState::Idle,
            previous: None,
            entered_ms: now_ms,
            scratch: StateScratch::default(),
        }
    }

    pub fn state(&self) -> AiState {
        self.state
    }

    pub fn previous(&self) -> Option<AiState> {
        self.previous
    }

    pub fn entered_ms(&self) -> f64 {
        self.entered_ms
    }

    pub fn time_in_state(&self, now_ms: f64) -> f64 {
        now_ms - self.entered_ms
    }
}

/// A state change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: AiState,
    pub to: AiState,
}

/// What one evaluation produced
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FsmOutcome {
    pub transition: Option<Transition>,
    pub left_world: bool,
}

enum Next {
    Stay,
    Go(AiState, Option<ShipId>),
    LeaveWorld,
}

/// Evaluate transitions, then add the current behavior's steering to the
/// agent's acceleration when `steer` is set.
pub fn update(agent: &mut Agent, snapshot: &WorldSnapshot, now_ms: f64, steer: bool) -> FsmOutcome {
    let mut outcome = FsmOutcome::default();

    match next_state(agent, snapshot, now_ms) {
        Next::Stay => {}
        Next::Go(to, target) => {
            outcome.transition = Some(enter(agent, to, target, now_ms));
        }
        Next::LeaveWorld => outcome.left_world = true,
    }

    if steer && !outcome.left_world {
        let force = behavior_force(agent, snapshot, now_ms);
        agent.acceleration += force;
    }

    outcome
}

/// Switch state unconditionally, running the entry actions
pub fn force_state(agent: &mut Agent, state: AiState, now_ms: f64) -> Option<Transition> {
    if agent.fsm.state == state {
        return None;
    }
    let target = match state {
        AiState::Engage | AiState::Evade => agent
            .target
            .or_else(|| agent.sensors.threats.first().map(|c| c.id)),
        AiState::Buzz => agent.sensors.neutrals.first().map(|c| c.id),
        AiState::Idle | AiState::Flee => None,
    };
    Some(enter(agent, state, target, now_ms))
}

fn under_heavy_fire(agent: &Agent) -> bool {
    let threats = agent.sensors.threats.len();
    threats > 1 || (threats > 0 && agent.hull_fraction() < agent.profile.evade_threshold)
}

fn target_lost(agent: &Agent, snapshot: &WorldSnapshot) -> bool {
    let Some(id) = agent.target else {
        return true;
    };
    let limit = agent.profile.sensor_range * LOSE_TARGET_FACTOR;
    snapshot
        .contact(id)
        .map_or(true, |c| c.destroyed || c.position.distance(agent.position) > limit)
}

fn hostile_within(agent: &Agent, snapshot: &WorldSnapshot, range: f32) -> bool {
    snapshot.contacts().iter().any(|c| {
        c.id != agent.id
            && snapshot.is_hostile(agent.faction, c)
            && c.position.distance(agent.position) <= range
    })
}

fn next_state(agent: &Agent, snapshot: &WorldSnapshot, now_ms: f64) -> Next {
    let hull = agent.hull_fraction();
    let state = agent.fsm.state;

    // Combat states break off on hull alone; calm states need something to run from
    let fleeing = hull < agent.profile.flee_threshold
        && match state {
            AiState::Engage | AiState::Evade => true,
            AiState::Idle | AiState::Buzz => !agent.sensors.threats.is_empty(),
            AiState::Flee => false,
        };
    if fleeing {
        return Next::Go(AiState::Flee, None);
    }

    match state {
        AiState::Idle => {
            if let Some(nearest) = agent.sensors.threats.first() {
                return Next::Go(AiState::Engage, Some(nearest.id));
            }
            if agent.class == ShipClass::Scout {
                if let Some(neutral) = agent.sensors.neutrals.first() {
                    return Next::Go(AiState::Buzz, Some(neutral.id));
                }
            }
            Next::Stay
        }
        AiState::Engage => {
            if target_lost(agent, snapshot) {
                Next::Go(AiState::Idle, None)
            } else if under_heavy_fire(agent) {
                Next::Go(AiState::Evade, agent.target)
            } else {
                Next::Stay
            }
        }
        AiState::Evade => {
            if target_lost(agent, snapshot) {
                Next::Go(AiState::Idle, None)
            } else if !under_heavy_fire(agent) {
                Next::Go(AiState::Engage, agent.target)
            } else {
                Next::Stay
            }
        }
        AiState::Flee => {
            if agent.class == ShipClass::Carrier && hull < CARRIER_WARP_HULL {
                return Next::LeaveWorld;
            }
            let safe_range = agent.profile.sensor_range * LOSE_TARGET_FACTOR;
            if hull >= RECOVER_HULL && !hostile_within(agent, snapshot, safe_range) {
                Next::Go(AiState::Idle, None)
            } else {
                Next::Stay
            }
        }
        AiState::Buzz => {
            let Some(plan) = agent.fsm.scratch.buzz else {
                return Next::Go(AiState::Idle, None);
            };
            if hull < plan.hull_at_start - 1e-4 {
                // The inspected contact is not hostile, so an unseen attacker means break off
                return match agent.sensors.threats.first() {
                    Some(attacker) => Next::Go(AiState::Engage, Some(attacker.id)),
                    None => Next::Go(AiState::Idle, None),
                };
            }
            let gone = snapshot.contact(plan.contact).map_or(true, |c| c.destroyed);
            if gone || now_ms >= plan.until_ms {
                Next::Go(AiState::Idle, None)
            } else {
                Next::Stay
            }
        }
    }
}

fn sensed_position(agent: &Agent, id: ShipId) -> Option<Vec3> {
    agent
        .sensors
        .threats
        .iter()
        .chain(agent.sensors.neutrals.iter())
        .find(|c| c.id == id)
        .map(|c| c.position)
}

fn enter(agent: &mut Agent, to: AiState, target: Option<ShipId>, now_ms: f64) -> Transition {
    let from = agent.fsm.state;
    agent.fsm.previous = Some(from);
    agent.fsm.state = to;
    agent.fsm.entered_ms = now_ms;

    match to {
        AiState::Idle => {
            agent.target = None;
            agent.last_known_target = None;
            agent.fsm.scratch.buzz = None;
            agent.fsm.scratch.next_patrol_ms = now_ms;
        }
        AiState::Engage | AiState::Evade => {
            if let Some(id) = target {
                if agent.target != Some(id) {
                    agent.last_known_target = sensed_position(agent, id);
                }
                agent.target = Some(id);
            }
            if to == AiState::Engage && from != AiState::Evade {
                agent.fsm.scratch.strafe_sign = if agent.rng.gen_bool(0.5) { 1.0 } else { -1.0 };
            }
        }
        AiState::Flee => {
            agent.target = None;
            agent.last_known_target = None;
            agent.fsm.scratch.flee_dir = flee_vector(agent);
        }
        AiState::Buzz => {
            agent.fsm.scratch.buzz = target.map(|contact| BuzzPlan {
                contact,
                radius: agent.rng.gen_range(BUZZ_RADIUS_MIN..BUZZ_RADIUS_MAX),
                until_ms: now_ms + agent.rng.gen_range(BUZZ_MIN_MS..BUZZ_MAX_MS),
                hull_at_start: agent.hull_fraction(),
            });
        }
    }

    Transition { from, to }
}

/// Unit vector away from every sensed threat
fn flee_vector(agent: &Agent) -> Vec3 {
    let towards: Vec3 = agent
        .sensors
        .threats
        .iter()
        .map(|c| (c.position - agent.position).normalize_or_zero())
        .sum();
    (-towards).normalize_or_zero()
}

/// Current target position, refreshing the last known position
fn target_position(agent: &mut Agent, snapshot: &WorldSnapshot) -> Option<Vec3> {
    let id = agent.target?;
    if let Some(contact) = snapshot.contact(id).filter(|c| !c.destroyed) {
        agent.last_known_target = Some(contact.position);
    }
    agent.last_known_target
}

fn behavior_force(agent: &mut Agent, snapshot: &WorldSnapshot, now_ms: f64) -> Vec3 {
    match agent.fsm.state {
        AiState::Idle => idle_force(agent, now_ms),
        AiState::Engage => engage_force(agent, snapshot, now_ms),
        AiState::Evade => evade_force(agent, snapshot),
        AiState::Flee => flee_force(agent),
        AiState::Buzz => buzz_force(agent, snapshot),
    }
}

fn idle_force(agent: &mut Agent, now_ms: f64) -> Vec3 {
    if agent.slot_target.is_some() {
        return Vec3::ZERO;
    }

    if let Some(waypoint) = agent.waypoint {
        if agent.position.distance(waypoint) <= WAYPOINT_ARRIVAL {
            return brake(agent.velocity);
        }
        return seek(agent.position, agent.velocity, waypoint, agent.profile.max_speed);
    }

    if now_ms >= agent.fsm.scratch.next_patrol_ms || agent.fsm.scratch.patrol_dir == Vec3::ZERO {
        agent.fsm.scratch.patrol_dir = patrol_direction(&mut agent.rng);
        agent.fsm.scratch.next_patrol_ms = now_ms + agent.rng.gen_range(PATROL_MIN_MS..PATROL_MAX_MS);
    }

    let desired = agent.fsm.scratch.patrol_dir * agent.profile.max_speed * PATROL_SPEED;
    desired - agent.velocity
}

fn engage_force(agent: &mut Agent, snapshot: &WorldSnapshot, now_ms: f64) -> Vec3 {
    let Some(target) = target_position(agent, snapshot) else {
        return Vec3::ZERO;
    };
    let position = agent.position;
    let velocity = agent.velocity;
    let max_speed = agent.profile.max_speed;
    let engage_range = agent.profile.engage_range;
    let to_target = target - position;
    let distance = to_target.length();

    match agent.class {
        ShipClass::Scout => {
            let phase = (agent.fsm.time_in_state(now_ms).max(0.0) / SCOUT_PHASE_MS) as u64;
            if phase % 2 == 0 {
                seek(position, velocity, target, max_speed)
            } else {
                flee(position, velocity, target, max_speed)
            }
        }
        ShipClass::LightFighter | ShipClass::HeavyFighter => {
            let optimal = (engage_range * FIGHTER_OPTIMAL_RANGE).max(1e-3);
            let radial = to_target.normalize_or_zero();
            let tangent = right_of(radial) * agent.fsm.scratch.strafe_sign;
            let radial_gain = ((distance - optimal) / optimal).clamp(-1.0, 1.0);
            let desired = (radial * radial_gain + tangent).normalize_or_zero() * max_speed;
            desired - velocity
        }
        ShipClass::Carrier => {
            let standoff = engage_range * CARRIER_STANDOFF;
            if distance < standoff * 0.9 {
                flee(position, velocity, target, max_speed)
            } else if distance > standoff * 1.1 {
                seek(position, velocity, target, max_speed)
            } else {
                brake(velocity)
            }
        }
        ShipClass::Freighter | ShipClass::HeavyFreighter => {
            if distance > engage_range * PURSUIT_RANGE {
                seek(position, velocity, target, max_speed)
            } else {
                brake(velocity)
            }
        }
    }
}

fn evade_force(agent: &mut Agent, snapshot: &WorldSnapshot) -> Vec3 {
    let mut repulsion = Vec3::ZERO;
    for threat in &agent.sensors.threats {
        let away = agent.position - threat.position;
        let d2 = away.length_squared().max(0.01);
        repulsion += away.normalize_or_zero() / d2;
    }

    let mut force = match repulsion.try_normalize() {
        Some(dir) => dir * agent.profile.max_speed - agent.velocity,
        None => Vec3::ZERO,
    };

    if let Some(target) = target_position(agent, snapshot) {
        if agent.position.distance(target) <= agent.profile.engage_range * EVADE_PURSUIT_RANGE {
            force += seek(agent.position, agent.velocity, target, agent.profile.max_speed)
                * EVADE_PURSUIT_WEIGHT;
        }
    }
    force
}

fn flee_force(agent: &mut Agent) -> Vec3 {
    agent.target = None;
    if !agent.sensors.threats.is_empty() {
        let dir = flee_vector(agent);
        if dir != Vec3::ZERO {
            agent.fsm.scratch.flee_dir = dir;
        }
    }
    if agent.fsm.scratch.flee_dir == Vec3::ZERO {
        agent.fsm.scratch.flee_dir = heading_or_default(agent.forward);
    }
    agent.fsm.scratch.flee_dir * agent.profile.max_speed - agent.velocity
}

fn buzz_force(agent: &mut Agent, snapshot: &WorldSnapshot) -> Vec3 {
    let Some(plan) = agent.fsm.scratch.buzz else {
        return Vec3::ZERO;
    };
    let Some(contact) = snapshot.contact(plan.contact) else {
        return Vec3::ZERO;
    };

    let offset = agent.position - contact.position;
    let distance = offset.length();
    let max_speed = agent.profile.max_speed;

    if distance > plan.radius * 1.2 {
        seek(agent.position, agent.velocity, contact.position, max_speed)
    } else if distance < plan.radius * 0.8 {
        flee(agent.position, agent.velocity, contact.position, max_speed)
    } else {
        let tangent = right_of(offset.normalize_or_zero());
        let desired = tangent * max_speed * 0.5 + contact.velocity;
        desired - agent.velocity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::agent::test_support::*;
    use crate::game::faction::Faction;
    use crate::game::performance::UpdateDepth;
    use crate::game::snapshot::Contact;

    const DT: f32 = 1.0 / 60.0;

    fn player_at(x: f32) -> Contact {
        contact(100, Faction::Federation, Vec3::new(x, 0.0, 0.0), true)
    }

    fn step(agent: &mut Agent, snap: &WorldSnapshot, now: f64) {
        agent.update(snap, UpdateDepth::Full, DT, now).unwrap();
    }

    // ========================================================================
    // Transition table
    // ========================================================================

    #[test]
    fn test_idle_to_engage_nearest_hostile() {
        let mut a = agent(1, ShipClass::HeavyFighter, Faction::Pirates, Vec3::ZERO);
        let snap = snapshot(vec![
            player_at(5.0),
            contact(7, Faction::FreeTraders, Vec3::new(2.0, 0.0, 0.0), false),
        ]);
        step(&mut a, &snap, 0.0);
        assert_eq!(a.state(), AiState::Engage);
        assert_eq!(a.target, Some(ShipId(7)));
        assert_eq!(a.fsm.previous(), Some(AiState::Idle));
    }

    #[test]
    fn test_engage_to_evade_under_heavy_fire_and_back() {
        let mut a = agent(1, ShipClass::HeavyFighter, Faction::Pirates, Vec3::ZERO);
        let two = snapshot(vec![
            player_at(2.0),
            contact(7, Faction::FreeTraders, Vec3::new(0.0, 0.0, 3.0), false),
        ]);
        step(&mut a, &two, 0.0);
        assert_eq!(a.state(), AiState::Engage);
        step(&mut a, &two, 16.0);
        assert_eq!(a.state(), AiState::Evade);

        let one = snapshot(vec![player_at(2.0)]);
        step(&mut a, &one, 32.0);
        assert_eq!(a.state(), AiState::Engage);
        assert_eq!(a.target, Some(ShipId(100)));
    }

    #[test]
    fn test_low_hull_single_threat_evades() {
        let mut a = agent(1, ShipClass::LightFighter, Faction::Pirates, Vec3::ZERO);
        let snap = snapshot(vec![player_at(2.0)]);
        step(&mut a, &snap, 0.0);
        a.hull = 40.0;
        step(&mut a, &snap, 16.0);
        assert_eq!(a.state(), AiState::Evade);
    }

    #[test]
    fn test_engage_to_idle_when_target_gone() {
        let mut a = agent(1, ShipClass::LightFighter, Faction::Pirates, Vec3::ZERO);
        step(&mut a, &snapshot(vec![player_at(2.0)]), 0.0);
        assert_eq!(a.state(), AiState::Engage);
        step(&mut a, &snapshot(Vec::new()), 16.0);
        assert_eq!(a.state(), AiState::Idle);
        assert_eq!(a.target, None);
    }

    #[test]
    fn test_engage_keeps_target_inside_lose_range() {
        let mut a = agent(1, ShipClass::LightFighter, Faction::Pirates, Vec3::ZERO);
        step(&mut a, &snapshot(vec![player_at(2.0)]), 0.0);
        // beyond sensor range but inside 1.5x sensor range
        let sensor = a.profile.sensor_range;
        step(&mut a, &snapshot(vec![player_at(sensor * 1.3)]), 16.0);
        assert_eq!(a.state(), AiState::Engage);
        step(&mut a, &snapshot(vec![player_at(sensor * 1.6)]), 32.0);
        assert_eq!(a.state(), AiState::Idle);
    }

    #[test]
    fn test_flee_invariant_from_every_state() {
        for start in AiState::ALL {
            let mut a = agent(1, ShipClass::LightFighter, Faction::Pirates, Vec3::ZERO);
            let snap = snapshot(vec![
                player_at(1.0),
                contact(5, Faction::Neutral, Vec3::new(0.0, 0.0, 1.0), false),
            ]);
            step(&mut a, &snap, 0.0);
            a.force_state(start, 16.0);
            a.hull = 10.0;
            step(&mut a, &snap, 32.0);
            assert_eq!(a.state(), AiState::Flee, "from {:?}", start);
            assert_eq!(a.target, None);
        }
    }

    #[test]
    fn test_engaged_at_low_hull_flees_with_target_past_sensors() {
        let mut a = agent(1, ShipClass::LightFighter, Faction::Pirates, Vec3::ZERO);
        step(&mut a, &snapshot(vec![player_at(1.0)]), 0.0);
        assert_eq!(a.state(), AiState::Engage);

        // Target drifts out of sensors but stays inside the lose range
        a.hull = 10.0;
        let drifted = snapshot(vec![player_at(a.profile.sensor_range * 1.3)]);
        step(&mut a, &drifted, 16.0);
        step(&mut a, &drifted, 32.0);
        assert!(a.sensors.threats.is_empty());
        assert_eq!(a.state(), AiState::Flee);
        assert_eq!(a.target, None);
    }

    #[test]
    fn test_evading_at_low_hull_flees_without_threats() {
        let mut a = agent(1, ShipClass::HeavyFighter, Faction::Pirates, Vec3::ZERO);
        step(&mut a, &snapshot(vec![player_at(2.0)]), 0.0);
        a.force_state(AiState::Evade, 16.0);
        a.target = Some(ShipId(100));
        a.hull = 10.0;
        let far = a.profile.sensor_range * 1.2;
        step(&mut a, &snapshot(vec![player_at(far)]), 32.0);
        assert_eq!(a.state(), AiState::Flee);
    }

    #[test]
    fn test_idle_at_low_hull_stays_idle_without_threats() {
        let mut a = agent(1, ShipClass::LightFighter, Faction::Pirates, Vec3::ZERO);
        a.hull = 10.0;
        step(&mut a, &snapshot(Vec::new()), 0.0);
        assert_eq!(a.state(), AiState::Idle);
    }

    #[test]
    fn test_flee_recovers_when_safe() {
        let mut a = agent(1, ShipClass::LightFighter, Faction::Pirates, Vec3::ZERO);
        a.hull = 10.0;
        step(&mut a, &snapshot(vec![player_at(1.0)]), 0.0);
        assert_eq!(a.state(), AiState::Flee);

        // safe but still damaged
        step(&mut a, &snapshot(Vec::new()), 16.0);
        assert_eq!(a.state(), AiState::Flee);

        a.hull = 45.0;
        let sensor = a.profile.sensor_range;
        step(&mut a, &snapshot(vec![player_at(sensor * 1.4)]), 32.0);
        assert_eq!(a.state(), AiState::Flee, "hostile still inside safe range");
        step(&mut a, &snapshot(vec![player_at(sensor * 2.0)]), 48.0);
        assert_eq!(a.state(), AiState::Idle);
    }

    #[test]
    fn test_flee_moves_away_from_threats() {
        let mut a = agent(1, ShipClass::LightFighter, Faction::Pirates, Vec3::ZERO);
        a.hull = 10.0;
        let snap = snapshot(vec![player_at(1.0)]);
        for i in 0..120 {
            step(&mut a, &snap, i as f64 * 16.0);
        }
        assert!(a.position.x < 0.0);
    }

    #[test]
    fn test_carrier_leaves_world() {
        let mut a = agent(1, ShipClass::Carrier, Faction::Pirates, Vec3::ZERO);
        a.hull = 15.0;
        let snap = snapshot(vec![player_at(3.0)]);
        let tick = a.update(&snap, UpdateDepth::Full, DT, 0.0).unwrap();
        assert_eq!(a.state(), AiState::Flee);
        assert!(!tick.left_world);
        let tick = a.update(&snap, UpdateDepth::Full, DT, 16.0).unwrap();
        assert!(tick.left_world);
        assert!(a.departed);
    }

    #[test]
    fn test_fighter_flees_without_leaving() {
        let mut a = agent(1, ShipClass::HeavyFighter, Faction::Pirates, Vec3::ZERO);
        a.hull = 15.0;
        let snap = snapshot(vec![player_at(3.0)]);
        for i in 0..5 {
            let tick = a.update(&snap, UpdateDepth::Full, DT, i as f64 * 16.0).unwrap();
            assert!(!tick.left_world);
        }
    }

    #[test]
    fn test_scout_buzzes_neutral_then_returns_to_idle() {
        let mut a = agent(1, ShipClass::Scout, Faction::Empire, Vec3::ZERO);
        let snap = snapshot(vec![contact(5, Faction::MiningGuild, Vec3::new(2.0, 0.0, 0.0), false)]);
        step(&mut a, &snap, 0.0);
        assert_eq!(a.state(), AiState::Buzz);
        let plan = a.fsm.scratch.buzz.unwrap();
        assert_eq!(plan.contact, ShipId(5));
        assert!(plan.radius >= BUZZ_RADIUS_MIN && plan.radius < BUZZ_RADIUS_MAX);
        assert!(plan.until_ms >= BUZZ_MIN_MS && plan.until_ms < BUZZ_MAX_MS);

        step(&mut a, &snap, plan.until_ms - 1.0);
        assert_eq!(a.state(), AiState::Buzz);
        step(&mut a, &snap, plan.until_ms);
        assert_eq!(a.state(), AiState::Idle);
    }

    #[test]
    fn test_buzz_to_engage_when_hit() {
        let mut a = agent(1, ShipClass::Scout, Faction::Empire, Vec3::ZERO);
        let snap = snapshot(vec![contact(5, Faction::MiningGuild, Vec3::new(2.0, 0.0, 0.0), false)]);
        step(&mut a, &snap, 0.0);
        assert_eq!(a.state(), AiState::Buzz);

        // Attacker shows up on sensors as the hull drops
        let attacked = snapshot(vec![
            contact(5, Faction::MiningGuild, Vec3::new(2.0, 0.0, 0.0), false),
            contact(9, Faction::Pirates, Vec3::new(0.0, 0.0, 3.0), false),
        ]);
        a.hull = 80.0;
        step(&mut a, &attacked, 16.0);
        assert_eq!(a.state(), AiState::Engage);
        assert_eq!(a.target, Some(ShipId(9)));
    }

    #[test]
    fn test_buzz_hit_by_unseen_attacker_breaks_off() {
        let mut a = agent(1, ShipClass::Scout, Faction::Empire, Vec3::ZERO);
        let snap = snapshot(vec![contact(5, Faction::MiningGuild, Vec3::new(2.0, 0.0, 0.0), false)]);
        step(&mut a, &snap, 0.0);
        assert_eq!(a.state(), AiState::Buzz);
        a.hull = 80.0;
        step(&mut a, &snap, 16.0);
        assert_eq!(a.state(), AiState::Idle);
        assert_eq!(a.target, None);
    }

    #[test]
    fn test_non_scouts_do_not_buzz() {
        let mut a = agent(1, ShipClass::LightFighter, Faction::Empire, Vec3::ZERO);
        let snap = snapshot(vec![contact(5, Faction::MiningGuild, Vec3::new(2.0, 0.0, 0.0), false)]);
        step(&mut a, &snap, 0.0);
        assert_eq!(a.state(), AiState::Idle);
    }

    // ========================================================================
    // Behaviors
    // ========================================================================

    #[test]
    fn test_idle_patrol_is_slow() {
        let mut a = agent(1, ShipClass::LightFighter, Faction::Neutral, Vec3::ZERO);
        let snap = snapshot(Vec::new());
        for i in 0..300 {
            step(&mut a, &snap, i as f64 * 16.0);
        }
        assert!(a.velocity.length() > 0.0);
        assert!(a.velocity.length() <= a.profile.max_speed * PATROL_SPEED + 1e-3);
    }

    #[test]
    fn test_idle_holding_slot_adds_no_force() {
        let mut a = agent(1, ShipClass::LightFighter, Faction::Neutral, Vec3::ZERO);
        a.slot_target = Some(Vec3::new(5.0, 0.0, 0.0));
        step(&mut a, &snapshot(Vec::new()), 0.0);
        assert_eq!(a.velocity, Vec3::ZERO);
    }

    #[test]
    fn test_scout_hit_and_run_phases() {
        let mut a = agent(1, ShipClass::Scout, Faction::Pirates, Vec3::ZERO);
        let snap = snapshot(vec![player_at(4.0)]);
        step(&mut a, &snap, 0.0);
        assert_eq!(a.state(), AiState::Engage);
        assert!(a.velocity.x > 0.0, "approach phase closes in");

        a.velocity = Vec3::ZERO;
        step(&mut a, &snap, SCOUT_PHASE_MS + 10.0);
        assert!(a.velocity.x < 0.0, "retreat phase opens range");
    }

    #[test]
    fn test_fighter_circle_strafes() {
        let mut a = agent(1, ShipClass::LightFighter, Faction::Pirates, Vec3::ZERO);
        let snap = snapshot(vec![player_at(1.0)]);
        for i in 0..30 {
            step(&mut a, &snap, i as f64 * 16.0);
        }
        assert_eq!(a.state(), AiState::Engage);
        assert!(a.velocity.z.abs() > 0.0, "strafing moves sideways");
    }

    #[test]
    fn test_carrier_holds_standoff() {
        let mut a = agent(1, ShipClass::Carrier, Faction::Pirates, Vec3::ZERO);
        let close = a.profile.engage_range;
        let snap = snapshot(vec![player_at(close)]);
        step(&mut a, &snap, 0.0);
        assert!(a.velocity.x < 0.0, "carrier backs off inside its standoff");
    }

    #[test]
    fn test_state_machine_is_deterministic() {
        let run = || {
            let mut a = agent(1, ShipClass::Scout, Faction::Pirates, Vec3::ZERO);
            let mut states = Vec::new();
            for i in 0..400 {
                let x = 3.0 + (i as f32 * 0.05).sin() * 2.0;
                let mut contacts = vec![player_at(x)];
                if i % 50 < 10 {
                    contacts.push(contact(7, Faction::FreeTraders, Vec3::new(0.0, 0.0, 2.0), false));
                }
                if i == 200 {
                    a.hull = 10.0;
                }
                a.update(&snapshot(contacts), UpdateDepth::Full, DT, i as f64 * 16.0)
                    .unwrap();
                states.push((a.state(), a.target, a.position));
            }
            states
        };
        assert_eq!(run(), run());
    }
}
