//! Class profiles and the modifiers applied when an agent is created.

use serde::{Deserialize, Serialize};

use crate::game::constants::fsm::{EVADE_THRESHOLD, FLEE_THRESHOLD};
use crate::game::faction::Faction;
use crate::game::types::ShipClass;

/// Difficulty used when neither the caller nor the config sets one
pub const DEFAULT_DIFFICULTY: u8 = 50;

/// Movement and sensing parameters of an agent
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    /// Units per second
    pub max_speed: f32,
    /// Units per second squared
    pub max_force: f32,
    pub sensor_range: f32,
    pub engage_range: f32,
    pub communication_range: f32,
    /// Hull fraction below which the agent flees
    pub flee_threshold: f32,
    /// Hull fraction below which an engaged agent evades
    pub evade_threshold: f32,
}

/// Per-agent overrides accepted by `AiManager::add_agent`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentOptions {
    /// 1..=100; falls back to the manager's global difficulty
    pub difficulty: Option<u8>,
    /// Falls back to the faction reported by the host
    pub faction: Option<Faction>,
    pub sensor_range: Option<f32>,
    pub engage_range: Option<f32>,
    pub flee_threshold: Option<f32>,
}

impl AgentOptions {
    pub fn with_difficulty(mut self, difficulty: u8) -> Self {
        self.difficulty = Some(difficulty);
        self
    }

    pub fn with_faction(mut self, faction: Faction) -> Self {
        self.faction = Some(faction);
        self
    }

    pub fn with_ranges(mut self, sensor: f32, engage: f32) -> Self {
        self.sensor_range = Some(sensor);
        self.engage_range = Some(engage);
        self
    }

    pub fn with_flee_threshold(mut self, threshold: f32) -> Self {
        self.flee_threshold = Some(threshold);
        self
    }
}

/// Baseline profile of a ship class at difficulty 50
pub fn base_profile(class: ShipClass) -> AgentProfile {
    let (max_speed, max_force, sensor_range, engage_range, communication_range) = match class {
        ShipClass::Scout => (0.40, 0.60, 12.0, 3.0, 15.0),
        ShipClass::LightFighter => (0.30, 0.50, 8.0, 2.5, 10.0),
        ShipClass::HeavyFighter => (0.22, 0.35, 8.0, 3.0, 10.0),
        ShipClass::Carrier => (0.12, 0.15, 15.0, 6.0, 20.0),
        ShipClass::Freighter => (0.15, 0.20, 6.0, 1.5, 8.0),
        ShipClass::HeavyFreighter => (0.10, 0.12, 6.0, 1.5, 8.0),
    };
    AgentProfile {
        max_speed,
        max_force,
        sensor_range,
        engage_range,
        communication_range,
        flee_threshold: FLEE_THRESHOLD,
        evade_threshold: EVADE_THRESHOLD,
    }
}

/// Clamp a difficulty into 1..=100
pub fn clamp_difficulty(difficulty: u8) -> u8 {
    difficulty.clamp(1, 100)
}

/// Scale a profile by difficulty. 50 leaves it unchanged; higher values are
/// faster and flee later.
fn apply_difficulty(profile: &mut AgentProfile, difficulty: u8) {
    let d = f32::from(clamp_difficulty(difficulty)) / 100.0;
    let scale = 0.5 + d;
    let threshold_scale = 1.5 - d;

    profile.max_speed *= scale;
    profile.max_force *= scale;
    profile.sensor_range *= 0.8 + 0.4 * d;
    profile.flee_threshold *= threshold_scale;
    profile.evade_threshold *= threshold_scale;
}

fn apply_faction(profile: &mut AgentProfile, faction: Faction) {
    match faction {
        Faction::Pirates => profile.max_speed *= 1.1,
        Faction::Federation => profile.sensor_range *= 1.2,
        Faction::Empire => profile.max_force *= 1.1,
        Faction::FreeTraders => {
            profile.flee_threshold += 0.1;
            profile.evade_threshold += 0.1;
        }
        Faction::MiningGuild => profile.communication_range *= 1.25,
        Faction::Neutral => {}
    }
}

/// Final profile for an agent: class baseline, difficulty, faction, then
/// explicit overrides.
pub fn build_profile(
    class: ShipClass,
    faction: Faction,
    difficulty: u8,
    options: &AgentOptions,
) -> AgentProfile {
    let mut profile = base_profile(class);
    apply_difficulty(&mut profile, difficulty);
    apply_faction(&mut profile, faction);

    if let Some(sensor) = options.sensor_range.filter(|r| r.is_finite() && *r > 0.0) {
        profile.sensor_range = sensor;
    }
    if let Some(engage) = options.engage_range.filter(|r| r.is_finite() && *r > 0.0) {
        profile.engage_range = engage;
    }
    if let Some(flee) = options.flee_threshold.filter(|t| t.is_finite()) {
        profile.flee_threshold = flee;
    }

    profile.flee_threshold = profile.flee_threshold.clamp(0.0, 1.0);
    profile.evade_threshold = profile.evade_threshold.clamp(profile.flee_threshold, 1.0);
    profile
}
