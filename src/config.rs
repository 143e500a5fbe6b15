use std::str::FromStr;

use serde::Serialize;

use crate::game::constants::{ambient, budget};
use crate::game::flocking::FlockingConfig;
use crate::game::performance::PerformanceConfig;

/// Relative spawn weights of the ambient group behaviors
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BehaviorWeights {
    pub trade_convoy: f32,
    pub patrol: f32,
    pub raider: f32,
    pub exploration: f32,
    pub diplomatic_escort: f32,
    pub mining_operation: f32,
}

impl BehaviorWeights {
    pub fn as_array(&self) -> [f32; 6] {
        [
            self.trade_convoy,
            self.patrol,
            self.raider,
            self.exploration,
            self.diplomatic_escort,
            self.mining_operation,
        ]
    }

    pub fn total(&self) -> f32 {
        self.as_array().iter().sum()
    }

    /// Only raiders spawn
    pub fn raiders_only() -> Self {
        Self {
            trade_convoy: 0.0,
            patrol: 0.0,
            raider: 1.0,
            exploration: 0.0,
            diplomatic_escort: 0.0,
            mining_operation: 0.0,
        }
    }
}

impl Default for BehaviorWeights {
    fn default() -> Self {
        Self {
            trade_convoy: 0.30,
            patrol: 0.20,
            raider: 0.20,
            exploration: 0.10,
            diplomatic_escort: 0.05,
            mining_operation: 0.15,
        }
    }
}

/// Ambient traffic configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AmbientConfig {
    /// Cap on live ambient ships (members, not groups)
    pub max_ships: usize,
    pub spawn_interval_ms: f64,
    pub spawn_radius: f32,
    pub despawn_radius: f32,
    pub communication_interval_ms: f64,
    pub weights: BehaviorWeights,
}

impl Default for AmbientConfig {
    fn default() -> Self {
        Self {
            max_ships: ambient::MAX_AMBIENT_SHIPS,
            spawn_interval_ms: ambient::SPAWN_INTERVAL_MS,
            spawn_radius: ambient::SPAWN_RADIUS,
            despawn_radius: ambient::DESPAWN_RADIUS,
            communication_interval_ms: ambient::COMMUNICATION_INTERVAL_MS,
            weights: BehaviorWeights::default(),
        }
    }
}

/// AI tier configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AiConfig {
    /// Registry capacity
    pub max_agents: usize,
    /// Difficulty for agents added without an explicit one (1-100)
    pub global_difficulty: u8,
    /// Root seed for every random stream
    pub seed: u64,
    /// Per-agent transition logging and per-frame budget reports
    pub debug: bool,
    pub performance: PerformanceConfig,
    pub flocking: FlockingConfig,
    pub ambient: AmbientConfig,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            max_agents: 256,
            global_difficulty: 50,
            seed: 0x5EED_F1EE7,
            debug: false,
            performance: PerformanceConfig::default(),
            flocking: FlockingConfig::default(),
            ambient: AmbientConfig::default(),
        }
    }
}

/// Parse an environment variable, warning and returning `None` when it is
/// set but unparsable
fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Invalid {} '{}', using default", name, raw);
            None
        }
    }
}

fn env_flag(name: &str) -> Option<bool> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            tracing::warn!("Invalid {} '{}', expected true/false", name, raw);
            None
        }
    }
}

/// Clamp a value into range, warning when it had to move
fn clamp_warn<T: PartialOrd + Copy + std::fmt::Display>(name: &str, value: T, min: T, max: T) -> T {
    if value < min {
        tracing::warn!("{} = {} below {}, clamping", name, value, min);
        min
    } else if value > max {
        tracing::warn!("{} = {} above {}, clamping", name, value, max);
        max
    } else {
        value
    }
}

fn finite_or(name: &str, value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        tracing::warn!("{} is not finite, using {}", name, fallback);
        fallback
    }
}

impl AiConfig {
    /// Load config from environment or use defaults. Out-of-range values are
    /// clamped.
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Some(v) = env_parse("AI_MAX_AGENTS") {
            config.max_agents = v;
        }
        if let Some(v) = env_parse("AI_DIFFICULTY") {
            config.global_difficulty = v;
        }
        if let Some(v) = env_parse("AI_SEED") {
            config.seed = v;
        }
        if let Some(v) = env_flag("AI_DEBUG") {
            config.debug = v;
        }

        let perf = &mut config.performance;
        for (i, name) in ["AI_LOD_HIGH_DISTANCE", "AI_LOD_MEDIUM_DISTANCE", "AI_LOD_LOW_DISTANCE"]
            .iter()
            .enumerate()
        {
            if let Some(v) = env_parse(name) {
                perf.lod_distances[i] = v;
            }
        }
        for (i, name) in [
            "AI_LOD_HIGH_INTERVAL_MS",
            "AI_LOD_MEDIUM_INTERVAL_MS",
            "AI_LOD_LOW_INTERVAL_MS",
            "AI_LOD_CULLED_INTERVAL_MS",
        ]
        .iter()
        .enumerate()
        {
            if let Some(v) = env_parse(name) {
                perf.lod_intervals_ms[i] = v;
            }
        }
        if let Some(v) = env_parse("AI_MAX_UPDATES_PER_FRAME") {
            perf.max_updates_per_frame = v;
        }
        if let Some(v) = env_parse("AI_UPDATE_BUDGET_MS") {
            perf.update_budget_ms = v;
        }
        if let Some(v) = env_flag("AI_ADAPTIVE") {
            perf.adaptive = v;
        }

        let flock = &mut config.flocking;
        let flock_vars: [(&str, &mut f32); 10] = [
            ("AI_SEPARATION_WEIGHT", &mut flock.separation_weight),
            ("AI_ALIGNMENT_WEIGHT", &mut flock.alignment_weight),
            ("AI_COHESION_WEIGHT", &mut flock.cohesion_weight),
            ("AI_FORMATION_WEIGHT", &mut flock.formation_weight),
            ("AI_AVOIDANCE_WEIGHT", &mut flock.avoidance_weight),
            ("AI_SEPARATION_RADIUS", &mut flock.separation_radius),
            ("AI_ALIGNMENT_RADIUS", &mut flock.alignment_radius),
            ("AI_COHESION_RADIUS", &mut flock.cohesion_radius),
            ("AI_NEIGHBOR_RADIUS", &mut flock.neighbor_radius),
            ("AI_AVOIDANCE_MARGIN", &mut flock.avoidance_margin),
        ];
        for (name, slot) in flock_vars {
            if let Some(v) = env_parse(name) {
                *slot = v;
            }
        }
        if let Some(v) = env_parse("AI_FLOCK_REFRESH_MS") {
            flock.refresh_interval_ms = v;
        }

        let amb = &mut config.ambient;
        if let Some(v) = env_parse("AI_AMBIENT_MAX_SHIPS") {
            amb.max_ships = v;
        }
        if let Some(v) = env_parse("AI_SPAWN_INTERVAL_MS") {
            amb.spawn_interval_ms = v;
        }
        if let Some(v) = env_parse("AI_SPAWN_RADIUS") {
            amb.spawn_radius = v;
        }
        if let Some(v) = env_parse("AI_DESPAWN_RADIUS") {
            amb.despawn_radius = v;
        }
        if let Some(v) = env_parse("AI_COMMUNICATION_INTERVAL_MS") {
            amb.communication_interval_ms = v;
        }
        let weight_vars: [(&str, &mut f32); 6] = [
            ("AI_WEIGHT_TRADE_CONVOY", &mut amb.weights.trade_convoy),
            ("AI_WEIGHT_PATROL", &mut amb.weights.patrol),
            ("AI_WEIGHT_RAIDER", &mut amb.weights.raider),
            ("AI_WEIGHT_EXPLORATION", &mut amb.weights.exploration),
            ("AI_WEIGHT_DIPLOMATIC_ESCORT", &mut amb.weights.diplomatic_escort),
            ("AI_WEIGHT_MINING_OPERATION", &mut amb.weights.mining_operation),
        ];
        for (name, slot) in weight_vars {
            if let Some(v) = env_parse(name) {
                *slot = v;
            }
        }

        config.sanitized()
    }

    /// Clamp every option into its supported range
    pub fn sanitized(mut self) -> Self {
        self.max_agents = clamp_warn("max_agents", self.max_agents, 1, 4096);
        self.global_difficulty = clamp_warn("global_difficulty", self.global_difficulty, 1, 100);

        let perf = &mut self.performance;
        let defaults = PerformanceConfig::default();
        let mut floor = 0.1f32;
        for (i, d) in perf.lod_distances.iter_mut().enumerate() {
            let value = finite_or("lod_distance", *d, defaults.lod_distances[i]);
            *d = clamp_warn("lod_distance", value, floor, 10_000.0);
            floor = *d;
        }
        let mut floor = 1.0f64;
        for interval in perf.lod_intervals_ms.iter_mut() {
            let value = if interval.is_finite() { *interval } else { floor };
            *interval = clamp_warn("lod_interval_ms", value, floor, 60_000.0);
            floor = *interval;
        }
        perf.max_updates_per_frame = clamp_warn(
            "max_updates_per_frame",
            perf.max_updates_per_frame,
            budget::MIN_UPDATES_PER_FRAME,
            budget::MAX_UPDATES_CEILING,
        );
        if !perf.update_budget_ms.is_finite() {
            perf.update_budget_ms = budget::UPDATE_BUDGET_MS;
        }
        perf.update_budget_ms = clamp_warn("update_budget_ms", perf.update_budget_ms, 0.1, 100.0);

        let flock = &mut self.flocking;
        let fdef = FlockingConfig::default();
        flock.separation_weight = clamp_warn("separation_weight", finite_or("separation_weight", flock.separation_weight, fdef.separation_weight), 0.0, 10.0);
        flock.alignment_weight = clamp_warn("alignment_weight", finite_or("alignment_weight", flock.alignment_weight, fdef.alignment_weight), 0.0, 10.0);
        flock.cohesion_weight = clamp_warn("cohesion_weight", finite_or("cohesion_weight", flock.cohesion_weight, fdef.cohesion_weight), 0.0, 10.0);
        flock.formation_weight = clamp_warn("formation_weight", finite_or("formation_weight", flock.formation_weight, fdef.formation_weight), 0.0, 10.0);
        flock.avoidance_weight = clamp_warn("avoidance_weight", finite_or("avoidance_weight", flock.avoidance_weight, fdef.avoidance_weight), 0.0, 10.0);
        flock.separation_radius = clamp_warn("separation_radius", finite_or("separation_radius", flock.separation_radius, fdef.separation_radius), 0.01, 100.0);
        flock.alignment_radius = clamp_warn("alignment_radius", finite_or("alignment_radius", flock.alignment_radius, fdef.alignment_radius), 0.01, 100.0);
        flock.cohesion_radius = clamp_warn("cohesion_radius", finite_or("cohesion_radius", flock.cohesion_radius, fdef.cohesion_radius), 0.01, 100.0);
        flock.neighbor_radius = clamp_warn("neighbor_radius", finite_or("neighbor_radius", flock.neighbor_radius, fdef.neighbor_radius), 0.01, 100.0);
        flock.avoidance_margin = clamp_warn("avoidance_margin", finite_or("avoidance_margin", flock.avoidance_margin, fdef.avoidance_margin), 0.0, 100.0);
        if !flock.refresh_interval_ms.is_finite() {
            flock.refresh_interval_ms = fdef.refresh_interval_ms;
        }
        flock.refresh_interval_ms = clamp_warn("flock_refresh_ms", flock.refresh_interval_ms, 0.0, 10_000.0);

        let amb = &mut self.ambient;
        amb.max_ships = clamp_warn("ambient_max_ships", amb.max_ships, 0, self.max_agents);
        if !amb.spawn_interval_ms.is_finite() {
            amb.spawn_interval_ms = ambient::SPAWN_INTERVAL_MS;
        }
        amb.spawn_interval_ms = clamp_warn("spawn_interval_ms", amb.spawn_interval_ms, 100.0, 600_000.0);
        amb.spawn_radius = clamp_warn("spawn_radius", finite_or("spawn_radius", amb.spawn_radius, ambient::SPAWN_RADIUS), 1.0, 1_000.0);
        let min_despawn = amb.spawn_radius + ambient::RING_MAX_OFFSET + 1.0;
        amb.despawn_radius = clamp_warn(
            "despawn_radius",
            finite_or("despawn_radius", amb.despawn_radius, ambient::DESPAWN_RADIUS),
            min_despawn,
            10_000.0,
        );
        if !amb.communication_interval_ms.is_finite() {
            amb.communication_interval_ms = ambient::COMMUNICATION_INTERVAL_MS;
        }
        amb.communication_interval_ms = clamp_warn("communication_interval_ms", amb.communication_interval_ms, 0.0, 600_000.0);
        let w = &mut amb.weights;
        for (name, slot) in [
            ("weight_trade_convoy", &mut w.trade_convoy),
            ("weight_patrol", &mut w.patrol),
            ("weight_raider", &mut w.raider),
            ("weight_exploration", &mut w.exploration),
            ("weight_diplomatic_escort", &mut w.diplomatic_escort),
            ("weight_mining_operation", &mut w.mining_operation),
        ] {
            *slot = clamp_warn(name, finite_or(name, *slot, 0.0), 0.0, 100.0);
        }

        self
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if self.max_agents == 0 {
            return Err("max_agents must be at least 1".to_string());
        }
        if !(1..=100).contains(&self.global_difficulty) {
            return Err("global_difficulty must be 1-100".to_string());
        }
        let [high, medium, low] = self.performance.lod_distances;
        if !(high > 0.0 && high <= medium && medium <= low) {
            return Err("LOD distances must be positive and ascending".to_string());
        }
        if self.performance.lod_intervals_ms.windows(2).any(|w| w[0] > w[1]) {
            return Err("LOD intervals must not shrink with distance".to_string());
        }
        if self.performance.update_budget_ms <= 0.0 {
            return Err("update_budget_ms must be positive".to_string());
        }
        if self.flocking.separation_radius > self.flocking.neighbor_radius {
            return Err("separation_radius cannot exceed neighbor_radius".to_string());
        }
        if self.ambient.max_ships > self.max_agents {
            return Err("ambient max_ships cannot exceed max_agents".to_string());
        }
        if self.ambient.despawn_radius <= self.ambient.spawn_radius + ambient::RING_MAX_OFFSET {
            return Err("despawn_radius must lie beyond the spawn ring".to_string());
        }
        if self.ambient.max_ships > 0 && self.ambient.weights.total() <= 0.0 {
            return Err("at least one ambient behavior weight must be positive".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AiConfig::default();
        assert_eq!(config.max_agents, 256);
        assert_eq!(config.global_difficulty, 50);
        assert_eq!(config.performance.update_budget_ms, 4.0);
        assert_eq!(config.ambient.max_ships, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_or_default() {
        let config = AiConfig::load_or_default();
        assert!(config.max_agents > 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sanitized_clamps() {
        let mut config = AiConfig::default();
        config.global_difficulty = 0;
        config.performance.max_updates_per_frame = 0;
        config.performance.update_budget_ms = f64::NAN;
        config.performance.lod_distances = [30.0, 20.0, 10.0];
        config.ambient.despawn_radius = 5.0;
        config.flocking.cohesion_weight = f32::INFINITY;

        let config = config.sanitized();
        assert_eq!(config.global_difficulty, 1);
        assert_eq!(config.performance.max_updates_per_frame, budget::MIN_UPDATES_PER_FRAME);
        assert_eq!(config.performance.update_budget_ms, budget::UPDATE_BUDGET_MS);
        assert_eq!(config.performance.lod_distances, [30.0, 30.0, 30.0]);
        assert!(config.ambient.despawn_radius > config.ambient.spawn_radius + ambient::RING_MAX_OFFSET);
        assert_eq!(config.flocking.cohesion_weight, FlockingConfig::default().cohesion_weight);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_inconsistent() {
        let mut config = AiConfig::default();
        config.ambient.weights = BehaviorWeights {
            trade_convoy: 0.0,
            patrol: 0.0,
            raider: 0.0,
            exploration: 0.0,
            diplomatic_escort: 0.0,
            mining_operation: 0.0,
        };
        assert!(config.validate().is_err());

        let mut config = AiConfig::default();
        config.ambient.max_ships = 1000;
        assert!(config.validate().is_err());
    }
}
