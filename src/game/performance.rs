//! Level-of-detail scheduling and the per-frame update budget
//!
//! Every frame the performance manager:
//! - classifies agents into LOD tiers by distance to the player
//! - queues agents whose tier interval has elapsed, starving agents first
//! - runs queued agents at their tier's update depth until the per-frame
//!   count or time budget is spent
//! - records frame and per-agent costs
//! - periodically tightens or relaxes LOD distances, intervals and the
//!   per-frame cap based on sustained overruns or headroom

use std::collections::VecDeque;

use serde::Serialize;
use tracing::{debug, info};

use crate::game::agent::{Agent, AgentError, AgentMap};
use crate::game::constants::budget::*;
use crate::game::constants::lod::*;
use crate::game::types::ShipId;
use crate::host::Clock;

// ============================================================================
// LOD tiers and update depths
// ============================================================================

/// Detail class of an agent this frame, ordered by scheduling priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LodTier {
    High,
    Medium,
    Low,
    Culled,
}

impl LodTier {
    pub const ALL: [LodTier; 4] = [LodTier::High, LodTier::Medium, LodTier::Low, LodTier::Culled];

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn name(&self) -> &'static str {
        match self {
            LodTier::High => "high",
            LodTier::Medium => "medium",
            LodTier::Low => "low",
            LodTier::Culled => "culled",
        }
    }

    pub fn depth(&self) -> UpdateDepth {
        match self {
            LodTier::High => UpdateDepth::Full,
            LodTier::Medium => UpdateDepth::Reduced,
            LodTier::Low => UpdateDepth::Minimal,
            LodTier::Culled => UpdateDepth::Drift,
        }
    }
}

/// How much of an agent update runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateDepth {
    Full,
    Reduced,
    Minimal,
    Drift,
}

/// When the state machine runs at a given depth
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FsmCadence {
    Every,
    /// At most once per this many milliseconds
    AtMost(f64),
    Never,
}

/// Stages enabled at a depth
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stages {
    pub assess_threat: bool,
    pub fsm: FsmCadence,
    /// Behavior steering applies on every n-th update
    pub steer_every: u32,
    /// Velocity fraction applied when the state machine is skipped
    pub advance_rate: f32,
}

const STAGE_TABLE: [Stages; 4] = [
    // Full
    Stages {
        assess_threat: true,
        fsm: FsmCadence::Every,
        steer_every: 1,
        advance_rate: 1.0,
    },
    // Reduced
    Stages {
        assess_threat: true,
        fsm: FsmCadence::Every,
        steer_every: 2,
        advance_rate: 1.0,
    },
    // Minimal
    Stages {
        assess_threat: false,
        fsm: FsmCadence::AtMost(LOW_FSM_INTERVAL_MS),
        steer_every: 1,
        advance_rate: 1.0,
    },
    // Drift
    Stages {
        assess_threat: false,
        fsm: FsmCadence::Never,
        steer_every: 1,
        advance_rate: DRIFT_RATE,
    },
];

impl UpdateDepth {
    pub fn stages(&self) -> Stages {
        STAGE_TABLE[*self as usize]
    }
}

// ============================================================================
// Configuration and status
// ============================================================================

/// Scheduling parameters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceConfig {
    /// Upper distance bounds of the High, Medium and Low tiers
    pub lod_distances: [f32; 3],
    /// Minimum update interval per tier
    pub lod_intervals_ms: [f64; 4],
    pub max_updates_per_frame: usize,
    pub update_budget_ms: f64,
    pub adaptive: bool,
    pub adjust_interval_ms: f64,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            lod_distances: [HIGH_DISTANCE, MEDIUM_DISTANCE, LOW_DISTANCE],
            lod_intervals_ms: [
                HIGH_INTERVAL_MS,
                MEDIUM_INTERVAL_MS,
                LOW_INTERVAL_MS,
                CULLED_INTERVAL_MS,
            ],
            max_updates_per_frame: MAX_UPDATES_PER_FRAME,
            update_budget_ms: UPDATE_BUDGET_MS,
            adaptive: true,
            adjust_interval_ms: ADJUST_INTERVAL_MS,
        }
    }
}

/// Budget health levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PerformanceStatus {
    /// Under 30% of the budget
    Excellent,
    /// Under 70% of the budget
    Good,
    /// Close to the budget
    Warning,
    /// At or over the budget
    Critical,
}

impl PerformanceStatus {
    fn from_usage(ratio: f64) -> Self {
        if ratio < 0.3 {
            PerformanceStatus::Excellent
        } else if ratio < 0.7 {
            PerformanceStatus::Good
        } else if ratio < 1.0 {
            PerformanceStatus::Warning
        } else {
            PerformanceStatus::Critical
        }
    }
}

/// What happened in one frame
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FrameReport {
    pub frame: u64,
    pub now_ms: f64,
    /// Agents per tier after classification
    pub tier_counts: [usize; 4],
    /// Updates executed per tier
    pub tier_updates: [usize; 4],
    pub executed: usize,
    /// Due agents left for a later frame
    pub deferred: usize,
    pub failures: usize,
    /// Sum of measured agent update costs
    pub spent_ms: f64,
    pub budget_ms: f64,
    pub max_updates: usize,
    /// A single update pushed the frame past its budget
    pub overrun: bool,
}

impl FrameReport {
    pub fn usage(&self) -> f64 {
        if self.budget_ms > 0.0 {
            self.spent_ms / self.budget_ms
        } else {
            0.0
        }
    }

    fn under_pressure(&self) -> bool {
        self.overrun || self.deferred > 0
    }

    fn has_headroom(&self) -> bool {
        !self.under_pressure() && self.usage() < HEADROOM_USAGE
    }
}

/// Aggregate scheduling statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerformanceStats {
    pub frames: u64,
    pub updates_by_tier: [u64; 4],
    pub agents_by_tier: [usize; 4],
    pub deferred_total: u64,
    pub overruns: u64,
    pub failures: u64,
    pub avg_frame_ms: f64,
    pub p50_agent_ms: f64,
    pub p95_agent_ms: f64,
    pub p99_agent_ms: f64,
    pub max_updates_per_frame: usize,
    pub distance_scale: f32,
    pub interval_scale: f64,
    pub adjustments: u64,
}

struct Candidate {
    id: ShipId,
    tier: LodTier,
    distance: f32,
    elapsed_ms: f64,
    starving: bool,
}

// ============================================================================
// Performance manager
// ============================================================================

pub struct PerformanceManager {
    config: PerformanceConfig,
    max_updates: usize,
    distance_scale: f32,
    interval_scale: f64,

    frames: VecDeque<FrameReport>,
    agent_costs: VecDeque<f64>,
    /// Mean update cost across agents, used for agents with no history
    mean_cost_ms: f64,

    last_adjust_ms: Option<f64>,
    window_frames: u32,
    window_pressure: u32,
    window_headroom: u32,

    frame_count: u64,
    updates_by_tier: [u64; 4],
    agents_by_tier: [usize; 4],
    deferred_total: u64,
    overruns: u64,
    failures: u64,
    adjustments: u64,
    status: PerformanceStatus,
}

impl PerformanceManager {
    pub fn new(config: PerformanceConfig) -> Self {
        let max_updates = config.max_updates_per_frame.clamp(MIN_UPDATES_PER_FRAME, MAX_UPDATES_CEILING);
        Self {
            config,
            max_updates,
            distance_scale: 1.0,
            interval_scale: 1.0,
            frames: VecDeque::with_capacity(FRAME_HISTORY),
            agent_costs: VecDeque::with_capacity(FRAME_HISTORY * 4),
            mean_cost_ms: 0.0,
            last_adjust_ms: None,
            window_frames: 0,
            window_pressure: 0,
            window_headroom: 0,
            frame_count: 0,
            updates_by_tier: [0; 4],
            agents_by_tier: [0; 4],
            deferred_total: 0,
            overruns: 0,
            failures: 0,
            adjustments: 0,
            status: PerformanceStatus::Excellent,
        }
    }

    pub fn config(&self) -> &PerformanceConfig {
        &self.config
    }

    pub fn set_adaptive(&mut self, adaptive: bool) {
        self.config.adaptive = adaptive;
    }

    /// Current tier for a distance to the player
    pub fn classify(&self, distance: f32) -> LodTier {
        let [high, medium, low] = self.config.lod_distances;
        let scale = self.distance_scale;
        if distance <= high * scale {
            LodTier::High
        } else if distance <= medium * scale {
            LodTier::Medium
        } else if distance <= low * scale {
            LodTier::Low
        } else {
            LodTier::Culled
        }
    }

    /// Current minimum interval for a tier
    pub fn interval_ms(&self, tier: LodTier) -> f64 {
        self.config.lod_intervals_ms[tier.index()] * self.interval_scale
    }

    pub fn max_updates_per_frame(&self) -> usize {
        self.max_updates
    }

    pub fn distance_scale(&self) -> f32 {
        self.distance_scale
    }

    pub fn interval_scale(&self) -> f64 {
        self.interval_scale
    }

    pub fn status(&self) -> PerformanceStatus {
        self.status
    }

    pub fn last_frame(&self) -> Option<&FrameReport> {
        self.frames.back()
    }

    pub fn frames(&self) -> impl Iterator<Item = &FrameReport> {
        self.frames.iter()
    }

    /// Forget per-agent history, keeping adaptive parameters
    pub fn reset_history(&mut self) {
        self.frames.clear();
        self.agent_costs.clear();
        self.mean_cost_ms = 0.0;
    }

    /// Classify, schedule and run one frame of agent updates.
    ///
    /// `update` runs one agent at the given depth with the seconds elapsed
    /// since that agent's last update. A failed update is not charged to the
    /// agent's schedule, so it is retried next frame.
    pub fn run_frame<F>(
        &mut self,
        agents: &mut AgentMap,
        player: glam::Vec3,
        now_ms: f64,
        clock: &dyn Clock,
        mut update: F,
    ) -> FrameReport
    where
        F: FnMut(&mut Agent, UpdateDepth, f32) -> Result<(), AgentError>,
    {
        self.frame_count += 1;
        let mut report = FrameReport {
            frame: self.frame_count,
            now_ms,
            budget_ms: self.config.update_budget_ms,
            max_updates: self.max_updates,
            ..Default::default()
        };

        let mut queue = Vec::with_capacity(agents.len());
        for (id, agent) in agents.iter_mut() {
            let distance = agent.position.distance(player);
            let tier = self.classify(distance);
            agent.lod = tier;
            report.tier_counts[tier.index()] += 1;

            let interval = self.interval_ms(tier);
            let last = agent.last_update_ms.unwrap_or(agent.created_ms - interval);
            let elapsed_ms = now_ms - last;
            if elapsed_ms >= interval {
                queue.push(Candidate {
                    id: *id,
                    tier,
                    distance,
                    elapsed_ms,
                    starving: elapsed_ms >= 2.0 * interval,
                });
            }
        }

        queue.sort_by(|a, b| {
            b.starving
                .cmp(&a.starving)
                .then(a.tier.cmp(&b.tier))
                .then(a.distance.total_cmp(&b.distance))
                .then(a.id.cmp(&b.id))
        });

        let budget = self.config.update_budget_ms;
        for (index, candidate) in queue.iter().enumerate() {
            if report.executed >= self.max_updates {
                report.deferred = queue.len() - index;
                break;
            }
            let Some(agent) = agents.get_mut(&candidate.id) else {
                continue;
            };

            let estimate = if agent.cost_ms > 0.0 { agent.cost_ms } else { self.mean_cost_ms };
            if report.executed > 0 && report.spent_ms + estimate > budget {
                report.deferred = queue.len() - index;
                break;
            }

            let dt = (candidate.elapsed_ms / 1000.0).min(f64::from(MAX_AGENT_DT)) as f32;
            let started = clock.perf_ms();
            let result = update(agent, candidate.tier.depth(), dt);
            let cost = (clock.perf_ms() - started).max(0.0);

            report.spent_ms += cost;
            report.executed += 1;
            report.tier_updates[candidate.tier.index()] += 1;
            self.record_cost(agent, cost);

            match result {
                Ok(()) => agent.last_update_ms = Some(now_ms),
                Err(e) => {
                    report.failures += 1;
                    debug!(agent = %candidate.id, "Agent update skipped: {}", e);
                }
            }

            if report.spent_ms > budget {
                report.overrun = true;
                report.deferred = queue.len() - index - 1;
                break;
            }
        }

        self.record_frame(&report);
        self.maybe_adjust(now_ms);
        report
    }

    fn record_cost(&mut self, agent: &mut Agent, cost: f64) {
        agent.cost_ms = if agent.cost_ms > 0.0 {
            agent.cost_ms + COST_EMA_ALPHA * (cost - agent.cost_ms)
        } else {
            cost
        };
        self.mean_cost_ms = if self.mean_cost_ms > 0.0 {
            self.mean_cost_ms + COST_EMA_ALPHA * (cost - self.mean_cost_ms)
        } else {
            cost
        };

        self.agent_costs.push_back(cost);
        while self.agent_costs.len() > FRAME_HISTORY * 4 {
            self.agent_costs.pop_front();
        }
    }

    fn record_frame(&mut self, report: &FrameReport) {
        for tier in LodTier::ALL {
            self.updates_by_tier[tier.index()] += report.tier_updates[tier.index()] as u64;
        }
        self.agents_by_tier = report.tier_counts;
        self.deferred_total += report.deferred as u64;
        self.failures += report.failures as u64;
        if report.overrun {
            self.overruns += 1;
        }

        self.window_frames += 1;
        if report.under_pressure() {
            self.window_pressure += 1;
        } else if report.has_headroom() {
            self.window_headroom += 1;
        }

        self.frames.push_back(report.clone());
        while self.frames.len() > FRAME_HISTORY {
            self.frames.pop_front();
        }

        let recent = self.frames.len().min(60);
        let usage = self.frames.iter().rev().take(recent).map(|f| f.usage()).sum::<f64>()
            / recent.max(1) as f64;
        self.status = PerformanceStatus::from_usage(usage);
    }

    fn maybe_adjust(&mut self, now_ms: f64) {
        let last = *self.last_adjust_ms.get_or_insert(now_ms);
        if !self.config.adaptive || now_ms - last < self.config.adjust_interval_ms {
            return;
        }

        let frames = self.window_frames.max(1) as f32;
        let pressure = self.window_pressure as f32 / frames;
        let headroom = self.window_headroom as f32 / frames;

        if pressure >= OVERRUN_RATIO {
            self.tighten();
        } else if headroom >= HEADROOM_RATIO {
            self.relax();
        }

        self.last_adjust_ms = Some(now_ms);
        self.window_frames = 0;
        self.window_pressure = 0;
        self.window_headroom = 0;
    }

    fn tighten(&mut self) {
        let before = (self.max_updates, self.distance_scale, self.interval_scale);
        self.max_updates = self.max_updates.saturating_sub(1).max(MIN_UPDATES_PER_FRAME);
        self.distance_scale = (self.distance_scale * DISTANCE_SHRINK).max(MIN_DISTANCE_SCALE);
        self.interval_scale = (self.interval_scale * INTERVAL_STRETCH).min(MAX_INTERVAL_SCALE);

        if before != (self.max_updates, self.distance_scale, self.interval_scale) {
            self.adjustments += 1;
            info!(
                max_updates = self.max_updates,
                distance_scale = self.distance_scale,
                interval_scale = self.interval_scale,
                "AI budget under sustained pressure, reducing detail"
            );
        }
    }

    fn relax(&mut self) {
        let before = (self.max_updates, self.distance_scale, self.interval_scale);
        let cap = self
            .config
            .max_updates_per_frame
            .clamp(MIN_UPDATES_PER_FRAME, MAX_UPDATES_CEILING);
        self.max_updates = (self.max_updates + 1).min(cap);
        self.distance_scale = (self.distance_scale / DISTANCE_SHRINK).min(1.0);
        self.interval_scale = (self.interval_scale / INTERVAL_STRETCH).max(1.0);

        if before != (self.max_updates, self.distance_scale, self.interval_scale) {
            self.adjustments += 1;
            debug!(
                max_updates = self.max_updates,
                distance_scale = self.distance_scale,
                interval_scale = self.interval_scale,
                "AI budget has headroom, restoring detail"
            );
        }
    }

    fn percentile(sorted: &[f64], p: f64) -> f64 {
        if sorted.is_empty() {
            return 0.0;
        }
        let idx = (sorted.len() as f64 * p) as usize;
        sorted[idx.min(sorted.len() - 1)]
    }

    pub fn stats(&self) -> PerformanceStats {
        let mut costs: Vec<f64> = self.agent_costs.iter().copied().collect();
        costs.sort_by(|a, b| a.total_cmp(b));
        let avg_frame_ms = if self.frames.is_empty() {
            0.0
        } else {
            self.frames.iter().map(|f| f.spent_ms).sum::<f64>() / self.frames.len() as f64
        };

        PerformanceStats {
            frames: self.frame_count,
            updates_by_tier: self.updates_by_tier,
            agents_by_tier: self.agents_by_tier,
            deferred_total: self.deferred_total,
            overruns: self.overruns,
            failures: self.failures,
            avg_frame_ms,
            p50_agent_ms: Self::percentile(&costs, 0.50),
            p95_agent_ms: Self::percentile(&costs, 0.95),
            p99_agent_ms: Self::percentile(&costs, 0.99),
            max_updates_per_frame: self.max_updates,
            distance_scale: self.distance_scale,
            interval_scale: self.interval_scale,
            adjustments: self.adjustments,
        }
    }

    /// One-line summary for logs
    pub fn status_message(&self) -> String {
        let stats = self.stats();
        format!(
            "{:?} - {:.2}ms avg, cap {}, lod x{:.2}, interval x{:.2}",
            self.status, stats.avg_frame_ms, stats.max_updates_per_frame, stats.distance_scale, stats.interval_scale
        )
    }
}

impl Default for PerformanceManager {
    fn default() -> Self {
        Self::new(PerformanceConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::agent::test_support::agent;
    use crate::game::faction::Faction;
    use crate::game::types::ShipClass;
    use crate::host::ManualClock;
    use glam::Vec3;

    fn population(distances: &[f32]) -> AgentMap {
        distances
            .iter()
            .enumerate()
            .map(|(i, d)| {
                let a = agent(i as u64 + 1, ShipClass::LightFighter, Faction::Neutral, Vec3::new(*d, 0.0, 0.0));
                (a.id, a)
            })
            .collect()
    }

    fn noop(_: &mut Agent, _: UpdateDepth, _: f32) -> Result<(), AgentError> {
        Ok(())
    }

    #[test]
    fn test_classify_boundaries() {
        let pm = PerformanceManager::default();
        assert_eq!(pm.classify(0.0), LodTier::High);
        assert_eq!(pm.classify(10.0), LodTier::High);
        assert_eq!(pm.classify(10.01), LodTier::Medium);
        assert_eq!(pm.classify(25.0), LodTier::Medium);
        assert_eq!(pm.classify(50.0), LodTier::Low);
        assert_eq!(pm.classify(50.5), LodTier::Culled);
        assert_eq!(pm.classify(f32::NAN), LodTier::Culled);
    }

    #[test]
    fn test_stage_table() {
        assert_eq!(UpdateDepth::Full.stages().fsm, FsmCadence::Every);
        assert_eq!(UpdateDepth::Reduced.stages().steer_every, 2);
        assert!(!UpdateDepth::Minimal.stages().assess_threat);
        assert_eq!(UpdateDepth::Drift.stages().fsm, FsmCadence::Never);
        assert_eq!(UpdateDepth::Drift.stages().advance_rate, DRIFT_RATE);
        assert_eq!(LodTier::Low.depth(), UpdateDepth::Minimal);
    }

    #[test]
    fn test_count_cap() {
        let mut pm = PerformanceManager::default();
        let mut agents = population(&[1.0; 50]);
        let clock = ManualClock::new();
        let report = pm.run_frame(&mut agents, Vec3::ZERO, 0.0, &clock, noop);
        assert_eq!(report.executed, MAX_UPDATES_PER_FRAME);
        assert_eq!(report.deferred, 50 - MAX_UPDATES_PER_FRAME);
    }

    #[test]
    fn test_time_budget_defers_by_estimate() {
        let mut pm = PerformanceManager::default();
        let mut agents = population(&[1.0; 30]);
        let clock = ManualClock::with_sample_cost(0.5);
        let report = pm.run_frame(&mut agents, Vec3::ZERO, 0.0, &clock, noop);
        assert_eq!(report.executed, 8);
        assert!(report.spent_ms <= UPDATE_BUDGET_MS);
        assert!(!report.overrun);
    }

    #[test]
    fn test_overrun_is_charged_and_cuts_queue() {
        let mut pm = PerformanceManager::default();
        let mut agents = population(&[1.0; 10]);
        let clock = ManualClock::with_sample_cost(5.0);
        let report = pm.run_frame(&mut agents, Vec3::ZERO, 0.0, &clock, noop);
        assert_eq!(report.executed, 1);
        assert!(report.overrun);
        assert_eq!(report.deferred, 9);
    }

    #[test]
    fn test_interval_respected() {
        let mut pm = PerformanceManager::default();
        let mut agents = population(&[1.0, 30.0]);
        let clock = ManualClock::new();
        let first = pm.run_frame(&mut agents, Vec3::ZERO, 0.0, &clock, noop);
        assert_eq!(first.executed, 2);
        let second = pm.run_frame(&mut agents, Vec3::ZERO, 16.0, &clock, noop);
        assert_eq!(second.executed, 0);
        let third = pm.run_frame(&mut agents, Vec3::ZERO, 64.0, &clock, noop);
        assert_eq!(third.tier_updates[LodTier::High.index()], 1);
        assert_eq!(third.tier_updates[LodTier::Low.index()], 0);
    }

    fn run_order(pm: &mut PerformanceManager, agents: &mut AgentMap, now: f64) -> Vec<u64> {
        let clock = ManualClock::new();
        let mut order = Vec::new();
        pm.run_frame(agents, Vec3::ZERO, now, &clock, |a, _, _| {
            order.push(a.id.0);
            Ok(())
        });
        order
    }

    #[test]
    fn test_priority_order() {
        let mut pm = PerformanceManager::new(PerformanceConfig {
            max_updates_per_frame: MIN_UPDATES_PER_FRAME,
            ..Default::default()
        });
        let mut agents = population(&[30.0, 5.0, 1.0, 12.0]);
        assert_eq!(run_order(&mut pm, &mut agents, 0.0), vec![3, 2, 4]);
    }

    #[test]
    fn test_starving_agent_jumps_the_queue() {
        let mut pm = PerformanceManager::new(PerformanceConfig {
            max_updates_per_frame: MIN_UPDATES_PER_FRAME,
            ..Default::default()
        });
        let mut agents = population(&[30.0, 1.0, 2.0, 3.0]);

        for now in [0.0, 60.0, 120.0, 180.0, 240.0] {
            let order = run_order(&mut pm, &mut agents, now);
            assert!(!order.contains(&1), "low tier agent ran at {}", now);
        }
        let order = run_order(&mut pm, &mut agents, 300.0);
        assert_eq!(order[0], 1);
    }

    #[test]
    fn test_failed_update_is_retried() {
        let mut pm = PerformanceManager::default();
        let mut agents = population(&[1.0]);
        let clock = ManualClock::new();
        let report = pm.run_frame(&mut agents, Vec3::ZERO, 0.0, &clock, |a, _, _| {
            Err(AgentError::InvalidKinematics(a.id))
        });
        assert_eq!(report.failures, 1);
        let report = pm.run_frame(&mut agents, Vec3::ZERO, 16.0, &clock, noop);
        assert_eq!(report.executed, 1);
    }

    #[test]
    fn test_dt_is_elapsed_since_last_update() {
        let mut pm = PerformanceManager::default();
        let mut agents = population(&[30.0]);
        let clock = ManualClock::new();
        pm.run_frame(&mut agents, Vec3::ZERO, 0.0, &clock, noop);
        let mut seen = 0.0;
        pm.run_frame(&mut agents, Vec3::ZERO, 300.0, &clock, |_, depth, dt| {
            assert_eq!(depth, UpdateDepth::Minimal);
            seen = dt;
            Ok(())
        });
        assert!((seen - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_adaptive_tightens_under_pressure_and_relaxes() {
        let mut pm = PerformanceManager::default();
        let mut agents = population(&[1.0; 200]);
        let clock = ManualClock::new();

        let mut now = 0.0;
        while now <= ADJUST_INTERVAL_MS + 16.0 {
            pm.run_frame(&mut agents, Vec3::ZERO, now, &clock, noop);
            now += 16.0;
        }
        assert_eq!(pm.max_updates_per_frame(), MAX_UPDATES_PER_FRAME - 1);
        assert!((pm.distance_scale() - DISTANCE_SHRINK).abs() < 1e-6);
        assert!((pm.interval_scale() - INTERVAL_STRETCH).abs() < 1e-9);

        let mut few = population(&[1.0; 2]);
        let end = now + ADJUST_INTERVAL_MS + 16.0;
        while now <= end {
            pm.run_frame(&mut few, Vec3::ZERO, now, &clock, noop);
            now += 16.0;
        }
        assert_eq!(pm.max_updates_per_frame(), MAX_UPDATES_PER_FRAME);
        assert!((pm.distance_scale() - 1.0).abs() < 1e-6);
        assert!((pm.interval_scale() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_adaptive_floor() {
        let mut pm = PerformanceManager::default();
        for _ in 0..100 {
            pm.tighten();
        }
        assert_eq!(pm.max_updates_per_frame(), MIN_UPDATES_PER_FRAME);
        assert_eq!(pm.distance_scale(), MIN_DISTANCE_SCALE);
        assert_eq!(pm.interval_scale(), MAX_INTERVAL_SCALE);
    }

    #[test]
    fn test_adaptive_disabled() {
        let mut pm = PerformanceManager::new(PerformanceConfig {
            adaptive: false,
            ..Default::default()
        });
        let mut agents = population(&[1.0; 60]);
        let clock = ManualClock::new();
        let mut now = 0.0;
        while now <= ADJUST_INTERVAL_MS * 2.0 {
            pm.run_frame(&mut agents, Vec3::ZERO, now, &clock, noop);
            now += 16.0;
        }
        assert_eq!(pm.max_updates_per_frame(), MAX_UPDATES_PER_FRAME);
    }

    #[test]
    fn test_stats_percentiles() {
        let mut pm = PerformanceManager::default();
        let mut agents = population(&[1.0; 4]);
        let clock = ManualClock::with_sample_cost(0.25);
        pm.run_frame(&mut agents, Vec3::ZERO, 0.0, &clock, noop);
        let stats = pm.stats();
        assert_eq!(stats.frames, 1);
        assert_eq!(stats.updates_by_tier[0], 4);
        assert!((stats.p95_agent_ms - 0.25).abs() < 1e-9);
        assert_eq!(pm.status(), PerformanceStatus::Excellent);
    }
}
