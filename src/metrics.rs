//! AI tier metrics
//!
//! Counters and gauges refreshed once per frame by the AI manager, rendered in
//! Prometheus text format for a debug overlay or scrape endpoint, or as JSON.

use serde::Serialize;

use crate::game::agent::AiState;
use crate::game::performance::{FrameReport, LodTier, PerformanceStats, PerformanceStatus};

/// Metrics registry for the AI tier
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AiMetrics {
    // Frame counters
    pub frames: u64,
    pub skipped_frames: u64,

    // Registry
    pub agents: usize,
    pub agents_by_state: [usize; 5],
    pub agents_by_tier: [usize; 4],
    pub agents_added: u64,
    pub agents_removed: u64,

    // Scheduling
    pub updates_by_tier: [u64; 4],
    pub deferred_total: u64,
    pub overruns: u64,
    pub failures: u64,
    /// Panics caught inside a frame
    pub faults: u64,
    pub last_frame_ms: f64,
    pub budget_usage_percent: u64,
    pub p50_agent_ms: f64,
    pub p95_agent_ms: f64,
    pub p99_agent_ms: f64,
    pub status: Option<PerformanceStatus>,

    // Adaptive parameters
    pub max_updates_per_frame: usize,
    pub distance_scale: f32,
    pub interval_scale: f64,
    pub adjustments: u64,

    // Behavior
    pub transitions: u64,
    pub distress_sent: u64,
    pub distress_answered: u64,
    pub flocks: usize,
    pub ambient_groups: usize,
    pub ambient_ships: usize,
}

impl AiMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in one scheduled frame and the scheduler's running statistics
    pub fn record_frame(&mut self, report: &FrameReport, stats: &PerformanceStats, status: PerformanceStatus) {
        self.frames += 1;
        self.last_frame_ms = report.spent_ms;
        self.budget_usage_percent = (report.usage() * 100.0).round().max(0.0) as u64;
        self.agents_by_tier = report.tier_counts;
        self.updates_by_tier = stats.updates_by_tier;
        self.deferred_total = stats.deferred_total;
        self.overruns = stats.overruns;
        self.failures = stats.failures;
        self.p50_agent_ms = stats.p50_agent_ms;
        self.p95_agent_ms = stats.p95_agent_ms;
        self.p99_agent_ms = stats.p99_agent_ms;
        self.max_updates_per_frame = stats.max_updates_per_frame;
        self.distance_scale = stats.distance_scale;
        self.interval_scale = stats.interval_scale;
        self.adjustments = stats.adjustments;
        self.status = Some(status);
    }

    /// Generate Prometheus-format metrics output
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(4096);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        metric!("fleet_ai_frames_total", "Frames processed", "counter", self.frames);
        metric!("fleet_ai_frames_skipped_total", "Frames skipped for invalid dt", "counter", self.skipped_frames);
        metric!("fleet_ai_agents", "Registered agents", "gauge", self.agents);
        metric!("fleet_ai_agents_added_total", "Agents registered", "counter", self.agents_added);
        metric!("fleet_ai_agents_removed_total", "Agents removed", "counter", self.agents_removed);

        output.push_str("# HELP fleet_ai_agents_by_state Agents per state machine state\n# TYPE fleet_ai_agents_by_state gauge\n");
        for state in AiState::ALL {
            output.push_str(&format!(
                "fleet_ai_agents_by_state{{state=\"{}\"}} {}\n",
                state.name(),
                self.agents_by_state[state as usize]
            ));
        }
        output.push_str("# HELP fleet_ai_agents_by_tier Agents per LOD tier\n# TYPE fleet_ai_agents_by_tier gauge\n");
        for tier in LodTier::ALL {
            output.push_str(&format!(
                "fleet_ai_agents_by_tier{{tier=\"{}\"}} {}\n",
                tier.name(),
                self.agents_by_tier[tier.index()]
            ));
        }
        output.push_str("# HELP fleet_ai_updates_total Agent updates per LOD tier\n# TYPE fleet_ai_updates_total counter\n");
        for tier in LodTier::ALL {
            output.push_str(&format!(
                "fleet_ai_updates_total{{tier=\"{}\"}} {}\n",
                tier.name(),
                self.updates_by_tier[tier.index()]
            ));
        }

        metric!("fleet_ai_deferred_total", "Due updates pushed to a later frame", "counter", self.deferred_total);
        metric!("fleet_ai_budget_overruns_total", "Frames over the update budget", "counter", self.overruns);
        metric!("fleet_ai_update_failures_total", "Agent updates that failed", "counter", self.failures);
        metric!("fleet_ai_faults_total", "Panics contained inside a frame", "counter", self.faults);
        metric!("fleet_ai_frame_milliseconds", "Agent update time in the last frame", "gauge", self.last_frame_ms);
        metric!("fleet_ai_budget_usage_percent", "Update budget usage in the last frame", "gauge", self.budget_usage_percent);
        metric!("fleet_ai_agent_p50_milliseconds", "Median agent update cost", "gauge", self.p50_agent_ms);
        metric!("fleet_ai_agent_p95_milliseconds", "95th percentile agent update cost", "gauge", self.p95_agent_ms);
        metric!("fleet_ai_agent_p99_milliseconds", "99th percentile agent update cost", "gauge", self.p99_agent_ms);

        let status_name = match self.status {
            Some(PerformanceStatus::Excellent) | None => "excellent",
            Some(PerformanceStatus::Good) => "good",
            Some(PerformanceStatus::Warning) => "warning",
            Some(PerformanceStatus::Critical) => "critical",
        };
        output.push_str(&format!(
            "# HELP fleet_ai_performance_state Human-readable performance state\n# TYPE fleet_ai_performance_state gauge\nfleet_ai_performance_state{{state=\"{}\"}} 1\n",
            status_name
        ));

        metric!("fleet_ai_max_updates_per_frame", "Current per-frame update cap", "gauge", self.max_updates_per_frame);
        metric!("fleet_ai_lod_distance_scale", "Current LOD distance multiplier", "gauge", self.distance_scale);
        metric!("fleet_ai_lod_interval_scale", "Current LOD interval multiplier", "gauge", self.interval_scale);
        metric!("fleet_ai_adjustments_total", "Adaptive tuning adjustments", "counter", self.adjustments);

        metric!("fleet_ai_transitions_total", "State machine transitions", "counter", self.transitions);
        metric!("fleet_ai_distress_sent_total", "Distress calls sent", "counter", self.distress_sent);
        metric!("fleet_ai_distress_answered_total", "Agents that answered a distress call", "counter", self.distress_answered);
        metric!("fleet_ai_flocks", "Active flocks", "gauge", self.flocks);
        metric!("fleet_ai_ambient_groups", "Active ambient groups", "gauge", self.ambient_groups);
        metric!("fleet_ai_ambient_ships", "Active ambient ships", "gauge", self.ambient_ships);

        output
    }

    /// JSON rendering for direct inspection
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}
