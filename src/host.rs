//! Boundary traits the embedding application implements.
//!
//! The AI tier consumes the host world, an audio sink for voice lines, an
//! optional telemetry sink and a clock. Nothing here owns rendering or
//! scene objects; ships are addressed by [`ShipId`] only.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

use glam::Vec3;
use tracing::Level;

use crate::game::faction::Faction;
use crate::game::types::{GroupId, Pose, ShipClass, ShipId};

/// Authoritative view of one ship as reported by the host
#[derive(Debug, Clone, PartialEq)]
pub struct ShipState {
    pub id: ShipId,
    pub class: ShipClass,
    pub faction: Faction,
    pub hull: f32,
    pub max_hull: f32,
    /// `None` when the host has not placed the ship yet
    pub position: Option<Vec3>,
    pub velocity: Vec3,
    pub forward: Vec3,
    pub is_player: bool,
}

impl ShipState {
    pub fn hull_fraction(&self) -> f32 {
        if self.max_hull > 0.0 {
            (self.hull / self.max_hull).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.hull <= 0.0
    }
}

/// Request to create a ship in the host world
#[derive(Debug, Clone, PartialEq)]
pub struct ShipSpawn {
    pub class: ShipClass,
    pub faction: Faction,
    pub position: Vec3,
    pub velocity: Vec3,
    pub forward: Vec3,
}

/// The game world the AI reads from and writes kinematics back to
pub trait HostWorld {
    /// Player position and heading
    fn player_pose(&self) -> Pose;

    /// Every ship currently in the world, the player included
    fn ships(&self) -> Vec<ShipState>;

    /// Look up one ship
    fn ship(&self, id: ShipId) -> Option<ShipState> {
        self.ships().into_iter().find(|s| s.id == id)
    }

    /// Push AI-integrated kinematics back to the ship
    fn write_kinematics(&mut self, id: ShipId, position: Vec3, velocity: Vec3, forward: Vec3);

    /// Create a ship; `None` when the host refuses
    fn spawn_ship(&mut self, spawn: &ShipSpawn) -> Option<ShipId>;

    /// Remove a ship from the world
    fn despawn_ship(&mut self, id: ShipId);
}

/// Voice line priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MessagePriority {
    Low,
    Normal,
    High,
}

/// Receives voice lines for playback
pub trait AudioSink {
    fn play_message(&mut self, group: GroupId, text: &str, priority: MessagePriority);
}

/// Optional host-side log sink
pub trait Telemetry {
    fn log(&self, level: Level, message: &str);
}

/// Telemetry sink that drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetry;

impl Telemetry for NoopTelemetry {
    fn log(&self, _level: Level, _message: &str) {}
}

/// Time source for scheduling (`now_ms`) and budget measurement (`perf_ms`)
pub trait Clock {
    fn now_ms(&self) -> f64;
    fn perf_ms(&self) -> f64;
}

/// Wall clock measured from construction
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }

    fn perf_ms(&self) -> f64 {
        self.now_ms()
    }
}

#[derive(Debug, Default)]
struct ManualClockState {
    now: Cell<f64>,
    perf: Cell<f64>,
    sample_cost: Cell<f64>,
}

/// Hand-driven clock for tests and replays.
///
/// `now_ms` only moves on [`ManualClock::advance`]. Every `perf_ms` sample
/// advances the performance counter by the configured sample cost, so two
/// consecutive samples around one agent update measure exactly that cost.
/// Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    state: Rc<ManualClockState>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sample_cost(cost_ms: f64) -> Self {
        let clock = Self::new();
        clock.set_sample_cost(cost_ms);
        clock
    }

    pub fn advance(&self, ms: f64) {
        self.state.now.set(self.state.now.get() + ms);
    }

    pub fn set_now(&self, ms: f64) {
        self.state.now.set(ms);
    }

    pub fn set_sample_cost(&self, cost_ms: f64) {
        self.state.sample_cost.set(cost_ms.max(0.0));
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> f64 {
        self.state.now.get()
    }

    fn perf_ms(&self) -> f64 {
        let t = self.state.perf.get();
        self.state.perf.set(t + self.state.sample_cost.get());
        t
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::new();
        let handle = clock.clone();
        handle.advance(16.0);
        assert_eq!(clock.now_ms(), 16.0);
    }

    #[test]
    fn test_manual_clock_sample_cost() {
        let clock = ManualClock::with_sample_cost(0.25);
        let t0 = clock.perf_ms();
        let t1 = clock.perf_ms();
        assert!((t1 - t0 - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_hull_fraction_clamped() {
        let ship = ShipState {
            id: ShipId(1),
            class: ShipClass::Scout,
            faction: Faction::Pirates,
            hull: 150.0,
            max_hull: 100.0,
            position: Some(Vec3::ZERO),
            velocity: Vec3::ZERO,
            forward: Vec3::Z,
            is_player: false,
        };
        assert_eq!(ship.hull_fraction(), 1.0);
        assert!(!ship.is_destroyed());
    }

    #[test]
    fn test_system_clock_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now_ms();
        let b = clock.now_ms();
        assert!(b >= a);
    }
}
