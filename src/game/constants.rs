//! Tuning constants. Distances are in host units (the game uses kilometres),
//! times in milliseconds unless the name says otherwise.

/// Level-of-detail scheduling constants
pub mod lod {
    /// Upper distance bound of the High tier
    pub const HIGH_DISTANCE: f32 = 10.0;
    /// Upper distance bound of the Medium tier
    pub const MEDIUM_DISTANCE: f32 = 25.0;
    /// Upper distance bound of the Low tier (beyond this agents are culled)
    pub const LOW_DISTANCE: f32 = 50.0;

    /// Minimum time between updates per tier
    pub const HIGH_INTERVAL_MS: f64 = 50.0;
    pub const MEDIUM_INTERVAL_MS: f64 = 100.0;
    pub const LOW_INTERVAL_MS: f64 = 250.0;
    pub const CULLED_INTERVAL_MS: f64 = 1000.0;

    /// Low-tier agents run their state machine at most this often
    pub const LOW_FSM_INTERVAL_MS: f64 = 500.0;
    /// Culled agents advance at this fraction of their velocity
    pub const DRIFT_RATE: f32 = 0.5;
    /// Longest elapsed time fed to a single agent update (seconds)
    pub const MAX_AGENT_DT: f32 = 1.0;
}

/// Per-frame budget and adaptive tuning
pub mod budget {
    /// Default cap on agent updates per frame
    pub const MAX_UPDATES_PER_FRAME: usize = 24;
    /// Adaptive tuning never drops the per-frame cap below this
    pub const MIN_UPDATES_PER_FRAME: usize = 3;
    /// Ceiling for the per-frame cap
    pub const MAX_UPDATES_CEILING: usize = 256;
    /// Default time budget for agent updates per frame
    pub const UPDATE_BUDGET_MS: f64 = 4.0;
    /// Time between adaptive adjustments
    pub const ADJUST_INTERVAL_MS: f64 = 5000.0;
    /// Fraction of frames over budget that counts as sustained overrun
    pub const OVERRUN_RATIO: f32 = 0.5;
    /// Frames using less than this share of the budget count as headroom
    pub const HEADROOM_USAGE: f64 = 0.5;
    /// Fraction of headroom frames needed before relaxing limits
    pub const HEADROOM_RATIO: f32 = 0.8;
    /// LOD distance multiplier applied on overrun
    pub const DISTANCE_SHRINK: f32 = 0.9;
    /// Interval multiplier applied on overrun
    pub const INTERVAL_STRETCH: f64 = 1.1;
    /// Smallest LOD distance scale
    pub const MIN_DISTANCE_SCALE: f32 = 0.5;
    /// Largest interval scale
    pub const MAX_INTERVAL_SCALE: f64 = 2.0;
    /// Rolling window of recorded frames
    pub const FRAME_HISTORY: usize = 300;
    /// Smoothing factor for per-agent cost estimates
    pub const COST_EMA_ALPHA: f64 = 0.3;
}

/// State machine thresholds and timings
pub mod fsm {
    /// Hull fraction below which agents flee
    pub const FLEE_THRESHOLD: f32 = 0.2;
    /// Hull fraction below which engaged agents evade
    pub const EVADE_THRESHOLD: f32 = 0.5;
    /// Hull fraction a fleeing agent needs before calming down
    pub const RECOVER_HULL: f32 = 0.4;
    /// Carriers below this hull fraction warp out while fleeing
    pub const CARRIER_WARP_HULL: f32 = 0.3;
    /// Lost-target / safe distance as a multiple of sensor range
    pub const LOSE_TARGET_FACTOR: f32 = 1.5;

    /// Idle patrol direction is re-rolled within this window
    pub const PATROL_MIN_MS: f64 = 3000.0;
    pub const PATROL_MAX_MS: f64 = 6000.0;
    /// Idle patrol speed as a fraction of max speed
    pub const PATROL_SPEED: f32 = 0.3;
    /// Distance at which a waypoint counts as reached
    pub const WAYPOINT_ARRIVAL: f32 = 0.5;

    /// Scout hit-and-run phase length
    pub const SCOUT_PHASE_MS: f64 = 2000.0;
    /// Fighter optimal range as a fraction of engage range
    pub const FIGHTER_OPTIMAL_RANGE: f32 = 0.7;
    /// Carrier standoff as a multiple of engage range
    pub const CARRIER_STANDOFF: f32 = 1.5;
    /// Default pursuit closes to this fraction of engage range
    pub const PURSUIT_RANGE: f32 = 0.8;
    /// Evading agents still pursue targets within this multiple of engage range
    pub const EVADE_PURSUIT_RANGE: f32 = 1.5;
    /// Weight of pursuit while evading
    pub const EVADE_PURSUIT_WEIGHT: f32 = 0.5;

    /// Buzz orbit radius range
    pub const BUZZ_RADIUS_MIN: f32 = 0.2;
    pub const BUZZ_RADIUS_MAX: f32 = 0.5;
    /// Buzz inspection duration range
    pub const BUZZ_MIN_MS: f64 = 5000.0;
    pub const BUZZ_MAX_MS: f64 = 10000.0;

    /// Speeds below this do not re-orient the ship
    pub const FACING_EPSILON: f32 = 1e-3;
}

/// Faction standing constants
pub mod faction {
    pub const MIN_STANDING: i32 = -100;
    pub const MAX_STANDING: i32 = 100;
    /// Standing at or below this is enemy
    pub const ENEMY_THRESHOLD: i32 = -25;
    /// Standing at or above this is friendly
    pub const FRIENDLY_THRESHOLD: i32 = 25;
    /// Entries kept in the standing history
    pub const HISTORY_LEN: usize = 100;
}

/// Inter-agent communication
pub mod comms {
    /// Minimum time between distress calls from one agent
    pub const DISTRESS_COOLDOWN_MS: f64 = 5000.0;
}

/// Flocking defaults
pub mod flocking {
    pub const SEPARATION_WEIGHT: f32 = 1.5;
    pub const ALIGNMENT_WEIGHT: f32 = 1.0;
    pub const COHESION_WEIGHT: f32 = 1.0;
    pub const FORMATION_WEIGHT: f32 = 2.0;
    pub const AVOIDANCE_WEIGHT: f32 = 3.0;

    pub const SEPARATION_RADIUS: f32 = 0.5;
    pub const ALIGNMENT_RADIUS: f32 = 2.0;
    pub const COHESION_RADIUS: f32 = 3.0;
    pub const NEIGHBOR_RADIUS: f32 = 5.0;
    /// Extra clearance kept around obstacles
    pub const AVOIDANCE_MARGIN: f32 = 1.0;

    /// Coordinator update throttle
    pub const REFRESH_INTERVAL_MS: f64 = 100.0;
    /// Leader displacement that forces a formation recompute
    pub const LEADER_MOVE_THRESHOLD: f32 = 0.5;
    /// Formations older than this are recomputed regardless of movement
    pub const REFRESH_AGE_MS: f64 = 2000.0;
    /// Offset applied to stacked slots when a flock is too small for its shape
    pub const STACK_JITTER: f32 = 0.01;
}

/// Ambient traffic defaults
pub mod ambient {
    pub const MAX_AMBIENT_SHIPS: usize = 20;
    pub const SPAWN_INTERVAL_MS: f64 = 2000.0;
    pub const SPAWN_RADIUS: f32 = 20.0;
    pub const DESPAWN_RADIUS: f32 = 40.0;
    pub const COMMUNICATION_INTERVAL_MS: f64 = 8000.0;
    /// Ring placement band beyond the spawn radius
    pub const RING_MIN_OFFSET: f32 = 0.5;
    pub const RING_MAX_OFFSET: f32 = 4.5;
    /// Vertical spread of spawned groups
    pub const VERTICAL_SPREAD: f32 = 1.0;
    /// Spread of members around the group anchor
    pub const MEMBER_SPREAD: f32 = 0.4;
    /// Queued voice lines kept before the oldest low-priority line is dropped
    pub const COMMS_QUEUE_LEN: usize = 16;
}
