//! AI manager
//!
//! Owns the agent registry and drives one frame of the AI tier per call to
//! [`AiManager::update`]:
//!
//! ```text
//!  host ──▶ snapshot ──▶ scheduler ──▶ agents ──▶ distress ──▶ flocking
//!                                                                 │
//!  host ◀── cleanup ◀── write kinematics ◀── ambient traffic ◀────┘
//! ```
//!
//! Nothing inside a frame propagates an error to the caller. Failures are
//! logged, forwarded to the host telemetry sink, and the affected agent is
//! retried on a later frame. A panicking agent is dropped from the registry;
//! a panicking flocking pass disbands every flock.

use std::panic::{self, AssertUnwindSafe};

use glam::Vec3;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, trace, warn, Level};

use crate::config::AiConfig;
use crate::events::{EventBus, ListenerId};
use crate::game::agent::{Agent, AgentError, AgentMap, AgentOptions, AgentTick, AiState, DistressCall};
use crate::game::faction::FactionTable;
use crate::game::flocking::{FlockId, FlockingCoordinator, FormationShape};
use crate::game::performance::{PerformanceManager, PerformanceStatus};
use crate::game::persistence::{KeyValueStore, PersistenceError};
use crate::game::agent::profiles::clamp_difficulty;
use crate::game::snapshot::WorldSnapshot;
use crate::game::types::{ShipClass, ShipId};
use crate::host::{AudioSink, Clock, HostWorld, NoopTelemetry, Telemetry};
use crate::metrics::AiMetrics;
use crate::util::rng::{seeded, AiRng};

#[cfg(feature = "ambient")]
use crate::game::ambient::{AmbientContext, AmbientShipManager};
#[cfg(feature = "ambient")]
use crate::util::rng::fork;

/// Storage key used when none is given
pub const DEFAULT_STANDINGS_KEY: &str = "faction_standings";

// ============================================================================
// Errors and events
// ============================================================================

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("AI manager has no host world")]
    NoHost,
    #[error("{0} is unknown to the host")]
    UnknownShip(ShipId),
    #[error("{0} already has an agent")]
    Duplicate(ShipId),
    #[error("agent registry is full ({0} agents)")]
    RegistryFull(usize),
    #[error("no usable agents for a flock")]
    EmptyFlock,
    #[error("no key-value store attached")]
    NoStore,
    #[error(transparent)]
    Agent(#[from] AgentError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Why an agent left the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalReason {
    Requested,
    Destroyed,
    LeftWorld,
    /// The host no longer knows the ship
    HostRemoved,
    /// Ambient group despawned beyond the despawn radius
    Despawned,
    /// The agent's update panicked
    Faulted,
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RegistryEvent {
    AgentAdded { id: ShipId, class: ShipClass },
    AgentRemoved { id: ShipId, reason: RemovalReason },
    StateChanged { id: ShipId, from: AiState, to: AiState },
    LeftWorld { id: ShipId },
    Cleared { count: usize },
}

// ============================================================================
// AI manager
// ============================================================================

pub struct AiManager {
    config: AiConfig,
    clock: Box<dyn Clock>,
    host: Option<Box<dyn HostWorld>>,
    audio: Option<Box<dyn AudioSink>>,
    telemetry: Box<dyn Telemetry>,
    store: Option<Box<dyn KeyValueStore>>,

    agents: AgentMap,
    factions: FactionTable,
    performance: PerformanceManager,
    flocking: FlockingCoordinator,
    #[cfg(feature = "ambient")]
    ambient: AmbientShipManager,

    events: EventBus<RegistryEvent>,
    snapshot: WorldSnapshot,
    metrics: AiMetrics,

    enabled: bool,
    debug: bool,
    difficulty: u8,

    #[cfg(test)]
    fault: Option<Fault>,
}

/// Where a test makes the next frame panic
#[cfg(test)]
#[derive(Debug, Clone, Copy, PartialEq)]
enum Fault {
    Agent(ShipId),
    Flocking,
}

#[cfg(test)]
fn trip(armed: Option<Fault>, point: Fault) {
    if armed == Some(point) {
        panic!("injected fault at {point:?}");
    }
}

impl AiManager {
    pub fn new(config: AiConfig, clock: Box<dyn Clock>) -> Self {
        let config = config.sanitized();
        #[cfg(feature = "ambient")]
        let ambient = AmbientShipManager::new(config.ambient.clone(), fork(&mut seeded(config.seed)));
        let factions = FactionTable::new();
        let snapshot = WorldSnapshot::empty(clock.now_ms(), &factions);

        Self {
            performance: PerformanceManager::new(config.performance.clone()),
            flocking: FlockingCoordinator::new(config.flocking),
            #[cfg(feature = "ambient")]
            ambient,
            clock,
            host: None,
            audio: None,
            telemetry: Box::new(NoopTelemetry),
            store: None,
            agents: AgentMap::default(),
            factions,
            events: EventBus::new(),
            snapshot,
            metrics: AiMetrics::new(),
            enabled: true,
            debug: config.debug,
            difficulty: config.global_difficulty,
            config,
            #[cfg(test)]
            fault: None,
        }
    }

    pub fn with_audio(mut self, audio: Box<dyn AudioSink>) -> Self {
        self.audio = Some(audio);
        self
    }

    pub fn with_telemetry(mut self, telemetry: Box<dyn Telemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn with_store(mut self, store: Box<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Attach the host world. Replaces any previous host.
    pub fn initialize(&mut self, host: Box<dyn HostWorld>) {
        if self.host.is_some() {
            warn!("AI manager re-initialized, replacing host");
        }
        self.host = Some(host);
        self.snapshot = self.capture(self.clock.now_ms());
        info!(
            max_agents = self.config.max_agents,
            difficulty = self.difficulty,
            "AI manager initialized"
        );
    }

    /// Remove every agent, flock and ambient group, then detach the host
    pub fn shutdown(&mut self) {
        let now = self.clock.now_ms();
        #[cfg(feature = "ambient")]
        if let Some(host) = self.host.as_deref_mut() {
            let mut ctx = AmbientContext {
                host,
                agents: &mut self.agents,
                flocking: &mut self.flocking,
                snapshot: &self.snapshot,
                max_agents: self.config.max_agents,
                difficulty: self.difficulty,
                now_ms: now,
            };
            let removed = self.ambient.clear(&mut ctx);
            self.metrics.agents_removed += removed.len() as u64;
            for id in removed {
                self.events.publish(&RegistryEvent::AgentRemoved {
                    id,
                    reason: RemovalReason::Shutdown,
                });
            }
        }

        self.flocking.clear(&mut self.agents);
        let mut ids: Vec<ShipId> = self.agents.keys().copied().collect();
        ids.sort_unstable();
        for id in &ids {
            self.events.publish(&RegistryEvent::AgentRemoved {
                id: *id,
                reason: RemovalReason::Shutdown,
            });
        }
        let count = self.agents.len();
        self.agents.clear();
        self.metrics.agents_removed += count as u64;
        self.events.publish(&RegistryEvent::Cleared { count });
        self.host = None;
        self.snapshot = WorldSnapshot::empty(now, &self.factions);
        self.refresh_gauges();
        info!(removed = count, "AI manager shut down");
    }

    pub fn is_initialized(&self) -> bool {
        self.host.is_some()
    }

    // ------------------------------------------------------------------------
    // Registry
    // ------------------------------------------------------------------------

    /// Register an agent for a host ship
    pub fn add_agent(&mut self, id: ShipId, options: AgentOptions) -> Result<(), ManagerError> {
        let result = self.try_add_agent(id, options);
        if let Err(e) = &result {
            self.report(Level::WARN, &format!("Agent for {} rejected: {}", id, e));
        }
        result
    }

    fn try_add_agent(&mut self, id: ShipId, options: AgentOptions) -> Result<(), ManagerError> {
        let host = self.host.as_deref().ok_or(ManagerError::NoHost)?;
        if self.agents.contains_key(&id) {
            return Err(ManagerError::Duplicate(id));
        }
        if self.agents.len() >= self.config.max_agents {
            return Err(ManagerError::RegistryFull(self.agents.len()));
        }
        let ship = host.ship(id).ok_or(ManagerError::UnknownShip(id))?;

        let now = self.clock.now_ms();
        let mut agent = Agent::new(&ship, options, self.difficulty, self.agent_rng(id), now)?;
        agent.debug = self.debug;
        let class = agent.class;
        debug!(agent = %id, class = class.tag(), faction = %agent.faction, "Agent added");
        self.agents.insert(id, agent);
        self.metrics.agents_added += 1;
        self.events.publish(&RegistryEvent::AgentAdded { id, class });
        self.refresh_gauges();
        Ok(())
    }

    /// Each agent's stream depends only on the root seed and its id
    fn agent_rng(&self, id: ShipId) -> AiRng {
        seeded(self.config.seed ^ id.0.wrapping_mul(0x9E37_79B9_7F4A_7C15))
    }

    /// Remove an agent and every reference to it. Returns false when unknown.
    pub fn remove_agent(&mut self, id: ShipId) -> bool {
        self.remove_with_reason(id, RemovalReason::Requested)
    }

    fn remove_with_reason(&mut self, id: ShipId, reason: RemovalReason) -> bool {
        if self.agents.remove(&id).is_none() {
            return false;
        }
        let now = self.clock.now_ms();
        self.flocking.forget(&mut self.agents, id, now);
        #[cfg(feature = "ambient")]
        self.ambient.forget(id);
        self.metrics.agents_removed += 1;
        debug!(agent = %id, ?reason, "Agent removed");
        self.events.publish(&RegistryEvent::AgentRemoved { id, reason });
        true
    }

    pub fn agent(&self, id: ShipId) -> Option<&Agent> {
        self.agents.get(&id)
    }

    pub fn agent_mut(&mut self, id: ShipId) -> Option<&mut Agent> {
        self.agents.get_mut(&id)
    }

    /// Agents in id order
    pub fn agents(&self) -> Vec<&Agent> {
        let mut list: Vec<&Agent> = self.agents.values().collect();
        list.sort_unstable_by_key(|a| a.id);
        list
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    fn sorted_ids(&self) -> Vec<ShipId> {
        let mut ids: Vec<ShipId> = self.agents.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    // ------------------------------------------------------------------------
    // Frame
    // ------------------------------------------------------------------------

    /// Run one frame. `dt` is the host frame time in seconds; a non-positive
    /// or non-finite value skips the frame. Agents integrate over their own
    /// elapsed time since their last scheduled update.
    pub fn update(&mut self, dt: f32) {
        if !dt.is_finite() || dt <= 0.0 {
            self.metrics.skipped_frames += 1;
            trace!(dt, "Frame skipped");
            return;
        }
        let now = self.clock.now_ms();
        self.snapshot = self.capture(now);
        if !self.enabled {
            return;
        }

        #[cfg(test)]
        let armed = self.fault;

        // Scheduled agent updates
        let mut ticks: Vec<(ShipId, AgentTick)> = Vec::new();
        let mut failures: Vec<(ShipId, AgentError)> = Vec::new();
        let mut faulted: Vec<ShipId> = Vec::new();
        let snapshot = &self.snapshot;
        let report = self.performance.run_frame(
            &mut self.agents,
            snapshot.player.position,
            now,
            &*self.clock,
            |agent, depth, agent_dt| {
                let id = agent.id;
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    #[cfg(test)]
                    trip(armed, Fault::Agent(id));
                    agent.update(snapshot, depth, agent_dt, now)
                }));
                let e = match outcome {
                    Ok(Ok(tick)) => {
                        if tick.transition.is_some() || tick.distress.is_some() || tick.left_world {
                            ticks.push((id, tick));
                        }
                        return Ok(());
                    }
                    Ok(Err(e)) => e,
                    Err(_) => {
                        faulted.push(id);
                        AgentError::Panicked(id)
                    }
                };
                failures.push((id, e.clone()));
                Err(e)
            },
        );
        for (id, e) in &failures {
            self.report(Level::ERROR, &format!("Update of {} failed: {}", id, e));
        }
        // State after a panic is suspect, so the agent is not retried
        for id in faulted {
            self.metrics.faults += 1;
            self.remove_with_reason(id, RemovalReason::Faulted);
        }

        let mut calls: Vec<DistressCall> = Vec::new();
        let mut departed: Vec<ShipId> = Vec::new();
        for (id, tick) in ticks {
            if let Some(t) = tick.transition {
                self.metrics.transitions += 1;
                self.events.publish(&RegistryEvent::StateChanged {
                    id,
                    from: t.from,
                    to: t.to,
                });
            }
            if let Some(call) = tick.distress {
                calls.push(call);
            }
            if tick.left_world {
                departed.push(id);
            }
        }

        self.deliver_distress(&calls, now);
        let flocking = &mut self.flocking;
        let agents = &mut self.agents;
        let flocked = panic::catch_unwind(AssertUnwindSafe(|| {
            #[cfg(test)]
            trip(armed, Fault::Flocking);
            flocking.update(agents, now)
        }));
        if flocked.is_err() {
            self.metrics.faults += 1;
            self.report(Level::ERROR, "Flocking update panicked, disbanding all flocks");
            self.flocking.clear(&mut self.agents);
            for agent in self.agents.values_mut() {
                agent.acceleration = Vec3::ZERO;
            }
        }

        #[cfg(feature = "ambient")]
        let spawned = self.update_ambient(now);
        #[cfg(not(feature = "ambient"))]
        let spawned: Vec<ShipId> = Vec::new();

        self.write_kinematics(now);
        self.cleanup(&departed, &spawned);

        let stats = self.performance.stats();
        let status = self.performance.status();
        self.metrics.record_frame(&report, &stats, status);
        self.refresh_gauges();

        if self.debug {
            debug!(
                frame = report.frame,
                executed = report.executed,
                deferred = report.deferred,
                spent_ms = report.spent_ms,
                budget_ms = report.budget_ms,
                overrun = report.overrun,
                "Frame budget report"
            );
        }
        if report.overrun && status == PerformanceStatus::Critical {
            warn!("AI budget critical: {}", self.performance.status_message());
        }
    }

    fn capture(&self, now: f64) -> WorldSnapshot {
        match self.host.as_deref() {
            Some(host) => WorldSnapshot::capture(host, &self.factions, now),
            None => WorldSnapshot::empty(now, &self.factions),
        }
    }

    /// Hand each distress call to every other agent in id order
    fn deliver_distress(&mut self, calls: &[DistressCall], now: f64) {
        if calls.is_empty() {
            return;
        }
        let ids = self.sorted_ids();
        for call in calls {
            self.metrics.distress_sent += 1;
            let target_position = self.snapshot.contact(call.target).map(|c| c.position);
            for id in &ids {
                if *id == call.sender {
                    continue;
                }
                let Some(agent) = self.agents.get_mut(id) else {
                    continue;
                };
                let before = agent.state();
                if agent.receive_distress(call, target_position, now) {
                    self.metrics.distress_answered += 1;
                    if before != agent.state() {
                        self.metrics.transitions += 1;
                        self.events.publish(&RegistryEvent::StateChanged {
                            id: *id,
                            from: before,
                            to: agent.state(),
                        });
                    }
                }
            }
            trace!(sender = %call.sender, target = %call.target, "Distress delivered");
        }
    }

    #[cfg(feature = "ambient")]
    fn update_ambient(&mut self, now: f64) -> Vec<ShipId> {
        let Some(host) = self.host.as_deref_mut() else {
            return Vec::new();
        };
        let mut ctx = AmbientContext {
            host,
            agents: &mut self.agents,
            flocking: &mut self.flocking,
            snapshot: &self.snapshot,
            max_agents: self.config.max_agents,
            difficulty: self.difficulty,
            now_ms: now,
        };
        let report = self.ambient.update(&mut ctx);

        for id in &report.spawned {
            if let Some(agent) = self.agents.get_mut(id) {
                agent.debug = self.debug;
                let class = agent.class;
                self.metrics.agents_added += 1;
                self.events.publish(&RegistryEvent::AgentAdded { id: *id, class });
            }
        }
        for id in &report.despawned {
            self.metrics.agents_removed += 1;
            self.events.publish(&RegistryEvent::AgentRemoved {
                id: *id,
                reason: RemovalReason::Despawned,
            });
        }

        if let Some(message) = self.ambient.next_message(now) {
            match self.audio.as_deref_mut() {
                Some(audio) => audio.play_message(message.group, &message.text, message.priority),
                None => trace!(group = %message.group, "No audio sink for '{}'", message.text),
            }
        }
        report.spawned
    }

    /// Push kinematics of agents updated this frame back to the host
    fn write_kinematics(&mut self, now: f64) {
        let Some(host) = self.host.as_deref_mut() else {
            return;
        };
        for agent in self.agents.values() {
            if agent.last_update_ms == Some(now) && !agent.departed {
                host.write_kinematics(agent.id, agent.position, agent.velocity, agent.forward);
            }
        }
    }

    /// Remove departed, destroyed and host-removed agents
    fn cleanup(&mut self, departed: &[ShipId], spawned: &[ShipId]) {
        for id in departed {
            if self.remove_with_reason(*id, RemovalReason::LeftWorld) {
                info!(agent = %id, "Agent left the world");
                self.events.publish(&RegistryEvent::LeftWorld { id: *id });
                if let Some(host) = self.host.as_deref_mut() {
                    host.despawn_ship(*id);
                }
            }
        }

        let has_host = self.host.is_some();
        let mut doomed: Vec<(ShipId, RemovalReason)> = Vec::new();
        for id in self.sorted_ids() {
            let Some(agent) = self.agents.get(&id) else {
                continue;
            };
            let contact = self.snapshot.contact(id);
            if agent.is_destroyed() || contact.is_some_and(|c| c.destroyed) {
                doomed.push((id, RemovalReason::Destroyed));
            } else if agent.departed {
                doomed.push((id, RemovalReason::LeftWorld));
            } else if has_host
                && !spawned.contains(&id)
                && contact.is_none()
                && !self.snapshot.is_unplaced(id)
            {
                doomed.push((id, RemovalReason::HostRemoved));
            }
        }
        for (id, reason) in doomed {
            self.remove_with_reason(id, reason);
        }
    }

    fn refresh_gauges(&mut self) {
        let mut by_state = [0usize; 5];
        for agent in self.agents.values() {
            by_state[agent.state() as usize] += 1;
        }
        self.metrics.agents = self.agents.len();
        self.metrics.agents_by_state = by_state;
        self.metrics.flocks = self.flocking.len();
        #[cfg(feature = "ambient")]
        {
            self.metrics.ambient_groups = self.ambient.groups().len();
            self.metrics.ambient_ships = self.ambient.active_ships();
        }
    }

    /// Log and forward to the host telemetry sink
    fn report(&self, level: Level, message: &str) {
        if level == Level::ERROR {
            error!("{}", message);
        } else {
            warn!("{}", message);
        }
        self.telemetry.log(level, message);
    }

    // ------------------------------------------------------------------------
    // Global controls
    // ------------------------------------------------------------------------

    /// Change the default difficulty and re-apply it to every agent
    pub fn set_global_difficulty(&mut self, difficulty: u8) {
        self.difficulty = clamp_difficulty(difficulty);
        for agent in self.agents.values_mut() {
            agent.set_difficulty(self.difficulty);
        }
        info!(difficulty = self.difficulty, "Global difficulty changed");
    }

    pub fn global_difficulty(&self) -> u8 {
        self.difficulty
    }

    /// A disabled manager freezes agents and stops ambient spawning
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            info!(enabled, "AI manager toggled");
        }
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
        for agent in self.agents.values_mut() {
            agent.debug = debug;
        }
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    /// Put the given agents in a flock laid out in `shape`, first id leading
    pub fn create_formation(&mut self, members: &[ShipId], shape: FormationShape) -> Result<FlockId, ManagerError> {
        let now = self.clock.now_ms();
        let flock = self
            .flocking
            .create_flock(&mut self.agents, members, now)
            .ok_or(ManagerError::EmptyFlock)?;
        self.flocking.assign_formation(&mut self.agents, flock, shape, now);
        self.refresh_gauges();
        Ok(flock)
    }

    pub fn disband_formation(&mut self, flock: FlockId) -> bool {
        let disbanded = self.flocking.disband(&mut self.agents, flock);
        self.refresh_gauges();
        disbanded
    }

    /// Force every agent into `state`. Returns how many changed state.
    pub fn force_all_state(&mut self, state: AiState) -> usize {
        let now = self.clock.now_ms();
        let mut changed = 0;
        for id in self.sorted_ids() {
            let Some(agent) = self.agents.get_mut(&id) else {
                continue;
            };
            if let Some(t) = agent.force_state(state, now) {
                changed += 1;
                self.metrics.transitions += 1;
                self.events.publish(&RegistryEvent::StateChanged {
                    id,
                    from: t.from,
                    to: t.to,
                });
            }
        }
        changed
    }

    // ------------------------------------------------------------------------
    // Factions
    // ------------------------------------------------------------------------

    pub fn factions(&self) -> &FactionTable {
        &self.factions
    }

    /// Standing changes take effect in the next frame's snapshot
    pub fn factions_mut(&mut self) -> &mut FactionTable {
        &mut self.factions
    }

    pub fn save_standings(&mut self, key: &str) -> Result<(), ManagerError> {
        let store = self.store.as_deref_mut().ok_or(ManagerError::NoStore)?;
        self.factions.save(store, key)?;
        Ok(())
    }

    /// Returns false when there is no store or no valid saved blob
    pub fn load_standings(&mut self, key: &str) -> bool {
        match self.store.as_deref() {
            Some(store) => self.factions.load(store, key),
            None => false,
        }
    }

    // ------------------------------------------------------------------------
    // Observation
    // ------------------------------------------------------------------------

    pub fn subscribe<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&RegistryEvent) -> anyhow::Result<()> + 'static,
    {
        self.events.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.events.unsubscribe(id)
    }

    pub fn metrics(&self) -> &AiMetrics {
        &self.metrics
    }

    pub fn snapshot(&self) -> &WorldSnapshot {
        &self.snapshot
    }

    pub fn performance(&self) -> &PerformanceManager {
        &self.performance
    }

    pub fn performance_mut(&mut self) -> &mut PerformanceManager {
        &mut self.performance
    }

    pub fn flocking(&self) -> &FlockingCoordinator {
        &self.flocking
    }

    #[cfg(feature = "ambient")]
    pub fn ambient(&self) -> &AmbientShipManager {
        &self.ambient
    }

    pub fn config(&self) -> &AiConfig {
        &self.config
    }

    pub fn now_ms(&self) -> f64 {
        self.clock.now_ms()
    }

    /// Position of the player in the last snapshot
    pub fn player_position(&self) -> Vec3 {
        self.snapshot.player.position
    }
}
