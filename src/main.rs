//! Headless simulator
//!
//! Populates an in-process world, runs the AI tier for a fixed number of
//! frames at a fixed step, and prints the performance summary and metrics.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

use glam::Vec3;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

use fleet_ai::game::persistence::FileStore;
use fleet_ai::host::{Clock, ManualClock, Telemetry};
use fleet_ai::sim::{RecordingAudio, SimWorld};
use fleet_ai::{AgentOptions, AiConfig, AiManager, RegistryEvent};

/// Frame step of the simulation
const STEP_MS: f64 = 1000.0 / 60.0;

/// Scheduling time is stepped; budget time is measured on the wall clock
struct SteppedClock {
    frame: ManualClock,
    origin: Instant,
}

impl Clock for SteppedClock {
    fn now_ms(&self) -> f64 {
        self.frame.now_ms()
    }

    fn perf_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// Counts warnings and errors reported to the host
#[derive(Clone, Default)]
struct CountingTelemetry {
    problems: Rc<Cell<u64>>,
}

impl Telemetry for CountingTelemetry {
    fn log(&self, level: Level, _message: &str) {
        if level <= Level::WARN {
            self.problems.set(self.problems.get() + 1);
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("Fleet AI simulator v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AiConfig::load_or_default();
    config.validate().map_err(anyhow::Error::msg)?;
    info!(
        "Configuration loaded: max_agents={}, difficulty={}, seed={:#x}",
        config.max_agents, config.global_difficulty, config.seed
    );

    let frames: u64 = env_or("SIM_FRAMES", 3600);
    let ships: usize = env_or("SIM_SHIPS", 120);
    let radius: f32 = env_or("SIM_RADIUS", 60.0);
    let orbit_speed: f32 = env_or("SIM_PLAYER_SPEED", 0.05);

    let world = SimWorld::new();
    world.add_player(Vec3::ZERO);
    let ids = world.populate(ships, radius, config.seed);

    let clock = ManualClock::new();
    let audio = RecordingAudio::new();
    let telemetry = CountingTelemetry::default();
    let mut manager = AiManager::new(
        config.clone(),
        Box::new(SteppedClock {
            frame: clock.clone(),
            origin: Instant::now(),
        }),
    )
    .with_audio(Box::new(audio.clone()))
    .with_telemetry(Box::new(telemetry.clone()));

    if let Ok(dir) = std::env::var("SIM_STATE_DIR") {
        manager = manager.with_store(Box::new(FileStore::new(dir)));
        if manager.load_standings(fleet_ai::game::manager::DEFAULT_STANDINGS_KEY) {
            info!("Faction standings restored");
        }
    }

    manager.subscribe(|event| {
        if let RegistryEvent::LeftWorld { id } = event {
            info!("{} warped out", id);
        }
        Ok(())
    });
    manager.initialize(Box::new(world.clone()));

    let mut rejected = 0;
    for id in ids {
        if manager.add_agent(id, AgentOptions::default()).is_err() {
            rejected += 1;
        }
    }
    info!("Registered {} agents ({} rejected)", manager.len(), rejected);

    let started = Instant::now();
    for frame in 0..frames {
        clock.advance(STEP_MS);
        // Slow circle so ships cross LOD bands
        let angle = frame as f32 * orbit_speed * STEP_MS as f32 / 1000.0;
        world.move_player(Vec3::new(angle.cos(), 0.0, angle.sin()) * 20.0);
        manager.update(STEP_MS as f32 / 1000.0);

        if frame > 0 && frame % 600 == 0 {
            info!("{}", manager.performance().status_message());
        }
    }

    let stats = manager.performance().stats();
    info!(
        "Ran {} frames in {:.2}s: {} agents, {} overruns, {} deferred, {} radio lines",
        frames,
        started.elapsed().as_secs_f64(),
        manager.len(),
        stats.overruns,
        stats.deferred_total,
        audio.len()
    );
    if telemetry.problems.get() > 0 {
        warn!("{} problems reported to the host", telemetry.problems.get());
    }

    if std::env::var("SIM_STATE_DIR").is_ok() {
        manager.save_standings(fleet_ai::game::manager::DEFAULT_STANDINGS_KEY)?;
    }
    manager.shutdown();

    println!("{}", manager.metrics().to_prometheus());
    Ok(())
}
