//! Fleet AI
//!
//! Enemy and ambient ship AI for a space game, driven one frame at a time by
//! a host world.
//!
//! # Features
//!
//! - `ambient` - Ambient traffic: convoys, patrols, raiders and their radio chatter (enabled by default)

pub mod config;
pub mod events;
pub mod game;
pub mod host;
pub mod metrics;
pub mod sim;
pub mod util;

pub use config::AiConfig;
pub use game::agent::{AgentOptions, AiState};
pub use game::faction::Faction;
pub use game::flocking::FormationShape;
pub use game::manager::{AiManager, ManagerError, RegistryEvent, RemovalReason};
pub use game::types::{ShipClass, ShipId};
pub use host::{AudioSink, Clock, HostWorld, Telemetry};
