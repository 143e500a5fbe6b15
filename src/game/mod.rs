pub mod agent;
#[cfg(feature = "ambient")]
pub mod ambient;
pub mod constants;
pub mod faction;
pub mod flocking;
pub mod manager;
pub mod performance;
pub mod persistence;
pub mod snapshot;
pub mod types;
