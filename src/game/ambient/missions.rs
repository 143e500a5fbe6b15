//! Mission-level goals for ambient groups.
//!
//! A mission only steers the group leader by setting its waypoint; the rest
//! of the group follows through the flock formation.

use glam::Vec3;
use rand::Rng;
use serde::Serialize;

use super::routes::{home_station, nearest_station, safest_route, TradeRoute};
use super::GroupBehavior;
use crate::game::constants::fsm::WAYPOINT_ARRIVAL;
use crate::game::faction::Faction;
use crate::game::snapshot::WorldSnapshot;
use crate::util::rng::{horizontal_unit, AiRng};

/// Patrol square half-size around the spawn point
const PATROL_RADIUS: f32 = 6.0;
/// Explorers pick targets within this distance of their position
const EXPLORE_RANGE: f32 = 15.0;
/// Explorers re-target at least this often
const EXPLORE_RETARGET_MS: f64 = 20_000.0;
/// Mining sites are picked this far from the spawn point
const MINING_OFFSET: f32 = 3.0;

/// Leader within this distance of its waypoint moves on to the next one
const ADVANCE_DISTANCE: f32 = WAYPOINT_ARRIVAL * 2.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Mission {
    Convoy { route: Option<TradeRoute>, arrived: bool },
    Patrol { waypoints: Vec<Vec3>, index: usize },
    Raid,
    Explore { target: Vec3, retarget_ms: f64 },
    Escort { destination: Vec3 },
    Mining { site: Vec3 },
}

impl Mission {
    /// Plan a mission for a group spawned at `anchor`
    pub fn plan(
        behavior: GroupBehavior,
        faction: Faction,
        anchor: Vec3,
        snapshot: &WorldSnapshot,
        rng: &mut AiRng,
        now_ms: f64,
    ) -> Self {
        match behavior {
            GroupBehavior::TradeConvoy => Mission::Convoy {
                route: safest_route(anchor, snapshot),
                arrived: false,
            },
            GroupBehavior::Patrol => {
                let r = PATROL_RADIUS;
                let waypoints = [
                    Vec3::new(r, 0.0, r),
                    Vec3::new(-r, 0.0, r),
                    Vec3::new(-r, 0.0, -r),
                    Vec3::new(r, 0.0, -r),
                ]
                .iter()
                .map(|offset| anchor + *offset)
                .collect();
                Mission::Patrol { waypoints, index: 0 }
            }
            GroupBehavior::Raider => Mission::Raid,
            GroupBehavior::Exploration => Mission::Explore {
                target: anchor + horizontal_unit(rng) * rng.gen_range(EXPLORE_RANGE * 0.5..EXPLORE_RANGE),
                retarget_ms: now_ms + EXPLORE_RETARGET_MS,
            },
            GroupBehavior::DiplomaticEscort => {
                let station = home_station(faction, anchor).unwrap_or_else(|| nearest_station(anchor));
                Mission::Escort {
                    destination: station.position,
                }
            }
            GroupBehavior::MiningOperation => Mission::Mining {
                site: anchor + horizontal_unit(rng) * MINING_OFFSET,
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Mission::Convoy { .. } => "convoy",
            Mission::Patrol { .. } => "patrol",
            Mission::Raid => "raid",
            Mission::Explore { .. } => "explore",
            Mission::Escort { .. } => "escort",
            Mission::Mining { .. } => "mining",
        }
    }

    /// Waypoint for the group leader this frame. `None` lets the leader
    /// fall back to idle wandering.
    pub fn waypoint(&mut self, leader: Vec3, player: Vec3, rng: &mut AiRng, now_ms: f64) -> Option<Vec3> {
        match self {
            Mission::Convoy { route, arrived } => {
                let destination = route.as_ref()?.to.position;
                if !*arrived && leader.distance(destination) <= ADVANCE_DISTANCE {
                    *arrived = true;
                }
                Some(destination)
            }
            Mission::Patrol { waypoints, index } => {
                if waypoints.is_empty() {
                    return None;
                }
                if leader.distance(waypoints[*index]) <= ADVANCE_DISTANCE {
                    *index = (*index + 1) % waypoints.len();
                }
                Some(waypoints[*index])
            }
            Mission::Raid => Some(player),
            Mission::Explore { target, retarget_ms } => {
                if leader.distance(*target) <= ADVANCE_DISTANCE || now_ms >= *retarget_ms {
                    *target = leader + horizontal_unit(rng) * rng.gen_range(EXPLORE_RANGE * 0.5..EXPLORE_RANGE);
                    *retarget_ms = now_ms + EXPLORE_RETARGET_MS;
                }
                Some(*target)
            }
            Mission::Escort { destination } => Some(*destination),
            Mission::Mining { site } => Some(*site),
        }
    }
}
