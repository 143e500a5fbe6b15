//! Station catalog and trade route risk.

use glam::Vec3;
use serde::Serialize;

use crate::game::faction::{Diplomacy, Faction};
use crate::game::snapshot::WorldSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Station {
    pub name: &'static str,
    pub faction: Faction,
    pub position: Vec3,
}

/// Known stations, world coordinates in km
pub const STATIONS: [Station; 6] = [
    Station { name: "Halcyon Station", faction: Faction::Federation, position: Vec3::new(60.0, 0.0, 20.0) },
    Station { name: "Bastion Prime", faction: Faction::Empire, position: Vec3::new(-70.0, 5.0, 40.0) },
    Station { name: "Tradewind Exchange", faction: Faction::FreeTraders, position: Vec3::new(30.0, -3.0, -65.0) },
    Station { name: "Deepcore Refinery", faction: Faction::MiningGuild, position: Vec3::new(-40.0, 0.0, -80.0) },
    Station { name: "Blackwake Haven", faction: Faction::Pirates, position: Vec3::new(110.0, 8.0, -30.0) },
    Station { name: "Meridian Waypoint", faction: Faction::Neutral, position: Vec3::new(-20.0, 0.0, 90.0) },
];

/// Added risk per km of route length
const RISK_PER_KM: f32 = 0.001;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeRoute {
    pub from: Station,
    pub to: Station,
    /// 0 (safe) and up
    pub risk: f32,
}

impl TradeRoute {
    pub fn length(&self) -> f32 {
        self.from.position.distance(self.to.position)
    }
}

fn endpoint_risk(diplomacy: Diplomacy) -> f32 {
    match diplomacy {
        Diplomacy::Enemy => 1.0,
        Diplomacy::Neutral => 0.4,
        Diplomacy::Friendly => 0.1,
    }
}

/// Risk of flying between two stations given current diplomacy
pub fn route_risk(from: &Station, to: &Station, snapshot: &WorldSnapshot) -> f32 {
    let ends = (endpoint_risk(snapshot.diplomacy(from.faction)) + endpoint_risk(snapshot.diplomacy(to.faction))) / 2.0;
    ends + from.position.distance(to.position) * RISK_PER_KM
}

pub fn nearest_station(position: Vec3) -> &'static Station {
    let mut best = &STATIONS[0];
    for station in &STATIONS[1..] {
        if station.position.distance_squared(position) < best.position.distance_squared(position) {
            best = station;
        }
    }
    best
}

/// Every route out of the station nearest `origin`, safest first
pub fn routes_from(origin: Vec3, snapshot: &WorldSnapshot) -> Vec<TradeRoute> {
    let from = *nearest_station(origin);
    let mut routes: Vec<TradeRoute> = STATIONS
        .iter()
        .filter(|s| s.name != from.name)
        .map(|to| TradeRoute {
            from,
            to: *to,
            risk: route_risk(&from, to, snapshot),
        })
        .collect();
    routes.sort_by(|a, b| a.risk.total_cmp(&b.risk).then(a.to.name.cmp(b.to.name)));
    routes
}

/// Safest route out of the nearest station
pub fn safest_route(origin: Vec3, snapshot: &WorldSnapshot) -> Option<TradeRoute> {
    routes_from(origin, snapshot).into_iter().next()
}

/// Nearest station owned by `faction`, if it has one
pub fn home_station(faction: Faction, near: Vec3) -> Option<&'static Station> {
    STATIONS
        .iter()
        .filter(|s| s.faction == faction)
        .min_by(|a, b| a.position.distance(near).total_cmp(&b.position.distance(near)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::faction::FactionTable;
    use crate::game::types::Pose;

    fn snapshot_with(table: &FactionTable) -> WorldSnapshot {
        WorldSnapshot::from_contacts(0.0, Pose::default(), Vec::new(), table)
    }

    #[test]
    fn test_pirate_endpoints_are_riskiest() {
        let snap = snapshot_with(&FactionTable::new());
        let routes = routes_from(Vec3::new(60.0, 0.0, 20.0), &snap);
        assert_eq!(routes.len(), STATIONS.len() - 1);
        assert_eq!(routes.last().unwrap().to.faction, Faction::Pirates);
        assert!(routes.windows(2).all(|w| w[0].risk <= w[1].risk));
    }

    #[test]
    fn test_risk_follows_diplomacy() {
        let mut table = FactionTable::new();
        let from = STATIONS[0];
        let to = STATIONS[2];
        let before = route_risk(&from, &to, &snapshot_with(&table));
        table.set_standing(Faction::FreeTraders, -60, "test");
        let after = route_risk(&from, &to, &snapshot_with(&table));
        assert!(after > before);
    }

    #[test]
    fn test_home_station() {
        assert_eq!(home_station(Faction::Empire, Vec3::ZERO).unwrap().name, "Bastion Prime");
        assert_eq!(nearest_station(Vec3::new(100.0, 0.0, -25.0)).faction, Faction::Pirates);
    }
}
