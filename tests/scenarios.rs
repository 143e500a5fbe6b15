//! End-to-end scenarios driving the AI tier through an in-process world

use glam::Vec3;

use fleet_ai::config::BehaviorWeights;
use fleet_ai::game::agent::{Agent, AgentMap};
use fleet_ai::game::ambient::GroupBehavior;
use fleet_ai::game::faction::{Diplomacy, FactionTable};
use fleet_ai::game::flocking::{FlockingConfig, FlockingCoordinator};
use fleet_ai::game::performance::UpdateDepth;
use fleet_ai::game::snapshot::WorldSnapshot;
use fleet_ai::game::types::Pose;
use fleet_ai::host::ManualClock;
use fleet_ai::sim::SimWorld;
use fleet_ai::util::rng::seeded;
use fleet_ai::{AgentOptions, AiConfig, AiManager, AiState, Faction, FormationShape, ShipClass, ShipId};

const FRAME_MS: f64 = 17.0;

fn quiet_config() -> AiConfig {
    let mut config = AiConfig::default();
    config.ambient.max_ships = 0;
    config
}

fn manager_for(world: &SimWorld, config: AiConfig, clock: &ManualClock) -> AiManager {
    let mut manager = AiManager::new(config, Box::new(clock.clone()));
    manager.initialize(Box::new(world.clone()));
    manager
}

fn step(manager: &mut AiManager, clock: &ManualClock) {
    clock.advance(FRAME_MS);
    manager.update(FRAME_MS as f32 / 1000.0);
}

/// Step until `id` has been updated once more
fn step_until_updated(manager: &mut AiManager, clock: &ManualClock, id: ShipId) {
    let before = manager.agent(id).map_or(0, |a| a.update_count);
    for _ in 0..100 {
        step(manager, clock);
        if manager.agent(id).map_or(0, |a| a.update_count) > before {
            return;
        }
    }
    panic!("{id} was never updated");
}

#[test]
fn engage_then_flee() {
    let world = SimWorld::new();
    let player = world.add_player(Vec3::new(1.0, 0.0, 0.0));
    let id = world.add_ship(ShipClass::LightFighter, Faction::Pirates, Vec3::ZERO);
    let factions = FactionTable::new();

    let options = AgentOptions {
        sensor_range: Some(2.0),
        engage_range: Some(1.5),
        flee_threshold: Some(0.2),
        ..Default::default()
    };
    let ship = world.ship_state(id).unwrap();
    let mut agent = Agent::new(&ship, options, 50, seeded(1), 0.0).unwrap();
    let dt = 1.0 / 60.0;
    let mut now = 0.0;

    let snapshot = WorldSnapshot::capture(&world, &factions, now);
    let tick = agent.update(&snapshot, UpdateDepth::Full, dt, now).unwrap();
    assert_eq!(tick.transition.map(|t| (t.from, t.to)), Some((AiState::Idle, AiState::Engage)));
    assert_eq!(agent.target, Some(player));

    for _ in 2..=60 {
        now += 1000.0 / 60.0;
        let snapshot = WorldSnapshot::capture(&world, &factions, now);
        agent.update(&snapshot, UpdateDepth::Full, dt, now).unwrap();
        assert_eq!(agent.state(), AiState::Engage);
        assert!(agent.velocity.length() > 0.0);
    }

    world.set_hull(id, 15.0);
    now += 1000.0 / 60.0;
    let snapshot = WorldSnapshot::capture(&world, &factions, now);
    let tick = agent.update(&snapshot, UpdateDepth::Full, dt, now).unwrap();
    assert_eq!(tick.transition.map(|t| t.to), Some(AiState::Flee));
    assert_eq!(agent.state(), AiState::Flee);
    assert_eq!(agent.target, None);
}

#[test]
fn vee_formation_follows_leader() {
    let world = SimWorld::new();
    let mut agents = AgentMap::default();
    let ids: Vec<ShipId> = (0..5)
        .map(|_| world.add_ship(ShipClass::LightFighter, Faction::Empire, Vec3::ZERO))
        .collect();
    for id in &ids {
        let ship = world.ship_state(*id).unwrap();
        agents.insert(*id, Agent::new(&ship, AgentOptions::default(), 50, seeded(id.0), 0.0).unwrap());
    }

    let mut coordinator = FlockingCoordinator::new(FlockingConfig::default());
    let flock = coordinator.create_flock(&mut agents, &ids, 0.0).unwrap();
    let shape = FormationShape::Vee {
        spacing: 1.5,
        wing_count: 2,
    };
    assert!(coordinator.assign_formation(&mut agents, flock, shape, 0.0));
    coordinator.update(&mut agents, 0.0);

    let expected = shape.slots(&Pose::new(Vec3::ZERO, Vec3::Z), 5);
    assert_eq!(agents[&ids[0]].slot_target, None);
    for (i, id) in ids.iter().enumerate().skip(1) {
        assert!(agents[id].slot_target.unwrap().abs_diff_eq(expected[i], 1e-5));
    }

    let offset = Vec3::Z * 5.0;
    agents.get_mut(&ids[0]).unwrap().position = offset;
    coordinator.update(&mut agents, 100.0);
    for (i, id) in ids.iter().enumerate().skip(1) {
        assert!(agents[id].slot_target.unwrap().abs_diff_eq(expected[i] + offset, 1e-5));
    }
}

#[test]
fn distant_agents_are_demoted() {
    let world = SimWorld::new();
    world.add_player(Vec3::ZERO);
    let clock = ManualClock::with_sample_cost(0.05);
    let mut config = quiet_config();
    config.performance.update_budget_ms = 4.0;
    let mut manager = manager_for(&world, config, &clock);

    // Spread evenly from 0 to 80 km around the player
    let mut near = Vec::new();
    let mut far = Vec::new();
    for i in 0..200 {
        let distance = 80.0 * (i as f32 + 0.5) / 200.0;
        let angle = i as f32 * 2.399;
        let position = Vec3::new(angle.cos(), 0.0, angle.sin()) * distance;
        let id = world.add_ship(ShipClass::Freighter, Faction::Neutral, position);
        manager.add_agent(id, AgentOptions::default()).unwrap();
        if distance < 9.0 {
            near.push(id);
        } else if distance > 52.0 {
            far.push(id);
        }
    }

    for _ in 0..100 {
        step(&mut manager, &clock);
    }

    for id in &near {
        let count = manager.agent(*id).unwrap().update_count;
        assert!(count >= 18, "{id} got only {count} updates");
    }
    for id in &far {
        let count = manager.agent(*id).unwrap().update_count;
        assert!(count <= 10, "{id} got {count} updates");
    }
}

#[test]
fn faction_change_cascades_to_engagement() {
    let world = SimWorld::new();
    world.add_player(Vec3::new(0.0, 0.0, -9.0));
    let fighter = world.add_ship(ShipClass::LightFighter, Faction::Federation, Vec3::ZERO);
    let trader = world.add_ship(ShipClass::Freighter, Faction::FreeTraders, Vec3::new(1.0, 0.0, 0.0));

    let clock = ManualClock::new();
    let mut manager = manager_for(&world, quiet_config(), &clock);
    manager.add_agent(fighter, AgentOptions::default()).unwrap();
    manager.add_agent(trader, AgentOptions::default()).unwrap();

    for _ in 0..10 {
        step(&mut manager, &clock);
    }
    assert_eq!(manager.agent(fighter).unwrap().state(), AiState::Idle);
    assert_eq!(manager.snapshot().diplomacy(Faction::FreeTraders), Diplomacy::Neutral);

    manager
        .factions_mut()
        .set_standing(Faction::FreeTraders, -30, "convoy ambush");
    step_until_updated(&mut manager, &clock, fighter);

    let snapshot = manager.snapshot();
    assert_eq!(snapshot.diplomacy(Faction::FreeTraders), Diplomacy::Enemy);
    let contact = snapshot.contact(trader).unwrap();
    assert!(snapshot.is_hostile(Faction::Federation, contact));

    let agent = manager.agent(fighter).unwrap();
    assert_eq!(agent.state(), AiState::Engage);
    assert_eq!(agent.target, Some(trader));
}

#[test]
fn ambient_raiders_spawn_and_despawn() {
    let world = SimWorld::new();
    world.add_player(Vec3::ZERO);
    let clock = ManualClock::new();
    let mut config = AiConfig::default();
    config.ambient.max_ships = 20;
    config.ambient.weights = BehaviorWeights::raiders_only();
    let spawn_radius = config.ambient.spawn_radius;
    let mut manager = manager_for(&world, config, &clock);

    // Up to 15 s with the player parked at the origin
    let mut raid = None;
    for _ in 0..(15_000.0 / FRAME_MS) as usize {
        step(&mut manager, &clock);
        if let Some(group) = manager
            .ambient()
            .groups()
            .iter()
            .find(|g| g.behavior == GroupBehavior::Raider)
        {
            raid = Some(group.clone());
            break;
        }
    }
    let raid = raid.expect("no raider group spawned");
    assert!((1..=4).contains(&raid.members.len()));
    for member in &raid.members {
        let position = world.ship_state(*member).unwrap().position.unwrap();
        let distance = position.length();
        assert!(
            distance >= spawn_radius && distance <= spawn_radius + 5.0,
            "{member} spawned {distance} km out"
        );
        assert!(manager.agent(*member).is_some());
    }

    // Move the player 30 km away from the group
    let leader = raid.leader().unwrap();
    let leader_position = world.ship_state(leader).unwrap().position.unwrap();
    let away = -Vec3::new(leader_position.x, 0.0, leader_position.z).normalize() * 30.0;
    world.move_player(away);
    step(&mut manager, &clock);

    assert!(manager.ambient().group(raid.id).is_none());
    for member in &raid.members {
        assert!(manager.agent(*member).is_none());
        assert!(!world.contains(*member));
    }
}
