//! Map rules as seen through a running session.

use td_core::content::{CreepType, TowerKind};
use td_core::error::GameError;
use td_core::map::{AuthoredWave, MapDefinition, MapError, MapRules, WaveMode};
use td_core::math::Cell;
use td_core::placement::PlacementError;
use td_core::waves::SpawnPack;
use td_test_utils::fixtures::{on_map, seeded};

fn with_rules(rules: MapRules) -> MapDefinition {
    MapDefinition {
        rules,
        ..MapDefinition::default_map()
    }
}

#[test]
fn test_disallowed_element_is_invalid_tower() {
    let mut sim = on_map(
        with_rules(MapRules {
            allow_elements: Some(vec![TowerKind::Ice]),
            ..MapRules::default()
        }),
        1,
    );
    assert_eq!(
        sim.place_tower(4, 4, TowerKind::Fire),
        Err(PlacementError::InvalidTower)
    );
    assert!(sim.place_tower(4, 4, TowerKind::Ice).is_ok());
    assert!(sim.place_tower(6, 4, TowerKind::Siege).is_ok());
}

#[test]
fn test_unknown_name_keeps_check_order() {
    let mut sim = seeded(1);
    assert_eq!(
        sim.place_tower_named(-1, 0, "LASER"),
        Err(PlacementError::Oob)
    );
    assert_eq!(
        sim.place_tower_named(0, 8, "LASER"),
        Err(PlacementError::Start)
    );
    assert_eq!(
        sim.place_tower_named(4, 4, "LASER"),
        Err(PlacementError::InvalidTower)
    );
    assert!(sim.place_tower_named(4, 4, "cannon").is_ok());
    assert_eq!(sim.state().towers[0].kind, TowerKind::Siege);
}

#[test]
fn test_max_waves_stops_new_waves() {
    let mut sim = on_map(
        with_rules(MapRules {
            max_waves: 1,
            ..MapRules::default()
        }),
        2,
    );
    assert!(sim.start_wave());
    assert!(!sim.start_wave());
    for _ in 0..60 {
        sim.step(0.5);
    }
    assert_eq!(sim.state().counters.waves_cleared, 1);
    assert!(!sim.start_wave());
    assert_eq!(sim.state().wave, 1);
}

#[test]
fn test_authored_waves_run_out() {
    let mut map = MapDefinition::default_map();
    map.waves.mode = WaveMode::Authored;
    map.waves.authored = Some(vec![AuthoredWave {
        packs: vec![SpawnPack::new(CreepType::Runner, 2, 0.5, 1.0)],
    }]);
    let mut sim = on_map(map, 3);

    assert!(sim.start_wave());
    sim.step(1.0 / 60.0);
    assert_eq!(sim.state().creeps.len(), 1);
    assert_eq!(sim.state().creeps[0].kind, CreepType::Runner);
    for _ in 0..80 {
        sim.step(0.5);
    }
    assert!(!sim.start_wave());
    assert_eq!(sim.state().lives, 18);
}

#[test]
fn test_authored_zero_gap_and_hp_use_defaults() {
    let mut map = MapDefinition::default_map();
    map.waves.mode = WaveMode::Authored;
    map.waves.authored = Some(vec![AuthoredWave {
        packs: vec![SpawnPack::new(CreepType::Grunt, 4, 0.0, 0.0)],
    }]);
    let mut sim = on_map(map, 3);

    assert!(sim.start_wave());
    sim.step(1.0 / 60.0);
    sim.step(1.0 / 60.0);
    let creeps = &sim.state().creeps;
    assert_eq!(creeps.len(), 1);
    assert!(creeps[0].hp > 0.0);
    assert_eq!(creeps[0].hp, creeps[0].max_hp);
    assert!(sim.state().waves.is_spawning());
}

#[test]
fn test_speed_caps_restrict_speed() {
    let mut sim = on_map(
        with_rules(MapRules {
            speed_caps: vec![1, 2],
            ..MapRules::default()
        }),
        4,
    );
    sim.set_speed(4);
    assert_eq!(sim.state().speed, 2);
    sim.cycle_speed();
    assert_eq!(sim.state().speed, 1);
    sim.cycle_speed();
    assert_eq!(sim.state().speed, 2);
}

#[test]
fn test_evolutions_can_be_disabled() {
    let mut sim = on_map(
        with_rules(MapRules {
            disable_evolutions: true,
            ..MapRules::default()
        }),
        5,
    );
    sim.place_tower(4, 4, TowerKind::Fire).unwrap();
    assert!(sim.state().selected.is_some());
    assert!(!sim.apply_evolution("f1a"));
    assert!(sim.state().towers[0].tree.is_empty());
}

#[test]
fn test_buildable_mask_blocks_placement() {
    let mut mask = vec![vec![true; 24]; 16];
    mask[3][4] = false;
    let map = MapDefinition {
        buildable_mask: Some(mask),
        ..MapDefinition::default_map()
    };
    let mut sim = on_map(map, 6);
    assert_eq!(
        sim.place_tower(4, 3, TowerKind::Archer),
        Err(PlacementError::NotBuildable)
    );
    assert!(sim.place_tower(5, 3, TowerKind::Archer).is_ok());
}

#[test]
fn test_invalid_map_leaves_session_untouched() {
    let mut sim = seeded(7);
    sim.place_tower(4, 4, TowerKind::Archer).unwrap();
    let before = sim.state_hash();

    let bad = MapDefinition {
        start: Cell::new(40, 0),
        ..MapDefinition::default_map()
    };
    assert!(matches!(
        sim.load_map(bad),
        Err(GameError::InvalidMap(MapError::StartOutOfBounds(_)))
    ));
    assert_eq!(sim.state_hash(), before);
    assert_eq!(sim.state().towers.len(), 1);
}

#[test]
fn test_load_map_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("twist.ron");
    std::fs::write(&path, ron::to_string(&MapDefinition::twist()).unwrap()).unwrap();

    let map = MapDefinition::load(&path).unwrap();
    let mut sim = seeded(8);
    sim.place_tower(4, 4, TowerKind::Archer).unwrap();
    sim.load_map(map).unwrap();

    assert_eq!(sim.map_info().id, "twist-24x16");
    assert_eq!(sim.map_info().blocked_count, 6);
    assert!(sim.state().towers.is_empty());
    assert_eq!(sim.seed(), 8);
    assert!(sim.path_grid().has_route());
}
