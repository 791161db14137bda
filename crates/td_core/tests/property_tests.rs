//! Property tests for combat math and path maintenance.

use td_core::combat::{apply_damage, apply_status, Combo, MAX_RESIST, MIN_RESIST};
use td_core::components::{Creep, CreepId};
use td_core::content::{Behavior, StatusKind};
use td_core::math::{Cell, Vec2};
use td_test_utils::fixtures::rich;
use td_test_utils::proptest::prelude::*;
use td_test_utils::strategies::{
    arb_cell, arb_creep_type, arb_status_kind, arb_tower_kind, arb_tower_mods,
};

fn dummy(kind: td_core::content::CreepType) -> Creep {
    Creep::new(
        CreepId(1),
        kind,
        1,
        10_000.0,
        40.0,
        5,
        Behavior::Linear,
        vec![Vec2::ZERO, Vec2::new(320.0, 0.0)],
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_damage_follows_clamped_resistance(
        kind in arb_creep_type(),
        element in arb_tower_kind(),
        raw in 0.0..500.0f64,
        shred in 0.0..1.5f64,
    ) {
        let mut creep = dummy(kind);
        let base = kind.profile().resist.get(element);
        let expected = raw * (1.0 - (base - shred).clamp(MIN_RESIST, MAX_RESIST));

        let dealt = apply_damage(&mut creep, raw, element, shred);
        prop_assert!((dealt - expected).abs() < 1e-9);
        prop_assert!(dealt >= raw * (1.0 - MAX_RESIST) - 1e-9);
        prop_assert!(dealt <= raw * (1.0 - MIN_RESIST) + 1e-9);
        prop_assert!((creep.hp - (10_000.0 - dealt)).abs() < 1e-9);
    }

    #[test]
    fn prop_poison_stacks_are_capped(
        mods in arb_tower_mods(),
        applications in 1usize..20,
    ) {
        let mut creep = dummy(td_core::content::CreepType::Grunt);
        for _ in 0..applications {
            apply_status(&mut creep, StatusKind::Poison, &mods);
        }
        let poison = creep.status.poison.unwrap();
        prop_assert!(poison.stacks >= 1);
        prop_assert!(poison.stacks <= 1 + mods.max_stacks);
        let expected = u32::try_from(applications).unwrap().min(1 + mods.max_stacks);
        prop_assert_eq!(poison.stacks, expected);
    }

    #[test]
    fn prop_combo_fires_once_per_episode(
        mods in arb_tower_mods(),
        statuses in prop::collection::vec(arb_status_kind(), 1..30),
    ) {
        let mut creep = dummy(td_core::content::CreepType::Tank);
        let mut fired: Vec<Combo> = Vec::new();
        for status in statuses {
            if let Some(combo) = apply_status(&mut creep, status, &mods) {
                prop_assert!(!fired.contains(&combo), "{:?} fired twice", combo);
                fired.push(combo);
            }
        }
        // Without ticking nothing expires, so every fired combo is still latched.
        for combo in fired {
            prop_assert!(creep.status.latched(combo));
        }
    }

    #[test]
    fn prop_chill_never_exceeds_cap(mods in arb_tower_mods()) {
        let mut creep = dummy(td_core::content::CreepType::Runner);
        apply_status(&mut creep, StatusKind::Chill, &mods);
        let slow = creep.status.slow();
        prop_assert!((0.0..=0.85).contains(&slow));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_building_never_seals_the_path(
        seed in any::<u32>(),
        ops in prop::collection::vec((arb_cell(24, 16), any::<bool>()), 1..60),
    ) {
        let mut sim = rich(seed, 10_000);
        let start = sim.path_grid().start();
        let end = sim.path_grid().end();
        for (cell, sell) in ops {
            if sell {
                if let Some(id) = sim.state().tower_at(cell).map(|t| t.id) {
                    prop_assert!(sim.sell_tower(id));
                    prop_assert!(!sim.path_grid().has_tower(cell));
                }
            } else if sim.place_tower(cell.x, cell.y, td_core::content::TowerKind::Archer).is_ok() {
                prop_assert!(sim.path_grid().has_tower(cell));
            }
            prop_assert!(sim.path_grid().has_route());
            prop_assert_eq!(sim.path_grid().path().first().copied(), Some(start));
            prop_assert_eq!(sim.path_grid().path().last().copied(), Some(end));
            prop_assert!(sim.state().tower_at(start).is_none());
            prop_assert!(sim.state().tower_at(end).is_none());
        }
        let towers: Vec<Cell> = sim.state().towers.iter().map(|t| t.cell).collect();
        for cell in towers {
            prop_assert!(!sim.path_grid().on_path(cell));
        }
    }
}
