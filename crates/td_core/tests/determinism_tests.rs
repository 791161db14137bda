//! End-to-end determinism checks.
//!
//! The same map, seed and action timeline must always produce the same
//! state hash, whatever the timeline contains.

use td_core::map::MapDefinition;
use td_core::replay::Replay;
use td_core::config::SimConfig;
use td_test_utils::determinism::{
    drive, find_first_divergence, run_parallel_simulations, verify_script_determinism,
};
use td_test_utils::fixtures::{basic_script, on_map, seeded};
use td_test_utils::proptest::prelude::*;
use td_test_utils::strategies::{arb_script, arb_seed};

#[test]
fn test_basic_script_is_deterministic() {
    verify_script_determinism(|| seeded(1234), &basic_script(), 3, 1800).assert_deterministic();
}

#[test]
fn test_twist_map_is_deterministic() {
    let result = verify_script_determinism(
        || on_map(MapDefinition::twist(), 77),
        &basic_script(),
        2,
        1200,
    );
    result.assert_deterministic();
}

#[test]
fn test_parallel_simulations_agree() {
    run_parallel_simulations(|| seeded(99), &basic_script(), 4, 900).assert_deterministic();
}

#[test]
fn test_hash_changes_as_game_progresses() {
    let script = basic_script();
    let mut sim = seeded(4);
    let start = sim.state_hash();
    for tick in 0..120 {
        drive(&mut sim, &script, tick);
    }
    assert_ne!(sim.state_hash(), start);
    assert_eq!(sim.state().tick, 120);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_same_seed_same_hash(seed in arb_seed(), script in arb_script(12, 300)) {
        prop_assert_eq!(find_first_divergence(|| seeded(seed), &script, 400), None);
    }

    #[test]
    fn prop_replay_verifies(seed in arb_seed(), script in arb_script(8, 200)) {
        let replay = Replay::record(
            MapDefinition::default_map(),
            SimConfig::default(),
            seed,
            script,
            240,
        )
        .unwrap();
        let decoded = Replay::from_bytes(&replay.to_bytes().unwrap()).unwrap();
        prop_assert_eq!(decoded.verify().unwrap(), replay.final_hash);
    }
}
