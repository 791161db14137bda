//! Headless runs cross-checked against the shared determinism harness.

use td_headless::{record_replay, run_scenario, Scenario};
use td_test_utils::determinism::{
    find_first_divergence, run_parallel_simulations, verify_script_determinism,
};

#[test]
fn test_runner_matches_harness_drive() {
    let scenario = Scenario::gauntlet();
    let seed = 21;
    let report = run_scenario(&scenario, seed).unwrap();

    let result = verify_script_determinism(
        || scenario.build(seed).unwrap(),
        &scenario.timeline,
        2,
        scenario.ticks,
    );
    result.assert_deterministic();
    assert_eq!(result.hashes[0], report.state_hash);
}

#[test]
fn test_builtin_scenarios_never_diverge() {
    for name in ["opening", "gauntlet", "idle"] {
        let scenario = Scenario::builtin(name).unwrap();
        let divergence = find_first_divergence(
            || scenario.build(scenario.seed).unwrap(),
            &scenario.timeline,
            600,
        );
        assert_eq!(divergence, None, "{name}");
    }
}

#[test]
fn test_threads_agree_with_replay() {
    let scenario = Scenario::opening();
    let replay = record_replay(&scenario, 5).unwrap();

    let result = run_parallel_simulations(
        || scenario.build(5).unwrap(),
        &scenario.timeline,
        4,
        scenario.ticks,
    );
    result.assert_deterministic();
    assert_eq!(result.hashes[0], replay.final_hash);
}

#[test]
fn test_recorded_replay_survives_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gauntlet.replay");
    let replay = record_replay(&Scenario::gauntlet(), 8).unwrap();
    replay.save(&path).unwrap();

    let loaded = td_core::replay::Replay::load(&path).unwrap();
    assert_eq!(loaded, replay);
    assert_eq!(loaded.verify().unwrap(), replay.final_hash);
}
