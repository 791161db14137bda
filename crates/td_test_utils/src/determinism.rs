//! Harness for replaying the same session several times and comparing
//! fingerprints.
//!
//! A session is fully determined by its map, seed and action timeline. The
//! usual ways that breaks in this engine:
//!
//! - iterating a `HashMap` (entity lists stay in id order, lookups are
//!   `BTreeMap`s);
//! - drawing randomness outside [`td_core::rng::SimRng`] (particles have
//!   their own stream and are excluded from the hash);
//! - visiting creeps or towers in a different order, which changes f64
//!   accumulation.
//!
//! Unit tests exercise single systems; the helpers here cover whole
//! scripted sessions, sequentially, tick by tick, or on threads.

use std::thread;

use td_core::replay::TimedAction;
use td_core::simulation::Simulation;

fn distinct(hashes: &[u64]) -> Vec<u64> {
    let mut out = hashes.to_vec();
    out.sort_unstable();
    out.dedup();
    out
}

/// Final hashes of repeated runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// All runs ended on the same hash.
    pub is_deterministic: bool,
    /// One hash per run, in run order.
    pub hashes: Vec<u64>,
    /// Ticks driven per run.
    pub ticks: u64,
}

impl DeterminismResult {
    /// Distinct final hashes, sorted.
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        distinct(&self.hashes)
    }

    /// # Panics
    ///
    /// Panics listing every hash when the runs disagree.
    pub fn assert_deterministic(&self) {
        assert!(
            self.is_deterministic,
            "{} runs of {} ticks ended on {} different hashes: {:016x?}",
            self.hashes.len(),
            self.ticks,
            self.unique_hashes().len(),
            self.hashes
        );
    }
}

/// Build a state `runs` times, advance it `ticks` times and hash it.
///
/// Generic over the state so system-level tests can use it on something
/// smaller than a whole [`Simulation`].
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    ticks: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S, u64),
    HashFn: Fn(&S) -> u64,
{
    let hashes: Vec<u64> = (0..runs)
        .map(|_| {
            let mut state = setup();
            (0..ticks).for_each(|tick| step(&mut state, tick));
            hash(&state)
        })
        .collect();

    DeterminismResult {
        is_deterministic: distinct(&hashes).len() <= 1,
        hashes,
        ticks,
    }
}

/// Apply the actions scheduled for `tick`, then take one fixed step.
pub fn drive(sim: &mut Simulation, script: &[TimedAction], tick: u64) {
    for timed in script.iter().filter(|a| a.tick == tick) {
        sim.apply_action(&timed.action);
    }
    let dt = sim.config().fixed_step;
    sim.step(dt);
}

/// Run a scripted session `runs` times and compare final hashes.
pub fn verify_script_determinism<F>(
    setup_fn: F,
    script: &[TimedAction],
    runs: usize,
    num_ticks: u64,
) -> DeterminismResult
where
    F: Fn() -> Simulation,
{
    verify_determinism(
        runs,
        num_ticks,
        &setup_fn,
        |sim, tick| drive(sim, script, tick),
        Simulation::state_hash,
    )
}

/// Final hashes of sessions driven on separate threads.
#[derive(Debug, Clone)]
pub struct ParallelSimResult {
    /// One hash per thread, in spawn order.
    pub hashes: Vec<u64>,
    /// Ticks driven per session.
    pub ticks: u64,
}

impl ParallelSimResult {
    /// Every thread ended on the same hash.
    #[must_use]
    pub fn is_deterministic(&self) -> bool {
        distinct(&self.hashes).len() <= 1
    }

    /// # Panics
    ///
    /// Panics listing every hash when the threads disagree.
    pub fn assert_deterministic(&self) {
        assert!(
            self.is_deterministic(),
            "{} threaded sessions of {} ticks ended on {} different hashes: {:016x?}",
            self.hashes.len(),
            self.ticks,
            distinct(&self.hashes).len(),
            self.hashes
        );
    }
}

/// Drive `num_sims` sessions on scoped threads.
///
/// [`Simulation`] is not `Send` (listeners are plain closures), so each
/// thread builds its own from `setup_fn` and only the hash crosses back.
///
/// # Panics
///
/// Panics if a session thread panics.
pub fn run_parallel_simulations<F>(
    setup_fn: F,
    script: &[TimedAction],
    num_sims: usize,
    num_ticks: u64,
) -> ParallelSimResult
where
    F: Fn() -> Simulation + Sync,
{
    let hashes = thread::scope(|s| {
        let handles: Vec<_> = (0..num_sims)
            .map(|_| {
                s.spawn(|| {
                    let mut sim = setup_fn();
                    (0..num_ticks).for_each(|tick| drive(&mut sim, script, tick));
                    sim.state_hash()
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().expect("session thread panicked"))
            .collect()
    });

    ParallelSimResult {
        hashes,
        ticks: num_ticks,
    }
}

/// Drive two sessions in lockstep and return the first tick whose hashes
/// differ.
///
/// Tick 0 means the freshly built sessions already disagree; tick `n`
/// means they disagree after the `n`th step. `None` if they never do.
pub fn find_first_divergence<F>(setup_fn: F, script: &[TimedAction], num_ticks: u64) -> Option<u64>
where
    F: Fn() -> Simulation,
{
    let (mut left, mut right) = (setup_fn(), setup_fn());
    if left.state_hash() != right.state_hash() {
        return Some(0);
    }

    for tick in 0..num_ticks {
        drive(&mut left, script, tick);
        drive(&mut right, script, tick);
        if left.state_hash() != right.state_hash() {
            tracing::warn!(tick = tick + 1, "Sessions diverged");
            return Some(tick + 1);
        }
    }
    None
}

/// Two runs also agree on the JSON snapshot, not only the hash.
pub fn verify_snapshot_determinism<F>(setup_fn: F, script: &[TimedAction], num_ticks: u64) -> bool
where
    F: Fn() -> Simulation,
{
    let snapshot = || {
        let mut sim = setup_fn();
        (0..num_ticks).for_each(|tick| drive(&mut sim, script, tick));
        sim.serialize().ok()
    };
    match (snapshot(), snapshot()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{basic_script, seeded};

    #[test]
    fn test_verify_determinism_generic() {
        let result = verify_determinism(
            3,
            10,
            || 0u64,
            |state, tick| *state = state.wrapping_mul(31).wrapping_add(tick),
            |state| *state,
        );
        result.assert_deterministic();
        assert_eq!(result.unique_hashes().len(), 1);
    }

    #[test]
    fn test_generic_harness_catches_drift() {
        let counter = std::cell::Cell::new(0u64);
        let result = verify_determinism(
            2,
            1,
            || {
                counter.set(counter.get() + 1);
                counter.get()
            },
            |_, _| {},
            |state| *state,
        );
        assert!(!result.is_deterministic);
        assert_eq!(result.unique_hashes(), vec![1, 2]);
    }

    #[test]
    fn test_scripted_runs_match() {
        let script = basic_script();
        verify_script_determinism(|| seeded(11), &script, 3, 600).assert_deterministic();
        assert_eq!(find_first_divergence(|| seeded(11), &script, 300), None);
    }

    #[test]
    fn test_divergent_seeds_caught_at_start() {
        let seeds = std::cell::Cell::new(1);
        let setup = || {
            seeds.set(seeds.get() + 1);
            seeded(seeds.get())
        };
        assert_eq!(find_first_divergence(setup, &[], 10), Some(0));
    }

    #[test]
    fn test_parallel_runs_match() {
        run_parallel_simulations(|| seeded(5), &basic_script(), 4, 300).assert_deterministic();
    }

    #[test]
    fn test_snapshots_match() {
        assert!(verify_snapshot_determinism(|| seeded(2), &basic_script(), 240));
    }
}
