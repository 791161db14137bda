//! Single scenario runs.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::rc::Rc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use td_core::events::Channel;
use td_core::replay::Replay;
use td_core::simulation::Simulation;
use td_core::stats::StatsSummary;

use crate::scenario::{Scenario, ScenarioError};

/// Outcome of one scenario run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Scenario name.
    pub scenario: String,
    /// Seed used.
    pub seed: u32,
    /// Steps driven.
    pub ticks: u64,
    /// Simulation tick at the end (paused steps do not advance it).
    pub final_tick: u64,
    /// Final `state_hash`.
    pub state_hash: u64,
    /// Last wave started.
    pub wave: u32,
    /// Lives left.
    pub lives: u32,
    /// Gold left.
    pub gold: u32,
    /// Score.
    pub score: u64,
    /// Whether the run ended in defeat.
    pub game_over: bool,
    /// Towers standing at the end.
    pub towers: usize,
    /// Timeline actions the engine accepted.
    pub actions_applied: u32,
    /// Timeline actions the engine rejected.
    pub actions_rejected: u32,
    /// Events seen per channel.
    pub events: BTreeMap<String, u32>,
    /// Run statistics.
    pub stats: StatsSummary,
    /// Wall-clock time of the run.
    pub duration_ms: u64,
}

impl RunReport {
    /// Whether the defense held to the end of the timeline.
    #[must_use]
    pub fn survived(&self) -> bool {
        !self.game_over
    }

    /// Human-readable summary.
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Scenario: {} (seed {})", self.scenario, self.seed);
        let _ = writeln!(out, "Ticks: {} driven, {} simulated", self.ticks, self.final_tick);
        let _ = writeln!(
            out,
            "Result: {} at wave {}",
            if self.game_over { "DEFEAT" } else { "HOLDING" },
            self.wave
        );
        let _ = writeln!(
            out,
            "Lives: {}  Gold: {}  Score: {}  Towers: {}",
            self.lives, self.gold, self.score, self.towers
        );
        let totals = &self.stats.totals;
        let _ = writeln!(
            out,
            "Creeps: {} spawned, {} killed, {} leaked",
            totals.creeps_spawned, totals.creeps_killed, totals.creeps_leaked
        );
        let _ = writeln!(
            out,
            "Waves cleared: {}  Combos: {}  Accuracy: {}%",
            totals.waves_cleared, totals.combos, self.stats.accuracy
        );
        let _ = writeln!(
            out,
            "Actions: {} applied, {} rejected",
            self.actions_applied, self.actions_rejected
        );
        let _ = writeln!(out, "State hash: {:016x}", self.state_hash);
        out
    }
}

/// Per-channel event counter wired into a simulation's bus.
fn count_events(sim: &mut Simulation) -> Rc<RefCell<BTreeMap<String, u32>>> {
    let counts = Rc::new(RefCell::new(BTreeMap::new()));
    for channel in Channel::ALL {
        let sink = Rc::clone(&counts);
        sim.subscribe(channel, move |_| {
            *sink
                .borrow_mut()
                .entry(channel.name().to_string())
                .or_insert(0) += 1;
        });
    }
    counts
}

/// Drive a scenario under `seed` and report the outcome.
///
/// Actions are applied exactly as [`Replay::play`] applies them, so the
/// report hash matches a replay recorded from the same scenario and seed.
pub fn run_scenario(scenario: &Scenario, seed: u32) -> Result<RunReport, ScenarioError> {
    let start = Instant::now();
    let mut sim = scenario.build(seed)?;
    let counts = count_events(&mut sim);
    let dt = sim.config().fixed_step;

    let (mut applied, mut rejected) = (0, 0);
    let mut pending = scenario.timeline.iter().peekable();
    for tick in 0..scenario.ticks {
        while let Some(timed) = pending.next_if(|a| a.tick <= tick) {
            if sim.apply_action(&timed.action) {
                applied += 1;
            } else {
                rejected += 1;
                debug!(tick, action = ?timed.action, "Action rejected");
            }
        }
        sim.step(dt);
    }

    let state = sim.state();
    let events = counts.borrow().clone();
    let report = RunReport {
        scenario: scenario.name.clone(),
        seed,
        ticks: scenario.ticks,
        final_tick: state.tick,
        state_hash: sim.state_hash(),
        wave: state.wave,
        lives: state.lives,
        gold: state.gold,
        score: state.counters.score,
        game_over: state.game_over,
        towers: state.towers.len(),
        actions_applied: applied,
        actions_rejected: rejected,
        events,
        stats: sim.stats(),
        duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
    };
    info!(
        scenario = %report.scenario,
        seed,
        wave = report.wave,
        lives = report.lives,
        hash = %format!("{:016x}", report.state_hash),
        "Run complete"
    );
    Ok(report)
}

/// Record a replay of a scenario under `seed`.
pub fn record_replay(scenario: &Scenario, seed: u32) -> Result<Replay, ScenarioError> {
    let mut replay = scenario.to_replay(seed)?;
    replay.final_hash = replay.play()?.state_hash();
    Ok(replay)
}
