//! Player actions and recorded replays.
//!
//! A replay stores the starting conditions of a session (map, config and
//! seed) together with the timeline of actions the player issued. Because
//! the simulation is deterministic, that is enough to recreate any game and
//! to check that a rebuilt engine still produces the same final state.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::components::TargetingMode;
use crate::config::SimConfig;
use crate::content::TowerKind;
use crate::error::{GameError, Result};
use crate::map::MapDefinition;
use crate::simulation::Simulation;

/// Replay format version for compatibility.
pub const REPLAY_VERSION: u32 = 1;

/// A single player input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Action {
    /// Build a tower on a cell.
    PlaceTower {
        /// Column.
        x: i32,
        /// Row.
        y: i32,
        /// Tower kind.
        kind: TowerKind,
    },
    /// Sell the tower standing on a cell.
    SellTower {
        /// Column.
        x: i32,
        /// Row.
        y: i32,
    },
    /// Select the tower standing on a cell.
    Select {
        /// Column.
        x: i32,
        /// Row.
        y: i32,
    },
    /// Hover a cell with the build cursor.
    Hover {
        /// Column.
        x: i32,
        /// Row.
        y: i32,
    },
    /// Change the kind placed by the build cursor.
    SetBuild(TowerKind),
    /// Upgrade the selected tower.
    LevelUp,
    /// Take an evolution on the selected tower.
    Evolve(String),
    /// Change targeting of the selected tower.
    SetTargeting(TargetingMode),
    /// Start the next wave.
    StartWave,
    /// Pause or resume.
    SetPaused(bool),
    /// Set the game speed multiplier.
    SetSpeed(u32),
    /// Step to the next allowed game speed.
    CycleSpeed,
    /// Toggle automatic waves.
    SetAutoWave {
        /// Whether auto-wave is on.
        enabled: bool,
        /// Delay before the next wave, in milliseconds.
        delay_ms: u32,
    },
}

/// An action issued before a given simulation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedAction {
    /// Index of the step the action precedes.
    pub tick: u64,
    /// The action.
    pub action: Action,
}

impl TimedAction {
    /// Create a new timed action.
    #[must_use]
    pub const fn new(tick: u64, action: Action) -> Self {
        Self { tick, action }
    }
}

/// Complete replay data structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Replay {
    /// Replay format version.
    pub version: u32,
    /// Seed of the recorded session.
    pub seed: u32,
    /// Map played.
    pub map: MapDefinition,
    /// Engine configuration.
    pub config: SimConfig,
    /// Actions in step order.
    pub actions: Vec<TimedAction>,
    /// Steps driven.
    pub final_tick: u64,
    /// `state_hash` after the last step.
    pub final_hash: u64,
}

impl Replay {
    /// Run a timeline for `ticks` fixed steps and record the outcome.
    ///
    /// # Errors
    ///
    /// Returns an error if the map is invalid.
    pub fn record(
        map: MapDefinition,
        config: SimConfig,
        seed: u32,
        mut actions: Vec<TimedAction>,
        ticks: u64,
    ) -> Result<Self> {
        actions.sort_by_key(|a| a.tick);
        let mut replay = Self {
            version: REPLAY_VERSION,
            seed,
            map,
            config,
            actions,
            final_tick: ticks,
            final_hash: 0,
        };
        let sim = replay.play()?;
        replay.final_hash = sim.state_hash();
        Ok(replay)
    }

    /// Fresh simulation in the recorded starting conditions.
    ///
    /// # Errors
    ///
    /// Returns an error if the map is invalid.
    pub fn start(&self) -> Result<Simulation> {
        Simulation::new(self.map.clone(), self.config.clone().with_seed(self.seed))
    }

    /// Drive a simulation through the whole timeline.
    ///
    /// Actions scheduled for step `t` are applied, in order, right before
    /// step `t` runs. Steps are counted by the driver, so paused steps still
    /// consume a tick of the timeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the map is invalid.
    pub fn play(&self) -> Result<Simulation> {
        let mut sim = self.start()?;
        let dt = self.config.fixed_step;
        let mut pending = self.actions.iter().peekable();
        for tick in 0..self.final_tick {
            while let Some(timed) = pending.next_if(|a| a.tick <= tick) {
                sim.apply_action(&timed.action);
            }
            sim.step(dt);
        }
        Ok(sim)
    }

    /// Replay and compare the final state hash.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::ReplayMismatch`] if the hashes differ.
    pub fn verify(&self) -> Result<u64> {
        let sim = self.play()?;
        let actual = sim.state_hash();
        if actual != self.final_hash {
            return Err(GameError::ReplayMismatch {
                tick: self.final_tick,
                expected: self.final_hash,
                actual,
            });
        }
        Ok(actual)
    }

    /// Encode with bincode.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| GameError::Serialization(format!("Failed to serialize replay: {e}")))
    }

    /// Decode from bincode and check the format version.
    ///
    /// # Errors
    ///
    /// Returns an error if decoding fails or the version is unknown.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let replay: Self = bincode::deserialize(bytes)
            .map_err(|e| GameError::Serialization(format!("Failed to deserialize replay: {e}")))?;
        if replay.version != REPLAY_VERSION {
            return Err(GameError::InvalidState(format!(
                "Replay version mismatch: expected {}, got {}",
                REPLAY_VERSION, replay.version
            )));
        }
        Ok(replay)
    }

    /// Save the replay to a file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or file writing fails.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let bytes = self.to_bytes()?;
        std::fs::write(path.as_ref(), bytes)
            .map_err(|e| GameError::InvalidState(format!("Failed to write replay file: {e}")))
    }

    /// Load a replay from a file.
    ///
    /// # Errors
    ///
    /// Returns an error if file reading or decoding fails.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())
            .map_err(|e| GameError::InvalidState(format!("Failed to read replay file: {e}")))?;
        Self::from_bytes(&bytes)
    }

    /// Actions scheduled for one step.
    #[must_use]
    pub fn actions_at_tick(&self, tick: u64) -> Vec<&TimedAction> {
        self.actions.iter().filter(|a| a.tick == tick).collect()
    }
}
