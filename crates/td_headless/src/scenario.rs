//! Scenario loading and configuration.
//!
//! A scenario fixes everything a headless run needs: the map, the engine
//! configuration, a default seed, how many steps to drive and the
//! timeline of player actions.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use td_core::config::SimConfig;
use td_core::content::TowerKind;
use td_core::error::GameError;
use td_core::map::MapDefinition;
use td_core::replay::{Action, Replay, TimedAction};
use td_core::simulation::Simulation;

/// Error type for scenario operations.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// File not found.
    #[error("Scenario file not found: {0}")]
    FileNotFound(String),
    /// Failed to read file.
    #[error("Failed to read scenario file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse RON.
    #[error("Failed to parse scenario: {0}")]
    ParseError(#[from] ron::error::SpannedError),
    /// The engine rejected the scenario.
    #[error("Scenario rejected by the engine: {0}")]
    Game(#[from] GameError),
    /// A built-in map name that does not exist.
    #[error("Unknown built-in map: {0}")]
    UnknownMap(String),
}

/// Where a scenario's map comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MapSource {
    /// A built-in map by id, e.g. `"default"` or `"twist"`.
    Builtin(String),
    /// A map written out in the scenario itself.
    Inline(MapDefinition),
    /// A RON or JSON map file, relative to the scenario file.
    File(PathBuf),
}

impl Default for MapSource {
    fn default() -> Self {
        Self::Builtin("default".to_string())
    }
}

/// A complete scenario configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Map to play on.
    #[serde(default)]
    pub map: MapSource,
    /// Engine configuration; its seed is ignored in favor of `seed`.
    #[serde(default)]
    pub config: SimConfig,
    /// Default seed.
    #[serde(default)]
    pub seed: u32,
    /// Fixed steps to drive.
    pub ticks: u64,
    /// Player actions.
    #[serde(default)]
    pub timeline: Vec<TimedAction>,
    /// Directory used to resolve relative map files.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

impl Default for Scenario {
    fn default() -> Self {
        Self::opening()
    }
}

impl Scenario {
    /// Load a scenario from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        let mut scenario = Self::from_ron_str(&contents)?;
        scenario.base_dir = path.parent().map(Path::to_path_buf);
        Ok(scenario)
    }

    /// Load from a RON string (useful for embedded scenarios).
    pub fn from_ron_str(ron: &str) -> Result<Self, ScenarioError> {
        let mut scenario: Self = ron::from_str(ron)?;
        scenario.timeline.sort_by_key(|a| a.tick);
        Ok(scenario)
    }

    /// Resolve a `--scenario` argument: a built-in scenario name, or a path.
    pub fn resolve(name_or_path: &str) -> Result<Self, ScenarioError> {
        match Self::builtin(name_or_path) {
            Some(scenario) => Ok(scenario),
            None => Self::load(name_or_path),
        }
    }

    /// Look up a built-in scenario.
    #[must_use]
    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            "opening" => Some(Self::opening()),
            "gauntlet" => Some(Self::gauntlet()),
            "idle" => Some(Self::idle()),
            _ => None,
        }
    }

    /// Three waves on the open board against a short line of towers.
    #[must_use]
    pub fn opening() -> Self {
        let place = |tick, x, y, kind| TimedAction::new(tick, Action::PlaceTower { x, y, kind });
        Self {
            name: "Opening".to_string(),
            description: "Archer and fire line on the default map, three waves".to_string(),
            map: MapSource::default(),
            config: SimConfig::default(),
            seed: 1,
            ticks: 60 * 90,
            timeline: vec![
                place(0, 4, 7, TowerKind::Archer),
                place(0, 6, 9, TowerKind::Fire),
                place(0, 8, 7, TowerKind::Archer),
                TimedAction::new(1, Action::StartWave),
                TimedAction::new(1500, Action::StartWave),
                place(1600, 10, 9, TowerKind::Ice),
                TimedAction::new(3000, Action::StartWave),
            ],
            base_dir: None,
        }
    }

    /// Auto-waves on the walled map with a flow-field route.
    #[must_use]
    pub fn gauntlet() -> Self {
        let place = |x, y, kind| TimedAction::new(0, Action::PlaceTower { x, y, kind });
        Self {
            name: "Gauntlet".to_string(),
            description: "Auto-waves around the twist wall".to_string(),
            map: MapSource::Builtin("twist".to_string()),
            config: SimConfig {
                starting_gold: 600,
                navigation: td_core::config::NavigationMode::FlowField,
                ..SimConfig::default()
            },
            seed: 7,
            ticks: 60 * 180,
            timeline: vec![
                place(9, 4, TowerKind::Archer),
                place(11, 4, TowerKind::Fire),
                place(9, 11, TowerKind::Ice),
                place(11, 11, TowerKind::Siege),
                place(12, 8, TowerKind::Poison),
                TimedAction::new(
                    0,
                    Action::SetAutoWave {
                        enabled: true,
                        delay_ms: 1500,
                    },
                ),
            ],
            base_dir: None,
        }
    }

    /// A single undefended wave.
    #[must_use]
    pub fn idle() -> Self {
        Self {
            name: "Idle".to_string(),
            description: "Wave one with no towers".to_string(),
            map: MapSource::default(),
            config: SimConfig::default(),
            seed: 1,
            ticks: 60 * 40,
            timeline: vec![TimedAction::new(0, Action::StartWave)],
            base_dir: None,
        }
    }

    /// The map this scenario plays on.
    pub fn map_definition(&self) -> Result<MapDefinition, ScenarioError> {
        let map = match &self.map {
            MapSource::Builtin(id) => {
                MapDefinition::builtin(id).ok_or_else(|| ScenarioError::UnknownMap(id.clone()))?
            }
            MapSource::Inline(map) => {
                map.validate().map_err(GameError::from)?;
                map.clone()
            }
            MapSource::File(path) => {
                let full = match &self.base_dir {
                    Some(dir) if path.is_relative() => dir.join(path),
                    _ => path.clone(),
                };
                MapDefinition::load(full).map_err(GameError::from)?
            }
        };
        Ok(map)
    }

    /// Engine in the scenario's starting conditions.
    pub fn build(&self, seed: u32) -> Result<Simulation, ScenarioError> {
        let map = self.map_definition()?;
        Ok(Simulation::new(map, self.config.clone().with_seed(seed))?)
    }

    /// Unrecorded replay of this scenario under `seed`.
    ///
    /// The final hash is left at zero; see [`crate::runner::run_scenario`].
    pub fn to_replay(&self, seed: u32) -> Result<Replay, ScenarioError> {
        Ok(Replay {
            version: td_core::replay::REPLAY_VERSION,
            seed,
            map: self.map_definition()?,
            config: self.config.clone(),
            actions: self.timeline.clone(),
            final_tick: self.ticks,
            final_hash: 0,
        })
    }
}
