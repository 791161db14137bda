//! Test fixtures and helpers.
//!
//! Pre-built maps, engines and action scripts for consistent testing.

use serde::{Deserialize, Serialize};
use td_core::config::SimConfig;
use td_core::content::TowerKind;
use td_core::map::{GridSize, MapDefinition};
use td_core::math::Cell;
use td_core::replay::{Action, TimedAction};
use td_core::simulation::Simulation;

/// Engine on the default map with a fixed seed.
///
/// # Panics
///
/// Never: the built-in map is valid.
#[must_use]
pub fn seeded(seed: u32) -> Simulation {
    on_map(MapDefinition::default_map(), seed)
}

/// Engine on any valid map with a fixed seed.
///
/// # Panics
///
/// Panics if the map is invalid.
#[must_use]
pub fn on_map(map: MapDefinition, seed: u32) -> Simulation {
    Simulation::with_seed(map, seed).expect("fixture map should be valid")
}

/// Engine on the default map with plenty of gold.
///
/// # Panics
///
/// Never: the built-in map is valid.
#[must_use]
pub fn rich(seed: u32, gold: u32) -> Simulation {
    let config = SimConfig {
        starting_gold: gold,
        ..SimConfig::default().with_seed(seed)
    };
    Simulation::new(MapDefinition::default_map(), config).expect("fixture map should be valid")
}

/// A 7x3 map whose only route is the middle row.
///
/// The top and bottom rows are walls except for column 3, so a tower on
/// `(3, 1)` would cut the map in two.
#[must_use]
pub fn corridor_map() -> MapDefinition {
    let mut blocked = Vec::new();
    for x in 0..7 {
        if x != 3 {
            blocked.push(Cell::new(x, 0));
            blocked.push(Cell::new(x, 2));
        }
    }
    MapDefinition {
        id: "corridor-7x3".to_string(),
        name: "Corridor".to_string(),
        size: GridSize { cols: 7, rows: 3 },
        start: Cell::new(0, 1),
        end: Cell::new(6, 1),
        blocked: Some(blocked),
        ..MapDefinition::default_map()
    }
}

/// Place a ring of towers along the default map's path and start a wave.
#[must_use]
pub fn basic_script() -> Vec<TimedAction> {
    let place = |tick, x, y, kind| TimedAction::new(tick, Action::PlaceTower { x, y, kind });
    vec![
        place(0, 4, 7, TowerKind::Archer),
        place(0, 6, 9, TowerKind::Fire),
        TimedAction::new(1, Action::StartWave),
        place(30, 9, 7, TowerKind::Ice),
        place(60, 12, 9, TowerKind::Siege),
    ]
}

/// A scripted run stored as RON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptFixture {
    /// Seed.
    pub seed: u32,
    /// Steps to run.
    pub ticks: u64,
    /// Timeline.
    pub actions: Vec<TimedAction>,
}

impl ScriptFixture {
    /// Parse from RON.
    ///
    /// # Errors
    ///
    /// Returns the RON parse error.
    pub fn from_ron(text: &str) -> Result<Self, ron::error::SpannedError> {
        ron::from_str(text)
    }

    /// Engine on the default map, driven through the whole timeline.
    #[must_use]
    pub fn run(&self) -> Simulation {
        let mut sim = seeded(self.seed);
        for tick in 0..self.ticks {
            crate::determinism::drive(&mut sim, &self.actions, tick);
        }
        sim
    }
}
