//! The single mutable aggregate of a game session.

use serde::{Deserialize, Serialize};

use crate::components::{Bullet, Creep, CreepId, Tower, TowerId};
use crate::config::SimConfig;
use crate::content::TowerKind;
use crate::map::MapDefinition;
use crate::math::Cell;
use crate::particles::ParticleSink;
use crate::rng::SimRng;
use crate::waves::WaveController;

/// Running tallies that feed the score screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Counters {
    /// Score: 3 per kill.
    pub score: u64,
    /// Kills since the last leak.
    pub spree: u32,
    /// Combos triggered.
    pub combos: u32,
    /// Creeps that reached the exit.
    pub leaks: u32,
    /// Tower firings.
    pub shots: u32,
    /// Firings that hit.
    pub hits: u32,
    /// Waves fully cleared.
    pub waves_cleared: u32,
}

impl Counters {
    /// Hit percentage, rounded: `round(hits / max(1, shots) * 100)`.
    #[must_use]
    pub fn accuracy(&self) -> u32 {
        (f64::from(self.hits) / f64::from(self.shots.max(1)) * 100.0).round() as u32
    }
}

/// Cell under the pointer and whether a tower could go there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hover {
    /// Hovered cell.
    pub cell: Cell,
    /// Result of `can_place` for that cell.
    pub valid: bool,
}

/// Everything a session mutates.
///
/// Owned by [`crate::simulation::Simulation`] and handed to each system by
/// `&mut` for the duration of a tick. Entity lists are kept in id order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationState {
    /// Loaded map.
    pub map: MapDefinition,
    /// Gameplay random stream.
    pub rng: SimRng,
    /// Unconsumed real time, in simulation seconds.
    pub accumulator: f64,
    /// Completed steps.
    pub tick: u64,
    /// Simulated seconds.
    pub time: f64,
    /// Gold.
    pub gold: u32,
    /// Lives.
    pub lives: u32,
    /// Last wave started.
    pub wave: u32,
    /// Score and combat tallies.
    pub counters: Counters,
    /// Steps are skipped while paused.
    pub paused: bool,
    /// Game speed multiplier.
    pub speed: u32,
    /// Start waves automatically once the board is clear.
    pub auto_wave: bool,
    /// Delay before an automatic wave.
    pub auto_wave_delay_ms: u32,
    /// Countdown to the next automatic wave, if armed.
    pub auto_wave_timer: Option<f64>,
    /// Lives ran out.
    pub game_over: bool,
    /// Kind placed by the build cursor.
    pub build: TowerKind,
    /// Selected tower.
    pub selected: Option<TowerId>,
    /// Hovered cell.
    pub hover: Option<Hover>,
    /// Towers in id order.
    pub towers: Vec<Tower>,
    /// Creeps in id order.
    pub creeps: Vec<Creep>,
    /// Projectiles in launch order.
    pub bullets: Vec<Bullet>,
    /// Cosmetic particles.
    pub particles: ParticleSink,
    /// Wave spawner.
    pub waves: WaveController,
    next_tower_id: u32,
    next_creep_id: u32,
}

impl SimulationState {
    /// Fresh session on a map.
    #[must_use]
    pub fn new(map: MapDefinition, config: &SimConfig, seed: u32) -> Self {
        let speed = map.rules.speed_caps.first().copied().unwrap_or(1);
        let auto_wave = map.rules.auto_wave_default;
        Self {
            map,
            rng: SimRng::new(seed),
            accumulator: 0.0,
            tick: 0,
            time: 0.0,
            gold: config.starting_gold,
            lives: config.starting_lives,
            wave: 0,
            counters: Counters::default(),
            paused: false,
            speed,
            auto_wave,
            auto_wave_delay_ms: config.auto_wave_delay_ms,
            auto_wave_timer: None,
            game_over: false,
            build: config.default_build,
            selected: None,
            hover: None,
            towers: Vec::new(),
            creeps: Vec::new(),
            bullets: Vec::new(),
            particles: ParticleSink::new(seed),
            waves: WaveController::new(),
            next_tower_id: 1,
            next_creep_id: 1,
        }
    }

    /// Seed of the gameplay stream.
    #[must_use]
    pub const fn seed(&self) -> u32 {
        self.rng.seed()
    }

    /// Allocate the next tower id.
    pub fn alloc_tower_id(&mut self) -> TowerId {
        let id = TowerId(self.next_tower_id);
        self.next_tower_id += 1;
        id
    }

    /// Allocate the next creep id.
    pub fn alloc_creep_id(&mut self) -> CreepId {
        let id = CreepId(self.next_creep_id);
        self.next_creep_id += 1;
        id
    }

    /// Tower by id.
    #[must_use]
    pub fn tower(&self, id: TowerId) -> Option<&Tower> {
        self.towers.iter().find(|t| t.id == id)
    }

    /// Mutable tower by id.
    pub fn tower_mut(&mut self, id: TowerId) -> Option<&mut Tower> {
        self.towers.iter_mut().find(|t| t.id == id)
    }

    /// Tower standing on a cell.
    #[must_use]
    pub fn tower_at(&self, cell: Cell) -> Option<&Tower> {
        self.towers.iter().find(|t| t.cell == cell)
    }

    /// Creep by id.
    #[must_use]
    pub fn creep(&self, id: CreepId) -> Option<&Creep> {
        self.creeps.iter().find(|c| c.id == id)
    }

    /// Selected tower, if it still exists.
    #[must_use]
    pub fn selected_tower(&self) -> Option<&Tower> {
        self.selected.and_then(|id| self.tower(id))
    }
}
