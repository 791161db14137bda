//! Core simulation loop and the engine's public operations.
//!
//! [`Simulation`] owns the [`SimulationState`] and the data derived from it
//! (path grid, spatial index, wave table). Each step runs the systems in a
//! fixed order:
//!
//! 1. Wave spawner (and wave completion)
//! 2. Creep movement and leaks
//! 3. Spatial index rebuild
//! 4. Tower firing
//! 5. Projectiles
//! 6. Particles
//! 7. Dead creep cleanup (bounty, loot, split children)
//! 8. Auto-wave timer
//!
//! Every public operation buffers the events it raises and hands them to
//! the stats collector and the subscribers before returning.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::components::{Creep, CreepId, TargetingMode, Tower, TowerId};
use crate::config::SimConfig;
use crate::content::{Behavior, CreepType, TowerKind};
use crate::error::{GameError, Result};
use crate::events::{
    ChangeReason, Channel, EventBus, GameEvent, GameOverSummary, SubscriptionId,
};
use crate::loot::{self, weighted_pick};
use crate::map::{MapDefinition, MapInfo};
use crate::math::{Cell, TILE};
use crate::navigation::{advance, repath_creeps, Advance};
use crate::pathfinding::PathGrid;
use crate::placement::{self, can_place, validate_placement, PlacementError};
use crate::projectiles::update_bullets;
use crate::replay::Action;
use crate::rng::SimRng;
use crate::spatial::CreepIndex;
use crate::state::{Hover, SimulationState};
use crate::stats::{StatsCollector, StatsSummary};
use crate::targeting::{fire_towers, Battlefield};
use crate::waves::{speed_scale, table_for, wave_reward, WaveTable};

/// Score awarded per kill.
const KILL_SCORE: u64 = 3;

/// Outcome of one [`Simulation::update`] call.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StepReport {
    /// Leftover fraction of a step, in `[0, 1)`, for render interpolation.
    pub alpha: f64,
    /// Fixed steps taken.
    pub steps: u32,
}

/// The tower-defense engine.
#[derive(Debug)]
pub struct Simulation {
    state: SimulationState,
    grid: PathGrid,
    index: CreepIndex,
    table: Box<dyn WaveTable>,
    bus: EventBus,
    stats: StatsCollector,
    config: SimConfig,
    events: Vec<GameEvent>,
}

impl Default for Simulation {
    fn default() -> Self {
        let config = SimConfig::default();
        let seed = SimRng::from_entropy().seed();
        Self::build(MapDefinition::default_map(), config, seed)
    }
}

impl Simulation {
    /// Create a session on a map.
    ///
    /// Uses `config.seed`, or an entropy seed when it is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidMap`] if the map fails validation, or
    /// [`GameError::InvalidState`] for an unusable step configuration.
    pub fn new(map: MapDefinition, config: SimConfig) -> Result<Self> {
        map.validate()?;
        config.validate()?;
        let seed = config
            .seed
            .unwrap_or_else(|| SimRng::from_entropy().seed());
        Ok(Self::build(map, config, seed))
    }

    /// Default configuration with a fixed seed.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidMap`] if the map fails validation.
    pub fn with_seed(map: MapDefinition, seed: u32) -> Result<Self> {
        Self::new(map, SimConfig::default().with_seed(seed))
    }

    fn build(map: MapDefinition, config: SimConfig, seed: u32) -> Self {
        debug!(map = %map.id, seed, "Map loaded");
        let grid = PathGrid::new(&map);
        let index = CreepIndex::new(
            f64::from(map.size.cols) * TILE,
            f64::from(map.size.rows) * TILE,
        );
        let table = table_for(&map.waves);
        let state = SimulationState::new(map, &config, seed);
        Self {
            state,
            grid,
            index,
            table,
            bus: EventBus::new(),
            stats: StatsCollector::new(),
            config,
            events: Vec::new(),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    /// Derived path data.
    #[must_use]
    pub fn path_grid(&self) -> &PathGrid {
        &self.grid
    }

    /// Engine configuration.
    #[must_use]
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Seed of the current session.
    #[must_use]
    pub const fn seed(&self) -> u32 {
        self.state.seed()
    }

    // ---------------------------------------------------------------------
    // Placement and economy
    // ---------------------------------------------------------------------

    /// Build a tower.
    ///
    /// # Errors
    ///
    /// Returns the first failed check; state is untouched in that case.
    pub fn place_tower(
        &mut self,
        gx: i32,
        gy: i32,
        kind: TowerKind,
    ) -> std::result::Result<TowerId, PlacementError> {
        let cell = Cell::new(gx, gy);
        let cost = validate_placement(&self.state, &self.grid, cell, kind)?;

        self.state.gold -= cost;
        let id = self.state.alloc_tower_id();
        self.state.towers.push(Tower::new(id, kind, cell));
        self.grid.set_tower(cell, true);
        self.rebuild_paths();
        placement::refresh_synergy(&mut self.state.towers, cell);
        self.state.selected = Some(id);
        self.refresh_hover();

        self.events.push(GameEvent::TowerPlace {
            tower: id,
            kind,
            cost,
            cell,
        });
        self.push_gold(-i64::from(cost), ChangeReason::PlaceTower);
        self.flush();
        Ok(id)
    }

    /// Build a tower by kind name, e.g. `"FIRE"` or `"CANNON"`.
    ///
    /// # Errors
    ///
    /// An unknown name fails with [`PlacementError::InvalidTower`] unless an
    /// earlier site check already fails.
    pub fn place_tower_named(
        &mut self,
        gx: i32,
        gy: i32,
        name: &str,
    ) -> std::result::Result<TowerId, PlacementError> {
        if let Ok(kind) = name.parse::<TowerKind>() {
            return self.place_tower(gx, gy, kind);
        }
        // Archer is always allowed, so anything it fails on precedes the kind check.
        match validate_placement(&self.state, &self.grid, Cell::new(gx, gy), TowerKind::Archer) {
            Err(reason) if reason != PlacementError::Gold => Err(reason),
            _ => Err(PlacementError::InvalidTower),
        }
    }

    /// Sell a tower for its refund. Returns `false` for an unknown id.
    pub fn sell_tower(&mut self, id: TowerId) -> bool {
        let Some(pos) = self.state.towers.iter().position(|t| t.id == id) else {
            warn!(tower = id.0, "Sell requested for unknown tower");
            return false;
        };
        let tower = self.state.towers.remove(pos);
        let refund = placement::refund(&tower);

        self.state.gold += refund;
        self.grid.set_tower(tower.cell, false);
        self.rebuild_paths();
        placement::refresh_synergy(&mut self.state.towers, tower.cell);
        if self.state.selected == Some(id) {
            self.state.selected = None;
        }
        self.refresh_hover();

        self.events.push(GameEvent::TowerSell { tower: id, refund });
        self.push_gold(i64::from(refund), ChangeReason::SellTower);
        self.flush();
        true
    }

    /// Change the kind placed by the build cursor.
    pub fn set_build(&mut self, kind: TowerKind) {
        self.state.build = kind;
        self.refresh_hover();
    }

    /// Move the build cursor. Off-grid cells clear the hover.
    pub fn set_hover(&mut self, gx: i32, gy: i32) {
        let cell = Cell::new(gx, gy);
        self.state.hover = self.state.map.in_bounds(cell).then(|| Hover {
            cell,
            valid: can_place(&self.state, &self.grid, cell),
        });
    }

    /// Select the tower on a cell, or clear the selection.
    pub fn select_tower_at(&mut self, gx: i32, gy: i32) -> Option<&Tower> {
        self.state.selected = self.state.tower_at(Cell::new(gx, gy)).map(|t| t.id);
        self.state.selected_tower()
    }

    /// Upgrade the selected tower if gold allows.
    pub fn level_up_selected(&mut self) -> bool {
        let Some(tower) = self.state.selected_tower() else {
            return false;
        };
        let (id, cell, from) = (tower.id, tower.cell, tower.level);
        let cost = tower.kind.upgrade_cost(from);
        if self.state.gold < cost {
            return false;
        }

        self.state.gold -= cost;
        let credits = self.state.map.rules.upgrade_credits.clone();
        let Some(tower) = self.state.tower_mut(id) else {
            return false;
        };
        placement::level_up(tower, cost, &credits);
        let to = tower.level;
        placement::refresh_synergy(&mut self.state.towers, cell);

        self.events.push(GameEvent::TowerLevel {
            tower: id,
            from,
            to,
            cost,
        });
        self.push_gold(-i64::from(cost), ChangeReason::LevelUp);
        self.flush();
        true
    }

    /// Take an evolution node on the selected tower.
    pub fn apply_evolution(&mut self, key: &str) -> bool {
        if self.state.map.rules.disable_evolutions {
            return false;
        }
        let Some(id) = self.state.selected else {
            return false;
        };
        let key = key.to_ascii_uppercase();
        let Some(tower) = self.state.tower_mut(id) else {
            warn!(tower = id.0, "Selected tower no longer exists");
            return false;
        };
        if !placement::evolve(tower, &key) {
            return false;
        }
        let cell = tower.cell;
        placement::refresh_synergy(&mut self.state.towers, cell);
        self.events.push(GameEvent::TowerEvo { tower: id, key });
        self.flush();
        true
    }

    /// Change targeting on the selected tower and reset its cycle pointer.
    pub fn set_targeting(&mut self, mode: TargetingMode) -> bool {
        let Some(id) = self.state.selected else {
            return false;
        };
        match self.state.tower_mut(id) {
            Some(tower) => {
                tower.targeting = mode;
                tower.cycle_last = None;
                true
            }
            None => false,
        }
    }

    // ---------------------------------------------------------------------
    // Waves and time
    // ---------------------------------------------------------------------

    /// Start the next wave.
    ///
    /// Rejected while a wave is spawning, while paused, after game over and
    /// past the last wave the map allows.
    pub fn start_wave(&mut self) -> bool {
        let started = self.begin_wave();
        self.flush();
        started
    }

    fn begin_wave(&mut self) -> bool {
        let state = &self.state;
        if state.waves.is_spawning() || state.paused || state.game_over {
            return false;
        }
        let next = state.wave + 1;
        let max = state.map.rules.max_waves;
        if max > 0 && next > max {
            return false;
        }
        let Some(packs) = self.table.packs(next) else {
            return false;
        };
        if !self.state.waves.begin(packs) {
            return false;
        }
        self.state.wave = next;
        self.state.auto_wave_timer = None;
        debug!(wave = next, "Wave started");
        self.events.push(GameEvent::WaveStart { wave: next });
        true
    }

    /// Advance exactly one step of `dt` seconds.
    ///
    /// No-op while paused or after game over.
    pub fn step(&mut self, dt: f64) {
        if self.state.paused || self.state.game_over {
            return;
        }
        self.run_tick(dt);
        self.flush();
    }

    /// Feed real elapsed time through the fixed-step accumulator.
    ///
    /// Time is scaled by the game speed. At most `max_substeps` steps run
    /// per call; any backlog beyond that is dropped.
    pub fn update(&mut self, real_dt: f64) -> StepReport {
        let step = self.config.fixed_step;
        if self.state.paused || self.state.game_over {
            return StepReport {
                alpha: self.state.accumulator / step,
                steps: 0,
            };
        }

        self.state.accumulator += real_dt.max(0.0) * f64::from(self.state.speed);
        let mut steps = 0;
        while self.state.accumulator >= step && steps < self.config.max_substeps {
            self.state.accumulator -= step;
            self.run_tick(step);
            steps += 1;
            if self.state.game_over {
                self.state.accumulator = 0.0;
                break;
            }
        }
        if self.state.accumulator >= step {
            self.state.accumulator %= step;
        }
        self.flush();

        StepReport {
            alpha: self.state.accumulator / step,
            steps,
        }
    }

    /// Pause or resume.
    pub fn set_paused(&mut self, paused: bool) {
        if self.state.paused == paused {
            return;
        }
        self.state.paused = paused;
        self.events.push(GameEvent::PauseChange { paused });
        self.flush();
    }

    /// Set the game speed, snapped down to the nearest allowed multiplier.
    pub fn set_speed(&mut self, speed: u32) {
        let caps = &self.state.map.rules.speed_caps;
        let snapped = caps
            .iter()
            .copied()
            .filter(|&c| c <= speed)
            .max()
            .or_else(|| caps.iter().copied().min())
            .unwrap_or(1);
        self.apply_speed(snapped);
    }

    /// Step to the next allowed speed, wrapping around.
    pub fn cycle_speed(&mut self) {
        let caps = &self.state.map.rules.speed_caps;
        let next = caps
            .iter()
            .position(|&c| c == self.state.speed)
            .and_then(|i| caps.get((i + 1) % caps.len()))
            .or_else(|| caps.first())
            .copied()
            .unwrap_or(1);
        self.apply_speed(next);
    }

    fn apply_speed(&mut self, speed: u32) {
        if self.state.speed == speed {
            return;
        }
        self.state.speed = speed;
        self.events.push(GameEvent::SpeedChange { speed });
        self.flush();
    }

    /// Configure automatic waves.
    pub fn set_auto_wave(&mut self, enabled: bool, delay_ms: u32) {
        self.state.auto_wave = enabled;
        self.state.auto_wave_delay_ms = delay_ms;
        self.state.auto_wave_timer = None;
        self.events
            .push(GameEvent::AutoWaveChange { enabled, delay_ms });
        self.flush();
    }

    // ---------------------------------------------------------------------
    // Session
    // ---------------------------------------------------------------------

    /// Replace the map and start a fresh session on it.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidMap`] and leaves the session untouched if
    /// the map fails validation.
    pub fn load_map(&mut self, map: MapDefinition) -> Result<()> {
        map.validate()?;
        let seed = self.state.seed();
        let (bus, config) = (std::mem::take(&mut self.bus), self.config.clone());
        *self = Self {
            bus,
            ..Self::build(map, config, seed)
        };
        self.events.push(GameEvent::GameReset { seed });
        self.events.push(GameEvent::MapChange(self.state.map.info()));
        self.flush();
        Ok(())
    }

    /// Summary of the loaded map.
    #[must_use]
    pub fn map_info(&self) -> MapInfo {
        self.state.map.info()
    }

    /// Start over on the same map. `None` draws a new seed from entropy.
    pub fn reset(&mut self, seed: Option<u32>) {
        let seed = seed.unwrap_or_else(|| SimRng::from_entropy().seed());
        let map = self.state.map.clone();
        let (bus, config) = (std::mem::take(&mut self.bus), self.config.clone());
        *self = Self {
            bus,
            ..Self::build(map, config, seed)
        };
        self.events.push(GameEvent::GameReset { seed });
        self.push_gold(0, ChangeReason::Reset);
        self.events.push(GameEvent::LifeChange {
            lives: self.state.lives,
            delta: 0,
            reason: ChangeReason::Reset,
        });
        self.flush();
    }

    /// Plain JSON snapshot of the state, without the random stream.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::Serialization`] if encoding fails.
    pub fn serialize(&self) -> Result<serde_json::Value> {
        let mut value = serde_json::to_value(&self.state)
            .map_err(|e| GameError::Serialization(format!("Failed to serialize state: {e}")))?;
        if let Some(obj) = value.as_object_mut() {
            obj.remove("rng");
        }
        Ok(value)
    }

    /// Compute a hash of the current simulation state.
    ///
    /// Two simulations with identical state produce identical hashes.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.state.tick.hash(&mut hasher);
        match bincode::serialize(&self.state) {
            Ok(bytes) => bytes.hash(&mut hasher),
            Err(e) => warn!(error = %e, "State encoding failed while hashing"),
        }
        self.state.rng.state().hash(&mut hasher);
        hasher.finish()
    }

    /// Statistics gathered since the last reset.
    #[must_use]
    pub fn stats(&self) -> StatsSummary {
        self.stats.summary()
    }

    // ---------------------------------------------------------------------
    // Events
    // ---------------------------------------------------------------------

    /// Listen on a channel.
    pub fn subscribe<F>(&mut self, channel: Channel, listener: F) -> SubscriptionId
    where
        F: FnMut(&GameEvent) + 'static,
    {
        self.bus.subscribe(channel, listener)
    }

    /// Listen on a channel given by name, e.g. `"creepKill"`.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::UnknownChannel`] for an unknown name.
    pub fn subscribe_named<F>(&mut self, channel: &str, listener: F) -> Result<SubscriptionId>
    where
        F: FnMut(&GameEvent) + 'static,
    {
        let channel: Channel = channel.parse()?;
        Ok(self.bus.subscribe(channel, listener))
    }

    /// Stop listening. Returns `false` for an unknown id.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    /// Apply a recorded or scripted action.
    pub fn apply_action(&mut self, action: &Action) -> bool {
        match action {
            Action::PlaceTower { x, y, kind } => self.place_tower(*x, *y, *kind).is_ok(),
            Action::SellTower { x, y } => match self.state.tower_at(Cell::new(*x, *y)) {
                Some(tower) => {
                    let id = tower.id;
                    self.sell_tower(id)
                }
                None => false,
            },
            Action::Select { x, y } => self.select_tower_at(*x, *y).is_some(),
            Action::Hover { x, y } => {
                self.set_hover(*x, *y);
                true
            }
            Action::SetBuild(kind) => {
                self.set_build(*kind);
                true
            }
            Action::LevelUp => self.level_up_selected(),
            Action::Evolve(key) => self.apply_evolution(key),
            Action::SetTargeting(mode) => self.set_targeting(*mode),
            Action::StartWave => self.start_wave(),
            Action::SetPaused(paused) => {
                self.set_paused(*paused);
                true
            }
            Action::SetSpeed(speed) => {
                self.set_speed(*speed);
                true
            }
            Action::CycleSpeed => {
                self.cycle_speed();
                true
            }
            Action::SetAutoWave { enabled, delay_ms } => {
                self.set_auto_wave(*enabled, *delay_ms);
                true
            }
        }
    }

    // ---------------------------------------------------------------------
    // Tick
    // ---------------------------------------------------------------------

    fn run_tick(&mut self, dt: f64) {
        self.spawn_phase(dt);
        self.move_phase(dt);
        if !self.state.game_over {
            self.combat_phase(dt);
            self.cull_phase();
            self.auto_wave_phase(dt);
        }

        self.state.tick += 1;
        self.state.time += dt;

        #[cfg(feature = "debug-validation")]
        self.validate_invariants();

        #[cfg(debug_assertions)]
        if tracing::enabled!(tracing::Level::DEBUG) {
            let hash = self.state_hash();
            debug!(tick = self.state.tick, state_hash = hash, "Simulation state hash");
        }
    }

    fn spawn_phase(&mut self, dt: f64) {
        let alive = self.state.creeps.iter().filter(|c| c.alive).count();
        let out = self.state.waves.step(dt, alive);
        if let Some((kind, hp_mul)) = out.spawn {
            self.spawn_creep(kind, hp_mul);
        }
        if out.wave_complete {
            self.complete_wave();
        }
    }

    fn spawn_creep(&mut self, kind: CreepType, hp_mul: f64) {
        let profile = kind.profile();
        let wave = self.state.wave;
        let speed = profile.speed * speed_scale(wave, self.state.map.waves.scaling.speed);
        let id = self.state.alloc_creep_id();
        self.state.creeps.push(Creep::new(
            id,
            kind,
            wave,
            profile.hp * hp_mul,
            speed,
            profile.gold,
            profile.behavior,
            self.grid.waypoints(),
        ));
        self.events.push(GameEvent::CreepSpawn { creep: id, kind });
    }

    fn complete_wave(&mut self) {
        let wave = self.state.wave;
        let interest = self.state.map.waves.scaling.gold_interest;
        let reward = wave_reward(wave, self.state.gold, interest);
        self.state.gold += reward;
        self.state.counters.waves_cleared += 1;
        debug!(wave, reward, "Wave cleared");
        self.events.push(GameEvent::WaveEnd { wave, reward });
        self.push_gold(i64::from(reward), ChangeReason::WaveReward);
    }

    fn move_phase(&mut self, dt: f64) {
        let mode = self.config.navigation;
        let mut leaked = Vec::new();
        for creep in &mut self.state.creeps {
            if advance(creep, dt, &self.grid, mode) == Advance::Leaked {
                leaked.push((creep.id, creep.kind));
            }
        }
        for (id, kind) in leaked {
            self.leak(id, kind);
        }
    }

    fn leak(&mut self, creep: CreepId, kind: CreepType) {
        if self.state.game_over {
            return;
        }
        self.state.lives = self.state.lives.saturating_sub(1);
        self.state.counters.leaks += 1;
        self.state.counters.spree = 0;
        self.events.push(GameEvent::CreepLeak { creep, kind });
        self.events.push(GameEvent::LifeChange {
            lives: self.state.lives,
            delta: -1,
            reason: ChangeReason::Leak,
        });
        if self.state.lives == 0 {
            self.end_game();
        }
    }

    fn end_game(&mut self) {
        let state = &mut self.state;
        state.game_over = true;
        state.accumulator = 0.0;
        state.auto_wave_timer = None;

        let top = state
            .towers
            .iter()
            .filter(|t| t.kills > 0)
            .fold(None::<&Tower>, |best, t| match best {
                Some(b) if b.kills >= t.kills => Some(b),
                _ => Some(t),
            });
        let c = state.counters;
        let summary = GameOverSummary {
            wave: state.wave,
            gold: state.gold,
            lives: state.lives,
            score: c.score,
            spree: c.spree,
            waves_cleared: c.waves_cleared,
            leaks: c.leaks,
            combos: c.combos,
            accuracy: c.accuracy().min(100),
            top_tower: top.map(|t| t.id),
            top_tower_kills: top.map_or(0, |t| t.kills),
        };
        debug!(wave = summary.wave, score = summary.score, "Game over");
        self.events.push(GameEvent::GameOver(summary));
    }

    fn combat_phase(&mut self, dt: f64) {
        let state = &mut self.state;
        self.index.rebuild(&state.creeps);
        let mut field = Battlefield {
            creeps: &mut state.creeps,
            index: &self.index,
            bullets: &mut state.bullets,
            particles: &mut state.particles,
            rng: &mut state.rng,
            counters: &mut state.counters,
            events: &mut self.events,
        };
        fire_towers(&mut state.towers, &mut field, dt);
        update_bullets(&mut field, dt);
        state.particles.update(dt);
    }

    fn cull_phase(&mut self) {
        let creeps = std::mem::take(&mut self.state.creeps);
        let mut survivors = Vec::with_capacity(creeps.len());
        let mut children = Vec::new();
        for creep in creeps {
            if creep.alive && creep.hp > 0.0 {
                survivors.push(creep);
            } else if creep.alive {
                self.kill(&creep, &mut children);
            }
        }
        survivors.append(&mut children);
        self.state.creeps = survivors;
    }

    fn kill(&mut self, creep: &Creep, children: &mut Vec<Creep>) {
        let state = &mut self.state;
        state.gold += creep.gold;
        state.counters.score += KILL_SCORE;
        state.counters.spree += 1;
        if let Some(tower) = creep.last_hit_by.and_then(|id| state.tower_mut(id)) {
            tower.kills += 1;
        }

        let loot = if creep.kind == CreepType::Boss {
            weighted_pick(loot::BOSS, &mut state.rng).map(|entry| entry.id)
        } else {
            None
        };

        if let Behavior::Split { count, hp_scale } = creep.behavior.behavior {
            for _ in 0..count {
                let id = state.alloc_creep_id();
                children.push(split_child(creep, id, hp_scale));
                self.events.push(GameEvent::CreepSpawn {
                    creep: id,
                    kind: creep.kind,
                });
            }
        }

        state.particles.death(creep.pos, creep.kind);
        self.events.push(GameEvent::CreepKill {
            creep: creep.id,
            kind: creep.kind,
            gold: creep.gold,
            tower: creep.last_hit_by,
            loot,
        });
        self.push_gold(i64::from(creep.gold), ChangeReason::Kill);
    }

    fn auto_wave_phase(&mut self, dt: f64) {
        let state = &mut self.state;
        if !state.auto_wave || state.waves.is_spawning() || !state.creeps.is_empty() {
            state.auto_wave_timer = None;
            return;
        }
        let timer = state.auto_wave_timer;
        match timer {
            None => state.auto_wave_timer = Some(f64::from(state.auto_wave_delay_ms) / 1000.0),
            Some(remaining) if remaining - dt > 0.0 => {
                state.auto_wave_timer = Some(remaining - dt);
            }
            Some(_) => {
                state.auto_wave_timer = None;
                self.begin_wave();
            }
        }
    }

    // ---------------------------------------------------------------------
    // Helpers
    // ---------------------------------------------------------------------

    fn rebuild_paths(&mut self) {
        self.grid.rebuild();
        repath_creeps(&mut self.state.creeps, &self.grid, self.config.navigation);
    }

    fn refresh_hover(&mut self) {
        if let Some(hover) = self.state.hover {
            self.state.hover = Some(Hover {
                cell: hover.cell,
                valid: can_place(&self.state, &self.grid, hover.cell),
            });
        }
    }

    fn push_gold(&mut self, delta: i64, reason: ChangeReason) {
        self.events.push(GameEvent::GoldChange {
            gold: self.state.gold,
            delta,
            reason,
        });
    }

    /// Deliver buffered events to the stats collector and subscribers.
    fn flush(&mut self) {
        for event in std::mem::take(&mut self.events) {
            self.stats.record(&event, self.state.time);
            self.bus.publish(&event);
        }
    }

    #[cfg(feature = "debug-validation")]
    fn validate_invariants(&self) {
        let ordered = |ids: Vec<u32>| ids.windows(2).all(|w| w[0] < w[1]);
        if !ordered(self.state.towers.iter().map(|t| t.id.0).collect()) {
            warn!(tick = self.state.tick, "Towers out of id order");
        }
        if !ordered(self.state.creeps.iter().map(|c| c.id.0).collect()) {
            warn!(tick = self.state.tick, "Creeps out of id order");
        }
        if !self.grid.has_route() {
            warn!(tick = self.state.tick, "No route from start to end");
        }
        for tower in &self.state.towers {
            if !self.grid.has_tower(tower.cell) {
                warn!(tower = tower.id.0, "Tower cell missing from path grid");
            }
        }
    }
}

/// Child creep left behind by a splitting parent, at the parent's position
/// and path progress.
fn split_child(parent: &Creep, id: CreepId, hp_scale: f64) -> Creep {
    let mut child = Creep::new(
        id,
        parent.kind,
        parent.wave,
        parent.max_hp * hp_scale,
        parent.speed,
        (parent.gold / 2).max(1),
        Behavior::Linear,
        parent.path.clone(),
    );
    child.pos = parent.pos;
    child.seg = parent.seg;
    child.offset = parent.offset;
    child.flow_target = parent.flow_target;
    child
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::map::MapRules;
    use crate::math::Vec2;

    fn sim() -> Simulation {
        Simulation::with_seed(MapDefinition::default_map(), 42).unwrap()
    }

    fn record(sim: &mut Simulation, channel: Channel) -> Rc<RefCell<Vec<GameEvent>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        sim.subscribe(channel, move |e| sink.borrow_mut().push(e.clone()));
        log
    }

    #[test]
    fn test_new_rejects_zero_step() {
        let config = SimConfig {
            fixed_step: 0.0,
            ..SimConfig::default().with_seed(1)
        };
        assert!(matches!(
            Simulation::new(MapDefinition::default_map(), config),
            Err(GameError::InvalidState(_))
        ));
    }

    #[test]
    fn test_place_and_sell_refund() {
        let mut sim = sim();
        let id = sim.place_tower(5, 5, TowerKind::Archer).unwrap();
        assert_eq!(sim.state().gold, 200);
        assert_eq!(sim.state().selected, Some(id));
        assert!(sim.path_grid().has_tower(Cell::new(5, 5)));

        assert!(sim.sell_tower(id));
        assert_eq!(sim.state().gold, 240);
        assert!(sim.state().towers.is_empty());
        assert!(!sim.path_grid().has_tower(Cell::new(5, 5)));
        assert_eq!(sim.state().selected, None);
        assert!(!sim.sell_tower(id));
    }

    #[test]
    fn test_place_emits_events_in_order() {
        let mut sim = sim();
        let place = record(&mut sim, Channel::TowerPlace);
        let gold = record(&mut sim, Channel::GoldChange);
        sim.place_tower(3, 3, TowerKind::Fire).unwrap();
        assert_eq!(place.borrow().len(), 1);
        assert!(matches!(
            gold.borrow()[0],
            GameEvent::GoldChange {
                gold: 160,
                delta: -90,
                reason: ChangeReason::PlaceTower
            }
        ));
    }

    #[test]
    fn test_placement_failures() {
        let mut sim = sim();
        assert_eq!(
            sim.place_tower(-1, 0, TowerKind::Archer),
            Err(PlacementError::Oob)
        );
        assert_eq!(
            sim.place_tower(0, 8, TowerKind::Archer),
            Err(PlacementError::Start)
        );
        assert_eq!(
            sim.place_tower(4, 4, TowerKind::Wind),
            Err(PlacementError::InvalidTower)
        );
        assert_eq!(
            sim.place_tower_named(4, 4, "LASER"),
            Err(PlacementError::InvalidTower)
        );
        assert_eq!(
            sim.place_tower_named(23, 8, "LASER"),
            Err(PlacementError::End)
        );
        sim.place_tower(4, 4, TowerKind::Archer).unwrap();
        assert_eq!(
            sim.place_tower_named(4, 4, "cannon"),
            Err(PlacementError::Occupied)
        );
        sim.place_tower(6, 4, TowerKind::Fire).unwrap();
        sim.place_tower(8, 4, TowerKind::Fire).unwrap();
        assert_eq!(
            sim.place_tower(10, 4, TowerKind::Ice),
            Err(PlacementError::Gold)
        );
        assert_eq!(sim.state().gold, 20);
    }

    #[test]
    fn test_level_up_and_evolve() {
        let mut sim = Simulation::new(
            MapDefinition::default_map(),
            SimConfig {
                starting_gold: 2000,
                ..SimConfig::default().with_seed(1)
            },
        )
        .unwrap();
        sim.place_tower(4, 4, TowerKind::Fire).unwrap();
        assert!(!sim.apply_evolution("INFERNO"));

        assert!(sim.level_up_selected());
        let tower = sim.state().selected_tower().unwrap();
        assert_eq!(tower.level, 2);
        assert_eq!(tower.free_tier_picks, 1);
        assert_eq!(tower.spent, 90 + 80 + 60);
        assert_eq!(sim.state().gold, 2000 - 90 - 140);

        assert!(!sim.apply_evolution("WILDFIRE"));
        assert!(sim.apply_evolution("inferno"));
        let tower = sim.state().selected_tower().unwrap();
        assert_eq!(tower.tree, vec!["INFERNO".to_string()]);
        assert_eq!(tower.free_tier_picks, 0);
        assert_eq!(sim.stats().towers[&tower.id].evolutions.len(), 1);
    }

    #[test]
    fn test_evolutions_disabled_by_map() {
        let mut map = MapDefinition::default_map();
        map.rules = MapRules {
            disable_evolutions: true,
            ..MapRules::default()
        };
        let mut sim = Simulation::new(
            map,
            SimConfig {
                starting_gold: 1000,
                ..SimConfig::default().with_seed(1)
            },
        )
        .unwrap();
        sim.place_tower(4, 4, TowerKind::Fire).unwrap();
        assert!(sim.level_up_selected());
        assert!(!sim.apply_evolution("INFERNO"));
    }

    #[test]
    fn test_targeting_needs_selection() {
        let mut sim = sim();
        assert!(!sim.set_targeting(TargetingMode::Last));
        sim.place_tower(4, 4, TowerKind::Archer).unwrap();
        assert!(sim.set_targeting(TargetingMode::Cycle));
        assert_eq!(
            sim.state().selected_tower().unwrap().targeting,
            TargetingMode::Cycle
        );
        assert!(sim.select_tower_at(9, 9).is_none());
        assert!(!sim.set_targeting(TargetingMode::First));
    }

    #[test]
    fn test_hover_validity() {
        let mut sim = sim();
        sim.set_hover(5, 5);
        assert_eq!(sim.state().hover.map(|h| h.valid), Some(true));
        sim.place_tower(5, 5, TowerKind::Archer).unwrap();
        assert_eq!(sim.state().hover.map(|h| h.valid), Some(false));
        sim.set_hover(99, 0);
        assert_eq!(sim.state().hover, None);
    }

    #[test]
    fn test_fixed_step_accumulator() {
        let mut sim = sim();
        assert_eq!(sim.update(0.005).steps, 0);

        let mut sim = self::sim();
        let a = sim.update(0.01);
        let b = sim.update(0.01);
        assert_eq!(a.steps + b.steps, 1);
        assert!(b.alpha >= 0.0 && b.alpha < 1.0);

        let mut sim = self::sim();
        let report = sim.update(0.1);
        assert!(report.steps > 1);
        assert!(report.alpha >= 0.0 && report.alpha < 1.0);
    }

    #[test]
    fn test_substep_cap_drops_backlog() {
        let mut sim = sim();
        let report = sim.update(10.0);
        assert_eq!(report.steps, 8);
        assert_eq!(sim.state().tick, 8);
        assert!(report.alpha < 1.0);
    }

    #[test]
    fn test_speed_scales_steps() {
        let mut sim = sim();
        sim.set_speed(2);
        assert_eq!(sim.state().speed, 2);
        let report = sim.update(0.06);
        assert_eq!(report.steps, 7);
    }

    #[test]
    fn test_speed_caps() {
        let mut sim = sim();
        sim.set_speed(3);
        assert_eq!(sim.state().speed, 2);
        sim.cycle_speed();
        assert_eq!(sim.state().speed, 4);
        sim.cycle_speed();
        assert_eq!(sim.state().speed, 1);
        sim.set_speed(0);
        assert_eq!(sim.state().speed, 1);
    }

    #[test]
    fn test_paused_does_nothing() {
        let mut sim = sim();
        let pauses = record(&mut sim, Channel::PauseChange);
        sim.set_paused(true);
        sim.set_paused(true);
        assert_eq!(pauses.borrow().len(), 1);
        assert_eq!(sim.update(1.0).steps, 0);
        sim.step(0.1);
        assert_eq!(sim.state().tick, 0);
        assert!(!sim.start_wave());
    }

    #[test]
    fn test_wave_completes_once_with_reward() {
        let mut sim = sim();
        let ends = record(&mut sim, Channel::WaveEnd);
        assert!(sim.start_wave());
        assert!(!sim.start_wave());
        for _ in 0..400 {
            sim.step(0.1);
        }
        assert_eq!(ends.borrow().len(), 1);
        assert_eq!(
            ends.borrow()[0],
            GameEvent::WaveEnd {
                wave: 1,
                reward: 13
            }
        );
        assert_eq!(sim.state().lives, 14);
        assert_eq!(sim.state().gold, 263);
        assert_eq!(sim.stats().totals.creeps_leaked, 6);
        assert!(sim.start_wave());
        assert_eq!(sim.state().wave, 2);
    }

    #[test]
    fn test_max_waves() {
        let mut map = MapDefinition::default_map();
        map.rules.max_waves = 1;
        let mut sim = Simulation::with_seed(map, 3).unwrap();
        assert!(sim.start_wave());
        for _ in 0..400 {
            sim.step(0.1);
        }
        assert!(!sim.start_wave());
    }

    #[test]
    fn test_auto_wave_starts_after_delay() {
        let mut sim = sim();
        sim.set_auto_wave(true, 500);
        for _ in 0..4 {
            sim.step(0.1);
        }
        assert_eq!(sim.state().wave, 0);
        for _ in 0..4 {
            sim.step(0.1);
        }
        assert_eq!(sim.state().wave, 1);
    }

    #[test]
    fn test_game_over_summary() {
        let mut sim = Simulation::new(
            MapDefinition::default_map(),
            SimConfig {
                starting_lives: 2,
                ..SimConfig::default().with_seed(9)
            },
        )
        .unwrap();
        let over = record(&mut sim, Channel::GameOver);
        sim.start_wave();
        for _ in 0..400 {
            sim.step(0.1);
        }
        assert!(sim.state().game_over);
        assert_eq!(sim.state().lives, 0);
        assert_eq!(over.borrow().len(), 1);
        let GameEvent::GameOver(summary) = &over.borrow()[0] else {
            panic!("expected a game over event");
        };
        assert_eq!(summary.leaks, 2);
        assert_eq!(summary.wave, 1);
        let tick = sim.state().tick;
        sim.step(0.1);
        assert_eq!(sim.state().tick, tick);
    }

    #[test]
    fn test_kill_awards_bounty_and_credit() {
        let mut sim = sim();
        let id = sim.place_tower(3, 7, TowerKind::Archer).unwrap();
        let kills = record(&mut sim, Channel::CreepKill);
        let creep_id = sim.state.alloc_creep_id();
        let mut creep = Creep::new(
            creep_id,
            CreepType::Grunt,
            1,
            1.0,
            0.0,
            8,
            Behavior::Linear,
            vec![Vec2::new(112.0, 272.0), Vec2::new(752.0, 272.0)],
        );
        creep.last_hit_by = Some(id);
        creep.hp = 0.0;
        sim.state.creeps.push(creep);
        sim.step(1.0 / 60.0);

        assert!(sim.state().creeps.is_empty());
        assert_eq!(sim.state().gold, 208);
        assert_eq!(sim.state().counters.score, 3);
        assert_eq!(sim.state().tower(id).unwrap().kills, 1);
        assert_eq!(kills.borrow().len(), 1);
    }

    #[test]
    fn test_split_children_inherit_progress() {
        let mut sim = sim();
        let id = sim.state.alloc_creep_id();
        let mut parent = Creep::new(
            id,
            CreepType::Tank,
            1,
            200.0,
            10.0,
            16,
            Behavior::SPLIT,
            sim.path_grid().waypoints(),
        );
        parent.seg = 3;
        parent.offset = 10.0;
        parent.hp = 0.0;
        sim.state.creeps.push(parent);
        sim.step(1.0 / 60.0);

        let creeps = &sim.state().creeps;
        assert_eq!(creeps.len(), 2);
        assert!(creeps.iter().all(|c| c.seg == 3 && (c.max_hp - 90.0).abs() < 1e-9));
        assert!(creeps[0].id < creeps[1].id);
        assert_eq!(creeps[0].behavior.behavior, Behavior::Linear);
    }

    #[test]
    fn test_load_map_validates_first() {
        let mut sim = sim();
        sim.place_tower(4, 4, TowerKind::Archer).unwrap();
        let mut bad = MapDefinition::default_map();
        bad.start = Cell::new(50, 50);
        assert!(matches!(sim.load_map(bad), Err(GameError::InvalidMap(_))));
        assert_eq!(sim.state().towers.len(), 1);

        let changes = record(&mut sim, Channel::MapChange);
        sim.load_map(MapDefinition::twist()).unwrap();
        assert!(sim.state().towers.is_empty());
        assert_eq!(sim.map_info().id, MapDefinition::twist().id);
        assert_eq!(changes.borrow().len(), 1);
        assert_eq!(sim.seed(), 42);
    }

    #[test]
    fn test_reset_replaces_state() {
        let mut sim = sim();
        let resets = record(&mut sim, Channel::GameReset);
        sim.place_tower(4, 4, TowerKind::Archer).unwrap();
        sim.start_wave();
        sim.step(0.5);
        sim.reset(Some(7));
        assert_eq!(sim.seed(), 7);
        assert_eq!(sim.state().gold, 250);
        assert_eq!(sim.state().tick, 0);
        assert!(sim.state().creeps.is_empty());
        assert_eq!(sim.stats().totals.shots, 0);
        assert_eq!(resets.borrow().len(), 1);
    }

    #[test]
    fn test_serialize_strips_rng() {
        let sim = sim();
        let value = sim.serialize().unwrap();
        assert!(value.get("rng").is_none());
        assert_eq!(value["gold"], 250);
    }

    #[test]
    fn test_state_hash_tracks_changes() {
        let a = sim();
        let mut b = sim();
        assert_eq!(a.state_hash(), b.state_hash());
        b.place_tower(4, 4, TowerKind::Archer).unwrap();
        assert_ne!(a.state_hash(), b.state_hash());
    }

    #[test]
    fn test_subscribe_named() {
        let mut sim = sim();
        assert!(sim.subscribe_named("towerPlace", |_| {}).is_ok());
        assert!(matches!(
            sim.subscribe_named("towerExplode", |_| {}),
            Err(GameError::UnknownChannel(_))
        ));
    }

    #[test]
    fn test_apply_action() {
        let mut sim = sim();
        assert!(sim.apply_action(&Action::PlaceTower {
            x: 4,
            y: 4,
            kind: TowerKind::Archer
        }));
        assert!(sim.apply_action(&Action::SetTargeting(TargetingMode::Last)));
        assert!(sim.apply_action(&Action::SellTower { x: 4, y: 4 }));
        assert!(!sim.apply_action(&Action::SellTower { x: 4, y: 4 }));
        assert!(sim.apply_action(&Action::StartWave));
        assert_eq!(sim.state().wave, 1);
    }
}
