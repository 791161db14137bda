//! Event-driven run statistics.
//!
//! [`StatsCollector`] consumes the same [`GameEvent`] stream that
//! subscribers see and aggregates it into totals, per-wave records and
//! per-tower records. It never reads simulation state directly.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::components::TowerId;
use crate::content::{CreepType, TowerKind};
use crate::events::GameEvent;

/// Whole-run totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    /// Highest wave cleared.
    pub waves_cleared: u32,
    /// Gold gained from any source.
    pub gold_earned: u64,
    /// Gold paid for towers and upgrades.
    pub gold_spent: u64,
    /// Direct and blast damage dealt.
    pub damage: f64,
    /// Creeps that entered the board.
    pub creeps_spawned: u32,
    /// Creeps killed.
    pub creeps_killed: u32,
    /// Creeps that reached the exit.
    pub creeps_leaked: u32,
    /// Lives lost.
    pub lives_lost: u32,
    /// Combos triggered.
    pub combos: u32,
    /// Tower firings.
    pub shots: u32,
    /// Hit events, including pierce, bounce and meteor hits.
    pub hits: u32,
}

/// One wave.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WaveRecord {
    /// Wave number.
    pub wave: u32,
    /// Creeps spawned.
    pub spawned: u32,
    /// Creeps killed.
    pub killed: u32,
    /// Creeps leaked.
    pub leaked: u32,
    /// Damage dealt.
    pub damage: f64,
    /// Combos triggered.
    pub combos: u32,
    /// Clear reward.
    pub reward: u32,
    /// Simulated seconds from start to clear.
    pub duration: f64,
    #[serde(skip)]
    started_at: f64,
}

/// One tower over its lifetime.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TowerRecord {
    /// Kind, once known.
    pub kind: Option<TowerKind>,
    /// Firings.
    pub shots: u32,
    /// Hit events.
    pub hits: u32,
    /// Damage dealt.
    pub damage: f64,
    /// Kills credited.
    pub kills: u32,
    /// Highest level reached.
    pub level: u32,
    /// Evolution keys taken.
    pub evolutions: Vec<String>,
    /// Refund if sold.
    pub refund: Option<u32>,
}

/// Snapshot handed to callers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSummary {
    /// Totals.
    pub totals: Totals,
    /// `round(hits / max(1, shots) * 100)`.
    pub accuracy: u32,
    /// Per-wave records in wave order.
    pub waves: Vec<WaveRecord>,
    /// Kills by creep type.
    pub kills_by_type: BTreeMap<CreepType, u32>,
    /// Leaks by creep type.
    pub leaks_by_type: BTreeMap<CreepType, u32>,
    /// Damage by element.
    pub damage_by_element: BTreeMap<TowerKind, f64>,
    /// Per-tower records.
    pub towers: BTreeMap<TowerId, TowerRecord>,
    /// Tower with the most damage.
    pub top_damage_tower: Option<TowerId>,
}

/// Accumulates statistics from game events.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsCollector {
    totals: Totals,
    waves: BTreeMap<u32, WaveRecord>,
    current_wave: Option<u32>,
    kills_by_type: BTreeMap<CreepType, u32>,
    leaks_by_type: BTreeMap<CreepType, u32>,
    damage_by_element: BTreeMap<TowerKind, f64>,
    towers: BTreeMap<TowerId, TowerRecord>,
}

/// Hit percentage rounded to an integer.
#[must_use]
pub fn accuracy(hits: u32, shots: u32) -> u32 {
    (f64::from(hits) / f64::from(shots.max(1)) * 100.0).round() as u32
}

impl StatsCollector {
    /// Empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn wave_slot(&mut self) -> Option<&mut WaveRecord> {
        let wave = self.current_wave?;
        Some(self.waves.entry(wave).or_insert_with(|| WaveRecord {
            wave,
            ..WaveRecord::default()
        }))
    }

    fn tower(&mut self, id: TowerId) -> &mut TowerRecord {
        self.towers.entry(id).or_default()
    }

    /// Fold one event in. `time` is the simulated clock in seconds.
    pub fn record(&mut self, event: &GameEvent, time: f64) {
        match event {
            GameEvent::GameReset { .. } => *self = Self::default(),
            GameEvent::WaveStart { wave } => {
                self.current_wave = Some(*wave);
                let record = self.waves.entry(*wave).or_insert_with(|| WaveRecord {
                    wave: *wave,
                    ..WaveRecord::default()
                });
                record.started_at = time;
            }
            GameEvent::WaveEnd { wave, reward } => {
                if let Some(record) = self.waves.get_mut(wave) {
                    record.reward += reward;
                    record.duration = time - record.started_at;
                }
                self.totals.waves_cleared = self.totals.waves_cleared.max(*wave);
            }
            GameEvent::LifeChange { delta, .. } => {
                if *delta < 0 {
                    self.totals.lives_lost += delta.unsigned_abs();
                }
            }
            GameEvent::GoldChange { delta, .. } => {
                if *delta > 0 {
                    self.totals.gold_earned += delta.unsigned_abs();
                } else {
                    self.totals.gold_spent += delta.unsigned_abs();
                }
            }
            GameEvent::TowerPlace { tower, kind, .. } => {
                let record = self.tower(*tower);
                record.kind = Some(*kind);
                record.level = 1;
            }
            GameEvent::TowerSell { tower, refund } => self.tower(*tower).refund = Some(*refund),
            GameEvent::TowerLevel { tower, to, .. } => self.tower(*tower).level = *to,
            GameEvent::TowerEvo { tower, key } => self.tower(*tower).evolutions.push(key.clone()),
            GameEvent::Shot { tower } => {
                self.totals.shots += 1;
                self.tower(*tower).shots += 1;
            }
            GameEvent::Hit { tower } => {
                self.totals.hits += 1;
                self.tower(*tower).hits += 1;
            }
            GameEvent::CreepDamage {
                amount,
                element,
                tower,
                ..
            } => {
                self.totals.damage += amount;
                *self.damage_by_element.entry(*element).or_default() += amount;
                let record = self.tower(*tower);
                record.damage += amount;
                record.kind.get_or_insert(*element);
                if let Some(w) = self.wave_slot() {
                    w.damage += amount;
                }
            }
            GameEvent::CreepSpawn { .. } => {
                self.totals.creeps_spawned += 1;
                if let Some(w) = self.wave_slot() {
                    w.spawned += 1;
                }
            }
            GameEvent::CreepKill { kind, tower, .. } => {
                self.totals.creeps_killed += 1;
                *self.kills_by_type.entry(*kind).or_default() += 1;
                if let Some(id) = tower {
                    self.tower(*id).kills += 1;
                }
                if let Some(w) = self.wave_slot() {
                    w.killed += 1;
                }
            }
            GameEvent::CreepLeak { kind, .. } => {
                self.totals.creeps_leaked += 1;
                *self.leaks_by_type.entry(*kind).or_default() += 1;
                if let Some(w) = self.wave_slot() {
                    w.leaked += 1;
                }
            }
            GameEvent::Combo { .. } => {
                self.totals.combos += 1;
                if let Some(w) = self.wave_slot() {
                    w.combos += 1;
                }
            }
            GameEvent::GameOver(_)
            | GameEvent::MapChange(_)
            | GameEvent::PauseChange { .. }
            | GameEvent::SpeedChange { .. }
            | GameEvent::AutoWaveChange { .. } => {}
        }
    }

    /// Current totals.
    #[must_use]
    pub fn totals(&self) -> &Totals {
        &self.totals
    }

    /// Build a summary snapshot.
    #[must_use]
    pub fn summary(&self) -> StatsSummary {
        let top_damage_tower = self
            .towers
            .iter()
            .filter(|(_, t)| t.damage > 0.0)
            .fold(None::<(TowerId, f64)>, |best, (id, t)| match best {
                Some((_, dmg)) if dmg >= t.damage => best,
                _ => Some((*id, t.damage)),
            })
            .map(|(id, _)| id);
        StatsSummary {
            totals: self.totals.clone(),
            accuracy: accuracy(self.totals.hits, self.totals.shots),
            waves: self.waves.values().cloned().collect(),
            kills_by_type: self.kills_by_type.clone(),
            leaks_by_type: self.leaks_by_type.clone(),
            damage_by_element: self.damage_by_element.clone(),
            towers: self.towers.clone(),
            top_damage_tower,
        }
    }
}
