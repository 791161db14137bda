//! Wave composition and the spawn timer.
//!
//! A [`WaveTable`] decides what each wave contains; the
//! [`WaveController`] meters creeps out of the current wave's packs and
//! reports when the wave is over. Neither touches the simulation state
//! directly.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::content::CreepType;
use crate::map::{WaveMode, WaveSettings};

/// Seconds past the last spawn before the next pack begins.
const PACK_GRACE: f64 = 0.1;

/// A group of identical creeps spawned at a fixed interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnPack {
    /// Creep type.
    #[serde(rename = "type", alias = "kind")]
    pub kind: CreepType,
    /// Number of creeps.
    pub count: u32,
    /// Seconds between spawns.
    #[serde(default = "default_gap")]
    pub gap: f64,
    /// Hit point multiplier.
    #[serde(default = "default_hp_mul")]
    pub hp_mul: f64,
}

const fn default_gap() -> f64 {
    0.5
}

const fn default_hp_mul() -> f64 {
    1.0
}

impl SpawnPack {
    /// Create a pack.
    #[must_use]
    pub const fn new(kind: CreepType, count: u32, gap: f64, hp_mul: f64) -> Self {
        Self {
            kind,
            count,
            gap,
            hp_mul,
        }
    }

    /// Seconds between spawns; zero, negative or NaN falls back to 0.5.
    #[must_use]
    pub fn spawn_gap(&self) -> f64 {
        if self.gap > 0.0 {
            self.gap
        } else {
            default_gap()
        }
    }

    /// Hit point multiplier; zero, negative or NaN falls back to 1.
    #[must_use]
    pub fn hp_multiplier(&self) -> f64 {
        if self.hp_mul > 0.0 {
            self.hp_mul
        } else {
            default_hp_mul()
        }
    }
}

/// Source of wave compositions.
pub trait WaveTable: fmt::Debug {
    /// Packs for wave `wave` (1-based), or `None` if the table has no such
    /// wave.
    fn packs(&self, wave: u32) -> Option<Vec<SpawnPack>>;
}

/// The built-in generated waves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProceduralTable {
    /// Hit point growth per wave.
    pub hp_rate: f64,
}

impl Default for ProceduralTable {
    fn default() -> Self {
        Self { hp_rate: 0.07 }
    }
}

impl WaveTable for ProceduralTable {
    fn packs(&self, wave: u32) -> Option<Vec<SpawnPack>> {
        use CreepType::{Boss, Grunt, Runner, Shield, Tank};

        let packs = match wave {
            0 => return None,
            1 => vec![SpawnPack::new(Grunt, 6, 0.6, 0.9)],
            2 => vec![
                SpawnPack::new(Grunt, 8, 0.55, 1.0),
                SpawnPack::new(Runner, 4, 0.55, 1.0),
            ],
            3 => vec![
                SpawnPack::new(Grunt, 8, 0.5, 1.1),
                SpawnPack::new(Shield, 4, 0.5, 1.0),
            ],
            n if n % 10 == 0 => vec![SpawnPack::new(Boss, 1, 1.0, 1.0 + f64::from(n) * 0.18)],
            n => {
                const POOL: [CreepType; 4] = [Grunt, Runner, Tank, Shield];
                let diff = 1.0 + f64::from(n) * self.hp_rate;
                (0..3u32)
                    .map(|i| {
                        let kind = POOL[((n + i) % 4) as usize];
                        let count = 6 + n / 2 + u32::from(i == 2);
                        let hp_mul = if kind == Tank { diff * 1.35 } else { diff };
                        SpawnPack::new(kind, count, 0.5, hp_mul)
                    })
                    .collect()
            }
        };
        Some(packs)
    }
}

/// Hand-authored waves, optionally continued procedurally.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthoredTable {
    waves: Vec<Vec<SpawnPack>>,
    fallback: Option<ProceduralTable>,
}

impl AuthoredTable {
    /// Authored waves only.
    #[must_use]
    pub fn new(waves: Vec<Vec<SpawnPack>>) -> Self {
        Self {
            waves,
            fallback: None,
        }
    }

    /// Authored waves, then procedural ones.
    #[must_use]
    pub fn hybrid(waves: Vec<Vec<SpawnPack>>, fallback: ProceduralTable) -> Self {
        Self {
            waves,
            fallback: Some(fallback),
        }
    }
}

impl WaveTable for AuthoredTable {
    fn packs(&self, wave: u32) -> Option<Vec<SpawnPack>> {
        let idx = (wave as usize).checked_sub(1)?;
        match self.waves.get(idx) {
            Some(packs) => Some(packs.clone()),
            None => self.fallback.as_ref().and_then(|f| f.packs(wave)),
        }
    }
}

/// Build the table a map asks for.
#[must_use]
pub fn table_for(settings: &WaveSettings) -> Box<dyn WaveTable> {
    let procedural = ProceduralTable {
        hp_rate: settings.scaling.hp,
    };
    let authored = || {
        settings
            .authored
            .iter()
            .flatten()
            .map(|w| w.packs.clone())
            .collect::<Vec<_>>()
    };
    match settings.mode {
        WaveMode::Procedural => Box::new(procedural),
        WaveMode::Authored => Box::new(AuthoredTable::new(authored())),
        WaveMode::Hybrid => Box::new(AuthoredTable::hybrid(authored(), procedural)),
    }
}

/// Gold paid when a wave is cleared: `floor(5 + wave * 1.3 + gold * interest)`.
#[must_use]
pub fn wave_reward(wave: u32, gold: u32, interest: f64) -> u32 {
    (5.0 + f64::from(wave) * 1.3 + f64::from(gold) * interest).floor() as u32
}

/// Creep speed multiplier for a wave: grows after wave 3.
#[must_use]
pub fn speed_scale(wave: u32, rate: f64) -> f64 {
    1.0 + f64::from(wave.saturating_sub(3)) * rate
}

/// Spawner phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WavePhase {
    /// No wave in progress.
    #[default]
    Idle,
    /// Packs are being spawned or creeps of the wave are still alive.
    Spawning,
}

/// What one spawner step produced.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SpawnerStep {
    /// Creep to spawn this step, with its hp multiplier.
    pub spawn: Option<(CreepType, f64)>,
    /// The wave just ended.
    pub wave_complete: bool,
}

/// Meters creeps out of the current wave.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WaveController {
    phase: WavePhase,
    packs: Vec<SpawnPack>,
    pack_index: usize,
    spawned_in_pack: u32,
    timer: f64,
}

impl WaveController {
    /// Idle controller.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> WavePhase {
        self.phase
    }

    /// Whether a wave is in progress.
    #[must_use]
    pub fn is_spawning(&self) -> bool {
        self.phase == WavePhase::Spawning
    }

    /// Creeps still to be spawned in the current wave.
    #[must_use]
    pub fn pending(&self) -> u32 {
        self.packs
            .iter()
            .skip(self.pack_index)
            .map(|p| p.count)
            .sum::<u32>()
            .saturating_sub(self.spawned_in_pack)
    }

    /// Start spawning a wave. Returns `false` if one is already running.
    pub fn begin(&mut self, packs: Vec<SpawnPack>) -> bool {
        if self.is_spawning() {
            return false;
        }
        self.packs = packs;
        self.pack_index = 0;
        self.spawned_in_pack = 0;
        self.timer = 0.0;
        self.phase = WavePhase::Spawning;
        true
    }

    /// Advance the spawn timer.
    ///
    /// `creeps_alive` is the number of creeps on the board before this
    /// step; the wave ends once every pack is spawned and it is zero.
    pub fn step(&mut self, dt: f64, creeps_alive: usize) -> SpawnerStep {
        let mut out = SpawnerStep::default();
        if !self.is_spawning() {
            return out;
        }

        if let Some(pack) = self.packs.get(self.pack_index).copied() {
            self.timer -= dt;
            if self.timer <= 0.0 && self.spawned_in_pack < pack.count {
                out.spawn = Some((pack.kind, pack.hp_multiplier()));
                self.spawned_in_pack += 1;
                self.timer = pack.spawn_gap();
            }
            if self.spawned_in_pack >= pack.count && self.timer < -PACK_GRACE {
                self.pack_index += 1;
                self.spawned_in_pack = 0;
                self.timer = 0.0;
            }
        }

        if self.pack_index >= self.packs.len() && creeps_alive == 0 && out.spawn.is_none() {
            self.phase = WavePhase::Idle;
            out.wave_complete = true;
        }
        out
    }

    /// Drop any wave in progress.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
