//! Entity records owned by the simulation state.
//!
//! Towers, creeps and bullets are plain data. Cross references between
//! them are ids only ([`TowerId`], [`CreepId`]), never borrows, so the
//! state can be cloned, hashed and serialized as a unit.

use serde::{Deserialize, Serialize};

use crate::combat::StatusBag;
use crate::content::{AttackKind, Behavior, CreepType, StatusKind, TowerKind};
use crate::math::{Cell, Vec2};

/// Unique tower identifier, assigned sequentially.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct TowerId(pub u32);

/// Unique creep identifier, assigned sequentially.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct CreepId(pub u32);

/// Target selection policy of a tower.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetingMode {
    /// Furthest along the path.
    #[default]
    First,
    /// Least far along the path.
    Last,
    /// Rotate through every creep in range.
    Cycle,
}

impl TargetingMode {
    /// Parse a lowercase mode name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "first" => Some(Self::First),
            "last" => Some(Self::Last),
            "cycle" => Some(Self::Cycle),
            _ => None,
        }
    }
}

/// Modifiers accumulated from evolution choices.
///
/// Every field defaults to its neutral value, so a fresh tower behaves
/// exactly like its blueprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TowerMods {
    /// Additive damage multiplier.
    pub damage: f64,
    /// Burn strength.
    pub burn: f64,
    /// Poison strength.
    pub poison: f64,
    /// Extra chill slow fraction.
    pub chill: f64,
    /// Chill duration multiplier bonus.
    pub slow_duration: f64,
    /// Extra chain jumps.
    pub chain_bounce: u32,
    /// Extra chain radius in pixels.
    pub chain_range: f64,
    /// Extra stun seconds for the neuro combo.
    pub stun: f64,
    /// Extra blast radius in pixels.
    pub aoe: f64,
    /// Wide splash enabled.
    pub splash: bool,
    /// Periodic frost nova.
    pub nova: bool,
    /// Nova period multiplier.
    pub nova_frequency: f64,
    /// Resistance shred applied with status effects.
    pub res_shred: f64,
    /// Extra poison stacks beyond the first.
    pub max_stacks: u32,
    /// Additional creeps a bolt passes through.
    pub pierce: u32,
    /// Explosions spread burn beyond the blast.
    pub burn_spread: bool,
    /// Burn damage amplification.
    pub burn_amp: f64,
    /// Chill also applies brittle with this amplification.
    pub shatter: f64,
    /// Periodic meteor strike.
    pub meteors: bool,
    /// Explosions hit burning creeps harder.
    pub cataclysm: bool,
    /// Chain bounces stun.
    pub stun_chain: bool,
    /// Lightning damage over time on chain bounces.
    pub light_dot: f64,
    /// Chain bounces keep full damage.
    pub singularity: bool,
    /// Poison hits jump to a neighbor.
    pub poison_spread: bool,
    /// Acid combo amplification.
    pub acid_amp: f64,
    /// Instant damage when the neuro combo stuns.
    pub stun_damage: f64,
}

impl Default for TowerMods {
    fn default() -> Self {
        Self {
            damage: 0.0,
            burn: 0.0,
            poison: 0.0,
            chill: 0.0,
            slow_duration: 0.0,
            chain_bounce: 0,
            chain_range: 0.0,
            stun: 0.0,
            aoe: 0.0,
            splash: false,
            nova: false,
            nova_frequency: 1.0,
            res_shred: 0.0,
            max_stacks: 1,
            pierce: 0,
            burn_spread: false,
            burn_amp: 0.0,
            shatter: 0.0,
            meteors: false,
            cataclysm: false,
            stun_chain: false,
            light_dot: 0.0,
            singularity: false,
            poison_spread: false,
            acid_amp: 0.0,
            stun_damage: 0.0,
        }
    }
}

/// A placed tower.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tower {
    /// Unique id.
    pub id: TowerId,
    /// Grid cell occupied.
    pub cell: Cell,
    /// Pixel center.
    pub pos: Vec2,
    /// Element kind.
    pub kind: TowerKind,
    /// Current level, starting at 1.
    pub level: u32,
    /// Evolution keys chosen so far, one per tier.
    pub tree: Vec<String>,
    /// Targeting radius.
    pub range: f64,
    /// Shots per second.
    pub fire_rate: f64,
    /// Base damage per shot.
    pub damage: f64,
    /// Delivery mechanism.
    pub attack: AttackKind,
    /// Status applied on hit.
    pub status: Option<StatusKind>,
    /// Evolution modifiers.
    pub mods: TowerMods,
    /// Damage bonus from distinct neighboring elements.
    pub synergy: f64,
    /// Target selection policy.
    pub targeting: TargetingMode,
    /// Last creep chosen in cycle mode.
    pub cycle_last: Option<CreepId>,
    /// Gold invested, used for refunds.
    pub spent: u32,
    /// Creeps killed.
    pub kills: u32,
    /// Unspent evolution picks.
    pub free_tier_picks: u32,
    /// Seconds until the next shot.
    pub cooldown: f64,
    /// Seconds until the next nova pulse.
    pub nova_timer: f64,
    /// Seconds until the next meteor strike.
    pub meteor_timer: f64,
    /// Preview-only tower that never fires.
    #[serde(default)]
    pub ghost: bool,
}

impl Tower {
    /// Build a level-1 tower from its blueprint.
    #[must_use]
    pub fn new(id: TowerId, kind: TowerKind, cell: Cell) -> Self {
        let bp = kind.blueprint();
        Self {
            id,
            cell,
            pos: cell.center(),
            kind,
            level: 1,
            tree: Vec::new(),
            range: bp.range,
            fire_rate: bp.fire_rate,
            damage: bp.damage,
            attack: bp.attack,
            status: bp.status,
            mods: TowerMods::default(),
            synergy: 0.0,
            targeting: TargetingMode::First,
            cycle_last: None,
            spent: kind.cost(),
            kills: 0,
            free_tier_picks: 0,
            cooldown: 0.0,
            nova_timer: 0.0,
            meteor_timer: METEOR_PERIOD,
            ghost: false,
        }
    }

    /// Damage per shot after evolution and synergy bonuses.
    #[must_use]
    pub fn effective_damage(&self) -> f64 {
        self.damage * (1.0 + self.mods.damage + self.synergy)
    }
}

/// Seconds between meteor strikes.
pub const METEOR_PERIOD: f64 = 3.8;

/// Per-creep behavior state.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BehaviorState {
    /// Configured behavior.
    pub behavior: Behavior,
    /// Zigzag phase in radians.
    pub phase: f64,
    /// Remaining dash seconds.
    pub dash_remaining: f64,
    /// Seconds until the next dash may start.
    pub dash_cooldown: f64,
}

/// An enemy walking toward the end cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Creep {
    /// Unique id.
    pub id: CreepId,
    /// Archetype.
    pub kind: CreepType,
    /// Wave that spawned it.
    pub wave: u32,
    /// Current hit points.
    pub hp: f64,
    /// Hit points at spawn.
    pub max_hp: f64,
    /// Pixel position.
    pub pos: Vec2,
    /// Cosmetic lateral offset from the path.
    pub lateral: Vec2,
    /// Pixels per second before slows.
    pub speed: f64,
    /// Bounty on kill.
    pub gold: u32,
    /// Waypoints to follow.
    pub path: Vec<Vec2>,
    /// Index of the segment start in `path`.
    pub seg: usize,
    /// Pixels travelled along the current segment.
    pub offset: f64,
    /// Next cell when following the flow field.
    pub flow_target: Option<Cell>,
    /// Active status effects.
    pub status: StatusBag,
    /// Still on the board.
    pub alive: bool,
    /// Tower that dealt the most recent damage.
    pub last_hit_by: Option<TowerId>,
    /// Movement behavior.
    pub behavior: BehaviorState,
}

impl Creep {
    /// Spawn a creep at the first waypoint of `path`.
    #[must_use]
    pub fn new(
        id: CreepId,
        kind: CreepType,
        wave: u32,
        max_hp: f64,
        speed: f64,
        gold: u32,
        behavior: Behavior,
        path: Vec<Vec2>,
    ) -> Self {
        let pos = path.first().copied().unwrap_or_default();
        Self {
            id,
            kind,
            wave,
            hp: max_hp,
            max_hp,
            pos,
            lateral: Vec2::ZERO,
            speed,
            gold,
            path,
            seg: 0,
            offset: 0.0,
            flow_target: None,
            status: StatusBag::default(),
            alive: true,
            last_hit_by: None,
            behavior: BehaviorState {
                behavior,
                ..BehaviorState::default()
            },
        }
    }

    /// Path progress as segment index plus the fraction of the current
    /// segment covered.
    #[must_use]
    pub fn progress(&self) -> f64 {
        let seg_len = match (self.path.get(self.seg), self.path.get(self.seg + 1)) {
            (Some(a), Some(b)) => a.distance(*b),
            _ => 0.0,
        };
        let frac = if seg_len > 0.0 {
            (self.offset / seg_len).min(1.0)
        } else {
            0.0
        };
        self.seg as f64 + frac
    }

    /// Can still be targeted and damaged.
    #[must_use]
    pub fn is_targetable(&self) -> bool {
        self.alive && self.hp > 0.0
    }
}

/// What a bullet does when it lands.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BulletPayload {
    /// Cosmetic tracer for an instant hit.
    Tracer,
    /// Area blast.
    Area {
        /// Blast radius in pixels.
        radius: f64,
    },
}

/// A projectile in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bullet {
    /// Payload resolved on arrival.
    pub payload: BulletPayload,
    /// Pixel position.
    pub pos: Vec2,
    /// Pixels per second.
    pub vel: Vec2,
    /// Seconds until arrival.
    pub ttl: f64,
    /// Total flight time.
    pub flight_time: f64,
    /// Peak cosmetic height of the arc.
    pub apex: f64,
    /// Current cosmetic height.
    pub height: f64,
    /// Tower that fired it.
    pub source: TowerId,
    /// Element of the firing tower.
    pub element: TowerKind,
    /// Damage dealt on arrival.
    pub damage: f64,
    /// Status applied on arrival.
    pub status: Option<StatusKind>,
    /// Modifiers of the firing tower at launch.
    pub mods: TowerMods,
}
