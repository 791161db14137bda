//! Damage, status effects and combos on a single creep.
//!
//! Nothing here looks beyond the creep it is given. Towers and projectiles
//! call into this module; the orchestrator ticks statuses once per creep
//! per tick through navigation.
//!
//! # Combos
//!
//! Certain pairs of statuses trigger a one-shot bonus the moment they
//! co-occur. Each combo has a latch bit on the creep: it is set when the
//! combo fires and cleared by [`tick_statuses`] once the pair no longer
//! co-occurs, so a combo fires at most once per co-occurrence episode.

use serde::{Deserialize, Serialize};

use crate::components::{Creep, TowerMods};
use crate::content::{StatusKind, TowerKind};

/// Lowest effective resistance (vulnerability cap).
pub const MIN_RESIST: f64 = -0.5;
/// Highest effective resistance.
pub const MAX_RESIST: f64 = 0.8;

const BURN_DURATION: f64 = 2.2;
const BURN_DPS: f64 = 5.0;
const POISON_DURATION: f64 = 3.5;
const POISON_DPS: f64 = 4.0;
const CHILL_DURATION: f64 = 1.8;
const CHILL_BASE_SLOW: f64 = 0.35;
const CHILL_MAX_SLOW: f64 = 0.85;
const SHOCK_DURATION: f64 = 1.2;
const BRITTLE_DURATION: f64 = 2.5;
const BRITTLE_AMP: f64 = 0.2;
const EXPOSED_DURATION: f64 = 3.0;
const EXPOSED_SHRED: f64 = 0.15;
const MANA_BURN_DURATION: f64 = 3.5;
const MANA_BURN_DPS: f64 = 5.0;

const ACID_DURATION: f64 = 2.0;
const ACID_DPS: f64 = 12.0;
const SHATTER_BURST: f64 = 0.2;
const NEURO_STUN: f64 = 0.5;
const GLASSFIRE_BURST: f64 = 0.15;
const FANNED_MULT: f64 = 1.5;
const OVERLOAD_DURATION: f64 = 1.5;
const OVERLOAD_DPS: f64 = 20.0;

/// Damage over time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dot {
    /// Seconds left.
    pub remaining: f64,
    /// Damage per second.
    pub dps: f64,
}

/// Stacking poison.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoisonStacks {
    /// Seconds left.
    pub remaining: f64,
    /// Damage per second across all stacks.
    pub dps: f64,
    /// Current stack count.
    pub stacks: u32,
}

/// Movement slow.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Slow {
    /// Seconds left.
    pub remaining: f64,
    /// Fraction of speed removed.
    pub fraction: f64,
}

/// Shock marker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Shock {
    /// Seconds left.
    pub remaining: f64,
    /// Strength.
    pub power: f64,
}

/// Timed scalar modifier (brittle amplification, exposed shred).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Modifier {
    /// Seconds left.
    pub remaining: f64,
    /// Magnitude.
    pub amount: f64,
}

/// Two-status combination bonuses, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Combo {
    /// Burn + poison: lingering acid damage.
    Acid,
    /// Chill + shock: burst of current hp.
    Shatter,
    /// Poison + shock: stun.
    Neuro,
    /// Brittle + burn: burst of current hp.
    Glassfire,
    /// Exposed + burn: amplified burn.
    Fanned,
    /// Mana burn + shock: lightning damage over time.
    Overload,
}

impl Combo {
    /// Every combo in evaluation order.
    pub const ALL: [Self; 6] = [
        Self::Acid,
        Self::Shatter,
        Self::Neuro,
        Self::Glassfire,
        Self::Fanned,
        Self::Overload,
    ];

    /// Telemetry tag such as `combo.acid`.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Acid => "combo.acid",
            Self::Shatter => "combo.shatter",
            Self::Neuro => "combo.neuro",
            Self::Glassfire => "combo.glassfire",
            Self::Fanned => "combo.fanned",
            Self::Overload => "combo.overload",
        }
    }

    const fn bit(self) -> u8 {
        1 << (self as u8)
    }

    /// Both statuses of the pair are currently active.
    fn active(self, bag: &StatusBag) -> bool {
        match self {
            Self::Acid => bag.burn.is_some() && bag.poison.is_some(),
            Self::Shatter => bag.chill.is_some() && bag.shock.is_some(),
            Self::Neuro => bag.poison.is_some() && bag.shock.is_some(),
            Self::Glassfire => bag.brittle.is_some() && bag.burn.is_some(),
            Self::Fanned => bag.exposed.is_some() && bag.burn.is_some(),
            Self::Overload => bag.mana_burn.is_some() && bag.shock.is_some(),
        }
    }
}

/// All status effects on one creep.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StatusBag {
    /// Burn.
    pub burn: Option<Dot>,
    /// Poison.
    pub poison: Option<PoisonStacks>,
    /// Chill.
    pub chill: Option<Slow>,
    /// Shock.
    pub shock: Option<Shock>,
    /// Brittle: incoming damage amplification.
    pub brittle: Option<Modifier>,
    /// Exposed: resistance shred.
    pub exposed: Option<Modifier>,
    /// Mana burn.
    pub mana_burn: Option<Dot>,
    /// Acid left by the acid combo.
    pub acid: Option<Dot>,
    /// Lightning left by the overload combo or ionized chains.
    pub lightning: Option<Dot>,
    /// Seconds of stun left.
    pub stun: f64,
    /// Persistent resistance shred from evolved towers.
    pub res_shred: f64,
    /// Combo latch bits, see [`Combo`].
    pub latches: u8,
}

impl StatusBag {
    /// Whether a status kind is active.
    #[must_use]
    pub fn has(&self, kind: StatusKind) -> bool {
        match kind {
            StatusKind::Burn => self.burn.is_some(),
            StatusKind::Poison => self.poison.is_some(),
            StatusKind::Chill => self.chill.is_some(),
            StatusKind::Shock => self.shock.is_some(),
            StatusKind::Brittle => self.brittle.is_some(),
            StatusKind::Exposed => self.exposed.is_some(),
            StatusKind::ManaBurn => self.mana_burn.is_some(),
        }
    }

    /// Current slow fraction, zero if not chilled.
    #[must_use]
    pub fn slow(&self) -> f64 {
        self.chill.map_or(0.0, |c| c.fraction)
    }

    /// Whether the combo latch is set.
    #[must_use]
    pub fn latched(&self, combo: Combo) -> bool {
        self.latches & combo.bit() != 0
    }
}

/// Apply elemental damage and return the amount actually dealt.
///
/// Effective resistance is `base - shred - exposed`, clamped to
/// `[MIN_RESIST, MAX_RESIST]`; an active brittle effect amplifies the
/// result.
pub fn apply_damage(creep: &mut Creep, raw: f64, element: TowerKind, shred: f64) -> f64 {
    let base = creep.kind.profile().resist.get(element);
    let exposed = creep.status.exposed.map_or(0.0, |e| e.amount);
    let resist = (base - shred - exposed).clamp(MIN_RESIST, MAX_RESIST);
    let mut dmg = raw * (1.0 - resist);
    if let Some(brittle) = creep.status.brittle {
        dmg *= 1.0 + brittle.amount;
    }
    creep.hp -= dmg;
    dmg
}

/// Apply a status effect and evaluate combos.
///
/// Returns the combo that fired, if any. At most one combo fires per call.
pub fn apply_status(creep: &mut Creep, kind: StatusKind, mods: &TowerMods) -> Option<Combo> {
    let bag = &mut creep.status;
    match kind {
        StatusKind::Burn => {
            bag.burn = Some(Dot {
                remaining: BURN_DURATION * (1.0 + mods.burn),
                dps: BURN_DPS * (1.0 + mods.burn) * (1.0 + mods.burn_amp),
            });
        }
        StatusKind::Poison => {
            let prev = bag.poison.map_or(0, |p| p.stacks);
            let stacks = (prev + 1).clamp(1, 1 + mods.max_stacks);
            bag.poison = Some(PoisonStacks {
                remaining: POISON_DURATION * (1.0 + mods.poison),
                dps: POISON_DPS * (1.0 + mods.poison) * f64::from(stacks),
                stacks,
            });
        }
        StatusKind::Chill => {
            bag.chill = Some(Slow {
                remaining: CHILL_DURATION * (1.0 + mods.slow_duration),
                fraction: (CHILL_BASE_SLOW + mods.chill).clamp(0.0, CHILL_MAX_SLOW),
            });
            if mods.shatter > 0.0 {
                bag.brittle = Some(Modifier {
                    remaining: BRITTLE_DURATION,
                    amount: mods.shatter,
                });
            }
        }
        StatusKind::Shock => {
            bag.shock = Some(Shock {
                remaining: SHOCK_DURATION,
                power: 1.0,
            });
        }
        StatusKind::Brittle => {
            bag.brittle = Some(Modifier {
                remaining: BRITTLE_DURATION,
                amount: BRITTLE_AMP,
            });
        }
        StatusKind::Exposed => {
            bag.exposed = Some(Modifier {
                remaining: EXPOSED_DURATION,
                amount: EXPOSED_SHRED,
            });
        }
        StatusKind::ManaBurn => {
            bag.mana_burn = Some(Dot {
                remaining: MANA_BURN_DURATION,
                dps: MANA_BURN_DPS,
            });
        }
    }
    if mods.res_shred > 0.0 {
        bag.res_shred = bag.res_shred.max(mods.res_shred);
    }
    trigger_combo(creep, mods)
}

fn trigger_combo(creep: &mut Creep, mods: &TowerMods) -> Option<Combo> {
    let combo = Combo::ALL
        .into_iter()
        .find(|c| c.active(&creep.status) && !creep.status.latched(*c))?;
    creep.status.latches |= combo.bit();

    match combo {
        Combo::Acid => {
            creep.status.acid = Some(Dot {
                remaining: ACID_DURATION,
                dps: ACID_DPS + mods.acid_amp * 60.0,
            });
        }
        Combo::Shatter => creep.hp -= SHATTER_BURST * creep.hp,
        Combo::Neuro => {
            creep.status.stun = creep.status.stun.max(NEURO_STUN + mods.stun);
            creep.hp -= mods.stun_damage;
        }
        Combo::Glassfire => creep.hp -= GLASSFIRE_BURST * creep.hp,
        Combo::Fanned => {
            if let Some(burn) = creep.status.burn.as_mut() {
                burn.dps *= FANNED_MULT;
            }
        }
        Combo::Overload => {
            creep.status.lightning = Some(Dot {
                remaining: OVERLOAD_DURATION,
                dps: OVERLOAD_DPS + mods.light_dot,
            });
        }
    }
    Some(combo)
}

/// Tick a damage-over-time slot. Returns damage dealt.
fn tick_dot(slot: &mut Option<Dot>, hp: &mut f64, dt: f64) -> f64 {
    let Some(dot) = slot.as_mut() else {
        return 0.0;
    };
    let dmg = dot.dps * dt;
    *hp -= dmg;
    dot.remaining -= dt;
    if dot.remaining <= 0.0 {
        *slot = None;
    }
    dmg
}

fn tick_timer<T>(slot: &mut Option<T>, dt: f64, remaining: impl Fn(&mut T) -> &mut f64) {
    if let Some(effect) = slot.as_mut() {
        let r = remaining(effect);
        *r -= dt;
        if *r <= 0.0 {
            *slot = None;
        }
    }
}

/// Advance every status on the creep by `dt`, in a fixed order.
///
/// Returns the total periodic damage dealt.
pub fn tick_statuses(creep: &mut Creep, dt: f64) -> f64 {
    let hp = &mut creep.hp;
    let bag = &mut creep.status;
    let mut dealt = 0.0;

    dealt += tick_dot(&mut bag.burn, hp, dt);
    if let Some(poison) = bag.poison.as_mut() {
        let dmg = poison.dps * dt;
        *hp -= dmg;
        dealt += dmg;
        poison.remaining -= dt;
        if poison.remaining <= 0.0 {
            bag.poison = None;
        }
    }
    tick_timer(&mut bag.chill, dt, |s| &mut s.remaining);
    tick_timer(&mut bag.shock, dt, |s| &mut s.remaining);
    tick_timer(&mut bag.brittle, dt, |s| &mut s.remaining);
    tick_timer(&mut bag.exposed, dt, |s| &mut s.remaining);
    dealt += tick_dot(&mut bag.mana_burn, hp, dt);
    dealt += tick_dot(&mut bag.acid, hp, dt);
    dealt += tick_dot(&mut bag.lightning, hp, dt);

    for combo in Combo::ALL {
        if !combo.active(bag) {
            bag.latches &= !combo.bit();
        }
    }
    dealt
}
