//! Weighted loot tables.
//!
//! Drops are rolled on the simulation RNG, so they are part of the
//! deterministic outcome of a run.

use serde::{Deserialize, Serialize};

use crate::content::TowerKind;
use crate::rng::SimRng;

/// Identifier of a droppable item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LootId {
    /// Small damage gem.
    GemDmgS,
    /// Small fire-rate ring.
    RingRateS,
    /// Extra chain bounce scroll.
    ScrollChain,
    /// Fire tower core.
    CoreHellfire,
    /// Ice tower core.
    CoreFrostbite,
}

/// What an item does once equipped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LootEffect {
    /// Percent damage bonus.
    DamagePct(f64),
    /// Percent fire-rate bonus.
    FireRatePct(f64),
    /// Extra chain bounces.
    ChainBounce(u32),
    /// Burn damage per second.
    BurnDot(f64),
    /// Percent chill strength.
    ChillPct(f64),
}

/// One table row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LootEntry {
    /// Item.
    pub id: LootId,
    /// Relative weight.
    pub weight: u32,
    /// Item effect.
    pub effect: LootEffect,
    /// Tower kind the item is restricted to, if any.
    pub restrict: Option<TowerKind>,
}

/// Drops for ordinary creeps.
pub static COMMON: &[LootEntry] = &[
    LootEntry {
        id: LootId::GemDmgS,
        weight: 40,
        effect: LootEffect::DamagePct(8.0),
        restrict: None,
    },
    LootEntry {
        id: LootId::RingRateS,
        weight: 40,
        effect: LootEffect::FireRatePct(6.0),
        restrict: None,
    },
    LootEntry {
        id: LootId::ScrollChain,
        weight: 20,
        effect: LootEffect::ChainBounce(1),
        restrict: None,
    },
];

/// Drops for bosses.
pub static BOSS: &[LootEntry] = &[
    LootEntry {
        id: LootId::CoreHellfire,
        weight: 3,
        effect: LootEffect::BurnDot(30.0),
        restrict: Some(TowerKind::Fire),
    },
    LootEntry {
        id: LootId::CoreFrostbite,
        weight: 3,
        effect: LootEffect::ChillPct(10.0),
        restrict: Some(TowerKind::Ice),
    },
];

/// Pick one entry with probability proportional to its weight.
///
/// Draws exactly one number from `rng`. Returns `None` only for an empty
/// table.
pub fn weighted_pick<'a>(table: &'a [LootEntry], rng: &mut SimRng) -> Option<&'a LootEntry> {
    let total: u32 = table.iter().map(|e| e.weight).sum();
    let mut r = rng.next_f64() * f64::from(total);
    for entry in table {
        r -= f64::from(entry.weight);
        if r <= 0.0 {
            return Some(entry);
        }
    }
    table.last()
}
