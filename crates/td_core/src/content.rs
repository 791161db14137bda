//! Built-in game content: tower kinds, creep profiles and evolution trees.
//!
//! Everything here is static data with `const fn` lookups so that balance
//! numbers live in one place and are cheap to query from hot paths.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::components::Tower;
use crate::error::GameError;

/// Tower element kind.
///
/// `Archer` and `Siege` are the basic towers; the rest are elemental and
/// carry a status effect.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TowerKind {
    /// Cheap single-target bolt tower.
    Archer,
    /// Heavy lobbed shells with a wide blast. Accepts the legacy name `CANNON`.
    #[serde(alias = "CANNON")]
    Siege,
    /// Splash fire, applies burn.
    #[default]
    Fire,
    /// Bolt, applies chill.
    Ice,
    /// Chain lightning, applies shock.
    Light,
    /// Bolt, applies stacking poison.
    Poison,
    /// Splash, applies brittle.
    Earth,
    /// Long-range bolt, applies exposed.
    Wind,
    /// Bolt, applies mana burn.
    Arcane,
}

impl TowerKind {
    /// Every tower kind in declaration order.
    pub const ALL: [Self; 9] = [
        Self::Archer,
        Self::Siege,
        Self::Fire,
        Self::Ice,
        Self::Light,
        Self::Poison,
        Self::Earth,
        Self::Wind,
        Self::Arcane,
    ];

    /// Canonical upper-case name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Archer => "ARCHER",
            Self::Siege => "SIEGE",
            Self::Fire => "FIRE",
            Self::Ice => "ICE",
            Self::Light => "LIGHT",
            Self::Poison => "POISON",
            Self::Earth => "EARTH",
            Self::Wind => "WIND",
            Self::Arcane => "ARCANE",
        }
    }

    /// Basic (non-elemental) towers get cheaper upgrades and a better refund.
    #[must_use]
    pub const fn is_basic(self) -> bool {
        matches!(self, Self::Archer | Self::Siege)
    }

    /// Purchase price.
    #[must_use]
    pub const fn cost(self) -> u32 {
        match self {
            Self::Archer => 50,
            Self::Siege => 65,
            Self::Fire | Self::Ice => 90,
            Self::Light => 110,
            Self::Poison => 95,
            Self::Earth | Self::Wind => 100,
            Self::Arcane => 120,
        }
    }

    /// Base stats for a freshly built tower.
    #[must_use]
    pub const fn blueprint(self) -> Blueprint {
        let (range, fire_rate, damage, attack, status) = match self {
            Self::Archer => (110.0, 1.1, 9.0, AttackKind::Direct, None),
            Self::Siege => (120.0, 0.75, 16.0, AttackKind::Siege, None),
            Self::Fire => (120.0, 0.8, 22.0, AttackKind::Splash, Some(StatusKind::Burn)),
            Self::Ice => (130.0, 0.95, 12.0, AttackKind::Direct, Some(StatusKind::Chill)),
            Self::Light => (140.0, 0.7, 18.0, AttackKind::Chain, Some(StatusKind::Shock)),
            Self::Poison => (120.0, 1.0, 8.0, AttackKind::Direct, Some(StatusKind::Poison)),
            Self::Earth => (135.0, 0.9, 22.0, AttackKind::Splash, Some(StatusKind::Brittle)),
            Self::Wind => (160.0, 0.65, 16.0, AttackKind::Direct, Some(StatusKind::Exposed)),
            Self::Arcane => (145.0, 0.75, 18.0, AttackKind::Direct, Some(StatusKind::ManaBurn)),
        };
        Blueprint {
            range,
            fire_rate,
            damage,
            attack,
            status,
        }
    }

    /// Gold needed to go from `level` to `level + 1`.
    #[must_use]
    pub const fn upgrade_cost(self, level: u32) -> u32 {
        if self.is_basic() {
            40 + level * 30
        } else {
            80 + level * 60
        }
    }

    /// Per-level stat growth.
    #[must_use]
    pub const fn upgrade_mult(self) -> UpgradeMult {
        if self.is_basic() {
            UpgradeMult {
                damage: 1.12,
                fire_rate: 1.04,
                range: 4.0,
            }
        } else {
            UpgradeMult {
                damage: 1.18,
                fire_rate: 1.06,
                range: 5.0,
            }
        }
    }

    /// Fraction of spent gold returned on sale.
    #[must_use]
    pub const fn refund_rate(self) -> f64 {
        if self.is_basic() {
            0.8
        } else {
            0.75
        }
    }

    /// Display color as `0xRRGGBB`, used for cosmetic records only.
    #[must_use]
    pub const fn color(self) -> u32 {
        match self {
            Self::Archer => 0x9c_a3_af,
            Self::Siege => 0xf5_9e_0b,
            Self::Fire => 0xef_44_44,
            Self::Ice => 0x38_bd_f8,
            Self::Light => 0xa7_8b_fa,
            Self::Poison => 0x22_c5_5e,
            Self::Earth => 0xa3_a3_a3,
            Self::Wind => 0x60_a5_fa,
            Self::Arcane => 0xbe_12_3c,
        }
    }

    /// Evolution tree for this kind, if it has one.
    #[must_use]
    pub fn evolution_tree(self) -> Option<&'static [&'static [EvolutionNode]]> {
        match self {
            Self::Fire => Some(FIRE_TREE),
            Self::Ice => Some(ICE_TREE),
            Self::Light => Some(LIGHT_TREE),
            Self::Poison => Some(POISON_TREE),
            _ => None,
        }
    }
}

impl fmt::Display for TowerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TowerKind {
    type Err = GameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        if upper == "CANNON" {
            return Ok(Self::Siege);
        }
        Self::ALL
            .into_iter()
            .find(|k| k.name() == upper)
            .ok_or_else(|| GameError::UnknownTowerKind(s.to_string()))
    }
}

/// How a tower delivers damage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackKind {
    /// Instant hit-scan bolt with an accuracy roll.
    Direct,
    /// Direct hit that then bounces between nearby creeps.
    Chain,
    /// Traveling projectile that explodes on arrival.
    Splash,
    /// Slow lobbed shell with a wide blast.
    Siege,
}

/// Status effect kinds, in the fixed order they are ticked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusKind {
    /// Fire damage over time.
    Burn,
    /// Stacking damage over time.
    Poison,
    /// Movement slow.
    Chill,
    /// Primes shatter, neuro and overload combos.
    Shock,
    /// Amplifies all incoming damage.
    Brittle,
    /// Shreds resistances.
    Exposed,
    /// Arcane damage over time.
    ManaBurn,
}

/// Base tower stats.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Blueprint {
    /// Targeting radius in pixels.
    pub range: f64,
    /// Shots per second.
    pub fire_rate: f64,
    /// Damage per shot.
    pub damage: f64,
    /// Delivery mechanism.
    pub attack: AttackKind,
    /// Status applied on hit.
    pub status: Option<StatusKind>,
}

/// Stat growth applied on each level-up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpgradeMult {
    /// Damage multiplier.
    pub damage: f64,
    /// Fire-rate multiplier.
    pub fire_rate: f64,
    /// Flat range bonus in pixels.
    pub range: f64,
}

/// Levels at which a tower earns a free evolution pick.
pub const DEFAULT_UNLOCK_TIERS: [u32; 3] = [2, 4, 6];

/// Enemy archetype.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub enum CreepType {
    /// Baseline creep.
    #[default]
    Grunt,
    /// Fast and fragile.
    Runner,
    /// Slow, durable, uniformly resistant.
    Tank,
    /// Resists most elements.
    Shield,
    /// Every tenth wave.
    Boss,
}

impl CreepType {
    /// Every creep type in declaration order.
    pub const ALL: [Self; 5] = [
        Self::Grunt,
        Self::Runner,
        Self::Tank,
        Self::Shield,
        Self::Boss,
    ];

    /// Base profile for this type.
    #[must_use]
    pub const fn profile(self) -> CreepProfile {
        match self {
            Self::Grunt => CreepProfile {
                hp: 95.0,
                speed: 40.0,
                gold: 8,
                resist: Resistances {
                    fire: 0.1,
                    ..Resistances::NONE
                },
                behavior: Behavior::Linear,
            },
            Self::Runner => CreepProfile {
                hp: 70.0,
                speed: 70.0,
                gold: 7,
                resist: Resistances {
                    ice: 0.1,
                    ..Resistances::NONE
                },
                behavior: Behavior::DASH,
            },
            Self::Tank => CreepProfile {
                hp: 230.0,
                speed: 28.0,
                gold: 16,
                resist: Resistances::uniform(0.15),
                behavior: Behavior::Linear,
            },
            Self::Shield => CreepProfile {
                hp: 120.0,
                speed: 42.0,
                gold: 10,
                resist: Resistances {
                    fire: 0.25,
                    ice: 0.1,
                    light: 0.25,
                    poison: 0.0,
                    earth: 0.2,
                    wind: 0.2,
                    arcane: 0.0,
                },
                behavior: Behavior::Linear,
            },
            Self::Boss => CreepProfile {
                hp: 1400.0,
                speed: 36.0,
                gold: 90,
                resist: Resistances::uniform(0.2),
                behavior: Behavior::Linear,
            },
        }
    }
}

/// Per-type base stats.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CreepProfile {
    /// Hit points before wave scaling.
    pub hp: f64,
    /// Pixels per second before wave scaling.
    pub speed: f64,
    /// Bounty on kill.
    pub gold: u32,
    /// Elemental resistances.
    pub resist: Resistances,
    /// Movement behavior.
    pub behavior: Behavior,
}

/// Base resistance per element, as a damage fraction removed.
///
/// Basic tower damage (archer, siege) is never resisted.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Resistances {
    /// Fire resistance.
    pub fire: f64,
    /// Ice resistance.
    pub ice: f64,
    /// Lightning resistance.
    pub light: f64,
    /// Poison resistance.
    pub poison: f64,
    /// Earth resistance.
    pub earth: f64,
    /// Wind resistance.
    pub wind: f64,
    /// Arcane resistance.
    pub arcane: f64,
}

impl Resistances {
    /// No resistance to anything.
    pub const NONE: Self = Self::uniform(0.0);

    /// Same resistance to every element.
    #[must_use]
    pub const fn uniform(r: f64) -> Self {
        Self {
            fire: r,
            ice: r,
            light: r,
            poison: r,
            earth: r,
            wind: r,
            arcane: r,
        }
    }

    /// Base resistance against damage of the given element.
    #[must_use]
    pub const fn get(&self, kind: TowerKind) -> f64 {
        match kind {
            TowerKind::Archer | TowerKind::Siege => 0.0,
            TowerKind::Fire => self.fire,
            TowerKind::Ice => self.ice,
            TowerKind::Light => self.light,
            TowerKind::Poison => self.poison,
            TowerKind::Earth => self.earth,
            TowerKind::Wind => self.wind,
            TowerKind::Arcane => self.arcane,
        }
    }
}

/// Pluggable creep movement behavior.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum Behavior {
    /// Straight along the path.
    #[default]
    Linear,
    /// Cosmetic sine wave perpendicular to the path.
    Zigzag {
        /// Amplitude in pixels.
        amp: f64,
        /// Oscillations per second.
        freq: f64,
    },
    /// Periodic speed bursts.
    Dash {
        /// Speed multiplier while dashing.
        speed: f64,
        /// Dash length in seconds.
        duration: f64,
        /// Seconds between dash starts.
        cooldown: f64,
    },
    /// Splits into weaker children on death.
    Split {
        /// Number of children.
        count: u32,
        /// Child max hp as a fraction of the parent's.
        hp_scale: f64,
    },
}

impl Behavior {
    /// Default zigzag parameters.
    pub const ZIGZAG: Self = Self::Zigzag { amp: 8.0, freq: 3.0 };
    /// Default dash parameters.
    pub const DASH: Self = Self::Dash {
        speed: 2.2,
        duration: 0.4,
        cooldown: 4.0,
    };
    /// Default split parameters.
    pub const SPLIT: Self = Self::Split {
        count: 2,
        hp_scale: 0.45,
    };
}

/// One selectable node in an evolution tree.
#[derive(Clone, Copy)]
pub struct EvolutionNode {
    /// Stable key used by [`crate::simulation::Simulation::apply_evolution`].
    pub key: &'static str,
    /// Display name.
    pub name: &'static str,
    /// Node that must already be chosen, if any.
    pub requires: Option<&'static str>,
    /// Effect on the tower.
    pub apply: fn(&mut Tower),
}

impl fmt::Debug for EvolutionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvolutionNode")
            .field("key", &self.key)
            .field("name", &self.name)
            .field("requires", &self.requires)
            .finish_non_exhaustive()
    }
}

impl EvolutionNode {
    const fn root(key: &'static str, name: &'static str, apply: fn(&mut Tower)) -> Self {
        Self {
            key,
            name,
            requires: None,
            apply,
        }
    }

    const fn after(
        key: &'static str,
        name: &'static str,
        requires: &'static str,
        apply: fn(&mut Tower),
    ) -> Self {
        Self {
            key,
            name,
            requires: Some(requires),
            apply,
        }
    }
}

static FIRE_TREE: &[&[EvolutionNode]] = &[
    &[
        EvolutionNode::root("INFERNO", "Inferno", |t| {
            t.mods.burn += 0.6;
            t.mods.splash = true;
        }),
        EvolutionNode::root("BLAST", "Blast", |t| {
            t.mods.damage += 0.35;
            t.mods.aoe += 24.0;
        }),
    ],
    &[
        EvolutionNode::after("WILDFIRE", "Wildfire", "INFERNO", |t| t.mods.burn_spread = true),
        EvolutionNode::after("SEARING", "Searing Heat", "INFERNO", |t| t.mods.burn_amp = 0.08),
        EvolutionNode::after("IMPACT", "High Impact", "BLAST", |t| {
            t.mods.splash = true;
            t.mods.aoe += 26.0;
        }),
        EvolutionNode::after("THERMAL", "Thermal Lance", "BLAST", |t| {
            t.attack = AttackKind::Direct;
            t.mods.pierce = 2;
            t.fire_rate *= 0.8;
            t.range += 10.0;
        }),
    ],
    &[
        EvolutionNode::after("CATACLYSM", "Cataclysm", "WILDFIRE", |t| {
            t.mods.cataclysm = true;
        }),
        EvolutionNode::after("HELLFIRE", "Hellfire", "SEARING", |t| {
            t.mods.burn += 0.9;
            t.fire_rate *= 0.85;
        }),
        EvolutionNode::after("STARFALL", "Starfall", "IMPACT", |t| t.mods.meteors = true),
    ],
];

static ICE_TREE: &[&[EvolutionNode]] = &[
    &[
        EvolutionNode::root("GLACIER", "Glacier", |t| {
            t.mods.chill += 0.25;
            t.mods.slow_duration += 0.8;
        }),
        EvolutionNode::root("NOVA", "Frost Nova", |t| t.mods.nova = true),
    ],
    &[
        EvolutionNode::after("ARCTIC", "Arctic Grip", "GLACIER", |t| t.mods.res_shred += 0.06),
        EvolutionNode::after("SHATTER", "Brittle", "GLACIER", |t| t.mods.shatter = 0.18),
        EvolutionNode::after("BLIZZ", "Blizzard", "NOVA", |t| t.mods.nova_frequency = 0.75),
        EvolutionNode::after("CRYO", "Cryo Core", "NOVA", |t| t.mods.chill += 0.15),
    ],
    &[
        EvolutionNode::after("ABSOLUTE", "Absolute Zero", "ARCTIC", |t| t.mods.chill += 0.25),
        EvolutionNode::after("WHITEOUT", "Whiteout", "BLIZZ", |t| t.range += 20.0),
    ],
];

static LIGHT_TREE: &[&[EvolutionNode]] = &[
    &[
        EvolutionNode::root("CHAIN", "Chain", |t| {
            t.mods.chain_bounce += 2;
            t.mods.chain_range += 40.0;
        }),
        EvolutionNode::root("OVERLOAD", "Overload", |t| {
            t.mods.stun += 0.15;
            t.mods.damage += 0.2;
        }),
    ],
    &[
        EvolutionNode::after("SUPERCELL", "Supercell", "CHAIN", |t| t.mods.chain_bounce += 2),
        EvolutionNode::after("IONIZE", "Ionize", "CHAIN", |t| t.mods.light_dot = 5.0),
        EvolutionNode::after("BLACKOUT", "Blackout", "OVERLOAD", |t| t.mods.stun_chain = true),
    ],
    &[
        EvolutionNode::after("TEMPEST", "Tempest", "SUPERCELL", |t| t.mods.chain_bounce += 3),
        EvolutionNode::after("SINGULAR", "Singularity", "IONIZE", |t| {
            t.mods.singularity = true;
        }),
    ],
];

static POISON_TREE: &[&[EvolutionNode]] = &[
    &[
        EvolutionNode::root("VENOM", "Venom", |t| {
            t.mods.poison += 0.6;
            t.mods.max_stacks += 2;
        }),
        EvolutionNode::root("NEURO", "Neurotoxin", |t| t.mods.res_shred += 0.08),
    ],
    &[
        EvolutionNode::after("BLIGHT", "Blight", "VENOM", |t| t.mods.poison_spread = true),
        EvolutionNode::after("ACID", "Acid Mix", "VENOM", |t| t.mods.acid_amp = 0.12),
        EvolutionNode::after("NEUROSHOCK", "Neuroshock+", "NEURO", |t| t.mods.stun += 0.1),
    ],
    &[
        EvolutionNode::after("PLAGUE", "Plague Lord", "BLIGHT", |t| {
            t.mods.max_stacks += 2;
            t.mods.poison += 0.6;
        }),
        EvolutionNode::after("SYNAPSE", "Synaptic Overload", "NEUROSHOCK", |t| {
            t.mods.stun_damage = 14.0;
        }),
    ],
];
