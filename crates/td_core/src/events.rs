//! Typed game events and the subscriber bus.
//!
//! Systems never call listeners directly. They push [`GameEvent`]s into a
//! buffer owned by the current operation; the simulation drains that buffer
//! into the [`EventBus`] before returning, so listeners always observe a
//! consistent state and cannot re-enter the engine.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::combat::Combo;
use crate::components::{CreepId, TowerId};
use crate::content::{CreepType, TowerKind};
use crate::error::GameError;
use crate::loot::LootId;
use crate::map::MapInfo;
use crate::math::Cell;

/// Subscription channel, one per [`GameEvent`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Channel {
    /// Session reset.
    GameReset,
    /// Lives reached zero.
    GameOver,
    /// A new map was loaded.
    MapChange,
    /// A wave began.
    WaveStart,
    /// A wave was cleared.
    WaveEnd,
    /// Lives changed.
    LifeChange,
    /// Gold changed.
    GoldChange,
    /// A tower was built.
    TowerPlace,
    /// A tower was sold.
    TowerSell,
    /// A tower levelled up.
    TowerLevel,
    /// A tower took an evolution.
    TowerEvo,
    /// A creep entered the board.
    CreepSpawn,
    /// A creep was killed.
    CreepKill,
    /// A creep reached the exit.
    CreepLeak,
    /// A creep took damage from a tower.
    CreepDamage,
    /// A tower fired.
    Shot,
    /// A tower hit something.
    Hit,
    /// Pause toggled.
    PauseChange,
    /// Game speed changed.
    SpeedChange,
    /// Auto-wave settings changed.
    AutoWaveChange,
    /// A status combo fired.
    Combo,
}

impl Channel {
    /// Every channel in declaration order.
    pub const ALL: [Self; 21] = [
        Self::GameReset,
        Self::GameOver,
        Self::MapChange,
        Self::WaveStart,
        Self::WaveEnd,
        Self::LifeChange,
        Self::GoldChange,
        Self::TowerPlace,
        Self::TowerSell,
        Self::TowerLevel,
        Self::TowerEvo,
        Self::CreepSpawn,
        Self::CreepKill,
        Self::CreepLeak,
        Self::CreepDamage,
        Self::Shot,
        Self::Hit,
        Self::PauseChange,
        Self::SpeedChange,
        Self::AutoWaveChange,
        Self::Combo,
    ];

    /// Hook name as used by UI layers, e.g. `"creepKill"`.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::GameReset => "gameReset",
            Self::GameOver => "gameOver",
            Self::MapChange => "mapChange",
            Self::WaveStart => "waveStart",
            Self::WaveEnd => "waveEnd",
            Self::LifeChange => "lifeChange",
            Self::GoldChange => "goldChange",
            Self::TowerPlace => "towerPlace",
            Self::TowerSell => "towerSell",
            Self::TowerLevel => "towerLevel",
            Self::TowerEvo => "towerEvo",
            Self::CreepSpawn => "creepSpawn",
            Self::CreepKill => "creepKill",
            Self::CreepLeak => "creepLeak",
            Self::CreepDamage => "creepDamage",
            Self::Shot => "shot",
            Self::Hit => "hit",
            Self::PauseChange => "pauseChange",
            Self::SpeedChange => "speedChange",
            Self::AutoWaveChange => "autoWaveChange",
            Self::Combo => "combo",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Channel {
    type Err = GameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| GameError::UnknownChannel(s.to_string()))
    }
}

/// Why gold or lives changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeReason {
    /// Session reset broadcast.
    Reset,
    /// Tower purchase.
    PlaceTower,
    /// Tower refund.
    SellTower,
    /// Upgrade purchase.
    LevelUp,
    /// Creep bounty.
    Kill,
    /// End-of-wave reward.
    WaveReward,
    /// Creep reached the exit.
    Leak,
}

/// End-of-game summary carried by [`GameEvent::GameOver`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameOverSummary {
    /// Wave reached.
    pub wave: u32,
    /// Gold left.
    pub gold: u32,
    /// Lives left.
    pub lives: u32,
    /// Final score.
    pub score: u64,
    /// Current kill streak.
    pub spree: u32,
    /// Waves fully cleared.
    pub waves_cleared: u32,
    /// Creeps that reached the exit.
    pub leaks: u32,
    /// Combos triggered.
    pub combos: u32,
    /// Hit percentage, rounded.
    pub accuracy: u32,
    /// Tower with the most kills.
    pub top_tower: Option<TowerId>,
    /// Kills of that tower.
    pub top_tower_kills: u32,
}

/// Something observable that happened inside the simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GameEvent {
    /// Session reset.
    GameReset {
        /// Seed of the new session.
        seed: u32,
    },
    /// Lives reached zero.
    GameOver(GameOverSummary),
    /// A new map was loaded.
    MapChange(MapInfo),
    /// A wave began.
    WaveStart {
        /// Wave number.
        wave: u32,
    },
    /// A wave was cleared.
    WaveEnd {
        /// Wave number.
        wave: u32,
        /// Gold awarded.
        reward: u32,
    },
    /// Lives changed.
    LifeChange {
        /// Lives after the change.
        lives: u32,
        /// Signed change.
        delta: i32,
        /// Cause.
        reason: ChangeReason,
    },
    /// Gold changed.
    GoldChange {
        /// Gold after the change.
        gold: u32,
        /// Signed change.
        delta: i64,
        /// Cause.
        reason: ChangeReason,
    },
    /// A tower was built.
    TowerPlace {
        /// New tower.
        tower: TowerId,
        /// Its kind.
        kind: TowerKind,
        /// Gold paid.
        cost: u32,
        /// Cell built on.
        cell: Cell,
    },
    /// A tower was sold.
    TowerSell {
        /// Sold tower.
        tower: TowerId,
        /// Gold refunded.
        refund: u32,
    },
    /// A tower levelled up.
    TowerLevel {
        /// Upgraded tower.
        tower: TowerId,
        /// Previous level.
        from: u32,
        /// New level.
        to: u32,
        /// Gold paid.
        cost: u32,
    },
    /// A tower took an evolution.
    TowerEvo {
        /// Evolved tower.
        tower: TowerId,
        /// Node key.
        key: String,
    },
    /// A creep entered the board.
    CreepSpawn {
        /// New creep.
        creep: CreepId,
        /// Its type.
        kind: CreepType,
    },
    /// A creep was killed.
    CreepKill {
        /// Dead creep.
        creep: CreepId,
        /// Its type.
        kind: CreepType,
        /// Bounty paid.
        gold: u32,
        /// Tower credited with the kill.
        tower: Option<TowerId>,
        /// Loot dropped.
        loot: Option<LootId>,
    },
    /// A creep reached the exit.
    CreepLeak {
        /// Leaked creep.
        creep: CreepId,
        /// Its type.
        kind: CreepType,
    },
    /// A creep took direct or blast damage.
    CreepDamage {
        /// Damaged creep.
        creep: CreepId,
        /// Its type.
        kind: CreepType,
        /// Damage dealt after resistances.
        amount: f64,
        /// Element of the damage.
        element: TowerKind,
        /// Source tower.
        tower: TowerId,
    },
    /// A tower fired.
    Shot {
        /// Firing tower.
        tower: TowerId,
    },
    /// A tower hit something.
    Hit {
        /// Tower credited.
        tower: TowerId,
    },
    /// Pause toggled.
    PauseChange {
        /// New state.
        paused: bool,
    },
    /// Game speed changed.
    SpeedChange {
        /// New multiplier.
        speed: u32,
    },
    /// Auto-wave settings changed.
    AutoWaveChange {
        /// Whether waves start automatically.
        enabled: bool,
        /// Delay before each automatic wave.
        delay_ms: u32,
    },
    /// A status combo fired on a creep.
    Combo {
        /// Affected creep.
        creep: CreepId,
        /// Combo that fired.
        combo: Combo,
        /// Tower whose status completed the pair.
        tower: TowerId,
    },
}

impl GameEvent {
    /// Channel this event is published on.
    #[must_use]
    pub const fn channel(&self) -> Channel {
        match self {
            Self::GameReset { .. } => Channel::GameReset,
            Self::GameOver(_) => Channel::GameOver,
            Self::MapChange(_) => Channel::MapChange,
            Self::WaveStart { .. } => Channel::WaveStart,
            Self::WaveEnd { .. } => Channel::WaveEnd,
            Self::LifeChange { .. } => Channel::LifeChange,
            Self::GoldChange { .. } => Channel::GoldChange,
            Self::TowerPlace { .. } => Channel::TowerPlace,
            Self::TowerSell { .. } => Channel::TowerSell,
            Self::TowerLevel { .. } => Channel::TowerLevel,
            Self::TowerEvo { .. } => Channel::TowerEvo,
            Self::CreepSpawn { .. } => Channel::CreepSpawn,
            Self::CreepKill { .. } => Channel::CreepKill,
            Self::CreepLeak { .. } => Channel::CreepLeak,
            Self::CreepDamage { .. } => Channel::CreepDamage,
            Self::Shot { .. } => Channel::Shot,
            Self::Hit { .. } => Channel::Hit,
            Self::PauseChange { .. } => Channel::PauseChange,
            Self::SpeedChange { .. } => Channel::SpeedChange,
            Self::AutoWaveChange { .. } => Channel::AutoWaveChange,
            Self::Combo { .. } => Channel::Combo,
        }
    }
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Boxed event listener.
pub type Listener = Box<dyn FnMut(&GameEvent)>;

/// Per-channel listener registry.
#[derive(Default)]
pub struct EventBus {
    next_id: u64,
    listeners: BTreeMap<Channel, Vec<(SubscriptionId, Listener)>>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: BTreeMap<Channel, usize> = self
            .listeners
            .iter()
            .map(|(channel, list)| (*channel, list.len()))
            .collect();
        f.debug_struct("EventBus")
            .field("next_id", &self.next_id)
            .field("listeners", &counts)
            .finish()
    }
}

impl EventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener on a channel.
    pub fn subscribe<F>(&mut self, channel: Channel, listener: F) -> SubscriptionId
    where
        F: FnMut(&GameEvent) + 'static,
    {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.listeners
            .entry(channel)
            .or_default()
            .push((id, Box::new(listener)));
        id
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        for list in self.listeners.values_mut() {
            if let Some(pos) = list.iter().position(|(sid, _)| *sid == id) {
                drop(list.remove(pos));
                return true;
            }
        }
        false
    }

    /// Number of listeners on a channel.
    #[must_use]
    pub fn listener_count(&self, channel: Channel) -> usize {
        self.listeners.get(&channel).map_or(0, Vec::len)
    }

    /// Deliver an event to every listener on its channel, in subscription
    /// order. A panicking listener is logged and skipped.
    pub fn publish(&mut self, event: &GameEvent) {
        let channel = event.channel();
        let Some(list) = self.listeners.get_mut(&channel) else {
            return;
        };
        for (id, listener) in list.iter_mut() {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                warn!(channel = %channel, subscription = id.0, "Event listener panicked");
            }
        }
    }
}
