//! # TD Core
//!
//! Deterministic simulation core for an elemental tower-defense game.
//!
//! This crate contains **only** simulation logic:
//! - No rendering
//! - No audio
//! - No input wiring
//! - Seeded randomness only
//!
//! This separation enables:
//! - Headless runs and batch balancing
//! - Replay recording and verification
//! - Determinism testing
//!
//! ## Crate Structure
//!
//! - [`simulation`] - Engine operations and the tick loop
//! - [`state`] - The mutable session aggregate
//! - [`pathfinding`] - A*, distance field and flow field
//! - [`navigation`] - Creep movement
//! - [`targeting`] / [`projectiles`] - Tower fire and bullets
//! - [`combat`] - Damage, status effects and combos
//! - [`waves`] - Wave tables and the spawner
//! - [`placement`] - Build checks, synergy and upgrades
//! - [`events`] - Typed events and the subscriber bus
//! - [`content`] - Tower, creep and evolution data

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod combat;
pub mod components;
pub mod config;
pub mod content;
pub mod error;
pub mod events;
pub mod loot;
pub mod map;
pub mod math;
pub mod navigation;
pub mod particles;
pub mod pathfinding;
pub mod placement;
pub mod projectiles;
pub mod replay;
pub mod rng;
pub mod simulation;
pub mod spatial;
pub mod state;
pub mod stats;
pub mod targeting;
pub mod waves;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::combat::Combo;
    pub use crate::components::*;
    pub use crate::config::{NavigationMode, SimConfig};
    pub use crate::content::{CreepType, StatusKind, TowerKind};
    pub use crate::error::{GameError, Result};
    pub use crate::events::{Channel, GameEvent, SubscriptionId};
    pub use crate::map::{MapDefinition, MapError, MapInfo};
    pub use crate::math::{Cell, Vec2, TILE};
    pub use crate::placement::PlacementError;
    pub use crate::replay::{Action, Replay, TimedAction};
    pub use crate::rng::SimRng;
    pub use crate::simulation::{Simulation, StepReport};
    pub use crate::state::SimulationState;
    pub use crate::stats::StatsSummary;
}
