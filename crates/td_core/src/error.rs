//! Error types for the simulation.
//!
//! Only genuinely exceptional conditions live here. A rejected tower
//! placement or an unaffordable upgrade is an ordinary outcome and is
//! reported through [`crate::placement::PlacementError`] or a `bool`.

use thiserror::Error;

use crate::map::MapError;

/// Result type alias using [`GameError`].
pub type Result<T> = std::result::Result<T, GameError>;

/// Top-level error type for the simulation core.
#[derive(Debug, Error)]
pub enum GameError {
    /// A map definition failed validation.
    #[error("Invalid map: {0}")]
    InvalidMap(#[from] MapError),

    /// An event channel name did not match any known channel.
    #[error("Unknown event channel: {0}")]
    UnknownChannel(String),

    /// A tower kind name did not match any known kind.
    #[error("Unknown tower kind: {0}")]
    UnknownTowerKind(String),

    /// Snapshot or replay encoding failed.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Replayed simulation diverged from the recording.
    #[error("Replay diverged at tick {tick}: expected hash {expected}, got {actual}")]
    ReplayMismatch {
        /// Tick at which the comparison was made.
        tick: u64,
        /// Recorded state hash.
        expected: u64,
        /// Hash produced by the replay.
        actual: u64,
    },

    /// Invalid game state.
    #[error("Invalid game state: {0}")]
    InvalidState(String),
}
