//! Simulation tuning that is not part of a map.

use serde::{Deserialize, Serialize};

use crate::content::TowerKind;
use crate::error::{GameError, Result};

/// How creeps choose where to walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NavigationMode {
    /// Follow a per-creep waypoint list.
    #[default]
    Waypoints,
    /// Follow the shared flow field cell by cell.
    FlowField,
}

/// Engine configuration.
///
/// Missing fields fall back to their defaults, so a RON file only needs to
/// name what it changes:
///
/// ```ron
/// (starting_gold: 400, navigation: FlowField)
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Gold at the start of a session.
    pub starting_gold: u32,
    /// Lives at the start of a session.
    pub starting_lives: u32,
    /// Seconds per simulation step.
    pub fixed_step: f64,
    /// Maximum steps taken by one `update` call.
    pub max_substeps: u32,
    /// Delay before an automatic wave starts, in milliseconds.
    pub auto_wave_delay_ms: u32,
    /// Creep navigation strategy.
    pub navigation: NavigationMode,
    /// Tower kind selected for building at start.
    pub default_build: TowerKind,
    /// Fixed seed; `None` draws one from entropy.
    pub seed: Option<u32>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            starting_gold: 250,
            starting_lives: 20,
            fixed_step: 1.0 / 60.0,
            max_substeps: 8,
            auto_wave_delay_ms: 1200,
            navigation: NavigationMode::Waypoints,
            default_build: TowerKind::Fire,
            seed: None,
        }
    }
}

impl SimConfig {
    /// Parse a RON configuration.
    pub fn from_ron_str(text: &str) -> Result<Self> {
        let config: Self =
            ron::from_str(text).map_err(|e| GameError::Serialization(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject step settings the accumulator cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !self.fixed_step.is_finite() || self.fixed_step <= 0.0 || self.max_substeps == 0 {
            return Err(GameError::InvalidState(format!(
                "fixed_step must be positive and max_substeps non-zero, got {} and {}",
                self.fixed_step, self.max_substeps
            )));
        }
        Ok(())
    }

    /// Same configuration with a fixed seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u32) -> Self {
        self.seed = Some(seed);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SimConfig::default();
        assert_eq!(config.starting_gold, 250);
        assert_eq!(config.starting_lives, 20);
        assert_eq!(config.max_substeps, 8);
        assert_eq!(config.navigation, NavigationMode::Waypoints);
    }

    #[test]
    fn test_partial_ron() {
        let config = SimConfig::from_ron_str("(starting_gold: 400, navigation: FlowField)").unwrap();
        assert_eq!(config.starting_gold, 400);
        assert_eq!(config.navigation, NavigationMode::FlowField);
        assert_eq!(config.starting_lives, 20);
        assert_eq!(config.seed, None);
    }

    #[test]
    fn test_seed_and_build_kind() {
        let config = SimConfig::from_ron_str("(seed: Some(42), default_build: ICE)").unwrap();
        assert_eq!(config.seed, Some(42));
        assert_eq!(config.default_build, TowerKind::Ice);
    }

    #[test]
    fn test_rejects_bad_step() {
        assert!(SimConfig::from_ron_str("(fixed_step: 0.0)").is_err());
        assert!(SimConfig::from_ron_str("(max_substeps: 0)").is_err());
    }

    #[test]
    fn test_validate_config_built_in_code() {
        assert!(SimConfig::default().validate().is_ok());
        for fixed_step in [0.0, -1.0 / 60.0, f64::NAN, f64::INFINITY] {
            let config = SimConfig {
                fixed_step,
                ..SimConfig::default()
            };
            assert!(
                matches!(config.validate(), Err(GameError::InvalidState(_))),
                "{fixed_step}"
            );
        }
    }
}
