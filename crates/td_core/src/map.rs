//! Map definitions, validation and buildability.
//!
//! Maps are data: they deserialize from RON or JSON (camelCase keys) and are checked
//! by [`MapDefinition::validate`] before the simulation accepts them.
//!
//! # Example
//!
//! ```ron
//! (
//!     id: "twist-24x16",
//!     name: "Twist",
//!     size: (cols: 24, rows: 16),
//!     start: (x: 0, y: 8),
//!     end: (x: 23, y: 8),
//!     blocked: Some([(x: 10, y: 5), (x: 10, y: 6)]),
//!     rules: (speedCaps: [1, 2]),
//! )
//! ```

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::content::{TowerKind, DEFAULT_UNLOCK_TIERS};
use crate::math::Cell;
use crate::waves::SpawnPack;

/// Speed multipliers a map may allow.
pub const ALLOWED_SPEEDS: [u32; 3] = [1, 2, 4];

/// Reasons a map definition is rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MapError {
    /// The map text could not be parsed.
    #[error("map could not be parsed: {0}")]
    Parse(String),

    /// The map file could not be read.
    #[error("map file could not be read: {0}")]
    Io(String),

    /// Both dimensions must exceed 2.
    #[error("map.size too small: {cols}x{rows}")]
    TooSmall {
        /// Columns.
        cols: i32,
        /// Rows.
        rows: i32,
    },

    /// Start cell lies outside the grid.
    #[error("map.start out of bounds: ({}, {})", .0.x, .0.y)]
    StartOutOfBounds(Cell),

    /// End cell lies outside the grid.
    #[error("map.end out of bounds: ({}, {})", .0.x, .0.y)]
    EndOutOfBounds(Cell),

    /// A permanently blocked cell lies outside the grid.
    #[error("map.blocked contains out of bounds cell ({}, {})", .0.x, .0.y)]
    BlockedOutOfBounds(Cell),

    /// Buildable mask has the wrong number of rows.
    #[error("map.buildableMask rows mismatch: expected {expected}, got {actual}")]
    MaskRows {
        /// Rows in the grid.
        expected: usize,
        /// Rows in the mask.
        actual: usize,
    },

    /// A buildable mask row has the wrong number of columns.
    #[error("map.buildableMask cols mismatch in row {row}: expected {expected}, got {actual}")]
    MaskCols {
        /// Offending row.
        row: usize,
        /// Columns in the grid.
        expected: usize,
        /// Columns in the row.
        actual: usize,
    },

    /// Speed caps must be a non-empty subset of {1, 2, 4}.
    #[error("map.rules.speedCaps must be a non-empty subset of [1, 2, 4], got {0:?}")]
    SpeedCaps(Vec<u32>),
}

/// Grid dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSize {
    /// Columns.
    pub cols: i32,
    /// Rows.
    pub rows: i32,
}

/// Per-map gameplay rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MapRules {
    /// Elemental kinds that may be built. Basic towers are always allowed.
    /// `None` allows everything.
    pub allow_elements: Option<Vec<TowerKind>>,
    /// Last wave that may be started; 0 means unlimited.
    pub max_waves: u32,
    /// Whether auto-wave starts enabled.
    pub auto_wave_default: bool,
    /// Allowed game speed multipliers.
    pub speed_caps: Vec<u32>,
    /// Turns evolution trees off.
    pub disable_evolutions: bool,
    /// Levels at which towers earn evolution picks.
    pub upgrade_credits: Vec<u32>,
}

impl Default for MapRules {
    fn default() -> Self {
        Self {
            allow_elements: Some(vec![
                TowerKind::Fire,
                TowerKind::Ice,
                TowerKind::Light,
                TowerKind::Poison,
            ]),
            max_waves: 0,
            auto_wave_default: false,
            speed_caps: ALLOWED_SPEEDS.to_vec(),
            disable_evolutions: false,
            upgrade_credits: DEFAULT_UNLOCK_TIERS.to_vec(),
        }
    }
}

impl MapRules {
    /// Whether the rules permit building `kind`.
    #[must_use]
    pub fn allows(&self, kind: TowerKind) -> bool {
        kind.is_basic()
            || self
                .allow_elements
                .as_ref()
                .map_or(true, |allowed| allowed.contains(&kind))
    }
}

/// Where wave compositions come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaveMode {
    /// Generated from the default table.
    #[default]
    Procedural,
    /// Only the authored list; no waves beyond it.
    Authored,
    /// Authored list first, procedural afterwards.
    Hybrid,
}

/// One hand-authored wave.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthoredWave {
    /// Packs in spawn order.
    pub packs: Vec<SpawnPack>,
}

/// Per-wave scaling rates.
///
/// Each rate accepts either a bare number or the `name(rate)` form used by
/// exported maps, e.g. `"linear(0.07)"`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaveScaling {
    /// Procedural hp growth per wave.
    #[serde(deserialize_with = "scaling_rate")]
    pub hp: f64,
    /// Creep speed growth per wave after wave 3.
    #[serde(deserialize_with = "scaling_rate")]
    pub speed: f64,
    /// Fraction of banked gold paid as interest at wave end.
    #[serde(
        rename = "goldInterest",
        alias = "gold",
        alias = "gold_interest",
        deserialize_with = "scaling_rate"
    )]
    pub gold_interest: f64,
}

impl Default for WaveScaling {
    fn default() -> Self {
        Self {
            hp: 0.07,
            speed: 0.005,
            gold_interest: 0.03,
        }
    }
}

fn scaling_rate<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Rate {
        Number(f64),
        Text(String),
    }

    // Binary encodings (replays) always store the plain number.
    if !deserializer.is_human_readable() {
        return f64::deserialize(deserializer);
    }
    match Rate::deserialize(deserializer)? {
        Rate::Number(n) => Ok(n),
        Rate::Text(text) => parse_rate(&text)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid scaling rate '{text}'"))),
    }
}

/// Parse `name(rate)` or a bare number.
fn parse_rate(text: &str) -> Option<f64> {
    let text = text.trim();
    let inner = match (text.find('('), text.strip_suffix(')')) {
        (Some(open), Some(body)) => &body[open + 1..],
        _ => text,
    };
    inner.trim().parse().ok()
}

/// Wave composition settings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WaveSettings {
    /// Table selection.
    pub mode: WaveMode,
    /// Hand-authored waves.
    pub authored: Option<Vec<AuthoredWave>>,
    /// Scaling rates.
    pub scaling: WaveScaling,
}

/// A complete map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapDefinition {
    /// Stable identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Grid dimensions.
    pub size: GridSize,
    /// Spawn cell.
    pub start: Cell,
    /// Exit cell.
    pub end: Cell,
    /// Permanently blocked cells.
    #[serde(default)]
    pub blocked: Option<Vec<Cell>>,
    /// Per-cell buildable flags, indexed `[row][col]`.
    #[serde(default)]
    pub buildable_mask: Option<Vec<Vec<bool>>>,
    /// Gameplay rules.
    #[serde(default)]
    pub rules: MapRules,
    /// Wave settings.
    #[serde(default)]
    pub waves: WaveSettings,
}

impl Default for MapDefinition {
    fn default() -> Self {
        Self::default_map()
    }
}

impl MapDefinition {
    /// The open 24x16 board.
    #[must_use]
    pub fn default_map() -> Self {
        Self {
            id: "default-24x16".to_string(),
            name: "Default 24x16".to_string(),
            size: GridSize { cols: 24, rows: 16 },
            start: Cell::new(0, 8),
            end: Cell::new(23, 8),
            blocked: Some(Vec::new()),
            buildable_mask: None,
            rules: MapRules::default(),
            waves: WaveSettings::default(),
        }
    }

    /// 24x16 board with a six-cell wall in column 10.
    #[must_use]
    pub fn twist() -> Self {
        Self {
            id: "twist-24x16".to_string(),
            name: "Twist 24x16".to_string(),
            blocked: Some((5..11).map(|y| Cell::new(10, y)).collect()),
            ..Self::default_map()
        }
    }

    /// Look up a built-in map by id.
    #[must_use]
    pub fn builtin(id: &str) -> Option<Self> {
        match id {
            "default" | "default-24x16" => Some(Self::default_map()),
            "twist" | "twist-24x16" => Some(Self::twist()),
            _ => None,
        }
    }

    /// Parse and validate a RON map.
    pub fn from_ron_str(text: &str) -> Result<Self, MapError> {
        let map: Self = ron::from_str(text).map_err(|e| MapError::Parse(e.to_string()))?;
        map.validate()?;
        Ok(map)
    }

    /// Parse and validate a JSON map.
    pub fn from_json_str(text: &str) -> Result<Self, MapError> {
        let map: Self = serde_json::from_str(text).map_err(|e| MapError::Parse(e.to_string()))?;
        map.validate()?;
        Ok(map)
    }

    /// Load a map file, choosing the format by extension (`.json`, else RON).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, MapError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| MapError::Io(format!("{}: {e}", path.display())))?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&text),
            _ => Self::from_ron_str(&text),
        }
    }

    /// Check structural validity.
    pub fn validate(&self) -> Result<(), MapError> {
        let GridSize { cols, rows } = self.size;
        if cols <= 2 || rows <= 2 {
            return Err(MapError::TooSmall { cols, rows });
        }
        if !self.in_bounds(self.start) {
            return Err(MapError::StartOutOfBounds(self.start));
        }
        if !self.in_bounds(self.end) {
            return Err(MapError::EndOutOfBounds(self.end));
        }
        if let Some(cell) = self.blocked_cells().iter().find(|c| !self.in_bounds(**c)) {
            return Err(MapError::BlockedOutOfBounds(*cell));
        }
        if let Some(mask) = &self.buildable_mask {
            let expected_rows = rows as usize;
            if mask.len() != expected_rows {
                return Err(MapError::MaskRows {
                    expected: expected_rows,
                    actual: mask.len(),
                });
            }
            let expected_cols = cols as usize;
            if let Some((row, r)) = mask
                .iter()
                .enumerate()
                .find(|(_, r)| r.len() != expected_cols)
            {
                return Err(MapError::MaskCols {
                    row,
                    expected: expected_cols,
                    actual: r.len(),
                });
            }
        }
        let caps = &self.rules.speed_caps;
        if caps.is_empty() || !caps.iter().all(|v| ALLOWED_SPEEDS.contains(v)) {
            return Err(MapError::SpeedCaps(caps.clone()));
        }
        Ok(())
    }

    /// Whether a cell lies on the grid.
    #[must_use]
    pub fn in_bounds(&self, cell: Cell) -> bool {
        cell.x >= 0 && cell.y >= 0 && cell.x < self.size.cols && cell.y < self.size.rows
    }

    /// Permanently blocked cells, empty if none.
    #[must_use]
    pub fn blocked_cells(&self) -> &[Cell] {
        self.blocked.as_deref().unwrap_or(&[])
    }

    /// Whether a tower may ever stand on this cell.
    ///
    /// Out of bounds, start, end and blocked cells are never buildable;
    /// otherwise the mask decides, defaulting to buildable.
    #[must_use]
    pub fn is_buildable(&self, cell: Cell) -> bool {
        if !self.in_bounds(cell) || cell == self.start || cell == self.end {
            return false;
        }
        if self.blocked_cells().contains(&cell) {
            return false;
        }
        match &self.buildable_mask {
            Some(mask) => mask
                .get(cell.y as usize)
                .and_then(|row| row.get(cell.x as usize))
                .copied()
                .unwrap_or(false),
            None => true,
        }
    }

    /// Read-only summary for UI layers.
    #[must_use]
    pub fn info(&self) -> MapInfo {
        let blocked: BTreeSet<Cell> = self.blocked_cells().iter().copied().collect();
        MapInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            cols: self.size.cols,
            rows: self.size.rows,
            start: self.start,
            end: self.end,
            blocked_count: blocked.len(),
            has_buildable_mask: self.buildable_mask.is_some(),
            rules: self.rules.clone(),
        }
    }
}

/// Read-only map summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapInfo {
    /// Map id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Columns.
    pub cols: i32,
    /// Rows.
    pub rows: i32,
    /// Spawn cell.
    pub start: Cell,
    /// Exit cell.
    pub end: Cell,
    /// Number of distinct blocked cells.
    pub blocked_count: usize,
    /// Whether a buildable mask is present.
    pub has_buildable_mask: bool,
    /// Gameplay rules.
    pub rules: MapRules,
}
