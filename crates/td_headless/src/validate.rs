//! Map file validation.

use std::path::Path;

use serde::{Deserialize, Serialize};

use td_core::map::{MapDefinition, MapError, MapInfo};
use td_core::math::Cell;
use td_core::pathfinding::PathGrid;

/// What a valid map looks like to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Map summary.
    pub info: MapInfo,
    /// Whether start can reach end before any tower is built.
    pub has_route: bool,
    /// Cells on the initial shortest route, endpoints included.
    pub route_len: usize,
    /// Cells a tower may ever stand on.
    pub buildable_cells: usize,
}

/// Inspect an already parsed map.
pub fn validate_map(map: &MapDefinition) -> Result<ValidationReport, MapError> {
    map.validate()?;
    let grid = PathGrid::new(map);
    let buildable_cells = (0..map.size.rows)
        .flat_map(|y| (0..map.size.cols).map(move |x| Cell::new(x, y)))
        .filter(|c| map.is_buildable(*c))
        .count();
    Ok(ValidationReport {
        info: map.info(),
        has_route: grid.has_route(),
        route_len: grid.path().len(),
        buildable_cells,
    })
}

/// Load a RON or JSON map file and inspect it.
pub fn validate_map_file<P: AsRef<Path>>(path: P) -> Result<ValidationReport, MapError> {
    let map = MapDefinition::load(path)?;
    validate_map(&map)
}
