//! Build rules, synergy and tower progression.
//!
//! These functions decide *whether* something may happen and apply the
//! tower-local part of it. Gold, path rebuilds and events are handled by
//! [`crate::simulation::Simulation`], which calls in here.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::components::Tower;
use crate::content::TowerKind;
use crate::math::{Cell, TILE};
use crate::pathfinding::PathGrid;
use crate::state::SimulationState;

/// Bonus damage per distinct neighboring element.
pub const SYNERGY_PER_ELEMENT: f64 = 0.08;

/// Neighborhood radius in cells.
const SYNERGY_CELLS: u32 = 2;

/// Why a tower could not be placed.
///
/// Listed in the order the checks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementError {
    /// Cell is off the grid.
    #[error("oob")]
    Oob,
    /// A tower already stands there.
    #[error("occupied")]
    Occupied,
    /// Cell is the spawn.
    #[error("start")]
    Start,
    /// Cell is the exit.
    #[error("end")]
    End,
    /// The map forbids building there.
    #[error("not_buildable")]
    NotBuildable,
    /// The tower would cut the only route.
    #[error("blocks_path")]
    BlocksPath,
    /// A creep is standing in the cell.
    #[error("occupied_by_creep")]
    OccupiedByCreep,
    /// Unknown kind or not allowed on this map.
    #[error("invalid_tower")]
    InvalidTower,
    /// Not enough gold.
    #[error("gold")]
    Gold,
}

impl PlacementError {
    /// Stable reason tag.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Oob => "oob",
            Self::Occupied => "occupied",
            Self::Start => "start",
            Self::End => "end",
            Self::NotBuildable => "not_buildable",
            Self::BlocksPath => "blocks_path",
            Self::OccupiedByCreep => "occupied_by_creep",
            Self::InvalidTower => "invalid_tower",
            Self::Gold => "gold",
        }
    }
}

fn check_site(
    state: &SimulationState,
    grid: &PathGrid,
    cell: Cell,
) -> Result<(), PlacementError> {
    if !grid.in_bounds(cell) {
        return Err(PlacementError::Oob);
    }
    if state.tower_at(cell).is_some() {
        return Err(PlacementError::Occupied);
    }
    if cell == state.map.start {
        return Err(PlacementError::Start);
    }
    if cell == state.map.end {
        return Err(PlacementError::End);
    }
    if !state.map.is_buildable(cell) {
        return Err(PlacementError::NotBuildable);
    }
    if !route_survives(grid, cell) {
        return Err(PlacementError::BlocksPath);
    }
    Ok(())
}

/// Whether start still reaches end with a tower on `cell`.
///
/// Off the cached route the answer is known without a search.
#[must_use]
pub fn route_survives(grid: &PathGrid, cell: Cell) -> bool {
    if grid.has_route() && !grid.on_path(cell) {
        return true;
    }
    grid.reachable_without(cell)
}

/// Whether a tower could be built on `cell`, ignoring kind, gold and creeps.
#[must_use]
pub fn can_place(state: &SimulationState, grid: &PathGrid, cell: Cell) -> bool {
    check_site(state, grid, cell).is_ok()
}

/// Run every placement check in order. Returns the price on success.
pub fn validate_placement(
    state: &SimulationState,
    grid: &PathGrid,
    cell: Cell,
    kind: TowerKind,
) -> Result<u32, PlacementError> {
    check_site(state, grid, cell)?;
    if state
        .creeps
        .iter()
        .any(|c| c.alive && Cell::containing(c.pos) == cell)
    {
        return Err(PlacementError::OccupiedByCreep);
    }
    if !state.map.rules.allows(kind) {
        return Err(PlacementError::InvalidTower);
    }
    let cost = kind.cost();
    if state.gold < cost {
        return Err(PlacementError::Gold);
    }
    Ok(cost)
}

/// Synergy bonus for the tower at `idx`.
///
/// Counts distinct elements among other towers within two cells
/// (Chebyshev) whose centers are at most `2 * TILE + 1` pixels away.
#[must_use]
pub fn synergy_of(towers: &[Tower], idx: usize) -> f64 {
    let Some(me) = towers.get(idx) else {
        return 0.0;
    };
    let reach = 2.0 * TILE + 1.0;
    let mut kinds: Vec<TowerKind> = towers
        .iter()
        .enumerate()
        .filter(|&(i, t)| {
            i != idx
                && t.cell.chebyshev(me.cell) <= SYNERGY_CELLS
                && t.pos.distance_squared(me.pos) <= reach * reach
        })
        .map(|(_, t)| t.kind)
        .collect();
    kinds.sort_unstable();
    kinds.dedup();
    SYNERGY_PER_ELEMENT * kinds.len() as f64
}

/// Recompute synergy for every tower within two cells of `around`,
/// including one standing on it.
pub fn refresh_synergy(towers: &mut [Tower], around: Cell) {
    let affected: Vec<usize> = towers
        .iter()
        .enumerate()
        .filter(|(_, t)| t.cell.chebyshev(around) <= SYNERGY_CELLS)
        .map(|(i, _)| i)
        .collect();
    for i in affected {
        towers[i].synergy = synergy_of(towers, i);
    }
}

/// Gold returned when selling.
#[must_use]
pub fn refund(tower: &Tower) -> u32 {
    (f64::from(tower.spent) * tower.kind.refund_rate()).floor() as u32
}

/// Raise a tower one level after its cost has been paid.
///
/// Grants a free evolution pick for every threshold in `credits` reached
/// and not yet accounted for.
pub fn level_up(tower: &mut Tower, cost: u32, credits: &[u32]) {
    let mult = tower.kind.upgrade_mult();
    tower.level += 1;
    tower.spent += cost;
    tower.damage *= mult.damage;
    tower.fire_rate *= mult.fire_rate;
    tower.range += mult.range;

    let unlocked = credits.iter().filter(|&&lvl| tower.level >= lvl).count() as u32;
    let owned = tower.tree.len() as u32 + tower.free_tier_picks;
    tower.free_tier_picks += unlocked.saturating_sub(owned);
}

/// Take an evolution node from the next tier.
///
/// Needs an unspent pick, a tree for the kind, and a node with this key in
/// the next tier whose requirement has already been chosen.
pub fn evolve(tower: &mut Tower, key: &str) -> bool {
    if tower.free_tier_picks == 0 {
        return false;
    }
    let Some(tree) = tower.kind.evolution_tree() else {
        return false;
    };
    let Some(tier) = tree.get(tower.tree.len()) else {
        return false;
    };
    let Some(node) = tier.iter().find(|n| {
        n.key == key && n.requires.map_or(true, |req| tower.tree.iter().any(|k| k == req))
    }) else {
        return false;
    };
    (node.apply)(tower);
    tower.tree.push(node.key.to_string());
    tower.free_tier_picks -= 1;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::TowerId;
    use crate::config::SimConfig;
    use crate::content::DEFAULT_UNLOCK_TIERS;
    use crate::map::{GridSize, MapDefinition};

    fn session(map: MapDefinition) -> (SimulationState, PathGrid) {
        let grid = PathGrid::new(&map);
        (SimulationState::new(map, &SimConfig::default(), 1), grid)
    }

    fn build(state: &mut SimulationState, grid: &mut PathGrid, kind: TowerKind, cell: Cell) {
        let id = state.alloc_tower_id();
        state.towers.push(Tower::new(id, kind, cell));
        grid.set_tower(cell, true);
        grid.rebuild();
    }

    #[test]
    fn test_rejection_order() {
        let (mut state, mut grid) = session(MapDefinition::default_map());
        build(&mut state, &mut grid, TowerKind::Archer, Cell::new(3, 3));

        let check = |s: &SimulationState, g: &PathGrid, c| validate_placement(s, g, c, TowerKind::Fire);
        assert_eq!(check(&state, &grid, Cell::new(-1, 0)), Err(PlacementError::Oob));
        assert_eq!(check(&state, &grid, Cell::new(24, 0)), Err(PlacementError::Oob));
        assert_eq!(check(&state, &grid, Cell::new(3, 3)), Err(PlacementError::Occupied));
        assert_eq!(check(&state, &grid, Cell::new(0, 8)), Err(PlacementError::Start));
        assert_eq!(check(&state, &grid, Cell::new(23, 8)), Err(PlacementError::End));
        assert_eq!(check(&state, &grid, Cell::new(5, 5)), Ok(90));

        state.gold = 10;
        assert_eq!(check(&state, &grid, Cell::new(5, 5)), Err(PlacementError::Gold));
    }

    #[test]
    fn test_not_buildable_and_disallowed() {
        let mut map = MapDefinition::twist();
        map.rules.allow_elements = Some(vec![TowerKind::Ice]);
        let (state, grid) = session(map);
        assert_eq!(
            validate_placement(&state, &grid, Cell::new(10, 6), TowerKind::Archer),
            Err(PlacementError::NotBuildable)
        );
        assert_eq!(
            validate_placement(&state, &grid, Cell::new(4, 4), TowerKind::Fire),
            Err(PlacementError::InvalidTower)
        );
        assert!(validate_placement(&state, &grid, Cell::new(4, 4), TowerKind::Siege).is_ok());
        assert!(validate_placement(&state, &grid, Cell::new(4, 4), TowerKind::Ice).is_ok());
    }

    #[test]
    fn test_blocks_path() {
        let map = MapDefinition {
            size: GridSize { cols: 8, rows: 3 },
            start: Cell::new(0, 1),
            end: Cell::new(7, 1),
            ..MapDefinition::default_map()
        };
        let (mut state, mut grid) = session(map);
        build(&mut state, &mut grid, TowerKind::Archer, Cell::new(4, 0));
        build(&mut state, &mut grid, TowerKind::Archer, Cell::new(4, 2));
        assert!(!can_place(&state, &grid, Cell::new(4, 1)));
        assert_eq!(
            validate_placement(&state, &grid, Cell::new(4, 1), TowerKind::Archer),
            Err(PlacementError::BlocksPath)
        );
        // Off the route: fast path.
        assert!(can_place(&state, &grid, Cell::new(2, 0)));
    }

    #[test]
    fn test_occupied_by_creep() {
        use crate::components::{Creep, CreepId};
        use crate::content::{Behavior, CreepType};

        let (mut state, grid) = session(MapDefinition::default_map());
        let at = Cell::new(5, 5);
        state.creeps.push(Creep::new(
            CreepId(1),
            CreepType::Grunt,
            1,
            10.0,
            10.0,
            1,
            Behavior::Linear,
            vec![at.center()],
        ));
        assert_eq!(
            validate_placement(&state, &grid, at, TowerKind::Archer),
            Err(PlacementError::OccupiedByCreep)
        );
    }

    #[test]
    fn test_synergy_scope() {
        let mut towers = vec![
            Tower::new(TowerId(1), TowerKind::Fire, Cell::new(5, 5)),
            Tower::new(TowerId(2), TowerKind::Ice, Cell::new(6, 5)),
            Tower::new(TowerId(3), TowerKind::Ice, Cell::new(5, 6)),
            // Diagonal two cells away is beyond 65px.
            Tower::new(TowerId(4), TowerKind::Light, Cell::new(7, 7)),
            Tower::new(TowerId(5), TowerKind::Poison, Cell::new(5, 7)),
        ];
        refresh_synergy(&mut towers, Cell::new(5, 5));
        assert!((towers[0].synergy - 0.16).abs() < 1e-9);
        // Light sees only the poison tower straight below it.
        assert!((towers[3].synergy - 0.08).abs() < 1e-9);
    }

    #[test]
    fn test_refund_rates() {
        let archer = Tower::new(TowerId(1), TowerKind::Archer, Cell::new(0, 0));
        let fire = Tower::new(TowerId(2), TowerKind::Fire, Cell::new(0, 0));
        assert_eq!(refund(&archer), 40);
        assert_eq!(refund(&fire), 67);
    }

    #[test]
    fn test_level_up_grants_picks() {
        let mut t = Tower::new(TowerId(1), TowerKind::Fire, Cell::new(0, 0));
        level_up(&mut t, 140, &DEFAULT_UNLOCK_TIERS);
        assert_eq!(t.level, 2);
        assert_eq!(t.spent, 230);
        assert!((t.damage - 22.0 * 1.18).abs() < 1e-9);
        assert_eq!(t.range, 125.0);
        assert_eq!(t.free_tier_picks, 1);

        level_up(&mut t, 200, &DEFAULT_UNLOCK_TIERS);
        assert_eq!(t.free_tier_picks, 1);
    }

    #[test]
    fn test_evolve_follows_tree() {
        let mut t = Tower::new(TowerId(1), TowerKind::Fire, Cell::new(0, 0));
        assert!(!evolve(&mut t, "INFERNO"));

        t.free_tier_picks = 2;
        assert!(!evolve(&mut t, "WILDFIRE"));
        assert!(evolve(&mut t, "INFERNO"));
        assert!(t.mods.splash);
        assert!(!evolve(&mut t, "IMPACT"));
        assert!(evolve(&mut t, "WILDFIRE"));
        assert_eq!(t.tree, vec!["INFERNO".to_string(), "WILDFIRE".to_string()]);
        assert_eq!(t.free_tier_picks, 0);

        let mut archer = Tower::new(TowerId(2), TowerKind::Archer, Cell::new(0, 0));
        archer.free_tier_picks = 1;
        assert!(!evolve(&mut archer, "INFERNO"));
    }

    #[test]
    fn test_reason_tags() {
        assert_eq!(PlacementError::BlocksPath.as_str(), "blocks_path");
        assert_eq!(PlacementError::OccupiedByCreep.to_string(), "occupied_by_creep");
        assert_eq!(
            serde_json::to_string(&PlacementError::NotBuildable).unwrap(),
            "\"not_buildable\""
        );
    }
}
