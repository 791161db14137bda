//! Grid pathfinding: A* routes and a breadth-first distance field.
//!
//! Movement is 4-directional with unit cost. Neighbors are always expanded
//! in the fixed order +x, -x, +y, -y and heap ties are broken on the
//! heuristic and then the cell index, so identical grids always produce
//! identical routes.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::map::MapDefinition;
use crate::math::{Cell, Vec2};

/// Neighbor offsets in expansion order: east, west, south, north.
pub const DIRECTIONS: [(i32, i32); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];

/// Distance value for cells that cannot reach the end.
pub const UNREACHABLE: u32 = u32::MAX;

/// A node in the A* open set priority queue.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
struct AStarNode {
    /// g + h.
    f: u32,
    /// Heuristic to the goal.
    h: u32,
    /// Row-major cell index.
    index: usize,
}

impl Ord for AStarNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse every key for min-heap behavior.
        other
            .f
            .cmp(&self.f)
            .then_with(|| other.h.cmp(&self.h))
            .then_with(|| other.index.cmp(&self.index))
    }
}

impl PartialOrd for AStarNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Row-major index of an in-bounds cell.
#[inline]
fn cell_index(cols: i32, rows: i32, cell: Cell) -> Option<usize> {
    if cell.x < 0 || cell.y < 0 || cell.x >= cols || cell.y >= rows {
        None
    } else {
        Some(cell.y as usize * cols as usize + cell.x as usize)
    }
}

#[inline]
fn index_cell(cols: i32, index: usize) -> Cell {
    let cols = cols as usize;
    Cell::new((index % cols) as i32, (index / cols) as i32)
}

/// Find a shortest 4-directional route from `start` to `goal`.
///
/// `is_open` decides traversability; `start` and `goal` are always treated
/// as open. Returns the full cell sequence including both endpoints, or
/// `None` when either endpoint is off the grid or no route exists.
pub fn astar(
    cols: i32,
    rows: i32,
    start: Cell,
    goal: Cell,
    is_open: impl Fn(Cell) -> bool,
) -> Option<Vec<Cell>> {
    let start_idx = cell_index(cols, rows, start)?;
    let goal_idx = cell_index(cols, rows, goal)?;
    if start_idx == goal_idx {
        return Some(vec![start]);
    }

    let total = cols as usize * rows as usize;
    let mut g_score = vec![u32::MAX; total];
    let mut came_from = vec![usize::MAX; total];
    let mut closed = vec![false; total];
    let mut open_set = BinaryHeap::new();

    let h = start.manhattan(goal);
    g_score[start_idx] = 0;
    open_set.push(AStarNode {
        f: h,
        h,
        index: start_idx,
    });

    while let Some(current) = open_set.pop() {
        if current.index == goal_idx {
            return Some(reconstruct(cols, &came_from, goal_idx));
        }
        if closed[current.index] {
            continue;
        }
        closed[current.index] = true;

        let cell = index_cell(cols, current.index);
        let next_g = g_score[current.index] + 1;
        for (dx, dy) in DIRECTIONS {
            let neighbor = cell.offset(dx, dy);
            let Some(n_idx) = cell_index(cols, rows, neighbor) else {
                continue;
            };
            if closed[n_idx] || (n_idx != goal_idx && !is_open(neighbor)) {
                continue;
            }
            if next_g < g_score[n_idx] {
                g_score[n_idx] = next_g;
                came_from[n_idx] = current.index;
                let h = neighbor.manhattan(goal);
                open_set.push(AStarNode {
                    f: next_g + h,
                    h,
                    index: n_idx,
                });
            }
        }
    }

    None
}

fn reconstruct(cols: i32, came_from: &[usize], goal_idx: usize) -> Vec<Cell> {
    let mut path = vec![index_cell(cols, goal_idx)];
    let mut current = goal_idx;
    while let Some(&prev) = came_from.get(current) {
        if prev == usize::MAX {
            break;
        }
        path.push(index_cell(cols, prev));
        current = prev;
    }
    path.reverse();
    path
}

/// Navigation data derived from a map and the current tower layout.
///
/// Holds the distance field from the end cell, the per-cell flow pointers
/// and the cached start-to-end route. Every mutation of the obstacle set
/// must be followed by [`PathGrid::rebuild`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathGrid {
    cols: i32,
    rows: i32,
    start: Cell,
    end: Cell,
    walls: Vec<bool>,
    towers: Vec<bool>,
    dist: Vec<u32>,
    flow: Vec<Option<Cell>>,
    path: Vec<Cell>,
}

impl PathGrid {
    /// Build the grid for a map with no towers.
    #[must_use]
    pub fn new(map: &MapDefinition) -> Self {
        let (cols, rows) = (map.size.cols.max(0), map.size.rows.max(0));
        let total = cols as usize * rows as usize;
        // Anything a tower could never stand on is also closed to creeps,
        // except the start and end cells.
        let walls = (0..total)
            .map(|i| !map.is_buildable(index_cell(cols, i)))
            .collect();
        let mut grid = Self {
            cols,
            rows,
            start: map.start,
            end: map.end,
            walls,
            towers: vec![false; total],
            dist: vec![UNREACHABLE; total],
            flow: vec![None; total],
            path: Vec::new(),
        };
        grid.rebuild();
        grid
    }

    /// Columns.
    #[must_use]
    pub const fn cols(&self) -> i32 {
        self.cols
    }

    /// Rows.
    #[must_use]
    pub const fn rows(&self) -> i32 {
        self.rows
    }

    /// Spawn cell.
    #[must_use]
    pub const fn start(&self) -> Cell {
        self.start
    }

    /// Exit cell.
    #[must_use]
    pub const fn end(&self) -> Cell {
        self.end
    }

    fn index(&self, cell: Cell) -> Option<usize> {
        cell_index(self.cols, self.rows, cell)
    }

    /// Whether a cell lies on the grid.
    #[must_use]
    pub fn in_bounds(&self, cell: Cell) -> bool {
        self.index(cell).is_some()
    }

    /// Whether creeps cannot enter the cell.
    ///
    /// Off-grid cells are blocked; start and end never are.
    #[must_use]
    pub fn is_blocked(&self, cell: Cell) -> bool {
        if cell == self.start || cell == self.end {
            return !self.in_bounds(cell);
        }
        self.index(cell)
            .map_or(true, |i| self.walls[i] || self.towers[i])
    }

    /// Whether a tower stands on the cell.
    #[must_use]
    pub fn has_tower(&self, cell: Cell) -> bool {
        self.index(cell).is_some_and(|i| self.towers[i])
    }

    /// Mark or clear tower occupancy. Call [`PathGrid::rebuild`] afterwards.
    pub fn set_tower(&mut self, cell: Cell, occupied: bool) {
        if let Some(i) = self.index(cell) {
            self.towers[i] = occupied;
        }
    }

    /// Recompute the distance field, flow pointers and cached route.
    pub fn rebuild(&mut self) {
        self.compute_field();
        self.path = astar(self.cols, self.rows, self.start, self.end, |c| {
            !self.is_blocked(c)
        })
        .unwrap_or_default();
        tracing::trace!(
            path_len = self.path.len(),
            reachable = self.has_route(),
            "Rebuilt path grid"
        );
    }

    fn compute_field(&mut self) {
        self.dist.iter_mut().for_each(|d| *d = UNREACHABLE);
        self.flow.iter_mut().for_each(|f| *f = None);
        let Some(end_idx) = self.index(self.end) else {
            return;
        };

        let mut queue = VecDeque::new();
        self.dist[end_idx] = 0;
        queue.push_back(self.end);
        while let Some(cell) = queue.pop_front() {
            let d = self.distance(cell).unwrap_or(UNREACHABLE);
            for (dx, dy) in DIRECTIONS {
                let neighbor = cell.offset(dx, dy);
                let Some(n_idx) = self.index(neighbor) else {
                    continue;
                };
                if self.dist[n_idx] != UNREACHABLE || self.is_blocked(neighbor) {
                    continue;
                }
                self.dist[n_idx] = d + 1;
                queue.push_back(neighbor);
            }
        }

        for i in 0..self.dist.len() {
            let d = self.dist[i];
            if d == UNREACHABLE || d == 0 {
                continue;
            }
            let cell = index_cell(self.cols, i);
            self.flow[i] = DIRECTIONS
                .iter()
                .map(|&(dx, dy)| cell.offset(dx, dy))
                .find(|n| self.distance(*n).is_some_and(|nd| nd < d));
        }
    }

    /// Steps from the cell to the end, or `None` if it cannot get there.
    #[must_use]
    pub fn distance(&self, cell: Cell) -> Option<u32> {
        self.index(cell)
            .map(|i| self.dist[i])
            .filter(|d| *d != UNREACHABLE)
    }

    /// Next cell along the flow field.
    #[must_use]
    pub fn next_cell(&self, cell: Cell) -> Option<Cell> {
        self.index(cell).and_then(|i| self.flow[i])
    }

    /// Cached start-to-end route, empty if none exists.
    #[must_use]
    pub fn path(&self) -> &[Cell] {
        &self.path
    }

    /// Whether the start can currently reach the end.
    #[must_use]
    pub fn has_route(&self) -> bool {
        !self.path.is_empty()
    }

    /// Whether the cached route passes through the cell.
    #[must_use]
    pub fn on_path(&self, cell: Cell) -> bool {
        self.path.contains(&cell)
    }

    /// Pixel waypoints of the cached route.
    #[must_use]
    pub fn waypoints(&self) -> Vec<Vec2> {
        self.path.iter().map(|c| c.center()).collect()
    }

    /// Whether start would still reach end with `extra` also blocked.
    #[must_use]
    pub fn reachable_without(&self, extra: Cell) -> bool {
        let (Some(start_idx), Some(end_idx)) = (self.index(self.start), self.index(self.end))
        else {
            return false;
        };
        let mut seen = vec![false; self.dist.len()];
        let mut queue = VecDeque::new();
        seen[start_idx] = true;
        queue.push_back(self.start);
        while let Some(cell) = queue.pop_front() {
            if self.index(cell) == Some(end_idx) {
                return true;
            }
            for (dx, dy) in DIRECTIONS {
                let neighbor = cell.offset(dx, dy);
                let Some(n_idx) = self.index(neighbor) else {
                    continue;
                };
                if seen[n_idx] || neighbor == extra || self.is_blocked(neighbor) {
                    continue;
                }
                seen[n_idx] = true;
                queue.push_back(neighbor);
            }
        }
        false
    }

    /// Route from an arbitrary cell to the end, treating `from` as open.
    #[must_use]
    pub fn route_from(&self, from: Cell) -> Option<Vec<Cell>> {
        astar(self.cols, self.rows, from, self.end, |c| !self.is_blocked(c))
    }

    /// Whether a remaining route is still shortest and unobstructed.
    ///
    /// `remaining` starts at the next cell to enter and ends at the end cell.
    #[must_use]
    pub fn is_route_optimal(&self, remaining: &[Cell]) -> bool {
        let Some(first) = remaining.first() else {
            return true;
        };
        if remaining.iter().any(|c| self.is_blocked(*c)) {
            return false;
        }
        self.distance(*first)
            .is_some_and(|d| d as usize + 1 == remaining.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::GridSize;

    fn open_map(cols: i32, rows: i32) -> MapDefinition {
        MapDefinition {
            size: GridSize { cols, rows },
            start: Cell::new(0, rows / 2),
            end: Cell::new(cols - 1, rows / 2),
            ..MapDefinition::default_map()
        }
    }

    #[test]
    fn test_straight_route() {
        let grid = PathGrid::new(&MapDefinition::default_map());
        let path = grid.path();
        assert_eq!(path.len(), 24);
        assert_eq!(path.first(), Some(&Cell::new(0, 8)));
        assert_eq!(path.last(), Some(&Cell::new(23, 8)));
        assert!(path.iter().all(|c| c.y == 8));
    }

    #[test]
    fn test_route_around_wall() {
        let grid = PathGrid::new(&MapDefinition::twist());
        let path = grid.path();
        assert!(!path.is_empty());
        assert!(path.iter().all(|c| !grid.is_blocked(*c)));
        for pair in path.windows(2) {
            assert_eq!(pair[0].manhattan(pair[1]), 1);
        }
        assert_eq!(path.len() as u32, grid.distance(grid.start()).unwrap() + 1);
    }

    #[test]
    fn test_no_route() {
        let mut grid = PathGrid::new(&open_map(6, 3));
        for y in 0..3 {
            grid.set_tower(Cell::new(3, y), true);
        }
        grid.rebuild();
        assert!(!grid.has_route());
        assert_eq!(grid.distance(grid.start()), None);
        assert!(astar(6, 3, Cell::new(0, 1), Cell::new(5, 1), |c| !grid.is_blocked(c)).is_none());
    }

    #[test]
    fn test_astar_off_grid() {
        assert!(astar(4, 4, Cell::new(-1, 0), Cell::new(3, 3), |_| true).is_none());
        assert_eq!(
            astar(4, 4, Cell::new(2, 2), Cell::new(2, 2), |_| true),
            Some(vec![Cell::new(2, 2)])
        );
    }

    #[test]
    fn test_astar_endpoints_always_open() {
        let path = astar(3, 1, Cell::new(0, 0), Cell::new(2, 0), |c| c.x == 1);
        assert_eq!(
            path,
            Some(vec![Cell::new(0, 0), Cell::new(1, 0), Cell::new(2, 0)])
        );
    }

    #[test]
    fn test_field_and_flow() {
        let grid = PathGrid::new(&MapDefinition::twist());
        assert_eq!(grid.distance(grid.end()), Some(0));
        assert_eq!(grid.distance(Cell::new(10, 7)), None);
        let mut cell = grid.start();
        let mut steps = 0;
        while cell != grid.end() {
            let next = grid.next_cell(cell).unwrap();
            assert_eq!(grid.distance(next).unwrap() + 1, grid.distance(cell).unwrap());
            cell = next;
            steps += 1;
        }
        assert_eq!(steps, grid.distance(grid.start()).unwrap());
    }

    #[test]
    fn test_flow_tie_uses_direction_order() {
        let grid = PathGrid::new(&open_map(5, 5));
        // End is (4, 2). East is off-grid and west is further, so south wins.
        assert_eq!(grid.next_cell(Cell::new(4, 0)), Some(Cell::new(4, 1)));
        // East and south both lead closer; east is expanded first.
        assert_eq!(grid.next_cell(Cell::new(3, 1)), Some(Cell::new(4, 1)));
    }

    #[test]
    fn test_reachable_without() {
        let grid = PathGrid::new(&open_map(5, 3));
        assert!(grid.reachable_without(Cell::new(2, 1)));

        let mut grid = grid;
        grid.set_tower(Cell::new(2, 0), true);
        grid.set_tower(Cell::new(2, 2), true);
        grid.rebuild();
        assert!(!grid.reachable_without(Cell::new(2, 1)));
    }

    #[test]
    fn test_route_from_blocked_cell() {
        let mut grid = PathGrid::new(&open_map(6, 3));
        grid.set_tower(Cell::new(2, 1), true);
        grid.rebuild();
        let route = grid.route_from(Cell::new(2, 1)).unwrap();
        assert_eq!(route.first(), Some(&Cell::new(2, 1)));
        assert_eq!(route.last(), Some(&grid.end()));
    }

    #[test]
    fn test_route_optimality() {
        let mut grid = PathGrid::new(&open_map(8, 3));
        let remaining: Vec<Cell> = grid.path()[1..].to_vec();
        assert!(grid.is_route_optimal(&remaining));

        grid.set_tower(Cell::new(4, 1), true);
        grid.rebuild();
        assert!(!grid.is_route_optimal(&remaining));
        assert!(grid.is_route_optimal(&[]));
    }

    #[test]
    fn test_unbuildable_cells_are_walls() {
        let mut map = open_map(5, 3);
        let mut mask = vec![vec![true; 5]; 3];
        mask[0][2] = false;
        mask[1][2] = false;
        map.buildable_mask = Some(mask);
        let grid = PathGrid::new(&map);
        assert!(grid.is_blocked(Cell::new(2, 1)));
        assert!(grid.path().contains(&Cell::new(2, 2)));
        assert!(!grid.reachable_without(Cell::new(2, 2)));
    }

    #[test]
    fn test_start_and_end_never_blocked() {
        let mut grid = PathGrid::new(&open_map(5, 3));
        grid.set_tower(grid.start(), true);
        assert!(!grid.is_blocked(grid.start()));
        assert!(grid.is_blocked(Cell::new(-1, 0)));
    }

    #[test]
    fn test_determinism() {
        let a = PathGrid::new(&MapDefinition::twist());
        let b = PathGrid::new(&MapDefinition::twist());
        assert_eq!(a.path(), b.path());
        assert_eq!(a, b);
    }
}
