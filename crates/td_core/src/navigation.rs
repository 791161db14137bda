//! Creep movement.
//!
//! Each tick a creep first ticks its status effects, then either sits out
//! a stun or moves `speed * dt` pixels along its route. Two route models
//! are supported, selected by [`NavigationMode`]:
//!
//! - **Waypoints**: the creep walks the pixel path it was spawned with,
//!   carrying leftover distance across segment boundaries. It is re-pathed
//!   by [`repath_creeps`] whenever the obstacle set changes.
//! - **Flow field**: the creep steers toward the center of a target cell and
//!   picks the next target from the [`PathGrid`] flow pointers on arrival.
//!
//! Reaching the exit is reported as [`Advance::Leaked`]; the caller owns the
//! lives counter.

use crate::combat::tick_statuses;
use crate::components::{BehaviorState, Creep};
use crate::config::NavigationMode;
use crate::content::Behavior;
use crate::math::{Cell, Vec2};
use crate::pathfinding::{PathGrid, DIRECTIONS};

/// Result of advancing one creep by one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// Moved (possibly by zero pixels).
    Moved,
    /// Stunned, did not move.
    Stunned,
    /// Died to damage over time before moving.
    Expired,
    /// Reached the exit and left the board.
    Leaked,
    /// Had no route; removed without a leak.
    Lost,
}

/// Cosmetic height of a lobbed projectile at flight fraction `p`.
#[must_use]
pub fn arc_height(apex: f64, p: f64) -> f64 {
    4.0 * apex * p * (1.0 - p)
}

/// Speed multiplier from the creep's behavior, advancing its timers.
fn behavior_multiplier(state: &mut BehaviorState, dt: f64) -> f64 {
    match state.behavior {
        Behavior::Dash {
            speed,
            duration,
            cooldown,
        } => {
            state.dash_cooldown = (state.dash_cooldown - dt).max(0.0);
            state.dash_remaining = (state.dash_remaining - dt).max(0.0);
            if state.dash_remaining <= 0.0 && state.dash_cooldown <= 0.0 {
                state.dash_remaining = duration;
                state.dash_cooldown = cooldown;
            }
            if state.dash_remaining > 0.0 {
                speed
            } else {
                1.0
            }
        }
        Behavior::Linear | Behavior::Zigzag { .. } | Behavior::Split { .. } => 1.0,
    }
}

/// Update the zigzag offset perpendicular to the current heading.
fn sway(creep: &mut Creep, heading: Vec2, dt: f64) {
    let Behavior::Zigzag { amp, freq } = creep.behavior.behavior else {
        return;
    };
    creep.behavior.phase += dt * freq * std::f64::consts::TAU;
    let normal = Vec2::new(-heading.y, heading.x);
    creep.lateral = normal.scale(amp * creep.behavior.phase.sin());
}

/// Advance one creep by `dt` seconds.
pub fn advance(creep: &mut Creep, dt: f64, grid: &PathGrid, mode: NavigationMode) -> Advance {
    if !creep.alive {
        return Advance::Expired;
    }
    tick_statuses(creep, dt);
    if creep.hp <= 0.0 {
        return Advance::Expired;
    }

    if creep.status.stun > 0.0 {
        creep.status.stun = (creep.status.stun - dt).max(0.0);
        return Advance::Stunned;
    }

    if creep.path.is_empty() {
        tracing::warn!(creep = creep.id.0, "Creep has no path, removing");
        creep.alive = false;
        return Advance::Lost;
    }

    let speed = creep.speed
        * (1.0 - creep.status.slow())
        * behavior_multiplier(&mut creep.behavior, dt);
    let travel = speed * dt;
    let before = creep.pos;

    let outcome = match mode {
        NavigationMode::Waypoints => walk_waypoints(creep, travel),
        NavigationMode::FlowField => walk_flow(creep, travel, grid),
    };

    if outcome == Advance::Leaked {
        creep.alive = false;
    } else {
        let heading = (creep.pos - before).normalize();
        sway(creep, heading, dt);
    }
    outcome
}

fn walk_waypoints(creep: &mut Creep, mut travel: f64) -> Advance {
    loop {
        let (Some(&a), Some(&b)) = (creep.path.get(creep.seg), creep.path.get(creep.seg + 1))
        else {
            // Standing on the last waypoint.
            return Advance::Leaked;
        };
        let len = a.distance(b);
        let left = len - creep.offset;
        if travel < left {
            creep.offset += travel;
            creep.pos = a.lerp(b, creep.offset / len);
            return Advance::Moved;
        }
        travel -= left;
        creep.seg += 1;
        creep.offset = 0.0;
        creep.pos = b;
        if creep.seg + 1 >= creep.path.len() {
            return Advance::Leaked;
        }
    }
}

/// Next cell toward the exit: the flow pointer, or failing that the open
/// neighbor with the smallest distance.
fn step_toward(grid: &PathGrid, here: Cell) -> Option<Cell> {
    grid.next_cell(here).or_else(|| {
        DIRECTIONS
            .iter()
            .map(|&(dx, dy)| here.offset(dx, dy))
            .filter_map(|n| grid.distance(n).map(|d| (d, n)))
            .min_by_key(|(d, _)| *d)
            .map(|(_, n)| n)
    })
}

fn walk_flow(creep: &mut Creep, mut travel: f64, grid: &PathGrid) -> Advance {
    loop {
        let here = Cell::containing(creep.pos);
        let target = match creep.flow_target {
            Some(target) => target,
            None => {
                if here == grid.end() {
                    return Advance::Leaked;
                }
                let Some(next) = step_toward(grid, here) else {
                    // Walled in; wait for the grid to open up.
                    return Advance::Moved;
                };
                creep.flow_target = Some(next);
                next
            }
        };

        let goal = target.center();
        let dist = creep.pos.distance(goal);
        if travel < dist {
            creep.pos = creep.pos + (goal - creep.pos).scale(travel / dist);
            return Advance::Moved;
        }
        travel -= dist;
        creep.pos = goal;
        creep.flow_target = None;
        creep.seg += 1;
        if target == grid.end() {
            return Advance::Leaked;
        }
    }
}

/// Re-route creeps whose remaining route is no longer optimal.
///
/// Call after every [`PathGrid::rebuild`].
pub fn repath_creeps(creeps: &mut [Creep], grid: &PathGrid, mode: NavigationMode) {
    for creep in creeps.iter_mut().filter(|c| c.alive) {
        match mode {
            NavigationMode::Waypoints => repath_waypoints(creep, grid),
            NavigationMode::FlowField => {
                if creep.flow_target.is_some_and(|t| grid.is_blocked(t)) {
                    creep.flow_target = None;
                }
            }
        }
    }
}

fn repath_waypoints(creep: &mut Creep, grid: &PathGrid) {
    if creep.path.is_empty() {
        return;
    }
    let remaining: Vec<Cell> = creep
        .path
        .iter()
        .skip(creep.seg + 1)
        .map(|p| Cell::containing(*p))
        .collect();
    if grid.is_route_optimal(&remaining) {
        return;
    }

    let here = Cell::containing(creep.pos);
    let Some(cells) = grid.route_from(here) else {
        tracing::warn!(creep = creep.id.0, ?here, "No route from creep position");
        return;
    };
    let mut path: Vec<Vec2> = cells.iter().map(|c| c.center()).collect();
    if let Some(first) = path.first_mut() {
        *first = creep.pos;
    }
    tracing::trace!(
        creep = creep.id.0,
        from = ?here,
        len = path.len(),
        "Recomputed creep path"
    );
    creep.path = path;
    creep.seg = 0;
    creep.offset = 0.0;
}
