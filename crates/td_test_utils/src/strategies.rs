//! Proptest strategies for simulation testing.
//!
//! These strategies generate random but reproducible inputs for
//! property-based testing of the simulation.

use proptest::prelude::*;
use td_core::components::{TargetingMode, TowerMods};
use td_core::content::{CreepType, StatusKind, TowerKind};
use td_core::math::Cell;
use td_core::replay::{Action, TimedAction};

/// Any session seed.
pub fn arb_seed() -> impl Strategy<Value = u32> {
    any::<u32>()
}

/// Any tower kind.
pub fn arb_tower_kind() -> impl Strategy<Value = TowerKind> {
    prop::sample::select(TowerKind::ALL.to_vec())
}

/// Any creep type.
pub fn arb_creep_type() -> impl Strategy<Value = CreepType> {
    prop::sample::select(CreepType::ALL.to_vec())
}

/// Any status kind.
pub fn arb_status_kind() -> impl Strategy<Value = StatusKind> {
    prop::sample::select(vec![
        StatusKind::Burn,
        StatusKind::Poison,
        StatusKind::Chill,
        StatusKind::Shock,
        StatusKind::Brittle,
        StatusKind::Exposed,
        StatusKind::ManaBurn,
    ])
}

/// Any targeting mode.
pub fn arb_targeting_mode() -> impl Strategy<Value = TargetingMode> {
    prop_oneof![
        Just(TargetingMode::First),
        Just(TargetingMode::Last),
        Just(TargetingMode::Cycle),
    ]
}

/// A cell on a `cols` x `rows` grid.
pub fn arb_cell(cols: i32, rows: i32) -> impl Strategy<Value = Cell> {
    (0..cols, 0..rows).prop_map(|(x, y)| Cell::new(x, y))
}

/// A cell that may lie up to two cells off a `cols` x `rows` grid.
pub fn arb_cell_loose(cols: i32, rows: i32) -> impl Strategy<Value = Cell> {
    (-2..cols + 2, -2..rows + 2).prop_map(|(x, y)| Cell::new(x, y))
}

/// Tower modifiers covering the ranges evolutions produce.
pub fn arb_tower_mods() -> impl Strategy<Value = TowerMods> {
    (0.0..1.0f64, 0.0..1.0f64, 0.0..0.5f64, 0.0..0.6f64, 0u32..4).prop_map(
        |(burn, poison, chill, res_shred, max_stacks)| TowerMods {
            burn,
            poison,
            chill,
            res_shred,
            max_stacks,
            ..TowerMods::default()
        },
    )
}

/// A player action on the default 24x16 board.
pub fn arb_action() -> impl Strategy<Value = Action> {
    prop_oneof![
        4 => (arb_cell(24, 16), arb_tower_kind())
            .prop_map(|(c, kind)| Action::PlaceTower { x: c.x, y: c.y, kind }),
        1 => arb_cell(24, 16).prop_map(|c| Action::SellTower { x: c.x, y: c.y }),
        1 => arb_cell(24, 16).prop_map(|c| Action::Select { x: c.x, y: c.y }),
        1 => Just(Action::LevelUp),
        1 => arb_targeting_mode().prop_map(Action::SetTargeting),
        2 => Just(Action::StartWave),
        1 => Just(Action::CycleSpeed),
    ]
}

/// A timeline of up to `max_len` actions within the first `max_tick` steps.
pub fn arb_script(max_len: usize, max_tick: u64) -> impl Strategy<Value = Vec<TimedAction>> {
    prop::collection::vec((0..max_tick, arb_action()), 0..=max_len).prop_map(|mut items| {
        items.sort_by_key(|(tick, _)| *tick);
        items
            .into_iter()
            .map(|(tick, action)| TimedAction::new(tick, action))
            .collect()
    })
}
