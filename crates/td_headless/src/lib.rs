//! Headless tower defense runner for balance testing and CI verification.
//!
//! This crate drives [`td_core`] simulations without any presentation layer:
//!
//! - **Scenarios**: a map, a configuration and a timeline of player actions,
//!   loaded from RON or picked from the built-in set
//! - **Batches**: one scenario under many seeds in parallel, summarized
//! - **Verification**: same-seed reruns and recorded replays must reproduce
//!   their state hash exactly
//! - **Map validation**: check a RON or JSON map before shipping it
//!
//! # Example
//!
//! ```bash
//! # Run a built-in scenario
//! cargo run -p td_headless -- run --scenario opening --seed 7
//!
//! # Balance batch
//! cargo run -p td_headless -- batch --scenario gauntlet --count 500 --output results/
//!
//! # Verify a replay
//! cargo run -p td_headless -- replay --file run.replay
//! ```

pub mod batch;
pub mod runner;
pub mod scenario;
pub mod validate;

pub use batch::{run_batch, verify_determinism, BatchConfig, BatchResults, BatchSummary};
pub use runner::{record_replay, run_scenario, RunReport};
pub use scenario::{MapSource, Scenario, ScenarioError};
pub use validate::{validate_map, validate_map_file, ValidationReport};
