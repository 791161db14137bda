//! Headless tower defense runner.
//!
//! # Usage
//!
//! ```bash
//! # Run a scenario and print its report
//! cargo run -p td_headless -- run --scenario my_scenario.ron --seed 3
//!
//! # Record a replay while running
//! cargo run -p td_headless -- run --scenario gauntlet --record gauntlet.replay
//!
//! # Balance batch
//! cargo run -p td_headless -- batch --scenario opening --count 1000 --output results/
//!
//! # Determinism check
//! cargo run -p td_headless -- verify --scenario gauntlet --seed 12345 --runs 5
//!
//! # Map check
//! cargo run -p td_headless -- validate my_map.json
//! ```
//!
//! Reports go to stdout; logs go to stderr and honor `RUST_LOG`.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use td_core::replay::Replay;
use td_headless::{
    batch::{run_batch, verify_determinism, BatchConfig},
    runner::{record_replay, run_scenario},
    scenario::Scenario,
    validate::validate_map_file,
};

#[derive(Parser)]
#[command(name = "td_headless")]
#[command(about = "Headless tower defense runner for balance testing and CI")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single scenario and print its report
    Run {
        /// Built-in scenario name or RON file
        #[arg(short, long, default_value = "opening")]
        scenario: String,

        /// Seed (defaults to the scenario's own)
        #[arg(long)]
        seed: Option<u32>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        /// Save a replay of the run
        #[arg(long)]
        record: Option<PathBuf>,
    },

    /// Run a batch of seeds for balance testing
    Batch {
        /// Built-in scenario name or RON file
        #[arg(short, long, default_value = "opening")]
        scenario: String,

        /// Number of games to run
        #[arg(short, long, default_value = "100")]
        count: u32,

        /// Starting seed
        #[arg(long, default_value = "0")]
        seed: u32,

        /// Maximum parallel games (0 = auto)
        #[arg(short, long, default_value = "0")]
        parallel: u32,

        /// Output directory for results
        #[arg(short, long, default_value = "results")]
        output: PathBuf,
    },

    /// Verify determinism by running the same seed several times
    Verify {
        /// Built-in scenario name or RON file
        #[arg(short, long, default_value = "opening")]
        scenario: String,

        /// Seed to verify
        #[arg(long, default_value = "12345")]
        seed: u32,

        /// Number of verification runs
        #[arg(short, long, default_value = "5")]
        runs: u32,
    },

    /// Verify a recorded replay reproduces its final hash
    Replay {
        /// Replay file path
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Validate a RON or JSON map file
    Validate {
        /// Map file path
        path: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true),
        )
        .init();

    match cli.command {
        Commands::Run {
            scenario,
            seed,
            json,
            record,
        } => cmd_run(&scenario, seed, json, record),
        Commands::Batch {
            scenario,
            count,
            seed,
            parallel,
            output,
        } => cmd_batch(&scenario, count, seed, parallel, output),
        Commands::Verify {
            scenario,
            seed,
            runs,
        } => cmd_verify(&scenario, seed, runs),
        Commands::Replay { file } => cmd_replay(&file),
        Commands::Validate { path } => cmd_validate(&path),
    }
}

fn load_scenario(name: &str) -> Scenario {
    match Scenario::resolve(name) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to load scenario '{}': {}", name, e);
            std::process::exit(1);
        }
    }
}

/// Run one scenario
fn cmd_run(name: &str, seed: Option<u32>, json: bool, record: Option<PathBuf>) {
    let scenario = load_scenario(name);
    let seed = seed.unwrap_or(scenario.seed);
    tracing::info!(scenario = %scenario.name, seed, ticks = scenario.ticks, "Starting run");

    let report = match run_scenario(&scenario, seed) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Run failed: {}", e);
            std::process::exit(1);
        }
    };

    if json {
        match serde_json::to_string_pretty(&report) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Failed to encode report: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        print!("{}", report.to_text());
    }

    if let Some(path) = record {
        let saved = record_replay(&scenario, seed)
            .map_err(|e| e.to_string())
            .and_then(|replay| replay.save(&path).map_err(|e| e.to_string()));
        match saved {
            Ok(()) => eprintln!("Replay saved to: {}", path.display()),
            Err(e) => {
                eprintln!("Failed to record replay: {}", e);
                std::process::exit(1);
            }
        }
    }
}

/// Run a batch of games for balance testing
fn cmd_batch(name: &str, count: u32, seed: u32, parallel: u32, output: PathBuf) {
    let scenario = load_scenario(name);

    let num_cpus = std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1);
    tracing::info!(
        scenario = %scenario.name,
        count,
        parallel,
        seed,
        output = %output.display(),
        cpus_available = num_cpus,
        "Batch configuration"
    );

    if let Err(e) = std::fs::create_dir_all(&output) {
        tracing::error!(error = %e, path = %output.display(), "Failed to create output directory");
        eprintln!(
            "FATAL: Cannot create output directory '{}': {}",
            output.display(),
            e
        );
        std::process::exit(1);
    }

    let config = BatchConfig {
        scenario: name.to_string(),
        game_count: count,
        parallel_games: parallel,
        output_dir: Some(output.clone()),
        seed_start: seed,
    };
    let results = run_batch(&scenario, config);

    let results_path = output.join("batch_results.json");
    if let Err(e) = results.save(&results_path) {
        tracing::error!(error = %e, path = %results_path.display(), "Failed to save results");
        eprintln!("FATAL: Failed to save results: {}", e);
        std::process::exit(1);
    }

    let summary = &results.summary;
    eprintln!("\n{}", "=".repeat(50));
    eprintln!("BATCH COMPLETE");
    eprintln!("{}", "=".repeat(50));
    eprintln!("Games played: {}", results.games.len());
    if !results.errors.is_empty() {
        eprintln!("Games FAILED: {}", results.errors.len());
    }
    eprintln!("Duration: {:.1}s", results.duration_seconds);
    eprintln!(
        "Throughput: {:.1} games/sec",
        results.games.len() as f64 / results.duration_seconds.max(0.001)
    );
    eprintln!("Survival rate: {:.1}%", summary.survival_rate * 100.0);
    eprintln!(
        "Avg waves cleared: {:.2}  Avg lives: {:.2}  Best wave: {}",
        summary.avg_waves_cleared, summary.avg_lives, summary.best_wave
    );
    if !summary.leaks_by_type.is_empty() {
        eprintln!("\nLeaks by creep type:");
        for (creep, leaks) in &summary.leaks_by_type {
            eprintln!("  {:?}: {}", creep, leaks);
        }
    }

    if !results.errors.is_empty() {
        eprintln!("\nGAME FAILURES:");
        for error in results.errors.iter().take(10) {
            eprintln!(
                "  Game {} (seed {}): {}",
                error.game_index, error.seed, error.message
            );
        }
        if results.errors.len() > 10 {
            eprintln!("  ... and {} more failures", results.errors.len() - 10);
        }
    }

    eprintln!("\nResults saved to: {}", results_path.display());
}

/// Verify determinism
fn cmd_verify(name: &str, seed: u32, runs: u32) {
    let scenario = load_scenario(name);
    tracing::info!(
        "Verifying determinism: {} with seed {} ({} runs)",
        scenario.name,
        seed,
        runs
    );

    let check = verify_determinism(&scenario, seed, runs);
    if check.is_deterministic() {
        let hash = check.hashes.first().copied().unwrap_or_default();
        eprintln!("PASS: All {} runs produced identical results", runs);
        eprintln!("  Hash: {:016x}", hash);
    } else {
        eprintln!("FAIL: Non-determinism detected!");
        for (i, hash) in check.hashes.iter().enumerate() {
            eprintln!("  Run {}: {:016x}", i, hash);
        }
        for error in &check.errors {
            eprintln!("  Error: {}", error);
        }
        std::process::exit(1);
    }
}

/// Verify a recorded replay
fn cmd_replay(file: &Path) {
    tracing::info!("Verifying replay: {}", file.display());

    let replay = match Replay::load(file) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Failed to load replay: {}", e);
            std::process::exit(1);
        }
    };

    eprintln!("Loaded replay:");
    eprintln!("  Map: {}", replay.map.id);
    eprintln!("  Seed: {}", replay.seed);
    eprintln!("  Actions: {}", replay.actions.len());
    eprintln!("  Duration: {} ticks", replay.final_tick);

    match replay.verify() {
        Ok(hash) => {
            eprintln!("PASS: Replay verification successful");
            eprintln!("  Hash: {:016x}", hash);
        }
        Err(e) => {
            eprintln!("FAIL: {}", e);
            std::process::exit(1);
        }
    }
}

/// Validate a map file
fn cmd_validate(path: &Path) {
    match validate_map_file(path) {
        Ok(report) => {
            let info = &report.info;
            println!("OK: {} ({})", info.name, info.id);
            println!("  Size: {}x{}", info.cols, info.rows);
            println!(
                "  Start: ({}, {})  End: ({}, {})",
                info.start.x, info.start.y, info.end.x, info.end.y
            );
            println!("  Blocked cells: {}", info.blocked_count);
            println!("  Buildable cells: {}", report.buildable_cells);
            if report.has_route {
                println!("  Route length: {}", report.route_len);
            } else {
                println!("  WARNING: no route from start to end");
            }
        }
        Err(e) => {
            eprintln!("INVALID: {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
}
