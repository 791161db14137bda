//! Batch runner for balance testing.
//!
//! Runs one scenario under many seeds in parallel using rayon and
//! aggregates the reports. Each simulation is built and driven entirely on
//! one worker thread; only the finished [`RunReport`] crosses threads.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use td_core::content::CreepType;

use crate::runner::{run_scenario, RunReport};
use crate::scenario::Scenario;

/// Configuration for a batch run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Scenario name or path, for the record.
    pub scenario: String,
    /// Number of games to run
    pub game_count: u32,
    /// Maximum parallel games (0 = use rayon default)
    pub parallel_games: u32,
    /// Output directory for results
    pub output_dir: Option<PathBuf>,
    /// Seed of the first game; game `i` uses `seed_start + i`.
    pub seed_start: u32,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            scenario: "opening".to_string(),
            game_count: 100,
            parallel_games: 0,
            output_dir: None,
            seed_start: 0,
        }
    }
}

impl BatchConfig {
    /// Create config for a specific scenario
    pub fn new(scenario: &str, game_count: u32) -> Self {
        Self {
            scenario: scenario.to_string(),
            game_count,
            ..Default::default()
        }
    }

    /// Set output directory
    pub fn with_output(mut self, dir: PathBuf) -> Self {
        self.output_dir = Some(dir);
        self
    }

    /// Set seed start
    pub fn with_seed(mut self, seed: u32) -> Self {
        self.seed_start = seed;
        self
    }

    /// Seeds in run order.
    pub fn seeds(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.game_count).map(|i| self.seed_start.wrapping_add(i))
    }
}

/// Aggregate over every finished game.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Games that finished.
    pub total_games: u32,
    /// Games that ended without a game over.
    pub survived: u32,
    /// `survived / total_games`.
    pub survival_rate: f64,
    /// Mean waves cleared.
    pub avg_waves_cleared: f64,
    /// Mean lives left.
    pub avg_lives: f64,
    /// Mean kills.
    pub avg_kills: f64,
    /// Mean accuracy percentage.
    pub avg_accuracy: f64,
    /// Furthest wave reached by any game.
    pub best_wave: u32,
    /// Leaks by creep type across all games.
    pub leaks_by_type: BTreeMap<CreepType, u32>,
    /// Distinct final hashes; equal to the game count when every seed
    /// produced a different game.
    pub distinct_hashes: usize,
}

impl BatchSummary {
    /// Summarize a set of reports.
    pub fn from_games(games: &[RunReport]) -> Self {
        if games.is_empty() {
            return Self::default();
        }
        let n = games.len() as f64;
        let mean = |f: &dyn Fn(&RunReport) -> f64| games.iter().map(f).sum::<f64>() / n;

        let mut leaks_by_type = BTreeMap::new();
        for game in games {
            for (kind, count) in &game.stats.leaks_by_type {
                *leaks_by_type.entry(*kind).or_insert(0) += count;
            }
        }
        let mut hashes: Vec<u64> = games.iter().map(|g| g.state_hash).collect();
        hashes.sort_unstable();
        hashes.dedup();

        let survived = games.iter().filter(|g| g.survived()).count() as u32;
        Self {
            total_games: games.len() as u32,
            survived,
            survival_rate: f64::from(survived) / n,
            avg_waves_cleared: mean(&|g| f64::from(g.stats.totals.waves_cleared)),
            avg_lives: mean(&|g| f64::from(g.lives)),
            avg_kills: mean(&|g| f64::from(g.stats.totals.creeps_killed)),
            avg_accuracy: mean(&|g| f64::from(g.stats.accuracy)),
            best_wave: games.iter().map(|g| g.wave).max().unwrap_or(0),
            leaks_by_type,
            distinct_hashes: hashes.len(),
        }
    }
}

/// Results from a batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResults {
    /// Configuration used
    pub config: BatchConfig,
    /// Individual game reports, in seed order
    pub games: Vec<RunReport>,
    /// Aggregate summary
    pub summary: BatchSummary,
    /// Total runtime
    pub duration_seconds: f64,
    /// Errors encountered
    pub errors: Vec<BatchError>,
}

impl BatchResults {
    /// Save results to JSON file
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Load results from JSON file
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(std::io::Error::other)
    }
}

/// Error during batch run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchError {
    /// Game index
    pub game_index: u32,
    /// Seed used
    pub seed: u32,
    /// Error message
    pub message: String,
}

/// Progress tracking for batch runs
#[derive(Debug)]
pub struct BatchProgress {
    /// Total games
    pub total: u32,
    completed: AtomicU32,
    survived: AtomicU32,
    start_time: Instant,
}

impl BatchProgress {
    /// Create new progress tracker
    pub fn new(total: u32) -> Self {
        Self {
            total,
            completed: AtomicU32::new(0),
            survived: AtomicU32::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a completed game
    pub fn record_completion(&self, survived: bool) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        if survived {
            self.survived.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Get current completion count
    pub fn current(&self) -> u32 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Get completion percentage
    pub fn percentage(&self) -> f64 {
        f64::from(self.current()) / f64::from(self.total.max(1)) * 100.0
    }

    /// Survival rate among completed games.
    pub fn survival_rate(&self) -> f64 {
        let completed = self.current();
        if completed == 0 {
            return 0.0;
        }
        f64::from(self.survived.load(Ordering::Relaxed)) / f64::from(completed)
    }

    /// Get estimated time remaining
    pub fn eta(&self) -> Duration {
        let completed = self.current();
        if completed == 0 {
            return Duration::from_secs(0);
        }
        let per_game = self.start_time.elapsed().as_secs_f64() / f64::from(completed);
        let remaining = self.total.saturating_sub(completed);
        Duration::from_secs_f64(per_game * f64::from(remaining))
    }

    /// Log progress.
    pub fn display(&self) {
        let eta = self.eta();
        info!(
            completed = self.current(),
            total = self.total,
            percent = %format!("{:.1}", self.percentage()),
            survival = %format!("{:.1}%", self.survival_rate() * 100.0),
            eta = %format!("{}m {}s", eta.as_secs() / 60, eta.as_secs() % 60),
            "Batch progress"
        );
    }
}

fn run_games(
    scenario: &Scenario,
    config: &BatchConfig,
    progress: &BatchProgress,
) -> Vec<Result<RunReport, BatchError>> {
    (0..config.game_count)
        .into_par_iter()
        .map(|i| {
            let seed = config.seed_start.wrapping_add(i);
            match run_scenario(scenario, seed) {
                Ok(report) => {
                    progress.record_completion(report.survived());
                    let completed = progress.current();
                    if completed % 10 == 0 {
                        debug!("Progress: {}/{}", completed, config.game_count);
                    }
                    if completed % 100 == 0 {
                        progress.display();
                    }
                    Ok(report)
                }
                Err(e) => {
                    warn!("Game {} failed: {}", i, e);
                    Err(BatchError {
                        game_index: i,
                        seed,
                        message: e.to_string(),
                    })
                }
            }
        })
        .collect()
}

/// Run a batch of games
pub fn run_batch(scenario: &Scenario, config: BatchConfig) -> BatchResults {
    let start = Instant::now();
    let progress = BatchProgress::new(config.game_count);

    info!(
        "Starting batch run: {} games of '{}'",
        config.game_count, scenario.name
    );

    let results = if config.parallel_games > 0 {
        match rayon::ThreadPoolBuilder::new()
            .num_threads(config.parallel_games as usize)
            .build()
        {
            Ok(pool) => pool.install(|| run_games(scenario, &config, &progress)),
            Err(e) => {
                warn!(error = %e, "Could not build thread pool, using the global one");
                run_games(scenario, &config, &progress)
            }
        }
    } else {
        run_games(scenario, &config, &progress)
    };

    let (games, errors): (Vec<_>, Vec<_>) = results.into_iter().partition(Result::is_ok);
    let games: Vec<RunReport> = games.into_iter().filter_map(Result::ok).collect();
    let errors: Vec<BatchError> = errors.into_iter().filter_map(Result::err).collect();

    let summary = BatchSummary::from_games(&games);
    let duration_seconds = start.elapsed().as_secs_f64();

    info!(
        "Batch complete: {} games in {:.1}s ({:.1} games/sec)",
        games.len(),
        duration_seconds,
        games.len() as f64 / duration_seconds.max(0.001)
    );

    BatchResults {
        config,
        games,
        summary,
        duration_seconds,
        errors,
    }
}

/// Outcome of a determinism check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeterminismCheck {
    /// Final hash of each run.
    pub hashes: Vec<u64>,
    /// Runs that failed to start.
    pub errors: Vec<String>,
}

impl DeterminismCheck {
    /// Every run finished and all hashes agree.
    pub fn is_deterministic(&self) -> bool {
        self.errors.is_empty()
            && !self.hashes.is_empty()
            && self.hashes.windows(2).all(|w| w[0] == w[1])
    }
}

/// Run the same seed several times in parallel and compare final hashes.
pub fn verify_determinism(scenario: &Scenario, seed: u32, runs: u32) -> DeterminismCheck {
    let results: Vec<_> = (0..runs)
        .into_par_iter()
        .map(|_| run_scenario(scenario, seed).map(|r| r.state_hash))
        .collect();
    let mut check = DeterminismCheck {
        hashes: Vec::new(),
        errors: Vec::new(),
    };
    for result in results {
        match result {
            Ok(hash) => check.hashes.push(hash),
            Err(e) => check.errors.push(e.to_string()),
        }
    }
    check
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::MapSource;

    #[test]
    fn test_batch_config_default() {
        let config = BatchConfig::default();
        assert_eq!(config.game_count, 100);
        assert_eq!(config.scenario, "opening");
    }

    #[test]
    fn test_batch_config_builder() {
        let config = BatchConfig::new("custom_scenario", 500)
            .with_output(PathBuf::from("/tmp/results"))
            .with_seed(12345);

        assert_eq!(config.scenario, "custom_scenario");
        assert_eq!(config.game_count, 500);
        assert_eq!(config.seed_start, 12345);
        assert_eq!(config.seeds().nth(2), Some(12347));
    }

    #[test]
    fn test_progress_tracking() {
        let progress = BatchProgress::new(100);
        assert_eq!(progress.current(), 0);
        assert_eq!(progress.percentage(), 0.0);

        progress.record_completion(true);
        progress.record_completion(false);
        progress.record_completion(true);

        assert_eq!(progress.current(), 3);
        assert!((progress.survival_rate() - 0.666).abs() < 0.01);
    }

    #[test]
    fn test_run_batch_small() {
        let config = BatchConfig::new("idle", 6).with_seed(40);
        let results = run_batch(&Scenario::idle(), config);

        assert_eq!(results.games.len(), 6);
        assert!(results.errors.is_empty());
        let seeds: Vec<u32> = results.games.iter().map(|g| g.seed).collect();
        assert_eq!(seeds, vec![40, 41, 42, 43, 44, 45]);
        assert_eq!(results.summary.total_games, 6);
        assert_eq!(results.summary.leaks_by_type.get(&CreepType::Grunt), Some(&36));
        assert!((results.summary.avg_lives - 14.0).abs() < 1e-9);
    }

    #[test]
    fn test_bounded_pool_matches_global() {
        let scenario = Scenario {
            ticks: 600,
            ..Scenario::opening()
        };
        let global = run_batch(&scenario, BatchConfig::new("opening", 4));
        let bounded = run_batch(
            &scenario,
            BatchConfig {
                parallel_games: 2,
                ..BatchConfig::new("opening", 4)
            },
        );
        let hashes = |r: &BatchResults| r.games.iter().map(|g| g.state_hash).collect::<Vec<_>>();
        assert_eq!(hashes(&global), hashes(&bounded));
    }

    #[test]
    fn test_failed_games_are_reported() {
        let scenario = Scenario {
            map: MapSource::Builtin("missing".to_string()),
            ..Scenario::idle()
        };
        let results = run_batch(&scenario, BatchConfig::new("broken", 3));
        assert!(results.games.is_empty());
        assert_eq!(results.errors.len(), 3);
        assert_eq!(results.summary, BatchSummary::default());
    }

    #[test]
    fn test_verify_determinism() {
        let scenario = Scenario {
            ticks: 900,
            ..Scenario::opening()
        };
        let check = verify_determinism(&scenario, 12345, 4);
        assert!(check.is_deterministic());
        assert_eq!(check.hashes.len(), 4);
    }

    #[test]
    fn test_batch_results_save_load() {
        let config = BatchConfig::new("idle", 3);
        let results = run_batch(&Scenario::idle(), config);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");

        results.save(&path).unwrap();
        assert!(path.exists());

        let loaded = BatchResults::load(&path).unwrap();
        assert_eq!(loaded.games.len(), 3);
        assert_eq!(loaded.config.scenario, "idle");
        assert_eq!(loaded.games[0].state_hash, results.games[0].state_hash);
    }
}
