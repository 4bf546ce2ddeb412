//! Run configuration and eager validation.
//!
//! Everything that could make a generation loop misbehave (an empty worker
//! pool, a population too small to give every worker a breeding slice, a
//! dataset whose tours all have zero length) is rejected here, before any
//! thread is spawned.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// How the per-generation phases are executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStrategy {
    /// Everything on the calling thread
    Sequential,
    /// Persistent worker pool driven through gated barriers
    BarrierPool,
    /// One rayon parallel-for per phase, joined before the next
    ParallelFor,
}

impl std::fmt::Display for ExecutionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ExecutionStrategy::Sequential => "sequential",
            ExecutionStrategy::BarrierPool => "barrier-pool",
            ExecutionStrategy::ParallelFor => "parallel-for",
        };
        f.write_str(name)
    }
}

/// Genetic Algorithm configuration
#[derive(Debug, Clone)]
pub struct GaConfig {
    /// Population size (P)
    pub population_size: usize,
    /// Number of generations
    pub iterations: usize,
    /// Requested worker count, the orchestrator included
    pub workers: usize,
    /// Executor for the generation phases
    pub strategy: ExecutionStrategy,
    /// Random seed (drawn from entropy when absent)
    pub seed: Option<u64>,
    /// Number of best tours reported
    pub top_k: usize,
}

impl Default for GaConfig {
    fn default() -> Self {
        GaConfig {
            population_size: 100,
            iterations: 100,
            workers: available_parallelism(),
            strategy: ExecutionStrategy::BarrierPool,
            seed: None,
            top_k: 10,
        }
    }
}

/// Validated parameters of one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPlan {
    pub population_size: usize,
    pub iterations: usize,
    /// Worker threads beside the orchestrator (1 for the sequential strategy)
    pub pool_size: usize,
    pub strategy: ExecutionStrategy,
    pub top_k: usize,
}

impl GaConfig {
    /// Check the configuration against a dataset of `dimension` cities whose
    /// largest pairwise distance is `max_distance`.
    pub fn validate(&self, dimension: usize, max_distance: f64) -> Result<RunPlan, ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if dimension < 2 {
            return Err(ConfigError::TooFewCities(dimension));
        }
        if !(max_distance > 0.0) {
            return Err(ConfigError::DegenerateDistances);
        }

        let pool_size = match self.strategy {
            ExecutionStrategy::Sequential => 1,
            _ => {
                let available = available_parallelism();
                let pool_size = resolve_pool_size(self.workers, available);
                if pool_size + 1 < self.workers {
                    log::warn!(
                        "requested {} workers, capped to {} pool workers plus the orchestrator ({} cores)",
                        self.workers, pool_size, available
                    );
                }
                pool_size
            }
        };

        let minimum = (2 * pool_size).max(2);
        if self.population_size < minimum {
            return Err(ConfigError::PopulationTooSmall {
                population_size: self.population_size,
                minimum,
                workers: pool_size,
            });
        }

        Ok(RunPlan {
            population_size: self.population_size,
            iterations: self.iterations,
            pool_size,
            strategy: self.strategy,
            top_k: self.top_k.min(self.population_size),
        })
    }
}

/// Pool workers for a request of `requested` threads on `available` cores.
///
/// One slot of both budgets belongs to the orchestrator; the pool never
/// shrinks below one worker.
pub fn resolve_pool_size(requested: usize, available: usize) -> usize {
    requested
        .saturating_sub(1)
        .min(available.saturating_sub(1))
        .max(1)
}

/// Hardware threads reported by the OS (1 when unknown)
pub fn available_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(population_size: usize, workers: usize, strategy: ExecutionStrategy) -> GaConfig {
        GaConfig {
            population_size,
            iterations: 10,
            workers,
            strategy,
            seed: Some(1),
            top_k: 10,
        }
    }

    #[test]
    fn test_resolve_pool_size() {
        assert_eq!(resolve_pool_size(1, 8), 1);
        assert_eq!(resolve_pool_size(4, 8), 3);
        assert_eq!(resolve_pool_size(16, 8), 7);
        assert_eq!(resolve_pool_size(16, 1), 1);
    }

    #[test]
    fn test_validate_accepts_small_valid_run() {
        let plan = config(8, 2, ExecutionStrategy::BarrierPool).validate(4, 1.0).unwrap();

        assert_eq!(plan.pool_size, 1);
        assert_eq!(plan.population_size, 8);
        assert_eq!(plan.top_k, 8);
    }

    #[test]
    fn test_validate_rejects_bad_parameters() {
        let pool = ExecutionStrategy::BarrierPool;

        assert_eq!(config(8, 0, pool).validate(4, 1.0), Err(ConfigError::NoWorkers));
        assert_eq!(config(8, 2, pool).validate(1, 1.0), Err(ConfigError::TooFewCities(1)));
        assert_eq!(config(8, 2, pool).validate(4, 0.0), Err(ConfigError::DegenerateDistances));
        assert_eq!(
            config(1, 2, pool).validate(4, 1.0),
            Err(ConfigError::PopulationTooSmall { population_size: 1, minimum: 2, workers: 1 })
        );
    }

    #[test]
    fn test_population_must_cover_every_worker() {
        let workers = available_parallelism() + 1;
        let pool_size = resolve_pool_size(workers, available_parallelism());
        let result = config(2 * pool_size - 1, workers, ExecutionStrategy::ParallelFor).validate(4, 1.0);

        assert_eq!(
            result,
            Err(ConfigError::PopulationTooSmall {
                population_size: 2 * pool_size - 1,
                minimum: 2 * pool_size,
                workers: pool_size,
            })
        );
    }

    #[test]
    fn test_sequential_ignores_worker_budget() {
        let plan = config(2, 64, ExecutionStrategy::Sequential).validate(3, 1.0).unwrap();
        assert_eq!(plan.pool_size, 1);
    }
}
