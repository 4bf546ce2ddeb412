//! Top-level generation loop: validate, initialize, evolve, report.

use std::time::Instant;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::config::{ExecutionStrategy, GaConfig, RunPlan};
use crate::error::EngineError;
use crate::genetic::executor::{self, GenerationView, RunContext};
use crate::genetic::population::{offspring_count, Population};
use crate::instance::TspInstance;
use crate::tour::Tour;

/// One reported tour, ranked by cached fitness
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedTour {
    /// 1-based rank in the final population
    pub rank: usize,
    /// City ids in visiting order (1-based)
    pub path: Vec<usize>,
    /// Closed tour length recomputed from the path
    pub length: f64,
    /// Cached fitness the population was sorted by
    pub fitness: f64,
}

impl std::fmt::Display for RankedTour {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cities: Vec<String> = self.path.iter().map(|c| c.to_string()).collect();
        write!(f, "{} - {}", cities.join(", "), self.length)
    }
}

/// Outcome of a complete run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Instance name
    pub instance: String,
    pub strategy: ExecutionStrategy,
    /// Pool workers used beside the orchestrator
    pub workers: usize,
    pub seed: u64,
    pub population_size: usize,
    pub generations: usize,
    /// Wall-clock time in seconds
    pub elapsed_secs: f64,
    /// Shortest tour in the final population
    pub best_length: f64,
    pub mean_length: f64,
    pub length_std_dev: f64,
    /// Best tours by fitness
    pub tours: Vec<RankedTour>,
}

impl RunReport {
    pub fn best(&self) -> Option<&RankedTour> {
        self.tours.first()
    }
}

/// Phased parallel genetic algorithm for the symmetric TSP
pub struct GeneticAlgorithm {
    instance: TspInstance,
    plan: RunPlan,
    seed: u64,
}

impl GeneticAlgorithm {
    /// Validate `config` against `instance`; nothing runs yet
    pub fn new(instance: TspInstance, config: GaConfig) -> Result<Self, EngineError> {
        let plan = config.validate(instance.dimension(), instance.matrix.max_distance())?;
        let seed = config.seed.unwrap_or_else(rand::random);

        Ok(GeneticAlgorithm { instance, plan, seed })
    }

    pub fn plan(&self) -> &RunPlan {
        &self.plan
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn instance(&self) -> &TspInstance {
        &self.instance
    }

    pub fn run(&self) -> Result<RunReport, EngineError> {
        self.run_with_observer(|_| {})
    }

    /// Run every generation, calling `observer` after initialization
    /// (generation 0) and after each generation's sort/normalize step
    pub fn run_with_observer<F>(&self, mut observer: F) -> Result<RunReport, EngineError>
    where
        F: FnMut(&GenerationView<'_>),
    {
        let start = Instant::now();
        let n = self.instance.dimension();
        let plan = &self.plan;

        info!(
            "GA on {} ({} cities): population {}, {} generations, strategy {}, {} workers, seed {}",
            self.instance.name, n, plan.population_size, plan.iterations, plan.strategy, plan.pool_size, self.seed
        );

        let mut population = Population::new(plan.population_size, n);
        let mut children = vec![Tour::identity(n); offspring_count(plan.population_size)];
        let ctx = RunContext {
            matrix: &self.instance.matrix,
            plan,
            seed: self.seed,
        };

        let matrix = &self.instance.matrix;
        let mut observe = |view: &GenerationView<'_>| {
            if let Some(best) = view.tours.first() {
                debug!(
                    "generation {}: best length {:.3}",
                    view.generation,
                    best.cycle_length(matrix)
                );
            }
            observer(view);
        };

        match plan.strategy {
            ExecutionStrategy::Sequential => executor::run_sequential(&ctx, &mut population, &mut children, &mut observe)?,
            ExecutionStrategy::BarrierPool => executor::run_barrier_pool(&ctx, &mut population, &mut children, &mut observe)?,
            ExecutionStrategy::ParallelFor => executor::run_parallel_for(&ctx, &mut population, &mut children, &mut observe)?,
        }

        let report = self.report(&population, start.elapsed().as_secs_f64());
        info!(
            "GA finished in {:.3}s: best length {:.3}, mean {:.3}",
            report.elapsed_secs, report.best_length, report.mean_length
        );
        Ok(report)
    }

    fn report(&self, population: &Population, elapsed_secs: f64) -> RunReport {
        let matrix = &self.instance.matrix;
        let lengths: Vec<f64> = population.tours.iter().map(|t| t.cycle_length(matrix)).collect();

        let tours = population
            .top(self.plan.top_k)
            .iter()
            .zip(&lengths)
            .enumerate()
            .map(|(i, (tour, &length))| RankedTour {
                rank: i + 1,
                path: tour.path.clone(),
                length,
                fitness: tour.fitness,
            })
            .collect();

        RunReport {
            instance: self.instance.name.clone(),
            strategy: self.plan.strategy,
            workers: self.plan.pool_size,
            seed: self.seed,
            population_size: self.plan.population_size,
            generations: self.plan.iterations,
            elapsed_secs,
            best_length: lengths.iter().cloned().fold(f64::INFINITY, f64::min),
            mean_length: lengths.iter().mean(),
            length_std_dev: lengths.iter().std_dev(),
            tours,
        }
    }
}
