//! The three ways of executing a generation.
//!
//! - [`run_sequential`]: every step on the calling thread.
//! - [`run_barrier_pool`]: persistent workers stepped by a [`PhaseCoordinator`].
//! - [`run_parallel_for`]: one rayon parallel loop per phase, the join acting
//!   as the barrier.
//!
//! All three initialize the population, sort it once, then run the same
//! BREED, COMMIT, mutate, FITNESS, sort/normalize sequence per generation.
//! Randomness comes from ChaCha8 streams of a single seed: stream 0 belongs
//! to the orchestrator, stream `1 + w` to pool worker `w`, and parallel-for
//! items get a stream derived from the generation and their index.

use std::panic::{self, AssertUnwindSafe};
use std::thread;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::config::RunPlan;
use crate::error::{EngineError, TourError};
use crate::genetic::coordinator::{panic_message, Phase, PhaseCoordinator, PhaseProgram, Window};
use crate::genetic::operators::{breed_child, mutate_population, SelectionSampler};
use crate::genetic::population::{offspring_range, randomize, sort_and_normalize, Population, WorkerPartition};
use crate::genetic::shared::SharedSlice;
use crate::instance::DistanceMatrix;
use crate::tour::Tour;

const ORCHESTRATOR_STREAM: u64 = 0;

/// Snapshot handed to observers after every sort/normalize step.
///
/// Generation 0 is the freshly initialized population.
#[derive(Debug, Clone, Copy)]
pub struct GenerationView<'a> {
    pub generation: usize,
    pub tours: &'a [Tour],
    pub weights: &'a [f64],
}

/// Everything an executor needs besides the buffers it mutates
#[derive(Debug, Clone, Copy)]
pub struct RunContext<'a> {
    pub matrix: &'a DistanceMatrix,
    pub plan: &'a RunPlan,
    pub seed: u64,
}

pub type Observer<'o> = dyn FnMut(&GenerationView<'_>) + 'o;

fn stream_rng(seed: u64, stream: u64) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(stream);
    rng
}

fn worker_stream(worker: usize) -> u64 {
    1 + worker as u64
}

/// Stream of one parallel-for item; round 0 is initialization
fn item_stream(round: usize, index: usize) -> u64 {
    ((round as u64 + 1) << 32) | index as u64
}

fn observe(observer: &mut Observer<'_>, generation: usize, population: &Population) {
    observer(&GenerationView {
        generation,
        tours: &population.tours,
        weights: &population.weights,
    });
}

fn commit_children(tours: &mut [Tour], children: &[Tour]) {
    let offspring = offspring_range(tours.len());
    for (slot, child) in tours[offspring].iter_mut().zip(children) {
        slot.clone_from(child);
    }
}

fn refresh_offspring(tours: &mut [Tour], matrix: &DistanceMatrix) -> Result<(), TourError> {
    let offspring = offspring_range(tours.len());
    for tour in &mut tours[offspring] {
        tour.evaluate(matrix)?;
    }
    Ok(())
}

/// Single-threaded reference executor
pub fn run_sequential(
    ctx: &RunContext<'_>,
    population: &mut Population,
    children: &mut [Tour],
    observer: &mut Observer<'_>,
) -> Result<(), EngineError> {
    let mut rng = stream_rng(ctx.seed, ORCHESTRATOR_STREAM);

    randomize(&mut population.tours, ctx.matrix, &mut rng)?;
    population.sort_and_normalize();
    observe(observer, 0, population);

    for generation in 0..ctx.plan.iterations {
        let sampler = SelectionSampler::new(&population.weights);
        for (parent, child) in children.iter_mut().enumerate() {
            breed_child(&population.tours, &sampler, parent, child, &mut rng);
        }
        commit_children(&mut population.tours, children);
        mutate_population(&mut population.tours, &mut rng);
        refresh_offspring(&mut population.tours, ctx.matrix)?;
        population.sort_and_normalize();
        observe(observer, generation + 1, population);
    }

    Ok(())
}

/// Run one parallel-for item, reporting a panic as a failure of the rayon
/// thread that ran it
fn contain<F>(body: F) -> Result<(), EngineError>
where
    F: FnOnce() -> Result<(), EngineError>,
{
    panic::catch_unwind(AssertUnwindSafe(body)).unwrap_or_else(|payload| {
        let worker = rayon::current_thread_index().unwrap_or(0);
        let message = panic_message(payload.as_ref());
        log::error!("rayon worker {} panicked: {}", worker, message);
        Err(EngineError::WorkerFailure { worker, message })
    })
}

/// Task-parallel executor: each phase is a rayon loop over independent indices
pub fn run_parallel_for(
    ctx: &RunContext<'_>,
    population: &mut Population,
    children: &mut [Tour],
    observer: &mut Observer<'_>,
) -> Result<(), EngineError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(ctx.plan.pool_size)
        .thread_name(|i| format!("ga-rayon-{i}"))
        .build()?;
    let matrix = ctx.matrix;
    let seed = ctx.seed;
    let mut rng = stream_rng(seed, ORCHESTRATOR_STREAM);

    pool.install(|| {
        population.tours.par_iter_mut().enumerate().try_for_each(|(i, tour)| {
            contain(|| {
                let mut rng = stream_rng(seed, item_stream(0, i));
                *tour = Tour::random(matrix.dimension(), &mut rng);
                tour.evaluate(matrix)?;
                Ok(())
            })
        })
    })?;
    population.sort_and_normalize();
    observe(observer, 0, population);

    let offspring = offspring_range(population.len());
    for generation in 0..ctx.plan.iterations {
        let sampler = SelectionSampler::new(&population.weights);
        let tours = &population.tours;
        pool.install(|| {
            children.par_iter_mut().enumerate().try_for_each(|(parent, child)| {
                contain(|| {
                    let mut rng = stream_rng(seed, item_stream(generation + 1, parent));
                    breed_child(tours, &sampler, parent, child, &mut rng);
                    Ok(())
                })
            })
        })?;

        let slots = &mut population.tours[offspring.clone()];
        pool.install(|| {
            slots.par_iter_mut().zip(children.par_iter()).try_for_each(|(slot, child)| {
                contain(|| {
                    slot.clone_from(child);
                    Ok(())
                })
            })
        })?;

        mutate_population(&mut population.tours, &mut rng);

        let slots = &mut population.tours[offspring.clone()];
        pool.install(|| {
            slots.par_iter_mut().try_for_each(|tour| {
                contain(|| {
                    tour.evaluate(matrix)?;
                    Ok(())
                })
            })
        })?;

        population.sort_and_normalize();
        observe(observer, generation + 1, population);
    }

    Ok(())
}

/// State owned by one pool worker for the whole run
#[derive(Debug)]
pub struct PoolWorker {
    pub id: usize,
    /// Slice of the population this worker initializes
    pub partition: WorkerPartition,
    /// Slice of the child buffer (and of the offspring slots) it breeds,
    /// commits and re-evaluates
    pub breeding: WorkerPartition,
    rng: ChaCha8Rng,
}

impl PoolWorker {
    fn new(id: usize, partition: WorkerPartition, seed: u64) -> Self {
        PoolWorker {
            id,
            partition,
            breeding: partition.halved(),
            rng: stream_rng(seed, worker_stream(id)),
        }
    }
}

/// Shared buffers of the barrier-pool run
struct PoolProgram<'a> {
    tours: SharedSlice<'a, Tour>,
    weights: SharedSlice<'a, f64>,
    children: SharedSlice<'a, Tour>,
    matrix: &'a DistanceMatrix,
    /// First offspring slot of the population
    offset: usize,
}

impl PhaseProgram for PoolProgram<'_> {
    type Worker = PoolWorker;

    fn run_phase(&self, phase: Phase, worker: &mut PoolWorker) -> Result<(), EngineError> {
        let own = worker.breeding.range();
        let slots = self.offset + own.start..self.offset + own.end;

        match phase {
            Phase::Breed => {
                // SAFETY: nobody writes the population or the weights during
                // BREED; child ranges of different workers are disjoint.
                let (tours, weights, children) = unsafe {
                    (self.tours.as_slice(), self.weights.as_slice(), self.children.slice_mut(own.clone()))
                };
                let sampler = SelectionSampler::new(weights);
                for (child, parent) in children.iter_mut().zip(own) {
                    breed_child(tours, &sampler, parent, child, &mut worker.rng);
                }
            }
            Phase::Commit => {
                // SAFETY: each worker reads its own child range and writes its
                // own offspring slots; nothing else touches either during COMMIT.
                let (children, slots) = unsafe { (self.children.slice(own), self.tours.slice_mut(slots)) };
                for (slot, child) in slots.iter_mut().zip(children) {
                    slot.clone_from(child);
                }
            }
            Phase::Fitness => {
                // SAFETY: offspring slot ranges of different workers are disjoint.
                let slots = unsafe { self.tours.slice_mut(slots) };
                for tour in slots {
                    tour.evaluate(self.matrix)?;
                }
            }
        }

        Ok(())
    }
}

/// Randomize each worker's partition on its own scoped thread
fn initialize_partitioned(
    tours: &mut [Tour],
    workers: &mut [PoolWorker],
    matrix: &DistanceMatrix,
) -> Result<(), EngineError> {
    thread::scope(|scope| {
        let mut rest = tours;
        let mut handles = Vec::with_capacity(workers.len());
        let mut spawn_error = None;

        for worker in workers.iter_mut() {
            let (chunk, tail) = std::mem::take(&mut rest).split_at_mut(worker.partition.len());
            rest = tail;
            let spawned = thread::Builder::new()
                .name(format!("ga-init-{}", worker.id))
                .spawn_scoped(scope, move || randomize(chunk, matrix, &mut worker.rng));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    spawn_error = Some(EngineError::Spawn(e));
                    break;
                }
            }
        }

        let mut failure = spawn_error;
        for (id, handle) in handles.into_iter().enumerate() {
            let error = match handle.join() {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => EngineError::WorkerFailure { worker: id, message: e.to_string() },
                Err(payload) => EngineError::WorkerFailure { worker: id, message: panic_message(payload.as_ref()) },
            };
            failure.get_or_insert(error);
        }

        failure.map_or(Ok(()), Err)
    })
}

/// Persistent-pool executor: workers live for the whole run and step through
/// the phases behind gated barriers
pub fn run_barrier_pool(
    ctx: &RunContext<'_>,
    population: &mut Population,
    children: &mut [Tour],
    observer: &mut Observer<'_>,
) -> Result<(), EngineError> {
    let mut workers: Vec<PoolWorker> = WorkerPartition::split(population.len(), ctx.plan.pool_size)
        .into_iter()
        .enumerate()
        .map(|(id, partition)| PoolWorker::new(id, partition, ctx.seed))
        .collect();

    initialize_partitioned(&mut population.tours, &mut workers, ctx.matrix)?;
    population.sort_and_normalize();
    observe(observer, 0, population);

    let mut rng = stream_rng(ctx.seed, ORCHESTRATOR_STREAM);
    let offset = offspring_range(population.len()).start;
    let program = PoolProgram {
        tours: SharedSlice::new(&mut population.tours),
        weights: SharedSlice::new(&mut population.weights),
        children: SharedSlice::new(children),
        matrix: ctx.matrix,
        offset,
    };

    let coordinator = PhaseCoordinator::new(workers.len());
    coordinator.run(&program, workers, ctx.plan.iterations, |window, generation| {
        match window {
            Window::Mutate => {
                // SAFETY: every worker is parked on the closed FITNESS gate.
                let tours = unsafe { program.tours.as_mut_slice() };
                mutate_population(tours, &mut rng);
            }
            Window::SortAndNormalize => {
                // SAFETY: every worker is parked on the next BREED gate or done.
                let (tours, weights) = unsafe { (program.tours.as_mut_slice(), program.weights.as_mut_slice()) };
                sort_and_normalize(tours, weights);
                observer(&GenerationView { generation: generation + 1, tours, weights });
            }
        }
        Ok(())
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExecutionStrategy;
    use crate::genetic::population::offspring_count;
    use crate::instance::City;
    use std::collections::HashSet;
    use std::sync::mpsc;
    use std::time::Duration;

    fn circle(n: usize) -> DistanceMatrix {
        let cities: Vec<City> = (0..n)
            .map(|i| {
                let angle = i as f64 * std::f64::consts::TAU / n as f64;
                City::new(i + 1, 10.0 * angle.cos(), 10.0 * angle.sin())
            })
            .collect();
        DistanceMatrix::from_cities(&cities)
    }

    fn plan(strategy: ExecutionStrategy, population_size: usize, iterations: usize, pool_size: usize) -> RunPlan {
        RunPlan { population_size, iterations, pool_size, strategy, top_k: 10 }
    }

    type Runner = fn(&RunContext<'_>, &mut Population, &mut [Tour], &mut Observer<'_>) -> Result<(), EngineError>;

    fn runner(strategy: ExecutionStrategy) -> Runner {
        match strategy {
            ExecutionStrategy::Sequential => run_sequential,
            ExecutionStrategy::BarrierPool => run_barrier_pool,
            ExecutionStrategy::ParallelFor => run_parallel_for,
        }
    }

    /// Run and check the population invariants at every generation boundary
    fn run_checked(strategy: ExecutionStrategy, population_size: usize, pool_size: usize, seed: u64) -> Population {
        let n = 9;
        let matrix = circle(n);
        let plan = plan(strategy, population_size, 15, pool_size);
        let ctx = RunContext { matrix: &matrix, plan: &plan, seed };
        let mut population = Population::new(population_size, n);
        let mut children = vec![Tour::identity(n); offspring_count(population_size)];
        let mut generations = Vec::new();

        runner(strategy)(&ctx, &mut population, &mut children, &mut |view: &GenerationView<'_>| {
            generations.push(view.generation);
            assert_eq!(view.tours.len(), population_size);
            assert!(view.tours.iter().all(|t| t.len() == n && t.is_permutation()));

            let sum: f64 = view.weights.iter().sum();
            assert!((sum - 1.0).abs() < 1e-9);
            for i in 1..view.tours.len() {
                assert!(view.tours[i - 1].fitness >= view.tours[i].fitness);
            }
            if view.generation == 0 {
                for tour in view.tours {
                    assert!((tour.fitness - 1.0 / tour.cycle_length(&matrix)).abs() < 1e-12);
                }
            } else {
                assert!(view.tours.iter().all(|t| t.fitness > 0.0));
            }
        })
        .unwrap();

        assert_eq!(generations, (0..=15).collect::<Vec<_>>());
        population
    }

    #[test]
    fn test_sequential_keeps_invariants() {
        run_checked(ExecutionStrategy::Sequential, 40, 1, 1);
    }

    #[test]
    fn test_barrier_pool_keeps_invariants() {
        run_checked(ExecutionStrategy::BarrierPool, 40, 1, 2);
        run_checked(ExecutionStrategy::BarrierPool, 43, 3, 3);
        run_checked(ExecutionStrategy::BarrierPool, 8, 4, 4);
    }

    #[test]
    fn test_parallel_for_keeps_invariants() {
        run_checked(ExecutionStrategy::ParallelFor, 40, 2, 5);
        run_checked(ExecutionStrategy::ParallelFor, 21, 4, 6);
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        for strategy in [ExecutionStrategy::Sequential, ExecutionStrategy::BarrierPool, ExecutionStrategy::ParallelFor] {
            let first = run_checked(strategy, 30, 3, 77);
            let second = run_checked(strategy, 30, 3, 77);
            assert_eq!(first.tours, second.tours, "{}", strategy);
        }
    }

    fn run_observed(
        strategy: ExecutionStrategy,
        matrix: &DistanceMatrix,
        population_size: usize,
        iterations: usize,
        observer: &mut Observer<'_>,
    ) -> Result<Population, EngineError> {
        let n = matrix.dimension();
        let plan = plan(strategy, population_size, iterations, 2);
        let ctx = RunContext { matrix, plan: &plan, seed: 9 };
        let mut population = Population::new(population_size, n);
        let mut children = vec![Tour::identity(n); offspring_count(population_size)];

        runner(strategy)(&ctx, &mut population, &mut children, observer)?;
        Ok(population)
    }

    #[test]
    fn test_evolution_shortens_best_tour() {
        let matrix = circle(12);
        for strategy in [ExecutionStrategy::Sequential, ExecutionStrategy::BarrierPool, ExecutionStrategy::ParallelFor] {
            let mut initial_best = 0.0;
            let population = run_observed(strategy, &matrix, 60, 80, &mut |view: &GenerationView<'_>| {
                if view.generation == 0 {
                    initial_best = view.tours[0].cycle_length(&matrix);
                }
            })
            .unwrap();

            let best = population.tours.iter().map(|t| t.cycle_length(&matrix)).fold(f64::INFINITY, f64::min);
            assert!(best < initial_best - 1e-9, "{}: {} vs {}", strategy, best, initial_best);
        }
    }

    #[test]
    fn test_offspring_are_new_tours() {
        // below ten tours nothing is mutated, so new paths can only come from crossover
        let matrix = circle(12);
        for strategy in [ExecutionStrategy::Sequential, ExecutionStrategy::BarrierPool, ExecutionStrategy::ParallelFor] {
            let mut founders = HashSet::new();
            let mut novel = 0;
            run_observed(strategy, &matrix, 8, 1, &mut |view: &GenerationView<'_>| {
                if view.generation == 0 {
                    founders.extend(view.tours.iter().map(|t| t.path.clone()));
                } else {
                    novel = view.tours.iter().filter(|t| !founders.contains(&t.path)).count();
                }
            })
            .unwrap();

            assert_eq!(founders.len(), 8);
            assert!(novel > 0, "{}: no offspring differs from its parents", strategy);
        }
    }

    #[test]
    fn test_observer_panic_does_not_hang_barrier_pool() {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let matrix = circle(9);
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                run_observed(ExecutionStrategy::BarrierPool, &matrix, 24, 20, &mut |view: &GenerationView<'_>| {
                    if view.generation == 3 {
                        panic!("observer fault");
                    }
                })
            }));
            let _ = tx.send(outcome.is_err());
        });

        assert_eq!(rx.recv_timeout(Duration::from_secs(10)), Ok(true));
    }

    #[test]
    fn test_parallel_for_panic_becomes_worker_failure() {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap();
        let mut items = vec![0usize; 32];

        let result = pool.install(|| {
            items.par_iter_mut().enumerate().try_for_each(|(i, item)| {
                contain(|| {
                    if i == 17 {
                        panic!("item fault");
                    }
                    *item = i;
                    Ok(())
                })
            })
        });

        match result {
            Err(EngineError::WorkerFailure { worker, message }) => {
                assert!(worker < 2);
                assert_eq!(message, "item fault");
            }
            other => panic!("expected worker failure, got {:?}", other),
        }
    }
}
