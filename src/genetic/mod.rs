//! Phased parallel genetic algorithm.
//!
//! - `operators`: roulette selection, order crossover and swap mutation
//! - `population`: tour storage, worker partitions, sort/normalize
//! - `barrier` / `coordinator`: the gated barriers stepping the worker pool
//! - `executor`: sequential, barrier-pool and parallel-for generation loops
//! - `engine`: the [`GeneticAlgorithm`] entry point and its report

pub mod barrier;
pub mod coordinator;
pub mod engine;
pub mod executor;
pub mod operators;
pub mod population;
pub mod shared;

pub use engine::{GeneticAlgorithm, RankedTour, RunReport};
pub use executor::GenerationView;
pub use population::{Population, WorkerPartition};
