//! GA TSP Solver Library
//!
//! A phased parallel genetic algorithm for the symmetric Euclidean Traveling
//! Salesman Problem.
//!
//! # Features
//!
//! - TSPLIB `NODE_COORD_SECTION` parsing into a dense distance matrix
//! - Roulette-wheel selection, order crossover and elite-preserving swap mutation
//! - Three interchangeable executors: sequential, a persistent worker pool
//!   stepped through gated barriers, and rayon parallel-for loops
//! - Seeded, reproducible runs and JSON-serializable reports
//!
//! # Example
//!
//! ```no_run
//! use ga_tsp_solver::config::{ExecutionStrategy, GaConfig};
//! use ga_tsp_solver::genetic::GeneticAlgorithm;
//! use ga_tsp_solver::instance::TspInstance;
//!
//! let instance = TspInstance::from_file("berlin52.tsp").unwrap();
//! let config = GaConfig {
//!     population_size: 200,
//!     iterations: 500,
//!     workers: 4,
//!     strategy: ExecutionStrategy::BarrierPool,
//!     seed: Some(42),
//!     top_k: 10,
//! };
//!
//! let report = GeneticAlgorithm::new(instance, config).unwrap().run().unwrap();
//! for tour in &report.tours {
//!     println!("{}", tour);
//! }
//! ```

pub mod config;
pub mod error;
pub mod genetic;
pub mod instance;
pub mod tour;

pub use config::{ExecutionStrategy, GaConfig};
pub use error::EngineError;
pub use genetic::{GeneticAlgorithm, RunReport};
pub use instance::TspInstance;
pub use tour::Tour;
