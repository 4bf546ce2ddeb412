//! Error types for the GA-TSP solver.
//!
//! Dataset problems surface as [`ParseError`], bad run parameters as
//! [`ConfigError`]; both are raised before any worker thread exists.
//! [`EngineError`] is what the engine hands back to callers.

use thiserror::Error;

/// Failure while reading a TSPLIB-style dataset
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("cannot read dataset: {0}")]
    Io(#[from] std::io::Error),

    #[error("missing DIMENSION header")]
    MissingDimension,

    #[error("invalid DIMENSION value '{0}'")]
    InvalidDimension(String),

    #[error("missing NODE_COORD_SECTION")]
    MissingCoordSection,

    #[error("line {line}: malformed coordinate entry '{content}'")]
    InvalidCoordinate { line: usize, content: String },

    #[error("node id {id} outside 1..={dimension}")]
    NodeOutOfRange { id: usize, dimension: usize },

    #[error("node id {0} listed twice")]
    DuplicateNode(usize),

    #[error("expected {expected} coordinates, found {found}")]
    MissingNodes { expected: usize, found: usize },
}

/// Run parameters that cannot drive a valid generation loop
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("worker count must be at least 1")]
    NoWorkers,

    #[error("dataset has {0} cities, at least 2 are required")]
    TooFewCities(usize),

    #[error("every pairwise distance is zero, tour fitness is undefined")]
    DegenerateDistances,

    #[error("population size {population_size} is too small, need at least {minimum} for {workers} worker(s)")]
    PopulationTooSmall {
        population_size: usize,
        minimum: usize,
        workers: usize,
    },
}

/// A tour that cannot be evaluated against the distance matrix
#[derive(Debug, Error, PartialEq)]
pub enum TourError {
    #[error("gene {gene} at position {position} is outside 1..={dimension}")]
    GeneOutOfRange {
        gene: usize,
        position: usize,
        dimension: usize,
    },

    #[error("tour length {0} is not a positive finite number")]
    NonPositiveLength(f64),
}

/// Top-level error of a GA run
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Tour(#[from] TourError),

    #[error("worker {worker} failed: {message}")]
    WorkerFailure { worker: usize, message: String },

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("generation aborted: another participant left the rendezvous")]
    Aborted,
}
