//! Population storage, worker partitions and the sort/normalize step.

use std::ops::Range;

use ordered_float::OrderedFloat;
use rand::Rng;

use crate::error::TourError;
use crate::instance::DistanceMatrix;
use crate::tour::Tour;

/// Contiguous `[start, end)` slice of indices owned by one worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPartition {
    pub start: usize,
    pub end: usize,
}

impl WorkerPartition {
    /// Split `0..size` into `workers` contiguous ranges whose lengths differ by
    /// at most one; the first `size % workers` ranges get the extra index.
    pub fn split(size: usize, workers: usize) -> Vec<WorkerPartition> {
        assert!(workers > 0, "at least one worker is required");

        let base = size / workers;
        let remainder = size % workers;
        let mut start = 0;

        (0..workers)
            .map(|w| {
                let end = start + base + usize::from(w < remainder);
                let partition = WorkerPartition { start, end };
                start = end;
                partition
            })
            .collect()
    }

    /// The same partition with both bounds halved, used over the child buffer
    pub fn halved(&self) -> WorkerPartition {
        WorkerPartition {
            start: self.start / 2,
            end: self.end / 2,
        }
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

/// The evolving set of tours.
///
/// After [`Population::sort_and_normalize`], `tours` is ordered by fitness,
/// best first, and `weights[i]` is tour `i`'s share of the total fitness.
#[derive(Debug, Clone)]
pub struct Population {
    pub tours: Vec<Tour>,
    pub weights: Vec<f64>,
}

impl Population {
    /// `size` tours of `n` cities, each initialized to the identity path
    pub fn new(size: usize, n: usize) -> Self {
        Population {
            tours: vec![Tour::identity(n); size],
            weights: vec![0.0; size],
        }
    }

    /// `size` evaluated random tours drawn from `rng`
    pub fn random<R: Rng + ?Sized>(size: usize, matrix: &DistanceMatrix, rng: &mut R) -> Result<Self, TourError> {
        let mut population = Self::new(size, matrix.dimension());
        randomize(&mut population.tours, matrix, rng)?;
        Ok(population)
    }

    pub fn len(&self) -> usize {
        self.tours.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tours.is_empty()
    }

    /// Slots replaced by children each generation: the lowest-fitness `P/2`
    pub fn offspring_range(&self) -> Range<usize> {
        offspring_range(self.len())
    }

    pub fn sort_and_normalize(&mut self) {
        sort_and_normalize(&mut self.tours, &mut self.weights);
    }

    /// The first `k` tours (the best `k` once sorted)
    pub fn top(&self, k: usize) -> &[Tour] {
        &self.tours[..k.min(self.tours.len())]
    }
}

/// Number of children bred per generation
pub fn offspring_count(population_size: usize) -> usize {
    population_size / 2
}

/// `[P - P/2, P)`
pub fn offspring_range(population_size: usize) -> Range<usize> {
    population_size - offspring_count(population_size)..population_size
}

/// Fill `tours` with evaluated random permutations
pub fn randomize<R: Rng + ?Sized>(tours: &mut [Tour], matrix: &DistanceMatrix, rng: &mut R) -> Result<(), TourError> {
    for tour in tours.iter_mut() {
        *tour = Tour::random(matrix.dimension(), rng);
        tour.evaluate(matrix)?;
    }
    Ok(())
}

/// Sort `tours` by fitness, best first, and write each tour's share of the
/// total fitness into `weights`
pub fn sort_and_normalize(tours: &mut [Tour], weights: &mut [f64]) {
    debug_assert_eq!(tours.len(), weights.len());

    tours.sort_by_key(|tour| OrderedFloat(-tour.fitness));

    let total: f64 = tours.iter().map(|t| t.fitness).sum();
    for (weight, tour) in weights.iter_mut().zip(tours.iter()) {
        *weight = if total > 0.0 { tour.fitness / total } else { 0.0 };
    }
}
