//! Tour (chromosome) representation for the GA.
//!
//! A tour is a permutation of the 1-based city ids `1..=N` describing a closed
//! route. Its `fitness` is a cache of `1 / cycle_length` and is only refreshed
//! by [`Tour::evaluate`]; writing to `path` does not invalidate it.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::TourError;
use crate::instance::DistanceMatrix;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tour {
    /// City ids in visiting order (1-based)
    pub path: Vec<usize>,
    /// Cached `1 / cycle_length`, stale after any write to `path`
    pub fitness: f64,
}

impl Tour {
    /// The tour `1, 2, ..., n` with no cached fitness
    pub fn identity(n: usize) -> Self {
        Tour {
            path: (1..=n).collect(),
            fitness: 0.0,
        }
    }

    /// A uniformly shuffled permutation of `1..=n`
    pub fn random<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Self {
        let mut tour = Self::identity(n);
        tour.path.shuffle(rng);
        tour
    }

    /// Number of cities in the tour
    pub fn len(&self) -> usize {
        self.path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }

    /// Closed tour length, including the edge back to the first city
    pub fn cycle_length(&self, matrix: &DistanceMatrix) -> f64 {
        let n = self.path.len();
        if n < 2 {
            return 0.0;
        }

        let mut length = 0.0;
        for i in 0..n - 1 {
            length += matrix.distance(self.path[i] - 1, self.path[i + 1] - 1);
        }
        length += matrix.distance(self.path[n - 1] - 1, self.path[0] - 1);

        length
    }

    /// Recompute and cache the fitness `1 / cycle_length`
    pub fn evaluate(&mut self, matrix: &DistanceMatrix) -> Result<f64, TourError> {
        let dimension = matrix.dimension();
        if let Some((position, &gene)) = self.path.iter()
            .enumerate()
            .find(|&(_, &g)| g == 0 || g > dimension)
        {
            return Err(TourError::GeneOutOfRange { gene, position, dimension });
        }

        let length = self.cycle_length(matrix);
        if !(length > 0.0 && length.is_finite()) {
            return Err(TourError::NonPositiveLength(length));
        }

        self.fitness = 1.0 / length;
        Ok(self.fitness)
    }

    /// Check that every id in `1..=len` appears exactly once
    pub fn is_permutation(&self) -> bool {
        let n = self.path.len();
        let mut seen = vec![false; n + 1];
        self.path.iter().all(|&g| {
            if g == 0 || g > n || seen[g] {
                return false;
            }
            seen[g] = true;
            true
        })
    }
}

impl std::fmt::Display for Tour {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, city) in self.path.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", city)?;
        }
        Ok(())
    }
}
