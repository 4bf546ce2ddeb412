//! Selection, crossover and mutation operators.
//!
//! Every operator takes its randomness as an explicit `rng` argument so each
//! worker can drive them from its own independent stream.

use rand::Rng;

use crate::tour::Tour;

/// Fitness-proportional (roulette wheel) mate selection over a sorted,
/// normalized population.
///
/// The wheel excludes the parent's own slice: the draw is taken over the
/// remaining weight, so a distinct mate is always returned.
#[derive(Debug, Clone)]
pub struct SelectionSampler {
    cumulative: Vec<f64>,
}

impl SelectionSampler {
    /// Build the wheel from selection weights in population order
    pub fn new(weights: &[f64]) -> Self {
        let mut sum = 0.0;
        let cumulative = weights.iter()
            .map(|&w| {
                sum += w;
                sum
            })
            .collect();

        SelectionSampler { cumulative }
    }

    /// Sum of all weights
    pub fn total(&self) -> f64 {
        self.cumulative.last().copied().unwrap_or(0.0)
    }

    /// Weight of individual `i`
    pub fn weight(&self, i: usize) -> f64 {
        let before = if i == 0 { 0.0 } else { self.cumulative[i - 1] };
        self.cumulative[i] - before
    }

    /// Draw a mate for `parent`, never `parent` itself.
    ///
    /// Requires at least two individuals. When rounding leaves the draw past
    /// the end of the wheel, the last individual other than `parent` wins.
    pub fn select_mate<R: Rng + ?Sized>(&self, parent: usize, rng: &mut R) -> usize {
        let n = self.cumulative.len();
        debug_assert!(n >= 2 && parent < n);

        let own = self.weight(parent);
        let r = rng.gen::<f64>() * (self.total() - own);

        let j = self.cumulative[..parent].partition_point(|&c| c <= r);
        if j < parent {
            return j;
        }

        // past the parent every running sum carries its slice
        let shifted = r + own;
        let k = parent + 1 + self.cumulative[parent + 1..].partition_point(|&c| c <= shifted);
        if k < n {
            k
        } else if parent == n - 1 {
            n - 2
        } else {
            n - 1
        }
    }
}

/// Cut point for [`order_crossover`], uniform in `[1, n-1)` (1 when `n == 2`)
pub fn random_cut<R: Rng + ?Sized>(n: usize, rng: &mut R) -> usize {
    if n > 2 {
        rng.gen_range(1..n - 1)
    } else {
        n.min(1)
    }
}

/// Order-preserving crossover.
///
/// `child[..cut]` is copied from `first`. Each later position `k` takes
/// `second[k]` when that gene is still unused, otherwise the earliest unused
/// gene of `second`. The repair cursor only moves forward: everything it has
/// passed is already in the child, so it finds the same gene a scan from
/// position 0 would.
///
/// # Panics
/// Panics if the slices differ in length or the parents are not permutations
/// of the same id set.
pub fn order_crossover(first: &[usize], second: &[usize], cut: usize, child: &mut [usize]) {
    let n = first.len();
    assert_eq!(second.len(), n, "parents must have equal length");
    assert_eq!(child.len(), n, "child must match parent length");

    let cut = cut.min(n);
    let mut used = vec![false; n + 1];

    child[..cut].copy_from_slice(&first[..cut]);
    for &gene in &first[..cut] {
        used[gene] = true;
    }

    let mut cursor = 0;
    for k in cut..n {
        let mut gene = second[k];
        if used[gene] {
            while used[second[cursor]] {
                cursor += 1;
            }
            debug_assert!(cursor < k);
            gene = second[cursor];
        }
        child[k] = gene;
        used[gene] = true;
    }
}

/// Breed one child of `population[parent]` into `child`.
///
/// The child's cached fitness is left stale; the fitness phase refreshes it.
pub fn breed_child<R: Rng + ?Sized>(
    population: &[Tour],
    sampler: &SelectionSampler,
    parent: usize,
    child: &mut Tour,
    rng: &mut R,
) {
    let mate = sampler.select_mate(parent, rng);
    let first = &population[parent].path;
    let n = first.len();
    let cut = random_cut(n, rng);

    child.path.resize(n, 0);
    order_crossover(first, &population[mate].path, cut, &mut child.path);
}

/// Swap two uniformly chosen positions of `tour` (possibly the same one)
pub fn swap_genes<R: Rng + ?Sized>(tour: &mut Tour, rng: &mut R) {
    let n = tour.path.len();
    if n < 2 {
        return;
    }
    let i = rng.gen_range(0..n);
    let j = rng.gen_range(0..n);
    tour.path.swap(i, j);
}

/// Apply `P/10` swap mutations to tours drawn from the non-elite range
/// `[P/4, P)`. Cached fitness values are not refreshed.
///
/// Returns the number of swaps performed.
pub fn mutate_population<R: Rng + ?Sized>(population: &mut [Tour], rng: &mut R) -> usize {
    let size = population.len();
    let elite = size / 4;
    let swaps = size / 10;

    for _ in 0..swaps {
        let k = rng.gen_range(elite..size);
        swap_genes(&mut population[k], rng);
    }

    swaps
}
