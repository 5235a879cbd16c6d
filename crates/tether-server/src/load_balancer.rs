use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Weighted random selection among instance names.
///
/// Each name occupies `weight + 1` slots in a working set, so a weight of 0
/// still yields one slot and a weight of 2 yields three. A draw picks a
/// slot uniformly and removes it (sampling without replacement within a
/// cycle); once the working set is exhausted it is refilled from the
/// weights.
///
/// Not synchronised; the owner guards it.
pub struct WeightTable {
    weights: Vec<(String, u32)>,
    working_set: Vec<String>,
    rng: StdRng,
}

impl WeightTable {
    /// Create a table from `(name, weight)` pairs
    pub fn new(weights: Vec<(String, u32)>) -> Self {
        Self::with_rng(weights, StdRng::from_entropy())
    }

    /// Create a table with a reproducible draw sequence
    pub fn with_seed(weights: Vec<(String, u32)>, seed: u64) -> Self {
        Self::with_rng(weights, StdRng::seed_from_u64(seed))
    }

    fn with_rng(weights: Vec<(String, u32)>, rng: StdRng) -> Self {
        let mut table = Self {
            weights,
            working_set: Vec::new(),
            rng,
        };
        table.reload();
        table
    }

    fn reload(&mut self) {
        for (name, weight) in &self.weights {
            for _ in 0..=*weight {
                self.working_set.push(name.clone());
            }
        }
    }

    /// Draw the next instance name; `None` only when there are no names
    pub fn next(&mut self) -> Option<String> {
        if self.working_set.is_empty() {
            self.reload();
        }
        if self.working_set.is_empty() {
            return None;
        }
        let idx = self.rng.gen_range(0..self.working_set.len());
        Some(self.working_set.swap_remove(idx))
    }

    /// Slots left before the next refill
    pub fn remaining(&self) -> usize {
        self.working_set.len()
    }

    /// Slots in a full cycle
    pub fn cycle_len(&self) -> usize {
        self.weights.iter().map(|(_, w)| *w as usize + 1).sum()
    }

    /// Get list of all names
    pub fn names(&self) -> Vec<String> {
        self.weights.iter().map(|(name, _)| name.clone()).collect()
    }
}
