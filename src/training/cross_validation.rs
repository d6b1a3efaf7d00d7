//! K-fold partitioning of row indices

use crate::error::{CvAuditError, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// A single train/held-out split
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CVSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub fold_idx: usize,
}

/// K-fold partitioner.
///
/// Without shuffling, folds are contiguous blocks in row order. When the
/// row count does not divide evenly, the earliest folds take one extra row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KFold {
    pub n_splits: usize,
    pub shuffle: bool,
    pub random_state: Option<u64>,
}

impl Default for KFold {
    fn default() -> Self {
        Self::new(5)
    }
}

impl KFold {
    pub fn new(n_splits: usize) -> Self {
        Self {
            n_splits,
            shuffle: false,
            random_state: None,
        }
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Seed for the shuffle; unseeded shuffles use seed 0
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Assign every row in `0..n_samples` to a fold
    pub fn assign(&self, n_samples: usize) -> Result<FoldAssignment> {
        let n_splits = self.n_splits;
        if n_splits < 2 {
            return Err(CvAuditError::InvalidConfiguration(format!(
                "fold count must be at least 2, got {}",
                n_splits
            )));
        }
        if n_samples < n_splits {
            return Err(CvAuditError::InvalidConfiguration(format!(
                "fold count ({}) cannot exceed the number of rows ({})",
                n_splits, n_samples
            )));
        }

        let mut indices: Vec<usize> = (0..n_samples).collect();
        if self.shuffle {
            let mut rng = ChaCha8Rng::seed_from_u64(self.random_state.unwrap_or(0));
            indices.shuffle(&mut rng);
        }

        let base = n_samples / n_splits;
        let remainder = n_samples % n_splits;

        let mut fold_ids = vec![0; n_samples];
        let mut current = 0;
        for fold_idx in 0..n_splits {
            let fold_size = if fold_idx < remainder { base + 1 } else { base };
            for &row in &indices[current..current + fold_size] {
                fold_ids[row] = fold_idx;
            }
            current += fold_size;
        }

        Ok(FoldAssignment { fold_ids, n_folds: n_splits })
    }

    /// Generate train/held-out splits in fold order
    pub fn split(&self, n_samples: usize) -> Result<Vec<CVSplit>> {
        Ok(self.assign(n_samples)?.splits())
    }
}

/// Fold id per row, each in `0..n_folds`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldAssignment {
    fold_ids: Vec<usize>,
    n_folds: usize,
}

impl FoldAssignment {
    pub fn fold_ids(&self) -> &[usize] {
        &self.fold_ids
    }

    pub fn n_folds(&self) -> usize {
        self.n_folds
    }

    pub fn n_samples(&self) -> usize {
        self.fold_ids.len()
    }

    /// Row count of each fold, indexed by fold id
    pub fn fold_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_folds];
        for &f in &self.fold_ids {
            sizes[f] += 1;
        }
        sizes
    }

    /// Rows with fold id `fold`, ascending
    pub fn held_out_indices(&self, fold: usize) -> Vec<usize> {
        self.fold_ids
            .iter()
            .enumerate()
            .filter(|(_, &f)| f == fold)
            .map(|(i, _)| i)
            .collect()
    }

    /// Rows with any other fold id, ascending
    pub fn train_indices(&self, fold: usize) -> Vec<usize> {
        self.fold_ids
            .iter()
            .enumerate()
            .filter(|(_, &f)| f != fold)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn split(&self, fold: usize) -> CVSplit {
        CVSplit {
            train_indices: self.train_indices(fold),
            test_indices: self.held_out_indices(fold),
            fold_idx: fold,
        }
    }

    pub fn splits(&self) -> Vec<CVSplit> {
        (0..self.n_folds).map(|f| self.split(f)).collect()
    }
}
