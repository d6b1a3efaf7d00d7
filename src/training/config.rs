//! Evaluation configuration

use super::cross_validation::KFold;
use crate::error::{CvAuditError, Result};
use crate::metrics::{Metric, Scorer, ScoringConvention};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for a cross-validation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Number of folds (at least 2)
    pub fold_count: usize,

    /// Direction scores are reported in
    pub scoring_convention: ScoringConvention,

    /// Seed for shuffled fold assignment
    pub random_seed: Option<u64>,

    /// Shuffle rows before partitioning; contiguous blocks otherwise
    pub shuffle: bool,

    /// Run folds on the rayon pool
    pub parallel: bool,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            fold_count: 5,
            scoring_convention: ScoringConvention::HigherIsBetter,
            random_seed: None,
            shuffle: false,
            parallel: false,
        }
    }
}

impl EvaluationConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from a JSON file; missing keys take defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        Ok(config)
    }

    pub fn with_fold_count(mut self, fold_count: usize) -> Self {
        self.fold_count = fold_count;
        self
    }

    pub fn with_convention(mut self, convention: ScoringConvention) -> Self {
        self.scoring_convention = convention;
        self
    }

    /// Shuffle before partitioning, seeded for reproducibility
    pub fn with_shuffle(mut self, seed: u64) -> Self {
        self.shuffle = true;
        self.random_seed = Some(seed);
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Reject configurations that can never produce a valid run
    pub fn validate(&self) -> Result<()> {
        if self.fold_count < 2 {
            return Err(CvAuditError::InvalidConfiguration(format!(
                "fold_count must be at least 2, got {}",
                self.fold_count
            )));
        }
        Ok(())
    }

    /// Partitioner described by this configuration
    pub fn partitioner(&self) -> KFold {
        let kfold = KFold::new(self.fold_count).with_shuffle(self.shuffle);
        match self.random_seed {
            Some(seed) => kfold.with_random_state(seed),
            None => kfold,
        }
    }

    /// Bind a metric to this configuration's convention
    pub fn scorer(&self, metric: Metric) -> Scorer {
        Scorer::new(metric, self.scoring_convention)
    }
}
