//! cvaudit - cross-validation evaluation and target-leakage auditing
//!
//! # Modules
//!
//! - [`data`] - Tabular dataset over a polars `DataFrame`
//! - [`preprocessing`] - Missing value imputation
//! - [`pipeline`] - Transform stages followed by a trainable predictor
//! - [`training`] - Trees, forests, fold partitioning and the evaluator
//! - [`metrics`] - Scoring metrics and sign conventions
//! - [`leakage`] - Target-leakage diagnostics
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;

// Data
pub mod data;
pub mod utils;

// Core ML modules
pub mod metrics;
pub mod preprocessing;
pub mod pipeline;
pub mod training;
pub mod leakage;

// Services
pub mod cli;

pub use error::{CvAuditError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{CvAuditError, Result};

    // Data
    pub use crate::data::Dataset;
    pub use crate::utils::DataLoader;

    // Pipeline
    pub use crate::pipeline::{Estimator, ModelSpec, Pipeline, PipelineSpec, StageSpec, Transform};
    pub use crate::preprocessing::{ImputeStrategy, Imputer};

    // Training
    pub use crate::training::{
        CVResults, CrossValidator, DecisionTree, EvaluationConfig, FoldAssignment, KFold,
        RandomForest,
    };

    // Scoring
    pub use crate::metrics::{Metric, Scorer, ScoringConvention};

    // Leakage
    pub use crate::leakage::{AblationReport, LeakageAuditor, LeakageReport};
}
