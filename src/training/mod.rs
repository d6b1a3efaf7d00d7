//! Model training and evaluation
//!
//! Provides:
//! - Decision trees and Random Forests (regressor and classifier)
//! - K-fold partitioning
//! - The cross-validation evaluator and its configuration

mod config;
pub mod cross_validation;
pub mod decision_tree;
pub mod evaluator;
pub mod random_forest;

pub use config::EvaluationConfig;
pub use cross_validation::{CVSplit, FoldAssignment, KFold};
pub use decision_tree::{Criterion, DecisionTree, TreeNode};
pub use evaluator::{CVResults, CrossValidator, FoldReport};
pub use random_forest::{MaxFeatures, RandomForest};
