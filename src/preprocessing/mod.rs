//! Data preprocessing module
//!
//! Transform stages that learn their parameters from a training partition.

mod imputer;

pub use imputer::{ImputeStrategy, Imputer};
