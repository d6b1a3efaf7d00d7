//! Serializable pipeline description, used as the per-fold pipeline factory

use super::Pipeline;
use crate::preprocessing::{ImputeStrategy, Imputer};
use crate::training::{DecisionTree, RandomForest};
use serde::{Deserialize, Serialize};

/// A transform stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StageSpec {
    Imputer { strategy: ImputeStrategy },
}

/// The predictor at the end of the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelSpec {
    RandomForestRegressor {
        #[serde(default = "default_n_estimators")]
        n_estimators: usize,
        #[serde(default)]
        max_depth: Option<usize>,
        #[serde(default)]
        random_state: Option<u64>,
    },
    RandomForestClassifier {
        #[serde(default = "default_n_estimators")]
        n_estimators: usize,
        #[serde(default)]
        max_depth: Option<usize>,
        #[serde(default)]
        random_state: Option<u64>,
    },
    DecisionTreeRegressor {
        #[serde(default)]
        max_depth: Option<usize>,
        #[serde(default)]
        random_state: Option<u64>,
    },
    DecisionTreeClassifier {
        #[serde(default)]
        max_depth: Option<usize>,
        #[serde(default)]
        random_state: Option<u64>,
    },
}

fn default_n_estimators() -> usize {
    100
}

impl ModelSpec {
    pub fn is_classifier(&self) -> bool {
        matches!(
            self,
            ModelSpec::RandomForestClassifier { .. } | ModelSpec::DecisionTreeClassifier { .. }
        )
    }

    /// Parse a CLI model name into a spec
    pub fn from_name(
        name: &str,
        n_estimators: usize,
        max_depth: Option<usize>,
        random_state: Option<u64>,
    ) -> Option<Self> {
        let spec = match name {
            "random_forest_regressor" | "rf_regressor" => ModelSpec::RandomForestRegressor {
                n_estimators,
                max_depth,
                random_state,
            },
            "random_forest_classifier" | "rf_classifier" => ModelSpec::RandomForestClassifier {
                n_estimators,
                max_depth,
                random_state,
            },
            "decision_tree_regressor" => ModelSpec::DecisionTreeRegressor {
                max_depth,
                random_state,
            },
            "decision_tree_classifier" => ModelSpec::DecisionTreeClassifier {
                max_depth,
                random_state,
            },
            _ => return None,
        };
        Some(spec)
    }
}

/// Ordered transform stages plus a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSpec {
    #[serde(default)]
    pub stages: Vec<StageSpec>,
    pub model: ModelSpec,
}

impl PipelineSpec {
    pub fn new(model: ModelSpec) -> Self {
        Self {
            stages: Vec::new(),
            model,
        }
    }

    pub fn with_stage(mut self, stage: StageSpec) -> Self {
        self.stages.push(stage);
        self
    }

    /// Mean imputer followed by a random forest regressor
    pub fn imputed_forest_regressor(n_estimators: usize, random_state: Option<u64>) -> Self {
        Self::new(ModelSpec::RandomForestRegressor {
            n_estimators,
            max_depth: None,
            random_state,
        })
        .with_stage(StageSpec::Imputer {
            strategy: ImputeStrategy::Mean,
        })
    }

    /// Build a fresh, unfitted pipeline
    pub fn build(&self) -> Pipeline {
        let mut pipeline = match &self.model {
            ModelSpec::RandomForestRegressor {
                n_estimators,
                max_depth,
                random_state,
            } => Pipeline::new(configure_forest(
                RandomForest::new_regressor(*n_estimators),
                *max_depth,
                *random_state,
            )),
            ModelSpec::RandomForestClassifier {
                n_estimators,
                max_depth,
                random_state,
            } => Pipeline::new(configure_forest(
                RandomForest::new_classifier(*n_estimators),
                *max_depth,
                *random_state,
            )),
            ModelSpec::DecisionTreeRegressor {
                max_depth,
                random_state,
            } => Pipeline::new(configure_tree(
                DecisionTree::new_regressor(),
                *max_depth,
                *random_state,
            )),
            ModelSpec::DecisionTreeClassifier {
                max_depth,
                random_state,
            } => Pipeline::new(configure_tree(
                DecisionTree::new_classifier(),
                *max_depth,
                *random_state,
            )),
        };

        for stage in &self.stages {
            match stage {
                StageSpec::Imputer { strategy } => {
                    pipeline.push_boxed(Box::new(Imputer::new(strategy.clone())))
                }
            }
        }

        pipeline
    }
}

fn configure_forest(mut rf: RandomForest, max_depth: Option<usize>, seed: Option<u64>) -> RandomForest {
    if let Some(d) = max_depth {
        rf = rf.with_max_depth(d);
    }
    if let Some(s) = seed {
        rf = rf.with_random_state(s);
    }
    rf
}

fn configure_tree(mut tree: DecisionTree, max_depth: Option<usize>, seed: Option<u64>) -> DecisionTree {
    if let Some(d) = max_depth {
        tree = tree.with_max_depth(d);
    }
    if let Some(s) = seed {
        tree = tree.with_random_state(s);
    }
    tree
}
