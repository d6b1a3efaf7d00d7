//! K-fold cross-validation evaluator
//!
//! For each fold the evaluator builds a fresh pipeline from the caller's
//! factory, fits it on the training rows only, predicts the held-out rows
//! and scores them. The pipeline is dropped before the next fold starts.

use super::config::EvaluationConfig;
use super::cross_validation::FoldAssignment;
use crate::data::Dataset;
use crate::error::{CvAuditError, Result};
use crate::metrics::Scorer;
use crate::pipeline::{Pipeline, PipelineSpec};
use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

/// Sizes and score of one fold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldReport {
    pub fold: usize,
    pub train_rows: usize,
    pub held_out_rows: usize,
    /// Dataset rows scored in this fold, in row order
    pub held_out_indices: Vec<usize>,
    pub score: f64,
}

/// Cross-validation results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CVResults {
    /// Scores for each fold, in fold order
    pub scores: Vec<f64>,
    /// Mean score across folds
    pub mean_score: f64,
    /// Standard deviation of scores
    pub std_score: f64,
    /// Number of folds
    pub n_folds: usize,
    /// Signed score name, e.g. `neg_mean_absolute_error`
    pub scorer: String,
    /// Per-fold details
    pub folds: Vec<FoldReport>,
    /// Prediction for every row from the model that did not train on it
    pub out_of_fold: Vec<f64>,
}

impl CVResults {
    /// Create CV results from fold scores
    pub fn from_scores(scores: Vec<f64>) -> Self {
        let n_folds = scores.len();
        let mean_score = scores.iter().sum::<f64>() / n_folds as f64;
        let variance = scores.iter().map(|s| (s - mean_score).powi(2)).sum::<f64>() / n_folds as f64;
        let std_score = variance.sqrt();

        Self {
            scores,
            mean_score,
            std_score,
            n_folds,
            scorer: String::new(),
            folds: Vec::new(),
            out_of_fold: Vec::new(),
        }
    }
}

struct FoldOutcome {
    report: FoldReport,
    predictions: Array1<f64>,
}

/// Runs K fit/predict/score cycles over one dataset
#[derive(Debug, Clone, Default)]
pub struct CrossValidator {
    config: EvaluationConfig,
}

impl CrossValidator {
    pub fn new(config: EvaluationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EvaluationConfig {
        &self.config
    }

    /// Evaluate a pipeline over `features` predicting `target`.
    ///
    /// `factory` is called once per fold and must return an unfitted pipeline.
    pub fn evaluate<F>(
        &self,
        dataset: &Dataset,
        target: &str,
        features: &[String],
        factory: F,
        scorer: &Scorer,
    ) -> Result<CVResults>
    where
        F: Fn() -> Pipeline + Sync,
    {
        self.config.validate()?;

        if !dataset.has_column(target) {
            return Err(CvAuditError::InvalidConfiguration(format!(
                "unknown target column '{}'",
                target
            )));
        }
        if let Some(name) = features.iter().find(|f| f.as_str() == target) {
            return Err(CvAuditError::InvalidConfiguration(format!(
                "target column '{}' is also listed as a feature",
                name
            )));
        }

        let x = dataset.feature_matrix(features)?;
        let y = dataset.target(target)?;

        self.evaluate_arrays(&x, &y, features, factory, scorer)
    }

    /// Evaluate with a serializable pipeline description as the factory
    pub fn evaluate_spec(
        &self,
        dataset: &Dataset,
        target: &str,
        features: &[String],
        spec: &PipelineSpec,
        scorer: &Scorer,
    ) -> Result<CVResults> {
        self.evaluate(dataset, target, features, || spec.build(), scorer)
    }

    /// Evaluate over an already extracted feature matrix and target
    pub fn evaluate_arrays<F>(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        columns: &[String],
        factory: F,
        scorer: &Scorer,
    ) -> Result<CVResults>
    where
        F: Fn() -> Pipeline + Sync,
    {
        self.config.validate()?;

        if x.nrows() != y.len() {
            return Err(CvAuditError::ShapeError {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }

        let n_rows = x.nrows();
        let assignment = self.config.partitioner().assign(n_rows)?;
        let n_folds = assignment.n_folds();

        info!(
            n_rows,
            n_folds,
            n_features = x.ncols(),
            scorer = %scorer.label(),
            parallel = self.config.parallel,
            "Starting cross-validation"
        );
        let start = Instant::now();

        let run = |fold: usize| run_fold(&assignment, fold, x, y, columns, &factory, scorer);

        // Both branches yield outcomes in fold order and stop at the first failure
        let outcomes: Vec<FoldOutcome> = if self.config.parallel {
            (0..n_folds).into_par_iter().map(run).collect::<Result<Vec<_>>>()?
        } else {
            (0..n_folds).map(run).collect::<Result<Vec<_>>>()?
        };

        let mut out_of_fold = vec![f64::NAN; n_rows];
        let mut folds = Vec::with_capacity(n_folds);
        for outcome in outcomes {
            for (&row, &pred) in outcome.report.held_out_indices.iter().zip(outcome.predictions.iter()) {
                out_of_fold[row] = pred;
            }
            folds.push(outcome.report);
        }

        let scores: Vec<f64> = folds.iter().map(|f| f.score).collect();
        let mut results = CVResults::from_scores(scores);
        results.scorer = scorer.label();
        results.folds = folds;
        results.out_of_fold = out_of_fold;

        info!(
            mean_score = results.mean_score,
            std_score = results.std_score,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Cross-validation complete"
        );

        Ok(results)
    }
}

fn run_fold<F>(
    assignment: &FoldAssignment,
    fold: usize,
    x: &Array2<f64>,
    y: &Array1<f64>,
    columns: &[String],
    factory: &F,
    scorer: &Scorer,
) -> Result<FoldOutcome>
where
    F: Fn() -> Pipeline + Sync,
{
    let split = assignment.split(fold);
    if split.test_indices.is_empty() {
        return Err(CvAuditError::scoring("held-out partition is empty").with_fold(fold));
    }

    let x_train = x.select(Axis(0), &split.train_indices);
    let y_train = y.select(Axis(0), &split.train_indices);
    let x_held_out = x.select(Axis(0), &split.test_indices);
    let y_held_out = y.select(Axis(0), &split.test_indices);

    let mut pipeline = factory();
    pipeline
        .fit(&x_train, &y_train, columns)
        .map_err(|e| e.with_fold(fold))?;
    let predictions = pipeline.predict(&x_held_out).map_err(|e| e.with_fold(fold))?;
    let score = scorer
        .score(&y_held_out, &predictions)
        .map_err(|e| e.with_fold(fold))?;

    debug!(
        fold,
        train_rows = split.train_indices.len(),
        held_out_rows = split.test_indices.len(),
        score,
        "Fold scored"
    );

    Ok(FoldOutcome {
        report: FoldReport {
            fold,
            train_rows: split.train_indices.len(),
            held_out_rows: split.test_indices.len(),
            held_out_indices: split.test_indices,
            score,
        },
        predictions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{Metric, ScoringConvention};
    use crate::pipeline::Estimator;
    use crate::preprocessing::{ImputeStrategy, Imputer};
    use crate::training::RandomForest;
    use ndarray::array;

    /// Predicts the training-target mean for every row
    #[derive(Debug, Default)]
    struct MeanModel {
        mean: Option<f64>,
    }

    impl Estimator for MeanModel {
        fn name(&self) -> &'static str {
            "mean_model"
        }

        fn fit(&mut self, _x: &Array2<f64>, y: &Array1<f64>, _columns: &[String]) -> Result<()> {
            self.mean = y.mean();
            Ok(())
        }

        fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
            let mean = self.mean.ok_or(CvAuditError::ModelNotFitted)?;
            Ok(Array1::from_elem(x.nrows(), mean))
        }
    }

    fn columns(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("x{}", i)).collect()
    }

    fn mae() -> Scorer {
        Scorer::new(Metric::MeanAbsoluteError, ScoringConvention::HigherIsBetter)
    }

    #[test]
    fn test_mean_model_scores_by_hand() {
        // Fold 0 holds rows 0-1 (y 0, 1), trains on y 2, 3 with mean 2.5
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![0.0, 1.0, 2.0, 3.0];
        let cv = CrossValidator::new(EvaluationConfig::new().with_fold_count(2));

        let results = cv
            .evaluate_arrays(&x, &y, &columns(1), || Pipeline::new(MeanModel::default()), &mae())
            .unwrap();

        assert_eq!(results.scores, vec![-2.0, -2.0]);
        assert_eq!(results.mean_score, -2.0);
        assert_eq!(results.std_score, 0.0);
        assert_eq!(results.out_of_fold, vec![2.5, 2.5, 0.5, 0.5]);
        assert_eq!(results.scorer, "neg_mean_absolute_error");
        assert_eq!(results.folds[1].train_rows, 2);
    }

    #[test]
    fn test_fit_error_carries_fold() {
        // Fold 1 trains on rows 0-1, where the only feature is entirely missing
        let x = array![[f64::NAN], [f64::NAN], [1.0], [2.0]];
        let y = array![0.0, 1.0, 2.0, 3.0];
        let cv = CrossValidator::new(EvaluationConfig::new().with_fold_count(2));

        let err = cv
            .evaluate_arrays(
                &x,
                &y,
                &columns(1),
                || {
                    Pipeline::new(RandomForest::new_regressor(3))
                        .with_transform(Imputer::new(ImputeStrategy::Mean))
                },
                &mae(),
            )
            .unwrap_err();

        assert_eq!(err.fold(), Some(1));
        assert!(matches!(err, CvAuditError::Fit { column: Some(ref c), .. } if c == "x0"));
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let x = Array2::from_shape_fn((30, 2), |(i, j)| ((i * 7 + j * 3) % 11) as f64);
        let y = Array1::from_shape_fn(30, |i| (i % 5) as f64 * 1.5);
        let factory = || Pipeline::new(RandomForest::new_regressor(8).with_random_state(1));

        let sequential = CrossValidator::new(EvaluationConfig::new())
            .evaluate_arrays(&x, &y, &columns(2), factory, &mae())
            .unwrap();
        let parallel = CrossValidator::new(EvaluationConfig::new().with_parallel(true))
            .evaluate_arrays(&x, &y, &columns(2), factory, &mae())
            .unwrap();

        assert_eq!(sequential.scores, parallel.scores);
        assert_eq!(sequential.out_of_fold, parallel.out_of_fold);
    }

    #[test]
    fn test_fold_count_above_rows_rejected() {
        let x = array![[1.0], [2.0]];
        let y = array![1.0, 2.0];
        let cv = CrossValidator::new(EvaluationConfig::new().with_fold_count(3));

        let err = cv
            .evaluate_arrays(&x, &y, &columns(1), || Pipeline::new(MeanModel::default()), &mae())
            .unwrap_err();
        assert!(matches!(err, CvAuditError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_from_scores() {
        let results = CVResults::from_scores(vec![1.0, 2.0, 3.0]);
        assert_eq!(results.n_folds, 3);
        assert!((results.mean_score - 2.0).abs() < 1e-12);
        assert!((results.std_score - (2.0f64 / 3.0).sqrt()).abs() < 1e-12);
    }
}
