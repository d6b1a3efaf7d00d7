//! Model pipeline: transform stages followed by a trainable predictor
//!
//! A [`Pipeline`] owns every fitted parameter of its stages. The evaluator
//! builds a fresh one per fold from a factory, fits it on that fold's
//! training rows only and drops it after scoring, so nothing learned on one
//! partition can reach another.

mod spec;

pub use spec::{ModelSpec, PipelineSpec, StageSpec};

use crate::error::{CvAuditError, Result};
use ndarray::{Array1, Array2};
use std::fmt::Debug;

/// A preprocessing stage with learned parameters
pub trait Transform: Debug + Send + Sync {
    fn name(&self) -> &'static str;

    /// Learn parameters from training features. `columns` names each column of `x`.
    fn fit(&mut self, x: &Array2<f64>, columns: &[String]) -> Result<()>;

    /// Apply the learned parameters to new rows
    fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>>;
}

/// The final, trainable stage of a pipeline
pub trait Estimator: Debug + Send + Sync {
    fn name(&self) -> &'static str;

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, columns: &[String]) -> Result<()>;

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;
}

/// Ordered transforms ending in an estimator, fit and applied as one unit
#[derive(Debug)]
pub struct Pipeline {
    transforms: Vec<Box<dyn Transform>>,
    estimator: Box<dyn Estimator>,
    is_fitted: bool,
}

impl Pipeline {
    pub fn new(estimator: impl Estimator + 'static) -> Self {
        Self {
            transforms: Vec::new(),
            estimator: Box::new(estimator),
            is_fitted: false,
        }
    }

    pub fn from_boxed(estimator: Box<dyn Estimator>) -> Self {
        Self {
            transforms: Vec::new(),
            estimator,
            is_fitted: false,
        }
    }

    /// Append a transform; stages run in insertion order
    pub fn with_transform(mut self, transform: impl Transform + 'static) -> Self {
        self.transforms.push(Box::new(transform));
        self
    }

    pub fn push_boxed(&mut self, transform: Box<dyn Transform>) {
        self.transforms.push(transform);
    }

    /// Stage names, transforms first, estimator last
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.transforms
            .iter()
            .map(|t| t.name())
            .chain(std::iter::once(self.estimator.name()))
            .collect()
    }

    pub fn is_fitted(&self) -> bool {
        self.is_fitted
    }

    /// Fit every stage on the given training rows.
    ///
    /// Each transform is fit on the output of the stages before it, then
    /// the estimator is fit on the fully transformed matrix.
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, columns: &[String]) -> Result<()> {
        if x.nrows() != y.len() {
            return Err(CvAuditError::ShapeError {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }
        if x.ncols() != columns.len() {
            return Err(CvAuditError::ShapeError {
                expected: format!("{} column names", x.ncols()),
                actual: format!("{} column names", columns.len()),
            });
        }

        let mut current = x.to_owned();
        for transform in &mut self.transforms {
            transform.fit(&current, columns)?;
            current = transform.transform(&current)?;
        }
        self.estimator.fit(&current, y, columns)?;
        self.is_fitted = true;
        Ok(())
    }

    /// Run new rows through the fitted transforms and predict
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if !self.is_fitted {
            return Err(CvAuditError::ModelNotFitted);
        }

        let mut current = x.to_owned();
        for transform in &self.transforms {
            current = transform.transform(&current)?;
        }
        self.estimator.predict(&current)
    }
}

/// Reject `NaN` cells before they reach a predictor, naming the first bad column
pub(crate) fn ensure_no_missing(x: &Array2<f64>, columns: &[String]) -> Result<()> {
    for (j, col) in x.columns().into_iter().enumerate() {
        if col.iter().any(|v| v.is_nan()) {
            let name = columns
                .get(j)
                .cloned()
                .unwrap_or_else(|| format!("#{}", j));
            return Err(CvAuditError::fit_column(
                name,
                "contains missing values; add an imputer stage before the model",
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocessing::{ImputeStrategy, Imputer};
    use crate::training::RandomForest;
    use ndarray::array;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("x{}", i)).collect()
    }

    #[test]
    fn test_stage_names() {
        let pipeline = Pipeline::new(RandomForest::new_regressor(5))
            .with_transform(Imputer::new(ImputeStrategy::Mean));
        assert_eq!(pipeline.stage_names(), vec!["imputer", "random_forest_regressor"]);
    }

    #[test]
    fn test_predict_before_fit() {
        let pipeline = Pipeline::new(RandomForest::new_regressor(5));
        let err = pipeline.predict(&array![[1.0]]).unwrap_err();
        assert!(matches!(err, CvAuditError::ModelNotFitted));
    }

    #[test]
    fn test_missing_values_without_imputer() {
        let x = array![[1.0], [f64::NAN], [3.0]];
        let y = array![1.0, 2.0, 3.0];
        let mut pipeline = Pipeline::new(RandomForest::new_regressor(5));

        let err = pipeline.fit(&x, &y, &names(1)).unwrap_err();
        assert!(matches!(err, CvAuditError::Fit { column: Some(ref c), .. } if c == "x0"));
    }

    #[test]
    fn test_fit_predict_with_imputer() {
        let x = array![[1.0, 10.0], [2.0, f64::NAN], [3.0, 30.0], [4.0, 40.0]];
        let y = array![1.0, 2.0, 3.0, 4.0];
        let mut pipeline = Pipeline::new(RandomForest::new_regressor(10).with_random_state(0))
            .with_transform(Imputer::new(ImputeStrategy::Mean));

        pipeline.fit(&x, &y, &names(2)).unwrap();
        let preds = pipeline.predict(&array![[2.5, f64::NAN]]).unwrap();
        assert_eq!(preds.len(), 1);
        assert!(preds[0].is_finite());
    }

    #[test]
    fn test_shape_mismatch() {
        let mut pipeline = Pipeline::new(RandomForest::new_regressor(5));
        let err = pipeline
            .fit(&array![[1.0], [2.0]], &array![1.0], &names(1))
            .unwrap_err();
        assert!(matches!(err, CvAuditError::ShapeError { .. }));
    }
}
