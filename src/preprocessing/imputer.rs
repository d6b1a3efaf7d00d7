//! Missing value imputation strategies

use crate::error::{CvAuditError, Result};
use crate::pipeline::Transform;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Strategy for imputing missing values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImputeStrategy {
    /// Replace with column mean
    Mean,
    /// Replace with column median
    Median,
    /// Replace with the most frequent value (smallest on ties)
    MostFrequent,
    /// Replace with a constant value
    Constant(f64),
}

impl std::str::FromStr for ImputeStrategy {
    type Err = CvAuditError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mean" => Ok(ImputeStrategy::Mean),
            "median" => Ok(ImputeStrategy::Median),
            "mode" | "most_frequent" => Ok(ImputeStrategy::MostFrequent),
            other => other
                .strip_prefix("constant:")
                .and_then(|v| v.parse::<f64>().ok())
                .map(ImputeStrategy::Constant)
                .ok_or_else(|| {
                    CvAuditError::InvalidConfiguration(format!(
                        "unknown imputation strategy '{}'",
                        s
                    ))
                }),
        }
    }
}

/// Column-wise imputer over dense matrices where `NaN` marks a missing cell.
///
/// Fill values are learned from the matrix passed to [`Imputer::fit`] and
/// nothing else; `transform` only reads them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Imputer {
    strategy: ImputeStrategy,
    fill_values: Option<Array1<f64>>,
}

impl Imputer {
    /// Create a new imputer with the specified strategy
    pub fn new(strategy: ImputeStrategy) -> Self {
        Self {
            strategy,
            fill_values: None,
        }
    }

    pub fn strategy(&self) -> &ImputeStrategy {
        &self.strategy
    }

    /// Learned fill value per column, once fitted
    pub fn fill_values(&self) -> Option<&Array1<f64>> {
        self.fill_values.as_ref()
    }

    /// Fit the imputer to the data
    pub fn fit(&mut self, x: &Array2<f64>, columns: &[String]) -> Result<&mut Self> {
        let mut fills = Vec::with_capacity(x.ncols());

        for (j, col) in x.columns().into_iter().enumerate() {
            let observed: Vec<f64> = col.iter().copied().filter(|v| !v.is_nan()).collect();

            if observed.is_empty() {
                let name = columns
                    .get(j)
                    .cloned()
                    .unwrap_or_else(|| format!("#{}", j));
                return Err(CvAuditError::fit_column(
                    name,
                    "no non-missing values in the training partition",
                ));
            }

            let fill = match &self.strategy {
                ImputeStrategy::Constant(v) => *v,
                ImputeStrategy::Mean => observed.iter().sum::<f64>() / observed.len() as f64,
                ImputeStrategy::Median => median(observed),
                ImputeStrategy::MostFrequent => most_frequent(observed),
            };
            fills.push(fill);
        }

        self.fill_values = Some(Array1::from_vec(fills));
        Ok(self)
    }

    /// Replace `NaN` cells with the learned fill values
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let fills = self.fill_values.as_ref().ok_or(CvAuditError::ModelNotFitted)?;

        if x.ncols() != fills.len() {
            return Err(CvAuditError::ShapeError {
                expected: format!("{} columns", fills.len()),
                actual: format!("{} columns", x.ncols()),
            });
        }

        let mut result = x.to_owned();
        for (mut col, &fill) in result.columns_mut().into_iter().zip(fills.iter()) {
            col.mapv_inplace(|v| if v.is_nan() { fill } else { v });
        }
        Ok(result)
    }

    /// Fit and transform in one step
    pub fn fit_transform(&mut self, x: &Array2<f64>, columns: &[String]) -> Result<Array2<f64>> {
        self.fit(x, columns)?;
        self.transform(x)
    }
}

impl Transform for Imputer {
    fn name(&self) -> &'static str {
        "imputer"
    }

    fn fit(&mut self, x: &Array2<f64>, columns: &[String]) -> Result<()> {
        Imputer::fit(self, x, columns).map(|_| ())
    }

    fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        Imputer::transform(self, x)
    }
}

fn median(mut values: Vec<f64>) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

fn most_frequent(mut values: Vec<f64>) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));

    let mut best = values[0];
    let mut best_count = 0;
    let mut i = 0;
    while i < values.len() {
        let mut j = i;
        while j < values.len() && values[j] == values[i] {
            j += 1;
        }
        if j - i > best_count {
            best_count = j - i;
            best = values[i];
        }
        i = j;
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn cols(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("c{}", i)).collect()
    }

    #[test]
    fn test_imputer_creation() {
        let imputer = Imputer::new(ImputeStrategy::Mean);
        assert!(imputer.fill_values().is_none());
    }

    #[test]
    fn test_impute_strategy_serialize() {
        let json = serde_json::to_string(&ImputeStrategy::Constant(5.0)).unwrap();
        assert!(json.contains("constant"));
        assert!(json.contains('5'));
    }

    #[test]
    fn test_mean_imputation() {
        let x = array![[1.0], [f64::NAN], [3.0], [4.0]];
        let mut imputer = Imputer::new(ImputeStrategy::Mean);
        let result = imputer.fit_transform(&x, &cols(1)).unwrap();

        // Mean of [1, 3, 4] = 8/3
        assert!((result[[1, 0]] - 8.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_fill_comes_from_fit_data_only() {
        let train = array![[2.0], [4.0], [f64::NAN]];
        let held_out = array![[f64::NAN], [1000.0]];

        let mut imputer = Imputer::new(ImputeStrategy::Mean);
        imputer.fit(&train, &cols(1)).unwrap();
        let out = imputer.transform(&held_out).unwrap();

        assert_eq!(out[[0, 0]], 3.0);
        assert_eq!(out[[1, 0]], 1000.0);
    }

    #[test]
    fn test_median_and_mode() {
        let x = array![[1.0, 7.0], [5.0, 7.0], [2.0, 3.0], [10.0, f64::NAN]];

        let mut median = Imputer::new(ImputeStrategy::Median);
        median.fit(&x, &cols(2)).unwrap();
        assert_eq!(median.fill_values().unwrap().to_vec(), vec![3.5, 7.0]);

        let mut mode = Imputer::new(ImputeStrategy::MostFrequent);
        mode.fit(&x, &cols(2)).unwrap();
        // column 0 is all ties: smallest value wins
        assert_eq!(mode.fill_values().unwrap().to_vec(), vec![1.0, 7.0]);
    }

    #[test]
    fn test_all_missing_column_is_fit_error() {
        let x = array![[1.0, f64::NAN], [2.0, f64::NAN]];
        let mut imputer = Imputer::new(ImputeStrategy::Mean);
        let err = imputer.fit(&x, &cols(2)).unwrap_err();

        assert!(matches!(err, CvAuditError::Fit { column: Some(ref c), .. } if c == "c1"));
    }

    #[test]
    fn test_constant_rejects_all_missing_column() {
        let x = array![[f64::NAN, 1.0], [f64::NAN, 2.0], [f64::NAN, 3.0]];
        let mut imputer = Imputer::new(ImputeStrategy::Constant(0.0));
        let err = imputer.fit(&x, &cols(2)).unwrap_err();

        assert!(matches!(err, CvAuditError::Fit { column: Some(ref c), .. } if c == "c0"));
        assert!(imputer.fill_values().is_none());
    }

    #[test]
    fn test_constant_fills_partially_missing_column() {
        let x = array![[f64::NAN], [2.0]];
        let mut imputer = Imputer::new(ImputeStrategy::Constant(-1.0));
        let out = imputer.fit_transform(&x, &cols(1)).unwrap();
        assert_eq!(out.column(0).to_vec(), vec![-1.0, 2.0]);
    }

    #[test]
    fn test_transform_before_fit() {
        let imputer = Imputer::new(ImputeStrategy::Mean);
        assert!(matches!(
            imputer.transform(&array![[1.0]]),
            Err(CvAuditError::ModelNotFitted)
        ));
    }

    #[test]
    fn test_parse_strategy() {
        assert_eq!("median".parse::<ImputeStrategy>().unwrap(), ImputeStrategy::Median);
        assert_eq!(
            "constant:0".parse::<ImputeStrategy>().unwrap(),
            ImputeStrategy::Constant(0.0)
        );
        assert!("knn".parse::<ImputeStrategy>().is_err());
    }
}
