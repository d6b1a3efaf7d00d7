//! Scoring metrics and the sign convention applied before aggregation

use crate::error::{CvAuditError, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Mean absolute error. Lower is better.
pub fn mean_absolute_error(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.len() != predicted.len() || actual.is_empty() {
        return f64::NAN;
    }
    let sum: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).abs())
        .sum();
    sum / actual.len() as f64
}

/// Mean squared error. Lower is better.
pub fn mean_squared_error(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.len() != predicted.len() || actual.is_empty() {
        return f64::NAN;
    }
    let sum: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    sum / actual.len() as f64
}

/// Coefficient of determination. Higher is better.
///
/// A constant `actual` gives 1.0 for a perfect prediction and 0.0 otherwise.
pub fn r2_score(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.len() != predicted.len() || actual.is_empty() {
        return f64::NAN;
    }
    let mean = actual.iter().sum::<f64>() / actual.len() as f64;
    let ss_tot: f64 = actual.iter().map(|a| (a - mean).powi(2)).sum();
    let ss_res: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum();

    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

/// Fraction of predictions that land on the true class. Higher is better.
pub fn accuracy(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.len() != predicted.len() || actual.is_empty() {
        return f64::NAN;
    }
    let correct = actual
        .iter()
        .zip(predicted)
        .filter(|(a, p)| (*p - *a).abs() < 0.5)
        .count();
    correct as f64 / actual.len() as f64
}

/// Evaluation metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    MeanAbsoluteError,
    MeanSquaredError,
    R2,
    Accuracy,
}

impl Metric {
    /// Natural direction of the raw metric
    pub fn greater_is_better(&self) -> bool {
        matches!(self, Metric::R2 | Metric::Accuracy)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Metric::MeanAbsoluteError => "mean_absolute_error",
            Metric::MeanSquaredError => "mean_squared_error",
            Metric::R2 => "r2",
            Metric::Accuracy => "accuracy",
        }
    }

    /// Short label for terminal output
    pub fn short_name(&self) -> &'static str {
        match self {
            Metric::MeanAbsoluteError => "MAE",
            Metric::MeanSquaredError => "MSE",
            Metric::R2 => "R²",
            Metric::Accuracy => "Accuracy",
        }
    }

    /// Raw metric value
    pub fn compute(&self, actual: &[f64], predicted: &[f64]) -> f64 {
        match self {
            Metric::MeanAbsoluteError => mean_absolute_error(actual, predicted),
            Metric::MeanSquaredError => mean_squared_error(actual, predicted),
            Metric::R2 => r2_score(actual, predicted),
            Metric::Accuracy => accuracy(actual, predicted),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Metric {
    type Err = CvAuditError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mae" | "mean_absolute_error" => Ok(Metric::MeanAbsoluteError),
            "mse" | "mean_squared_error" => Ok(Metric::MeanSquaredError),
            "r2" => Ok(Metric::R2),
            "accuracy" | "acc" => Ok(Metric::Accuracy),
            other => Err(CvAuditError::InvalidConfiguration(format!(
                "unknown metric '{}' (expected mae, mse, r2 or accuracy)",
                other
            ))),
        }
    }
}

/// Direction in which aggregated scores are ordered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringConvention {
    #[default]
    HigherIsBetter,
    LowerIsBetter,
}

impl FromStr for ScoringConvention {
    type Err = CvAuditError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "higher_is_better" | "higher" => Ok(ScoringConvention::HigherIsBetter),
            "lower_is_better" | "lower" => Ok(ScoringConvention::LowerIsBetter),
            other => Err(CvAuditError::InvalidConfiguration(format!(
                "unknown scoring convention '{}'",
                other
            ))),
        }
    }
}

/// A metric bound to a convention.
///
/// Under `HigherIsBetter` the error metrics are negated (the
/// `neg_mean_absolute_error` form); under `LowerIsBetter` accuracy and R²
/// are negated instead. Metrics whose direction already matches are
/// reported as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scorer {
    pub metric: Metric,
    pub convention: ScoringConvention,
}

impl Scorer {
    pub fn new(metric: Metric, convention: ScoringConvention) -> Self {
        Self { metric, convention }
    }

    /// Multiplier turning a raw metric into a score under the convention
    pub fn sign(&self) -> f64 {
        let higher = self.convention == ScoringConvention::HigherIsBetter;
        if self.metric.greater_is_better() == higher {
            1.0
        } else {
            -1.0
        }
    }

    /// Name of the signed score, e.g. `neg_mean_absolute_error`
    pub fn label(&self) -> String {
        if self.sign() < 0.0 {
            format!("neg_{}", self.metric.name())
        } else {
            self.metric.name().to_string()
        }
    }

    /// Score held-out predictions against the true targets
    pub fn score(&self, actual: &Array1<f64>, predicted: &Array1<f64>) -> Result<f64> {
        if actual.is_empty() {
            return Err(CvAuditError::scoring("held-out partition is empty"));
        }
        if actual.len() != predicted.len() {
            return Err(CvAuditError::scoring(format!(
                "{} predictions for {} targets",
                predicted.len(),
                actual.len()
            )));
        }

        let actual = actual.to_vec();
        let predicted = predicted.to_vec();
        Ok(self.sign() * self.metric.compute(&actual, &predicted))
    }

    /// Undo the sign so a score reads as the raw metric again
    pub fn display_value(&self, score: f64) -> f64 {
        self.sign() * score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_mae() {
        let actual = [1.0, 2.0, 3.0, 4.0];
        let predicted = [1.5, 2.0, 2.0, 4.0];
        assert!((mean_absolute_error(&actual, &predicted) - 0.375).abs() < 1e-12);
        assert!(mean_absolute_error(&actual, &predicted[..2]).is_nan());
    }

    #[test]
    fn test_r2_constant_target() {
        assert_eq!(r2_score(&[2.0, 2.0], &[2.0, 2.0]), 1.0);
        assert_eq!(r2_score(&[2.0, 2.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_accuracy() {
        let actual = [0.0, 1.0, 1.0, 0.0];
        let predicted = [0.0, 1.0, 0.0, 0.0];
        assert!((accuracy(&actual, &predicted) - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_error_metric_negated_when_higher_is_better() {
        let scorer = Scorer::new(Metric::MeanAbsoluteError, ScoringConvention::HigherIsBetter);
        let score = scorer.score(&array![1.0, 3.0], &array![2.0, 3.0]).unwrap();
        assert!((score + 0.5).abs() < 1e-12);
        assert!((scorer.display_value(score) - 0.5).abs() < 1e-12);
        assert_eq!(scorer.label(), "neg_mean_absolute_error");
    }

    #[test]
    fn test_error_metric_raw_when_lower_is_better() {
        let scorer = Scorer::new(Metric::MeanAbsoluteError, ScoringConvention::LowerIsBetter);
        let score = scorer.score(&array![1.0, 3.0], &array![2.0, 3.0]).unwrap();
        assert!((score - 0.5).abs() < 1e-12);
        assert_eq!(scorer.label(), "mean_absolute_error");
    }

    #[test]
    fn test_accuracy_negated_when_lower_is_better() {
        let scorer = Scorer::new(Metric::Accuracy, ScoringConvention::LowerIsBetter);
        assert_eq!(scorer.sign(), -1.0);
    }

    #[test]
    fn test_score_rejects_empty_and_mismatched() {
        let scorer = Scorer::new(Metric::R2, ScoringConvention::HigherIsBetter);
        let empty = Array1::<f64>::zeros(0);
        assert!(matches!(
            scorer.score(&empty, &empty),
            Err(CvAuditError::Scoring { .. })
        ));
        assert!(matches!(
            scorer.score(&array![1.0, 2.0], &array![1.0]),
            Err(CvAuditError::Scoring { .. })
        ));
    }

    #[test]
    fn test_parse_metric_and_convention() {
        assert_eq!("MAE".parse::<Metric>().unwrap(), Metric::MeanAbsoluteError);
        assert!("auc".parse::<Metric>().is_err());
        assert_eq!(
            "lower-is-better".parse::<ScoringConvention>().unwrap(),
            ScoringConvention::LowerIsBetter
        );
    }
}
