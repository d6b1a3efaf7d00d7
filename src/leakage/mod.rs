//! Target-leakage diagnostics
//!
//! The auditor reports how often a candidate feature sits at a sentinel
//! value (0 by default) within each class of a binary target. A feature
//! that is almost always at the sentinel for one class and almost never for
//! the other is a candidate for leakage, but the report makes no decision:
//! whether the feature is available before the target event is a domain
//! question.

use crate::data::Dataset;
use crate::error::{CvAuditError, Result};
use crate::metrics::Scorer;
use crate::pipeline::Pipeline;
use crate::training::{CVResults, CrossValidator};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

/// Sentinel fractions of one feature, split by target class
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeakageReport {
    pub feature: String,
    pub sentinel: f64,
    /// Share of target=false rows where the feature equals the sentinel
    pub fraction_false: f64,
    /// Share of target=true rows where the feature equals the sentinel
    pub fraction_true: f64,
    pub rows_false: usize,
    pub rows_true: usize,
}

impl LeakageReport {
    /// Absolute gap between the two fractions; `NaN` if either is undefined
    pub fn gap(&self) -> f64 {
        (self.fraction_false - self.fraction_true).abs()
    }
}

impl fmt::Display for LeakageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Fraction of target=false rows with {} == {}: {:.2}",
            self.feature, self.sentinel, self.fraction_false
        )?;
        write!(
            f,
            "Fraction of target=true rows with {} == {}: {:.2}",
            self.feature, self.sentinel, self.fraction_true
        )
    }
}

/// Cross-validation summary with and without the suspect columns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AblationReport {
    pub dropped: Vec<String>,
    pub baseline: CVResults,
    pub without_suspects: CVResults,
}

impl AblationReport {
    /// Mean score after dropping minus mean score before
    pub fn score_change(&self) -> f64 {
        self.without_suspects.mean_score - self.baseline.mean_score
    }
}

/// Conditional sentinel-rate auditor
#[derive(Debug, Clone, Copy)]
pub struct LeakageAuditor {
    sentinel: f64,
}

impl Default for LeakageAuditor {
    fn default() -> Self {
        Self { sentinel: 0.0 }
    }
}

impl LeakageAuditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sentinel(mut self, sentinel: f64) -> Self {
        self.sentinel = sentinel;
        self
    }

    pub fn sentinel(&self) -> f64 {
        self.sentinel
    }

    /// Audit one feature column against a binary target column
    pub fn audit(&self, dataset: &Dataset, target: &str, feature: &str) -> Result<LeakageReport> {
        reject_target_as_feature(target, feature)?;
        let target_values = dataset.binary_target(target)?;
        let feature_values = dataset.numeric_column(feature)?;
        self.audit_values(feature, &target_values, &feature_values)
    }

    /// Audit several features, in the order given
    pub fn audit_columns(
        &self,
        dataset: &Dataset,
        target: &str,
        features: &[String],
    ) -> Result<Vec<LeakageReport>> {
        let target_values = dataset.binary_target(target)?;
        features
            .iter()
            .map(|feature| {
                reject_target_as_feature(target, feature)?;
                let values = dataset.numeric_column(feature)?;
                self.audit_values(feature, &target_values, &values)
            })
            .collect()
    }

    /// Core computation over aligned columns.
    ///
    /// Rows with a missing target are skipped. A missing feature cell counts
    /// toward its class but never matches the sentinel. A class with no rows
    /// yields `NaN`.
    pub fn audit_values(
        &self,
        feature: &str,
        target: &[Option<bool>],
        values: &[Option<f64>],
    ) -> Result<LeakageReport> {
        if target.len() != values.len() {
            return Err(CvAuditError::ShapeError {
                expected: format!("{} feature values", target.len()),
                actual: format!("{} feature values", values.len()),
            });
        }

        // [false, true]
        let mut rows = [0usize; 2];
        let mut hits = [0usize; 2];

        for (t, v) in target.iter().zip(values.iter()) {
            let Some(class) = t else { continue };
            let idx = usize::from(*class);
            rows[idx] += 1;
            if *v == Some(self.sentinel) {
                hits[idx] += 1;
            }
        }

        let fraction = |class: usize, label: &str| {
            if rows[class] == 0 {
                warn!(feature, class = label, "No rows in target class; fraction is undefined");
                f64::NAN
            } else {
                hits[class] as f64 / rows[class] as f64
            }
        };

        Ok(LeakageReport {
            feature: feature.to_string(),
            sentinel: self.sentinel,
            fraction_false: fraction(0, "false"),
            fraction_true: fraction(1, "true"),
            rows_false: rows[0],
            rows_true: rows[1],
        })
    }

    /// Cross-validate with all `features`, then again without `suspects`.
    ///
    /// Both runs share the evaluator's configuration, so fold assignment is
    /// identical and the score difference is attributable to the dropped
    /// columns alone.
    #[allow(clippy::too_many_arguments)]
    pub fn ablation<F>(
        &self,
        evaluator: &CrossValidator,
        dataset: &Dataset,
        target: &str,
        features: &[String],
        suspects: &[String],
        factory: F,
        scorer: &Scorer,
    ) -> Result<AblationReport>
    where
        F: Fn() -> Pipeline + Sync,
    {
        if let Some(missing) = suspects.iter().find(|s| !features.contains(s)) {
            return Err(CvAuditError::InvalidConfiguration(format!(
                "suspect column '{}' is not among the features",
                missing
            )));
        }

        let remaining: Vec<String> = features
            .iter()
            .filter(|f| !suspects.contains(f))
            .cloned()
            .collect();

        let baseline = evaluator.evaluate(dataset, target, features, &factory, scorer)?;
        let without_suspects = evaluator.evaluate(dataset, target, &remaining, &factory, scorer)?;

        info!(
            dropped = suspects.len(),
            baseline = baseline.mean_score,
            without_suspects = without_suspects.mean_score,
            "Ablation complete"
        );

        Ok(AblationReport {
            dropped: suspects.to_vec(),
            baseline,
            without_suspects,
        })
    }
}

fn reject_target_as_feature(target: &str, feature: &str) -> Result<()> {
    if feature == target {
        return Err(CvAuditError::InvalidConfiguration(format!(
            "target column '{}' cannot be audited against itself",
            target
        )));
    }
    Ok(())
}
