//! In-memory tabular dataset
//!
//! A thin layer over a polars [`DataFrame`] that hands the rest of the crate
//! dense `ndarray` views: a feature matrix with missing cells as `NaN` and a
//! fully observed target vector. The dataset is never mutated; row filtering
//! returns a new `Dataset`.

use crate::error::{CvAuditError, Result};
use crate::utils::DataLoader;
use ndarray::{Array1, Array2};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Broad type of a column as far as model fitting is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnKind {
    Numeric,
    Boolean,
    Categorical,
    Other,
}

impl ColumnKind {
    fn of(dtype: &DataType) -> Self {
        match dtype {
            DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64 => ColumnKind::Numeric,
            DataType::Boolean => ColumnKind::Boolean,
            DataType::String => ColumnKind::Categorical,
            _ => ColumnKind::Other,
        }
    }

    /// Whether the column can be fed to a model as-is
    pub fn is_model_ready(&self) -> bool {
        matches!(self, ColumnKind::Numeric | ColumnKind::Boolean)
    }
}

/// Per-column summary for the `info` command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSummary {
    pub name: String,
    pub dtype: String,
    pub kind: ColumnKind,
    pub null_count: usize,
}

/// Tabular dataset: named columns aligned by row index
#[derive(Debug, Clone)]
pub struct Dataset {
    frame: DataFrame,
}

impl Dataset {
    pub fn from_frame(frame: DataFrame) -> Self {
        Self { frame }
    }

    /// Load a CSV (or TSV) file with a header row
    pub fn from_csv(path: impl AsRef<Path>) -> Result<Self> {
        let frame = DataLoader::new().load_auto(path)?;
        Ok(Self { frame })
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn n_rows(&self) -> usize {
        self.frame.height()
    }

    pub fn n_columns(&self) -> usize {
        self.frame.width()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.frame
            .get_column_names()
            .into_iter()
            .map(|s| s.to_string())
            .collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.frame.column(name).is_ok()
    }

    fn series(&self, name: &str) -> Result<&Series> {
        self.frame
            .column(name)
            .map(|c| c.as_materialized_series())
            .map_err(|_| CvAuditError::InvalidConfiguration(format!("unknown column '{}'", name)))
    }

    pub fn column_kind(&self, name: &str) -> Result<ColumnKind> {
        Ok(ColumnKind::of(self.series(name)?.dtype()))
    }

    /// Columns that can be used as model features, in file order.
    ///
    /// Categorical columns are left out, matching the manual
    /// "keep numeric predictors only" selection step.
    pub fn numeric_columns(&self, exclude: &[&str]) -> Vec<String> {
        self.frame
            .get_columns()
            .iter()
            .filter(|c| ColumnKind::of(c.dtype()).is_model_ready())
            .map(|c| c.name().to_string())
            .filter(|name| !exclude.contains(&name.as_str()))
            .collect()
    }

    /// Drop every row whose value in `column` is missing
    pub fn drop_missing(&self, column: &str) -> Result<Dataset> {
        let mask = self.series(column)?.is_not_null();
        let frame = self.frame.filter(&mask)?;
        Ok(Dataset { frame })
    }

    /// Numeric view of one column. Missing cells and `NaN` become `None`.
    pub fn numeric_column(&self, name: &str) -> Result<Vec<Option<f64>>> {
        let series = self.series(name)?;
        let kind = ColumnKind::of(series.dtype());
        if !kind.is_model_ready() {
            return Err(CvAuditError::InvalidConfiguration(format!(
                "column '{}' has type {} which is not numeric; categorical features are not supported",
                name,
                series.dtype()
            )));
        }

        let cast = series.cast(&DataType::Float64)?;
        let values = cast
            .f64()?
            .into_iter()
            .map(|v| v.filter(|x| !x.is_nan()))
            .collect();
        Ok(values)
    }

    /// Dense feature matrix (rows x `columns`), missing cells as `NaN`
    pub fn feature_matrix(&self, columns: &[String]) -> Result<Array2<f64>> {
        if columns.is_empty() {
            return Err(CvAuditError::InvalidConfiguration(
                "at least one feature column is required".to_string(),
            ));
        }

        let n_rows = self.n_rows();
        let mut x = Array2::from_elem((n_rows, columns.len()), f64::NAN);

        for (j, name) in columns.iter().enumerate() {
            let values = self.numeric_column(name)?;
            for (i, v) in values.into_iter().enumerate() {
                if let Some(v) = v {
                    x[[i, j]] = v;
                }
            }
        }

        Ok(x)
    }

    /// Target column as a binary view: `Some(true)`, `Some(false)` or `None` if missing.
    ///
    /// Accepts boolean columns, numeric 0/1 columns and string columns holding
    /// yes/no, true/false, y/n or 1/0 (case-insensitive).
    pub fn binary_target(&self, name: &str) -> Result<Vec<Option<bool>>> {
        let series = self.series(name)?;

        match ColumnKind::of(series.dtype()) {
            ColumnKind::Boolean => Ok(series.bool()?.into_iter().collect()),
            ColumnKind::Numeric => {
                let cast = series.cast(&DataType::Float64)?;
                cast.f64()?
                    .into_iter()
                    .map(|v| match v {
                        None => Ok(None),
                        Some(x) if x.is_nan() => Ok(None),
                        Some(x) if x == 0.0 => Ok(Some(false)),
                        Some(x) if x == 1.0 => Ok(Some(true)),
                        Some(x) => Err(CvAuditError::InvalidConfiguration(format!(
                            "target column '{}' is not binary (found value {})",
                            name, x
                        ))),
                    })
                    .collect()
            }
            ColumnKind::Categorical => series
                .str()?
                .into_iter()
                .map(|v| match v {
                    None => Ok(None),
                    Some(s) => parse_flag(s).map(Some).ok_or_else(|| {
                        CvAuditError::InvalidConfiguration(format!(
                            "target column '{}' is not binary (found value '{}')",
                            name, s
                        ))
                    }),
                })
                .collect(),
            ColumnKind::Other => Err(CvAuditError::InvalidConfiguration(format!(
                "target column '{}' has unsupported type {}",
                name,
                series.dtype()
            ))),
        }
    }

    /// Fully observed target vector.
    ///
    /// Yes/no string targets are encoded as 1/0 so they can be classified.
    /// Rows with a missing target must be dropped first with [`Dataset::drop_missing`].
    pub fn target(&self, name: &str) -> Result<Array1<f64>> {
        let values: Vec<Option<f64>> = match self.column_kind(name)? {
            ColumnKind::Categorical => self
                .binary_target(name)?
                .into_iter()
                .map(|v| v.map(|b| if b { 1.0 } else { 0.0 }))
                .collect(),
            _ => self.numeric_column(name)?,
        };

        let missing = values.iter().filter(|v| v.is_none()).count();
        if missing > 0 {
            return Err(CvAuditError::InvalidConfiguration(format!(
                "target column '{}' has {} missing values; drop those rows first",
                name, missing
            )));
        }

        Ok(values.into_iter().flatten().collect())
    }

    pub fn summary(&self) -> Vec<ColumnSummary> {
        self.frame
            .get_columns()
            .iter()
            .map(|c| ColumnSummary {
                name: c.name().to_string(),
                dtype: c.dtype().to_string(),
                kind: ColumnKind::of(c.dtype()),
                null_count: c.null_count(),
            })
            .collect()
    }
}

fn parse_flag(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "yes" | "y" | "true" | "1" => Some(true),
        "no" | "n" | "false" | "0" => Some(false),
        _ => None,
    }
}
