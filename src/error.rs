//! Error types for cvaudit

use thiserror::Error;

/// Result type alias for cvaudit operations
pub type Result<T> = std::result::Result<T, CvAuditError>;

/// Main error type.
///
/// Every evaluation failure is fatal to the run that raised it: the
/// evaluator never returns partial fold scores.
#[derive(Error, Debug)]
pub enum CvAuditError {
    /// Bad fold count, unknown column, unsupported column type
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Degenerate training partition or input a stage cannot fit on
    #[error("Fit error{}{}: {message}", at_fold(.fold), at_column(.column))]
    Fit {
        fold: Option<usize>,
        column: Option<String>,
        message: String,
    },

    /// Empty held-out partition or prediction/target length mismatch
    #[error("Scoring error{}: {message}", at_fold(.fold))]
    Scoring {
        fold: Option<usize>,
        message: String,
    },

    #[error("Data error: {0}")]
    DataError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Model not fitted")]
    ModelNotFitted,
}

fn at_fold(fold: &Option<usize>) -> String {
    fold.map(|f| format!(" in fold {}", f)).unwrap_or_default()
}

fn at_column(column: &Option<String>) -> String {
    column
        .as_ref()
        .map(|c| format!(" (column '{}')", c))
        .unwrap_or_default()
}

impl CvAuditError {
    /// Fit error not tied to a column
    pub fn fit(message: impl Into<String>) -> Self {
        CvAuditError::Fit {
            fold: None,
            column: None,
            message: message.into(),
        }
    }

    /// Fit error naming the offending column
    pub fn fit_column(column: impl Into<String>, message: impl Into<String>) -> Self {
        CvAuditError::Fit {
            fold: None,
            column: Some(column.into()),
            message: message.into(),
        }
    }

    pub fn scoring(message: impl Into<String>) -> Self {
        CvAuditError::Scoring {
            fold: None,
            message: message.into(),
        }
    }

    /// Attach a fold index to fit and scoring errors. Other kinds pass through.
    pub fn with_fold(self, fold_idx: usize) -> Self {
        match self {
            CvAuditError::Fit { column, message, .. } => CvAuditError::Fit {
                fold: Some(fold_idx),
                column,
                message,
            },
            CvAuditError::Scoring { message, .. } => CvAuditError::Scoring {
                fold: Some(fold_idx),
                message,
            },
            other => other,
        }
    }

    /// Fold index the error was raised in, if any
    pub fn fold(&self) -> Option<usize> {
        match self {
            CvAuditError::Fit { fold, .. } | CvAuditError::Scoring { fold, .. } => *fold,
            _ => None,
        }
    }
}

impl From<polars::error::PolarsError> for CvAuditError {
    fn from(err: polars::error::PolarsError) -> Self {
        CvAuditError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for CvAuditError {
    fn from(err: serde_json::Error) -> Self {
        CvAuditError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for CvAuditError {
    fn from(err: ndarray::ShapeError) -> Self {
        CvAuditError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}
