//! Data loading utilities

use crate::error::{CvAuditError, Result};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;

/// CSV loader backed by polars
pub struct DataLoader {
    /// Rows sampled for schema inference; `None` scans the whole file
    infer_schema_length: Option<usize>,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DataLoader {
    /// Create a new data loader
    pub fn new() -> Self {
        Self {
            infer_schema_length: None,
        }
    }

    /// Cap the rows polars samples to infer column types
    pub fn with_infer_schema_length(mut self, rows: usize) -> Self {
        self.infer_schema_length = Some(rows.max(1));
        self
    }

    /// Load a comma-separated file with a header row
    pub fn load_csv(&self, path: impl AsRef<Path>) -> Result<DataFrame> {
        self.load_csv_with_options(path, b',', true)
    }

    /// Load a delimited file with specific options
    pub fn load_csv_with_options(
        &self,
        path: impl AsRef<Path>,
        delimiter: u8,
        has_header: bool,
    ) -> Result<DataFrame> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            CvAuditError::DataError(format!("cannot open {}: {}", path.display(), e))
        })?;

        let parse_opts = CsvParseOptions::default().with_separator(delimiter);

        CsvReadOptions::default()
            .with_has_header(has_header)
            .with_infer_schema_length(self.infer_schema_length)
            .with_parse_options(parse_opts)
            .into_reader_with_file_handle(file)
            .finish()
            .map_err(|e| CvAuditError::DataError(e.to_string()))
    }

    /// Pick the delimiter from the extension (`.tsv` is tab-separated) and load
    pub fn load_auto(&self, path: impl AsRef<Path>) -> Result<DataFrame> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match ext.as_str() {
            "tsv" => self.load_csv_with_options(path, b'\t', true),
            _ => self.load_csv(path),
        }
    }
}
