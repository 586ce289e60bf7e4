//! Error handling for the panel pipeline.

pub mod util;

use arrow::error::ArrowError;
use parquet::errors::ParquetError;
use std::io;
use std::path::PathBuf;

/// Errors raised by loading, normalising and exporting panel tables
#[derive(Debug, thiserror::Error)]
pub enum PanelError {
    /// Error opening or reading a file
    #[error("IO error: {message}{}", path_suffix(.path))]
    Io {
        /// What was being attempted
        message: String,
        /// The file or directory involved, if known
        path: Option<PathBuf>,
        /// Underlying IO error
        #[source]
        source: Option<io::Error>,
    },

    /// Error processing Parquet data
    #[error("Parquet error: {0}")]
    Parquet(#[from] ParquetError),

    /// Error processing Arrow data
    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    /// Error converting rows to or from record batches
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_arrow::Error),

    /// Error reading or writing JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// One or more required columns are absent from an input table
    #[error("{table} table is missing required columns {missing:?}; available columns: {available:?}")]
    MissingColumns {
        /// Which input table was being loaded
        table: String,
        /// Every required column that was not found
        missing: Vec<String>,
        /// The columns that were present
        available: Vec<String>,
    },

    /// A column exists but cannot be converted to the type it is used as
    #[error("Column '{column}' has unsupported type {data_type}; expected {expected}")]
    ColumnType {
        /// Column name
        column: String,
        /// The type found in the input
        data_type: String,
        /// Description of the accepted types
        expected: String,
    },

    /// A required value is null or malformed
    #[error("Invalid value in column '{column}' at row {row}: {message}")]
    InvalidValue {
        /// Column name
        column: String,
        /// Row index within the concatenated input
        row: usize,
        /// What is wrong with the value
        message: String,
    },

    /// A period label that is neither `YYYYQn` nor `YYYY-Qn`
    #[error("Invalid period: {0}")]
    InvalidPeriod(String),

    /// Invalid pipeline configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

fn path_suffix(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| format!(" ({})", p.display()))
        .unwrap_or_default()
}

impl PanelError {
    /// Create an IO error with a message and no underlying source
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
            path: None,
            source: None,
        }
    }

    /// Create an IO error wrapping an underlying `io::Error`
    pub fn io_with_source(message: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            message: message.into(),
            path: None,
            source: Some(source),
        }
    }

    /// Attach a path to an IO error; other variants are returned unchanged
    #[must_use]
    pub fn with_path(self, new_path: impl Into<PathBuf>) -> Self {
        match self {
            Self::Io {
                message, source, ..
            } => Self::Io {
                message,
                path: Some(new_path.into()),
                source,
            },
            other => other,
        }
    }

    /// Create an error for a null in a column that does not allow nulls
    pub fn null_value(column: &str, row: usize) -> Self {
        Self::InvalidValue {
            column: column.to_string(),
            row,
            message: "null in a required column".to_string(),
        }
    }
}

impl From<io::Error> for PanelError {
    fn from(error: io::Error) -> Self {
        Self::io_with_source("IO operation failed", error)
    }
}

/// Result type for panel operations
pub type Result<T> = std::result::Result<T, PanelError>;
