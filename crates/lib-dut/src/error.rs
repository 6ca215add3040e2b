//! Error types for device records and their datasets.

use thiserror::Error;

/// Errors that can occur while interpreting a measurement key.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum KeyError {
    /// No temperature could be extracted from any part of the key.
    #[error("Unable to extract a temperature from key '{key}'")]
    NoTemperature { key: String },

    /// The key carries a temperature list where a single value is needed.
    #[error("Key '{key}' holds a temperature list, expected a single temperature")]
    NotScalar { key: String },
}

impl KeyError {
    pub fn no_temperature(key: impl Into<String>) -> Self {
        Self::NoTemperature { key: key.into() }
    }
}

/// Result type for key operations.
pub type KeyResult<T> = Result<T, KeyError>;

/// Errors raised by a dataset while it corrects itself.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataError {
    /// Inputs to a correction do not line up (row count, sweep grid, ports).
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A column required by the operation is absent.
    #[error("Missing column '{column}'")]
    MissingColumn { column: String },

    /// The correction produced or met non-finite values.
    #[error("Numerical failure: {0}")]
    Numerical(String),
}

impl DataError {
    pub fn shape_mismatch(message: impl Into<String>) -> Self {
        Self::ShapeMismatch(message.into())
    }

    pub fn missing_column(column: impl Into<String>) -> Self {
        Self::MissingColumn {
            column: column.into(),
        }
    }
}

/// Result type for dataset operations.
pub type DataResult<T> = Result<T, DataError>;
