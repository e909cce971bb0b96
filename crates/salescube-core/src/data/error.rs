//! Error types for data operations

use thiserror::Error;

/// Result type for data operations
pub type DataResult<T> = Result<T, DataError>;

/// Errors that can occur during data operations
#[derive(Debug, Clone, Error)]
pub enum DataError {
    /// Arrow error (from arrow-rs)
    #[error("Arrow error: {0}")]
    Arrow(String),
    /// Column not found in DataFrame
    #[error("column not found: {0}")]
    ColumnNotFound(String),
    /// Invalid column index
    #[error("invalid column index: {0}")]
    InvalidColumnIndex(usize),
    /// Type mismatch during operation
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },
    /// Numeric aggregate requested over a non-numeric column
    #[error("cannot compute {op} of non-numeric column '{column}' ({found})")]
    NonNumeric {
        op: &'static str,
        column: String,
        found: String,
    },
    /// Column whose type cannot partition rows into groups
    #[error("column '{column}' of type {found} cannot be used as a group key")]
    UngroupableColumn { column: String, found: String },
    /// Invalid operation for the data type
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
    /// I/O error (file read/write)
    #[error("I/O error: {0}")]
    Io(String),
    /// Schema mismatch
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),
    /// Parquet error
    #[error("Parquet error: {0}")]
    Parquet(String),
    /// CSV error
    #[error("CSV error: {0}")]
    Csv(String),
    /// JSON error
    #[error("JSON error: {0}")]
    Json(String),
    /// SQLite warehouse error
    #[error("SQLite error: {0}")]
    Sqlite(String),
    /// Timestamp text that no supported format accepts
    #[error("cannot parse '{value}' in column '{column}' as a timestamp")]
    Timestamp { column: String, value: String },
    /// Index out of bounds
    #[error("index {index} out of bounds for length {length}")]
    OutOfBounds { index: usize, length: usize },
}

impl DataError {
    /// Whether the error comes from naming data the table cannot supply,
    /// rather than from computing over it
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            DataError::ColumnNotFound(_) | DataError::UngroupableColumn { .. }
        )
    }
}

impl From<arrow::error::ArrowError> for DataError {
    fn from(err: arrow::error::ArrowError) -> Self {
        DataError::Arrow(err.to_string())
    }
}

impl From<std::io::Error> for DataError {
    fn from(err: std::io::Error) -> Self {
        DataError::Io(err.to_string())
    }
}

impl From<parquet::errors::ParquetError> for DataError {
    fn from(err: parquet::errors::ParquetError) -> Self {
        DataError::Parquet(err.to_string())
    }
}

impl From<rusqlite::Error> for DataError {
    fn from(err: rusqlite::Error) -> Self {
        DataError::Sqlite(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DataError::ColumnNotFound("region".to_string());
        assert_eq!(err.to_string(), "column not found: region");

        let err = DataError::NonNumeric {
            op: "sum",
            column: "product_name".to_string(),
            found: "Utf8".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "cannot compute sum of non-numeric column 'product_name' (Utf8)"
        );
    }
}
