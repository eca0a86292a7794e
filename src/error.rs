use std::path::PathBuf;

use thiserror::Error;

/// Convenience result type for extraction, merge and storage operations.
pub type EtlResult<T> = Result<T, EtlError>;

/// Error type returned across the pipeline.
///
/// Cell-level problems never surface here: the value normalizer resolves them to an absent value.
/// What remains are failures an operator has to look at (unreadable files, bad configuration,
/// a canonical dataset that no longer parses).
#[derive(Debug, Error)]
pub enum EtlError {
    /// Underlying I/O error (e.g. permission denied, disk full).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The workbook could not be opened or a sheet could not be decoded.
    #[error("excel error: {0}")]
    Excel(#[from] calamine::Error),

    /// CSV read/write error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// Parquet read/write error.
    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// Mass-balance report JSON could not be decoded.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Settings or layout documents are invalid.
    #[error("config error: {message}")]
    Config { message: String },

    /// A stored dataset does not carry the columns its kind requires.
    #[error("schema mismatch: {message}")]
    SchemaMismatch { message: String },

    /// A stored value could not be parsed into the column's [`crate::types::DataType`].
    #[error("failed to parse value at row {row} column '{column}': {message} (raw='{raw}')")]
    ParseError {
        row: usize,
        column: String,
        raw: String,
        message: String,
    },

    /// The source file handed to an import does not exist.
    #[error("source file not found: {}", path.display())]
    SourceNotFound { path: PathBuf },

    /// No source file matched the family's pattern in the data directory.
    #[error("no file matching '{pattern}' in {}", dir.display())]
    NoSourceMatch { dir: PathBuf, pattern: String },

    /// The canonical dataset exists but cannot be read back.
    #[error("existing dataset {} is unreadable: {message}", path.display())]
    CorruptHistory { path: PathBuf, message: String },

    /// A patch pass needs an existing dataset and none was found.
    #[error("nothing to patch: {} does not exist", path.display())]
    NothingToPatch { path: PathBuf },
}

impl EtlError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

impl From<toml::de::Error> for EtlError {
    fn from(err: toml::de::Error) -> Self {
        Self::config(err.to_string())
    }
}
