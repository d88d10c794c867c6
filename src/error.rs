//! Error types for the import pipeline.
//!
//! Every failure is fatal to the whole import. Variants carry enough
//! provenance (file name, 1-based row number, column) to point a user at the
//! offending input without re-reading it.

use crate::datum::ParseDatumError;
use crate::schema::ColumnType;
use std::sync::Arc;
use thiserror::Error;

/// Result alias used throughout the pipeline.
pub type ImportResult<T> = std::result::Result<T, ImportError>;

/// An error that aborts an import.
#[derive(Debug, Error)]
pub enum ImportError {
    /// The tokenizer could not produce a record at all (invalid UTF-8, I/O
    /// failure while reading).
    #[error("{file}: row {row}: reading CSV record: {source}")]
    Parse {
        file: Arc<str>,
        row: u64,
        #[source]
        source: csv::Error,
    },

    /// A record had the wrong number of fields.
    #[error("{file}: row {row}: expected {expected} fields, got {actual}")]
    FieldCount {
        file: Arc<str>,
        row: u64,
        expected: usize,
        actual: usize,
    },

    /// A field could not be decoded into its column's declared type.
    #[error("{file}: row {row}: parse {column:?} as {column_type}: {raw:?}: {source}")]
    Decode {
        file: Arc<str>,
        row: u64,
        column: String,
        column_type: ColumnType,
        raw: String,
        #[source]
        source: ParseDatumError,
    },

    /// The downstream row sink rejected a row.
    #[error("converting row: {file}: row {row}: {source}")]
    Emit {
        file: Arc<str>,
        row: u64,
        #[source]
        source: anyhow::Error,
    },

    /// A sink failed its final flush.
    #[error("flushing converted rows: {0}")]
    Flush(#[source] anyhow::Error),

    /// The import was cancelled, either externally or because a sibling task
    /// failed first.
    #[error("import cancelled")]
    Cancelled,

    /// The progress callback reported a failure.
    #[error("progress callback failed: {0}")]
    Callback(#[source] anyhow::Error),

    /// The import was configured inconsistently.
    #[error("invalid import configuration: {0}")]
    Config(String),

    /// An input could not be opened or decompressed.
    #[error("{file}: {source}")]
    Io {
        file: Arc<str>,
        #[source]
        source: std::io::Error,
    },

    /// A producer or converter thread panicked.
    #[error("import worker panicked")]
    WorkerPanicked,
}

impl ImportError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// True when this error only propagates a cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// The 1-based row number the error refers to, when it refers to one.
    #[must_use]
    pub const fn row(&self) -> Option<u64> {
        match self {
            Self::Parse { row, .. }
            | Self::FieldCount { row, .. }
            | Self::Decode { row, .. }
            | Self::Emit { row, .. } => Some(*row),
            _ => None,
        }
    }

    /// The input file the error refers to, when it refers to one.
    #[must_use]
    pub fn file(&self) -> Option<&str> {
        match self {
            Self::Parse { file, .. }
            | Self::FieldCount { file, .. }
            | Self::Decode { file, .. }
            | Self::Emit { file, .. }
            | Self::Io { file, .. } => Some(&**file),
            _ => None,
        }
    }
}
