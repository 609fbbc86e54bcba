//! Error types for bosc.

use std::path::PathBuf;
use thiserror::Error;

/// bosc error types.
#[derive(Error, Debug)]
pub enum Error {
    /// A file could not be opened, read or written
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A database dump record that is not `pattern<TAB>count`
    #[error("{path}:{line}: malformed record: {reason}")]
    MalformedRecord {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// The syscall index file contained no names
    #[error("{path}: syscall index is empty")]
    EmptyIndex { path: PathBuf },

    /// A parameter range that cannot be iterated
    #[error("invalid range: {0}")]
    InvalidRange(String),

    /// A pattern that cannot be parsed from its textual form
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    /// A configuration value that is out of bounds
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Testing was requested before a successful training phase
    #[error("classifier has no trained profile")]
    NotTrained,
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for bosc operations.
pub type Result<T> = std::result::Result<T, Error>;
