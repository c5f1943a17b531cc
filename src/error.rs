//! Error type shared by the record engine.
//!
//! Everything below the binary returns [`Result`]. The command line and the
//! Parquet sink wrap these in `anyhow` with context, the same way the rest of
//! the I/O paths do.

use arrow::error::ArrowError;
use thiserror::Error;

/// Errors raised while building records or finalizing columns.
#[derive(Debug, Error)]
pub enum Error {
    /// A value that cannot be represented in the target type of its column.
    ///
    /// This is a contract violation by the caller and is never coerced away.
    #[error("malformed value at '{path}': {reason}")]
    MalformedValue { path: String, reason: String },

    /// A nested value met a scalar column, or the other way round.
    ///
    /// Records routed through a repository never trigger this since the
    /// shape is part of the routing key.
    #[error("shape mismatch at '{path}': column holds {expected}, row carries {found}")]
    ShapeMismatch {
        path: String,
        expected: String,
        found: String,
    },

    /// An index path walked past the children of one level.
    #[error("path {path:?} is out of range at depth {depth} ({len} children)")]
    PathOutOfRange {
        path: Vec<usize>,
        depth: usize,
        len: usize,
    },

    /// The repository allocator refused to hand out more array memory.
    #[error("array memory limit exceeded: {requested} bytes requested, limit is {limit} bytes")]
    ResourceExhausted { requested: usize, limit: usize },

    /// The top level of a JSON document was not an object.
    #[error("expected a JSON object at the top level, got {0}")]
    NotAnObject(String),

    #[error(transparent)]
    Arrow(#[from] ArrowError),
}

impl Error {
    /// Fills in the field path of a value error raised below the column layer.
    pub fn at_path(self, at: &str) -> Self {
        match self {
            Error::MalformedValue { path, reason } if path.is_empty() => Error::MalformedValue {
                path: at.to_string(),
                reason,
            },
            other => other,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
