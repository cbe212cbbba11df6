//! Error type shared by storage, traversal and the worker.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, GraphError>;

/// Fatal and query-internal failures.
///
/// Request-level problems that only affect one client are reported through
/// [`crate::query::Rejection`] instead.
#[derive(Debug, Error)]
pub enum GraphError {
    /// I/O error without a useful path.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// I/O error on a specific file.
    #[error("{}: {source}", path.display())]
    File {
        /// File being read or written.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },
    /// The graph encoding violates a structural invariant.
    #[error("corruption detected: {0}")]
    Corruption(String),
    /// Malformed builder input.
    #[error("line {line}: {message}")]
    InvalidInput {
        /// 1-based input line number.
        line: u64,
        /// What was wrong with it.
        message: String,
    },
    /// Caller passed an argument the operation cannot accept.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// A backing array would exceed what the 32-bit encoding can address.
    #[error("capacity exceeded: {0}")]
    Capacity(String),
    /// The job owning this computation was cancelled.
    #[error("query cancelled")]
    Cancelled,
}

impl GraphError {
    pub(crate) fn file(path: impl AsRef<Path>, source: io::Error) -> Self {
        GraphError::File {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub(crate) fn corruption(message: impl Into<String>) -> Self {
        GraphError::Corruption(message.into())
    }

    /// Whether this error must stop the process.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, GraphError::Cancelled)
    }
}
