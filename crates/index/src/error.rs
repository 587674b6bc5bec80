//! Index Builder Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Store failures are not translated:
//! they are raised as [`ErrorKind::Store`] with the store's own error tree
//! kept as the child frame.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// An index build error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for index build operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Fix the configuration or filter file and run again. Raised before any
    /// table is touched.
    #[display("configuration error: {_0}")]
    Config(#[error(not(source))] String),
    /// The catalog parser failed; the catalog is probably corrupt.
    #[display("catalog could not be read")]
    Catalog,
    /// A store operation failed and the build was aborted.
    #[display("store operation failed")]
    Store,
    /// Reading the catalog or writing an output file failed.
    #[display("I/O error: {}", _0.display())]
    Io(#[error(not(source))] PathBuf),
    /// A persisted row could not be decoded into the expected shape.
    #[display("invalid data in table: {_0}")]
    InvalidData(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_))
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_display() {
        assert_eq!(ErrorKind::config("no catalog").to_string(), "configuration error: no catalog");
        assert_eq!(ErrorKind::Io(PathBuf::from("x/author_id.map")).to_string(), "I/O error: x/author_id.map");
        assert!(!ErrorKind::Store.is_retryable());
    }
}
