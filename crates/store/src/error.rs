//! Store Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A store error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The underlying database rejected or failed an operation.
    #[display("database error")]
    Database,
    /// Table or field identifier is not safe to use as an SQL identifier.
    #[display("invalid identifier: {_0}")]
    InvalidName(#[error(not(source))] String),
    /// The table has not been created (or has already been dropped).
    #[display("table not found: {_0}")]
    TableNotFound(#[error(not(source))] String),
    /// A unique index or primary key would be violated.
    #[display("constraint violation in table: {_0}")]
    Constraint(#[error(not(source))] String),
    /// A stored document could not be (de)serialized.
    #[display("invalid document data")]
    InvalidData,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // A build is single-writer; nothing here gets better by trying again.
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_display() {
        assert_eq!(ErrorKind::TableNotFound("author".to_string()).to_string(), "table not found: author");
        assert_eq!(ErrorKind::InvalidName("a b".to_string()).to_string(), "invalid identifier: a b");
        assert_eq!(ErrorKind::Database.to_string(), "database error");
    }
}
