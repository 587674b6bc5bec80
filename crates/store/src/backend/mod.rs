//! Store trait and implementations.
//!
//! This module defines the [`Store`] trait: the small set of primitives the
//! index builder needs from an embedded key-ordered record store. Every table
//! is a map from a `u64` row id to a JSON document; ids are chosen by the
//! caller and iteration is always in ascending id order.

#[cfg(feature = "mock")]
mod memory;
mod sqlite;

#[cfg(feature = "mock")]
pub use self::memory::MemoryStore;
pub use self::sqlite::SqliteStore;
use crate::error::Result;
use crate::row::{IndexSpec, Predicate, Row};
use async_trait::async_trait;
use serde_json::Value;

/// Unified interface for record stores.
///
/// The store is assumed to be single-writer for the duration of a build;
/// implementations do not need to arbitrate between concurrent writers.
///
/// # Examples
///
/// ```
/// use shelf_store::{Row, Store, error::Result};
///
/// async fn copy_first_page(store: &dyn Store) -> Result<usize> {
///     let rows: Vec<Row> = store.select_page("book", 0, 100).await?;
///     store.create_table("book_copy").await?;
///     let copied = rows.len();
///     store.insert("book_copy", rows).await?;
///     Ok(copied)
/// }
/// ```
#[async_trait]
pub trait Store: Send + Sync {
    /// Name of the backend (used for logging only).
    fn name(&self) -> &str;

    /// Create an empty table, replacing any existing table of the same name.
    async fn create_table(&self, table: &str) -> Result<()>;

    /// Drop a table and its indexes. Dropping a missing table is a no-op.
    async fn drop_table(&self, table: &str) -> Result<()>;

    /// Rename a table, replacing any existing table at the destination.
    async fn rename_table(&self, from: &str, to: &str) -> Result<()>;

    /// Whether a table currently exists.
    async fn table_exists(&self, table: &str) -> Result<bool>;

    /// Build a secondary index on a top-level document field.
    ///
    /// Returns [`Constraint`](crate::error::ErrorKind::Constraint) if the
    /// index is unique and existing rows already violate it.
    async fn create_index(&self, table: &str, index: &IndexSpec) -> Result<()>;

    /// Remove a secondary index previously built with [`create_index`](Self::create_index).
    async fn drop_index(&self, table: &str, field: &str) -> Result<()>;

    /// Insert rows. Row ids must not already exist in the table.
    async fn insert(&self, table: &str, rows: Vec<Row>) -> Result<()>;

    /// Up to `limit` rows with an id strictly greater than `after`, in
    /// ascending id order. Pass `0` to start from the beginning.
    async fn select_page(&self, table: &str, after: u64, limit: usize) -> Result<Vec<Row>>;

    /// Rows with the given ids, in ascending id order. Missing ids are skipped.
    ///
    /// Callers should pass ids sorted ascending: backends walk their primary
    /// key in order and unsorted batches degrade to random access.
    async fn select_ids(&self, table: &str, ids: &[u64]) -> Result<Vec<Row>>;

    /// Rows matching a predicate, in ascending id order.
    async fn select_where(&self, table: &str, predicate: &Predicate) -> Result<Vec<Row>>;

    /// Number of rows in a table.
    async fn count(&self, table: &str) -> Result<u64>;

    /// Delete rows by id, returning how many were removed.
    async fn delete_ids(&self, table: &str, ids: &[u64]) -> Result<u64>;

    /// Delete rows matching a predicate, returning how many were removed.
    async fn delete_where(&self, table: &str, predicate: &Predicate) -> Result<u64>;

    /// Ids of rows whose `field` value already occurred on a row with a
    /// lower id, ascending. Build an index on `field` first to avoid a
    /// quadratic scan.
    async fn duplicate_ids(&self, table: &str, field: &str) -> Result<Vec<u64>>;

    /// Write key/value pairs into the `config` table. Either every pair is
    /// written or none is.
    async fn put_meta(&self, entries: &[(&str, Value)]) -> Result<()>;

    /// Read a value from the `config` key/value table.
    async fn get_meta(&self, key: &str) -> Result<Option<Value>>;

    /// Hint that the backend may release cached memory now.
    async fn free_memory(&self) -> Result<()>;
}

/// Name of the key/value table written by [`Store::put_meta`].
pub const META_TABLE: &str = "config";
