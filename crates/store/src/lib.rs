//! Embedded record store for catalog indexes.
//!
//! A build writes every table through a [`StoreHandle`], so the same builder
//! runs against SQLite in production and against the in-memory backend
//! (feature `mock`) in tests.

pub mod backend;
pub mod error;
mod name;
mod row;

pub use crate::backend::{META_TABLE, Store};
pub use crate::name::validate as validate_name;
pub use crate::row::{Document, IndexSpec, Predicate, Row};
use std::sync::Arc;

pub type StoreHandle = Arc<dyn Store + Send + Sync>;
