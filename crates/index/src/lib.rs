//! Catalog index builder.
//!
//! Turns a flat catalog export into a book table plus nine inverted index
//! tables (author, series, title, genre, lang, del, date, librate, ext), each
//! sorted by value with dense ids in that order, and a `config` record
//! holding the catalog info, aggregate statistics and a catalog hash.
//!
//! ```text
//! catalog batches -> Filter -> dedup -> normalize -> accumulate (x9)
//!                 -> sort/assign -> index tables -> [optimize] -> stats -> config
//! ```
//!
//! The entry point is [`Builder::run`]. Small catalogs are built entirely in
//! memory; large ones (or any catalog with low-memory mode on) use the
//! streaming strategy, which bounds memory by flushing sorted runs to the
//! store and merging them.

pub mod build;
pub mod builder;
pub mod catalog;
pub mod dedup;
pub mod error;
pub mod filter;
pub mod models;
pub mod normalize;
pub mod optimize;
pub mod progress;
pub mod sort;
pub mod stats;

pub use crate::build::{BuildReport, Builder, Mode};
pub use crate::catalog::{CatalogEvent, CatalogSource, MemoryCatalog};
pub use crate::progress::Progress;
