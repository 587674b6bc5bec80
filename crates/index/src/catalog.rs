//! Catalog parser boundary.
//!
//! The parser that tokenizes and decompresses catalog archives lives outside
//! this crate. It is consumed as a [`CatalogSource`]: a stream of read
//! progress and record batches, followed by the catalog's own description.

use crate::error::Result;
use crate::models::{BookRecord, CatalogInfo};
use async_stream::stream;
use futures::Stream;
use std::pin::Pin;

/// Items produced while a catalog is parsed.
///
/// [`Progress`](Self::Progress) and [`Batch`](Self::Batch) may interleave in
/// any order. Record order across batches is the arrival order that ids are
/// assigned in.
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogEvent {
    /// `current` of `total_files` catalog files have been read.
    Progress { current: u64, total_files: u64 },
    /// Records in arrival order. Their `id` is ignored.
    Batch(Vec<BookRecord>),
}

pub type CatalogStream<'a> = Pin<Box<dyn Stream<Item = Result<CatalogEvent>> + Send + 'a>>;

/// A parsed catalog export.
///
/// Parser failures should be yielded as [`ErrorKind::Catalog`](crate::error::ErrorKind::Catalog)
/// errors; the build aborts on the first one.
pub trait CatalogSource: Send + Sync {
    /// Parse the catalog from the start.
    fn parse(&self) -> CatalogStream<'_>;

    /// Catalog description. Only guaranteed to be complete once
    /// [`parse`](Self::parse) has been consumed to the end.
    fn info(&self) -> CatalogInfo;
}

/// Catalog held entirely in memory, one batch per catalog file.
///
/// # Examples
///
/// ```
/// use shelf_index::catalog::{CatalogEvent, CatalogSource, MemoryCatalog};
/// use shelf_index::models::BookRecord;
/// use futures::StreamExt;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let book = BookRecord { uid: "u1".to_string(), ..Default::default() };
/// let catalog = MemoryCatalog::new(vec![vec![book]]);
/// let events: Vec<_> = catalog.parse().collect().await;
/// assert_eq!(events.len(), 2);
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    info: CatalogInfo,
    batches: Vec<Vec<BookRecord>>,
}

impl MemoryCatalog {
    pub fn new(batches: Vec<Vec<BookRecord>>) -> Self {
        Self {
            info: CatalogInfo::default(),
            batches,
        }
    }

    pub fn with_info(mut self, info: CatalogInfo) -> Self {
        self.info = info;
        self
    }
}

impl CatalogSource for MemoryCatalog {
    fn parse(&self) -> CatalogStream<'_> {
        let total_files = self.batches.len() as u64;
        // `rustfmt` does not format macros that use braces. Wrap in parentheses!
        Box::pin(stream!({
            for (file, batch) in self.batches.iter().enumerate() {
                yield Ok(CatalogEvent::Batch(batch.clone()));
                yield Ok(CatalogEvent::Progress {
                    current: file as u64 + 1,
                    total_files,
                });
            }
        }))
    }

    fn info(&self) -> CatalogInfo {
        self.info.clone()
    }
}
