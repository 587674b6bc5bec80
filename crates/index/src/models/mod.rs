mod book;
mod category;
mod entry;
mod idmap;
mod info;
mod stats;

pub use self::book::BookRecord;
pub use self::category::Category;
pub use self::entry::{IndexEntry, IndexValue, MergedIndexRecord};
pub use self::idmap::{BookIdMap, Resolved};
pub use self::info::CatalogInfo;
pub use self::stats::{Stats, TableSummary};
