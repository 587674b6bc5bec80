use crate::models::Category;
use serde::{Deserialize, Serialize};

/// Aggregate counts persisted as `config.stats`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Stats {
    /// Distinct active files.
    pub files_count: u64,
    pub files_count_all: u64,
    /// Distinct deleted files that have no active counterpart.
    pub files_del_count: u64,
    /// Raw records read from the catalog, including rejected ones.
    pub recs_loaded: u64,
    /// Distinct author names, not counting co-author combinations.
    pub author_count: u64,
    /// Rows in the author table.
    pub author_count_all: u64,
    pub book_count: u64,
    pub book_count_all: u64,
    pub book_del_count: u64,
    pub no_author_book_count: u64,
    pub title_count: u64,
    pub series_count: u64,
    pub genre_count: u64,
    pub lang_count: u64,
}

/// Outcome of saving one index table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSummary {
    pub category: Category,
    /// Entries written, before any purge.
    pub entries: u64,
    /// Entries removed by the sentinel purge.
    pub purged: u64,
}

impl TableSummary {
    /// Rows left in the table.
    pub fn count(&self) -> u64 {
        self.entries - self.purged
    }
}
