//! Sorting, id assignment and persistence of index tables.
//!
//! Ids are dense and follow value order: for every saved table,
//! `entry[i].value < entry[i + 1].value` and `entry[i].id < entry[i + 1].id`.
//! The sentinel purge may leave a gap in the ids afterwards; ids are never
//! reassigned.

use crate::error::{ErrorKind, Result};
use crate::models::{Category, IndexEntry, TableSummary};
use crate::normalize::SENTINEL;
use crate::progress::Phase;
use exn::ResultExt;
use shelf_store::{IndexSpec, Predicate, Row, Store};
use tracing::instrument;

/// Sort entries by value, then number them 1..=N in that order.
pub fn sort_and_assign(entries: &mut [IndexEntry]) {
    entries.sort_unstable_by(|a, b| a.value.cmp(&b.value));
    for (position, entry) in entries.iter_mut().enumerate() {
        entry.id = position as u64 + 1;
    }
}

/// Writes entries in order, numbering them and inserting in fixed-size chunks.
pub struct TableWriter<'a> {
    store: &'a dyn Store,
    table: String,
    chunk_size: usize,
    buffer: Vec<Row>,
    written: u64,
}

impl<'a> TableWriter<'a> {
    /// Create (or replace) the table and start writing at id 1.
    pub async fn create(store: &'a dyn Store, table: impl Into<String>, chunk_size: usize) -> Result<Self> {
        let table = table.into();
        store.create_table(&table).await.or_raise(|| ErrorKind::Store)?;
        Ok(Self {
            store,
            table,
            chunk_size: chunk_size.max(1),
            buffer: Vec::with_capacity(chunk_size.max(1)),
            written: 0,
        })
    }

    /// Append the next entry, numbered after the previous one. Entries must
    /// arrive in value order.
    pub async fn push(&mut self, mut entry: IndexEntry) -> Result<()> {
        entry.id = self.written + 1;
        self.push_row(Row::from_document(&entry).or_raise(|| ErrorKind::Store)?).await
    }

    /// Append a row that already carries its id.
    pub async fn push_row(&mut self, row: Row) -> Result<()> {
        self.written += 1;
        self.buffer.push(row);
        if self.buffer.len() >= self.chunk_size {
            self.flush().await?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let rows = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.chunk_size));
        self.store.insert(&self.table, rows).await.or_raise(|| ErrorKind::Store)
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flush what is left and return the number of entries written.
    pub async fn finish(mut self) -> Result<u64> {
        self.flush().await?;
        Ok(self.written)
    }
}

/// Sort, number and persist one category's entries, consuming them.
///
/// The table is replaced, indexed on `value`, and the sentinel entry is
/// purged for categories that ask for it.
#[instrument(level = "debug", skip(store, entries, progress), fields(entries = entries.len()))]
pub async fn save_table(
    store: &dyn Store,
    category: Category,
    mut entries: Vec<IndexEntry>,
    chunk_size: usize,
    progress: &mut Phase<'_, '_>,
) -> Result<TableSummary> {
    sort_and_assign(&mut entries);
    progress.set(0.1);
    let total = entries.len().max(1) as f64;
    let mut writer = TableWriter::create(store, category.table(), chunk_size).await?;
    for entry in entries {
        writer.push(entry).await?;
        if writer.written() % chunk_size.max(1) as u64 == 0 {
            progress.set(0.1 + 0.8 * writer.written() as f64 / total);
        }
    }
    let written = writer.finish().await?;
    finalize_table(store, category, written, progress).await
}

/// Index the saved table on `value` and apply the sentinel purge.
pub async fn finalize_table(
    store: &dyn Store,
    category: Category,
    written: u64,
    progress: &mut Phase<'_, '_>,
) -> Result<TableSummary> {
    store.create_index(category.table(), &IndexSpec::unique("value")).await.or_raise(|| ErrorKind::Store)?;
    let purged = if category.purges_sentinel() { purge_sentinel(store, category).await? } else { 0 };
    store.free_memory().await.or_raise(|| ErrorKind::Store)?;
    progress.set(1.0);
    tracing::info!(table = category.table(), entries = written, purged, "index table saved");
    Ok(TableSummary {
        category,
        entries: written,
        purged,
    })
}

/// Delete the sentinel entry from a saved table; returns how many rows went.
pub async fn purge_sentinel(store: &dyn Store, category: Category) -> Result<u64> {
    store
        .delete_where(category.table(), &Predicate::equals("value", SENTINEL))
        .await
        .or_raise(|| ErrorKind::Store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IndexValue;
    use crate::progress::Reporter;
    use shelf_store::backend::MemoryStore;

    fn entry(value: impl Into<IndexValue>, books: &[u64]) -> IndexEntry {
        let value = value.into();
        let mut entry = IndexEntry::new(value.clone(), value.to_string());
        for book in books {
            entry.add(*book, false);
        }
        entry
    }

    #[test]
    fn test_sort_and_assign() {
        let mut entries = vec![entry("b", &[1]), entry("?", &[2]), entry("a", &[3])];
        sort_and_assign(&mut entries);
        let order: Vec<(u64, String)> = entries.iter().map(|e| (e.id, e.value.to_string())).collect();
        assert_eq!(order, vec![(1, "?".to_string()), (2, "a".to_string()), (3, "b".to_string())]);
    }

    #[test]
    fn test_numeric_order() {
        let mut entries = vec![entry(10, &[]), entry(9, &[]), entry(0, &[])];
        sort_and_assign(&mut entries);
        assert_eq!(entries.iter().map(|e| e.value.clone()).collect::<Vec<_>>(), vec![
            IndexValue::from(0),
            IndexValue::from(9),
            IndexValue::from(10),
        ]);
    }

    #[tokio::test]
    async fn test_save_table_in_chunks() {
        let store = MemoryStore::default();
        let mut reporter = Reporter::silent();
        let entries = vec![entry("c", &[1]), entry("a", &[2]), entry("b", &[3])];
        let summary = save_table(&store, Category::Title, entries, 2, &mut reporter.phase(0.0, 1.0)).await.unwrap();
        assert_eq!(summary.count(), 3);
        let rows = store.select_page("title", 0, 10).await.unwrap();
        let saved: Vec<IndexEntry> = rows.into_iter().map(|row| row.into_document().unwrap()).collect();
        assert_eq!(saved.iter().map(|e| e.name.as_str()).collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert_eq!(saved.iter().map(|e| e.id).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_series_sentinel_is_purged() {
        let store = MemoryStore::default();
        let mut reporter = Reporter::silent();
        let entries = vec![entry("?", &[1]), entry("dune", &[2])];
        let summary = save_table(&store, Category::Series, entries, 10, &mut reporter.phase(0.0, 1.0)).await.unwrap();
        assert_eq!((summary.entries, summary.purged, summary.count()), (2, 1, 1));
        let rows = store.select_page("series", 0, 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        // The surviving entry keeps the id it was assigned before the purge.
        assert_eq!(rows[0].id, 2);
    }
}
