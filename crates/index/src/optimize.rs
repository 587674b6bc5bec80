//! Full optimization: inline book rows into index records.
//!
//! For an optimized category every entry of `<category>` is rewritten into
//! `<category>_book` as a [`MergedIndexRecord`] carrying its complete book
//! rows, and a [`BookIdMap`] from book id to record id is written next to
//! the database as `<category>_id.map`.

use crate::error::{ErrorKind, Result};
use crate::models::{BookIdMap, BookRecord, Category, IndexEntry, IndexValue, MergedIndexRecord};
use crate::progress::Phase;
use crate::sort::TableWriter;
use exn::ResultExt;
use shelf_config::Tuning;
use shelf_store::{Row, Store};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;
use tracing::instrument;

/// Co-author combination entries (`"a, b"`) are merged like any other entry
/// but left out of the id map, so a co-authored book maps to exactly one
/// record per author.
fn maps_books(category: Category, entry: &IndexEntry) -> bool {
    match (&entry.value, category) {
        (IndexValue::Text(value), Category::Author) => !value.contains(','),
        _ => true,
    }
}

/// Optimize one category and write its id map into `data_dir`.
///
/// With `pace` set, the store is asked to release memory and the optimizer
/// pauses every `pacing_interval` merged chunks.
#[instrument(level = "debug", skip(store, tuning, progress))]
pub async fn optimize_table(
    store: &dyn Store,
    category: Category,
    book_table: &str,
    data_dir: &Path,
    tuning: &Tuning,
    pace: bool,
    progress: &mut Phase<'_, '_>,
) -> Result<BookIdMap> {
    let source = category.table();
    let total = store.count(source).await.or_raise(|| ErrorKind::Store)?.max(1) as f64;
    let mut writer = TableWriter::create(store, category.merged_table(), tuning.insert_chunk_size).await?;
    let mut refs: BTreeMap<u64, Vec<u64>> = BTreeMap::new();
    let mut chunk: Vec<IndexEntry> = Vec::new();
    let mut chunk_refs = 0;
    let mut chunks = 0usize;
    let mut processed = 0u64;
    let mut after = 0;
    loop {
        let page = store.select_page(source, after, tuning.scan_chunk_size).await.or_raise(|| ErrorKind::Store)?;
        let Some(last) = page.last() else {
            break;
        };
        after = last.id;
        for row in page {
            let entry: IndexEntry = row.into_document().or_raise(|| ErrorKind::InvalidData(source.to_string()))?;
            chunk_refs += entry.book_ids.len();
            chunk.push(entry);
            if chunk_refs >= tuning.optimize_batch_refs {
                processed += merge_chunk(store, category, book_table, &mut chunk, &mut refs, &mut writer).await?;
                chunk_refs = 0;
                progress.set(0.9 * processed as f64 / total);

                chunks += 1;
                if pace && chunks % tuning.pacing_interval.max(1) == 0 {
                    store.free_memory().await.or_raise(|| ErrorKind::Store)?;
                    tokio::time::sleep(Duration::from_millis(tuning.pacing_delay_ms)).await;
                    tracing::debug!(chunks, "paused optimizing");
                }
            }
        }
    }
    processed += merge_chunk(store, category, book_table, &mut chunk, &mut refs, &mut writer).await?;
    let written = writer.finish().await?;
    progress.set(0.9 * processed as f64 / total);

    let map = BookIdMap::from_refs(refs);
    let path = data_dir.join(category.id_map_file());
    let contents = serde_json::to_vec(&map).or_raise(|| ErrorKind::Io(path.clone()))?;
    tokio::fs::create_dir_all(data_dir).await.or_raise(|| ErrorKind::Io(data_dir.to_path_buf()))?;
    tokio::fs::write(&path, contents).await.or_raise(|| ErrorKind::Io(path.clone()))?;
    store.free_memory().await.or_raise(|| ErrorKind::Store)?;
    progress.set(1.0);
    tracing::info!(table = %category.merged_table(), records = written, ambiguous = map.ambiguous(), "table optimized");
    Ok(map)
}

/// Resolve and inline the books of one chunk of entries, draining it.
async fn merge_chunk(
    store: &dyn Store,
    category: Category,
    book_table: &str,
    chunk: &mut Vec<IndexEntry>,
    refs: &mut BTreeMap<u64, Vec<u64>>,
    writer: &mut TableWriter<'_>,
) -> Result<u64> {
    if chunk.is_empty() {
        return Ok(0);
    }
    // Sorted lookups walk the book table's primary key in order.
    let mut ids: Vec<u64> = chunk.iter().flat_map(|entry| entry.book_ids.iter().copied()).collect();
    ids.sort_unstable();
    ids.dedup();
    let books: HashMap<u64, BookRecord> = store
        .select_ids(book_table, &ids)
        .await
        .or_raise(|| ErrorKind::Store)?
        .into_iter()
        .map(|row| Ok((row.id, row.into_document().or_raise(|| ErrorKind::InvalidData(book_table.to_string()))?)))
        .collect::<Result<_>>()?;

    let count = chunk.len() as u64;
    for entry in chunk.drain(..) {
        if maps_books(category, &entry) {
            for book_id in &entry.book_ids {
                refs.entry(*book_id).or_default().push(entry.id);
            }
        }
        let record = MergedIndexRecord {
            id: entry.id,
            book_count: entry.book_count,
            book_del_count: entry.book_del_count,
            books: entry.book_ids.iter().filter_map(|id| books.get(id).cloned()).collect(),
        };
        writer.push_row(Row::from_document(&record).or_raise(|| ErrorKind::Store)?).await?;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Resolved;
    use crate::progress::Reporter;
    use crate::sort::save_table;
    use shelf_store::backend::MemoryStore;

    async fn seed(store: &MemoryStore, authors: &[&str]) {
        store.create_table("book").await.unwrap();
        let mut entries = crate::builder::Accumulator::new(Category::Author);
        let mut rows = Vec::new();
        for (i, author) in authors.iter().enumerate() {
            let book = BookRecord {
                id: i as u64 + 1,
                uid: format!("u{i}"),
                author: author.to_string(),
                ..Default::default()
            };
            entries.add_book(&book);
            rows.push(Row::from_document(&book).unwrap());
        }
        store.insert("book", rows).await.unwrap();
        let mut reporter = Reporter::silent();
        save_table(store, Category::Author, entries.into_entries(), 10, &mut reporter.phase(0.0, 1.0)).await.unwrap();
    }

    #[tokio::test]
    async fn test_small_batches_merge_everything() {
        let store = MemoryStore::default();
        seed(&store, &["Bob", "Alice, Bob", "Carol"]).await;
        let dir = tempfile::tempdir().unwrap();
        let tuning = Tuning {
            optimize_batch_refs: 1,
            scan_chunk_size: 1,
            ..Tuning::default()
        };
        let mut reporter = Reporter::silent();
        let map = optimize_table(&store, Category::Author, "book", dir.path(), &tuning, false, &mut reporter.phase(0.0, 1.0))
            .await
            .unwrap();

        // alice = 1, "alice, bob" = 2, bob = 3, carol = 4
        assert_eq!(map.resolve(1), Resolved::One(3));
        assert_eq!(map.resolve(2), Resolved::Many(&[1, 3]));
        assert_eq!(map.resolve(3), Resolved::One(4));
        assert_eq!(map.ambiguous(), 1);

        let merged: Vec<MergedIndexRecord> = store
            .select_page("author_book", 0, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|row| row.into_document().unwrap())
            .collect();
        assert_eq!(merged.iter().map(|record| record.id).collect::<Vec<_>>(), vec![1, 2, 3, 4]);
        assert_eq!(merged[2].books.iter().map(|book| book.id).collect::<Vec<_>>(), vec![1, 2]);
        assert!(dir.path().join("author_id.map").exists());
    }

    async fn timed(store: &MemoryStore, dir: &Path, tuning: &Tuning, pace: bool) -> (BookIdMap, Duration) {
        let mut reporter = Reporter::silent();
        let started = tokio::time::Instant::now();
        let map = optimize_table(store, Category::Author, "book", dir, tuning, pace, &mut reporter.phase(0.0, 1.0))
            .await
            .unwrap();
        (map, started.elapsed())
    }

    #[tokio::test(start_paused = true)]
    async fn test_paced_optimization_pauses_between_chunks() {
        let store = MemoryStore::default();
        seed(&store, &["Bob", "Alice, Bob", "Carol"]).await;
        let dir = tempfile::tempdir().unwrap();
        let tuning = Tuning {
            optimize_batch_refs: 1,
            pacing_interval: 1,
            pacing_delay_ms: 1_000,
            ..Tuning::default()
        };

        let (steady, unpaced) = timed(&store, dir.path(), &tuning, false).await;
        let (paced_map, paced) = timed(&store, dir.path(), &tuning, true).await;

        assert_eq!(paced_map, steady);
        // Four entries with at least one reference each: four pauses.
        assert!(paced >= Duration::from_secs(4), "{paced:?}");
        assert!(unpaced < Duration::from_secs(1), "{unpaced:?}");
    }

    #[test]
    fn test_combinations_do_not_map() {
        let combination = IndexEntry::new(IndexValue::from("a, b"), "A, B");
        assert!(!maps_books(Category::Author, &combination));
        assert!(maps_books(Category::Title, &combination));
    }
}
