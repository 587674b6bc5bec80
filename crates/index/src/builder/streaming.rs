//! Bounded-memory index construction from a stored book table.
//!
//! Books are scanned page by page into an [`Accumulator`]. Whenever it holds
//! more than `flush_threshold` entries, its contents are sorted and written
//! to a staging table (a sorted run) and the accumulator is cleared. After
//! the scan the runs are k-way merged by value: entries for the same value
//! are combined in run order, so book ids stay in arrival order and the
//! display name is the first one seen.

use super::Accumulator;
use crate::error::{ErrorKind, Result};
use crate::models::{BookRecord, Category, IndexEntry, IndexValue, TableSummary};
use crate::progress::Phase;
use crate::sort::{self, TableWriter};
use exn::ResultExt;
use shelf_config::Tuning;
use shelf_store::Store;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use tracing::instrument;

/// Build and save one category's table from the books stored in `source`.
#[instrument(level = "debug", skip(store, tuning, progress))]
pub async fn build_from_table(
    store: &dyn Store,
    source: &str,
    category: Category,
    tuning: &Tuning,
    progress: &mut Phase<'_, '_>,
) -> Result<TableSummary> {
    let total = store.count(source).await.or_raise(|| ErrorKind::Store)?.max(1) as f64;
    let mut accumulator = Accumulator::new(category);
    let mut runs: Vec<String> = Vec::new();
    let mut after = 0;
    let mut scanned = 0u64;
    loop {
        let page = store.select_page(source, after, tuning.scan_chunk_size).await.or_raise(|| ErrorKind::Store)?;
        let Some(last) = page.last() else {
            break;
        };
        after = last.id;
        scanned += page.len() as u64;
        for row in page {
            let book: BookRecord = row.into_document().or_raise(|| ErrorKind::InvalidData(source.to_string()))?;
            accumulator.add_book(&book);
        }
        progress.set(0.6 * scanned as f64 / total);

        if accumulator.len() > tuning.flush_threshold {
            let run = write_run(store, category, runs.len(), accumulator.take(), tuning.insert_chunk_size).await?;
            runs.push(run);
            store.free_memory().await.or_raise(|| ErrorKind::Store)?;
        }
    }

    if runs.is_empty() {
        let entries = accumulator.into_entries();
        return sort::save_table(store, category, entries, tuning.insert_chunk_size, &mut progress.sub(0.6, 0.4)).await;
    }
    if !accumulator.is_empty() {
        runs.push(write_run(store, category, runs.len(), accumulator.take(), tuning.insert_chunk_size).await?);
    }
    drop(accumulator);

    let written = merge_runs(store, category, &runs, tuning, &mut progress.sub(0.6, 0.35)).await?;
    for run in &runs {
        store.drop_table(run).await.or_raise(|| ErrorKind::Store)?;
    }
    sort::finalize_table(store, category, written, progress).await
}

fn run_table(category: Category, run: usize) -> String {
    format!("{}_run{run}", category.table())
}

async fn write_run(
    store: &dyn Store,
    category: Category,
    run: usize,
    mut entries: Vec<IndexEntry>,
    chunk_size: usize,
) -> Result<String> {
    let table = run_table(category, run);
    entries.sort_unstable_by(|a, b| a.value.cmp(&b.value));
    let mut writer = TableWriter::create(store, &table, chunk_size).await?;
    for entry in entries {
        writer.push(entry).await?;
    }
    let written = writer.finish().await?;
    tracing::debug!(table, entries = written, "sorted run flushed");
    Ok(table)
}

/// Pages through one sorted run.
struct RunCursor<'a> {
    store: &'a dyn Store,
    table: &'a str,
    after: u64,
    page: VecDeque<IndexEntry>,
    page_size: usize,
    exhausted: bool,
}

impl<'a> RunCursor<'a> {
    fn new(store: &'a dyn Store, table: &'a str, page_size: usize) -> Self {
        Self {
            store,
            table,
            after: 0,
            page: VecDeque::new(),
            page_size,
            exhausted: false,
        }
    }

    async fn next(&mut self) -> Result<Option<IndexEntry>> {
        if self.page.is_empty() && !self.exhausted {
            let rows = self
                .store
                .select_page(self.table, self.after, self.page_size)
                .await
                .or_raise(|| ErrorKind::Store)?;
            match rows.last() {
                Some(last) => self.after = last.id,
                None => self.exhausted = true,
            }
            for row in rows {
                let entry = row.into_document().or_raise(|| ErrorKind::InvalidData(self.table.to_string()))?;
                self.page.push_back(entry);
            }
        }
        Ok(self.page.pop_front())
    }

    async fn len(&self) -> Result<u64> {
        self.store.count(self.table).await.or_raise(|| ErrorKind::Store)
    }
}

async fn merge_runs(
    store: &dyn Store,
    category: Category,
    runs: &[String],
    tuning: &Tuning,
    progress: &mut Phase<'_, '_>,
) -> Result<u64> {
    // Keep the page buffers of all runs together within one scan chunk.
    let page_size = (tuning.scan_chunk_size / runs.len()).max(1);
    let mut cursors: Vec<RunCursor<'_>> = runs.iter().map(|run| RunCursor::new(store, run, page_size)).collect();
    let mut heads: Vec<Option<IndexEntry>> = Vec::with_capacity(cursors.len());
    // Ties pop the lower run first, which keeps same-value entries in run order.
    let mut heap: BinaryHeap<Reverse<(IndexValue, usize)>> = BinaryHeap::new();
    let mut total = 0u64;
    for (run, cursor) in cursors.iter_mut().enumerate() {
        total += cursor.len().await?;
        let head = cursor.next().await?;
        if let Some(entry) = &head {
            heap.push(Reverse((entry.value.clone(), run)));
        }
        heads.push(head);
    }

    let mut writer = TableWriter::create(store, category.table(), tuning.insert_chunk_size).await?;
    let mut current: Option<IndexEntry> = None;
    let mut consumed = 0u64;
    while let Some(Reverse((_, run))) = heap.pop() {
        let Some(entry) = heads[run].take() else {
            continue;
        };
        if let Some(next) = cursors[run].next().await? {
            heap.push(Reverse((next.value.clone(), run)));
            heads[run] = Some(next);
        }
        consumed += 1;

        match current.as_mut() {
            Some(merged) if merged.value == entry.value => merged.absorb(entry),
            _ => {
                if let Some(done) = current.replace(entry) {
                    writer.push(done).await?;
                }
            },
        }
        if consumed % tuning.insert_chunk_size.max(1) as u64 == 0 {
            progress.set(consumed as f64 / total.max(1) as f64);
        }
    }
    if let Some(done) = current {
        writer.push(done).await?;
    }
    let written = writer.finish().await?;
    tracing::debug!(table = category.table(), runs = runs.len(), merged = consumed - written, "sorted runs merged");
    progress.set(1.0);
    Ok(written)
}
