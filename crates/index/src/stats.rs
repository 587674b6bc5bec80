//! Aggregate statistics over the finished book table.

use crate::error::{ErrorKind, Result};
use crate::models::{BookRecord, Category, Stats, TableSummary};
use crate::normalize;
use crate::progress::Phase;
use exn::ResultExt;
use shelf_store::{IndexSpec, Store};
use std::collections::HashSet;
use tracing::instrument;

/// Scan `book_table` once and combine the counts with the saved index
/// tables' summaries.
///
/// Leaves a unique index on `uid` behind on the book table.
#[instrument(level = "debug", skip(store, summaries, progress))]
pub async fn collect(
    store: &dyn Store,
    book_table: &str,
    recs_loaded: u64,
    summaries: &[TableSummary],
    scan_chunk_size: usize,
    progress: &mut Phase<'_, '_>,
) -> Result<Stats> {
    let total = store.count(book_table).await.or_raise(|| ErrorKind::Store)?.max(1) as f64;
    let mut stats = Stats {
        recs_loaded,
        ..Default::default()
    };
    let mut authors: HashSet<String> = HashSet::new();
    let mut files: HashSet<(String, String, String)> = HashSet::new();
    let mut deleted_files: HashSet<(String, String, String)> = HashSet::new();
    let mut scanned = 0u64;
    let mut after = 0;
    loop {
        let page = store.select_page(book_table, after, scan_chunk_size).await.or_raise(|| ErrorKind::Store)?;
        let Some(last) = page.last() else {
            break;
        };
        after = last.id;
        scanned += page.len() as u64;
        for row in page {
            let book: BookRecord = row.into_document().or_raise(|| ErrorKind::InvalidData(book_table.to_string()))?;
            let tokens = normalize::author_tokens(&book.author);
            if book.del {
                stats.book_del_count += 1;
            } else {
                stats.book_count += 1;
                if tokens.is_empty() {
                    stats.no_author_book_count += 1;
                }
            }
            authors.extend(tokens);

            let (folder, file, ext) = book.file_key();
            let key = (folder.to_string(), file.to_string(), ext.to_string());
            if book.del {
                deleted_files.insert(key);
            } else {
                files.insert(key);
            }
        }
        progress.set(0.9 * scanned as f64 / total);
    }

    // A file that is both active and deleted counts as active only.
    deleted_files.retain(|key| !files.contains(key));
    stats.files_count = files.len() as u64;
    stats.files_del_count = deleted_files.len() as u64;
    stats.files_count_all = stats.files_count + stats.files_del_count;
    stats.book_count_all = stats.book_count + stats.book_del_count;
    stats.author_count = authors.len() as u64;

    for summary in summaries {
        let count = summary.count();
        match summary.category {
            Category::Author => stats.author_count_all = count,
            Category::Series => stats.series_count = count,
            Category::Title => stats.title_count = count,
            Category::Genre => stats.genre_count = count,
            Category::Lang => stats.lang_count = count,
            _ => {},
        }
    }

    store.create_index(book_table, &IndexSpec::unique("uid")).await.or_raise(|| ErrorKind::Store)?;
    progress.set(1.0);
    tracing::info!(books = stats.book_count_all, files = stats.files_count_all, "statistics counted");
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::Reporter;
    use shelf_store::Row;
    use shelf_store::backend::MemoryStore;

    fn book(id: u64, author: &str, file: &str, del: bool) -> BookRecord {
        BookRecord {
            id,
            uid: format!("u{id}"),
            author: author.to_string(),
            folder: "f.zip".to_string(),
            file: file.to_string(),
            ext: "fb2".to_string(),
            del,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_conservation() {
        let store = MemoryStore::default();
        store.create_table("book").await.unwrap();
        let books = [
            book(1, "A, B", "1", false),
            book(2, "", "2", false),
            book(3, "a", "1", true),
            book(4, "C", "4", true),
            book(5, "", "5", true),
        ];
        store.insert("book", books.iter().map(|b| Row::from_document(b).unwrap()).collect()).await.unwrap();

        let summaries = [TableSummary {
            category: Category::Series,
            entries: 3,
            purged: 1,
        }];
        let mut reporter = Reporter::silent();
        let stats = collect(&store, "book", 9, &summaries, 2, &mut reporter.phase(0.0, 1.0)).await.unwrap();

        assert_eq!((stats.book_count, stats.book_del_count, stats.book_count_all), (2, 3, 5));
        assert_eq!(stats.no_author_book_count, 1);
        // File "1" is both active and deleted.
        assert_eq!((stats.files_count, stats.files_del_count, stats.files_count_all), (2, 2, 4));
        assert_eq!(stats.author_count, 3);
        assert_eq!(stats.series_count, 2);
        assert_eq!(stats.recs_loaded, 9);

        // The uid index is unique now.
        let dup = BookRecord { id: 6, uid: "u1".to_string(), ..Default::default() };
        assert!(store.insert("book", vec![Row::from_document(&dup).unwrap()]).await.is_err());
    }
}
