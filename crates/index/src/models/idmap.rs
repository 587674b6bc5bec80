use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where a book landed after full optimization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved<'a> {
    /// The book is not referenced by any merged record.
    Missing,
    /// Exactly one merged record references the book.
    One(u64),
    /// Several merged records reference the book, in ascending id order.
    Many(&'a [u64]),
}

/// Map from book id to merged record id(s), persisted as `<category>_id.map`.
///
/// `arr[book_id]` holds the merged record id when it is unambiguous and `0`
/// otherwise; ambiguous books are listed in `map` as `[book_id, [ids...]]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookIdMap {
    arr: Vec<u64>,
    map: Vec<(u64, Vec<u64>)>,
}

impl BookIdMap {
    /// Build from book id → referencing record ids. Repeated record ids for
    /// one book are collapsed.
    pub fn from_refs(refs: BTreeMap<u64, Vec<u64>>) -> Self {
        let len = refs.last_key_value().map_or(0, |(id, _)| *id as usize + 1);
        let mut arr = vec![0; len];
        let mut map = Vec::new();
        for (book_id, mut records) in refs {
            records.sort_unstable();
            records.dedup();
            match records.as_slice() {
                [] => {},
                [single] => arr[book_id as usize] = *single,
                _ => map.push((book_id, records)),
            }
        }
        Self { arr, map }
    }

    pub fn resolve(&self, book_id: u64) -> Resolved<'_> {
        match self.arr.get(book_id as usize) {
            Some(0) | None => match self.map.binary_search_by_key(&book_id, |(id, _)| *id) {
                Ok(pos) => Resolved::Many(&self.map[pos].1),
                Err(_) => Resolved::Missing,
            },
            Some(record) => Resolved::One(*record),
        }
    }

    /// Number of books that need the explicit list form.
    pub fn ambiguous(&self) -> usize {
        self.map.len()
    }
}
