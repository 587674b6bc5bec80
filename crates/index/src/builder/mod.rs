//! Per-category accumulation of index entries.
//!
//! An [`Accumulator`] is an arena owned by whoever builds one category: a
//! `Vec` of entries in first-seen order plus a map from value to slot. It is
//! drained by value (moved into the sorter), never shared.

mod streaming;

pub use self::streaming::build_from_table;
use crate::models::{BookRecord, Category, IndexEntry, IndexValue};
use crate::normalize::{self, Key};
use std::collections::HashMap;

#[derive(Debug)]
pub struct Accumulator {
    category: Category,
    slots: HashMap<IndexValue, usize>,
    entries: Vec<IndexEntry>,
}

impl Accumulator {
    pub fn new(category: Category) -> Self {
        Self {
            category,
            slots: HashMap::new(),
            entries: Vec::new(),
        }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    /// Record one reference from `book_id` to `key`.
    ///
    /// The first sighting of a value fixes its display name. References are
    /// appended as they come, repeats included.
    pub fn accumulate(&mut self, key: Key, book_id: u64, deleted: bool) {
        let slot = match self.slots.get(&key.value) {
            Some(slot) => *slot,
            None => {
                self.slots.insert(key.value.clone(), self.entries.len());
                self.entries.push(IndexEntry::new(key.value, key.name));
                self.entries.len() - 1
            },
        };
        self.entries[slot].add(book_id, deleted);
    }

    /// Accumulate every key the book contributes to this category.
    pub fn add_book(&mut self, book: &BookRecord) {
        for key in normalize::keys(self.category, book) {
            self.accumulate(key, book.id, book.del);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Move the entries out, leaving the accumulator empty for reuse.
    pub fn take(&mut self) -> Vec<IndexEntry> {
        self.slots.clear();
        std::mem::take(&mut self.entries)
    }

    pub fn into_entries(self) -> Vec<IndexEntry> {
        self.entries
    }
}
