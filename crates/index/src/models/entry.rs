use crate::models::BookRecord;
use serde::{Deserialize, Serialize};
use shelf_store::Document;
use std::fmt;

/// Normalized index key.
///
/// Ordering is numeric for numbers and code-point order for text, which is
/// the order ids are assigned in. A category only ever holds one variant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IndexValue {
    Number(i64),
    Text(String),
}
impl fmt::Display for IndexValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}
impl From<&str> for IndexValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}
impl From<i64> for IndexValue {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

/// All references to one normalized value within a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    /// Zero until ids are assigned in sorted order.
    pub id: u64,
    pub value: IndexValue,
    /// Display form, as first seen.
    pub name: String,
    /// Referencing book ids, in arrival order. May repeat.
    pub book_ids: Vec<u64>,
    pub book_count: u64,
    pub book_del_count: u64,
}

impl IndexEntry {
    pub fn new(value: IndexValue, name: impl Into<String>) -> Self {
        Self {
            id: 0,
            value,
            name: name.into(),
            book_ids: Vec::new(),
            book_count: 0,
            book_del_count: 0,
        }
    }

    pub fn add(&mut self, book_id: u64, deleted: bool) {
        self.book_ids.push(book_id);
        if deleted {
            self.book_del_count += 1;
        } else {
            self.book_count += 1;
        }
    }

    /// Fold a later entry for the same value into this one.
    pub fn absorb(&mut self, later: IndexEntry) {
        debug_assert_eq!(self.value, later.value);
        self.book_ids.extend(later.book_ids);
        self.book_count += later.book_count;
        self.book_del_count += later.book_del_count;
    }

    pub fn total(&self) -> u64 {
        self.book_count + self.book_del_count
    }
}

impl Document for IndexEntry {
    fn id(&self) -> u64 {
        self.id
    }
}

/// An index entry with its book rows inlined, written by full optimization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedIndexRecord {
    pub id: u64,
    pub book_count: u64,
    pub book_del_count: u64,
    pub books: Vec<BookRecord>,
}

impl Document for MergedIndexRecord {
    fn id(&self) -> u64 {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_serializes_bare() {
        assert_eq!(serde_json::to_value(IndexValue::from("a")).unwrap(), json!("a"));
        assert_eq!(serde_json::to_value(IndexValue::from(5)).unwrap(), json!(5));
        assert_eq!(serde_json::from_value::<IndexValue>(json!(1)).unwrap(), IndexValue::Number(1));
    }

    #[test]
    fn test_numbers_sort_numerically() {
        let mut values = vec![IndexValue::from(10), IndexValue::from(2), IndexValue::from(0)];
        values.sort();
        assert_eq!(values, vec![IndexValue::from(0), IndexValue::from(2), IndexValue::from(10)]);
    }

    #[test]
    fn test_absorb_concatenates() {
        let mut first = IndexEntry::new("a".into(), "A");
        first.add(1, false);
        let mut later = IndexEntry::new("a".into(), "a");
        later.add(7, true);
        later.add(9, false);
        first.absorb(later);
        assert_eq!(first.book_ids, vec![1, 7, 9]);
        assert_eq!((first.book_count, first.book_del_count), (2, 1));
        assert_eq!(first.name, "A");
    }
}
