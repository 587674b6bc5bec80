//! Rows, documents and the closed predicate language understood by every
//! backend.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// A typed record that can be persisted as a row.
///
/// The row key is always the document's own `id`, so insert preserves row
/// identity: whatever id a record was admitted with is the id it is selected
/// and deleted by.
pub trait Document: Serialize + DeserializeOwned {
    fn id(&self) -> u64;
}

/// A stored row: the key plus its JSON document body.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub id: u64,
    pub doc: Value,
}
impl Row {
    pub fn new(id: u64, doc: Value) -> Self {
        Self { id, doc }
    }

    /// Serialize a [`Document`] into a row keyed by its id.
    pub fn from_document<D: Document>(document: &D) -> Result<Self> {
        let doc = serde_json::to_value(document).or_raise(|| ErrorKind::InvalidData)?;
        Ok(Self { id: document.id(), doc })
    }

    /// Deserialize the row body back into a [`Document`].
    pub fn into_document<D: Document>(self) -> Result<D> {
        serde_json::from_value(self.doc).or_raise(|| ErrorKind::InvalidData)
    }

    /// Top-level field of the document body, if present.
    pub fn field(&self, field: &str) -> Option<&Value> {
        self.doc.get(field)
    }
}

/// Secondary index over one top-level document field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub field: String,
    pub unique: bool,
}
impl IndexSpec {
    pub fn unique(field: impl Into<String>) -> Self {
        Self { field: field.into(), unique: true }
    }

    pub fn non_unique(field: impl Into<String>) -> Self {
        Self { field: field.into(), unique: false }
    }
}

/// Row predicate for `select_where` / `delete_where`.
///
/// Deliberately closed: backends translate it into their own query language
/// (SQL for SQLite), so it can never carry arbitrary code.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Top-level `field` equals `value`.
    Equals { field: String, value: Value },
    /// Top-level `field` equals any of `values`.
    In { field: String, values: Vec<Value> },
}
impl Predicate {
    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Equals {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn any_of(field: impl Into<String>, values: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        Self::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn field(&self) -> &str {
        match self {
            Self::Equals { field, .. } | Self::In { field, .. } => field,
        }
    }

    /// Evaluate against a row in memory.
    pub fn matches(&self, row: &Row) -> bool {
        let Some(actual) = row.field(self.field()) else {
            return false;
        };
        match self {
            Self::Equals { value, .. } => actual == value,
            Self::In { values, .. } => values.contains(actual),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Thing {
        id: u64,
        value: String,
    }
    impl Document for Thing {
        fn id(&self) -> u64 {
            self.id
        }
    }

    #[test]
    fn test_document_keeps_its_id() {
        let thing = Thing { id: 7, value: "x".to_string() };
        let row = Row::from_document(&thing).unwrap();
        assert_eq!(row.id, 7);
        assert_eq!(row.into_document::<Thing>().unwrap(), thing);
    }

    #[test]
    fn test_invalid_document() {
        let row = Row::new(1, json!({"id": 1}));
        let err = row.into_document::<Thing>().unwrap_err();
        assert_eq!(*err, ErrorKind::InvalidData);
    }

    #[test]
    fn test_predicate_matches() {
        let row = Row::new(1, json!({"value": "?", "n": 3}));
        assert!(Predicate::equals("value", "?").matches(&row));
        assert!(!Predicate::equals("value", "a").matches(&row));
        assert!(Predicate::any_of("n", [1, 3]).matches(&row));
        assert!(!Predicate::equals("missing", "?").matches(&row));
    }
}
