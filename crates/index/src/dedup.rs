//! Duplicate removal by external uid. First occurrence wins.
//!
//! Two strategies produce the same survivors: [`InlineDedup`] keeps every
//! uid in memory while records arrive, and [`remove_duplicates`] admits
//! everything and deletes later occurrences from the stored table afterwards.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use shelf_store::{IndexSpec, Store};
use std::collections::HashSet;
use tracing::instrument;

const UID_FIELD: &str = "uid";

/// In-memory uid set held for a whole run.
#[derive(Debug, Default)]
pub struct InlineDedup {
    seen: HashSet<String>,
}

impl InlineDedup {
    /// Whether this uid is new. The uid is remembered either way.
    pub fn admit(&mut self, uid: &str) -> bool {
        if self.seen.contains(uid) {
            return false;
        }
        self.seen.insert(uid.to_string())
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Delete every row of `table` whose uid already appeared on a lower id.
///
/// Builds a temporary non-unique index on the uid so the duplicate lookup is
/// not quadratic, and drops it again afterwards. Returns the number of rows
/// removed.
#[instrument(level = "debug", skip(store))]
pub async fn remove_duplicates(store: &dyn Store, table: &str) -> Result<u64> {
    store.create_index(table, &IndexSpec::non_unique(UID_FIELD)).await.or_raise(|| ErrorKind::Store)?;
    let duplicates = store.duplicate_ids(table, UID_FIELD).await.or_raise(|| ErrorKind::Store)?;
    let removed = store.delete_ids(table, &duplicates).await.or_raise(|| ErrorKind::Store)?;
    store.drop_index(table, UID_FIELD).await.or_raise(|| ErrorKind::Store)?;
    tracing::info!(table, removed, "duplicate records removed");
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shelf_store::Row;
    use shelf_store::backend::MemoryStore;

    #[test]
    fn test_inline_first_wins() {
        let mut dedup = InlineDedup::default();
        let admitted: Vec<bool> = ["u1", "u2", "u1", "u1", "u3"].iter().map(|uid| dedup.admit(uid)).collect();
        assert_eq!(admitted, vec![true, true, false, false, true]);
        assert_eq!(dedup.len(), 3);
    }

    #[tokio::test]
    async fn test_deferred_first_wins() {
        let store = MemoryStore::default();
        store.create_table("book_temp").await.unwrap();
        let rows = ["u1", "u2", "u1", "u3", "u2"]
            .iter()
            .enumerate()
            .map(|(i, uid)| Row::new(i as u64 + 1, json!({"uid": uid})))
            .collect();
        store.insert("book_temp", rows).await.unwrap();

        assert_eq!(remove_duplicates(&store, "book_temp").await.unwrap(), 2);
        let survivors: Vec<u64> =
            store.select_page("book_temp", 0, 10).await.unwrap().into_iter().map(|row| row.id).collect();
        assert_eq!(survivors, vec![1, 2, 4]);
    }
}
