//! In-memory store backend for testing.

use crate::backend::{META_TABLE, Store};
use crate::error::{ErrorKind, Result};
use crate::name::validate as validate_name;
use crate::row::{IndexSpec, Predicate, Row};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::RwLock;

#[derive(Debug, Default, Clone)]
struct Table {
    rows: BTreeMap<u64, Value>,
    indexes: Vec<IndexSpec>,
}
impl Table {
    /// Key for a field value, or `None` when the field is absent or null
    /// (nulls never collide, matching SQL semantics).
    fn key(doc: &Value, field: &str) -> Option<String> {
        doc.get(field).filter(|v| !v.is_null()).map(Value::to_string)
    }

    fn violates_unique(&self, field: &str, incoming: &[Row]) -> bool {
        let mut seen: HashSet<String> = self.rows.values().filter_map(|doc| Self::key(doc, field)).collect();
        incoming.iter().filter_map(|row| Self::key(&row.doc, field)).any(|key| !seen.insert(key))
    }
}

#[derive(Debug, Default)]
struct State {
    tables: HashMap<String, Table>,
    meta: HashMap<String, Value>,
}
impl State {
    fn table(&self, name: &str) -> Result<&Table> {
        self.tables.get(name).ok_or_else(|| exn::Exn::from(ErrorKind::TableNotFound(name.to_string())))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.tables.get_mut(name).ok_or_else(|| exn::Exn::from(ErrorKind::TableNotFound(name.to_string())))
    }
}

/// In-memory store backend for testing.
///
/// Tables are `BTreeMap`s behind a single [`RwLock`], so iteration order is
/// id order for free and all trait methods can operate on `&self`. Unique
/// indexes and primary keys are enforced the same way the SQLite backend
/// enforces them, which lets the builder's tests run without a database.
///
/// # Examples
///
/// ```
/// use shelf_store::backend::{MemoryStore, Store};
/// use shelf_store::Row;
/// use serde_json::json;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = MemoryStore::default();
/// store.create_table("book").await?;
/// store.insert("book", vec![Row::new(1, json!({"uid": "a"}))]).await?;
/// assert_eq!(store.count("book").await?, 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct MemoryStore {
    name: String,
    state: RwLock<State>,
}

impl MemoryStore {
    /// Change the name of the memory store.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Names of all tables currently present, sorted.
    pub async fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.read().await.tables.keys().cloned().collect();
        names.sort();
        names
    }
}
impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            name: "memory".to_string(),
            state: RwLock::new(State::default()),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn create_table(&self, table: &str) -> Result<()> {
        let table = validate_name(table)?;
        self.state.write().await.tables.insert(table.to_string(), Table::default());
        Ok(())
    }

    async fn drop_table(&self, table: &str) -> Result<()> {
        let table = validate_name(table)?;
        let mut guard = self.state.write().await;
        if guard.tables.remove(table).is_some() && table == META_TABLE {
            guard.meta.clear();
        }
        Ok(())
    }

    async fn rename_table(&self, from: &str, to: &str) -> Result<()> {
        let from = validate_name(from)?;
        let to = validate_name(to)?;
        let mut guard = self.state.write().await;
        let data = guard.tables.remove(from).ok_or_else(|| exn::Exn::from(ErrorKind::TableNotFound(from.to_string())))?;
        guard.tables.insert(to.to_string(), data);
        Ok(())
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        let table = validate_name(table)?;
        Ok(self.state.read().await.tables.contains_key(table))
    }

    async fn create_index(&self, table: &str, index: &IndexSpec) -> Result<()> {
        let table = validate_name(table)?;
        validate_name(&index.field)?;
        let mut guard = self.state.write().await;
        let data = guard.table_mut(table)?;
        if data.indexes.iter().any(|existing| existing.field == index.field) {
            return Ok(());
        }
        if index.unique && data.violates_unique(&index.field, &[]) {
            exn::bail!(ErrorKind::Constraint(table.to_string()));
        }
        data.indexes.push(index.clone());
        Ok(())
    }

    async fn drop_index(&self, table: &str, field: &str) -> Result<()> {
        let table = validate_name(table)?;
        let mut guard = self.state.write().await;
        if let Some(data) = guard.tables.get_mut(table) {
            data.indexes.retain(|index| index.field != field);
        }
        Ok(())
    }

    async fn insert(&self, table: &str, rows: Vec<Row>) -> Result<()> {
        let table = validate_name(table)?;
        let mut guard = self.state.write().await;
        let data = guard.table_mut(table)?;
        let mut ids = HashSet::with_capacity(rows.len());
        if rows.iter().any(|row| data.rows.contains_key(&row.id) || !ids.insert(row.id)) {
            exn::bail!(ErrorKind::Constraint(table.to_string()));
        }
        if data.indexes.iter().filter(|index| index.unique).any(|index| data.violates_unique(&index.field, &rows)) {
            exn::bail!(ErrorKind::Constraint(table.to_string()));
        }
        data.rows.extend(rows.into_iter().map(|row| (row.id, row.doc)));
        Ok(())
    }

    async fn select_page(&self, table: &str, after: u64, limit: usize) -> Result<Vec<Row>> {
        let table = validate_name(table)?;
        let guard = self.state.read().await;
        let data = guard.table(table)?;
        Ok(data
            .rows
            .range(after.saturating_add(1)..)
            .take(limit)
            .map(|(id, doc)| Row::new(*id, doc.clone()))
            .collect())
    }

    async fn select_ids(&self, table: &str, ids: &[u64]) -> Result<Vec<Row>> {
        let table = validate_name(table)?;
        let guard = self.state.read().await;
        let data = guard.table(table)?;
        let mut rows: Vec<Row> =
            ids.iter().filter_map(|id| data.rows.get(id).map(|doc| Row::new(*id, doc.clone()))).collect();
        rows.sort_by_key(|row| row.id);
        rows.dedup_by_key(|row| row.id);
        Ok(rows)
    }

    async fn select_where(&self, table: &str, predicate: &Predicate) -> Result<Vec<Row>> {
        let table = validate_name(table)?;
        validate_name(predicate.field())?;
        let guard = self.state.read().await;
        let data = guard.table(table)?;
        Ok(data
            .rows
            .iter()
            .map(|(id, doc)| Row::new(*id, doc.clone()))
            .filter(|row| predicate.matches(row))
            .collect())
    }

    async fn count(&self, table: &str) -> Result<u64> {
        let table = validate_name(table)?;
        Ok(self.state.read().await.table(table)?.rows.len() as u64)
    }

    async fn delete_ids(&self, table: &str, ids: &[u64]) -> Result<u64> {
        let table = validate_name(table)?;
        let mut guard = self.state.write().await;
        let data = guard.table_mut(table)?;
        Ok(ids.iter().filter(|id| data.rows.remove(*id).is_some()).count() as u64)
    }

    async fn delete_where(&self, table: &str, predicate: &Predicate) -> Result<u64> {
        let table = validate_name(table)?;
        validate_name(predicate.field())?;
        let mut guard = self.state.write().await;
        let data = guard.table_mut(table)?;
        let before = data.rows.len();
        let field = predicate.field().to_string();
        data.rows.retain(|id, doc| {
            // Cheap check first: rows without the field never match.
            doc.get(&field).is_none() || !predicate.matches(&Row::new(*id, doc.clone()))
        });
        Ok((before - data.rows.len()) as u64)
    }

    async fn duplicate_ids(&self, table: &str, field: &str) -> Result<Vec<u64>> {
        let table = validate_name(table)?;
        let field = validate_name(field)?;
        let guard = self.state.read().await;
        let data = guard.table(table)?;
        let mut seen = HashSet::new();
        Ok(data
            .rows
            .iter()
            .filter_map(|(id, doc)| Table::key(doc, field).map(|key| (*id, key)))
            .filter(|(_, key)| !seen.insert(key.clone()))
            .map(|(id, _)| id)
            .collect())
    }

    async fn put_meta(&self, entries: &[(&str, Value)]) -> Result<()> {
        let mut guard = self.state.write().await;
        guard.tables.entry(META_TABLE.to_string()).or_default();
        for (key, value) in entries {
            guard.meta.insert(key.to_string(), value.clone());
        }
        Ok(())
    }

    async fn get_meta(&self, key: &str) -> Result<Option<Value>> {
        let guard = self.state.read().await;
        if !guard.tables.contains_key(META_TABLE) {
            return Ok(None);
        }
        Ok(guard.meta.get(key).cloned())
    }

    async fn free_memory(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn store_with_rows(table: &str, docs: Vec<(u64, Value)>) -> MemoryStore {
        let store = MemoryStore::default();
        store.create_table(table).await.unwrap();
        store.insert(table, docs.into_iter().map(|(id, doc)| Row::new(id, doc)).collect()).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_pages_follow_id_order() {
        let store = store_with_rows("book", (1..=5).rev().map(|id| (id, json!({"id": id}))).collect()).await;
        let page = store.select_page("book", 1, 3).await.unwrap();
        assert_eq!(page.iter().map(|r| r.id).collect::<Vec<_>>(), vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn test_duplicate_primary_key() {
        let store = store_with_rows("book", vec![(1, json!({}))]).await;
        let err = store.insert("book", vec![Row::new(1, json!({}))]).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Constraint(_)));
    }

    #[tokio::test]
    async fn test_unique_index_enforced() {
        let store = store_with_rows("book", vec![(1, json!({"uid": "a"}))]).await;
        store.create_index("book", &IndexSpec::unique("uid")).await.unwrap();
        let err = store.insert("book", vec![Row::new(2, json!({"uid": "a"}))]).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Constraint(_)));
        store.insert("book", vec![Row::new(2, json!({"uid": "b"}))]).await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_ids() {
        let docs = vec![
            (1, json!({"uid": "x"})),
            (2, json!({"uid": "y"})),
            (3, json!({"uid": "x"})),
            (4, json!({})),
            (5, json!({})),
        ];
        let store = store_with_rows("book_temp", docs).await;
        assert_eq!(store.duplicate_ids("book_temp", "uid").await.unwrap(), vec![3]);
    }

    #[tokio::test]
    async fn test_delete_where() {
        let docs = vec![(1, json!({"value": "?"})), (2, json!({"value": "a"}))];
        let store = store_with_rows("series", docs).await;
        assert_eq!(store.delete_where("series", &Predicate::equals("value", "?")).await.unwrap(), 1);
        assert_eq!(store.count("series").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_missing_table() {
        let store = MemoryStore::default();
        let err = store.select_page("author", 0, 10).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::TableNotFound(t) if t == "author"));
        let err = store.rename_table("author", "other").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::TableNotFound(_)));
    }

    #[tokio::test]
    async fn test_meta_requires_table() {
        let store = MemoryStore::default().with_name("test");
        assert_eq!(store.name(), "test");
        assert_eq!(store.get_meta("stats").await.unwrap(), None);
        store.put_meta(&[("stats", json!(1))]).await.unwrap();
        assert_eq!(store.get_meta("stats").await.unwrap(), Some(json!(1)));
        store.drop_table(META_TABLE).await.unwrap();
        assert_eq!(store.get_meta("stats").await.unwrap(), None);
    }
}
