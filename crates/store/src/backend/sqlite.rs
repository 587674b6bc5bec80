//! SQLite store backend.
//!
//! Each table is `(id INTEGER PRIMARY KEY, doc TEXT)` holding a JSON document,
//! which keeps the row order equal to the id order and lets secondary indexes
//! be built on `json_extract(doc, '$.field')` expressions.

use crate::backend::{META_TABLE, Store};
use crate::error::{Error, ErrorKind, Result};
use crate::name::validate as validate_name;
use crate::row::{IndexSpec, Predicate, Row};
use async_trait::async_trait;
use exn::ResultExt;
use serde_json::Value;
use sqlx::pool::PoolConnectionMetadata;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use std::path::Path;
use tracing::instrument;

const MAX_CONNECTIONS: u32 = 5;
// Stay well below SQLITE_MAX_VARIABLE_NUMBER (32766 since 3.32).
const MAX_BOUND_IDS: usize = 10_000;

#[derive(sqlx::FromRow)]
struct DocRow {
    id: i64,
    doc: String,
}
impl TryFrom<DocRow> for Row {
    type Error = Error;
    fn try_from(row: DocRow) -> Result<Self> {
        Ok(Row {
            id: u64::try_from(row.id).or_raise(|| ErrorKind::InvalidData)?,
            doc: serde_json::from_str(&row.doc).or_raise(|| ErrorKind::InvalidData)?,
        })
    }
}

fn sql_id(id: u64) -> Result<i64> {
    i64::try_from(id).or_raise(|| ErrorKind::InvalidData)
}

/// Wrap an sqlx error, classifying the ones a caller can act on.
fn db_error(table: &str, err: sqlx::Error) -> Error {
    let kind = match err.as_database_error() {
        Some(db) if db.is_unique_violation() => ErrorKind::Constraint(table.to_string()),
        Some(db) if db.message().starts_with("no such table") => ErrorKind::TableNotFound(table.to_string()),
        _ => ErrorKind::Database,
    };
    exn::Exn::from(err).raise(kind)
}

fn index_name(table: &str, field: &str) -> String {
    format!("{table}__{field}")
}

fn push_value(qb: &mut QueryBuilder<'_, Sqlite>, value: &Value) -> Result<()> {
    // json_extract() returns SQL INTEGER for JSON integers and booleans, and
    // TEXT for strings; bind the matching SQL type so equality holds.
    match value {
        Value::String(s) => qb.push_bind(s.clone()),
        Value::Bool(b) => qb.push_bind(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => qb.push_bind(i),
            None => qb.push_bind(n.as_f64().unwrap_or_default()),
        },
        _ => exn::bail!(ErrorKind::InvalidData),
    };
    Ok(())
}

fn push_predicate(qb: &mut QueryBuilder<'_, Sqlite>, predicate: &Predicate) -> Result<()> {
    let field = validate_name(predicate.field())?;
    qb.push(format!("json_extract(doc, '$.{field}')"));
    match predicate {
        Predicate::Equals { value, .. } => {
            qb.push(" = ");
            push_value(qb, value)?;
        },
        Predicate::In { values, .. } => {
            qb.push(" IN (");
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    qb.push(", ");
                }
                push_value(qb, value)?;
            }
            qb.push(")");
        },
    }
    Ok(())
}

/// SQLite-backed [`Store`].
///
/// This is the persistent embedded store: one database file holds every index
/// table, the primary book table and the `config` table.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    async fn new(options: SqliteConnectOptions, max: Option<u32>) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            // Apply the query-based PRAGMAs to EVERY connection in the pool,
            // not only the first one handed out.
            .after_connect(|conn, meta| Box::pin(async move { Self::apply_pragmas(conn, meta).await }))
            .max_connections(max.unwrap_or(MAX_CONNECTIONS))
            .connect_with(options)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(Self { pool })
    }

    /// Open (or create) the database file at the given path.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let options = Self::base_options().filename(path.as_ref()).create_if_missing(true);
        Self::new(options, None).await
    }

    /// Connect to an in-memory database.
    ///
    /// Note:
    /// - In-memory databases are destroyed when the connection closes.
    /// - Do NOT apply `#[cfg(test)]` so that other crates can also use this in their tests.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = Self::base_options().filename(":memory:");
        // Parallel connections to ":memory:" would each see a different
        // database, so limit the pool to one.
        Self::new(options, Some(1)).await
    }

    fn base_options() -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            // PRAGMA synchronous = NORMAL (balance between safety and speed)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_millis(1500))
            .auto_vacuum(sqlx::sqlite::SqliteAutoVacuum::None)
    }

    /// Apply additional PRAGMA settings that aren't exposed via SqliteConnectOptions.
    async fn apply_pragmas(conn: &mut SqliteConnection, _meta: PoolConnectionMetadata) -> sqlx::Result<()> {
        sqlx::query(
            r#"
                PRAGMA locking_mode = NORMAL;
                PRAGMA wal_autocheckpoint = 800;
                PRAGMA cache_size = -8192;
                PRAGMA temp_store = MEMORY;
                PRAGMA mmap_size = 33554432;
            "#,
        )
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the connection pool, letting SQLite refresh planner statistics first.
    pub async fn close(&self) {
        _ = sqlx::query("PRAGMA optimize").execute(&self.pool).await;
        self.pool.close().await;
    }

    async fn execute(&self, table: &str, sql: &str) -> Result<u64> {
        let result = sqlx::query(sql).execute(&self.pool).await.map_err(|e| db_error(table, e))?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl Store for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    #[instrument(level = "debug", skip(self))]
    async fn create_table(&self, table: &str) -> Result<()> {
        let table = validate_name(table)?;
        let mut tx = self.pool.begin().await.map_err(|e| db_error(table, e))?;
        sqlx::query(&format!(r#"DROP TABLE IF EXISTS "{table}""#))
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error(table, e))?;
        sqlx::query(&format!(r#"CREATE TABLE "{table}" (id INTEGER PRIMARY KEY, doc TEXT NOT NULL)"#))
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error(table, e))?;
        tx.commit().await.map_err(|e| db_error(table, e))
    }

    async fn drop_table(&self, table: &str) -> Result<()> {
        let table = validate_name(table)?;
        self.execute(table, &format!(r#"DROP TABLE IF EXISTS "{table}""#)).await?;
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    async fn rename_table(&self, from: &str, to: &str) -> Result<()> {
        let from = validate_name(from)?;
        let to = validate_name(to)?;
        let mut tx = self.pool.begin().await.map_err(|e| db_error(from, e))?;
        sqlx::query(&format!(r#"DROP TABLE IF EXISTS "{to}""#))
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error(to, e))?;
        sqlx::query(&format!(r#"ALTER TABLE "{from}" RENAME TO "{to}""#))
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error(from, e))?;
        tx.commit().await.map_err(|e| db_error(from, e))
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        let table = validate_name(table)?;
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(table)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error(table, e))?;
        Ok(count > 0)
    }

    #[instrument(level = "debug", skip(self))]
    async fn create_index(&self, table: &str, index: &IndexSpec) -> Result<()> {
        let table = validate_name(table)?;
        let field = validate_name(&index.field)?;
        let unique = if index.unique { "UNIQUE " } else { "" };
        let name = index_name(table, field);
        let sql = format!(r#"CREATE {unique}INDEX IF NOT EXISTS "{name}" ON "{table}" (json_extract(doc, '$.{field}'))"#);
        self.execute(table, &sql).await?;
        Ok(())
    }

    async fn drop_index(&self, table: &str, field: &str) -> Result<()> {
        let table = validate_name(table)?;
        let name = index_name(table, validate_name(field)?);
        self.execute(table, &format!(r#"DROP INDEX IF EXISTS "{name}""#)).await?;
        Ok(())
    }

    async fn insert(&self, table: &str, rows: Vec<Row>) -> Result<()> {
        let table = validate_name(table)?;
        if rows.is_empty() {
            return Ok(());
        }
        let sql = format!(r#"INSERT INTO "{table}" (id, doc) VALUES (?, ?)"#);
        let mut tx = self.pool.begin().await.map_err(|e| db_error(table, e))?;
        for row in rows {
            let doc = serde_json::to_string(&row.doc).or_raise(|| ErrorKind::InvalidData)?;
            sqlx::query(&sql)
                .bind(sql_id(row.id)?)
                .bind(doc)
                .execute(&mut *tx)
                .await
                .map_err(|e| db_error(table, e))?;
        }
        tx.commit().await.map_err(|e| db_error(table, e))
    }

    async fn select_page(&self, table: &str, after: u64, limit: usize) -> Result<Vec<Row>> {
        let table = validate_name(table)?;
        let sql = format!(r#"SELECT id, doc FROM "{table}" WHERE id > ? ORDER BY id LIMIT ?"#);
        let rows: Vec<DocRow> = sqlx::query_as(&sql)
            .bind(sql_id(after)?)
            .bind(i64::try_from(limit).or_raise(|| ErrorKind::InvalidData)?)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error(table, e))?;
        rows.into_iter().map(Row::try_from).collect()
    }

    async fn select_ids(&self, table: &str, ids: &[u64]) -> Result<Vec<Row>> {
        let table = validate_name(table)?;
        let mut rows = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(MAX_BOUND_IDS) {
            let mut qb = QueryBuilder::<Sqlite>::new(format!(r#"SELECT id, doc FROM "{table}" WHERE id IN ("#));
            let mut separated = qb.separated(", ");
            for id in chunk {
                separated.push_bind(sql_id(*id)?);
            }
            separated.push_unseparated(") ORDER BY id");
            let found: Vec<DocRow> =
                qb.build_query_as().fetch_all(&self.pool).await.map_err(|e| db_error(table, e))?;
            for row in found {
                rows.push(Row::try_from(row)?);
            }
        }
        rows.sort_by_key(|row| row.id);
        Ok(rows)
    }

    async fn select_where(&self, table: &str, predicate: &Predicate) -> Result<Vec<Row>> {
        let table = validate_name(table)?;
        let mut qb = QueryBuilder::<Sqlite>::new(format!(r#"SELECT id, doc FROM "{table}" WHERE "#));
        push_predicate(&mut qb, predicate)?;
        qb.push(" ORDER BY id");
        let rows: Vec<DocRow> = qb.build_query_as().fetch_all(&self.pool).await.map_err(|e| db_error(table, e))?;
        rows.into_iter().map(Row::try_from).collect()
    }

    async fn count(&self, table: &str) -> Result<u64> {
        let table = validate_name(table)?;
        let count: i64 = sqlx::query_scalar(&format!(r#"SELECT COUNT(*) FROM "{table}""#))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error(table, e))?;
        u64::try_from(count).or_raise(|| ErrorKind::InvalidData)
    }

    async fn delete_ids(&self, table: &str, ids: &[u64]) -> Result<u64> {
        let table = validate_name(table)?;
        let mut deleted = 0;
        for chunk in ids.chunks(MAX_BOUND_IDS) {
            let mut qb = QueryBuilder::<Sqlite>::new(format!(r#"DELETE FROM "{table}" WHERE id IN ("#));
            let mut separated = qb.separated(", ");
            for id in chunk {
                separated.push_bind(sql_id(*id)?);
            }
            separated.push_unseparated(")");
            deleted += qb.build().execute(&self.pool).await.map_err(|e| db_error(table, e))?.rows_affected();
        }
        Ok(deleted)
    }

    async fn delete_where(&self, table: &str, predicate: &Predicate) -> Result<u64> {
        let table = validate_name(table)?;
        let mut qb = QueryBuilder::<Sqlite>::new(format!(r#"DELETE FROM "{table}" WHERE "#));
        push_predicate(&mut qb, predicate)?;
        let result = qb.build().execute(&self.pool).await.map_err(|e| db_error(table, e))?;
        Ok(result.rows_affected())
    }

    async fn duplicate_ids(&self, table: &str, field: &str) -> Result<Vec<u64>> {
        let table = validate_name(table)?;
        let field = validate_name(field)?;
        // Matches the indexed expression exactly so the planner can use it
        // for the correlated lookup.
        let sql = format!(
            r#"
                SELECT t.id FROM "{table}" AS t
                WHERE EXISTS (
                    SELECT 1 FROM "{table}" AS p
                    WHERE json_extract(p.doc, '$.{field}') = json_extract(t.doc, '$.{field}')
                    AND p.id < t.id
                )
                ORDER BY t.id
            "#
        );
        let ids: Vec<i64> = sqlx::query_scalar(&sql).fetch_all(&self.pool).await.map_err(|e| db_error(table, e))?;
        ids.into_iter().map(|id| u64::try_from(id).or_raise(|| ErrorKind::InvalidData)).collect()
    }

    #[instrument(level = "debug", skip_all, fields(keys = entries.len()))]
    async fn put_meta(&self, entries: &[(&str, Value)]) -> Result<()> {
        let upsert = format!(
            r#"INSERT INTO "{META_TABLE}" (key, value) VALUES (?, ?) ON CONFLICT(key) DO UPDATE SET value = excluded.value"#
        );
        let mut tx = self.pool.begin().await.map_err(|e| db_error(META_TABLE, e))?;
        sqlx::query(&format!(r#"CREATE TABLE IF NOT EXISTS "{META_TABLE}" (key TEXT PRIMARY KEY, value TEXT NOT NULL)"#))
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error(META_TABLE, e))?;
        for (key, value) in entries {
            let value = serde_json::to_string(value).or_raise(|| ErrorKind::InvalidData)?;
            sqlx::query(&upsert)
                .bind(*key)
                .bind(value)
                .execute(&mut *tx)
                .await
                .map_err(|e| db_error(META_TABLE, e))?;
        }
        tx.commit().await.map_err(|e| db_error(META_TABLE, e))
    }

    async fn get_meta(&self, key: &str) -> Result<Option<Value>> {
        if !self.table_exists(META_TABLE).await? {
            return Ok(None);
        }
        let value: Option<String> = sqlx::query_scalar(&format!(r#"SELECT value FROM "{META_TABLE}" WHERE key = ?"#))
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error(META_TABLE, e))?;
        value.map(|v| serde_json::from_str(&v).or_raise(|| ErrorKind::InvalidData)).transpose()
    }

    async fn free_memory(&self) -> Result<()> {
        sqlx::query("PRAGMA shrink_memory").execute(&self.pool).await.or_raise(|| ErrorKind::Database)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn store_with_rows(table: &str, docs: &[(u64, Value)]) -> SqliteStore {
        let store = SqliteStore::connect_in_memory().await.unwrap();
        store.create_table(table).await.unwrap();
        let rows = docs.iter().map(|(id, doc)| Row::new(*id, doc.clone())).collect();
        store.insert(table, rows).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_pragmas_are_applied() {
        let store = SqliteStore::connect_in_memory().await.unwrap();
        let row: (i64,) = sqlx::query_as("PRAGMA wal_autocheckpoint").fetch_one(store.pool()).await.unwrap();
        assert_eq!(row.0, 800, "WAL checkpoint should be 800");
        store.close().await;
    }

    #[tokio::test]
    async fn test_select_page_walks_ids_in_order() {
        let docs: Vec<_> = [5, 1, 3, 2, 4].into_iter().map(|id| (id, json!({"id": id}))).collect();
        let store = store_with_rows("book", &docs).await;
        let first = store.select_page("book", 0, 2).await.unwrap();
        assert_eq!(first.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 2]);
        let rest = store.select_page("book", 2, 10).await.unwrap();
        assert_eq!(rest.iter().map(|r| r.id).collect::<Vec<_>>(), vec![3, 4, 5]);
        assert!(store.select_page("book", 5, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_select_and_delete_ids() {
        let docs: Vec<_> = (1..=6).map(|id| (id, json!({"id": id}))).collect();
        let store = store_with_rows("book", &docs).await;
        let rows = store.select_ids("book", &[2, 4, 9]).await.unwrap();
        assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![2, 4]);
        assert_eq!(store.delete_ids("book", &[1, 2, 9]).await.unwrap(), 2);
        assert_eq!(store.count("book").await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_predicates() {
        let docs = vec![
            (1, json!({"value": "?", "del": 0})),
            (2, json!({"value": "a", "del": 1})),
            (3, json!({"value": "b", "del": 0})),
        ];
        let store = store_with_rows("series", &docs).await;
        let rows = store.select_where("series", &Predicate::any_of("value", ["a", "b"])).await.unwrap();
        assert_eq!(rows.len(), 2);
        let rows = store.select_where("series", &Predicate::equals("del", 0)).await.unwrap();
        assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(store.delete_where("series", &Predicate::equals("value", "?")).await.unwrap(), 1);
        assert_eq!(store.count("series").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_ids_keep_first_seen() {
        let docs = vec![
            (1, json!({"uid": "u1"})),
            (2, json!({"uid": "u2"})),
            (3, json!({"uid": "u1"})),
            (4, json!({"uid": "u1"})),
            (5, json!({"uid": "u2"})),
        ];
        let store = store_with_rows("book_temp", &docs).await;
        store.create_index("book_temp", &IndexSpec::non_unique("uid")).await.unwrap();
        assert_eq!(store.duplicate_ids("book_temp", "uid").await.unwrap(), vec![3, 4, 5]);
        store.drop_index("book_temp", "uid").await.unwrap();
    }

    #[tokio::test]
    async fn test_unique_index_rejects_duplicates() {
        let docs = vec![(1, json!({"uid": "u1"})), (2, json!({"uid": "u1"}))];
        let store = store_with_rows("book", &docs).await;
        let err = store.create_index("book", &IndexSpec::unique("uid")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Constraint(t) if t == "book"));
    }

    #[tokio::test]
    async fn test_rename_replaces_destination() {
        let store = store_with_rows("book_temp", &[(1, json!({"id": 1}))]).await;
        store.create_table("book").await.unwrap();
        store.rename_table("book_temp", "book").await.unwrap();
        assert!(!store.table_exists("book_temp").await.unwrap());
        assert_eq!(store.count("book").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_missing_table() {
        let store = SqliteStore::connect_in_memory().await.unwrap();
        let err = store.count("nope").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::TableNotFound(t) if t == "nope"));
    }

    #[tokio::test]
    async fn test_meta_round_trip() {
        let store = SqliteStore::connect_in_memory().await.unwrap();
        assert_eq!(store.get_meta("stats").await.unwrap(), None);
        store.put_meta(&[("stats", json!({"bookCount": 1}))]).await.unwrap();
        store
            .put_meta(&[("stats", json!({"bookCount": 2})), ("inpxHash", json!("abc"))])
            .await
            .unwrap();
        assert_eq!(store.get_meta("stats").await.unwrap(), Some(json!({"bookCount": 2})));
        assert_eq!(store.get_meta("inpxHash").await.unwrap(), Some(json!("abc")));
    }
}
