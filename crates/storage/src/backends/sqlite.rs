//! SQLite document store backend.
//!
//! Documents live in a single `documents` table whose primary key is the
//! flattened composite key. Property filters and ordering use SQLite's JSON
//! functions on the stored document text.

use crate::error::{StorageError, StorageResult};
use crate::key::{Ancestor, Key, KeyId, Kind};
use crate::query::{Direction, Document, Query};
use crate::traits::{DocumentStore, UpdateFn, check_batch, check_document};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{FromRow, Pool, Row, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::instrument;

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

const KEY_COLUMNS: &str = "namespace, parent_kind, parent_num, parent_name, kind, id_num, id_name";

const KEY_MATCH: &str = "namespace = ? AND parent_kind = ? AND parent_num = ? \
     AND parent_name = ? AND kind = ? AND id_num = ? AND id_name = ?";

/// Row order equal to the `Ord` of [`Key`]: numeric IDs sort before names.
const KEY_ORDER: &str = "namespace, parent_kind, parent_name <> '', parent_num, parent_name, \
     kind, id_name <> '', id_num, id_name";

/// SQLite-based document store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (and create if missing) the database at `path`.
    ///
    /// `:memory:` opens a private in-memory database that lives as long as
    /// the store.
    pub async fn new(path: impl AsRef<Path>, busy_timeout: Duration) -> StorageResult<Self> {
        let path = path.as_ref();
        let in_memory = path.as_os_str() == ":memory:";

        let opts = if in_memory {
            SqliteConnectOptions::from_str("sqlite::memory:")?
        } else {
            // Ensure parent directory exists
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                tokio::fs::create_dir_all(parent).await?;
            }
            SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal)
        }
        .busy_timeout(busy_timeout);

        let mut pool_opts = SqlitePoolOptions::new()
            // A single connection serializes writers and keeps read-modify-write
            // transactions free of "database is locked" failures.
            .max_connections(1);
        if in_memory {
            // Closing the only connection would drop the database.
            pool_opts = pool_opts.idle_timeout(None).max_lifetime(None);
        }
        let pool = pool_opts.connect_with(opts).await?;

        let store = Self { pool };
        store.migrate().await?;
        tracing::debug!(path = %path.display(), "SQLite document store opened");
        Ok(store)
    }

    async fn migrate(&self) -> StorageResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }
}

/// Flattened key columns. Absent parents and unused ID halves are stored as
/// `''` / `0` so every column can take part in the primary key.
struct KeyColumns<'a> {
    namespace: &'a str,
    parent_kind: &'a str,
    parent_num: i64,
    parent_name: &'a str,
    kind: &'a str,
    id_num: i64,
    id_name: &'a str,
}

impl<'a> KeyColumns<'a> {
    fn of(key: &'a Key) -> Self {
        let (parent_kind, parent_num, parent_name) = match key.parent() {
            Some(parent) => {
                let (num, name) = split_id(&parent.id);
                (parent.kind.as_str(), num, name)
            }
            None => ("", 0, ""),
        };
        let (id_num, id_name) = split_id(key.key_id());
        Self {
            namespace: key.namespace(),
            parent_kind,
            parent_num,
            parent_name,
            kind: key.kind().as_str(),
            id_num,
            id_name,
        }
    }

    fn bind(self, query: SqliteQuery<'a>) -> SqliteQuery<'a> {
        query
            .bind(self.namespace)
            .bind(self.parent_kind)
            .bind(self.parent_num)
            .bind(self.parent_name)
            .bind(self.kind)
            .bind(self.id_num)
            .bind(self.id_name)
    }
}

fn split_id(id: &KeyId) -> (i64, &str) {
    match id {
        KeyId::Id(num) => (*num, ""),
        KeyId::Name(name) => (0, name.as_str()),
    }
}

fn join_id(num: i64, name: &str) -> KeyId {
    if name.is_empty() {
        KeyId::Id(num)
    } else {
        KeyId::Name(name.to_string())
    }
}

#[derive(FromRow)]
struct DocumentRow {
    namespace: String,
    parent_kind: String,
    parent_num: i64,
    parent_name: String,
    kind: String,
    id_num: i64,
    id_name: String,
    data: Option<String>,
}

impl DocumentRow {
    fn into_document(self) -> StorageResult<Document> {
        let parent = (!self.parent_kind.is_empty()).then(|| Ancestor {
            kind: Kind::new(self.parent_kind),
            id: join_id(self.parent_num, &self.parent_name),
        });
        let key = Key::from_parts(
            self.namespace,
            parent,
            Kind::new(self.kind),
            join_id(self.id_num, &self.id_name),
        );
        let data = self.data.map(|d| serde_json::from_str(&d)).transpose()?;
        Ok(Document { key, data })
    }
}

enum Param {
    Text(String),
    Int(i64),
    Real(f64),
}

fn check_field(field: &str) -> StorageResult<()> {
    if field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(StorageError::InvalidQuery(format!(
            "unsupported property name: {field:?}"
        )))
    }
}

/// Build the SQL and parameters for `query`.
fn build_query(query: &Query) -> StorageResult<(String, Vec<Param>)> {
    let mut sql = format!(
        "SELECT {KEY_COLUMNS}, {} AS data FROM documents WHERE namespace = ? AND kind = ?",
        if query.is_keys_only() { "NULL" } else { "data" }
    );
    let mut params = vec![
        Param::Text(query.namespace().to_string()),
        Param::Text(query.kind().as_str().to_string()),
    ];

    if let Some(ancestor) = query.ancestor_key() {
        let (num, name) = split_id(ancestor.key_id());
        sql.push_str(" AND parent_kind = ? AND parent_num = ? AND parent_name = ?");
        params.push(Param::Text(ancestor.kind().as_str().to_string()));
        params.push(Param::Int(num));
        params.push(Param::Text(name.to_string()));
    }

    for (field, value) in query.filters() {
        check_field(field)?;
        match value {
            Value::Null => {
                sql.push_str(&format!(" AND json_type(data, '$.{field}') = 'null'"));
            }
            Value::Bool(b) => {
                sql.push_str(&format!(" AND json_extract(data, '$.{field}') = ?"));
                params.push(Param::Int(i64::from(*b)));
            }
            Value::Number(n) => {
                sql.push_str(&format!(" AND json_extract(data, '$.{field}') = ?"));
                params.push(match n.as_i64() {
                    Some(i) => Param::Int(i),
                    None => Param::Real(n.as_f64().unwrap_or(f64::NAN)),
                });
            }
            Value::String(s) => {
                sql.push_str(&format!(" AND json_extract(data, '$.{field}') = ?"));
                params.push(Param::Text(s.clone()));
            }
            Value::Array(_) | Value::Object(_) => {
                return Err(StorageError::InvalidQuery(format!(
                    "filter on {field} must compare against a scalar"
                )));
            }
        }
    }

    sql.push_str(" ORDER BY ");
    if let Some((field, direction)) = query.ordering() {
        check_field(field)?;
        let dir = match direction {
            Direction::Ascending => "ASC",
            Direction::Descending => "DESC",
        };
        sql.push_str(&format!("json_extract(data, '$.{field}') {dir}, "));
    }
    sql.push_str(KEY_ORDER);

    Ok((sql, params))
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn get(&self, key: &Key) -> StorageResult<Option<Value>> {
        key.validate()?;
        let sql = format!("SELECT data FROM documents WHERE {KEY_MATCH}");
        let row = KeyColumns::of(key)
            .bind(sqlx::query(&sql))
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let data: String = row.try_get("data")?;
                Ok(Some(serde_json::from_str(&data)?))
            }
            None => Ok(None),
        }
    }

    async fn get_multi(&self, keys: &[Key]) -> StorageResult<Vec<Option<Value>>> {
        check_batch(keys.iter(), self.max_batch_size())?;
        let sql = format!("SELECT data FROM documents WHERE {KEY_MATCH}");
        let mut tx = self.pool.begin().await?;
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            let row = KeyColumns::of(key)
                .bind(sqlx::query(&sql))
                .fetch_optional(&mut *tx)
                .await?;
            out.push(match row {
                Some(row) => {
                    let data: String = row.try_get("data")?;
                    Some(serde_json::from_str(&data)?)
                }
                None => None,
            });
        }
        tx.commit().await?;
        Ok(out)
    }

    async fn put(&self, key: &Key, data: Value) -> StorageResult<()> {
        key.validate()?;
        check_document(key, &data)?;
        let text = serde_json::to_string(&data)?;
        KeyColumns::of(key)
            .bind(sqlx::query(UPSERT_SQL))
            .bind(text)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, entries), fields(count = entries.len()))]
    async fn put_multi(&self, entries: Vec<(Key, Value)>) -> StorageResult<()> {
        check_batch(entries.iter().map(|(k, _)| k), self.max_batch_size())?;
        let mut tx = self.pool.begin().await?;
        for (key, data) in &entries {
            check_document(key, data)?;
            let text = serde_json::to_string(data)?;
            KeyColumns::of(key)
                .bind(sqlx::query(UPSERT_SQL))
                .bind(text)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, key: &Key) -> StorageResult<()> {
        key.validate()?;
        let sql = format!("DELETE FROM documents WHERE {KEY_MATCH}");
        KeyColumns::of(key)
            .bind(sqlx::query(&sql))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, keys), fields(count = keys.len()))]
    async fn delete_multi(&self, keys: &[Key]) -> StorageResult<()> {
        check_batch(keys.iter(), self.max_batch_size())?;
        let sql = format!("DELETE FROM documents WHERE {KEY_MATCH}");
        let mut tx = self.pool.begin().await?;
        for key in keys {
            KeyColumns::of(key)
                .bind(sqlx::query(&sql))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self, query), fields(kind = %query.kind()))]
    async fn query(&self, query: &Query) -> StorageResult<Vec<Document>> {
        query.validate()?;
        let (sql, params) = build_query(query)?;

        let mut q = sqlx::query_as::<_, DocumentRow>(&sql);
        for param in params {
            q = match param {
                Param::Text(s) => q.bind(s),
                Param::Int(i) => q.bind(i),
                Param::Real(f) => q.bind(f),
            };
        }
        let rows = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(DocumentRow::into_document).collect()
    }

    async fn allocate_ids(&self, kind: &Kind, count: usize) -> StorageResult<Vec<i64>> {
        let count = i64::try_from(count)
            .map_err(|_| StorageError::InvalidKey(format!("cannot allocate {count} ids")))?;
        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT OR IGNORE INTO id_sequences (kind, next_id) VALUES (?, 1)")
            .bind(kind.as_str())
            .execute(&mut *tx)
            .await?;
        let start: i64 = sqlx::query_scalar("SELECT next_id FROM id_sequences WHERE kind = ?")
            .bind(kind.as_str())
            .fetch_one(&mut *tx)
            .await?;
        sqlx::query("UPDATE id_sequences SET next_id = ? WHERE kind = ?")
            .bind(start + count)
            .bind(kind.as_str())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok((start..start + count).collect())
    }

    async fn read_modify_write(&self, key: &Key, update: UpdateFn) -> StorageResult<bool> {
        key.validate()?;
        let select = format!("SELECT data FROM documents WHERE {KEY_MATCH}");
        let mut tx = self.pool.begin().await?;

        let current = match KeyColumns::of(key)
            .bind(sqlx::query(&select))
            .fetch_optional(&mut *tx)
            .await?
        {
            Some(row) => {
                let data: String = row.try_get("data")?;
                Some(serde_json::from_str(&data)?)
            }
            None => None,
        };

        // Dropping `tx` on an early return rolls the transaction back.
        let Some(next) = update(current)? else {
            tx.commit().await?;
            return Ok(false);
        };
        check_document(key, &next)?;
        KeyColumns::of(key)
            .bind(sqlx::query(UPSERT_SQL))
            .bind(serde_json::to_string(&next)?)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(true)
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    async fn health_check(&self) -> StorageResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

const UPSERT_SQL: &str = "INSERT OR REPLACE INTO documents \
     (namespace, parent_kind, parent_num, parent_name, kind, id_num, id_name, data) \
     VALUES (?, ?, ?, ?, ?, ?, ?, ?)";

/// SQL schema for SQLite.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    namespace TEXT NOT NULL,
    parent_kind TEXT NOT NULL DEFAULT '',
    parent_num INTEGER NOT NULL DEFAULT 0,
    parent_name TEXT NOT NULL DEFAULT '',
    kind TEXT NOT NULL,
    id_num INTEGER NOT NULL DEFAULT 0,
    id_name TEXT NOT NULL DEFAULT '',
    data TEXT NOT NULL,
    PRIMARY KEY (namespace, parent_kind, parent_num, parent_name, kind, id_num, id_name)
);
CREATE INDEX IF NOT EXISTS idx_documents_kind ON documents(namespace, kind);

CREATE TABLE IF NOT EXISTS id_sequences (
    kind TEXT PRIMARY KEY,
    next_id INTEGER NOT NULL
);
"#;
