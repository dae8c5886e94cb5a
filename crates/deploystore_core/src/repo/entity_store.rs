//! Entity store contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide put/get/query/delete over documents keyed by `(kind, id)`.
//! - Keep SQL and JSON details inside the persistence boundary.
//!
//! # Invariants
//! - Every operation is atomic for a single record; nothing spans records.
//! - Each successful write bumps the stored `version` and mirrors it, plus
//!   `id`, into the persisted body.
//! - Query results are ordered by insertion time, then id.

use crate::db::{open_db, open_db_in_memory};
use crate::document::{Document, EntityKind, FieldFilter, WritePrecondition};
use crate::error::{BackendError, BackendResult};
use crate::model::now_epoch_ms;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, TransactionBehavior};
use serde_json::Value;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

static FIELD_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("valid field name regex"));

/// Document store contract over the four entity kinds.
pub trait EntityStore: Send + Sync {
    /// Writes one record and returns its new version.
    fn put(
        &self,
        kind: EntityKind,
        id: &str,
        record: &Document,
        precondition: WritePrecondition,
    ) -> BackendResult<u64>;
    /// Loads one record by id.
    fn get(&self, kind: EntityKind, id: &str) -> BackendResult<Option<Document>>;
    /// Lists records matching every equality filter.
    fn query(
        &self,
        kind: EntityKind,
        filters: &[FieldFilter],
        limit: Option<u32>,
    ) -> BackendResult<Vec<Document>>;
    /// Lists all ids of one kind.
    fn keys(&self, kind: EntityKind) -> BackendResult<Vec<String>>;
    /// Deletes the listed ids and returns how many existed.
    fn delete(&self, kind: EntityKind, ids: &[String]) -> BackendResult<usize>;
    /// Performs a trivial read to prove the store is reachable.
    fn ping(&self) -> BackendResult<()>;
}

/// SQLite-backed document store.
pub struct SqliteEntityStore {
    conn: Mutex<Connection>,
}

impl SqliteEntityStore {
    /// Opens (or creates) a database file with migrations applied.
    pub fn open(path: impl AsRef<Path>) -> BackendResult<Self> {
        Ok(Self::from_connection(open_db(path)?))
    }

    /// Opens a private in-memory database with migrations applied.
    pub fn open_in_memory() -> BackendResult<Self> {
        Ok(Self::from_connection(open_db_in_memory()?))
    }

    /// Wraps an already migrated connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn lock(&self) -> BackendResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| BackendError::unavailable("entity store connection lock poisoned"))
    }
}

impl EntityStore for SqliteEntityStore {
    fn put(
        &self,
        kind: EntityKind,
        id: &str,
        record: &Document,
        precondition: WritePrecondition,
    ) -> BackendResult<u64> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current = tx
            .query_row(
                "SELECT version FROM documents WHERE kind = ?1 AND id = ?2;",
                params![kind.as_str(), id],
                |row| row.get::<_, i64>(0),
            )
            .optional()?
            .map(version_from_db);

        match (precondition, current) {
            (WritePrecondition::Absent, Some(_)) => {
                return Err(BackendError::conflict(format!("{kind} {id} already exists")));
            }
            (WritePrecondition::Version(_), None) => {
                return Err(BackendError::not_found(format!("{kind} {id} not found")));
            }
            (WritePrecondition::Version(expected), Some(actual)) if expected != actual => {
                return Err(BackendError::conflict(format!(
                    "version conflict on {kind} {id}: expected {expected}, found {actual}"
                )));
            }
            _ => {}
        }

        let next_version = current.map_or(1, |version| version + 1);
        let mut body = record.clone();
        body.insert("id".to_string(), Value::String(id.to_string()));
        body.insert("version".to_string(), Value::from(next_version));
        let body_text = serde_json::to_string(&body)?;

        tx.execute(
            "INSERT INTO documents (kind, id, version, body, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (kind, id) DO UPDATE SET
                version = excluded.version,
                body = excluded.body;",
            params![
                kind.as_str(),
                id,
                version_to_db(next_version),
                body_text,
                now_epoch_ms(),
            ],
        )?;
        tx.commit()?;

        Ok(next_version)
    }

    fn get(&self, kind: EntityKind, id: &str) -> BackendResult<Option<Document>> {
        let conn = self.lock()?;
        let body = conn
            .query_row(
                "SELECT body FROM documents WHERE kind = ?1 AND id = ?2;",
                params![kind.as_str(), id],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        body.map(|text| parse_body(kind, &text)).transpose()
    }

    fn query(
        &self,
        kind: EntityKind,
        filters: &[FieldFilter],
        limit: Option<u32>,
    ) -> BackendResult<Vec<Document>> {
        let mut sql = String::from("SELECT body FROM documents WHERE kind = ?");
        let mut bind_values: Vec<SqlValue> = vec![SqlValue::Text(kind.as_str().to_string())];

        for filter in filters {
            if !FIELD_NAME_RE.is_match(filter.field) {
                return Err(BackendError::other(format!(
                    "invalid query field name `{}`",
                    filter.field
                )));
            }
            // Field names are validated above; inlining keeps expression indexes usable.
            sql.push_str(&format!(" AND json_extract(body, '$.{}') = ?", filter.field));
            bind_values.push(SqlValue::Text(filter.value.clone()));
        }

        sql.push_str(" ORDER BY created_at ASC, id ASC");
        if let Some(limit) = limit {
            sql.push_str(" LIMIT ?");
            bind_values.push(SqlValue::Integer(i64::from(limit)));
        }

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut documents = Vec::new();
        while let Some(row) = rows.next()? {
            let text: String = row.get(0)?;
            documents.push(parse_body(kind, &text)?);
        }

        Ok(documents)
    }

    fn keys(&self, kind: EntityKind) -> BackendResult<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT id FROM documents WHERE kind = ?1 ORDER BY id ASC;")?;
        let mut rows = stmt.query([kind.as_str()])?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next()? {
            ids.push(row.get(0)?);
        }
        Ok(ids)
    }

    fn delete(&self, kind: EntityKind, ids: &[String]) -> BackendResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut removed = 0;
        for id in ids {
            removed += tx.execute(
                "DELETE FROM documents WHERE kind = ?1 AND id = ?2;",
                params![kind.as_str(), id],
            )?;
        }
        tx.commit()?;
        Ok(removed)
    }

    fn ping(&self) -> BackendResult<()> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT COUNT(*) FROM (SELECT 1 FROM documents LIMIT 1);",
            [],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(())
    }
}

fn parse_body(kind: EntityKind, text: &str) -> BackendResult<Document> {
    match serde_json::from_str::<Value>(text)? {
        Value::Object(map) => Ok(map),
        _ => Err(BackendError::other(format!(
            "invalid persisted {kind} document: expected a JSON object"
        ))),
    }
}

fn version_from_db(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn version_to_db(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::{EntityStore, SqliteEntityStore};
    use crate::document::{Document, EntityKind, FieldFilter, WritePrecondition};
    use crate::error::BackendSignal;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().cloned().expect("test value should be an object")
    }

    fn store() -> SqliteEntityStore {
        SqliteEntityStore::open_in_memory().expect("in-memory store should open")
    }

    #[test]
    fn put_then_get_mirrors_id_and_version() {
        let store = store();
        let version = store
            .put(
                EntityKind::Account,
                "a1",
                &doc(json!({"email": "u@x.com"})),
                WritePrecondition::Absent,
            )
            .unwrap();
        assert_eq!(version, 1);

        let loaded = store.get(EntityKind::Account, "a1").unwrap().unwrap();
        assert_eq!(loaded["id"], json!("a1"));
        assert_eq!(loaded["version"], json!(1));
        assert_eq!(loaded["email"], json!("u@x.com"));
    }

    #[test]
    fn same_id_in_different_kinds_does_not_collide() {
        let store = store();
        store
            .put(EntityKind::App, "x", &doc(json!({"name": "app"})), WritePrecondition::Absent)
            .unwrap();
        store
            .put(
                EntityKind::Deployment,
                "x",
                &doc(json!({"name": "dep"})),
                WritePrecondition::Absent,
            )
            .unwrap();
        assert_eq!(
            store.get(EntityKind::App, "x").unwrap().unwrap()["name"],
            json!("app")
        );
        assert!(store.get(EntityKind::Account, "x").unwrap().is_none());
    }

    #[test]
    fn absent_precondition_rejects_existing_record() {
        let store = store();
        let record = doc(json!({"name": "one"}));
        store
            .put(EntityKind::App, "x", &record, WritePrecondition::Absent)
            .unwrap();
        let err = store
            .put(EntityKind::App, "x", &record, WritePrecondition::Absent)
            .unwrap_err();
        assert_eq!(err.signal, BackendSignal::Conflict);
    }

    #[test]
    fn version_precondition_is_compare_and_swap() {
        let store = store();
        store
            .put(EntityKind::App, "x", &doc(json!({"name": "v1"})), WritePrecondition::Any)
            .unwrap();
        let v2 = store
            .put(
                EntityKind::App,
                "x",
                &doc(json!({"name": "v2"})),
                WritePrecondition::Version(1),
            )
            .unwrap();
        assert_eq!(v2, 2);

        let stale = store
            .put(
                EntityKind::App,
                "x",
                &doc(json!({"name": "stale"})),
                WritePrecondition::Version(1),
            )
            .unwrap_err();
        assert_eq!(stale.signal, BackendSignal::Conflict);

        let missing = store
            .put(
                EntityKind::App,
                "nope",
                &doc(json!({})),
                WritePrecondition::Version(1),
            )
            .unwrap_err();
        assert_eq!(missing.signal, BackendSignal::NotFound);
    }

    #[test]
    fn query_applies_all_filters_and_limit() {
        let store = store();
        for (id, account, app) in [("d1", "a1", "p1"), ("d2", "a1", "p2"), ("d3", "a2", "p1")] {
            store
                .put(
                    EntityKind::Deployment,
                    id,
                    &doc(json!({"accountId": account, "appId": app})),
                    WritePrecondition::Absent,
                )
                .unwrap();
        }

        let matched = store
            .query(
                EntityKind::Deployment,
                &[FieldFilter::eq("accountId", "a1"), FieldFilter::eq("appId", "p1")],
                None,
            )
            .unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0]["id"], json!("d1"));

        let limited = store
            .query(EntityKind::Deployment, &[FieldFilter::eq("accountId", "a1")], Some(1))
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn query_rejects_unsafe_field_names() {
        let store = store();
        let err = store
            .query(EntityKind::Account, &[FieldFilter::eq("email') OR 1=1 --", "x")], None)
            .unwrap_err();
        assert_eq!(err.signal, BackendSignal::Other);
    }

    #[test]
    fn delete_ignores_missing_ids_and_reports_removed_count() {
        let store = store();
        store
            .put(EntityKind::AccessKey, "k1", &doc(json!({})), WritePrecondition::Any)
            .unwrap();
        let removed = store
            .delete(EntityKind::AccessKey, &["k1".to_string(), "ghost".to_string()])
            .unwrap();
        assert_eq!(removed, 1);
        assert!(store.keys(EntityKind::AccessKey).unwrap().is_empty());
    }

    #[test]
    fn ping_succeeds_on_empty_store() {
        store().ping().expect("ping should succeed");
    }
}
