//! SQLite-backed [`MetaStore`].
//!
//! ## Schema
//!
//! ```text
//! meta
//! ├── id                  INTEGER PRIMARY KEY
//! ├── owner_type          TEXT      ┐
//! ├── owner_id            TEXT      ├ unique
//! ├── key                 TEXT      ┘
//! ├── type                TEXT      boolean | number | string | json | date
//! ├── value_string        TEXT
//! ├── value_translations  TEXT      JSON object locale -> text
//! ├── value_json          TEXT      JSON
//! ├── value_decimal       TEXT      exact decimal digits
//! ├── value_boolean       INTEGER
//! ├── value_datetime      TEXT      RFC 3339
//! ├── created_at          TEXT
//! └── updated_at          TEXT
//! ```
//!
//! Only the columns of the active slot are written; the others are null.
//! A `store_meta` table carries the schema version.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::{Number, Value};
use tracing::{debug, info};

use super::MetaStore;
use crate::error::{MetaError, Result};
use crate::model::{MetaId, MetaRecord, OwnerRef, StoredValue, TextValue, TypeTag};

const SCHEMA_VERSION: i64 = 1;
const BUSY_TIMEOUT: Duration = Duration::from_millis(5_000);

const SELECT_COLUMNS: &str = "SELECT id, owner_type, owner_id, key, type, value_string, \
     value_translations, value_json, value_decimal, value_boolean, value_datetime, \
     created_at, updated_at FROM meta";

const UPSERT: &str = "INSERT INTO meta (owner_type, owner_id, key, type, value_string, \
     value_translations, value_json, value_decimal, value_boolean, value_datetime, \
     created_at, updated_at) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11) \
     ON CONFLICT (owner_type, owner_id, key) DO UPDATE SET \
     type = excluded.type, value_string = excluded.value_string, \
     value_translations = excluded.value_translations, value_json = excluded.value_json, \
     value_decimal = excluded.value_decimal, value_boolean = excluded.value_boolean, \
     value_datetime = excluded.value_datetime, updated_at = excluded.updated_at";

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path`, along with any
    /// missing parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        Self::with_connection(conn)
    }

    /// A private, non-persistent database.
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn query_records<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<MetaRecord>> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let rows = stmt
            .query_map(params, RawRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(RawRow::into_record).collect()
    }
}

/// Creates the schema or validates the stored version.
fn initialize_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")?;
    let version: Option<i64> = conn
        .query_row("SELECT version FROM store_meta LIMIT 1", [], |row| row.get(0))
        .optional()?;

    match version {
        None => {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS meta (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    owner_type TEXT NOT NULL,
                    owner_id TEXT NOT NULL,
                    key TEXT NOT NULL,
                    type TEXT NOT NULL,
                    value_string TEXT,
                    value_translations TEXT,
                    value_json TEXT,
                    value_decimal TEXT,
                    value_boolean INTEGER,
                    value_datetime TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );
                CREATE UNIQUE INDEX IF NOT EXISTS meta_owner_key
                    ON meta (owner_type, owner_id, key);
                CREATE INDEX IF NOT EXISTS meta_kind_key ON meta (owner_type, key);",
            )?;
            conn.execute(
                "INSERT INTO store_meta (version) VALUES (?1)",
                params![SCHEMA_VERSION],
            )?;
            info!(version = SCHEMA_VERSION, "initialized meta schema");
            Ok(())
        }
        Some(SCHEMA_VERSION) => Ok(()),
        Some(other) => Err(MetaError::Corrupt(format!(
            "unsupported schema version {}",
            other
        ))),
    }
}

/// Column values of one slot, ready to bind.
#[derive(Default)]
struct SlotColumns {
    string: Option<String>,
    translations: Option<String>,
    json: Option<String>,
    decimal: Option<String>,
    boolean: Option<bool>,
    datetime: Option<String>,
}

impl SlotColumns {
    fn from_value(value: &StoredValue) -> Result<Self> {
        let mut cols = SlotColumns::default();
        match value {
            StoredValue::Boolean(b) => cols.boolean = *b,
            StoredValue::Number(n) => cols.decimal = n.as_ref().map(Number::to_string),
            StoredValue::Date(d) => cols.datetime = d.map(format_timestamp),
            StoredValue::Json(json) => cols.json = Some(serde_json::to_string(json)?),
            StoredValue::String(text) => {
                cols.string = text.plain.clone();
                cols.translations = Some(serde_json::to_string(&text.translations)?);
            }
        }
        Ok(cols)
    }
}

/// A row as read from SQLite, before validation.
struct RawRow {
    id: MetaId,
    owner_type: String,
    owner_id: String,
    key: String,
    type_tag: String,
    cols: SlotColumns,
    created_at: String,
    updated_at: String,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            owner_type: row.get(1)?,
            owner_id: row.get(2)?,
            key: row.get(3)?,
            type_tag: row.get(4)?,
            cols: SlotColumns {
                string: row.get(5)?,
                translations: row.get(6)?,
                json: row.get(7)?,
                decimal: row.get(8)?,
                boolean: row.get(9)?,
                datetime: row.get(10)?,
            },
            created_at: row.get(11)?,
            updated_at: row.get(12)?,
        })
    }

    fn into_record(self) -> Result<MetaRecord> {
        let tag: TypeTag = self
            .type_tag
            .parse()
            .map_err(|_| corrupt(self.id, "type", &self.type_tag))?;
        let cols = self.cols;

        let value = match tag {
            TypeTag::Boolean => StoredValue::Boolean(cols.boolean),
            TypeTag::Number => StoredValue::Number(
                cols.decimal
                    .map(|raw| {
                        serde_json::from_str::<Number>(&raw)
                            .map_err(|_| corrupt(self.id, "value_decimal", &raw))
                    })
                    .transpose()?,
            ),
            TypeTag::Date => StoredValue::Date(
                cols.datetime
                    .map(|raw| parse_timestamp(self.id, "value_datetime", &raw))
                    .transpose()?,
            ),
            TypeTag::Json => StoredValue::Json(match cols.json {
                Some(raw) => serde_json::from_str::<Value>(&raw)
                    .map_err(|_| corrupt(self.id, "value_json", &raw))?,
                None => Value::Null,
            }),
            TypeTag::String => StoredValue::String(TextValue {
                plain: cols.string,
                translations: match cols.translations {
                    Some(raw) => serde_json::from_str::<BTreeMap<String, String>>(&raw)
                        .map_err(|_| corrupt(self.id, "value_translations", &raw))?,
                    None => BTreeMap::new(),
                },
            }),
        };

        Ok(MetaRecord {
            id: Some(self.id),
            owner: OwnerRef::new(self.owner_type, self.owner_id),
            key: self.key,
            value,
            created_at: parse_timestamp(self.id, "created_at", &self.created_at)?,
            updated_at: parse_timestamp(self.id, "updated_at", &self.updated_at)?,
        })
    }
}

fn corrupt(id: MetaId, column: &str, raw: &str) -> MetaError {
    MetaError::Corrupt(format!("row {} has invalid {}: {:?}", id, column, raw))
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn parse_timestamp(id: MetaId, column: &str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| corrupt(id, column, raw))
}

impl MetaStore for SqliteStore {
    fn find(&self, owner: &OwnerRef, key: &str) -> Result<Option<MetaRecord>> {
        let sql = format!(
            "{} WHERE owner_type = ?1 AND owner_id = ?2 AND key = ?3",
            SELECT_COLUMNS
        );
        let raw = self
            .conn
            .query_row(&sql, params![owner.kind, owner.id, key], RawRow::from_row)
            .optional()?;
        raw.map(RawRow::into_record).transpose()
    }

    fn save(&self, record: &mut MetaRecord) -> Result<()> {
        let cols = SlotColumns::from_value(&record.value)?;
        let now = Utc::now();

        self.conn.execute(
            UPSERT,
            params![
                record.owner.kind,
                record.owner.id,
                record.key,
                record.type_tag().as_str(),
                cols.string,
                cols.translations,
                cols.json,
                cols.decimal,
                cols.boolean,
                cols.datetime,
                format_timestamp(now),
            ],
        )?;

        let (id, created_at): (MetaId, String) = self.conn.query_row(
            "SELECT id, created_at FROM meta WHERE owner_type = ?1 AND owner_id = ?2 AND key = ?3",
            params![record.owner.kind, record.owner.id, record.key],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        record.id = Some(id);
        record.created_at = parse_timestamp(id, "created_at", &created_at)?;
        record.updated_at = now;
        debug!(id, owner = %record.owner, key = %record.key, "saved meta row");
        Ok(())
    }

    fn delete(&self, owner: &OwnerRef, key: &str) -> Result<bool> {
        let removed = self.conn.execute(
            "DELETE FROM meta WHERE owner_type = ?1 AND owner_id = ?2 AND key = ?3",
            params![owner.kind, owner.id, key],
        )?;
        Ok(removed > 0)
    }

    fn delete_owner(&self, owner: &OwnerRef) -> Result<usize> {
        let removed = self.conn.execute(
            "DELETE FROM meta WHERE owner_type = ?1 AND owner_id = ?2",
            params![owner.kind, owner.id],
        )?;
        Ok(removed)
    }

    fn keys(&self, owner: &OwnerRef) -> Result<BTreeSet<String>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT key FROM meta WHERE owner_type = ?1 AND owner_id = ?2")?;
        let keys = stmt
            .query_map(params![owner.kind, owner.id], |row| row.get(0))?
            .collect::<rusqlite::Result<BTreeSet<String>>>()?;
        Ok(keys)
    }

    fn records(&self, owner: &OwnerRef) -> Result<Vec<MetaRecord>> {
        let sql = format!(
            "{} WHERE owner_type = ?1 AND owner_id = ?2 ORDER BY key",
            SELECT_COLUMNS
        );
        self.query_records(&sql, params![owner.kind, owner.id])
    }

    fn records_with_key(&self, kind: &str, key: &str) -> Result<Vec<MetaRecord>> {
        let sql = format!(
            "{} WHERE owner_type = ?1 AND key = ?2 ORDER BY owner_id",
            SELECT_COLUMNS
        );
        self.query_records(&sql, params![kind, key])
    }

    fn owners(&self) -> Result<Vec<OwnerRef>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT DISTINCT owner_type, owner_id FROM meta ORDER BY owner_type, owner_id",
        )?;
        let owners = stmt
            .query_map([], |row| Ok(OwnerRef::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(owners)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn owner() -> OwnerRef {
        OwnerRef::new("article", "7")
    }

    fn saved(store: &SqliteStore, key: &str, value: StoredValue) -> MetaRecord {
        let mut record = MetaRecord::new(owner(), key, value.type_tag());
        record.value = value;
        store.save(&mut record).unwrap();
        record
    }

    #[test]
    fn test_every_slot_survives_a_round_trip() {
        let store = SqliteStore::in_memory().unwrap();
        let date = Utc.with_ymd_and_hms(2022, 12, 31, 23, 59, 58).unwrap();
        let values = [
            StoredValue::Boolean(Some(true)),
            StoredValue::Boolean(None),
            StoredValue::Number(Some(serde_json::from_str("3.14159265358979323846264338327950288").unwrap())),
            StoredValue::Date(Some(date)),
            StoredValue::Json(json!({"a": [1, 2, {"b": null}]})),
            StoredValue::Json(Value::Null),
            StoredValue::String(TextValue {
                plain: Some("plain".into()),
                translations: [("en".to_string(), "Hi".to_string())].into(),
            }),
        ];

        for (i, value) in values.into_iter().enumerate() {
            let key = format!("k{}", i);
            saved(&store, &key, value.clone());
            let found = store.find(&owner(), &key).unwrap().unwrap();
            assert_eq!(found.value, value, "slot {}", key);
        }
    }

    #[test]
    fn test_upsert_keeps_id_and_created_at() {
        let store = SqliteStore::in_memory().unwrap();
        let first = saved(&store, "views", StoredValue::Number(Some(Number::from(1))));
        let second = saved(&store, "views", StoredValue::Boolean(Some(false)));

        assert_eq!(first.id, second.id);
        assert_eq!(first.created_at, second.created_at);

        let found = store.find(&owner(), "views").unwrap().unwrap();
        assert_eq!(found.value, StoredValue::Boolean(Some(false)));
        assert_eq!(store.keys(&owner()).unwrap().len(), 1);
    }

    #[test]
    fn test_delete_paths() {
        let store = SqliteStore::in_memory().unwrap();
        saved(&store, "a", StoredValue::Boolean(Some(true)));
        saved(&store, "b", StoredValue::Boolean(Some(true)));

        assert!(store.delete(&owner(), "a").unwrap());
        assert!(!store.delete(&owner(), "a").unwrap());
        assert_eq!(store.delete_owner(&owner()).unwrap(), 1);
        assert!(store.owners().unwrap().is_empty());
    }

    #[test]
    fn test_records_with_key_spans_owners_of_one_kind() {
        let store = SqliteStore::in_memory().unwrap();
        for id in ["1", "2"] {
            let mut record = MetaRecord::new(OwnerRef::new("article", id), "status", TypeTag::Boolean);
            store.save(&mut record).unwrap();
        }
        let mut other = MetaRecord::new(OwnerRef::new("user", "1"), "status", TypeTag::Boolean);
        store.save(&mut other).unwrap();

        let found = store.records_with_key("article", "status").unwrap();
        let ids: Vec<_> = found.iter().map(|r| r.owner.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
        assert_eq!(store.owners().unwrap().len(), 3);
    }

    #[test]
    fn test_corrupt_type_is_reported() {
        let store = SqliteStore::in_memory().unwrap();
        saved(&store, "k", StoredValue::Boolean(Some(true)));
        store
            .conn
            .execute("UPDATE meta SET type = 'blob'", [])
            .unwrap();

        assert!(matches!(store.find(&owner(), "k"), Err(MetaError::Corrupt(_))));
    }

    #[test]
    fn test_reopen_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            saved(&store, "title", StoredValue::Boolean(Some(true)));
        }
        let store = SqliteStore::open(&path).unwrap();
        assert!(store.find(&owner(), "title").unwrap().is_some());
    }

    #[test]
    fn test_open_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("meta.db");
        let store = SqliteStore::open(&path).unwrap();
        saved(&store, "a", StoredValue::Boolean(Some(true)));
        assert!(path.exists());
    }

    #[test]
    fn test_records_lists_one_owner_in_key_order() {
        let store = SqliteStore::in_memory().unwrap();
        saved(&store, "b", StoredValue::Boolean(Some(true)));
        saved(&store, "a", StoredValue::Json(json!([1])));
        let mut other = MetaRecord::new(OwnerRef::new("article", "8"), "c", TypeTag::Boolean);
        store.save(&mut other).unwrap();

        let keys: Vec<_> = store
            .records(&owner())
            .unwrap()
            .into_iter()
            .map(|record| record.key)
            .collect();
        assert_eq!(keys, vec!["a", "b"]);
    }
}
