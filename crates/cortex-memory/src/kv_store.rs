//! SQLite-backed key/value memory.
//!
//! Each [`KvStore`] owns one table inside a SQLite database, so several
//! memory regions (declarative facts, emotional associations, procedural
//! workflows) can share a file while staying isolated.
//!
//! # Storage layout
//!
//! | column       | type | description                                      |
//! |--------------|------|--------------------------------------------------|
//! | key          | TEXT | Caller-chosen primary key                        |
//! | value        | TEXT | JSON-encoded value                               |
//! | metadata     | TEXT | JSON object (`priority`, `importance`, `timestamp`, `tags`, …) |
//! | created_at   | TEXT | RFC-3339 creation timestamp (UTC)                |
//! | updated_at   | TEXT | RFC-3339 last-update timestamp (UTC)             |
//!
//! # Example
//!
//! ```rust
//! use cortex_memory::kv_store::KvStore;
//! use serde_json::json;
//!
//! let store = KvStore::open_in_memory("declarative").unwrap();
//! store.store("capital:fr", json!("Paris"), None).unwrap();
//!
//! let record = store.retrieve("capital:fr").unwrap().unwrap();
//! assert_eq!(record.value, json!("Paris"));
//! assert_eq!(record.metadata["priority"], json!("normal"));
//! ```

use std::path::Path;

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use cortex_types::{CortexError, Map, Value};
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can arise from key/value store operations.
#[derive(Error, Debug)]
pub enum KvStoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid table name: {0:?}")]
    InvalidTable(String),
    #[error("Key must be a non-empty string")]
    InvalidKey,
    #[error("Key already exists: {0} (use update instead)")]
    KeyExists(String),
    #[error("Key not found: {0}")]
    NotFound(String),
    #[error("Age of {0} days is out of range")]
    AgeOutOfRange(u32),
}

impl From<KvStoreError> for CortexError {
    fn from(e: KvStoreError) -> Self {
        match e {
            KvStoreError::InvalidKey | KvStoreError::AgeOutOfRange(_) => {
                CortexError::invalid_args(e.to_string())
            }
            other => CortexError::fault(other.to_string()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// KvRecord
// ─────────────────────────────────────────────────────────────────────────────

/// One stored key with its value and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KvRecord {
    pub key: String,
    pub value: Value,
    pub metadata: Map<String, Value>,
    pub created_at: String,
    pub updated_at: String,
}

fn stamp(now: DateTime<Utc>) -> String {
    // Fixed width so stored timestamps order lexicographically.
    now.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// `now - days`, or [`KvStoreError::AgeOutOfRange`] past the calendar range.
fn cutoff(now: DateTime<Utc>, days: u32) -> Result<String, KvStoreError> {
    TimeDelta::try_days(i64::from(days))
        .and_then(|age| now.checked_sub_signed(age))
        .map(stamp)
        .ok_or(KvStoreError::AgeOutOfRange(days))
}

/// Importance given to records stored without one.
pub const DEFAULT_IMPORTANCE: i64 = 5;

// ─────────────────────────────────────────────────────────────────────────────
// KvStore
// ─────────────────────────────────────────────────────────────────────────────

/// A single SQLite table of JSON values.
pub struct KvStore {
    conn: Connection,
    table: String,
}

impl KvStore {
    /// Open (or create) `table` in the database file at `path`.
    pub fn open(path: impl AsRef<Path>, table: &str) -> Result<Self, KvStoreError> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn, table)
    }

    /// Open `table` in a private in-memory database (useful for testing).
    pub fn open_in_memory(table: &str) -> Result<Self, KvStoreError> {
        Self::with_connection(Connection::open_in_memory()?, table)
    }

    fn with_connection(conn: Connection, table: &str) -> Result<Self, KvStoreError> {
        let valid = !table.is_empty()
            && table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            && !table.starts_with(|c: char| c.is_ascii_digit());
        if !valid {
            return Err(KvStoreError::InvalidTable(table.to_string()));
        }
        let store = Self {
            conn,
            table: table.to_string(),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), KvStoreError> {
        self.conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {t} (
                key        TEXT NOT NULL PRIMARY KEY,
                value      TEXT NOT NULL,
                metadata   TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );",
            t = self.table
        ))?;
        Ok(())
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Store a new key.
    ///
    /// Missing metadata fields are defaulted: `priority` → `"normal"`,
    /// `importance` → [`DEFAULT_IMPORTANCE`], `timestamp` → now, `tags` → `[]`.
    ///
    /// Returns [`KvStoreError::KeyExists`] when `key` is already stored.
    pub fn store(
        &self,
        key: &str,
        value: Value,
        metadata: Option<Map<String, Value>>,
    ) -> Result<KvRecord, KvStoreError> {
        if key.trim().is_empty() {
            return Err(KvStoreError::InvalidKey);
        }
        if self.retrieve(key)?.is_some() {
            return Err(KvStoreError::KeyExists(key.to_string()));
        }
        let now = Utc::now();
        let mut metadata = metadata.unwrap_or_default();
        metadata
            .entry("priority")
            .or_insert_with(|| Value::from("normal"));
        metadata
            .entry("importance")
            .or_insert_with(|| Value::from(DEFAULT_IMPORTANCE));
        metadata
            .entry("timestamp")
            .or_insert_with(|| Value::from(stamp(now)));
        metadata
            .entry("tags")
            .or_insert_with(|| Value::Array(Vec::new()));

        let record = KvRecord {
            key: key.to_string(),
            value,
            metadata,
            created_at: stamp(now),
            updated_at: stamp(now),
        };
        self.conn.execute(
            &format!(
                "INSERT INTO {} (key, value, metadata, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                self.table
            ),
            params![
                record.key,
                serde_json::to_string(&record.value)?,
                serde_json::to_string(&record.metadata)?,
                record.created_at,
                record.updated_at
            ],
        )?;
        debug!(table = %self.table, key, "record stored");
        Ok(record)
    }

    /// Fetch `key`, or `None` when it is not stored.
    pub fn retrieve(&self, key: &str) -> Result<Option<KvRecord>, KvStoreError> {
        let raw = self
            .conn
            .query_row(
                &format!("{} WHERE key = ?1", self.select()),
                params![key],
                RawRow::from_row,
            )
            .optional()?;
        raw.map(RawRow::decode).transpose()
    }

    /// Remove `key`.  Returns whether anything was deleted.
    pub fn delete(&self, key: &str) -> Result<bool, KvStoreError> {
        let n = self.conn.execute(
            &format!("DELETE FROM {} WHERE key = ?1", self.table),
            params![key],
        )?;
        Ok(n > 0)
    }

    /// Every record, oldest first.
    pub fn list(&self) -> Result<Vec<KvRecord>, KvStoreError> {
        self.query(&format!("{} ORDER BY created_at ASC, key ASC", self.select()), params![])
    }

    /// Records whose `metadata.tags` array contains `tag`.
    pub fn retrieve_by_tag(&self, tag: &str) -> Result<Vec<KvRecord>, KvStoreError> {
        self.query(
            &format!(
                "SELECT DISTINCT m.key, m.value, m.metadata, m.created_at, m.updated_at
                 FROM {t} AS m, json_each(m.metadata, '$.tags') AS tag
                 WHERE tag.value = ?1
                 ORDER BY m.created_at ASC, m.key ASC",
                t = self.table
            ),
            params![tag],
        )
    }

    /// Records whose `metadata.priority` equals `priority`.
    pub fn retrieve_by_priority(&self, priority: &str) -> Result<Vec<KvRecord>, KvStoreError> {
        self.query(
            &format!(
                "{} WHERE json_extract(metadata, '$.priority') = ?1
                 ORDER BY created_at ASC, key ASC",
                self.select()
            ),
            params![priority],
        )
    }

    /// Records whose `metadata.importance` is at least `min_importance`.
    pub fn retrieve_by_importance(&self, min_importance: i64) -> Result<Vec<KvRecord>, KvStoreError> {
        self.query(
            &format!(
                "{} WHERE CAST(json_extract(metadata, '$.importance') AS INTEGER) >= ?1
                 ORDER BY created_at ASC, key ASC",
                self.select()
            ),
            params![min_importance],
        )
    }

    /// Records whose `metadata.category` equals `category`.
    pub fn retrieve_by_category(&self, category: &str) -> Result<Vec<KvRecord>, KvStoreError> {
        self.query(
            &format!(
                "{} WHERE json_extract(metadata, '$.category') = ?1
                 ORDER BY created_at ASC, key ASC",
                self.select()
            ),
            params![category],
        )
    }

    /// Records carrying `tag` (when given) whose `metadata.timestamp` is not
    /// earlier than `since` (when given).
    pub fn retrieve_by_metadata(
        &self,
        tag: Option<&str>,
        since: Option<&str>,
    ) -> Result<Vec<KvRecord>, KvStoreError> {
        self.query(
            &format!(
                "SELECT m.key, m.value, m.metadata, m.created_at, m.updated_at
                 FROM {t} AS m
                 WHERE (?1 IS NULL OR EXISTS (
                        SELECT 1 FROM json_each(m.metadata, '$.tags') AS tag
                        WHERE tag.value = ?1))
                   AND (?2 IS NULL OR json_extract(m.metadata, '$.timestamp') >= ?2)
                 ORDER BY m.created_at ASC, m.key ASC",
                t = self.table
            ),
            params![tag, since],
        )
    }

    /// Add `tag` to the record's `metadata.tags`; a tag already present is
    /// not repeated.
    pub fn add_tag(&self, key: &str, tag: &str) -> Result<KvRecord, KvStoreError> {
        let mut record = self
            .retrieve(key)?
            .ok_or_else(|| KvStoreError::NotFound(key.to_string()))?;
        let mut tags = take_tags(&mut record.metadata);
        let added = !tags.iter().any(|t| t.as_str() == Some(tag));
        if added {
            tags.push(Value::from(tag));
        }
        record.metadata.insert("tags".into(), Value::Array(tags));
        if added {
            self.write_metadata(&mut record)?;
        }
        Ok(record)
    }

    /// Remove `tag` from the record.  Returns whether the tag was present.
    pub fn remove_tag(&self, key: &str, tag: &str) -> Result<bool, KvStoreError> {
        let mut record = self
            .retrieve(key)?
            .ok_or_else(|| KvStoreError::NotFound(key.to_string()))?;
        let mut tags = take_tags(&mut record.metadata);
        let before = tags.len();
        tags.retain(|t| t.as_str() != Some(tag));
        let removed = tags.len() != before;
        record.metadata.insert("tags".into(), Value::Array(tags));
        if removed {
            self.write_metadata(&mut record)?;
        }
        Ok(removed)
    }

    /// Apply `patch` to an existing record.
    ///
    /// When both the stored value and `patch` are JSON objects the patch is
    /// merged key by key (shallow); otherwise `patch` replaces the value.
    /// `metadata.last_updated` is stamped with the current time.
    pub fn update(&self, key: &str, patch: Value) -> Result<KvRecord, KvStoreError> {
        let mut record = self
            .retrieve(key)?
            .ok_or_else(|| KvStoreError::NotFound(key.to_string()))?;

        match (&mut record.value, patch) {
            (Value::Object(current), Value::Object(fields)) => current.extend(fields),
            (value, patch) => *value = patch,
        }
        let now = Utc::now();
        record
            .metadata
            .insert("last_updated".to_string(), Value::from(now.to_rfc3339()));
        record.updated_at = stamp(now);

        self.conn.execute(
            &format!(
                "UPDATE {} SET value = ?1, metadata = ?2, updated_at = ?3 WHERE key = ?4",
                self.table
            ),
            params![
                serde_json::to_string(&record.value)?,
                serde_json::to_string(&record.metadata)?,
                record.updated_at,
                key
            ],
        )?;
        Ok(record)
    }

    /// Delete records created more than `days` days ago.  Returns how many
    /// were removed.
    pub fn clear_older_than(&self, days: u32) -> Result<usize, KvStoreError> {
        self.clear_older_than_at(days, Utc::now())
    }

    /// [`KvStore::clear_older_than`] with an explicit clock reading.
    pub fn clear_older_than_at(&self, days: u32, now: DateTime<Utc>) -> Result<usize, KvStoreError> {
        let cutoff = cutoff(now, days)?;
        let n = self.conn.execute(
            &format!("DELETE FROM {} WHERE created_at < ?1", self.table),
            params![cutoff],
        )?;
        debug!(table = %self.table, removed = n, days, "stale records cleared");
        Ok(n)
    }

    /// Delete records of `priority` whose `metadata.timestamp` is more than
    /// `max_age_days` old.
    pub fn clear_by_priority(&self, priority: &str, max_age_days: u32) -> Result<usize, KvStoreError> {
        self.clear_by_priority_at(priority, max_age_days, Utc::now())
    }

    pub fn clear_by_priority_at(
        &self,
        priority: &str,
        max_age_days: u32,
        now: DateTime<Utc>,
    ) -> Result<usize, KvStoreError> {
        let cutoff = cutoff(now, max_age_days)?;
        let n = self.conn.execute(
            &format!(
                "DELETE FROM {} WHERE json_extract(metadata, '$.priority') = ?1
                 AND json_extract(metadata, '$.timestamp') < ?2",
                self.table
            ),
            params![priority, cutoff],
        )?;
        debug!(table = %self.table, removed = n, priority, max_age_days, "aged records cleared");
        Ok(n)
    }

    /// Delete records whose `metadata.importance` is below `min_importance`.
    pub fn clear_low_importance(&self, min_importance: i64) -> Result<usize, KvStoreError> {
        let n = self.conn.execute(
            &format!(
                "DELETE FROM {} WHERE CAST(json_extract(metadata, '$.importance') AS INTEGER) < ?1",
                self.table
            ),
            params![min_importance],
        )?;
        debug!(table = %self.table, removed = n, min_importance, "low-importance records cleared");
        Ok(n)
    }

    fn write_metadata(&self, record: &mut KvRecord) -> Result<(), KvStoreError> {
        record.updated_at = stamp(Utc::now());
        self.conn.execute(
            &format!(
                "UPDATE {} SET metadata = ?1, updated_at = ?2 WHERE key = ?3",
                self.table
            ),
            params![
                serde_json::to_string(&record.metadata)?,
                record.updated_at,
                record.key
            ],
        )?;
        Ok(())
    }

    fn select(&self) -> String {
        format!(
            "SELECT key, value, metadata, created_at, updated_at FROM {}",
            self.table
        )
    }

    fn query(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<KvRecord>, KvStoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(args, RawRow::from_row)?;
        rows.map(|row| row.map_err(KvStoreError::Sqlite).and_then(RawRow::decode))
            .collect()
    }
}

/// Remove `metadata.tags`; a missing or non-array value reads as empty.
fn take_tags(metadata: &mut Map<String, Value>) -> Vec<Value> {
    match metadata.remove("tags") {
        Some(Value::Array(tags)) => tags,
        _ => Vec::new(),
    }
}

/// Row as stored, before JSON decoding.
struct RawRow {
    key: String,
    value: String,
    metadata: String,
    created_at: String,
    updated_at: String,
}

impl RawRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            key: row.get(0)?,
            value: row.get(1)?,
            metadata: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }

    fn decode(self) -> Result<KvRecord, KvStoreError> {
        Ok(KvRecord {
            key: self.key,
            value: serde_json::from_str(&self.value)?,
            metadata: serde_json::from_str(&self.metadata)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_store() -> KvStore {
        KvStore::open_in_memory("declarative").unwrap()
    }

    fn tagged(tags: &[&str], priority: &str) -> Option<Map<String, Value>> {
        let mut m = Map::new();
        m.insert("tags".into(), json!(tags));
        m.insert("priority".into(), json!(priority));
        Some(m)
    }

    #[test]
    fn store_defaults_metadata() {
        let store = make_store();
        let rec = store.store("fact", json!({"a": 1}), None).unwrap();
        assert_eq!(rec.metadata["priority"], json!("normal"));
        assert_eq!(rec.metadata["tags"], json!([]));
        assert!(rec.metadata["timestamp"].is_string());
        assert_eq!(store.retrieve("fact").unwrap().unwrap(), rec);
    }

    #[test]
    fn retrieve_missing_is_none() {
        assert!(make_store().retrieve("ghost").unwrap().is_none());
    }

    #[test]
    fn duplicate_store_is_rejected() {
        let store = make_store();
        store.store("k", json!(1), None).unwrap();
        let err = store.store("k", json!(2), None).unwrap_err();
        assert!(matches!(err, KvStoreError::KeyExists(_)));
        assert_eq!(store.retrieve("k").unwrap().unwrap().value, json!(1));
    }

    #[test]
    fn blank_key_is_rejected() {
        let err = make_store().store(" ", json!(1), None).unwrap_err();
        assert!(matches!(err, KvStoreError::InvalidKey));
        assert!(matches!(
            CortexError::from(err),
            CortexError::InvalidArguments { .. }
        ));
    }

    #[test]
    fn invalid_table_names_are_rejected() {
        for bad in ["", "drop table", "x;--", "9lives"] {
            assert!(matches!(
                KvStore::open_in_memory(bad),
                Err(KvStoreError::InvalidTable(_))
            ));
        }
    }

    #[test]
    fn delete_reports_presence() {
        let store = make_store();
        store.store("k", json!(1), None).unwrap();
        assert!(store.delete("k").unwrap());
        assert!(!store.delete("k").unwrap());
    }

    #[test]
    fn retrieve_by_tag_and_priority() {
        let store = make_store();
        store.store("a", json!(1), tagged(&["ml", "data"], "high")).unwrap();
        store.store("b", json!(2), tagged(&["data"], "low")).unwrap();
        store.store("c", json!(3), tagged(&["ops"], "high")).unwrap();

        let data: Vec<String> = store
            .retrieve_by_tag("data")
            .unwrap()
            .into_iter()
            .map(|r| r.key)
            .collect();
        assert_eq!(data, vec!["a", "b"]);

        let high: Vec<String> = store
            .retrieve_by_priority("high")
            .unwrap()
            .into_iter()
            .map(|r| r.key)
            .collect();
        assert_eq!(high, vec!["a", "c"]);
        assert!(store.retrieve_by_tag("none").unwrap().is_empty());
    }

    #[test]
    fn update_merges_objects_and_stamps() {
        let store = make_store();
        store
            .store("workflow", json!({"steps": 2, "owner": "ops"}), None)
            .unwrap();
        let rec = store.update("workflow", json!({"steps": 3})).unwrap();
        assert_eq!(rec.value, json!({"steps": 3, "owner": "ops"}));
        assert!(rec.metadata.contains_key("last_updated"));
        assert_eq!(store.retrieve("workflow").unwrap().unwrap(), rec);
    }

    #[test]
    fn update_replaces_scalars() {
        let store = make_store();
        store.store("mood", json!("calm"), None).unwrap();
        let rec = store.update("mood", json!("alert")).unwrap();
        assert_eq!(rec.value, json!("alert"));
    }

    #[test]
    fn update_missing_is_not_found() {
        let err = make_store().update("ghost", json!(1)).unwrap_err();
        assert!(matches!(err, KvStoreError::NotFound(_)));
    }

    #[test]
    fn clear_older_than_removes_stale_records() {
        let store = make_store();
        store.store("old", json!(1), None).unwrap();
        assert_eq!(store.clear_older_than(30).unwrap(), 0);

        let later = Utc::now() + TimeDelta::days(31);
        assert_eq!(store.clear_older_than_at(30, later).unwrap(), 1);
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn store_defaults_importance() {
        let store = make_store();
        let rec = store.store("fact", json!(1), None).unwrap();
        assert_eq!(rec.metadata["importance"], json!(DEFAULT_IMPORTANCE));
        let mut meta = Map::new();
        meta.insert("importance".into(), json!(9));
        let rec = store.store("key fact", json!(2), Some(meta)).unwrap();
        assert_eq!(rec.metadata["importance"], json!(9));
    }

    fn with_importance(importance: i64) -> Option<Map<String, Value>> {
        let mut m = Map::new();
        m.insert("importance".into(), json!(importance));
        Some(m)
    }

    /// Sorted keys; records stored in the same microsecond tie on `created_at`.
    fn keys(records: Vec<KvRecord>) -> Vec<String> {
        let mut keys: Vec<String> = records.into_iter().map(|r| r.key).collect();
        keys.sort();
        keys
    }

    #[test]
    fn importance_threshold_selects_and_clears() {
        let store = make_store();
        store.store("trivia", json!(1), with_importance(2)).unwrap();
        store.store("default", json!(2), None).unwrap();
        store.store("core", json!(3), with_importance(9)).unwrap();

        assert_eq!(
            keys(store.retrieve_by_importance(5).unwrap()),
            vec!["core", "default"]
        );
        assert_eq!(keys(store.retrieve_by_importance(8).unwrap()), vec!["core"]);

        assert_eq!(store.clear_low_importance(5).unwrap(), 1);
        assert_eq!(keys(store.list().unwrap()), vec!["core", "default"]);
    }

    #[test]
    fn retrieve_by_category_matches_exactly() {
        let store = make_store();
        let mut science = Map::new();
        science.insert("category".into(), json!("science"));
        store.store("gravity", json!(1), Some(science)).unwrap();
        store.store("uncategorised", json!(2), None).unwrap();
        assert_eq!(
            keys(store.retrieve_by_category("science").unwrap()),
            vec!["gravity"]
        );
        assert!(store.retrieve_by_category("art").unwrap().is_empty());
    }

    #[test]
    fn add_tag_does_not_duplicate() {
        let store = make_store();
        store.store("k", json!(1), tagged(&["a"], "normal")).unwrap();
        let rec = store.add_tag("k", "b").unwrap();
        assert_eq!(rec.metadata["tags"], json!(["a", "b"]));
        let rec = store.add_tag("k", "a").unwrap();
        assert_eq!(rec.metadata["tags"], json!(["a", "b"]));
        assert_eq!(store.retrieve("k").unwrap().unwrap().metadata["tags"], json!(["a", "b"]));
        assert_eq!(keys(store.retrieve_by_tag("b").unwrap()), vec!["k"]);
    }

    #[test]
    fn remove_tag_reports_presence() {
        let store = make_store();
        store.store("k", json!(1), tagged(&["a", "b"], "normal")).unwrap();
        assert!(store.remove_tag("k", "a").unwrap());
        assert!(!store.remove_tag("k", "a").unwrap());
        assert_eq!(store.retrieve("k").unwrap().unwrap().metadata["tags"], json!(["b"]));
    }

    #[test]
    fn tag_edits_on_missing_key_are_not_found() {
        let store = make_store();
        assert!(matches!(store.add_tag("ghost", "a"), Err(KvStoreError::NotFound(_))));
        assert!(matches!(store.remove_tag("ghost", "a"), Err(KvStoreError::NotFound(_))));
    }

    #[test]
    fn retrieve_by_metadata_filters_tag_and_timestamp() {
        let store = make_store();
        let meta = |tag: &str, ts: &str| {
            let mut m = Map::new();
            m.insert("tags".into(), json!([tag]));
            m.insert("timestamp".into(), json!(ts));
            Some(m)
        };
        store.store("deploy-v1", json!(1), meta("deploy", "2024-01-01T00:00:00Z")).unwrap();
        store.store("deploy-v2", json!(2), meta("deploy", "2025-06-01T00:00:00Z")).unwrap();
        store.store("backup", json!(3), meta("ops", "2025-06-01T00:00:00Z")).unwrap();

        assert_eq!(
            keys(store.retrieve_by_metadata(Some("deploy"), None).unwrap()),
            vec!["deploy-v1", "deploy-v2"]
        );
        assert_eq!(
            keys(store.retrieve_by_metadata(None, Some("2025-01-01")).unwrap()),
            vec!["backup", "deploy-v2"]
        );
        assert_eq!(
            keys(store.retrieve_by_metadata(Some("deploy"), Some("2025-01-01")).unwrap()),
            vec!["deploy-v2"]
        );
        assert_eq!(store.retrieve_by_metadata(None, None).unwrap().len(), 3);
    }

    #[test]
    fn clear_by_priority_only_touches_aged_matches() {
        let store = make_store();
        store.store("low-old", json!(1), tagged(&[], "low")).unwrap();
        store.store("high-old", json!(2), tagged(&[], "high")).unwrap();

        assert_eq!(store.clear_by_priority("low", 30).unwrap(), 0);

        let later = Utc::now() + TimeDelta::days(31);
        assert_eq!(store.clear_by_priority_at("low", 30, later).unwrap(), 1);
        assert_eq!(keys(store.list().unwrap()), vec!["high-old"]);
    }

    #[test]
    fn out_of_range_age_is_invalid_arguments() {
        let store = make_store();
        store.store("k", json!(1), None).unwrap();
        let err = store.clear_older_than(200_000_000).unwrap_err();
        assert!(matches!(err, KvStoreError::AgeOutOfRange(200_000_000)));
        assert!(matches!(
            CortexError::from(err),
            CortexError::InvalidArguments { .. }
        ));
        assert!(matches!(
            store.clear_by_priority("normal", u32::MAX),
            Err(KvStoreError::AgeOutOfRange(_))
        ));
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn tables_share_a_file_independently() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("memory.db");
        let facts = KvStore::open(&path, "declarative").unwrap();
        let moods = KvStore::open(&path, "emotional").unwrap();
        facts.store("k", json!("fact"), None).unwrap();
        moods.store("k", json!("mood"), None).unwrap();
        assert_eq!(facts.list().unwrap().len(), 1);
        assert_eq!(moods.retrieve("k").unwrap().unwrap().value, json!("mood"));

        drop(facts);
        let reopened = KvStore::open(&path, "declarative").unwrap();
        assert_eq!(reopened.retrieve("k").unwrap().unwrap().value, json!("fact"));
    }
}
