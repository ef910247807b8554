use anyhow::Context;
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::model::ImageId;

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .try_into()
        .unwrap_or(i64::MAX)
}

fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}

/// Durable key/value state plus the image blobs residents point at.
pub trait Storage {
    fn read_state(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn write_state(&self, key: &str, value: &str) -> anyhow::Result<()>;
    fn put_image(&self, id: &ImageId, bytes: &[u8]) -> anyhow::Result<()>;
    fn get_image(&self, id: &ImageId) -> anyhow::Result<Option<Vec<u8>>>;

    /// Audit trail hook; stores without a log ignore it.
    fn record_event(&self, _kind: &str, _payload: serde_json::Value) -> anyhow::Result<()> {
        Ok(())
    }
}

/// SQLite-backed storage. Every call opens its own connection.
#[derive(Debug, Clone)]
pub struct Engine {
    db_path: PathBuf,
}

impl Engine {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn open(&self) -> anyhow::Result<Connection> {
        let path = self.db_path.clone();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create db dir: {}", dir.display()))?;
        }

        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("open sqlite db: {}", path.display()))?;

        // Durable + fast defaults.
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        migrate(&conn)?;
        Ok(conn)
    }

    /// Latest event sequence number; 0 on a fresh database.
    pub fn get_rev(&self) -> anyhow::Result<i64> {
        let conn = self.open()?;
        let rev: Option<i64> =
            conn.query_row("SELECT MAX(seq) FROM event_log", [], |row| row.get(0))?;
        Ok(rev.unwrap_or(0))
    }
}

impl Storage for Engine {
    fn read_state(&self, key: &str) -> anyhow::Result<Option<String>> {
        let conn = self.open()?;
        conn.query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| {
            row.get(0)
        })
        .optional()
        .with_context(|| format!("read state {key}"))
    }

    fn write_state(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            (key, value, now_rfc3339()),
        )
        .with_context(|| format!("write state {key}"))?;
        Ok(())
    }

    fn put_image(&self, id: &ImageId, bytes: &[u8]) -> anyhow::Result<()> {
        let conn = self.open()?;
        conn.execute(
            "INSERT OR IGNORE INTO images (id, bytes, created_at_ms) VALUES (?1, ?2, ?3)",
            (id.as_str(), bytes, now_ms()),
        )
        .with_context(|| format!("store image {id}"))?;
        Ok(())
    }

    fn get_image(&self, id: &ImageId) -> anyhow::Result<Option<Vec<u8>>> {
        let conn = self.open()?;
        conn.query_row("SELECT bytes FROM images WHERE id = ?1", [id.as_str()], |row| {
            row.get(0)
        })
        .optional()
        .with_context(|| format!("read image {id}"))
    }

    fn record_event(&self, kind: &str, payload: serde_json::Value) -> anyhow::Result<()> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO event_log (ts_ms, kind, payload_json) VALUES (?1, ?2, ?3)",
            (now_ms(), kind, payload.to_string()),
        )?;
        Ok(())
    }
}

fn migrate(conn: &Connection) -> anyhow::Result<()> {
    let v: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if v < 1 {
        conn.execute_batch(
            r#"
-- Monotonic revision source for UI sync.
CREATE TABLE IF NOT EXISTS event_log (
  seq INTEGER PRIMARY KEY AUTOINCREMENT,
  ts_ms INTEGER NOT NULL,
  kind TEXT NOT NULL,
  payload_json TEXT NOT NULL DEFAULT '{}'
);

CREATE INDEX IF NOT EXISTS idx_event_log_kind ON event_log(kind);

CREATE TABLE IF NOT EXISTS kv (
  key TEXT PRIMARY KEY,
  value TEXT NOT NULL,
  updated_at TEXT NOT NULL
);
"#,
        )?;
        conn.pragma_update(None, "user_version", 1_i64)?;
    }

    if v < 2 {
        conn.execute_batch(
            r#"
-- Resident bitmaps, content-addressed.
CREATE TABLE IF NOT EXISTS images (
  id TEXT PRIMARY KEY,
  bytes BLOB NOT NULL,
  created_at_ms INTEGER NOT NULL
);
"#,
        )?;
        conn.pragma_update(None, "user_version", 2_i64)?;
    }

    Ok(())
}

/// In-process storage, mostly for tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<HashMap<String, String>>,
    images: Mutex<HashMap<ImageId, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStore {
    fn read_state(&self, key: &str) -> anyhow::Result<Option<String>> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(state.get(key).cloned())
    }

    fn write_state(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn put_image(&self, id: &ImageId, bytes: &[u8]) -> anyhow::Result<()> {
        let mut images = self.images.lock().unwrap_or_else(PoisonError::into_inner);
        images.entry(id.clone()).or_insert_with(|| bytes.to_vec());
        Ok(())
    }

    fn get_image(&self, id: &ImageId) -> anyhow::Result<Option<Vec<u8>>> {
        let images = self.images.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(images.get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_engine() -> Engine {
        let p = std::env::temp_dir().join(format!(
            "hamlet-engine-test-{}.db",
            time::OffsetDateTime::now_utc().unix_timestamp_nanos()
        ));
        Engine::new(p)
    }

    #[test]
    fn state_round_trips_and_overwrites() {
        let engine = temp_engine();
        assert_eq!(engine.read_state("k").unwrap(), None);
        engine.write_state("k", "one").unwrap();
        engine.write_state("k", "two").unwrap();
        assert_eq!(engine.read_state("k").unwrap().as_deref(), Some("two"));
    }

    #[test]
    fn images_are_write_once() {
        let engine = temp_engine();
        let id = ImageId::of(b"abc");
        engine.put_image(&id, b"abc").unwrap();
        engine.put_image(&id, b"ignored").unwrap();
        assert_eq!(engine.get_image(&id).unwrap().as_deref(), Some(&b"abc"[..]));
        assert_eq!(engine.get_image(&ImageId::from("missing")).unwrap(), None);
    }

    #[test]
    fn rev_tracks_recorded_events() {
        let engine = temp_engine();
        assert_eq!(engine.get_rev().unwrap(), 0);
        engine
            .record_event("state.saved", serde_json::json!({ "objects": 1 }))
            .unwrap();
        engine
            .record_event("state.loaded", serde_json::json!({}))
            .unwrap();
        assert_eq!(engine.get_rev().unwrap(), 2);
    }

    #[test]
    fn reopening_an_existing_db_keeps_data() {
        let engine = temp_engine();
        engine.write_state("k", "v").unwrap();
        let again = Engine::new(engine.db_path());
        assert_eq!(again.read_state("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn memory_store_behaves_like_sqlite() {
        let store = MemoryStore::new();
        store.write_state("k", "v").unwrap();
        assert_eq!(store.read_state("k").unwrap().as_deref(), Some("v"));
        let id = ImageId::of(b"x");
        store.put_image(&id, b"x").unwrap();
        assert_eq!(store.get_image(&id).unwrap(), Some(b"x".to_vec()));
    }
}
