use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::Mutex;

use super::Store;
use crate::logging::ts_epoch_ms;

/// Append-only write log in SQLite; the latest row per path is its value.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let store = Self { conn: Mutex::new(Connection::open(path)?) };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(|_| anyhow!("sqlite lock poisoned"))?;
        conn.execute_batch(
            "BEGIN;
            CREATE TABLE IF NOT EXISTS writes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ts INTEGER NOT NULL,
                path TEXT NOT NULL,
                value TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS writes_path ON writes (path);
            COMMIT;",
        )?;
        Ok(())
    }

    pub fn latest(&self, path: &str) -> Result<Option<Value>> {
        let conn = self.conn.lock().map_err(|_| anyhow!("sqlite lock poisoned"))?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT value FROM writes WHERE path = ?1 ORDER BY id DESC LIMIT 1",
                params![path],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|s| serde_json::from_str::<Value>(&s).map_err(anyhow::Error::from))
            .transpose()
    }

    pub fn count(&self) -> Result<u64> {
        let conn = self.conn.lock().map_err(|_| anyhow!("sqlite lock poisoned"))?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM writes", [], |row| row.get(0))?;
        Ok(n as u64)
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn write(&self, path: &str, value: &Value) -> Result<()> {
        let conn = self.conn.lock().map_err(|_| anyhow!("sqlite lock poisoned"))?;
        conn.execute(
            "INSERT INTO writes (ts, path, value) VALUES (?1, ?2, ?3)",
            params![ts_epoch_ms() as i64, path, value.to_string()],
        )?;
        Ok(())
    }
}
