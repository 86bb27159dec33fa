use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

mod schema;

const SCHEMA_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Other error: {0}")]
    Other(String),
}

/// Key/value persistence for UI state that must survive a restart.
pub trait StateStore: Send {
    fn load(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn save(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&mut self, key: &str) -> Result<bool, StorageError>;
}

/// SQLite-backed [`StateStore`].
pub struct Storage {
    conn: Connection,
}

impl Storage {
    /// Open (or create) the database at `path`, creating parent directories.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let _ = conn.busy_timeout(Duration::from_millis(2_500));
        let _ = conn.pragma_update(None, "journal_mode", "WAL");
        let _ = conn.pragma_update(None, "synchronous", "NORMAL");
        let storage = Self { conn };
        storage.init()?;
        tracing::debug!("Opened state store at {}", path.display());
        Ok(storage)
    }

    pub fn new_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let storage = Self { conn };
        storage.init()?;
        Ok(storage)
    }

    fn init(&self) -> Result<(), StorageError> {
        schema::create_tables(&self.conn)?;
        schema::apply_schema_migrations(self)
    }

    fn schema_version(&self) -> Result<u32, StorageError> {
        let version: i64 = self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?;
        Ok(version.max(0) as u32)
    }

    fn set_schema_version(&self, version: u32) -> Result<(), StorageError> {
        self.conn
            .pragma_update(None, "user_version", version.to_string())?;
        Ok(())
    }

    /// All stored keys, sorted.
    pub fn keys(&self) -> Result<Vec<String>, StorageError> {
        let mut stmt = self.conn.prepare("SELECT key FROM kv_state ORDER BY key")?;
        let keys = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(keys)
    }

    /// Epoch milliseconds of the last write to `key`.
    pub fn updated_at(&self, key: &str) -> Result<Option<i64>, StorageError> {
        Ok(self
            .conn
            .query_row(
                "SELECT updated_at FROM kv_state WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?)
    }
}

impl StateStore for Storage {
    fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self
            .conn
            .query_row(
                "SELECT value FROM kv_state WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn save(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        let now = chrono::Utc::now().timestamp_millis();
        self.conn.execute(
            "INSERT INTO kv_state (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now],
        )?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<bool, StorageError> {
        let removed = self
            .conn
            .execute("DELETE FROM kv_state WHERE key = ?1", params![key])?;
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests;
