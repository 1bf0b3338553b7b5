//! Key-value backends for the session cache

use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Schema version of the key-value table
const STORE_SCHEMA_VERSION: i32 = 1;

/// Errors raised by a key-value backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage quota exceeded ({limit} entries)")]
    QuotaExceeded { limit: usize },
}

/// Minimal string key-value storage, one namespace per key prefix
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&mut self, key: &str) -> Result<(), StoreError>;
    /// All keys starting with `prefix`
    fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

/// SQLite-backed store persisted under the workspace directory
pub struct SqliteKvStore {
    conn: Connection,
}

impl SqliteKvStore {
    /// Open or create the store at `path`
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Open the store at `path`, recreating it when the file is unreadable
    ///
    /// The cache only holds disposable session data, so a corrupt file is
    /// deleted. If the file cannot be recreated either, the session runs on
    /// an in-memory store and nothing outlives the process.
    pub fn open_or_recover(path: &Path) -> Box<dyn KeyValueStore> {
        match Self::open(path) {
            Ok(store) => return Box::new(store),
            Err(e) => {
                tracing::warn!(path = %path.display(), "session cache unreadable, recreating: {e}");
            }
        }

        for suffix in ["", "-wal", "-shm"] {
            let mut file = path.as_os_str().to_owned();
            file.push(suffix);
            if let Err(e) = fs::remove_file(&file) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::debug!("could not remove {}: {e}", Path::new(&file).display());
                }
            }
        }

        match Self::open(path) {
            Ok(store) => Box::new(store),
            Err(e) => {
                tracing::warn!("session cache unavailable, keeping it in memory: {e}");
                Box::new(MemoryKvStore::new())
            }
        }
    }

    /// In-memory store (tests, dry runs)
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let version: i32 = self
            .conn
            .query_row("SELECT version FROM kv_schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .unwrap_or(0);

        if version != STORE_SCHEMA_VERSION {
            // No migrations: the cache only holds disposable session data
            self.conn.execute_batch(
                r#"
                DROP TABLE IF EXISTS kv_schema_version;
                DROP TABLE IF EXISTS kv;
                "#,
            )?;
        }

        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv_schema_version (
                version INTEGER PRIMARY KEY
            );
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;
        self.conn.execute(
            "INSERT OR REPLACE INTO kv_schema_version (version) VALUES (?1)",
            params![STORE_SCHEMA_VERSION],
        )?;
        Ok(())
    }
}

impl KeyValueStore for SqliteKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT key FROM kv WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key")?;
        let rows = stmt.query_map(params![prefix], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

/// In-memory store with an optional entry limit
#[derive(Debug, Default, Clone)]
pub struct MemoryKvStore {
    entries: BTreeMap<String, String>,
    limit: Option<usize>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject writes that would grow the store beyond `limit` entries
    pub fn with_limit(limit: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            limit: Some(limit),
        }
    }
}

impl KeyValueStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        if let Some(limit) = self.limit {
            if !self.entries.contains_key(key) && self.entries.len() >= limit {
                return Err(StoreError::QuotaExceeded { limit });
            }
        }
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}
