//! Durable key-value storage for PageChat client state.
//!
//! [`KvStore`] is the seam the session ledger writes through. Two
//! implementations are provided:
//! - [`Storage`]: libSQL file database (`~/.pagechat/pagechat.db` by default)
//! - [`MemoryStore`]: process-local map, for tests and `--ephemeral` runs

mod migrations;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use libsql::{Connection, Database, params};
use pagechat_shared::{PageChatError, Result};

/// Asynchronous string key-value store.
#[async_trait::async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

fn storage_err(e: impl std::fmt::Display) -> PageChatError {
    PageChatError::Storage(e.to_string())
}

// ---------------------------------------------------------------------------
// libSQL store
// ---------------------------------------------------------------------------

/// Storage handle wrapping a local libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PageChatError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        tracing::debug!(path = %path.display(), "storage opened");
        Ok(storage)
    }

    /// Open an existing database without running migrations or allowing writes.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    PageChatError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 if no migrations have been applied.
    async fn schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => match rows.next().await {
                Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
                _ => 0,
            },
            Err(_) => 0,
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(PageChatError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    /// All keys currently stored, sorted.
    pub async fn keys(&self) -> Result<Vec<String>> {
        let mut rows = self
            .conn
            .query("SELECT key FROM kv ORDER BY key", params![])
            .await
            .map_err(storage_err)?;

        let mut keys = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            keys.push(row.get::<String>(0).map_err(storage_err)?);
        }
        Ok(keys)
    }
}

#[async_trait::async_trait]
impl KvStore for Storage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query("SELECT value FROM kv WHERE key = ?1", params![key])
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row.get::<String>(0).map_err(storage_err)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, now.as_str()],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute("DELETE FROM kv WHERE key = ?1", params![key])
            .await
            .map_err(storage_err)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// [`KvStore`] held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate the store.
    pub fn with_entry(self, key: &str, value: &str) -> Self {
        self.lock().insert(key.to_string(), value.to_string());
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait::async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_db() -> std::path::PathBuf {
        std::env::temp_dir().join(format!("pagechat_test_{}.db", uuid::Uuid::now_v7()))
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = Storage::open(&temp_db()).await.expect("open test db");
        assert_eq!(storage.schema_version().await, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let path = temp_db();
        let first = Storage::open(&path).await.expect("first open");
        drop(first);
        let second = Storage::open(&path).await.expect("second open");
        assert_eq!(second.schema_version().await, 1);
    }

    #[tokio::test]
    async fn set_get_overwrite_remove() {
        let storage = Storage::open(&temp_db()).await.unwrap();

        assert_eq!(storage.get("missing").await.unwrap(), None);

        storage.set("pagechat.sessionHistory", "[]").await.unwrap();
        storage
            .set("pagechat.sessionHistory", r#"[{"role":"user","content":"hi"}]"#)
            .await
            .unwrap();
        assert_eq!(
            storage.get("pagechat.sessionHistory").await.unwrap().as_deref(),
            Some(r#"[{"role":"user","content":"hi"}]"#)
        );
        assert_eq!(storage.keys().await.unwrap(), vec!["pagechat.sessionHistory"]);

        storage.remove("pagechat.sessionHistory").await.unwrap();
        assert_eq!(storage.get("pagechat.sessionHistory").await.unwrap(), None);
    }

    #[tokio::test]
    async fn values_survive_reopen() {
        let path = temp_db();
        {
            let storage = Storage::open(&path).await.unwrap();
            storage.set("k", "v").await.unwrap();
        }
        let storage = Storage::open(&path).await.unwrap();
        assert_eq!(storage.get("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let path = temp_db();
        Storage::open(&path).await.unwrap().set("k", "v").await.unwrap();

        let readonly = Storage::open_readonly(&path).await.unwrap();
        assert_eq!(readonly.get("k").await.unwrap().as_deref(), Some("v"));
        assert!(matches!(
            readonly.set("k", "w").await,
            Err(PageChatError::Storage(_))
        ));
    }

    #[tokio::test]
    async fn memory_store_behaves_like_a_map() {
        let store = MemoryStore::new().with_entry("a", "1");
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("1"));
        store.set("a", "2").await.unwrap();
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("2"));
        store.remove("a").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);
    }
}
