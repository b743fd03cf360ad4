// Credential store adapters
// Key-value persistence used to survive process restarts

use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Async key-value persistence handle
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get_item(&self, key: &str) -> Result<Option<String>>;

    async fn set_item(&self, key: &str, value: &str) -> Result<()>;

    async fn remove_item(&self, key: &str) -> Result<()>;

    async fn has_item(&self, key: &str) -> Result<bool> {
        Ok(self.get_item(key).await?.is_some())
    }

    /// Write a group of keys. Backends that can should make this all-or-nothing.
    async fn set_items(&self, items: &[(&str, String)]) -> Result<()> {
        for (key, value) in items {
            self.set_item(key, value).await?;
        }
        Ok(())
    }
}

/// In-process store, mostly for tests and ephemeral sessions
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    items: Arc<tokio::sync::Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every stored entry
    pub async fn snapshot(&self) -> HashMap<String, String> {
        self.items.lock().await.clone()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.items.lock().await.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.items
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        self.items.lock().await.remove(key);
        Ok(())
    }

    async fn set_items(&self, items: &[(&str, String)]) -> Result<()> {
        let mut guard = self.items.lock().await;
        for (key, value) in items {
            guard.insert(key.to_string(), value.clone());
        }
        Ok(())
    }
}

/// SQLite-backed store using a single `auth_kv` table.
/// Queries run on the blocking pool so they never stall the async executor.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory: {}", parent.display())
            })?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite database: {}", path.display()))?;
        Self::with_connection(conn)
    }

    /// Non-persistent database, useful for tests
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory SQLite")?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS auth_kv (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
            [],
        )
        .context("Failed to create auth_kv table")?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| anyhow::anyhow!("SQLite connection lock poisoned"))?;
            f(&mut conn)
        })
        .await
        .context("SQLite task failed")?
    }
}

#[async_trait]
impl CredentialStore for SqliteStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            conn.query_row("SELECT value FROM auth_kv WHERE key = ?", [&key], |row| {
                row.get(0)
            })
            .optional()
            .with_context(|| format!("Failed to read '{}' from SQLite", key))
        })
        .await
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let (key, value) = (key.to_string(), value.to_string());
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO auth_kv (key, value) VALUES (?, ?)",
                params![key, value],
            )
            .with_context(|| format!("Failed to write '{}' to SQLite", key))?;
            Ok(())
        })
        .await
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM auth_kv WHERE key = ?", [&key])
                .with_context(|| format!("Failed to remove '{}' from SQLite", key))?;
            Ok(())
        })
        .await
    }

    async fn set_items(&self, items: &[(&str, String)]) -> Result<()> {
        let items: Vec<(String, String)> = items
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect();

        self.with_conn(move |conn| {
            let tx = conn.transaction().context("Failed to begin transaction")?;
            for (key, value) in &items {
                tx.execute(
                    "INSERT OR REPLACE INTO auth_kv (key, value) VALUES (?, ?)",
                    params![key, value],
                )
                .with_context(|| format!("Failed to write '{}' to SQLite", key))?;
            }
            tx.commit().context("Failed to commit credential record")
        })
        .await
    }
}
