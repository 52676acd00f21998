//! SQLite 持久化存储
//!
//! 单表 kv_store(key, value, expires_at, updated_at)；rusqlite 为同步 API，所有操作经 spawn_blocking 执行。
//! 过期项在读取时删除。

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use crate::memory::{DurableStore, StoreError};

pub struct SqliteStore {
    conn: Arc<Mutex<Option<Connection>>>,
    path: PathBuf,
}

impl SqliteStore {
    /// 打开（不存在则创建）数据库文件并建表
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let open_path = path.clone();
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection, StoreError> {
            if let Some(parent) = open_path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| StoreError::Unavailable(e.to_string()))?;
                }
            }
            let conn = Connection::open(&open_path)?;
            conn.execute(
                "CREATE TABLE IF NOT EXISTS kv_store (
                    key TEXT PRIMARY KEY,
                    value BLOB NOT NULL,
                    expires_at INTEGER,
                    updated_at TEXT NOT NULL
                )",
                [],
            )?;
            Ok(conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))??;

        tracing::info!(path = %path.display(), "sqlite store opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| StoreError::Unavailable("sqlite connection lock poisoned".into()))?;
            let conn = guard
                .as_ref()
                .ok_or_else(|| StoreError::Unavailable("sqlite store is closed".into()))?;
            f(conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

#[async_trait]
impl DurableStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let row: Option<(Vec<u8>, Option<i64>)> = conn
                .query_row(
                    "SELECT value, expires_at FROM kv_store WHERE key = ?1",
                    params![key],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            match row {
                Some((_, Some(expires_at))) if expires_at <= chrono::Utc::now().timestamp() => {
                    conn.execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
                    Ok(None)
                }
                Some((value, _)) => Ok(Some(value)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<(), StoreError> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let now = chrono::Utc::now();
            let expires_at = (ttl_secs > 0).then(|| now.timestamp() + ttl_secs as i64);
            conn.execute(
                "INSERT INTO kv_store (key, value, expires_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    expires_at = excluded.expires_at,
                    updated_at = excluded.updated_at",
                params![key, value, expires_at, now.to_rfc3339()],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
            Ok(())
        })
        .await
    }

    async fn close(&self) -> Result<(), StoreError> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            if let Ok(mut guard) = conn.lock() {
                guard.take();
            }
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?;
        tracing::info!(path = %self.path.display(), "sqlite store closed");
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}
