//! 持久化存储抽象
//!
//! DurableStore：带过期时间的键值存储（get / set / delete / close）。
//! 实现：InMemoryStore（进程内，测试与单机运行）、SqliteStore、RedisStore。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// 后端不可用（连接失败 / 已关闭）
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store task failed: {0}")]
    Task(String),
}

/// 键值持久化，ttl_secs 为 0 时不过期
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// 释放连接；之后的调用返回 Unavailable
    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str;
}

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// 进程内存储，过期项在读取时惰性清除；set_offline 可模拟后端不可用
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
    offline: AtomicBool,
    closed: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 置为离线后所有操作返回连接错误
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// 剩余存活时间；键不存在、已过期或永不过期时返回 None
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        let entry = entries.get(key).filter(|e| !e.is_expired(now))?;
        entry.expires_at.map(|at| at.saturating_duration_since(now))
    }

    pub async fn contains_key(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .get(key)
            .is_some_and(|e| !e.is_expired(now))
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store is closed".to_string()));
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "connection refused: in-memory store is offline".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl DurableStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.check_online()?;
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<(), StoreError> {
        self.check_online()?;
        let expires_at = (ttl_secs > 0).then(|| Instant::now() + Duration::from_secs(ttl_secs));
        self.entries
            .write()
            .await
            .insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.check_online()?;
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = InMemoryStore::new();
        assert!(store.get("k").await.unwrap().is_none());
        store.set("k", b"v".to_vec(), 60).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some(&b"v"[..]));
        let ttl = store.ttl("k").await.unwrap();
        assert!(ttl <= Duration::from_secs(60) && ttl > Duration::from_secs(55));
        store.delete("k").await.unwrap();
        assert!(!store.contains_key("k").await);
    }

    #[tokio::test]
    async fn test_zero_ttl_never_expires() {
        let store = InMemoryStore::new();
        store.set("k", b"v".to_vec(), 0).await.unwrap();
        assert!(store.ttl("k").await.is_none());
        assert!(store.contains_key("k").await);
    }

    #[tokio::test]
    async fn test_offline_errors_mention_connection() {
        let store = InMemoryStore::new();
        store.set_offline(true);
        let err = store.get("k").await.unwrap_err();
        assert!(err.to_string().contains("connection"));
        store.set_offline(false);
        assert!(store.get("k").await.is_ok());
    }

    #[tokio::test]
    async fn test_calls_after_close_are_unavailable() {
        let store = InMemoryStore::new();
        store.set("k", b"v".to_vec(), 0).await.unwrap();
        store.close().await.unwrap();
        assert!(matches!(store.get("k").await, Err(StoreError::Unavailable(_))));
        assert!(matches!(
            store.set("k", b"v".to_vec(), 0).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(matches!(store.delete("k").await, Err(StoreError::Unavailable(_))));
    }
}
