//! Redis 持久化存储
//!
//! 惰性建立 MultiplexedConnection 并缓存；命令失败时丢弃连接，下次调用重新连接（不在本次调用内重试）。
//! close 之后不再重连，所有调用返回 Unavailable。
//! set 使用 SETEX 刷新过期时间。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use redis::FromRedisValue;
use tokio::sync::Mutex;

use crate::memory::{DurableStore, StoreError};

/// 默认连接地址（未配置且无 REDIS_URL 时使用）
pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379/0";

pub struct RedisStore {
    client: redis::Client,
    url: String,
    connection: Arc<Mutex<Option<redis::aio::MultiplexedConnection>>>,
    closed: AtomicBool,
}

impl RedisStore {
    /// 只校验 URL，不建立连接
    pub fn new(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        Ok(Self {
            client,
            url: url.to_string(),
            connection: Arc::new(Mutex::new(None)),
            closed: AtomicBool::new(false),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn ensure_connection(
        &self,
        connection: &mut Option<redis::aio::MultiplexedConnection>,
    ) -> Result<(), StoreError> {
        if connection.is_some() {
            return Ok(());
        }
        *connection = Some(self.client.get_multiplexed_async_connection().await?);
        tracing::debug!(url = %self.url, "redis store connected");
        Ok(())
    }

    async fn run_command<T, F>(&self, operation: &'static str, build: F) -> Result<T, StoreError>
    where
        T: FromRedisValue + Send,
        F: FnOnce() -> redis::Cmd,
    {
        let mut conn_guard = self.connection.lock().await;
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("redis store is closed".into()));
        }
        self.ensure_connection(&mut conn_guard).await?;
        let conn = conn_guard
            .as_mut()
            .ok_or_else(|| StoreError::Unavailable("redis connection unavailable".into()))?;

        let result: redis::RedisResult<T> = build().query_async(conn).await;
        result.map_err(|err| {
            tracing::warn!(operation, error = %err, "redis command failed; dropping connection");
            *conn_guard = None;
            StoreError::from(err)
        })
    }
}

#[async_trait]
impl DurableStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.run_command("get", || {
            let mut cmd = redis::cmd("GET");
            cmd.arg(key);
            cmd
        })
        .await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<(), StoreError> {
        self.run_command("set", || {
            let mut cmd = if ttl_secs > 0 {
                let mut c = redis::cmd("SETEX");
                c.arg(key).arg(ttl_secs);
                c
            } else {
                let mut c = redis::cmd("SET");
                c.arg(key);
                c
            };
            cmd.arg(value);
            cmd
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let _removed: i64 = self
            .run_command("delete", || {
                let mut cmd = redis::cmd("DEL");
                cmd.arg(key);
                cmd
            })
            .await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        let mut conn_guard = self.connection.lock().await;
        self.closed.store(true, Ordering::SeqCst);
        conn_guard.take();
        tracing::info!(url = %self.url, "redis store closed");
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
