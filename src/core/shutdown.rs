//! 优雅关闭
//!
//! ShutdownManager 监听 Ctrl+C / SIGTERM 并取消共享的 CancellationToken（正在运行的 ReAct 执行随之中止）；
//! ShutdownCoordinator 在退出前按注册顺序执行清理任务（关闭持久化存储连接等），每个任务有超时。

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::memory::DurableStore;

/// 默认单个清理任务超时
const DEFAULT_CLEANUP_TIMEOUT_SECS: u64 = 5;

#[derive(Clone)]
pub struct ShutdownManager {
    token: CancellationToken,
    reason_tx: broadcast::Sender<ShutdownReason>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Ctrl+C
    UserInitiated,
    /// SIGTERM
    Signal,
    FatalError(String),
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (reason_tx, _) = broadcast::channel(1);
        Self {
            token: CancellationToken::new(),
            reason_tx,
        }
    }

    /// 传给执行器的取消令牌
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn shutdown(&self, reason: ShutdownReason) {
        tracing::info!(reason = ?reason, "shutdown requested");
        let _ = self.reason_tx.send(reason);
        self.token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownReason> {
        self.reason_tx.subscribe()
    }

    pub async fn wait_for_shutdown(&self) {
        self.token.cancelled().await;
    }

    /// 安装 Ctrl+C 与（unix 下）SIGTERM 处理
    pub fn install_signal_handlers(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                manager.shutdown(ShutdownReason::UserInitiated);
            }
        });

        #[cfg(unix)]
        {
            let manager = Arc::clone(self);
            tokio::spawn(async move {
                use tokio::signal::unix::{signal, SignalKind};
                if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                    sigterm.recv().await;
                    manager.shutdown(ShutdownReason::Signal);
                }
            });
        }
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

/// 退出前执行的清理任务
#[async_trait::async_trait]
pub trait ShutdownCleanup: Send + Sync {
    async fn cleanup(&self) -> anyhow::Result<()>;

    fn name(&self) -> &'static str;
}

pub struct ShutdownCoordinator {
    manager: Arc<ShutdownManager>,
    cleanup_tasks: Vec<Arc<dyn ShutdownCleanup>>,
    timeout_secs: u64,
}

impl ShutdownCoordinator {
    pub fn new(manager: Arc<ShutdownManager>) -> Self {
        Self {
            manager,
            cleanup_tasks: Vec::new(),
            timeout_secs: DEFAULT_CLEANUP_TIMEOUT_SECS,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn register<T: ShutdownCleanup + 'static>(&mut self, task: T) {
        self.cleanup_tasks.push(Arc::new(task));
    }

    pub fn task_count(&self) -> usize {
        self.cleanup_tasks.len()
    }

    /// 依次执行清理；失败或超时只记日志
    pub async fn run_cleanup(&self) {
        let timeout = tokio::time::Duration::from_secs(self.timeout_secs);
        for task in &self.cleanup_tasks {
            let name = task.name();
            match tokio::time::timeout(timeout, task.cleanup()).await {
                Ok(Ok(())) => tracing::info!(task = name, "cleanup finished"),
                Ok(Err(e)) => tracing::warn!(task = name, error = %e, "cleanup failed"),
                Err(_) => tracing::warn!(task = name, timeout_secs = self.timeout_secs, "cleanup timed out"),
            }
        }
    }

    pub fn manager(&self) -> &Arc<ShutdownManager> {
        &self.manager
    }
}

/// 关闭持久化存储（释放 Redis / SQLite 连接）
pub struct StoreCleanup {
    store: Arc<dyn DurableStore>,
}

impl StoreCleanup {
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl ShutdownCleanup for StoreCleanup {
    async fn cleanup(&self) -> anyhow::Result<()> {
        tracing::debug!(backend = self.store.backend_name(), "closing store");
        self.store.close().await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "DurableStore"
    }
}

/// 运行 app 直到完成或收到关闭信号，然后执行清理
pub async fn run_with_graceful_shutdown<F>(coordinator: &ShutdownCoordinator, app: F)
where
    F: Future<Output = ()>,
{
    let manager = coordinator.manager();
    manager.install_signal_handlers();

    tokio::select! {
        _ = app => tracing::debug!("application finished"),
        _ = manager.wait_for_shutdown() => tracing::info!("shutdown signal received"),
    }

    coordinator.run_cleanup().await;
}
