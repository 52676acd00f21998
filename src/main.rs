//! Tao - 研究型 ReAct 智能体
//!
//! 用法：tao-agent "<query>" [session_id]
//! 入口：初始化日志、加载配置、构建共享依赖，以 SSE 帧格式打印一次流式查询，退出前关闭存储。

use std::sync::Arc;

use anyhow::Context;
use futures_util::StreamExt;
use tao_agent::config::load_config;
use tao_agent::core::{
    create_deps_from_config, run_with_graceful_shutdown, AgentFactory, SessionRegistry,
    ShutdownCoordinator, ShutdownManager, StoreCleanup,
};
use tao_agent::stream_query;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tao_agent::observability::init();

    let mut args = std::env::args().skip(1);
    let query = args
        .next()
        .filter(|q| !q.trim().is_empty())
        .context("usage: tao-agent \"<query>\" [session_id]")?;
    let session_id = args.next();

    let cfg = load_config(None).context("Failed to load config")?;
    let deps = create_deps_from_config(&cfg)
        .await
        .context("Failed to create durable store")?;

    let shutdown = Arc::new(ShutdownManager::new());
    let mut coordinator = ShutdownCoordinator::new(shutdown.clone());
    coordinator.register(StoreCleanup::new(deps.store.clone()));

    let registry = SessionRegistry::new(AgentFactory::new(deps, cfg.agent.clone()));
    let (session_id, agent) = registry
        .get_or_create(session_id.as_deref())
        .await
        .context("Failed to create agent")?;
    tracing::info!(session_id = %session_id, "query accepted");

    let app = async {
        let mut events = Box::pin(stream_query(agent, query, shutdown.token()));
        while let Some(event) = events.next().await {
            print!("{}", event.to_sse());
        }
    };
    run_with_graceful_shutdown(&coordinator, app).await;

    Ok(())
}
