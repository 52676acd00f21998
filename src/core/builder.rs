//! 依赖构建：按配置创建语言模型、持久化存储与 AgentDeps
//!
//! 有 API Key 时使用 OpenAI 兼容客户端，否则退回 Mock；存储后端由 [store].backend 选择。

use std::sync::Arc;
use std::time::Duration;

use crate::agent::AgentDeps;
use crate::config::{AppConfig, StoreBackend};
use crate::llm::{LanguageModel, MockLanguageModel, OpenAiClient};
use crate::memory::{
    ConversationSummaryManager, DurableStore, InMemoryStore, RedisStore, SqliteStore, StoreError,
};
use crate::tools::{builtin_registry, ToolExecutor};

pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LanguageModel> {
    match cfg.llm.resolved_api_key() {
        Some(api_key) => {
            tracing::info!(model = %cfg.llm.model, base_url = ?cfg.llm.base_url, "Using OpenAI-compatible LLM");
            Arc::new(
                OpenAiClient::new(cfg.llm.base_url.as_deref(), &cfg.llm.model, &api_key)
                    .with_temperature(cfg.llm.temperature)
                    .with_timeout(Duration::from_secs(cfg.llm.request_timeout_secs)),
            )
        }
        None => {
            tracing::warn!("No API key set, using Mock LLM");
            Arc::new(MockLanguageModel::new())
        }
    }
}

pub async fn create_store_from_config(cfg: &AppConfig) -> Result<Arc<dyn DurableStore>, StoreError> {
    let store: Arc<dyn DurableStore> = match cfg.store.backend {
        StoreBackend::Memory => Arc::new(InMemoryStore::new()),
        StoreBackend::Sqlite => Arc::new(SqliteStore::open(&cfg.store.sqlite_path).await?),
        StoreBackend::Redis => Arc::new(RedisStore::new(&cfg.store.resolved_redis_url())?),
    };
    tracing::info!(backend = store.backend_name(), "durable store ready");
    Ok(store)
}

/// 模型 + 存储 + 工具 + 摘要器，一次构建后由所有会话共享
pub async fn create_deps_from_config(cfg: &AppConfig) -> Result<AgentDeps, StoreError> {
    let llm = create_llm_from_config(cfg);
    let store = create_store_from_config(cfg).await?;
    let summarizer = Arc::new(ConversationSummaryManager::with_max_length(
        llm.clone(),
        cfg.memory.max_summary_length,
    ));
    let tools = Arc::new(ToolExecutor::new(builtin_registry(), cfg.tools.tool_timeout_secs));
    Ok(AgentDeps::new(llm, store)
        .with_tools(tools)
        .with_summarizer(summarizer)
        .with_ttl(cfg.memory.ttl_secs)
        .with_log_dir(cfg.agent.log_dir.clone())
        .with_search_provider(cfg.tools.search_provider.clone()))
}
