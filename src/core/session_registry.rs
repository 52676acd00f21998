//! 会话注册表
//!
//! 每个 session_id 对应一个 Arc<Mutex<ResearchAgent>>：同一会话的查询经该互斥锁串行执行，
//! 不同会话互不影响。缺省或空白的 session_id 分配新的 UUID。

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::agent::{AgentConfig, AgentDeps, ResearchAgent};
use crate::config::AgentSection;
use crate::core::AgentError;

/// 按 [agent] 默认值与共享依赖创建 Agent
#[derive(Clone)]
pub struct AgentFactory {
    deps: AgentDeps,
    defaults: AgentSection,
}

impl AgentFactory {
    pub fn new(deps: AgentDeps, defaults: AgentSection) -> Self {
        Self { deps, defaults }
    }

    pub fn deps(&self) -> &AgentDeps {
        &self.deps
    }

    pub async fn create(&self, session_id: &str) -> Result<ResearchAgent, AgentError> {
        let config = AgentConfig::from_section(session_id, &self.defaults)?;
        Ok(ResearchAgent::new(config, &self.deps).await)
    }
}

/// 空或缺省时生成新 id
pub fn resolve_session_id(session_id: Option<&str>) -> String {
    match session_id.map(str::trim) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => uuid::Uuid::new_v4().to_string(),
    }
}

pub struct SessionRegistry {
    factory: AgentFactory,
    agents: RwLock<HashMap<String, Arc<Mutex<ResearchAgent>>>>,
}

impl SessionRegistry {
    pub fn new(factory: AgentFactory) -> Self {
        Self {
            factory,
            agents: RwLock::new(HashMap::new()),
        }
    }

    /// 返回 (session_id, agent)；不存在则创建
    pub async fn get_or_create(
        &self,
        session_id: Option<&str>,
    ) -> Result<(String, Arc<Mutex<ResearchAgent>>), AgentError> {
        let id = resolve_session_id(session_id);
        if let Some(agent) = self.agents.read().await.get(&id) {
            return Ok((id, agent.clone()));
        }

        // 创建（含历史加载）期间不持有表锁；同一会话并发创建时先插入者胜出
        let created = Arc::new(Mutex::new(self.factory.create(&id).await?));
        let mut agents = self.agents.write().await;
        let agent = agents.entry(id.clone()).or_insert(created).clone();
        tracing::debug!(session_id = %id, sessions = agents.len(), "session registered");
        Ok((id, agent))
    }

    pub async fn get(&self, session_id: &str) -> Option<Arc<Mutex<ResearchAgent>>> {
        self.agents.read().await.get(session_id.trim()).cloned()
    }

    pub async fn remove(&self, session_id: &str) -> Option<Arc<Mutex<ResearchAgent>>> {
        self.agents.write().await.remove(session_id.trim())
    }

    pub async fn len(&self) -> usize {
        self.agents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.agents.read().await.is_empty()
    }

    pub async fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.agents.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLanguageModel;
    use crate::memory::{DurableStore, InMemoryStore, StoreError};
    use async_trait::async_trait;
    use std::time::{Duration, Instant};

    /// 对 `*slow` 键的读取延迟返回
    struct SlowStore {
        inner: InMemoryStore,
    }

    #[async_trait]
    impl DurableStore for SlowStore {
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
            if key.ends_with("slow") {
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<(), StoreError> {
            self.inner.set(key, value, ttl_secs).await
        }

        async fn delete(&self, key: &str) -> Result<(), StoreError> {
            self.inner.delete(key).await
        }

        fn backend_name(&self) -> &'static str {
            "slow"
        }
    }

    fn registry() -> SessionRegistry {
        let deps = AgentDeps::new(Arc::new(MockLanguageModel::new()), Arc::new(InMemoryStore::new()));
        SessionRegistry::new(AgentFactory::new(deps, AgentSection::default()))
    }

    #[tokio::test]
    async fn test_same_session_same_agent() {
        let reg = registry();
        let (id, a) = reg.get_or_create(Some(" s1 ")).await.unwrap();
        let (_, b) = reg.get_or_create(Some("s1")).await.unwrap();
        assert_eq!(id, "s1");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(reg.len().await, 1);
    }

    #[tokio::test]
    async fn test_empty_session_gets_uuid() {
        let reg = registry();
        let (a, _) = reg.get_or_create(None).await.unwrap();
        let (b, _) = reg.get_or_create(Some("  ")).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
        assert_eq!(reg.session_ids().await.len(), 2);
    }

    #[tokio::test]
    async fn test_remove() {
        let reg = registry();
        reg.get_or_create(Some("gone")).await.unwrap();
        assert!(reg.remove("gone").await.is_some());
        assert!(reg.get("gone").await.is_none());
        assert!(reg.is_empty().await);
    }

    #[tokio::test]
    async fn test_slow_creation_does_not_block_other_sessions() {
        let store = Arc::new(SlowStore {
            inner: InMemoryStore::new(),
        });
        let deps = AgentDeps::new(Arc::new(MockLanguageModel::new()), store);
        let reg = Arc::new(SessionRegistry::new(AgentFactory::new(
            deps,
            AgentSection::default(),
        )));
        reg.get_or_create(Some("fast")).await.unwrap();

        let slow = tokio::spawn({
            let reg = reg.clone();
            async move { reg.get_or_create(Some("slow")).await.map(|(id, _)| id) }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let started = Instant::now();
        reg.get_or_create(Some("fast")).await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(100));

        assert_eq!(slow.await.unwrap().unwrap(), "slow");
        assert_eq!(reg.len().await, 2);
    }

    #[tokio::test]
    async fn test_concurrent_creation_yields_one_agent() {
        let reg = Arc::new(registry());
        let (a, b) = tokio::join!(reg.get_or_create(Some("race")), reg.get_or_create(Some("race")));
        assert!(Arc::ptr_eq(&a.unwrap().1, &b.unwrap().1));
        assert_eq!(reg.len().await, 1);
    }
}
