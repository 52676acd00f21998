//! 会话历史存储
//!
//! 按会话保存有序消息序列并持久化到 DurableStore（键 chat_history:{session_id}，每次写入刷新 TTL）。
//! 超过 MAX_MESSAGES 时把最旧的 SUMMARY_BATCH_SIZE 条压缩成一条 "Summary: ..." 系统消息放在最前。
//! 加载失败视为缓存未命中；写入/删除失败只记录日志。

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::llm::LlmError;
use crate::memory::{ConversationMessage, DurableStore, SummaryProducer};

/// add_message 完成后消息条数上限
pub const MAX_MESSAGES: usize = 20;
/// 每次压缩摘要的最旧消息条数
pub const SUMMARY_BATCH_SIZE: usize = 10;
/// 默认过期时间（24 小时）
pub const DEFAULT_TTL_SECS: u64 = 86_400;

const KEY_PREFIX: &str = "chat_history";

#[derive(Error, Debug)]
pub enum MemoryError {
    /// 压缩时摘要失败；本次追加已撤销
    #[error("Summarization failed: {0}")]
    Summarization(#[from] LlmError),
}

impl MemoryError {
    pub fn llm_error(&self) -> &LlmError {
        match self {
            MemoryError::Summarization(e) => e,
        }
    }
}

#[derive(Serialize)]
struct PersistedHistoryRef<'a> {
    messages: &'a [ConversationMessage],
    timestamp: String,
}

#[derive(Deserialize)]
struct PersistedHistory {
    #[serde(default)]
    messages: Vec<Value>,
}

pub struct ConversationStore {
    session_id: String,
    messages: Vec<ConversationMessage>,
    ttl_secs: u64,
    store: Arc<dyn DurableStore>,
    summarizer: Arc<dyn SummaryProducer>,
}

impl ConversationStore {
    /// 创建并加载已持久化的历史
    pub async fn open(
        session_id: impl Into<String>,
        store: Arc<dyn DurableStore>,
        summarizer: Arc<dyn SummaryProducer>,
        ttl_secs: u64,
    ) -> Self {
        let mut conversation = Self {
            session_id: session_id.into(),
            messages: Vec::new(),
            ttl_secs,
            store,
            summarizer,
        };
        conversation.load().await;
        conversation
    }

    pub fn key_for(session_id: &str) -> String {
        format!("{KEY_PREFIX}:{session_id}")
    }

    pub fn key(&self) -> String {
        Self::key_for(&self.session_id)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn ttl(&self) -> u64 {
        self.ttl_secs
    }

    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// 追加一条消息，必要时压缩一次，然后持久化。
    /// 摘要失败时撤销追加、不写存储并返回错误。
    pub async fn add_message(&mut self, message: ConversationMessage) -> Result<(), MemoryError> {
        self.add_messages([message]).await
    }

    /// 原子地追加一组消息（如一问一答），整体做压缩检查后只持久化一次。
    /// 摘要失败时整组撤销，内存与存储都保持追加前的状态。
    pub async fn add_messages(
        &mut self,
        batch: impl IntoIterator<Item = ConversationMessage>,
    ) -> Result<(), MemoryError> {
        let snapshot_len = self.messages.len();
        self.messages.extend(batch);

        if self.messages.len() > MAX_MESSAGES {
            let snapshot = self.messages[..snapshot_len].to_vec();
            while self.messages.len() > MAX_MESSAGES {
                if let Err(e) = self.compact().await {
                    self.messages = snapshot;
                    tracing::warn!(
                        session_id = %self.session_id,
                        error = %e,
                        "summarization failed; messages not appended"
                    );
                    return Err(MemoryError::Summarization(e));
                }
            }
        }

        self.persist().await;
        Ok(())
    }

    /// 清空内存与持久化数据
    pub async fn clear(&mut self) {
        self.messages.clear();
        if let Err(e) = self.store.delete(&self.key()).await {
            tracing::error!(session_id = %self.session_id, error = %e, "failed to delete history");
        }
    }

    /// 持久化格式：{"messages": [...], "timestamp": RFC3339}
    pub fn serialize(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&PersistedHistoryRef {
            messages: &self.messages,
            timestamp: chrono::Utc::now().to_rfc3339(),
        })
    }

    async fn compact(&mut self) -> Result<(), LlmError> {
        let summary = self
            .summarizer
            .summarize(&self.messages[..SUMMARY_BATCH_SIZE])
            .await?;
        self.messages.drain(..SUMMARY_BATCH_SIZE);
        self.messages
            .insert(0, ConversationMessage::system(format!("Summary: {summary}")));
        tracing::info!(
            session_id = %self.session_id,
            remaining = self.messages.len(),
            "conversation compacted"
        );
        Ok(())
    }

    async fn persist(&self) {
        let payload = match self.serialize() {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(session_id = %self.session_id, error = %e, "failed to serialize history");
                return;
            }
        };
        match self.store.set(&self.key(), payload, self.ttl_secs).await {
            Ok(()) => tracing::debug!(
                session_id = %self.session_id,
                messages = self.messages.len(),
                "history saved"
            ),
            Err(e) => {
                tracing::error!(session_id = %self.session_id, error = %e, "failed to save history")
            }
        }
    }

    async fn load(&mut self) {
        let raw = match self.store.get(&self.key()).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return,
            Err(e) => {
                tracing::error!(session_id = %self.session_id, error = %e, "failed to load history");
                return;
            }
        };

        let parsed: PersistedHistory = match serde_json::from_slice(&raw) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(session_id = %self.session_id, error = %e, "failed to parse saved history");
                return;
            }
        };

        // 未知类型的消息跳过
        self.messages = parsed
            .messages
            .into_iter()
            .filter_map(|v| match serde_json::from_value::<ConversationMessage>(v) {
                Ok(m) => Some(m),
                Err(e) => {
                    tracing::debug!(session_id = %self.session_id, error = %e, "skipping stored message");
                    None
                }
            })
            .collect();
        tracing::info!(
            session_id = %self.session_id,
            messages = self.messages.len(),
            "history loaded"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLanguageModel;
    use crate::memory::{ConversationSummaryManager, InMemoryStore, MessageType};

    struct Fixture {
        store: Arc<InMemoryStore>,
        llm: Arc<MockLanguageModel>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                store: Arc::new(InMemoryStore::new()),
                llm: Arc::new(MockLanguageModel::new()),
            }
        }

        async fn open(&self, session_id: &str, ttl: u64) -> ConversationStore {
            ConversationStore::open(
                session_id,
                self.store.clone(),
                Arc::new(ConversationSummaryManager::new(self.llm.clone())),
                ttl,
            )
            .await
        }
    }

    #[tokio::test]
    async fn test_append_persists_with_ttl() {
        let fx = Fixture::new();
        let mut conv = fx.open("s1", 3600).await;
        assert!(conv.is_empty());
        conv.add_message(ConversationMessage::human("hello")).await.unwrap();

        assert_eq!(conv.key(), "chat_history:s1");
        let raw = fx.store.get("chat_history:s1").await.unwrap().unwrap();
        let v: Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(v["messages"][0]["type"], "HumanMessage");
        assert_eq!(v["messages"][0]["content"], "hello");
        assert!(v["timestamp"].is_string());
        assert!(fx.store.ttl("chat_history:s1").await.unwrap().as_secs() > 3500);
    }

    #[tokio::test]
    async fn test_overflow_compacts_oldest_batch() {
        let fx = Fixture::new();
        fx.llm.push_reply("the gist");
        let mut conv = fx.open("s1", 3600).await;
        for i in 0..MAX_MESSAGES {
            conv.add_message(ConversationMessage::human(format!("m{i}")))
                .await
                .unwrap();
        }
        assert_eq!(conv.len(), MAX_MESSAGES);
        assert_eq!(fx.llm.call_count(), 0);

        conv.add_message(ConversationMessage::ai("m20")).await.unwrap();
        assert_eq!(conv.len(), 12);
        assert_eq!(fx.llm.call_count(), 1);
        let first = &conv.messages()[0];
        assert_eq!(first.kind, MessageType::System);
        assert_eq!(first.content, "Summary: the gist");
        assert_eq!(conv.messages()[1].content, "m10");
        assert_eq!(conv.messages().last().unwrap().content, "m20");

        // 只有最旧的 10 条进入摘要
        let prompt = &fx.llm.prompts()[0];
        assert!(prompt.contains("HumanMessage: m9"));
        assert!(!prompt.contains("m10"));
    }

    #[tokio::test]
    async fn test_append_at_limit_yields_twelve() {
        // 已有 20 条（含一条摘要）时再追加，压缩后为 12 条
        let fx = Fixture::new();
        let mut conv = fx.open("s1", 3600).await;
        conv.messages.push(ConversationMessage::system("Summary: old"));
        for i in 0..MAX_MESSAGES - 1 {
            conv.messages.push(ConversationMessage::human(format!("m{i}")));
        }
        fx.llm.push_reply("newer");
        conv.add_message(ConversationMessage::human("x")).await.unwrap();
        assert_eq!(conv.len(), MAX_MESSAGES - SUMMARY_BATCH_SIZE + 2);
        assert!(conv.messages()[0].content.starts_with("Summary: "));
    }

    #[tokio::test]
    async fn test_twenty_one_single_appends_scenario() {
        let fx = Fixture::new();
        let mut conv = fx.open("scenario", 3600).await;
        for i in 0..21 {
            conv.add_message(ConversationMessage::human(format!("q{i}")))
                .await
                .unwrap();
            assert!(conv.len() <= MAX_MESSAGES);
        }
        assert_eq!(conv.len(), 12);
        assert!(conv.messages()[0].content.starts_with("Summary: "));
        assert_eq!(conv.messages()[0].kind, MessageType::System);
    }

    #[tokio::test]
    async fn test_roundtrip_through_store() {
        let fx = Fixture::new();
        let mut conv = fx.open("rt", 3600).await;
        for i in 0..23 {
            let msg = if i % 2 == 0 {
                ConversationMessage::human(format!("q{i}"))
            } else {
                ConversationMessage::ai(format!("a{i}")).with_metadata("step", i)
            };
            conv.add_message(msg).await.unwrap();
        }

        let reloaded = fx.open("rt", 3600).await;
        let pairs = |c: &ConversationStore| {
            c.messages()
                .iter()
                .map(|m| (m.kind, m.content.clone()))
                .collect::<Vec<_>>()
        };
        assert_eq!(pairs(&reloaded), pairs(&conv));
        assert_eq!(reloaded.messages(), conv.messages());
    }

    #[tokio::test]
    async fn test_summarizer_failure_is_transactional() {
        let fx = Fixture::new();
        let mut conv = fx.open("s1", 3600).await;
        for i in 0..MAX_MESSAGES {
            conv.add_message(ConversationMessage::human(format!("m{i}")))
                .await
                .unwrap();
        }
        let before = conv.messages().to_vec();
        let persisted = fx.store.get("chat_history:s1").await.unwrap();

        fx.llm.push_failure("Rate limit exceeded");
        let err = conv
            .add_message(ConversationMessage::human("overflow"))
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::Summarization(_)));
        assert_eq!(err.llm_error().to_string(), "Rate limit exceeded");
        assert_eq!(conv.messages(), &before[..]);
        assert_eq!(fx.store.get("chat_history:s1").await.unwrap(), persisted);
    }

    #[tokio::test]
    async fn test_turn_crossing_limit_compacts_once() {
        let fx = Fixture::new();
        fx.llm.push_reply("earlier");
        let mut conv = fx.open("turn", 3600).await;
        conv.add_messages((0..MAX_MESSAGES - 1).map(|i| ConversationMessage::human(format!("m{i}"))))
            .await
            .unwrap();
        assert_eq!(fx.llm.call_count(), 0);

        conv.add_messages([ConversationMessage::human("q"), ConversationMessage::ai("a")])
            .await
            .unwrap();
        assert_eq!(conv.len(), 12);
        assert_eq!(fx.llm.call_count(), 1);
        assert_eq!(conv.messages()[0].content, "Summary: earlier");
        assert_eq!(conv.messages()[10].content, "q");
        assert_eq!(conv.messages()[11].content, "a");
    }

    #[tokio::test]
    async fn test_failed_turn_rolls_back_both_messages() {
        let fx = Fixture::new();
        let mut conv = fx.open("turn", 3600).await;
        conv.add_messages((0..MAX_MESSAGES - 1).map(|i| ConversationMessage::human(format!("m{i}"))))
            .await
            .unwrap();
        let before = conv.messages().to_vec();
        let persisted = fx.store.get("chat_history:turn").await.unwrap();

        fx.llm.push_failure("Rate limit exceeded");
        let err = conv
            .add_messages([ConversationMessage::human("q"), ConversationMessage::ai("a")])
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::Summarization(_)));
        assert_eq!(conv.messages(), &before[..]);
        assert_eq!(fx.store.get("chat_history:turn").await.unwrap(), persisted);
    }

    #[tokio::test]
    async fn test_load_failures_leave_empty() {
        let fx = Fixture::new();
        fx.store
            .set("chat_history:bad", b"not json".to_vec(), 0)
            .await
            .unwrap();
        assert!(fx.open("bad", 60).await.is_empty());

        fx.store.set_offline(true);
        assert!(fx.open("offline", 60).await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_message_types_skipped() {
        let fx = Fixture::new();
        let payload = serde_json::json!({
            "messages": [
                {"type": "HumanMessage", "content": "keep"},
                {"type": "FunctionMessage", "content": "drop"},
                {"type": "AIMessage", "content": "keep too", "additional_kwargs": {}}
            ],
            "timestamp": "2024-01-01T00:00:00+00:00"
        });
        fx.store
            .set("chat_history:mixed", serde_json::to_vec(&payload).unwrap(), 0)
            .await
            .unwrap();
        let conv = fx.open("mixed", 60).await;
        assert_eq!(conv.len(), 2);
        assert_eq!(conv.messages()[1].kind, MessageType::Ai);
    }

    #[tokio::test]
    async fn test_persist_failure_not_raised() {
        let fx = Fixture::new();
        let mut conv = fx.open("s1", 60).await;
        fx.store.set_offline(true);
        conv.add_message(ConversationMessage::human("hi")).await.unwrap();
        assert_eq!(conv.len(), 1);
        conv.clear().await;
        assert!(conv.is_empty());
    }

    #[tokio::test]
    async fn test_clear_deletes_key() {
        let fx = Fixture::new();
        let mut conv = fx.open("s1", 60).await;
        conv.add_message(ConversationMessage::human("hi")).await.unwrap();
        assert!(fx.store.contains_key("chat_history:s1").await);
        conv.clear().await;
        assert!(!fx.store.contains_key("chat_history:s1").await);
        assert!(fx.open("s1", 60).await.is_empty());
    }
}
