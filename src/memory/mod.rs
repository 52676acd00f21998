//! 记忆层：对话消息、带 TTL 的持久化存储、摘要压缩

pub mod conversation;
pub mod message;
pub mod redis_store;
pub mod sqlite_store;
pub mod store;
pub mod summary;

pub use conversation::{
    ConversationStore, MemoryError, DEFAULT_TTL_SECS, MAX_MESSAGES, SUMMARY_BATCH_SIZE,
};
pub use message::{ConversationMessage, MessageType};
pub use redis_store::{RedisStore, DEFAULT_REDIS_URL};
pub use sqlite_store::SqliteStore;
pub use store::{DurableStore, InMemoryStore, StoreError};
pub use summary::{ConversationSummaryManager, SummaryProducer, DEFAULT_MAX_SUMMARY_LENGTH};
