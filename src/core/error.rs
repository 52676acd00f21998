//! Agent 级错误类型
//!
//! AgentError 覆盖构建与运行期的非业务错误（配置、存储、模型初始化）；
//! HandlerError 是 ErrorHandler 自身处理失败时的类型，由 handle_*_error 降级为兜底响应。

use thiserror::Error;

use crate::core::SessionState;
use crate::llm::LlmError;
use crate::memory::StoreError;

/// 构建 / 运行 Agent 时可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Invalid session id: {0:?}")]
    InvalidSessionId(String),

    /// 同一会话已有查询在执行
    #[error("Session {0} is already running")]
    SessionBusy(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

/// 错误处理过程本身的失败
#[derive(Error, Debug)]
pub enum HandlerError {
    /// 状态机拒绝进入 ERROR（当前已处于 ERROR，嵌套错误）
    #[error("session {session_id} cannot transition from {from} to error")]
    TransitionRejected {
        session_id: String,
        from: SessionState,
    },

    #[error("failed to serialize error context: {0}")]
    Serialize(#[from] serde_json::Error),
}
