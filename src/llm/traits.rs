//! 语言模型抽象
//!
//! 所有后端（OpenAI 兼容 / Mock）实现 LanguageModel：invoke 单次完成，返回 LlmResponse。
//! 失败统一为 LlmError，由调用方交给 ErrorHandler 分类。

use async_openai::error::OpenAIError;
use async_trait::async_trait;
use thiserror::Error;

/// 单次完成的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmResponse {
    pub content: String,
}

impl LlmResponse {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("{0}")]
    Request(String),

    #[error("Request timeout after {0}s")]
    Timeout(u64),

    #[error("LLM returned empty response")]
    EmptyResponse,

    #[error("LLM config error: {0}")]
    Config(String),

    #[error(transparent)]
    OpenAi(#[from] OpenAIError),
}

/// 语言模型 trait：prompt 进，文本出
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn invoke(&self, prompt: &str) -> Result<LlmResponse, LlmError>;

    /// 模型名（日志用）
    fn model_name(&self) -> &str;
}
