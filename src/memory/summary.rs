//! 对话摘要
//!
//! SummaryProducer 把一批旧消息压缩为一段文本；ConversationSummaryManager 为基于语言模型的实现。

use std::sync::Arc;

use async_trait::async_trait;

use crate::llm::{LanguageModel, LlmError};
use crate::memory::ConversationMessage;

/// 摘要目标长度的默认上限（字符）
pub const DEFAULT_MAX_SUMMARY_LENGTH: usize = 1000;

#[async_trait]
pub trait SummaryProducer: Send + Sync {
    /// 空输入返回空串且不调用模型
    async fn summarize(&self, messages: &[ConversationMessage]) -> Result<String, LlmError>;
}

pub struct ConversationSummaryManager {
    llm: Arc<dyn LanguageModel>,
    max_summary_length: usize,
}

impl ConversationSummaryManager {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self::with_max_length(llm, DEFAULT_MAX_SUMMARY_LENGTH)
    }

    pub fn with_max_length(llm: Arc<dyn LanguageModel>, max_summary_length: usize) -> Self {
        Self {
            llm,
            max_summary_length,
        }
    }

    pub fn max_summary_length(&self) -> usize {
        self.max_summary_length
    }

    fn build_prompt(&self, messages: &[ConversationMessage]) -> String {
        let conversation = messages
            .iter()
            .map(|m| format!("{}: {}", m.kind, m.content))
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "Summarize the following conversation in about {} characters:\n\n{}\n\nSummary:",
            self.max_summary_length / 2,
            conversation
        )
    }
}

#[async_trait]
impl SummaryProducer for ConversationSummaryManager {
    async fn summarize(&self, messages: &[ConversationMessage]) -> Result<String, LlmError> {
        if messages.is_empty() {
            return Ok(String::new());
        }
        let prompt = self.build_prompt(messages);
        let response = self.llm.invoke(&prompt).await?;
        tracing::debug!(
            batch = messages.len(),
            chars = response.content.len(),
            "conversation batch summarized"
        );
        Ok(response.content)
    }
}
