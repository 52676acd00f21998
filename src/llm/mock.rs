//! Mock 语言模型（用于测试与无 API Key 的本地运行）
//!
//! 按脚本依次返回预置回复或失败；脚本耗尽后回显 prompt 中最后一个 "Question:" 行作为 Final Answer，
//! 便于本地跑通 ReAct 流程。所有收到的 prompt 都会被记录，供测试断言。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LanguageModel, LlmError, LlmResponse};

#[derive(Debug, Clone)]
enum Scripted {
    Reply(String),
    Fail(String),
}

#[derive(Debug, Default)]
pub struct MockLanguageModel {
    script: Mutex<VecDeque<Scripted>>,
    prompts: Mutex<Vec<String>>,
}

impl MockLanguageModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// 依次返回给定回复
    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mock = Self::new();
        for r in replies {
            mock.push_reply(r);
        }
        mock
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Scripted::Reply(reply.into()));
        }
    }

    /// 下一次调用失败，错误消息为 message（用于驱动错误分类）
    pub fn push_failure(&self, message: impl Into<String>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Scripted::Fail(message.into()));
        }
    }

    /// 已收到的 prompt（按调用顺序）
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or(0)
    }

    fn echo(prompt: &str) -> String {
        let question = prompt
            .lines()
            .rev()
            .find_map(|l| l.trim().strip_prefix("Question:"))
            .map(str::trim)
            .unwrap_or("(no input)");
        format!("Thought: I can answer directly.\nFinal Answer: Echo from Mock: {question}")
    }
}

#[async_trait]
impl LanguageModel for MockLanguageModel {
    async fn invoke(&self, prompt: &str) -> Result<LlmResponse, LlmError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match next {
            Some(Scripted::Reply(text)) => Ok(LlmResponse::new(text)),
            Some(Scripted::Fail(message)) => Err(LlmError::Request(message)),
            None => Ok(LlmResponse::new(Self::echo(prompt))),
        }
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}
