//! 对话消息
//!
//! Human / AI / System 三类，持久化时按 {"type", "content", "additional_kwargs"} 序列化。

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 消息类型（序列化名与持久化格式一致）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    #[serde(rename = "HumanMessage")]
    Human,
    #[serde(rename = "AIMessage")]
    Ai,
    #[serde(rename = "SystemMessage")]
    System,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::Human => "HumanMessage",
            MessageType::Ai => "AIMessage",
            MessageType::System => "SystemMessage",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单条对话消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub content: String,
    #[serde(rename = "additional_kwargs", default)]
    pub metadata: Map<String, Value>,
}

impl ConversationMessage {
    pub fn new(kind: MessageType, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            metadata: Map::new(),
        }
    }

    pub fn human(content: impl Into<String>) -> Self {
        Self::new(MessageType::Human, content)
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Self::new(MessageType::Ai, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageType::System, content)
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
