//! 错误上下文：每次处理错误时生成，写入状态机 error_context 并用于构造响应

use std::error::Error as StdError;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::taxonomy::{render_trace, short_type_name};
use crate::core::{ApiError, ErrorKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorContext {
    pub error_type: String,
    pub message: String,
    pub error_code: Option<String>,
    pub details: Map<String, Value>,
    pub is_retryable: bool,
    pub timestamp: String,
    pub trace_text: String,
    pub original_failure_type: Option<String>,
    pub original_trace_text: Option<String>,
}

impl ErrorContext {
    /// 若错误（或其 source 链上）是 ApiError 则直接取其字段，否则归为 UnhandledError
    pub fn from_error<E: StdError + 'static>(error: &E) -> Self {
        let mut current: Option<&(dyn StdError + 'static)> = Some(error);
        while let Some(err) = current {
            if let Some(api) = err.downcast_ref::<ApiError>() {
                return Self::from_api_error(api);
            }
            current = err.source();
        }

        let original_type = short_type_name::<E>();
        let mut details = Map::new();
        details.insert("original_type".to_string(), Value::String(original_type));
        Self {
            error_type: ErrorKind::Unhandled.as_str().to_string(),
            message: error.to_string(),
            error_code: Some("UNKNOWN".to_string()),
            details,
            is_retryable: false,
            timestamp: chrono::Utc::now().to_rfc3339(),
            trace_text: render_trace(error),
            original_failure_type: None,
            original_trace_text: None,
        }
    }

    pub fn from_api_error(error: &ApiError) -> Self {
        let mut trace_text = format!("{}: {}", error.error_type(), error.message);
        if let Some(cause) = &error.cause {
            trace_text.push_str(&format!("\nCaused by: {}: {}", cause.type_name, cause.message));
        }
        Self {
            error_type: error.error_type().to_string(),
            message: error.message.clone(),
            error_code: error.error_code.clone(),
            details: error.details.clone(),
            is_retryable: error.is_retryable(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            trace_text,
            original_failure_type: error.cause.as_ref().map(|c| c.type_name.clone()),
            original_trace_text: error.cause.as_ref().map(|c| c.trace.clone()),
        }
    }

    /// 序列化为结构化 map（状态机 error_context 的存储形式）
    pub fn to_map(&self) -> Result<Map<String, Value>, serde_json::Error> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(serde::ser::Error::custom(format!(
                "error context serialized to non-object: {other}"
            ))),
        }
    }
}
