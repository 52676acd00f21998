//! 错误分类体系
//!
//! ErrorKind 为带标签的错误种类，是否可重试（transient）是种类本身的属性；
//! ApiError 携带 message / error_code / details，以及只读的原始失败快照 FailureCause（用于追溯上游 trace）。

use std::error::Error as StdError;
use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// 错误种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// LLM 调用的通用错误
    LlmApi,
    /// 外部服务的通用错误
    ExternalApi,
    /// 限流（可重试）
    RateLimit,
    /// 鉴权失败
    Authentication,
    /// 网络 / 超时（可重试）
    Network,
    /// Redis 连接或操作错误（外部，默认不可重试）
    Redis,
    /// 搜索服务错误（外部，默认不可重试）
    SearchApi,
    /// 未识别的失败
    Unhandled,
}

impl ErrorKind {
    /// 是否为瞬时错误（重试可能成功）
    pub fn is_transient(self) -> bool {
        matches!(self, ErrorKind::RateLimit | ErrorKind::Network)
    }

    /// 对外展示的错误类型名（error_type 字段）
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::LlmApi => "LLMAPIError",
            ErrorKind::ExternalApi => "ExternalAPIError",
            ErrorKind::RateLimit => "RateLimitError",
            ErrorKind::Authentication => "AuthenticationError",
            ErrorKind::Network => "NetworkError",
            ErrorKind::Redis => "RedisError",
            ErrorKind::SearchApi => "SearchAPIError",
            ErrorKind::Unhandled => "UnhandledError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 原始失败的只读快照：类型名、消息、渲染后的 source 链
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureCause {
    pub type_name: String,
    pub message: String,
    pub trace: String,
}

impl FailureCause {
    pub fn capture<E: StdError + ?Sized>(error: &E) -> Self {
        Self {
            type_name: short_type_name::<E>(),
            message: error.to_string(),
            trace: render_trace(error),
        }
    }
}

/// 已分类的错误
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
    pub error_code: Option<String>,
    pub details: Map<String, Value>,
    pub cause: Option<FailureCause>,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            error_code: None,
            details: Map::new(),
            cause: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.error_code = Some(code.into());
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn with_cause<E: StdError + ?Sized>(mut self, cause: &E) -> Self {
        self.cause = Some(FailureCause::capture(cause));
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_transient()
    }

    pub fn error_type(&self) -> &'static str {
        self.kind.as_str()
    }
}

/// 取类型名最后一段（去掉模块路径与泛型参数）
pub(crate) fn short_type_name<E: ?Sized>() -> String {
    let full = std::any::type_name::<E>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

/// 渲染错误及其 source 链，逐行 "Caused by: ..."
pub(crate) fn render_trace<E: StdError + ?Sized>(error: &E) -> String {
    let mut out = format!("{}: {}", short_type_name::<E>(), error);
    let mut source = error.source();
    while let Some(err) = source {
        out.push_str(&format!("\nCaused by: {err}"));
        source = err.source();
    }
    out
}
