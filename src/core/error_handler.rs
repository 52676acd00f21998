//! 错误处理器
//!
//! 持有会话状态机：任何失败经 ErrorClassifier 分类后生成 ErrorContext，
//! 驱动状态机进入 ERROR 并返回统一的结构化响应；同时提供按状态门控的 can_retry / clear_error。
//! 处理过程本身失败（如已处于 ERROR 的嵌套错误）时降级为最小兜底响应，不向上传播。

use std::error::Error as StdError;

use serde::{Deserialize, Serialize};

use crate::core::{
    classify_external_failure, classify_llm_failure, ErrorContext, HandlerError, SessionState,
    SessionStateMachine, DEFAULT_SEARCH_PROVIDER,
};

/// 统一错误响应（扁平结构，供传输层直接序列化）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: bool,
    pub error_type: String,
    pub message: String,
    pub is_retryable: bool,
    pub session_id: String,
    pub timestamp: String,
    /// 兜底响应不保证有 trace 字段
    pub traceback_text: Option<String>,
    pub original_exception_type: Option<String>,
}

#[derive(Debug)]
pub struct ErrorHandler {
    state_machine: SessionStateMachine,
    search_provider: String,
}

impl ErrorHandler {
    pub fn new(state_machine: SessionStateMachine) -> Self {
        Self {
            state_machine,
            search_provider: DEFAULT_SEARCH_PROVIDER.to_string(),
        }
    }

    /// 设置外部错误分类时匹配的搜索服务名
    pub fn with_search_provider(mut self, provider: impl Into<String>) -> Self {
        self.search_provider = provider.into();
        self
    }

    pub fn state_machine(&self) -> &SessionStateMachine {
        &self.state_machine
    }

    pub fn state_machine_mut(&mut self) -> &mut SessionStateMachine {
        &mut self.state_machine
    }

    pub fn session_id(&self) -> &str {
        self.state_machine.session_id()
    }

    /// 处理任意错误：生成上下文、迁移到 ERROR、记录日志并返回响应
    pub fn handle_error<E: StdError + 'static>(
        &mut self,
        error: &E,
    ) -> Result<ErrorResponse, HandlerError> {
        let context = ErrorContext::from_error(error);
        let context_map = context.to_map()?;

        if !self.state_machine.can_transition(SessionState::Error) {
            return Err(HandlerError::TransitionRejected {
                session_id: self.session_id().to_string(),
                from: self.state_machine.current_state(),
            });
        }
        self.state_machine
            .transition_to(SessionState::Error, Some(context_map));

        tracing::error!(
            session_id = %self.session_id(),
            error_type = %context.error_type,
            error_code = ?context.error_code,
            retryable = context.is_retryable,
            "API error occurred: {}\nTraceback: {}",
            context.message,
            context.trace_text
        );

        Ok(ErrorResponse {
            error: true,
            error_type: context.error_type,
            message: context.message,
            is_retryable: context.is_retryable,
            session_id: self.session_id().to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            traceback_text: Some(context.trace_text),
            original_exception_type: context.original_failure_type,
        })
    }

    /// 分类 LLM 调用失败后处理
    pub fn handle_llm_error<E: StdError + ?Sized>(&mut self, error: &E) -> ErrorResponse {
        let classified = classify_llm_failure(error);
        match self.handle_error(&classified) {
            Ok(response) => response,
            Err(e) => self.fallback_response(
                "LLMAPIError",
                format!("Unexpected error in LLM error handling: {e}"),
            ),
        }
    }

    /// 分类外部服务失败后处理
    pub fn handle_external_api_error<E: StdError + ?Sized>(
        &mut self,
        error: &E,
        api_name: &str,
    ) -> ErrorResponse {
        let classified = classify_external_failure(error, api_name, &self.search_provider);
        match self.handle_error(&classified) {
            Ok(response) => response,
            Err(e) => self.fallback_response(
                "ExternalAPIError",
                format!("Unexpected error in external API error handling: {e}"),
            ),
        }
    }

    /// 处理未经分类的失败（归为 UnhandledError），处理失败时同样降级
    pub fn handle_unexpected_error<E: StdError + 'static>(&mut self, error: &E) -> ErrorResponse {
        match self.handle_error(error) {
            Ok(response) => response,
            Err(e) => self.fallback_response(
                "UnhandledError",
                format!("Unexpected error in error handling: {e}"),
            ),
        }
    }

    /// 仅当处于 ERROR、错误上下文存在且标记为可重试时返回 true
    pub fn can_retry(&self) -> bool {
        if self.state_machine.current_state() != SessionState::Error {
            return false;
        }
        self.state_machine
            .error_context()
            .and_then(|ctx| ctx.get("is_retryable"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// ERROR -> IDLE；其它状态返回 false 且不修改
    pub fn clear_error(&mut self) -> bool {
        if self.state_machine.current_state() == SessionState::Error {
            return self.state_machine.transition_to(SessionState::Idle, None);
        }
        false
    }

    fn fallback_response(&self, error_type: &str, message: String) -> ErrorResponse {
        tracing::warn!(session_id = %self.session_id(), "{}", message);
        ErrorResponse {
            error: true,
            error_type: error_type.to_string(),
            message,
            is_retryable: false,
            session_id: self.session_id().to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            traceback_text: None,
            original_exception_type: None,
        }
    }
}
