//! 错误分类器
//!
//! 纯函数：按失败消息做大小写不敏感的子串匹配，按固定优先级（先命中者胜）产出 ApiError，
//! 原始失败以 FailureCause 形式保存在 cause 字段，不需要抛出再捕获。

use std::error::Error as StdError;

use crate::core::{ApiError, ErrorKind};

/// 默认搜索服务名（外部错误分类时与 "search" 同级匹配）
pub const DEFAULT_SEARCH_PROVIDER: &str = "duckduckgo";

/// LLM 调用失败分类：rate limit > authentication/401 > timeout/network > 通用 LLM 错误
pub fn classify_llm_failure<E: StdError + ?Sized>(error: &E) -> ApiError {
    let text = error.to_string().to_lowercase();

    let classified = if text.contains("rate limit") {
        ApiError::new(ErrorKind::RateLimit, "OpenAI rate limit exceeded").with_code("RATE_LIMIT")
    } else if text.contains("authentication") || text.contains("401") {
        ApiError::new(ErrorKind::Authentication, "OpenAI authentication failed")
            .with_code("AUTH_ERROR")
    } else if text.contains("timeout") || text.contains("network") {
        ApiError::new(ErrorKind::Network, "OpenAI network error").with_code("NETWORK_ERROR")
    } else {
        ApiError::new(ErrorKind::LlmApi, "OpenAI API error").with_code("LLM_ERROR")
    };

    classified.with_cause(error)
}

/// 外部服务失败分类：redis/connection > search/搜索服务名 > timeout > 通用外部错误
pub fn classify_external_failure<E: StdError + ?Sized>(
    error: &E,
    api_name: &str,
    search_provider: &str,
) -> ApiError {
    let raw = error.to_string();
    let text = raw.to_lowercase();
    let provider = search_provider.to_lowercase();

    let classified = if text.contains("redis") || text.contains("connection") {
        ApiError::new(ErrorKind::Redis, format!("Redis connection error: {raw}"))
            .with_code("REDIS_ERROR")
    } else if text.contains("search") || (!provider.is_empty() && text.contains(&provider)) {
        ApiError::new(ErrorKind::SearchApi, format!("Search API error: {raw}"))
            .with_code("SEARCH_ERROR")
    } else if text.contains("timeout") {
        ApiError::new(ErrorKind::Network, format!("{api_name} timeout error: {raw}"))
            .with_code("TIMEOUT_ERROR")
    } else {
        ApiError::new(ErrorKind::ExternalApi, format!("{api_name} API error: {raw}"))
            .with_code("EXTERNAL_API_ERROR")
    };

    classified.with_detail("api_name", api_name).with_cause(error)
}
