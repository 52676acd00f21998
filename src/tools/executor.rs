//! 工具执行器
//!
//! 持有 ToolRegistry 与全局超时，execute(tool_name, args) 在超时内调用 registry.execute，
//! 未知工具 / 失败 / 超时转为 ToolError；每次调用输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::time::timeout;

use crate::tools::ToolRegistry;

/// 默认单次工具调用超时
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 30;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    /// 与 ReAct 约定一致的提示文本，直接作为 Observation
    #[error("{tool} is not a valid tool, try one of [{available}].")]
    UnknownTool { tool: String, available: String },

    #[error("Tool {tool} failed: {reason}")]
    ExecutionFailed { tool: String, reason: String },

    #[error("Tool {0} timed out")]
    Timeout(String),
}

pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub async fn execute(&self, tool_name: &str, args: serde_json::Value) -> Result<String, ToolError> {
        if !self.registry.contains(tool_name) {
            return Err(ToolError::UnknownTool {
                tool: tool_name.to_string(),
                available: self.registry.tool_names().join(", "),
            });
        }

        let start = Instant::now();
        let args_preview = args_preview(&args);
        let result = timeout(self.timeout, self.registry.execute(tool_name, args)).await;

        let (ok, outcome): (bool, &str) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": duration_ms,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(Ok(content)) => Ok(content),
            Ok(Err(reason)) => Err(ToolError::ExecutionFailed {
                tool: tool_name.to_string(),
                reason,
            }),
            Err(_) => Err(ToolError::Timeout(tool_name.to_string())),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
