//! Tao - Rust 研究型智能体后端
//!
//! 模块划分：
//! - **agent**: 单会话 Agent（状态机驱动 + ReAct 执行 + 对话存储 + 流式事件）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误分类与处理、会话状态机、会话注册表、生命周期
//! - **llm**: 语言模型抽象与实现（OpenAI 兼容 / Mock）
//! - **memory**: 对话消息、带 TTL 的持久化存储、摘要压缩
//! - **observability**: 日志初始化
//! - **react**: ReAct 执行器、输出解析、Prompt 模板、TAO 日志
//! - **tools**: 工具箱（calculator、clock、reverser、word counter）

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod tools;

pub use agent::{stream_query, AgentConfig, AgentDeps, AgentRunResult, ResearchAgent};
pub use core::{ErrorHandler, ErrorResponse, SessionState, SessionStateMachine};
pub use memory::{ConversationMessage, ConversationStore};
