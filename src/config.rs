//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `TAO__*` 覆盖（双下划线表示嵌套，如 `TAO__STORE__BACKEND=redis`）。
//! 常用的 `REDIS_URL` / `OPENAI_API_KEY` 在对应字段未配置时作为兜底。

use std::path::PathBuf;

use serde::Deserialize;

use crate::core::DEFAULT_SEARCH_PROVIDER;
use crate::memory::{DEFAULT_MAX_SUMMARY_LENGTH, DEFAULT_REDIS_URL, DEFAULT_TTL_SECS};
use crate::react::{EarlyStoppingMethod, PromptType, DEFAULT_MAX_ITERATIONS};
use crate::tools::DEFAULT_TOOL_TIMEOUT_SECS;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmSection,
    pub memory: MemorySection,
    pub store: StoreSection,
    pub agent: AgentSection,
    pub tools: ToolsSection,
}

/// [llm] 段：模型、温度、OpenAI 兼容端点
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub temperature: f32,
    pub base_url: Option<String>,
    /// 未设置时读 OPENAI_API_KEY；都没有则使用 Mock
    pub api_key: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: 0.0,
            base_url: None,
            api_key: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_request_timeout() -> u64 {
    60
}

/// [memory] 段：会话历史过期时间与摘要长度
#[derive(Debug, Clone, Deserialize)]
pub struct MemorySection {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_max_summary_length")]
    pub max_summary_length: usize,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            max_summary_length: default_max_summary_length(),
        }
    }
}

fn default_ttl_secs() -> u64 {
    DEFAULT_TTL_SECS
}

fn default_max_summary_length() -> usize {
    DEFAULT_MAX_SUMMARY_LENGTH
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Sqlite,
    Redis,
}

/// [store] 段：持久化后端
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSection {
    #[serde(default)]
    pub backend: StoreBackend,
    /// 未设置时读 REDIS_URL，再退回 redis://localhost:6379/0
    pub redis_url: Option<String>,
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: PathBuf,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            redis_url: None,
            sqlite_path: default_sqlite_path(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("data/tao_agent.db")
}

impl StoreSection {
    pub fn resolved_redis_url(&self) -> String {
        self.redis_url
            .clone()
            .or_else(|| std::env::var("REDIS_URL").ok())
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_REDIS_URL.to_string())
    }
}

/// [agent] 段：ReAct 默认参数与 TAO 日志目录
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSection {
    #[serde(default)]
    pub prompt_type: PromptType,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default)]
    pub early_stopping_method: EarlyStoppingMethod,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            prompt_type: PromptType::default(),
            max_iterations: default_max_iterations(),
            early_stopping_method: EarlyStoppingMethod::default(),
            log_dir: default_log_dir(),
        }
    }
}

fn default_max_iterations() -> usize {
    DEFAULT_MAX_ITERATIONS
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

/// [tools] 段：工具超时与外部错误分类用的搜索服务名
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    #[serde(default = "default_search_provider")]
    pub search_provider: String,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
            search_provider: default_search_provider(),
        }
    }
}

fn default_tool_timeout_secs() -> u64 {
    DEFAULT_TOOL_TIMEOUT_SECS
}

fn default_search_provider() -> String {
    DEFAULT_SEARCH_PROVIDER.to_string()
}

impl LlmSection {
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .filter(|k| !k.trim().is_empty())
    }
}

/// 从 config 目录加载配置，环境变量 TAO__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 TAO__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("TAO")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
