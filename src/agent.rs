//! 单会话研究型 Agent
//!
//! ResearchAgent 把四块拼在一起：会话状态机（经 ErrorHandler 持有）、对话存储、ReAct 执行器、TAO 日志。
//! run 对单条查询执行一次完整的 Thought/Action/Observation 循环：
//! IDLE / ERROR / COMPLETED -> RUNNING -> COMPLETED，任何失败经 ErrorHandler 分类后进入 ERROR，
//! 结果中附带结构化 ErrorResponse。stream_query 把过程转为 StreamingEvent 流。

use std::path::PathBuf;
use std::sync::Arc;

use futures_util::Stream;
use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::AgentSection;
use crate::core::{
    AgentError, ErrorHandler, ErrorResponse, SessionState, SessionStateMachine, StateInfo,
    DEFAULT_SEARCH_PROVIDER,
};
use crate::llm::LanguageModel;
use crate::memory::{
    ConversationMessage, ConversationStore, ConversationSummaryManager, DurableStore,
    SummaryProducer, DEFAULT_TTL_SECS,
};
use crate::react::{
    is_path_safe_id, EarlyStoppingMethod, ExecutorError, IntermediateStep, LogEntry, PromptType,
    ReactExecutor, ReasoningExecutor, StepEvent, StreamingEvent, TaoLogger, Trace,
    DEFAULT_MAX_ITERATIONS,
};
use crate::tools::{builtin_registry, ToolExecutor, DEFAULT_TOOL_TIMEOUT_SECS};

/// 单个 Agent 的配置；session_id 去除首尾空白后不能为空，且要能作为日志目录名
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    session_id: String,
    pub prompt_type: PromptType,
    pub max_iterations: usize,
    pub early_stopping_method: EarlyStoppingMethod,
}

impl AgentConfig {
    pub fn new(session_id: &str) -> Result<Self, AgentError> {
        let session_id = session_id.trim();
        if session_id.is_empty() {
            return Err(AgentError::InvalidSessionId(
                "session_id is required and cannot be empty".to_string(),
            ));
        }
        if !is_path_safe_id(session_id) {
            return Err(AgentError::InvalidSessionId(format!(
                "session_id must not contain path separators or '..': {session_id}"
            )));
        }
        Ok(Self {
            session_id: session_id.to_string(),
            prompt_type: PromptType::default(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            early_stopping_method: EarlyStoppingMethod::default(),
        })
    }

    /// 以 [agent] 段为默认值
    pub fn from_section(session_id: &str, section: &AgentSection) -> Result<Self, AgentError> {
        Ok(Self::new(session_id)?
            .with_prompt_type(section.prompt_type)
            .with_max_iterations(section.max_iterations)
            .with_early_stopping(section.early_stopping_method))
    }

    pub fn with_prompt_type(mut self, prompt_type: PromptType) -> Self {
        self.prompt_type = prompt_type;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    pub fn with_early_stopping(mut self, method: EarlyStoppingMethod) -> Self {
        self.early_stopping_method = method;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

/// 所有会话共享的依赖（模型、存储、工具），在启动时构建一次后注入
#[derive(Clone)]
pub struct AgentDeps {
    pub llm: Arc<dyn LanguageModel>,
    pub store: Arc<dyn DurableStore>,
    pub tools: Arc<ToolExecutor>,
    pub summarizer: Arc<dyn SummaryProducer>,
    pub ttl_secs: u64,
    pub log_dir: PathBuf,
    pub search_provider: String,
}

impl AgentDeps {
    /// 内置工具、基于同一模型的摘要器与默认参数
    pub fn new(llm: Arc<dyn LanguageModel>, store: Arc<dyn DurableStore>) -> Self {
        let summarizer: Arc<dyn SummaryProducer> =
            Arc::new(ConversationSummaryManager::new(llm.clone()));
        Self {
            llm,
            store,
            tools: Arc::new(ToolExecutor::new(builtin_registry(), DEFAULT_TOOL_TIMEOUT_SECS)),
            summarizer,
            ttl_secs: DEFAULT_TTL_SECS,
            log_dir: PathBuf::from("logs"),
            search_provider: DEFAULT_SEARCH_PROVIDER.to_string(),
        }
    }

    pub fn with_tools(mut self, tools: Arc<ToolExecutor>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn SummaryProducer>) -> Self {
        self.summarizer = summarizer;
        self
    }

    pub fn with_ttl(mut self, ttl_secs: u64) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }

    pub fn with_log_dir(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.log_dir = log_dir.into();
        self
    }

    pub fn with_search_provider(mut self, provider: impl Into<String>) -> Self {
        self.search_provider = provider.into();
        self
    }
}

/// 结果中回显的执行参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunConfigInfo {
    pub prompt_type: PromptType,
    pub max_iterations: usize,
    pub early_stopping_method: EarlyStoppingMethod,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentRunResult {
    pub output: String,
    pub intermediate_steps: Vec<IntermediateStep>,
    pub trace: Trace,
    pub tao_logs: Vec<LogEntry>,
    pub config: RunConfigInfo,
    /// 失败时为分类后的错误响应
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorResponse>,
}

impl AgentRunResult {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

pub struct ResearchAgent {
    config: AgentConfig,
    handler: ErrorHandler,
    memory: ConversationStore,
    executor: Box<dyn ReasoningExecutor>,
    log_dir: PathBuf,
}

impl ResearchAgent {
    /// 构建 ReAct 执行器并加载该会话已持久化的历史
    pub async fn new(config: AgentConfig, deps: &AgentDeps) -> Self {
        let executor = ReactExecutor::new(deps.llm.clone(), deps.tools.clone())
            .with_prompt_type(config.prompt_type)
            .with_max_iterations(config.max_iterations)
            .with_early_stopping(config.early_stopping_method);
        Self::with_executor(config, deps, Box::new(executor)).await
    }

    /// 使用自定义执行器（测试或替换推理策略）
    pub async fn with_executor(
        config: AgentConfig,
        deps: &AgentDeps,
        executor: Box<dyn ReasoningExecutor>,
    ) -> Self {
        let memory = ConversationStore::open(
            config.session_id(),
            deps.store.clone(),
            deps.summarizer.clone(),
            deps.ttl_secs,
        )
        .await;
        let handler = ErrorHandler::new(SessionStateMachine::new(config.session_id()))
            .with_search_provider(deps.search_provider.clone());
        tracing::info!(
            session_id = %config.session_id(),
            history = memory.len(),
            prompt_type = %config.prompt_type,
            "agent created"
        );
        Self {
            config,
            handler,
            memory,
            executor,
            log_dir: deps.log_dir.clone(),
        }
    }

    pub fn session_id(&self) -> &str {
        self.config.session_id()
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.handler.state_machine().current_state()
    }

    pub fn state_info(&self) -> StateInfo {
        self.handler.state_machine().get_state_info()
    }

    pub fn error_handler(&self) -> &ErrorHandler {
        &self.handler
    }

    pub fn error_handler_mut(&mut self) -> &mut ErrorHandler {
        &mut self.handler
    }

    pub fn memory(&self) -> &ConversationStore {
        &self.memory
    }

    /// 清空对话历史
    pub async fn clear_history(&mut self) {
        self.memory.clear().await;
    }

    /// 执行被中途丢弃后会停在 RUNNING，需显式复位
    pub fn reset(&mut self) {
        self.handler.state_machine_mut().reset();
    }

    fn run_config(&self) -> RunConfigInfo {
        RunConfigInfo {
            prompt_type: self.executor.prompt_type(),
            max_iterations: self.executor.max_iterations(),
            early_stopping_method: self.executor.early_stopping_method(),
            model: self.executor.model_name().to_string(),
        }
    }

    /// 执行一次查询。仅在会话已处于 RUNNING 时返回 Err；执行失败体现在结果的 error 字段。
    pub async fn run(
        &mut self,
        query: &str,
        events: Option<&UnboundedSender<StepEvent>>,
        cancel: CancellationToken,
    ) -> Result<AgentRunResult, AgentError> {
        let session_id = self.session_id().to_string();
        if self.state() == SessionState::Running
            || !self
                .handler
                .state_machine_mut()
                .transition_to(SessionState::Running, None)
        {
            return Err(AgentError::SessionBusy(session_id));
        }
        tracing::info!(session_id = %session_id, "running query");

        let mut logger = TaoLogger::new(&session_id, &self.log_dir);
        let history = self.memory.messages().to_vec();
        let (step_tx, mut step_rx) = mpsc::unbounded_channel::<StepEvent>();

        let executor = &self.executor;
        let execution = async {
            let result = executor.run(query, &history, Some(&step_tx), cancel).await;
            drop(step_tx);
            result
        };
        let forward = async {
            while let Some(event) = step_rx.recv().await {
                logger.record(&event);
                if let Some(tx) = events {
                    let _ = tx.send(event);
                }
            }
        };
        let (result, ()) = tokio::join!(execution, forward);

        let outcome = match result {
            Ok(output) => self.remember(query, output).await,
            Err(e) => Err(self.handle_executor_error(&e)),
        };

        let config = self.run_config();
        Ok(match outcome {
            Ok((output, intermediate_steps)) => {
                self.handler
                    .state_machine_mut()
                    .transition_to(SessionState::Completed, None);
                AgentRunResult {
                    output,
                    intermediate_steps,
                    trace: logger.get_trace().clone(),
                    tao_logs: logger.logs().to_vec(),
                    config,
                    error: None,
                }
            }
            Err(response) => AgentRunResult {
                output: format!("Error: {}", response.message),
                intermediate_steps: Vec::new(),
                trace: logger.get_trace().clone(),
                tao_logs: logger.logs().to_vec(),
                config,
                error: Some(response),
            },
        })
    }

    /// 把本轮问答作为一个整体写入对话历史
    async fn remember(
        &mut self,
        query: &str,
        output: crate::react::ExecutorOutput,
    ) -> Result<(String, Vec<IntermediateStep>), ErrorResponse> {
        let turn = [
            ConversationMessage::human(query),
            ConversationMessage::ai(output.output.clone()),
        ];
        if let Err(e) = self.memory.add_messages(turn).await {
            return Err(self.handler.handle_llm_error(e.llm_error()));
        }
        Ok((output.output, output.steps))
    }

    fn handle_executor_error(&mut self, error: &ExecutorError) -> ErrorResponse {
        match error {
            ExecutorError::Llm(e) => self.handler.handle_llm_error(e),
            other => self.handler.handle_unexpected_error(other),
        }
    }
}

/// 在后台执行查询并把过程转成流式事件：
/// session -> (action | observation)* -> final_answer -> complete；run 被拒绝时以 error 结束。
pub fn stream_query(
    agent: Arc<Mutex<ResearchAgent>>,
    query: String,
    cancel: CancellationToken,
) -> impl Stream<Item = StreamingEvent> + Send + 'static {
    let (out_tx, out_rx) = mpsc::unbounded_channel::<StreamingEvent>();

    tokio::spawn(async move {
        let mut agent = agent.lock_owned().await;
        let _ = out_tx.send(StreamingEvent::session(agent.session_id()));

        let (step_tx, mut step_rx) = mpsc::unbounded_channel::<StepEvent>();
        let forward_tx = out_tx.clone();
        let forward = async move {
            while let Some(event) = step_rx.recv().await {
                let _ = forward_tx.send(StreamingEvent::from(&event));
            }
        };
        let execution = async move {
            let result = agent.run(&query, Some(&step_tx), cancel).await;
            drop(step_tx);
            result
        };
        let (result, ()) = tokio::join!(execution, forward);

        let last = match result {
            Ok(run) => match serde_json::to_value(&run) {
                Ok(value) => StreamingEvent::complete(value),
                Err(e) => StreamingEvent::error(e.to_string()),
            },
            Err(e) => StreamingEvent::error(e.to_string()),
        };
        let _ = out_tx.send(last);
    });

    futures_util::stream::unfold(out_rx, |mut rx| async move {
        rx.recv().await.map(|event| (event, rx))
    })
}
