//! ReAct 执行器
//!
//! Thought -> Action -> Observation 循环：每轮把 scratchpad 渲染进模板调用 LLM，
//! 解析出工具调用则执行并把观察结果追加到 scratchpad，解析出 Final Answer 则结束。
//! 达到 max_iterations 后按 early_stopping_method 收尾。每一步通过可选的 mpsc 通道推送 StepEvent。

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::llm::{LanguageModel, LlmError};
use crate::memory::ConversationMessage;
use crate::react::{
    parse_react_output, render, AgentAction, AgentFinish, OutputParseError, PromptType,
    PromptVars, ReactStep, StepEvent,
};
use crate::tools::{parse_tool_input, ToolExecutor};

/// 默认最大推理轮数
pub const DEFAULT_MAX_ITERATIONS: usize = 10;
/// force 收尾时的固定输出
pub const FORCE_STOP_OUTPUT: &str = "Agent stopped due to iteration limit or time limit.";
/// 格式错误时作为工具名记录的伪工具
pub const EXCEPTION_TOOL: &str = "_Exception";

const GENERATE_FINAL_PROMPT: &str =
    "\n\nI now need to return a final answer based on the previous steps:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EarlyStoppingMethod {
    #[default]
    Force,
    Generate,
}

impl EarlyStoppingMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            EarlyStoppingMethod::Force => "force",
            EarlyStoppingMethod::Generate => "generate",
        }
    }
}

impl fmt::Display for EarlyStoppingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EarlyStoppingMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "force" => Ok(EarlyStoppingMethod::Force),
            "generate" => Ok(EarlyStoppingMethod::Generate),
            other => Err(format!(
                "unknown early stopping method {other:?}, expected force | generate"
            )),
        }
    }
}

/// 一次工具调用及其观察结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntermediateStep {
    pub action: AgentAction,
    pub observation: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorOutput {
    pub output: String,
    pub steps: Vec<IntermediateStep>,
}

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("Execution cancelled")]
    Cancelled,

    /// 仅在关闭 handle_parsing_errors 时出现
    #[error(transparent)]
    Parse(#[from] OutputParseError),
}

/// 推理执行器：query + 历史 -> 最终输出与中间步骤
#[async_trait]
pub trait ReasoningExecutor: Send + Sync {
    async fn run(
        &self,
        query: &str,
        history: &[ConversationMessage],
        events: Option<&UnboundedSender<StepEvent>>,
        cancel: CancellationToken,
    ) -> Result<ExecutorOutput, ExecutorError>;

    fn prompt_type(&self) -> PromptType;

    fn max_iterations(&self) -> usize;

    fn early_stopping_method(&self) -> EarlyStoppingMethod;

    fn model_name(&self) -> &str;
}

pub struct ReactExecutor {
    llm: Arc<dyn LanguageModel>,
    tools: Arc<ToolExecutor>,
    prompt_type: PromptType,
    max_iterations: usize,
    early_stopping: EarlyStoppingMethod,
    handle_parsing_errors: bool,
}

impl ReactExecutor {
    pub fn new(llm: Arc<dyn LanguageModel>, tools: Arc<ToolExecutor>) -> Self {
        Self {
            llm,
            tools,
            prompt_type: PromptType::default(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            early_stopping: EarlyStoppingMethod::default(),
            handle_parsing_errors: true,
        }
    }

    pub fn with_prompt_type(mut self, prompt_type: PromptType) -> Self {
        self.prompt_type = prompt_type;
        self
    }

    /// 至少 1 轮
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    pub fn with_early_stopping(mut self, method: EarlyStoppingMethod) -> Self {
        self.early_stopping = method;
        self
    }

    pub fn with_handle_parsing_errors(mut self, enabled: bool) -> Self {
        self.handle_parsing_errors = enabled;
        self
    }

    /// 历史消息渲染成 "Previous conversation:" 段落，拼在模板之前
    fn history_block(history: &[ConversationMessage]) -> String {
        if history.is_empty() {
            return String::new();
        }
        let mut block = String::from("Previous conversation:\n");
        for message in history {
            block.push_str(&format!("{}: {}\n", message.kind, message.content));
        }
        block.push('\n');
        block
    }

    fn build_prompt(&self, history: &str, query: &str, scratchpad: &str) -> String {
        let descriptions = self.tools.registry().render_descriptions();
        let tool_names = self.tools.tool_names().join(", ");
        let body = render(
            self.prompt_type.template(),
            &PromptVars {
                tools: &descriptions,
                tool_names: &tool_names,
                input: query,
                agent_scratchpad: scratchpad,
            },
        );
        format!("{history}{body}")
    }

    async fn call_llm(&self, prompt: &str, cancel: &CancellationToken) -> Result<String, ExecutorError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(ExecutorError::Cancelled),
            result = self.llm.invoke(prompt) => Ok(result?.content),
        }
    }

    /// 工具失败、未知工具都转成观察文本交回模型
    async fn observe(&self, action: &AgentAction, cancel: &CancellationToken) -> Result<String, ExecutorError> {
        let args = parse_tool_input(&action.tool_input);
        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(ExecutorError::Cancelled),
            result = self.tools.execute(&action.tool, args) => result,
        };
        Ok(match result {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(tool = %action.tool, error = %e, "tool call failed");
                e.to_string()
            }
        })
    }

    async fn finish_early(
        &self,
        history: &str,
        query: &str,
        scratchpad: &str,
        cancel: &CancellationToken,
    ) -> Result<AgentFinish, ExecutorError> {
        match self.early_stopping {
            EarlyStoppingMethod::Force => Ok(AgentFinish {
                output: FORCE_STOP_OUTPUT.to_string(),
                log: String::new(),
            }),
            EarlyStoppingMethod::Generate => {
                let pad = format!("{scratchpad}{GENERATE_FINAL_PROMPT}");
                let prompt = self.build_prompt(history, query, &pad);
                let raw = self.call_llm(&prompt, cancel).await?;
                Ok(match parse_react_output(&raw) {
                    Ok(ReactStep::Finish(finish)) => finish,
                    _ => AgentFinish {
                        output: raw.clone(),
                        log: raw,
                    },
                })
            }
        }
    }
}

fn emit(events: Option<&UnboundedSender<StepEvent>>, event: StepEvent) {
    if let Some(tx) = events {
        // 接收端已关闭时忽略
        let _ = tx.send(event);
    }
}

#[async_trait]
impl ReasoningExecutor for ReactExecutor {
    async fn run(
        &self,
        query: &str,
        history: &[ConversationMessage],
        events: Option<&UnboundedSender<StepEvent>>,
        cancel: CancellationToken,
    ) -> Result<ExecutorOutput, ExecutorError> {
        let history_block = Self::history_block(history);
        let mut scratchpad = String::new();
        let mut steps: Vec<IntermediateStep> = Vec::new();

        for iteration in 0..self.max_iterations {
            if cancel.is_cancelled() {
                return Err(ExecutorError::Cancelled);
            }
            let prompt = self.build_prompt(&history_block, query, &scratchpad);
            tracing::debug!(iteration, model = %self.llm.model_name(), "react step");
            let raw = self.call_llm(&prompt, &cancel).await?;

            let (action, observation) = match parse_react_output(&raw) {
                Ok(ReactStep::Finish(finish)) => {
                    tracing::info!(iterations = iteration + 1, steps = steps.len(), "agent finished");
                    emit(events, StepEvent::Finish(finish.clone()));
                    return Ok(ExecutorOutput {
                        output: finish.output,
                        steps,
                    });
                }
                Ok(ReactStep::Action(action)) => {
                    emit(events, StepEvent::Action(action.clone()));
                    let observation = self.observe(&action, &cancel).await?;
                    (action, observation)
                }
                Err(e) if self.handle_parsing_errors => {
                    tracing::warn!(iteration, error = %e.message, "invalid react output");
                    let action = AgentAction {
                        tool: EXCEPTION_TOOL.to_string(),
                        tool_input: e.observation.clone(),
                        log: e.llm_output,
                    };
                    emit(events, StepEvent::Action(action.clone()));
                    (action, e.observation)
                }
                Err(e) => return Err(e.into()),
            };

            emit(
                events,
                StepEvent::Observation {
                    tool: action.tool.clone(),
                    output: observation.clone(),
                },
            );
            scratchpad.push_str(&format!("{}\nObservation: {}\nThought: ", action.log, observation));
            steps.push(IntermediateStep { action, observation });
        }

        tracing::warn!(
            max_iterations = self.max_iterations,
            method = %self.early_stopping,
            "iteration limit reached"
        );
        let finish = self
            .finish_early(&history_block, query, &scratchpad, &cancel)
            .await?;
        emit(events, StepEvent::Finish(finish.clone()));
        Ok(ExecutorOutput {
            output: finish.output,
            steps,
        })
    }

    fn prompt_type(&self) -> PromptType {
        self.prompt_type
    }

    fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    fn early_stopping_method(&self) -> EarlyStoppingMethod {
        self.early_stopping
    }

    fn model_name(&self) -> &str {
        self.llm.model_name()
    }
}
