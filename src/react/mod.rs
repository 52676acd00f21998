//! 推理层：ReAct 模板、输出解析、执行循环、过程事件与 TAO 日志

pub mod events;
pub mod executor;
pub mod parser;
pub mod prompts;
pub mod tao_log;

pub use events::{StepEvent, StreamingEvent, StreamingEventType};
pub use executor::{
    EarlyStoppingMethod, ExecutorError, ExecutorOutput, IntermediateStep, ReactExecutor,
    ReasoningExecutor, DEFAULT_MAX_ITERATIONS, EXCEPTION_TOOL, FORCE_STOP_OUTPUT,
};
pub use parser::{
    parse_react_output, AgentAction, AgentFinish, OutputParseError, ReactStep,
    FINAL_ANSWER_ACTION, MISSING_ACTION_AFTER_THOUGHT, MISSING_ACTION_INPUT_AFTER_ACTION,
};
pub use prompts::{render, PromptType, PromptVars};
pub use tao_log::{
    is_path_safe_id, list_sessions, load_session_logs, LogEntry, StepType, TaoLogError, TaoLogger,
    Trace, TraceAction,
};
