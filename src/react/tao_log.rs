//! Thought-Action-Observation 执行日志
//!
//! TaoLogger 消费一次执行的 StepEvent：动作 / 观察 / 最终答案各记一条 LogEntry（step_number 从 1 递增），
//! 同时累积 thoughts / actions / observations 供 get_trace 使用。
//! 最终答案到达时把全部条目写入 {log_dir}/sessions/{session_id}/execution_{execution_id}.json。

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::react::{AgentAction, AgentFinish, StepEvent};

const SESSIONS_DIR: &str = "sessions";

#[derive(Error, Debug)]
pub enum TaoLogError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Execution not found: {0}")]
    ExecutionNotFound(String),

    #[error("Log IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Log JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid log pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Action,
    Observation,
    FinalAnswer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub session_id: String,
    pub execution_id: String,
    pub timestamp: String,
    pub step_number: u32,
    pub step_type: StepType,
    pub content: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceAction {
    pub tool: String,
    pub input: String,
    pub log: String,
}

/// get_trace 的返回结构
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trace {
    pub thoughts: Vec<String>,
    pub actions: Vec<TraceAction>,
    pub observations: Vec<String>,
}

#[derive(Debug)]
pub struct TaoLogger {
    session_id: String,
    execution_id: String,
    log_dir: PathBuf,
    step_number: u32,
    logs: Vec<LogEntry>,
    trace: Trace,
}

impl TaoLogger {
    pub fn new(session_id: impl Into<String>, log_dir: impl AsRef<Path>) -> Self {
        Self::with_execution_id(session_id, uuid::Uuid::new_v4().to_string(), log_dir)
    }

    pub fn with_execution_id(
        session_id: impl Into<String>,
        execution_id: impl Into<String>,
        log_dir: impl AsRef<Path>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            execution_id: execution_id.into(),
            log_dir: log_dir.as_ref().to_path_buf(),
            step_number: 0,
            logs: Vec::new(),
            trace: Trace::default(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    /// 本次执行日志文件路径
    pub fn log_path(&self) -> PathBuf {
        session_dir(&self.log_dir, &self.session_id)
            .join(format!("execution_{}.json", self.execution_id))
    }

    /// 分派单个事件；写盘失败只记日志，不影响执行结果
    pub fn record(&mut self, event: &StepEvent) {
        match event {
            StepEvent::Action(action) => self.on_agent_action(action),
            StepEvent::Observation { output, .. } => self.on_tool_end(output),
            StepEvent::Finish(finish) => {
                if let Err(e) = self.on_agent_finish(finish) {
                    tracing::error!(
                        session_id = %self.session_id,
                        execution_id = %self.execution_id,
                        error = %e,
                        "failed to save TAO logs"
                    );
                }
            }
        }
    }

    pub fn on_agent_action(&mut self, action: &AgentAction) {
        self.trace.thoughts.push(action.log.clone());
        self.trace.actions.push(TraceAction {
            tool: action.tool.clone(),
            input: action.tool_input.clone(),
            log: action.log.clone(),
        });
        self.push_entry(
            StepType::Action,
            json!({
                "thought": action.log,
                "tool_name": action.tool,
                "tool_input": action.tool_input,
            }),
        );
    }

    pub fn on_tool_end(&mut self, output: &str) {
        self.trace.observations.push(output.to_string());
        self.push_entry(StepType::Observation, json!({ "tool_output": output }));
    }

    /// 记录最终答案并写盘，返回日志文件路径
    pub fn on_agent_finish(&mut self, finish: &AgentFinish) -> Result<PathBuf, TaoLogError> {
        self.trace.thoughts.push(finish.log.clone());
        self.push_entry(StepType::FinalAnswer, json!({ "output": finish.output }));
        self.save()
    }

    pub fn logs(&self) -> &[LogEntry] {
        &self.logs
    }

    pub fn get_trace(&self) -> &Trace {
        &self.trace
    }

    fn push_entry(&mut self, step_type: StepType, content: Value) {
        self.step_number += 1;
        let content = match content {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        self.logs.push(LogEntry {
            session_id: self.session_id.clone(),
            execution_id: self.execution_id.clone(),
            timestamp: chrono::Local::now()
                .naive_local()
                .format("%Y-%m-%dT%H:%M:%S%.6f")
                .to_string(),
            step_number: self.step_number,
            step_type,
            content,
        });
    }

    fn save(&self) -> Result<PathBuf, TaoLogError> {
        let path = self.log_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, serde_json::to_string_pretty(&self.logs)?)?;
        tracing::debug!(path = %path.display(), entries = self.logs.len(), "TAO logs saved");
        Ok(path)
    }
}

/// 可作为单级目录名 / 文件名片段：非空、不含路径分隔符与 ".."
pub fn is_path_safe_id(id: &str) -> bool {
    !id.is_empty() && id != "." && !id.contains("..") && !id.contains(['/', '\\', '\0'])
}

fn session_dir(log_dir: &Path, session_id: &str) -> PathBuf {
    log_dir.join(SESSIONS_DIR).join(session_id)
}

/// 有日志的会话 id；目录不存在时为空
pub fn list_sessions(log_dir: impl AsRef<Path>) -> Result<Vec<String>, TaoLogError> {
    let root = log_dir.as_ref().join(SESSIONS_DIR);
    if !root.exists() {
        return Ok(Vec::new());
    }
    let mut sessions = Vec::new();
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            sessions.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    sessions.sort();
    Ok(sessions)
}

/// 读取会话日志；给出 execution_id 时只读该次执行
pub fn load_session_logs(
    log_dir: impl AsRef<Path>,
    session_id: &str,
    execution_id: Option<&str>,
) -> Result<Vec<LogEntry>, TaoLogError> {
    if !is_path_safe_id(session_id) {
        return Err(TaoLogError::SessionNotFound(session_id.to_string()));
    }
    if let Some(eid) = execution_id.filter(|eid| !is_path_safe_id(eid)) {
        return Err(TaoLogError::ExecutionNotFound(eid.to_string()));
    }
    let dir = session_dir(log_dir.as_ref(), session_id);
    if !dir.is_dir() {
        return Err(TaoLogError::SessionNotFound(session_id.to_string()));
    }

    let files: Vec<PathBuf> = match execution_id {
        Some(eid) => {
            let path = dir.join(format!("execution_{eid}.json"));
            if !path.exists() {
                return Err(TaoLogError::ExecutionNotFound(eid.to_string()));
            }
            vec![path]
        }
        None => {
            let pattern = dir.join("execution_*.json");
            let mut paths: Vec<PathBuf> = glob::glob(&pattern.to_string_lossy())?
                .filter_map(Result::ok)
                .collect();
            paths.sort();
            paths
        }
    };

    let mut entries = Vec::new();
    for path in files {
        let data = std::fs::read_to_string(&path)?;
        let mut logs: Vec<LogEntry> = serde_json::from_str(&data)?;
        entries.append(&mut logs);
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action() -> AgentAction {
        AgentAction {
            tool: "calculator".into(),
            tool_input: "2+2".into(),
            log: "Thought: add\nAction: calculator\nAction Input: 2+2".into(),
        }
    }

    #[test]
    fn test_records_and_saves() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = TaoLogger::with_execution_id("s1", "e1", dir.path());
        logger.record(&StepEvent::Action(action()));
        logger.record(&StepEvent::Observation {
            tool: "calculator".into(),
            output: "The result of 2+2 is 4".into(),
        });
        logger.record(&StepEvent::Finish(AgentFinish {
            output: "4".into(),
            log: "Final Answer: 4".into(),
        }));

        let steps: Vec<_> = logger.logs().iter().map(|l| (l.step_number, l.step_type)).collect();
        assert_eq!(
            steps,
            vec![
                (1, StepType::Action),
                (2, StepType::Observation),
                (3, StepType::FinalAnswer)
            ]
        );
        assert_eq!(logger.logs()[0].content["tool_name"], "calculator");
        assert_eq!(logger.logs()[2].content["output"], "4");

        let trace = logger.get_trace();
        assert_eq!(trace.thoughts.len(), 2);
        assert_eq!(trace.actions[0].input, "2+2");
        assert_eq!(trace.observations, vec!["The result of 2+2 is 4"]);

        let path = dir.path().join("sessions/s1/execution_e1.json");
        assert!(path.exists());
        let loaded = load_session_logs(dir.path(), "s1", Some("e1")).unwrap();
        assert_eq!(loaded, logger.logs());
    }

    #[test]
    fn test_traversal_ids_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(is_path_safe_id("session-1"));
        for bad in ["", ".", "..", "../x", "a/b", "a\\b"] {
            assert!(!is_path_safe_id(bad), "{bad:?}");
        }
        assert!(matches!(
            load_session_logs(dir.path(), "../../etc", None),
            Err(TaoLogError::SessionNotFound(_))
        ));
        assert!(matches!(
            load_session_logs(dir.path(), "s1", Some("../x")),
            Err(TaoLogError::ExecutionNotFound(_))
        ));
    }

    #[test]
    fn test_step_type_serialization() {
        assert_eq!(serde_json::to_string(&StepType::FinalAnswer).unwrap(), "\"final_answer\"");
    }

    #[test]
    fn test_list_and_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_sessions(dir.path()).unwrap().is_empty());
        assert!(matches!(
            load_session_logs(dir.path(), "missing", None),
            Err(TaoLogError::SessionNotFound(_))
        ));

        for (sid, eid) in [("a", "1"), ("a", "2"), ("b", "1")] {
            let mut logger = TaoLogger::with_execution_id(sid, eid, dir.path());
            logger
                .on_agent_finish(&AgentFinish {
                    output: "x".into(),
                    log: String::new(),
                })
                .unwrap();
        }
        assert_eq!(list_sessions(dir.path()).unwrap(), vec!["a", "b"]);
        assert_eq!(load_session_logs(dir.path(), "a", None).unwrap().len(), 2);
        assert!(matches!(
            load_session_logs(dir.path(), "a", Some("9")),
            Err(TaoLogError::ExecutionNotFound(_))
        ));
    }
}
