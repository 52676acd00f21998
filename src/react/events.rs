//! ReAct 过程事件
//!
//! StepEvent：执行器每一步产出的事件（动作 / 观察 / 结束），经 mpsc 通道推送给调用方；
//! StreamingEvent：面向客户端的流式事件（session / action / observation / final_answer / error / complete），
//! to_json / to_sse 用于 SSE 输出。

use serde::Serialize;
use serde_json::{json, Value};

use crate::react::{AgentAction, AgentFinish};

/// 执行器单步事件（有限序列，以 Finish 结束）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepEvent {
    Action(AgentAction),
    Observation { tool: String, output: String },
    Finish(AgentFinish),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamingEventType {
    Session,
    Action,
    Observation,
    FinalAnswer,
    Error,
    Complete,
}

/// 流式事件：{"type": ..., "data": {...}}
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamingEvent {
    #[serde(rename = "type")]
    pub kind: StreamingEventType,
    pub data: Value,
}

impl StreamingEvent {
    pub fn session(session_id: &str) -> Self {
        Self {
            kind: StreamingEventType::Session,
            data: json!({ "session_id": session_id }),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: StreamingEventType::Error,
            data: json!({ "error": message.into() }),
        }
    }

    pub fn complete(result: Value) -> Self {
        Self {
            kind: StreamingEventType::Complete,
            data: json!({ "result": result }),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"type":"error","data":{"error":"failed to serialize event"}}"#.to_string()
        })
    }

    /// SSE 帧："data: {json}\n\n"
    pub fn to_sse(&self) -> String {
        format!("data: {}\n\n", self.to_json())
    }
}

impl From<&StepEvent> for StreamingEvent {
    fn from(event: &StepEvent) -> Self {
        match event {
            StepEvent::Action(action) => Self {
                kind: StreamingEventType::Action,
                data: json!({
                    "tool": action.tool,
                    "input": action.tool_input,
                    "thought": action.log,
                }),
            },
            StepEvent::Observation { output, .. } => Self {
                kind: StreamingEventType::Observation,
                data: json!({ "output": output }),
            },
            StepEvent::Finish(finish) => Self {
                kind: StreamingEventType::FinalAnswer,
                data: json!({ "output": finish.output }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_event_shape() {
        let step = StepEvent::Action(AgentAction {
            tool: "calculator".into(),
            tool_input: "1+1".into(),
            log: "Thought: add".into(),
        });
        let ev = StreamingEvent::from(&step);
        let v: Value = serde_json::from_str(&ev.to_json()).unwrap();
        assert_eq!(v["type"], "action");
        assert_eq!(v["data"]["tool"], "calculator");
        assert_eq!(v["data"]["input"], "1+1");
        assert_eq!(v["data"]["thought"], "Thought: add");
    }

    #[test]
    fn test_sse_framing() {
        let ev = StreamingEvent::session("abc");
        assert_eq!(
            ev.to_sse(),
            "data: {\"type\":\"session\",\"data\":{\"session_id\":\"abc\"}}\n\n"
        );
    }

    #[test]
    fn test_final_answer_type_name() {
        let ev = StreamingEvent::from(&StepEvent::Finish(AgentFinish {
            output: "4".into(),
            log: String::new(),
        }));
        assert!(ev.to_json().starts_with("{\"type\":\"final_answer\""));
    }
}
