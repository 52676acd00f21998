//! ReAct 输出解析
//!
//! "Final Answer:" -> 结束；"Action: ... Action Input: ..." -> 工具调用。
//! 模型可能继续编造 Observation，解析前先截断到第一个 "\nObservation:"。

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;

pub const FINAL_ANSWER_ACTION: &str = "Final Answer:";
const OBSERVATION_STOP: &str = "\nObservation:";

pub const MISSING_ACTION_AFTER_THOUGHT: &str = "Invalid Format: Missing 'Action:' after 'Thought:'";
pub const MISSING_ACTION_INPUT_AFTER_ACTION: &str =
    "Invalid Format: Missing 'Action Input:' after 'Action:'";
pub const FINAL_ANSWER_AND_PARSABLE_ACTION: &str =
    "Parsing LLM output produced both a final answer and a parse-able action:";

/// 一次工具调用
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentAction {
    pub tool: String,
    pub tool_input: String,
    /// 模型原始输出（含 Thought）
    pub log: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentFinish {
    pub output: String,
    pub log: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReactStep {
    Action(AgentAction),
    Finish(AgentFinish),
}

/// 格式错误；observation 为回传给模型的提示
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct OutputParseError {
    pub message: String,
    pub observation: String,
    pub llm_output: String,
}

impl OutputParseError {
    fn new(message: impl Into<String>, observation: impl Into<String>, llm_output: &str) -> Self {
        Self {
            message: message.into(),
            observation: observation.into(),
            llm_output: llm_output.to_string(),
        }
    }
}

fn action_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)Action\s*\d*\s*:[\s]*(.*?)[\s]*Action\s*\d*\s*Input\s*\d*\s*:[\s]*(.*)")
            .expect("action pattern is valid")
    })
}

fn action_only_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)Action\s*\d*\s*:[\s]*(.*?)").expect("action pattern is valid"))
}

fn action_input_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)[\s]*Action\s*\d*\s*Input\s*\d*\s*:[\s]*(.*)")
            .expect("action input pattern is valid")
    })
}

/// 去掉模型编造的 Observation 及之后的内容
pub fn truncate_at_observation(text: &str) -> &str {
    match text.find(OBSERVATION_STOP) {
        Some(idx) => &text[..idx],
        None => text,
    }
}

pub fn parse_react_output(raw: &str) -> Result<ReactStep, OutputParseError> {
    let text = truncate_at_observation(raw);
    let includes_answer = text.contains(FINAL_ANSWER_ACTION);

    if let Some(caps) = action_re().captures(text) {
        if includes_answer {
            let message = format!("{FINAL_ANSWER_AND_PARSABLE_ACTION} {text}");
            return Err(OutputParseError::new(message.clone(), message, text));
        }
        let tool = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
        let tool_input = caps
            .get(2)
            .map(|m| m.as_str().trim_matches(' ').trim_matches('"'))
            .unwrap_or_default();
        return Ok(ReactStep::Action(AgentAction {
            tool: tool.to_string(),
            tool_input: tool_input.trim_end().to_string(),
            log: text.to_string(),
        }));
    }

    if includes_answer {
        let output = text
            .rsplit(FINAL_ANSWER_ACTION)
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();
        return Ok(ReactStep::Finish(AgentFinish {
            output,
            log: text.to_string(),
        }));
    }

    if !action_only_re().is_match(text) {
        Err(OutputParseError::new(
            format!("Could not parse LLM output: `{text}`"),
            MISSING_ACTION_AFTER_THOUGHT,
            text,
        ))
    } else if !action_input_re().is_match(text) {
        Err(OutputParseError::new(
            format!("Could not parse LLM output: `{text}`"),
            MISSING_ACTION_INPUT_AFTER_ACTION,
            text,
        ))
    } else {
        let message = format!("Could not parse LLM output: `{text}`");
        Err(OutputParseError::new(message.clone(), message, text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_action() {
        let out = "Thought: I should add.\nAction: calculator\nAction Input: 2 + 2";
        match parse_react_output(out).unwrap() {
            ReactStep::Action(a) => {
                assert_eq!(a.tool, "calculator");
                assert_eq!(a.tool_input, "2 + 2");
                assert_eq!(a.log, out);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_action_strips_quotes_and_hallucinated_observation() {
        let out = "Action: string_reverser\nAction Input: \"hello\"\nObservation: olleh\nThought: done";
        match parse_react_output(out).unwrap() {
            ReactStep::Action(a) => {
                assert_eq!(a.tool, "string_reverser");
                assert_eq!(a.tool_input, "hello");
                assert!(!a.log.contains("Observation"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_final_answer() {
        let out = "Thought: I now know the final answer\nFinal Answer: 4";
        assert_eq!(
            parse_react_output(out).unwrap(),
            ReactStep::Finish(AgentFinish {
                output: "4".into(),
                log: out.into()
            })
        );
    }

    #[test]
    fn test_final_answer_with_action_is_error() {
        let out = "Action: calculator\nAction Input: 1\nFinal Answer: 1";
        let err = parse_react_output(out).unwrap_err();
        assert!(err.observation.starts_with(FINAL_ANSWER_AND_PARSABLE_ACTION));
    }

    #[test]
    fn test_missing_action() {
        let err = parse_react_output("I am just chatting").unwrap_err();
        assert_eq!(err.observation, MISSING_ACTION_AFTER_THOUGHT);
        assert_eq!(err.llm_output, "I am just chatting");
    }

    #[test]
    fn test_missing_action_input() {
        let err = parse_react_output("Thought: hmm\nAction: calculator").unwrap_err();
        assert_eq!(err.observation, MISSING_ACTION_INPUT_AFTER_ACTION);
    }
}
