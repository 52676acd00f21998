//! ReAct Prompt 模板
//!
//! 三种模板（standard / research / simple），占位符 {tools} {tool_names} {input} {agent_scratchpad}。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

const REACT_PROMPT_TEMPLATE: &str = "
Answer the following questions as best you can. You have access to the following tools:

{tools}

Use the following format:

Question: the input question you must answer
Thought: you should always think about what to do
Action: the action to take, should be one of [{tool_names}]
Action Input: the input to the action
Observation: the result of the action
... (this Thought/Action/Action Input/Observation can repeat N times)
Thought: I now know the final answer
Final Answer: the final answer to the original input question

Begin!

Question: {input}
Thought: {agent_scratchpad}";

const RESEARCH_REACT_PROMPT_TEMPLATE: &str = "
You are a research assistant that helps users find and analyze information. You have access to the following tools:

{tools}

When researching a topic, follow this systematic approach:

Question: the research question or topic to investigate
Thought: analyze what information is needed and plan your approach
Action: the action to take, should be one of [{tool_names}]
Action Input: the specific input for the action
Observation: the result of the action
... (repeat Thought/Action/Action Input/Observation as needed to gather comprehensive information)
Thought: synthesize all gathered information to form a complete answer
Final Answer: a comprehensive answer based on all observations

Important guidelines:
- Always cite your sources when possible
- Cross-reference information from multiple sources
- Be critical of the information quality
- Provide balanced perspectives on controversial topics

Begin!

Question: {input}
Thought: {agent_scratchpad}";

const SIMPLE_REACT_PROMPT_TEMPLATE: &str = "You are a helpful assistant. You have access to the following tools:

{tools}

To answer questions, use this format:

Question: {input}
Thought: What do I need to do?
Action: choose from [{tool_names}]
Action Input: input for the tool
Observation: tool's response
Thought: Do I have enough information?
Final Answer: your complete answer

{agent_scratchpad}";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptType {
    #[default]
    Standard,
    Research,
    Simple,
}

impl PromptType {
    pub fn template(self) -> &'static str {
        match self {
            PromptType::Standard => REACT_PROMPT_TEMPLATE,
            PromptType::Research => RESEARCH_REACT_PROMPT_TEMPLATE,
            PromptType::Simple => SIMPLE_REACT_PROMPT_TEMPLATE,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PromptType::Standard => "standard",
            PromptType::Research => "research",
            PromptType::Simple => "simple",
        }
    }
}

impl fmt::Display for PromptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PromptType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "standard" => Ok(PromptType::Standard),
            "research" => Ok(PromptType::Research),
            "simple" => Ok(PromptType::Simple),
            other => Err(format!(
                "unknown prompt type {other:?}, expected standard | research | simple"
            )),
        }
    }
}

/// 模板中的四个占位符取值
pub struct PromptVars<'a> {
    pub tools: &'a str,
    pub tool_names: &'a str,
    pub input: &'a str,
    pub agent_scratchpad: &'a str,
}

/// 单次替换，避免用户输入中的 "{...}" 被二次展开
pub fn render(template: &str, vars: &PromptVars<'_>) -> String {
    let mut out = String::with_capacity(template.len() + vars.input.len() + vars.tools.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start..];
        let replaced = [
            ("{tools}", vars.tools),
            ("{tool_names}", vars.tool_names),
            ("{input}", vars.input),
            ("{agent_scratchpad}", vars.agent_scratchpad),
        ]
        .into_iter()
        .find(|(placeholder, _)| after.starts_with(placeholder));
        match replaced {
            Some((placeholder, value)) => {
                out.push_str(value);
                rest = &after[placeholder.len()..];
            }
            None => {
                out.push('{');
                rest = &after[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars<'a>(input: &'a str, scratchpad: &'a str) -> PromptVars<'a> {
        PromptVars {
            tools: "calculator: math",
            tool_names: "calculator",
            input,
            agent_scratchpad: scratchpad,
        }
    }

    #[test]
    fn test_all_templates_have_placeholders() {
        for t in [PromptType::Standard, PromptType::Research, PromptType::Simple] {
            let tpl = t.template();
            for p in ["{tools}", "{tool_names}", "{input}", "{agent_scratchpad}"] {
                assert!(tpl.contains(p), "{t} missing {p}");
            }
        }
    }

    #[test]
    fn test_render_standard() {
        let out = render(PromptType::Standard.template(), &vars("what is 2+2?", ""));
        assert!(out.contains("calculator: math"));
        assert!(out.contains("should be one of [calculator]"));
        assert!(out.ends_with("Question: what is 2+2?\nThought: "));
    }

    #[test]
    fn test_render_does_not_expand_user_braces() {
        let out = render("Q: {input} / {agent_scratchpad}", &vars("{tools} {x}", "pad"));
        assert_eq!(out, "Q: {tools} {x} / pad");
    }

    #[test]
    fn test_prompt_type_parse() {
        assert_eq!("Research".parse::<PromptType>().unwrap(), PromptType::Research);
        assert!("fancy".parse::<PromptType>().is_err());
        assert_eq!(PromptType::default(), PromptType::Standard);
    }
}
