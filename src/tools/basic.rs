//! 基础工具：当前时间、字符串反转、计数
//!
//! 失败以文本形式返回给模型（作为 Observation），而不是 Err。

use std::fmt::Write as _;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::tools::{schema_of, tool_args, Tool};

pub const DEFAULT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn default_time_format() -> Option<String> {
    Some(DEFAULT_TIME_FORMAT.to_string())
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DateTimeInput {
    /// strftime 格式（默认 %Y-%m-%d %H:%M:%S）
    #[serde(default = "default_time_format")]
    pub format: Option<String>,
}

/// 当前本地时间
pub struct CurrentTimeTool;

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "get_current_time"
    }

    fn description(&self) -> &str {
        "Get the current date and time. Input: optional strftime format string (default: %Y-%m-%d %H:%M:%S)"
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<DateTimeInput>()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let input: DateTimeInput = tool_args(args, "format")?;
        let format = input
            .format
            .filter(|f| !f.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TIME_FORMAT.to_string());

        // 非法格式在 Display 时返回 fmt::Error
        let mut formatted = String::new();
        let now = chrono::Local::now();
        match write!(formatted, "{}", now.format(&format)) {
            Ok(()) => Ok(format!("Current time: {formatted}")),
            Err(_) => Ok(format!("Error formatting time: invalid format string {format:?}")),
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ReverseInput {
    /// 要反转的文本
    pub text: String,
}

/// 字符串反转（按字符）
pub struct StringReverserTool;

#[async_trait]
impl Tool for StringReverserTool {
    fn name(&self) -> &str {
        "string_reverser"
    }

    fn description(&self) -> &str {
        "Reverse a given string. Useful for testing text manipulation. Input: the text to reverse"
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<ReverseInput>()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let input: ReverseInput = tool_args(args, "text")?;
        let reversed: String = input.text.chars().rev().collect();
        Ok(format!("Reversed string: {reversed}"))
    }
}

fn default_count_type() -> String {
    "words".to_string()
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct WordCountInput {
    /// 要统计的文本
    pub text: String,
    /// words | characters | lines
    #[serde(default = "default_count_type")]
    pub count_type: String,
}

/// 统计词数 / 字符数 / 行数
pub struct WordCounterTool;

#[async_trait]
impl Tool for WordCounterTool {
    fn name(&self) -> &str {
        "word_counter"
    }

    fn description(&self) -> &str {
        "Count words, characters, or lines in a given text. Input: {\"text\": \"...\", \"count_type\": \"words|characters|lines\"}"
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<WordCountInput>()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let input: WordCountInput = tool_args(args, "text")?;
        let text = &input.text;
        let result = match input.count_type.as_str() {
            "words" => format!("Word count: {}", text.split_whitespace().count()),
            "characters" => format!("Character count: {}", text.chars().count()),
            "lines" => format!("Line count: {}", text.lines().count()),
            other => format!(
                "Unknown count type: {other}. Use 'words', 'characters', or 'lines'"
            ),
        };
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::parse_tool_input;
    use serde_json::json;

    #[tokio::test]
    async fn test_current_time_default_format() {
        let out = CurrentTimeTool.execute(json!({})).await.unwrap();
        let ts = out.strip_prefix("Current time: ").unwrap();
        assert!(chrono::NaiveDateTime::parse_from_str(ts, DEFAULT_TIME_FORMAT).is_ok());
    }

    #[tokio::test]
    async fn test_current_time_custom_and_invalid_format() {
        let out = CurrentTimeTool.execute(parse_tool_input("%Y")).await.unwrap();
        assert_eq!(out.len(), "Current time: ".len() + 4);

        let bad = CurrentTimeTool.execute(json!({"format": "%Q"})).await.unwrap();
        assert!(bad.starts_with("Error formatting time"));
    }

    #[tokio::test]
    async fn test_reverser_handles_unicode() {
        let out = StringReverserTool
            .execute(parse_tool_input("héllo 世界"))
            .await
            .unwrap();
        assert_eq!(out, "Reversed string: 界世 olléh");
    }

    #[tokio::test]
    async fn test_word_counter_modes() {
        let text = "one two\nthree";
        let tool = WordCounterTool;
        let count = |mode: &str| tool.execute(json!({"text": text, "count_type": mode}));
        assert_eq!(count("words").await.unwrap(), "Word count: 3");
        assert_eq!(count("characters").await.unwrap(), "Character count: 13");
        assert_eq!(count("lines").await.unwrap(), "Line count: 2");
        assert!(count("bytes").await.unwrap().starts_with("Unknown count type: bytes"));

        let plain = WordCounterTool.execute(parse_tool_input("a b c d")).await.unwrap();
        assert_eq!(plain, "Word count: 4");
    }

    #[test]
    fn test_schema_lists_fields() {
        let schema = WordCounterTool.parameters_schema();
        assert!(schema["properties"]["text"].is_object());
        assert!(schema["properties"]["count_type"].is_object());
    }
}
