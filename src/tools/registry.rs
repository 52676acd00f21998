//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters_schema / execute），由 ToolRegistry 按名注册与查找。
//! ReAct 的 Action Input 是文本：合法 JSON 对象原样作为参数，否则包装为 {"input": 文本}。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// 工具 trait：名称、描述（供 LLM 理解）、参数 schema、异步执行（args 为 JSON）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（ReAct 输出中 Action 的取值）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 参数 JSON Schema；默认为空对象
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    /// 执行工具
    async fn execute(&self, args: Value) -> Result<String, String>;
}

/// 工具注册表：按名称存储 Arc<dyn Tool>
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub async fn execute(&self, name: &str, args: Value) -> Result<String, String> {
        let tool = self.tools.get(name).ok_or_else(|| format!("Unknown tool: {name}"))?;
        tool.execute(args).await
    }

    /// 按名称排序，保证 prompt 稳定
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// prompt 中 {tools} 段落：每行 "name: description, args: {properties}"，按名称排序
    pub fn render_descriptions(&self) -> String {
        let mut lines: Vec<String> = self
            .tools
            .iter()
            .map(|(name, tool)| {
                let schema = tool.parameters_schema();
                let args = schema.get("properties").cloned().unwrap_or(Value::Null);
                format!("{name}: {}, args: {args}", tool.description())
            })
            .collect();
        lines.sort();
        lines.join("\n")
    }
}

/// ReAct Action Input 文本转参数：JSON 对象原样返回，否则包装为 {"input": text}
pub fn parse_tool_input(text: &str) -> Value {
    let trimmed = text.trim();
    match serde_json::from_str::<Value>(trimmed) {
        Ok(v @ Value::Object(_)) => v,
        _ => serde_json::json!({ "input": trimmed }),
    }
}

/// 由输入结构体生成参数 schema
pub fn schema_of<T: JsonSchema>() -> Value {
    serde_json::to_value(schemars::schema_for!(T)).unwrap_or(Value::Null)
}

/// 反序列化工具参数；{"input": ...} 形式会映射到 primary 字段
pub fn tool_args<T: DeserializeOwned>(args: Value, primary: &str) -> Result<T, String> {
    let args = match args {
        Value::Object(mut map) => {
            if !map.contains_key(primary) {
                if let Some(input) = map.remove("input") {
                    map.insert(primary.to_string(), input);
                }
            }
            Value::Object(map)
        }
        Value::String(s) => serde_json::json!({ primary: s }),
        other => other,
    };
    serde_json::from_value(args).map_err(|e| format!("Invalid arguments: {e}"))
}
