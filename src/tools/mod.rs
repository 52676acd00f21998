//! 工具箱：注册表、执行器与内置工具（calculator、clock、reverser、word counter）

pub mod basic;
pub mod calculator;
pub mod executor;
pub mod registry;

pub use basic::{CurrentTimeTool, StringReverserTool, WordCounterTool, DEFAULT_TIME_FORMAT};
pub use calculator::CalculatorTool;
pub use executor::{ToolError, ToolExecutor, DEFAULT_TOOL_TIMEOUT_SECS};
pub use registry::{parse_tool_input, schema_of, tool_args, Tool, ToolRegistry};

/// 注册全部内置工具
pub fn builtin_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(CalculatorTool);
    registry.register(CurrentTimeTool);
    registry.register(StringReverserTool);
    registry.register(WordCounterTool);
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry() {
        let registry = builtin_registry();
        assert_eq!(
            registry.tool_names(),
            vec!["calculator", "get_current_time", "string_reverser", "word_counter"]
        );

        let rendered = registry.render_descriptions();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("calculator: "));
        assert!(lines[0].contains("args: {\"expression\":"));
        assert!(lines[3].starts_with("word_counter: "));
    }
}
