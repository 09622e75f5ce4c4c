//! 工具声明规范化
//!
//! 客户端的 tools 数组里混着三种声明形态：
//! - Claude Code：`{ name, description, input_schema }`（没有 type）
//! - Anthropic：`{ type: "tool", name, description, input_schema }`
//! - OpenAI：`{ type: "function", function: { name, description, parameters } }`
//!
//! 全部归一为 function 描述符，顺序保持不变。保留名 `skill`
//! （大小写不敏感）是网关内部子协议的入口，永远不透给后端。
//! 未知形态按两套约定尽力提取字段，不报错。

use serde_json::{json, Value};

use crate::models::CodexTool;

/// 网关保留的 skill 工具名
pub const SKILL_TOOL_NAME: &str = "skill";

/// 判断工具声明是否为保留的 skill 工具
pub fn is_skill_tool(tool: &Value) -> bool {
    let name = tool
        .get("name")
        .or_else(|| tool.get("function").and_then(|f| f.get("name")))
        .and_then(|n| n.as_str())
        .unwrap_or("");
    name.eq_ignore_ascii_case(SKILL_TOOL_NAME)
}

/// 规范化客户端工具声明列表
///
/// 空列表原样保留：绝不补默认工具，否则后端可能引用客户端根本
/// 没有声明过的工具名。
pub fn normalize_tools(tools: Option<&Vec<Value>>) -> Vec<CodexTool> {
    let Some(tools) = tools else {
        return Vec::new();
    };

    let normalized: Vec<CodexTool> = tools
        .iter()
        .filter(|tool| !is_skill_tool(tool))
        .map(normalize_tool)
        .collect();

    if normalized.len() != tools.len() {
        tracing::debug!(
            "[TOOLS] {} of {} tool declarations forwarded (skill tool filtered)",
            normalized.len(),
            tools.len()
        );
    }

    normalized
}

fn normalize_tool(tool: &Value) -> CodexTool {
    let tool_type = tool.get("type").and_then(|t| t.as_str());

    // Claude Code 形态与 Anthropic 形态字段一致，只差 type 标记
    if (tool.get("name").is_some() && tool_type.is_none()) || tool_type == Some("tool") {
        let name = tool.get("name").and_then(|n| n.as_str()).unwrap_or("unknown");
        let description = tool
            .get("description")
            .and_then(|d| d.as_str())
            .unwrap_or("");
        return CodexTool::function(name, description, schema_of(tool.get("input_schema")));
    }

    // OpenAI 形态：字段嵌在 function 里
    if tool_type == Some("function") {
        let func = tool.get("function").unwrap_or(tool);
        let name = func.get("name").and_then(|n| n.as_str()).unwrap_or("unknown");
        let description = func
            .get("description")
            .and_then(|d| d.as_str())
            .unwrap_or("");
        return CodexTool::function(name, description, schema_of(func.get("parameters")));
    }

    // 未知形态：按两套约定尽力提取
    let name = tool
        .get("name")
        .or_else(|| tool.get("function").and_then(|f| f.get("name")))
        .and_then(|n| n.as_str())
        .unwrap_or("unknown");
    let description = tool
        .get("description")
        .or_else(|| tool.get("function").and_then(|f| f.get("description")))
        .and_then(|d| d.as_str())
        .unwrap_or("");
    let schema = tool
        .get("input_schema")
        .or_else(|| tool.get("function").and_then(|f| f.get("parameters")));
    CodexTool::function(name, description, schema_of(schema))
}

/// 取参数 schema，缺失时补空对象 schema，并保证 properties 存在
fn schema_of(schema: Option<&Value>) -> Value {
    let mut parameters = schema
        .cloned()
        .unwrap_or_else(|| json!({"type": "object", "properties": {}}));
    if let Some(obj) = parameters.as_object_mut() {
        obj.entry("properties").or_insert_with(|| json!({}));
    }
    parameters
}
