//! Codex Responses API 请求模型
//!
//! 后端只接受扁平的 `input` 数组：message / function_call /
//! function_call_output 三种条目按会话顺序排列，首个条目必须是模板里的
//! 固定前导项（逐字节一致，否则后端校验失败）。前导项保持原始 `Value`，
//! 其余条目用强类型构造后序列化进去。

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// input 数组条目
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputItem {
    Message {
        role: String,
        content: Vec<ContentPart>,
    },
    FunctionCall {
        call_id: String,
        name: String,
        arguments: String,
    },
    FunctionCallOutput {
        call_id: String,
        output: String,
    },
}

impl InputItem {
    pub fn user_text(text: impl Into<String>) -> Self {
        InputItem::Message {
            role: "user".to_string(),
            content: vec![ContentPart::InputText { text: text.into() }],
        }
    }
}

/// message 条目的内容部件
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    InputText { text: String },
    OutputText { text: String },
    InputImage { image_url: String, detail: String },
}

impl ContentPart {
    /// 角色对应的文本部件：user 用 input_text，assistant 用 output_text
    pub fn text_for_role(role: &str, text: impl Into<String>) -> Self {
        if role == "assistant" {
            ContentPart::OutputText { text: text.into() }
        } else {
            ContentPart::InputText { text: text.into() }
        }
    }

    pub fn image(image_url: impl Into<String>) -> Self {
        ContentPart::InputImage {
            image_url: image_url.into(),
            detail: "auto".to_string(),
        }
    }
}

/// 规范化后的工具描述（function 形式）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodexTool {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub name: String,
    pub description: String,
    pub strict: bool,
    pub parameters: Value,
}

impl CodexTool {
    pub fn function(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            tool_type: "function".to_string(),
            name: name.into(),
            description: description.into(),
            strict: false,
            parameters,
        }
    }
}

/// reasoning 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reasoning {
    pub effort: String,
    pub summary: String,
}

/// Codex Responses API 请求体
#[derive(Debug, Serialize)]
pub struct CodexRequest {
    pub model: String,
    pub instructions: String,
    /// 前导项是原始 Value，其余条目由 InputItem 序列化而来
    pub input: Vec<Value>,
    pub tools: Vec<CodexTool>,
    pub tool_choice: String,
    pub parallel_tool_calls: bool,
    pub reasoning: Reasoning,
    pub store: bool,
    pub stream: bool,
    pub include: Vec<String>,
    pub prompt_cache_key: String,
}
