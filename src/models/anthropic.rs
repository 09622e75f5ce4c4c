//! Anthropic Messages API 请求模型
//!
//! 客户端（Claude Code / @ai-sdk/anthropic 等）发来的请求结构。
//! content 字段在真实流量里形态很杂：字符串、单个对象、对象数组、
//! 字符串数组甚至混合数组都会出现，因此这里全部走宽松的自定义反序列化，
//! 解析不了的块原样保留为 `Value`，由转换层降级为文本。

use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};

/// Anthropic Messages 请求体
#[derive(Debug, Deserialize)]
pub struct MessagesRequest {
    pub model: Option<String>,
    #[serde(default)]
    pub messages: Vec<Message>,
    pub system: Option<SystemContent>,
    pub tools: Option<Vec<Value>>,
    #[serde(default = "default_stream")]
    pub stream: bool,
}

fn default_stream() -> bool {
    true
}

/// system 字段：字符串或块数组
#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum SystemContent {
    Text(String),
    Blocks(Vec<SystemBlock>),
}

#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum SystemBlock {
    PlainString(String),
    Text { text: String },
    Other(Value),
}

impl SystemContent {
    /// 拍平为单个字符串，块之间用换行连接
    pub fn flatten(&self) -> String {
        match self {
            SystemContent::Text(s) => s.clone(),
            SystemContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    SystemBlock::Text { text } => Some(text.clone()),
                    SystemBlock::PlainString(s) => Some(s.clone()),
                    SystemBlock::Other(v) => v
                        .get("text")
                        .and_then(|t| t.as_str())
                        .map(|s| s.to_string())
                        .or_else(|| serde_json::to_string(v).ok()),
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Message {
    pub role: String,
    #[serde(default, deserialize_with = "deserialize_message_content")]
    pub content: Option<MessageContent>,
}

/// 消息内容：纯文本或内容块序列
#[derive(Debug, Clone)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

fn deserialize_message_content<'de, D>(deserializer: D) -> Result<Option<MessageContent>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<Value> = Option::deserialize(deserializer)?;

    let Some(value) = value else {
        return Ok(None);
    };

    match value {
        Value::String(s) => Ok(Some(MessageContent::Text(s))),
        // 单个对象视为单元素数组
        Value::Object(obj) => Ok(Some(MessageContent::Blocks(vec![parse_content_block(
            Value::Object(obj),
        )]))),
        Value::Array(arr) => {
            let blocks: Vec<ContentBlock> = arr
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => ContentBlock::Text { text: s },
                    other => parse_content_block(other),
                })
                .collect();
            Ok(Some(MessageContent::Blocks(blocks)))
        }
        Value::Null => Ok(None),
        other => Ok(Some(MessageContent::Text(other.to_string()))),
    }
}

/// 单个内容块
#[derive(Debug, Clone)]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Image {
        source: Option<ImageSource>,
        source_raw: Option<Value>,
        image_url: Option<ImageUrlValue>,
    },
    ImageUrl {
        image_url: ImageUrlValue,
        /// 原始块，解析不出地址时降级为它的 JSON 文本
        raw: Value,
    },
    InputImage {
        image_url: Option<ImageUrlValue>,
        url: Option<String>,
        raw: Value,
    },
    ToolUse {
        id: Option<String>,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: Option<String>,
        id: Option<String>,
        content: Option<Value>,
    },
    Document {
        source: Option<Value>,
        name: Option<String>,
    },
    /// 无法识别的块，保留原始值
    Other(Value),
}

/// 图片 source 对象（Anthropic 风格）
#[derive(Debug, Deserialize, Clone)]
pub struct ImageSource {
    #[serde(rename = "type")]
    pub source_type: Option<String>,
    #[serde(alias = "mediaType")]
    pub media_type: Option<String>,
    #[serde(alias = "mimeType")]
    pub mime_type: Option<String>,
    pub data: Option<String>,
    pub url: Option<String>,
    pub uri: Option<String>,
}

/// image_url 字段：字符串或带 url/uri 的对象（OpenAI 风格）
#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum ImageUrlValue {
    Str(String),
    ObjUrl { url: String },
    ObjUri { uri: String },
}

impl ImageUrlValue {
    pub fn as_url(&self) -> &str {
        match self {
            ImageUrlValue::Str(s) => s,
            ImageUrlValue::ObjUrl { url } => url,
            ImageUrlValue::ObjUri { uri } => uri,
        }
    }
}

/// 从 Value 宽松解析内容块
pub fn parse_content_block(value: Value) -> ContentBlock {
    let obj = match &value {
        Value::Object(obj) => obj,
        _ => return ContentBlock::Other(value),
    };

    let block_type = obj.get("type").and_then(|t| t.as_str()).unwrap_or("");

    match block_type {
        "text" => ContentBlock::Text {
            text: obj
                .get("text")
                .and_then(|t| t.as_str())
                .unwrap_or("")
                .to_string(),
        },
        "image" => {
            let source_raw = obj.get("source").cloned();
            let source = source_raw
                .as_ref()
                .and_then(|s| serde_json::from_value(s.clone()).ok());
            let image_url = obj
                .get("image_url")
                .and_then(|u| serde_json::from_value(u.clone()).ok());
            ContentBlock::Image {
                source,
                source_raw,
                image_url,
            }
        }
        "image_url" => {
            let image_url = obj
                .get("image_url")
                .and_then(|u| serde_json::from_value(u.clone()).ok())
                .unwrap_or(ImageUrlValue::Str(String::new()));
            ContentBlock::ImageUrl {
                image_url,
                raw: value.clone(),
            }
        }
        "input_image" => {
            let image_url = obj
                .get("image_url")
                .and_then(|u| serde_json::from_value(u.clone()).ok());
            let url = obj
                .get("url")
                .and_then(|u| u.as_str())
                .map(|s| s.to_string());
            ContentBlock::InputImage {
                image_url,
                url,
                raw: value.clone(),
            }
        }
        "tool_use" => {
            let id = obj.get("id").and_then(|i| i.as_str()).map(|s| s.to_string());
            let name = obj
                .get("name")
                .and_then(|n| n.as_str())
                .unwrap_or("")
                .to_string();
            // input 为 null 或缺失时归一化为 {}
            let input = obj
                .get("input")
                .filter(|v| !v.is_null())
                .cloned()
                .unwrap_or(json!({}));
            ContentBlock::ToolUse { id, name, input }
        }
        "tool_result" => ContentBlock::ToolResult {
            tool_use_id: obj
                .get("tool_use_id")
                .and_then(|i| i.as_str())
                .map(|s| s.to_string()),
            id: obj.get("id").and_then(|i| i.as_str()).map(|s| s.to_string()),
            content: obj.get("content").cloned(),
        },
        "document" => ContentBlock::Document {
            source: obj.get("source").cloned(),
            name: obj.get("name").and_then(|n| n.as_str()).map(|s| s.to_string()),
        },
        _ => {
            // 没有 type 或未知 type：按字段猜测
            if obj.get("image_url").is_some() {
                let image_url = obj
                    .get("image_url")
                    .and_then(|u| serde_json::from_value(u.clone()).ok())
                    .unwrap_or(ImageUrlValue::Str(String::new()));
                return ContentBlock::ImageUrl {
                    image_url,
                    raw: value.clone(),
                };
            }
            if obj.get("source").is_some() {
                let source_raw = obj.get("source").cloned();
                let source = source_raw
                    .as_ref()
                    .and_then(|s| serde_json::from_value(s.clone()).ok());
                return ContentBlock::Image {
                    source,
                    source_raw,
                    image_url: None,
                };
            }
            if block_type.is_empty() {
                if let Some(text) = obj.get("text").and_then(|t| t.as_str()) {
                    return ContentBlock::Text {
                        text: text.to_string(),
                    };
                }
            }
            ContentBlock::Other(value)
        }
    }
}
