//! 后端流事件的中间表示
//!
//! 解析器把后端 SSE 的 data 负载解析成 `CodexEvent`，生成器消费
//! `CodexEvent` 产出客户端词汇的 SSE。两端通过这一层解耦，后端换
//! 事件拼写或生成器换目标协议都只动各自一侧。
//!
//! 不认识的事件类型解析为 `None`，由调用方静默跳过。

use serde_json::Value;

/// 后端流事件
#[derive(Debug, Clone, PartialEq)]
pub enum CodexEvent {
    /// 文本增量（response.output_text.delta）
    TextDelta { text: String },

    /// function_call 输出项开始（response.output_item.added）
    ///
    /// call_id / name 缺失时由生成器合成占位值
    FunctionCallStart {
        call_id: Option<String>,
        name: Option<String>,
    },

    /// 工具参数增量（response.function_call_arguments.delta，
    /// 兼容 `_delta` 拼写的变体）
    FunctionCallArgumentsDelta { delta: String },

    /// 输出项结束（response.output_item.done）
    OutputItemDone,

    /// 响应完成（response.completed）
    ///
    /// 后端没给 usage 对象时为 `None`，生成器据此决定是否转发计数
    Completed { usage: Option<TokenUsage> },
}

/// 后端报告的 token 用量
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl CodexEvent {
    /// 从已解析的 data 负载中识别事件
    ///
    /// 只认已知的事件类型；其余返回 `None`。output_item.added 只在
    /// 条目类型是 function_call 时产出事件，别的条目类型（如
    /// reasoning）直接忽略。
    pub fn from_value(data: &Value) -> Option<CodexEvent> {
        let event_type = data.get("type").and_then(|t| t.as_str())?;

        match event_type {
            "response.output_text.delta" => Some(CodexEvent::TextDelta {
                text: data
                    .get("delta")
                    .and_then(|d| d.as_str())
                    .unwrap_or("")
                    .to_string(),
            }),

            "response.output_item.added" => {
                let item = data.get("item")?;
                if item.get("type").and_then(|t| t.as_str()) != Some("function_call") {
                    return None;
                }
                Some(CodexEvent::FunctionCallStart {
                    call_id: item
                        .get("call_id")
                        .and_then(|c| c.as_str())
                        .map(|s| s.to_string()),
                    name: item
                        .get("name")
                        .and_then(|n| n.as_str())
                        .map(|s| s.to_string()),
                })
            }

            "response.function_call_arguments.delta"
            | "response.function_call_arguments_delta" => {
                let delta = data
                    .get("delta")
                    .or_else(|| data.get("arguments"))
                    .map(|d| match d.as_str() {
                        Some(s) => s.to_string(),
                        None => d.to_string(),
                    })
                    .unwrap_or_default();
                Some(CodexEvent::FunctionCallArgumentsDelta { delta })
            }

            "response.output_item.done" => Some(CodexEvent::OutputItemDone),

            "response.completed" => {
                let usage = data
                    .get("response")
                    .and_then(|r| r.get("usage"))
                    .map(|u| {
                        let count = |key: &str| {
                            u.get(key).and_then(|t| t.as_u64()).unwrap_or(0)
                        };
                        TokenUsage {
                            input_tokens: count("input_tokens"),
                            output_tokens: count("output_tokens"),
                        }
                    });
                Some(CodexEvent::Completed { usage })
            }

            _ => None,
        }
    }
}
