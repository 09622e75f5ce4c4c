//! Anthropic SSE 生成器
//!
//! 每条连接一个实例的状态机：消费 [`CodexEvent`]，产出 Anthropic
//! Messages 词汇的 SSE 事件串。状态转移全部由事件驱动，没有定时器，
//! 也没有任何跨连接共享。
//!
//! 块索引从 0 单调递增，开过的索引永不复用。任意时刻最多一个文本块
//! 和一个工具块打开，且二者互斥；工具块已打开时再收到 function_call
//! 开始事件不会重复开块。同一回合内并发交错的多个工具调用只能共享
//! 这一个打开的工具块，这是已知限制，测试里有明确标注。

use serde_json::json;

use crate::stream::events::{CodexEvent, TokenUsage};

/// Codex 事件 → Anthropic SSE 的状态机
pub struct AnthropicSseGenerator {
    message_id: String,
    model: String,
    /// 下一个要分配的块索引，只增不减
    content_index: usize,
    open_text_index: Option<usize>,
    open_tool_index: Option<usize>,
    tool_call_id: Option<String>,
    tool_name: Option<String>,
    saw_tool_call: bool,
    started: bool,
    finished: bool,
}

impl AnthropicSseGenerator {
    pub fn new(model: impl Into<String>) -> Self {
        Self::with_id(
            format!("msg_{}", chrono::Utc::now().timestamp_millis()),
            model,
        )
    }

    pub fn with_id(message_id: String, model: impl Into<String>) -> Self {
        Self {
            message_id,
            model: model.into(),
            content_index: 0,
            open_text_index: None,
            open_tool_index: None,
            tool_call_id: None,
            tool_name: None,
            saw_tool_call: false,
            started: false,
            finished: false,
        }
    }

    /// 确保 message_start 已发出；只在首次调用时产出事件
    pub fn start(&mut self) -> Option<String> {
        if self.started {
            return None;
        }
        self.started = true;
        Some(sse_event(
            "message_start",
            json!({
                "type": "message_start",
                "message": {
                    "id": self.message_id,
                    "type": "message",
                    "role": "assistant",
                    "content": [],
                    "model": self.model,
                    "stop_reason": null,
                    "usage": { "input_tokens": 0, "output_tokens": 0 }
                }
            }),
        ))
    }

    /// 处理一个后端事件，返回要发给客户端的 SSE 串
    ///
    /// response.completed 是终态转移，之后的事件全部忽略。
    pub fn process(&mut self, event: &CodexEvent) -> Vec<String> {
        if self.finished {
            return Vec::new();
        }

        let mut output = Vec::new();
        if let Some(start) = self.start() {
            output.push(start);
        }

        match event {
            CodexEvent::TextDelta { text } => {
                if self.open_text_index.is_none() {
                    let idx = self.next_index();
                    self.open_text_index = Some(idx);
                    output.push(sse_event(
                        "content_block_start",
                        json!({
                            "type": "content_block_start",
                            "index": idx,
                            "content_block": { "type": "text", "text": "" }
                        }),
                    ));
                }
                output.push(sse_event(
                    "content_block_delta",
                    json!({
                        "type": "content_block_delta",
                        "index": self.open_text_index,
                        "delta": { "type": "text_delta", "text": text }
                    }),
                ));
            }

            CodexEvent::FunctionCallStart { call_id, name } => {
                self.saw_tool_call = true;
                self.close_text_block(&mut output);
                self.tool_call_id = call_id.clone();
                self.tool_name = name.clone();
                self.open_tool_block(&mut output);
            }

            CodexEvent::FunctionCallArgumentsDelta { delta } => {
                // 容忍漏发 output_item.added 的后端：参数先到时
                // 用当前已知的 id/name（或占位值）补开工具块
                if self.open_tool_index.is_none() {
                    self.saw_tool_call = true;
                    self.close_text_block(&mut output);
                    self.open_tool_block(&mut output);
                }
                output.push(sse_event(
                    "content_block_delta",
                    json!({
                        "type": "content_block_delta",
                        "index": self.open_tool_index,
                        "delta": { "type": "input_json_delta", "partial_json": delta }
                    }),
                ));
            }

            CodexEvent::OutputItemDone => {
                self.close_tool_block(&mut output);
                self.tool_call_id = None;
                self.tool_name = None;
            }

            CodexEvent::Completed { usage } => {
                self.close_text_block(&mut output);
                self.close_tool_block(&mut output);
                self.finished = true;

                let stop_reason = if self.saw_tool_call { "tool_use" } else { "end_turn" };
                // 后端没报 usage 时整个字段省略，不伪造零计数
                let mut delta = json!({
                    "type": "message_delta",
                    "delta": { "stop_reason": stop_reason }
                });
                if let Some(usage) = usage {
                    delta["usage"] = json!({
                        "input_tokens": usage.input_tokens,
                        "output_tokens": usage.output_tokens
                    });
                }
                output.push(sse_event("message_delta", delta));
                output.push(sse_event(
                    "message_stop",
                    json!({ "type": "message_stop", "stop_reason": stop_reason }),
                ));
            }
        }

        output
    }

    fn next_index(&mut self) -> usize {
        let idx = self.content_index;
        self.content_index += 1;
        idx
    }

    /// 工具块已打开时不做任何事，避免发出配不上 stop 的 start
    fn open_tool_block(&mut self, output: &mut Vec<String>) {
        if self.open_tool_index.is_some() {
            return;
        }
        let call_id = self
            .tool_call_id
            .get_or_insert_with(|| format!("tool_{}", chrono::Utc::now().timestamp_millis()))
            .clone();
        let name = self
            .tool_name
            .get_or_insert_with(|| "unknown".to_string())
            .clone();

        let idx = self.next_index();
        self.open_tool_index = Some(idx);
        output.push(sse_event(
            "content_block_start",
            json!({
                "type": "content_block_start",
                "index": idx,
                "content_block": {
                    "type": "tool_use",
                    "id": call_id,
                    "name": name,
                    "input": {}
                }
            }),
        ));
    }

    fn close_text_block(&mut self, output: &mut Vec<String>) {
        if let Some(idx) = self.open_text_index.take() {
            output.push(sse_event(
                "content_block_stop",
                json!({ "type": "content_block_stop", "index": idx }),
            ));
        }
    }

    fn close_tool_block(&mut self, output: &mut Vec<String>) {
        if let Some(idx) = self.open_tool_index.take() {
            output.push(sse_event(
                "content_block_stop",
                json!({ "type": "content_block_stop", "index": idx }),
            ));
        }
    }
}

fn sse_event(event: &str, data: serde_json::Value) -> String {
    format!("event: {event}\ndata: {data}\n\n")
}
