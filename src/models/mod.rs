//! 数据模型层
//!
//! - `anthropic`: 客户端侧 Messages API 请求模型（宽松反序列化）
//! - `codex`: 后端侧 Responses API 请求模型（强类型构造）

pub mod anthropic;
pub mod codex;

pub use anthropic::{
    ContentBlock, ImageSource, ImageUrlValue, Message, MessageContent, MessagesRequest,
    SystemContent,
};
pub use codex::{CodexRequest, CodexTool, ContentPart, InputItem, Reasoning};
