//! codexcast - Anthropic Messages ↔ Codex Responses 协议网关
//!
//! 把 Anthropic Messages API 的请求翻译成 Codex Responses API 的请求，
//! 再把后端的 SSE 流实时重组为 Anthropic 原生的 SSE 流，让 Claude Code
//! 这类 Anthropic 客户端可以直接对接 Codex 后端。
//!
//! # 架构设计
//!
//! ```text
//! src/
//! ├── config.rs      # 请求模板与网关配置（启动时加载，只读）
//! ├── error.rs       # 边界错误类型
//! ├── models/        # 两侧协议的数据模型
//! ├── translator/    # 请求侧无状态转换（工具、内容、skill、模型）
//! ├── stream/        # 响应侧流式重组（每连接一个状态机）
//! └── server/        # HTTP 边界：路由、凭证转发、上游透传
//! ```
//!
//! # 数据流
//!
//! ```text
//! 客户端 ──Messages 请求──▶ translator ──Responses 请求──▶ 后端
//! 客户端 ◀──Anthropic SSE── stream ◀────Codex SSE──────── 后端
//! ```

pub mod config;
pub mod error;
pub mod models;
pub mod server;
pub mod stream;
pub mod translator;
