//! 响应侧流式转换层
//!
//! 后端 Responses SSE → 客户端 Messages SSE 的重组：
//!
//! ```text
//! stream/
//! ├── parser.rs      # 字节流切行、跨块缓存、best-effort JSON 解析
//! ├── events.rs      # 后端事件的中间表示
//! ├── generator.rs   # 块生命周期状态机，产出客户端 SSE
//! └── pipeline.rs    # 三者串成字节流到字节流的管道
//! ```

pub mod events;
pub mod generator;
pub mod parser;
pub mod pipeline;

pub use events::{CodexEvent, TokenUsage};
pub use generator::AnthropicSseGenerator;
pub use parser::SseLineParser;
pub use pipeline::{reframe, StreamPipeline};
