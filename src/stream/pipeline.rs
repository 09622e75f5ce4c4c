//! 流式转换管道
//!
//! 把后端字节流接成客户端 SSE 字节流：解析（跨块行缓存）→ 事件
//! 识别 → 状态机生成。每条连接一个管道实例，状态互不共享。
//!
//! `StreamPipeline` 本身是同步的逐块处理器，不做 I/O，单测直接喂
//! 字节即可；`reframe` 把它挂到异步字节流上，产出可直接塞进响应体
//! 的 `Bytes` 流。客户端断开时流被 drop，上游连接随之中止。

use bytes::Bytes;
use futures::{Stream, StreamExt};

use crate::stream::generator::AnthropicSseGenerator;
use crate::stream::parser::SseLineParser;

/// 单条连接的转换管道
pub struct StreamPipeline {
    parser: SseLineParser,
    generator: AnthropicSseGenerator,
}

impl StreamPipeline {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            parser: SseLineParser::new(),
            generator: AnthropicSseGenerator::new(model),
        }
    }

    /// 处理一个后端字节块，返回要发给客户端的 SSE 串
    ///
    /// 首个含 data 行的块一定会触发 message_start，即使这一块里
    /// 没有任何可识别的事件。
    pub fn process_chunk(&mut self, chunk: &[u8]) -> Vec<String> {
        let parsed = self.parser.process_chunk(chunk);
        let mut output = Vec::new();
        if parsed.data_lines > 0 {
            if let Some(start) = self.generator.start() {
                output.push(start);
            }
        }
        for event in &parsed.events {
            output.extend(self.generator.process(event));
        }
        output
    }

    /// 上游结束时冲掉残留的半行
    pub fn finish(&mut self) -> Vec<String> {
        let parsed = self.parser.finish();
        let mut output = Vec::new();
        for event in &parsed.events {
            output.extend(self.generator.process(event));
        }
        output
    }
}

/// 把后端字节流重组为客户端 SSE 字节流
///
/// 逐块消费上游、逐块产出下游，天然受两侧的流控背压约束，不做
/// 无界缓冲。上游网络错误记日志后终止流，已发出的事件不回收。
pub fn reframe<S, E>(upstream: S, model: String) -> impl Stream<Item = Result<Bytes, std::io::Error>>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    async_stream::stream! {
        let mut pipeline = StreamPipeline::new(model);
        let mut upstream = std::pin::pin!(upstream);

        while let Some(chunk) = upstream.next().await {
            match chunk {
                Ok(bytes) => {
                    for sse in pipeline.process_chunk(&bytes) {
                        yield Ok(Bytes::from(sse));
                    }
                }
                Err(e) => {
                    tracing::warn!("[STREAM] Upstream read error: {}", e);
                    break;
                }
            }
        }

        for sse in pipeline.finish() {
            yield Ok(Bytes::from(sse));
        }
    }
}
