//! 后端 SSE 行解析
//!
//! 把后端的字节流切成完整的 `data:` 负载。块边界不对齐行边界，
//! 结尾的不完整行必须跨块缓存，拼到下一块的开头再处理，绝不基于
//! 半行产出任何东西。
//!
//! JSON 解析失败的行静默丢弃：单条损坏事件不允许中断整条流。

use serde_json::Value;

use crate::stream::events::CodexEvent;

/// 解析一个字节块的产物
#[derive(Debug, Default, PartialEq)]
pub struct ParsedChunk {
    /// 本块中出现的 `data:` 行数（含解析失败的）
    pub data_lines: usize,
    /// 成功解析出的事件，按到达顺序
    pub events: Vec<CodexEvent>,
}

/// 跨块缓存的 SSE 行解析器，每条连接一个实例
#[derive(Debug, Default)]
pub struct SseLineParser {
    buffer: String,
}

impl SseLineParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// 处理一个字节块
    ///
    /// 只消费以换行结尾的完整行，剩余部分留在缓冲区。非 UTF-8
    /// 字节按有损方式替换后继续，流不中断。
    pub fn process_chunk(&mut self, chunk: &[u8]) -> ParsedChunk {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));

        let mut parsed = ParsedChunk::default();
        while let Some(newline) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline).collect();
            self.consume_line(line.trim_end_matches(&['\n', '\r'][..]), &mut parsed);
        }
        parsed
    }

    /// 流结束时冲掉缓冲区里最后一个没有换行的行
    pub fn finish(&mut self) -> ParsedChunk {
        let mut parsed = ParsedChunk::default();
        if !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            self.consume_line(line.trim_end_matches('\r'), &mut parsed);
        }
        parsed
    }

    fn consume_line(&mut self, line: &str, parsed: &mut ParsedChunk) {
        // event: 行和空行不携带负载，data 行才算数
        let Some(payload) = line.strip_prefix("data: ") else {
            return;
        };
        parsed.data_lines += 1;

        match serde_json::from_str::<Value>(payload) {
            Ok(data) => {
                if let Some(event) = CodexEvent::from_value(&data) {
                    parsed.events.push(event);
                }
            }
            Err(_) => {
                tracing::trace!("[STREAM] Dropping unparseable data line ({} bytes)", payload.len());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_event_in_one_chunk() {
        let mut parser = SseLineParser::new();
        let parsed = parser.process_chunk(
            b"event: response.output_text.delta\ndata: {\"type\":\"response.output_text.delta\",\"delta\":\"hi\"}\n\n",
        );
        assert_eq!(parsed.data_lines, 1);
        assert_eq!(parsed.events, vec![CodexEvent::TextDelta { text: "hi".into() }]);
    }

    #[test]
    fn test_partial_line_buffered_across_chunks() {
        let mut parser = SseLineParser::new();
        let first = parser.process_chunk(b"data: {\"type\":\"response.outp");
        assert_eq!(first.data_lines, 0);
        assert!(first.events.is_empty());

        let second = parser.process_chunk(b"ut_text.delta\",\"delta\":\"split\"}\n");
        assert_eq!(second.data_lines, 1);
        assert_eq!(
            second.events,
            vec![CodexEvent::TextDelta { text: "split".into() }]
        );
    }

    #[test]
    fn test_multiple_events_in_one_chunk_keep_order() {
        let mut parser = SseLineParser::new();
        let parsed = parser.process_chunk(
            b"data: {\"type\":\"response.output_text.delta\",\"delta\":\"a\"}\n\
              data: {\"type\":\"response.output_text.delta\",\"delta\":\"b\"}\n",
        );
        assert_eq!(
            parsed.events,
            vec![
                CodexEvent::TextDelta { text: "a".into() },
                CodexEvent::TextDelta { text: "b".into() },
            ]
        );
    }

    #[test]
    fn test_bad_json_dropped_stream_continues() {
        let mut parser = SseLineParser::new();
        let parsed = parser.process_chunk(
            b"data: {broken json\ndata: {\"type\":\"response.output_text.delta\",\"delta\":\"ok\"}\n",
        );
        // 坏行也计入 data_lines，但不产出事件
        assert_eq!(parsed.data_lines, 2);
        assert_eq!(parsed.events, vec![CodexEvent::TextDelta { text: "ok".into() }]);
    }

    #[test]
    fn test_event_lines_and_blank_lines_ignored() {
        let mut parser = SseLineParser::new();
        let parsed = parser.process_chunk(b"event: response.completed\n\n: comment\n");
        assert_eq!(parsed.data_lines, 0);
        assert!(parsed.events.is_empty());
    }

    #[test]
    fn test_finish_flushes_unterminated_line() {
        let mut parser = SseLineParser::new();
        parser.process_chunk(b"data: {\"type\":\"response.output_item.done\"}");
        let parsed = parser.finish();
        assert_eq!(parsed.events, vec![CodexEvent::OutputItemDone]);
    }

    #[test]
    fn test_crlf_lines_accepted() {
        let mut parser = SseLineParser::new();
        let parsed = parser
            .process_chunk(b"data: {\"type\":\"response.output_text.delta\",\"delta\":\"x\"}\r\n");
        assert_eq!(parsed.events, vec![CodexEvent::TextDelta { text: "x".into() }]);
    }
}
