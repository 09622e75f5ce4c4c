//! 内容块规范化
//!
//! 把客户端消息的 content（字符串或混杂类型的块数组）归一为后端的
//! input 条目：文本和图片累积进 message 条目，tool_use / tool_result
//! 拍平为顶层的 function_call / function_call_output 条目（出现时会
//! 截断当前累积组）。skill 相关的块在这里被分流：tool_use 丢弃，
//! tool_result 提取为 [`SkillRecord`] 交给上层注入。
//!
//! 规范化永不报错：无法识别的块降级为其 JSON 文本，图片解析失败降级
//! 为文本表示，保证请求始终能构建出来。

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use uuid::Uuid;

use crate::models::{
    ContentBlock, ContentPart, ImageSource, ImageUrlValue, InputItem, Message, MessageContent,
};
use crate::translator::skill::{self, SkillRecord};

/// 用户消息里第一个路径样 token（以 / 开头、空白分隔）
static PATH_TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:^|\s)(/[^\s]+)").unwrap());

/// 整个会话历史规范化的产物
#[derive(Debug, Default)]
pub struct NormalizedHistory {
    /// 按原始顺序排列的后端 input 条目
    pub items: Vec<InputItem>,
    /// 从 tool_result 里分流出的 skill，按出现顺序
    pub skills: Vec<SkillRecord>,
}

/// 规范化全部会话消息
///
/// 两遍扫描：第一遍收集 skill tool_use 的 id 集合（tool_result 靠它
/// 配对），第二遍逐消息转换。system 角色的消息在这一层整体丢弃，
/// 系统提示由上层单独处理。
pub fn normalize_messages(messages: &[Message]) -> NormalizedHistory {
    let skill_ids = collect_skill_tool_ids(messages);
    let mut history = NormalizedHistory::default();

    for message in messages {
        if message.role == "system" {
            continue;
        }
        let Some(content) = &message.content else {
            continue;
        };
        normalize_message(&message.role, content, &skill_ids, &mut history);
    }

    if !history.skills.is_empty() {
        tracing::debug!("[SKILL] Extracted {} skill(s) from history", history.skills.len());
    }
    history
}

/// 第一遍：记录所有名为 skill 的 tool_use 的 id
fn collect_skill_tool_ids(messages: &[Message]) -> HashSet<String> {
    let mut ids = HashSet::new();
    for message in messages {
        let Some(MessageContent::Blocks(blocks)) = &message.content else {
            continue;
        };
        for block in blocks {
            if let ContentBlock::ToolUse { id: Some(id), name, .. } = block {
                if skill::is_skill_tool_name(name) {
                    ids.insert(id.clone());
                }
            }
        }
    }
    ids
}

fn normalize_message(
    role: &str,
    content: &MessageContent,
    skill_ids: &HashSet<String>,
    history: &mut NormalizedHistory,
) {
    let blocks = match content {
        MessageContent::Text(text) => {
            if !text.is_empty() {
                history.items.push(InputItem::Message {
                    role: role.to_string(),
                    content: vec![ContentPart::text_for_role(role, text.clone())],
                });
            }
            return;
        }
        MessageContent::Blocks(blocks) => blocks,
    };

    // 文本/图片部件累积组，遇到 function_call(_output) 条目时截断
    let mut parts: Vec<ContentPart> = Vec::new();

    for block in blocks {
        match block {
            ContentBlock::Text { text } => {
                parts.push(ContentPart::text_for_role(role, text.clone()));
            }
            ContentBlock::Image { source, source_raw, image_url } => {
                push_image_part(
                    role,
                    resolve_image_url(image_url.as_ref(), None, source.as_ref()),
                    source_raw.clone(),
                    &mut parts,
                );
            }
            ContentBlock::ImageUrl { image_url, raw } => {
                push_image_part(
                    role,
                    resolve_image_url(Some(image_url), None, None),
                    Some(raw.clone()),
                    &mut parts,
                );
            }
            ContentBlock::InputImage { image_url, url, raw } => {
                push_image_part(
                    role,
                    resolve_image_url(image_url.as_ref(), url.as_deref(), None),
                    Some(raw.clone()),
                    &mut parts,
                );
            }
            ContentBlock::Document { source, name } => {
                parts.push(ContentPart::text_for_role(
                    role,
                    summarize_document(source.as_ref(), name.as_deref()),
                ));
            }
            ContentBlock::ToolUse { id, name, input } => {
                // skill 调用原地丢弃，绝不作为 function_call 转发
                if skill::is_skill_tool_name(name) {
                    continue;
                }
                flush_parts(role, &mut parts, &mut history.items);
                // input 已是 JSON 字符串时原样转发，避免二次编码
                let arguments = match input {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                history.items.push(InputItem::FunctionCall {
                    call_id: id.clone().unwrap_or_else(generated_call_id),
                    name: if name.is_empty() {
                        "unknown".to_string()
                    } else {
                        name.clone()
                    },
                    arguments,
                });
            }
            ContentBlock::ToolResult { tool_use_id, id, content } => {
                let call_id = tool_use_id.as_ref().or(id.as_ref());
                let is_skill = call_id.map(|c| skill_ids.contains(c)).unwrap_or(false)
                    || skill::is_potential_skill_result(content.as_ref());
                if is_skill {
                    // skill 结果分流，不产出 function_call_output
                    if let Some(record) = skill::extract_skill(content.as_ref()) {
                        history.skills.push(record);
                    }
                    continue;
                }
                flush_parts(role, &mut parts, &mut history.items);
                history.items.push(InputItem::FunctionCallOutput {
                    call_id: call_id.cloned().unwrap_or_else(generated_call_id),
                    output: flatten_tool_result(content.as_ref()),
                });
            }
            ContentBlock::Other(value) => {
                parts.push(ContentPart::text_for_role(role, value.to_string()));
            }
        }
    }

    flush_parts(role, &mut parts, &mut history.items);
}

/// 图片仅对 user 角色以原生图片部件转发，其余角色降级为文本
fn push_image_part(
    role: &str,
    resolved: Option<String>,
    raw_block: Option<Value>,
    parts: &mut Vec<ContentPart>,
) {
    match resolved {
        Some(url) if role == "user" => parts.push(ContentPart::image(url)),
        Some(url) => parts.push(ContentPart::text_for_role(role, url)),
        None => {
            let dump = raw_block
                .map(|v| v.to_string())
                .unwrap_or_else(|| "[image]".to_string());
            parts.push(ContentPart::text_for_role(role, dump));
        }
    }
}

fn flush_parts(role: &str, parts: &mut Vec<ContentPart>, items: &mut Vec<InputItem>) {
    if parts.is_empty() {
        return;
    }
    items.push(InputItem::Message {
        role: role.to_string(),
        content: std::mem::take(parts),
    });
}

fn generated_call_id() -> String {
    format!("call_{}", Uuid::new_v4().simple())
}

/// 按约定优先级解析图片地址
///
/// 依次尝试：image_url（字符串或对象的 url/uri）、顶层 url、
/// source.url / source.uri、source.type=="url"，最后是 base64 数据
/// （source.data 存在即认，按 media_type 合成 data: URI，已经是
/// data: URI 的原样返回）。全部落空返回 None。
pub fn resolve_image_url(
    image_url: Option<&ImageUrlValue>,
    url: Option<&str>,
    source: Option<&ImageSource>,
) -> Option<String> {
    if let Some(value) = image_url {
        let resolved = value.as_url();
        if !resolved.is_empty() {
            return Some(resolved.to_string());
        }
    }
    if let Some(url) = url {
        if !url.is_empty() {
            return Some(url.to_string());
        }
    }

    let source = source?;
    for candidate in [source.url.as_deref(), source.uri.as_deref()] {
        if let Some(u) = candidate {
            if !u.is_empty() {
                return Some(u.to_string());
            }
        }
    }

    if source.source_type.as_deref() != Some("base64") && source.data.is_none() {
        return None;
    }
    let data = source.data.as_deref()?;
    if data.starts_with("data:") {
        return Some(data.to_string());
    }
    let media_type = source
        .media_type
        .as_deref()
        .or(source.mime_type.as_deref())
        .unwrap_or("image/png");
    Some(format!("data:{media_type};base64,{data}"))
}

/// 文档块降级为一行摘要，原始字节永不转发
pub fn summarize_document(source: Option<&Value>, name: Option<&str>) -> String {
    let mut fields = Vec::new();
    if let Some(name) = name {
        fields.push(format!("name={name}"));
    }
    if let Some(source) = source {
        if let Some(kind) = source.get("type").and_then(|v| v.as_str()) {
            fields.push(format!("source={kind}"));
        }
        let media = source
            .get("media_type")
            .or_else(|| source.get("mediaType"))
            .or_else(|| source.get("mime_type"))
            .and_then(|v| v.as_str());
        if let Some(media) = media {
            fields.push(format!("media={media}"));
        }
        if let Some(data) = source.get("data").and_then(|v| v.as_str()) {
            fields.push(format!("base64_len={}", data.len()));
        }
    }
    if fields.is_empty() {
        "[document omitted]".to_string()
    } else {
        format!("[document omitted: {}]", fields.join(" "))
    }
}

/// tool_result 内容拍平为纯文本输出
///
/// 字符串原样；数组逐块处理后换行连接；单个对象按一个块处理；
/// 其他类型整体序列化。
pub fn flatten_tool_result(content: Option<&Value>) -> String {
    match content {
        None => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(arr)) => arr
            .iter()
            .map(flatten_result_block)
            .collect::<Vec<_>>()
            .join("\n"),
        Some(obj @ Value::Object(_)) => flatten_result_block(obj),
        Some(other) => other.to_string(),
    }
}

/// 单个结果块：文本取 text，图片换占位符，文档换摘要，其余序列化为 JSON
fn flatten_result_block(item: &Value) -> String {
    match item {
        Value::String(s) => s.clone(),
        Value::Object(obj) => {
            let block_type = obj.get("type").and_then(|t| t.as_str()).unwrap_or("");
            match block_type {
                "text" => obj
                    .get("text")
                    .and_then(|t| t.as_str())
                    .unwrap_or("")
                    .to_string(),
                "image" | "image_url" | "input_image" => "[image]".to_string(),
                "document" => summarize_document(
                    obj.get("source"),
                    obj.get("name").and_then(|n| n.as_str()),
                ),
                _ => item.to_string(),
            }
        }
        other => other.to_string(),
    }
}

/// 从用户消息里猜测工作目录
///
/// 取第一个以 `/` 开头、长度大于 1 的空白分隔 token。只影响注入的
/// 环境上下文文本，不影响规范化本身。
pub fn extract_cwd(messages: &[Message]) -> Option<String> {
    for message in messages {
        if message.role != "user" {
            continue;
        }
        let text = match &message.content {
            Some(MessageContent::Text(s)) => s.clone(),
            Some(MessageContent::Blocks(blocks)) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
            None => continue,
        };
        if let Some(caps) = PATH_TOKEN_RE.captures(&text) {
            let token = caps[1].to_string();
            if token.len() > 1 {
                return Some(token);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message(role: &str, content: Value) -> Message {
        serde_json::from_value(json!({"role": role, "content": content})).unwrap()
    }

    #[test]
    fn test_string_content_single_message_item() {
        let history = normalize_messages(&[message("user", json!("hello"))]);
        assert_eq!(history.items.len(), 1);
        match &history.items[0] {
            InputItem::Message { role, content } => {
                assert_eq!(role, "user");
                assert_eq!(content, &vec![ContentPart::InputText { text: "hello".into() }]);
            }
            other => panic!("expected message item, got {:?}", other),
        }
    }

    #[test]
    fn test_text_and_image_share_one_message_item() {
        let history = normalize_messages(&[message(
            "user",
            json!([
                {"type": "text", "text": "look at this"},
                {"type": "image", "source": {"type": "base64", "media_type": "image/jpeg", "data": "Zm9v"}}
            ]),
        )]);
        assert_eq!(history.items.len(), 1);
        let InputItem::Message { content, .. } = &history.items[0] else {
            panic!("expected message item");
        };
        assert_eq!(content.len(), 2);
        assert_eq!(
            content[1],
            ContentPart::image("data:image/jpeg;base64,Zm9v")
        );
    }

    #[test]
    fn test_tool_use_splits_accumulation_group() {
        let history = normalize_messages(&[message(
            "assistant",
            json!([
                {"type": "text", "text": "before"},
                {"type": "tool_use", "id": "call_1", "name": "Read", "input": {"path": "/a"}},
                {"type": "text", "text": "after"}
            ]),
        )]);
        assert_eq!(history.items.len(), 3);
        assert!(matches!(&history.items[0], InputItem::Message { .. }));
        match &history.items[1] {
            InputItem::FunctionCall { call_id, name, arguments } => {
                assert_eq!(call_id, "call_1");
                assert_eq!(name, "Read");
                assert_eq!(arguments, "{\"path\":\"/a\"}");
            }
            other => panic!("expected function_call, got {:?}", other),
        }
        assert!(matches!(&history.items[2], InputItem::Message { .. }));
    }

    #[test]
    fn test_tool_result_flattening() {
        let history = normalize_messages(&[message(
            "user",
            json!([{
                "type": "tool_result",
                "tool_use_id": "call_9",
                "content": [
                    {"type": "text", "text": "line one"},
                    {"type": "image", "source": {"data": "xx"}},
                    {"type": "custom", "k": 1}
                ]
            }]),
        )]);
        match &history.items[0] {
            InputItem::FunctionCallOutput { call_id, output } => {
                assert_eq!(call_id, "call_9");
                assert!(output.starts_with("line one\n[image]\n"));
                assert!(output.contains("\"custom\""));
            }
            other => panic!("expected function_call_output, got {:?}", other),
        }
    }

    #[test]
    fn test_skill_pair_diverted() {
        let history = normalize_messages(&[
            message(
                "assistant",
                json!([{"type": "tool_use", "id": "sk_1", "name": "Skill", "input": {"command": "review"}}]),
            ),
            message(
                "user",
                json!([{
                    "type": "tool_result",
                    "tool_use_id": "sk_1",
                    "content": "<command-name>/review</command-name>\nBase Path: /tmp\nReview carefully."
                }]),
            ),
        ]);
        // 两个块都不进 input，skill 被提取
        assert!(history.items.is_empty());
        assert_eq!(history.skills.len(), 1);
        assert_eq!(history.skills[0].name, "review");
    }

    #[test]
    fn test_orphan_skill_result_detected_by_markers() {
        let history = normalize_messages(&[message(
            "user",
            json!([{
                "type": "tool_result",
                "tool_use_id": "call_unknown",
                "content": "<command-name>deploy</command-name>\nShip it."
            }]),
        )]);
        assert!(history.items.is_empty());
        assert_eq!(history.skills[0].name, "deploy");
    }

    #[test]
    fn test_non_user_image_degrades_to_text() {
        let history = normalize_messages(&[message(
            "assistant",
            json!([{"type": "image_url", "image_url": {"url": "https://x/y.png"}}]),
        )]);
        let InputItem::Message { content, .. } = &history.items[0] else {
            panic!("expected message item");
        };
        assert_eq!(
            content[0],
            ContentPart::OutputText { text: "https://x/y.png".into() }
        );
    }

    #[test]
    fn test_document_summarized() {
        let history = normalize_messages(&[message(
            "user",
            json!([{
                "type": "document",
                "name": "report.pdf",
                "source": {"type": "base64", "media_type": "application/pdf", "data": "QUJD"}
            }]),
        )]);
        let InputItem::Message { content, .. } = &history.items[0] else {
            panic!("expected message item");
        };
        assert_eq!(
            content[0],
            ContentPart::InputText {
                text: "[document omitted: name=report.pdf source=base64 media=application/pdf base64_len=4]".into()
            }
        );
    }

    #[test]
    fn test_document_without_fields_summarized_bare() {
        assert_eq!(summarize_document(None, None), "[document omitted]");

        let history = normalize_messages(&[message("user", json!([{"type": "document"}]))]);
        let InputItem::Message { content, .. } = &history.items[0] else {
            panic!("expected message item");
        };
        assert_eq!(
            content[0],
            ContentPart::InputText { text: "[document omitted]".into() }
        );
    }

    #[test]
    fn test_string_tool_use_input_not_double_encoded() {
        let history = normalize_messages(&[message(
            "assistant",
            json!([{"type": "tool_use", "id": "c1", "name": "Bash", "input": "{\"cmd\":\"ls\"}"}]),
        )]);
        match &history.items[0] {
            InputItem::FunctionCall { arguments, .. } => {
                assert_eq!(arguments, "{\"cmd\":\"ls\"}");
            }
            other => panic!("expected function_call, got {:?}", other),
        }
    }

    #[test]
    fn test_single_object_tool_result_content_flattened() {
        assert_eq!(
            flatten_tool_result(Some(&json!({"type": "text", "text": "one"}))),
            "one"
        );
        assert_eq!(
            flatten_tool_result(Some(&json!({"type": "image", "source": {"data": "x"}}))),
            "[image]"
        );
    }

    #[test]
    fn test_unresolvable_image_url_degrades_to_raw_dump() {
        let history = normalize_messages(&[message(
            "user",
            json!([{"type": "image_url", "image_url": {"weird": true}}]),
        )]);
        let InputItem::Message { content, .. } = &history.items[0] else {
            panic!("expected message item");
        };
        let ContentPart::InputText { text } = &content[0] else {
            panic!("expected text part, got {:?}", content[0]);
        };
        // 降级为整个块的 JSON 文本，而不是占位符
        assert!(text.contains("\"image_url\""));
        assert!(text.contains("\"weird\""));
    }

    #[test]
    fn test_unknown_block_degrades_to_json_dump() {
        let history = normalize_messages(&[message(
            "user",
            json!([{"type": "thinking", "thinking": "hmm"}]),
        )]);
        let InputItem::Message { content, .. } = &history.items[0] else {
            panic!("expected message item");
        };
        let ContentPart::InputText { text } = &content[0] else {
            panic!("expected text part");
        };
        assert!(text.contains("thinking"));
    }

    #[test]
    fn test_system_role_messages_dropped() {
        let history = normalize_messages(&[
            message("system", json!("you are helpful")),
            message("user", json!("hi")),
        ]);
        assert_eq!(history.items.len(), 1);
    }

    fn image_source(value: Value) -> ImageSource {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_image_resolution_precedence() {
        // image_url 字符串优先于 source
        let url = resolve_image_url(
            Some(&ImageUrlValue::Str("https://a/b.png".into())),
            None,
            Some(&image_source(json!({"url": "https://c/d.png"}))),
        );
        assert_eq!(url.as_deref(), Some("https://a/b.png"));

        // source.uri
        let url = resolve_image_url(
            None,
            None,
            Some(&image_source(json!({"uri": "https://e/f.png"}))),
        );
        assert_eq!(url.as_deref(), Some("https://e/f.png"));

        // base64 合成 data URI，缺 media_type 时补 image/png
        let url = resolve_image_url(None, None, Some(&image_source(json!({"data": "QUJD"}))));
        assert_eq!(url.as_deref(), Some("data:image/png;base64,QUJD"));

        // 已是 data URI 的不重复包装
        let url = resolve_image_url(
            None,
            None,
            Some(&image_source(json!({"data": "data:image/gif;base64,R0lG"}))),
        );
        assert_eq!(url.as_deref(), Some("data:image/gif;base64,R0lG"));

        assert!(
            resolve_image_url(None, None, Some(&image_source(json!({"type": "base64"})))).is_none()
        );
    }

    #[test]
    fn test_cwd_extracted_from_first_path_token() {
        let messages = vec![
            message("assistant", json!("in /not/this/one")),
            message("user", json!("work inside /home/user/project please")),
        ];
        assert_eq!(extract_cwd(&messages).as_deref(), Some("/home/user/project"));
        assert_eq!(extract_cwd(&[message("user", json!("no paths here"))]), None);
    }
}
