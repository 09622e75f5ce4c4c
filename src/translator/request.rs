//! 请求转换编排
//!
//! 把一条 Messages 请求组装成后端请求。input 数组的前缀受后端校验，
//! 顺序固定：模板前导项（逐字节转发）→ 系统提示派生的两条上下文消息
//! → 注入的 skill 消息 → 规范化后的会话历史。工具列表、模型解析和
//! reasoning 档位在最后挂上，并为本次请求生成新的会话 id，同时用作
//! prompt_cache_key 和出站连接的关联元数据。
//!
//! 除 skill 文件读取（由注入的 resolver 承担）外这里不做 I/O。

use serde_json::Value;
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::models::{CodexRequest, InputItem, MessagesRequest, Reasoning};
use crate::translator::content::{extract_cwd, normalize_messages};
use crate::translator::model_map::{reasoning_effort_for, resolve_model};
use crate::translator::skill::{render_skill, SkillResolver};
use crate::translator::tools::normalize_tools;

/// 转换产物：后端请求加本次会话 id（网关边界做头部关联用）
#[derive(Debug)]
pub struct TransformOutcome {
    pub request: CodexRequest,
    pub session_id: String,
}

/// 把 Messages 请求转换为后端请求
///
/// `cwd_hint` 缺省时从用户消息里猜测工作目录（第一个路径样 token），
/// 再不行退回网关进程自己的工作目录。工作目录只影响注入的上下文文本。
pub fn transform(
    request: &MessagesRequest,
    config: &GatewayConfig,
    resolver: &dyn SkillResolver,
    cwd_hint: Option<&str>,
) -> TransformOutcome {
    let session_id = Uuid::new_v4().to_string();
    let cwd = cwd_hint
        .map(|s| s.to_string())
        .or_else(|| extract_cwd(&request.messages))
        .or_else(|| {
            std::env::current_dir()
                .ok()
                .map(|p| p.display().to_string())
        })
        .unwrap_or_else(|| "/".to_string());

    let history = normalize_messages(&request.messages);

    // 前导项必须是首个条目，逐字节一致
    let mut input = vec![config.template.preamble.clone()];

    if let Some(system) = &request.system {
        let system_text = system.flatten();
        tracing::debug!("[TRANSFORM] Injecting system context ({} chars)", system_text.len());
        push_user_message(
            &mut input,
            format!(
                "# AGENTS.md instructions for {cwd}\n\n<INSTRUCTIONS>\n{system_text}\n</INSTRUCTIONS>"
            ),
        );
        push_user_message(&mut input, environment_context(&cwd));
    }

    for record in &history.skills {
        let resolved = resolver.resolve(&record.name, &cwd);
        tracing::debug!(
            "[SKILL] Injecting skill '{}' (path: {})",
            record.name,
            resolved
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "unknown".to_string())
        );
        push_user_message(&mut input, render_skill(record, resolved.as_deref()));
    }

    for item in &history.items {
        // InputItem 是纯数据枚举，序列化不会失败
        if let Ok(value) = serde_json::to_value(item) {
            input.push(value);
        }
    }

    let tools = normalize_tools(request.tools.as_ref());
    let model = resolve_model(request.model.as_deref(), config);
    let effort = reasoning_effort_for(request.model.as_deref().unwrap_or(""), &config.reasoning);

    let codex_request = CodexRequest {
        model,
        instructions: config.template.instructions.clone(),
        input,
        tools,
        tool_choice: "auto".to_string(),
        parallel_tool_calls: true,
        reasoning: Reasoning {
            effort: effort.as_str().to_string(),
            summary: "auto".to_string(),
        },
        store: false,
        stream: request.stream,
        include: config.template.include.clone(),
        prompt_cache_key: session_id.clone(),
    };

    TransformOutcome {
        request: codex_request,
        session_id,
    }
}

/// 注入一条纯文本 user 消息（InputItem 是纯数据，序列化不会失败）
fn push_user_message(input: &mut Vec<Value>, text: String) {
    if let Ok(value) = serde_json::to_value(InputItem::user_text(text)) {
        input.push(value);
    }
}

fn environment_context(cwd: &str) -> String {
    let shell = std::env::var("SHELL").unwrap_or_else(|_| "bash".to_string());
    format!(
        "<environment_context>\n  <cwd>{cwd}</cwd>\n  <approval_policy>on-request</approval_policy>\n  <sandbox_mode>workspace-write</sandbox_mode>\n  <network_access>restricted</network_access>\n  <shell>{shell}</shell>\n</environment_context>"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translator::skill::NoopSkillResolver;
    use serde_json::{json, Value};

    fn request(body: Value) -> MessagesRequest {
        serde_json::from_value(body).unwrap()
    }

    fn transform_default(body: Value) -> TransformOutcome {
        transform(
            &request(body),
            &GatewayConfig::default(),
            &NoopSkillResolver,
            Some("/workspace"),
        )
    }

    #[test]
    fn test_preamble_is_verbatim_first_item() {
        let config = GatewayConfig::default();
        let outcome = transform_default(json!({
            "model": "claude-sonnet-4",
            "messages": [{"role": "user", "content": "hi"}]
        }));
        assert_eq!(outcome.request.input[0], config.template.preamble);
    }

    #[test]
    fn test_system_prompt_adds_two_context_messages() {
        let outcome = transform_default(json!({
            "system": "You are a careful reviewer.",
            "messages": [{"role": "user", "content": "hi"}]
        }));
        let instructions = outcome.request.input[1]["content"][0]["text"]
            .as_str()
            .unwrap();
        assert!(instructions.starts_with("# AGENTS.md instructions for /workspace"));
        assert!(instructions.contains("<INSTRUCTIONS>\nYou are a careful reviewer.\n</INSTRUCTIONS>"));

        let env = outcome.request.input[2]["content"][0]["text"].as_str().unwrap();
        assert!(env.starts_with("<environment_context>"));
        assert!(env.contains("<cwd>/workspace</cwd>"));
        assert!(env.contains("<approval_policy>on-request</approval_policy>"));
        assert!(env.contains("<sandbox_mode>workspace-write</sandbox_mode>"));

        // 第 4 项才是会话历史
        assert_eq!(outcome.request.input[3]["type"], "message");
        assert_eq!(outcome.request.input.len(), 4);
    }

    #[test]
    fn test_no_system_prompt_history_follows_preamble() {
        let outcome = transform_default(json!({
            "messages": [{"role": "user", "content": "hi"}]
        }));
        assert_eq!(outcome.request.input.len(), 2);
        assert_eq!(outcome.request.input[1]["content"][0]["text"], "hi");
    }

    #[test]
    fn test_skills_injected_before_history() {
        let outcome = transform_default(json!({
            "system": "sys",
            "messages": [
                {"role": "assistant", "content": [
                    {"type": "tool_use", "id": "sk_1", "name": "skill", "input": {}}
                ]},
                {"role": "user", "content": [{
                    "type": "tool_result",
                    "tool_use_id": "sk_1",
                    "content": "<command-name>review</command-name>\nBase Path: /tmp\nBe thorough."
                }]},
                {"role": "user", "content": "now review my code"}
            ]
        }));
        // 前导项 + 2 条系统上下文 + 1 条 skill + 1 条历史
        assert_eq!(outcome.request.input.len(), 5);
        let skill_text = outcome.request.input[3]["content"][0]["text"].as_str().unwrap();
        assert!(skill_text.starts_with("<skill>\n<name>review</name>\n<path>unknown</path>"));
        assert_eq!(
            outcome.request.input[4]["content"][0]["text"],
            "now review my code"
        );
    }

    #[test]
    fn test_empty_tools_never_substituted() {
        let outcome = transform_default(json!({
            "messages": [{"role": "user", "content": "hi"}],
            "tools": []
        }));
        assert!(outcome.request.tools.is_empty());
    }

    #[test]
    fn test_session_id_doubles_as_prompt_cache_key() {
        let outcome = transform_default(json!({
            "messages": [{"role": "user", "content": "hi"}]
        }));
        assert_eq!(outcome.session_id, outcome.request.prompt_cache_key);
        assert!(!outcome.session_id.is_empty());
    }

    #[test]
    fn test_model_and_reasoning_resolution() {
        let outcome = transform_default(json!({
            "model": "claude-3-opus",
            "messages": [{"role": "user", "content": "hi"}]
        }));
        assert_eq!(outcome.request.model, "gpt-5.3-codex");
        assert_eq!(outcome.request.reasoning.effort, "xhigh");
        assert_eq!(outcome.request.tool_choice, "auto");
        assert!(outcome.request.parallel_tool_calls);
        assert!(!outcome.request.store);
    }

    #[test]
    fn test_stream_flag_propagated() {
        let outcome = transform_default(json!({
            "messages": [{"role": "user", "content": "hi"}],
            "stream": false
        }));
        assert!(!outcome.request.stream);
    }

    #[test]
    fn test_cwd_guessed_from_messages_when_no_hint() {
        let outcome = transform(
            &request(json!({
                "system": "sys",
                "messages": [{"role": "user", "content": "fix the bug in /srv/app/main.rs"}]
            })),
            &GatewayConfig::default(),
            &NoopSkillResolver,
            None,
        );
        let text = outcome.request.input[1]["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("# AGENTS.md instructions for /srv/app/main.rs"));
    }

    #[test]
    fn test_cwd_falls_back_to_process_dir_without_path_token() {
        let outcome = transform(
            &request(json!({
                "system": "sys",
                "messages": [{"role": "user", "content": "no paths mentioned"}]
            })),
            &GatewayConfig::default(),
            &NoopSkillResolver,
            None,
        );
        let process_cwd = std::env::current_dir().unwrap().display().to_string();
        let text = outcome.request.input[1]["content"][0]["text"].as_str().unwrap();
        assert!(text.contains(&format!("# AGENTS.md instructions for {process_cwd}")));
    }
}
