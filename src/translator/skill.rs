//! Skill 子协议的提取与注入
//!
//! Claude Code 通过一对 tool_use/tool_result 加载 skill：tool_use 名为
//! `skill`，tool_result 的文本里带 `<command-name>` 标签和 `Base Path:`
//! 行。后端没有这套机制，网关把它改写为注入的上下文消息：tool_use
//! 原地丢弃，tool_result 解析出 skill 名与正文，可选地用本地 SKILL.md
//! 文件内容替换正文，再以 `<skill>` 包裹块的形式插到会话历史之前。
//!
//! 检测基于字面标记，天然脆弱，所以收在 `extract_skill` 这一个窄接口
//! 后面，换启发式不影响其余流水线。

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// `<command-name>/ns:name</command-name>`
static COMMAND_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<command-name>([^<]+)</command-name>").unwrap());

/// `Base Path: /some/where`
static BASE_PATH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"Base Path:\s*([^\n]+)").unwrap());

/// 去除残留标签用
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());

/// 一次请求内提取出的 skill
#[derive(Debug, Clone, PartialEq)]
pub struct SkillRecord {
    /// skill 名（可能带 `ns:name` 命名空间，已去掉前导 `/`）
    pub name: String,
    /// tool_result 里带的原始正文
    pub content: String,
    /// `Base Path:` 行给出的路径提示（仅诊断用）
    pub base_path: Option<String>,
}

/// skill 文件查找接口
///
/// 文件系统扫描属于外部协作方，核心只消费查找结果；测试里用
/// 空实现替掉即可。
pub trait SkillResolver: Send + Sync {
    /// 按 skill 名（可带命名空间）和工作目录提示查找 SKILL.md 路径
    fn resolve(&self, skill_name: &str, cwd: &str) -> Option<PathBuf>;
}

/// 不做任何查找的解析器
#[derive(Debug, Default)]
pub struct NoopSkillResolver;

impl SkillResolver for NoopSkillResolver {
    fn resolve(&self, _skill_name: &str, _cwd: &str) -> Option<PathBuf> {
        None
    }
}

/// 按约定目录查找 SKILL.md 的文件系统实现
///
/// 搜索顺序：`~/.claude/skills`、`~/.codex/skills`，然后是工作目录下的
/// 同名目录。带 `ns:name` 命名空间时额外尝试 `<ns>/<name>` 和
/// `<ns>-<name>` 两种目录布局。
#[derive(Debug, Default)]
pub struct FsSkillResolver {
    /// 额外搜索根（置于默认路径之前，主要供测试注入）
    pub extra_roots: Vec<PathBuf>,
}

impl FsSkillResolver {
    fn search_roots(&self, cwd: &str) -> Vec<PathBuf> {
        let mut roots = self.extra_roots.clone();
        if let Some(home) = dirs::home_dir() {
            roots.push(home.join(".claude").join("skills"));
            roots.push(home.join(".codex").join("skills"));
        }
        if !cwd.is_empty() {
            roots.push(Path::new(cwd).join(".claude").join("skills"));
            roots.push(Path::new(cwd).join(".codex").join("skills"));
        }
        roots
    }
}

impl SkillResolver for FsSkillResolver {
    fn resolve(&self, skill_name: &str, cwd: &str) -> Option<PathBuf> {
        if skill_name.is_empty() {
            return None;
        }

        let (namespace, name) = match skill_name.split_once(':') {
            Some((ns, rest)) => (Some(ns), rest),
            None => (None, skill_name),
        };

        for root in self.search_roots(cwd) {
            let candidates = match namespace {
                Some(ns) => vec![
                    root.join(ns).join(name).join("SKILL.md"),
                    root.join(format!("{ns}-{name}")).join("SKILL.md"),
                ],
                None => vec![root.join(name).join("SKILL.md")],
            };
            for candidate in candidates {
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
        }
        None
    }
}

/// tool_use 块是否是 skill 调用（名字大小写不敏感）
pub fn is_skill_tool_name(name: &str) -> bool {
    name.eq_ignore_ascii_case(super::tools::SKILL_TOOL_NAME)
}

/// tool_result 内容是否疑似 skill 结果
///
/// 没有配对 tool_use 时的兜底判断（历史被截断时仍能识别）：
/// 文本里出现 `<command-name>` 标签或 `Base Path:` 行即算。
pub fn is_potential_skill_result(content: Option<&Value>) -> bool {
    let text = flatten_result_text(content);
    text.contains("<command-name>") || text.contains("Base Path:")
}

/// 从 tool_result 内容里提取 skill
///
/// 名字来自 `<command-name>` 标签（去掉前导 `/`）；正文取
/// `Base Path:` 行之后的第一个换行到结尾，没有 `Base Path:` 时
/// 取去掉已识别标签后的全文。名字和正文任一为空则不可用。
pub fn extract_skill(content: Option<&Value>) -> Option<SkillRecord> {
    let full_text = flatten_result_text(content);
    if full_text.is_empty() {
        return None;
    }

    let name = COMMAND_NAME_RE
        .captures(&full_text)?
        .get(1)?
        .as_str()
        .trim()
        .trim_start_matches('/')
        .to_string();

    let base_path = BASE_PATH_RE
        .captures(&full_text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string());

    let content = if let Some(m) = BASE_PATH_RE.find(&full_text) {
        match full_text[m.end()..].find('\n') {
            Some(idx) => full_text[m.end() + idx + 1..].trim().to_string(),
            None => String::new(),
        }
    } else {
        TAG_RE.replace_all(&full_text, "").trim().to_string()
    };

    if name.is_empty() || content.is_empty() {
        return None;
    }

    Some(SkillRecord {
        name,
        content,
        base_path,
    })
}

/// 渲染注入消息正文
///
/// 解析到本地 SKILL.md 时用文件全文替换提取的正文；查不到路径时
/// 写入字面量 `unknown`，skill 照常注入。
pub fn render_skill(record: &SkillRecord, resolved_path: Option<&Path>) -> String {
    let mut body = record.content.clone();
    let path_text = match resolved_path {
        Some(path) => {
            match std::fs::read_to_string(path) {
                Ok(file_content) if !file_content.trim().is_empty() => body = file_content,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(
                        "[SKILL] Failed to read skill file {}: {}",
                        path.display(),
                        e
                    );
                }
            }
            path.display().to_string()
        }
        None => "unknown".to_string(),
    };

    format!(
        "<skill>\n<name>{}</name>\n<path>{}</path>\n{}\n</skill>",
        record.name, path_text, body
    )
}

/// 把 tool_result 内容里的文本子块拍平成一个字符串
fn flatten_result_text(content: Option<&Value>) -> String {
    match content {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(arr)) => arr
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Object(obj) => obj
                    .get("text")
                    .and_then(|t| t.as_str())
                    .map(|s| s.to_string()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}
