//! 网关配置
//!
//! 启动时加载一次，之后只读。请求模板（前导项、instructions、include
//! 列表）来自可选的 `codex-template.json`，缺失时退回编译期默认值。
//! 前导项必须与后端期望的首个 input 条目逐字节一致，因此加载后原样
//! 保存为 `Value`，构建请求时直接克隆，不做任何改写。

use std::path::Path;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::translator::model_map::ReasoningEffortMapping;

/// 默认后端地址
pub const DEFAULT_TARGET_URL: &str =
    "https://api.aicodemirror.com/api/codex/backend-api/codex/responses";

/// 默认监听地址
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8889";

/// 默认 Codex 模型
pub const DEFAULT_MODEL: &str = "gpt-5.3-codex";

/// 支持的 Codex 模型集合
pub const SUPPORTED_MODELS: &[&str] = &["gpt-5.2-codex", "gpt-5.3-codex"];

fn default_instructions() -> String {
    "You are Codex, a coding agent. Follow the user's instructions precisely, \
     prefer small verifiable steps, and use the provided tools when a task \
     requires reading files or running commands."
        .to_string()
}

fn default_preamble() -> Value {
    json!({
        "type": "message",
        "role": "user",
        "content": [{
            "type": "input_text",
            "text": "# AGENTS.md instructions for /workspace\n\n<INSTRUCTIONS>\n---\nname: engineer-professional\ndescription: senior software engineer\n---\n</INSTRUCTIONS>"
        }]
    })
}

fn default_include() -> Vec<String> {
    vec!["reasoning.encrypted_content".to_string()]
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_supported_models() -> Vec<String> {
    SUPPORTED_MODELS.iter().map(|s| s.to_string()).collect()
}

fn default_listen_addr() -> String {
    DEFAULT_LISTEN_ADDR.to_string()
}

fn default_target_url() -> String {
    DEFAULT_TARGET_URL.to_string()
}

/// 后端请求模板
///
/// 对应外部协作方约定的 `codex-template.json`：前导 input 条目、
/// instructions 全文与 include 指令列表。
#[derive(Debug, Clone, Deserialize)]
pub struct RequestTemplate {
    /// 必需的首个 input 条目，逐字节转发
    #[serde(default = "default_preamble")]
    pub preamble: Value,
    /// instructions 字段全文（必须与模板完全一致）
    #[serde(default = "default_instructions")]
    pub instructions: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_include")]
    pub include: Vec<String>,
}

impl Default for RequestTemplate {
    fn default() -> Self {
        Self {
            preamble: default_preamble(),
            instructions: default_instructions(),
            model: default_model(),
            include: default_include(),
        }
    }
}

impl RequestTemplate {
    /// 从模板文件加载；文件不存在或不可解析时退回默认值
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<RequestTemplate>(&content) {
                Ok(template) => {
                    tracing::info!("[CONFIG] Loaded request template from {}", path.display());
                    template
                }
                Err(e) => {
                    tracing::warn!(
                        "[CONFIG] Failed to parse template {}: {}, using defaults",
                        path.display(),
                        e
                    );
                    Self::default()
                }
            },
            Err(_) => {
                tracing::debug!(
                    "[CONFIG] No template file at {}, using defaults",
                    path.display()
                );
                Self::default()
            }
        }
    }
}

/// 网关配置（启动时构建，之后不可变）
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_target_url")]
    pub target_url: String,
    #[serde(default)]
    pub template: RequestTemplate,
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default = "default_supported_models")]
    pub supported_models: Vec<String>,
    #[serde(default)]
    pub reasoning: ReasoningEffortMapping,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            target_url: default_target_url(),
            template: RequestTemplate::default(),
            default_model: default_model(),
            supported_models: default_supported_models(),
            reasoning: ReasoningEffortMapping::default(),
        }
    }
}

impl GatewayConfig {
    /// 从配置文件加载，文件缺失时全部使用默认值
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<GatewayConfig>(&content) {
                Ok(config) => {
                    tracing::info!("[CONFIG] Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!(
                        "[CONFIG] Failed to parse config {}: {}, using defaults",
                        path.display(),
                        e
                    );
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    pub fn is_supported_model(&self, model: &str) -> bool {
        self.supported_models.iter().any(|m| m == model)
    }
}
