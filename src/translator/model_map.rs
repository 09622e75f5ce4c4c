//! 模型名解析与 reasoning effort 映射
//!
//! Claude 系模型名（claude/sonnet/opus/haiku）一律换成配置的默认 Codex
//! 模型；其余名字先透传，最后用支持集合兜底。整个解析链是全函数，
//! 永远不报错、永远给出一个受支持的模型。

use serde::{Deserialize, Serialize};

use crate::config::GatewayConfig;

/// Claude 系模型名的特征子串
const CLAUDE_FAMILY_MARKERS: &[&str] = &["claude", "sonnet", "opus", "haiku"];

/// 解析客户端请求的模型名为受支持的 Codex 模型
///
/// 1. 命中 Claude 系命名 → 直接换成默认模型（改名优先于透传）
/// 2. 否则有请求值就透传；没有则先看请求模板里的模型，再用默认模型
/// 3. 结果不在支持集合里 → 回落到默认模型
pub fn resolve_model(requested: Option<&str>, config: &GatewayConfig) -> String {
    let candidate = match requested {
        Some(model) if is_claude_family(model) => {
            tracing::debug!(
                "[MODEL] Auto-converting model: {} -> {}",
                model,
                config.default_model
            );
            config.default_model.clone()
        }
        Some(model) => model.to_string(),
        None if !config.template.model.is_empty() => config.template.model.clone(),
        None => config.default_model.clone(),
    };

    if config.is_supported_model(&candidate) {
        candidate
    } else {
        tracing::debug!(
            "[MODEL] Unsupported model: {}, falling back to {}",
            candidate,
            config.default_model
        );
        config.default_model.clone()
    }
}

fn is_claude_family(model: &str) -> bool {
    let lower = model.to_lowercase();
    CLAUDE_FAMILY_MARKERS.iter().any(|m| lower.contains(m))
}

/// reasoning effort 档位
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Xhigh,
    High,
    #[default]
    Medium,
    Low,
}

impl ReasoningEffort {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasoningEffort::Xhigh => "xhigh",
            ReasoningEffort::High => "high",
            ReasoningEffort::Medium => "medium",
            ReasoningEffort::Low => "low",
        }
    }

}

/// 按 Claude 模型家族配置 reasoning effort
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ReasoningEffortMapping {
    #[serde(default = "default_opus")]
    pub opus: ReasoningEffort,
    #[serde(default = "default_sonnet")]
    pub sonnet: ReasoningEffort,
    #[serde(default = "default_haiku")]
    pub haiku: ReasoningEffort,
}

fn default_opus() -> ReasoningEffort {
    ReasoningEffort::Xhigh
}
fn default_sonnet() -> ReasoningEffort {
    ReasoningEffort::Medium
}
fn default_haiku() -> ReasoningEffort {
    ReasoningEffort::Low
}

impl Default for ReasoningEffortMapping {
    fn default() -> Self {
        Self {
            opus: default_opus(),
            sonnet: default_sonnet(),
            haiku: default_haiku(),
        }
    }
}

/// 按请求的模型名（家族子串）取 reasoning effort
pub fn reasoning_effort_for(model: &str, mapping: &ReasoningEffortMapping) -> ReasoningEffort {
    let lower = model.to_lowercase();
    if lower.contains("opus") {
        mapping.opus
    } else if lower.contains("sonnet") {
        mapping.sonnet
    } else if lower.contains("haiku") {
        mapping.haiku
    } else {
        ReasoningEffort::Medium
    }
}
