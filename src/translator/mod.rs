//! 请求侧转换层
//!
//! Messages 请求到后端请求的全部无状态转换都在这里。
//!
//! # 架构设计
//!
//! ```text
//! translator/
//! ├── tools.rs       # 工具声明规范化（含保留 skill 工具的过滤）
//! ├── content.rs     # 内容块规范化与会话历史拍平
//! ├── skill.rs       # skill 子协议：检测、提取、查找、渲染
//! ├── model_map.rs   # 模型名解析与 reasoning effort 映射
//! └── request.rs     # 按后端校验的顺序编排最终请求
//! ```
//!
//! 流式响应的反向转换在 [`crate::stream`]。

pub mod content;
pub mod model_map;
pub mod request;
pub mod skill;
pub mod tools;

pub use model_map::{ReasoningEffort, ReasoningEffortMapping};
pub use request::{transform, TransformOutcome};
pub use skill::{FsSkillResolver, NoopSkillResolver, SkillRecord, SkillResolver};
