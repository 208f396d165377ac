//! 群聊系统核心领域模型
//!
//! 包含账号、消息、系统设置等核心实体，以及权限矩阵、提及解析等纯业务规则。

pub mod business_rules;
pub mod entities;
pub mod errors;
pub mod events;
pub mod mention;
pub mod value_objects;

// 重新导出常用类型
pub use business_rules::*;
pub use entities::*;
pub use errors::*;
pub use events::*;
pub use mention::{extract_mentions, mentions_user, MentionCandidate};
pub use value_objects::*;
