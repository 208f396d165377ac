//! 系统设置（全局单例）

use serde::{Deserialize, Serialize};

/// 注册相关的全局开关
///
/// `require_approval` 只有在 `registration_open` 为真时才可能为真，
/// 两个字段总是作为一个整体读取和替换。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "SettingsRecord")]
pub struct SystemSettings {
    registration_open: bool,
    require_approval: bool,
}

impl SystemSettings {
    pub fn new(registration_open: bool, require_approval: bool) -> Self {
        Self {
            registration_open,
            require_approval: registration_open && require_approval,
        }
    }

    pub fn registration_open(&self) -> bool {
        self.registration_open
    }

    pub fn require_approval(&self) -> bool {
        self.require_approval
    }
}

#[derive(Deserialize)]
struct SettingsRecord {
    registration_open: bool,
    require_approval: bool,
}

impl From<SettingsRecord> for SystemSettings {
    fn from(record: SettingsRecord) -> Self {
        Self::new(record.registration_open, record.require_approval)
    }
}

impl Default for SystemSettings {
    fn default() -> Self {
        Self::new(true, false)
    }
}
