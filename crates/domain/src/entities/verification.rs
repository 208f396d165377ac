//! 邮箱验证码

use serde::{Deserialize, Serialize};

use crate::value_objects::{Timestamp, UserEmail};

/// 验证码位数
pub const VERIFICATION_CODE_LEN: usize = 6;

/// 每个邮箱同一时刻只有一个有效验证码
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationCode {
    pub email: UserEmail,
    pub code: String,
    pub issued_at: Timestamp,
    pub expires_at: Timestamp,
    pub failed_attempts: u32,
}

impl VerificationCode {
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }
}
