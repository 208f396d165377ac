//! 登录会话

use serde::{Deserialize, Serialize};

use crate::value_objects::{SessionId, Timestamp, UserId};

/// 服务端保存的会话记录，可被单独撤销
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    pub created_at: Timestamp,
}

impl Session {
    pub fn new(user_id: UserId, now: Timestamp) -> Self {
        Self {
            id: SessionId::generate(),
            user_id,
            created_at: now,
        }
    }
}
