//! 聊天相关的领域事件
//!
//! 事件在领域状态提交后产生，由实时广播中心推送给在线会话。
//! 线上格式为 `{"event": <类型>, "data": {...}}`。

use serde::{Deserialize, Serialize};

use crate::entities::message::MessageView;
use crate::entities::user::Role;
use crate::value_objects::{Timestamp, UserId};

/// 聊天相关的领域事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ChatEvent {
    /// 新消息
    NewMessage(MessageView),

    /// 消息被撤回，携带撤回后的完整消息
    MessageRecalled(MessageView),

    /// 用户被封禁（账号已删除）
    UserBanned { user_id: UserId },

    /// 用户账号被删除
    UserDeleted { user_id: UserId },

    /// 角色变更
    RoleChanged {
        user_id: UserId,
        old_role: Role,
        new_role: Role,
    },

    /// 显示名称变更
    DisplayNameChanged {
        user_id: UserId,
        old_display_name: Option<String>,
        new_display_name: Option<String>,
    },

    /// 禁言状态变更，`muted_until` 为空表示解除禁言
    MuteChanged {
        user_id: UserId,
        muted_until: Option<Timestamp>,
    },
}

impl ChatEvent {
    pub fn new_message(message: MessageView) -> Self {
        ChatEvent::NewMessage(message)
    }

    pub fn message_recalled(message: MessageView) -> Self {
        ChatEvent::MessageRecalled(message)
    }

    pub fn user_banned(user_id: UserId) -> Self {
        ChatEvent::UserBanned { user_id }
    }

    pub fn user_deleted(user_id: UserId) -> Self {
        ChatEvent::UserDeleted { user_id }
    }

    pub fn role_changed(user_id: UserId, old_role: Role, new_role: Role) -> Self {
        ChatEvent::RoleChanged {
            user_id,
            old_role,
            new_role,
        }
    }

    pub fn display_name_changed(
        user_id: UserId,
        old_display_name: Option<String>,
        new_display_name: Option<String>,
    ) -> Self {
        ChatEvent::DisplayNameChanged {
            user_id,
            old_display_name,
            new_display_name,
        }
    }

    pub fn mute_changed(user_id: UserId, muted_until: Option<Timestamp>) -> Self {
        ChatEvent::MuteChanged {
            user_id,
            muted_until,
        }
    }

    /// 获取事件类型字符串
    pub fn event_type(&self) -> &'static str {
        match self {
            ChatEvent::NewMessage(_) => "new_message",
            ChatEvent::MessageRecalled(_) => "message_recalled",
            ChatEvent::UserBanned { .. } => "user_banned",
            ChatEvent::UserDeleted { .. } => "user_deleted",
            ChatEvent::RoleChanged { .. } => "role_changed",
            ChatEvent::DisplayNameChanged { .. } => "display_name_changed",
            ChatEvent::MuteChanged { .. } => "mute_changed",
        }
    }

    /// 收到该事件后必须强制下线的用户
    pub fn terminated_user(&self) -> Option<UserId> {
        match self {
            ChatEvent::UserBanned { user_id } | ChatEvent::UserDeleted { user_id } => {
                Some(*user_id)
            }
            _ => None,
        }
    }

    /// 是否包含按查看者角色裁剪的字段
    pub fn is_role_sensitive(&self) -> bool {
        matches!(self, ChatEvent::MessageRecalled(message) if message.original_content.is_some())
    }

    /// 按接收者角色裁剪事件内容
    pub fn for_viewer(&self, viewer: Role) -> ChatEvent {
        match self {
            ChatEvent::MessageRecalled(message) => {
                ChatEvent::MessageRecalled(message.clone().for_viewer(viewer))
            }
            other => other.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_shape_is_event_and_data() {
        let user_id = UserId::generate();
        let event = ChatEvent::role_changed(user_id, Role::Member, Role::DeputyAdmin);
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({
                "event": "role_changed",
                "data": {
                    "user_id": user_id.to_string(),
                    "old_role": "Member",
                    "new_role": "DeputyAdmin"
                }
            })
        );
        assert_eq!(value["event"], event.event_type());
    }

    #[test]
    fn ban_and_delete_terminate_target() {
        let user_id = UserId::generate();
        assert_eq!(ChatEvent::user_banned(user_id).terminated_user(), Some(user_id));
        assert_eq!(ChatEvent::user_deleted(user_id).terminated_user(), Some(user_id));
        assert_eq!(ChatEvent::mute_changed(user_id, None).terminated_user(), None);
    }
}
