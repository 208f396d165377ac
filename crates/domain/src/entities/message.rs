//! 消息实体定义
//!
//! 消息日志按到达顺序追加；撤回是唯一允许的修改，且只能从未撤回变为已撤回。

use serde::{Deserialize, Serialize};

use crate::entities::user::{Account, Role};
use crate::errors::{DomainError, DomainResult};
use crate::value_objects::{MessageId, Timestamp, UserId};

/// 单条消息的最大字符数
pub const MESSAGE_MAX_CHARS: usize = 5000;

/// 发送时冻结的作者信息，仅在作者账号不存在时用于展示
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorSnapshot {
    pub username: String,
    pub display_name: Option<String>,
    pub avatar: Option<String>,
    pub role: Role,
}

/// 消息实体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    /// 日志内的全序位置，从 1 开始严格递增
    pub seq: u64,
    pub author_id: UserId,
    pub author: AuthorSnapshot,
    /// 撤回后置空
    pub content: String,
    pub timestamp: Timestamp,
    pub recalled: bool,
    /// 撤回前的原文，仅管理员可见
    pub original_content: Option<String>,
    pub recalled_by: Option<UserId>,
}

impl Message {
    /// 校验消息内容：去除空白后不能为空，且不超过长度上限
    pub fn validate_content(content: &str) -> DomainResult<()> {
        if content.trim().is_empty() {
            return Err(DomainError::EmptyContent);
        }
        if content.chars().count() > MESSAGE_MAX_CHARS {
            return Err(DomainError::validation_error(
                "content",
                format!("消息长度不能超过 {MESSAGE_MAX_CHARS} 个字符"),
            ));
        }
        Ok(())
    }

    pub fn new(
        id: MessageId,
        seq: u64,
        author: &Account,
        content: String,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id,
            seq,
            author_id: author.id,
            author: author.snapshot(),
            content,
            timestamp,
            recalled: false,
            original_content: None,
            recalled_by: None,
        }
    }

    /// 撤回消息；已撤回时返回 `false` 且不做任何修改
    pub fn recall(&mut self, by: UserId) -> bool {
        if self.recalled {
            return false;
        }
        self.recalled = true;
        self.original_content = Some(std::mem::take(&mut self.content));
        self.recalled_by = Some(by);
        true
    }
}

/// 渲染时解析出的作者信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorView {
    pub id: UserId,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar: Option<String>,
    pub role: Role,
    pub muted_until: Option<Timestamp>,
    /// 作者账号已被删除，信息来自发送时的快照
    #[serde(default)]
    pub deleted: bool,
}

impl AuthorView {
    fn resolve(message: &Message, author: Option<&Account>) -> Self {
        match author {
            Some(account) => Self {
                id: account.id,
                username: account.username.as_str().to_owned(),
                display_name: account.display_name.clone(),
                avatar: account.avatar.clone(),
                role: account.role,
                muted_until: account.muted_until,
                deleted: false,
            },
            None => Self {
                id: message.author_id,
                username: message.author.username.clone(),
                display_name: message.author.display_name.clone(),
                avatar: message.author.avatar.clone(),
                role: message.author.role,
                muted_until: None,
                deleted: true,
            },
        }
    }
}

/// 面向客户端的消息视图
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageView {
    pub id: MessageId,
    pub seq: u64,
    pub user_id: UserId,
    pub content: String,
    pub timestamp: Timestamp,
    pub recalled: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub original_content: Option<String>,
    pub user: AuthorView,
}

impl MessageView {
    /// 以完整权限渲染消息（包含撤回原文）
    pub fn render(message: &Message, author: Option<&Account>) -> Self {
        Self {
            id: message.id,
            seq: message.seq,
            user_id: message.author_id,
            content: message.content.clone(),
            timestamp: message.timestamp,
            recalled: message.recalled,
            original_content: message.original_content.clone(),
            user: AuthorView::resolve(message, author),
        }
    }

    /// 按查看者角色裁剪可见字段
    pub fn for_viewer(mut self, viewer: Role) -> Self {
        if !viewer.can_view_recalled_content() {
            self.original_content = None;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::user::{NewAccount, UserStatus};
    use crate::value_objects::{PasswordHash, UserEmail, Username};
    use chrono::Utc;

    fn author() -> Account {
        Account::new(
            UserId::generate(),
            NewAccount {
                username: Username::parse("bob").unwrap(),
                email: UserEmail::parse("bob@example.com").unwrap(),
                password_hash: PasswordHash::new("hash").unwrap(),
                avatar: None,
                display_name: Some("Bobby".into()),
            },
            Role::Member,
            UserStatus::Active,
            Utc::now(),
        )
    }

    #[test]
    fn empty_content_is_rejected() {
        assert_eq!(
            Message::validate_content("   \n\t"),
            Err(DomainError::EmptyContent)
        );
        assert!(Message::validate_content(" hi ").is_ok());
        assert!(Message::validate_content(&"x".repeat(MESSAGE_MAX_CHARS + 1)).is_err());
    }

    #[test]
    fn recall_is_one_way() {
        let author = author();
        let mut message = Message::new(MessageId::generate(), 1, &author, "secret".into(), Utc::now());

        assert!(message.recall(author.id));
        assert!(message.recalled);
        assert!(message.content.is_empty());
        assert_eq!(message.original_content.as_deref(), Some("secret"));

        let before = message.clone();
        assert!(!message.recall(UserId::generate()));
        assert_eq!(message, before);
    }

    #[test]
    fn original_content_only_for_admin_viewers() {
        let author = author();
        let mut message = Message::new(MessageId::generate(), 1, &author, "oops".into(), Utc::now());
        message.recall(author.id);

        let view = MessageView::render(&message, Some(&author));
        assert_eq!(
            view.clone().for_viewer(Role::Admin).original_content.as_deref(),
            Some("oops")
        );
        assert_eq!(view.clone().for_viewer(Role::DeputyAdmin).original_content, None);
        assert_eq!(view.for_viewer(Role::Member).original_content, None);
    }

    #[test]
    fn deleted_author_falls_back_to_snapshot() {
        let author = author();
        let message = Message::new(MessageId::generate(), 1, &author, "hi".into(), Utc::now());

        let view = MessageView::render(&message, None);
        assert!(view.user.deleted);
        assert_eq!(view.user.username, "bob");
        assert_eq!(view.user.display_name.as_deref(), Some("Bobby"));
    }
}
