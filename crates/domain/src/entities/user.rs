//! 账号实体定义
//!
//! 账号是用户目录中的权威记录，包含角色、状态、禁言截止时间等信息。

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::entities::message::AuthorSnapshot;
use crate::value_objects::{PasswordHash, Timestamp, UserEmail, UserId, Username};

/// 最近登录 IP 的保留条数
pub const LAST_IPS_LIMIT: usize = 30;

/// 账号角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Admin,
    DeputyAdmin,
    Member,
}

impl Role {
    /// 是否具备管理权限（管理员或次管理员）
    pub fn is_moderator(self) -> bool {
        matches!(self, Role::Admin | Role::DeputyAdmin)
    }

    /// 是否可以查看已撤回消息的原文
    pub fn can_view_recalled_content(self) -> bool {
        self == Role::Admin
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => write!(f, "Admin"),
            Role::DeputyAdmin => write!(f, "DeputyAdmin"),
            Role::Member => write!(f, "Member"),
        }
    }
}

/// 账号状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UserStatus {
    /// 等待管理员审核
    Pending,
    /// 正常
    Active,
    /// 已封禁
    Banned,
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserStatus::Pending => write!(f, "Pending"),
            UserStatus::Active => write!(f, "Active"),
            UserStatus::Banned => write!(f, "Banned"),
        }
    }
}

/// 创建账号所需的已验证数据
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: Username,
    pub email: UserEmail,
    pub password_hash: PasswordHash,
    pub avatar: Option<String>,
    pub display_name: Option<String>,
}

/// 账号实体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: UserId,
    pub username: Username,
    pub email: UserEmail,
    pub password_hash: PasswordHash,
    pub avatar: Option<String>,
    pub display_name: Option<String>,
    pub role: Role,
    pub status: UserStatus,
    /// 禁言截止时间，位于未来时账号处于禁言状态
    pub muted_until: Option<Timestamp>,
    /// 最近的来源地址，最新的在末尾
    pub last_ips: Vec<String>,
    pub created_at: Timestamp,
}

impl Account {
    pub fn new(
        id: UserId,
        data: NewAccount,
        role: Role,
        status: UserStatus,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            username: data.username,
            email: data.email,
            password_hash: data.password_hash,
            avatar: data.avatar,
            display_name: data.display_name,
            role,
            status,
            muted_until: None,
            last_ips: Vec::new(),
            created_at: now,
        }
    }

    pub fn is_muted(&self, now: Timestamp) -> bool {
        self.muted_until.is_some_and(|until| until > now)
    }

    /// 剩余禁言分钟数（向上取整），未禁言时返回 `None`
    pub fn mute_remaining_minutes(&self, now: Timestamp) -> Option<i64> {
        let until = self.muted_until.filter(|until| *until > now)?;
        let seconds = (until - now).num_seconds();
        Some((seconds + 59) / 60)
    }

    /// 记录来源地址，连续重复的地址只保留一次
    pub fn record_ip(&mut self, ip: &str) {
        if ip.is_empty() || self.last_ips.last().is_some_and(|last| last == ip) {
            return;
        }
        self.last_ips.push(ip.to_owned());
        if self.last_ips.len() > LAST_IPS_LIMIT {
            let overflow = self.last_ips.len() - LAST_IPS_LIMIT;
            self.last_ips.drain(..overflow);
        }
    }

    /// 展示用名称：优先显示名称
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .unwrap_or_else(|| self.username.as_str())
    }

    pub fn snapshot(&self) -> AuthorSnapshot {
        AuthorSnapshot {
            username: self.username.as_str().to_owned(),
            display_name: self.display_name.clone(),
            avatar: self.avatar.clone(),
            role: self.role,
        }
    }
}

/// 对外展示的账号信息（不含密码哈希）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserView {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub avatar: Option<String>,
    pub display_name: Option<String>,
    pub role: Role,
    pub status: UserStatus,
    pub muted_until: Option<Timestamp>,
    pub last_ips: Vec<String>,
    pub created_at: Timestamp,
}

impl From<&Account> for UserView {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            username: account.username.as_str().to_owned(),
            email: account.email.as_str().to_owned(),
            avatar: account.avatar.clone(),
            display_name: account.display_name.clone(),
            role: account.role,
            status: account.status,
            muted_until: account.muted_until,
            last_ips: account.last_ips.clone(),
            created_at: account.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn account() -> Account {
        Account::new(
            UserId::generate(),
            NewAccount {
                username: Username::parse("alice").unwrap(),
                email: UserEmail::parse("alice@example.com").unwrap(),
                password_hash: PasswordHash::new("hash").unwrap(),
                avatar: None,
                display_name: None,
            },
            Role::Member,
            UserStatus::Active,
            Utc::now(),
        )
    }

    #[test]
    fn ip_history_is_bounded() {
        let mut account = account();
        for i in 0..(LAST_IPS_LIMIT + 5) {
            account.record_ip(&format!("10.0.0.{i}"));
        }
        assert_eq!(account.last_ips.len(), LAST_IPS_LIMIT);
        assert_eq!(account.last_ips.first().unwrap(), "10.0.0.5");
        assert_eq!(
            account.last_ips.last().unwrap(),
            &format!("10.0.0.{}", LAST_IPS_LIMIT + 4)
        );
    }

    #[test]
    fn repeated_ip_is_collapsed() {
        let mut account = account();
        account.record_ip("1.1.1.1");
        account.record_ip("1.1.1.1");
        account.record_ip("2.2.2.2");
        account.record_ip("1.1.1.1");
        assert_eq!(account.last_ips, vec!["1.1.1.1", "2.2.2.2", "1.1.1.1"]);
    }

    #[test]
    fn mute_window() {
        let now = Utc::now();
        let mut account = account();
        assert!(!account.is_muted(now));

        account.muted_until = Some(now + Duration::seconds(61));
        assert!(account.is_muted(now));
        assert_eq!(account.mute_remaining_minutes(now), Some(2));

        account.muted_until = Some(now - Duration::seconds(1));
        assert!(!account.is_muted(now));
        assert_eq!(account.mute_remaining_minutes(now), None);
    }

    #[test]
    fn label_prefers_display_name() {
        let mut account = account();
        assert_eq!(account.label(), "alice");
        account.display_name = Some("Alice W".into());
        assert_eq!(account.label(), "Alice W");
    }
}
