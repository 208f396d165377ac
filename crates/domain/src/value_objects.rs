use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{DomainError, DomainResult};

/// 统一的时间戳类型。
pub type Timestamp = DateTime<Utc>;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new(id: Uuid) -> Self {
                Self(id)
            }

            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$name> for Uuid {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

uuid_id!(
    /// 账号唯一标识。
    UserId
);
uuid_id!(
    /// 消息唯一标识。
    MessageId
);
uuid_id!(
    /// 登录会话唯一标识。
    SessionId
);

pub const USERNAME_MAX_CHARS: usize = 32;
pub const DISPLAY_NAME_MAX_CHARS: usize = 32;
pub const PASSWORD_MIN_CHARS: usize = 6;

/// 经过验证的用户名：字母、数字、下划线或连字符。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Username(String);

impl Username {
    pub fn parse(value: impl Into<String>) -> DomainResult<Self> {
        let value = value.into().trim().to_owned();
        if value.is_empty() {
            return Err(DomainError::validation_error("username", "用户名不能为空"));
        }
        if value.chars().count() > USERNAME_MAX_CHARS {
            return Err(DomainError::validation_error(
                "username",
                format!("用户名不能超过 {USERNAME_MAX_CHARS} 个字符"),
            ));
        }
        if !value
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
        {
            return Err(DomainError::validation_error(
                "username",
                "用户名只能包含字母、数字、下划线和连字符",
            ));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 经过验证的邮箱，统一为小写。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserEmail(String);

impl UserEmail {
    /// 等价于 `^[^\s@]+@[^\s@]+\.[^\s@]+$`
    pub fn parse(value: impl Into<String>) -> DomainResult<Self> {
        let value = value.into().trim().to_lowercase();
        let invalid = || DomainError::validation_error("email", "邮箱格式不正确");

        if value.chars().any(char::is_whitespace) {
            return Err(invalid());
        }
        let (local, domain) = value.split_once('@').ok_or_else(invalid)?;
        if local.is_empty() || domain.contains('@') {
            return Err(invalid());
        }
        let inner_dot = domain
            .char_indices()
            .any(|(idx, c)| c == '.' && idx > 0 && idx + 1 < domain.len());
        if !inner_dot {
            return Err(invalid());
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserEmail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 密码哈希值（只保存哈希结果）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PasswordHash(String);

impl PasswordHash {
    pub fn new(value: impl Into<String>) -> DomainResult<Self> {
        let value = value.into();
        if value.is_empty() {
            return Err(DomainError::validation_error(
                "password_hash",
                "密码哈希不能为空",
            ));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// 校验明文密码强度
pub fn validate_password(plaintext: &str) -> DomainResult<()> {
    if plaintext.chars().count() < PASSWORD_MIN_CHARS {
        return Err(DomainError::validation_error(
            "password",
            format!("密码至少需要 {PASSWORD_MIN_CHARS} 个字符"),
        ));
    }
    Ok(())
}

/// 规范化显示名称：去除首尾空白，空串视为清除。
pub fn normalize_display_name(value: Option<String>) -> DomainResult<Option<String>> {
    let Some(value) = value else {
        return Ok(None);
    };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.chars().count() > DISPLAY_NAME_MAX_CHARS {
        return Err(DomainError::validation_error(
            "display_name",
            format!("显示名称不能超过 {DISPLAY_NAME_MAX_CHARS} 个字符"),
        ));
    }
    Ok(Some(trimmed.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_requires_inner_dot_in_domain() {
        assert!(UserEmail::parse("a@b.co").is_ok());
        assert!(UserEmail::parse("a@.co").is_err());
        assert!(UserEmail::parse("a@bco.").is_err());
        assert!(UserEmail::parse("a@b@c.com").is_err());
        assert!(UserEmail::parse("a b@c.com").is_err());
        assert!(UserEmail::parse("@c.com").is_err());
    }

    #[test]
    fn email_is_normalized() {
        let email = UserEmail::parse("  Alice@Example.COM ").unwrap();
        assert_eq!(email.as_str(), "alice@example.com");
    }

    #[test]
    fn username_rejects_symbols() {
        assert!(Username::parse("alice_01").is_ok());
        assert!(Username::parse("张三").is_ok());
        assert!(Username::parse("al ice").is_err());
        assert!(Username::parse("alice@").is_err());
        assert!(Username::parse("   ").is_err());
    }

    #[test]
    fn display_name_blank_clears() {
        assert_eq!(normalize_display_name(Some("  ".into())).unwrap(), None);
        assert_eq!(
            normalize_display_name(Some(" Bob ".into())).unwrap(),
            Some("Bob".to_owned())
        );
        assert!(normalize_display_name(Some("x".repeat(33))).is_err());
    }
}
