//! 领域模型错误定义
//!
//! 每个业务错误都携带面向用户的提示文本，并通过 [`ErrorKind`] 归类，
//! 便于边界层统一转换为响应。

use thiserror::Error;

/// 业务错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    PermissionDenied,
    NotFound,
    Conflict,
    RateLimited,
    State,
    Auth,
}

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// 输入格式或取值范围错误
    #[error("{message}")]
    ValidationError { field: String, message: String },

    /// 消息内容为空
    #[error("消息内容不能为空")]
    EmptyContent,

    /// 权限错误
    #[error("{action}")]
    PermissionDenied { action: String },

    /// 资源不存在错误
    #[error("{resource_type}不存在")]
    ResourceNotFound {
        resource_type: String,
        resource_id: String,
    },

    #[error("用户名已被使用")]
    DuplicateUsername,

    #[error("该邮箱已被注册")]
    DuplicateEmail,

    #[error("该邮箱已被禁止注册")]
    EmailBlacklisted,

    /// 账号处于禁言期
    #[error("您已被禁言，剩余 {remaining_minutes} 分钟")]
    Muted { remaining_minutes: i64 },

    /// 当前实体状态不允许该操作
    #[error("{message}")]
    InvalidState { message: String },

    #[error("注册功能已关闭")]
    RegistrationClosed,

    #[error("{message}")]
    RateLimited {
        message: String,
        retry_after_secs: u64,
    },

    #[error("验证码错误或已过期")]
    CodeInvalidOrExpired,

    #[error("邮箱或密码错误")]
    InvalidCredentials,

    #[error("账号已被封禁")]
    AccountBanned,

    #[error("账号审核中，请等待管理员审核")]
    AccountPending,

    #[error("未登录或会话已失效")]
    Unauthenticated,
}

impl DomainError {
    /// 创建验证错误
    pub fn validation_error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }

    /// 创建权限错误
    pub fn permission_denied(action: impl Into<String>) -> Self {
        Self::PermissionDenied {
            action: action.into(),
        }
    }

    /// 创建资源不存在错误
    pub fn resource_not_found(
        resource_type: impl Into<String>,
        resource_id: impl ToString,
    ) -> Self {
        Self::ResourceNotFound {
            resource_type: resource_type.into(),
            resource_id: resource_id.to_string(),
        }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    pub fn rate_limited(message: impl Into<String>, retry_after_secs: u64) -> Self {
        Self::RateLimited {
            message: message.into(),
            retry_after_secs,
        }
    }

    /// 错误所属的分类
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ValidationError { .. } | Self::EmptyContent => ErrorKind::Validation,
            Self::PermissionDenied { .. } | Self::Muted { .. } => ErrorKind::PermissionDenied,
            Self::ResourceNotFound { .. } => ErrorKind::NotFound,
            Self::DuplicateUsername | Self::DuplicateEmail | Self::EmailBlacklisted => {
                ErrorKind::Conflict
            }
            Self::InvalidState { .. } | Self::RegistrationClosed => ErrorKind::State,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::CodeInvalidOrExpired => ErrorKind::Validation,
            Self::InvalidCredentials
            | Self::AccountBanned
            | Self::AccountPending
            | Self::Unauthenticated => ErrorKind::Auth,
        }
    }

    /// 稳定的机器可读错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::ValidationError { .. } => "VALIDATION_ERROR",
            Self::EmptyContent => "EMPTY_CONTENT",
            Self::PermissionDenied { .. } => "PERMISSION_DENIED",
            Self::ResourceNotFound { .. } => "NOT_FOUND",
            Self::DuplicateUsername => "DUPLICATE_USERNAME",
            Self::DuplicateEmail => "DUPLICATE_EMAIL",
            Self::EmailBlacklisted => "EMAIL_BLACKLISTED",
            Self::Muted { .. } => "MUTED",
            Self::InvalidState { .. } => "INVALID_STATE",
            Self::RegistrationClosed => "REGISTRATION_CLOSED",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::CodeInvalidOrExpired => "CODE_INVALID_OR_EXPIRED",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::AccountBanned => "ACCOUNT_BANNED",
            Self::AccountPending => "ACCOUNT_PENDING",
            Self::Unauthenticated => "UNAUTHENTICATED",
        }
    }
}

/// 领域模型结果类型
pub type DomainResult<T> = Result<T, DomainError>;

/// 存储层错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RepositoryError {
    #[error("record not found")]
    NotFound,
    /// 唯一索引冲突，`field` 为冲突的字段名
    #[error("unique constraint violated on {field}")]
    Conflict { field: String },
    #[error("storage failure: {message}")]
    Storage { message: String },
}

impl RepositoryError {
    pub fn conflict(field: impl Into<String>) -> Self {
        Self::Conflict {
            field: field.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn muted_message_carries_remaining_minutes() {
        let err = DomainError::Muted {
            remaining_minutes: 12,
        };
        assert_eq!(err.to_string(), "您已被禁言，剩余 12 分钟");
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    }

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(DomainError::DuplicateEmail.kind(), ErrorKind::Conflict);
        assert_eq!(DomainError::AccountPending.kind(), ErrorKind::Auth);
        assert_eq!(
            DomainError::invalid_state("x").kind(),
            ErrorKind::State
        );
        assert_eq!(
            DomainError::rate_limited("wait", 30).kind(),
            ErrorKind::RateLimited
        );
    }
}
