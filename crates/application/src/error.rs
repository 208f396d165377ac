use domain::{DomainError, ErrorKind, RepositoryError};
use thiserror::Error;

use crate::broadcaster::BroadcastError;
use crate::mailer::MailError;
use crate::password::PasswordHasherError;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
    #[error("repository error: {0}")]
    Repository(RepositoryError),
    #[error("password error: {0}")]
    Password(#[from] PasswordHasherError),
    #[error("broadcast error: {0}")]
    Broadcast(#[from] BroadcastError),
    #[error("mail error: {0}")]
    Mail(#[from] MailError),
}

impl ApplicationError {
    /// 业务错误的分类；基础设施故障返回 `None`
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ApplicationError::Domain(err) => Some(err.kind()),
            _ => None,
        }
    }

    pub fn not_found(resource_type: &str, id: impl ToString) -> Self {
        DomainError::resource_not_found(resource_type, id).into()
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        match value {
            // 唯一索引冲突属于业务错误
            RepositoryError::Conflict { field } if field == "email" => {
                ApplicationError::Domain(DomainError::DuplicateEmail)
            }
            RepositoryError::Conflict { field } if field == "username" => {
                ApplicationError::Domain(DomainError::DuplicateUsername)
            }
            other => ApplicationError::Repository(other),
        }
    }
}
