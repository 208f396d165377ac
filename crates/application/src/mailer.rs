//! 邮件发送抽象
//!
//! 验证码和审核通知都通过 [`MailSender`] 发出，具体投递方式由基础设施层决定。

use std::sync::Mutex;

use async_trait::async_trait;
use domain::UserEmail;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail delivery failed: {0}")]
    Delivery(String),
}

impl MailError {
    pub fn delivery(message: impl Into<String>) -> Self {
        Self::Delivery(message.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: UserEmail,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError>;
}

/// 只记录不投递的邮件发送器，测试中用来读取验证码
#[derive(Debug, Default)]
pub struct RecordingMailSender {
    outbox: Mutex<Vec<OutgoingMail>>,
}

impl RecordingMailSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.outbox
            .lock()
            .map(|outbox| outbox.clone())
            .unwrap_or_default()
    }

    /// 最近一封发往 `email` 的邮件中的 6 位验证码
    pub fn last_code_for(&self, email: &str) -> Option<String> {
        self.sent()
            .into_iter()
            .rev()
            .find(|mail| mail.to.as_str() == email)
            .and_then(|mail| {
                mail.body
                    .split(|c: char| !c.is_ascii_digit())
                    .find(|token| token.len() == domain::VERIFICATION_CODE_LEN)
                    .map(str::to_owned)
            })
    }
}

#[async_trait]
impl MailSender for RecordingMailSender {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        self.outbox
            .lock()
            .map_err(|_| MailError::delivery("outbox poisoned"))?
            .push(mail);
        Ok(())
    }
}
