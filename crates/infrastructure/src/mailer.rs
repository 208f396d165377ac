use application::{MailError, MailSender, OutgoingMail};
use async_trait::async_trait;

/// 把邮件写入日志而不真正投递
///
/// 未接入邮件服务时使用，验证码会出现在 `info` 级别日志中。
#[derive(Debug, Default, Clone)]
pub struct LogMailSender;

#[async_trait]
impl MailSender for LogMailSender {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        tracing::info!(
            to = %mail.to,
            subject = %mail.subject,
            body = %mail.body,
            "outgoing mail"
        );
        Ok(())
    }
}
