use std::collections::BTreeSet;

use async_trait::async_trait;
use domain::{
    Account, Message, MessageId, RepositoryError, Session, SessionId, SystemSettings, Timestamp,
    UserEmail, UserId, VerificationCode,
};

#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// 插入新账号；用户名或邮箱冲突时返回 `Conflict`
    async fn create(&self, account: Account) -> Result<Account, RepositoryError>;
    async fn update(&self, account: Account) -> Result<Account, RepositoryError>;
    async fn find_by_id(&self, id: UserId) -> Result<Option<Account>, RepositoryError>;
    async fn find_by_email(&self, email: &UserEmail) -> Result<Option<Account>, RepositoryError>;
    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, RepositoryError>;
    async fn list(&self) -> Result<Vec<Account>, RepositoryError>;
    async fn count(&self) -> Result<usize, RepositoryError>;
    /// 删除账号；`blacklist` 为真时在同一次提交中把邮箱加入黑名单
    async fn remove(&self, id: UserId, blacklist: bool) -> Result<Account, RepositoryError>;
    async fn is_blacklisted(&self, email: &UserEmail) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// 追加消息，`seq` 必须紧接当前最后一条
    async fn append(&self, message: Message) -> Result<Message, RepositoryError>;
    async fn update(&self, message: Message) -> Result<Message, RepositoryError>;
    async fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, RepositoryError>;
    async fn latest(&self) -> Result<Option<Message>, RepositoryError>;
    /// 序号大于 `after_seq` 的消息，升序，最多 `limit` 条
    async fn list_after(
        &self,
        after_seq: u64,
        limit: Option<usize>,
    ) -> Result<Vec<Message>, RepositoryError>;
    /// 最近的 `limit` 条消息，升序
    async fn list_recent(&self, limit: usize) -> Result<Vec<Message>, RepositoryError>;
    async fn list_all(&self) -> Result<Vec<Message>, RepositoryError>;
}

#[async_trait]
pub trait MentionCheckRepository: Send + Sync {
    /// 并入已查看集合，返回并集
    async fn add(
        &self,
        user_id: UserId,
        message_ids: &[MessageId],
    ) -> Result<BTreeSet<MessageId>, RepositoryError>;
    async fn list(&self, user_id: UserId) -> Result<BTreeSet<MessageId>, RepositoryError>;
    async fn remove_user(&self, user_id: UserId) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn load(&self) -> Result<SystemSettings, RepositoryError>;
    async fn store(&self, settings: SystemSettings) -> Result<SystemSettings, RepositoryError>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create(&self, session: Session) -> Result<Session, RepositoryError>;
    async fn find(&self, id: SessionId) -> Result<Option<Session>, RepositoryError>;
    async fn remove(&self, id: SessionId) -> Result<Option<Session>, RepositoryError>;
    /// 用户的全部会话，按创建时间升序
    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Session>, RepositoryError>;
    async fn remove_for_user(&self, user_id: UserId) -> Result<Vec<Session>, RepositoryError>;
}

#[async_trait]
pub trait VerificationCodeRepository: Send + Sync {
    async fn put(&self, code: VerificationCode) -> Result<(), RepositoryError>;
    async fn find(&self, email: &UserEmail) -> Result<Option<VerificationCode>, RepositoryError>;
    async fn remove(&self, email: &UserEmail) -> Result<(), RepositoryError>;
    /// 清理过期验证码，返回清理数量
    async fn purge_expired(&self, now: Timestamp) -> Result<usize, RepositoryError>;
}
