//! 用户目录服务
//!
//! 账号的权威记录。所有写操作都必须通过 [`DirectoryService::begin`] 拿到
//! [`DirectoryTxn`]，事务对象持有目录写锁：同一账号上的“读取-校验-写入-发布事件”
//! 因此不会与其他写操作交错。只读查询不需要加锁。

use std::sync::Arc;

use domain::{
    require_moderator, Account, NewAccount, Role, UserEmail, UserId, UserStatus, UserView,
};
use tokio::sync::{Mutex, MutexGuard};

use crate::{clock::Clock, error::ApplicationError, repository::AccountRepository};

pub struct DirectoryServiceDependencies {
    pub account_repository: Arc<dyn AccountRepository>,
    pub clock: Arc<dyn Clock>,
}

pub struct DirectoryService {
    deps: DirectoryServiceDependencies,
    write_lock: Mutex<()>,
}

impl DirectoryService {
    pub fn new(deps: DirectoryServiceDependencies) -> Self {
        Self {
            deps,
            write_lock: Mutex::new(()),
        }
    }

    /// 开始一个目录写事务
    pub async fn begin(&self) -> DirectoryTxn<'_> {
        DirectoryTxn {
            _guard: self.write_lock.lock().await,
            repository: self.deps.account_repository.as_ref(),
            clock: self.deps.clock.as_ref(),
        }
    }

    pub async fn get_by_id(&self, id: UserId) -> Result<Option<Account>, ApplicationError> {
        Ok(self.deps.account_repository.find_by_id(id).await?)
    }

    pub async fn get_by_email(
        &self,
        email: &UserEmail,
    ) -> Result<Option<Account>, ApplicationError> {
        Ok(self.deps.account_repository.find_by_email(email).await?)
    }

    pub async fn get_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Account>, ApplicationError> {
        Ok(self.deps.account_repository.find_by_username(username).await?)
    }

    /// 查找账号，不存在时返回 `NotFound`
    pub async fn require(&self, id: UserId) -> Result<Account, ApplicationError> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("用户", id))
    }

    /// 全部账号，不保证顺序
    pub async fn list_all(&self) -> Result<Vec<Account>, ApplicationError> {
        Ok(self.deps.account_repository.list().await?)
    }

    pub async fn is_empty(&self) -> Result<bool, ApplicationError> {
        Ok(self.deps.account_repository.count().await? == 0)
    }

    pub async fn is_blacklisted(&self, email: &UserEmail) -> Result<bool, ApplicationError> {
        Ok(self.deps.account_repository.is_blacklisted(email).await?)
    }

    /// 管理界面的用户列表（非待审核账号），按注册时间排序
    pub async fn list_users(&self, actor_id: UserId) -> Result<Vec<UserView>, ApplicationError> {
        let actor = self.require(actor_id).await?;
        require_moderator(actor.role)?;
        self.list_sorted(|account| account.status != UserStatus::Pending)
            .await
    }

    /// 待审核账号列表
    pub async fn list_pending(&self, actor_id: UserId) -> Result<Vec<UserView>, ApplicationError> {
        let actor = self.require(actor_id).await?;
        domain::require_admin(actor.role)?;
        self.list_sorted(|account| account.status == UserStatus::Pending)
            .await
    }

    async fn list_sorted(
        &self,
        filter: impl Fn(&Account) -> bool,
    ) -> Result<Vec<UserView>, ApplicationError> {
        let mut accounts: Vec<Account> = self
            .list_all()
            .await?
            .into_iter()
            .filter(|account| filter(account))
            .collect();
        accounts.sort_by_key(|account| account.created_at);
        Ok(accounts.iter().map(UserView::from).collect())
    }
}

/// 持有目录写锁的事务句柄
pub struct DirectoryTxn<'a> {
    _guard: MutexGuard<'a, ()>,
    repository: &'a dyn AccountRepository,
    clock: &'a dyn Clock,
}

impl DirectoryTxn<'_> {
    /// 读取账号，不存在时返回 `NotFound`
    pub async fn account(&self, id: UserId) -> Result<Account, ApplicationError> {
        self.repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("用户", id))
    }

    pub async fn is_empty(&self) -> Result<bool, ApplicationError> {
        Ok(self.repository.count().await? == 0)
    }

    /// 创建账号
    ///
    /// 目录为空时创建的账号固定为 `Admin`/`Active`，忽略传入的状态；
    /// 其余账号以 `Member` 身份和 `status` 创建。
    pub async fn create_account(
        &self,
        data: NewAccount,
        status: UserStatus,
    ) -> Result<Account, ApplicationError> {
        if self.repository.is_blacklisted(&data.email).await? {
            return Err(domain::DomainError::EmailBlacklisted.into());
        }

        let (role, status) = if self.is_empty().await? {
            (Role::Admin, UserStatus::Active)
        } else {
            (Role::Member, status)
        };

        let account = Account::new(UserId::generate(), data, role, status, self.clock.now());
        let stored = self.repository.create(account).await?;
        tracing::info!(
            user_id = %stored.id,
            role = %stored.role,
            status = %stored.status,
            "account created"
        );
        Ok(stored)
    }

    pub async fn save(&self, account: Account) -> Result<Account, ApplicationError> {
        Ok(self.repository.update(account).await?)
    }

    /// 删除账号；`blacklist` 为真时同时封禁邮箱
    pub async fn remove(&self, id: UserId, blacklist: bool) -> Result<Account, ApplicationError> {
        self.repository
            .remove(id, blacklist)
            .await
            .map_err(|err| match err {
                domain::RepositoryError::NotFound => ApplicationError::not_found("用户", id),
                other => other.into(),
            })
    }
}
