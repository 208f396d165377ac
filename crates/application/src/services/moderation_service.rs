//! 管理操作服务
//!
//! 在目录事务内完成“读取操作者与目标、校验权限矩阵、写入、发布事件”，
//! 任何一步失败都不会修改状态，也不会发出事件。

use std::sync::Arc;

use domain::{
    authorize_moderation, mute_duration, normalize_display_name, require_admin, validate_password,
    Account, ChatEvent, DomainError, ModerationAction, NewAccount, Party, Role, UserEmail, UserId,
    UserStatus, UserView, Username,
};

use crate::{
    broadcaster::EventBroadcaster,
    clock::Clock,
    error::ApplicationError,
    mailer::{MailSender, OutgoingMail},
    password::PasswordHasher,
    repository::{MentionCheckRepository, SessionRepository},
    services::directory_service::{DirectoryService, DirectoryTxn},
};

/// 管理员直接添加用户的请求
#[derive(Debug, Clone)]
pub struct AddUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub avatar: Option<String>,
    pub display_name: Option<String>,
}

pub struct ModerationServiceDependencies {
    pub directory: Arc<DirectoryService>,
    pub session_repository: Arc<dyn SessionRepository>,
    pub mention_repository: Arc<dyn MentionCheckRepository>,
    pub password_hasher: Arc<dyn PasswordHasher>,
    pub broadcaster: Arc<dyn EventBroadcaster>,
    pub mailer: Arc<dyn MailSender>,
    pub clock: Arc<dyn Clock>,
}

pub struct ModerationService {
    deps: ModerationServiceDependencies,
}

impl ModerationService {
    pub fn new(deps: ModerationServiceDependencies) -> Self {
        Self { deps }
    }

    /// 设置或取消次管理员
    pub async fn set_role(
        &self,
        actor_id: UserId,
        target_id: UserId,
        new_role: Role,
    ) -> Result<UserView, ApplicationError> {
        let action = match new_role {
            Role::DeputyAdmin => ModerationAction::PromoteToDeputy,
            Role::Member => ModerationAction::DemoteToMember,
            Role::Admin => {
                return Err(DomainError::validation_error("role", "不能将用户设为管理员").into())
            }
        };

        let txn = self.deps.directory.begin().await;
        let (_, mut target) = self.authorized(&txn, action, actor_id, target_id).await?;

        let old_role = target.role;
        target.role = new_role;
        let target = txn.save(target).await?;
        self.publish(ChatEvent::role_changed(target.id, old_role, new_role))
            .await;

        tracing::info!(actor_id = %actor_id, target_id = %target_id, old_role = %old_role, new_role = %new_role, "role changed");
        Ok(UserView::from(&target))
    }

    /// 禁言 `duration_minutes` 分钟；`None` 解除禁言
    pub async fn set_mute(
        &self,
        actor_id: UserId,
        target_id: UserId,
        duration_minutes: Option<i64>,
    ) -> Result<UserView, ApplicationError> {
        let duration = duration_minutes.map(mute_duration).transpose()?;

        let txn = self.deps.directory.begin().await;
        let (_, mut target) = self
            .authorized(&txn, ModerationAction::Mute, actor_id, target_id)
            .await?;

        target.muted_until = duration.map(|duration| self.deps.clock.now() + duration);
        let target = txn.save(target).await?;
        self.publish(ChatEvent::mute_changed(target.id, target.muted_until))
            .await;

        tracing::info!(actor_id = %actor_id, target_id = %target_id, duration_minutes = ?duration_minutes, "mute updated");
        Ok(UserView::from(&target))
    }

    /// 切换账号状态
    ///
    /// `Banned` 与封禁相同：删除账号并封禁邮箱；`Active` 只能用于审核待审核账号；
    /// 账号不能被改回 `Pending`。
    pub async fn set_status(
        &self,
        actor_id: UserId,
        target_id: UserId,
        status: UserStatus,
    ) -> Result<UserView, ApplicationError> {
        match status {
            UserStatus::Pending => {
                Err(DomainError::validation_error("status", "不能将账号设为待审核").into())
            }
            UserStatus::Active => self.approve(actor_id, target_id).await,
            UserStatus::Banned => {
                let removed = self
                    .remove_and_blacklist(ModerationAction::SetStatus, actor_id, target_id)
                    .await?;
                let mut view = UserView::from(&removed);
                view.status = UserStatus::Banned;
                Ok(view)
            }
        }
    }

    /// 删除账号（不封禁邮箱）
    pub async fn delete_account(
        &self,
        actor_id: UserId,
        target_id: UserId,
    ) -> Result<(), ApplicationError> {
        let txn = self.deps.directory.begin().await;
        self.authorized(&txn, ModerationAction::Delete, actor_id, target_id)
            .await?;

        let removed = txn.remove(target_id, false).await?;
        self.cleanup_removed(&removed).await;
        self.publish(ChatEvent::user_deleted(removed.id)).await;

        tracing::info!(actor_id = %actor_id, target_id = %target_id, "account deleted");
        Ok(())
    }

    /// 封禁账号：删除账号并把邮箱加入黑名单，二者在同一次提交中完成
    pub async fn ban_account(
        &self,
        actor_id: UserId,
        target_id: UserId,
    ) -> Result<(), ApplicationError> {
        self.remove_and_blacklist(ModerationAction::Ban, actor_id, target_id)
            .await?;
        Ok(())
    }

    /// 用户注销自己的账号，管理员不能注销
    pub async fn delete_own_account(&self, user_id: UserId) -> Result<(), ApplicationError> {
        let txn = self.deps.directory.begin().await;
        let account = txn.account(user_id).await?;
        if account.role == Role::Admin {
            return Err(DomainError::permission_denied("管理员账号不能注销").into());
        }

        let removed = txn.remove(user_id, false).await?;
        self.cleanup_removed(&removed).await;
        self.publish(ChatEvent::user_deleted(removed.id)).await;

        tracing::info!(user_id = %user_id, "account self-deleted");
        Ok(())
    }

    /// 审核通过：`Pending → Active`
    pub async fn approve(
        &self,
        actor_id: UserId,
        target_id: UserId,
    ) -> Result<UserView, ApplicationError> {
        let target = {
            let txn = self.deps.directory.begin().await;
            let mut target = self.pending_target(&txn, actor_id, target_id).await?;
            target.status = UserStatus::Active;
            txn.save(target).await?
        };

        tracing::info!(actor_id = %actor_id, target_id = %target_id, "registration approved");
        self.notify(
            &target.email,
            "注册审核通过",
            format!("{}，您的账号已通过审核，现在可以登录了。", target.username),
        )
        .await;
        Ok(UserView::from(&target))
    }

    /// 审核拒绝：删除账号并封禁邮箱
    pub async fn reject(&self, actor_id: UserId, target_id: UserId) -> Result<(), ApplicationError> {
        let removed = {
            let txn = self.deps.directory.begin().await;
            self.pending_target(&txn, actor_id, target_id).await?;
            txn.remove(target_id, true).await?
        };

        tracing::info!(actor_id = %actor_id, target_id = %target_id, "registration rejected");
        self.notify(
            &removed.email,
            "注册审核未通过",
            format!("{}，很抱歉，您的注册申请未通过审核。", removed.username),
        )
        .await;
        Ok(())
    }

    /// 修改显示名称；`None` 或空白表示清除
    pub async fn update_display_name(
        &self,
        actor_id: UserId,
        target_id: UserId,
        display_name: Option<String>,
    ) -> Result<UserView, ApplicationError> {
        let display_name = normalize_display_name(display_name)?;

        let txn = self.deps.directory.begin().await;
        let (_, mut target) = self
            .authorized(&txn, ModerationAction::EditDisplayName, actor_id, target_id)
            .await?;
        if target.display_name == display_name {
            return Ok(UserView::from(&target));
        }

        let old_display_name = std::mem::replace(&mut target.display_name, display_name);
        let target = txn.save(target).await?;
        self.publish(ChatEvent::display_name_changed(
            target.id,
            old_display_name,
            target.display_name.clone(),
        ))
        .await;

        Ok(UserView::from(&target))
    }

    /// 管理员直接创建正式成员，无需验证码
    pub async fn add_user(
        &self,
        actor_id: UserId,
        request: AddUserRequest,
    ) -> Result<UserView, ApplicationError> {
        let username = Username::parse(request.username)?;
        let email = UserEmail::parse(request.email)?;
        validate_password(&request.password)?;
        let display_name = normalize_display_name(request.display_name)?;

        let actor = self.deps.directory.require(actor_id).await?;
        require_admin(actor.role)?;

        let password_hash = self.deps.password_hasher.hash(&request.password).await?;
        let txn = self.deps.directory.begin().await;
        // 加锁后重新确认操作者仍是管理员
        require_admin(txn.account(actor_id).await?.role)?;
        let account = txn
            .create_account(
                NewAccount {
                    username,
                    email,
                    password_hash,
                    avatar: request.avatar,
                    display_name,
                },
                UserStatus::Active,
            )
            .await?;

        tracing::info!(actor_id = %actor_id, user_id = %account.id, "user added by admin");
        Ok(UserView::from(&account))
    }

    async fn authorized(
        &self,
        txn: &DirectoryTxn<'_>,
        action: ModerationAction,
        actor_id: UserId,
        target_id: UserId,
    ) -> Result<(Account, Account), ApplicationError> {
        let actor = txn.account(actor_id).await?;
        let target = txn.account(target_id).await?;
        authorize_moderation(
            action,
            Party::new(actor.id, actor.role),
            Party::new(target.id, target.role),
        )?;
        Ok((actor, target))
    }

    async fn remove_and_blacklist(
        &self,
        action: ModerationAction,
        actor_id: UserId,
        target_id: UserId,
    ) -> Result<Account, ApplicationError> {
        let txn = self.deps.directory.begin().await;
        self.authorized(&txn, action, actor_id, target_id).await?;

        let removed = txn.remove(target_id, true).await?;
        self.cleanup_removed(&removed).await;
        self.publish(ChatEvent::user_banned(removed.id)).await;

        tracing::info!(actor_id = %actor_id, target_id = %target_id, email = %removed.email, "account banned");
        Ok(removed)
    }

    async fn pending_target(
        &self,
        txn: &DirectoryTxn<'_>,
        actor_id: UserId,
        target_id: UserId,
    ) -> Result<Account, ApplicationError> {
        require_admin(txn.account(actor_id).await?.role)?;
        let target = txn.account(target_id).await?;
        if target.status != UserStatus::Pending {
            return Err(DomainError::invalid_state("该用户不在待审核状态").into());
        }
        Ok(target)
    }

    /// 账号删除后的附带清理；主修改已提交，这里的失败只记录日志
    async fn cleanup_removed(&self, removed: &Account) {
        self.revoke_sessions(removed.id).await;
        if let Err(err) = self.deps.mention_repository.remove_user(removed.id).await {
            tracing::warn!(user_id = %removed.id, error = %err, "failed to drop mention checks");
        }
    }

    async fn revoke_sessions(&self, user_id: UserId) {
        match self.deps.session_repository.remove_for_user(user_id).await {
            Ok(sessions) => {
                tracing::debug!(user_id = %user_id, revoked = sessions.len(), "sessions revoked")
            }
            Err(err) => {
                tracing::warn!(user_id = %user_id, error = %err, "failed to revoke sessions")
            }
        }
    }

    async fn publish(&self, event: ChatEvent) {
        let event_type = event.event_type();
        if let Err(err) = self.deps.broadcaster.broadcast(event).await {
            tracing::warn!(event_type, error = %err, "failed to publish event");
        }
    }

    async fn notify(&self, to: &UserEmail, subject: &str, body: String) {
        let mail = OutgoingMail {
            to: to.clone(),
            subject: subject.to_owned(),
            body,
        };
        if let Err(err) = self.deps.mailer.send(mail).await {
            tracing::warn!(to = %to, error = %err, "failed to send notification mail");
        }
    }
}
