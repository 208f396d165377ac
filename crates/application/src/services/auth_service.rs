//! 认证与会话服务
//!
//! 负责验证码发放、注册、登录、登出和会话校验。会话保存在服务端，
//! 可以被单独撤销；客户端持有的令牌只携带会话 id。

use std::sync::Arc;

use chrono::Duration;
use domain::{
    validate_password, Account, DomainError, NewAccount, Session, SessionId, UserEmail,
    UserStatus, UserView, Username, VerificationCode,
};
use rand::Rng;
use tokio::sync::Mutex;

use crate::{
    clock::Clock,
    error::ApplicationError,
    mailer::{MailSender, OutgoingMail},
    password::PasswordHasher,
    rate_limiter::{SlidingWindowLimiter, WindowRule},
    repository::{SessionRepository, VerificationCodeRepository},
    services::{directory_service::DirectoryService, settings_service::SettingsService},
};

/// 认证相关的策略参数
#[derive(Debug, Clone)]
pub struct AuthPolicy {
    pub max_sessions_per_user: usize,
    pub code_ttl: Duration,
    pub resend_interval: Duration,
    pub max_code_attempts: u32,
    pub verification_ip_rules: Vec<WindowRule>,
    pub registration_ip_rules: Vec<WindowRule>,
}

impl Default for AuthPolicy {
    fn default() -> Self {
        Self {
            max_sessions_per_user: 5,
            code_ttl: Duration::minutes(10),
            resend_interval: Duration::seconds(60),
            max_code_attempts: 5,
            verification_ip_rules: vec![
                WindowRule::new(Duration::hours(1), 6),
                WindowRule::new(Duration::days(1), 12),
            ],
            registration_ip_rules: vec![WindowRule::new(Duration::hours(1), 3)],
        }
    }
}

#[derive(Debug, Clone)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub code: String,
    pub avatar: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// 注册结果；只有账号直接激活时才会签发会话
#[derive(Debug, Clone)]
pub struct Registration {
    pub account: UserView,
    pub session: Option<Session>,
}

/// 登录结果；`evicted` 为因超出会话上限而被淘汰的旧会话
#[derive(Debug, Clone)]
pub struct SignedIn {
    pub account: UserView,
    pub session: Session,
    pub evicted: Vec<SessionId>,
}

pub struct AuthServiceDependencies {
    pub directory: Arc<DirectoryService>,
    pub settings: Arc<SettingsService>,
    pub session_repository: Arc<dyn SessionRepository>,
    pub verification_repository: Arc<dyn VerificationCodeRepository>,
    pub password_hasher: Arc<dyn PasswordHasher>,
    pub mailer: Arc<dyn MailSender>,
    pub clock: Arc<dyn Clock>,
}

pub struct AuthService {
    deps: AuthServiceDependencies,
    policy: AuthPolicy,
    verification_limiter: SlidingWindowLimiter,
    registration_limiter: SlidingWindowLimiter,
    code_lock: Mutex<()>,
    session_lock: Mutex<()>,
}

impl AuthService {
    pub fn new(deps: AuthServiceDependencies, policy: AuthPolicy) -> Self {
        Self {
            verification_limiter: SlidingWindowLimiter::new(policy.verification_ip_rules.clone()),
            registration_limiter: SlidingWindowLimiter::new(policy.registration_ip_rules.clone()),
            deps,
            policy,
            code_lock: Mutex::new(()),
            session_lock: Mutex::new(()),
        }
    }

    /// 向邮箱发送注册验证码，新验证码会替换旧的
    pub async fn send_verification_code(
        &self,
        email: String,
        ip: &str,
    ) -> Result<(), ApplicationError> {
        let email = UserEmail::parse(email)?;
        self.ensure_registration_open().await?;
        if self.deps.directory.is_blacklisted(&email).await? {
            return Err(DomainError::EmailBlacklisted.into());
        }
        if self.deps.directory.get_by_email(&email).await?.is_some() {
            return Err(DomainError::DuplicateEmail.into());
        }

        let _guard = self.code_lock.lock().await;
        let now = self.deps.clock.now();
        if let Some(existing) = self.deps.verification_repository.find(&email).await? {
            let next_allowed = existing.issued_at + self.policy.resend_interval;
            if now < next_allowed {
                let wait = (next_allowed - now).num_milliseconds();
                let wait_secs = ((wait + 999) / 1000).max(1) as u64;
                return Err(DomainError::rate_limited(
                    format!("请在 {wait_secs} 秒后再获取验证码"),
                    wait_secs,
                )
                .into());
            }
        }
        self.verification_limiter
            .check_and_record(ip, now)
            .map_err(|err| err.into_domain("发送验证码"))?;

        let code = generate_code();
        self.deps
            .mailer
            .send(OutgoingMail {
                to: email.clone(),
                subject: "注册验证码".to_owned(),
                body: format!(
                    "您的验证码是 {code}，{} 分钟内有效。",
                    self.policy.code_ttl.num_minutes()
                ),
            })
            .await?;
        self.deps
            .verification_repository
            .put(VerificationCode {
                email: email.clone(),
                code,
                issued_at: now,
                expires_at: now + self.policy.code_ttl,
                failed_attempts: 0,
            })
            .await?;

        tracing::info!(email = %email, ip, "verification code issued");
        Ok(())
    }

    /// 注册新账号
    ///
    /// 目录为空时的首个账号跳过注册开关与审核，直接成为管理员并登录。
    pub async fn register(
        &self,
        request: RegisterRequest,
        ip: &str,
    ) -> Result<Registration, ApplicationError> {
        let now = self.deps.clock.now();
        self.registration_limiter
            .check(ip, now)
            .map_err(|err| err.into_domain("注册"))?;

        let username = Username::parse(request.username)?;
        let email = UserEmail::parse(request.email)?;
        validate_password(&request.password)?;

        let settings = self.ensure_registration_open().await?;
        if self.deps.directory.is_blacklisted(&email).await? {
            return Err(DomainError::EmailBlacklisted.into());
        }
        if self.deps.directory.get_by_email(&email).await?.is_some() {
            return Err(DomainError::DuplicateEmail.into());
        }
        if self
            .deps
            .directory
            .get_by_username(username.as_str())
            .await?
            .is_some()
        {
            return Err(DomainError::DuplicateUsername.into());
        }
        self.consume_code(&email, request.code.trim()).await?;

        let password_hash = self.deps.password_hasher.hash(&request.password).await?;
        let status = if settings.require_approval() {
            UserStatus::Pending
        } else {
            UserStatus::Active
        };

        let account = {
            let txn = self.deps.directory.begin().await;
            let mut account = txn
                .create_account(
                    NewAccount {
                        username,
                        email,
                        password_hash,
                        avatar: request.avatar,
                        display_name: None,
                    },
                    status,
                )
                .await?;
            account.record_ip(ip);
            txn.save(account).await?
        };

        if let Err(err) = self.registration_limiter.record(ip, self.deps.clock.now()) {
            tracing::warn!(ip, error = %err, "failed to record registration attempt");
        }

        let session = if account.status == UserStatus::Active {
            // 新账号没有旧会话可淘汰
            let (session, _) = self.issue_session(&account).await?;
            Some(session)
        } else {
            None
        };

        tracing::info!(user_id = %account.id, status = %account.status, ip, "account registered");
        Ok(Registration {
            account: UserView::from(&account),
            session,
        })
    }

    /// 邮箱密码登录；邮箱不存在与密码错误返回同一个错误
    pub async fn login(&self, request: LoginRequest, ip: &str) -> Result<SignedIn, ApplicationError> {
        let email =
            UserEmail::parse(request.email).map_err(|_| DomainError::InvalidCredentials)?;
        let Some(account) = self.deps.directory.get_by_email(&email).await? else {
            // 被封禁的账号已删除，只剩邮箱黑名单
            if self.deps.directory.is_blacklisted(&email).await? {
                return Err(DomainError::AccountBanned.into());
            }
            return Err(DomainError::InvalidCredentials.into());
        };

        let password_ok = self
            .deps
            .password_hasher
            .verify(&request.password, &account.password_hash)
            .await?;
        if !password_ok {
            tracing::debug!(user_id = %account.id, "password mismatch");
            return Err(DomainError::InvalidCredentials.into());
        }

        match account.status {
            UserStatus::Pending => return Err(DomainError::AccountPending.into()),
            UserStatus::Banned => return Err(DomainError::AccountBanned.into()),
            UserStatus::Active => {}
        }

        let account = {
            let txn = self.deps.directory.begin().await;
            let mut account = txn.account(account.id).await?;
            account.record_ip(ip);
            txn.save(account).await?
        };
        let (session, evicted) = self.issue_session(&account).await?;

        tracing::info!(user_id = %account.id, session_id = %session.id, ip, "user logged in");
        Ok(SignedIn {
            account: UserView::from(&account),
            session,
            evicted,
        })
    }

    /// 校验会话，返回会话及其账号的最新状态
    pub async fn authenticate(
        &self,
        session_id: SessionId,
    ) -> Result<(Session, Account), ApplicationError> {
        let session = self
            .deps
            .session_repository
            .find(session_id)
            .await?
            .ok_or(DomainError::Unauthenticated)?;

        match self.deps.directory.get_by_id(session.user_id).await? {
            Some(account) if account.status == UserStatus::Active => Ok((session, account)),
            Some(_) => Err(DomainError::Unauthenticated.into()),
            None => {
                self.deps.session_repository.remove(session_id).await?;
                Err(DomainError::Unauthenticated.into())
            }
        }
    }

    /// 当前登录用户，会话无效时返回 `None`
    pub async fn current_user(
        &self,
        session_id: SessionId,
    ) -> Result<Option<UserView>, ApplicationError> {
        match self.authenticate(session_id).await {
            Ok((_, account)) => Ok(Some(UserView::from(&account))),
            Err(ApplicationError::Domain(DomainError::Unauthenticated)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// 登出，会话不存在时同样成功
    pub async fn logout(&self, session_id: SessionId) -> Result<(), ApplicationError> {
        if let Some(session) = self.deps.session_repository.remove(session_id).await? {
            tracing::info!(user_id = %session.user_id, session_id = %session_id, "user logged out");
        }
        Ok(())
    }

    /// 清理过期验证码和限流记录，返回清理的验证码数量
    pub async fn purge_expired(&self) -> Result<usize, ApplicationError> {
        let now = self.deps.clock.now();
        let purged = {
            let _guard = self.code_lock.lock().await;
            self.deps.verification_repository.purge_expired(now).await?
        };
        self.verification_limiter.cleanup(now);
        self.registration_limiter.cleanup(now);
        Ok(purged)
    }

    async fn ensure_registration_open(&self) -> Result<domain::SystemSettings, ApplicationError> {
        let settings = self.deps.settings.current().await?;
        if self.deps.directory.is_empty().await? {
            return Ok(domain::SystemSettings::new(true, false));
        }
        if !settings.registration_open() {
            return Err(DomainError::RegistrationClosed.into());
        }
        Ok(settings)
    }

    /// 核对并消耗验证码；错误次数达到上限后验证码作废
    async fn consume_code(&self, email: &UserEmail, code: &str) -> Result<(), ApplicationError> {
        let _guard = self.code_lock.lock().await;
        let now = self.deps.clock.now();
        let Some(mut stored) = self.deps.verification_repository.find(email).await? else {
            return Err(DomainError::CodeInvalidOrExpired.into());
        };

        if stored.is_expired(now) {
            self.deps.verification_repository.remove(email).await?;
            return Err(DomainError::CodeInvalidOrExpired.into());
        }

        if stored.code != code {
            stored.failed_attempts += 1;
            if stored.failed_attempts >= self.policy.max_code_attempts {
                tracing::warn!(email = %email, "verification code invalidated after too many attempts");
                self.deps.verification_repository.remove(email).await?;
            } else {
                self.deps.verification_repository.put(stored).await?;
            }
            return Err(DomainError::CodeInvalidOrExpired.into());
        }

        self.deps.verification_repository.remove(email).await?;
        Ok(())
    }

    /// 签发新会话，超出上限时淘汰最早的会话，并返回被淘汰的会话 ID
    async fn issue_session(
        &self,
        account: &Account,
    ) -> Result<(Session, Vec<SessionId>), ApplicationError> {
        let _guard = self.session_lock.lock().await;
        let session = self
            .deps
            .session_repository
            .create(Session::new(account.id, self.deps.clock.now()))
            .await?;

        let sessions = self.deps.session_repository.list_for_user(account.id).await?;
        let overflow = sessions
            .len()
            .saturating_sub(self.policy.max_sessions_per_user);
        let mut evicted = Vec::with_capacity(overflow);
        for stale in sessions.iter().filter(|s| s.id != session.id).take(overflow) {
            self.deps.session_repository.remove(stale.id).await?;
            tracing::debug!(user_id = %account.id, session_id = %stale.id, "evicted oldest session");
            evicted.push(stale.id);
        }
        Ok((session, evicted))
    }
}

fn generate_code() -> String {
    let value: u32 = rand::rng().random_range(0..1_000_000);
    format!("{value:06}")
}
