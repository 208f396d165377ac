use std::sync::Arc;

use application::{
    memory::{
        MemoryAccountRepository, MemoryMentionCheckRepository, MemoryMessageRepository,
        MemorySessionRepository, MemorySettingsRepository, MemoryVerificationCodeRepository,
    },
    AccountRepository, AuthPolicy, AuthService, AuthServiceDependencies, Clock, DirectoryService,
    DirectoryServiceDependencies, EventBroadcaster, MailSender, MentionCheckRepository,
    MentionService, MentionServiceDependencies, MessageRepository, MessageService,
    MessageServiceDependencies, ModerationService, ModerationServiceDependencies, PasswordHasher,
    SessionRepository, SettingsRepository, SettingsService, SettingsServiceDependencies,
    SnapshotStore, VerificationCodeRepository, WindowRule,
};
use chrono::Duration;
use config::AppConfig;
use domain::RepositoryError;
use infrastructure::ConnectionHub;

use crate::JwtService;

/// 全部仓储
#[derive(Clone)]
pub struct Repositories {
    pub accounts: Arc<dyn AccountRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub mention_checks: Arc<dyn MentionCheckRepository>,
    pub settings: Arc<dyn SettingsRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub verification_codes: Arc<dyn VerificationCodeRepository>,
}

impl Repositories {
    pub fn in_memory() -> Self {
        Self {
            accounts: Arc::new(MemoryAccountRepository::new()),
            messages: Arc::new(MemoryMessageRepository::new()),
            mention_checks: Arc::new(MemoryMentionCheckRepository::new()),
            settings: Arc::new(MemorySettingsRepository::new()),
            sessions: Arc::new(MemorySessionRepository::new()),
            verification_codes: Arc::new(MemoryVerificationCodeRepository::new()),
        }
    }

    /// 从快照恢复并在每次修改后写回；验证码只保存在内存中
    pub async fn persistent(store: Arc<dyn SnapshotStore>) -> Result<Self, RepositoryError> {
        Ok(Self {
            accounts: Arc::new(MemoryAccountRepository::persistent(store.clone()).await?),
            messages: Arc::new(MemoryMessageRepository::persistent(store.clone()).await?),
            mention_checks: Arc::new(MemoryMentionCheckRepository::persistent(store.clone()).await?),
            settings: Arc::new(MemorySettingsRepository::persistent(store.clone()).await?),
            sessions: Arc::new(MemorySessionRepository::persistent(store).await?),
            verification_codes: Arc::new(MemoryVerificationCodeRepository::new()),
        })
    }
}

/// 外部适配器
#[derive(Clone)]
pub struct Adapters {
    pub password_hasher: Arc<dyn PasswordHasher>,
    pub mailer: Arc<dyn MailSender>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub directory: Arc<DirectoryService>,
    pub moderation: Arc<ModerationService>,
    pub messages: Arc<MessageService>,
    pub mentions: Arc<MentionService>,
    pub settings: Arc<SettingsService>,
    pub hub: Arc<ConnectionHub>,
    pub jwt: Arc<JwtService>,
    pub cookie_secure: bool,
}

impl AppState {
    /// 按配置组装所有服务，实时广播中心同时作为事件发布端
    pub fn assemble(config: &AppConfig, repositories: Repositories, adapters: Adapters) -> Self {
        let hub = Arc::new(ConnectionHub::new());
        let broadcaster: Arc<dyn EventBroadcaster> = hub.clone();

        let directory = Arc::new(DirectoryService::new(DirectoryServiceDependencies {
            account_repository: repositories.accounts.clone(),
            clock: adapters.clock.clone(),
        }));

        let settings = Arc::new(SettingsService::new(SettingsServiceDependencies {
            settings_repository: repositories.settings.clone(),
            directory: directory.clone(),
        }));

        let auth = Arc::new(AuthService::new(
            AuthServiceDependencies {
                directory: directory.clone(),
                settings: settings.clone(),
                session_repository: repositories.sessions.clone(),
                verification_repository: repositories.verification_codes.clone(),
                password_hasher: adapters.password_hasher.clone(),
                mailer: adapters.mailer.clone(),
                clock: adapters.clock.clone(),
            },
            auth_policy(config),
        ));

        let moderation = Arc::new(ModerationService::new(ModerationServiceDependencies {
            directory: directory.clone(),
            session_repository: repositories.sessions.clone(),
            mention_repository: repositories.mention_checks.clone(),
            password_hasher: adapters.password_hasher.clone(),
            broadcaster: broadcaster.clone(),
            mailer: adapters.mailer.clone(),
            clock: adapters.clock.clone(),
        }));

        let messages = Arc::new(MessageService::new(MessageServiceDependencies {
            message_repository: repositories.messages.clone(),
            directory: directory.clone(),
            broadcaster,
            clock: adapters.clock.clone(),
            history_limit: config.messages.history_limit,
        }));

        let mentions = Arc::new(MentionService::new(MentionServiceDependencies {
            mention_repository: repositories.mention_checks,
            message_repository: repositories.messages,
            directory: directory.clone(),
        }));

        Self {
            auth,
            directory,
            moderation,
            messages,
            mentions,
            settings,
            hub,
            jwt: Arc::new(JwtService::new(
                &config.auth.jwt_secret,
                config.auth.session_hours,
            )),
            cookie_secure: config.auth.cookie_secure,
        }
    }
}

/// 把配置中的认证参数转换为服务使用的策略
pub fn auth_policy(config: &AppConfig) -> AuthPolicy {
    let verification = &config.verification;
    AuthPolicy {
        max_sessions_per_user: config.auth.max_sessions_per_user,
        code_ttl: Duration::seconds(verification.code_ttl_secs),
        resend_interval: Duration::seconds(verification.resend_interval_secs),
        max_code_attempts: verification.max_attempts,
        verification_ip_rules: vec![
            WindowRule::new(Duration::hours(1), verification.hourly_limit_per_ip),
            WindowRule::new(Duration::days(1), verification.daily_limit_per_ip),
        ],
        registration_ip_rules: vec![WindowRule::new(
            Duration::hours(1),
            config.registration.hourly_limit_per_ip,
        )],
    }
}
