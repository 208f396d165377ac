//! 服务层测试用的装配工具

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use domain::{
    Account, NewAccount, PasswordHash, Role, Session, UserEmail, UserId, UserStatus, Username,
};

use crate::{
    clock::{Clock, ManualClock},
    local_broadcast::LocalEventBroadcaster,
    mailer::RecordingMailSender,
    memory::{
        MemoryAccountRepository, MemoryMentionCheckRepository, MemoryMessageRepository,
        MemorySessionRepository, MemorySettingsRepository, MemoryVerificationCodeRepository,
    },
    password::{PasswordHasher, PasswordHasherError},
    repository::{AccountRepository, SessionRepository},
    services::{
        AuthPolicy, AuthService, AuthServiceDependencies, DirectoryService,
        DirectoryServiceDependencies, MentionService, MentionServiceDependencies, MessageService,
        MessageServiceDependencies, ModerationService, ModerationServiceDependencies,
        SettingsService, SettingsServiceDependencies,
    },
};

pub const TEST_PASSWORD: &str = "secret1";

/// 明文“哈希”，避免测试中的 bcrypt 开销
pub struct PlainHasher;

#[async_trait]
impl PasswordHasher for PlainHasher {
    async fn hash(&self, plaintext: &str) -> Result<PasswordHash, PasswordHasherError> {
        PasswordHash::new(format!("plain:{plaintext}"))
            .map_err(|err| PasswordHasherError::hash_error(err.to_string()))
    }

    async fn verify(
        &self,
        plaintext: &str,
        hashed: &PasswordHash,
    ) -> Result<bool, PasswordHasherError> {
        Ok(hashed.as_str() == format!("plain:{plaintext}"))
    }
}

pub fn new_account(username: &str, email: &str) -> NewAccount {
    NewAccount {
        username: Username::parse(username).unwrap(),
        email: UserEmail::parse(email).unwrap(),
        password_hash: PasswordHash::new(format!("plain:{TEST_PASSWORD}")).unwrap(),
        avatar: None,
        display_name: None,
    }
}

pub struct TestApp {
    pub clock: Arc<ManualClock>,
    pub account_repository: Arc<MemoryAccountRepository>,
    pub session_repository: Arc<MemorySessionRepository>,
    pub settings_repository: Arc<MemorySettingsRepository>,
    pub broadcaster: Arc<LocalEventBroadcaster>,
    pub mailer: Arc<RecordingMailSender>,
    pub directory: Arc<DirectoryService>,
    pub settings: Arc<SettingsService>,
    pub moderation: Arc<ModerationService>,
    pub auth: Arc<AuthService>,
    pub messages: Arc<MessageService>,
    pub mentions: Arc<MentionService>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_policy(AuthPolicy::default())
    }

    pub fn with_policy(policy: AuthPolicy) -> Self {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let account_repository = Arc::new(MemoryAccountRepository::new());
        let session_repository = Arc::new(MemorySessionRepository::new());
        let message_repository = Arc::new(MemoryMessageRepository::new());
        let mention_repository = Arc::new(MemoryMentionCheckRepository::new());
        let settings_repository = Arc::new(MemorySettingsRepository::new());
        let broadcaster = Arc::new(LocalEventBroadcaster::new());
        let mailer = Arc::new(RecordingMailSender::new());
        let password_hasher: Arc<dyn PasswordHasher> = Arc::new(PlainHasher);

        let directory = Arc::new(DirectoryService::new(DirectoryServiceDependencies {
            account_repository: account_repository.clone(),
            clock: clock.clone(),
        }));
        let settings = Arc::new(SettingsService::new(SettingsServiceDependencies {
            settings_repository: settings_repository.clone(),
            directory: directory.clone(),
        }));
        let moderation = Arc::new(ModerationService::new(ModerationServiceDependencies {
            directory: directory.clone(),
            session_repository: session_repository.clone(),
            mention_repository: mention_repository.clone(),
            password_hasher: password_hasher.clone(),
            broadcaster: broadcaster.clone(),
            mailer: mailer.clone(),
            clock: clock.clone(),
        }));
        let auth = Arc::new(AuthService::new(
            AuthServiceDependencies {
                directory: directory.clone(),
                settings: settings.clone(),
                session_repository: session_repository.clone(),
                verification_repository: Arc::new(MemoryVerificationCodeRepository::new()),
                password_hasher,
                mailer: mailer.clone(),
                clock: clock.clone(),
            },
            policy,
        ));
        let messages = Arc::new(MessageService::new(MessageServiceDependencies {
            message_repository: message_repository.clone(),
            directory: directory.clone(),
            broadcaster: broadcaster.clone(),
            clock: clock.clone(),
            history_limit: 100,
        }));
        let mentions = Arc::new(MentionService::new(MentionServiceDependencies {
            mention_repository,
            message_repository,
            directory: directory.clone(),
        }));

        Self {
            clock,
            account_repository,
            session_repository,
            settings_repository,
            broadcaster,
            mailer,
            directory,
            settings,
            moderation,
            auth,
            messages,
            mentions,
        }
    }

    /// 第一个创建的账号，必然是管理员
    pub async fn seed_admin(&self) -> Account {
        let admin = self.seed_with_status("admin", UserStatus::Active).await;
        assert_eq!(admin.role, Role::Admin, "seed_admin must run first");
        admin
    }

    pub async fn seed_member(&self, username: &str) -> Account {
        self.seed_with_status(username, UserStatus::Active).await
    }

    pub async fn seed_deputy(&self, username: &str) -> Account {
        let mut account = self.seed_member(username).await;
        account.role = Role::DeputyAdmin;
        self.account_repository.update(account).await.unwrap()
    }

    /// 每次创建后推进时钟，保证注册时间有序
    pub async fn seed_with_status(&self, username: &str, status: UserStatus) -> Account {
        let email = format!("{username}@example.com");
        let account = self
            .directory
            .begin()
            .await
            .create_account(new_account(username, &email), status)
            .await
            .unwrap();
        self.clock.advance(Duration::seconds(1));
        account
    }

    pub async fn account(&self, id: UserId) -> Account {
        self.directory.require(id).await.unwrap()
    }

    /// 直接写入一个会话，跳过登录流程
    pub async fn login_session(&self, user_id: UserId) -> Session {
        self.session_repository
            .create(Session::new(user_id, self.clock.now()))
            .await
            .unwrap()
    }
}
