//! 应用层实现。
//!
//! 这里提供围绕领域模型的用例服务，处理输入校验、事务边界、
//! 以及对外部适配器（例如密码哈希、邮件发送、事件广播）的抽象。

pub mod broadcaster;
pub mod clock;
pub mod error;
pub mod local_broadcast;
pub mod mailer;
pub mod memory;
pub mod password;
pub mod rate_limiter;
pub mod repository;
pub mod services;
pub mod snapshot;

pub use broadcaster::{BroadcastError, EventBroadcaster};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::ApplicationError;
pub use local_broadcast::LocalEventBroadcaster;
pub use mailer::{MailError, MailSender, OutgoingMail, RecordingMailSender};
pub use password::{PasswordHasher, PasswordHasherError};
pub use rate_limiter::{RateLimitError, SlidingWindowLimiter, WindowRule};
pub use repository::{
    AccountRepository, MentionCheckRepository, MessageRepository, SessionRepository,
    SettingsRepository, VerificationCodeRepository,
};
pub use services::{
    AddUserRequest, AuthPolicy, AuthService, AuthServiceDependencies, DirectoryService,
    DirectoryServiceDependencies, LoginRequest, MentionService, MentionServiceDependencies,
    MessageService, MessageServiceDependencies, ModerationService, ModerationServiceDependencies,
    RegisterRequest, Registration, SettingsService, SettingsServiceDependencies, SignedIn,
};
pub use snapshot::SnapshotStore;
