pub mod auth_service;
pub mod directory_service;
pub mod mention_service;
pub mod message_service;
pub mod moderation_service;
pub mod settings_service;

#[cfg(test)]
mod test_support;

pub use auth_service::{
    AuthPolicy, AuthService, AuthServiceDependencies, LoginRequest, RegisterRequest, Registration,
    SignedIn,
};
pub use directory_service::{DirectoryService, DirectoryServiceDependencies, DirectoryTxn};
pub use mention_service::{MentionService, MentionServiceDependencies};
pub use message_service::{MessageService, MessageServiceDependencies};
pub use moderation_service::{AddUserRequest, ModerationService, ModerationServiceDependencies};
pub use settings_service::{SettingsService, SettingsServiceDependencies};
