//! 领域实体定义

pub mod message;
pub mod session;
pub mod settings;
pub mod user;
pub mod verification;

pub use message::{AuthorSnapshot, AuthorView, Message, MessageView, MESSAGE_MAX_CHARS};
pub use session::Session;
pub use settings::SystemSettings;
pub use user::{Account, NewAccount, Role, UserStatus, UserView, LAST_IPS_LIMIT};
pub use verification::{VerificationCode, VERIFICATION_CODE_LEN};
