//! 基础设施层实现。
//!
//! 提供密码哈希、快照持久化、实时广播中心和邮件发送等适配器，
//! 实现应用层定义的接口。

pub mod hub;
pub mod mailer;
pub mod password;
pub mod snapshot_store;

pub use hub::{ConnectionHub, ConnectionId, Outbound};
pub use mailer::LogMailSender;
pub use password::BcryptPasswordHasher;
pub use snapshot_store::JsonSnapshotStore;
