//! 实时广播中心
//!
//! 维护在线连接的注册表，把已提交的领域事件推送给每个连接。
//! 每个连接拥有独立的无界发送队列，推送从不等待接收方，
//! 单个连接的失败只记录日志并移除该连接。

use std::collections::HashMap;

use application::{BroadcastError, EventBroadcaster};
use async_trait::async_trait;
use domain::{ChatEvent, Role, Session, SessionId, UserId};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// 连接标识
pub type ConnectionId = Uuid;

/// 发往单个连接的指令
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Event(ChatEvent),
    /// 服务端要求关闭连接（登出、封禁或删除）
    Close,
}

#[derive(Debug)]
struct ConnectionEntry {
    user_id: UserId,
    session_id: SessionId,
    /// 缓存的角色，决定撤回原文等字段是否可见
    role: Role,
    sender: mpsc::UnboundedSender<Outbound>,
}

#[derive(Debug, Default)]
pub struct ConnectionHub {
    connections: RwLock<HashMap<ConnectionId, ConnectionEntry>>,
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记一个已认证的连接，返回连接 id 和它的接收队列
    pub async fn register(
        &self,
        session: &Session,
        role: Role,
    ) -> (ConnectionId, mpsc::UnboundedReceiver<Outbound>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let connection_id = Uuid::new_v4();
        self.connections.write().await.insert(
            connection_id,
            ConnectionEntry {
                user_id: session.user_id,
                session_id: session.id,
                role,
                sender,
            },
        );
        tracing::info!(
            connection_id = %connection_id,
            user_id = %session.user_id,
            "connection registered"
        );
        (connection_id, receiver)
    }

    pub async fn unregister(&self, connection_id: ConnectionId) {
        if let Some(entry) = self.connections.write().await.remove(&connection_id) {
            tracing::info!(
                connection_id = %connection_id,
                user_id = %entry.user_id,
                "connection unregistered"
            );
        }
    }

    /// 关闭某个会话的全部连接，返回关闭的数量
    pub async fn disconnect_session(&self, session_id: SessionId) -> usize {
        let mut connections = self.connections.write().await;
        close_where(&mut connections, |entry| entry.session_id == session_id)
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }
}

#[async_trait]
impl EventBroadcaster for ConnectionHub {
    async fn broadcast(&self, event: ChatEvent) -> Result<(), BroadcastError> {
        // 整个扇出在写锁内完成，保证每个连接看到的事件顺序一致
        let mut connections = self.connections.write().await;

        if let ChatEvent::RoleChanged {
            user_id, new_role, ..
        } = &event
        {
            for entry in connections.values_mut() {
                if entry.user_id == *user_id {
                    entry.role = *new_role;
                }
            }
        }

        let mut failed = Vec::new();
        for (connection_id, entry) in connections.iter() {
            let payload = if event.is_role_sensitive() {
                event.for_viewer(entry.role)
            } else {
                event.clone()
            };
            if entry.sender.send(Outbound::Event(payload)).is_err() {
                tracing::warn!(
                    connection_id = %connection_id,
                    user_id = %entry.user_id,
                    event_type = event.event_type(),
                    "delivery failed, dropping connection"
                );
                failed.push(*connection_id);
            }
        }
        for connection_id in failed {
            connections.remove(&connection_id);
        }

        if let Some(user_id) = event.terminated_user() {
            let closed = close_where(&mut connections, |entry| entry.user_id == user_id);
            tracing::info!(user_id = %user_id, closed, "terminated user disconnected");
        }

        tracing::debug!(
            event_type = event.event_type(),
            recipients = connections.len(),
            "event broadcast"
        );
        Ok(())
    }
}

fn close_where(
    connections: &mut HashMap<ConnectionId, ConnectionEntry>,
    predicate: impl Fn(&ConnectionEntry) -> bool,
) -> usize {
    let targets: Vec<ConnectionId> = connections
        .iter()
        .filter(|(_, entry)| predicate(entry))
        .map(|(id, _)| *id)
        .collect();
    for id in &targets {
        if let Some(entry) = connections.remove(id) {
            // 接收端已经关闭时无需处理
            let _ = entry.sender.send(Outbound::Close);
        }
    }
    targets.len()
}
