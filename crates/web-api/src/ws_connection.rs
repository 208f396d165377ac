use axum::extract::ws::{close_code, CloseFrame, Message as WsMessage, WebSocket};
use domain::{Role, SessionId, UserId};
use futures_util::{SinkExt, StreamExt};
use infrastructure::{ConnectionId, Outbound};
use tokio::sync::mpsc;

use crate::{auth::CurrentSession, state::AppState};

/// 单个会话的实时连接
///
/// 事件来自广播中心为该连接建立的队列，按提交顺序写入 socket。
/// 客户端发来的数据帧不参与业务，只处理关闭和心跳。
pub struct WebSocketConnection {
    socket: WebSocket,
    state: AppState,
    user_id: UserId,
    session_id: SessionId,
    connection_id: ConnectionId,
    outbound: mpsc::UnboundedReceiver<Outbound>,
}

impl WebSocketConnection {
    /// 在广播中心登记连接
    ///
    /// 握手时的认证与登记之间账号可能已被封禁或修改角色，
    /// 因此登记后再校验一次会话；会话失效时返回 `None`。
    pub async fn open(
        mut socket: WebSocket,
        state: AppState,
        current: CurrentSession,
    ) -> Option<Self> {
        let session = current.session;
        let (mut connection_id, mut outbound) =
            state.hub.register(&session, current.account.role).await;

        let role: Role = match state.auth.authenticate(session.id).await {
            Ok((_, account)) => account.role,
            Err(err) => {
                tracing::info!(
                    session_id = %session.id,
                    error = %err,
                    "session ended before websocket registration completed"
                );
                state.hub.unregister(connection_id).await;
                let _ = socket.send(close_message()).await;
                return None;
            }
        };
        if role != current.account.role {
            state.hub.unregister(connection_id).await;
            (connection_id, outbound) = state.hub.register(&session, role).await;
        }

        Some(Self {
            socket,
            state,
            user_id: session.user_id,
            session_id: session.id,
            connection_id,
            outbound,
        })
    }

    /// 连接主循环，直到任一方关闭
    pub async fn run(self) {
        let Self {
            socket,
            state,
            user_id,
            session_id,
            connection_id,
            mut outbound,
        } = self;
        let (mut sender, mut incoming) = socket.split();

        loop {
            tokio::select! {
                command = outbound.recv() => match command {
                    Some(Outbound::Event(event)) => {
                        let payload = match serde_json::to_string(&event) {
                            Ok(json) => json,
                            Err(err) => {
                                tracing::warn!(error = %err, "failed to serialize websocket payload");
                                continue;
                            }
                        };
                        if sender.send(WsMessage::Text(payload.into())).await.is_err() {
                            tracing::debug!(connection_id = %connection_id, "websocket send failed");
                            break;
                        }
                    }
                    // 服务端要求关闭（登出、封禁、删除），或广播中心已移除该连接
                    Some(Outbound::Close) | None => {
                        let _ = sender.send(close_message()).await;
                        break;
                    }
                },
                message = incoming.next() => match message {
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(WsMessage::Ping(data))) => {
                        if sender.send(WsMessage::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {
                        tracing::debug!(connection_id = %connection_id, "ignored client frame");
                    }
                    Some(Err(err)) => {
                        tracing::debug!(connection_id = %connection_id, error = %err, "websocket read failed");
                        break;
                    }
                },
            }
        }

        state.hub.unregister(connection_id).await;
        tracing::info!(
            user_id = %user_id,
            session_id = %session_id,
            connection_id = %connection_id,
            "websocket closed"
        );
    }
}

fn close_message() -> WsMessage {
    WsMessage::Close(Some(CloseFrame {
        code: close_code::NORMAL,
        reason: "session ended".into(),
    }))
}
