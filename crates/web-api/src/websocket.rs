//! WebSocket 处理器
//!
//! 握手前完成认证（令牌可以放在 cookie、Bearer 头或 `?token=` 中），
//! 升级成功后把连接交给 [`WebSocketConnection`]。

use axum::{
    extract::{State, WebSocketUpgrade},
    response::Response,
};

use crate::{auth::CurrentSession, state::AppState, ws_connection::WebSocketConnection};

pub async fn websocket_upgrade(
    State(state): State<AppState>,
    current: CurrentSession,
    ws: WebSocketUpgrade,
) -> Response {
    tracing::info!(
        user_id = %current.account.id,
        session_id = %current.session.id,
        "websocket upgrade"
    );
    ws.on_upgrade(move |socket| async move {
        if let Some(connection) = WebSocketConnection::open(socket, state, current).await {
            connection.run().await;
        }
    })
}
