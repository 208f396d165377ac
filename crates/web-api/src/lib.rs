//! Web API 层。
//!
//! 提供 Axum 路由，将 HTTP / WebSocket 请求委托给应用层的用例服务，
//! 所有响应使用统一的 `{success, message, data}` 信封。

mod auth;
mod error;
mod routes;
mod state;
mod websocket;
mod ws_connection;

pub use auth::{Claims, JwtService, SESSION_COOKIE};
pub use error::{ApiError, ApiResponse};
pub use routes::router;
pub use state::{auth_policy, Adapters, AppState, Repositories};
