use std::collections::BTreeSet;

use axum::{
    extract::{FromRequest, FromRequestParts, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use domain::{MessageId, MessageView, Role, SystemSettings, UserId, UserStatus, UserView};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use application::{AddUserRequest, LoginRequest, RegisterRequest};

use crate::{
    auth::{expired_session_cookie, session_cookie, ClientIp, CurrentSession, SessionClaims},
    error::{ApiError, ApiResponse},
    state::AppState,
    websocket::websocket_upgrade,
};

/// JSON 请求体，解析失败时同样返回统一的错误信封
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

#[derive(Debug, Deserialize)]
struct EmailPayload {
    email: String,
}

#[derive(Debug, Deserialize)]
struct RegisterPayload {
    username: String,
    email: String,
    password: String,
    code: String,
    #[serde(default)]
    avatar: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginPayload {
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct UserIdPayload {
    user_id: Uuid,
}

#[derive(Debug, Deserialize)]
struct DisplayNamePayload {
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserDisplayNamePayload {
    user_id: Uuid,
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AddUserPayload {
    username: String,
    email: String,
    password: String,
    #[serde(default)]
    avatar: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeputyPayload {
    user_id: Uuid,
    is_deputy: bool,
}

#[derive(Debug, Deserialize)]
struct StatusPayload {
    user_id: Uuid,
    status: UserStatus,
}

#[derive(Debug, Deserialize)]
struct MutePayload {
    user_id: Uuid,
    duration_minutes: i64,
}

#[derive(Debug, Deserialize)]
struct SettingsPayload {
    registration_open: bool,
    require_approval: bool,
}

#[derive(Debug, Deserialize)]
struct MessagesQuery {
    since: Option<Uuid>,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct SendMessagePayload {
    content: String,
}

#[derive(Debug, Deserialize)]
struct RecallPayload {
    message_id: Uuid,
}

#[derive(Debug, Deserialize)]
struct MarkCheckedPayload {
    message_ids: Vec<Uuid>,
}

/// 登录或注册成功后返回的数据
#[derive(Debug, Serialize)]
struct SessionData {
    user: UserView,
    /// 同时写入 cookie；非浏览器客户端可以用作 Bearer 令牌
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api", api_routes())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/public-settings", get(public_settings))
        .route("/send-verification-code", post(send_verification_code))
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/current-user", get(current_user))
        .route("/delete-account", post(delete_account))
        .route("/update-display-name", post(update_display_name))
        .route("/update-user-display-name", post(update_user_display_name))
        .route("/users", get(list_users))
        .route("/pending-users", get(list_pending_users))
        .route("/approve-user", post(approve_user))
        .route("/reject-user", post(reject_user))
        .route("/add-user", post(add_user))
        .route("/delete-user", post(delete_user))
        .route("/ban-user", post(ban_user))
        .route("/set-user-status", post(set_user_status))
        .route("/set-deputy-admin", post(set_deputy_admin))
        .route("/mute-user", post(mute_user))
        .route("/unmute-user", post(unmute_user))
        .route("/settings", get(get_settings))
        .route("/update-settings", post(update_settings))
        .route("/messages", get(list_messages))
        .route("/send-message", post(send_message))
        .route("/recall-message", post(recall_message))
        .route("/mention-checks", get(list_mention_checks))
        .route("/mark-mentions-checked", post(mark_mentions_checked))
        .route("/unread-mentions", get(unread_mentions))
        .route("/ws", get(websocket_upgrade))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn public_settings(State(state): State<AppState>) -> ApiResult<SystemSettings> {
    Ok(ApiResponse::data(state.settings.public_settings().await?))
}

async fn send_verification_code(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    ApiJson(payload): ApiJson<EmailPayload>,
) -> ApiResult<()> {
    state.auth.send_verification_code(payload.email, &ip).await?;
    Ok(ApiResponse::message("验证码已发送，请查收邮件"))
}

async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    ClientIp(ip): ClientIp,
    ApiJson(payload): ApiJson<RegisterPayload>,
) -> Result<(CookieJar, Json<ApiResponse<SessionData>>), ApiError> {
    let registration = state
        .auth
        .register(
            RegisterRequest {
                username: payload.username,
                email: payload.email,
                password: payload.password,
                code: payload.code,
                avatar: payload.avatar,
            },
            &ip,
        )
        .await?;

    match registration.session {
        Some(session) => {
            let token = state.jwt.issue(&session)?;
            let jar = jar.add(session_cookie(token.clone(), state.cookie_secure));
            Ok((
                jar,
                ApiResponse::with_message(
                    SessionData {
                        user: registration.account,
                        token: Some(token),
                    },
                    "注册成功",
                ),
            ))
        }
        None => Ok((
            jar,
            ApiResponse::with_message(
                SessionData {
                    user: registration.account,
                    token: None,
                },
                "注册成功，请等待管理员审核",
            ),
        )),
    }
}

async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    ClientIp(ip): ClientIp,
    ApiJson(payload): ApiJson<LoginPayload>,
) -> Result<(CookieJar, Json<ApiResponse<SessionData>>), ApiError> {
    let signed_in = state
        .auth
        .login(
            LoginRequest {
                email: payload.email,
                password: payload.password,
            },
            &ip,
        )
        .await?;
    for session_id in &signed_in.evicted {
        let closed = state.hub.disconnect_session(*session_id).await;
        tracing::debug!(session_id = %session_id, closed, "evicted session channels closed");
    }
    let token = state.jwt.issue(&signed_in.session)?;
    let jar = jar.add(session_cookie(token.clone(), state.cookie_secure));
    Ok((
        jar,
        ApiResponse::with_message(
            SessionData {
                user: signed_in.account,
                token: Some(token),
            },
            "登录成功",
        ),
    ))
}

/// 登出是幂等的：令牌无效时也会清除 cookie
async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
    SessionClaims(claims): SessionClaims,
) -> Result<(CookieJar, Json<ApiResponse<()>>), ApiError> {
    if let Some(claims) = claims {
        let session_id = claims.session_id();
        state.auth.logout(session_id).await?;
        let closed = state.hub.disconnect_session(session_id).await;
        tracing::debug!(session_id = %session_id, closed, "session channels closed on logout");
    }
    Ok((
        jar.remove(expired_session_cookie()),
        ApiResponse::message("已退出登录"),
    ))
}

async fn current_user(
    State(state): State<AppState>,
    SessionClaims(claims): SessionClaims,
) -> ApiResult<Option<UserView>> {
    let user = match claims {
        Some(claims) => state.auth.current_user(claims.session_id()).await?,
        None => None,
    };
    Ok(Json(ApiResponse {
        success: true,
        message: None,
        data: Some(user),
    }))
}

async fn delete_account(
    State(state): State<AppState>,
    jar: CookieJar,
    current: CurrentSession,
) -> Result<(CookieJar, Json<ApiResponse<()>>), ApiError> {
    state.moderation.delete_own_account(current.user_id()).await?;
    Ok((
        jar.remove(expired_session_cookie()),
        ApiResponse::message("账号已注销"),
    ))
}

async fn update_display_name(
    State(state): State<AppState>,
    current: CurrentSession,
    ApiJson(payload): ApiJson<DisplayNamePayload>,
) -> ApiResult<UserView> {
    let user_id = current.user_id();
    let user = state
        .moderation
        .update_display_name(user_id, user_id, payload.display_name)
        .await?;
    Ok(ApiResponse::with_message(user, "显示名称已更新"))
}

async fn update_user_display_name(
    State(state): State<AppState>,
    current: CurrentSession,
    ApiJson(payload): ApiJson<UserDisplayNamePayload>,
) -> ApiResult<UserView> {
    let user = state
        .moderation
        .update_display_name(
            current.user_id(),
            UserId::from(payload.user_id),
            payload.display_name,
        )
        .await?;
    Ok(ApiResponse::with_message(user, "显示名称已更新"))
}

async fn list_users(
    State(state): State<AppState>,
    current: CurrentSession,
) -> ApiResult<Vec<UserView>> {
    Ok(ApiResponse::data(
        state.directory.list_users(current.user_id()).await?,
    ))
}

async fn list_pending_users(
    State(state): State<AppState>,
    current: CurrentSession,
) -> ApiResult<Vec<UserView>> {
    Ok(ApiResponse::data(
        state.directory.list_pending(current.user_id()).await?,
    ))
}

async fn approve_user(
    State(state): State<AppState>,
    current: CurrentSession,
    ApiJson(payload): ApiJson<UserIdPayload>,
) -> ApiResult<UserView> {
    let user = state
        .moderation
        .approve(current.user_id(), UserId::from(payload.user_id))
        .await?;
    Ok(ApiResponse::with_message(user, "已通过审核"))
}

async fn reject_user(
    State(state): State<AppState>,
    current: CurrentSession,
    ApiJson(payload): ApiJson<UserIdPayload>,
) -> ApiResult<()> {
    state
        .moderation
        .reject(current.user_id(), UserId::from(payload.user_id))
        .await?;
    Ok(ApiResponse::message("已拒绝该注册申请"))
}

async fn add_user(
    State(state): State<AppState>,
    current: CurrentSession,
    ApiJson(payload): ApiJson<AddUserPayload>,
) -> ApiResult<UserView> {
    let user = state
        .moderation
        .add_user(
            current.user_id(),
            AddUserRequest {
                username: payload.username,
                email: payload.email,
                password: payload.password,
                avatar: payload.avatar,
                display_name: payload.display_name,
            },
        )
        .await?;
    Ok(ApiResponse::with_message(user, "用户已添加"))
}

async fn delete_user(
    State(state): State<AppState>,
    current: CurrentSession,
    ApiJson(payload): ApiJson<UserIdPayload>,
) -> ApiResult<()> {
    state
        .moderation
        .delete_account(current.user_id(), UserId::from(payload.user_id))
        .await?;
    Ok(ApiResponse::message("用户已删除"))
}

async fn ban_user(
    State(state): State<AppState>,
    current: CurrentSession,
    ApiJson(payload): ApiJson<UserIdPayload>,
) -> ApiResult<()> {
    state
        .moderation
        .ban_account(current.user_id(), UserId::from(payload.user_id))
        .await?;
    Ok(ApiResponse::message("用户已封禁"))
}

async fn set_user_status(
    State(state): State<AppState>,
    current: CurrentSession,
    ApiJson(payload): ApiJson<StatusPayload>,
) -> ApiResult<UserView> {
    let user = state
        .moderation
        .set_status(current.user_id(), UserId::from(payload.user_id), payload.status)
        .await?;
    Ok(ApiResponse::with_message(user, "账号状态已更新"))
}

async fn set_deputy_admin(
    State(state): State<AppState>,
    current: CurrentSession,
    ApiJson(payload): ApiJson<DeputyPayload>,
) -> ApiResult<UserView> {
    let role = if payload.is_deputy {
        Role::DeputyAdmin
    } else {
        Role::Member
    };
    let user = state
        .moderation
        .set_role(current.user_id(), UserId::from(payload.user_id), role)
        .await?;
    Ok(ApiResponse::with_message(user, "角色已更新"))
}

async fn mute_user(
    State(state): State<AppState>,
    current: CurrentSession,
    ApiJson(payload): ApiJson<MutePayload>,
) -> ApiResult<UserView> {
    let user = state
        .moderation
        .set_mute(
            current.user_id(),
            UserId::from(payload.user_id),
            Some(payload.duration_minutes),
        )
        .await?;
    Ok(ApiResponse::with_message(user, "已禁言"))
}

async fn unmute_user(
    State(state): State<AppState>,
    current: CurrentSession,
    ApiJson(payload): ApiJson<UserIdPayload>,
) -> ApiResult<UserView> {
    let user = state
        .moderation
        .set_mute(current.user_id(), UserId::from(payload.user_id), None)
        .await?;
    Ok(ApiResponse::with_message(user, "已解除禁言"))
}

async fn get_settings(
    State(state): State<AppState>,
    current: CurrentSession,
) -> ApiResult<SystemSettings> {
    Ok(ApiResponse::data(
        state.settings.get_settings(current.user_id()).await?,
    ))
}

async fn update_settings(
    State(state): State<AppState>,
    current: CurrentSession,
    ApiJson(payload): ApiJson<SettingsPayload>,
) -> ApiResult<SystemSettings> {
    let settings = state
        .settings
        .update_settings(
            current.user_id(),
            payload.registration_open,
            payload.require_approval,
        )
        .await?;
    Ok(ApiResponse::with_message(settings, "设置已保存"))
}

async fn list_messages(
    State(state): State<AppState>,
    current: CurrentSession,
    ApiQuery(query): ApiQuery<MessagesQuery>,
) -> ApiResult<Vec<MessageView>> {
    let messages = state
        .messages
        .list(
            current.user_id(),
            query.since.map(MessageId::from),
            query.limit,
        )
        .await?;
    Ok(ApiResponse::data(messages))
}

async fn send_message(
    State(state): State<AppState>,
    current: CurrentSession,
    ApiJson(payload): ApiJson<SendMessagePayload>,
) -> ApiResult<MessageView> {
    let message = state
        .messages
        .post(current.user_id(), payload.content)
        .await?;
    Ok(ApiResponse::data(message))
}

async fn recall_message(
    State(state): State<AppState>,
    current: CurrentSession,
    ApiJson(payload): ApiJson<RecallPayload>,
) -> ApiResult<MessageView> {
    let message = state
        .messages
        .recall(current.user_id(), MessageId::from(payload.message_id))
        .await?;
    Ok(ApiResponse::with_message(message, "消息已撤回"))
}

async fn list_mention_checks(
    State(state): State<AppState>,
    current: CurrentSession,
) -> ApiResult<BTreeSet<MessageId>> {
    Ok(ApiResponse::data(
        state.mentions.list_checked(current.user_id()).await?,
    ))
}

async fn mark_mentions_checked(
    State(state): State<AppState>,
    current: CurrentSession,
    ApiJson(payload): ApiJson<MarkCheckedPayload>,
) -> ApiResult<BTreeSet<MessageId>> {
    let ids: Vec<MessageId> = payload.message_ids.into_iter().map(MessageId::from).collect();
    Ok(ApiResponse::data(
        state.mentions.mark_checked(current.user_id(), &ids).await?,
    ))
}

async fn unread_mentions(
    State(state): State<AppState>,
    current: CurrentSession,
) -> ApiResult<Vec<MessageView>> {
    Ok(ApiResponse::data(
        state.mentions.unread_mentions(current.user_id()).await?,
    ))
}
