//! 会话令牌与请求上下文提取
//!
//! 令牌是签名的 JWT，只携带用户 id、会话 id 和过期时间；会话是否仍然有效
//! 以服务端记录为准，因此登出或封禁后旧令牌立即失效。
//! 令牌按以下顺序查找：`session_token` cookie、`Authorization: Bearer`、
//! 查询参数 `token`（仅用于 WebSocket 握手）。

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{header, request::Parts, HeaderMap},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Duration;
use domain::{Account, Session, SessionId, UserId};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::ApiError, state::AppState};

pub const SESSION_COOKIE: &str = "session_token";

/// JWT Claims 结构
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// 用户 id
    pub sub: Uuid,
    /// 服务端会话 id
    pub sid: Uuid,
    pub exp: i64,
}

impl Claims {
    pub fn session_id(&self) -> SessionId {
        SessionId::from(self.sid)
    }
}

/// JWT Token 服务
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    session_lifetime: Duration,
}

impl JwtService {
    pub fn new(secret: &str, session_hours: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            session_lifetime: Duration::hours(session_hours),
        }
    }

    /// 为会话签发令牌，过期时间从会话创建时刻起算
    pub fn issue(&self, session: &Session) -> Result<String, ApiError> {
        let claims = Claims {
            sub: session.user_id.into(),
            sid: session.id.into(),
            exp: (session.created_at + self.session_lifetime).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding_key).map_err(|err| {
            tracing::error!(error = %err, "token generation failed");
            ApiError::internal_server_error()
        })
    }

    /// 验证并解析 JWT token
    pub fn verify(&self, token: &str) -> Result<Claims, ApiError> {
        decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|err| {
                tracing::debug!(error = %err, "invalid session token");
                ApiError::unauthorized("未登录或会话已失效")
            })
    }
}

/// 构造会话 cookie
pub fn session_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

/// 用于清除会话 cookie
pub fn expired_session_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, "")).path("/").build()
}

fn token_from_parts(parts: &Parts) -> Option<String> {
    let jar = CookieJar::from_headers(&parts.headers);
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        if !cookie.value().is_empty() {
            return Some(cookie.value().to_owned());
        }
    }

    if let Some(token) = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
    {
        return Some(token.trim().to_owned());
    }

    parts.uri.query().and_then(|query| {
        query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| *key == "token")
            .map(|(_, value)| value.to_owned())
    })
}

/// 已认证的请求上下文：有效会话以及当前仍为 Active 的账号
#[derive(Debug, Clone)]
pub struct CurrentSession {
    pub session: Session,
    pub account: Account,
}

impl CurrentSession {
    pub fn user_id(&self) -> UserId {
        self.account.id
    }
}

impl FromRequestParts<AppState> for CurrentSession {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = token_from_parts(parts).ok_or_else(|| ApiError::unauthorized("未登录"))?;
        let claims = state.jwt.verify(&token)?;
        let (session, account) = state.auth.authenticate(claims.session_id()).await?;
        if account.id != UserId::from(claims.sub) {
            tracing::warn!(session_id = %session.id, "token subject does not match session owner");
            return Err(ApiError::unauthorized("未登录或会话已失效"));
        }
        Ok(Self { session, account })
    }
}

/// 签名有效的令牌（不检查会话是否仍存在），用于登出和查询当前用户
#[derive(Debug, Clone)]
pub struct SessionClaims(pub Option<Claims>);

impl FromRequestParts<AppState> for SessionClaims {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(Self(
            token_from_parts(parts).and_then(|token| state.jwt.verify(&token).ok()),
        ))
    }
}

/// 客户端地址：优先取 `X-Forwarded-For` 的第一跳，否则取对端地址
#[derive(Debug, Clone)]
pub struct ClientIp(pub String);

impl ClientIp {
    fn from_headers(headers: &HeaderMap) -> Option<String> {
        headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .map(str::to_owned)
    }
}

impl<S: Send + Sync> FromRequestParts<S> for ClientIp {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ip = Self::from_headers(&parts.headers)
            .or_else(|| {
                parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip().to_string())
            })
            .unwrap_or_else(|| "unknown".to_owned());
        Ok(Self(ip))
    }
}
