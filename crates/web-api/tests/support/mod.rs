#![allow(dead_code)]

use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};

use application::{RecordingMailSender, SystemClock};
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use config::AppConfig;
use infrastructure::BcryptPasswordHasher;
use serde_json::{json, Value};
use tower::ServiceExt;
use web_api::{router, Adapters, AppState, Repositories};

pub const PASSWORD: &str = "secret1";

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.auth.jwt_secret = "integration-test-secret-0123456789abcdef".into();
    config.auth.bcrypt_cost = 4;
    config
}

pub struct TestApp {
    pub state: AppState,
    pub router: Router,
    pub mailer: Arc<RecordingMailSender>,
    next_ip: AtomicU32,
}

/// 已登录的测试用户
#[derive(Debug, Clone)]
pub struct TestUser {
    pub id: String,
    pub email: String,
    pub token: String,
}

impl TestApp {
    pub fn new() -> Self {
        let mailer = Arc::new(RecordingMailSender::new());
        let state = AppState::assemble(
            &test_config(),
            Repositories::in_memory(),
            Adapters {
                password_hasher: Arc::new(BcryptPasswordHasher::new(4)),
                mailer: mailer.clone(),
                clock: Arc::new(SystemClock),
            },
        );
        Self {
            router: router(state.clone()),
            state,
            mailer,
            next_ip: AtomicU32::new(1),
        }
    }

    /// 每次调用返回不同的客户端地址，避免触发按 IP 的限流
    pub fn fresh_ip(&self) -> String {
        format!("198.51.100.{}", self.next_ip.fetch_add(1, Ordering::Relaxed))
    }

    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        ip: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value, Vec<String>) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        if let Some(ip) = ip {
            builder = builder.header("x-forwarded-for", ip);
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let cookies = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok().map(str::to_owned))
            .collect();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value, cookies)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        let (status, body, _) = self.call(Method::GET, uri, token, None, None).await;
        (status, body)
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        let (status, body, _) = self.call(Method::POST, uri, token, None, Some(body)).await;
        (status, body)
    }

    /// 走完整的验证码注册流程，返回注册接口的响应
    pub async fn register(&self, username: &str, email: &str) -> (StatusCode, Value) {
        let ip = self.fresh_ip();
        let (status, body, _) = self
            .call(
                Method::POST,
                "/api/send-verification-code",
                None,
                Some(&ip),
                Some(json!({ "email": email })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "send code failed: {body}");

        let code = self.mailer.last_code_for(email).expect("verification mail");
        let (status, body, _) = self
            .call(
                Method::POST,
                "/api/register",
                None,
                Some(&ip),
                Some(json!({
                    "username": username,
                    "email": email,
                    "password": PASSWORD,
                    "code": code,
                })),
            )
            .await;
        (status, body)
    }

    /// 注册第一个账号，即管理员
    pub async fn register_admin(&self) -> TestUser {
        let email = "admin@example.com".to_owned();
        let (status, body) = self.register("admin", &email).await;
        assert_eq!(status, StatusCode::OK, "admin registration failed: {body}");
        TestUser {
            id: body["data"]["user"]["id"].as_str().unwrap().to_owned(),
            token: body["data"]["token"].as_str().unwrap().to_owned(),
            email,
        }
    }

    /// 注册一个直接激活的普通成员（要求注册开放且无需审核）
    pub async fn register_member(&self, username: &str) -> TestUser {
        let email = format!("{}@example.com", username.to_lowercase());
        let (status, body) = self.register(username, &email).await;
        assert_eq!(status, StatusCode::OK, "registration failed: {body}");
        TestUser {
            id: body["data"]["user"]["id"].as_str().unwrap().to_owned(),
            token: body["data"]["token"].as_str().unwrap().to_owned(),
            email,
        }
    }

    pub async fn login(&self, email: &str) -> (StatusCode, Value) {
        let ip = self.fresh_ip();
        let (status, body, _) = self
            .call(
                Method::POST,
                "/api/login",
                None,
                Some(&ip),
                Some(json!({ "email": email, "password": PASSWORD })),
            )
            .await;
        (status, body)
    }

    pub async fn promote(&self, admin: &TestUser, user: &TestUser) {
        let (status, body) = self
            .post(
                "/api/set-deputy-admin",
                Some(&admin.token),
                json!({ "user_id": user.id, "is_deputy": true }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "promotion failed: {body}");
    }
}
