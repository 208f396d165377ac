//! 主应用程序入口
//!
//! 加载配置、组装服务并启动 Axum Web API 服务。

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use application::{Clock, MailSender, PasswordHasher, SnapshotStore, SystemClock};
use axum::{http::HeaderValue, Router};
use config::AppConfig;
use infrastructure::{BcryptPasswordHasher, JsonSnapshotStore, LogMailSender};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::EnvFilter;
use web_api::{router, Adapters, AppState, Repositories};

/// 过期验证码与限流窗口的清理周期
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("failed to load configuration")?;

    // RUST_LOG 优先，否则使用配置中的级别
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log.level))
        .context("invalid log filter")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!(config = %config.sanitize(), "configuration loaded");

    let repositories = match &config.storage.data_dir {
        Some(dir) => {
            let store: Arc<dyn SnapshotStore> = Arc::new(
                JsonSnapshotStore::open(dir.clone())
                    .await
                    .with_context(|| format!("failed to open data directory {}", dir.display()))?,
            );
            tracing::info!(data_dir = %dir.display(), "using snapshot storage");
            Repositories::persistent(store)
                .await
                .context("failed to restore snapshots")?
        }
        None => {
            tracing::warn!("storage.data_dir is not set, all data lives in memory");
            Repositories::in_memory()
        }
    };

    let password_hasher: Arc<dyn PasswordHasher> =
        Arc::new(BcryptPasswordHasher::new(config.auth.bcrypt_cost));
    let mailer: Arc<dyn MailSender> = Arc::new(LogMailSender);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let state = AppState::assemble(
        &config,
        repositories,
        Adapters {
            password_hasher,
            mailer,
            clock,
        },
    );

    spawn_cleanup(state.clone());

    let app = with_layers(router(state), &config.server.cors_origins);
    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;

    tracing::info!("聊天服务器启动在 http://{}", address);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("server stopped");
    Ok(())
}

fn with_layers(app: Router, cors_origins: &[String]) -> Router {
    let cors = if cors_origins.iter().any(|origin| origin == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = cors_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(err) => {
                    tracing::warn!(origin = %origin, error = %err, "ignoring invalid cors origin");
                    None
                }
            })
            .collect();
        // 携带 cookie 的跨域请求需要明确列出来源
        CorsLayer::new()
            .allow_origin(origins)
            .allow_credentials(true)
            .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
            .allow_headers([
                axum::http::header::CONTENT_TYPE,
                axum::http::header::AUTHORIZATION,
            ])
    };

    app.layer(CompressionLayer::new())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn spawn_cleanup(state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
        loop {
            interval.tick().await;
            match state.auth.purge_expired().await {
                Ok(0) => {}
                Ok(purged) => tracing::debug!(purged, "expired verification codes purged"),
                Err(err) => tracing::warn!(error = %err, "periodic cleanup failed"),
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
