/// LPM-OS - 控制面
///
/// 操作员入口：建单、审批、统计与大盘推送，
/// 另有后台监听负责 Agent 掉线对账

mod api;
mod app_state;
mod config;
mod services;
mod watcher;
mod ws;

use std::net::SocketAddr;

use anyhow::Context;
use axum::routing::get;
use axum::Router;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use common::{Store, StoreConfig};

use crate::app_state::AppState;
use crate::ws::DashboardHub;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("🚀 启动控制面...");

    dotenvy::dotenv().ok();
    let cfg = config::Config::from_env()?;
    info!("✅ 配置加载成功");

    // 连接 etcd
    let store = Store::connect(StoreConfig::from_endpoints(cfg.etcd_endpoints.clone()))
        .await
        .context("连接 etcd 失败")?;
    info!("✅ etcd 连接成功");

    // 大盘广播中心
    let hub = DashboardHub::new();
    let app_state = AppState::new(store, hub);

    // 根监听：大盘推送 + 租约对账
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    watcher::spawn_root_watch(app_state.clone(), shutdown_rx);
    info!("✅ 根监听已启动");

    // 设置 CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // 构建应用路由
    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws::handle_dashboard_websocket))
        .nest("/api/v1", api::api_routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state.clone());

    // 启动服务器
    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.api_port));
    info!("🎯 控制面监听在 http://{}", addr);
    info!("   大盘 WebSocket: ws://{}/ws", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("绑定 API 端口失败")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("收到退出信号, 开始关停...");
        })
        .await?;

    let _ = shutdown_tx.send(true);
    info!("控制面已退出");
    Ok(())
}

async fn health_handler() -> &'static str {
    "OK"
}
