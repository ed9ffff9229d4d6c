/// Agent 面向的 HTTP API
///
/// 除存储访问与原子更新外所有处理器无状态

pub mod agent;
pub mod device;
pub mod introspect;
pub mod provision;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::state::RegionalState;

/// 统一错误应答
pub(crate) type ApiError = (StatusCode, Json<serde_json::Value>);

/// 错误类型到状态码的映射
///
/// Conflict 对外只给出笼统消息，细节留在日志里
pub(crate) fn api_error(err: common::Error) -> ApiError {
    use common::Error;
    match &err {
        Error::NotFound(_) => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": err.to_string()})),
        ),
        Error::Validation(_) => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": err.to_string()})),
        ),
        Error::SubsystemDisabled(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": err.to_string()})),
        ),
        Error::Conflict(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "内部错误, 请稍后重试"})),
        ),
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": err.to_string()})),
        ),
    }
}

/// 构建全部路由
pub fn router(state: RegionalState) -> Router {
    let api = Router::new()
        .route("/report", post(agent::handle_report))
        .route("/progress", post(agent::handle_progress))
        .route("/task/:sn", get(agent::get_task))
        .route("/device/isInInstallQueue", post(device::is_in_install_queue))
        .route("/device/getNextOperation", post(device::get_next_operation))
        .route("/device/getHardwareConfig", post(device::get_hardware_config))
        .route(
            "/device/getOSInstallConfig",
            post(device::get_os_install_config),
        )
        .route("/device/operationComplete", post(device::operation_complete))
        .route("/device/installComplete", post(device::install_complete))
        .route("/kickstart/:sn", get(provision::generate_kickstart))
        .route("/preseed/:sn", get(provision::generate_preseed))
        .route("/pxe/dhcp/status", get(introspect::dhcp_status))
        .route("/pxe/dhcp/leases", get(introspect::dhcp_leases))
        .route("/pxe/tftp/status", get(introspect::tftp_status))
        .route("/pxe/tftp/files", get(introspect::tftp_files))
        .route("/pxe/configs", get(introspect::pxe_configs))
        .route("/files/static", get(introspect::list_static_files))
        .route("/files/repos", get(introspect::list_repo_files));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // 内核、initramfs 与软件源以静态文件树原样暴露
    let static_dir = state.static_root.join("static");
    let repos_dir = state.static_root.join("repos");

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api)
        .nest_service("/static", ServeDir::new(static_dir))
        .nest_service("/repos", ServeDir::new(repos_dir))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// 健康检查
async fn health(State(state): State<RegionalState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "idc": state.idc,
        "dhcp": if state.dhcp.is_some() { "enabled" } else { "disabled" },
        "tftp": if state.tftp.is_some() { "enabled" } else { "disabled" },
        "pxe": if state.pxe.is_some() { "enabled" } else { "disabled" },
    }))
}
