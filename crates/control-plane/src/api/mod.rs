/// 操作员 API

pub mod servers;
pub mod stats;
pub mod tasks;

use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use crate::app_state::AppState;

/// 错误响应
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

pub(crate) type ApiError = (StatusCode, Json<ErrorResponse>);

/// 错误类型到状态码的映射；冲突对外收敛为 500
pub(crate) fn api_error(err: common::Error) -> ApiError {
    use common::Error;
    let status = match &err {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::SubsystemDisabled(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let error = if matches!(err, Error::Conflict(_)) {
        "内部错误, 请稍后重试".to_string()
    } else {
        err.to_string()
    };
    (
        status,
        Json(ErrorResponse {
            success: false,
            error,
        }),
    )
}

/// 所有 API 路由（统一入口）
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/tasks", post(tasks::create_task).get(tasks::list_tasks))
        .route("/tasks/:idc/:sn", get(tasks::get_task))
        .route("/tasks/:idc/:sn/approve", post(tasks::approve_task))
        .route("/tasks/:idc/:sn/reject", post(tasks::reject_task))
        .route("/servers/:idc", get(servers::list_servers))
        .route("/stats", get(stats::list_stats))
        .route("/stats/:idc", get(stats::get_stats))
}
