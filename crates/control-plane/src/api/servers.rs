/// 服务器索引接口

use axum::extract::{Path, State};
use axum::Json;
use serde_json::json;

use crate::app_state::AppState;
use crate::services::task_service::TaskService;

use super::{api_error, ApiError};

/// 枚举 IDC 内服务器
pub async fn list_servers(
    State(state): State<AppState>,
    Path(idc): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let service = TaskService::new(state);
    let servers = service.list_servers(&idc).await.map_err(api_error)?;
    Ok(Json(json!({
        "idc": idc,
        "total": servers.len(),
        "servers": servers,
    })))
}
