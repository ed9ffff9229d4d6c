/// 统计接口

use axum::extract::{Path, State};
use axum::Json;
use serde_json::json;

use common::models::IdcStats;

use crate::app_state::AppState;
use crate::services::stats_service::StatsService;

use super::{api_error, ApiError};

/// 单个 IDC 统计（未命中缓存时即时计算）
pub async fn get_stats(
    State(state): State<AppState>,
    Path(idc): Path<String>,
) -> Result<Json<IdcStats>, ApiError> {
    let service = StatsService::new(state);
    let stats = service.get_stats(&idc).await.map_err(api_error)?;
    Ok(Json(stats))
}

/// 全部已缓存的 IDC 统计
pub async fn list_stats(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let service = StatsService::new(state);
    let all = service.list_stats().await.map_err(api_error)?;
    Ok(Json(json!({
        "total": all.len(),
        "stats": all,
    })))
}
