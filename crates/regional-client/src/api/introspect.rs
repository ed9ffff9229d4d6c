/// PXE 基础设施只读巡检接口
///
/// 未启用的子系统一律回 503

use axum::extract::State;
use axum::Json;
use serde_json::json;

use common::utils::format_bytes;
use common::Error;

use crate::state::RegionalState;
use crate::tftp::FileManager;

use super::{api_error, ApiError};

/// GET /api/v1/pxe/dhcp/status
pub async fn dhcp_status(
    State(state): State<RegionalState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let dhcp = state
        .dhcp
        .as_ref()
        .ok_or_else(|| api_error(Error::SubsystemDisabled("DHCP".into())))?;

    let bindings = dhcp.static_bindings().await;
    Ok(Json(json!({
        "status": "running",
        "static_bindings": bindings.len(),
    })))
}

/// GET /api/v1/pxe/dhcp/leases
pub async fn dhcp_leases(
    State(state): State<RegionalState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let dhcp = state
        .dhcp
        .as_ref()
        .ok_or_else(|| api_error(Error::SubsystemDisabled("DHCP".into())))?;

    let leases = dhcp.leases().await;
    let bindings = dhcp.static_bindings().await;
    Ok(Json(json!({
        "leases": leases,
        "bindings": bindings,
    })))
}

/// GET /api/v1/pxe/tftp/status
pub async fn tftp_status(
    State(state): State<RegionalState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let tftp = state
        .tftp
        .as_ref()
        .ok_or_else(|| api_error(Error::SubsystemDisabled("TFTP".into())))?;

    let stats = tftp.stats();
    Ok(Json(json!({
        "status": "running",
        "total_requests": stats.total_requests,
        "success": stats.success_requests,
        "failed": stats.failed_requests,
        "bytes_served": stats.bytes_served,
        "bytes_served_human": format_bytes(stats.bytes_served),
    })))
}

/// GET /api/v1/pxe/tftp/files
pub async fn tftp_files(
    State(state): State<RegionalState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let tftp = state
        .tftp
        .as_ref()
        .ok_or_else(|| api_error(Error::SubsystemDisabled("TFTP".into())))?;

    let files = tftp.list_files().map_err(api_error)?;
    Ok(Json(json!({
        "total": files.len(),
        "files": files,
    })))
}

/// GET /api/v1/pxe/configs
pub async fn pxe_configs(
    State(state): State<RegionalState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let pxe = state
        .pxe
        .as_ref()
        .ok_or_else(|| api_error(Error::SubsystemDisabled("PXE".into())))?;

    let configs = pxe.list().map_err(api_error)?;
    Ok(Json(json!({
        "total": configs.len(),
        "configs": configs,
    })))
}

/// GET /api/v1/files/static 调试与校验用
pub async fn list_static_files(
    State(state): State<RegionalState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    list_tree(&state, "static", "/static")
}

/// GET /api/v1/files/repos
pub async fn list_repo_files(
    State(state): State<RegionalState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    list_tree(&state, "repos", "/repos")
}

fn list_tree(
    state: &RegionalState,
    subdir: &str,
    display_path: &str,
) -> Result<Json<serde_json::Value>, ApiError> {
    let manager = FileManager::new(state.static_root.join(subdir));
    let files = manager.list_files().map_err(api_error)?;
    Ok(Json(json!({
        "path": display_path,
        "total": files.len(),
        "files": files,
    })))
}
