/// 硬件上报、进度上报与任务查询

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;
use tracing::{info, warn};

use common::models::{
    AgentProgressRequest, AgentReportRequest, ServerEntry, ServerStatus, Task, TaskStatus,
};
use common::utils::{mac_eq, validate_mac_address};
use common::{keys, Error};

use crate::state::RegionalState;

use super::{api_error, ApiError};

/// POST /api/v1/report
///
/// 原子更新任务：MAC 不匹配拒绝、空 MAC 补齐、追加 hardware_collect 进度与日志。
/// 硬件原始数据写 meta 键，服务器索引翻到 registered。
/// 无任务时落盘未匹配上报并回 404 + retry_after
pub async fn handle_report(
    State(state): State<RegionalState>,
    Json(req): Json<AgentReportRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !validate_mac_address(&req.mac_address) {
        return Err(api_error(Error::Validation(format!(
            "非法 MAC 地址: {}",
            req.mac_address
        ))));
    }

    info!(
        "[{}] 收到硬件上报: {} (MAC: {})",
        state.idc, req.sn, req.mac_address
    );

    let task_key = keys::task_key(&state.idc, &req.sn);
    let mac = req.mac_address.clone();
    let cores = req.hardware.cpu.cores;
    let mem_gb = req.hardware.memory.total_gb;
    let disks = req.hardware.disks.len();

    let result = state
        .store
        .atomic_update(&task_key, move |mut task: Task| {
            if !task.mac.is_empty() && !mac_eq(&task.mac, &mac) {
                return Err(Error::Validation(format!(
                    "MAC 不匹配: 期望 {}, 实际 {}",
                    task.mac, mac
                )));
            }
            if task.mac.is_empty() {
                task.mac = mac.clone();
            }
            task.push_progress(
                "hardware_collect",
                100,
                format!("Hardware: {cores} cores, {mem_gb}GB RAM, {disks} disks"),
            );
            task.push_log(format!(
                "[INFO] Hardware collected: {cores} cores, {mem_gb}GB RAM"
            ));
            Ok(task)
        })
        .await;

    match result {
        Ok(_) => {}
        Err(Error::NotFound(_)) => {
            // 没有对应任务：留档等人认领，Agent 稍后重试
            let unmatched_key = keys::unmatched_report_key(&state.idc, &req.mac_address);
            if let Err(e) = state.store.put_json(&unmatched_key, &req).await {
                warn!("[{}] 保存未匹配上报失败: {}", state.idc, e);
            }
            info!("[{}] 硬件上报未匹配任务, 已留档: {}", state.idc, req.mac_address);
            return Err((
                StatusCode::NOT_FOUND,
                Json(json!({"error": "No matching task found", "retry_after": 10})),
            ));
        }
        Err(e) => return Err(api_error(e)),
    }

    // 硬件快照单独存放
    let meta_key = keys::meta_key(&state.idc, &req.sn);
    if let Err(e) = state.store.put_json(&meta_key, &req.hardware).await {
        warn!("[{}] 写入硬件快照失败: {}", state.idc, e);
    }

    // 服务器索引翻到 registered
    let server_key = keys::server_key(&state.idc, &req.sn);
    let entry = ServerEntry {
        sn: req.sn.clone(),
        mac: req.mac_address.clone(),
        status: ServerStatus::Registered,
        added_at: chrono::Utc::now(),
    };
    if let Err(e) = state.store.put_json(&server_key, &entry).await {
        warn!("[{}] 更新服务器索引失败: {}", state.idc, e);
    }

    info!("[{}] 硬件上报处理完成: {}", state.idc, req.sn);
    Ok(Json(json!({"message": "Hardware reported successfully"})))
}

/// POST /api/v1/progress
///
/// 追加进度并驱动状态机：首个大于零的进度把 pending/approved 推到 installing，
/// percent>=100 且 step=completed 收尾为 completed
pub async fn handle_progress(
    State(state): State<RegionalState>,
    Json(req): Json<AgentProgressRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    info!(
        "[{}] 进度上报: {} {} ({}%)",
        state.idc, req.sn, req.step, req.percent
    );

    let task_key = keys::task_key(&state.idc, &req.sn);
    let req_clone = req.clone();

    state
        .store
        .atomic_update(&task_key, move |mut task: Task| {
            if task.task_id != req_clone.task_id {
                return Err(Error::Validation(format!(
                    "任务 ID 不匹配: 期望 {}, 实际 {}",
                    task.task_id, req_clone.task_id
                )));
            }

            task.push_progress(&req_clone.step, req_clone.percent, &req_clone.message);

            if req_clone.percent >= 100 && req_clone.step == "completed" {
                if task.status.can_transition_to(TaskStatus::Completed) {
                    task.set_status(
                        TaskStatus::Completed,
                        "Installation completed successfully",
                    )?;
                }
            } else if req_clone.percent > 0
                && matches!(
                    task.status,
                    TaskStatus::Pending | TaskStatus::Approved
                )
            {
                task.set_status(TaskStatus::Installing, "Installation started")?;
            }

            task.push_log(format!(
                "[INFO] {}: {} ({}%)",
                req_clone.step, req_clone.message, req_clone.percent
            ));
            Ok(task)
        })
        .await
        .map_err(api_error)?;

    Ok(Json(json!({"message": "Progress updated"})))
}

/// GET /api/v1/task/:sn 诊断用
pub async fn get_task(
    State(state): State<RegionalState>,
    Path(sn): Path<String>,
) -> Result<Json<Task>, ApiError> {
    let task_key = keys::task_key(&state.idc, &sn);
    let task: Task = state.store.get_json(&task_key).await.map_err(api_error)?;
    Ok(Json(task))
}
