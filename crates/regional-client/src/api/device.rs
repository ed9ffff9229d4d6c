/// Agent servant 协议接口
///
/// Agent 反复询问"下一步做什么"，执行一步，回报结果

use axum::extract::State;
use axum::Json;
use serde_json::json;
use tracing::info;

use common::models::{
    HardwareConfigResponse, InstallCompleteRequest, InstallQueueResponse, NextOperation,
    OperationCompleteRequest, OsInstallConfig, SnRequest, Task, TaskStatus,
};
use common::{keys, Error};

use crate::orchestrator;
use crate::selector::determine_install_method;
use crate::state::RegionalState;

use super::{api_error, ApiError};

/// POST /api/v1/device/isInInstallQueue
///
/// 任务存在且状态在 approved 及之后即视为已入装机队列
pub async fn is_in_install_queue(
    State(state): State<RegionalState>,
    Json(req): Json<SnRequest>,
) -> Result<Json<InstallQueueResponse>, ApiError> {
    let task_key = keys::task_key(&state.idc, &req.sn);
    let task: Task = match state.store.get_json(&task_key).await {
        Ok(task) => task,
        Err(Error::NotFound(_)) => {
            // 任务还没建出来，不算入队
            return Ok(Json(InstallQueueResponse { result: false }));
        }
        Err(e) => return Err(api_error(e)),
    };

    let in_queue = matches!(
        task.status,
        TaskStatus::Approved | TaskStatus::Installing | TaskStatus::Completed
    );
    info!(
        "[{}] isInInstallQueue {}: {} (状态: {})",
        state.idc,
        req.sn,
        in_queue,
        task.status.as_str()
    );
    Ok(Json(InstallQueueResponse { result: in_queue }))
}

/// POST /api/v1/device/getNextOperation
pub async fn get_next_operation(
    State(state): State<RegionalState>,
    Json(req): Json<SnRequest>,
) -> Result<Json<NextOperation>, ApiError> {
    let task_key = keys::task_key(&state.idc, &req.sn);
    let task: Task = state.store.get_json(&task_key).await.map_err(api_error)?;

    let operation = state.selector.select(&task);
    info!(
        "[{}] getNextOperation {}: {}",
        state.idc,
        req.sn,
        operation.name()
    );
    Ok(Json(operation))
}

/// POST /api/v1/device/getHardwareConfig
///
/// 下发厂商无关脚本包与可选 RAID 规格
pub async fn get_hardware_config(
    State(state): State<RegionalState>,
    Json(req): Json<SnRequest>,
) -> Result<Json<HardwareConfigResponse>, ApiError> {
    // 脚本目录后续挂接配置库，当前仅下发空包
    let response = HardwareConfigResponse {
        scripts: Vec::new(),
        raid: None,
    };
    info!(
        "[{}] getHardwareConfig {}: {} 个脚本",
        state.idc,
        req.sn,
        response.scripts.len()
    );
    Ok(Json(response))
}

/// POST /api/v1/device/getOSInstallConfig
pub async fn get_os_install_config(
    State(state): State<RegionalState>,
    Json(req): Json<SnRequest>,
) -> Result<Json<OsInstallConfig>, ApiError> {
    let task_key = keys::task_key(&state.idc, &req.sn);
    let task: Task = state.store.get_json(&task_key).await.map_err(api_error)?;

    let method = determine_install_method(&task);
    let config = state.selector.build_install_config(&task, method);
    info!(
        "[{}] getOSInstallConfig {}: method={:?}",
        state.idc, req.sn, method
    );
    Ok(Json(config))
}

/// POST /api/v1/device/operationComplete
///
/// 按操作映射进度百分比（hardware_config→40, network_config→50, os_install→100）
/// 并推进状态；os_install 成功后调度 PXE 清理。
/// 重放同一条回报不会产生第二份进度
pub async fn operation_complete(
    State(state): State<RegionalState>,
    Json(req): Json<OperationCompleteRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    info!(
        "[{}] 操作完成回报: {} {} (成功: {}) - {}",
        state.idc, req.sn, req.operation, req.success, req.message
    );

    let task_key = keys::task_key(&state.idc, &req.sn);
    let req_clone = req.clone();

    let updated = state
        .store
        .atomic_update(&task_key, move |task: Task| {
            operation_complete_transform(task, &req_clone)
        })
        .await
        .map_err(api_error)?;

    // 装机成功后拆除 PXE 环境，不阻塞应答
    if req.operation == "os_install"
        && req.success
        && updated.status == TaskStatus::Completed
    {
        let state = state.clone();
        tokio::spawn(async move {
            orchestrator::cleanup_pxe_boot(&state, &updated).await;
        });
    }

    Ok(Json(json!({"message": "Operation status updated"})))
}

/// POST /api/v1/device/installComplete
///
/// 终态迁移；kickstart %post 与 Agent 直装共用此入口
pub async fn install_complete(
    State(state): State<RegionalState>,
    Json(req): Json<InstallCompleteRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    info!(
        "[{}] 装机结束通知: {} status={} message={}",
        state.idc, req.sn, req.status, req.message
    );

    let task_key = keys::task_key(&state.idc, &req.sn);
    let req_clone = req.clone();

    let updated = state
        .store
        .atomic_update(&task_key, move |task: Task| {
            install_complete_transform(task, &req_clone)
        })
        .await
        .map_err(api_error)?;

    let success = updated.status == TaskStatus::Completed;
    if success || state.tunables.cleanup_on_failure {
        let state = state.clone();
        tokio::spawn(async move {
            orchestrator::cleanup_pxe_boot(&state, &updated).await;
        });
    }

    Ok(Json(json!({"message": "Installation status updated"})))
}

/// operationComplete 的纯变换
///
/// 进度百分比按操作映射（hardware_config→40, network_config→50, os_install→100），
/// 与最近一条进度完全一致的重放原样返回，重放两次与一次结果相同
pub(crate) fn operation_complete_transform(
    mut task: Task,
    req: &OperationCompleteRequest,
) -> common::Result<Task> {
    let percent = match req.operation.as_str() {
        "hardware_config" => 40,
        "network_config" => 50,
        "os_install" => 100,
        _ => 0,
    };

    if task.last_progress() == Some((req.operation.as_str(), percent)) {
        return Ok(task);
    }

    match req.operation.as_str() {
        "hardware_config" => {
            if req.success && task.status.can_transition_to(TaskStatus::Installing) {
                task.set_status(TaskStatus::Installing, "Hardware configuration completed")?;
            } else if !req.success && !task.status.is_terminal() {
                task.set_status(
                    TaskStatus::Failed,
                    format!("Hardware configuration failed: {}", req.message),
                )?;
            }
        }
        "network_config" => {
            if !req.success && !task.status.is_terminal() {
                task.set_status(
                    TaskStatus::Failed,
                    format!("Network configuration failed: {}", req.message),
                )?;
            }
        }
        "os_install" => {
            if req.success {
                if task.status.can_transition_to(TaskStatus::Completed) {
                    task.set_status(
                        TaskStatus::Completed,
                        "OS installation completed successfully",
                    )?;
                }
            } else if !task.status.is_terminal() {
                task.set_status(
                    TaskStatus::Failed,
                    format!("OS installation failed: {}", req.message),
                )?;
            }
        }
        _ => {}
    }

    task.push_progress(&req.operation, percent, &req.message);
    task.push_log(format!("[INFO] {}: {}", req.operation, req.message));
    Ok(task)
}

/// installComplete 的纯变换，终态迁移
pub(crate) fn install_complete_transform(
    mut task: Task,
    req: &InstallCompleteRequest,
) -> common::Result<Task> {
    if task.last_progress() == Some(("os_install", 100)) && task.status.is_terminal() {
        return Ok(task);
    }

    if req.status == "success" {
        if task.status.can_transition_to(TaskStatus::Completed) {
            task.set_status(
                TaskStatus::Completed,
                "OS installation completed successfully",
            )?;
        }
    } else if !task.status.is_terminal() {
        task.set_status(
            TaskStatus::Failed,
            format!("OS installation failed: {}", req.message),
        )?;
    }

    task.push_progress("os_install", 100, &req.message);
    task.push_log(format!(
        "[INFO] Installation {}: {}",
        req.status, req.message
    ));
    Ok(task)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn installing_task(percent: i32, step: &str) -> Task {
        let mut task = Task::new(
            "t-1".into(),
            "SN1".into(),
            "00:11:22:33:44:55".into(),
            "192.168.100.50".into(),
            "node-1".into(),
            "ubuntu".into(),
            "22.04".into(),
            "admin@example.com".into(),
        );
        task.set_status(TaskStatus::Approved, "approved").unwrap();
        if percent > 0 {
            task.set_status(TaskStatus::Installing, "started").unwrap();
            task.push_progress(step, percent, "");
        }
        task
    }

    fn complete_req(operation: &str, success: bool) -> OperationCompleteRequest {
        OperationCompleteRequest {
            sn: "SN1".into(),
            operation: operation.into(),
            success,
            message: "done".into(),
        }
    }

    #[test]
    fn test_hardware_config_moves_to_installing_at_40() {
        let task = installing_task(0, "");
        let updated =
            operation_complete_transform(task, &complete_req("hardware_config", true)).unwrap();
        assert_eq!(updated.status, TaskStatus::Installing);
        assert_eq!(updated.last_progress(), Some(("hardware_config", 40)));
    }

    #[test]
    fn test_os_install_success_completes_and_failure_fails() {
        let task = installing_task(50, "network_config");
        let updated =
            operation_complete_transform(task, &complete_req("os_install", true)).unwrap();
        assert_eq!(updated.status, TaskStatus::Completed);
        assert_eq!(updated.last_progress(), Some(("os_install", 100)));

        let task = installing_task(50, "network_config");
        let updated =
            operation_complete_transform(task, &complete_req("os_install", false)).unwrap();
        assert_eq!(updated.status, TaskStatus::Failed);
    }

    #[test]
    fn test_operation_complete_replay_is_idempotent() {
        let task = installing_task(40, "hardware_config");
        let req = complete_req("network_config", true);
        let once = operation_complete_transform(task, &req).unwrap();
        let twice = operation_complete_transform(once.clone(), &req).unwrap();
        // 重放一次与两次的最终状态一致
        assert_eq!(once.progress.len(), twice.progress.len());
        assert_eq!(once.status_history.len(), twice.status_history.len());
        assert_eq!(once.logs.len(), twice.logs.len());
        assert_eq!(once.status, twice.status);
    }

    #[test]
    fn test_install_complete_success_and_replay() {
        let task = installing_task(99, "os_install");
        let req = InstallCompleteRequest {
            sn: "SN1".into(),
            status: "success".into(),
            message: "OS installed".into(),
        };
        let once = install_complete_transform(task, &req).unwrap();
        assert_eq!(once.status, TaskStatus::Completed);

        let twice = install_complete_transform(once.clone(), &req).unwrap();
        assert_eq!(once.progress.len(), twice.progress.len());
        assert_eq!(once.status_history.len(), twice.status_history.len());
    }

    #[test]
    fn test_install_complete_failure() {
        let task = installing_task(99, "os_install");
        let req = InstallCompleteRequest {
            sn: "SN1".into(),
            status: "failed".into(),
            message: "disk error".into(),
        };
        let updated = install_complete_transform(task, &req).unwrap();
        assert_eq!(updated.status, TaskStatus::Failed);
        assert!(updated
            .status_history
            .last()
            .unwrap()
            .reason
            .contains("disk error"));
    }
}
