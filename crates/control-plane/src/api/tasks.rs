/// 任务管理接口

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use common::models::Task;

use crate::app_state::AppState;
use crate::services::task_service::{CreateTaskRequest, TaskService};

use super::{api_error, ApiError};

/// 任务列表查询参数
#[derive(Debug, Deserialize)]
pub struct ListTasksQuery {
    pub idc: Option<String>,
    pub status: Option<String>,
}

/// 创建任务
pub async fn create_task(
    State(state): State<AppState>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let idc = req.idc.clone();
    let service = TaskService::new(state);
    let task = service.create_task(req).await.map_err(api_error)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "task_id": task.task_id,
            "status": task.status,
            "created_at": task.created_at,
            "links": {
                "self": format!("/api/v1/tasks/{}/{}", idc, task.sn),
                "approve": format!("/api/v1/tasks/{}/{}/approve", idc, task.sn),
            },
        })),
    ))
}

/// 任务列表
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<ListTasksQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let service = TaskService::new(state);
    let tasks = service
        .list_tasks(query.idc.as_deref(), query.status.as_deref())
        .await
        .map_err(api_error)?;

    Ok(Json(json!({
        "total": tasks.len(),
        "tasks": tasks,
    })))
}

/// 单个任务详情
pub async fn get_task(
    State(state): State<AppState>,
    Path((idc, sn)): Path<(String, String)>,
) -> Result<Json<Task>, ApiError> {
    let service = TaskService::new(state);
    let task = service.get_task(&idc, &sn).await.map_err(api_error)?;
    Ok(Json(task))
}

/// 审批请求体
#[derive(Debug, Default, Deserialize)]
pub struct ApproveRequest {
    #[serde(default)]
    pub notes: String,
}

/// 驳回请求体
#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    pub reason: String,
}

/// 审批通过
pub async fn approve_task(
    State(state): State<AppState>,
    Path((idc, sn)): Path<(String, String)>,
    Json(req): Json<ApproveRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let service = TaskService::new(state);
    let task = service
        .approve_task(&idc, &sn, &req.notes)
        .await
        .map_err(api_error)?;

    Ok(Json(json!({
        "task_id": task.task_id,
        "status": task.status,
        "approval": task.approval,
    })))
}

/// 驳回
pub async fn reject_task(
    State(state): State<AppState>,
    Path((idc, sn)): Path<(String, String)>,
    Json(req): Json<RejectRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let service = TaskService::new(state);
    let task = service
        .reject_task(&idc, &sn, &req.reason)
        .await
        .map_err(api_error)?;

    Ok(Json(json!({
        "task_id": task.task_id,
        "status": task.status,
        "approval": task.approval,
    })))
}
