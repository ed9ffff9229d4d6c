/// 任务管理服务
///
/// 审批与驳回写成纯变换函数，套在原子更新里执行：
/// 并发审批时一个成功，其余在重读后观察到已审批状态成为空操作

use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use validator::Validate;

use common::models::{
    Approval, ApprovalStatus, ServerEntry, ServerStatus, Task, TaskStatus,
};
use common::utils::{generate_id, normalize_mac, validate_mac_address};
use common::{keys, Error, Result};

use crate::app_state::AppState;
use crate::ws::DashboardMessage;

/// 建单请求
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateTaskRequest {
    #[validate(length(min = 1))]
    pub idc: String,
    #[validate(length(min = 1))]
    pub sn: String,
    pub mac: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub hostname: String,
    #[validate(length(min = 1))]
    pub os_type: String,
    #[validate(length(min = 1))]
    pub os_version: String,
    #[serde(default)]
    pub disk_layout: String,
    #[serde(default)]
    pub network_config: String,
    #[serde(default)]
    pub tags: Option<std::collections::HashMap<String, String>>,
}

pub struct TaskService {
    state: AppState,
}

impl TaskService {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// 建单：写服务器索引 + 初始任务，广播大盘事件
    pub async fn create_task(&self, req: CreateTaskRequest) -> Result<Task> {
        req.validate()
            .map_err(|e| Error::Validation(format!("建单请求校验失败: {e}")))?;
        if !validate_mac_address(&req.mac) {
            return Err(Error::Validation(format!("非法 MAC 地址: {}", req.mac)));
        }

        let hostname = if req.hostname.is_empty() {
            req.sn.clone()
        } else {
            req.hostname.clone()
        };

        let mut task = Task::new(
            generate_id(),
            req.sn.clone(),
            normalize_mac(&req.mac),
            req.ip.clone(),
            hostname,
            req.os_type.clone(),
            req.os_version.clone(),
            "admin@example.com".to_string(),
        );
        task.disk_layout = req.disk_layout.clone();
        task.network_config = req.network_config.clone();
        task.tags = req.tags.clone();

        // 服务器索引先行，区域客户端据此拉起每机租约
        let entry = ServerEntry {
            sn: req.sn.clone(),
            mac: task.mac.clone(),
            status: ServerStatus::Pending,
            added_at: Utc::now(),
        };
        self.state
            .store
            .put_json(&keys::server_key(&req.idc, &req.sn), &entry)
            .await?;

        self.state
            .store
            .put_json(&keys::task_key(&req.idc, &req.sn), &task)
            .await?;

        info!("任务已创建: idc={}, sn={}, task_id={}", req.idc, req.sn, task.task_id);

        // 建单即广播一条状态事件；后续整体更新由根监听负责
        self.state
            .hub
            .broadcast(&DashboardMessage::Status {
                task_id: task.task_id.clone(),
                status: task.status.as_str().to_string(),
            })
            .await;

        Ok(task)
    }

    /// 列出任务，支持 IDC 与状态过滤
    pub async fn list_tasks(
        &self,
        idc: Option<&str>,
        status: Option<&str>,
    ) -> Result<Vec<Task>> {
        let prefix = match idc {
            Some(idc) => keys::machine_prefix(idc),
            None => format!("{}/", keys::ROOT),
        };

        let kvs = self.state.store.get_with_prefix(&prefix).await?;
        let mut tasks = Vec::new();
        for (key, value) in kvs {
            if !key.ends_with("/task") || keys::parse_machine_key(&key).is_none() {
                continue;
            }
            let task: Task = match serde_json::from_slice(&value) {
                Ok(task) => task,
                Err(e) => {
                    tracing::warn!("任务解码失败 {}: {}", key, e);
                    continue;
                }
            };
            if let Some(status) = status {
                if task.status.as_str() != status {
                    continue;
                }
            }
            tasks.push(task);
        }
        Ok(tasks)
    }

    pub async fn get_task(&self, idc: &str, sn: &str) -> Result<Task> {
        self.state
            .store
            .get_json(&keys::task_key(idc, sn))
            .await
    }

    /// 审批通过
    pub async fn approve_task(&self, idc: &str, sn: &str, notes: &str) -> Result<Task> {
        let approver = "admin@example.com".to_string();
        let notes = notes.to_string();
        let task = self
            .state
            .store
            .atomic_update(&keys::task_key(idc, sn), move |task: Task| {
                approve_transform(task, &approver, &notes)
            })
            .await?;
        info!("任务已审批通过: idc={}, sn={}", idc, sn);
        Ok(task)
    }

    /// 驳回
    pub async fn reject_task(&self, idc: &str, sn: &str, reason: &str) -> Result<Task> {
        let approver = "admin@example.com".to_string();
        let reason = reason.to_string();
        let task = self
            .state
            .store
            .atomic_update(&keys::task_key(idc, sn), move |task: Task| {
                reject_transform(task, &approver, &reason)
            })
            .await?;
        info!("任务已驳回: idc={}, sn={}", idc, sn);
        Ok(task)
    }

    /// 枚举 IDC 内服务器索引
    pub async fn list_servers(&self, idc: &str) -> Result<Vec<ServerEntry>> {
        let kvs = self
            .state
            .store
            .get_with_prefix(&keys::server_prefix(idc))
            .await?;
        let mut servers = Vec::new();
        for (key, value) in kvs {
            match serde_json::from_slice::<ServerEntry>(&value) {
                Ok(entry) => servers.push(entry),
                Err(e) => tracing::warn!("服务器条目解码失败 {}: {}", key, e),
            }
        }
        Ok(servers)
    }
}

/// 审批纯变换
///
/// 已是审批通过状态时为空操作（并发审批只留下一条历史）
pub fn approve_transform(mut task: Task, approver: &str, notes: &str) -> Result<Task> {
    let already_approved = task
        .approval
        .as_ref()
        .map(|a| a.status == ApprovalStatus::Approved)
        .unwrap_or(false);
    if already_approved
        && matches!(
            task.status,
            TaskStatus::Approved | TaskStatus::Installing | TaskStatus::Completed
        )
    {
        return Ok(task);
    }

    if !matches!(task.status, TaskStatus::Pending | TaskStatus::PendingApproval) {
        return Err(Error::Validation(format!(
            "任务 {} 当前状态不可审批: {}",
            task.sn,
            task.status.as_str()
        )));
    }

    task.approval = Some(Approval {
        status: ApprovalStatus::Approved,
        approver: approver.to_string(),
        timestamp: Utc::now(),
        notes: if notes.is_empty() {
            None
        } else {
            Some(notes.to_string())
        },
        reason: None,
    });
    task.set_status(TaskStatus::Approved, format!("Approved by {approver}"))?;
    task.push_log(format!("[INFO] Task approved by {approver}"));
    Ok(task)
}

/// 驳回纯变换：审批记录置 rejected，状态转 failed
pub fn reject_transform(mut task: Task, approver: &str, reason: &str) -> Result<Task> {
    let already_rejected = task
        .approval
        .as_ref()
        .map(|a| a.status == ApprovalStatus::Rejected)
        .unwrap_or(false);
    if already_rejected && task.status == TaskStatus::Failed {
        return Ok(task);
    }

    if !matches!(task.status, TaskStatus::Pending | TaskStatus::PendingApproval) {
        return Err(Error::Validation(format!(
            "任务 {} 当前状态不可驳回: {}",
            task.sn,
            task.status.as_str()
        )));
    }

    task.approval = Some(Approval {
        status: ApprovalStatus::Rejected,
        approver: approver.to_string(),
        timestamp: Utc::now(),
        notes: None,
        reason: Some(reason.to_string()),
    });
    task.set_status(TaskStatus::Failed, format!("Rejected: {reason}"))?;
    task.push_log(format!("[INFO] Task rejected by {approver}: {reason}"));
    Ok(task)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_task() -> Task {
        Task::new(
            "t-1".into(),
            "SN1".into(),
            "00:11:22:33:44:55".into(),
            "192.168.100.10".into(),
            "node-1".into(),
            "ubuntu".into(),
            "22.04".into(),
            "admin@example.com".into(),
        )
    }

    #[test]
    fn test_approve_from_pending() {
        let task = approve_transform(pending_task(), "op@example.com", "ok").unwrap();
        assert_eq!(task.status, TaskStatus::Approved);
        let approval = task.approval.unwrap();
        assert_eq!(approval.status, ApprovalStatus::Approved);
        assert_eq!(approval.approver, "op@example.com");
        assert_eq!(approval.notes.as_deref(), Some("ok"));
        // 创建 + 审批各一条历史
        assert_eq!(task.status_history.len(), 2);
        assert_eq!(task.status_history[1].status, TaskStatus::Approved);
    }

    #[test]
    fn test_concurrent_approve_is_noop() {
        let first = approve_transform(pending_task(), "op@example.com", "ok").unwrap();
        // 第二个审批者在重读后看到的已是 approved，变换必须不再追加任何东西
        let second = approve_transform(first.clone(), "other@example.com", "me too").unwrap();
        assert_eq!(second.status_history.len(), first.status_history.len());
        assert_eq!(second.approval.as_ref().unwrap().approver, "op@example.com");
        assert_eq!(second.logs.len(), first.logs.len());
    }

    #[test]
    fn test_approve_from_installing_rejected() {
        let mut task = pending_task();
        task.set_status(TaskStatus::Installing, "start").unwrap();
        assert!(approve_transform(task, "op@example.com", "").is_err());
    }

    #[test]
    fn test_reject_sets_failed_with_reason() {
        let task = reject_transform(pending_task(), "op@example.com", "hw mismatch").unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        let approval = task.approval.unwrap();
        assert_eq!(approval.status, ApprovalStatus::Rejected);
        assert_eq!(approval.reason.as_deref(), Some("hw mismatch"));
    }

    #[test]
    fn test_reject_replay_is_noop() {
        let first = reject_transform(pending_task(), "op@example.com", "hw mismatch").unwrap();
        let second = reject_transform(first.clone(), "op@example.com", "hw mismatch").unwrap();
        assert_eq!(second.status_history.len(), first.status_history.len());
    }

    #[test]
    fn test_approve_then_reject_conflicts() {
        let approved = approve_transform(pending_task(), "op@example.com", "").unwrap();
        assert!(reject_transform(approved, "op@example.com", "late").is_err());
    }
}
