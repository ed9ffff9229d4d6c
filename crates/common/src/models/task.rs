/// 任务模型
///
/// 每台服务器一条合并任务记录，存放在单个键下，
/// 所有变更通过 CAS 原子更新完成

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};
use crate::settings::MAX_TASK_LOGS;

/// 任务状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Ready,
    Booting,
    PendingApproval,
    Approved,
    Installing,
    Completed,
    Failed,
}

impl TaskStatus {
    /// 状态在主路径上的序号，用于单调性检查
    fn rank(self) -> u8 {
        match self {
            TaskStatus::Pending => 0,
            TaskStatus::Ready => 1,
            TaskStatus::Booting => 2,
            TaskStatus::PendingApproval => 3,
            TaskStatus::Approved => 4,
            TaskStatus::Installing => 5,
            TaskStatus::Completed => 6,
            // Failed 不在主路径上，单独处理
            TaskStatus::Failed => 7,
        }
    }

    /// 是否为终止状态
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// 状态迁移是否合法
    ///
    /// 主路径上只允许向前推进，failed 可以从任意非终止状态进入
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        if next == TaskStatus::Failed {
            return !self.is_terminal();
        }
        if self.is_terminal() || self == next {
            return false;
        }
        next.rank() > self.rank()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Ready => "ready",
            TaskStatus::Booting => "booting",
            TaskStatus::PendingApproval => "pending_approval",
            TaskStatus::Approved => "approved",
            TaskStatus::Installing => "installing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

/// 审批状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

/// 审批记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Approval {
    pub status: ApprovalStatus,
    pub approver: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// 状态变更历史条目
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChange {
    pub status: TaskStatus,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

/// 安装进度条目
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressStep {
    pub step: String,
    pub percent: i32,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// 合并任务记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub sn: String,
    #[serde(default)]
    pub mac: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub hostname: String,

    pub os_type: String,
    pub os_version: String,
    #[serde(default)]
    pub disk_layout: String,
    #[serde(default)]
    pub network_config: String,

    pub status: TaskStatus,
    #[serde(default)]
    pub status_history: Vec<StatusChange>,
    #[serde(default)]
    pub progress: Vec<ProgressStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval: Option<Approval>,
    #[serde(default)]
    pub logs: Vec<String>,

    #[serde(default)]
    pub pxe_configured: bool,

    #[serde(default)]
    pub created_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<std::collections::HashMap<String, String>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// 创建初始任务，状态 pending，带一条历史记录
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        task_id: String,
        sn: String,
        mac: String,
        ip: String,
        hostname: String,
        os_type: String,
        os_version: String,
        created_by: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            task_id,
            sn,
            mac,
            ip,
            hostname,
            os_type,
            os_version,
            disk_layout: String::new(),
            network_config: String::new(),
            status: TaskStatus::Pending,
            status_history: vec![StatusChange {
                status: TaskStatus::Pending,
                timestamp: now,
                reason: "Task created".to_string(),
            }],
            progress: Vec::new(),
            approval: None,
            logs: Vec::new(),
            pxe_configured: false,
            created_by,
            tags: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// 状态迁移并追加历史，非法迁移报错
    ///
    /// 仅在状态实际变化时追加历史条目
    pub fn set_status(&mut self, next: TaskStatus, reason: impl Into<String>) -> Result<()> {
        if self.status == next {
            return Ok(());
        }
        if !self.status.can_transition_to(next) {
            return Err(Error::Validation(format!(
                "任务 {} 非法状态迁移: {} -> {}",
                self.sn,
                self.status.as_str(),
                next.as_str()
            )));
        }
        self.status = next;
        self.status_history.push(StatusChange {
            status: next,
            timestamp: Utc::now(),
            reason: reason.into(),
        });
        self.touch();
        Ok(())
    }

    /// 追加进度条目
    pub fn push_progress(&mut self, step: impl Into<String>, percent: i32, message: impl Into<String>) {
        self.progress.push(ProgressStep {
            step: step.into(),
            percent,
            timestamp: Utc::now(),
            message: message.into(),
        });
        self.touch();
    }

    /// 追加日志，超出上限时丢弃最旧条目
    pub fn push_log(&mut self, line: impl Into<String>) {
        self.logs.push(line.into());
        if self.logs.len() > MAX_TASK_LOGS {
            let overflow = self.logs.len() - MAX_TASK_LOGS;
            self.logs.drain(..overflow);
        }
        self.touch();
    }

    /// 最近一条进度（步骤名与百分比）
    pub fn last_progress(&self) -> Option<(&str, i32)> {
        self.progress.last().map(|p| (p.step.as_str(), p.percent))
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_task() -> Task {
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
    fn test_new_task_has_single_history_entry() {
        let task = sample_task();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.status_history.len(), 1);
        assert_eq!(task.status_history[0].status, TaskStatus::Pending);
    }

    #[test]
    fn test_legal_transitions() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::PendingApproval));
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Approved));
        assert!(TaskStatus::PendingApproval.can_transition_to(TaskStatus::Approved));
        assert!(TaskStatus::Approved.can_transition_to(TaskStatus::Installing));
        assert!(TaskStatus::Installing.can_transition_to(TaskStatus::Completed));
        assert!(TaskStatus::Installing.can_transition_to(TaskStatus::Failed));
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Failed));
    }

    #[test]
    fn test_illegal_transitions() {
        assert!(!TaskStatus::Approved.can_transition_to(TaskStatus::Pending));
        assert!(!TaskStatus::Completed.can_transition_to(TaskStatus::Installing));
        assert!(!TaskStatus::Completed.can_transition_to(TaskStatus::Failed));
        assert!(!TaskStatus::Failed.can_transition_to(TaskStatus::Approved));
        assert!(!TaskStatus::Failed.can_transition_to(TaskStatus::Failed));
        assert!(!TaskStatus::Installing.can_transition_to(TaskStatus::Approved));
    }

    #[test]
    fn test_set_status_appends_history_once() {
        let mut task = sample_task();
        task.set_status(TaskStatus::Approved, "approved by operator")
            .unwrap();
        assert_eq!(task.status_history.len(), 2);

        // 相同状态再设置一次是空操作，不追加历史
        task.set_status(TaskStatus::Approved, "again").unwrap();
        assert_eq!(task.status_history.len(), 2);
    }

    #[test]
    fn test_set_status_rejects_illegal() {
        let mut task = sample_task();
        task.set_status(TaskStatus::Completed, "jump ahead").unwrap();
        assert!(task
            .set_status(TaskStatus::Installing, "go back")
            .is_err());
    }

    #[test]
    fn test_push_log_bounded() {
        let mut task = sample_task();
        for i in 0..(MAX_TASK_LOGS + 50) {
            task.push_log(format!("line {i}"));
        }
        assert_eq!(task.logs.len(), MAX_TASK_LOGS);
        assert_eq!(task.logs[0], "line 50");
    }

    #[test]
    fn test_serde_round_trip() {
        let mut task = sample_task();
        task.push_progress("hardware_collect", 100, "8 cores");
        task.push_log("[INFO] hardware collected");
        let json = serde_json::to_string(&task).unwrap();
        let decoded: Task = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.task_id, task.task_id);
        assert_eq!(decoded.status, task.status);
        assert_eq!(decoded.progress.len(), 1);
        assert_eq!(decoded.logs.len(), 1);
        assert_eq!(decoded.pxe_configured, false);
    }

    #[test]
    fn test_status_serde_names() {
        assert_eq!(
            serde_json::to_string(&TaskStatus::PendingApproval).unwrap(),
            "\"pending_approval\""
        );
        assert_eq!(
            serde_json::from_str::<TaskStatus>("\"installing\"").unwrap(),
            TaskStatus::Installing
        );
    }

    #[test]
    fn test_unknown_fields_tolerated() {
        let json = r#"{
            "task_id": "t-9", "sn": "SN9", "os_type": "rocky", "os_version": "9",
            "status": "pending",
            "created_at": "2024-01-01T00:00:00Z", "updated_at": "2024-01-01T00:00:00Z",
            "some_future_field": {"x": 1}
        }"#;
        let task: Task = serde_json::from_str(json).unwrap();
        assert_eq!(task.sn, "SN9");
        assert!(task.mac.is_empty());
    }
}
