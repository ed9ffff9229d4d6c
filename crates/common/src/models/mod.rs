/// 共享数据模型
///
/// 定义控制面、区域客户端与 Agent 共享的数据结构

mod hardware;
mod install;
mod task;

pub use hardware::{
    BiosInfo, CpuInfo, DimmInfo, DiskInfo, HardwareInfo, MemoryInfo, NetworkInterfaceInfo,
};
pub use install::{
    default_packages, DiskLayoutConfig, HardwareConfigResponse, HardwareScript, InstallMethod,
    NetworkConfig, NextOperation, OsInstallConfig, PartitionConfig, RaidConfig,
};
pub use task::{Approval, ApprovalStatus, ProgressStep, StatusChange, Task, TaskStatus};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 服务器索引条目状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Pending,
    Registered,
    Unmatched,
}

/// 服务器索引条目
///
/// 轻量索引，区域客户端无需解码任务即可枚举本 IDC 的服务器
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerEntry {
    pub sn: String,
    pub mac: String,
    pub status: ServerStatus,
    pub added_at: DateTime<Utc>,
}

/// 区域客户端注册信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionInfo {
    pub idc: String,
    pub server_ip: String,
    pub api_port: u16,
    pub dhcp_enabled: bool,
    pub tftp_enabled: bool,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<DateTime<Utc>>,
    /// online / offline
    pub status: String,
}

/// 区域客户端心跳值（挂在 TTL 租约下）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heartbeat {
    pub status: String,
    pub last_updated: DateTime<Utc>,
    pub lease_id: i64,
}

/// IDC 统计缓存
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdcStats {
    pub idc: String,
    pub total: u64,
    pub pending: u64,
    pub pending_approval: u64,
    pub approved: u64,
    pub installing: u64,
    pub completed: u64,
    pub failed: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub computed_at: Option<DateTime<Utc>>,
}

impl IdcStats {
    /// 累计一条任务状态
    pub fn count(&mut self, status: TaskStatus) {
        self.total += 1;
        match status {
            TaskStatus::Pending | TaskStatus::Ready | TaskStatus::Booting => self.pending += 1,
            TaskStatus::PendingApproval => self.pending_approval += 1,
            TaskStatus::Approved => self.approved += 1,
            TaskStatus::Installing => self.installing += 1,
            TaskStatus::Completed => self.completed += 1,
            TaskStatus::Failed => self.failed += 1,
        }
    }
}

// ========== Agent 与区域客户端之间的协议 DTO ==========

/// 硬件上报请求，也是未匹配上报的落盘载荷
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentReportRequest {
    pub sn: String,
    pub mac_address: String,
    pub hardware: HardwareInfo,
}

/// 进度上报请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProgressRequest {
    pub sn: String,
    #[serde(default)]
    pub mac: String,
    pub task_id: String,
    pub step: String,
    pub percent: i32,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// 仅携带序列号的请求体（device 系列接口共用）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnRequest {
    pub sn: String,
}

/// isInInstallQueue 响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallQueueResponse {
    pub result: bool,
}

/// 操作完成回报
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationCompleteRequest {
    pub sn: String,
    pub operation: String,
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

/// 装机结束回报（kickstart %post 或 Agent 直装收尾）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallCompleteRequest {
    pub sn: String,
    /// success 或 failed
    pub status: String,
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_entry_round_trip() {
        let entry = ServerEntry {
            sn: "SN1".into(),
            mac: "00:11:22:33:44:55".into(),
            status: ServerStatus::Registered,
            added_at: Utc::now(),
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"registered\""));
        let decoded: ServerEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.status, ServerStatus::Registered);
    }

    #[test]
    fn test_stats_counting() {
        let mut stats = IdcStats {
            idc: "dc1".into(),
            ..Default::default()
        };
        stats.count(TaskStatus::Pending);
        stats.count(TaskStatus::Installing);
        stats.count(TaskStatus::Completed);
        stats.count(TaskStatus::Failed);
        assert_eq!(stats.total, 4);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.installing, 1);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 1);
    }
}
