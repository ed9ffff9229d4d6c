/// 下一步操作选择器
///
/// Agent 的 servant 循环依赖这里的确定性选择：
/// 根据任务状态与最近进度给出下一个操作，单调推进

use common::models::{
    default_packages, DiskLayoutConfig, InstallMethod, NetworkConfig, NextOperation,
    OsInstallConfig, Task, TaskStatus,
};

/// 操作选择器，持有构造安装配置所需的区域信息
pub struct OperationSelector {
    server_ip: String,
    api_port: u16,
}

impl OperationSelector {
    pub fn new(server_ip: impl Into<String>, api_port: u16) -> Self {
        Self {
            server_ip: server_ip.into(),
            api_port,
        }
    }

    fn base_url(&self) -> String {
        format!("http://{}:{}", self.server_ip, self.api_port)
    }

    /// kickstart 文件的下载地址
    pub fn kickstart_url(&self, sn: &str) -> String {
        format!("{}/api/v1/kickstart/{}", self.base_url(), sn)
    }

    /// 状态机主表
    ///
    /// | 状态       | 最近百分比   | 操作            |
    /// |------------|--------------|-----------------|
    /// | approved   | -            | hardware_config |
    /// | installing | <40 或无     | hardware_config |
    /// | installing | [40,50)      | network_config  |
    /// | installing | [50,100)     | os_install      |
    /// | installing | >=100        | reboot          |
    /// | completed  | -            | complete        |
    /// | 其他       | -            | wait            |
    pub fn select(&self, task: &Task) -> NextOperation {
        match task.status {
            TaskStatus::Approved => NextOperation::HardwareConfig {
                message: "Configure hardware settings".into(),
            },
            TaskStatus::Installing => {
                let percent = task.last_progress().map(|(_, p)| p).unwrap_or(0);
                if percent < 40 {
                    NextOperation::HardwareConfig {
                        message: "Configure hardware settings".into(),
                    }
                } else if percent < 50 {
                    NextOperation::NetworkConfig {
                        message: "Configure network settings".into(),
                    }
                } else if percent < 100 {
                    let method = determine_install_method(task);
                    NextOperation::OsInstall(Box::new(self.build_install_config(task, method)))
                } else {
                    NextOperation::Reboot {
                        message: "Reboot to new system".into(),
                    }
                }
            }
            TaskStatus::Completed => NextOperation::Complete {
                message: "All operations completed".into(),
            },
            _ => NextOperation::Wait {
                message: "Waiting for approval".into(),
            },
        }
    }

    /// 构造 os_install 操作的数据体
    pub fn build_install_config(&self, task: &Task, method: InstallMethod) -> OsInstallConfig {
        let mut config = OsInstallConfig {
            method,
            os_type: task.os_type.clone(),
            os_version: task.os_version.clone(),
            mirror_url: self.base_url(),
            regional_url: self.base_url(),
            kickstart_url: None,
            disk_layout: None,
            network: NetworkConfig {
                interface: "eth0".into(),
                method: "static".into(),
                ip: task.ip.clone(),
                netmask: "255.255.255.0".into(),
                gateway: self.server_ip.clone(),
                dns: self.server_ip.clone(),
                hostname: task.hostname.clone(),
            },
            packages: Vec::new(),
            post_install_script: None,
            root_password: None,
        };

        match method {
            InstallMethod::Kickstart => {
                config.kickstart_url = Some(self.kickstart_url(&task.sn));
            }
            InstallMethod::AgentDirect => {
                config.disk_layout = Some(DiskLayoutConfig::default_layout());
                config.packages = default_packages();
            }
        }
        config
    }
}

/// 安装方式选择
///
/// - 任务带自定义磁盘布局或网络配置时强制 agent_direct
/// - ubuntu/debian 用 agent_direct（debootstrap）
/// - centos/rocky 用 kickstart
pub fn determine_install_method(task: &Task) -> InstallMethod {
    if !task.disk_layout.is_empty() || !task.network_config.is_empty() {
        return InstallMethod::AgentDirect;
    }
    match task.os_type.to_lowercase().as_str() {
        "ubuntu" | "debian" => InstallMethod::AgentDirect,
        "centos" | "rocky" => InstallMethod::Kickstart,
        _ => InstallMethod::AgentDirect,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_with(status: TaskStatus, os_type: &str) -> Task {
        let mut task = Task::new(
            "t-1".into(),
            "SN1".into(),
            "00:11:22:33:44:55".into(),
            "192.168.100.50".into(),
            "node-1".into(),
            os_type.into(),
            "22.04".into(),
            "admin@example.com".into(),
        );
        task.status = status;
        task
    }

    fn selector() -> OperationSelector {
        OperationSelector::new("192.168.100.1", 8081)
    }

    #[test]
    fn test_approved_yields_hardware_config() {
        let op = selector().select(&task_with(TaskStatus::Approved, "ubuntu"));
        assert_eq!(op.name(), "hardware_config");
    }

    #[test]
    fn test_installing_progress_table() {
        let selector = selector();
        let mut task = task_with(TaskStatus::Installing, "ubuntu");

        // 无进度 → hardware_config
        assert_eq!(selector.select(&task).name(), "hardware_config");

        task.push_progress("hardware_config", 39, "");
        assert_eq!(selector.select(&task).name(), "hardware_config");

        task.push_progress("hardware_config", 40, "");
        assert_eq!(selector.select(&task).name(), "network_config");

        task.push_progress("network_config", 50, "");
        assert_eq!(selector.select(&task).name(), "os_install");

        task.push_progress("os_install", 99, "");
        assert_eq!(selector.select(&task).name(), "os_install");

        task.push_progress("os_install", 100, "");
        assert_eq!(selector.select(&task).name(), "reboot");
    }

    #[test]
    fn test_completed_and_waiting() {
        let selector = selector();
        assert_eq!(
            selector.select(&task_with(TaskStatus::Completed, "ubuntu")).name(),
            "complete"
        );
        assert_eq!(
            selector.select(&task_with(TaskStatus::Pending, "ubuntu")).name(),
            "wait"
        );
        assert_eq!(
            selector
                .select(&task_with(TaskStatus::PendingApproval, "ubuntu"))
                .name(),
            "wait"
        );
        assert_eq!(
            selector.select(&task_with(TaskStatus::Failed, "ubuntu")).name(),
            "wait"
        );
    }

    #[test]
    fn test_install_method_by_os_family() {
        assert_eq!(
            determine_install_method(&task_with(TaskStatus::Installing, "ubuntu")),
            InstallMethod::AgentDirect
        );
        assert_eq!(
            determine_install_method(&task_with(TaskStatus::Installing, "debian")),
            InstallMethod::AgentDirect
        );
        assert_eq!(
            determine_install_method(&task_with(TaskStatus::Installing, "centos")),
            InstallMethod::Kickstart
        );
        assert_eq!(
            determine_install_method(&task_with(TaskStatus::Installing, "rocky")),
            InstallMethod::Kickstart
        );
    }

    #[test]
    fn test_custom_layout_forces_agent_direct() {
        let mut task = task_with(TaskStatus::Installing, "rocky");
        task.disk_layout = "raid10:/dev/sda,/dev/sdb".into();
        assert_eq!(determine_install_method(&task), InstallMethod::AgentDirect);

        let mut task = task_with(TaskStatus::Installing, "centos");
        task.network_config = "bond0:static".into();
        assert_eq!(determine_install_method(&task), InstallMethod::AgentDirect);
    }

    #[test]
    fn test_kickstart_config_has_url_only() {
        let selector = selector();
        let task = task_with(TaskStatus::Installing, "rocky");
        let config = selector.build_install_config(&task, InstallMethod::Kickstart);
        assert_eq!(
            config.kickstart_url.as_deref(),
            Some("http://192.168.100.1:8081/api/v1/kickstart/SN1")
        );
        assert!(config.disk_layout.is_none());
        assert!(config.packages.is_empty());
    }

    #[test]
    fn test_agent_direct_config_has_defaults() {
        let selector = selector();
        let task = task_with(TaskStatus::Installing, "ubuntu");
        let config = selector.build_install_config(&task, InstallMethod::AgentDirect);
        assert!(config.kickstart_url.is_none());
        let layout = config.disk_layout.unwrap();
        assert_eq!(layout.partitions.len(), 3);
        assert!(config.packages.contains(&"openssh-server".to_string()));
        assert_eq!(config.network.ip, "192.168.100.50");
        assert_eq!(config.network.gateway, "192.168.100.1");
    }
}
