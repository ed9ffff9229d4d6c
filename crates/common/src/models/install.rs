/// 安装配置与 Agent 协议模型
///
/// getNextOperation 返回按 operation 区分的带标签联合体，
/// 每个变体有独立的数据结构，Agent 按变体反序列化

use serde::{Deserialize, Serialize};

/// 安装方式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InstallMethod {
    /// 由区域客户端生成 kickstart，Agent kexec 进入厂商安装器
    Kickstart,
    /// Agent 在目标机内直接完成分区、引导与基础系统安装
    AgentDirect,
}

/// 网络配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub interface: String,
    /// static 或 dhcp
    pub method: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub netmask: String,
    #[serde(default)]
    pub gateway: String,
    #[serde(default)]
    pub dns: String,
    #[serde(default)]
    pub hostname: String,
}

/// 单个分区
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionConfig {
    /// `/`、`/boot`、`swap` 等
    pub mount_point: String,
    /// 1G、16G，0 表示使用剩余空间
    pub size: String,
    pub fstype: String,
}

/// 磁盘布局
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskLayoutConfig {
    pub root_disk: String,
    /// gpt 或 msdos
    pub partition_table: String,
    pub partitions: Vec<PartitionConfig>,
}

impl DiskLayoutConfig {
    /// 默认三分区布局: /boot 1G ext4, swap 16G, / 剩余 ext4
    pub fn default_layout() -> Self {
        Self {
            root_disk: "/dev/sda".to_string(),
            partition_table: "gpt".to_string(),
            partitions: vec![
                PartitionConfig {
                    mount_point: "/boot".into(),
                    size: "1G".into(),
                    fstype: "ext4".into(),
                },
                PartitionConfig {
                    mount_point: "swap".into(),
                    size: "16G".into(),
                    fstype: "swap".into(),
                },
                PartitionConfig {
                    mount_point: "/".into(),
                    size: "0".into(),
                    fstype: "ext4".into(),
                },
            ],
        }
    }
}

/// 默认附加软件包
pub fn default_packages() -> Vec<String> {
    ["openssh-server", "wget", "curl", "vim", "net-tools"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// OS 安装配置，getOSInstallConfig / os_install 操作的数据体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OsInstallConfig {
    #[serde(rename = "install_method")]
    pub method: InstallMethod,
    pub os_type: String,
    pub os_version: String,
    #[serde(default)]
    pub mirror_url: String,
    #[serde(default)]
    pub regional_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kickstart_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_layout: Option<DiskLayoutConfig>,
    pub network: NetworkConfig,
    #[serde(default)]
    pub packages: Vec<String>,
    /// base64 编码的安装后脚本
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_install_script: Option<String>,
    /// 加密后的 root 口令
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_password: Option<String>,
}

/// RAID 配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RaidConfig {
    pub enabled: bool,
    /// 0 / 1 / 5 / 6 / 10
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub disks: Vec<String>,
    /// megacli / hpacucli / mdadm
    #[serde(default)]
    pub controller: String,
    #[serde(default)]
    pub virtual_disk: String,
}

/// 硬件配置脚本（base64 编码）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardwareScript {
    pub name: String,
    pub script: String,
}

/// getHardwareConfig 响应
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HardwareConfigResponse {
    pub scripts: Vec<HardwareScript>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raid: Option<RaidConfig>,
}

/// getNextOperation 的带标签联合体
///
/// 线上形如 {"operation": "os_install", "data": {...}}
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "operation", content = "data", rename_all = "snake_case")]
pub enum NextOperation {
    HardwareConfig { message: String },
    NetworkConfig { message: String },
    OsInstall(Box<OsInstallConfig>),
    Reboot { message: String },
    Complete { message: String },
    Wait { message: String },
}

impl NextOperation {
    /// 操作名，用于日志与 operationComplete 回报
    pub fn name(&self) -> &'static str {
        match self {
            NextOperation::HardwareConfig { .. } => "hardware_config",
            NextOperation::NetworkConfig { .. } => "network_config",
            NextOperation::OsInstall(_) => "os_install",
            NextOperation::Reboot { .. } => "reboot",
            NextOperation::Complete { .. } => "complete",
            NextOperation::Wait { .. } => "wait",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_operation_wire_shape() {
        let op = NextOperation::HardwareConfig {
            message: "Configure hardware settings".into(),
        };
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["operation"], "hardware_config");
        assert_eq!(json["data"]["message"], "Configure hardware settings");

        let parsed: NextOperation = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.name(), "hardware_config");
    }

    #[test]
    fn test_os_install_variant_carries_config() {
        let op = NextOperation::OsInstall(Box::new(OsInstallConfig {
            method: InstallMethod::Kickstart,
            os_type: "rocky".into(),
            os_version: "9".into(),
            mirror_url: "http://192.168.100.1:8081".into(),
            regional_url: "http://192.168.100.1:8081".into(),
            kickstart_url: Some("http://192.168.100.1:8081/api/v1/kickstart/SN1".into()),
            disk_layout: None,
            network: NetworkConfig::default(),
            packages: vec![],
            post_install_script: None,
            root_password: None,
        }));
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["operation"], "os_install");
        assert_eq!(json["data"]["install_method"], "kickstart");
        assert!(json["data"]["kickstart_url"]
            .as_str()
            .unwrap()
            .ends_with("/kickstart/SN1"));
    }

    #[test]
    fn test_default_layout() {
        let layout = DiskLayoutConfig::default_layout();
        assert_eq!(layout.partitions.len(), 3);
        assert_eq!(layout.partitions[0].mount_point, "/boot");
        assert_eq!(layout.partitions[1].fstype, "swap");
        assert_eq!(layout.partitions[2].size, "0");
    }
}
