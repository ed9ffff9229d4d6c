/// 硬件信息模型
///
/// Agent 采集并上报的硬件快照，区域客户端写入 meta 键

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 硬件信息
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HardwareInfo {
    pub serial_number: String,
    pub mac_address: String,
    /// 整机厂商
    #[serde(default)]
    pub company: String,
    /// 产品名称
    #[serde(default)]
    pub product: String,
    /// 型号
    #[serde(default)]
    pub model_name: String,
    /// 是否虚拟机
    #[serde(default)]
    pub is_vm: bool,
    pub cpu: CpuInfo,
    pub memory: MemoryInfo,
    #[serde(default)]
    pub disks: Vec<DiskInfo>,
    #[serde(default)]
    pub network: Vec<NetworkInterfaceInfo>,
    #[serde(default)]
    pub bios: BiosInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collected_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CpuInfo {
    pub model: String,
    pub cores: u32,
    pub threads: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryInfo {
    pub total_gb: u64,
    #[serde(default)]
    pub dimms: Vec<DimmInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimmInfo {
    pub slot: String,
    pub size_gb: u64,
    #[serde(rename = "type")]
    pub kind: String,
    pub speed_mhz: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskInfo {
    pub device: String,
    pub size_gb: u64,
    /// SSD / HDD / NVMe
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkInterfaceInfo {
    pub interface: String,
    pub mac: String,
    #[serde(default)]
    pub speed: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BiosInfo {
    pub vendor: String,
    pub version: String,
    pub serial: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hardware_round_trip() {
        let hw = HardwareInfo {
            serial_number: "SN1".into(),
            mac_address: "00:11:22:33:44:55".into(),
            cpu: CpuInfo {
                model: "Intel Xeon".into(),
                cores: 16,
                threads: 32,
            },
            memory: MemoryInfo {
                total_gb: 128,
                dimms: vec![],
            },
            disks: vec![DiskInfo {
                device: "/dev/sda".into(),
                size_gb: 480,
                kind: "SSD".into(),
                model: String::new(),
            }],
            ..Default::default()
        };
        let json = serde_json::to_string(&hw).unwrap();
        assert!(json.contains("\"type\":\"SSD\""));
        let decoded: HardwareInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.cpu.cores, 16);
        assert_eq!(decoded.disks[0].kind, "SSD");
    }
}
