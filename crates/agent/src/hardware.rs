/// 硬件信息采集
///
/// DMI、procfs 与 sysfs 直读，sysinfo 补充 CPU 与内存；
/// 序列号优先取 DMI，拿不到时退回用 MAC 生成

use std::path::Path;

use sysinfo::System;
use tracing::warn;

use common::models::{
    BiosInfo, CpuInfo, DiskInfo, HardwareInfo, MemoryInfo, NetworkInterfaceInfo,
};

/// DMI 中常见的占位值
const DMI_PLACEHOLDERS: &[&str] = &["", "Not Specified", "To Be Filled By O.E.M.", "Default string"];

/// 采集整机硬件信息
pub fn collect() -> HardwareInfo {
    let mut sys = System::new_all();
    sys.refresh_all();

    let mut hw = HardwareInfo {
        company: read_dmi("sys_vendor"),
        product: read_dmi("product_name"),
        model_name: read_dmi("product_version"),
        is_vm: detect_virtual_machine(),
        cpu: collect_cpu(&sys),
        memory: collect_memory(&sys),
        disks: collect_disks(),
        network: collect_network(),
        bios: collect_bios(),
        collected_at: Some(chrono::Utc::now()),
        ..Default::default()
    };

    // 首块物理网卡的 MAC 作为上报标识
    if let Some(first) = hw.network.first() {
        hw.mac_address = first.mac.clone();
    }

    hw.serial_number = read_serial_number();
    if hw.serial_number.is_empty() {
        hw.serial_number = hw.mac_address.replace(':', "-");
        warn!("未取到系统序列号, 以 MAC 代替: {}", hw.serial_number);
    }

    hw
}

fn read_dmi(field: &str) -> String {
    let path = format!("/sys/class/dmi/id/{field}");
    match std::fs::read_to_string(&path) {
        Ok(value) => {
            let value = value.trim().to_string();
            if DMI_PLACEHOLDERS.contains(&value.as_str()) {
                "Unknown".to_string()
            } else {
                value
            }
        }
        Err(_) => "Unknown".to_string(),
    }
}

/// 序列号多源读取
///
/// VMware 虚机的序列号带空格，只取第一个字段；
/// 物理机序列号连续不受影响
fn read_serial_number() -> String {
    for field in ["product_serial", "board_serial"] {
        if let Ok(raw) = std::fs::read_to_string(format!("/sys/class/dmi/id/{field}")) {
            let serial = raw
                .trim()
                .split_whitespace()
                .next()
                .unwrap_or("")
                .to_string();
            if !DMI_PLACEHOLDERS.contains(&serial.as_str()) {
                return serial;
            }
        }
    }

    // dmidecode 需要 root，失败忽略
    if let Ok(output) = std::process::Command::new("sh")
        .arg("-c")
        .arg("dmidecode -s system-serial-number | awk '{print $1}'")
        .output()
    {
        let serial = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !DMI_PLACEHOLDERS.contains(&serial.as_str()) {
            return serial;
        }
    }

    String::new()
}

/// 虚机探测：DMI 厂商、产品名与 cpuinfo hypervisor 标志
fn detect_virtual_machine() -> bool {
    const VM_VENDORS: &[&str] = &[
        "vmware",
        "virtualbox",
        "qemu",
        "kvm",
        "xen",
        "microsoft corporation",
        "innotek",
        "parallels",
    ];

    if let Ok(vendor) = std::fs::read_to_string("/sys/class/dmi/id/sys_vendor") {
        let vendor = vendor.to_lowercase();
        if VM_VENDORS.iter().any(|vm| vendor.contains(vm)) {
            return true;
        }
    }

    if let Ok(product) = std::fs::read_to_string("/sys/class/dmi/id/product_name") {
        let product = product.to_lowercase();
        if ["virtual", "vmware", "virtualbox", "kvm", "qemu"]
            .iter()
            .any(|vm| product.contains(vm))
        {
            return true;
        }
    }

    if let Ok(cpuinfo) = std::fs::read_to_string("/proc/cpuinfo") {
        if cpuinfo.contains("hypervisor") {
            return true;
        }
    }

    false
}

fn collect_cpu(sys: &System) -> CpuInfo {
    let mut model = sys
        .cpus()
        .first()
        .map(|cpu| cpu.brand().trim().to_string())
        .unwrap_or_default();

    // sysinfo 拿不到型号时读 cpuinfo 的 model name 行
    if model.is_empty() {
        if let Ok(cpuinfo) = std::fs::read_to_string("/proc/cpuinfo") {
            for line in cpuinfo.lines() {
                if line.starts_with("model name") {
                    if let Some((_, value)) = line.split_once(':') {
                        model = value.trim().to_string();
                        break;
                    }
                }
            }
        }
    }
    if model.is_empty() {
        model = "Unknown CPU".to_string();
    }

    let threads = sys.cpus().len() as u32;
    let cores = sys
        .physical_core_count()
        .map(|c| c as u32)
        .unwrap_or(threads);

    CpuInfo {
        model,
        cores,
        threads,
    }
}

fn collect_memory(sys: &System) -> MemoryInfo {
    MemoryInfo {
        total_gb: sys.total_memory() / 1024 / 1024 / 1024,
        dimms: Vec::new(),
    }
}

/// /sys/block 下扫描真实磁盘，容量按 512 字节扇区折算
fn collect_disks() -> Vec<DiskInfo> {
    let mut disks = Vec::new();
    let Ok(entries) = std::fs::read_dir("/sys/block") else {
        warn!("读取 /sys/block 失败");
        return disks;
    };

    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with("loop") || name.starts_with("ram") || name.starts_with("zram") {
            continue;
        }

        let Ok(size_raw) = std::fs::read_to_string(format!("/sys/block/{name}/size")) else {
            continue;
        };
        let Ok(sectors) = size_raw.trim().parse::<u64>() else {
            continue;
        };
        if sectors == 0 {
            continue;
        }
        let size_gb = sectors * 512 / 1024 / 1024 / 1024;

        let rotational =
            std::fs::read_to_string(format!("/sys/block/{name}/queue/rotational"))
                .map(|v| v.trim() == "1")
                .unwrap_or(true);
        let kind = if name.starts_with("nvme") {
            "NVMe"
        } else if rotational {
            "HDD"
        } else {
            "SSD"
        };

        let model = std::fs::read_to_string(format!("/sys/block/{name}/device/model"))
            .map(|v| v.trim().to_string())
            .unwrap_or_default();

        disks.push(DiskInfo {
            device: format!("/dev/{name}"),
            size_gb,
            kind: kind.to_string(),
            model,
        });
    }

    disks.sort_by(|a, b| a.device.cmp(&b.device));
    disks
}

/// /sys/class/net 下扫描物理网卡，跳过回环与虚拟设备
fn collect_network() -> Vec<NetworkInterfaceInfo> {
    let mut interfaces = Vec::new();
    let Ok(entries) = std::fs::read_dir("/sys/class/net") else {
        return interfaces;
    };

    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        if name == "lo"
            || name.starts_with("veth")
            || name.starts_with("docker")
            || name.starts_with("br-")
            || name.starts_with("virbr")
        {
            continue;
        }

        let Ok(mac) = std::fs::read_to_string(format!("/sys/class/net/{name}/address")) else {
            continue;
        };
        let mac = mac.trim().to_string();
        if mac.is_empty() || mac == "00:00:00:00:00:00" {
            continue;
        }

        let speed = std::fs::read_to_string(format!("/sys/class/net/{name}/speed"))
            .ok()
            .map(|v| format!("{}Mb/s", v.trim()))
            .unwrap_or_else(|| "Unknown".to_string());

        interfaces.push(NetworkInterfaceInfo {
            interface: name,
            mac,
            speed,
        });
    }

    interfaces.sort_by(|a, b| a.interface.cmp(&b.interface));
    interfaces
}

fn collect_bios() -> BiosInfo {
    let serial = {
        let raw = std::fs::read_to_string("/sys/class/dmi/id/product_serial")
            .map(|v| v.trim().to_string())
            .unwrap_or_default();
        if DMI_PLACEHOLDERS.contains(&raw.as_str()) {
            String::new()
        } else {
            raw
        }
    };

    BiosInfo {
        vendor: std::fs::read_to_string("/sys/class/dmi/id/bios_vendor")
            .map(|v| v.trim().to_string())
            .unwrap_or_default(),
        version: std::fs::read_to_string("/sys/class/dmi/id/bios_version")
            .map(|v| v.trim().to_string())
            .unwrap_or_default(),
        serial,
    }
}

/// 判断路径是否存在（部分执行环境没有 /sys/class/dmi）
pub fn dmi_available() -> bool {
    Path::new("/sys/class/dmi/id").exists()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_produces_consistent_identifiers() {
        let hw = collect();
        // 序列号与 MAC 至少有一个非空来源
        if hw.serial_number.is_empty() {
            assert!(hw.mac_address.is_empty());
        }
        if !hw.mac_address.is_empty() {
            assert!(hw.mac_address.contains(':'));
        }
        assert!(hw.cpu.threads >= hw.cpu.cores);
    }

    #[test]
    fn test_placeholder_filtering() {
        assert!(DMI_PLACEHOLDERS.contains(&""));
        assert!(DMI_PLACEHOLDERS.contains(&"Not Specified"));
    }
}
