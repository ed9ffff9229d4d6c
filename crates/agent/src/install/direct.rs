/// Agent 直装
///
/// 在目标机内完成分区、格式化、挂载、基础系统、系统配置与引导安装。
/// Debian 系用 debootstrap，RHEL 系用 dnf/yum --installroot

use std::path::PathBuf;

use tracing::{info, warn};

use common::models::{NetworkConfig, OsInstallConfig, PartitionConfig};
use common::{Error, Result};

use super::{run, run_tolerant};

/// 直装安装器
pub struct DirectInstaller {
    config: OsInstallConfig,
    mount_root: PathBuf,
}

impl DirectInstaller {
    pub fn new(config: OsInstallConfig) -> Self {
        Self {
            config,
            mount_root: PathBuf::from("/mnt"),
        }
    }

    fn layout(&self) -> Result<&common::models::DiskLayoutConfig> {
        self.config
            .disk_layout
            .as_ref()
            .ok_or_else(|| Error::Validation("直装配置缺少磁盘布局".into()))
    }

    /// 执行完整安装流程
    pub async fn install(&self) -> Result<()> {
        info!(
            "开始直装: {} {}",
            self.config.os_type, self.config.os_version
        );

        self.partition_disks().await?;
        self.format_partitions().await?;
        self.mount_filesystems().await?;
        self.install_base_system().await?;
        self.configure_system().await?;
        self.install_bootloader().await?;

        if let Err(e) = self.unmount_filesystems().await {
            warn!("卸载文件系统失败: {}", e);
        }

        info!("直装完成");
        Ok(())
    }

    /// GPT 分区
    async fn partition_disks(&self) -> Result<()> {
        let layout = self.layout()?;
        let disk = &layout.root_disk;
        info!("对 {} 分区", disk);

        // 抹掉旧分区表
        run("sgdisk", &["-Z", disk]).await?;

        if layout.partition_table != "gpt" && !layout.partition_table.is_empty() {
            return Err(Error::Validation(format!(
                "暂不支持 {} 分区表",
                layout.partition_table
            )));
        }

        for (index, part) in layout.partitions.iter().enumerate() {
            let part_num = index + 1;
            info!(
                "创建分区 {}: {} ({}, {})",
                part_num, part.mount_point, part.size, part.fstype
            );

            let size_spec = if part.size == "0" || part.size.is_empty() {
                // 剩余空间
                format!("{part_num}:0:0")
            } else {
                format!("{part_num}:0:+{}", part.size)
            };
            run("sgdisk", &["-n", &size_spec, disk]).await?;
        }

        // 让内核重读分区表
        run_tolerant("partprobe", &[disk]).await;

        info!("分区完成");
        Ok(())
    }

    /// 逐个分区格式化
    async fn format_partitions(&self) -> Result<()> {
        let layout = self.layout()?;
        info!("格式化分区...");

        for (index, part) in layout.partitions.iter().enumerate() {
            let device = partition_device(&layout.root_disk, index + 1);
            info!("格式化 {} 为 {}", device, part.fstype);

            match part.fstype.as_str() {
                "ext4" => {
                    run("mkfs.ext4", &["-F", &device]).await?;
                }
                "xfs" => {
                    run("mkfs.xfs", &["-f", &device]).await?;
                }
                "swap" => {
                    run("mkswap", &[device.as_str()]).await?;
                }
                other => {
                    warn!("未知文件系统 {}, 跳过 {}", other, device);
                }
            }
        }

        info!("格式化完成");
        Ok(())
    }

    /// 挂载根与其余挂载点，激活 swap
    async fn mount_filesystems(&self) -> Result<()> {
        let layout = self.layout()?;
        info!("挂载文件系统...");

        let root_device = layout
            .partitions
            .iter()
            .position(|p| p.mount_point == "/")
            .map(|index| partition_device(&layout.root_disk, index + 1))
            .ok_or_else(|| Error::Validation("磁盘布局缺少根分区".into()))?;

        let mount_root = self.mount_root.to_string_lossy().to_string();
        std::fs::create_dir_all(&self.mount_root)
            .map_err(|e| Error::Internal(format!("创建挂载点失败: {e}")))?;
        run("mount", &[&root_device, &mount_root]).await?;

        for (index, part) in layout.partitions.iter().enumerate() {
            if part.mount_point == "/" || part.mount_point == "swap" {
                continue;
            }
            let device = partition_device(&layout.root_disk, index + 1);
            let target = self.mount_root.join(part.mount_point.trim_start_matches('/'));
            std::fs::create_dir_all(&target)
                .map_err(|e| Error::Internal(format!("创建挂载点失败: {e}")))?;
            run("mount", &[&device, &target.to_string_lossy()]).await?;
        }

        for (index, part) in layout.partitions.iter().enumerate() {
            if part.mount_point == "swap" {
                let device = partition_device(&layout.root_disk, index + 1);
                if !run_tolerant("swapon", &[device.as_str()]).await {
                    warn!("激活 swap {} 失败", device);
                }
            }
        }

        info!("挂载完成");
        Ok(())
    }

    /// 安装基础系统
    async fn install_base_system(&self) -> Result<()> {
        match self.config.os_type.to_lowercase().as_str() {
            "ubuntu" | "debian" => self.install_debian().await,
            "centos" | "rocky" | "rhel" => self.install_rhel().await,
            other => Err(Error::Validation(format!("不支持的 OS 类型: {other}"))),
        }
    }

    async fn install_debian(&self) -> Result<()> {
        let codename = debian_codename(&self.config.os_type, &self.config.os_version);
        let mirror = if self.config.mirror_url.is_empty() {
            if self.config.os_type == "ubuntu" {
                "http://archive.ubuntu.com/ubuntu".to_string()
            } else {
                "http://deb.debian.org/debian".to_string()
            }
        } else {
            self.config.mirror_url.clone()
        };

        info!("debootstrap {} (镜像 {})...", codename, mirror);
        let mount_root = self.mount_root.to_string_lossy().to_string();
        run(
            "debootstrap",
            &["--arch=amd64", codename, &mount_root, &mirror],
        )
        .await?;

        info!("基础系统安装完成");
        Ok(())
    }

    async fn install_rhel(&self) -> Result<()> {
        let pkg_mgr = if run_tolerant("which", &["dnf"]).await {
            "dnf"
        } else {
            "yum"
        };

        info!("使用 {} 安装基础系统...", pkg_mgr);
        let installroot = format!("--installroot={}", self.mount_root.display());
        let releasever = format!("--releasever={}", self.config.os_version);
        run(
            pkg_mgr,
            &[
                &installroot,
                &releasever,
                "-y",
                "install",
                "@core",
                "kernel",
                "grub2",
                "grub2-tools",
            ],
        )
        .await?;

        info!("基础系统安装完成");
        Ok(())
    }

    /// 主机名、网络、fstab、root 口令与附加软件包
    async fn configure_system(&self) -> Result<()> {
        info!("配置系统...");

        self.configure_hostname()?;
        self.configure_network()?;
        self.configure_fstab().await?;
        self.set_root_password().await?;

        if !self.config.packages.is_empty() {
            if let Err(e) = self.install_packages().await {
                warn!("附加软件包安装失败: {}", e);
            }
        }

        info!("系统配置完成");
        Ok(())
    }

    fn configure_hostname(&self) -> Result<()> {
        let hostname = if self.config.network.hostname.is_empty() {
            "localhost"
        } else {
            &self.config.network.hostname
        };
        info!("设置主机名: {}", hostname);

        let etc = self.mount_root.join("etc");
        std::fs::create_dir_all(&etc).map_err(|e| Error::Internal(e.to_string()))?;
        std::fs::write(etc.join("hostname"), format!("{hostname}\n"))
            .map_err(|e| Error::Internal(format!("写入 hostname 失败: {e}")))?;

        let hosts = format!("127.0.0.1   localhost\n127.0.1.1   {hostname}\n");
        std::fs::write(etc.join("hosts"), hosts)
            .map_err(|e| Error::Internal(format!("写入 hosts 失败: {e}")))?;
        Ok(())
    }

    fn configure_network(&self) -> Result<()> {
        info!("配置网络...");
        match self.config.os_type.to_lowercase().as_str() {
            "ubuntu" | "debian" => self.write_netplan(&self.config.network),
            "centos" | "rocky" | "rhel" => self.write_ifcfg(&self.config.network),
            other => Err(Error::Validation(format!(
                "不支持网络配置的 OS 类型: {other}"
            ))),
        }
    }

    fn write_netplan(&self, net: &NetworkConfig) -> Result<()> {
        let netplan_dir = self.mount_root.join("etc/netplan");
        std::fs::create_dir_all(&netplan_dir).map_err(|e| Error::Internal(e.to_string()))?;

        let content = render_netplan(net);
        std::fs::write(netplan_dir.join("01-netcfg.yaml"), content)
            .map_err(|e| Error::Internal(format!("写入 netplan 失败: {e}")))?;
        Ok(())
    }

    fn write_ifcfg(&self, net: &NetworkConfig) -> Result<()> {
        let scripts_dir = self.mount_root.join("etc/sysconfig/network-scripts");
        std::fs::create_dir_all(&scripts_dir).map_err(|e| Error::Internal(e.to_string()))?;

        let content = render_ifcfg(net);
        std::fs::write(
            scripts_dir.join(format!("ifcfg-{}", net.interface)),
            content,
        )
        .map_err(|e| Error::Internal(format!("写入 ifcfg 失败: {e}")))?;
        Ok(())
    }

    /// 按 UUID 生成 fstab，取不到 UUID 退回设备名
    async fn configure_fstab(&self) -> Result<()> {
        info!("生成 /etc/fstab...");
        let layout = self.layout()?;

        let mut lines = Vec::new();
        for (index, part) in layout.partitions.iter().enumerate() {
            let device = partition_device(&layout.root_disk, index + 1);
            let identifier = match run("blkid", &["-s", "UUID", "-o", "value", &device]).await {
                Ok(uuid) if !uuid.trim().is_empty() => format!("UUID={}", uuid.trim()),
                _ => device.clone(),
            };
            lines.push(fstab_line(&identifier, part));
        }

        let fstab = lines.join("\n") + "\n";
        std::fs::write(self.mount_root.join("etc/fstab"), fstab)
            .map_err(|e| Error::Internal(format!("写入 fstab 失败: {e}")))?;
        Ok(())
    }

    async fn set_root_password(&self) -> Result<()> {
        let Some(password) = &self.config.root_password else {
            info!("未提供 root 口令, 跳过");
            return Ok(());
        };

        info!("设置 root 口令...");
        let mount_root = self.mount_root.to_string_lossy().to_string();
        let script = format!("echo 'root:{password}' | chpasswd -e");
        run("chroot", &[&mount_root, "/bin/bash", "-c", &script]).await?;
        Ok(())
    }

    async fn install_packages(&self) -> Result<()> {
        info!("安装 {} 个附加软件包...", self.config.packages.len());

        self.mount_chroot_filesystems().await;
        let result = self.install_packages_inner().await;
        self.unmount_chroot_filesystems().await;
        result
    }

    async fn install_packages_inner(&self) -> Result<()> {
        let mount_root = self.mount_root.to_string_lossy().to_string();
        let mut args: Vec<&str> = vec![&mount_root];

        match self.config.os_type.to_lowercase().as_str() {
            "ubuntu" | "debian" => {
                args.extend(["apt-get", "install", "-y"]);
            }
            "centos" | "rocky" | "rhel" => {
                let pkg_mgr = if run_tolerant("which", &["dnf"]).await {
                    "dnf"
                } else {
                    "yum"
                };
                args.extend([pkg_mgr, "install", "-y"]);
            }
            other => return Err(Error::Validation(format!("不支持的 OS 类型: {other}"))),
        }
        for pkg in &self.config.packages {
            args.push(pkg);
        }

        run("chroot", &args).await?;
        Ok(())
    }

    /// GRUB 安装，UEFI 优先，失败回退传统 BIOS
    async fn install_bootloader(&self) -> Result<()> {
        info!("安装引导加载器...");

        self.mount_chroot_filesystems().await;
        let result = self.install_bootloader_inner().await;
        self.unmount_chroot_filesystems().await;
        result
    }

    async fn install_bootloader_inner(&self) -> Result<()> {
        let layout = self.layout()?;
        let disk = layout.root_disk.clone();
        let mount_root = self.mount_root.to_string_lossy().to_string();

        match self.config.os_type.to_lowercase().as_str() {
            "ubuntu" | "debian" => {
                let efi_attempt = run(
                    "chroot",
                    &[
                        &mount_root,
                        "grub-install",
                        "--target=x86_64-efi",
                        "--efi-directory=/boot/efi",
                        "--recheck",
                        &disk,
                    ],
                )
                .await;
                if let Err(e) = efi_attempt {
                    warn!("EFI 安装失败, 回退传统 BIOS 模式: {}", e);
                    run("chroot", &[&mount_root, "grub-install", &disk]).await?;
                }
                run("chroot", &[&mount_root, "update-grub"]).await?;
            }
            "centos" | "rocky" | "rhel" => {
                run("chroot", &[&mount_root, "grub2-install", &disk]).await?;
                run(
                    "chroot",
                    &[
                        &mount_root,
                        "grub2-mkconfig",
                        "-o",
                        "/boot/grub2/grub.cfg",
                    ],
                )
                .await?;
            }
            other => return Err(Error::Validation(format!("不支持的 OS 类型: {other}"))),
        }

        info!("引导加载器安装完成");
        Ok(())
    }

    /// chroot 需要的 proc/sys/dev 挂载
    async fn mount_chroot_filesystems(&self) {
        let root = &self.mount_root;
        let binds = [
            ("proc", root.join("proc"), Some("proc")),
            ("/sys", root.join("sys"), Some("sysfs")),
            ("/dev", root.join("dev"), None),
            ("/dev/pts", root.join("dev/pts"), None),
        ];

        for (source, target, fstype) in binds {
            let _ = std::fs::create_dir_all(&target);
            let target_str = target.to_string_lossy().to_string();
            match fstype {
                Some(fstype) => {
                    run_tolerant("mount", &["-t", fstype, source, &target_str]).await;
                }
                None => {
                    run_tolerant("mount", &["--bind", source, &target_str]).await;
                }
            }
        }
    }

    async fn unmount_chroot_filesystems(&self) {
        let root = &self.mount_root;
        for target in ["dev/pts", "dev", "sys", "proc"] {
            let target = root.join(target).to_string_lossy().to_string();
            run_tolerant("umount", &[target.as_str()]).await;
        }
    }

    async fn unmount_filesystems(&self) -> Result<()> {
        info!("卸载文件系统...");
        run_tolerant("swapoff", &["-a"]).await;
        let mount_root = self.mount_root.to_string_lossy().to_string();
        run("umount", &["-R", &mount_root]).await?;
        Ok(())
    }
}

/// 分区设备名，nvme 带 p 前缀
fn partition_device(disk: &str, part_num: usize) -> String {
    if disk.contains("nvme") {
        format!("{disk}p{part_num}")
    } else {
        format!("{disk}{part_num}")
    }
}

/// Debian 系版本号转代号
fn debian_codename(os_type: &str, os_version: &str) -> &'static str {
    if os_type == "ubuntu" {
        match os_version {
            "20.04" => "focal",
            "22.04" => "jammy",
            "24.04" => "noble",
            _ => "jammy",
        }
    } else {
        match os_version {
            "11" => "bullseye",
            "12" => "bookworm",
            _ => "bookworm",
        }
    }
}

fn render_netplan(net: &NetworkConfig) -> String {
    if net.method == "static" {
        format!(
            r#"network:
  version: 2
  ethernets:
    {}:
      addresses:
        - {}/{}
      gateway4: {}
      nameservers:
        addresses:
          - {}
"#,
            net.interface,
            net.ip,
            cidr_from_netmask(&net.netmask),
            net.gateway,
            net.dns
        )
    } else {
        format!(
            r#"network:
  version: 2
  ethernets:
    {}:
      dhcp4: true
"#,
            net.interface
        )
    }
}

fn render_ifcfg(net: &NetworkConfig) -> String {
    if net.method == "static" {
        format!(
            "DEVICE={}\nBOOTPROTO=static\nONBOOT=yes\nIPADDR={}\nNETMASK={}\nGATEWAY={}\nDNS1={}\n",
            net.interface, net.ip, net.netmask, net.gateway, net.dns
        )
    } else {
        format!("DEVICE={}\nBOOTPROTO=dhcp\nONBOOT=yes\n", net.interface)
    }
}

/// 点分掩码转 CIDR 位数
fn cidr_from_netmask(netmask: &str) -> u32 {
    netmask
        .parse::<std::net::Ipv4Addr>()
        .map(|mask| u32::from(mask).count_ones())
        .unwrap_or(24)
}

fn fstab_line(identifier: &str, part: &PartitionConfig) -> String {
    if part.mount_point == "swap" {
        format!("{identifier} none swap sw 0 0")
    } else {
        let dump_pass = match part.mount_point.as_str() {
            "/" => "0 1",
            "/boot" => "0 2",
            _ => "0 0",
        };
        format!(
            "{identifier} {} {} defaults {dump_pass}",
            part.mount_point, part.fstype
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_device_naming() {
        assert_eq!(partition_device("/dev/sda", 1), "/dev/sda1");
        assert_eq!(partition_device("/dev/sda", 3), "/dev/sda3");
        assert_eq!(partition_device("/dev/nvme0n1", 1), "/dev/nvme0n1p1");
    }

    #[test]
    fn test_debian_codename() {
        assert_eq!(debian_codename("ubuntu", "20.04"), "focal");
        assert_eq!(debian_codename("ubuntu", "22.04"), "jammy");
        assert_eq!(debian_codename("ubuntu", "24.04"), "noble");
        assert_eq!(debian_codename("ubuntu", "99.99"), "jammy");
        assert_eq!(debian_codename("debian", "11"), "bullseye");
        assert_eq!(debian_codename("debian", "12"), "bookworm");
    }

    #[test]
    fn test_cidr_from_netmask() {
        assert_eq!(cidr_from_netmask("255.255.255.0"), 24);
        assert_eq!(cidr_from_netmask("255.255.0.0"), 16);
        assert_eq!(cidr_from_netmask("255.255.255.192"), 26);
        assert_eq!(cidr_from_netmask("bogus"), 24);
    }

    #[test]
    fn test_fstab_lines() {
        let swap = PartitionConfig {
            mount_point: "swap".into(),
            size: "16G".into(),
            fstype: "swap".into(),
        };
        assert_eq!(
            fstab_line("UUID=abc", &swap),
            "UUID=abc none swap sw 0 0"
        );

        let root = PartitionConfig {
            mount_point: "/".into(),
            size: "0".into(),
            fstype: "ext4".into(),
        };
        assert_eq!(
            fstab_line("UUID=abc", &root),
            "UUID=abc / ext4 defaults 0 1"
        );

        let boot = PartitionConfig {
            mount_point: "/boot".into(),
            size: "1G".into(),
            fstype: "ext4".into(),
        };
        assert_eq!(
            fstab_line("/dev/sda1", &boot),
            "/dev/sda1 /boot ext4 defaults 0 2"
        );
    }

    #[test]
    fn test_netplan_static_rendering() {
        let net = NetworkConfig {
            interface: "eth0".into(),
            method: "static".into(),
            ip: "192.168.100.50".into(),
            netmask: "255.255.255.0".into(),
            gateway: "192.168.100.1".into(),
            dns: "192.168.100.1".into(),
            hostname: "node-1".into(),
        };
        let rendered = render_netplan(&net);
        assert!(rendered.contains("- 192.168.100.50/24"));
        assert!(rendered.contains("gateway4: 192.168.100.1"));

        let mut dhcp = net;
        dhcp.method = "dhcp".into();
        assert!(render_netplan(&dhcp).contains("dhcp4: true"));
    }

    #[test]
    fn test_ifcfg_rendering() {
        let net = NetworkConfig {
            interface: "eth0".into(),
            method: "static".into(),
            ip: "10.0.0.2".into(),
            netmask: "255.255.255.0".into(),
            gateway: "10.0.0.1".into(),
            dns: "10.0.0.1".into(),
            hostname: String::new(),
        };
        let rendered = render_ifcfg(&net);
        assert!(rendered.contains("BOOTPROTO=static"));
        assert!(rendered.contains("IPADDR=10.0.0.2"));
    }
}
