/// RAID 配置
///
/// 按控制器类型分派到 MegaCli64 / hpacucli / mdadm

use tokio::process::Command;
use tracing::{info, warn};

use common::models::RaidConfig;
use common::{Error, Result};

/// RAID 配置器
pub struct RaidConfigurator {
    config: RaidConfig,
}

impl RaidConfigurator {
    pub fn new(config: RaidConfig) -> Self {
        Self { config }
    }

    /// 执行 RAID 配置
    pub async fn configure(&self) -> Result<()> {
        if !self.config.enabled {
            info!("RAID 未启用, 跳过配置");
            return Ok(());
        }

        info!(
            "配置 RAID {} (控制器: {})",
            self.config.level, self.config.controller
        );

        match self.config.controller.to_lowercase().as_str() {
            "megacli" => self.configure_megacli().await,
            "hpacucli" => self.configure_hpacucli().await,
            "mdadm" => self.configure_mdadm().await,
            other => Err(Error::Validation(format!("不支持的 RAID 控制器: {other}"))),
        }
    }

    /// LSI MegaRAID
    async fn configure_megacli(&self) -> Result<()> {
        ensure_tool("MegaCli64").await?;

        // 清掉旧的逻辑盘配置
        if let Err(e) = run("MegaCli64", &["-CfgLdDel", "-LALL", "-aALL"]).await {
            warn!("清理旧 RAID 配置失败: {}", e);
        }

        let raid_level = match self.config.level.as_str() {
            "0" => "-r0",
            "1" => "-r1",
            "5" => "-r5",
            "6" => "-r6",
            "10" => "-r10",
            other => {
                return Err(Error::Validation(format!("不支持的 RAID 级别: {other}")))
            }
        };

        let disk_list = self.megacli_disk_list();
        let disk_arg = format!("[{disk_list}]");
        let output = run(
            "MegaCli64",
            &["-CfgLdAdd", raid_level, &disk_arg, "WB", "Direct", "-a0"],
        )
        .await?;

        info!("MegaCli 输出: {}", output);
        info!("RAID 配置完成");
        Ok(())
    }

    /// HP Smart Array
    async fn configure_hpacucli(&self) -> Result<()> {
        ensure_tool("hpacucli").await?;

        if let Err(e) = run(
            "hpacucli",
            &["controller", "slot=0", "logicaldrive", "all", "delete", "forced"],
        )
        .await
        {
            warn!("清理旧逻辑盘失败: {}", e);
        }

        let drives = format!("drives={}", self.hpacucli_disk_list());
        let raid = format!("raid={}", self.config.level);
        let output = run(
            "hpacucli",
            &[
                "controller",
                "slot=0",
                "create",
                "type=logicaldrive",
                &drives,
                &raid,
            ],
        )
        .await?;

        info!("hpacucli 输出: {}", output);
        info!("RAID 配置完成");
        Ok(())
    }

    /// 软 RAID
    async fn configure_mdadm(&self) -> Result<()> {
        ensure_tool("mdadm").await?;

        for disk in &self.config.disks {
            if let Err(e) = run("mdadm", &["--zero-superblock", disk]).await {
                warn!("清零 {} 超级块失败: {}", disk, e);
            }
        }

        let device = self.virtual_disk();
        let level = format!("--level={}", self.config.level);
        let count = format!("--raid-devices={}", self.config.disks.len());

        let mut args: Vec<&str> = vec!["--create", &device, &level, &count];
        for disk in &self.config.disks {
            args.push(disk);
        }

        let output = run("mdadm", &args).await?;
        info!("mdadm 输出: {}", output);
        info!("RAID 阵列已创建, 后台同步中, 虚拟盘: {}", device);
        Ok(())
    }

    /// 校验 RAID 配置结果
    pub async fn verify(&self) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }

        info!("校验 RAID 配置...");
        let output = match self.config.controller.to_lowercase().as_str() {
            "megacli" => run("MegaCli64", &["-LDInfo", "-Lall", "-aALL"]).await?,
            "hpacucli" => {
                run(
                    "hpacucli",
                    &["controller", "slot=0", "logicaldrive", "all", "show"],
                )
                .await?
            }
            "mdadm" => {
                let device = self.virtual_disk();
                run("mdadm", &["--detail", &device]).await?
            }
            other => {
                return Err(Error::Validation(format!("不支持的 RAID 控制器: {other}")))
            }
        };

        info!("RAID 状态:\n{}", output);
        Ok(())
    }

    fn virtual_disk(&self) -> String {
        if self.config.virtual_disk.is_empty() {
            "/dev/md0".to_string()
        } else {
            self.config.virtual_disk.clone()
        }
    }

    /// MegaCli 的 enclosure:slot 列表
    ///
    /// 完整实现要查询控制器映射 /dev/sdX，这里按槽位顺序假定
    fn megacli_disk_list(&self) -> String {
        (1..=self.config.disks.len())
            .map(|i| format!("0:{i}"))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// hpacucli 的 port:box:bay 列表
    fn hpacucli_disk_list(&self) -> String {
        (1..=self.config.disks.len())
            .map(|i| format!("1I:1:{i}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// 工具可用性检查
async fn ensure_tool(name: &str) -> Result<()> {
    let found = Command::new("which")
        .arg(name)
        .output()
        .await
        .map(|out| out.status.success())
        .unwrap_or(false);
    if !found {
        return Err(Error::Validation(format!("未找到 {name}, 请先安装")));
    }
    Ok(())
}

/// 执行命令并合并 stdout/stderr
async fn run(program: &str, args: &[&str]) -> Result<String> {
    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|e| Error::Internal(format!("执行 {program} 失败: {e}")))?;

    let combined = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );

    if !output.status.success() {
        return Err(Error::Internal(format!(
            "{program} 退出码 {:?}:\n{combined}",
            output.status.code()
        )));
    }
    Ok(combined)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_disks(n: usize) -> RaidConfig {
        RaidConfig {
            enabled: true,
            level: "5".into(),
            disks: (0..n).map(|i| format!("/dev/sd{}", (b'b' + i as u8) as char)).collect(),
            controller: "megacli".into(),
            virtual_disk: String::new(),
        }
    }

    #[test]
    fn test_megacli_disk_list() {
        let configurator = RaidConfigurator::new(config_with_disks(3));
        assert_eq!(configurator.megacli_disk_list(), "0:1,0:2,0:3");
    }

    #[test]
    fn test_hpacucli_disk_list() {
        let configurator = RaidConfigurator::new(config_with_disks(2));
        assert_eq!(configurator.hpacucli_disk_list(), "1I:1:1,1I:1:2");
    }

    #[test]
    fn test_virtual_disk_default() {
        let configurator = RaidConfigurator::new(config_with_disks(2));
        assert_eq!(configurator.virtual_disk(), "/dev/md0");

        let mut config = config_with_disks(2);
        config.virtual_disk = "/dev/md127".into();
        let configurator = RaidConfigurator::new(config);
        assert_eq!(configurator.virtual_disk(), "/dev/md127");
    }

    #[tokio::test]
    async fn test_disabled_raid_is_noop() {
        let configurator = RaidConfigurator::new(RaidConfig::default());
        configurator.configure().await.unwrap();
        configurator.verify().await.unwrap();
    }
}
