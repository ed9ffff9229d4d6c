/// Servant 循环与操作执行器
///
/// 反复询问区域客户端下一步做什么，执行一步，回报结果。
/// 每个操作从 Agent 视角都是幂等的

use std::os::unix::fs::PermissionsExt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tokio::process::Command;
use tracing::{info, warn};

use common::models::{HardwareScript, InstallMethod, NextOperation, OsInstallConfig};
use common::{Error, Result, Tunables};

use crate::client::RegionalClient;
use crate::install::direct::DirectInstaller;
use crate::install::kickstart::{KickstartInstaller, KickstartSetup};
use crate::raid::RaidConfigurator;

/// servant 主循环
///
/// complete 与 reboot 终止循环；达到迭代上限视为异常
pub async fn servant_loop(
    client: &RegionalClient,
    sn: &str,
    tunables: &Tunables,
) -> anyhow::Result<()> {
    let max_operations = tunables.servant_max_operations;
    let mut operation_count = 0;

    while operation_count < max_operations {
        operation_count += 1;
        info!("[操作 {}] 询问服务端: 下一步做什么?", operation_count);

        let operation = match client.get_next_operation(sn).await {
            Ok(operation) => operation,
            Err(e) => {
                warn!("获取下一步操作失败: {}, 稍后重试", e);
                tokio::time::sleep(tunables.servant_sleep).await;
                continue;
            }
        };

        info!("服务端指示: {}", operation.name());

        match operation {
            NextOperation::HardwareConfig { .. } => {
                match execute_hardware_config(client, sn).await {
                    Ok(_) => {
                        client
                            .operation_complete(sn, "hardware_config", true, "Hardware config completed")
                            .await;
                    }
                    Err(e) => {
                        warn!("硬件配置失败: {}", e);
                        client
                            .operation_complete(sn, "hardware_config", false, &e.to_string())
                            .await;
                        return Err(e.into());
                    }
                }
            }
            NextOperation::NetworkConfig { message } => {
                match execute_network_config(&message).await {
                    Ok(_) => {
                        client
                            .operation_complete(sn, "network_config", true, "Network config completed")
                            .await;
                    }
                    Err(e) => {
                        warn!("网络配置失败: {}", e);
                        client
                            .operation_complete(sn, "network_config", false, &e.to_string())
                            .await;
                        return Err(e.into());
                    }
                }
            }
            NextOperation::OsInstall(config) => {
                // 数据体不完整时回源拉取完整安装配置
                let config = if config.kickstart_url.is_none() && config.disk_layout.is_none() {
                    match client.get_os_install_config(sn).await {
                        Ok(full) => Box::new(full),
                        Err(e) => {
                            warn!("回源安装配置失败: {}, 使用原数据体", e);
                            config
                        }
                    }
                } else {
                    config
                };
                match execute_os_install(*config).await {
                    Ok(_) => {
                        client
                            .operation_complete(sn, "os_install", true, "OS install completed")
                            .await;
                    }
                    Err(e) => {
                        warn!("OS 安装失败: {}", e);
                        client
                            .operation_complete(sn, "os_install", false, &e.to_string())
                            .await;
                        return Err(e.into());
                    }
                }
            }
            NextOperation::Reboot { .. } => {
                info!("服务端要求重启");
                client
                    .operation_complete(sn, "reboot", true, "Preparing to reboot")
                    .await;
                // 退出进程，引导环境负责真正的重启
                info!("交还控制权, 等待引导环境重启本机");
                return Ok(());
            }
            NextOperation::Complete { .. } => {
                info!("所有操作已完成");
                return Ok(());
            }
            NextOperation::Wait { message } => {
                info!("等待中: {}", message);
                tokio::time::sleep(tunables.poll_interval).await;
                continue;
            }
        }

        tokio::time::sleep(tunables.servant_sleep).await;
    }

    anyhow::bail!("达到操作上限 ({max_operations}), 终止循环")
}

/// hardware_config: 拉取脚本包，先做 RAID，再逐个执行脚本
pub async fn execute_hardware_config(client: &RegionalClient, sn: &str) -> Result<()> {
    info!("执行硬件配置...");

    let config = client.get_hardware_config(sn).await?;

    if let Some(raid) = &config.raid {
        if raid.enabled {
            info!("检测到 RAID 配置, 开始配置...");
            let configurator = RaidConfigurator::new(raid.clone());
            configurator.configure().await?;
            if let Err(e) = configurator.verify().await {
                warn!("RAID 校验失败: {}", e);
            }
            info!("RAID 配置完成");
        }
    }

    info!("收到 {} 个硬件配置脚本", config.scripts.len());
    for (index, script) in config.scripts.iter().enumerate() {
        info!(
            "[{}/{}] 执行脚本: {}",
            index + 1,
            config.scripts.len(),
            script.name
        );
        let output = run_script(script).await?;
        info!("脚本 {} 输出: {}", script.name, output.trim());
    }

    Ok(())
}

/// 解码 base64 脚本写入临时可执行文件并用 bash 执行
async fn run_script(script: &HardwareScript) -> Result<String> {
    let content = BASE64
        .decode(&script.script)
        .map_err(|e| Error::Validation(format!("脚本 {} base64 解码失败: {e}", script.name)))?;

    let tmp = tempfile::Builder::new()
        .prefix(&format!("hw-config-{}-", script.name))
        .suffix(".sh")
        .tempfile()
        .map_err(|e| Error::Internal(format!("创建临时脚本失败: {e}")))?;

    std::fs::write(tmp.path(), &content)
        .map_err(|e| Error::Internal(format!("写入脚本失败: {e}")))?;
    std::fs::set_permissions(tmp.path(), std::fs::Permissions::from_mode(0o755))
        .map_err(|e| Error::Internal(format!("设置脚本权限失败: {e}")))?;

    let output = Command::new("/bin/bash")
        .arg(tmp.path())
        .output()
        .await
        .map_err(|e| Error::Internal(format!("执行脚本失败: {e}")))?;

    let combined = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );

    if !output.status.success() {
        return Err(Error::Internal(format!(
            "脚本 {} 退出码 {:?}:\n{combined}",
            script.name,
            output.status.code()
        )));
    }
    Ok(combined)
}

/// network_config: 任务已带网络设置时这里无事可做
pub async fn execute_network_config(message: &str) -> Result<()> {
    info!("执行网络配置: {}", message);
    // 实际下发的网络参数随 os_install 配置一并生效
    tokio::time::sleep(std::time::Duration::from_secs(2)).await;
    info!("网络配置完成");
    Ok(())
}

/// os_install: 按方式分派
pub async fn execute_os_install(config: OsInstallConfig) -> Result<()> {
    info!(
        "执行 OS 安装: {} {} (方式: {:?})",
        config.os_type, config.os_version, config.method
    );

    match config.method {
        InstallMethod::AgentDirect => {
            let installer = DirectInstaller::new(config);
            installer.install().await
        }
        InstallMethod::Kickstart => {
            let kickstart_url = config
                .kickstart_url
                .clone()
                .filter(|url| !url.is_empty())
                .ok_or_else(|| Error::Validation("kickstart 方式缺少 kickstart_url".into()))?;

            let mut installer = KickstartInstaller::new(KickstartSetup {
                kickstart_url,
                kernel_url: String::new(),
                initrd_url: String::new(),
                os_type: config.os_type,
                os_version: config.os_version,
            });
            // 成功时 kexec 直接切换内核，不会返回
            installer.install().await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_script_captures_output() {
        let script = HardwareScript {
            name: "echo".into(),
            script: BASE64.encode("#!/bin/bash\necho configured-ok\n"),
        };
        let output = run_script(&script).await.unwrap();
        assert!(output.contains("configured-ok"));
    }

    #[tokio::test]
    async fn test_run_script_surfaces_failure() {
        let script = HardwareScript {
            name: "fail".into(),
            script: BASE64.encode("#!/bin/bash\necho boom >&2\nexit 3\n"),
        };
        let err = run_script(&script).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("boom"));
        assert!(message.contains('3'));
    }

    #[tokio::test]
    async fn test_run_script_rejects_bad_base64() {
        let script = HardwareScript {
            name: "bad".into(),
            script: "not base64!!!".into(),
        };
        assert!(run_script(&script).await.is_err());
    }
}
