/// LPM-OS - Agent
///
/// 目标机内安装代理：采集硬件、上报、等待入队，
/// 然后进入 servant 循环逐步执行安装操作直到重启

mod client;
mod config;
mod hardware;
mod install;
mod ops;
mod raid;

use anyhow::Context;
use tracing::{info, warn};

use common::models::AgentReportRequest;

use crate::client::{RegionalClient, ReportOutcome};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    dotenvy::dotenv().ok();
    let cfg = config::Config::from_env()?;

    info!("🚀 启动装机 Agent");
    info!("区域客户端: {}", cfg.regional_url);
    info!("轮询间隔: {:?}", cfg.tunables.poll_interval);

    // ===== 阶段 1: 采集并上报硬件 =====
    info!("[阶段 1] 采集硬件信息...");
    if !hardware::dmi_available() {
        warn!("当前环境没有 /sys/class/dmi, 部分字段将为 Unknown");
    }
    let hw = hardware::collect();
    let sn = hw.serial_number.clone();

    info!("  序列号: {}", hw.serial_number);
    info!("  MAC: {}", hw.mac_address);
    info!("  厂商: {} / {}", hw.company, hw.product);
    info!("  虚拟机: {}", hw.is_vm);
    info!("  CPU: {} ({} 核 / {} 线程)", hw.cpu.model, hw.cpu.cores, hw.cpu.threads);
    info!("  内存: {} GB", hw.memory.total_gb);
    info!("  磁盘: {} 块", hw.disks.len());
    for disk in &hw.disks {
        info!("    - {}: {} GB ({})", disk.device, disk.size_gb, disk.kind);
    }

    let client = RegionalClient::new(&cfg.regional_url, &cfg.tunables)
        .context("构建区域客户端访问器失败")?;

    info!("[阶段 1] 上报硬件信息...");
    let report = AgentReportRequest {
        sn: sn.clone(),
        mac_address: hw.mac_address.clone(),
        hardware: hw,
    };
    // 404 与网络错误都无限重试，上报成功才继续
    loop {
        match client.report_hardware(&report).await {
            Ok(ReportOutcome::Accepted) => {
                info!("  硬件上报成功");
                break;
            }
            Ok(ReportOutcome::NoTask { retry_after }) => {
                info!("  暂无匹配任务, {} 秒后重试", retry_after);
                tokio::time::sleep(std::time::Duration::from_secs(retry_after)).await;
            }
            Err(e) => {
                warn!("  上报失败: {}, {:?} 后重试", e, cfg.tunables.poll_interval);
                tokio::time::sleep(cfg.tunables.poll_interval).await;
            }
        }
    }

    // ===== 阶段 2: 等待进入装机队列 =====
    info!("[阶段 2] 等待进入装机队列...");
    let mut in_queue = false;
    for attempt in 1..=cfg.tunables.poll_max_attempts {
        info!(
            "  轮询装机队列 ({}/{})...",
            attempt, cfg.tunables.poll_max_attempts
        );
        match client.is_in_install_queue(&sn).await {
            Ok(true) => {
                info!("  已进入装机队列!");
                in_queue = true;
                break;
            }
            Ok(false) => {
                info!("  尚未入队, 继续等待...");
            }
            Err(e) => {
                warn!("  查询失败: {}", e);
            }
        }
        tokio::time::sleep(cfg.tunables.poll_interval).await;
    }
    if !in_queue {
        anyhow::bail!(
            "等待装机队列超时 ({} 次轮询)",
            cfg.tunables.poll_max_attempts
        );
    }

    // ===== 阶段 3: servant 循环 =====
    info!("[阶段 3] 进入操作循环 (servant 模式)...");
    ops::servant_loop(&client, &sn, &cfg.tunables).await?;

    info!("=== Agent 工作流结束 ===");
    Ok(())
}
