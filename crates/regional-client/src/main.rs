/// LPM-OS - 区域客户端
///
/// 每个 IDC 一个实例，承担 PXE 基础设施（DHCP/TFTP/引导配置/kickstart）
/// 并作为目标机内 Agent 的接入点

mod api;
mod config;
mod dhcp;
mod kickstart;
mod orchestrator;
mod pxe;
mod registry;
mod selector;
mod state;
mod tftp;
mod watcher;

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};

use common::{Store, StoreConfig, Tunables};

use crate::config::Cli;
use crate::dhcp::{DhcpConfig, DhcpServer};
use crate::kickstart::KickstartGenerator;
use crate::pxe::PxeGenerator;
use crate::registry::RegionRegistry;
use crate::selector::OperationSelector;
use crate::state::RegionalState;
use crate::tftp::{FileManager, TftpConfig, TftpServer};

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
    let cli = Cli::parse();
    let tunables = Arc::new(Tunables::default());

    info!("🚀 启动区域客户端, IDC: {}", cli.idc);
    info!(
        "配置: API 端口={}, 服务 IP={}, 网卡={}, 静态根目录={}",
        cli.api_port,
        cli.server_ip,
        cli.interface,
        cli.static_root.display()
    );

    // 连接 etcd
    let store = Store::connect(StoreConfig::from_endpoints(Cli::etcd_endpoints()))
        .await
        .context("连接 etcd 失败")?;
    info!("✅ etcd 连接成功");

    // 静态文件目录骨架
    let files = FileManager::new(cli.static_root.clone());
    files.ensure_directories().context("创建静态目录失败")?;
    if let Err(e) = files.write_file("README.md", STATIC_ROOT_README.as_bytes()) {
        warn!("写入 README 失败: {}", e);
    }
    info!("✅ 静态文件目录就绪: {}", cli.static_root.display());

    // 关停信号
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // TFTP 服务
    let tftp = if cli.enable_tftp {
        let server = Arc::new(TftpServer::new(TftpConfig::new(&cli.static_root))?);
        server.start(shutdown_rx.clone()).await?;
        info!("✅ TFTP 服务已初始化并启动");
        Some(server)
    } else {
        None
    };

    // PXE 配置生成器（依赖 TFTP 根目录）
    let pxe = if cli.enable_tftp {
        let generator = Arc::new(PxeGenerator::new(&cli.static_root)?);
        generator.generate_default()?;
        info!("✅ PXE 生成器已初始化");
        Some(generator)
    } else {
        None
    };

    // DHCP 服务
    let dhcp = if cli.enable_dhcp {
        let server = Arc::new(DhcpServer::new(build_dhcp_config(&cli, &tunables)?)?);
        server.start(shutdown_rx.clone()).await?;
        info!("✅ DHCP 服务已初始化并启动");
        Some(server)
    } else {
        None
    };

    let kickstart = Arc::new(KickstartGenerator::new(&cli.idc)?);
    info!("✅ Kickstart/Preseed 生成器已初始化");

    let state = RegionalState {
        idc: cli.idc.clone(),
        store,
        server_ip: cli.server_ip.clone(),
        api_port: cli.api_port,
        static_root: cli.static_root.clone(),
        tunables,
        dhcp,
        tftp,
        pxe,
        kickstart,
        selector: Arc::new(OperationSelector::new(cli.server_ip.clone(), cli.api_port)),
    };

    // 注册并维持心跳
    let registry = RegionRegistry::new(state.clone());
    registry.register(shutdown_rx.clone()).await?;

    // 两条长期监听
    watcher::spawn_server_watch(state.clone(), shutdown_rx.clone());
    watcher::spawn_task_watch(state.clone(), shutdown_rx.clone());

    // Agent API
    let app = api::router(state.clone());
    let addr = SocketAddr::from(([0, 0, 0, 0], cli.api_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("绑定 API 端口失败")?;
    info!("🎯 区域客户端 API 监听在 http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("收到退出信号, 开始关停...");
        })
        .await?;

    // 注销并通知所有后台任务退出
    registry.unregister().await;
    let _ = shutdown_tx.send(true);
    info!("区域客户端已退出");

    Ok(())
}

/// 静态根目录说明文件
const STATIC_ROOT_README: &str = r#"# Static Files Directory

This directory contains static files served over HTTP for PXE boot and OS
installation. Treat everything here as a cache: it is regenerated at boot.

## Directory Structure

/static/
  - kernels/          Linux kernels (vmlinuz-<os>-<version>)
  - initramfs/        Initramfs images (initrd-<os>-<version>.img)

/repos/
  - ubuntu/ debian/ centos/ rocky/   OS repository mirrors

/pxelinux.cfg/
  - default           Fallback boot menu (boot local disk)
  - 01-<mac>          Per-machine boot configuration

## Usage

Files are accessible via HTTP:
- http://<server-ip>:8081/static/kernels/...
- http://<server-ip>:8081/repos/ubuntu/22.04/...

## File Listing API

- GET /api/v1/files/static
- GET /api/v1/files/repos
"#;

/// 从服务 IP 推导 DHCP 配置：同网段 .10-.200 作地址池
fn build_dhcp_config(cli: &Cli, tunables: &Tunables) -> anyhow::Result<DhcpConfig> {
    let server_ip: Ipv4Addr = cli
        .server_ip
        .parse()
        .context("server-ip 不是合法的 IPv4 地址")?;
    let [a, b, c, _] = server_ip.octets();

    Ok(DhcpConfig {
        interface: cli.interface.clone(),
        server_ip,
        gateway: server_ip,
        dns_servers: vec![server_ip, Ipv4Addr::new(8, 8, 8, 8)],
        tftp_server: server_ip,
        boot_file: "pxelinux.0".to_string(),
        lease_time: tunables.dhcp_lease_time,
        start_ip: Ipv4Addr::new(a, b, c, 10),
        end_ip: Ipv4Addr::new(a, b, c, 200),
        netmask: Ipv4Addr::new(255, 255, 255, 0),
    })
}
