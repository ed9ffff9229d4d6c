/// 命令行配置

use std::path::PathBuf;

use clap::Parser;

/// 区域客户端命令行参数
#[derive(Parser, Debug, Clone)]
#[command(name = "regional-client", about = "区域 PXE 装机客户端")]
pub struct Cli {
    /// 所属 IDC 名称
    #[arg(long)]
    pub idc: String,

    /// Agent API 监听端口
    #[arg(long, default_value_t = 8081)]
    pub api_port: u16,

    /// 启用内置 DHCP 服务
    #[arg(long, default_value_t = false)]
    pub enable_dhcp: bool,

    /// 启用内置 TFTP 服务
    #[arg(long, default_value_t = false)]
    pub enable_tftp: bool,

    /// 本机对外服务 IP
    #[arg(long, default_value = "192.168.100.1")]
    pub server_ip: String,

    /// DHCP 监听网卡
    #[arg(long, default_value = "eth1")]
    pub interface: String,

    /// 静态文件根目录（TFTP 根）
    #[arg(long, default_value = "/tftpboot")]
    pub static_root: PathBuf,
}

impl Cli {
    /// etcd 端点从环境变量读取，与控制面保持一致
    pub fn etcd_endpoints() -> Vec<String> {
        std::env::var("ETCD_ENDPOINTS")
            .unwrap_or_else(|_| "localhost:2379".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["regional-client", "--idc", "dc1"]);
        assert_eq!(cli.idc, "dc1");
        assert_eq!(cli.api_port, 8081);
        assert!(!cli.enable_dhcp);
        assert!(!cli.enable_tftp);
        assert_eq!(cli.server_ip, "192.168.100.1");
        assert_eq!(cli.interface, "eth1");
        assert_eq!(cli.static_root, PathBuf::from("/tftpboot"));
    }

    #[test]
    fn test_cli_flags() {
        let cli = Cli::parse_from([
            "regional-client",
            "--idc",
            "dc2",
            "--api-port",
            "9090",
            "--enable-dhcp",
            "--enable-tftp",
            "--server-ip",
            "10.0.0.1",
            "--interface",
            "eno1",
            "--static-root",
            "/srv/tftp",
        ]);
        assert_eq!(cli.idc, "dc2");
        assert_eq!(cli.api_port, 9090);
        assert!(cli.enable_dhcp);
        assert!(cli.enable_tftp);
        assert_eq!(cli.server_ip, "10.0.0.1");
        assert_eq!(cli.interface, "eno1");
        assert_eq!(cli.static_root, PathBuf::from("/srv/tftp"));
    }
}
