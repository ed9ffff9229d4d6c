/// Kickstart 安装
///
/// 下载 kickstart、内核与 initrd 到暂存目录，
/// kexec 重新引导进入厂商安装器，命令行带上 kickstart 地址

use std::path::PathBuf;

use tracing::info;

use common::{Error, Result};

use super::{run, run_tolerant};

/// kickstart 安装参数
#[derive(Debug, Clone)]
pub struct KickstartSetup {
    pub kickstart_url: String,
    pub kernel_url: String,
    pub initrd_url: String,
    pub os_type: String,
    pub os_version: String,
}

/// kickstart 安装器
pub struct KickstartInstaller {
    setup: KickstartSetup,
    work_dir: PathBuf,
}

impl KickstartInstaller {
    pub fn new(setup: KickstartSetup) -> Self {
        Self {
            setup,
            work_dir: PathBuf::from("/tmp/ks-install"),
        }
    }

    /// 完整流程：暂存 → 下载 → kexec 载入 → 重新引导
    pub async fn install(&mut self) -> Result<()> {
        info!("开始 kickstart 安装...");

        std::fs::create_dir_all(&self.work_dir)
            .map_err(|e| Error::Internal(format!("创建暂存目录失败: {e}")))?;

        if self.setup.kernel_url.is_empty() || self.setup.initrd_url.is_empty() {
            let (kernel, initrd) = construct_boot_urls(
                &self.setup.kickstart_url,
                &self.setup.os_type,
                &self.setup.os_version,
            )?;
            self.setup.kernel_url = kernel;
            self.setup.initrd_url = initrd;
        }

        let ks_path = self.work_dir.join("kickstart.cfg");
        let kernel_path = self.work_dir.join("vmlinuz");
        let initrd_path = self.work_dir.join("initrd.img");

        info!("下载 kickstart: {}", self.setup.kickstart_url);
        download(&self.setup.kickstart_url, &ks_path).await?;
        info!("下载内核: {}", self.setup.kernel_url);
        download(&self.setup.kernel_url, &kernel_path).await?;
        info!("下载 initrd: {}", self.setup.initrd_url);
        download(&self.setup.initrd_url, &initrd_path).await?;

        self.load_kexec(&kernel_path, &initrd_path).await?;

        info!("重新引导进入安装器...");
        run_tolerant("sync", &[]).await;
        run("kexec", &["-e"]).await?;

        // kexec -e 成功时不会返回
        Err(Error::Internal("kexec 未能重启系统".into()))
    }

    async fn load_kexec(&self, kernel: &std::path::Path, initrd: &std::path::Path) -> Result<()> {
        info!("载入内核到 kexec...");

        if !run_tolerant("which", &["kexec"]).await {
            return Err(Error::Validation(
                "未找到 kexec, 请先安装 kexec-tools".into(),
            ));
        }

        let cmdline = build_kernel_cmdline(&self.setup.kickstart_url, &self.setup.os_type);
        info!("内核命令行: {}", cmdline);

        let initrd_arg = format!("--initrd={}", initrd.display());
        let append_arg = format!("--append={cmdline}");
        let kernel_str = kernel.to_string_lossy().to_string();

        let output = run("kexec", &["-l", &kernel_str, &initrd_arg, &append_arg]).await?;
        info!("kexec 输出: {}", output);
        info!("内核已载入 kexec");
        Ok(())
    }
}

/// 下载文件到本地
async fn download(url: &str, dest: &std::path::Path) -> Result<()> {
    let resp = reqwest::get(url)
        .await
        .map_err(|e| Error::Network(format!("下载 {url} 失败: {e}")))?;
    if !resp.status().is_success() {
        return Err(Error::Network(format!(
            "下载 {url} 返回 HTTP {}",
            resp.status()
        )));
    }
    let bytes = resp
        .bytes()
        .await
        .map_err(|e| Error::Network(format!("读取 {url} 响应失败: {e}")))?;
    tokio::fs::write(dest, &bytes)
        .await
        .map_err(|e| Error::Internal(format!("写入 {} 失败: {e}", dest.display())))?;
    Ok(())
}

/// 未提供内核地址时从 kickstart 地址推导
///
/// http://host:8081/api/v1/kickstart/SN1 -> http://host:8081/repos/...
fn construct_boot_urls(
    kickstart_url: &str,
    os_type: &str,
    os_version: &str,
) -> Result<(String, String)> {
    let base = kickstart_url
        .split("/api/")
        .next()
        .filter(|base| !base.is_empty() && *base != kickstart_url)
        .ok_or_else(|| Error::Validation(format!("kickstart 地址格式非法: {kickstart_url}")))?;

    match os_type.to_lowercase().as_str() {
        "centos" | "rocky" => Ok((
            format!("{base}/repos/{os_type}/{os_version}/isolinux/vmlinuz"),
            format!("{base}/repos/{os_type}/{os_version}/isolinux/initrd.img"),
        )),
        "ubuntu" => Ok((
            format!("{base}/repos/{os_type}/{os_version}/casper/vmlinuz"),
            format!("{base}/repos/{os_type}/{os_version}/casper/initrd"),
        )),
        other => Err(Error::Validation(format!(
            "无法为 {other} 推导引导文件地址"
        ))),
    }
}

/// 构造 kickstart 安装的内核命令行
fn build_kernel_cmdline(kickstart_url: &str, os_type: &str) -> String {
    let mut params = vec![
        "console=tty0".to_string(),
        "console=ttyS0,115200n8".to_string(),
        format!("ks={kickstart_url}"),
    ];

    match os_type.to_lowercase().as_str() {
        "centos" | "rocky" => {
            params.push("inst.text".to_string());
            params.push("inst.cmdline".to_string());
        }
        "ubuntu" => {
            params.push("auto=true".to_string());
            params.push("priority=critical".to_string());
            params.push(format!("url={kickstart_url}"));
        }
        _ => {}
    }

    // 安装阶段网络走 DHCP
    params.push("ip=dhcp".to_string());
    params.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construct_boot_urls_rocky() {
        let (kernel, initrd) = construct_boot_urls(
            "http://192.168.100.1:8081/api/v1/kickstart/SN1",
            "rocky",
            "9",
        )
        .unwrap();
        assert_eq!(
            kernel,
            "http://192.168.100.1:8081/repos/rocky/9/isolinux/vmlinuz"
        );
        assert_eq!(
            initrd,
            "http://192.168.100.1:8081/repos/rocky/9/isolinux/initrd.img"
        );
    }

    #[test]
    fn test_construct_boot_urls_ubuntu() {
        let (kernel, initrd) = construct_boot_urls(
            "http://host:8081/api/v1/kickstart/SN2",
            "ubuntu",
            "22.04",
        )
        .unwrap();
        assert!(kernel.ends_with("/casper/vmlinuz"));
        assert!(initrd.ends_with("/casper/initrd"));
    }

    #[test]
    fn test_construct_boot_urls_invalid() {
        assert!(construct_boot_urls("not-a-kickstart-url", "rocky", "9").is_err());
        assert!(construct_boot_urls(
            "http://host:8081/api/v1/kickstart/SN1",
            "slackware",
            "15"
        )
        .is_err());
    }

    #[test]
    fn test_kernel_cmdline_rhel_family() {
        let cmdline =
            build_kernel_cmdline("http://host:8081/api/v1/kickstart/SN1", "rocky");
        assert!(cmdline.contains("ks=http://host:8081/api/v1/kickstart/SN1"));
        assert!(cmdline.contains("inst.text"));
        assert!(cmdline.contains("inst.cmdline"));
        assert!(cmdline.contains("ip=dhcp"));
        assert!(cmdline.contains("console=ttyS0,115200n8"));
    }

    #[test]
    fn test_kernel_cmdline_ubuntu() {
        let cmdline =
            build_kernel_cmdline("http://host:8081/api/v1/kickstart/SN1", "ubuntu");
        assert!(cmdline.contains("auto=true"));
        assert!(cmdline.contains("priority=critical"));
        assert!(!cmdline.contains("inst.cmdline"));
    }
}
