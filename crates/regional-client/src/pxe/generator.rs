/// 每机 PXE 配置生成器
///
/// 配置文件名为 01- 前缀加小写、短横线分隔的 MAC，
/// 写入先落临时文件再原子改名，失败不留半成品

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use common::{utils::mac_to_pxe_filename, utils::validate_mac_address, Error, Result};
use tera::{Context, Tera};
use tracing::{debug, info};

use super::templates;

/// 单台服务器的引导配置
#[derive(Debug, Clone)]
pub struct BootConfig {
    pub mac: String,
    pub ip: String,
    pub hostname: String,
    pub os_type: String,
    pub os_version: String,
    pub kernel_path: String,
    pub initrd_path: String,
    pub regional_url: String,
    pub sn: String,
    pub idc: String,
    pub custom_params: HashMap<String, String>,
}

impl BootConfig {
    /// 内核命令行附加参数
    fn boot_params(&self) -> String {
        let mut params = vec![format!("regional_url={}", self.regional_url)];
        if !self.sn.is_empty() {
            params.push(format!("sn={}", self.sn));
        }
        if !self.idc.is_empty() {
            params.push(format!("dc={}", self.idc));
        }
        if !self.hostname.is_empty() {
            params.push(format!("hostname={}", self.hostname));
        }
        if !self.ip.is_empty() {
            params.push(format!("ip={}", self.ip));
        }
        let mut extra: Vec<_> = self.custom_params.iter().collect();
        extra.sort();
        for (key, value) in extra {
            params.push(format!("{key}={value}"));
        }
        params.join(" ")
    }
}

/// PXE 配置生成器
pub struct PxeGenerator {
    config_dir: PathBuf,
    tera: Tera,
}

impl PxeGenerator {
    /// 创建生成器，要求 TFTP 根目录已存在
    pub fn new(tftp_root: impl AsRef<Path>) -> Result<Self> {
        let tftp_root = tftp_root.as_ref();
        if !tftp_root.exists() {
            return Err(Error::Config(format!(
                "TFTP 根目录不存在: {}",
                tftp_root.display()
            )));
        }

        let config_dir = tftp_root.join("pxelinux.cfg");
        std::fs::create_dir_all(&config_dir)
            .map_err(|e| Error::Internal(format!("创建 pxelinux.cfg 目录失败: {e}")))?;

        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            ("ubuntu", templates::UBUNTU_TEMPLATE),
            ("debian", templates::DEBIAN_TEMPLATE),
            ("centos", templates::CENTOS_TEMPLATE),
            ("rocky", templates::ROCKY_TEMPLATE),
        ])
        .map_err(|e| Error::Internal(format!("PXE 模板解析失败: {e}")))?;

        Ok(Self { config_dir, tera })
    }

    /// 写入默认引导菜单，幂等
    pub fn generate_default(&self) -> Result<()> {
        let path = self.config_dir.join("default");
        std::fs::write(&path, templates::DEFAULT_MENU)
            .map_err(|e| Error::Internal(format!("写入默认菜单失败: {e}")))?;
        debug!("默认 PXE 菜单已写入: {}", path.display());
        Ok(())
    }

    /// 生成单台服务器的 PXE 配置
    pub fn generate(&self, bc: &BootConfig) -> Result<()> {
        self.validate(bc)?;

        let template = template_for(&bc.os_type)?;
        let mut ctx = Context::new();
        ctx.insert("os_version", &bc.os_version);
        ctx.insert("kernel_path", &bc.kernel_path);
        ctx.insert("initrd_path", &bc.initrd_path);
        ctx.insert("regional_url", &bc.regional_url);
        ctx.insert("sn", &bc.sn);
        ctx.insert("hostname", &bc.hostname);
        ctx.insert("boot_params", &bc.boot_params());

        let rendered = self
            .tera
            .render(template, &ctx)
            .map_err(|e| Error::Internal(format!("PXE 模板渲染失败: {e}")))?;

        let filename = mac_to_pxe_filename(&bc.mac);
        let final_path = self.config_dir.join(&filename);
        let tmp_path = self.config_dir.join(format!(".{filename}.tmp"));

        // 先写临时文件再改名，避免留下半成品
        std::fs::write(&tmp_path, rendered.as_bytes())
            .map_err(|e| Error::Internal(format!("写入 PXE 配置失败: {e}")))?;
        std::fs::rename(&tmp_path, &final_path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp_path);
            Error::Internal(format!("改名 PXE 配置失败: {e}"))
        })?;

        info!("PXE 配置已生成: {}", final_path.display());
        Ok(())
    }

    /// 删除指定 MAC 的配置，不存在不算错误
    pub fn remove(&self, mac: &str) -> Result<()> {
        let path = self.config_dir.join(mac_to_pxe_filename(mac));
        match std::fs::remove_file(&path) {
            Ok(_) => {
                info!("PXE 配置已删除: {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Internal(format!(
                "删除 {} 失败: {e}",
                path.display()
            ))),
        }
    }

    /// 指定 MAC 的配置是否存在
    pub fn exists(&self, mac: &str) -> bool {
        self.config_dir.join(mac_to_pxe_filename(mac)).exists()
    }

    /// 列出当前所有每机配置文件名
    pub fn list(&self) -> Result<Vec<String>> {
        let entries = std::fs::read_dir(&self.config_dir)
            .map_err(|e| Error::Internal(format!("读取配置目录失败: {e}")))?;
        let mut configs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::Internal(e.to_string()))?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with("01-") && entry.path().is_file() {
                configs.push(name);
            }
        }
        configs.sort();
        Ok(configs)
    }

    fn validate(&self, bc: &BootConfig) -> Result<()> {
        if !validate_mac_address(&bc.mac) {
            return Err(Error::Validation(format!("非法 MAC 地址: {}", bc.mac)));
        }
        if bc.os_type.is_empty() {
            return Err(Error::Validation("缺少 OS 类型".into()));
        }
        if bc.kernel_path.is_empty() {
            return Err(Error::Validation("缺少内核路径".into()));
        }
        if bc.initrd_path.is_empty() {
            return Err(Error::Validation("缺少 initrd 路径".into()));
        }
        if bc.regional_url.is_empty() {
            return Err(Error::Validation("缺少区域客户端地址".into()));
        }
        Ok(())
    }
}

/// 按 OS 家族选择模板
fn template_for(os_type: &str) -> Result<&'static str> {
    match os_type.to_lowercase().as_str() {
        "ubuntu" => Ok("ubuntu"),
        "debian" => Ok("debian"),
        "centos" => Ok("centos"),
        "rocky" | "rockylinux" => Ok("rocky"),
        other => Err(Error::Validation(format!("不支持的 OS 类型: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_boot_config() -> BootConfig {
        BootConfig {
            mac: "00:1A:2B:3C:4D:5E".into(),
            ip: "192.168.100.50".into(),
            hostname: "node-1".into(),
            os_type: "ubuntu".into(),
            os_version: "22.04".into(),
            kernel_path: "/static/kernels/vmlinuz-ubuntu-22.04".into(),
            initrd_path: "/static/initramfs/initrd-ubuntu-22.04.img".into(),
            regional_url: "http://192.168.100.1:8081/api/v1".into(),
            sn: "SN1".into(),
            idc: "dc1".into(),
            custom_params: HashMap::new(),
        }
    }

    #[test]
    fn test_generate_writes_per_mac_file() {
        let tmp = TempDir::new().unwrap();
        let generator = PxeGenerator::new(tmp.path()).unwrap();
        let bc = sample_boot_config();
        generator.generate(&bc).unwrap();

        let path = tmp.path().join("pxelinux.cfg/01-00-1a-2b-3c-4d-5e");
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("Install Ubuntu 22.04"));
        assert!(content.contains("/preseed/SN1"));
        assert!(content.contains("sn=SN1"));
        assert!(content.contains("dc=dc1"));
        assert!(content.contains("KERNEL /static/kernels/vmlinuz-ubuntu-22.04"));
    }

    #[test]
    fn test_generate_is_deterministic() {
        let tmp = TempDir::new().unwrap();
        let generator = PxeGenerator::new(tmp.path()).unwrap();
        let bc = sample_boot_config();
        generator.generate(&bc).unwrap();
        let path = tmp.path().join("pxelinux.cfg/01-00-1a-2b-3c-4d-5e");
        let first = std::fs::read(&path).unwrap();
        generator.generate(&bc).unwrap();
        let second = std::fs::read(&path).unwrap();
        // 同一 BootConfig 重复生成字节一致
        assert_eq!(first, second);
    }

    #[test]
    fn test_rocky_uses_kickstart_url() {
        let tmp = TempDir::new().unwrap();
        let generator = PxeGenerator::new(tmp.path()).unwrap();
        let mut bc = sample_boot_config();
        bc.os_type = "rocky".into();
        bc.os_version = "9".into();
        generator.generate(&bc).unwrap();

        let content = std::fs::read_to_string(
            tmp.path().join("pxelinux.cfg/01-00-1a-2b-3c-4d-5e"),
        )
        .unwrap();
        assert!(content.contains("inst.ks="));
        assert!(content.contains("/kickstart/SN1"));
        assert!(content.contains("inst.cmdline"));
    }

    #[test]
    fn test_unknown_os_type_leaves_no_file() {
        let tmp = TempDir::new().unwrap();
        let generator = PxeGenerator::new(tmp.path()).unwrap();
        let mut bc = sample_boot_config();
        bc.os_type = "plan9".into();
        assert!(generator.generate(&bc).is_err());
        assert!(generator.list().unwrap().is_empty());
    }

    #[test]
    fn test_remove_absent_is_ok() {
        let tmp = TempDir::new().unwrap();
        let generator = PxeGenerator::new(tmp.path()).unwrap();
        generator.remove("00:1a:2b:3c:4d:5e").unwrap();
    }

    #[test]
    fn test_exists_and_list() {
        let tmp = TempDir::new().unwrap();
        let generator = PxeGenerator::new(tmp.path()).unwrap();
        let bc = sample_boot_config();
        assert!(!generator.exists(&bc.mac));
        generator.generate(&bc).unwrap();
        assert!(generator.exists(&bc.mac));
        assert_eq!(generator.list().unwrap(), vec!["01-00-1a-2b-3c-4d-5e"]);
        generator.remove(&bc.mac).unwrap();
        assert!(!generator.exists(&bc.mac));
    }

    #[test]
    fn test_default_menu_idempotent() {
        let tmp = TempDir::new().unwrap();
        let generator = PxeGenerator::new(tmp.path()).unwrap();
        generator.generate_default().unwrap();
        generator.generate_default().unwrap();
        let content =
            std::fs::read_to_string(tmp.path().join("pxelinux.cfg/default")).unwrap();
        assert!(content.contains("Boot from local disk"));
        assert!(content.contains("LOCALBOOT 0"));
        // default 不出现在每机配置列表里
        assert!(generator.list().unwrap().is_empty());
    }

    #[test]
    fn test_missing_root_rejected() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope");
        assert!(PxeGenerator::new(&missing).is_err());
    }
}
