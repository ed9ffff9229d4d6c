/// Kickstart / Preseed 生成器
///
/// 模板目录按 {os_type}-{os_version} 索引，带主版本号回退。
/// 内容每次请求现渲染，不落盘，任务的后期修改即时生效

use chrono::Utc;
use common::models::{OsInstallConfig, Task};
use common::{Error, Result};
use tera::{Context, Tera};

use super::templates;

/// Kickstart / Preseed 生成器
pub struct KickstartGenerator {
    tera: Tera,
    idc: String,
}

impl KickstartGenerator {
    pub fn new(idc: impl Into<String>) -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            ("centos-7", templates::CENTOS7_TEMPLATE),
            ("centos-8", templates::CENTOS8_TEMPLATE),
            ("rocky-8", templates::CENTOS8_TEMPLATE),
            ("rocky-9", templates::CENTOS8_TEMPLATE),
            ("ubuntu-20.04", templates::PRESEED_TEMPLATE),
            ("ubuntu-22.04", templates::PRESEED_TEMPLATE),
            ("debian-11", templates::PRESEED_TEMPLATE),
            ("debian-12", templates::PRESEED_TEMPLATE),
        ])
        .map_err(|e| Error::Internal(format!("kickstart 模板解析失败: {e}")))?;
        Ok(Self {
            tera,
            idc: idc.into(),
        })
    }

    /// 渲染 kickstart / preseed 文本
    pub fn generate(&self, task: &Task, config: &OsInstallConfig) -> Result<String> {
        let template = self.select_template(&config.os_type, &config.os_version)?;

        let layout = config.disk_layout.as_ref();
        let boot_disk = layout
            .map(|l| l.root_disk.clone())
            .unwrap_or_else(|| "/dev/sda".to_string());

        let mut ctx = Context::new();
        ctx.insert("sn", &task.sn);
        ctx.insert("hostname", &task.hostname);
        ctx.insert("ip", &config.network.ip);
        ctx.insert("netmask", &config.network.netmask);
        ctx.insert("gateway", &config.network.gateway);
        ctx.insert("dns", &config.network.dns);
        ctx.insert("primary_nic", &config.network.interface);
        ctx.insert(
            "root_password_hash",
            config.root_password.as_deref().unwrap_or(""),
        );
        ctx.insert("repo_url", &config.mirror_url);
        ctx.insert("os_type", &config.os_type);
        ctx.insert("os_version", &config.os_version);
        ctx.insert("boot_disk", &boot_disk);
        ctx.insert("target_disks", &boot_disk);
        ctx.insert("regional_url", &config.regional_url);
        ctx.insert("idc", &self.idc);
        ctx.insert("timestamp", &Utc::now().format("%Y-%m-%d %H:%M:%S").to_string());
        ctx.insert("packages", &config.packages);
        ctx.insert("package_list", &config.packages.join(" "));
        ctx.insert(
            "post_script",
            &config.post_install_script.clone().unwrap_or_default(),
        );

        self.tera
            .render(template, &ctx)
            .map_err(|e| Error::Internal(format!("kickstart 模板渲染失败: {e}")))
    }

    /// Preseed 与 kickstart 共用一套目录
    pub fn generate_preseed(&self, task: &Task, config: &OsInstallConfig) -> Result<String> {
        self.generate(task, config)
    }

    /// 精确匹配 {os}-{version}，找不到时回退主版本号
    fn select_template(&self, os_type: &str, os_version: &str) -> Result<&'static str> {
        let full = format!("{os_type}-{os_version}");
        if let Some(name) = KNOWN_TEMPLATES.iter().find(|name| **name == full) {
            return Ok(name);
        }
        let major = os_version.split('.').next().unwrap_or(os_version);
        let fallback = format!("{os_type}-{major}");
        if let Some(name) = KNOWN_TEMPLATES.iter().find(|name| **name == fallback) {
            return Ok(name);
        }
        Err(Error::Validation(format!(
            "没有匹配 {os_type} {os_version} 的模板"
        )))
    }
}

const KNOWN_TEMPLATES: &[&str] = &[
    "centos-7",
    "centos-8",
    "rocky-8",
    "rocky-9",
    "ubuntu-20.04",
    "ubuntu-22.04",
    "debian-11",
    "debian-12",
];

#[cfg(test)]
mod tests {
    use super::*;
    use common::models::{InstallMethod, NetworkConfig, TaskStatus};

    fn sample_task(os_type: &str, os_version: &str) -> Task {
        let task = Task::new(
            "t-1".into(),
            "SN1".into(),
            "00:11:22:33:44:55".into(),
            "192.168.100.50".into(),
            "node-1".into(),
            os_type.into(),
            os_version.into(),
            "admin@example.com".into(),
        );
        assert_eq!(task.status, TaskStatus::Pending);
        task
    }

    fn sample_config(os_type: &str, os_version: &str) -> OsInstallConfig {
        OsInstallConfig {
            method: InstallMethod::Kickstart,
            os_type: os_type.into(),
            os_version: os_version.into(),
            mirror_url: format!("http://192.168.100.1:8081/repos/{os_type}/{os_version}"),
            regional_url: "http://192.168.100.1:8081".into(),
            kickstart_url: None,
            disk_layout: Some(common::models::DiskLayoutConfig::default_layout()),
            network: NetworkConfig {
                interface: "eth0".into(),
                method: "static".into(),
                ip: "192.168.100.50".into(),
                netmask: "255.255.255.0".into(),
                gateway: "192.168.100.1".into(),
                dns: "192.168.100.1".into(),
                hostname: "node-1".into(),
            },
            packages: common::models::default_packages(),
            post_install_script: None,
            root_password: Some("$6$rounds=656000$abcdef$hash".into()),
        }
    }

    #[test]
    fn test_rocky_kickstart_contains_callback_and_ks_host() {
        let generator = KickstartGenerator::new("dc1").unwrap();
        let task = sample_task("rocky", "9");
        let config = sample_config("rocky", "9");
        let rendered = generator.generate(&task, &config).unwrap();

        assert!(rendered.contains("ks_host=dc1.local"));
        assert!(rendered.contains("rootpw --iscrypted $6$rounds=656000$abcdef$hash"));
        assert!(rendered
            .contains("http://192.168.100.1:8081/api/v1/device/installComplete"));
        assert!(rendered.contains("--hostname=node-1"));
        assert!(rendered.contains("openssh-server"));
    }

    #[test]
    fn test_ubuntu_preseed() {
        let generator = KickstartGenerator::new("dc1").unwrap();
        let task = sample_task("ubuntu", "22.04");
        let config = sample_config("ubuntu", "22.04");
        let rendered = generator.generate_preseed(&task, &config).unwrap();

        assert!(rendered.contains("d-i netcfg/get_ipaddress string 192.168.100.50"));
        assert!(rendered.contains("d-i preseed/late_command"));
        assert!(rendered.contains("installComplete"));
        assert!(rendered.contains("pkgsel/include string openssh-server wget curl vim net-tools"));
    }

    #[test]
    fn test_major_version_fallback() {
        let generator = KickstartGenerator::new("dc1").unwrap();
        // centos 8.5 回退到 centos-8 模板
        let task = sample_task("centos", "8.5");
        let config = sample_config("centos", "8.5");
        let rendered = generator.generate(&task, &config).unwrap();
        assert!(rendered.contains("#version=RHEL8"));
    }

    #[test]
    fn test_unknown_os_rejected() {
        let generator = KickstartGenerator::new("dc1").unwrap();
        let task = sample_task("slackware", "15");
        let config = sample_config("slackware", "15");
        assert!(generator.generate(&task, &config).is_err());
    }

    #[test]
    fn test_post_script_block_rendered_when_present() {
        let generator = KickstartGenerator::new("dc1").unwrap();
        let task = sample_task("centos", "7");
        let mut config = sample_config("centos", "7");
        config.post_install_script = Some("IyEvYmluL2Jhc2gK".into());
        let rendered = generator.generate(&task, &config).unwrap();
        assert!(rendered.contains("IyEvYmluL2Jhc2gK"));
        assert!(rendered.contains("/tmp/post-install.sh"));

        config.post_install_script = None;
        let rendered = generator.generate(&task, &config).unwrap();
        assert!(!rendered.contains("/tmp/post-install.sh"));
    }
}
