/// PXE 配置模板
///
/// 每个 OS 家族一个文本模板，RHEL 系走 kickstart，Debian 系走 preseed

/// Ubuntu PXE 模板
pub const UBUNTU_TEMPLATE: &str = r#"DEFAULT ubuntu-install
PROMPT 0
TIMEOUT 10
LABEL ubuntu-install
  MENU LABEL Install Ubuntu {{ os_version }}
  KERNEL {{ kernel_path }}
  APPEND initrd={{ initrd_path }} auto=true priority=critical url={{ regional_url }}/preseed/{{ sn }} {{ boot_params }} console=tty0 console=ttyS0,115200n8
"#;

/// Debian PXE 模板
pub const DEBIAN_TEMPLATE: &str = r#"DEFAULT debian-install
PROMPT 0
TIMEOUT 10
LABEL debian-install
  MENU LABEL Install Debian {{ os_version }}
  KERNEL {{ kernel_path }}
  APPEND initrd={{ initrd_path }} auto=true priority=critical url={{ regional_url }}/preseed/{{ sn }} {{ boot_params }} console=tty0 console=ttyS0,115200n8
"#;

/// CentOS PXE 模板
pub const CENTOS_TEMPLATE: &str = r#"DEFAULT centos-install
PROMPT 0
TIMEOUT 10
LABEL centos-install
  MENU LABEL Install CentOS {{ os_version }}
  KERNEL {{ kernel_path }}
  APPEND initrd={{ initrd_path }} inst.ks={{ regional_url }}/kickstart/{{ sn }} {{ boot_params }} console=tty0 console=ttyS0,115200n8 inst.cmdline
"#;

/// Rocky Linux PXE 模板
pub const ROCKY_TEMPLATE: &str = r#"DEFAULT rocky-install
PROMPT 0
TIMEOUT 10
LABEL rocky-install
  MENU LABEL Install Rocky Linux {{ os_version }}
  KERNEL {{ kernel_path }}
  APPEND initrd={{ initrd_path }} inst.ks={{ regional_url }}/kickstart/{{ sn }} {{ boot_params }} console=tty0 console=ttyS0,115200n8 inst.cmdline
"#;

/// 默认引导菜单，超时回落本地磁盘
pub const DEFAULT_MENU: &str = r#"DEFAULT menu.c32
PROMPT 0
TIMEOUT 100
ONTIMEOUT local

MENU TITLE PXE Boot Menu

LABEL local
  MENU LABEL Boot from local disk
  LOCALBOOT 0

LABEL install
  MENU LABEL OS Installation (Manual)
  KERNEL /static/kernels/vmlinuz
  APPEND initrd=/static/initramfs/initrd.img

MENU END
"#;
