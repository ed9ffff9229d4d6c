/// Kickstart / Preseed 模板
///
/// %post / late_command 统一回调区域客户端的 installComplete 接口

/// CentOS 7 Kickstart 模板
pub const CENTOS7_TEMPLATE: &str = r#"#version=RHEL7
# Generated Kickstart for {{ sn }}
# Generated at: {{ timestamp }}
# ks_host={{ idc }}.local

# System authorization information
auth --enableshadow --passalgo=sha512

# Use text mode install
text

# Run the Setup Agent on first boot
firstboot --disable

# Keyboard layouts
keyboard --vckeymap=us --xlayouts='us'

# System language
lang en_US.UTF-8

# Network information
network --bootproto=static --device={{ primary_nic }} --ip={{ ip }} --netmask={{ netmask }} --gateway={{ gateway }} --nameserver={{ dns }} --hostname={{ hostname }} --activate

# Root password
rootpw --iscrypted {{ root_password_hash }}

# System timezone
timezone Asia/Shanghai --isUtc

# Installation source
url --url={{ repo_url }}

# System bootloader configuration
bootloader --location=mbr --boot-drive={{ boot_disk }}

# Partition clearing information
clearpart --all --drives={{ target_disks }} --initlabel

# Disk partitioning information
part /boot --fstype="ext4" --ondisk={{ boot_disk }} --size=1024
part swap --fstype="swap" --ondisk={{ boot_disk }} --size=16384
part / --fstype="ext4" --ondisk={{ boot_disk }} --size=1 --grow

# SELinux configuration
selinux --disabled

# Firewall configuration
firewall --disabled

# Do not configure the X Window System
skipx

# Reboot after installation
reboot

%packages --ignoremissing
@core
@base
{% for pkg in packages %}{{ pkg }}
{% endfor %}%end

%post --log=/root/ks-post.log
#!/bin/bash

# Set hostname
echo "{{ hostname }}" > /etc/hostname
hostnamectl set-hostname {{ hostname }}

# Configure network
cat > /etc/sysconfig/network-scripts/ifcfg-{{ primary_nic }} <<EOF
DEVICE={{ primary_nic }}
BOOTPROTO=static
ONBOOT=yes
IPADDR={{ ip }}
NETMASK={{ netmask }}
GATEWAY={{ gateway }}
DNS1={{ dns }}
EOF

# Disable firewall
systemctl disable firewalld

# Report installation complete to the regional client
curl -X POST "{{ regional_url }}/api/v1/device/installComplete" \
  -H "Content-Type: application/json" \
  -d '{"sn":"{{ sn }}","status":"success","message":"OS installed successfully"}' || true

{% if post_script %}
echo "{{ post_script }}" | base64 -d > /tmp/post-install.sh
chmod +x /tmp/post-install.sh
/tmp/post-install.sh
{% endif %}
%end
"#;

/// CentOS 8 / Rocky Kickstart 模板（UEFI 兼容分区）
pub const CENTOS8_TEMPLATE: &str = r#"#version=RHEL8
# Generated Kickstart for {{ sn }}
# Generated at: {{ timestamp }}
# ks_host={{ idc }}.local

# System language
lang en_US.UTF-8

# Keyboard layout
keyboard us

# Network information
network --bootproto=static --device={{ primary_nic }} --ip={{ ip }} --netmask={{ netmask }} --gateway={{ gateway }} --nameserver={{ dns }} --hostname={{ hostname }} --activate

# Root password
rootpw --iscrypted {{ root_password_hash }}

# System timezone
timezone Asia/Shanghai --utc

# Use text mode install
text

# Installation source
url --url={{ repo_url }}

# System bootloader configuration
bootloader --location=mbr --boot-drive={{ boot_disk }}

# Partition clearing information
clearpart --all --drives={{ target_disks }} --initlabel

# Disk partitioning (UEFI compatible)
part /boot/efi --fstype="efi" --ondisk={{ boot_disk }} --size=600 --fsoptions="umask=0077,shortname=winnt"
part /boot --fstype="xfs" --ondisk={{ boot_disk }} --size=1024
part swap --fstype="swap" --ondisk={{ boot_disk }} --size=16384
part / --fstype="xfs" --ondisk={{ boot_disk }} --size=1 --grow

# SELinux configuration
selinux --disabled

# Firewall configuration
firewall --disabled

# Do not configure the X Window System
skipx

# Reboot after installation
reboot

%packages
@^minimal-environment
{% for pkg in packages %}{{ pkg }}
{% endfor %}%end

%post --log=/root/ks-post.log
#!/bin/bash

# Set hostname
hostnamectl set-hostname {{ hostname }}

# Configure network
nmcli connection modify {{ primary_nic }} ipv4.addresses {{ ip }}/{{ netmask }}
nmcli connection modify {{ primary_nic }} ipv4.gateway {{ gateway }}
nmcli connection modify {{ primary_nic }} ipv4.dns {{ dns }}
nmcli connection modify {{ primary_nic }} ipv4.method manual
nmcli connection up {{ primary_nic }}

# Disable firewall
systemctl disable firewalld

# Report installation complete
curl -X POST "{{ regional_url }}/api/v1/device/installComplete" \
  -H "Content-Type: application/json" \
  -d '{"sn":"{{ sn }}","status":"success","message":"OS installed"}' || true

{% if post_script %}
echo "{{ post_script }}" | base64 -d > /tmp/post-install.sh
chmod +x /tmp/post-install.sh
/tmp/post-install.sh
{% endif %}
%end
"#;

/// Ubuntu / Debian Preseed 模板
pub const PRESEED_TEMPLATE: &str = r#"# Generated Preseed for {{ sn }}
# Generated at: {{ timestamp }}
# ks_host={{ idc }}.local

#### Localization
d-i debian-installer/language string en
d-i debian-installer/country string US
d-i debian-installer/locale string en_US.UTF-8
d-i keyboard-configuration/xkb-keymap select us

#### Network configuration
d-i netcfg/choose_interface select {{ primary_nic }}
d-i netcfg/disable_autoconfig boolean true
d-i netcfg/get_ipaddress string {{ ip }}
d-i netcfg/get_netmask string {{ netmask }}
d-i netcfg/get_gateway string {{ gateway }}
d-i netcfg/get_nameservers string {{ dns }}
d-i netcfg/confirm_static boolean true
d-i netcfg/get_hostname string {{ hostname }}
d-i netcfg/get_domain string localdomain

#### Mirror settings
d-i mirror/country string manual
d-i mirror/http/hostname string {{ repo_url }}
d-i mirror/http/directory string /ubuntu
d-i mirror/http/proxy string

#### Account setup
d-i passwd/root-login boolean true
d-i passwd/root-password-crypted password {{ root_password_hash }}
d-i passwd/user-fullname string
d-i passwd/username string
d-i passwd/user-password-crypted password !

#### Clock and time zone setup
d-i clock-setup/utc boolean true
d-i time/zone string Asia/Shanghai
d-i clock-setup/ntp boolean true

#### Partitioning
d-i partman-auto/disk string {{ boot_disk }}
d-i partman-auto/method string regular
d-i partman-auto/choose_recipe select atomic
d-i partman-partitioning/confirm_write_new_label boolean true
d-i partman/choose_partition select finish
d-i partman/confirm boolean true
d-i partman/confirm_nooverwrite boolean true

#### Package selection
tasksel tasksel/first multiselect standard
d-i pkgsel/include string {{ package_list }}
d-i pkgsel/upgrade select full-upgrade
d-i pkgsel/update-policy select none

#### Boot loader installation
d-i grub-installer/only_debian boolean true
d-i grub-installer/bootdev string {{ boot_disk }}

#### Finishing up
d-i finish-install/reboot_in_progress note

#### Late command
d-i preseed/late_command string \
    in-target curl -X POST "{{ regional_url }}/api/v1/device/installComplete" \
    -H "Content-Type: application/json" \
    -d '{"sn":"{{ sn }}","status":"success"}' || true
"#;
