/// PXE 引导环境编排
///
/// 任务审批通过后配置每机引导环境，装机结束后拆除。
/// 配置路径以 pxe_configured 标志保证幂等，监听重复投递不会做重复工作

use std::collections::HashMap;

use common::models::Task;
use common::utils::validate_mac_address;
use common::{keys, Result};
use tracing::{error, info, warn};

use crate::pxe::BootConfig;
use crate::state::RegionalState;

/// 为审批通过的任务配置 PXE 引导环境
///
/// 1. 校验 MAC；2. 添加 DHCP 静态绑定；3. 生成每机 PXE 配置；
/// 4. 原子置位 pxe_configured。全程不改任务状态
pub async fn configure_pxe_boot(state: &RegionalState, task: &Task) {
    info!(
        "[{}] 为 {} 配置 PXE 引导 (MAC: {}, IP: {})",
        state.idc, task.sn, task.mac, task.ip
    );

    if !validate_mac_address(&task.mac) {
        error!("[{}] 非法 MAC 地址 {}, 跳过配置", state.idc, task.mac);
        return;
    }

    // 第一步: DHCP 静态绑定
    if let Some(dhcp) = &state.dhcp {
        let ip = match task.ip.parse() {
            Ok(ip) => ip,
            Err(_) => {
                error!("[{}] 任务 {} 的 IP 非法: {}", state.idc, task.sn, task.ip);
                return;
            }
        };
        if let Err(e) = dhcp
            .add_static_binding(&task.mac, ip, &task.hostname, "pxelinux.0")
            .await
        {
            error!("[{}] 添加 DHCP 绑定失败 {}: {}", state.idc, task.sn, e);
            return;
        }
        info!("[{}] DHCP 绑定已添加: {} -> {}", state.idc, task.mac, task.ip);
    }

    // 第二步: 生成每机 PXE 配置
    if let Some(pxe) = &state.pxe {
        let boot_config = BootConfig {
            mac: task.mac.clone(),
            ip: task.ip.clone(),
            hostname: task.hostname.clone(),
            os_type: task.os_type.clone(),
            os_version: task.os_version.clone(),
            kernel_path: format!(
                "/static/kernels/vmlinuz-{}-{}",
                task.os_type, task.os_version
            ),
            initrd_path: format!(
                "/static/initramfs/initrd-{}-{}.img",
                task.os_type, task.os_version
            ),
            regional_url: state.api_base_url(),
            sn: task.sn.clone(),
            idc: state.idc.clone(),
            custom_params: HashMap::new(),
        };

        if let Err(e) = pxe.generate(&boot_config) {
            error!("[{}] 生成 PXE 配置失败 {}: {}", state.idc, task.sn, e);
            return;
        }
    }

    // 交换机端口与 BMC 重启由外部协作方接管，这里只记录
    info!("[{}] 交换机/BMC 操作交由协作模块处理: {}", state.idc, task.sn);

    // 最后: 原子置位 pxe_configured，不触碰状态与历史
    if let Err(e) = mark_pxe_configured(state, &task.sn).await {
        error!(
            "[{}] 更新 pxe_configured 失败 {}: {}",
            state.idc, task.sn, e
        );
        return;
    }

    info!("[{}] PXE 引导环境配置完成: {}", state.idc, task.sn);
}

async fn mark_pxe_configured(state: &RegionalState, sn: &str) -> Result<Task> {
    let task_key = keys::task_key(&state.idc, sn);
    state
        .store
        .atomic_update(&task_key, |mut task: Task| {
            task.pxe_configured = true;
            task.touch();
            Ok(task)
        })
        .await
}

/// 拆除 PXE 引导环境
///
/// 删除每机配置与 DHCP 绑定；出错只记录，不阻塞状态推进
pub async fn cleanup_pxe_boot(state: &RegionalState, task: &Task) {
    info!("[{}] 清理 PXE 引导配置: {}", state.idc, task.sn);

    if let Some(pxe) = &state.pxe {
        if !pxe.exists(&task.mac) {
            info!("[{}] PXE 配置不存在, 无需移除", state.idc);
        } else {
            match pxe.remove(&task.mac) {
                Ok(_) => info!("[{}] PXE 配置已移除", state.idc),
                Err(e) => warn!("[{}] 移除 PXE 配置失败 {}: {}", state.idc, task.sn, e),
            }
        }
    }

    if let Some(dhcp) = &state.dhcp {
        dhcp.remove_static_binding(&task.mac).await;
        info!("[{}] DHCP 绑定已移除", state.idc);
    }

    // 交换机配置恢复由外部协作方接管

    info!("[{}] PXE 引导配置清理完成: {}", state.idc, task.sn);
}
