/// Kickstart / Preseed 下发接口
///
/// 每次请求现渲染，任务的最新改动立即生效

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use tracing::info;

use common::models::{
    default_packages, DiskLayoutConfig, InstallMethod, NetworkConfig, OsInstallConfig, Task,
};
use common::{keys, Error};

use crate::state::RegionalState;

/// root 口令密文，生产环境经由环境变量覆盖
const DEFAULT_ROOT_PASSWORD_HASH: &str = "$6$rounds=656000$YourSaltHere$HashedPasswordHere";

fn root_password_hash() -> String {
    std::env::var("ROOT_PASSWORD_HASH").unwrap_or_else(|_| DEFAULT_ROOT_PASSWORD_HASH.to_string())
}

/// GET /api/v1/kickstart/:sn
pub async fn generate_kickstart(
    State(state): State<RegionalState>,
    Path(sn): Path<String>,
) -> impl IntoResponse {
    render(state, sn, false).await
}

/// GET /api/v1/preseed/:sn
pub async fn generate_preseed(
    State(state): State<RegionalState>,
    Path(sn): Path<String>,
) -> impl IntoResponse {
    render(state, sn, true).await
}

async fn render(state: RegionalState, sn: String, preseed: bool) -> impl IntoResponse {
    let task_key = keys::task_key(&state.idc, &sn);
    let task: Task = match state.store.get_json(&task_key).await {
        Ok(task) => task,
        Err(Error::NotFound(_)) => {
            return (
                StatusCode::NOT_FOUND,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                format!("Task not found for SN: {sn}"),
            );
        }
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                e.to_string(),
            );
        }
    };

    let config = provisioning_config(&state, &task);

    let rendered = if preseed {
        state.kickstart.generate_preseed(&task, &config)
    } else {
        state.kickstart.generate(&task, &config)
    };

    match rendered {
        Ok(content) => {
            info!(
                "[{}] 已生成 {}: {}",
                state.idc,
                if preseed { "preseed" } else { "kickstart" },
                sn
            );
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                content,
            )
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            format!("Failed to generate: {e}"),
        ),
    }
}

/// 构造无人值守安装所需的完整配置
fn provisioning_config(state: &RegionalState, task: &Task) -> OsInstallConfig {
    OsInstallConfig {
        method: InstallMethod::Kickstart,
        os_type: task.os_type.clone(),
        os_version: task.os_version.clone(),
        mirror_url: format!(
            "{}/repos/{}/{}",
            state.base_url(),
            task.os_type,
            task.os_version
        ),
        regional_url: state.base_url(),
        kickstart_url: None,
        disk_layout: Some(DiskLayoutConfig::default_layout()),
        network: NetworkConfig {
            interface: "eth0".into(),
            method: "static".into(),
            ip: task.ip.clone(),
            netmask: "255.255.255.0".into(),
            gateway: state.server_ip.clone(),
            dns: state.server_ip.clone(),
            hostname: task.hostname.clone(),
        },
        packages: default_packages(),
        post_install_script: None,
        root_password: Some(root_password_hash()),
    }
}
