/// 根键空间监听
///
/// 一条递归监听喂给大盘广播（v3 合并任务帧 + 旧版帧），
/// 同时承担 Agent 掉线对账：lease 键被删且任务在 installing 时转 failed

use std::time::Duration;

use serde::Deserialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use common::models::{HardwareInfo, Task, TaskStatus};
use common::store::{WatchEvent, WatchEventKind};
use common::{keys, Error, Store};

use crate::app_state::AppState;
use crate::ws::DashboardMessage;

/// 旧版进度载荷，容忍缺字段
#[derive(Debug, Default, Deserialize)]
struct LegacyProgress {
    #[serde(default)]
    stage: String,
    #[serde(default)]
    percentage: i32,
    #[serde(default)]
    message: String,
}

/// 监听 /os/ 全量事件
pub fn spawn_root_watch(state: AppState, shutdown: watch::Receiver<bool>) {
    tokio::spawn(async move {
        let prefix = format!("{}/", keys::ROOT);
        info!("控制面开始监听: {}", prefix);

        loop {
            if *shutdown.borrow() {
                return;
            }

            let (_watcher, mut stream) = match state.store.watch(&prefix, true).await {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("建立根监听失败: {}", e);
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    continue;
                }
            };

            let mut stream_shutdown = shutdown.clone();
            loop {
                let resp = tokio::select! {
                    _ = stream_shutdown.changed() => return,
                    resp = stream.message() => resp,
                };
                let resp = match resp {
                    Ok(Some(resp)) => resp,
                    Ok(None) | Err(_) => {
                        warn!("根监听流中断, 重建");
                        break;
                    }
                };

                for event in Store::decode_events(&resp) {
                    handle_event(&state, event).await;
                }
            }

            tokio::time::sleep(Duration::from_secs(2)).await;
        }
    });
}

async fn handle_event(state: &AppState, event: WatchEvent) {
    match event.kind {
        WatchEventKind::Put => handle_put(state, &event).await,
        WatchEventKind::Delete => handle_delete(state, &event).await,
    }
}

/// put 事件：大盘广播
async fn handle_put(state: &AppState, event: &WatchEvent) {
    // v3 合并任务帧
    if event.key.ends_with("/task") {
        let Some((idc, sn)) = keys::parse_machine_key(&event.key) else {
            return;
        };
        match serde_json::from_slice::<Task>(&event.value) {
            Ok(task) => {
                debug!("任务更新: idc={}, sn={}, status={}", idc, sn, task.status.as_str());
                state
                    .hub
                    .broadcast(&DashboardMessage::TaskUpdate {
                        idc,
                        sn,
                        task: Box::new(task),
                    })
                    .await;
            }
            Err(e) => debug!("任务帧解码失败 {}: {}", event.key, e),
        }
        return;
    }

    // 旧版帧按键后缀分发
    if event.key.ends_with("/progress") {
        if let (Some(task_id), Ok(progress)) = (
            legacy_id(&event.key),
            serde_json::from_slice::<LegacyProgress>(&event.value),
        ) {
            state
                .hub
                .broadcast(&DashboardMessage::Progress {
                    task_id,
                    stage: progress.stage,
                    percentage: progress.percentage,
                    message: progress.message,
                })
                .await;
        }
    } else if event.key.ends_with("/status") {
        if let Some(task_id) = legacy_id(&event.key) {
            let status = String::from_utf8_lossy(&event.value).to_string();
            state
                .hub
                .broadcast(&DashboardMessage::Status { task_id, status })
                .await;
        }
    } else if event.key.ends_with("/hardware") {
        if let (Some(task_id), Ok(hardware)) = (
            legacy_id(&event.key),
            serde_json::from_slice::<HardwareInfo>(&event.value),
        ) {
            state
                .hub
                .broadcast(&DashboardMessage::Hardware {
                    task_id,
                    hardware: Box::new(hardware),
                })
                .await;
        }
    }
}

/// delete 事件：每机租约消失即 Agent 掉线
async fn handle_delete(state: &AppState, event: &WatchEvent) {
    if !event.key.ends_with("/lease") {
        return;
    }
    let Some((idc, sn)) = keys::parse_machine_key(&event.key) else {
        return;
    };

    info!("检测到租约消失: idc={}, sn={}", idc, sn);

    let task_key = keys::task_key(&idc, &sn);
    let result = state
        .store
        .atomic_update(&task_key, |mut task: Task| {
            // 只有装机中的任务需要对账
            if task.status != TaskStatus::Installing {
                return Ok(task);
            }
            task.set_status(TaskStatus::Failed, "agent offline")?;
            task.push_log("[ERROR] Agent lease expired during installation".to_string());
            Ok(task)
        })
        .await;

    match result {
        Ok(task) if task.status == TaskStatus::Failed => {
            warn!("任务因 Agent 掉线转入 failed: idc={}, sn={}", idc, sn);
        }
        Ok(_) => {}
        Err(Error::NotFound(_)) => {
            debug!("租约对账: 任务不存在 idc={}, sn={}", idc, sn);
        }
        Err(e) => warn!("租约对账失败 idc={}, sn={}: {}", idc, sn, e),
    }
}

/// 旧版键形如 .../{task_id}/progress，取倒数第二段
fn legacy_id(key: &str) -> Option<String> {
    let mut parts: Vec<&str> = key.split('/').collect();
    parts.pop()?;
    parts.pop().map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_id_extraction() {
        assert_eq!(
            legacy_id("/os/dc1/machines/SN1/progress"),
            Some("SN1".to_string())
        );
        assert_eq!(
            legacy_id("/lpmos/tasks/t-123/status"),
            Some("t-123".to_string())
        );
    }
}
