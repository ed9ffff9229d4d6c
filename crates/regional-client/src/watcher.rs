/// 存储监听
///
/// 两条长期监听：服务器索引监听负责每机租约，任务监听负责 PXE 配置。
/// 监听处理不阻塞事件循环，每台机器的工作放独立任务

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use common::models::{ServerEntry, Task, TaskStatus};
use common::store::WatchEventKind;
use common::{keys, Store};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::orchestrator;
use crate::state::RegionalState;

/// 监听服务器索引，为每台新增服务器启动租约保活循环
///
/// supervisor 集合防止重复投递导致的二次启动
pub fn spawn_server_watch(state: RegionalState, shutdown: watch::Receiver<bool>) {
    let supervisor: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));

    tokio::spawn(async move {
        let prefix = keys::server_prefix(&state.idc);
        info!("[{}] 开始监听服务器索引: {}", state.idc, prefix);

        loop {
            if *shutdown.borrow() {
                return;
            }

            let (_watcher, mut stream) = match state.store.watch(&prefix, true).await {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("[{}] 建立服务器监听失败: {}", state.idc, e);
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
                        warn!("[{}] 服务器监听流中断, 重建", state.idc);
                        break;
                    }
                };

                for event in Store::decode_events(&resp) {
                    if event.kind != WatchEventKind::Put {
                        continue;
                    }
                    let entry: ServerEntry = match serde_json::from_slice(&event.value) {
                        Ok(entry) => entry,
                        Err(e) => {
                            debug!("[{}] 服务器条目解码失败: {}", state.idc, e);
                            continue;
                        }
                    };

                    // 重复投递只允许一个保活循环
                    {
                        let mut active = supervisor.lock().await;
                        if !active.insert(entry.sn.clone()) {
                            continue;
                        }
                    }

                    info!(
                        "[{}] 发现服务器: {} (状态: {:?})",
                        state.idc, entry.sn, entry.status
                    );
                    spawn_server_lease(
                        state.clone(),
                        entry.sn.clone(),
                        supervisor.clone(),
                        shutdown.clone(),
                    );
                }
            }

            tokio::time::sleep(Duration::from_secs(2)).await;
        }
    });
}

/// 单台服务器的租约保活循环
///
/// 租约失效或客户端关停时退出；键随租约消失，
/// 控制面据此把 installing 任务判定为 agent 掉线
fn spawn_server_lease(
    state: RegionalState,
    sn: String,
    supervisor: Arc<Mutex<HashSet<String>>>,
    mut shutdown: watch::Receiver<bool>,
) {
    tokio::spawn(async move {
        let lease_key = keys::lease_key(&state.idc, &sn);
        let ttl = state.tunables.server_lease_ttl;

        let result = async {
            let (lease_id, mut keeper, mut ka_stream) = state.store.grant_lease(ttl).await?;
            state
                .store
                .put_with_lease(&lease_key, format!("lease-{lease_id}"), lease_id)
                .await?;
            info!("[{}] 已为 {} 启动租约保活 (lease: {})", state.idc, sn, lease_id);

            let mut ticker = tokio::time::interval(Duration::from_secs((ttl as u64 / 3).max(1)));
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.changed() => return common::Result::Ok(()),
                    _ = ticker.tick() => {
                        keeper.keep_alive().await?;
                        match ka_stream.message().await {
                            Ok(Some(resp)) if resp.ttl() > 0 => {}
                            _ => {
                                warn!("[{}] {} 的租约已失效", state.idc, sn);
                                return Ok(());
                            }
                        }
                    }
                }
            }
        }
        .await;

        if let Err(e) = result {
            warn!("[{}] {} 租约保活异常退出: {}", state.idc, sn, e);
        }
        supervisor.lock().await.remove(&sn);
    });
}

/// 监听任务键，审批通过且未配置 PXE 的任务触发引导配置
pub fn spawn_task_watch(state: RegionalState, shutdown: watch::Receiver<bool>) {
    tokio::spawn(async move {
        let prefix = keys::machine_prefix(&state.idc);
        info!("[{}] 开始监听任务更新: {}", state.idc, prefix);

        loop {
            if *shutdown.borrow() {
                return;
            }

            let (_watcher, mut stream) = match state.store.watch(&prefix, true).await {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("[{}] 建立任务监听失败: {}", state.idc, e);
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
                        warn!("[{}] 任务监听流中断, 重建", state.idc);
                        break;
                    }
                };

                for event in Store::decode_events(&resp) {
                    if event.kind != WatchEventKind::Put || !event.key.ends_with("/task") {
                        continue;
                    }
                    let task: Task = match serde_json::from_slice(&event.value) {
                        Ok(task) => task,
                        Err(e) => {
                            debug!("[{}] 任务解码失败 {}: {}", state.idc, event.key, e);
                            continue;
                        }
                    };

                    // 审批通过且未配置 PXE 才动手；pxe_configured 保证重复投递幂等
                    if task.status == TaskStatus::Approved && !task.pxe_configured {
                        info!(
                            "[{}] 任务已审批, 开始配置 PXE 引导: {}",
                            state.idc, task.sn
                        );
                        let state = state.clone();
                        tokio::spawn(async move {
                            orchestrator::configure_pxe_boot(&state, &task).await;
                        });
                    }
                }
            }

            tokio::time::sleep(Duration::from_secs(2)).await;
        }
    });
}
