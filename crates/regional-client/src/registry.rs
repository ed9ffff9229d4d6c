/// 区域客户端注册与心跳
///
/// 启动时写入 info 键并维持 30 秒 TTL 租约下的心跳键，
/// keep-alive 流断开后从头重建租约；关停时标记 offline 并吊销租约

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::models::{Heartbeat, RegionInfo};
use common::{keys, Result};
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

use crate::state::RegionalState;

/// 注册与心跳管理
pub struct RegionRegistry {
    state: RegionalState,
    started_at: chrono::DateTime<chrono::Utc>,
    heartbeat_lease: Arc<Mutex<i64>>,
}

impl RegionRegistry {
    pub fn new(state: RegionalState) -> Self {
        Self {
            state,
            started_at: Utc::now(),
            heartbeat_lease: Arc::new(Mutex::new(0)),
        }
    }

    /// 写入注册信息并启动心跳
    pub async fn register(&self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let info = self.build_info("online", None);
        self.state
            .store
            .put_json(&keys::region_info_key(&self.state.idc), &info)
            .await?;
        info!(
            "区域客户端已注册: {}",
            keys::region_info_key(&self.state.idc)
        );

        self.spawn_heartbeat(shutdown);
        Ok(())
    }

    /// 心跳维持循环
    fn spawn_heartbeat(&self, mut shutdown: watch::Receiver<bool>) {
        let state = self.state.clone();
        let lease_holder = self.heartbeat_lease.clone();

        tokio::spawn(async move {
            let ttl = state.tunables.region_heartbeat_ttl;
            let heartbeat_key = keys::region_heartbeat_key(&state.idc);

            loop {
                if *shutdown.borrow() {
                    return;
                }

                let (lease_id, mut keeper, mut ka_stream) =
                    match state.store.grant_lease(ttl).await {
                        Ok(triple) => triple,
                        Err(e) => {
                            warn!("[{}] 创建心跳租约失败: {}", state.idc, e);
                            tokio::time::sleep(Duration::from_secs(5)).await;
                            continue;
                        }
                    };

                *lease_holder.lock().await = lease_id;

                let heartbeat = Heartbeat {
                    status: "online".into(),
                    last_updated: Utc::now(),
                    lease_id,
                };
                let encoded = match serde_json::to_vec(&heartbeat) {
                    Ok(encoded) => encoded,
                    Err(e) => {
                        warn!("[{}] 心跳序列化失败: {}", state.idc, e);
                        return;
                    }
                };
                if let Err(e) = state
                    .store
                    .put_with_lease(&heartbeat_key, encoded, lease_id)
                    .await
                {
                    warn!("[{}] 写入心跳键失败: {}", state.idc, e);
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    continue;
                }

                info!("[{}] 心跳已启动 (lease: {})", state.idc, lease_id);

                // 续约间隔取 TTL 的三分之一
                let mut ticker =
                    tokio::time::interval(Duration::from_secs((ttl as u64 / 3).max(1)));
                ticker.tick().await;

                // keep-alive 循环，流关闭即重建租约
                loop {
                    tokio::select! {
                        _ = shutdown.changed() => {
                            info!("[{}] 心跳循环退出", state.idc);
                            return;
                        }
                        _ = ticker.tick() => {
                            if keeper.keep_alive().await.is_err() {
                                warn!("[{}] 心跳续约请求失败, 重建租约", state.idc);
                                break;
                            }
                            match ka_stream.message().await {
                                Ok(Some(resp)) if resp.ttl() > 0 => {}
                                _ => {
                                    warn!("[{}] 心跳流关闭, 重建租约", state.idc);
                                    break;
                                }
                            }
                        }
                    }
                }

                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        });
    }

    /// 标记 offline 并吊销心跳租约
    pub async fn unregister(&self) {
        info!("[{}] 从 etcd 注销...", self.state.idc);

        let info = self.build_info("offline", Some(Utc::now()));
        if let Err(e) = self
            .state
            .store
            .put_json(&keys::region_info_key(&self.state.idc), &info)
            .await
        {
            warn!("[{}] 更新 offline 状态失败: {}", self.state.idc, e);
        }

        let lease_id = *self.heartbeat_lease.lock().await;
        if lease_id != 0 {
            if let Err(e) = self.state.store.revoke_lease(lease_id).await {
                warn!("[{}] 吊销心跳租约失败: {}", self.state.idc, e);
            }
        }

        info!("[{}] 已注销", self.state.idc);
    }

    fn build_info(
        &self,
        status: &str,
        stopped_at: Option<chrono::DateTime<chrono::Utc>>,
    ) -> RegionInfo {
        RegionInfo {
            idc: self.state.idc.clone(),
            server_ip: self.state.server_ip.clone(),
            api_port: self.state.api_port,
            dhcp_enabled: self.state.dhcp.is_some(),
            tftp_enabled: self.state.tftp.is_some(),
            started_at: self.started_at,
            stopped_at,
            status: status.to_string(),
        }
    }
}
