/// 应用全局状态

use std::sync::Arc;

use common::{Store, Tunables};

use crate::ws::DashboardHub;

/// 应用状态
#[derive(Clone)]
pub struct AppState {
    /// etcd 存储客户端
    pub store: Store,
    /// 大盘 WebSocket 广播中心
    pub hub: DashboardHub,
    pub tunables: Arc<Tunables>,
}

impl AppState {
    pub fn new(store: Store, hub: DashboardHub) -> Self {
        Self {
            store,
            hub,
            tunables: Arc::new(Tunables::default()),
        }
    }
}
