/// IDC 统计服务
///
/// 统计结果缓存在 /os/global/stats/{idc}，未命中时扫描任务即时计算；
/// 缓存不做主动失效，删除统计键即可强制重算

use chrono::Utc;
use tracing::info;

use common::models::{IdcStats, Task};
use common::{keys, Error, Result};

use crate::app_state::AppState;

pub struct StatsService {
    state: AppState,
}

impl StatsService {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// 取单个 IDC 的统计，未命中则计算并回填缓存
    pub async fn get_stats(&self, idc: &str) -> Result<IdcStats> {
        let stats_key = keys::stats_key(idc);
        match self.state.store.get_json::<IdcStats>(&stats_key).await {
            Ok(stats) => Ok(stats),
            Err(Error::NotFound(_)) if self.state.tunables.stats_recompute_on_miss => {
                let stats = self.compute_stats(idc).await?;
                self.state.store.put_json(&stats_key, &stats).await?;
                info!("统计缓存已回填: idc={}, total={}", idc, stats.total);
                Ok(stats)
            }
            Err(e) => Err(e),
        }
    }

    /// 列出所有已缓存的 IDC 统计
    pub async fn list_stats(&self) -> Result<Vec<IdcStats>> {
        let kvs = self
            .state
            .store
            .get_with_prefix(&keys::stats_prefix())
            .await?;
        let mut all = Vec::new();
        for (key, value) in kvs {
            match serde_json::from_slice::<IdcStats>(&value) {
                Ok(stats) => all.push(stats),
                Err(e) => tracing::warn!("统计解码失败 {}: {}", key, e),
            }
        }
        all.sort_by(|a, b| a.idc.cmp(&b.idc));
        Ok(all)
    }

    /// 扫描 IDC 下全部任务计算计数
    async fn compute_stats(&self, idc: &str) -> Result<IdcStats> {
        let kvs = self
            .state
            .store
            .get_with_prefix(&keys::machine_prefix(idc))
            .await?;

        let mut stats = IdcStats {
            idc: idc.to_string(),
            computed_at: Some(Utc::now()),
            ..Default::default()
        };
        for (key, value) in kvs {
            if !key.ends_with("/task") {
                continue;
            }
            if let Ok(task) = serde_json::from_slice::<Task>(&value) {
                stats.count(task.status);
            }
        }
        Ok(stats)
    }
}
