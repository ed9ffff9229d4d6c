/// 重试与超时参数
///
/// 集中枚举所有可调参数，避免散落在各处的魔法数字

use std::time::Duration;

/// 全局可调参数
#[derive(Debug, Clone)]
pub struct Tunables {
    /// etcd 连接超时
    pub dial_timeout: Duration,
    /// etcd 单次请求超时
    pub store_request_timeout: Duration,
    /// 原子更新冲突重试次数
    pub atomic_update_retries: u32,
    /// 原子更新重试退避基数（乘以重试序号）
    pub atomic_update_backoff: Duration,

    /// 区域客户端心跳租约 TTL（秒）
    pub region_heartbeat_ttl: i64,
    /// 单机存活租约 TTL（秒）
    pub server_lease_ttl: i64,

    /// 装机期间 DHCP 租约时长
    pub dhcp_lease_time: Duration,

    /// Agent 上报/排队轮询间隔
    pub poll_interval: Duration,
    /// 排队轮询最大次数（120 次 x 10 秒 = 20 分钟）
    pub poll_max_attempts: u32,
    /// 排队轮询使用的 HTTP 超时
    pub queue_poll_http_timeout: Duration,
    /// 其余 HTTP 请求超时
    pub http_timeout: Duration,
    /// Servant 循环最大迭代次数
    pub servant_max_operations: u32,
    /// Servant 循环每次操作后的间隔
    pub servant_sleep: Duration,

    /// 统计缓存未命中时即时计算（不做主动失效）
    pub stats_recompute_on_miss: bool,
    /// installComplete 报告失败时是否同样清理 PXE 环境
    pub cleanup_on_failure: bool,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            dial_timeout: Duration::from_secs(5),
            store_request_timeout: Duration::from_secs(10),
            atomic_update_retries: 3,
            atomic_update_backoff: Duration::from_millis(100),
            region_heartbeat_ttl: 30,
            server_lease_ttl: 30,
            dhcp_lease_time: Duration::from_secs(24 * 3600),
            poll_interval: Duration::from_secs(10),
            poll_max_attempts: 120,
            queue_poll_http_timeout: Duration::from_secs(5),
            http_timeout: Duration::from_secs(10),
            servant_max_operations: 100,
            servant_sleep: Duration::from_secs(2),
            stats_recompute_on_miss: true,
            cleanup_on_failure: false,
        }
    }
}

/// 任务日志列表的长度上限，超出时丢弃最旧的条目
pub const MAX_TASK_LOGS: usize = 200;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let t = Tunables::default();
        assert_eq!(t.atomic_update_retries, 3);
        assert_eq!(t.poll_max_attempts, 120);
        assert_eq!(t.servant_max_operations, 100);
        assert_eq!(t.region_heartbeat_ttl, 30);
        assert_eq!(t.dhcp_lease_time, Duration::from_secs(86400));
        assert!(!t.cleanup_on_failure);
    }
}
