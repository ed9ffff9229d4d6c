/// etcd 存储客户端封装
///
/// 任务记录的所有变更必须经由 atomic_update（CAS + 有限重试），
/// 禁止对任务键做盲写

use std::time::Duration;

use etcd_client::{
    Client, Compare, CompareOp, ConnectOptions, DeleteOptions, EventType, GetOptions,
    LeaseKeepAliveStream, LeaseKeeper, PutOptions, Txn, TxnOp, WatchOptions, WatchResponse,
    WatchStream, Watcher,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::errors::{Error, Result};
use crate::settings::Tunables;

/// 存储客户端配置
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub endpoints: Vec<String>,
    pub dial_timeout: Duration,
    pub request_timeout: Duration,
}

impl StoreConfig {
    pub fn from_endpoints(endpoints: Vec<String>) -> Self {
        let tunables = Tunables::default();
        Self {
            endpoints,
            dial_timeout: tunables.dial_timeout,
            request_timeout: tunables.store_request_timeout,
        }
    }
}

/// 监听事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    Put,
    Delete,
}

/// 解码后的监听事件
///
/// 消费方必须容忍重连后的重复投递，按 (kind, key, revision) 幂等处理
#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub key: String,
    pub value: Vec<u8>,
    pub revision: i64,
}

/// etcd 客户端封装
#[derive(Clone)]
pub struct Store {
    client: Client,
}

impl Store {
    /// 建立到 etcd 集群的连接
    pub async fn connect(cfg: StoreConfig) -> Result<Self> {
        let options = ConnectOptions::new()
            .with_connect_timeout(cfg.dial_timeout)
            .with_timeout(cfg.request_timeout)
            .with_keep_alive(Duration::from_secs(10), Duration::from_secs(5));

        let client = Client::connect(cfg.endpoints.clone(), Some(options))
            .await
            .map_err(|e| Error::Store(format!("连接 etcd 失败 {:?}: {}", cfg.endpoints, e)))?;

        Ok(Self { client })
    }

    /// 写入原始值
    pub async fn put(&self, key: &str, value: impl Into<Vec<u8>>) -> Result<()> {
        let mut client = self.client.clone();
        client.put(key, value, None).await?;
        Ok(())
    }

    /// 写入 JSON 编码值
    pub async fn put_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let encoded = serde_json::to_vec(value)?;
        self.put(key, encoded).await
    }

    /// 读取原始值，键不存在返回 NotFound
    pub async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let (value, _) = self.get_with_version(key).await?;
        Ok(value)
    }

    /// 读取值及其 mod_revision（CAS 的比较版本）
    pub async fn get_with_version(&self, key: &str) -> Result<(Vec<u8>, i64)> {
        let mut client = self.client.clone();
        let resp = client.get(key, None).await?;
        match resp.kvs().first() {
            Some(kv) => Ok((kv.value().to_vec(), kv.mod_revision())),
            None => Err(Error::NotFound(key.to_string())),
        }
    }

    /// 读取并按 JSON 解码
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let raw = self.get(key).await?;
        Ok(serde_json::from_slice(&raw)?)
    }

    /// 按前缀读取全部键值
    pub async fn get_with_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let mut client = self.client.clone();
        let resp = client
            .get(prefix, Some(GetOptions::new().with_prefix()))
            .await?;
        let mut out = Vec::with_capacity(resp.kvs().len());
        for kv in resp.kvs() {
            let key = kv
                .key_str()
                .map_err(|e| Error::Store(format!("非法键名: {e}")))?
                .to_string();
            out.push((key, kv.value().to_vec()));
        }
        Ok(out)
    }

    /// 删除单个键
    pub async fn delete(&self, key: &str) -> Result<()> {
        let mut client = self.client.clone();
        client.delete(key, None).await?;
        Ok(())
    }

    /// 按前缀删除
    pub async fn delete_prefix(&self, prefix: &str) -> Result<()> {
        let mut client = self.client.clone();
        client
            .delete(prefix, Some(DeleteOptions::new().with_prefix()))
            .await?;
        Ok(())
    }

    /// 建立监听，recursive 为 true 时按前缀监听
    pub async fn watch(&self, key: &str, recursive: bool) -> Result<(Watcher, WatchStream)> {
        let mut client = self.client.clone();
        let options = if recursive {
            Some(WatchOptions::new().with_prefix())
        } else {
            None
        };
        let (watcher, stream) = client.watch(key, options).await?;
        Ok((watcher, stream))
    }

    /// 把一批 etcd 事件解码为 WatchEvent
    pub fn decode_events(resp: &WatchResponse) -> Vec<WatchEvent> {
        let mut events = Vec::with_capacity(resp.events().len());
        for event in resp.events() {
            let Some(kv) = event.kv() else { continue };
            let Ok(key) = kv.key_str() else { continue };
            let kind = match event.event_type() {
                EventType::Put => WatchEventKind::Put,
                EventType::Delete => WatchEventKind::Delete,
            };
            events.push(WatchEvent {
                kind,
                key: key.to_string(),
                value: kv.value().to_vec(),
                revision: kv.mod_revision(),
            });
        }
        events
    }

    /// 授予租约，返回 (租约 ID, keeper, keep-alive 流)
    ///
    /// 调用方负责周期性调用 keeper.keep_alive() 并消费流，
    /// 流关闭意味着租约失效，需要从头重建
    pub async fn grant_lease(&self, ttl: i64) -> Result<(i64, LeaseKeeper, LeaseKeepAliveStream)> {
        let mut client = self.client.clone();
        let grant = client.lease_grant(ttl, None).await?;
        let lease_id = grant.id();
        let (keeper, stream) = client.lease_keep_alive(lease_id).await?;
        Ok((lease_id, keeper, stream))
    }

    /// 在指定租约下写入键
    pub async fn put_with_lease(
        &self,
        key: &str,
        value: impl Into<Vec<u8>>,
        lease_id: i64,
    ) -> Result<()> {
        let mut client = self.client.clone();
        client
            .put(key, value, Some(PutOptions::new().with_lease(lease_id)))
            .await?;
        Ok(())
    }

    /// 写入带 TTL 的键（一次性租约，不续期）
    pub async fn put_with_ttl(
        &self,
        key: &str,
        value: impl Into<Vec<u8>>,
        ttl_seconds: i64,
    ) -> Result<i64> {
        let mut client = self.client.clone();
        let grant = client.lease_grant(ttl_seconds, None).await?;
        let lease_id = grant.id();
        client
            .put(key, value, Some(PutOptions::new().with_lease(lease_id)))
            .await?;
        Ok(lease_id)
    }

    /// 吊销租约（挂在租约下的键随之删除）
    pub async fn revoke_lease(&self, lease_id: i64) -> Result<()> {
        let mut client = self.client.clone();
        client.lease_revoke(lease_id).await?;
        Ok(())
    }

    /// 原子更新：读取-变换-CAS 写入
    ///
    /// 1. 读取当前值与 mod_revision，键不存在返回 NotFound
    /// 2. 调用 transform，出错即向上传播
    /// 3. 事务: 当前 mod_revision 未变则写入，否则重读重试
    /// 4. 最多 3 次冲突重试，退避 100ms x 重试序号，之后返回 Conflict
    pub async fn atomic_update<T, F>(&self, key: &str, mut transform: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut(T) -> Result<T>,
    {
        let tunables = Tunables::default();
        let max_retries = tunables.atomic_update_retries;

        let mut attempt: u32 = 0;
        loop {
            let (raw, version) = self.get_with_version(key).await?;
            let current: T = serde_json::from_slice(&raw)?;
            let next = transform(current)?;
            let encoded = serde_json::to_vec(&next)?;

            let txn = Txn::new()
                .when(vec![Compare::mod_revision(key, CompareOp::Equal, version)])
                .and_then(vec![TxnOp::put(key, encoded, None)]);

            let mut client = self.client.clone();
            let resp = client.txn(txn).await?;
            if resp.succeeded() {
                debug!("原子更新成功: key={}, 第 {} 次尝试", key, attempt + 1);
                return Ok(next);
            }

            if attempt >= max_retries {
                warn!("原子更新冲突重试耗尽: key={}, 尝试 {} 次", key, attempt + 1);
                return Err(Error::Conflict(format!(
                    "键 {key} 经 {} 次重试仍然冲突",
                    attempt
                )));
            }

            attempt += 1;
            warn!("原子更新冲突: key={}, 第 {} 次重试", key, attempt);
            tokio::time::sleep(tunables.atomic_update_backoff * attempt).await;
        }
    }
}
