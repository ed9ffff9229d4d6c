/// DHCP 租约与静态绑定表
///
/// 租约以 IP 为主键持有记录，MAC 反向索引只存键；
/// 三张表由服务端的单把读写锁统一保护

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::{utils::normalize_mac, Error, Result};
use serde::Serialize;

/// 动态租约
#[derive(Debug, Clone, Serialize)]
pub struct Lease {
    pub mac: String,
    pub ip: Ipv4Addr,
    pub hostname: String,
    pub expire_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Lease {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expire_at
    }
}

/// 静态 MAC-IP 绑定
#[derive(Debug, Clone, Serialize)]
pub struct StaticBinding {
    pub mac: String,
    pub ip: Ipv4Addr,
    pub hostname: String,
    /// 为空时使用服务端默认引导文件
    pub boot_file: String,
}

/// 租约表 + 反向索引 + 静态绑定
#[derive(Debug, Default)]
pub struct DhcpTables {
    leases: HashMap<Ipv4Addr, Lease>,
    mac_index: HashMap<String, Ipv4Addr>,
    static_binds: HashMap<String, StaticBinding>,
}

impl DhcpTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为 MAC 分配地址
    ///
    /// 已有存活租约则续期；否则在池内线性扫描第一个空闲 IP
    pub fn allocate(
        &mut self,
        mac: &str,
        start: Ipv4Addr,
        end: Ipv4Addr,
        lease_time: Duration,
    ) -> Result<Ipv4Addr> {
        let mac = normalize_mac(mac);
        let now = Utc::now();

        if let Some(ip) = self.mac_index.get(&mac).copied() {
            if let Some(lease) = self.leases.get_mut(&ip) {
                if !lease.is_expired(now) {
                    lease.expire_at = now + lease_time;
                    return Ok(ip);
                }
            }
        }

        let ip = self
            .find_available(start, end, now)
            .ok_or_else(|| Error::Exhausted(format!("{start}-{end} 无可用地址")))?;

        self.leases.insert(
            ip,
            Lease {
                mac: mac.clone(),
                ip,
                hostname: String::new(),
                expire_at: now + lease_time,
                created_at: now,
            },
        );
        self.mac_index.insert(mac, ip);
        Ok(ip)
    }

    /// MAC 是否持有指定 IP 的存活租约
    pub fn is_allocated(&self, mac: &str, ip: Ipv4Addr) -> bool {
        let mac = normalize_mac(mac);
        match self.mac_index.get(&mac) {
            Some(held) if *held == ip => self
                .leases
                .get(held)
                .map(|l| !l.is_expired(Utc::now()))
                .unwrap_or(false),
            _ => false,
        }
    }

    /// 释放租约
    pub fn release(&mut self, mac: &str, ip: Ipv4Addr) {
        let mac = normalize_mac(mac);
        self.leases.remove(&ip);
        self.mac_index.remove(&mac);
    }

    /// 移除所有过期租约，返回回收数量
    pub fn reap_expired(&mut self) -> usize {
        let now = Utc::now();
        let expired: Vec<Ipv4Addr> = self
            .leases
            .iter()
            .filter(|(_, lease)| lease.is_expired(now))
            .map(|(ip, _)| *ip)
            .collect();
        for ip in &expired {
            if let Some(lease) = self.leases.remove(ip) {
                self.mac_index.remove(&lease.mac);
            }
        }
        expired.len()
    }

    pub fn insert_static(&mut self, binding: StaticBinding) {
        self.static_binds
            .insert(normalize_mac(&binding.mac), binding);
    }

    pub fn remove_static(&mut self, mac: &str) {
        self.static_binds.remove(&normalize_mac(mac));
    }

    pub fn static_binding(&self, mac: &str) -> Option<&StaticBinding> {
        self.static_binds.get(&normalize_mac(mac))
    }

    pub fn leases(&self) -> Vec<Lease> {
        self.leases.values().cloned().collect()
    }

    pub fn static_bindings(&self) -> Vec<StaticBinding> {
        self.static_binds.values().cloned().collect()
    }

    fn find_available(
        &self,
        start: Ipv4Addr,
        end: Ipv4Addr,
        now: DateTime<Utc>,
    ) -> Option<Ipv4Addr> {
        let start = u32::from(start);
        let end = u32::from(end);
        for n in start..=end {
            let ip = Ipv4Addr::from(n);
            match self.leases.get(&ip) {
                Some(lease) if !lease.is_expired(now) => continue,
                _ => return Some(ip),
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEASE_TIME: Duration = Duration::from_secs(3600);

    fn pool() -> (Ipv4Addr, Ipv4Addr) {
        ("192.168.100.10".parse().unwrap(), "192.168.100.12".parse().unwrap())
    }

    #[test]
    fn test_allocate_linear_scan() {
        let (start, end) = pool();
        let mut tables = DhcpTables::new();
        let ip1 = tables.allocate("00:11:22:33:44:01", start, end, LEASE_TIME).unwrap();
        let ip2 = tables.allocate("00:11:22:33:44:02", start, end, LEASE_TIME).unwrap();
        assert_eq!(ip1, start);
        assert_eq!(ip2, Ipv4Addr::new(192, 168, 100, 11));
    }

    #[test]
    fn test_allocate_renews_existing() {
        let (start, end) = pool();
        let mut tables = DhcpTables::new();
        let ip1 = tables.allocate("00:11:22:33:44:01", start, end, LEASE_TIME).unwrap();
        let ip2 = tables.allocate("00:11:22:33:44:01", start, end, LEASE_TIME).unwrap();
        assert_eq!(ip1, ip2);
        assert_eq!(tables.leases().len(), 1);
    }

    #[test]
    fn test_mac_comparison_is_normalized() {
        let (start, end) = pool();
        let mut tables = DhcpTables::new();
        let ip1 = tables.allocate("00:11:22:33:44:01", start, end, LEASE_TIME).unwrap();
        let ip2 = tables.allocate("00-11-22-33-44-01", start, end, LEASE_TIME).unwrap();
        assert_eq!(ip1, ip2);
        assert!(tables.is_allocated("00:11:22:33:44:01", ip1));
    }

    #[test]
    fn test_pool_exhaustion() {
        let (start, end) = pool();
        let mut tables = DhcpTables::new();
        for i in 0..3 {
            tables
                .allocate(&format!("00:11:22:33:44:0{i}"), start, end, LEASE_TIME)
                .unwrap();
        }
        let err = tables
            .allocate("00:11:22:33:44:ff", start, end, LEASE_TIME)
            .unwrap_err();
        assert!(matches!(err, Error::Exhausted(_)));
    }

    #[test]
    fn test_release_frees_address() {
        let (start, end) = pool();
        let mut tables = DhcpTables::new();
        let ip = tables.allocate("00:11:22:33:44:01", start, end, LEASE_TIME).unwrap();
        tables.release("00:11:22:33:44:01", ip);
        assert!(!tables.is_allocated("00:11:22:33:44:01", ip));
        let reallocated = tables.allocate("00:11:22:33:44:02", start, end, LEASE_TIME).unwrap();
        assert_eq!(reallocated, ip);
    }

    #[test]
    fn test_reap_expired() {
        let (start, end) = pool();
        let mut tables = DhcpTables::new();
        tables
            .allocate("00:11:22:33:44:01", start, end, Duration::from_secs(0))
            .unwrap();
        // 过期立即可回收
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(tables.reap_expired(), 1);
        assert!(tables.leases().is_empty());
    }

    #[test]
    fn test_static_binding_lookup() {
        let mut tables = DhcpTables::new();
        tables.insert_static(StaticBinding {
            mac: "00:1A:2B:3C:4D:5E".into(),
            ip: "192.168.100.50".parse().unwrap(),
            hostname: "node-1".into(),
            boot_file: "pxelinux.0".into(),
        });
        assert!(tables.static_binding("00-1a-2b-3c-4d-5e").is_some());
        tables.remove_static("00:1a:2b:3c:4d:5e");
        assert!(tables.static_binding("00:1a:2b:3c:4d:5e").is_none());
    }
}
