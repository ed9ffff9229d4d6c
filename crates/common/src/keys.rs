/// etcd 键空间构造
///
/// 所有键的唯一出处，其他组件一律通过这里拼接键名

/// 键空间根前缀
pub const ROOT: &str = "/os";

/// 服务器索引条目: /os/{idc}/servers/{sn}
pub fn server_key(idc: &str, sn: &str) -> String {
    format!("{ROOT}/{idc}/servers/{sn}")
}

/// 服务器索引前缀: /os/{idc}/servers/
pub fn server_prefix(idc: &str) -> String {
    format!("{ROOT}/{idc}/servers/")
}

/// 合并任务记录: /os/{idc}/machines/{sn}/task
pub fn task_key(idc: &str, sn: &str) -> String {
    format!("{ROOT}/{idc}/machines/{sn}/task")
}

/// 硬件信息快照: /os/{idc}/machines/{sn}/meta
pub fn meta_key(idc: &str, sn: &str) -> String {
    format!("{ROOT}/{idc}/machines/{sn}/meta")
}

/// Agent 存活租约: /os/{idc}/machines/{sn}/lease
pub fn lease_key(idc: &str, sn: &str) -> String {
    format!("{ROOT}/{idc}/machines/{sn}/lease")
}

/// 机器命名空间前缀: /os/{idc}/machines/
pub fn machine_prefix(idc: &str) -> String {
    format!("{ROOT}/{idc}/machines/")
}

/// 区域客户端注册信息: /os/region/{idc}/info
pub fn region_info_key(idc: &str) -> String {
    format!("{ROOT}/region/{idc}/info")
}

/// 区域客户端心跳: /os/region/{idc}/heartbeat
pub fn region_heartbeat_key(idc: &str) -> String {
    format!("{ROOT}/region/{idc}/heartbeat")
}

/// 未匹配硬件上报: /os/unmatched_reports/{idc}/{mac}
pub fn unmatched_report_key(idc: &str, mac: &str) -> String {
    format!("{ROOT}/unmatched_reports/{idc}/{mac}")
}

/// IDC 统计缓存: /os/global/stats/{idc}
pub fn stats_key(idc: &str) -> String {
    format!("{ROOT}/global/stats/{idc}")
}

/// 统计缓存前缀: /os/global/stats/
pub fn stats_prefix() -> String {
    format!("{ROOT}/global/stats/")
}

/// 从机器命名空间下的键中解析 (idc, sn)
///
/// 形如 /os/{idc}/machines/{sn}/task 或 .../lease
pub fn parse_machine_key(key: &str) -> Option<(String, String)> {
    let rest = key.strip_prefix(ROOT)?.strip_prefix('/')?;
    let mut parts = rest.split('/');
    let idc = parts.next()?;
    if parts.next()? != "machines" {
        return None;
    }
    let sn = parts.next()?;
    Some((idc.to_string(), sn.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_shapes() {
        assert_eq!(task_key("dc1", "SN1"), "/os/dc1/machines/SN1/task");
        assert_eq!(meta_key("dc1", "SN1"), "/os/dc1/machines/SN1/meta");
        assert_eq!(lease_key("dc1", "SN1"), "/os/dc1/machines/SN1/lease");
        assert_eq!(server_key("dc1", "SN1"), "/os/dc1/servers/SN1");
        assert_eq!(server_prefix("dc1"), "/os/dc1/servers/");
        assert_eq!(machine_prefix("dc1"), "/os/dc1/machines/");
        assert_eq!(region_info_key("dc1"), "/os/region/dc1/info");
        assert_eq!(region_heartbeat_key("dc1"), "/os/region/dc1/heartbeat");
        assert_eq!(
            unmatched_report_key("dc1", "aa:bb:cc:dd:ee:ff"),
            "/os/unmatched_reports/dc1/aa:bb:cc:dd:ee:ff"
        );
        assert_eq!(stats_key("dc1"), "/os/global/stats/dc1");
        assert_eq!(stats_prefix(), "/os/global/stats/");
    }

    #[test]
    fn test_parse_machine_key() {
        assert_eq!(
            parse_machine_key("/os/dc1/machines/SN1/task"),
            Some(("dc1".to_string(), "SN1".to_string()))
        );
        assert_eq!(
            parse_machine_key("/os/dc1/machines/SN1/lease"),
            Some(("dc1".to_string(), "SN1".to_string()))
        );
        assert_eq!(parse_machine_key("/os/dc1/servers/SN1"), None);
        assert_eq!(parse_machine_key("/other/dc1/machines/SN1/task"), None);
    }
}
