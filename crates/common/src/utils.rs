/// 工具函数集合

use uuid::Uuid;

/// 生成唯一 ID
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// 格式化字节大小
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

/// 规范化 MAC 地址：小写、冒号分隔
pub fn normalize_mac(mac: &str) -> String {
    mac.to_lowercase().replace('-', ":")
}

/// MAC 地址比较：忽略大小写与分隔符（`:` / `-`）
pub fn mac_eq(a: &str, b: &str) -> bool {
    let strip = |s: &str| {
        s.chars()
            .filter(|c| *c != ':' && *c != '-')
            .collect::<String>()
            .to_lowercase()
    };
    strip(a) == strip(b)
}

/// MAC 地址转 PXE 配置文件名：01-aa-bb-cc-dd-ee-ff
pub fn mac_to_pxe_filename(mac: &str) -> String {
    let mac = normalize_mac(mac).replace(':', "-");
    format!("01-{}", mac)
}

/// 验证 MAC 地址格式，接受 `:` 或 `-` 分隔
pub fn validate_mac_address(mac: &str) -> bool {
    let sep = if mac.contains('-') && !mac.contains(':') {
        '-'
    } else {
        ':'
    };
    let parts: Vec<&str> = mac.split(sep).collect();
    if parts.len() != 6 {
        return false;
    }

    parts
        .iter()
        .all(|part| part.len() == 2 && part.chars().all(|c| c.is_ascii_hexdigit()))
}

/// 解析 MAC 地址为 6 字节，失败返回 None
pub fn parse_mac(mac: &str) -> Option<[u8; 6]> {
    if !validate_mac_address(mac) {
        return None;
    }
    let normalized = normalize_mac(mac);
    let mut out = [0u8; 6];
    for (i, part) in normalized.split(':').enumerate() {
        out[i] = u8::from_str_radix(part, 16).ok()?;
    }
    Some(out)
}

/// 验证 IP 地址格式（简单验证）
pub fn validate_ip_address(ip: &str) -> bool {
    let parts: Vec<&str> = ip.split('.').collect();
    if parts.len() != 4 {
        return false;
    }

    parts.iter().all(|part| part.parse::<u8>().is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_id() {
        let id1 = generate_id();
        let id2 = generate_id();
        assert_ne!(id1, id2);
        assert_eq!(id1.len(), 36); // UUID v4 格式
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0.00 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1048576), "1.00 MB");
        assert_eq!(format_bytes(1073741824), "1.00 GB");
    }

    #[test]
    fn test_validate_mac_address() {
        assert!(validate_mac_address("52:54:00:12:34:56"));
        assert!(validate_mac_address("00:11:22:33:44:55"));
        assert!(validate_mac_address("00-1A-2B-3C-4D-5E"));
        assert!(!validate_mac_address("52:54:00:12:34"));
        assert!(!validate_mac_address("52:54:00:12:34:5g"));
        assert!(!validate_mac_address("invalid"));
    }

    #[test]
    fn test_mac_eq() {
        assert!(mac_eq("00:1A:2B:3C:4D:5E", "00:1a:2b:3c:4d:5e"));
        assert!(mac_eq("00-1a-2b-3c-4d-5e", "00:1A:2B:3C:4D:5E"));
        assert!(!mac_eq("00:1a:2b:3c:4d:5e", "00:1a:2b:3c:4d:5f"));
    }

    #[test]
    fn test_mac_to_pxe_filename() {
        assert_eq!(
            mac_to_pxe_filename("00:1A:2B:3C:4D:5E"),
            "01-00-1a-2b-3c-4d-5e"
        );
        assert_eq!(
            mac_to_pxe_filename("00-1a-2b-3c-4d-5e"),
            "01-00-1a-2b-3c-4d-5e"
        );
    }

    #[test]
    fn test_parse_mac() {
        assert_eq!(
            parse_mac("00:1a:2b:3c:4d:5e"),
            Some([0x00, 0x1a, 0x2b, 0x3c, 0x4d, 0x5e])
        );
        assert_eq!(parse_mac("not-a-mac"), None);
    }

    #[test]
    fn test_validate_ip_address() {
        assert!(validate_ip_address("192.168.1.1"));
        assert!(validate_ip_address("10.0.0.1"));
        assert!(!validate_ip_address("256.1.1.1"));
        assert!(!validate_ip_address("192.168.1"));
        assert!(!validate_ip_address("invalid"));
    }
}
