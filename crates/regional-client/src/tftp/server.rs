/// TFTP 只读服务端
///
/// 监听 UDP/69，仅处理 RRQ。每个会话在独立任务中用临时端口传输，
/// 统计计数全部使用原子变量

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use common::{Error, Result};

use super::files::{FileManager, TftpFileInfo};

const OPCODE_RRQ: u16 = 1;
const OPCODE_DATA: u16 = 3;
const OPCODE_ACK: u16 = 4;
const OPCODE_ERROR: u16 = 5;

const BLOCK_SIZE: usize = 512;
const MAX_RETRANSMITS: u32 = 5;

/// TFTP 服务配置
#[derive(Debug, Clone)]
pub struct TftpConfig {
    pub root: PathBuf,
    pub listen_port: u16,
    pub session_timeout: Duration,
}

impl TftpConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            listen_port: 69,
            session_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Default)]
struct TftpStats {
    total_requests: AtomicU64,
    success_requests: AtomicU64,
    failed_requests: AtomicU64,
    bytes_served: AtomicU64,
}

/// 统计快照（健康检查接口使用）
#[derive(Debug, Clone, Serialize)]
pub struct TftpStatsSnapshot {
    pub total_requests: u64,
    pub success_requests: u64,
    pub failed_requests: u64,
    pub bytes_served: u64,
}

/// TFTP 服务端
pub struct TftpServer {
    cfg: TftpConfig,
    files: FileManager,
    stats: Arc<TftpStats>,
}

impl TftpServer {
    pub fn new(cfg: TftpConfig) -> Result<Self> {
        let files = FileManager::new(cfg.root.clone());
        files.ensure_directories()?;
        Ok(Self {
            cfg,
            files,
            stats: Arc::new(TftpStats::default()),
        })
    }

    /// 绑定套接字并启动请求接收循环
    pub async fn start(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let socket = UdpSocket::bind(("0.0.0.0", self.cfg.listen_port))
            .await
            .map_err(|e| Error::Network(format!("绑定 UDP/{} 失败: {e}", self.cfg.listen_port)))?;
        let socket = Arc::new(socket);

        info!(
            "TFTP 服务已启动: root={}, port={}",
            self.cfg.root.display(),
            self.cfg.listen_port
        );

        let server = self.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; 1024];
            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        info!("TFTP 接收循环退出");
                        return;
                    }
                    recv = timeout(Duration::from_secs(1), socket.recv_from(&mut buf)) => {
                        let (n, peer) = match recv {
                            Ok(Ok(pair)) => pair,
                            Ok(Err(e)) => {
                                warn!("TFTP 读取失败: {}", e);
                                continue;
                            }
                            Err(_) => continue,
                        };
                        let session_server = server.clone();
                        let packet = buf[..n].to_vec();
                        // 每个会话独立任务，互不阻塞
                        tokio::spawn(async move {
                            session_server.handle_request(packet, peer).await;
                        });
                    }
                }
            }
        });

        Ok(())
    }

    pub fn stats(&self) -> TftpStatsSnapshot {
        TftpStatsSnapshot {
            total_requests: self.stats.total_requests.load(Ordering::Relaxed),
            success_requests: self.stats.success_requests.load(Ordering::Relaxed),
            failed_requests: self.stats.failed_requests.load(Ordering::Relaxed),
            bytes_served: self.stats.bytes_served.load(Ordering::Relaxed),
        }
    }

    pub fn list_files(&self) -> Result<Vec<TftpFileInfo>> {
        self.files.list_files()
    }

    /// 处理一个 RRQ 会话
    async fn handle_request(&self, packet: Vec<u8>, peer: std::net::SocketAddr) {
        self.stats.total_requests.fetch_add(1, Ordering::Relaxed);

        let filename = match parse_rrq(&packet) {
            Ok(name) => name,
            Err(e) => {
                debug!("TFTP 非法请求 (来自 {}): {}", peer, e);
                self.stats.failed_requests.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        debug!("TFTP RRQ 来自 {}: {}", peer, filename);

        match self.serve_file(&filename, peer).await {
            Ok(bytes) => {
                self.stats.success_requests.fetch_add(1, Ordering::Relaxed);
                self.stats.bytes_served.fetch_add(bytes, Ordering::Relaxed);
                info!("TFTP 传输完成: {} -> {} ({} 字节)", filename, peer, bytes);
            }
            Err(e) => {
                self.stats.failed_requests.fetch_add(1, Ordering::Relaxed);
                warn!("TFTP 传输失败: {} -> {}: {}", filename, peer, e);
            }
        }
    }

    /// 分块发送文件内容并等待逐块确认
    async fn serve_file(&self, filename: &str, peer: std::net::SocketAddr) -> Result<u64> {
        let path = self.files.resolve(filename)?;

        // 会话使用临时端口
        let socket = UdpSocket::bind(("0.0.0.0", 0))
            .await
            .map_err(|e| Error::Network(format!("绑定会话端口失败: {e}")))?;
        socket
            .connect(peer)
            .await
            .map_err(|e| Error::Network(format!("连接客户端失败: {e}")))?;

        let content = match tokio::fs::read(&path).await {
            Ok(content) => content,
            Err(e) => {
                let _ = socket
                    .send(&error_packet(1, &format!("file not found: {filename}")))
                    .await;
                return Err(Error::NotFound(format!("{}: {e}", path.display())));
            }
        };

        let mut sent_total: u64 = 0;
        let mut block_num: u16 = 1;
        let mut offset = 0usize;

        loop {
            let end = (offset + BLOCK_SIZE).min(content.len());
            let chunk = &content[offset..end];

            let mut packet = Vec::with_capacity(4 + chunk.len());
            packet.extend_from_slice(&OPCODE_DATA.to_be_bytes());
            packet.extend_from_slice(&block_num.to_be_bytes());
            packet.extend_from_slice(chunk);

            self.send_block_with_retry(&socket, &packet, block_num).await?;
            sent_total += chunk.len() as u64;

            if chunk.len() < BLOCK_SIZE {
                break;
            }
            offset = end;
            block_num = block_num.wrapping_add(1);
        }

        Ok(sent_total)
    }

    /// 发送数据块并等待 ACK，超时重传有限次
    async fn send_block_with_retry(
        &self,
        socket: &UdpSocket,
        packet: &[u8],
        block_num: u16,
    ) -> Result<()> {
        let mut ack_buf = [0u8; 64];
        for attempt in 0..=MAX_RETRANSMITS {
            socket
                .send(packet)
                .await
                .map_err(|e| Error::Network(format!("发送数据块失败: {e}")))?;

            match timeout(self.cfg.session_timeout, socket.recv(&mut ack_buf)).await {
                Ok(Ok(n)) if is_ack_for(&ack_buf[..n], block_num) => return Ok(()),
                Ok(Ok(_)) => continue,
                Ok(Err(e)) => return Err(Error::Network(format!("等待 ACK 失败: {e}"))),
                Err(_) => {
                    debug!("TFTP 块 {} 等待 ACK 超时, 第 {} 次重传", block_num, attempt + 1);
                    continue;
                }
            }
        }
        Err(Error::Network(format!("块 {block_num} 重传耗尽")))
    }
}

/// 解析 RRQ: opcode(2) + filename\0 + mode\0
fn parse_rrq(packet: &[u8]) -> Result<String> {
    if packet.len() < 4 {
        return Err(Error::Validation("报文过短".into()));
    }
    let opcode = u16::from_be_bytes([packet[0], packet[1]]);
    if opcode != OPCODE_RRQ {
        return Err(Error::Validation(format!("不支持的操作码: {opcode}")));
    }
    let rest = &packet[2..];
    let name_end = rest
        .iter()
        .position(|b| *b == 0)
        .ok_or_else(|| Error::Validation("文件名未终止".into()))?;
    let filename = std::str::from_utf8(&rest[..name_end])
        .map_err(|_| Error::Validation("文件名非 UTF-8".into()))?;
    if filename.is_empty() {
        return Err(Error::Validation("文件名为空".into()));
    }
    Ok(filename.to_string())
}

fn is_ack_for(packet: &[u8], block_num: u16) -> bool {
    packet.len() >= 4
        && u16::from_be_bytes([packet[0], packet[1]]) == OPCODE_ACK
        && u16::from_be_bytes([packet[2], packet[3]]) == block_num
}

fn error_packet(code: u16, message: &str) -> Vec<u8> {
    let mut packet = Vec::with_capacity(5 + message.len());
    packet.extend_from_slice(&OPCODE_ERROR.to_be_bytes());
    packet.extend_from_slice(&code.to_be_bytes());
    packet.extend_from_slice(message.as_bytes());
    packet.push(0);
    packet
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rrq_packet(filename: &str) -> Vec<u8> {
        let mut packet = Vec::new();
        packet.extend_from_slice(&OPCODE_RRQ.to_be_bytes());
        packet.extend_from_slice(filename.as_bytes());
        packet.push(0);
        packet.extend_from_slice(b"octet");
        packet.push(0);
        packet
    }

    #[test]
    fn test_parse_rrq() {
        assert_eq!(
            parse_rrq(&rrq_packet("pxelinux.0")).unwrap(),
            "pxelinux.0"
        );
        assert!(parse_rrq(&[0, 2, b'a', 0]).is_err()); // WRQ 不支持
        assert!(parse_rrq(&[0, 1]).is_err());
    }

    #[test]
    fn test_ack_matching() {
        let mut ack = Vec::new();
        ack.extend_from_slice(&OPCODE_ACK.to_be_bytes());
        ack.extend_from_slice(&7u16.to_be_bytes());
        assert!(is_ack_for(&ack, 7));
        assert!(!is_ack_for(&ack, 8));
        assert!(!is_ack_for(&[0, 3, 0, 7], 7));
    }

    #[test]
    fn test_error_packet_shape() {
        let packet = error_packet(1, "file not found: x");
        assert_eq!(u16::from_be_bytes([packet[0], packet[1]]), OPCODE_ERROR);
        assert_eq!(u16::from_be_bytes([packet[2], packet[3]]), 1);
        assert_eq!(*packet.last().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_stats_counting() {
        let tmp = tempfile::TempDir::new().unwrap();
        let server = TftpServer::new(TftpConfig::new(tmp.path())).unwrap();
        // 非法请求计入失败
        server
            .handle_request(vec![0, 9, 0, 0], "127.0.0.1:12345".parse().unwrap())
            .await;
        let stats = server.stats();
        assert_eq!(stats.total_requests, 1);
        assert_eq!(stats.failed_requests, 1);
        assert_eq!(stats.success_requests, 0);
    }
}
