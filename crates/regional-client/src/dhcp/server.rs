/// DHCPv4 服务端
///
/// 监听 UDP/67，支持 PXE 引导选项。
/// 读循环带读超时逐包处理，后台任务每分钟回收过期租约

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use dhcproto::v4::{DhcpOption, Message, MessageType, Opcode, OptionCode};
use dhcproto::{Decodable, Decoder, Encodable, Encoder};
use tokio::net::UdpSocket;
use tokio::sync::{watch, RwLock};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use common::{Error, Result};

use super::leases::{DhcpTables, Lease, StaticBinding};

/// DHCP 服务配置
#[derive(Debug, Clone)]
pub struct DhcpConfig {
    pub interface: String,
    pub server_ip: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub dns_servers: Vec<Ipv4Addr>,
    pub tftp_server: Ipv4Addr,
    pub boot_file: String,
    pub lease_time: Duration,
    pub start_ip: Ipv4Addr,
    pub end_ip: Ipv4Addr,
    pub netmask: Ipv4Addr,
}

/// DHCP 服务端
pub struct DhcpServer {
    cfg: DhcpConfig,
    tables: Arc<RwLock<DhcpTables>>,
}

impl DhcpServer {
    pub fn new(cfg: DhcpConfig) -> Result<Self> {
        if u32::from(cfg.start_ip) > u32::from(cfg.end_ip) {
            return Err(Error::Validation(format!(
                "地址池起始大于结束: {} > {}",
                cfg.start_ip, cfg.end_ip
            )));
        }
        Ok(Self {
            cfg,
            tables: Arc::new(RwLock::new(DhcpTables::new())),
        })
    }

    /// 绑定套接字并启动读循环与租约回收任务
    pub async fn start(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let socket = UdpSocket::bind(("0.0.0.0", 67))
            .await
            .map_err(|e| Error::Network(format!("绑定 UDP/67 失败: {e}")))?;
        socket
            .set_broadcast(true)
            .map_err(|e| Error::Network(format!("设置广播失败: {e}")))?;
        let socket = Arc::new(socket);

        info!(
            "DHCP 服务已启动: 接口={}, 地址池={}-{}, 网关={}, TFTP={}",
            self.cfg.interface, self.cfg.start_ip, self.cfg.end_ip, self.cfg.gateway, self.cfg.tftp_server
        );

        // 读循环
        let server = self.clone();
        let reader_socket = socket.clone();
        let mut reader_shutdown = shutdown.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            loop {
                tokio::select! {
                    _ = reader_shutdown.changed() => {
                        info!("DHCP 读循环退出");
                        return;
                    }
                    // 读超时属正常情况，用于周期性检查退出信号
                    recv = timeout(Duration::from_secs(1), reader_socket.recv_from(&mut buf)) => {
                        let (n, peer) = match recv {
                            Ok(Ok(pair)) => pair,
                            Ok(Err(e)) => {
                                warn!("DHCP 读取失败: {}", e);
                                continue;
                            }
                            Err(_) => continue,
                        };
                        debug!("DHCP 收到 {} 字节, 来自 {}", n, peer);
                        if let Err(e) = server.handle_packet(&reader_socket, &buf[..n]).await {
                            warn!("DHCP 报文处理失败: {}", e);
                        }
                    }
                }
            }
        });

        // 过期租约回收
        let tables = self.tables.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(60));
            loop {
                tokio::select! {
                    _ = shutdown.changed() => return,
                    _ = ticker.tick() => {
                        let reaped = tables.write().await.reap_expired();
                        if reaped > 0 {
                            info!("DHCP 回收过期租约 {} 个", reaped);
                        }
                    }
                }
            }
        });

        Ok(())
    }

    /// 处理单个 DHCP 报文
    async fn handle_packet(&self, socket: &UdpSocket, data: &[u8]) -> Result<()> {
        let msg = Message::decode(&mut Decoder::new(data))
            .map_err(|e| Error::Validation(format!("DHCP 报文解码失败: {e}")))?;

        if msg.opcode() != Opcode::BootRequest {
            return Ok(());
        }

        let mac = chaddr_to_mac(msg.chaddr());
        let Some(msg_type) = msg.opts().msg_type() else {
            return Err(Error::Validation("DHCP 报文缺少消息类型".into()));
        };

        match msg_type {
            MessageType::Discover => self.handle_discover(socket, &msg, &mac).await,
            MessageType::Request => self.handle_request(socket, &msg, &mac).await,
            MessageType::Release => self.handle_release(&msg, &mac).await,
            MessageType::Decline => self.handle_decline(&msg, &mac).await,
            _ => Ok(()),
        }
    }

    /// DISCOVER: 静态绑定优先，其次续期/池内分配，回 OFFER
    async fn handle_discover(&self, socket: &UdpSocket, msg: &Message, mac: &str) -> Result<()> {
        debug!("DHCP DISCOVER 来自 {}", mac);

        let (offered_ip, boot_file) = {
            let mut tables = self.tables.write().await;
            if let Some(binding) = tables.static_binding(mac) {
                let boot = if binding.boot_file.is_empty() {
                    self.cfg.boot_file.clone()
                } else {
                    binding.boot_file.clone()
                };
                debug!("DHCP 命中静态绑定: {} -> {}", mac, binding.ip);
                (binding.ip, boot)
            } else {
                let ip = tables.allocate(mac, self.cfg.start_ip, self.cfg.end_ip, self.cfg.lease_time)?;
                debug!("DHCP 池内分配: {} -> {}", mac, ip);
                (ip, self.cfg.boot_file.clone())
            }
        };

        let reply = self.build_reply(msg, MessageType::Offer, Some(offered_ip), &boot_file);
        self.send_reply(socket, &reply).await?;
        info!("DHCP OFFER {} -> {}", offered_ip, mac);
        Ok(())
    }

    /// REQUEST: 请求的 IP 必须与静态绑定或现有租约一致，否则 NAK
    async fn handle_request(&self, socket: &UdpSocket, msg: &Message, mac: &str) -> Result<()> {
        let requested = requested_ip(msg);
        debug!("DHCP REQUEST 来自 {}, 请求 {:?}", mac, requested);

        let Some(requested) = requested else {
            return self.send_nak(socket, msg).await;
        };

        let (assigned, boot_file) = {
            let tables = self.tables.read().await;
            match tables.static_binding(mac) {
                Some(binding) if binding.ip == requested => {
                    let boot = if binding.boot_file.is_empty() {
                        self.cfg.boot_file.clone()
                    } else {
                        binding.boot_file.clone()
                    };
                    (Some(binding.ip), boot)
                }
                _ if tables.is_allocated(mac, requested) => {
                    (Some(requested), self.cfg.boot_file.clone())
                }
                _ => (None, String::new()),
            }
        };

        match assigned {
            Some(ip) => {
                let reply = self.build_reply(msg, MessageType::Ack, Some(ip), &boot_file);
                self.send_reply(socket, &reply).await?;
                info!("DHCP ACK {} -> {}", ip, mac);
                Ok(())
            }
            None => {
                info!("DHCP NAK -> {} (请求 {} 无效)", mac, requested);
                self.send_nak(socket, msg).await
            }
        }
    }

    async fn handle_release(&self, msg: &Message, mac: &str) -> Result<()> {
        let ip = msg.ciaddr();
        info!("DHCP RELEASE 来自 {}: {}", mac, ip);
        self.tables.write().await.release(mac, ip);
        Ok(())
    }

    async fn handle_decline(&self, msg: &Message, mac: &str) -> Result<()> {
        if let Some(ip) = requested_ip(msg) {
            info!("DHCP DECLINE 来自 {}: {}", mac, ip);
            self.tables.write().await.release(mac, ip);
        }
        Ok(())
    }

    /// 构造 OFFER/ACK/NAK 应答
    fn build_reply(
        &self,
        req: &Message,
        msg_type: MessageType,
        yiaddr: Option<Ipv4Addr>,
        boot_file: &str,
    ) -> Message {
        let mut reply = Message::default();
        reply
            .set_opcode(Opcode::BootReply)
            .set_xid(req.xid())
            .set_flags(req.flags())
            .set_giaddr(req.giaddr())
            .set_chaddr(req.chaddr());

        reply.opts_mut().insert(DhcpOption::MessageType(msg_type));
        reply
            .opts_mut()
            .insert(DhcpOption::ServerIdentifier(self.cfg.server_ip));

        if msg_type == MessageType::Nak {
            return reply;
        }

        if let Some(ip) = yiaddr {
            reply.set_yiaddr(ip);
        }
        reply.set_siaddr(self.cfg.tftp_server);
        reply.set_fname_str(boot_file);
        reply.set_sname_str(self.cfg.tftp_server.to_string());

        reply
            .opts_mut()
            .insert(DhcpOption::SubnetMask(self.cfg.netmask));
        reply
            .opts_mut()
            .insert(DhcpOption::Router(vec![self.cfg.gateway]));
        reply
            .opts_mut()
            .insert(DhcpOption::DomainNameServer(self.cfg.dns_servers.clone()));
        reply
            .opts_mut()
            .insert(DhcpOption::AddressLeaseTime(
                self.cfg.lease_time.as_secs() as u32
            ));
        // PXE 引导: TFTP 服务器名(66)与引导文件名(67)
        reply
            .opts_mut()
            .insert(DhcpOption::TFTPServerName(self.cfg.tftp_server.to_string().into()));
        reply
            .opts_mut()
            .insert(DhcpOption::BootfileName(boot_file.to_string().into()));

        reply
    }

    /// 发送应答，失败只记录不重试
    async fn send_reply(&self, socket: &UdpSocket, reply: &Message) -> Result<()> {
        let mut buf = Vec::with_capacity(576);
        let mut encoder = Encoder::new(&mut buf);
        reply
            .encode(&mut encoder)
            .map_err(|e| Error::Internal(format!("DHCP 应答编码失败: {e}")))?;

        if let Err(e) = socket.send_to(&buf, (Ipv4Addr::BROADCAST, 68)).await {
            error!("DHCP 应答发送失败: {}", e);
        }
        Ok(())
    }

    async fn send_nak(&self, socket: &UdpSocket, req: &Message) -> Result<()> {
        let reply = self.build_reply(req, MessageType::Nak, None, "");
        self.send_reply(socket, &reply).await
    }

    /// 添加静态绑定（任务进入 approved 时由编排器调用）
    pub async fn add_static_binding(
        &self,
        mac: &str,
        ip: Ipv4Addr,
        hostname: &str,
        boot_file: &str,
    ) -> Result<()> {
        if !common::utils::validate_mac_address(mac) {
            return Err(Error::Validation(format!("非法 MAC 地址: {mac}")));
        }
        self.tables.write().await.insert_static(StaticBinding {
            mac: mac.to_string(),
            ip,
            hostname: hostname.to_string(),
            boot_file: boot_file.to_string(),
        });
        info!("DHCP 静态绑定已添加: {} -> {} (boot: {})", mac, ip, boot_file);
        Ok(())
    }

    /// 移除静态绑定（装机完成清理时调用）
    pub async fn remove_static_binding(&self, mac: &str) {
        self.tables.write().await.remove_static(mac);
        info!("DHCP 静态绑定已移除: {}", mac);
    }

    pub async fn leases(&self) -> Vec<Lease> {
        self.tables.read().await.leases()
    }

    pub async fn static_bindings(&self) -> Vec<StaticBinding> {
        self.tables.read().await.static_bindings()
    }
}

/// chaddr 前 6 字节转 aa:bb:cc:dd:ee:ff
fn chaddr_to_mac(chaddr: &[u8]) -> String {
    chaddr
        .iter()
        .take(6)
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// 从选项或 ciaddr 中取请求的 IP
fn requested_ip(msg: &Message) -> Option<Ipv4Addr> {
    if let Some(DhcpOption::RequestedIpAddress(ip)) =
        msg.opts().get(OptionCode::RequestedIpAddress)
    {
        return Some(*ip);
    }
    let ciaddr = msg.ciaddr();
    if !ciaddr.is_unspecified() {
        return Some(ciaddr);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> DhcpConfig {
        DhcpConfig {
            interface: "eth1".into(),
            server_ip: "192.168.100.1".parse().unwrap(),
            gateway: "192.168.100.1".parse().unwrap(),
            dns_servers: vec!["192.168.100.1".parse().unwrap(), "8.8.8.8".parse().unwrap()],
            tftp_server: "192.168.100.1".parse().unwrap(),
            boot_file: "pxelinux.0".into(),
            lease_time: Duration::from_secs(86400),
            start_ip: "192.168.100.10".parse().unwrap(),
            end_ip: "192.168.100.200".parse().unwrap(),
            netmask: "255.255.255.0".parse().unwrap(),
        }
    }

    #[test]
    fn test_chaddr_to_mac() {
        let chaddr = [0x00u8, 0x1a, 0x2b, 0x3c, 0x4d, 0x5e, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(chaddr_to_mac(&chaddr), "00:1a:2b:3c:4d:5e");
    }

    #[test]
    fn test_invalid_pool_rejected() {
        let mut cfg = sample_config();
        cfg.start_ip = "192.168.100.200".parse().unwrap();
        cfg.end_ip = "192.168.100.10".parse().unwrap();
        assert!(DhcpServer::new(cfg).is_err());
    }

    #[test]
    fn test_offer_contains_pxe_options() {
        let server = DhcpServer::new(sample_config()).unwrap();

        let mut req = Message::default();
        req.set_opcode(Opcode::BootRequest)
            .set_xid(0x1234)
            .set_chaddr(&[0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
        req.opts_mut()
            .insert(DhcpOption::MessageType(MessageType::Discover));

        let ip: Ipv4Addr = "192.168.100.50".parse().unwrap();
        let reply = server.build_reply(&req, MessageType::Offer, Some(ip), "pxelinux.0");

        assert_eq!(reply.opcode(), Opcode::BootReply);
        assert_eq!(reply.xid(), 0x1234);
        assert_eq!(reply.yiaddr(), ip);
        assert!(matches!(
            reply.opts().get(OptionCode::MessageType),
            Some(DhcpOption::MessageType(MessageType::Offer))
        ));
        assert!(reply.opts().get(OptionCode::ServerIdentifier).is_some());
        assert!(reply.opts().get(OptionCode::Router).is_some());
        assert!(reply.opts().get(OptionCode::SubnetMask).is_some());
        assert!(reply.opts().get(OptionCode::DomainNameServer).is_some());
        assert!(reply.opts().get(OptionCode::AddressLeaseTime).is_some());
        assert!(reply.opts().get(OptionCode::TFTPServerName).is_some());
        assert!(reply.opts().get(OptionCode::BootfileName).is_some());
    }

    #[test]
    fn test_nak_is_minimal() {
        let server = DhcpServer::new(sample_config()).unwrap();
        let mut req = Message::default();
        req.set_opcode(Opcode::BootRequest)
            .set_chaddr(&[0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
        req.opts_mut()
            .insert(DhcpOption::MessageType(MessageType::Request));

        let reply = server.build_reply(&req, MessageType::Nak, None, "");
        assert!(matches!(
            reply.opts().get(OptionCode::MessageType),
            Some(DhcpOption::MessageType(MessageType::Nak))
        ));
        assert!(reply.opts().get(OptionCode::BootfileName).is_none());
    }
}
