/// 区域客户端全局状态

use std::path::PathBuf;
use std::sync::Arc;

use common::{Store, Tunables};

use crate::dhcp::DhcpServer;
use crate::kickstart::KickstartGenerator;
use crate::pxe::PxeGenerator;
use crate::selector::OperationSelector;
use crate::tftp::TftpServer;

/// 区域客户端状态
///
/// DHCP / TFTP / PXE 为可选子系统，未启用时相关接口返回 503
#[derive(Clone)]
pub struct RegionalState {
    pub idc: String,
    pub store: Store,
    pub server_ip: String,
    pub api_port: u16,
    pub static_root: PathBuf,
    pub tunables: Arc<Tunables>,
    pub dhcp: Option<Arc<DhcpServer>>,
    pub tftp: Option<Arc<TftpServer>>,
    pub pxe: Option<Arc<PxeGenerator>>,
    pub kickstart: Arc<KickstartGenerator>,
    pub selector: Arc<OperationSelector>,
}

impl RegionalState {
    /// 区域客户端对外基础地址
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.server_ip, self.api_port)
    }

    /// Agent 访问的 API 基础地址
    pub fn api_base_url(&self) -> String {
        format!("{}/api/v1", self.base_url())
    }
}
