/// LPM-OS 装机平台 - 公共库
///
/// 提供控制面、区域客户端与 Agent 共享的数据模型、错误处理、
/// etcd 存储客户端、键空间构造与工具函数

pub mod errors;
pub mod keys;
pub mod models;
pub mod settings;
pub mod store;
pub mod utils;

// 重新导出常用类型
pub use errors::{Error, Result};
pub use settings::Tunables;
pub use store::{Store, StoreConfig, WatchEvent, WatchEventKind};
