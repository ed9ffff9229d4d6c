use thiserror::Error;

/// 统一错误类型
#[derive(Error, Debug)]
pub enum Error {
    #[error("键不存在: {0}")]
    NotFound(String),

    #[error("版本冲突: {0}")]
    Conflict(String),

    #[error("参数校验失败: {0}")]
    Validation(String),

    #[error("存储错误: {0}")]
    Store(String),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("网络错误: {0}")]
    Network(String),

    #[error("子系统未启用: {0}")]
    SubsystemDisabled(String),

    #[error("地址池耗尽: {0}")]
    Exhausted(String),

    #[error("配置错误: {0}")]
    Config(String),

    #[error("内部错误: {0}")]
    Internal(String),

    #[error("其他错误: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<etcd_client::Error> for Error {
    fn from(e: etcd_client::Error) -> Self {
        Error::Store(e.to_string())
    }
}

impl Error {
    /// 判断是否为"键不存在"错误
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

/// 统一结果类型
pub type Result<T> = std::result::Result<T, Error>;
