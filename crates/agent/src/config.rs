/// 配置管理

use common::Tunables;

#[derive(Debug, Clone)]
pub struct Config {
    /// 区域客户端地址
    pub regional_url: String,
    pub tunables: Tunables,
}

impl Config {
    /// 从环境变量加载配置
    pub fn from_env() -> anyhow::Result<Self> {
        let regional_url = std::env::var("REGIONAL_CLIENT_URL")
            .unwrap_or_else(|_| "http://localhost:8081".to_string());

        Ok(Self {
            regional_url,
            tunables: Tunables::default(),
        })
    }
}
