/// 区域客户端 API 访问
///
/// 排队轮询用 5 秒短超时抗网络抖动，其余请求 10 秒；
/// 5xx 与网络错误一律视为可重试

use reqwest::StatusCode;
use serde_json::json;
use tracing::{debug, warn};

use common::models::{
    AgentReportRequest, HardwareConfigResponse, InstallQueueResponse, NextOperation,
    OperationCompleteRequest, OsInstallConfig,
};
use common::{Error, Result, Tunables};

/// 硬件上报的结果
#[derive(Debug)]
pub enum ReportOutcome {
    /// 已写入任务
    Accepted,
    /// 暂无匹配任务，稍后重试
    NoTask { retry_after: u64 },
}

/// 区域客户端 HTTP 访问器
pub struct RegionalClient {
    base_url: String,
    http: reqwest::Client,
    queue_http: reqwest::Client,
}

impl RegionalClient {
    pub fn new(base_url: impl Into<String>, tunables: &Tunables) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(tunables.http_timeout)
            .build()
            .map_err(|e| Error::Network(format!("构建 HTTP 客户端失败: {e}")))?;
        let queue_http = reqwest::Client::builder()
            .timeout(tunables.queue_poll_http_timeout)
            .build()
            .map_err(|e| Error::Network(format!("构建 HTTP 客户端失败: {e}")))?;

        Ok(Self {
            base_url: base_url.into(),
            http,
            queue_http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    /// POST /report
    pub async fn report_hardware(&self, req: &AgentReportRequest) -> Result<ReportOutcome> {
        let resp = self
            .http
            .post(self.url("/report"))
            .json(req)
            .send()
            .await
            .map_err(|e| Error::Network(format!("硬件上报失败: {e}")))?;

        match resp.status() {
            StatusCode::OK => Ok(ReportOutcome::Accepted),
            StatusCode::NOT_FOUND => {
                let body: serde_json::Value = resp.json().await.unwrap_or_default();
                let retry_after = body
                    .get("retry_after")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(10);
                Ok(ReportOutcome::NoTask { retry_after })
            }
            status => {
                let body = resp.text().await.unwrap_or_default();
                Err(Error::Network(format!("硬件上报返回 {status}: {body}")))
            }
        }
    }

    /// POST /device/isInInstallQueue
    pub async fn is_in_install_queue(&self, sn: &str) -> Result<bool> {
        let resp = self
            .queue_http
            .post(self.url("/device/isInInstallQueue"))
            .json(&json!({ "sn": sn }))
            .send()
            .await
            .map_err(|e| Error::Network(format!("排队查询失败: {e}")))?;

        if !resp.status().is_success() {
            return Err(Error::Network(format!(
                "排队查询返回 {}",
                resp.status()
            )));
        }
        let queue: InstallQueueResponse = resp
            .json()
            .await
            .map_err(|e| Error::Network(format!("排队应答解析失败: {e}")))?;
        Ok(queue.result)
    }

    /// POST /device/getNextOperation
    pub async fn get_next_operation(&self, sn: &str) -> Result<NextOperation> {
        let resp = self
            .http
            .post(self.url("/device/getNextOperation"))
            .json(&json!({ "sn": sn }))
            .send()
            .await
            .map_err(|e| Error::Network(format!("获取下一步操作失败: {e}")))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!("任务不存在: {sn}")));
        }
        if !resp.status().is_success() {
            return Err(Error::Network(format!(
                "获取下一步操作返回 {}",
                resp.status()
            )));
        }
        resp.json()
            .await
            .map_err(|e| Error::Network(format!("操作应答解析失败: {e}")))
    }

    /// POST /device/getHardwareConfig
    pub async fn get_hardware_config(&self, sn: &str) -> Result<HardwareConfigResponse> {
        let resp = self
            .http
            .post(self.url("/device/getHardwareConfig"))
            .json(&json!({ "sn": sn }))
            .send()
            .await
            .map_err(|e| Error::Network(format!("获取硬件配置失败: {e}")))?;

        if !resp.status().is_success() {
            return Err(Error::Network(format!(
                "获取硬件配置返回 {}",
                resp.status()
            )));
        }
        resp.json()
            .await
            .map_err(|e| Error::Network(format!("硬件配置解析失败: {e}")))
    }

    /// POST /device/getOSInstallConfig
    pub async fn get_os_install_config(&self, sn: &str) -> Result<OsInstallConfig> {
        let resp = self
            .http
            .post(self.url("/device/getOSInstallConfig"))
            .json(&json!({ "sn": sn }))
            .send()
            .await
            .map_err(|e| Error::Network(format!("获取安装配置失败: {e}")))?;

        if !resp.status().is_success() {
            return Err(Error::Network(format!(
                "获取安装配置返回 {}",
                resp.status()
            )));
        }
        resp.json()
            .await
            .map_err(|e| Error::Network(format!("安装配置解析失败: {e}")))
    }

    /// POST /device/operationComplete，失败只记录
    pub async fn operation_complete(&self, sn: &str, operation: &str, success: bool, message: &str) {
        let req = OperationCompleteRequest {
            sn: sn.to_string(),
            operation: operation.to_string(),
            success,
            message: message.to_string(),
        };

        match self
            .http
            .post(self.url("/device/operationComplete"))
            .json(&req)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => {
                debug!("操作 {} 回报完成 (成功: {})", operation, success);
            }
            Ok(resp) => {
                warn!("操作回报返回 {}", resp.status());
            }
            Err(e) => {
                warn!("操作回报失败: {}", e);
            }
        }
    }
}
