/// 大盘广播中心
///
/// 每个浏览器会话注册一个有界发送缓冲（256 条），
/// 缓冲写满的慢客户端直接断开，广播永不阻塞监听循环

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use common::models::{HardwareInfo, Task};
use common::utils::generate_id;

/// 客户端发送缓冲上限
const CLIENT_BUFFER: usize = 256;

/// 大盘消息
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DashboardMessage {
    /// 合并任务记录的整体更新
    TaskUpdate { idc: String, sn: String, task: Box<Task> },
    /// 旧版进度帧
    Progress {
        task_id: String,
        stage: String,
        percentage: i32,
        message: String,
    },
    /// 旧版状态帧
    Status { task_id: String, status: String },
    /// 旧版硬件帧
    Hardware {
        task_id: String,
        hardware: Box<HardwareInfo>,
    },
}

/// 广播中心
#[derive(Clone)]
pub struct DashboardHub {
    sessions: Arc<RwLock<HashMap<String, mpsc::Sender<String>>>>,
}

impl DashboardHub {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    async fn register(&self, session_id: String, sender: mpsc::Sender<String>) {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session_id.clone(), sender);
        info!("大盘会话已注册: {} (当前 {} 个)", session_id, sessions.len());
    }

    async fn unregister(&self, session_id: &str) {
        let mut sessions = self.sessions.write().await;
        if sessions.remove(session_id).is_some() {
            info!("大盘会话已注销: {} (当前 {} 个)", session_id, sessions.len());
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// 向所有会话广播一条消息
    ///
    /// 发送失败（缓冲满或连接关闭）的会话被移除
    pub async fn broadcast(&self, message: &DashboardMessage) -> usize {
        let encoded = match serde_json::to_string(message) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!("大盘消息序列化失败: {}", e);
                return 0;
            }
        };

        let mut stale = Vec::new();
        let mut delivered = 0;
        {
            let sessions = self.sessions.read().await;
            for (session_id, sender) in sessions.iter() {
                match sender.try_send(encoded.clone()) {
                    Ok(_) => delivered += 1,
                    Err(_) => {
                        warn!("大盘会话 {} 发送缓冲已满, 即将断开", session_id);
                        stale.push(session_id.clone());
                    }
                }
            }
        }

        if !stale.is_empty() {
            let mut sessions = self.sessions.write().await;
            for session_id in stale {
                sessions.remove(&session_id);
            }
        }

        delivered
    }
}

impl Default for DashboardHub {
    fn default() -> Self {
        Self::new()
    }
}

/// WebSocket 升级处理器
pub async fn handle_dashboard_websocket(
    ws: WebSocketUpgrade,
    State(state): State<crate::app_state::AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_session(socket, state))
}

/// 单个大盘会话
async fn handle_session(socket: WebSocket, state: crate::app_state::AppState) {
    let session_id = generate_id();
    info!("新的大盘 WebSocket 连接: {}", session_id);

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(CLIENT_BUFFER);

    state.hub.register(session_id.clone(), tx).await;

    // 发送任务
    let mut send_task = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if ws_sender.send(WsMessage::Text(text)).await.is_err() {
                break;
            }
        }
    });

    // 接收任务，只响应心跳
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(WsMessage::Text(text)) => {
                    debug!("收到大盘消息: {}", text);
                }
                Ok(WsMessage::Close(_)) | Err(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.hub.unregister(&session_id).await;
    info!("大盘连接已关闭: {}", session_id);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_counts_delivered() {
        let hub = DashboardHub::new();
        let (tx1, mut rx1) = mpsc::channel(CLIENT_BUFFER);
        let (tx2, _rx2) = mpsc::channel(CLIENT_BUFFER);
        hub.register("s1".into(), tx1).await;
        hub.register("s2".into(), tx2).await;

        let message = DashboardMessage::Status {
            task_id: "t-1".into(),
            status: "installing".into(),
        };
        assert_eq!(hub.broadcast(&message).await, 2);

        let received = rx1.recv().await.unwrap();
        assert!(received.contains("\"type\":\"status\""));
        assert!(received.contains("\"installing\""));
    }

    #[tokio::test]
    async fn test_full_buffer_disconnects_client() {
        let hub = DashboardHub::new();
        // 容量 1 且无人消费, 第二条必然失败
        let (tx, _rx) = mpsc::channel(1);
        hub.register("slow".into(), tx).await;

        let message = DashboardMessage::Status {
            task_id: "t-1".into(),
            status: "pending".into(),
        };
        assert_eq!(hub.broadcast(&message).await, 1);
        assert_eq!(hub.broadcast(&message).await, 0);
        assert_eq!(hub.session_count().await, 0);
    }
}
