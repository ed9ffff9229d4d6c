/// 大盘 WebSocket

mod hub;

pub use hub::{handle_dashboard_websocket, DashboardHub, DashboardMessage};
