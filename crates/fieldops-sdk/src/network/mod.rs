//! 网络状态监控
//!
//! 平台层（移动端 reachability / 桌面端 NWPathMonitor 等价物）把状态变化
//! 推进来，本模块广播给订阅方。编排层只关心一件事：
//! 离线 → 在线 的跳变触发一次后台同步；其余跳变不触发。

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::info;

/// 网络状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkStatus {
    /// 在线
    Online,
    /// 离线
    Offline,
    /// 网络受限（可达性差，视同不在线）
    Limited,
}

impl NetworkStatus {
    pub fn is_online(self) -> bool {
        matches!(self, NetworkStatus::Online)
    }
}

/// 网络状态变化事件
#[derive(Debug, Clone)]
pub struct NetworkStatusEvent {
    pub old_status: NetworkStatus,
    pub new_status: NetworkStatus,
    pub timestamp: i64,
}

impl NetworkStatusEvent {
    /// 是否「恢复在线」跳变（唯一触发后台同步的跳变）
    pub fn is_reconnect(&self) -> bool {
        !self.old_status.is_online() && self.new_status.is_online()
    }
}

/// 网络监控器：平台层推状态，订阅方收跳变
#[derive(Debug)]
pub struct NetworkMonitor {
    status_sender: broadcast::Sender<NetworkStatusEvent>,
    current_status: Arc<RwLock<NetworkStatus>>,
}

impl NetworkMonitor {
    /// 初始状态视为离线，首次上报 Online 会产生一次恢复跳变
    pub fn new() -> Self {
        let (status_sender, _) = broadcast::channel(64);
        Self {
            status_sender,
            current_status: Arc::new(RwLock::new(NetworkStatus::Offline)),
        }
    }

    pub async fn current_status(&self) -> NetworkStatus {
        *self.current_status.read().await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NetworkStatusEvent> {
        self.status_sender.subscribe()
    }

    /// 平台层上报状态；相同状态去抖（不广播）
    pub async fn update_status(&self, new_status: NetworkStatus) {
        let old_status = {
            let mut current = self.current_status.write().await;
            let old = *current;
            if old == new_status {
                return;
            }
            *current = new_status;
            old
        };

        info!(?old_status, ?new_status, "网络状态变化");
        let _ = self.status_sender.send(NetworkStatusEvent {
            old_status,
            new_status,
            timestamp: Utc::now().timestamp_millis(),
        });
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_transition_broadcast_and_dedup() {
        let monitor = NetworkMonitor::new();
        let mut rx = monitor.subscribe();

        monitor.update_status(NetworkStatus::Online).await;
        let event = rx.recv().await.unwrap();
        assert_eq!(event.old_status, NetworkStatus::Offline);
        assert_eq!(event.new_status, NetworkStatus::Online);
        assert!(event.is_reconnect());

        // 相同状态不重复广播
        monitor.update_status(NetworkStatus::Online).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(monitor.current_status().await, NetworkStatus::Online);
    }

    #[tokio::test]
    async fn test_only_offline_to_online_counts_as_reconnect() {
        let monitor = NetworkMonitor::new();
        let mut rx = monitor.subscribe();

        monitor.update_status(NetworkStatus::Online).await;
        assert!(rx.recv().await.unwrap().is_reconnect());

        // 在线 → 受限：不是恢复
        monitor.update_status(NetworkStatus::Limited).await;
        assert!(!rx.recv().await.unwrap().is_reconnect());

        // 受限 → 在线：算恢复（受限视同不在线）
        monitor.update_status(NetworkStatus::Online).await;
        assert!(rx.recv().await.unwrap().is_reconnect());

        // 在线 → 离线：不是恢复
        monitor.update_status(NetworkStatus::Offline).await;
        assert!(!rx.recv().await.unwrap().is_reconnect());
    }
}
