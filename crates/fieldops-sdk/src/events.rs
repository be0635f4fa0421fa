//! 事件系统 - 同步生命周期与状态位的对外出口
//!
//! 同步失败默认静默（UI 显示最后一次成功的本地状态），对外只暴露：
//! - 同步生命周期事件（开始 / 完成 / 失败）
//! - 认证失效信号（唯一必须打断用户的情况）
//! - 网络状态跳变转发
//!
//! 广播语义：无订阅者时事件直接丢弃，不缓存。

use chrono::Utc;
use tokio::sync::broadcast;

use crate::network::NetworkStatus;
use crate::sync::{SyncMode, SyncReport};

/// SDK 事件
#[derive(Debug, Clone)]
pub enum SDKEvent {
    /// 一轮同步开始
    SyncStarted { mode: SyncMode, timestamp: i64 },
    /// 一轮同步结束（包含部分失败的轮次；细节在 report 里）
    SyncFinished { report: SyncReport, timestamp: i64 },
    /// 一轮同步整体失败（启动失败等；单条记录失败不算）
    SyncFailed {
        mode: SyncMode,
        error: String,
        timestamp: i64,
    },
    /// 认证失效：同步已停止，等待宿主应用重新登录
    AuthRequired { timestamp: i64 },
    /// 网络状态跳变（转发自 NetworkMonitor）
    NetworkStatusChanged {
        old_status: NetworkStatus,
        new_status: NetworkStatus,
        timestamp: i64,
    },
}

/// 事件总线（Clone 共享同一底层 channel）
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SDKEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SDKEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: SDKEvent) {
        // 没有订阅者不算错误
        let _ = self.sender.send(event);
    }

    pub fn emit_sync_started(&self, mode: SyncMode) {
        self.emit(SDKEvent::SyncStarted {
            mode,
            timestamp: Utc::now().timestamp_millis(),
        });
    }

    pub fn emit_sync_finished(&self, report: SyncReport) {
        self.emit(SDKEvent::SyncFinished {
            report,
            timestamp: Utc::now().timestamp_millis(),
        });
    }

    pub fn emit_sync_failed(&self, mode: SyncMode, error: String) {
        self.emit(SDKEvent::SyncFailed {
            mode,
            error,
            timestamp: Utc::now().timestamp_millis(),
        });
    }

    pub fn emit_auth_required(&self) {
        self.emit(SDKEvent::AuthRequired {
            timestamp: Utc::now().timestamp_millis(),
        });
    }

    pub fn emit_network_changed(&self, old_status: NetworkStatus, new_status: NetworkStatus) {
        self.emit(SDKEvent::NetworkStatusChanged {
            old_status,
            new_status,
            timestamp: Utc::now().timestamp_millis(),
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(128)
    }
}
