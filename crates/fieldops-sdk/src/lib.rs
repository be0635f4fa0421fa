//! FieldOps SDK - 离线优先的现场作业管理客户端核心
//!
//! 面向工地现场的离线优先数据核心，包括：
//! - 🗂 本地实体库：公司 / 项目 / 任务 / 客户 / 库存，按 id 键控的记录集
//! - 🔁 同步引擎：dirty 即队列、优先级推送、先推后拉、软删除 tombstone
//! - 📅 排期投影：项目级 / 任务级日历事件互斥激活，多日跨度展开
//! - 📡 网络监控：离线→在线跳变自动触发后台同步
//! - ⚙️ 事件系统：同步生命周期与认证失效信号
//! - 🧵 并发安全：单写者 store 线程，网络任务并发、写入串行
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use fieldops_sdk::{FieldOpsConfig, FieldOpsSDK, StaticTokenProvider};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = FieldOpsConfig::builder()
//!         .data_dir("/path/to/data")
//!         .gateway_base_url("https://api.example.com/v1")
//!         .build();
//!
//!     let auth = Arc::new(StaticTokenProvider::new("token", "user-1"));
//!     let sdk = FieldOpsSDK::initialize(config, auth)?;
//!
//!     // 冷启动：订阅网络跳变 + 全量同步
//!     sdk.start().await;
//!
//!     // 离线也能读写；dirty 记录在网络恢复后自动推送
//!     let projects = sdk.storage().projects("company-1").await?;
//!     println!("本地项目数: {}", projects.len());
//!
//!     sdk.shutdown().await;
//!     Ok(())
//! }
//! ```

// 导出核心模块
pub mod auth;
pub mod error;
pub mod events;
pub mod network;
pub mod schedule;
pub mod sdk;
pub mod storage;
pub mod sync;
pub mod version;
pub mod wire;

// 重新导出核心类型，方便使用
pub use auth::{AuthProvider, StaticTokenProvider};
pub use error::{FieldOpsSDKError, Result};
pub use events::{EventBus, SDKEvent};
pub use network::{NetworkMonitor, NetworkStatus, NetworkStatusEvent};
pub use schedule::{recompute_active, should_display};
pub use sdk::{FieldOpsConfig, FieldOpsConfigBuilder, FieldOpsSDK};
pub use storage::dirty::SyncPriority;
pub use storage::entities::{
    AnyRecord, CalendarEvent, Client, Company, EventCategory, EventMode, InventoryItem,
    InventorySnapshot, InventoryTag, InventoryUnit, Project, ProjectStatus, ProjectTask, SubClient,
    SyncMeta, TaskStatus, TaskType, ThresholdStatus, User,
};
pub use storage::StorageManager;
pub use sync::{EntityKind, SyncMode, SyncOrchestrator, SyncReport, SyncScope, SyncState, SYNC_ORDER};
pub use wire::{RemoteGateway, WireRecord};
