//! SDK 顶层装配
//!
//! `FieldOpsSDK` 在启动时构建一次，把实体库、同步编排器、网络监控、
//! 事件总线装配到一起，按引用交给调用方 —— 没有全局单例。
//!
//! 同步触发面（与并发模型一致）：
//! - 冷启动 / 回前台：全量同步
//! - 网络 离线→在线：后台同步
//! - 高优先级本地变更（状态流转）：落库后机会性后台同步
//! - 进行中的同步使重叠触发直接被忽略

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::auth::AuthProvider;
use crate::error::{FieldOpsSDKError, Result};
use crate::events::{EventBus, SDKEvent};
use crate::network::NetworkMonitor;
use crate::storage::entities::ProjectStatus;
use crate::storage::StorageManager;
use crate::sync::SyncOrchestrator;
use crate::version::SDK_VERSION;
use crate::wire::http_gateway::HttpGateway;
use crate::wire::RemoteGateway;

/// SDK 配置
#[derive(Debug, Clone)]
pub struct FieldOpsConfig {
    /// 数据存储目录（SQLite 库所在）
    pub data_dir: PathBuf,
    /// 远端网关 base URL；不配则只能用 `initialize_with_gateway` 注入
    pub gateway_base_url: Option<String>,
    /// 单次网络请求超时（秒）
    pub http_timeout_secs: u64,
    /// 事件总线容量
    pub event_capacity: usize,
}

impl Default for FieldOpsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./fieldops-data"),
            gateway_base_url: None,
            http_timeout_secs: 20,
            event_capacity: 128,
        }
    }
}

impl FieldOpsConfig {
    pub fn builder() -> FieldOpsConfigBuilder {
        FieldOpsConfigBuilder::new()
    }
}

pub struct FieldOpsConfigBuilder {
    config: FieldOpsConfig,
}

impl FieldOpsConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: FieldOpsConfig::default(),
        }
    }

    pub fn data_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.data_dir = path.as_ref().to_path_buf();
        self
    }

    pub fn gateway_base_url<S: Into<String>>(mut self, url: S) -> Self {
        self.config.gateway_base_url = Some(url.into());
        self
    }

    pub fn http_timeout_secs(mut self, secs: u64) -> Self {
        self.config.http_timeout_secs = secs;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity;
        self
    }

    pub fn build(self) -> FieldOpsConfig {
        self.config
    }
}

impl Default for FieldOpsConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// SDK 顶层对象
pub struct FieldOpsSDK {
    config: FieldOpsConfig,
    storage: StorageManager,
    orchestrator: Arc<SyncOrchestrator>,
    events: EventBus,
    monitor: Arc<NetworkMonitor>,
    network_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl FieldOpsSDK {
    /// 常规初始化：HTTP 网关 + 注入的认证协作方
    pub fn initialize(config: FieldOpsConfig, auth: Arc<dyn AuthProvider>) -> Result<Arc<Self>> {
        let base_url = config.gateway_base_url.clone().ok_or_else(|| {
            FieldOpsSDKError::InvalidArgument("缺少 gateway_base_url 配置".to_string())
        })?;
        let gateway = Arc::new(HttpGateway::with_timeout(
            base_url,
            auth.clone(),
            Duration::from_secs(config.http_timeout_secs),
        )?);
        Self::initialize_with_gateway(config, gateway, auth)
    }

    /// 注入自定义网关（测试、或非 HTTP 的传输实现）
    pub fn initialize_with_gateway(
        config: FieldOpsConfig,
        gateway: Arc<dyn RemoteGateway>,
        auth: Arc<dyn AuthProvider>,
    ) -> Result<Arc<Self>> {
        info!(version = SDK_VERSION, data_dir = %config.data_dir.display(), "FieldOps SDK 初始化");
        let storage = StorageManager::open(&config.data_dir)?;
        let events = EventBus::new(config.event_capacity);
        let orchestrator = Arc::new(SyncOrchestrator::new(
            storage.clone(),
            gateway,
            auth,
            events.clone(),
        ));
        Ok(Arc::new(Self {
            config,
            storage,
            orchestrator,
            events,
            monitor: Arc::new(NetworkMonitor::new()),
            network_task: Mutex::new(None),
        }))
    }

    /// 启动：订阅网络跳变，并做一次冷启动全量同步。
    ///
    /// 冷启动同步失败是静默的（UI 显示最后一次成功的本地状态）。
    pub async fn start(&self) {
        let task = self.orchestrator.spawn_network_trigger(&self.monitor);
        *self.network_task.lock() = Some(task);

        if let Err(e) = self.orchestrator.perform_full_sync().await {
            warn!("冷启动全量同步失败（静默，等待下次触发）: {}", e);
        }
    }

    /// app 回前台：机会性全量同步（进行中则忽略）
    pub async fn on_foreground(&self) {
        if let Err(e) = self.orchestrator.perform_full_sync().await {
            warn!("回前台同步失败（静默）: {}", e);
        }
    }

    /// 项目状态流转：Critical 档落库，随即机会性后台同步
    pub async fn set_project_status(&self, project_id: &str, status: ProjectStatus) -> Result<()> {
        self.storage.set_project_status(project_id, status).await?;
        if let Err(e) = self.orchestrator.trigger_background_sync().await {
            warn!("状态变更后的后台同步失败（记录保持 dirty）: {}", e);
        }
        Ok(())
    }

    pub fn config(&self) -> &FieldOpsConfig {
        &self.config
    }

    pub fn storage(&self) -> &StorageManager {
        &self.storage
    }

    pub fn orchestrator(&self) -> &Arc<SyncOrchestrator> {
        &self.orchestrator
    }

    /// 平台层往这里上报网络状态
    pub fn network_monitor(&self) -> &Arc<NetworkMonitor> {
        &self.monitor
    }

    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<SDKEvent> {
        self.events.subscribe()
    }

    /// 关闭：停网络订阅任务，停写线程
    pub async fn shutdown(&self) {
        if let Some(task) = self.network_task.lock().take() {
            task.abort();
        }
        self.storage.shutdown();
        info!("FieldOps SDK 已关闭");
    }
}
