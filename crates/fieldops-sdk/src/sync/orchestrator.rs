//! 同步编排器
//!
//! ## NOTE: Orchestrator 不做重试
//!
//! 失败的推送保持 dirty、失败的拉取跳过本轮，下一次触发（用户操作 /
//! 前台恢复 / 网络恢复 / 高优先级变更）自然重试。所有操作幂等：
//! 重推未变更记录是无害写，重拉是按 id 整记录覆盖，所以反复触发最终收敛。
//!
//! 排序铁律：同一实体类型内，推送永远先于拉取（自己的编辑不能被
//! 同一轮里的陈旧拉取立刻冲掉）。
//!
//! in-flight 守卫：一轮进行中时新触发直接忽略（不排队、不取消），
//! 调用方需要更新鲜的结果就自己再触发一次。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::auth::AuthProvider;
use crate::error::Result;
use crate::events::EventBus;
use crate::network::NetworkMonitor;
use crate::storage::entities::AnyRecord;
use crate::storage::StorageManager;
use crate::sync::entity_type::{EntityKind, SYNC_ORDER};
use crate::sync::{applier, SyncMode, SyncReport, SyncScope, SyncState};
use crate::wire::{decode, mapping, RemoteGateway};

/// 同步编排器：启动时构建一次，引用注入给调用方（无全局态）
pub struct SyncOrchestrator {
    storage: StorageManager,
    gateway: Arc<dyn RemoteGateway>,
    auth: Arc<dyn AuthProvider>,
    events: EventBus,
    in_flight: AtomicBool,
    state: Mutex<SyncState>,
    last_report: Mutex<Option<SyncReport>>,
}

/// in-flight 守卫：Drop 时释放，保证任何退出路径都不会卡死后续同步
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlightGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

impl SyncOrchestrator {
    pub fn new(
        storage: StorageManager,
        gateway: Arc<dyn RemoteGateway>,
        auth: Arc<dyn AuthProvider>,
        events: EventBus,
    ) -> Self {
        Self {
            storage,
            gateway,
            auth,
            events,
            in_flight: AtomicBool::new(false),
            state: Mutex::new(SyncState::Idle),
            last_report: Mutex::new(None),
        }
    }

    pub fn state(&self) -> SyncState {
        self.state.lock().clone()
    }

    pub fn is_syncing(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn last_report(&self) -> Option<SyncReport> {
        self.last_report.lock().clone()
    }

    /// 全量同步：固定依赖顺序逐类型「先推后拉」。
    ///
    /// 已有同步进行中时是 no-op，返回 `Ok(None)`。
    pub async fn perform_full_sync(&self) -> Result<Option<SyncReport>> {
        let Some(guard) = InFlightGuard::try_acquire(&self.in_flight) else {
            debug!("全量同步触发被忽略：已有一轮进行中");
            return Ok(None);
        };

        self.begin(SyncMode::Full);
        let mut report = SyncReport::new(SyncMode::Full);
        let outcome = self.run_full_cycle(&mut report).await;
        self.finish(guard, report, outcome).await.map(Some)
    }

    /// 后台同步：只推 dirty（跨类型按优先级降序），再只拉被触碰的类型。
    ///
    /// 高优先级本地变更落库后、网络恢复时由外部调用；进行中同样 no-op。
    pub async fn trigger_background_sync(&self) -> Result<Option<SyncReport>> {
        let Some(guard) = InFlightGuard::try_acquire(&self.in_flight) else {
            debug!("后台同步触发被忽略：已有一轮进行中");
            return Ok(None);
        };

        self.begin(SyncMode::Background);
        let mut report = SyncReport::new(SyncMode::Background);
        let outcome = self.run_background_cycle(&mut report).await;
        self.finish(guard, report, outcome).await.map(Some)
    }

    /// 单公司范围同步：建司/加入公司后立即调用，让依赖页面马上有数据。
    pub async fn sync_company(&self, company_id: &str) -> Result<Option<SyncReport>> {
        let Some(guard) = InFlightGuard::try_acquire(&self.in_flight) else {
            debug!("公司同步触发被忽略：已有一轮进行中");
            return Ok(None);
        };

        self.begin(SyncMode::Company);
        let mut report = SyncReport::new(SyncMode::Company);
        let scope = SyncScope::Company(company_id.to_string());
        let outcome = self.run_scoped_cycle(&scope, &mut report).await;
        self.finish(guard, report, outcome).await.map(Some)
    }

    /// 订阅网络监控：只有 离线→在线 跳变触发后台同步。
    pub fn spawn_network_trigger(self: &Arc<Self>, monitor: &NetworkMonitor) -> tokio::task::JoinHandle<()> {
        let mut rx = monitor.subscribe();
        let this = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        this.events
                            .emit_network_changed(event.old_status, event.new_status);
                        if event.is_reconnect() {
                            info!("网络恢复，触发后台同步");
                            if let Err(e) = this.trigger_background_sync().await {
                                warn!("网络恢复触发的后台同步失败: {}", e);
                            }
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "网络事件消费滞后");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    // ------------------------------------------------------------------
    // 循环体
    // ------------------------------------------------------------------

    async fn run_full_cycle(&self, report: &mut SyncReport) -> Result<()> {
        for kind in SYNC_ORDER {
            // 铁律：同类型内先推后拉
            let dirty = self.storage.dirty(kind).await?;
            self.push_records(dirty, report).await?;
            self.pull_kind(kind, &SyncScope::All, report).await?;
        }
        Ok(())
    }

    async fn run_background_cycle(&self, report: &mut SyncReport) -> Result<()> {
        let dirty = self.storage.dirty_all().await?;
        // 被触碰的类型按依赖顺序拉回（保持外键可解析）
        let touched: Vec<EntityKind> = SYNC_ORDER
            .into_iter()
            .filter(|kind| dirty.iter().any(|r| r.kind() == *kind))
            .collect();

        self.push_records(dirty, report).await?;
        for kind in touched {
            self.pull_kind(kind, &SyncScope::All, report).await?;
        }
        Ok(())
    }

    async fn run_scoped_cycle(&self, scope: &SyncScope, report: &mut SyncReport) -> Result<()> {
        // 建司/加入场景下 dirty 集合极小，全部推掉再按范围拉
        let dirty = self.storage.dirty_all().await?;
        self.push_records(dirty, report).await?;
        for kind in SYNC_ORDER {
            self.pull_kind(kind, scope, report).await?;
        }
        Ok(())
    }

    /// 推送一批 dirty 记录（调用方已排好顺序）。
    ///
    /// 单条传输失败：记日志、保持 dirty、继续下一条。
    /// 认证失败：立即向上冒泡停轮。
    async fn push_records(&self, records: Vec<AnyRecord>, report: &mut SyncReport) -> Result<()> {
        for record in records {
            let kind = record.kind();
            let local_id = record.id().to_string();

            // 还引用着本地占位 id 的记录推不出去（外键无效），
            // 等被引用的父记录先拿到服务端 id
            if record.references_local_placeholder() {
                debug!(
                    kind = kind.as_str(),
                    id = %local_id,
                    "记录仍引用本地占位 id，推迟推送"
                );
                continue;
            }

            let payload = mapping::encode_record(&record);
            match self.gateway.push(kind, payload).await {
                Ok(echo) => {
                    let remote_id = decode::opt_id(&echo).unwrap_or_else(|| local_id.clone());
                    let synced_at = Utc::now().timestamp_millis();
                    match self
                        .storage
                        .confirm_push(kind, &local_id, &remote_id, record, synced_at)
                        .await
                    {
                        Ok(()) => report.pushed += 1,
                        Err(crate::error::FieldOpsSDKError::StoreClosed) => {
                            return Err(crate::error::FieldOpsSDKError::StoreClosed)
                        }
                        Err(e) => {
                            // 本地落库失败：该记录的同步中止，其余不受影响
                            warn!(kind = kind.as_str(), id = %local_id, "推送确认落库失败: {}", e);
                            report.failed_pushes += 1;
                        }
                    }
                }
                Err(e) if e.is_auth() => return Err(e),
                Err(e) => {
                    warn!(
                        kind = kind.as_str(),
                        id = %local_id,
                        "推送失败，记录保持 dirty 等下轮: {}",
                        e
                    );
                    report.failed_pushes += 1;
                }
            }
        }
        Ok(())
    }

    /// 拉取一个类型。传输失败只跳过该类型，本轮其余类型继续。
    async fn pull_kind(
        &self,
        kind: EntityKind,
        scope: &SyncScope,
        report: &mut SyncReport,
    ) -> Result<()> {
        match self.gateway.fetch(kind, scope).await {
            Ok(records) => {
                let applied = applier::apply_batch(&self.storage, kind, records).await?;
                report.pulled += applied;
                Ok(())
            }
            Err(e) if e.is_auth() => Err(e),
            Err(e) => {
                warn!(kind = kind.as_str(), "拉取失败，跳过该类型本轮: {}", e);
                report.skipped_kinds.push(kind);
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------
    // 生命周期
    // ------------------------------------------------------------------

    fn begin(&self, mode: SyncMode) {
        *self.state.lock() = SyncState::Syncing;
        self.events.emit_sync_started(mode);
        info!(mode = mode.as_str(), "同步开始");
    }

    async fn finish(
        &self,
        _guard: InFlightGuard<'_>,
        mut report: SyncReport,
        outcome: Result<()>,
    ) -> Result<SyncReport> {
        report.finished_at = Utc::now().timestamp_millis();
        match outcome {
            Ok(()) => {
                *self.state.lock() = SyncState::Synced;
                info!(
                    mode = report.mode.as_str(),
                    pushed = report.pushed,
                    pulled = report.pulled,
                    failed = report.failed_pushes,
                    "同步结束"
                );
                self.events.emit_sync_finished(report.clone());
                *self.last_report.lock() = Some(report.clone());
                Ok(report)
            }
            Err(e) if e.is_auth() => {
                // 认证失败不本地重试：交回认证协作方，发状态信号
                report.auth_failed = true;
                *self.state.lock() = SyncState::AuthRequired;
                warn!(mode = report.mode.as_str(), "同步因认证失败停轮: {}", e);
                self.auth.on_auth_required().await;
                self.events.emit_auth_required();
                *self.last_report.lock() = Some(report.clone());
                Ok(report)
            }
            Err(e) => {
                *self.state.lock() = SyncState::Failed {
                    error: e.to_string(),
                };
                self.events.emit_sync_failed(report.mode, e.to_string());
                *self.last_report.lock() = Some(report);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticTokenProvider;
    use crate::error::FieldOpsSDKError;
    use crate::network::NetworkStatus;
    use crate::storage::dirty::SyncPriority;
    use crate::storage::entities::{Project, ProjectTask};
    use crate::wire::WireRecord;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// 记录调用轨迹的假网关
    #[derive(Default)]
    struct MockGateway {
        calls: Mutex<Vec<String>>,
        fetch_data: Mutex<HashMap<EntityKind, Vec<WireRecord>>>,
        fail_push_names: Mutex<Vec<String>>,
        fail_fetch_kinds: Mutex<Vec<EntityKind>>,
        auth_fail_all: AtomicBool,
        created: AtomicUsize,
        fetch_delay: Mutex<Option<Duration>>,
    }

    impl MockGateway {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }

        fn set_fetch(&self, kind: EntityKind, records: Vec<WireRecord>) {
            self.fetch_data.lock().insert(kind, records);
        }
    }

    #[async_trait]
    impl RemoteGateway for MockGateway {
        async fn fetch(&self, kind: EntityKind, _scope: &SyncScope) -> crate::error::Result<Vec<WireRecord>> {
            if self.auth_fail_all.load(Ordering::SeqCst) {
                return Err(FieldOpsSDKError::Auth("token 过期".into()));
            }
            let fetch_delay = *self.fetch_delay.lock();
            if let Some(delay) = fetch_delay {
                tokio::time::sleep(delay).await;
            }
            self.calls.lock().push(format!("fetch:{}", kind));
            if self.fail_fetch_kinds.lock().contains(&kind) {
                return Err(FieldOpsSDKError::Transport("连接超时".into()));
            }
            Ok(self.fetch_data.lock().get(&kind).cloned().unwrap_or_default())
        }

        async fn push(&self, kind: EntityKind, record: WireRecord) -> crate::error::Result<WireRecord> {
            if self.auth_fail_all.load(Ordering::SeqCst) {
                return Err(FieldOpsSDKError::Auth("token 过期".into()));
            }
            let name = record
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            self.calls.lock().push(format!("push:{}:{}", kind, name));
            if self.fail_push_names.lock().contains(&name) {
                return Err(FieldOpsSDKError::Transport("发送失败".into()));
            }
            let mut echo = record;
            if echo.get("id").is_none() {
                // create：服务端分配 id
                let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
                echo["id"] = json!(format!("srv-{}", n));
            }
            Ok(echo)
        }
    }

    struct Fixture {
        storage: StorageManager,
        gateway: Arc<MockGateway>,
        auth: Arc<StaticTokenProvider>,
        orchestrator: Arc<SyncOrchestrator>,
    }

    fn fixture() -> Fixture {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let storage = StorageManager::in_memory().unwrap();
        let gateway = Arc::new(MockGateway::default());
        let auth = Arc::new(StaticTokenProvider::new("tok", "u-1"));
        let orchestrator = Arc::new(SyncOrchestrator::new(
            storage.clone(),
            gateway.clone(),
            auth.clone(),
            EventBus::new(32),
        ));
        Fixture {
            storage,
            gateway,
            auth,
            orchestrator,
        }
    }

    fn project(id: &str, name: &str) -> Project {
        Project {
            id: id.to_string(),
            company_id: "co-1".into(),
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_full_sync_pushes_before_pull_per_kind() {
        let f = fixture();
        f.storage
            .save(AnyRecord::Project(project("p-1", "Job A")), SyncPriority::Normal)
            .await
            .unwrap();
        f.gateway.set_fetch(
            EntityKind::Project,
            vec![json!({"id": "p-2", "company": "co-1", "name": "Remote job"})],
        );

        let report = f.orchestrator.perform_full_sync().await.unwrap().unwrap();
        assert_eq!(report.pushed, 1);
        assert_eq!(report.pulled, 1);
        assert!(report.is_clean());

        let calls = f.gateway.calls();
        let push_pos = calls.iter().position(|c| c == "push:project:Job A").unwrap();
        let pull_pos = calls.iter().position(|c| c == "fetch:project").unwrap();
        assert!(push_pos < pull_pos, "同类型内推送必须先于拉取: {:?}", calls);
        // 全量：每个类型都拉一次
        assert_eq!(calls.iter().filter(|c| c.starts_with("fetch:")).count(), 12);
        f.storage.shutdown();
    }

    #[tokio::test]
    async fn test_full_sync_pull_order_follows_dependencies() {
        let f = fixture();
        f.orchestrator.perform_full_sync().await.unwrap().unwrap();
        let fetches: Vec<String> = f
            .gateway
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("fetch:"))
            .collect();
        let expected: Vec<String> = SYNC_ORDER.iter().map(|k| format!("fetch:{}", k)).collect();
        assert_eq!(fetches, expected);
        f.storage.shutdown();
    }

    #[tokio::test]
    async fn test_overlapping_full_sync_is_noop() {
        let f = fixture();
        *f.gateway.fetch_delay.lock() = Some(Duration::from_millis(80));

        let first = {
            let orchestrator = Arc::clone(&f.orchestrator);
            tokio::spawn(async move { orchestrator.perform_full_sync().await })
        };
        // 等第一轮确实进入 in-flight
        for _ in 0..100 {
            if f.orchestrator.is_syncing() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        assert!(f.orchestrator.is_syncing());

        // 第一轮还在跑：第二次触发既不排队也不取消，直接忽略
        let second = f.orchestrator.perform_full_sync().await.unwrap();
        assert!(second.is_none());

        let first = first.await.unwrap().unwrap();
        assert!(first.is_some());

        // 第一轮结束后可以再触发
        *f.gateway.fetch_delay.lock() = None;
        assert!(f.orchestrator.perform_full_sync().await.unwrap().is_some());
        f.storage.shutdown();
    }

    #[tokio::test]
    async fn test_push_failure_keeps_record_dirty_and_cycle_continues() {
        let f = fixture();
        f.storage
            .save(AnyRecord::Project(project("p-bad", "Bad job")), SyncPriority::Normal)
            .await
            .unwrap();
        f.storage
            .save(AnyRecord::Project(project("p-good", "Good job")), SyncPriority::Normal)
            .await
            .unwrap();
        f.gateway.fail_push_names.lock().push("Bad job".into());

        let report = f.orchestrator.perform_full_sync().await.unwrap().unwrap();
        assert_eq!(report.pushed, 1);
        assert_eq!(report.failed_pushes, 1);

        // 失败的保持 dirty，成功的已清
        let bad = f.storage.project("p-bad").await.unwrap().unwrap();
        let good = f.storage.project("p-good").await.unwrap().unwrap();
        assert!(bad.meta.needs_sync);
        assert!(!good.meta.needs_sync);

        // 下一轮重试后收敛（幂等 + 最终一致）
        f.gateway.fail_push_names.lock().clear();
        let report = f.orchestrator.perform_full_sync().await.unwrap().unwrap();
        assert_eq!(report.pushed, 1);
        assert!(!f.storage.project("p-bad").await.unwrap().unwrap().meta.needs_sync);
        f.storage.shutdown();
    }

    #[tokio::test]
    async fn test_pull_failure_skips_kind_but_continues_cycle() {
        let f = fixture();
        f.gateway.fail_fetch_kinds.lock().push(EntityKind::User);
        f.gateway.set_fetch(
            EntityKind::Project,
            vec![json!({"id": "p-1", "company": "co-1", "name": "Remote"})],
        );

        let report = f.orchestrator.perform_full_sync().await.unwrap().unwrap();
        assert_eq!(report.skipped_kinds, vec![EntityKind::User]);
        // user 失败不影响后面的 project 拉取
        assert_eq!(report.pulled, 1);
        assert_eq!(f.storage.projects("co-1").await.unwrap().len(), 1);
        f.storage.shutdown();
    }

    #[tokio::test]
    async fn test_background_sync_pushes_by_priority_and_pulls_touched_only() {
        let f = fixture();
        f.storage
            .save(AnyRecord::Project(project("p-low", "Low job")), SyncPriority::Low)
            .await
            .unwrap();
        f.storage
            .save(
                AnyRecord::Task(ProjectTask {
                    id: "t-1".into(),
                    project_id: "p-low".into(),
                    name: "Critical task".into(),
                    ..Default::default()
                }),
                SyncPriority::Critical,
            )
            .await
            .unwrap();

        let report = f
            .orchestrator
            .trigger_background_sync()
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.pushed, 2);

        let calls = f.gateway.calls();
        let pushes: Vec<&String> = calls.iter().filter(|c| c.starts_with("push:")).collect();
        // Critical 先推，跨类型也按优先级
        assert_eq!(pushes[0], "push:project_task:Critical task");
        assert_eq!(pushes[1], "push:project:Low job");

        // 只拉被触碰的两个类型
        let fetches: Vec<&String> = calls.iter().filter(|c| c.starts_with("fetch:")).collect();
        assert_eq!(fetches, vec!["fetch:project", "fetch:project_task"]);
        f.storage.shutdown();
    }

    #[tokio::test]
    async fn test_auth_failure_stops_cycle_and_notifies_collaborator() {
        let f = fixture();
        f.storage
            .save(AnyRecord::Project(project("p-1", "Job")), SyncPriority::Normal)
            .await
            .unwrap();
        f.gateway.auth_fail_all.store(true, Ordering::SeqCst);

        let report = f.orchestrator.perform_full_sync().await.unwrap().unwrap();
        assert!(report.auth_failed);
        assert_eq!(report.pushed, 0);
        // 认证失败不本地重试：没有任何成功调用，轮次立即停止
        assert!(f.gateway.calls().is_empty());
        // 球已交回认证协作方
        assert!(f.auth.auth_was_required());
        assert_eq!(f.orchestrator.state(), SyncState::AuthRequired);
        // 记录保持 dirty，重新登录后还能推
        assert!(f.storage.project("p-1").await.unwrap().unwrap().meta.needs_sync);
        f.storage.shutdown();
    }

    #[tokio::test]
    async fn test_locally_created_records_adopt_server_ids_in_dependency_order() {
        let f = fixture();
        let local_project = f
            .storage
            .save(AnyRecord::Project(project("", "New build")), SyncPriority::Normal)
            .await
            .unwrap();
        f.storage
            .save(
                AnyRecord::Task(ProjectTask {
                    project_id: local_project.clone(),
                    name: "First task".into(),
                    ..Default::default()
                }),
                SyncPriority::Normal,
            )
            .await
            .unwrap();

        let report = f.orchestrator.perform_full_sync().await.unwrap().unwrap();
        assert_eq!(report.pushed, 2);

        // 项目先推、换得 srv id；任务随后带着改写后的外键推出去
        let projects = f.storage.projects("co-1").await.unwrap();
        assert_eq!(projects.len(), 1);
        assert!(projects[0].id.starts_with("srv-"));
        let tasks = f.storage.tasks(&projects[0].id).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert!(tasks[0].id.starts_with("srv-"));
        assert!(!tasks[0].meta.needs_sync);
        f.storage.shutdown();
    }

    #[tokio::test]
    async fn test_remote_tombstone_wins_over_dirty_edit_end_to_end() {
        let f = fixture();
        let mut p = project("p-1", "Edited offline");
        p.meta.needs_sync = true;
        f.storage
            .save(AnyRecord::Project(p), SyncPriority::Normal)
            .await
            .unwrap();
        // 远端已把该项目软删（推送会失败无所谓，拉取带回 tombstone）
        f.gateway.fail_push_names.lock().push("Edited offline".into());
        f.gateway.set_fetch(
            EntityKind::Project,
            vec![json!({
                "id": "p-1", "company": "co-1", "name": "Server name",
                "deletedAt": "2025-08-01T00:00:00Z",
            })],
        );

        f.orchestrator.perform_full_sync().await.unwrap().unwrap();
        let raw = f.storage.get(EntityKind::Project, "p-1").await.unwrap().unwrap();
        assert_eq!(raw.meta().deleted_at, Some(1_754_006_400_000));
        assert!(f.storage.projects("co-1").await.unwrap().is_empty());
        f.storage.shutdown();
    }

    #[tokio::test]
    async fn test_repeated_full_sync_converges_with_no_drift() {
        let f = fixture();
        f.gateway.set_fetch(
            EntityKind::Project,
            vec![json!({"id": "p-1", "company": "co-1", "name": "Stable"})],
        );

        let first = f.orchestrator.perform_full_sync().await.unwrap().unwrap();
        let second = f.orchestrator.perform_full_sync().await.unwrap().unwrap();
        assert_eq!(first.pulled, 1);
        assert_eq!(second.pulled, 1);
        assert_eq!(second.pushed, 0);
        assert_eq!(f.storage.projects("co-1").await.unwrap().len(), 1);
        f.storage.shutdown();
    }

    #[tokio::test]
    async fn test_reconnect_transition_triggers_background_sync() {
        let f = fixture();
        f.storage
            .save(AnyRecord::Project(project("p-1", "Queued offline")), SyncPriority::High)
            .await
            .unwrap();

        let monitor = NetworkMonitor::new();
        let _task = f.orchestrator.spawn_network_trigger(&monitor);
        // 订阅生效后再推跳变
        tokio::time::sleep(Duration::from_millis(10)).await;

        // 离线 → 在线：触发
        monitor.update_status(NetworkStatus::Online).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        let calls = f.gateway.calls();
        assert!(
            calls.contains(&"push:project:Queued offline".to_string()),
            "网络恢复应触发后台同步: {:?}",
            calls
        );

        // 在线 → 离线：不触发新的同步
        let before = f.gateway.calls().len();
        monitor.update_status(NetworkStatus::Offline).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(f.gateway.calls().len(), before);
        f.storage.shutdown();
    }

    #[tokio::test]
    async fn test_company_scope_pull_covers_all_kinds() {
        let f = fixture();
        f.gateway.set_fetch(
            EntityKind::Client,
            vec![json!({"id": "cl-1", "company": "co-1", "name": "ACME"})],
        );

        let report = f.orchestrator.sync_company("co-1").await.unwrap().unwrap();
        assert_eq!(report.mode, SyncMode::Company);
        assert_eq!(report.pulled, 1);
        assert_eq!(
            f.gateway
                .calls()
                .iter()
                .filter(|c| c.starts_with("fetch:"))
                .count(),
            12
        );
        f.storage.shutdown();
    }
}
