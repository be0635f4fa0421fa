//! 存储层 - 本地实体库
//!
//! 结构：
//! - `entities`: 实体结构体与枚举（payload 形态）
//! - `dao`: 记录集 SQL（所有实体共用同一表结构）
//! - `store_actor`: 单写者线程，持有 Connection
//! - `dirty`: 推送优先级
//! - `migrate`: refinery 迁移
//!
//! `StorageManager` 是对外的异步句柄：Clone 即共享同一 Actor；
//! UI 需要的查询是一组固定方法，不提供通用查询能力。

pub mod dao;
pub mod dirty;
pub mod entities;
pub mod migrate;
pub mod store_actor;

use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;

use chrono::{NaiveDate, Utc};
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use tracing::warn;

use crate::error::{FieldOpsSDKError, Result};
use crate::schedule::projector;
use crate::sync::entity_type::EntityKind;
use self::dirty::SyncPriority;
use self::entities::{
    AnyRecord, CalendarEvent, Client, Company, InventoryItem, InventorySnapshot, InventoryTag,
    InventoryUnit, Project, ProjectStatus, ProjectTask, SubClient, TaskType, ThresholdStatus, User,
};
use self::store_actor::{StoreActor, StoreCommand, StoreLocation};

/// 数据库文件名（data_dir 下）
const DB_FILE: &str = "fieldops.db";

/// 实体库异步句柄（Clone 共享同一写线程）
#[derive(Clone)]
pub struct StorageManager {
    sender: Sender<StoreCommand>,
    join: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl StorageManager {
    /// 打开 data_dir 下的持久库
    pub fn open(data_dir: &Path) -> Result<Self> {
        let (sender, join) = StoreActor::spawn(StoreLocation::File(data_dir.join(DB_FILE)))?;
        Ok(Self {
            sender,
            join: Arc::new(Mutex::new(Some(join))),
        })
    }

    /// 内存库（测试）
    pub fn in_memory() -> Result<Self> {
        let (sender, join) = StoreActor::spawn(StoreLocation::Memory)?;
        Ok(Self {
            sender,
            join: Arc::new(Mutex::new(Some(join))),
        })
    }

    /// 停止写线程；之后任何调用返回 `StoreClosed`
    pub fn shutdown(&self) {
        let _ = self.sender.send(StoreCommand::Shutdown);
        if let Some(handle) = self.join.lock().take() {
            if handle.join().is_err() {
                warn!("store 线程退出异常");
            }
        }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(tokio::sync::oneshot::Sender<Result<T>>) -> StoreCommand,
    ) -> Result<T> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(make(tx))
            .map_err(|_| FieldOpsSDKError::StoreClosed)?;
        rx.await.map_err(|_| FieldOpsSDKError::StoreClosed)?
    }

    // ------------------------------------------------------------------
    // 通用记录操作（同步层使用）
    // ------------------------------------------------------------------

    /// 本地变更落库：标 dirty、空 id 时分配本地占位 id；返回最终 id
    pub async fn save(&self, record: AnyRecord, priority: SyncPriority) -> Result<String> {
        self.request(|tx| StoreCommand::Save {
            record,
            priority,
            respond_to: tx,
        })
        .await
    }

    /// 应用拉取到的权威记录（冲突与软删除规则在写线程内执行）
    pub async fn apply_pulled(&self, record: AnyRecord) -> Result<()> {
        self.request(|tx| StoreCommand::ApplyPulled {
            record,
            respond_to: tx,
        })
        .await
    }

    /// 确认推送成功：清 dirty / 换 id / 单调推进 last_synced_at
    pub async fn confirm_push(
        &self,
        kind: EntityKind,
        local_id: &str,
        remote_id: &str,
        pushed: AnyRecord,
        synced_at: i64,
    ) -> Result<()> {
        let local_id = local_id.to_string();
        let remote_id = remote_id.to_string();
        self.request(|tx| StoreCommand::ConfirmPush {
            kind,
            local_id,
            remote_id,
            pushed,
            synced_at,
            respond_to: tx,
        })
        .await
    }

    /// 本地软删除（tombstone + dirty，向远端传播）
    pub async fn soft_delete(&self, kind: EntityKind, id: &str) -> Result<()> {
        let id = id.to_string();
        let deleted_at = Utc::now().timestamp_millis();
        self.request(|tx| StoreCommand::SoftDelete {
            kind,
            id,
            deleted_at,
            respond_to: tx,
        })
        .await
    }

    pub async fn get(&self, kind: EntityKind, id: &str) -> Result<Option<AnyRecord>> {
        let id = id.to_string();
        self.request(|tx| StoreCommand::Get {
            kind,
            id,
            respond_to: tx,
        })
        .await
    }

    /// 全量列表；`include_deleted=false` 过滤 tombstone
    pub async fn list(&self, kind: EntityKind, include_deleted: bool) -> Result<Vec<AnyRecord>> {
        self.request(|tx| StoreCommand::List {
            kind,
            include_deleted,
            respond_to: tx,
        })
        .await
    }

    pub async fn list_by_parent(
        &self,
        kind: EntityKind,
        parent_id: &str,
        include_deleted: bool,
    ) -> Result<Vec<AnyRecord>> {
        let parent_id = parent_id.to_string();
        self.request(|tx| StoreCommand::ListByParent {
            kind,
            parent_id,
            include_deleted,
            respond_to: tx,
        })
        .await
    }

    /// 某一类型的 dirty 记录（优先级降序）
    pub async fn dirty(&self, kind: EntityKind) -> Result<Vec<AnyRecord>> {
        self.request(|tx| StoreCommand::Dirty {
            kind,
            respond_to: tx,
        })
        .await
    }

    /// 跨类型的全部 dirty 记录（优先级降序；同档无顺序保证）
    pub async fn dirty_all(&self) -> Result<Vec<AnyRecord>> {
        self.request(|tx| StoreCommand::DirtyAll { respond_to: tx }).await
    }

    pub async fn mark_dirty(&self, kind: EntityKind, id: &str, priority: SyncPriority) -> Result<()> {
        let id = id.to_string();
        self.request(|tx| StoreCommand::MarkDirty {
            kind,
            id,
            priority,
            respond_to: tx,
        })
        .await
    }

    // ------------------------------------------------------------------
    // 固定查询集（UI 需要的就这些，不做通用查询）
    // ------------------------------------------------------------------

    pub async fn company(&self, id: &str) -> Result<Option<Company>> {
        Ok(self.get(EntityKind::Company, id).await?.and_then(as_company))
    }

    pub async fn companies(&self) -> Result<Vec<Company>> {
        Ok(collect(self.list(EntityKind::Company, false).await?, as_company))
    }

    pub async fn team_members(&self, company_id: &str) -> Result<Vec<User>> {
        Ok(collect(
            self.list_by_parent(EntityKind::User, company_id, false).await?,
            as_user,
        ))
    }

    pub async fn clients(&self, company_id: &str) -> Result<Vec<Client>> {
        Ok(collect(
            self.list_by_parent(EntityKind::Client, company_id, false).await?,
            as_client,
        ))
    }

    pub async fn sub_clients(&self, client_id: &str) -> Result<Vec<SubClient>> {
        Ok(collect(
            self.list_by_parent(EntityKind::SubClient, client_id, false).await?,
            as_sub_client,
        ))
    }

    pub async fn task_types(&self, company_id: &str) -> Result<Vec<TaskType>> {
        Ok(collect(
            self.list_by_parent(EntityKind::TaskType, company_id, false).await?,
            as_task_type,
        ))
    }

    pub async fn project(&self, id: &str) -> Result<Option<Project>> {
        Ok(self.get(EntityKind::Project, id).await?.and_then(as_project))
    }

    pub async fn projects(&self, company_id: &str) -> Result<Vec<Project>> {
        Ok(collect(
            self.list_by_parent(EntityKind::Project, company_id, false).await?,
            as_project,
        ))
    }

    pub async fn tasks(&self, project_id: &str) -> Result<Vec<ProjectTask>> {
        let mut tasks = collect(
            self.list_by_parent(EntityKind::ProjectTask, project_id, false).await?,
            as_task,
        );
        tasks.sort_by_key(|t| t.sort_order);
        Ok(tasks)
    }

    pub async fn events_for_project(&self, project_id: &str) -> Result<Vec<CalendarEvent>> {
        Ok(collect(
            self.list_by_parent(EntityKind::CalendarEvent, project_id, false).await?,
            as_event,
        ))
    }

    /// 项目里应当显示的事件（active 缓存 + 投影回退规则）
    pub async fn displayable_events(&self, project_id: &str) -> Result<Vec<CalendarEvent>> {
        let parent = self.project(project_id).await?;
        let events = self.events_for_project(project_id).await?;
        Ok(events
            .into_iter()
            .filter(|e| projector::should_display(e, parent.as_ref()))
            .collect())
    }

    /// 公司日视图：给定日历日应显示的全部事件
    pub async fn events_on_day(&self, company_id: &str, date: NaiveDate) -> Result<Vec<CalendarEvent>> {
        let mut out = Vec::new();
        for project in self.projects(company_id).await? {
            let events = self.events_for_project(&project.id).await?;
            out.extend(
                events
                    .into_iter()
                    .filter(|e| projector::should_display(e, Some(&project)) && e.covers_day(date)),
            );
        }
        Ok(out)
    }

    pub async fn inventory_items(&self, company_id: &str) -> Result<Vec<InventoryItem>> {
        Ok(collect(
            self.list_by_parent(EntityKind::InventoryItem, company_id, false).await?,
            as_item,
        ))
    }

    pub async fn inventory_tags(&self, company_id: &str) -> Result<Vec<InventoryTag>> {
        Ok(collect(
            self.list_by_parent(EntityKind::InventoryTag, company_id, false).await?,
            as_tag,
        ))
    }

    /// 物料的生效阈值状态（自身阈值与标签阈值取更严格档）
    pub async fn item_threshold_status(&self, item_id: &str) -> Result<ThresholdStatus> {
        let item = self
            .get(EntityKind::InventoryItem, item_id)
            .await?
            .and_then(as_item)
            .ok_or_else(|| FieldOpsSDKError::NotFound(format!("inventory_item:{}", item_id)))?;
        let tags = self.inventory_tags(&item.company_id).await?;
        let attached: Vec<InventoryTag> = tags
            .into_iter()
            .filter(|t| item.tag_ids.contains(&t.id))
            .collect();
        Ok(item.effective_threshold_status(&attached))
    }

    /// 生成并落库一份物料快照（创建后不可变）
    pub async fn snapshot_item(&self, item_id: &str) -> Result<InventorySnapshot> {
        let item = self
            .get(EntityKind::InventoryItem, item_id)
            .await?
            .and_then(as_item)
            .ok_or_else(|| FieldOpsSDKError::NotFound(format!("inventory_item:{}", item_id)))?;
        let unit_name = match &item.unit_id {
            Some(unit_id) => self
                .get(EntityKind::InventoryUnit, unit_id)
                .await?
                .and_then(as_unit)
                .map(|u| u.name),
            None => None,
        };
        let snapshot = InventorySnapshot::capture(&item, unit_name, Utc::now().timestamp_millis());
        let id = self
            .save(
                AnyRecord::InventorySnapshot(snapshot.clone()),
                SyncPriority::Background,
            )
            .await?;
        Ok(InventorySnapshot { id, ..snapshot })
    }

    /// 项目状态流转：最高优先级排队（工地状态要第一时间回办公室）
    pub async fn set_project_status(&self, project_id: &str, status: ProjectStatus) -> Result<()> {
        let mut project = self
            .project(project_id)
            .await?
            .ok_or_else(|| FieldOpsSDKError::NotFound(format!("project:{}", project_id)))?;
        project.status = status;
        project.updated_at = Utc::now().timestamp_millis();
        self.save(AnyRecord::Project(project), SyncPriority::Critical)
            .await?;
        Ok(())
    }
}

fn collect<T>(records: Vec<AnyRecord>, pick: fn(AnyRecord) -> Option<T>) -> Vec<T> {
    records.into_iter().filter_map(pick).collect()
}

fn as_company(r: AnyRecord) -> Option<Company> {
    match r {
        AnyRecord::Company(c) => Some(c),
        _ => None,
    }
}

fn as_user(r: AnyRecord) -> Option<User> {
    match r {
        AnyRecord::User(u) => Some(u),
        _ => None,
    }
}

fn as_client(r: AnyRecord) -> Option<Client> {
    match r {
        AnyRecord::Client(c) => Some(c),
        _ => None,
    }
}

fn as_sub_client(r: AnyRecord) -> Option<SubClient> {
    match r {
        AnyRecord::SubClient(s) => Some(s),
        _ => None,
    }
}

fn as_task_type(r: AnyRecord) -> Option<TaskType> {
    match r {
        AnyRecord::TaskType(t) => Some(t),
        _ => None,
    }
}

fn as_project(r: AnyRecord) -> Option<Project> {
    match r {
        AnyRecord::Project(p) => Some(p),
        _ => None,
    }
}

fn as_task(r: AnyRecord) -> Option<ProjectTask> {
    match r {
        AnyRecord::Task(t) => Some(t),
        _ => None,
    }
}

fn as_event(r: AnyRecord) -> Option<CalendarEvent> {
    match r {
        AnyRecord::CalendarEvent(e) => Some(e),
        _ => None,
    }
}

fn as_item(r: AnyRecord) -> Option<InventoryItem> {
    match r {
        AnyRecord::InventoryItem(i) => Some(i),
        _ => None,
    }
}

fn as_tag(r: AnyRecord) -> Option<InventoryTag> {
    match r {
        AnyRecord::InventoryTag(t) => Some(t),
        _ => None,
    }
}

fn as_unit(r: AnyRecord) -> Option<InventoryUnit> {
    match r {
        AnyRecord::InventoryUnit(u) => Some(u),
        _ => None,
    }
}
