//! 数据实体定义 - 对应本地记录集表结构
//!
//! 这里定义了所有可同步实体对应的 Rust 结构体，用于：
//! - 类型安全的数据传输
//! - 统一的数据表示
//! - 序列化/反序列化支持（payload 列为 JSON）
//!
//! 约定：
//! - 所有时间字段为 UTC 毫秒时间戳（INTEGER）
//! - id 为服务端分配的稳定字符串；本地新建记录在首次推送前用 `local-` 前缀占位
//! - 实体间关系一律用 id 外键字段表达（projectId/taskId），查询时 lookup，
//!   不持有对象指针，避免环引用
//! - 列表型关系（团队成员、标签）为有序 id 集合，不内嵌对象

use serde::{Deserialize, Serialize};

use crate::storage::dirty::SyncPriority;
use crate::sync::entity_type::EntityKind;

/// 本地占位 id 前缀（首次推送成功后换为服务端 id）
pub const LOCAL_ID_PREFIX: &str = "local-";

/// 生成本地占位 id
pub fn new_local_id() -> String {
    format!("{}{}", LOCAL_ID_PREFIX, uuid::Uuid::new_v4())
}

/// 是否本地占位 id（尚未被服务端分配过 id 的记录）
pub fn is_local_id(id: &str) -> bool {
    id.starts_with(LOCAL_ID_PREFIX)
}

/// 同步控制字段（存为记录集的真实列，不进 payload）
///
/// needs_sync 即推送队列：没有单独的 journal/log。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncMeta {
    pub needs_sync: bool,
    pub sync_priority: SyncPriority,
    /// 最近一次确认推送/拉取覆盖的时间；只增不减
    pub last_synced_at: Option<i64>,
    /// 软删除标记；非空表示记录逻辑上已删除，但保留为 tombstone
    pub deleted_at: Option<i64>,
}

impl SyncMeta {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

// ---------------------------------------------------------------------------
// 枚举
// ---------------------------------------------------------------------------

/// 项目状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProjectStatus {
    Rfq,
    Estimated,
    Accepted,
    InProgress,
    Completed,
    Closed,
    Pending,
    Archived,
}

impl ProjectStatus {
    /// wire 端的展示字符串（no-code 后端按展示文案存储状态）
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rfq => "RFQ",
            Self::Estimated => "Estimated",
            Self::Accepted => "Accepted",
            Self::InProgress => "In Progress",
            Self::Completed => "Completed",
            Self::Closed => "Closed",
            Self::Pending => "Pending",
            Self::Archived => "Archived",
        }
    }

    /// 宽容解析：大小写、空格、下划线差异都吞掉
    pub fn parse(s: &str) -> Option<Self> {
        let key: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match key.as_str() {
            "rfq" => Some(Self::Rfq),
            "estimated" => Some(Self::Estimated),
            "accepted" => Some(Self::Accepted),
            "inprogress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "closed" => Some(Self::Closed),
            "pending" => Some(Self::Pending),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }
}

impl Default for ProjectStatus {
    fn default() -> Self {
        ProjectStatus::Rfq
    }
}

/// 任务状态（三态；Cancelled 可以重新激活回 Active）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    Active,
    Completed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Completed => "Completed",
            Self::Cancelled => "Cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Some(Self::Active),
            "completed" | "complete" | "done" => Some(Self::Completed),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        TaskStatus::Active
    }
}

/// 项目的排期模式：项目级事件 or 任务级事件
///
/// 未设置时默认 Project 模式（`Project::effective_event_mode`）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventMode {
    Project,
    Task,
}

impl EventMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Task => "task",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "project" => Some(Self::Project),
            "task" => Some(Self::Task),
            _ => None,
        }
    }
}

/// 日历事件的归属层级（project 级无 task_id，task 级必有 task_id）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventCategory {
    Project,
    Task,
}

impl EventCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Task => "task",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "project" => Some(Self::Project),
            "task" => Some(Self::Task),
            _ => None,
        }
    }

    /// 该层级的事件在给定排期模式下是否应当激活
    pub fn active_under(self, mode: EventMode) -> bool {
        matches!(
            (self, mode),
            (EventCategory::Project, EventMode::Project) | (EventCategory::Task, EventMode::Task)
        )
    }
}

/// 库存阈值状态（阈值为「数量 ≤ 阈值时触发」）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThresholdStatus {
    Normal,
    Warning,
    Critical,
}

// ---------------------------------------------------------------------------
// 实体
// ---------------------------------------------------------------------------

/// 公司实体 - 对应 company 表
///
/// company_code 是可分享的人读编号，与内部 id 无关，必须原样往返 wire 层。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub id: String,
    pub company_code: String,
    pub name: String,
    /// 公司默认主题色，派生日历事件缺省用它
    pub default_color: Option<String>,
    pub owner_user_id: Option<String>,
    /// 团队成员 id（有序集合，不内嵌对象）
    #[serde(default)]
    pub team_member_ids: Vec<String>,
    #[serde(default)]
    pub client_ids: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(skip)]
    pub meta: SyncMeta,
}

/// 用户（团队成员）实体 - 对应 user 表
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub company_id: Option<String>,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(skip)]
    pub meta: SyncMeta,
}

/// 客户实体 - 对应 client 表
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: String,
    pub company_id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    #[serde(default)]
    pub sub_client_ids: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(skip)]
    pub meta: SyncMeta,
}

/// 子客户（同一客户的不同工地/联系人）- 对应 sub_client 表
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubClient {
    pub id: String,
    pub client_id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub site_notes: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(skip)]
    pub meta: SyncMeta,
}

/// 任务类型 - 对应 task_type 表
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskType {
    pub id: String,
    pub company_id: String,
    pub name: String,
    pub color: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(skip)]
    pub meta: SyncMeta,
}

/// 项目实体 - 对应 project 表
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub company_id: String,
    pub client_id: Option<String>,
    pub sub_client_id: Option<String>,
    pub name: String,
    /// 客户可见名称；缺省时对外展示用 name
    pub display_name: Option<String>,
    #[serde(default)]
    pub status: ProjectStatus,
    /// 开工日（UTC 毫秒，只取日历日语义）
    pub start_date: Option<i64>,
    /// 完工标记日：语义上是「最后一个工作日的次日」，不是工作日本身
    pub end_date: Option<i64>,
    /// 工期（天）；end_date 缺失时用它推导 effective_end_date
    pub duration_days: Option<i64>,
    /// 排期模式；None 等价 Project 模式
    pub event_type: Option<EventMode>,
    pub color: Option<String>,
    #[serde(default)]
    pub team_member_ids: Vec<String>,
    pub notes: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(skip)]
    pub meta: SyncMeta,
}

impl Project {
    /// 排期模式，未设置时默认 Project 模式
    pub fn effective_event_mode(&self) -> EventMode {
        self.event_type.unwrap_or(EventMode::Project)
    }

    /// 客户可见名称（display_name 缺省回退 name）
    pub fn client_facing_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }
}

/// 项目任务 - 对应 project_task 表
///
/// 每个任务归属唯一项目，并拥有一个 task 级日历事件。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectTask {
    pub id: String,
    pub project_id: String,
    pub name: String,
    #[serde(default)]
    pub status: TaskStatus,
    pub task_type_id: Option<String>,
    pub start_date: Option<i64>,
    pub end_date: Option<i64>,
    #[serde(default)]
    pub assigned_member_ids: Vec<String>,
    #[serde(default)]
    pub sort_order: i64,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(skip)]
    pub meta: SyncMeta,
}

impl ProjectTask {
    pub fn complete(&mut self) {
        self.status = TaskStatus::Completed;
    }

    pub fn cancel(&mut self) {
        self.status = TaskStatus::Cancelled;
    }

    /// Cancelled → Active；其他状态不变，返回是否发生了变化
    pub fn reactivate(&mut self) -> bool {
        if self.status == TaskStatus::Cancelled {
            self.status = TaskStatus::Active;
            true
        } else {
            false
        }
    }
}

/// 日历事件 - 对应 calendar_event 表
///
/// active 是按父项目排期模式缓存的投影位：父项目模式或事件层级变化时
/// 必须重算。None 表示缓存缺失（老数据 / wire 端没给）。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub project_id: String,
    /// task 级事件必有；project 级事件必无
    pub task_id: Option<String>,
    pub category: Option<EventCategory>,
    pub title: String,
    pub color: Option<String>,
    pub start_date: Option<i64>,
    pub end_date: Option<i64>,
    pub active: Option<bool>,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(skip)]
    pub meta: SyncMeta,
}

impl CalendarEvent {
    /// 事件层级：显式 category 优先，否则按 task_id 有无推断
    pub fn effective_category(&self) -> EventCategory {
        self.category.unwrap_or(if self.task_id.is_some() {
            EventCategory::Task
        } else {
            EventCategory::Project
        })
    }
}

/// 库存单位 - 对应 inventory_unit 表
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InventoryUnit {
    pub id: String,
    pub company_id: String,
    pub name: String,
    pub abbreviation: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(skip)]
    pub meta: SyncMeta,
}

/// 库存标签 - 对应 inventory_tag 表
///
/// 标签可以携带阈值，叠加到所有挂此标签的物料上。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InventoryTag {
    pub id: String,
    pub company_id: String,
    pub name: String,
    pub color: Option<String>,
    pub warning_threshold: Option<i64>,
    pub critical_threshold: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(skip)]
    pub meta: SyncMeta,
}

/// 库存物料 - 对应 inventory_item 表
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: String,
    pub company_id: String,
    pub name: String,
    pub quantity: i64,
    pub unit_id: Option<String>,
    #[serde(default)]
    pub tag_ids: Vec<String>,
    pub warning_threshold: Option<i64>,
    pub critical_threshold: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(skip)]
    pub meta: SyncMeta,
}

impl InventoryItem {
    /// 生效的 warning 阈值：物料自身与标签阈值取数值更大者
    /// （阈值是「≤ 触发」，更大 = 更严格）
    pub fn effective_warning_threshold(&self, tags: &[InventoryTag]) -> Option<i64> {
        let tag_max = tags.iter().filter_map(|t| t.warning_threshold).max();
        match (self.warning_threshold, tag_max) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }

    /// 生效的 critical 阈值，规则同 warning
    pub fn effective_critical_threshold(&self, tags: &[InventoryTag]) -> Option<i64> {
        let tag_max = tags.iter().filter_map(|t| t.critical_threshold).max();
        match (self.critical_threshold, tag_max) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }

    /// 当前数量相对生效阈值的状态；critical 优先于 warning
    pub fn effective_threshold_status(&self, tags: &[InventoryTag]) -> ThresholdStatus {
        if let Some(c) = self.effective_critical_threshold(tags) {
            if self.quantity <= c {
                return ThresholdStatus::Critical;
            }
        }
        if let Some(w) = self.effective_warning_threshold(tags) {
            if self.quantity <= w {
                return ThresholdStatus::Warning;
            }
        }
        ThresholdStatus::Normal
    }
}

/// 库存快照 - 对应 inventory_snapshot 表
///
/// 创建后不可变：字段是创建时刻的物料拷贝，之后绝不随物料重算。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InventorySnapshot {
    pub id: String,
    pub company_id: String,
    pub item_id: String,
    pub item_name: String,
    pub quantity: i64,
    pub unit_name: Option<String>,
    pub taken_at: i64,
    #[serde(skip)]
    pub meta: SyncMeta,
}

impl InventorySnapshot {
    /// 从物料当前状态生成快照（唯一的创建路径）
    pub fn capture(item: &InventoryItem, unit_name: Option<String>, taken_at: i64) -> Self {
        Self {
            id: new_local_id(),
            company_id: item.company_id.clone(),
            item_id: item.id.clone(),
            item_name: item.name.clone(),
            quantity: item.quantity,
            unit_name,
            taken_at,
            meta: SyncMeta {
                needs_sync: true,
                sync_priority: SyncPriority::Background,
                ..Default::default()
            },
        }
    }
}

// ---------------------------------------------------------------------------
// AnyRecord：跨实体的统一记录视图（store actor 命令与同步层使用）
// ---------------------------------------------------------------------------

/// 任意实体记录（kind + 具体结构体）
#[derive(Debug, Clone, PartialEq)]
pub enum AnyRecord {
    Company(Company),
    User(User),
    Client(Client),
    SubClient(SubClient),
    TaskType(TaskType),
    Project(Project),
    Task(ProjectTask),
    CalendarEvent(CalendarEvent),
    InventoryUnit(InventoryUnit),
    InventoryTag(InventoryTag),
    InventoryItem(InventoryItem),
    InventorySnapshot(InventorySnapshot),
}

macro_rules! each_record {
    ($self:expr, $r:ident => $body:expr) => {
        match $self {
            AnyRecord::Company($r) => $body,
            AnyRecord::User($r) => $body,
            AnyRecord::Client($r) => $body,
            AnyRecord::SubClient($r) => $body,
            AnyRecord::TaskType($r) => $body,
            AnyRecord::Project($r) => $body,
            AnyRecord::Task($r) => $body,
            AnyRecord::CalendarEvent($r) => $body,
            AnyRecord::InventoryUnit($r) => $body,
            AnyRecord::InventoryTag($r) => $body,
            AnyRecord::InventoryItem($r) => $body,
            AnyRecord::InventorySnapshot($r) => $body,
        }
    };
}

impl AnyRecord {
    pub fn kind(&self) -> EntityKind {
        match self {
            AnyRecord::Company(_) => EntityKind::Company,
            AnyRecord::User(_) => EntityKind::User,
            AnyRecord::Client(_) => EntityKind::Client,
            AnyRecord::SubClient(_) => EntityKind::SubClient,
            AnyRecord::TaskType(_) => EntityKind::TaskType,
            AnyRecord::Project(_) => EntityKind::Project,
            AnyRecord::Task(_) => EntityKind::ProjectTask,
            AnyRecord::CalendarEvent(_) => EntityKind::CalendarEvent,
            AnyRecord::InventoryUnit(_) => EntityKind::InventoryUnit,
            AnyRecord::InventoryTag(_) => EntityKind::InventoryTag,
            AnyRecord::InventoryItem(_) => EntityKind::InventoryItem,
            AnyRecord::InventorySnapshot(_) => EntityKind::InventorySnapshot,
        }
    }

    pub fn id(&self) -> &str {
        each_record!(self, r => &r.id)
    }

    pub fn set_id(&mut self, id: String) {
        each_record!(self, r => r.id = id);
    }

    pub fn meta(&self) -> &SyncMeta {
        each_record!(self, r => &r.meta)
    }

    pub fn meta_mut(&mut self) -> &mut SyncMeta {
        each_record!(self, r => &mut r.meta)
    }

    /// 作用域外键（记录集的 parent_id 列）：
    /// Company 无；User/Client/TaskType/Inventory* 挂 company；
    /// SubClient 挂 client；Task/CalendarEvent 挂 project。
    pub fn parent_id(&self) -> Option<&str> {
        match self {
            AnyRecord::Company(_) => None,
            AnyRecord::User(u) => u.company_id.as_deref(),
            AnyRecord::Client(c) => Some(&c.company_id),
            AnyRecord::SubClient(s) => Some(&s.client_id),
            AnyRecord::TaskType(t) => Some(&t.company_id),
            AnyRecord::Project(p) => Some(&p.company_id),
            AnyRecord::Task(t) => Some(&t.project_id),
            AnyRecord::CalendarEvent(e) => Some(&e.project_id),
            AnyRecord::InventoryUnit(u) => Some(&u.company_id),
            AnyRecord::InventoryTag(t) => Some(&t.company_id),
            AnyRecord::InventoryItem(i) => Some(&i.company_id),
            AnyRecord::InventorySnapshot(s) => Some(&s.company_id),
        }
    }

    /// payload JSON（不含同步控制字段）
    pub fn to_payload(&self) -> serde_json::Result<String> {
        each_record!(self, r => serde_json::to_string(r))
    }

    /// 从 payload JSON 还原（meta 由调用方用列值回填）
    pub fn from_payload(kind: EntityKind, payload: &str) -> serde_json::Result<AnyRecord> {
        Ok(match kind {
            EntityKind::Company => AnyRecord::Company(serde_json::from_str(payload)?),
            EntityKind::User => AnyRecord::User(serde_json::from_str(payload)?),
            EntityKind::Client => AnyRecord::Client(serde_json::from_str(payload)?),
            EntityKind::SubClient => AnyRecord::SubClient(serde_json::from_str(payload)?),
            EntityKind::TaskType => AnyRecord::TaskType(serde_json::from_str(payload)?),
            EntityKind::Project => AnyRecord::Project(serde_json::from_str(payload)?),
            EntityKind::ProjectTask => AnyRecord::Task(serde_json::from_str(payload)?),
            EntityKind::CalendarEvent => AnyRecord::CalendarEvent(serde_json::from_str(payload)?),
            EntityKind::InventoryUnit => AnyRecord::InventoryUnit(serde_json::from_str(payload)?),
            EntityKind::InventoryTag => AnyRecord::InventoryTag(serde_json::from_str(payload)?),
            EntityKind::InventoryItem => AnyRecord::InventoryItem(serde_json::from_str(payload)?),
            EntityKind::InventorySnapshot => {
                AnyRecord::InventorySnapshot(serde_json::from_str(payload)?)
            }
        })
    }

    /// 本记录引用到的其他记录 id（用于判断是否还引用着本地占位 id）
    pub fn referenced_ids(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        match self {
            AnyRecord::Company(c) => {
                out.extend(c.owner_user_id.as_deref());
                out.extend(c.team_member_ids.iter().map(|s| s.as_str()));
                out.extend(c.client_ids.iter().map(|s| s.as_str()));
            }
            AnyRecord::User(u) => out.extend(u.company_id.as_deref()),
            AnyRecord::Client(c) => {
                out.push(&c.company_id);
                out.extend(c.sub_client_ids.iter().map(|s| s.as_str()));
            }
            AnyRecord::SubClient(s) => out.push(&s.client_id),
            AnyRecord::TaskType(t) => out.push(&t.company_id),
            AnyRecord::Project(p) => {
                out.push(&p.company_id);
                out.extend(p.client_id.as_deref());
                out.extend(p.sub_client_id.as_deref());
                out.extend(p.team_member_ids.iter().map(|s| s.as_str()));
            }
            AnyRecord::Task(t) => {
                out.push(&t.project_id);
                out.extend(t.task_type_id.as_deref());
                out.extend(t.assigned_member_ids.iter().map(|s| s.as_str()));
            }
            AnyRecord::CalendarEvent(e) => {
                out.push(&e.project_id);
                out.extend(e.task_id.as_deref());
            }
            AnyRecord::InventoryUnit(u) => out.push(&u.company_id),
            AnyRecord::InventoryTag(t) => out.push(&t.company_id),
            AnyRecord::InventoryItem(i) => {
                out.push(&i.company_id);
                out.extend(i.unit_id.as_deref());
                out.extend(i.tag_ids.iter().map(|s| s.as_str()));
            }
            AnyRecord::InventorySnapshot(s) => {
                out.push(&s.company_id);
                out.push(&s.item_id);
            }
        }
        out
    }

    /// 是否仍引用本地占位 id（推送需等被引用记录先拿到服务端 id）
    pub fn references_local_placeholder(&self) -> bool {
        self.referenced_ids().iter().any(|id| is_local_id(id))
    }

    /// 把所有等于 old 的引用 id 换成 new；返回是否有改动。
    /// 本地记录首次推送成功、换取服务端 id 后由 store actor 调用。
    pub fn replace_ref(&mut self, old: &str, new: &str) -> bool {
        fn fix(field: &mut String, old: &str, new: &str) -> bool {
            if field == old {
                *field = new.to_string();
                true
            } else {
                false
            }
        }
        fn fix_opt(field: &mut Option<String>, old: &str, new: &str) -> bool {
            match field {
                Some(v) => fix(v, old, new),
                None => false,
            }
        }
        fn fix_list(list: &mut [String], old: &str, new: &str) -> bool {
            let mut changed = false;
            for v in list.iter_mut() {
                changed |= fix(v, old, new);
            }
            changed
        }

        match self {
            AnyRecord::Company(c) => {
                fix_opt(&mut c.owner_user_id, old, new)
                    | fix_list(&mut c.team_member_ids, old, new)
                    | fix_list(&mut c.client_ids, old, new)
            }
            AnyRecord::User(u) => fix_opt(&mut u.company_id, old, new),
            AnyRecord::Client(c) => {
                fix(&mut c.company_id, old, new) | fix_list(&mut c.sub_client_ids, old, new)
            }
            AnyRecord::SubClient(s) => fix(&mut s.client_id, old, new),
            AnyRecord::TaskType(t) => fix(&mut t.company_id, old, new),
            AnyRecord::Project(p) => {
                fix(&mut p.company_id, old, new)
                    | fix_opt(&mut p.client_id, old, new)
                    | fix_opt(&mut p.sub_client_id, old, new)
                    | fix_list(&mut p.team_member_ids, old, new)
            }
            AnyRecord::Task(t) => {
                fix(&mut t.project_id, old, new)
                    | fix_opt(&mut t.task_type_id, old, new)
                    | fix_list(&mut t.assigned_member_ids, old, new)
            }
            AnyRecord::CalendarEvent(e) => {
                fix(&mut e.project_id, old, new) | fix_opt(&mut e.task_id, old, new)
            }
            AnyRecord::InventoryUnit(u) => fix(&mut u.company_id, old, new),
            AnyRecord::InventoryTag(t) => fix(&mut t.company_id, old, new),
            AnyRecord::InventoryItem(i) => {
                fix(&mut i.company_id, old, new)
                    | fix_opt(&mut i.unit_id, old, new)
                    | fix_list(&mut i.tag_ids, old, new)
            }
            AnyRecord::InventorySnapshot(s) => {
                fix(&mut s.company_id, old, new) | fix(&mut s.item_id, old, new)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(critical: Option<i64>, warning: Option<i64>) -> InventoryTag {
        InventoryTag {
            id: "tag-1".into(),
            company_id: "co-1".into(),
            name: "Consumables".into(),
            warning_threshold: warning,
            critical_threshold: critical,
            ..Default::default()
        }
    }

    #[test]
    fn test_threshold_stacking_tag_only() {
        // 物料无阈值，标签 critical=5，数量 4 → Critical
        let item = InventoryItem {
            id: "item-1".into(),
            company_id: "co-1".into(),
            name: "Screws".into(),
            quantity: 4,
            tag_ids: vec!["tag-1".into()],
            ..Default::default()
        };
        let tags = vec![tag(Some(5), None)];
        assert_eq!(
            item.effective_threshold_status(&tags),
            ThresholdStatus::Critical
        );
    }

    #[test]
    fn test_threshold_stricter_wins() {
        // 阈值「≤ 触发」：数值更大的更严格，生效阈值取大者
        let item = InventoryItem {
            quantity: 8,
            warning_threshold: Some(3),
            ..Default::default()
        };
        let tags = vec![tag(None, Some(10))];
        assert_eq!(item.effective_warning_threshold(&tags), Some(10));
        assert_eq!(
            item.effective_threshold_status(&tags),
            ThresholdStatus::Warning
        );
    }

    #[test]
    fn test_threshold_critical_beats_warning() {
        let item = InventoryItem {
            quantity: 2,
            warning_threshold: Some(10),
            critical_threshold: Some(2),
            ..Default::default()
        };
        assert_eq!(
            item.effective_threshold_status(&[]),
            ThresholdStatus::Critical
        );
    }

    #[test]
    fn test_threshold_no_thresholds() {
        let item = InventoryItem {
            quantity: 0,
            ..Default::default()
        };
        assert_eq!(item.effective_threshold_status(&[]), ThresholdStatus::Normal);
    }

    #[test]
    fn test_task_reactivate_only_from_cancelled() {
        let mut task = ProjectTask {
            status: TaskStatus::Cancelled,
            ..Default::default()
        };
        assert!(task.reactivate());
        assert_eq!(task.status, TaskStatus::Active);

        let mut done = ProjectTask {
            status: TaskStatus::Completed,
            ..Default::default()
        };
        assert!(!done.reactivate());
        assert_eq!(done.status, TaskStatus::Completed);
    }

    #[test]
    fn test_project_status_parse_tolerant() {
        assert_eq!(ProjectStatus::parse("RFQ"), Some(ProjectStatus::Rfq));
        assert_eq!(
            ProjectStatus::parse("In Progress"),
            Some(ProjectStatus::InProgress)
        );
        assert_eq!(
            ProjectStatus::parse("in_progress"),
            Some(ProjectStatus::InProgress)
        );
        assert_eq!(ProjectStatus::parse("archived"), Some(ProjectStatus::Archived));
        assert_eq!(ProjectStatus::parse("whatever"), None);
    }

    #[test]
    fn test_event_category_inferred_from_task_id() {
        let project_level = CalendarEvent {
            project_id: "p-1".into(),
            ..Default::default()
        };
        assert_eq!(project_level.effective_category(), EventCategory::Project);

        let task_level = CalendarEvent {
            project_id: "p-1".into(),
            task_id: Some("t-1".into()),
            ..Default::default()
        };
        assert_eq!(task_level.effective_category(), EventCategory::Task);
    }

    #[test]
    fn test_payload_roundtrip_skips_meta() {
        let mut project = Project {
            id: "p-1".into(),
            company_id: "co-1".into(),
            name: "Roof replacement".into(),
            status: ProjectStatus::Accepted,
            ..Default::default()
        };
        project.meta.needs_sync = true;

        let payload = AnyRecord::Project(project.clone()).to_payload().unwrap();
        let restored = AnyRecord::from_payload(EntityKind::Project, &payload).unwrap();
        match restored {
            AnyRecord::Project(p) => {
                assert_eq!(p.id, "p-1");
                assert_eq!(p.status, ProjectStatus::Accepted);
                // meta 不进 payload，反序列化后为缺省值
                assert!(!p.meta.needs_sync);
            }
            other => panic!("unexpected record: {:?}", other),
        }
    }

    #[test]
    fn test_replace_ref_rewrites_fk_and_lists() {
        let mut rec = AnyRecord::Task(ProjectTask {
            id: "t-1".into(),
            project_id: "local-abc".into(),
            assigned_member_ids: vec!["u-1".into(), "local-abc".into()],
            ..Default::default()
        });
        assert!(rec.references_local_placeholder());
        assert!(rec.replace_ref("local-abc", "srv-9"));
        match rec {
            AnyRecord::Task(t) => {
                assert_eq!(t.project_id, "srv-9");
                assert_eq!(t.assigned_member_ids, vec!["u-1".to_string(), "srv-9".to_string()]);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_snapshot_capture_copies_item_state() {
        let item = InventoryItem {
            id: "item-7".into(),
            company_id: "co-1".into(),
            name: "Rebar".into(),
            quantity: 42,
            ..Default::default()
        };
        let snap = InventorySnapshot::capture(&item, Some("pcs".into()), 1_750_000_000_000);
        assert!(is_local_id(&snap.id));
        assert_eq!(snap.item_id, "item-7");
        assert_eq!(snap.quantity, 42);
        assert!(snap.meta.needs_sync);
        assert_eq!(snap.meta.sync_priority, SyncPriority::Background);
    }
}
