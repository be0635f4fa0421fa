//! 实体 ↔ wire 记录的双向映射
//!
//! 解码（wire → 实体）：
//! - 所有字段名差异、日期形态、引用形态交给 `decode` 模块归一
//! - 校验性修正在此落地：end < start 抬到 start；负数量钳到 0；
//!   未知枚举值降级为缺省并 warn —— 宁要可用的降级记录，不丢记录
//!
//! 编码（实体 → wire 更新载荷）：
//! - 只带客户端拥有的字段；未设置的可选字段不出现
//! - 服务端管理的字段（createdAt/updatedAt）不回传
//! - 本地占位 id 不上行（create 由服务端分配 id）
//! - tombstone 通过 deletedAt 字段传播

use serde_json::{json, Map, Value};
use tracing::warn;

use crate::error::Result;
use crate::storage::dirty::SyncPriority;
use crate::storage::entities::{
    is_local_id, AnyRecord, CalendarEvent, Client, Company, EventCategory, EventMode,
    InventoryItem, InventorySnapshot, InventoryTag, InventoryUnit, Project, ProjectStatus,
    ProjectTask, SubClient, SyncMeta, TaskStatus, TaskType, User,
};
use crate::sync::entity_type::EntityKind;
use crate::wire::decode::{
    self, millis_to_iso, opt_bool, opt_i64, opt_millis, opt_string, ref_id, ref_id_list,
    require_id, string_or, DEFAULT_COLOR, DEFAULT_TITLE,
};
use crate::wire::WireRecord;

/// 拉取记录的 meta：业务上只有 deleted_at 有意义，其余由 store 决定
fn pulled_meta(v: &WireRecord) -> SyncMeta {
    SyncMeta {
        needs_sync: false,
        sync_priority: SyncPriority::Normal,
        last_synced_at: None,
        deleted_at: decode::deleted_at(v),
    }
}

fn created_updated(v: &WireRecord) -> (i64, i64) {
    (
        opt_millis(v, &["createdAt", "created_at"]).unwrap_or(0),
        opt_millis(v, &["updatedAt", "updated_at"]).unwrap_or(0),
    )
}

// ---------------------------------------------------------------------------
// 解码
// ---------------------------------------------------------------------------

pub fn decode_company(v: &WireRecord) -> Result<Company> {
    let (created_at, updated_at) = created_updated(v);
    Ok(Company {
        id: require_id(v)?,
        // 公司编号是人读分享码，与 id 独立，必须原样往返
        company_code: string_or(v, &["companyCode", "company_code", "code"], ""),
        name: string_or(v, &["name", "companyName"], ""),
        default_color: opt_string(v, &["defaultColor", "default_color"]),
        owner_user_id: ref_id(v, &["owner", "ownerId", "owner_id"]),
        team_member_ids: ref_id_list(v, &["teamMembers", "team_members", "members"]),
        client_ids: ref_id_list(v, &["clients", "clientIds"]),
        created_at,
        updated_at,
        meta: pulled_meta(v),
    })
}

pub fn decode_user(v: &WireRecord) -> Result<User> {
    let (created_at, updated_at) = created_updated(v);
    Ok(User {
        id: require_id(v)?,
        company_id: ref_id(v, &["company", "companyId", "company_id"]),
        name: string_or(v, &["name", "fullName", "full_name"], ""),
        email: opt_string(v, &["email"]),
        phone: opt_string(v, &["phone", "phoneNumber"]),
        role: opt_string(v, &["role"]),
        created_at,
        updated_at,
        meta: pulled_meta(v),
    })
}

pub fn decode_client(v: &WireRecord) -> Result<Client> {
    let (created_at, updated_at) = created_updated(v);
    Ok(Client {
        id: require_id(v)?,
        company_id: ref_id(v, &["company", "companyId", "company_id"]).unwrap_or_default(),
        name: string_or(v, &["name", "clientName"], ""),
        email: opt_string(v, &["email"]),
        phone: opt_string(v, &["phone", "phoneNumber"]),
        address: opt_string(v, &["address"]),
        sub_client_ids: ref_id_list(v, &["subClients", "sub_clients"]),
        created_at,
        updated_at,
        meta: pulled_meta(v),
    })
}

pub fn decode_sub_client(v: &WireRecord) -> Result<SubClient> {
    let (created_at, updated_at) = created_updated(v);
    Ok(SubClient {
        id: require_id(v)?,
        client_id: ref_id(v, &["client", "clientId", "client_id"]).unwrap_or_default(),
        name: string_or(v, &["name"], ""),
        email: opt_string(v, &["email"]),
        phone: opt_string(v, &["phone", "phoneNumber"]),
        site_notes: opt_string(v, &["siteNotes", "site_notes", "notes"]),
        created_at,
        updated_at,
        meta: pulled_meta(v),
    })
}

pub fn decode_task_type(v: &WireRecord) -> Result<TaskType> {
    let (created_at, updated_at) = created_updated(v);
    Ok(TaskType {
        id: require_id(v)?,
        company_id: ref_id(v, &["company", "companyId", "company_id"]).unwrap_or_default(),
        name: string_or(v, &["name"], ""),
        color: opt_string(v, &["color"]),
        created_at,
        updated_at,
        meta: pulled_meta(v),
    })
}

pub fn decode_project(v: &WireRecord) -> Result<Project> {
    let id = require_id(v)?;
    let (created_at, updated_at) = created_updated(v);

    let status_raw = opt_string(v, &["status", "projectStatus", "project_status"]);
    let status = match status_raw.as_deref() {
        None => ProjectStatus::default(),
        Some(s) => ProjectStatus::parse(s).unwrap_or_else(|| {
            warn!(id = %id, status = s, "未知项目状态，降级为缺省");
            ProjectStatus::default()
        }),
    };

    let start_date = opt_millis(v, &["startDate", "start_date"]);
    let mut end_date = opt_millis(v, &["endDate", "end_date"]);
    // 校验性修正：end 早于 start 抬到 start（不拒收记录）
    if let (Some(s), Some(e)) = (start_date, end_date) {
        if e < s {
            warn!(id = %id, "endDate 早于 startDate，修正为 startDate");
            end_date = Some(s);
        }
    }

    let duration_days = opt_i64(v, &["duration", "durationDays", "duration_days"]);
    if matches!(duration_days, Some(d) if d < 0) {
        // 负工期多半是录入错误；行为上与 0 一样坍缩成单日，这里只留痕
        warn!(id = %id, duration = duration_days, "负数工期（疑似录入错误）");
    }

    Ok(Project {
        id,
        company_id: ref_id(v, &["company", "companyId", "company_id"]).unwrap_or_default(),
        client_id: ref_id(v, &["client", "clientId", "client_id"]),
        sub_client_id: ref_id(v, &["subClient", "sub_client", "subClientId"]),
        name: string_or(v, &["name", "projectName"], ""),
        display_name: opt_string(v, &["displayName", "display_name"]),
        status,
        start_date,
        end_date,
        duration_days,
        event_type: opt_string(v, &["eventType", "event_type"]).and_then(|s| EventMode::parse(&s)),
        color: opt_string(v, &["color"]),
        team_member_ids: ref_id_list(v, &["teamMembers", "team_members", "assignees"]),
        notes: opt_string(v, &["notes"]),
        created_at,
        updated_at,
        meta: pulled_meta(v),
    })
}

pub fn decode_task(v: &WireRecord) -> Result<ProjectTask> {
    let id = require_id(v)?;
    let (created_at, updated_at) = created_updated(v);
    let status = match opt_string(v, &["status"]).as_deref() {
        None => TaskStatus::default(),
        Some(s) => TaskStatus::parse(s).unwrap_or_else(|| {
            warn!(id = %id, status = s, "未知任务状态，降级为 Active");
            TaskStatus::default()
        }),
    };
    Ok(ProjectTask {
        id,
        project_id: ref_id(v, &["project", "projectId", "project_id"]).unwrap_or_default(),
        name: string_or(v, &["name", "title"], ""),
        status,
        task_type_id: ref_id(v, &["taskType", "task_type", "taskTypeId"]),
        start_date: opt_millis(v, &["startDate", "start_date"]),
        end_date: opt_millis(v, &["endDate", "end_date"]),
        assigned_member_ids: ref_id_list(v, &["assignees", "assignedTo", "assigned_to"]),
        sort_order: opt_i64(v, &["sortOrder", "sort_order", "order"]).unwrap_or(0),
        created_at,
        updated_at,
        meta: pulled_meta(v),
    })
}

pub fn decode_calendar_event(v: &WireRecord) -> Result<CalendarEvent> {
    let id = require_id(v)?;
    let (created_at, updated_at) = created_updated(v);

    let start_date = opt_millis(v, &["startDate", "start_date", "date"]);
    let mut end_date = opt_millis(v, &["endDate", "end_date"]);
    if let (Some(s), Some(e)) = (start_date, end_date) {
        if e < s {
            warn!(id = %id, "事件 endDate 早于 startDate，修正为 startDate");
            end_date = Some(s);
        }
    }

    Ok(CalendarEvent {
        id,
        project_id: ref_id(v, &["project", "projectId", "project_id"]).unwrap_or_default(),
        task_id: ref_id(v, &["task", "taskId", "task_id"]),
        // 缺 type 时留 None，由 effective_category 按 task_id 推断（无 task → project）
        category: opt_string(v, &["type", "category", "eventType"])
            .and_then(|s| EventCategory::parse(&s)),
        title: string_or(v, &["title", "name"], DEFAULT_TITLE),
        color: Some(string_or(v, &["color"], DEFAULT_COLOR)),
        start_date,
        end_date,
        active: opt_bool(v, &["active", "isActive", "is_active"]),
        created_at,
        updated_at,
        meta: pulled_meta(v),
    })
}

pub fn decode_inventory_unit(v: &WireRecord) -> Result<InventoryUnit> {
    let (created_at, updated_at) = created_updated(v);
    Ok(InventoryUnit {
        id: require_id(v)?,
        company_id: ref_id(v, &["company", "companyId", "company_id"]).unwrap_or_default(),
        name: string_or(v, &["name"], ""),
        abbreviation: opt_string(v, &["abbreviation", "abbr"]),
        created_at,
        updated_at,
        meta: pulled_meta(v),
    })
}

pub fn decode_inventory_tag(v: &WireRecord) -> Result<InventoryTag> {
    let (created_at, updated_at) = created_updated(v);
    Ok(InventoryTag {
        id: require_id(v)?,
        company_id: ref_id(v, &["company", "companyId", "company_id"]).unwrap_or_default(),
        name: string_or(v, &["name"], ""),
        color: opt_string(v, &["color"]),
        warning_threshold: opt_i64(v, &["warningThreshold", "warning_threshold"]),
        critical_threshold: opt_i64(v, &["criticalThreshold", "critical_threshold"]),
        created_at,
        updated_at,
        meta: pulled_meta(v),
    })
}

pub fn decode_inventory_item(v: &WireRecord) -> Result<InventoryItem> {
    let id = require_id(v)?;
    let (created_at, updated_at) = created_updated(v);
    let mut quantity = opt_i64(v, &["quantity", "qty"]).unwrap_or(0);
    if quantity < 0 {
        warn!(id = %id, quantity, "负库存数量，钳到 0");
        quantity = 0;
    }
    Ok(InventoryItem {
        id,
        company_id: ref_id(v, &["company", "companyId", "company_id"]).unwrap_or_default(),
        name: string_or(v, &["name"], ""),
        quantity,
        unit_id: ref_id(v, &["unit", "unitId", "unit_id"]),
        tag_ids: ref_id_list(v, &["tags", "tagIds", "tag_ids"]),
        warning_threshold: opt_i64(v, &["warningThreshold", "warning_threshold"]),
        critical_threshold: opt_i64(v, &["criticalThreshold", "critical_threshold"]),
        created_at,
        updated_at,
        meta: pulled_meta(v),
    })
}

pub fn decode_inventory_snapshot(v: &WireRecord) -> Result<InventorySnapshot> {
    Ok(InventorySnapshot {
        id: require_id(v)?,
        company_id: ref_id(v, &["company", "companyId", "company_id"]).unwrap_or_default(),
        item_id: ref_id(v, &["item", "itemId", "item_id"]).unwrap_or_default(),
        item_name: string_or(v, &["itemName", "item_name", "name"], ""),
        quantity: opt_i64(v, &["quantity", "qty"]).unwrap_or(0),
        unit_name: opt_string(v, &["unitName", "unit_name"]),
        // 快照时间走计费侧管道，wire 端是 epoch 数字
        taken_at: opt_millis(v, &["takenAt", "taken_at", "timestamp"]).unwrap_or(0),
        meta: pulled_meta(v),
    })
}

/// 解码分发：kind → 对应实体
pub fn decode_record(kind: EntityKind, v: &WireRecord) -> Result<AnyRecord> {
    Ok(match kind {
        EntityKind::Company => AnyRecord::Company(decode_company(v)?),
        EntityKind::User => AnyRecord::User(decode_user(v)?),
        EntityKind::Client => AnyRecord::Client(decode_client(v)?),
        EntityKind::SubClient => AnyRecord::SubClient(decode_sub_client(v)?),
        EntityKind::TaskType => AnyRecord::TaskType(decode_task_type(v)?),
        EntityKind::Project => AnyRecord::Project(decode_project(v)?),
        EntityKind::ProjectTask => AnyRecord::Task(decode_task(v)?),
        EntityKind::CalendarEvent => AnyRecord::CalendarEvent(decode_calendar_event(v)?),
        EntityKind::InventoryUnit => AnyRecord::InventoryUnit(decode_inventory_unit(v)?),
        EntityKind::InventoryTag => AnyRecord::InventoryTag(decode_inventory_tag(v)?),
        EntityKind::InventoryItem => AnyRecord::InventoryItem(decode_inventory_item(v)?),
        EntityKind::InventorySnapshot => {
            AnyRecord::InventorySnapshot(decode_inventory_snapshot(v)?)
        }
    })
}

// ---------------------------------------------------------------------------
// 编码
// ---------------------------------------------------------------------------

struct PayloadBuilder {
    map: Map<String, Value>,
}

impl PayloadBuilder {
    /// id 与 tombstone 是所有实体共同的编码规则
    fn new(id: &str, meta: &SyncMeta) -> Self {
        let mut map = Map::new();
        if !is_local_id(id) {
            map.insert("id".to_string(), json!(id));
        }
        if let Some(deleted_at) = meta.deleted_at {
            map.insert("deletedAt".to_string(), json!(millis_to_iso(deleted_at)));
        }
        Self { map }
    }

    fn set(mut self, key: &str, value: Value) -> Self {
        self.map.insert(key.to_string(), value);
        self
    }

    fn set_opt_str(mut self, key: &str, value: &Option<String>) -> Self {
        if let Some(v) = value {
            self.map.insert(key.to_string(), json!(v));
        }
        self
    }

    fn set_opt_date(mut self, key: &str, value: Option<i64>) -> Self {
        if let Some(ms) = value {
            self.map.insert(key.to_string(), json!(millis_to_iso(ms)));
        }
        self
    }

    fn set_opt_i64(mut self, key: &str, value: Option<i64>) -> Self {
        if let Some(v) = value {
            self.map.insert(key.to_string(), json!(v));
        }
        self
    }

    fn build(self) -> WireRecord {
        Value::Object(self.map)
    }
}

pub fn encode_company(c: &Company) -> WireRecord {
    PayloadBuilder::new(&c.id, &c.meta)
        .set("companyCode", json!(c.company_code))
        .set("name", json!(c.name))
        .set_opt_str("defaultColor", &c.default_color)
        .set_opt_str("owner", &c.owner_user_id)
        .set("teamMembers", json!(c.team_member_ids))
        .set("clients", json!(c.client_ids))
        .build()
}

pub fn encode_user(u: &User) -> WireRecord {
    PayloadBuilder::new(&u.id, &u.meta)
        .set_opt_str("company", &u.company_id)
        .set("name", json!(u.name))
        .set_opt_str("email", &u.email)
        .set_opt_str("phone", &u.phone)
        .set_opt_str("role", &u.role)
        .build()
}

pub fn encode_client(c: &Client) -> WireRecord {
    PayloadBuilder::new(&c.id, &c.meta)
        .set("company", json!(c.company_id))
        .set("name", json!(c.name))
        .set_opt_str("email", &c.email)
        .set_opt_str("phone", &c.phone)
        .set_opt_str("address", &c.address)
        .set("subClients", json!(c.sub_client_ids))
        .build()
}

pub fn encode_sub_client(s: &SubClient) -> WireRecord {
    PayloadBuilder::new(&s.id, &s.meta)
        .set("client", json!(s.client_id))
        .set("name", json!(s.name))
        .set_opt_str("email", &s.email)
        .set_opt_str("phone", &s.phone)
        .set_opt_str("siteNotes", &s.site_notes)
        .build()
}

pub fn encode_task_type(t: &TaskType) -> WireRecord {
    PayloadBuilder::new(&t.id, &t.meta)
        .set("company", json!(t.company_id))
        .set("name", json!(t.name))
        .set_opt_str("color", &t.color)
        .build()
}

pub fn encode_project(p: &Project) -> WireRecord {
    let mut b = PayloadBuilder::new(&p.id, &p.meta)
        .set("company", json!(p.company_id))
        .set_opt_str("client", &p.client_id)
        .set_opt_str("subClient", &p.sub_client_id)
        .set("name", json!(p.name))
        .set_opt_str("displayName", &p.display_name)
        .set("status", json!(p.status.as_str()))
        .set_opt_date("startDate", p.start_date)
        .set_opt_date("endDate", p.end_date)
        .set_opt_i64("duration", p.duration_days)
        .set_opt_str("color", &p.color)
        .set("teamMembers", json!(p.team_member_ids))
        .set_opt_str("notes", &p.notes);
    if let Some(mode) = p.event_type {
        b = b.set("eventType", json!(mode.as_str()));
    }
    b.build()
}

pub fn encode_task(t: &ProjectTask) -> WireRecord {
    PayloadBuilder::new(&t.id, &t.meta)
        .set("project", json!(t.project_id))
        .set("name", json!(t.name))
        .set("status", json!(t.status.as_str()))
        .set_opt_str("taskType", &t.task_type_id)
        .set_opt_date("startDate", t.start_date)
        .set_opt_date("endDate", t.end_date)
        .set("assignees", json!(t.assigned_member_ids))
        .set("sortOrder", json!(t.sort_order))
        .build()
}

pub fn encode_calendar_event(e: &CalendarEvent) -> WireRecord {
    let mut b = PayloadBuilder::new(&e.id, &e.meta)
        .set("project", json!(e.project_id))
        .set_opt_str("task", &e.task_id)
        .set("type", json!(e.effective_category().as_str()))
        .set("title", json!(e.title))
        .set_opt_str("color", &e.color)
        .set_opt_date("startDate", e.start_date)
        .set_opt_date("endDate", e.end_date);
    if let Some(active) = e.active {
        b = b.set("active", json!(active));
    }
    b.build()
}

pub fn encode_inventory_unit(u: &InventoryUnit) -> WireRecord {
    PayloadBuilder::new(&u.id, &u.meta)
        .set("company", json!(u.company_id))
        .set("name", json!(u.name))
        .set_opt_str("abbreviation", &u.abbreviation)
        .build()
}

pub fn encode_inventory_tag(t: &InventoryTag) -> WireRecord {
    PayloadBuilder::new(&t.id, &t.meta)
        .set("company", json!(t.company_id))
        .set("name", json!(t.name))
        .set_opt_str("color", &t.color)
        .set_opt_i64("warningThreshold", t.warning_threshold)
        .set_opt_i64("criticalThreshold", t.critical_threshold)
        .build()
}

pub fn encode_inventory_item(i: &InventoryItem) -> WireRecord {
    PayloadBuilder::new(&i.id, &i.meta)
        .set("company", json!(i.company_id))
        .set("name", json!(i.name))
        .set("quantity", json!(i.quantity))
        .set_opt_str("unit", &i.unit_id)
        .set("tags", json!(i.tag_ids))
        .set_opt_i64("warningThreshold", i.warning_threshold)
        .set_opt_i64("criticalThreshold", i.critical_threshold)
        .build()
}

pub fn encode_inventory_snapshot(s: &InventorySnapshot) -> WireRecord {
    PayloadBuilder::new(&s.id, &s.meta)
        .set("company", json!(s.company_id))
        .set("item", json!(s.item_id))
        .set("itemName", json!(s.item_name))
        .set("quantity", json!(s.quantity))
        .set_opt_str("unitName", &s.unit_name)
        // 快照时间走计费侧管道，按 epoch 毫秒上行
        .set("takenAt", json!(s.taken_at))
        .build()
}

/// 编码分发：实体 → wire 更新载荷
pub fn encode_record(record: &AnyRecord) -> WireRecord {
    match record {
        AnyRecord::Company(c) => encode_company(c),
        AnyRecord::User(u) => encode_user(u),
        AnyRecord::Client(c) => encode_client(c),
        AnyRecord::SubClient(s) => encode_sub_client(s),
        AnyRecord::TaskType(t) => encode_task_type(t),
        AnyRecord::Project(p) => encode_project(p),
        AnyRecord::Task(t) => encode_task(t),
        AnyRecord::CalendarEvent(e) => encode_calendar_event(e),
        AnyRecord::InventoryUnit(u) => encode_inventory_unit(u),
        AnyRecord::InventoryTag(t) => encode_inventory_tag(t),
        AnyRecord::InventoryItem(i) => encode_inventory_item(i),
        AnyRecord::InventorySnapshot(s) => encode_inventory_snapshot(s),
    }
}
