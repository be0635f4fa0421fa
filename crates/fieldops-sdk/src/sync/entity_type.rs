//! 实体类型枚举 - 受控枚举
//!
//! 新增实体类型需同时更新：本枚举、migrations 表、wire 映射、SYNC_ORDER。

use std::str::FromStr;

/// 实体类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Company,
    User,
    Client,
    SubClient,
    TaskType,
    Project,
    ProjectTask,
    CalendarEvent,
    InventoryUnit,
    InventoryTag,
    InventoryItem,
    InventorySnapshot,
}

/// 全量同步的固定依赖顺序：父实体先于子实体，保证拉回来的外键可解析、
/// 推送时父记录先拿到服务端 id。
pub const SYNC_ORDER: [EntityKind; 12] = [
    EntityKind::Company,
    EntityKind::User,
    EntityKind::Client,
    EntityKind::SubClient,
    EntityKind::TaskType,
    EntityKind::Project,
    EntityKind::ProjectTask,
    EntityKind::CalendarEvent,
    EntityKind::InventoryUnit,
    EntityKind::InventoryTag,
    EntityKind::InventoryItem,
    EntityKind::InventorySnapshot,
];

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Company => "company",
            Self::User => "user",
            Self::Client => "client",
            Self::SubClient => "sub_client",
            Self::TaskType => "task_type",
            Self::Project => "project",
            Self::ProjectTask => "project_task",
            Self::CalendarEvent => "calendar_event",
            Self::InventoryUnit => "inventory_unit",
            Self::InventoryTag => "inventory_tag",
            Self::InventoryItem => "inventory_item",
            Self::InventorySnapshot => "inventory_snapshot",
        }
    }

    /// 本地记录集表名（与 migrations 一致；user 是 SQLite 保留风格词，SQL 里引号括起）
    pub fn table(self) -> &'static str {
        self.as_str()
    }

    /// 远端资源路径段（网关 REST 约定）
    pub fn resource(self) -> &'static str {
        match self {
            Self::Company => "companies",
            Self::User => "users",
            Self::Client => "clients",
            Self::SubClient => "sub-clients",
            Self::TaskType => "task-types",
            Self::Project => "projects",
            Self::ProjectTask => "tasks",
            Self::CalendarEvent => "calendar-events",
            Self::InventoryUnit => "inventory/units",
            Self::InventoryTag => "inventory/tags",
            Self::InventoryItem => "inventory/items",
            Self::InventorySnapshot => "inventory/snapshots",
        }
    }
}

impl FromStr for EntityKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "company" => Ok(Self::Company),
            "user" => Ok(Self::User),
            "client" => Ok(Self::Client),
            "sub_client" => Ok(Self::SubClient),
            "task_type" => Ok(Self::TaskType),
            "project" => Ok(Self::Project),
            "project_task" => Ok(Self::ProjectTask),
            "calendar_event" => Ok(Self::CalendarEvent),
            "inventory_unit" => Ok(Self::InventoryUnit),
            "inventory_tag" => Ok(Self::InventoryTag),
            "inventory_item" => Ok(Self::InventoryItem),
            "inventory_snapshot" => Ok(Self::InventorySnapshot),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
