//! 推送优先级 - dirty 记录的排序依据
//!
//! 弱网环境下推送带宽有限，优先级决定 dirty 记录的推送顺序：
//! - Critical: 项目状态流转（工地上的状态变化要第一时间回到办公室）
//! - High: 影响排期的编辑（日期、工期、排期模式）、软删除
//! - Normal: 普通字段编辑
//! - Low: 批量导入等可延迟的写入
//! - Background: 派生数据、快照等后台记录
//!
//! 同优先级之间不保证顺序。

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SyncPriority {
    Critical = 0,   // 状态流转
    High = 1,       // 排期相关编辑、删除
    Normal = 2,     // 普通编辑
    Low = 3,        // 批量写入
    Background = 4, // 派生数据、快照
}

impl SyncPriority {
    /// 优先级数值（存储列用，数值越小越优先）
    pub fn value(&self) -> u8 {
        *self as u8
    }

    pub fn from_value(value: u8) -> Option<Self> {
        match value {
            0 => Some(SyncPriority::Critical),
            1 => Some(SyncPriority::High),
            2 => Some(SyncPriority::Normal),
            3 => Some(SyncPriority::Low),
            4 => Some(SyncPriority::Background),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SyncPriority::Critical => "critical",
            SyncPriority::High => "high",
            SyncPriority::Normal => "normal",
            SyncPriority::Low => "low",
            SyncPriority::Background => "background",
        }
    }

    /// 是否高优先级（Critical 或 High）——本地落库后会触发一次机会性后台同步
    pub fn is_high_priority(&self) -> bool {
        matches!(self, SyncPriority::Critical | SyncPriority::High)
    }

    /// 合并两次标记：同一条记录被多次 mark dirty 时保留更紧急的一档
    pub fn escalate(self, other: SyncPriority) -> SyncPriority {
        if other.value() < self.value() {
            other
        } else {
            self
        }
    }
}

impl fmt::Display for SyncPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Default for SyncPriority {
    fn default() -> Self {
        SyncPriority::Normal
    }
}

impl From<u8> for SyncPriority {
    fn from(value: u8) -> Self {
        SyncPriority::from_value(value).unwrap_or(SyncPriority::Normal)
    }
}

impl From<SyncPriority> for u8 {
    fn from(priority: SyncPriority) -> Self {
        priority.value()
    }
}
