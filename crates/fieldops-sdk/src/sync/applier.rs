//! 拉取结果应用器 - 把 wire 记录批量写入本地库
//!
//! 错误分级（见错误设计）：
//! - 单条解码失败：warn + 跳过，绝不因一条坏记录放弃整个类型
//! - 单条落库失败：warn + 跳过该条，其余继续
//! - store 已关闭：向上冒泡（整轮没有继续的意义）

use tracing::warn;

use crate::error::{FieldOpsSDKError, Result};
use crate::storage::StorageManager;
use crate::sync::entity_type::EntityKind;
use crate::wire::{mapping, WireRecord};

/// 应用一批拉取记录，返回成功应用的条数
pub async fn apply_batch(
    storage: &StorageManager,
    kind: EntityKind,
    records: Vec<WireRecord>,
) -> Result<usize> {
    let mut applied = 0usize;
    for wire in &records {
        let record = match mapping::decode_record(kind, wire) {
            Ok(record) => record,
            Err(e) => {
                warn!(kind = kind.as_str(), "解码失败，跳过该条: {}", e);
                continue;
            }
        };
        let id = record.id().to_string();
        match storage.apply_pulled(record).await {
            Ok(()) => applied += 1,
            Err(FieldOpsSDKError::StoreClosed) => return Err(FieldOpsSDKError::StoreClosed),
            Err(e) => {
                warn!(kind = kind.as_str(), id = %id, "落库失败，跳过该条: {}", e);
            }
        }
    }
    Ok(applied)
}
