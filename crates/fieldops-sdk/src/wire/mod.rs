//! wire 层 - 远端表示与本地实体之间的边界
//!
//! 远端是一个托管 no-code 平台，字段命名、日期编码、引用形态都不稳定：
//! - id 在 create 响应叫 `id`，在 read 响应叫 `_id`
//! - 日期可能是 ISO-8601（带或不带毫秒），计费派生字段是 UNIX epoch 数字
//! - 引用字段有时是裸 id 字符串，有时是内嵌对象
//!
//! 这些花样全部吸收在本模块内（decode 的「按顺序试 N 种形态」），
//! 绝不泄漏给实体库或同步编排层。

pub mod decode;
pub mod http_gateway;
pub mod mapping;

use async_trait::async_trait;

use crate::error::Result;
use crate::sync::entity_type::EntityKind;
use crate::sync::SyncScope;

/// 远端的序列化记录形态
pub type WireRecord = serde_json::Value;

/// 远端网关契约（wire 层消费；传输细节、超时都在实现内部）
///
/// 软删除在 wire 记录里以 `deletedAt` 字段表达，绝不以「行缺席」表达。
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// 按类型+作用域拉取全部记录
    async fn fetch(&self, kind: EntityKind, scope: &SyncScope) -> Result<Vec<WireRecord>>;

    /// 推送一条记录，返回服务端的权威回显（create 时带服务端分配的 id）
    async fn push(&self, kind: EntityKind, record: WireRecord) -> Result<WireRecord>;
}
