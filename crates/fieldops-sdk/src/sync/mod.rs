//! 同步模块 - 离线优先的推拉协调
//!
//! 职责：
//! - 全量 / 后台 / 单公司三种同步循环
//! - 同一类型内先推后拉（自己的编辑不能被同轮的陈旧拉取冲掉）
//! - 单条失败不拖垮整轮；认证失败立刻停轮并交回认证协作方
//! - in-flight 守卫：同一时间只有一轮同步，重叠触发直接忽略

pub mod applier;
pub mod entity_type;
pub mod orchestrator;

pub use entity_type::{EntityKind, SYNC_ORDER};
pub use orchestrator::SyncOrchestrator;

/// 同步模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// 全量：固定依赖顺序逐类型推+拉
    Full,
    /// 后台：只推 dirty（按优先级），只拉被触碰的类型
    Background,
    /// 单公司范围（建司/加入后立即让依赖页面有数据）
    Company,
}

impl SyncMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Background => "background",
            Self::Company => "company",
        }
    }
}

/// 拉取作用域
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncScope {
    All,
    Company(String),
}

/// 同步状态位（UI 可见的唯一信号；失败细节只进日志）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Syncing,
    Synced,
    /// 认证失效，等待重新登录
    AuthRequired,
    Failed { error: String },
}

/// 一轮同步的结果摘要
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub mode: SyncMode,
    pub started_at: i64,
    pub finished_at: i64,
    /// 确认推送成功的记录数
    pub pushed: usize,
    /// 应用成功的拉取记录数
    pub pulled: usize,
    /// 推送失败（保持 dirty，下一轮重试）的记录数
    pub failed_pushes: usize,
    /// 本轮拉取被跳过的类型（传输失败）
    pub skipped_kinds: Vec<EntityKind>,
    /// 因认证失败而提前停轮
    pub auth_failed: bool,
}

impl SyncReport {
    pub fn new(mode: SyncMode) -> Self {
        Self {
            mode,
            started_at: chrono::Utc::now().timestamp_millis(),
            finished_at: 0,
            pushed: 0,
            pulled: 0,
            failed_pushes: 0,
            skipped_kinds: Vec::new(),
            auth_failed: false,
        }
    }

    /// 本轮是否完全干净（没有失败、没有跳过）
    pub fn is_clean(&self) -> bool {
        !self.auth_failed && self.failed_pushes == 0 && self.skipped_kinds.is_empty()
    }
}
