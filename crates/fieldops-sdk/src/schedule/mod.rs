//! 排期 / 日历投影模块
//!
//! 职责：
//! - 从项目字段推导 effective end date（工期兜底）
//! - 多日跨度展开（spanned_dates / day_span / day_number）
//! - 排期模式状态机：按项目 event_type 重算事件 active 缓存位

pub mod projector;
pub mod span;

pub use projector::{recompute_active, should_display};
pub use span::{day_number, day_span, effective_end_millis, spanned_dates};
