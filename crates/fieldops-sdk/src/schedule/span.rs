//! 多日跨度计算
//!
//! 约定（与日历视图一致）：
//! - 日期字段是 UTC 毫秒时间戳，跨度按 UTC 日历日归一
//! - end date 是「完工标记日」＝最后一个工作日的次日，本身不是工作日，
//!   所以展开区间是 [start_day, end_day)（end 日排除）
//! - 工期 duration 缺省 1 天；0 和负数都坍缩成 end = start
//!   （负数可能是录入错误，wire 层解码时会 warn，这里不改写存储值）

use chrono::{DateTime, NaiveDate, Utc};

use crate::storage::entities::{CalendarEvent, Project};

const DAY_MS: i64 = 86_400_000;

/// UTC 毫秒时间戳 → UTC 日历日
pub fn to_day(millis: i64) -> NaiveDate {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|dt| dt.date_naive())
        .unwrap_or_default()
}

/// effective end date 推导：
/// - end 存在且 ≥ start → 用 end
/// - 否则 start + max(0, duration − 1) 天，duration 缺省 1
pub fn effective_end_millis(start: i64, end: Option<i64>, duration_days: Option<i64>) -> i64 {
    if let Some(e) = end {
        if e >= start {
            return e;
        }
    }
    let duration = duration_days.unwrap_or(1);
    start + duration.saturating_sub(1).max(0) * DAY_MS
}

/// 跨度内的日历日列表：
/// - start 与 end 同一日 → 单日事件，`[start_day]`
/// - 否则 [start_day, end_day)，end 日排除
pub fn spanned_dates(start: i64, effective_end: i64) -> Vec<NaiveDate> {
    let first = to_day(start);
    let end_day = to_day(effective_end);
    if end_day <= first {
        return vec![first];
    }
    let mut out = Vec::new();
    let mut day = first;
    while day < end_day {
        out.push(day);
        day = day.succ_opt().unwrap_or(day);
        if out.len() > 10_000 {
            // 异常数据兜底，避免脏日期把日历撑爆
            break;
        }
    }
    out
}

/// 跨度天数，最小 1
pub fn day_span(start: i64, effective_end: i64) -> u32 {
    spanned_dates(start, effective_end).len().max(1) as u32
}

/// date 在跨度内的 1-based 序号；不在跨度内返回 None
pub fn day_number(start: i64, effective_end: i64, date: NaiveDate) -> Option<u32> {
    let first = to_day(start);
    let end_day = to_day(effective_end);
    if end_day <= first {
        // 单日事件只有 start 当天算第 1 天
        return (date == first).then_some(1);
    }
    if date < first || date >= end_day {
        return None;
    }
    Some((date - first).num_days() as u32 + 1)
}

impl Project {
    /// effective end date（毫秒）；没有 start_date 时无意义，返回 None
    pub fn effective_end_date(&self) -> Option<i64> {
        self.start_date
            .map(|s| effective_end_millis(s, self.end_date, self.duration_days))
    }

    pub fn spanned_dates(&self) -> Vec<NaiveDate> {
        match (self.start_date, self.effective_end_date()) {
            (Some(s), Some(e)) => spanned_dates(s, e),
            _ => Vec::new(),
        }
    }

    pub fn day_span(&self) -> u32 {
        match (self.start_date, self.effective_end_date()) {
            (Some(s), Some(e)) => day_span(s, e),
            _ => 0,
        }
    }

    pub fn day_number(&self, date: NaiveDate) -> Option<u32> {
        match (self.start_date, self.effective_end_date()) {
            (Some(s), Some(e)) => day_number(s, e, date),
            _ => None,
        }
    }
}

impl CalendarEvent {
    /// 事件自身的 effective end（事件无工期字段，end 缺省坍缩为单日）
    pub fn effective_end_date(&self) -> Option<i64> {
        self.start_date
            .map(|s| effective_end_millis(s, self.end_date, None))
    }

    pub fn spanned_dates(&self) -> Vec<NaiveDate> {
        match (self.start_date, self.effective_end_date()) {
            (Some(s), Some(e)) => spanned_dates(s, e),
            _ => Vec::new(),
        }
    }

    pub fn day_span(&self) -> u32 {
        match (self.start_date, self.effective_end_date()) {
            (Some(s), Some(e)) => day_span(s, e),
            _ => 0,
        }
    }

    pub fn day_number(&self, date: NaiveDate) -> Option<u32> {
        match (self.start_date, self.effective_end_date()) {
            (Some(s), Some(e)) => day_number(s, e, date),
            _ => None,
        }
    }

    /// 事件是否落在给定日历日（日视图过滤用）
    pub fn covers_day(&self, date: NaiveDate) -> bool {
        self.day_number(date).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ms(y: i32, m: u32, d: u32) -> i64 {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc()
            .timestamp_millis()
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_single_day_project() {
        // start=2025-06-10，无 end、无 duration → 同日、span=1
        let p = Project {
            start_date: Some(ms(2025, 6, 10)),
            ..Default::default()
        };
        assert_eq!(p.effective_end_date(), Some(ms(2025, 6, 10)));
        assert_eq!(p.day_span(), 1);
        assert_eq!(p.spanned_dates(), vec![day(2025, 6, 10)]);
        assert_eq!(p.day_number(day(2025, 6, 10)), Some(1));
        assert_eq!(p.day_number(day(2025, 6, 11)), None);
    }

    #[test]
    fn test_multi_day_via_duration() {
        // duration=3 → effective_end=2025-06-12；完工日排除，只展开 10、11 两天
        let p = Project {
            start_date: Some(ms(2025, 6, 10)),
            duration_days: Some(3),
            ..Default::default()
        };
        assert_eq!(p.effective_end_date(), Some(ms(2025, 6, 12)));
        assert_eq!(p.spanned_dates(), vec![day(2025, 6, 10), day(2025, 6, 11)]);
        assert_eq!(p.day_span(), 2);
        assert_eq!(p.day_number(day(2025, 6, 11)), Some(2));
        assert_eq!(p.day_number(day(2025, 6, 12)), None);
    }

    #[test]
    fn test_explicit_end_wins_when_valid() {
        let p = Project {
            start_date: Some(ms(2025, 6, 10)),
            end_date: Some(ms(2025, 6, 13)),
            duration_days: Some(99),
            ..Default::default()
        };
        assert_eq!(p.effective_end_date(), Some(ms(2025, 6, 13)));
        assert_eq!(p.day_span(), 3);
    }

    #[test]
    fn test_end_before_start_falls_back_to_duration() {
        // end < start 不可用 → 走 duration 推导
        let p = Project {
            start_date: Some(ms(2025, 7, 1)),
            end_date: Some(ms(2025, 6, 20)),
            duration_days: Some(2),
            ..Default::default()
        };
        assert_eq!(p.effective_end_date(), Some(ms(2025, 7, 2)));
    }

    #[test]
    fn test_zero_and_negative_duration_collapse_to_start() {
        // 0 和负数都坍缩 end=start（与既有行为一致，负数不视为有效语义）
        for d in [0i64, -3] {
            let p = Project {
                start_date: Some(ms(2025, 6, 10)),
                duration_days: Some(d),
                ..Default::default()
            };
            assert_eq!(p.effective_end_date(), Some(ms(2025, 6, 10)), "duration={}", d);
            assert_eq!(p.day_span(), 1);
        }
    }

    #[test]
    fn test_effective_end_never_before_start() {
        // 推导后的不变式：effective_end ≥ start
        for (end, dur) in [
            (None, None),
            (None, Some(14)),
            (Some(ms(2025, 1, 1)), None),
            (Some(ms(2025, 1, 1)), Some(-5)),
        ] {
            let p = Project {
                start_date: Some(ms(2025, 6, 10)),
                end_date: end,
                duration_days: dur,
                ..Default::default()
            };
            assert!(p.effective_end_date().unwrap() >= p.start_date.unwrap());
        }
    }

    #[test]
    fn test_event_covers_day() {
        let e = CalendarEvent {
            start_date: Some(ms(2025, 6, 10)),
            end_date: Some(ms(2025, 6, 12)),
            ..Default::default()
        };
        assert!(e.covers_day(day(2025, 6, 10)));
        assert!(e.covers_day(day(2025, 6, 11)));
        assert!(!e.covers_day(day(2025, 6, 12)));
        assert_eq!(e.day_span(), 2);
    }

    #[test]
    fn test_mid_day_timestamps_normalize_to_calendar_days() {
        // 非整点时间戳也按日历日归一
        let start = ms(2025, 6, 10) + 9 * 3_600_000;
        let end = ms(2025, 6, 11) + 17 * 3_600_000;
        assert_eq!(spanned_dates(start, end), vec![day(2025, 6, 10)]);
        assert_eq!(day_span(start, end), 1);
    }
}
