//! 宽容字段解码器 - 「按顺序试 N 种形态」
//!
//! 每个取值函数接收一组候选 key，按顺序找第一个非 null 的值再做形态归一。
//! 解不出来一律返回 None / Decode 错误，由调用方决定缺省值。

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

use crate::error::{FieldOpsSDKError, Result};

/// 品牌默认色（wire 端缺 color 时的固定回退）
pub const DEFAULT_COLOR: &str = "#2F6FED";

/// 缺标题时的占位标题
pub const DEFAULT_TITLE: &str = "Untitled";

/// 记录 id：create 响应用 `id`，read 响应用 `_id`；数值 id 归一成字符串
pub fn require_id(v: &Value) -> Result<String> {
    opt_id(v).ok_or_else(|| FieldOpsSDKError::Decode("记录缺少 id/_id 字段".to_string()))
}

pub fn opt_id(v: &Value) -> Option<String> {
    id_from(v.get("id")).or_else(|| id_from(v.get("_id")))
}

fn id_from(v: Option<&Value>) -> Option<String> {
    match v {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

/// 第一个非 null 的字符串
pub fn opt_string(v: &Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(Value::String(s)) = v.get(key) {
            return Some(s.clone());
        }
    }
    None
}

pub fn string_or(v: &Value, keys: &[&str], default: &str) -> String {
    opt_string(v, keys).unwrap_or_else(|| default.to_string())
}

pub fn opt_i64(v: &Value, keys: &[&str]) -> Option<i64> {
    for key in keys {
        match v.get(key) {
            Some(Value::Number(n)) => return n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Some(Value::String(s)) => {
                if let Ok(parsed) = s.parse::<i64>() {
                    return Some(parsed);
                }
            }
            _ => {}
        }
    }
    None
}

pub fn opt_bool(v: &Value, keys: &[&str]) -> Option<bool> {
    for key in keys {
        match v.get(key) {
            Some(Value::Bool(b)) => return Some(*b),
            // no-code 端偶见 0/1 当布尔用
            Some(Value::Number(n)) => return n.as_i64().map(|i| i != 0),
            _ => {}
        }
    }
    None
}

/// 日期 → UTC 毫秒。接受：
/// - ISO-8601 带偏移（带或不带毫秒）
/// - 无偏移的 `YYYY-MM-DDTHH:MM:SS` / `YYYY-MM-DD HH:MM:SS`（按 UTC 读）
/// - 纯日期 `YYYY-MM-DD`（当日零点）
/// - UNIX epoch 数字，秒或毫秒自动判别（计费派生字段用这种）
pub fn opt_millis(v: &Value, keys: &[&str]) -> Option<i64> {
    for key in keys {
        match v.get(key) {
            Some(Value::Number(n)) => {
                if let Some(epoch) = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)) {
                    return Some(normalize_epoch(epoch));
                }
            }
            Some(Value::String(s)) => {
                if let Some(ms) = parse_date_str(s) {
                    return Some(ms);
                }
            }
            _ => {}
        }
    }
    None
}

/// epoch 秒/毫秒判别：绝对值 ≥ 1e11 视为毫秒（1e11 秒已是公元 5138 年）
fn normalize_epoch(epoch: i64) -> i64 {
    if epoch.abs() >= 100_000_000_000 {
        epoch
    } else {
        epoch * 1000
    }
}

fn parse_date_str(s: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc().timestamp_millis());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc().timestamp_millis());
    }
    None
}

/// UTC 毫秒 → 编码端统一的 ISO-8601（不带毫秒）
pub fn millis_to_iso(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| "1970-01-01T00:00:00Z".to_string())
}

/// 引用字段：裸 id 字符串 / 数值 id / 内嵌对象（从对象里取 id/_id）
pub fn ref_id(v: &Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        match v.get(key) {
            Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
            Some(Value::Number(n)) => return Some(n.to_string()),
            Some(obj @ Value::Object(_)) => return opt_id(obj),
            _ => {}
        }
    }
    None
}

/// 引用列表：元素同样允许裸 id 或内嵌对象；解不出的元素丢弃
pub fn ref_id_list(v: &Value, keys: &[&str]) -> Vec<String> {
    for key in keys {
        if let Some(Value::Array(items)) = v.get(key) {
            return items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) if !s.is_empty() => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    obj @ Value::Object(_) => opt_id(obj),
                    _ => None,
                })
                .collect();
        }
    }
    Vec::new()
}

/// 软删除标记（tombstone 由字段表达，不靠行缺席）
pub fn deleted_at(v: &Value) -> Option<i64> {
    opt_millis(v, &["deletedAt", "deleted_at"])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_id_create_and_read_shapes() {
        assert_eq!(require_id(&json!({"id": "abc"})).unwrap(), "abc");
        assert_eq!(require_id(&json!({"_id": "xyz"})).unwrap(), "xyz");
        // create 响应的 id 优先于 read 形态
        assert_eq!(require_id(&json!({"id": "a", "_id": "b"})).unwrap(), "a");
        assert_eq!(require_id(&json!({"_id": 42})).unwrap(), "42");
        assert!(require_id(&json!({"name": "no id"})).is_err());
        assert!(require_id(&json!({"id": ""})).is_err());
    }

    #[test]
    fn test_dates_iso_with_and_without_fraction() {
        let v = json!({
            "a": "2025-06-10T00:00:00Z",
            "b": "2025-06-10T00:00:00.250Z",
            "c": "2025-06-10T08:00:00+08:00",
            "d": "2025-06-10",
        });
        let base = 1_749_513_600_000i64; // 2025-06-10T00:00:00Z
        assert_eq!(opt_millis(&v, &["a"]), Some(base));
        assert_eq!(opt_millis(&v, &["b"]), Some(base + 250));
        assert_eq!(opt_millis(&v, &["c"]), Some(base));
        assert_eq!(opt_millis(&v, &["d"]), Some(base));
    }

    #[test]
    fn test_dates_epoch_seconds_and_millis() {
        let v = json!({
            "secs": 1_749_513_600i64,
            "millis": 1_749_513_600_000i64,
        });
        assert_eq!(opt_millis(&v, &["secs"]), Some(1_749_513_600_000));
        assert_eq!(opt_millis(&v, &["millis"]), Some(1_749_513_600_000));
    }

    #[test]
    fn test_date_key_fallback_order() {
        let v = json!({"startDate": "2025-06-10", "start_date": "2099-01-01"});
        assert_eq!(
            opt_millis(&v, &["startDate", "start_date"]),
            Some(1_749_513_600_000)
        );
        assert_eq!(opt_millis(&v, &["missing"]), None);
    }

    #[test]
    fn test_ref_bare_and_embedded() {
        let v = json!({
            "bare": "client-1",
            "embedded": {"_id": "client-2", "name": "ACME"},
            "numeric": 7,
        });
        assert_eq!(ref_id(&v, &["bare"]).as_deref(), Some("client-1"));
        assert_eq!(ref_id(&v, &["embedded"]).as_deref(), Some("client-2"));
        assert_eq!(ref_id(&v, &["numeric"]).as_deref(), Some("7"));
        assert_eq!(ref_id(&v, &["missing"]), None);
    }

    #[test]
    fn test_ref_list_mixed_shapes() {
        let v = json!({
            "teamMembers": ["u-1", {"id": "u-2"}, 3, null, {"name": "no id"}],
        });
        assert_eq!(
            ref_id_list(&v, &["teamMembers"]),
            vec!["u-1".to_string(), "u-2".to_string(), "3".to_string()]
        );
    }

    #[test]
    fn test_bool_accepts_numeric() {
        let v = json!({"active": 1, "flag": false});
        assert_eq!(opt_bool(&v, &["active"]), Some(true));
        assert_eq!(opt_bool(&v, &["flag"]), Some(false));
        assert_eq!(opt_bool(&v, &["missing"]), None);
    }

    #[test]
    fn test_millis_to_iso_roundtrip() {
        let ms = 1_749_513_600_000i64;
        let iso = millis_to_iso(ms);
        assert_eq!(iso, "2025-06-10T00:00:00Z");
        assert_eq!(parse_date_str(&iso), Some(ms));
    }

    #[test]
    fn test_deleted_at_both_spellings() {
        assert_eq!(
            deleted_at(&json!({"deletedAt": "2025-08-01T00:00:00Z"})),
            Some(1_754_006_400_000)
        );
        assert_eq!(
            deleted_at(&json!({"deleted_at": 1_754_006_400i64})),
            Some(1_754_006_400_000)
        );
        assert_eq!(deleted_at(&json!({})), None);
    }
}
