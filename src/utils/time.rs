//! 时间解析工具

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// 解析时间字符串
///
/// 支持 RFC3339、`%Y-%m-%d %H:%M:%S`、`%Y-%m-%dT%H:%M:%S` 以及纯日期 `%Y-%m-%d`（按 UTC 零点）。
pub fn parse_temporal(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// 当前 Unix 时间戳（毫秒）
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parse_date_only() {
        let dt = parse_temporal("2020-01-15").unwrap();
        assert_eq!((dt.year(), dt.month(), dt.day()), (2020, 1, 15));
        assert_eq!(dt.hour(), 0);
    }

    #[test]
    fn test_parse_datetime_variants() {
        assert!(parse_temporal("2020-01-15T10:30:00Z").is_some());
        assert!(parse_temporal("2020-01-15 10:30:00").is_some());
        assert!(parse_temporal("2020-01-15T10:30:00.250").is_some());
        assert!(parse_temporal("US").is_none());
        assert!(parse_temporal("42").is_none());
    }
}
