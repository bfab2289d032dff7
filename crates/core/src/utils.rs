use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, Utc};

const LOCAL_FORMAT: &str = "%Y-%m-%d %H:%M:%S %Z";

/// Renders a stored timestamp in the local timezone, for display only.
/// Supports ISO 8601 with or without offset, SQL datetime and bare dates;
/// naive values are taken as UTC. Returns None when nothing parses.
pub fn render_local(timestamp_str: &str) -> Option<String> {
    if timestamp_str.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(timestamp_str) {
        return Some(dt.with_timezone(&Local).format(LOCAL_FORMAT).to_string());
    }

    for pattern in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive_dt) = NaiveDateTime::parse_from_str(timestamp_str, pattern) {
            let utc_dt = naive_dt.and_utc();
            return Some(utc_dt.with_timezone(&Local).format(LOCAL_FORMAT).to_string());
        }
    }

    // Date only: midnight UTC
    if let Ok(date) = NaiveDate::parse_from_str(timestamp_str, "%Y-%m-%d") {
        let utc_dt = date.and_hms_opt(0, 0, 0)?.and_utc();
        return Some(utc_dt.with_timezone(&Local).format(LOCAL_FORMAT).to_string());
    }

    None
}

/// Stored value followed by its local rendering when one exists.
pub fn describe_timestamp(timestamp_str: &str) -> String {
    match render_local(timestamp_str) {
        Some(local) if local != timestamp_str => format!("{} ({})", timestamp_str, local),
        _ => timestamp_str.to_string(),
    }
}

/// Identifier grouping all journal entries written by one invocation.
pub fn new_run_id(now: DateTime<Utc>) -> String {
    now.format("%Y%m%dT%H%M%S%.3fZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_render_local_empty() {
        assert_eq!(render_local(""), None);
    }

    #[test]
    fn test_render_local_rfc3339_with_z() {
        let result = render_local("2025-09-16T10:30:00Z").unwrap();
        // Offset of the test machine is unknown; only the shape is stable
        assert!(result.starts_with("2025-09-1"));
        assert!(result.contains(':'));
    }

    #[test]
    fn test_render_local_fractional_seconds() {
        let result = render_local("2025-09-16T10:30:00.123").unwrap();
        assert!(result.starts_with("2025-09-1"));
    }

    #[test]
    fn test_render_local_sql_format() {
        assert!(render_local("2025-09-16 10:30:00").is_some());
    }

    #[test]
    fn test_render_local_date_only() {
        assert!(render_local("2025-09-16").is_some());
    }

    #[test]
    fn test_render_local_invalid() {
        assert_eq!(render_local("not-a-timestamp"), None);
    }

    #[test]
    fn test_describe_timestamp_keeps_unparseable_value() {
        assert_eq!(describe_timestamp("garbage"), "garbage");
        assert!(describe_timestamp("2025-09-16T10:30:00Z").starts_with("2025-09-16T10:30:00Z ("));
    }

    #[test]
    fn test_new_run_id_format() {
        let now = Utc.with_ymd_and_hms(2025, 10, 5, 8, 9, 10).unwrap();
        assert_eq!(new_run_id(now), "20251005T080910.000Z");
    }
}
