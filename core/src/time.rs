//! Time related utils.

use crate::Error;
use chrono::Utc;

/// The timestamp type used across the relay. Always UTC.
pub type DateTime = chrono::DateTime<Utc>;

/// Return the current UTC time.
pub fn now() -> DateTime {
    Utc::now()
}

/// Format a timestamp the way SAS fields expect it: RFC 3339 truncated to
/// whole seconds, `Z` suffix.
///
/// ```text
/// 2024-05-01T10:00:00Z
/// ```
pub fn format_rfc3339(t: DateTime) -> String {
    t.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Parse an RFC 3339 timestamp into a UTC DateTime.
pub fn parse_rfc3339(s: &str) -> crate::Result<DateTime> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::unexpected(format!("invalid rfc3339 timestamp: {s}")).with_source(e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_rfc3339() {
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        assert_eq!(format_rfc3339(t), "2024-05-01T10:00:00Z");
    }

    #[test]
    fn test_parse_roundtrip() {
        let t = parse_rfc3339("2024-05-01T10:00:00Z").unwrap();
        assert_eq!(format_rfc3339(t), "2024-05-01T10:00:00Z");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_rfc3339("yesterday").is_err());
    }
}
