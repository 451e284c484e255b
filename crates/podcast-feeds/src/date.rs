use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::error::EntryParseError;

/// Formats that carry an explicit offset, tried after RFC 2822 / RFC 3339.
const OFFSET_FORMATS: &[&str] = &[
    "%d %b %Y %H:%M:%S %z", // 01 Jan 2024 10:00:00 +0000
    "%d %b %Y %H:%M %z",    // 01 Jan 2024 10:00 +0000
    "%Y-%m-%d %H:%M:%S %z", // 2024-01-01 10:00:00 +0000
    "%Y-%m-%dT%H:%M:%S%z",  // 2024-01-01T10:00:00+0000
];

/// Offset-less formats, interpreted as UTC.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",  // 2024-01-01 10:00:00
    "%Y-%m-%dT%H:%M:%S",  // 2024-01-01T10:00:00
    "%d %b %Y %H:%M:%S",  // 01 Jan 2024 10:00:00
];

/// Parse a feed publish date into UTC.
///
/// Feeds rarely emit strict RFC 2822: weekday names that disagree with the
/// date, `UTC` instead of `GMT`, ISO timestamps inside RSS and bare dates
/// all show up in practice. Everything that is unambiguous is accepted.
pub fn parse_pub_date(raw: &str) -> Result<DateTime<Utc>, EntryParseError> {
    let s = raw.trim();
    let invalid = || EntryParseError::InvalidDate {
        raw: raw.to_string(),
    };
    if s.is_empty() {
        return Err(invalid());
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    let loose = normalise(s);
    if let Ok(dt) = DateTime::parse_from_rfc2822(&loose) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(&loose, format) {
            return Ok(dt.with_timezone(&Utc));
        }
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&loose, format) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(&loose, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(naive.and_utc());
        }
    }

    Err(invalid())
}

/// Drop a leading weekday and spell UTC / Z zones as a numeric offset.
fn normalise(s: &str) -> String {
    let mut out = match s.split_once(',') {
        Some((day, rest)) if day.chars().all(|c| c.is_ascii_alphabetic()) => rest.trim(),
        _ => s,
    }
    .to_string();

    for suffix in [" UTC", " Z"] {
        if let Some(stripped) = out.strip_suffix(suffix) {
            out = format!("{stripped} +0000");
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn rfc2822_with_gmt() {
        assert_eq!(
            parse_pub_date("Mon, 01 Jan 2024 10:00:00 GMT").unwrap(),
            utc(2024, 1, 1, 10, 0, 0)
        );
    }

    #[test]
    fn rfc2822_with_numeric_offset() {
        assert_eq!(
            parse_pub_date("Mon, 01 Jan 2024 10:00:00 -0500").unwrap(),
            utc(2024, 1, 1, 15, 0, 0)
        );
    }

    #[test]
    fn rfc3339() {
        assert_eq!(
            parse_pub_date("2024-01-01T10:00:00+02:00").unwrap(),
            utc(2024, 1, 1, 8, 0, 0)
        );
    }

    #[test]
    fn wrong_weekday_is_tolerated() {
        // 2024-01-01 was a Monday.
        assert_eq!(
            parse_pub_date("Tue, 01 Jan 2024 10:00:00 GMT").unwrap(),
            utc(2024, 1, 1, 10, 0, 0)
        );
    }

    #[test]
    fn utc_suffix() {
        assert_eq!(
            parse_pub_date("Mon, 01 Jan 2024 10:00:00 UTC").unwrap(),
            utc(2024, 1, 1, 10, 0, 0)
        );
    }

    #[test]
    fn naive_and_date_only() {
        assert_eq!(
            parse_pub_date("2024-01-01 10:00:00").unwrap(),
            utc(2024, 1, 1, 10, 0, 0)
        );
        assert_eq!(parse_pub_date(" 2024-01-01 ").unwrap(), utc(2024, 1, 1, 0, 0, 0));
    }

    #[test]
    fn garbage_is_an_entry_error() {
        assert_eq!(
            parse_pub_date("sometime last week"),
            Err(EntryParseError::InvalidDate {
                raw: "sometime last week".to_string()
            })
        );
        assert!(parse_pub_date("").is_err());
    }
}
