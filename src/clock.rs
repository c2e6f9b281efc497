//! Wall-clock access and timestamp parsing.
//!
//! Timezone policy: every day or hour decision in the crate is made on the
//! host's local wall-clock time. Timestamps carrying an offset (`...Z`,
//! `+04:00`) are converted to local time; timestamps without one are taken
//! as local already. [`parse_local_timestamp`] is the only place that
//! policy lives.

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime};

/// Canonical calendar-day format used for archive dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Source of "now" for the scheduler and archive runs.
pub trait Clock: Send + Sync {
    /// Current local wall-clock time.
    fn now(&self) -> NaiveDateTime;

    /// Current instant as RFC 3339, used for `archived_at` stamps.
    fn now_rfc3339(&self) -> String {
        self.now().and_local_timezone(Local).earliest().map_or_else(
            || self.now().format("%Y-%m-%dT%H:%M:%S").to_string(),
            |dt| dt.to_rfc3339(),
        )
    }
}

/// The host clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }

    fn now_rfc3339(&self) -> String {
        Local::now().to_rfc3339()
    }
}

/// A clock pinned to one instant. Used by backfills and tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

/// Parse a stored timestamp into local wall-clock time.
///
/// Returns `None` for anything unreadable; callers exclude such records
/// rather than guessing a date for them.
pub fn parse_local_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Local).naive_local());
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Local calendar day of a stored timestamp.
pub fn local_date(raw: &str) -> Option<NaiveDate> {
    parse_local_timestamp(raw).map(|dt| dt.date())
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).ok()
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// The calendar day before `now`.
pub fn yesterday(now: NaiveDateTime) -> NaiveDate {
    now.date() - Duration::days(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn test_parse_naive_timestamps_as_local() {
        assert_eq!(
            parse_local_timestamp("2024-01-15T10:30:00"),
            Some(dt("2024-01-15 10:30:00"))
        );
        assert_eq!(
            parse_local_timestamp("2024-01-15 23:59:59.999"),
            Some(dt("2024-01-15 23:59:59") + Duration::milliseconds(999))
        );
        assert_eq!(
            parse_local_timestamp("2024-01-15"),
            Some(dt("2024-01-15 00:00:00"))
        );
    }

    #[test]
    fn test_parse_offset_timestamp_converts_to_local() {
        let parsed = parse_local_timestamp("2024-01-15T10:30:00Z").unwrap();
        let expected = DateTime::parse_from_rfc3339("2024-01-15T10:30:00Z")
            .unwrap()
            .with_timezone(&Local)
            .naive_local();
        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_unparsable_timestamps_are_none() {
        assert_eq!(parse_local_timestamp(""), None);
        assert_eq!(parse_local_timestamp("yesterday"), None);
        assert_eq!(parse_local_timestamp("2024-13-45T00:00:00"), None);
        assert_eq!(local_date("not a date"), None);
    }

    #[test]
    fn test_yesterday_crosses_month_boundary() {
        assert_eq!(
            yesterday(dt("2024-03-01 02:00:00")),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
    }

    #[test]
    fn test_date_format_round_trip() {
        let d = parse_date("2024-01-05").unwrap();
        assert_eq!(format_date(d), "2024-01-05");
        assert_eq!(parse_date("15/01/2024"), None);
    }
}
