//! Date range for searching events, and parsing of tool-supplied timestamps.

use chrono::{DateTime, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::{CalendarError, CalendarResult};

/// Half-open search window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    /// Build a range, rejecting empty or inverted windows.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> CalendarResult<Self> {
        if end <= start {
            return Err(CalendarError::validation(format!(
                "end time ({}) must be after start time ({})",
                end.to_rfc3339(),
                start.to_rfc3339()
            )));
        }
        Ok(DateRange { start, end })
    }

    /// Parse both ends of a range from tool input.
    pub fn from_args(start: &str, end: &str, tz: Tz) -> CalendarResult<Self> {
        let start = parse_datetime(start, tz)?;
        let end = parse_datetime(end, tz)?;
        Self::new(start.with_timezone(&Utc), end.with_timezone(&Utc))
    }

    /// Whether an event spanning `[start, end)` overlaps this range.
    ///
    /// Zero-length events overlap when they start inside the range.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        if end <= start {
            return start >= self.start && start < self.end;
        }
        start < self.end && end > self.start
    }

    /// `start` in CalDAV time-range format (`YYYYMMDDTHHMMSSZ`).
    pub fn caldav_start(&self) -> String {
        format_caldav_datetime(&self.start)
    }

    /// `end` in CalDAV time-range format (`YYYYMMDDTHHMMSSZ`).
    pub fn caldav_end(&self) -> String {
        format_caldav_datetime(&self.end)
    }
}

pub fn format_caldav_datetime(dt: &DateTime<Utc>) -> String {
    dt.format("%Y%m%dT%H%M%SZ").to_string()
}

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Parse an ISO 8601 timestamp supplied by the assistant.
///
/// Values with an offset or `Z` keep their instant. Naive values
/// (`2025-01-10T09:00:00`, `2025-01-10 09:00`, `2025-01-10`) are local time
/// in `tz`. Local times that fall into a DST gap are rejected.
pub fn parse_datetime(input: &str, tz: Tz) -> CalendarResult<DateTime<Tz>> {
    let input = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&tz));
    }

    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(input, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| {
            CalendarError::validation(format!(
                "Date format must be ISO 8601 (YYYY-MM-DDTHH:MM:SS). Received: {input}"
            ))
        })?;

    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Ok(dt),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest),
        LocalResult::None => Err(CalendarError::validation(format!(
            "{input} does not exist in timezone {tz} (daylight saving transition)"
        ))),
    }
}
