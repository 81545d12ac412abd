//! Current time snapshot returned by `get_current_time`.

use chrono::{DateTime, Timelike};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentTime {
    /// e.g. "Friday, January 10, 2025 09:00:00 CET"
    pub formatted: String,
    /// Local wall-clock time, `YYYY-MM-DDTHH:MM:SS`
    pub iso8601: String,
    pub day_of_week: String,
    /// IANA zone name
    pub timezone: String,
    /// e.g. "+01:00"
    pub utc_offset: String,
    /// "HH:MM"
    pub hour_24: String,
}

impl CurrentTime {
    pub fn at(now: DateTime<Tz>) -> Self {
        // Sub-second precision is noise for the assistant.
        let now = now.with_nanosecond(0).unwrap_or(now);
        CurrentTime {
            formatted: now.format("%A, %B %-d, %Y %H:%M:%S %Z").to_string(),
            iso8601: now.format("%Y-%m-%dT%H:%M:%S").to_string(),
            day_of_week: now.format("%A").to_string(),
            timezone: now.timezone().name().to_string(),
            utc_offset: now.format("%:z").to_string(),
            hour_24: now.format("%H:%M").to_string(),
        }
    }
}
