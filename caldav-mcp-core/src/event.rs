//! Calendar and event types.
//!
//! `Event` is what the ICS layer builds and parses. `EventRecord` is the
//! simplified shape handed back to tool callers.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// A calendar collection on the CalDAV server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarRef {
    /// Display name (`DAV:displayname`), used for exact-match lookup.
    pub name: String,
    /// Absolute collection URL.
    pub url: String,
    /// Identifier, unique within one listing.
    pub id: String,
}

/// A calendar event
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub uid: String,
    pub summary: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: EventTime,
    pub end: EventTime,
    pub status: EventStatus,
    pub attendees: Vec<Attendee>,

    /// RRULE and EXDATEs for master events
    pub recurrence: Option<Recurrence>,
    /// Original start of the instance this VEVENT overrides (RECURRENCE-ID)
    pub recurrence_id: Option<EventTime>,
}

/// Recurrence rule of a master event.
#[derive(Debug, Clone, PartialEq)]
pub struct Recurrence {
    /// RRULE value without the `RRULE:` prefix
    pub rrule: String,
    pub exdates: Vec<EventTime>,
}

/// An event attendee
#[derive(Debug, Clone, PartialEq)]
pub struct Attendee {
    pub name: Option<String>,
    pub email: String,
    /// Whether a reply is requested (RSVP=TRUE)
    pub rsvp: bool,
    pub response_status: Option<ParticipationStatus>,
}

impl Attendee {
    /// Attendee for a newly created event: reply requested, no answer yet.
    pub fn invite(email: impl Into<String>) -> Self {
        Attendee {
            name: None,
            email: email.into(),
            rsvp: true,
            response_status: Some(ParticipationStatus::NeedsAction),
        }
    }
}

/// PARTSTAT values from RFC 5545 that apply to VEVENT attendees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipationStatus {
    NeedsAction,
    Accepted,
    Declined,
    Tentative,
    Delegated,
}

impl ParticipationStatus {
    pub fn as_ics_str(&self) -> &'static str {
        match self {
            ParticipationStatus::NeedsAction => "NEEDS-ACTION",
            ParticipationStatus::Accepted => "ACCEPTED",
            ParticipationStatus::Declined => "DECLINED",
            ParticipationStatus::Tentative => "TENTATIVE",
            ParticipationStatus::Delegated => "DELEGATED",
        }
    }

    pub fn from_ics_str(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "NEEDS-ACTION" => Some(ParticipationStatus::NeedsAction),
            "ACCEPTED" => Some(ParticipationStatus::Accepted),
            "DECLINED" => Some(ParticipationStatus::Declined),
            "TENTATIVE" => Some(ParticipationStatus::Tentative),
            "DELEGATED" => Some(ParticipationStatus::Delegated),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    Confirmed,
    Tentative,
    Cancelled,
}

/// Start or end of an event, as written in the iCalendar object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventTime {
    /// All-day value (`VALUE=DATE`)
    Date(NaiveDate),
    /// `20250110T090000Z`
    DateTimeUtc(DateTime<Utc>),
    /// No zone at all; interpreted in the server-side default zone
    DateTimeFloating(NaiveDateTime),
    /// `DTSTART;TZID=Europe/Berlin:20250110T090000`
    DateTimeZoned { datetime: NaiveDateTime, tzid: String },
}

impl EventTime {
    pub fn is_date(&self) -> bool {
        matches!(self, EventTime::Date(_))
    }

    /// Resolve to an instant.
    ///
    /// Dates and floating times use `default_tz`, as does a TZID that
    /// chrono-tz does not know (custom VTIMEZONE names).
    pub fn to_utc(&self, default_tz: Tz) -> Option<DateTime<Utc>> {
        match self {
            EventTime::DateTimeUtc(dt) => Some(*dt),
            EventTime::Date(d) => local_to_utc(&d.and_hms_opt(0, 0, 0)?, default_tz),
            EventTime::DateTimeFloating(dt) => local_to_utc(dt, default_tz),
            EventTime::DateTimeZoned { datetime, tzid } => {
                let tz = tzid.parse::<Tz>().unwrap_or(default_tz);
                local_to_utc(datetime, tz)
            }
        }
    }

    /// Render for tool output: `YYYY-MM-DD` for dates, RFC 3339 in `tz` otherwise.
    pub fn display_in(&self, tz: Tz) -> String {
        match self {
            EventTime::Date(d) => d.format("%Y-%m-%d").to_string(),
            other => match other.to_utc(tz) {
                Some(utc) => format_rfc3339(&utc.with_timezone(&tz)),
                None => String::new(),
            },
        }
    }
}

/// Seconds-precision RFC 3339 with a numeric offset.
pub fn format_rfc3339<Z: TimeZone>(dt: &DateTime<Z>) -> String {
    dt.fixed_offset()
        .to_rfc3339_opts(chrono::SecondsFormat::Secs, false)
}

fn local_to_utc(naive: &NaiveDateTime, tz: Tz) -> Option<DateTime<Utc>> {
    match tz.from_local_datetime(naive) {
        chrono::LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        chrono::LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
        // Inside a DST gap: use the offset in effect before the gap (RFC 5545 3.3.5),
        // so 02:30 in a 02:00 -> 03:00 jump lands at 03:30.
        chrono::LocalResult::None => {
            let before_gap = tz
                .offset_from_utc_datetime(&(*naive - chrono::Duration::days(1)))
                .fix();
            Some((*naive - chrono::Duration::seconds(before_gap.local_minus_utc() as i64)).and_utc())
        }
    }
}

/// Simplified event shape returned by `get_events`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub uid: String,
    pub summary: String,
    pub start: String,
    pub end: String,
    pub all_day: bool,
    pub description: String,
    pub location: String,
    pub attendees: Vec<String>,
    /// Set for occurrences of recurring events
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub recurrence_id: Option<String>,
}
