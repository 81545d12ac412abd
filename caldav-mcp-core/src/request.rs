//! Typed tool parameters and their validation.
//!
//! Everything here runs before any network call.

use chrono_tz::Tz;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::date_range::DateRange;
use crate::error::{CalendarError, CalendarResult};

/// Parameters for `create_event`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CreateEventRequest {
    /// Exact display name of the target calendar (see `list_calendars`).
    pub calendar_name: String,
    /// Event title.
    pub summary: String,
    /// Start in ISO 8601, e.g. "2025-01-10T09:00:00". Without an offset the
    /// server's configured timezone is used.
    pub start_time: String,
    /// End in ISO 8601. Must be after `start_time`.
    pub end_time: String,
    /// Email addresses to invite. Each attendee is asked to RSVP.
    #[serde(default)]
    pub attendees: Vec<String>,
    /// Optional free-text description.
    #[serde(default)]
    pub description: String,
    /// Optional location.
    #[serde(default)]
    pub location: String,
}

/// Parameters for `get_events`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GetEventsRequest {
    /// Exact display name of the calendar to search.
    pub calendar_name: String,
    /// Window start (inclusive), ISO 8601.
    pub start_time: String,
    /// Window end (exclusive), ISO 8601.
    pub end_time: String,
}

/// A `CreateEventRequest` that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub calendar_name: String,
    pub summary: String,
    pub range: DateRange,
    pub attendees: Vec<String>,
    pub description: String,
    pub location: String,
}

impl CreateEventRequest {
    pub fn validate(&self, tz: Tz) -> CalendarResult<NewEvent> {
        let summary = self.summary.trim();
        if summary.is_empty() {
            return Err(CalendarError::validation("summary must not be empty"));
        }

        let range = DateRange::from_args(&self.start_time, &self.end_time, tz)?;
        let attendees = normalize_attendees(&self.attendees)?;

        Ok(NewEvent {
            calendar_name: self.calendar_name.clone(),
            summary: summary.to_string(),
            range,
            attendees,
            description: self.description.trim().to_string(),
            location: self.location.trim().to_string(),
        })
    }
}

impl GetEventsRequest {
    pub fn window(&self, tz: Tz) -> CalendarResult<DateRange> {
        DateRange::from_args(&self.start_time, &self.end_time, tz)
    }
}

/// Validate attendee addresses, strip `mailto:` and drop case-insensitive
/// duplicates (first spelling wins).
pub fn normalize_attendees(raw: &[String]) -> CalendarResult<Vec<String>> {
    let mut seen: Vec<String> = Vec::with_capacity(raw.len());
    let mut out = Vec::with_capacity(raw.len());

    for entry in raw {
        let trimmed = entry.trim();
        let email = match trimmed.get(..7) {
            Some(scheme) if scheme.eq_ignore_ascii_case("mailto:") => &trimmed[7..],
            _ => trimmed,
        };

        if !looks_like_email(email) {
            return Err(CalendarError::validation(format!(
                "invalid attendee email address: '{entry}'"
            )));
        }

        let key = email.to_lowercase();
        if seen.contains(&key) {
            continue;
        }
        seen.push(key);
        out.push(email.to_string());
    }

    Ok(out)
}

fn looks_like_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && !domain.contains('@')
        && !value.chars().any(|c| c.is_whitespace() || c == ',' || c == ';')
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use chrono_tz::Europe::Berlin;

    fn request() -> CreateEventRequest {
        CreateEventRequest {
            calendar_name: "Work".to_string(),
            summary: "Standup".to_string(),
            start_time: "2025-01-10T09:00:00".to_string(),
            end_time: "2025-01-10T09:15:00".to_string(),
            attendees: vec![],
            description: String::new(),
            location: String::new(),
        }
    }

    #[test]
    fn test_optional_fields_default_when_absent() {
        let req: CreateEventRequest = serde_json::from_value(serde_json::json!({
            "calendar_name": "Work",
            "summary": "Standup",
            "start_time": "2025-01-10T09:00:00",
            "end_time": "2025-01-10T09:15:00"
        }))
        .unwrap();
        assert!(req.attendees.is_empty());
        assert_eq!(req.description, "");
        assert_eq!(req.location, "");
    }

    #[test]
    fn test_validate_resolves_times_in_timezone() {
        let event = request().validate(Berlin).unwrap();
        assert_eq!(event.range.start, Utc.with_ymd_and_hms(2025, 1, 10, 8, 0, 0).unwrap());
        assert_eq!(event.range.end, Utc.with_ymd_and_hms(2025, 1, 10, 8, 15, 0).unwrap());
        assert_eq!(event.summary, "Standup");
    }

    #[test]
    fn test_blank_summary_rejected() {
        let mut req = request();
        req.summary = "   ".to_string();
        assert!(matches!(req.validate(Berlin), Err(CalendarError::Validation(_))));
    }

    #[test]
    fn test_end_before_start_rejected() {
        let mut req = request();
        req.end_time = "2025-01-10T08:59:00".to_string();
        assert!(matches!(req.validate(Berlin), Err(CalendarError::Validation(_))));
    }

    #[test]
    fn test_attendees_are_normalized() {
        let raw = vec![
            "a@x.com".to_string(),
            "mailto:B@Y.org".to_string(),
            "A@X.COM".to_string(),
            " b@y.org ".to_string(),
        ];
        assert_eq!(
            normalize_attendees(&raw).unwrap(),
            vec!["a@x.com".to_string(), "B@Y.org".to_string()]
        );
    }

    #[test]
    fn test_invalid_attendees_rejected() {
        for bad in ["", "not-an-email", "@x.com", "a@", "a b@x.com", "a@x.com,b@y.com"] {
            let err = normalize_attendees(&[bad.to_string()]).unwrap_err();
            assert!(matches!(err, CalendarError::Validation(_)), "input: {bad}");
        }
    }

    #[test]
    fn test_get_events_window() {
        let req = GetEventsRequest {
            calendar_name: "Work".to_string(),
            start_time: "2025-01-10".to_string(),
            end_time: "2025-01-10".to_string(),
        };
        assert!(matches!(req.window(Berlin), Err(CalendarError::Validation(_))));
    }
}
