//! The four calendar operations, independent of the MCP transport.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::backend::SharedBackend;
use crate::clock::CurrentTime;
use crate::date_range::DateRange;
use crate::error::{CalendarError, CalendarResult};
use crate::event::{Attendee, CalendarRef, Event, EventRecord, EventStatus, EventTime};
use crate::ics::{generate_ics, parse_events};
use crate::recurrence::expand_recurring_event;
use crate::request::{CreateEventRequest, GetEventsRequest};

/// Result of `create_event`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedEvent {
    pub success: bool,
    pub uid: String,
    pub calendar: String,
    pub href: String,
    pub message: String,
}

/// Calendar operations over a shared backend.
#[derive(Clone)]
pub struct CalendarTools {
    backend: SharedBackend,
    timezone: Tz,
}

impl CalendarTools {
    pub fn new(backend: SharedBackend, timezone: Tz) -> Self {
        Self { backend, timezone }
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn current_time(&self) -> CurrentTime {
        CurrentTime::at(Utc::now().with_timezone(&self.timezone))
    }

    pub async fn list_calendars(&self) -> CalendarResult<Vec<CalendarRef>> {
        self.backend.list_collections().await
    }

    pub async fn create_event(&self, req: CreateEventRequest) -> CalendarResult<CreatedEvent> {
        let new_event = req.validate(self.timezone)?;
        let calendar = self.find_calendar(&new_event.calendar_name).await?;

        let uid = uuid::Uuid::new_v4().to_string();
        let event = Event {
            uid: uid.clone(),
            summary: new_event.summary.clone(),
            description: Some(new_event.description),
            location: Some(new_event.location),
            start: EventTime::DateTimeUtc(new_event.range.start),
            end: EventTime::DateTimeUtc(new_event.range.end),
            status: EventStatus::Confirmed,
            attendees: new_event
                .attendees
                .into_iter()
                .map(Attendee::invite)
                .collect(),
            recurrence: None,
            recurrence_id: None,
        };

        let ics = generate_ics(&event, Utc::now());
        let href = self.backend.put_object(&calendar, &uid, ics).await?;

        tracing::info!(uid = %uid, calendar = %calendar.name, "Created event");

        let local_start = new_event.range.start.with_timezone(&self.timezone);
        Ok(CreatedEvent {
            success: true,
            uid,
            calendar: calendar.name,
            href,
            message: format!(
                "Event created successfully: {} at {} (Local Time)",
                new_event.summary,
                local_start.format("%Y-%m-%d %H:%M")
            ),
        })
    }

    pub async fn get_events(&self, req: GetEventsRequest) -> CalendarResult<Vec<EventRecord>> {
        let range = req.window(self.timezone)?;
        let calendar = self.find_calendar(&req.calendar_name).await?;

        let objects = self.backend.query_by_time_range(&calendar, &range).await?;
        tracing::debug!(
            calendar = %calendar.name,
            objects = objects.len(),
            "Fetched calendar objects"
        );

        let mut events = Vec::new();
        for object in &objects {
            match parse_events(&object.data) {
                Ok(parsed) => events.extend(self.resolve_instances(&object.href, parsed, &range)),
                Err(e) => {
                    tracing::warn!(href = %object.href, error = %e, "Skipping unparseable calendar object");
                }
            }
        }

        let mut timed: Vec<(DateTime<Utc>, EventRecord)> = events
            .into_iter()
            .filter_map(|event| {
                let start = event.start.to_utc(self.timezone)?;
                let end = event.end.to_utc(self.timezone)?;
                range
                    .overlaps(start, end)
                    .then(|| (start, self.to_record(event)))
            })
            .collect();

        timed.sort_by(|(a_start, a), (b_start, b)| {
            a_start.cmp(b_start).then_with(|| a.summary.cmp(&b.summary))
        });

        Ok(timed.into_iter().map(|(_, record)| record).collect())
    }

    /// Exact-name lookup; the error lists what exists.
    async fn find_calendar(&self, name: &str) -> CalendarResult<CalendarRef> {
        let calendars = self.backend.list_collections().await?;
        if let Some(calendar) = calendars.iter().find(|c| c.name == name) {
            return Ok(calendar.clone());
        }
        Err(CalendarError::CalendarNotFound {
            name: name.to_string(),
            available: calendars.into_iter().map(|c| c.name).collect(),
        })
    }

    /// Turn the VEVENTs of one calendar object into concrete instances:
    /// recurring masters are expanded, overrides attach to their master.
    ///
    /// A master whose rule cannot be expanded is kept as a single event at its
    /// own DTSTART, so it only shows up when that first instance is in range.
    fn resolve_instances(&self, href: &str, parsed: Vec<Event>, range: &DateRange) -> Vec<Event> {
        let mut masters = Vec::new();
        let mut singles = Vec::new();
        let mut overrides: HashMap<String, HashMap<DateTime<Utc>, Event>> = HashMap::new();

        for event in parsed {
            match (&event.recurrence, &event.recurrence_id) {
                (_, Some(recurrence_id)) => match recurrence_id.to_utc(self.timezone) {
                    Some(key) => {
                        overrides
                            .entry(event.uid.clone())
                            .or_default()
                            .insert(key, event);
                    }
                    None => singles.push(event),
                },
                (Some(_), None) => masters.push(event),
                (None, None) => singles.push(event),
            }
        }

        let mut out = singles;
        for master in masters {
            let own_overrides = overrides.remove(&master.uid).unwrap_or_default();
            match expand_recurring_event(&master, range, &own_overrides, self.timezone) {
                Ok(instances) => out.extend(instances),
                Err(e) => {
                    tracing::warn!(
                        href,
                        uid = %master.uid,
                        kind = ?e.kind(),
                        error = %e,
                        "Could not expand recurring event, returning its first instance only"
                    );
                    out.push(master);
                    out.extend(own_overrides.into_values());
                }
            }
        }

        // Overrides whose master is missing from the response
        out.extend(
            overrides
                .into_values()
                .flat_map(|by_id| by_id.into_values())
                .filter(|e| e.status != EventStatus::Cancelled),
        );
        out
    }

    fn to_record(&self, event: Event) -> EventRecord {
        let summary = if event.summary.trim().is_empty() {
            "No Title".to_string()
        } else {
            event.summary
        };

        EventRecord {
            uid: event.uid,
            summary,
            start: event.start.display_in(self.timezone),
            end: event.end.display_in(self.timezone),
            all_day: event.start.is_date(),
            description: event.description.unwrap_or_default(),
            location: event.location.unwrap_or_default(),
            attendees: event.attendees.into_iter().map(|a| a.email).collect(),
            recurrence_id: event.recurrence_id.map(|id| id.display_in(self.timezone)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::error::ErrorKind;
    use chrono::{NaiveDateTime, TimeZone};
    use chrono_tz::Europe::Berlin;
    use std::sync::Arc;

    fn tools_with(backend: Arc<MemoryBackend>) -> CalendarTools {
        CalendarTools::new(backend, Berlin)
    }

    fn work_backend() -> Arc<MemoryBackend> {
        Arc::new(MemoryBackend::new().with_calendar("Work").with_calendar("Home"))
    }

    fn create_req(summary: &str, start: &str, end: &str) -> CreateEventRequest {
        CreateEventRequest {
            calendar_name: "Work".to_string(),
            summary: summary.to_string(),
            start_time: start.to_string(),
            end_time: end.to_string(),
            attendees: vec![],
            description: String::new(),
            location: String::new(),
        }
    }

    fn events_req(start: &str, end: &str) -> GetEventsRequest {
        GetEventsRequest {
            calendar_name: "Work".to_string(),
            start_time: start.to_string(),
            end_time: end.to_string(),
        }
    }

    fn vcalendar(body: &str) -> String {
        format!("BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:TEST\r\n{body}END:VCALENDAR\r\n")
    }

    #[tokio::test]
    async fn test_create_then_search_returns_event() {
        let backend = work_backend();
        let tools = tools_with(backend.clone());

        let mut req = create_req("Standup", "2025-01-10T09:00:00", "2025-01-10T09:15:00");
        req.attendees = vec!["a@x.com".to_string()];
        let created = tools.create_event(req).await.unwrap();

        assert!(created.success);
        assert_eq!(created.calendar, "Work");
        assert!(created.href.ends_with(&format!("{}.ics", created.uid)));
        assert_eq!(
            created.message,
            "Event created successfully: Standup at 2025-01-10 09:00 (Local Time)"
        );
        assert_eq!(backend.put_count(), 1);

        let events = tools
            .get_events(events_req("2025-01-10T00:00:00", "2025-01-11T00:00:00"))
            .await
            .unwrap();

        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.uid, created.uid);
        assert_eq!(event.summary, "Standup");
        assert_eq!(event.start, "2025-01-10T09:00:00+01:00");
        assert_eq!(event.end, "2025-01-10T09:15:00+01:00");
        assert!(!event.all_day);
        assert_eq!(event.attendees, vec!["a@x.com".to_string()]);
    }

    #[tokio::test]
    async fn test_created_ics_is_utc_with_rsvp_attendees() {
        let backend = work_backend();
        let tools = tools_with(backend.clone());

        let mut req = create_req("Review", "2025-07-01T14:00:00", "2025-07-01T15:00:00");
        req.attendees = vec!["a@x.com".to_string(), "b@y.org".to_string()];
        tools.create_event(req).await.unwrap();

        let stored = backend.objects("Work");
        let ics = stored[0].data.replace("\r\n ", "");
        assert!(ics.contains("DTSTART:20250701T120000Z"), "ICS:\n{ics}");
        assert!(ics.contains("DTEND:20250701T130000Z"), "ICS:\n{ics}");
        let attendees: Vec<&str> = ics.lines().filter(|l| l.starts_with("ATTENDEE")).collect();
        assert_eq!(attendees.len(), 2);
        assert!(attendees.iter().all(|l| l.contains("RSVP=TRUE")));
    }

    #[tokio::test]
    async fn test_end_before_start_issues_no_put() {
        let backend = work_backend();
        let tools = tools_with(backend.clone());

        let err = tools
            .create_event(create_req("Standup", "2025-01-10T09:15:00", "2025-01-10T09:00:00"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ValidationError);
        assert_eq!(backend.put_count(), 0);
    }

    #[tokio::test]
    async fn test_validation_runs_before_network() {
        let backend = work_backend();
        backend.fail_with(|| CalendarError::Network("unreachable".to_string()));
        let tools = tools_with(backend.clone());

        let err = tools
            .create_event(create_req("", "2025-01-10T09:00:00", "2025-01-10T09:15:00"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
    }

    #[tokio::test]
    async fn test_unknown_calendar_issues_no_put() {
        let backend = work_backend();
        let tools = tools_with(backend.clone());

        let mut req = create_req("Standup", "2025-01-10T09:00:00", "2025-01-10T09:15:00");
        req.calendar_name = "work".to_string();
        let err = tools.create_event(req).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::CalendarNotFound);
        assert!(err.to_string().contains("Available: Work, Home"));
        assert_eq!(backend.put_count(), 0);
    }

    #[tokio::test]
    async fn test_search_unknown_calendar() {
        let tools = tools_with(work_backend());
        let mut req = events_req("2025-01-10T00:00:00", "2025-01-11T00:00:00");
        req.calendar_name = "Personal".to_string();

        let err = tools.get_events(req).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CalendarNotFound);
    }

    #[tokio::test]
    async fn test_empty_window_returns_empty_list() {
        let tools = tools_with(work_backend());
        let events = tools
            .get_events(events_req("2025-01-10T00:00:00", "2025-01-11T00:00:00"))
            .await
            .unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_out_of_window_events_filtered_and_sorted() {
        let data = vcalendar(
            "BEGIN:VEVENT\r\nUID:late\r\nSUMMARY:Late\r\nDTSTART:20250110T160000Z\r\nDTEND:20250110T170000Z\r\nEND:VEVENT\r\n\
BEGIN:VEVENT\r\nUID:outside\r\nSUMMARY:Outside\r\nDTSTART:20250112T090000Z\r\nDTEND:20250112T100000Z\r\nEND:VEVENT\r\n\
BEGIN:VEVENT\r\nUID:early\r\nSUMMARY:Early\r\nDTSTART:20250110T070000Z\r\nDTEND:20250110T080000Z\r\nEND:VEVENT\r\n\
BEGIN:VEVENT\r\nUID:boundary\r\nSUMMARY:Ends at window start\r\nDTSTART:20250109T220000Z\r\nDTEND:20250109T230000Z\r\nEND:VEVENT\r\n",
        );
        let backend = Arc::new(
            MemoryBackend::new()
                .with_calendar("Work")
                .with_object("Work", "/cal/work/mixed.ics", &data),
        );
        let tools = tools_with(backend);

        // Berlin midnight to midnight = 2025-01-09T23:00Z .. 2025-01-10T23:00Z
        let events = tools
            .get_events(events_req("2025-01-10T00:00:00", "2025-01-11T00:00:00"))
            .await
            .unwrap();

        let uids: Vec<&str> = events.iter().map(|e| e.uid.as_str()).collect();
        assert_eq!(uids, vec!["early", "late"]);
    }

    #[tokio::test]
    async fn test_unparseable_objects_are_skipped() {
        let good = vcalendar(
            "BEGIN:VEVENT\r\nUID:good\r\nDTSTART:20250110T090000Z\r\nDTEND:20250110T100000Z\r\nEND:VEVENT\r\n",
        );
        let backend = Arc::new(
            MemoryBackend::new()
                .with_calendar("Work")
                .with_object("Work", "/cal/work/bad.ics", "BEGIN:VCALENDAR\r\nBEGIN:VEVENT\r\n")
                .with_object("Work", "/cal/work/good.ics", &good),
        );
        let tools = tools_with(backend);

        let events = tools
            .get_events(events_req("2025-01-10T00:00:00", "2025-01-11T00:00:00"))
            .await
            .unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].uid, "good");
        assert_eq!(events[0].summary, "No Title");
    }

    #[tokio::test]
    async fn test_all_day_event_record() {
        let data = vcalendar(
            "BEGIN:VEVENT\r\nUID:holiday\r\nSUMMARY:Holiday\r\nDTSTART;VALUE=DATE:20250110\r\nEND:VEVENT\r\n",
        );
        let backend = Arc::new(
            MemoryBackend::new()
                .with_calendar("Work")
                .with_object("Work", "/cal/work/holiday.ics", &data),
        );
        let tools = tools_with(backend);

        let events = tools
            .get_events(events_req("2025-01-10T12:00:00", "2025-01-10T13:00:00"))
            .await
            .unwrap();

        assert_eq!(events.len(), 1);
        assert!(events[0].all_day);
        assert_eq!(events[0].start, "2025-01-10");
        assert_eq!(events[0].end, "2025-01-11");
    }

    #[tokio::test]
    async fn test_recurring_series_expanded_with_override() {
        let data = vcalendar(
            "BEGIN:VEVENT\r\nUID:weekly\r\nSUMMARY:Weekly sync\r\nDTSTART;TZID=Europe/Berlin:20250106T100000\r\nDTEND;TZID=Europe/Berlin:20250106T110000\r\nRRULE:FREQ=WEEKLY\r\nEXDATE;TZID=Europe/Berlin:20250113T100000\r\nEND:VEVENT\r\n\
BEGIN:VEVENT\r\nUID:weekly\r\nSUMMARY:Weekly sync (moved)\r\nRECURRENCE-ID;TZID=Europe/Berlin:20250120T100000\r\nDTSTART;TZID=Europe/Berlin:20250121T150000\r\nDTEND;TZID=Europe/Berlin:20250121T160000\r\nEND:VEVENT\r\n",
        );
        let backend = Arc::new(
            MemoryBackend::new()
                .with_calendar("Work")
                .with_object("Work", "/cal/work/weekly.ics", &data),
        );
        let tools = tools_with(backend);

        let events = tools
            .get_events(events_req("2025-01-06T00:00:00", "2025-02-01T00:00:00"))
            .await
            .unwrap();

        let starts: Vec<(&str, &str)> = events
            .iter()
            .map(|e| (e.summary.as_str(), e.start.as_str()))
            .collect();
        assert_eq!(
            starts,
            vec![
                ("Weekly sync", "2025-01-06T10:00:00+01:00"),
                ("Weekly sync (moved)", "2025-01-21T15:00:00+01:00"),
                ("Weekly sync", "2025-01-27T10:00:00+01:00"),
            ]
        );
        assert!(events.iter().all(|e| e.recurrence_id.is_some()));
    }

    #[tokio::test]
    async fn test_all_day_series_with_until_expanded() {
        let data = vcalendar(
            "BEGIN:VEVENT\r\nUID:gym\r\nSUMMARY:Gym\r\nDTSTART;VALUE=DATE:20250106\r\nDTEND;VALUE=DATE:20250107\r\nRRULE:FREQ=WEEKLY;UNTIL=20250131\r\nEND:VEVENT\r\n",
        );
        let backend = Arc::new(
            MemoryBackend::new()
                .with_calendar("Work")
                .with_object("Work", "/cal/work/gym.ics", &data),
        );
        let tools = tools_with(backend);

        let events = tools
            .get_events(events_req("2025-01-01T00:00:00", "2025-02-01T00:00:00"))
            .await
            .unwrap();

        let starts: Vec<&str> = events.iter().map(|e| e.start.as_str()).collect();
        assert_eq!(starts, vec!["2025-01-06", "2025-01-13", "2025-01-20", "2025-01-27"]);
    }

    #[tokio::test]
    async fn test_unexpandable_series_keeps_first_instance() {
        let data = vcalendar(
            "BEGIN:VEVENT\r\nUID:odd\r\nSUMMARY:Odd rule\r\nDTSTART:20250110T090000Z\r\nDTEND:20250110T100000Z\r\nRRULE:FREQ=SOMETIMES\r\nEND:VEVENT\r\n",
        );
        let backend = Arc::new(
            MemoryBackend::new()
                .with_calendar("Work")
                .with_object("Work", "/cal/work/odd.ics", &data),
        );
        let tools = tools_with(backend);

        let first = tools
            .get_events(events_req("2025-01-10T00:00:00", "2025-01-11T00:00:00"))
            .await
            .unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].summary, "Odd rule");
        assert!(first[0].recurrence_id.is_none());

        let later = tools
            .get_events(events_req("2025-02-10T00:00:00", "2025-02-11T00:00:00"))
            .await
            .unwrap();
        assert!(later.is_empty());
    }

    #[tokio::test]
    async fn test_special_characters_survive_create_and_search() {
        let tools = tools_with(work_backend());

        let mut req = create_req(
            "Lunch, then; review \\ ok",
            "2025-01-10T12:00:00",
            "2025-01-10T13:00:00",
        );
        req.description = "Notes in C:\\new\nsecond line".to_string();
        tools.create_event(req).await.unwrap();

        let events = tools
            .get_events(events_req("2025-01-10T00:00:00", "2025-01-11T00:00:00"))
            .await
            .unwrap();

        assert_eq!(events[0].summary, "Lunch, then; review \\ ok");
        assert_eq!(events[0].description, "Notes in C:\\new\nsecond line");
    }

    #[tokio::test]
    async fn test_backend_errors_propagate() {
        let backend = work_backend();
        backend.fail_with(|| CalendarError::AuthenticationFailed("401 Unauthorized".to_string()));
        let tools = tools_with(backend);

        let err = tools.list_calendars().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthenticationFailed);
    }

    #[test]
    fn test_current_time_uses_configured_zone() {
        let tools = tools_with(work_backend());
        let now = tools.current_time();
        assert_eq!(now.timezone, "Europe/Berlin");

        let naive = NaiveDateTime::parse_from_str(&now.iso8601, "%Y-%m-%dT%H:%M:%S").unwrap();
        let parsed = Berlin.from_local_datetime(&naive).earliest().unwrap();
        let delta = (parsed.with_timezone(&Utc) - Utc::now()).num_seconds().abs();
        assert!(delta <= 1);
    }
}
