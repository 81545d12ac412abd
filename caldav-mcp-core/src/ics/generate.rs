//! ICS generation.

use crate::event::{Event, EventStatus, EventTime};
use chrono::{DateTime, Utc};
use icalendar::{Calendar, Component, EventLike, Property, ValueType};

const PRODID: &str = "-//caldav-mcp//EN";

/// Generate a VCALENDAR object holding `event` as its only VEVENT.
///
/// `stamp` becomes DTSTAMP and CREATED.
pub fn generate_ics(event: &Event, stamp: DateTime<Utc>) -> String {
    let mut cal = Calendar::new();

    let mut ics_event = icalendar::Event::new();
    ics_event.uid(&event.uid);
    ics_event.summary(&event.summary);

    let stamp = stamp.format("%Y%m%dT%H%M%SZ").to_string();
    ics_event.add_property("DTSTAMP", &stamp);
    ics_event.add_property("CREATED", &stamp);

    add_datetime_property(&mut ics_event, "DTSTART", &event.start);
    add_datetime_property(&mut ics_event, "DTEND", &event.end);

    if let Some(desc) = event.description.as_deref().filter(|d| !d.is_empty()) {
        ics_event.description(desc);
    }

    if let Some(loc) = event.location.as_deref().filter(|l| !l.is_empty()) {
        ics_event.location(loc);
    }

    // CONFIRMED is the implied default
    match event.status {
        EventStatus::Confirmed => {}
        EventStatus::Tentative => {
            ics_event.add_property("STATUS", "TENTATIVE");
        }
        EventStatus::Cancelled => {
            ics_event.add_property("STATUS", "CANCELLED");
        }
    }

    if let Some(ref recurrence) = event.recurrence {
        ics_event.add_property("RRULE", &recurrence.rrule);
        for exdate in &recurrence.exdates {
            add_datetime_multi_property(&mut ics_event, "EXDATE", exdate);
        }
    }

    if let Some(ref recurrence_id) = event.recurrence_id {
        add_datetime_property(&mut ics_event, "RECURRENCE-ID", recurrence_id);
    }

    // ATTENDEE can appear multiple times
    for attendee in &event.attendees {
        let mut prop = Property::new("ATTENDEE", format!("mailto:{}", attendee.email));
        if let Some(ref name) = attendee.name {
            prop.add_parameter("CN", name);
        }
        prop.add_parameter("CUTYPE", "INDIVIDUAL");
        prop.add_parameter("ROLE", "REQ-PARTICIPANT");
        if let Some(partstat) = attendee.response_status {
            prop.add_parameter("PARTSTAT", partstat.as_ics_str());
        }
        if attendee.rsvp {
            prop.add_parameter("RSVP", "TRUE");
        }
        ics_event.append_multi_property(prop);
    }

    let ics_event = ics_event.done();
    cal.push(ics_event);
    let cal = cal.done();

    strip_ics_bloat(&cal.to_string())
}

/// Clean up ICS output from the icalendar crate
/// - Replace PRODID with our own
/// - Remove CALSCALE:GREGORIAN (it's the default)
fn strip_ics_bloat(ics: &str) -> String {
    let mut result = String::with_capacity(ics.len());

    for line in ics.lines() {
        if line.starts_with("PRODID:") {
            result.push_str("PRODID:");
            result.push_str(PRODID);
            result.push_str("\r\n");
            continue;
        }

        if line == "CALSCALE:GREGORIAN" {
            continue;
        }

        result.push_str(line);
        result.push_str("\r\n");
    }

    result
}

fn datetime_property(name: &str, time: &EventTime) -> Property {
    match time {
        EventTime::Date(d) => {
            let mut prop = Property::new(name, d.format("%Y%m%d").to_string());
            prop.append_parameter(ValueType::Date);
            prop
        }
        EventTime::DateTimeUtc(dt) => Property::new(name, dt.format("%Y%m%dT%H%M%SZ").to_string()),
        EventTime::DateTimeFloating(dt) => {
            Property::new(name, dt.format("%Y%m%dT%H%M%S").to_string())
        }
        EventTime::DateTimeZoned { datetime, tzid } => {
            let mut prop = Property::new(name, datetime.format("%Y%m%dT%H%M%S").to_string());
            prop.add_parameter("TZID", tzid);
            prop
        }
    }
}

fn add_datetime_property(ics_event: &mut icalendar::Event, name: &str, time: &EventTime) {
    ics_event.append_property(datetime_property(name, time));
}

fn add_datetime_multi_property(ics_event: &mut icalendar::Event, name: &str, time: &EventTime) {
    ics_event.append_multi_property(datetime_property(name, time));
}
