//! RRULE expansion for recurring events.
//!
//! Expands a master recurring event into the instances that can touch a
//! search window, replacing generated instances with their overrides.
//!
//! Floating and all-day series repeat in wall-clock time, so they are expanded
//! with their naive values posing as UTC and resolved in the configured zone
//! afterwards. The same applies to a TZID that chrono-tz does not know.

use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use chrono_tz::Tz;
use rrule::RRuleSet;

use crate::date_range::DateRange;
use crate::error::{CalendarError, CalendarResult};
use crate::event::{Event, EventStatus, EventTime, Recurrence};

/// Upper bound on generated instances per series and query.
const MAX_INSTANCES: u16 = 1000;

/// How DTSTART is handed to the rrule crate.
enum Anchor {
    Utc,
    Zoned,
    /// Naive value expanded as if it were UTC
    WallClock,
}

fn anchor_for(start: &EventTime) -> Anchor {
    match start {
        EventTime::DateTimeUtc(_) => Anchor::Utc,
        EventTime::DateTimeZoned { tzid, .. } if tzid.parse::<Tz>().is_ok() => Anchor::Zoned,
        _ => Anchor::WallClock,
    }
}

fn naive_of(time: &EventTime) -> Option<NaiveDateTime> {
    match time {
        EventTime::Date(d) => d.and_hms_opt(0, 0, 0),
        EventTime::DateTimeUtc(dt) => Some(dt.naive_utc()),
        EventTime::DateTimeFloating(dt) => Some(*dt),
        EventTime::DateTimeZoned { datetime, .. } => Some(*datetime),
    }
}

/// Format a DTSTART or EXDATE line for the rrule crate parser.
fn rrule_line(name: &str, time: &EventTime, anchor: &Anchor, default_tz: Tz) -> Option<String> {
    let line = match (anchor, time) {
        (_, EventTime::DateTimeUtc(dt)) => format!("{name}:{}", dt.format("%Y%m%dT%H%M%SZ")),
        (Anchor::Zoned, EventTime::DateTimeZoned { datetime, tzid })
            if tzid.parse::<Tz>().is_ok() =>
        {
            format!("{name};TZID={tzid}:{}", datetime.format("%Y%m%dT%H%M%S"))
        }
        // Exclusions written differently from DTSTART are matched by instant
        (Anchor::Utc, other) | (Anchor::Zoned, other) => {
            let utc = other.to_utc(default_tz)?;
            format!("{name}:{}", utc.format("%Y%m%dT%H%M%SZ"))
        }
        (Anchor::WallClock, other) => {
            format!("{name}:{}Z", naive_of(other)?.format("%Y%m%dT%H%M%S"))
        }
    };
    Some(line)
}

/// Build an iCalendar-format RRULE string for the rrule crate parser.
fn build_rrule_string(
    start: &EventTime,
    recurrence: &Recurrence,
    anchor: &Anchor,
    default_tz: Tz,
) -> Option<String> {
    let mut lines = vec![rrule_line("DTSTART", start, anchor, default_tz)?];
    let rrule = match anchor {
        Anchor::WallClock => wall_clock_until(&recurrence.rrule),
        _ => recurrence.rrule.clone(),
    };
    lines.push(format!("RRULE:{rrule}"));
    lines.extend(
        recurrence
            .exdates
            .iter()
            .filter_map(|exdate| rrule_line("EXDATE", exdate, anchor, default_tz)),
    );
    Some(lines.join("\n"))
}

/// Rewrite UNTIL to match a wall-clock DTSTART posing as UTC.
///
/// `UNTIL=20250131` becomes `UNTIL=20250131T235959Z` and a floating
/// `UNTIL=20250131T100000` gets a `Z`, since rrule rejects an UNTIL whose
/// form differs from DTSTART.
fn wall_clock_until(rrule: &str) -> String {
    rrule
        .split(';')
        .map(|part| {
            let Some((key, value)) = part.split_once('=') else {
                return part.to_string();
            };
            if !key.trim().eq_ignore_ascii_case("UNTIL") {
                return part.to_string();
            }
            let value = value.trim();
            if value.len() == 8 && value.bytes().all(|b| b.is_ascii_digit()) {
                format!("{key}={value}T235959Z")
            } else if value.ends_with(['Z', 'z']) {
                part.to_string()
            } else {
                format!("{key}={value}Z")
            }
        })
        .collect::<Vec<_>>()
        .join(";")
}

/// Convert an rrule occurrence back to an EventTime matching the master's variant.
fn occurrence_to_event_time(dt: &DateTime<rrule::Tz>, master_start: &EventTime) -> EventTime {
    match master_start {
        EventTime::Date(_) => EventTime::Date(dt.naive_utc().date()),
        EventTime::DateTimeUtc(_) => EventTime::DateTimeUtc(dt.with_timezone(&Utc)),
        EventTime::DateTimeFloating(_) => EventTime::DateTimeFloating(dt.naive_utc()),
        EventTime::DateTimeZoned { tzid, .. } => EventTime::DateTimeZoned {
            datetime: dt.naive_local(),
            tzid: tzid.clone(),
        },
    }
}

/// End of an instance, keeping the master's length and EventTime variant.
fn instance_end(master: &Event, occ_start: &EventTime, duration: Duration) -> EventTime {
    match (&master.start, &master.end, occ_start) {
        (EventTime::Date(d_start), EventTime::Date(d_end), EventTime::Date(occ)) => {
            EventTime::Date(*occ + (*d_end - *d_start))
        }
        (_, _, EventTime::Date(occ)) => EventTime::Date(*occ + Duration::days(1)),
        (_, _, EventTime::DateTimeUtc(dt)) => EventTime::DateTimeUtc(*dt + duration),
        (_, _, EventTime::DateTimeFloating(dt)) => EventTime::DateTimeFloating(*dt + duration),
        (_, _, EventTime::DateTimeZoned { datetime, tzid }) => EventTime::DateTimeZoned {
            datetime: *datetime + duration,
            tzid: tzid.clone(),
        },
    }
}

/// Expand a recurring master event into individual instances near `range`.
///
/// - `overrides` maps the UTC instant of each RECURRENCE-ID to its override.
///   An override replaces the generated instance it names; overrides whose
///   instance was not generated (moved in from outside the window) are
///   returned too. Cancelled overrides remove their instance.
/// - The master itself is not returned; every instance has `recurrence_id` set.
/// - Instances are generated generously around the window. Callers filter
///   the result with [`DateRange::overlaps`].
pub fn expand_recurring_event(
    master: &Event,
    range: &DateRange,
    overrides: &HashMap<DateTime<Utc>, Event>,
    default_tz: Tz,
) -> CalendarResult<Vec<Event>> {
    let recurrence = match &master.recurrence {
        Some(r) => r,
        None => return Ok(Vec::new()),
    };

    let anchor = anchor_for(&master.start);
    let rrule_str = build_rrule_string(&master.start, recurrence, &anchor, default_tz)
        .ok_or_else(|| {
            CalendarError::IcsParse(format!("Invalid DTSTART for event '{}'", master.uid))
        })?;

    let rrule_set: RRuleSet = rrule_str.parse().map_err(|e| {
        CalendarError::IcsParse(format!(
            "Failed to parse RRULE for event '{}': {}",
            master.uid, e
        ))
    })?;

    let duration = match (master.start.to_utc(default_tz), master.end.to_utc(default_tz)) {
        (Some(s), Some(e)) if e > s => e - s,
        _ => Duration::zero(),
    };

    // Wall-clock values can sit up to a day away from their instant.
    let tz: rrule::Tz = Utc.into();
    let after = (range.start - duration - Duration::days(1)).with_timezone(&tz);
    let before = (range.end + Duration::days(1)).with_timezone(&tz);

    let result = rrule_set.after(after).before(before).all(MAX_INSTANCES);
    if result.limited {
        tracing::warn!(
            uid = %master.uid,
            limit = MAX_INSTANCES,
            "Recurring event has more instances than the expansion limit"
        );
    }

    let mut events = Vec::new();
    let mut used_overrides = Vec::new();

    for occ_dt in &result.dates {
        let occ_start = occurrence_to_event_time(occ_dt, &master.start);

        let matched = occ_start
            .to_utc(default_tz)
            .and_then(|key| overrides.get_key_value(&key));
        if let Some((key, override_event)) = matched {
            used_overrides.push(*key);
            if override_event.status != EventStatus::Cancelled {
                events.push(override_event.clone());
            }
            continue;
        }

        events.push(Event {
            uid: master.uid.clone(),
            summary: master.summary.clone(),
            description: master.description.clone(),
            location: master.location.clone(),
            end: instance_end(master, &occ_start, duration),
            start: occ_start.clone(),
            status: master.status,
            attendees: master.attendees.clone(),
            recurrence: None,
            recurrence_id: Some(occ_start),
        });
    }

    events.extend(
        overrides
            .iter()
            .filter(|(key, ev)| !used_overrides.contains(key) && ev.status != EventStatus::Cancelled)
            .map(|(_, ev)| ev.clone()),
    );

    Ok(events)
}
