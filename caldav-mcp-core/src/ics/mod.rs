//! iCalendar object generation and parsing.
//!
//! Objects exchanged with the CalDAV server follow RFC 5545; the `icalendar`
//! crate does the formatting and tokenising, this module maps to `Event`.

mod generate;
mod parse;

pub use generate::generate_ics;
pub use parse::parse_events;
