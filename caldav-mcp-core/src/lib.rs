//! Core types for caldav-mcp.
//!
//! This crate provides everything that does not touch the network:
//! - `Event` and related types for calendar events
//! - `ics` generation and parsing, `recurrence` expansion
//! - `CalendarBackend`, the seam to a calendar server
//! - `CalendarTools`, the four tool operations built on a backend

pub mod backend;
pub mod clock;
pub mod date_range;
pub mod error;
pub mod event;
pub mod ics;
pub mod recurrence;
pub mod request;
pub mod tools;

// Re-export all event types at crate root for convenience
pub use event::*;

pub use backend::{CalendarBackend, CalendarObject, SharedBackend};
pub use error::{CalendarError, CalendarResult, ErrorKind};
pub use tools::{CalendarTools, CreatedEvent};
