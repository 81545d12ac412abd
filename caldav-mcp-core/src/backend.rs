//! The seam between the tool adapter and a calendar server.
//!
//! `CalendarTools` only talks to a [`CalendarBackend`]; the CalDAV session
//! lives in `caldav-mcp-provider`, tests use [`MemoryBackend`].

use std::sync::Arc;

use async_trait::async_trait;

use crate::date_range::DateRange;
use crate::error::CalendarResult;
use crate::event::CalendarRef;

/// A calendar object resource as stored on the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarObject {
    pub href: String,
    pub etag: Option<String>,
    /// Raw VCALENDAR text
    pub data: String,
}

/// Operations the tools need from a calendar server.
#[async_trait]
pub trait CalendarBackend: Send + Sync {
    /// Calendar collections visible to the authenticated principal.
    async fn list_collections(&self) -> CalendarResult<Vec<CalendarRef>>;

    /// Store a new calendar object named after `uid`. Returns its href.
    async fn put_object(&self, calendar: &CalendarRef, uid: &str, ics: String)
    -> CalendarResult<String>;

    /// Objects with at least one component overlapping `range`.
    ///
    /// Servers may return more than that (recurring series, lenient
    /// filters); callers filter again.
    async fn query_by_time_range(
        &self,
        calendar: &CalendarRef,
        range: &DateRange,
    ) -> CalendarResult<Vec<CalendarObject>>;
}

/// Thread-safe shared backend.
pub type SharedBackend = Arc<dyn CalendarBackend>;

#[cfg(any(test, feature = "test-util"))]
pub use memory::MemoryBackend;

#[cfg(any(test, feature = "test-util"))]
mod memory {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::{CalendarBackend, CalendarObject};
    use crate::date_range::DateRange;
    use crate::error::{CalendarError, CalendarResult};
    use crate::event::CalendarRef;

    #[derive(Default)]
    struct State {
        calendars: Vec<CalendarRef>,
        objects: HashMap<String, Vec<CalendarObject>>,
        puts: usize,
        failure: Option<fn() -> CalendarError>,
    }

    /// In-memory backend for tests.
    ///
    /// Queries return every object of the collection, leaving time filtering
    /// to the caller the way a lenient server would.
    #[derive(Default)]
    pub struct MemoryBackend {
        state: Mutex<State>,
    }

    impl MemoryBackend {
        pub fn new() -> Self {
            Self::default()
        }

        /// Add a calendar collection. The id is the name lowercased.
        pub fn with_calendar(self, name: &str) -> Self {
            {
                let mut state = self.lock();
                let id = name.to_lowercase().replace(' ', "-");
                state.calendars.push(CalendarRef {
                    name: name.to_string(),
                    url: format!("https://dav.example.com/calendars/user/{id}/"),
                    id,
                });
            }
            self
        }

        /// Store an object directly, bypassing `put_object`.
        pub fn with_object(self, calendar_name: &str, href: &str, data: &str) -> Self {
            self.lock()
                .objects
                .entry(calendar_name.to_string())
                .or_default()
                .push(CalendarObject {
                    href: href.to_string(),
                    etag: None,
                    data: data.to_string(),
                });
            self
        }

        /// Make every following call fail with the given error.
        pub fn fail_with(&self, failure: fn() -> CalendarError) {
            self.lock().failure = Some(failure);
        }

        /// Number of successful `put_object` calls.
        pub fn put_count(&self) -> usize {
            self.lock().puts
        }

        /// Objects stored in a calendar, in insertion order.
        pub fn objects(&self, calendar_name: &str) -> Vec<CalendarObject> {
            self.lock()
                .objects
                .get(calendar_name)
                .cloned()
                .unwrap_or_default()
        }

        fn lock(&self) -> std::sync::MutexGuard<'_, State> {
            self.state.lock().unwrap_or_else(|e| e.into_inner())
        }

        fn check_failure(&self) -> CalendarResult<()> {
            match self.lock().failure {
                Some(failure) => Err(failure()),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl CalendarBackend for MemoryBackend {
        async fn list_collections(&self) -> CalendarResult<Vec<CalendarRef>> {
            self.check_failure()?;
            Ok(self.lock().calendars.clone())
        }

        async fn put_object(
            &self,
            calendar: &CalendarRef,
            uid: &str,
            ics: String,
        ) -> CalendarResult<String> {
            self.check_failure()?;
            let href = format!("/calendars/user/{}/{uid}.ics", calendar.id);
            let mut state = self.lock();
            state.puts += 1;
            let etag = format!("\"{}\"", state.puts);
            state
                .objects
                .entry(calendar.name.clone())
                .or_default()
                .push(CalendarObject {
                    href: href.clone(),
                    etag: Some(etag),
                    data: ics,
                });
            Ok(href)
        }

        async fn query_by_time_range(
            &self,
            calendar: &CalendarRef,
            _range: &DateRange,
        ) -> CalendarResult<Vec<CalendarObject>> {
            self.check_failure()?;
            Ok(self.objects(&calendar.name))
        }
    }
}
