//! Authenticated CalDAV session shared by all tool calls.
//!
//! The session owns one libdav client. Calls are serialised through a mutex
//! and each network round trip is bounded by the configured timeout. The
//! calendar home is discovered on first use and remembered.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use caldav_mcp_core::date_range::DateRange;
use caldav_mcp_core::{CalendarBackend, CalendarError, CalendarObject, CalendarRef, CalendarResult};
use http::Uri;
use libdav::caldav::{FindCalendarHomeSet, FindCalendars};
use libdav::dav::{GetProperty, PutResource, mime_types};
use libdav::names;
use secrecy::{ExposeSecret, Secret};
use tokio::sync::{Mutex, OnceCell};
use tokio::time::timeout;

use crate::caldav::{
    GetCalendarResourcesInRange, SessionClient, absolute_url, create_caldav_client, event_href,
    rejected_status, url_to_href,
};

/// Where and how to connect.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub url: String,
    pub username: String,
    pub password: Secret<String>,
    pub request_timeout: Duration,
}

/// CalDAV session (client + discovered calendar home).
pub struct CalDavSession {
    client: Mutex<SessionClient>,
    base_url: Uri,
    request_timeout: Duration,
    home: OnceCell<Uri>,
}

/// A calendar collection found under the home, before ids are assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CollectionEntry {
    href: String,
    display_name: Option<String>,
}

impl CalDavSession {
    /// Build the client. No network traffic happens here.
    pub fn connect(settings: &ConnectionSettings) -> CalendarResult<Self> {
        let base_url: Uri = settings.url.parse().map_err(|e| {
            CalendarError::ConfigurationMissing(format!(
                "CALDAV_URL is not a valid URL ({}): {e}",
                settings.url
            ))
        })?;
        if base_url.scheme().is_none() || base_url.authority().is_none() {
            return Err(CalendarError::ConfigurationMissing(format!(
                "CALDAV_URL must be an absolute http(s) URL, got {}",
                settings.url
            )));
        }

        let client = create_caldav_client(
            &base_url,
            &settings.username,
            settings.password.expose_secret(),
        )?;

        tracing::debug!(url = %base_url, user = %settings.username, "Created CalDAV client");

        Ok(CalDavSession {
            client: Mutex::new(client),
            base_url,
            request_timeout: settings.request_timeout,
            home: OnceCell::new(),
        })
    }

    /// Calendar home, discovered once per process.
    async fn home(&self) -> CalendarResult<&Uri> {
        self.home.get_or_try_init(|| self.discover_home()).await
    }

    /// current-user-principal, then calendar-home-set; the endpoint URL
    /// stands in for whichever is missing.
    async fn discover_home(&self) -> CalendarResult<Uri> {
        let client = self.client.lock().await;

        let principal = with_timeout(
            self.request_timeout,
            "find current-user-principal",
            client.find_current_user_principal(),
        )
        .await?;

        let Some(principal) = principal else {
            tracing::debug!(home = %self.base_url, "No principal reported, using endpoint URL");
            return Ok(self.base_url.clone());
        };

        let response = with_timeout(
            self.request_timeout,
            "find calendar-home-set",
            client.request(FindCalendarHomeSet::new(&principal)),
        )
        .await?;

        let home = response
            .home_sets
            .into_iter()
            .next()
            .unwrap_or_else(|| self.base_url.clone());
        tracing::debug!(principal = %principal, home = %home, "Discovered calendar home");
        Ok(home)
    }
}

#[async_trait]
impl CalendarBackend for CalDavSession {
    async fn list_collections(&self) -> CalendarResult<Vec<CalendarRef>> {
        let home = self.home().await?;
        let client = self.client.lock().await;

        let found = with_timeout(
            self.request_timeout,
            "list calendars",
            client.request(FindCalendars::new(home)),
        )
        .await?;

        let mut entries = Vec::with_capacity(found.calendars.len());
        for calendar in found.calendars {
            let display_name = match with_timeout(
                self.request_timeout,
                "read calendar name",
                client.request(GetProperty::new(&calendar.href, &names::DISPLAY_NAME)),
            )
            .await
            {
                Ok(response) => response.value,
                // A server that cannot report the name still lists the calendar
                Err(CalendarError::Network(e)) => {
                    tracing::warn!(href = %calendar.href, error = %e, "Could not read calendar name");
                    None
                }
                Err(e) => return Err(e),
            };
            entries.push(CollectionEntry {
                href: calendar.href,
                display_name: display_name
                    .map(|name| name.trim().to_string())
                    .filter(|name| !name.is_empty()),
            });
        }

        let calendars = build_calendar_refs(&self.base_url, home.path(), entries);
        tracing::debug!(count = calendars.len(), "Listed calendars");
        Ok(calendars)
    }

    async fn put_object(
        &self,
        calendar: &CalendarRef,
        uid: &str,
        ics: String,
    ) -> CalendarResult<String> {
        let href = event_href(&url_to_href(&calendar.url), uid);
        let client = self.client.lock().await;

        // If-None-Match: * so an existing resource is never overwritten
        let response = with_timeout(
            self.request_timeout,
            "create event",
            client.request(PutResource::new(&href).create(ics, mime_types::CALENDAR)),
        )
        .await?;

        tracing::debug!(href = %href, etag = ?response.etag, "Stored calendar object");
        Ok(href)
    }

    async fn query_by_time_range(
        &self,
        calendar: &CalendarRef,
        range: &DateRange,
    ) -> CalendarResult<Vec<CalendarObject>> {
        let collection = url_to_href(&calendar.url);
        let (start, end) = (range.caldav_start(), range.caldav_end());
        let client = self.client.lock().await;

        with_timeout(
            self.request_timeout,
            "search events",
            client.request(GetCalendarResourcesInRange::new(&collection, &start, &end)),
        )
        .await
    }
}

/// Run one request under `limit`, mapping failures onto `CalendarError`.
async fn with_timeout<T, E, F>(limit: Duration, what: &str, request: F) -> CalendarResult<T>
where
    E: std::error::Error + 'static,
    F: Future<Output = Result<T, E>>,
{
    match timeout(limit, request).await {
        Err(_) => Err(CalendarError::Timeout(limit.as_secs())),
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => match rejected_status(&e) {
            Some(status) => Err(CalendarError::AuthenticationFailed(format!(
                "server answered {status} to {what}; check CALDAV_USERNAME and CALDAV_PASSWORD"
            ))),
            None => Err(CalendarError::Network(format!("Failed to {what}: {e}"))),
        },
    }
}

/// Turn found collections into calendar references.
///
/// Keeps collections other than the home itself, in server order.
/// Duplicate hrefs are dropped. The id is the last path segment, or the full
/// href when that segment is already taken.
fn build_calendar_refs(base_url: &Uri, home_href: &str, entries: Vec<CollectionEntry>) -> Vec<CalendarRef> {
    let home = url_to_href(home_href);
    let home = home.trim_end_matches('/');
    let mut seen_hrefs: Vec<String> = Vec::new();
    let mut calendars: Vec<CalendarRef> = Vec::new();

    for entry in entries {
        let href = url_to_href(&entry.href);
        let normalized = href.trim_end_matches('/').to_string();
        if normalized == home || seen_hrefs.contains(&normalized) {
            continue;
        }
        seen_hrefs.push(normalized.clone());

        let segment = normalized
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or(normalized.as_str())
            .to_string();

        let id = if calendars.iter().any(|c| c.id == segment) {
            href.clone()
        } else {
            segment.clone()
        };

        calendars.push(CalendarRef {
            name: entry.display_name.unwrap_or(segment),
            url: absolute_url(base_url, &href),
            id,
        });
    }

    calendars
}
