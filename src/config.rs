//! Command-line and environment configuration.

use std::time::Duration;

use caldav_mcp_core::{CalendarError, CalendarResult};
use caldav_mcp_provider::ConnectionSettings;
use chrono_tz::Tz;
use clap::Parser;
use secrecy::Secret;

#[derive(Parser, Debug)]
#[command(name = "caldav-mcp", version)]
#[command(about = "MCP server exposing a CalDAV calendar to AI assistants over stdio")]
pub struct Cli {
    /// CalDAV endpoint, e.g. https://dav.example.com/dav/
    #[arg(long, env = "CALDAV_URL")]
    pub url: Option<String>,

    #[arg(long, env = "CALDAV_USERNAME")]
    pub username: Option<String>,

    #[arg(long, env = "CALDAV_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// IANA timezone for naive times (defaults to the system zone)
    #[arg(long, env = "CALDAV_TIMEZONE")]
    pub timezone: Option<String>,

    /// Timeout per CalDAV request (e.g., "30s", "1m")
    #[arg(long, env = "CALDAV_REQUEST_TIMEOUT", default_value = "30s", value_parser = humantime::parse_duration)]
    pub request_timeout: Duration,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, env = "CALDAV_MCP_LOG", default_value = "info")]
    pub log_level: String,
}

/// Resolved configuration.
#[derive(Debug)]
pub struct Config {
    pub connection: ConnectionSettings,
    pub timezone: Tz,
}

impl Config {
    /// Check required settings, reporting every missing one at once.
    pub fn from_cli(cli: Cli) -> CalendarResult<Self> {
        let url = non_empty(cli.url);
        let username = non_empty(cli.username);
        let password = non_empty(cli.password);

        let missing: Vec<&str> = [
            ("CALDAV_URL", url.is_none()),
            ("CALDAV_USERNAME", username.is_none()),
            ("CALDAV_PASSWORD", password.is_none()),
        ]
        .into_iter()
        .filter(|(_, absent)| *absent)
        .map(|(name, _)| name)
        .collect();

        let (Some(url), Some(username), Some(password)) = (url, username, password) else {
            return Err(CalendarError::ConfigurationMissing(format!(
                "set {} (environment or .env file)",
                missing.join(", ")
            )));
        };

        if cli.request_timeout.is_zero() {
            return Err(CalendarError::ConfigurationMissing(
                "CALDAV_REQUEST_TIMEOUT must be greater than zero".to_string(),
            ));
        }

        Ok(Config {
            connection: ConnectionSettings {
                url,
                username,
                password: Secret::new(password),
                request_timeout: cli.request_timeout,
            },
            timezone: resolve_timezone(cli.timezone.as_deref())?,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Explicit zone if given, else the system zone, else UTC.
pub fn resolve_timezone(explicit: Option<&str>) -> CalendarResult<Tz> {
    if let Some(name) = explicit.map(str::trim).filter(|s| !s.is_empty()) {
        return name.parse::<Tz>().map_err(|_| {
            CalendarError::ConfigurationMissing(format!(
                "CALDAV_TIMEZONE '{name}' is not a known IANA timezone"
            ))
        });
    }

    match iana_time_zone::get_timezone() {
        Ok(name) => match name.parse::<Tz>() {
            Ok(tz) => Ok(tz),
            Err(_) => {
                tracing::warn!(system_zone = %name, "Unknown system timezone, falling back to UTC");
                Ok(Tz::UTC)
            }
        },
        Err(e) => {
            tracing::warn!(error = %e, "Could not detect system timezone, falling back to UTC");
            Ok(Tz::UTC)
        }
    }
}
