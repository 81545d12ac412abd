//! libdav-backed CalDAV session for caldav-mcp.

pub mod caldav;
pub mod session;

pub use session::{CalDavSession, ConnectionSettings};
