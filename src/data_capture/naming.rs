use std::net::SocketAddr;

use chrono::{DateTime, TimeZone};

/// Capture file name for a session opened at `opened_at` by `peer`.
///
/// `<yyyyMMddHHmmss><mmm>_<peer port>`: sorts by open time, and two sessions
/// only collide when the same source port connects twice within one
/// millisecond.
pub fn capture_file_name<Tz>(opened_at: &DateTime<Tz>, peer: SocketAddr) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!("{}_{}", opened_at.format("%Y%m%d%H%M%S%3f"), peer.port())
}
